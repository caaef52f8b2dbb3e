// SPDX-License-Identifier: MIT OR Apache-2.0
//! WGSL generation for shader nodes.
//!
//! A node program is the shared prelude, the node's library source, a
//! uniform block with one `vec4<f32>` per numeric parameter, one texture
//! binding per texture parameter and a fragment entry point that calls the
//! node function with `uv` followed by every parameter in declaration order.

use crate::backend::ProgramLayout;
use crate::param::Params;
use crate::shader::library::LibraryId;
use crate::value::{TextureHandle, Value, ValueKind};
use std::collections::HashSet;
use std::fmt::Write;

const PRELUDE: &str = include_str!("wgsl/prelude.wgsl");

/// Size of one uniform slot in bytes
pub const UNIFORM_SLOT_SIZE: u64 = 16;

/// First binding index used for texture parameters
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// Generated source and its resource layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    /// Complete WGSL module
    pub source: String,
    /// Bindings the module expects
    pub layout: ProgramLayout,
}

/// Turn a parameter name into a WGSL identifier with the given prefix.
///
/// `"Pattern X"` with prefix `p_` becomes `p_pattern_x`.
pub fn identifier(prefix: &str, name: &str) -> String {
    let mut ident = String::with_capacity(prefix.len() + name.len());
    ident.push_str(prefix);
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            ident.push(c.to_ascii_lowercase());
        } else {
            ident.push('_');
        }
    }
    ident
}

/// Uniform field name for a numeric parameter
pub fn uniform_field(name: &str) -> String {
    identifier("p_", name)
}

/// Binding name for a texture parameter
pub fn texture_binding(name: &str) -> String {
    identifier("t_", name)
}

/// Layout for a parameter set without generating source
pub fn layout_for(params: &Params) -> ProgramLayout {
    let texture_count = params.iter().filter(|p| p.kind() == ValueKind::Texture2D).count();
    let uniform_count = params.len() - texture_count;
    ProgramLayout {
        uniform_size: UNIFORM_SLOT_SIZE * (1 + uniform_count as u64),
        texture_count,
    }
}

/// Compose the program for `function` from `library` over `params`
pub fn generate(function: &str, library: &LibraryId, library_source: &str, params: &Params) -> GeneratedProgram {
    let mut used = HashSet::new();
    let mut unique = |ident: String| {
        let mut candidate = ident.clone();
        let mut n = 1;
        while !used.insert(candidate.clone()) {
            candidate = format!("{ident}_{n}");
            n += 1;
        }
        candidate
    };

    let mut fields = String::new();
    let mut bindings = String::new();
    let mut args = vec!["input.uv".to_string()];
    let mut binding = FIRST_TEXTURE_BINDING;

    for param in params.iter() {
        let kind = param.kind();
        if kind == ValueKind::Texture2D {
            let name = unique(texture_binding(param.name()));
            let _ = writeln!(
                bindings,
                "@group(0) @binding({binding}) var {name}: {};",
                kind.wgsl_type()
            );
            binding += 1;
            args.push(name);
        } else {
            let name = unique(uniform_field(param.name()));
            let _ = writeln!(fields, "    {name}: vec4<f32>,");
            let swizzle = match kind {
                ValueKind::Scalar => ".x",
                ValueKind::Vec2 => ".xy",
                ValueKind::Vec3 => ".xyz",
                _ => "",
            };
            args.push(format!("node.{name}{swizzle}"));
        }
    }

    let mut source = String::with_capacity(PRELUDE.len() + library_source.len() + 512);
    source.push_str(PRELUDE);
    let _ = writeln!(source, "\n// library: {library}");
    source.push_str(library_source);
    let _ = write!(
        source,
        "\nstruct NodeUniforms {{\n    frame: vec4<f32>,\n{fields}}}\n\n\
         @group(0) @binding(0) var<uniform> node: NodeUniforms;\n{bindings}\n\
         @fragment\nfn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {{\n    return {function}({});\n}}\n",
        args.join(", ")
    );

    GeneratedProgram {
        source,
        layout: layout_for(params),
    }
}

/// Pack the uniform block for a render into a `width` x `height` target.
///
/// The first slot holds `(width, height, 1/width, 1/height)`; each numeric
/// value follows in its own zero-padded slot. Texture values are skipped.
pub fn pack_uniforms(width: u32, height: u32, values: &[Value]) -> Vec<u8> {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let mut slots: Vec<[f32; 4]> = vec![[w, h, 1.0 / w, 1.0 / h]];
    slots.extend(values.iter().filter_map(Value::components));
    bytemuck::cast_slice(&slots).to_vec()
}

/// Texture handles in binding order
pub fn texture_arguments(values: &[Value]) -> Vec<TextureHandle> {
    values.iter().filter_map(Value::texture).collect()
}
