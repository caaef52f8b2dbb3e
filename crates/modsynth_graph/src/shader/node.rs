// SPDX-License-Identifier: MIT OR Apache-2.0
//! GPU-executed image node.

use crate::backend::ProgramHandle;
use crate::evaluation::{NodeError, SolveContext};
use crate::node::{Node, NodeCategory, NodeType, SocketSpec};
use crate::param::{ParamDecl, ParamError, Params};
use crate::shader::cache::ProgramSignature;
use crate::shader::codegen;
use crate::shader::library::LibraryId;
use crate::context::RenderContext;
use crate::value::{TextureHandle, Value, ValueKind};
use std::sync::Arc;

/// Name of the single output socket of every shader node
pub const OUTPUT_SOCKET: &str = "Output";

/// Static description of a shader node kind
#[derive(Debug, Clone)]
pub struct ShaderNodeType {
    /// Registry code
    pub code: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// WGSL function invoked by the generated entry point
    pub function: String,
    /// Library that defines `function`
    pub library: LibraryId,
    /// Parameters passed to `function` after `uv`, in order
    pub params: Vec<ParamDecl>,
}

impl ShaderNodeType {
    /// Describe a shader node kind
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: NodeCategory,
        function: impl Into<String>,
        library: impl Into<LibraryId>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            category,
            description: String::new(),
            function: function.into(),
            library: library.into(),
            params: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a parameter declaration.
    ///
    /// # Panics
    ///
    /// Panics if a parameter with the same name is already declared.
    pub fn with_param(mut self, decl: ParamDecl) -> Self {
        assert!(
            !self.params.iter().any(|p| p.name == decl.name),
            "parameter `{}` declared twice on `{}`",
            decl.name,
            self.code
        );
        self.params.push(decl);
        self
    }

    /// Wrap this kind in a registry entry
    pub fn into_node_type(self) -> NodeType {
        let shader = Arc::new(self);
        let builder = Arc::clone(&shader);
        NodeType::new(
            shader.code.clone(),
            shader.name.clone(),
            shader.category,
            shader.description.clone(),
            move || Box::new(ShaderNode::new(&builder)),
        )
    }
}

#[derive(Debug, Clone)]
struct BoundProgram {
    signature: ProgramSignature,
    handle: ProgramHandle,
}

/// Node that renders one WGSL function into its own square texture.
///
/// The program is recompiled only when the signature changes, that is
/// when the function, library or parameter declarations change. Value
/// edits reuse the program and only re-render.
#[derive(Debug)]
pub struct ShaderNode {
    code: String,
    name: String,
    function: String,
    library: LibraryId,
    params: Params,
    program: Option<BoundProgram>,
    texture: Option<TextureHandle>,
}

impl ShaderNode {
    /// Create a node of the given kind with default parameter values
    pub fn new(kind: &ShaderNodeType) -> Self {
        Self {
            code: kind.code.clone(),
            name: kind.name.clone(),
            function: kind.function.clone(),
            library: kind.library.clone(),
            params: Params::from_decls(kind.params.iter().cloned()),
            program: None,
            texture: None,
        }
    }

    /// WGSL function this node calls
    pub fn function_name(&self) -> &str {
        &self.function
    }

    /// Library providing the function
    pub fn library(&self) -> &LibraryId {
        &self.library
    }

    /// Current program signature
    pub fn signature(&self) -> ProgramSignature {
        ProgramSignature::new(self.function.clone(), self.library.clone(), &self.params)
    }

    /// Signature of the program currently held, if any
    pub fn compiled_signature(&self) -> Option<&ProgramSignature> {
        self.program.as_ref().map(|p| &p.signature)
    }

    /// Output texture, once rendered
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Get a parameter value
    pub fn param(&self, name: &str) -> Option<Value> {
        self.params.value(name)
    }

    /// Check if a parameter is declared
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    /// Set a parameter value, marking the node changed
    pub fn set_param(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        self.params.set(name, value)
    }

    /// Set one component of a parameter value
    pub fn set_param_component(&mut self, name: &str, index: usize, component: f32) -> Result<(), ParamError> {
        self.params.set_component(name, index, component)
    }

    /// Parameter values for this evaluation, with connected sockets
    /// replaced by their upstream values
    fn resolve_values(&self, inputs: &[Option<Value>]) -> Vec<Value> {
        let mut socket = 0;
        self.params
            .iter()
            .map(|param| {
                if !param.is_socket() {
                    return param.value();
                }
                let upstream = inputs.get(socket).copied().flatten();
                socket += 1;
                match upstream {
                    Some(value) if value.kind() == param.kind() => value,
                    _ => param.value(),
                }
            })
            .collect()
    }

    fn ensure_program(&mut self, ctx: &mut SolveContext<'_>) -> Result<ProgramHandle, NodeError> {
        let signature = self.signature();
        if let Some(bound) = &self.program {
            if bound.signature == signature {
                return Ok(bound.handle);
            }
        }

        let render = ctx.render();
        let library_source = render
            .libraries()
            .get(&self.library)
            .ok_or_else(|| NodeError::MissingLibrary(self.library.clone()))?;
        let generated = codegen::generate(&self.function, &self.library, library_source, &self.params);
        let acquired = render.acquire_program(&signature, &generated.source, &generated.layout)?;

        if acquired.reused {
            ctx.record_reuse();
        } else {
            ctx.record_compile();
        }
        let previous = self.program.replace(BoundProgram {
            signature,
            handle: acquired.handle,
        });
        if let Some(previous) = previous {
            ctx.render().release_program(&previous.signature);
        }
        Ok(acquired.handle)
    }

    /// Render target for the current preview size. A texture of a stale size
    /// is kept alive and a replacement returned with `true` until the render
    /// into it succeeds.
    fn render_target(&self, render: &mut RenderContext) -> Result<(TextureHandle, bool), NodeError> {
        let size = render.settings().texture_size();
        match self.texture {
            Some(texture) if render.texture_size(texture) == Some((size, size)) => Ok((texture, false)),
            _ => Ok((render.create_texture(size, size)?, true)),
        }
    }
}

impl Node for ShaderNode {
    fn kind_code(&self) -> &str {
        &self.code
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::new(OUTPUT_SOCKET, ValueKind::Texture2D)]
    }

    fn declare_param(&mut self, decl: ParamDecl) -> Result<(), ParamError> {
        self.params.declare(decl)
    }

    fn remove_param(&mut self, name: &str) -> Result<(), ParamError> {
        self.params.remove(name).map(|_| ())
    }

    fn solve(&mut self, inputs: &[Option<Value>], ctx: &mut SolveContext<'_>) -> Result<Vec<Value>, NodeError> {
        let values = self.resolve_values(inputs);
        let program = self.ensure_program(ctx)?;
        let (target, replacement) = self.render_target(ctx.render())?;

        let size = ctx.render().settings().texture_size();
        let uniforms = codegen::pack_uniforms(size, size, &values);
        let textures = codegen::texture_arguments(&values);
        if let Err(err) = ctx.render().render(program, target, &uniforms, &textures) {
            if replacement {
                ctx.render().destroy_texture(target);
            }
            return Err(err.into());
        }
        ctx.record_render();

        if replacement {
            if let Some(previous) = self.texture.replace(target) {
                ctx.render().destroy_texture(previous);
            }
        }

        Ok(vec![Value::Texture2D(target)])
    }

    fn release(&mut self, render: &mut RenderContext) {
        if let Some(program) = self.program.take() {
            render.release_program(&program.signature);
        }
        if let Some(texture) = self.texture.take() {
            render.destroy_texture(texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::library::TEXTURE_LIBRARY;

    fn threshold_kind() -> ShaderNodeType {
        ShaderNodeType::new("THR", "Threshold", NodeCategory::Operator, "threshold_texture", TEXTURE_LIBRARY)
            .with_param(ParamDecl::texture("Input").as_socket())
            .with_param(ParamDecl::scalar("Threshold", 0.5))
            .with_param(ParamDecl::scalar("Feather", 0.1))
    }

    #[test]
    fn test_sockets_follow_params() {
        let node = ShaderNode::new(&threshold_kind());
        assert_eq!(node.inputs(), vec![SocketSpec::new("Input", ValueKind::Texture2D)]);
        assert_eq!(node.outputs(), vec![SocketSpec::new("Output", ValueKind::Texture2D)]);
        assert!(!node.params().is_changed());
    }

    #[test]
    fn test_resolve_values_prefers_upstream() {
        let node = ShaderNode::new(&threshold_kind());
        let upstream = Value::Texture2D(TextureHandle(9));
        let values = node.resolve_values(&[Some(upstream)]);
        assert_eq!(values, [upstream, Value::Scalar(0.5), Value::Scalar(0.1)]);

        let values = node.resolve_values(&[None]);
        assert_eq!(values[0], Value::Texture2D(TextureHandle::UNBOUND));
    }

    #[test]
    #[should_panic(expected = "parameter `Threshold` declared twice on `THR`")]
    fn test_duplicate_param_is_rejected() {
        let _ = threshold_kind().with_param(ParamDecl::scalar("Threshold", 0.2));
    }

    #[test]
    fn test_declaration_changes_signature() {
        let mut node = ShaderNode::new(&threshold_kind());
        let before = node.signature();

        node.set_param("Threshold", Value::Scalar(0.9)).unwrap();
        assert_eq!(node.signature(), before);

        node.declare_param(ParamDecl::scalar("Gain", 1.0)).unwrap();
        assert_ne!(node.signature(), before);
        node.remove_param("Gain").unwrap();
        assert_eq!(node.signature(), before);
    }
}
