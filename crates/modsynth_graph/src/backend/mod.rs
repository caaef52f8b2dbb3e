// SPDX-License-Identifier: MIT OR Apache-2.0
//! GPU primitives consumed by shader nodes.
//!
//! A [`GpuBackend`] compiles generated WGSL into programs, allocates RGBA
//! float textures and renders one full-screen pass per call. Two backends
//! ship with the crate:
//!
//! - [`WgpuBackend`] drives a real device through `wgpu`.
//! - [`ValidatingBackend`] validates shaders with `naga` and fills targets
//!   with deterministic placeholder texels, for tests and machines
//!   without an adapter.
//!
//! Every program uses the same binding layout: binding 0 is the uniform
//! block, binding 1 a non-filtering sampler, and bindings 2.. one
//! `texture_2d<f32>` per texture parameter.

mod gpu;
mod validating;

pub use gpu::{WgpuBackend, TEXTURE_FORMATS};
pub use validating::ValidatingBackend;

use crate::value::TextureHandle;
use std::fmt;

/// Handle to a compiled program owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

/// Resource layout of a generated program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramLayout {
    /// Size of the uniform block in bytes
    pub uniform_size: u64,
    /// Number of texture bindings following the sampler
    pub texture_count: usize,
}

/// RGBA float pixels read back from a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TexturePixels {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Row-major RGBA data, four floats per texel
    pub data: Vec<f32>,
}

impl TexturePixels {
    /// RGBA value at `(x, y)`
    pub fn texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = ((y * self.width + x) * 4) as usize;
        let texel = self.data.get(start..start + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }
}

/// Shader compilation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Shader compilation failed:\n{diagnostic}")]
pub struct CompileError {
    /// Human-readable compiler output
    pub diagnostic: String,
}

impl CompileError {
    /// Create a compile error from compiler output
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// Error from a GPU backend call other than compilation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// No adapter matched the requested settings
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    /// Device creation failed
    #[error("Failed to request device: {0}")]
    RequestDevice(String),

    /// The adapter cannot render to any node texture format
    #[error("Adapter `{0}` cannot render to a float RGBA texture")]
    UnsupportedFormat(String),

    /// Program handle is not known to the backend
    #[error("Unknown program: {0}")]
    UnknownProgram(ProgramHandle),

    /// The device rejected a texture allocation
    #[error("Texture creation failed: {0}")]
    CreateTexture(String),

    /// Texture handle is not known to the backend
    #[error("Unknown texture: {0}")]
    UnknownTexture(TextureHandle),

    /// Uploaded data does not match the texture size or program layout
    #[error("Invalid texture data: {0}")]
    InvalidTextureData(String),

    /// Reading a texture back to the CPU failed
    #[error("Texture readback failed: {0}")]
    Readback(String),

    /// The render pass was rejected
    #[error("Render failed: {0}")]
    Render(String),
}

/// GPU operations needed to evaluate shader nodes
pub trait GpuBackend: Send {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Compile WGSL source with the given layout
    fn compile(&mut self, source: &str, layout: &ProgramLayout) -> Result<ProgramHandle, CompileError>;

    /// Free a compiled program
    fn release_program(&mut self, program: ProgramHandle);

    /// Allocate an uninitialised RGBA float texture
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, BackendError>;

    /// Free a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Size of a texture, if it exists
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    /// Replace a texture's contents with row-major RGBA floats
    fn upload_texture(&mut self, texture: TextureHandle, data: &[f32]) -> Result<(), BackendError>;

    /// Run `program` over every texel of `target`
    fn render(
        &mut self,
        program: ProgramHandle,
        target: TextureHandle,
        uniforms: &[u8],
        textures: &[TextureHandle],
    ) -> Result<(), BackendError>;

    /// Copy a texture back to the CPU
    fn read_texture(&mut self, texture: TextureHandle) -> Result<TexturePixels, BackendError>;
}

/// Parse and validate WGSL source, rendering diagnostics against the source
pub fn validate_wgsl(source: &str) -> Result<naga::Module, CompileError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| CompileError::new(e.emit_to_string(source)))?;

    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| CompileError::new(e.emit_to_string(source)))?;

    for (stage, name) in [(naga::ShaderStage::Vertex, "vs_main"), (naga::ShaderStage::Fragment, "fs_main")] {
        if !module.entry_points.iter().any(|ep| ep.stage == stage && ep.name == name) {
            return Err(CompileError::new(format!("missing entry point `{name}`")));
        }
    }

    Ok(module)
}

/// Check that `data` holds exactly one RGBA texel per pixel of a `width` x `height` texture
pub(crate) fn check_texel_count(width: u32, height: u32, data: &[f32]) -> Result<(), BackendError> {
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        return Err(BackendError::InvalidTextureData(format!(
            "expected {expected} floats for {width}x{height}, got {}",
            data.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
        @vertex fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
            return vec4<f32>(f32(i), 0.0, 0.0, 1.0);
        }
        @fragment fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0);
        }
    ";

    #[test]
    fn test_validate_accepts_minimal_program() {
        assert!(validate_wgsl(MINIMAL).is_ok());
    }

    #[test]
    fn test_validate_reports_parse_errors() {
        let err = validate_wgsl("fn broken( {").unwrap_err();
        assert!(!err.diagnostic.is_empty());
    }

    #[test]
    fn test_validate_requires_entry_points() {
        let err = validate_wgsl("fn helper() -> f32 { return 1.0; }").unwrap_err();
        assert!(err.diagnostic.contains("vs_main"));
    }

    #[test]
    fn test_texel_lookup() {
        let pixels = TexturePixels {
            width: 2,
            height: 1,
            data: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.5, 0.25, 1.0],
        };
        assert_eq!(pixels.texel(1, 0), Some([1.0, 0.5, 0.25, 1.0]));
        assert_eq!(pixels.texel(2, 0), None);
    }
}
