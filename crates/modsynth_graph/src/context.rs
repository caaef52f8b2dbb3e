// SPDX-License-Identifier: MIT OR Apache-2.0
//! GPU context shared by every graph in the process.

use crate::backend::{
    check_texel_count, BackendError, CompileError, GpuBackend, ProgramHandle, ProgramLayout, TexturePixels,
    ValidatingBackend,
};
use crate::settings::RenderSettings;
use crate::shader::{AcquiredProgram, LibraryError, LibraryId, ProgramCache, ProgramSignature, ShaderLibraries};
use crate::value::TextureHandle;
use parking_lot::Mutex;
use std::sync::Arc;

/// Render context handle shared between graphs
pub type SharedRenderContext = Arc<Mutex<RenderContext>>;

/// Backend, program cache, shader libraries and settings.
///
/// Graphs lock the context for the duration of a solve, so GPU calls are
/// serialised even when several graphs share it.
pub struct RenderContext {
    backend: Box<dyn GpuBackend>,
    programs: ProgramCache,
    libraries: ShaderLibraries,
    settings: RenderSettings,
    fallback: Option<TextureHandle>,
}

impl RenderContext {
    /// Create a context over `backend` with the built-in libraries
    pub fn new(backend: impl GpuBackend + 'static, settings: RenderSettings) -> Self {
        Self::from_boxed(Box::new(backend), settings)
    }

    /// Create a context over an already boxed backend
    pub fn from_boxed(backend: Box<dyn GpuBackend>, settings: RenderSettings) -> Self {
        Self {
            backend,
            programs: ProgramCache::new(),
            libraries: ShaderLibraries::with_builtin(),
            settings,
            fallback: None,
        }
    }

    /// Create a context over a [`ValidatingBackend`] with default settings
    pub fn validating() -> Self {
        Self::new(ValidatingBackend::new(), RenderSettings::default())
    }

    /// Wrap the context for sharing between graphs
    pub fn into_shared(self) -> SharedRenderContext {
        Arc::new(Mutex::new(self))
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Current settings
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Change the edge length of node textures. Takes effect on the next render of each node.
    pub fn set_preview_size(&mut self, size: u32) {
        self.settings.preview_size = size;
    }

    /// Registered shader libraries
    pub fn libraries(&self) -> &ShaderLibraries {
        &self.libraries
    }

    /// Register an additional shader library
    pub fn register_library(&mut self, id: impl Into<LibraryId>, source: impl Into<String>) -> Result<(), LibraryError> {
        self.libraries.register(id, source)
    }

    /// Compiled program cache
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    /// Take a reference to the program for `signature`, compiling on a miss
    pub fn acquire_program(
        &mut self,
        signature: &ProgramSignature,
        source: &str,
        layout: &ProgramLayout,
    ) -> Result<AcquiredProgram, CompileError> {
        self.programs
            .acquire(signature, source, layout, self.backend.as_mut())
    }

    /// Drop a reference taken with [`Self::acquire_program`]
    pub fn release_program(&mut self, signature: &ProgramSignature) {
        self.programs.release(signature, self.backend.as_mut());
    }

    /// Allocate a texture
    pub fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, BackendError> {
        self.backend.create_texture(width, height)
    }

    /// Free a texture
    pub fn destroy_texture(&mut self, texture: TextureHandle) {
        self.backend.destroy_texture(texture);
    }

    /// Size of a texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.backend.texture_size(texture)
    }

    /// Create a texture from row-major RGBA floats
    pub fn upload_texture(&mut self, width: u32, height: u32, data: &[f32]) -> Result<TextureHandle, BackendError> {
        check_texel_count(width, height, data)?;
        let texture = self.backend.create_texture(width, height)?;
        if let Err(err) = self.backend.upload_texture(texture, data) {
            self.backend.destroy_texture(texture);
            return Err(err);
        }
        Ok(texture)
    }

    /// Read a texture back to the CPU
    pub fn read_texture(&mut self, texture: TextureHandle) -> Result<TexturePixels, BackendError> {
        self.backend.read_texture(texture)
    }

    /// Render `program` into `target`. Unbound texture arguments sample a
    /// transparent 1x1 texture.
    pub fn render(
        &mut self,
        program: ProgramHandle,
        target: TextureHandle,
        uniforms: &[u8],
        textures: &[TextureHandle],
    ) -> Result<(), BackendError> {
        let mut bound = Vec::with_capacity(textures.len());
        for &texture in textures {
            if texture.is_bound() {
                bound.push(texture);
            } else {
                bound.push(self.fallback_texture()?);
            }
        }
        self.backend.render(program, target, uniforms, &bound)
    }

    fn fallback_texture(&mut self) -> Result<TextureHandle, BackendError> {
        if let Some(texture) = self.fallback {
            return Ok(texture);
        }
        let texture = self.upload_texture(1, 1, &[0.0; 4])?;
        self.fallback = Some(texture);
        Ok(texture)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Some(texture) = self.fallback.take() {
            self.backend.destroy_texture(texture);
        }
        self.programs.clear(self.backend.as_mut());
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.name())
            .field("programs", &self.programs.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_and_read() {
        let mut render = RenderContext::validating();
        let data: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let texture = render.upload_texture(2, 2, &data).unwrap();
        assert_eq!(render.texture_size(texture), Some((2, 2)));
        let pixels = render.read_texture(texture).unwrap();
        assert_eq!(pixels.data, data);
    }

    #[test]
    fn test_upload_rejects_bad_length() {
        let mut render = RenderContext::validating();
        let err = render.upload_texture(2, 2, &[0.0; 3]).unwrap_err();
        assert!(matches!(err, BackendError::InvalidTextureData(_)));
    }

    #[test]
    fn test_register_library() {
        let mut render = RenderContext::validating();
        render.register_library("extra", "").unwrap();
        assert!(render.register_library("shapes", "").is_err());
    }
}
