// SPDX-License-Identifier: MIT OR Apache-2.0
//! CPU backend that validates programs without executing them.

use super::{
    check_texel_count, validate_wgsl, BackendError, CompileError, GpuBackend, ProgramHandle, ProgramLayout,
    TexturePixels,
};
use crate::shader::cache::{fnv1a, FNV_OFFSET};
use crate::value::TextureHandle;
use std::collections::HashMap;

#[derive(Debug)]
struct ValidatedProgram {
    layout: ProgramLayout,
    fingerprint: u64,
}

#[derive(Debug)]
struct CpuTexture {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl CpuTexture {
    fn fingerprint(&self) -> u64 {
        fnv1a(FNV_OFFSET, bytemuck::cast_slice(&self.data))
    }
}

/// Backend that checks WGSL with `naga` and fills render targets with
/// placeholder texels.
///
/// Texels are a pure function of the program source, the uniforms and the
/// contents of the bound textures, so identical graphs render identically
/// and any upstream change is visible downstream.
#[derive(Debug, Default)]
pub struct ValidatingBackend {
    programs: HashMap<ProgramHandle, ValidatedProgram>,
    textures: HashMap<TextureHandle, CpuTexture>,
    next_program: u64,
    next_texture: u64,
}

impl ValidatingBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

/// `SplitMix64` finaliser
fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn unit(bits: u64) -> f32 {
    (bits & 0xffff) as f32 / 65535.0
}

impl GpuBackend for ValidatingBackend {
    fn name(&self) -> &str {
        "validating"
    }

    fn compile(&mut self, source: &str, layout: &ProgramLayout) -> Result<ProgramHandle, CompileError> {
        validate_wgsl(source)?;
        self.next_program += 1;
        let handle = ProgramHandle(self.next_program);
        self.programs.insert(
            handle,
            ValidatedProgram {
                layout: *layout,
                fingerprint: fnv1a(FNV_OFFSET, source.as_bytes()),
            },
        );
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidTextureData(format!("empty texture {width}x{height}")));
        }
        self.next_texture += 1;
        let handle = TextureHandle(self.next_texture);
        self.textures.insert(
            handle,
            CpuTexture {
                width,
                height,
                data: vec![0.0; width as usize * height as usize * 4],
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let target = self
            .textures
            .get_mut(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        check_texel_count(target.width, target.height, data)?;
        target.data.copy_from_slice(data);
        Ok(())
    }

    fn render(
        &mut self,
        program: ProgramHandle,
        target: TextureHandle,
        uniforms: &[u8],
        textures: &[TextureHandle],
    ) -> Result<(), BackendError> {
        let validated = self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        if uniforms.len() as u64 != validated.layout.uniform_size {
            return Err(BackendError::Render(format!(
                "uniform block is {} bytes, program expects {}",
                uniforms.len(),
                validated.layout.uniform_size
            )));
        }
        if textures.len() != validated.layout.texture_count {
            return Err(BackendError::Render(format!(
                "{} textures bound, program expects {}",
                textures.len(),
                validated.layout.texture_count
            )));
        }

        let mut seed = fnv1a(FNV_OFFSET, &validated.fingerprint.to_le_bytes());
        seed = fnv1a(seed, uniforms);
        for texture in textures {
            let input = self
                .textures
                .get(texture)
                .ok_or(BackendError::UnknownTexture(*texture))?;
            seed = fnv1a(seed, &input.fingerprint().to_le_bytes());
        }

        let output = self
            .textures
            .get_mut(&target)
            .ok_or(BackendError::UnknownTexture(target))?;
        for (index, texel) in output.data.chunks_exact_mut(4).enumerate() {
            let bits = mix64(seed ^ index as u64);
            texel[0] = unit(bits);
            texel[1] = unit(bits >> 16);
            texel[2] = unit(bits >> 32);
            texel[3] = 1.0;
        }
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureHandle) -> Result<TexturePixels, BackendError> {
        let source = self
            .textures
            .get(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        Ok(TexturePixels {
            width: source.width,
            height: source.height,
            data: source.data.clone(),
        })
    }
}
