// SPDX-License-Identifier: MIT OR Apache-2.0
//! `wgpu` implementation of [`GpuBackend`].

use super::{
    check_texel_count, validate_wgsl, BackendError, CompileError, GpuBackend, ProgramHandle, ProgramLayout,
    TexturePixels,
};
use crate::settings::{AdapterPreference, RenderSettings};
use crate::shader::codegen::FIRST_TEXTURE_BINDING;
use crate::value::TextureHandle;
use half::f16;
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// Node texture formats in order of preference
pub const TEXTURE_FORMATS: [wgpu::TextureFormat; 2] =
    [wgpu::TextureFormat::Rgba32Float, wgpu::TextureFormat::Rgba16Float];

/// Usages every node texture is created with
const TEXTURE_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Features of `format` as a device created with `device_features` will see them
fn effective_format_features(
    adapter: &wgpu::Adapter,
    format: wgpu::TextureFormat,
    device_features: wgpu::Features,
) -> wgpu::TextureFormatFeatures {
    let compliant = adapter.get_downlevel_capabilities().is_webgpu_compliant();
    if device_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) || !compliant {
        adapter.get_texture_format_features(format)
    } else {
        format.guaranteed_format_features(device_features)
    }
}

/// First format in [`TEXTURE_FORMATS`] allowing every node texture usage,
/// with the device features needed to unlock it.
///
/// Adapter-specific format features are requested only when the portable
/// set is not enough and `adapter_specific` says the adapter offers them.
fn select_texture_format<F>(
    adapter_specific: bool,
    mut features_for: F,
) -> Option<(wgpu::TextureFormat, wgpu::Features)>
where
    F: FnMut(wgpu::TextureFormat, wgpu::Features) -> wgpu::TextureFormatFeatures,
{
    let mut candidates = vec![wgpu::Features::empty()];
    if adapter_specific {
        candidates.push(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
    }
    for format in TEXTURE_FORMATS {
        for &features in &candidates {
            if features_for(format, features).allowed_usages.contains(TEXTURE_USAGES) {
                return Some((format, features));
            }
        }
    }
    None
}

/// Bytes per texel of a node texture format
fn texel_size(format: wgpu::TextureFormat) -> u32 {
    match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        _ => 16,
    }
}

/// Encode RGBA floats in the layout of `format`
fn encode_texels(format: wgpu::TextureFormat, data: &[f32]) -> Vec<u8> {
    match format {
        wgpu::TextureFormat::Rgba16Float => data.iter().flat_map(|v| f16::from_f32(*v).to_le_bytes()).collect(),
        _ => bytemuck::cast_slice(data).to_vec(),
    }
}

/// Decode one row of `format` texels into RGBA floats
fn decode_texels(format: wgpu::TextureFormat, bytes: &[u8], out: &mut Vec<f32>) {
    match format {
        wgpu::TextureFormat::Rgba16Float => {
            out.extend(bytes.chunks_exact(2).map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32()));
        }
        _ => out.extend(bytemuck::pod_collect_to_vec::<u8, f32>(bytes)),
    }
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: ProgramLayout,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl GpuTexture {
    fn copy_view(&self) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        }
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Backend rendering node programs on a `wgpu` device
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
    programs: HashMap<ProgramHandle, GpuProgram>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_program: u64,
    next_texture: u64,
}

impl WgpuBackend {
    /// Create an instance, adapter and device of its own
    pub fn headless(settings: &RenderSettings) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match settings.power_preference {
            AdapterPreference::LowPower => wgpu::PowerPreference::LowPower,
            AdapterPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            force_fallback_adapter: settings.force_fallback_adapter,
            compatible_surface: None,
        }))
        .ok_or(BackendError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!("Using adapter: {} ({:?})", info.name, info.backend);

        let adapter_specific = adapter
            .features()
            .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
        let (format, required_features) = select_texture_format(adapter_specific, |format, features| {
            effective_format_features(&adapter, format, features)
        })
        .ok_or_else(|| BackendError::UnsupportedFormat(info.name.clone()))?;
        tracing::info!("Node textures use {:?}", format);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Modsynth Device"),
                required_features,
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| BackendError::RequestDevice(e.to_string()))?;

        Ok(Self::from_device(device, queue, format))
    }

    /// Adopt a device created by the caller.
    ///
    /// `format` must be one of [`TEXTURE_FORMATS`] and renderable on `device`.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Node Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            device,
            queue,
            sampler,
            format,
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_program: 0,
            next_texture: 0,
        }
    }

    /// The device in use
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The queue in use
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Format of every node texture
    pub fn texture_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// View of a node texture, for display by a collaborator
    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|t| &t.view)
    }

    fn create_bind_group_layout(&self, layout: &ProgramLayout) -> wgpu::BindGroupLayout {
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(layout.uniform_size),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ];
        for index in 0..layout.texture_count {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_TEXTURE_BINDING + index as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Node Bind Group Layout"),
            entries: &entries,
        })
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn compile(&mut self, source: &str, layout: &ProgramLayout) -> Result<ProgramHandle, CompileError> {
        validate_wgsl(source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Node Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let bind_group_layout = self.create_bind_group_layout(layout);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Node Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Node Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(CompileError::new(error.to_string()));
        }

        self.next_program += 1;
        let handle = ProgramHandle(self.next_program);
        self.programs.insert(
            handle,
            GpuProgram {
                pipeline,
                bind_group_layout,
                layout: *layout,
            },
        );
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BackendError::InvalidTextureData(format!(
                "texture size {width}x{height} outside 1..={max}"
            )));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Node Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: TEXTURE_USAGES,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::CreateTexture(error.to_string()));
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.next_texture += 1;
        let handle = TextureHandle(self.next_texture);
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                width,
                height,
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = self.textures.remove(&texture) {
            texture.texture.destroy();
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let target = self
            .textures
            .get(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        check_texel_count(target.width, target.height, data)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue.write_texture(
            target.copy_view(),
            &encode_texels(self.format, data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(target.width * texel_size(self.format)),
                rows_per_image: Some(target.height),
            },
            target.extent(),
        );
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(BackendError::InvalidTextureData(error.to_string())),
            None => Ok(()),
        }
    }

    fn render(
        &mut self,
        program: ProgramHandle,
        target: TextureHandle,
        uniforms: &[u8],
        textures: &[TextureHandle],
    ) -> Result<(), BackendError> {
        let gpu_program = self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        let output = self
            .textures
            .get(&target)
            .ok_or(BackendError::UnknownTexture(target))?;
        if uniforms.len() as u64 != gpu_program.layout.uniform_size || textures.len() != gpu_program.layout.texture_count {
            return Err(BackendError::Render(format!(
                "{} uniform bytes and {} textures do not match {:?}",
                uniforms.len(),
                textures.len(),
                gpu_program.layout
            )));
        }
        let views = textures
            .iter()
            .map(|handle| {
                self.textures
                    .get(handle)
                    .map(|t| &t.view)
                    .ok_or(BackendError::UnknownTexture(*handle))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Uniforms"),
            contents: uniforms,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (index, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + index as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Node Bind Group"),
            layout: &gpu_program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Node Render Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Node Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&gpu_program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(BackendError::Render(error.to_string())),
            None => Ok(()),
        }
    }

    fn read_texture(&mut self, texture: TextureHandle) -> Result<TexturePixels, BackendError> {
        let source = self
            .textures
            .get(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        let unpadded_row = source.width * texel_size(self.format);
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Readback Buffer"),
            size: u64::from(padded_row) * u64::from(source.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Node Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            source.copy_view(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(source.height),
                },
            },
            source.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let mut data = Vec::with_capacity(source.width as usize * source.height as usize * 4);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row as usize) {
                decode_texels(self.format, &row[..unpadded_row as usize], &mut data);
            }
        }
        buffer.unmap();

        Ok(TexturePixels {
            width: source.width,
            height: source.height,
            data,
        })
    }
}
