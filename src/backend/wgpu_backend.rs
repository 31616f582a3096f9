//! [`GpuBackend`] on top of wgpu.
//!
//! Framebuffers are plain attachment lists; a render pass is opened per draw
//! on the attachment views of the target. Pipelines are built lazily the
//! first time a pass is drawn with a given input signature and target
//! formats, and cached for the life of the backend.
//!
//! Commands are recorded into a single encoder and submitted on
//! [`flush`](WgpuBackend::flush).

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::shaders::{FIRST_INPUT_BINDING, InputKind, shader_source};
use super::{
    Attachment, COLOR_SLOT, DEPTH_SLOT, DeviceCaps, DrawCall, GpuBackend, PassDesc, ShaderKind,
    TextureDesc, TextureFormat, TextureKind, WriteMask,
};
use crate::error::{EffectsError, EffectsResult};
use crate::gpu::GpuContext;
use crate::handles::{FramebufferId, HandleCounter, PassId, ShaderId, TextureId};

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        // 16-bit normalized formats need an optional feature; half floats don't.
        TextureFormat::Rg16 => wgpu::TextureFormat::Rg16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn filterable(format: TextureFormat) -> bool {
    matches!(format, TextureFormat::Rgba16Float | TextureFormat::Rg16)
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
}

struct PoolSlot {
    id: TextureId,
    size: [u32; 2],
    format: TextureFormat,
    in_use: bool,
}

struct Framebuffer {
    label: &'static str,
    slots: Vec<Option<Attachment>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct InputSig {
    kind: InputKind,
    filterable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderKind,
    write: WriteMask,
    depth_always: bool,
    inputs: Vec<InputSig>,
    color: Option<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
}

struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Renders the effect pipeline with wgpu.
///
/// # Example
///
/// ```no_run
/// use screenfx::{GpuContext, WgpuBackend};
///
/// let gpu = GpuContext::new_headless()?;
/// let mut backend = WgpuBackend::new(gpu);
/// // ... drive an EffectsContext with &mut backend ...
/// backend.flush();
/// # Ok::<(), screenfx::EffectsError>(())
/// ```
pub struct WgpuBackend {
    gpu: GpuContext,
    caps: DeviceCaps,
    ids: HandleCounter,
    textures: HashMap<TextureId, GpuTexture>,
    pool: Vec<PoolSlot>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    shaders: HashMap<ShaderId, ShaderKind>,
    passes: HashMap<PassId, PassDesc>,
    pipelines: HashMap<PipelineKey, CachedPipeline>,
    sampler: wgpu::Sampler,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Creates a backend with capabilities detected from the adapter.
    pub fn new(gpu: GpuContext) -> Self {
        let caps = DeviceCaps {
            supports_depth_only_framebuffer: !gpu.is_intel(),
        };
        Self::with_caps(gpu, caps)
    }

    /// Creates a backend with explicit capabilities, overriding detection.
    pub fn with_caps(gpu: GpuContext, caps: DeviceCaps) -> Self {
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("screenfx Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        log::debug!("wgpu backend caps: {caps:?}");
        Self {
            gpu,
            caps,
            ids: HandleCounter::default(),
            textures: HashMap::new(),
            pool: Vec::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            passes: HashMap::new(),
            pipelines: HashMap::new(),
            sampler,
            encoder: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// The wgpu texture behind a handle, for hosts that read results back.
    pub fn texture(&self, texture: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&texture).map(|t| &t.texture)
    }

    /// Submits every command recorded since the last flush.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn allocate(&mut self, desc: &TextureDesc) -> EffectsResult<TextureId> {
        if desc.size[0] == 0 || desc.size[1] == 0 {
            return Err(EffectsError::allocation(desc.label, "zero-sized texture"));
        }
        let limit = self.gpu.device.limits().max_texture_dimension_2d;
        if desc.size[0] > limit || desc.size[1] > limit {
            return Err(EffectsError::allocation(
                desc.label,
                format!("{}x{} exceeds device limit {limit}", desc.size[0], desc.size[1]),
            ));
        }
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.size[0],
                height: desc.size[1],
                depth_or_array_layers: desc.layers.max(1),
            },
            mip_level_count: desc.mip_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let id = TextureId(self.ids.next());
        self.textures.insert(
            id,
            GpuTexture {
                desc: desc.clone(),
                texture,
            },
        );
        Ok(id)
    }

    fn input_view(texture: &GpuTexture, mip: Option<u32>) -> wgpu::TextureView {
        let dimension = match texture.desc.kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        let aspect = if texture.desc.format.is_depth() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(texture.desc.label),
            dimension: Some(dimension),
            aspect,
            base_mip_level: mip.unwrap_or(0),
            mip_level_count: mip.map(|_| 1),
            ..Default::default()
        })
    }

    fn target_view(texture: &GpuTexture, mip: u32, layer: u32) -> wgpu::TextureView {
        texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(texture.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    fn build_pipeline(&self, key: &PipelineKey, label: &'static str) -> CachedPipeline {
        let device = &self.gpu.device;
        let kinds: Vec<InputKind> = key.inputs.iter().map(|i| i.kind).collect();
        let source = shader_source(key.shader, key.write, &kinds);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![
            // Uniforms
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            // Sampler
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for (index, input) in key.inputs.iter().enumerate() {
            let (sample_type, view_dimension) = match input.kind {
                InputKind::Float => (
                    wgpu::TextureSampleType::Float {
                        filterable: input.filterable,
                    },
                    wgpu::TextureViewDimension::D2,
                ),
                InputKind::FloatArray => (
                    wgpu::TextureSampleType::Float {
                        filterable: input.filterable,
                    },
                    wgpu::TextureViewDimension::D2Array,
                ),
                InputKind::Depth => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2,
                ),
                InputKind::DepthArray => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2Array,
                ),
                InputKind::Cube => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_INPUT_BINDING + index as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let color_targets = [key.color.map(|format| wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: if key.write == WriteMask::Color {
                wgpu::ColorWrites::ALL
            } else {
                wgpu::ColorWrites::empty()
            },
        })];

        let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.write == WriteMask::Depth,
            depth_compare: if key.depth_always {
                wgpu::CompareFunction::Always
            } else {
                wgpu::CompareFunction::LessEqual
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &color_targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        log::debug!("built pipeline for {label} ({:?})", key.shader);
        CachedPipeline {
            pipeline,
            bind_group_layout,
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> EffectsResult<TextureId> {
        self.allocate(desc)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&texture).map(|t| &t.desc)
    }

    fn pool_texture(
        &mut self,
        label: &'static str,
        size: [u32; 2],
        format: TextureFormat,
    ) -> EffectsResult<TextureId> {
        if let Some(slot) = self
            .pool
            .iter_mut()
            .find(|s| !s.in_use && s.size == size && s.format == format)
        {
            slot.in_use = true;
            return Ok(slot.id);
        }
        let id = self.allocate(&TextureDesc::d2(label, size, format))?;
        self.pool.push(PoolSlot {
            id,
            size,
            format,
            in_use: true,
        });
        Ok(id)
    }

    fn release_pool(&mut self) {
        let idle: Vec<TextureId> = self
            .pool
            .iter()
            .filter(|s| !s.in_use)
            .map(|s| s.id)
            .collect();
        self.pool.retain(|s| s.in_use);
        for id in idle {
            self.destroy_texture(id);
        }
        for slot in &mut self.pool {
            slot.in_use = false;
        }
    }

    fn create_framebuffer(
        &mut self,
        label: &'static str,
        attachments: &[Option<Attachment>],
    ) -> EffectsResult<FramebufferId> {
        for attachment in attachments.iter().flatten() {
            if !self.textures.contains_key(&attachment.texture) {
                return Err(EffectsError::UnknownTexture(attachment.texture));
            }
        }
        let id = FramebufferId(self.ids.next());
        self.framebuffers.insert(
            id,
            Framebuffer {
                label,
                slots: attachments.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
        mip: u32,
    ) -> EffectsResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(EffectsError::UnknownTexture(texture));
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(EffectsError::UnknownFramebuffer(framebuffer))?;
        if fb.slots.len() <= slot {
            fb.slots.resize(slot + 1, None);
        }
        fb.slots[slot] = Some(Attachment { texture, mip });
        Ok(())
    }

    fn detach_texture(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
    ) -> EffectsResult<()> {
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(EffectsError::UnknownFramebuffer(framebuffer))?;
        for slot in fb.slots.iter_mut() {
            if slot.is_some_and(|a| a.texture == texture) {
                *slot = None;
            }
        }
        Ok(())
    }

    fn create_shader(&mut self, kind: ShaderKind) -> EffectsResult<ShaderId> {
        let id = ShaderId(self.ids.next());
        self.shaders.insert(id, kind);
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_pass(&mut self, desc: &PassDesc) -> EffectsResult<PassId> {
        if !self.shaders.contains_key(&desc.shader) {
            return Err(EffectsError::UnknownShader(desc.shader));
        }
        let id = PassId(self.ids.next());
        self.passes.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_pass(&mut self, pass: PassId) {
        self.passes.remove(&pass);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> EffectsResult<()> {
        let desc = self
            .passes
            .get(&call.pass)
            .ok_or(EffectsError::UnknownPass(call.pass))?;
        let shader = *self
            .shaders
            .get(&desc.shader)
            .ok_or(EffectsError::UnknownShader(desc.shader))?;
        let fb = self
            .framebuffers
            .get(&call.target)
            .ok_or(EffectsError::UnknownFramebuffer(call.target))?;
        let color = fb.slots.get(COLOR_SLOT).copied().flatten();
        let depth = fb.slots.get(DEPTH_SLOT).copied().flatten();
        if color.is_none() && depth.is_none() {
            return Err(EffectsError::device(format!(
                "framebuffer {} ({}) has no attachments",
                call.target, fb.label
            )));
        }

        let color_tex = match color {
            Some(a) => Some((
                self.textures
                    .get(&a.texture)
                    .ok_or(EffectsError::UnknownTexture(a.texture))?,
                a.mip,
            )),
            None => None,
        };
        let depth_tex = match depth {
            Some(a) => Some((
                self.textures
                    .get(&a.texture)
                    .ok_or(EffectsError::UnknownTexture(a.texture))?,
                a.mip,
            )),
            None => None,
        };

        let mut inputs = Vec::with_capacity(call.inputs.len());
        let mut views = Vec::with_capacity(call.inputs.len());
        for binding in call.inputs {
            let tex = self
                .textures
                .get(&binding.texture)
                .ok_or(EffectsError::UnknownTexture(binding.texture))?;
            inputs.push(InputSig {
                kind: InputKind::of(tex.desc.format, tex.desc.kind),
                filterable: filterable(tex.desc.format),
            });
            views.push(Self::input_view(tex, binding.mip));
        }

        let key = PipelineKey {
            shader,
            write: desc.write,
            depth_always: desc.depth_always,
            inputs,
            color: color_tex.map(|(t, _)| wgpu_format(t.desc.format)),
            depth: depth_tex.map(|(t, _)| wgpu_format(t.desc.format)),
        };
        if !self.pipelines.contains_key(&key) {
            let built = self.build_pipeline(&key, desc.label);
            self.pipelines.insert(key.clone(), built);
        }
        let cached = self
            .pipelines
            .get(&key)
            .ok_or_else(|| EffectsError::device("pipeline cache miss"))?;

        let uniform_buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: bytemuck::cast_slice(&[call.params]),
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
                binding: FIRST_INPUT_BINDING + index as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.label),
            layout: &cached.bind_group_layout,
            entries: &entries,
        });

        let faces = match color_tex {
            Some((t, _)) if t.desc.kind == TextureKind::Cube => desc.instances.clamp(1, 6),
            _ => 1,
        };

        let device = &self.gpu.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("screenfx Encoder"),
            })
        });

        for face in 0..faces {
            let color_view = color_tex.map(|(t, mip)| Self::target_view(t, mip, face));
            let depth_view = depth_tex.map(|(t, mip)| Self::target_view(t, mip, 0));
            let has_stencil = depth_tex
                .is_some_and(|(t, _)| t.desc.format == TextureFormat::Depth24Stencil8);

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &[color_view.as_ref().map(|view| {
                    wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }
                })],
                depth_stencil_attachment: depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: has_stencil.then_some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                0.0,
                0.0,
                call.viewport[0] as f32,
                call.viewport[1] as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&cached.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, face..face + 1);
        }
        Ok(())
    }
}
