use wgpu::util::DeviceExt;

use crate::coords::ScissorRect;
use crate::render::{RenderCtx, RenderTarget};

use super::common::{
    premul_alpha_blend, QuadInstance, QuadVertex, QUAD_INDICES, QUAD_VERTICES, TEXTURE_FORMAT,
};

/// Address mode a texture is bound with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum SamplerKind {
    /// Images and render targets.
    Clamp,
    /// Tiling handles; both axes wrap.
    Repeat,
}

/// One quad with its texture binding and device-pixel scissor.
pub(super) struct QuadDraw<'a> {
    pub bind_group: &'a wgpu::BindGroup,
    pub instance: QuadInstance,
    pub scissor: ScissorRect,
}

/// Draws sharing one render pass; `load` is applied when the pass begins.
pub(super) struct Segment<'a> {
    pub load: wgpu::LoadOp<wgpu::Color>,
    pub draws: Vec<QuadDraw<'a>>,
}

/// Instanced textured-quad renderer.
///
/// Solid fills sample a 1×1 white texture with the fill color as tint, so a
/// single pipeline serves every draw call.
#[derive(Default)]
pub(super) struct QuadRenderer {
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,

    clamp_sampler: Option<wgpu::Sampler>,
    repeat_sampler: Option<wgpu::Sampler>,

    quad_vbo: Option<wgpu::Buffer>,
    quad_ibo: Option<wgpu::Buffer>,

    instance_vbo: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl QuadRenderer {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Bind group sampling `view` with the given address mode.
    pub(super) fn bind_texture(
        &mut self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
        kind: SamplerKind,
    ) -> wgpu::BindGroup {
        let layout = self.ensure_layout(device).clone();
        let sampler = self.ensure_sampler(device, kind);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strata quad bind group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Encodes `segments` into `target`, one render pass per segment.
    pub(super) fn render(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        segments: &[Segment<'_>],
    ) {
        self.ensure_pipeline(ctx.device);
        self.ensure_static_buffers(ctx.device);

        let instances: Vec<QuadInstance> =
            segments.iter().flat_map(|s| s.draws.iter().map(|d| d.instance)).collect();
        if !instances.is_empty() {
            self.ensure_instance_capacity(ctx.device, instances.len());
            if let Some(instance_vbo) = self.instance_vbo.as_ref() {
                ctx.queue.write_buffer(instance_vbo, 0, bytemuck::cast_slice(&instances));
            }
        }

        let Some(pipeline) = self.pipeline.as_ref() else { return };
        let Some(quad_vbo) = self.quad_vbo.as_ref() else { return };
        let Some(quad_ibo) = self.quad_ibo.as_ref() else { return };

        let mut base = 0u32;
        for segment in segments {
            let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("strata quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: segment.load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let Some(instance_vbo) = self.instance_vbo.as_ref() else {
                continue;
            };
            if segment.draws.is_empty() {
                continue;
            }

            rpass.set_pipeline(pipeline);
            rpass.set_vertex_buffer(0, quad_vbo.slice(..));
            rpass.set_vertex_buffer(1, instance_vbo.slice(..));
            rpass.set_index_buffer(quad_ibo.slice(..), wgpu::IndexFormat::Uint16);

            for draw in &segment.draws {
                let s = draw.scissor;
                rpass.set_bind_group(0, draw.bind_group, &[]);
                rpass.set_scissor_rect(s.x, s.y, s.width, s.height);
                rpass.draw_indexed(0..6, 0, base..base + 1);
                base += 1;
            }
        }
    }

    fn ensure_layout(&mut self, device: &wgpu::Device) -> &wgpu::BindGroupLayout {
        self.bind_group_layout.get_or_insert_with(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("strata quad bgl"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            })
        })
    }

    fn ensure_sampler(&mut self, device: &wgpu::Device, kind: SamplerKind) -> &wgpu::Sampler {
        let (slot, mode, label) = match kind {
            SamplerKind::Clamp => {
                (&mut self.clamp_sampler, wgpu::AddressMode::ClampToEdge, "strata clamp sampler")
            }
            SamplerKind::Repeat => {
                (&mut self.repeat_sampler, wgpu::AddressMode::Repeat, "strata repeat sampler")
            }
        };
        // Nearest filtering keeps output identical to the software backend.
        slot.get_or_insert_with(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: mode,
                address_mode_v: mode,
                address_mode_w: mode,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            })
        })
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device) {
        if self.pipeline.is_some() {
            return;
        }
        let bind_group_layout = self.ensure_layout(device).clone();

        let shader_src = include_str!("shaders/quad.wgsl");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("strata quad shader"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strata quad pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("strata quad pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), QuadInstance::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipeline = Some(pipeline);
    }

    fn ensure_static_buffers(&mut self, device: &wgpu::Device) {
        if self.quad_vbo.is_some() && self.quad_ibo.is_some() {
            return;
        }

        self.quad_vbo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strata quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        }));

        self.quad_ibo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strata quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        }));
    }

    fn ensure_instance_capacity(&mut self, device: &wgpu::Device, required_instances: usize) {
        if required_instances <= self.instance_capacity && self.instance_vbo.is_some() {
            return;
        }

        let new_cap = required_instances.next_power_of_two().max(64);
        let new_size = (new_cap * std::mem::size_of::<QuadInstance>()) as u64;

        self.instance_vbo = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata quad instance vbo"),
            size: new_size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = new_cap;
    }
}
