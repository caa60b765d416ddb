use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::camera::CameraState;
use crate::particle_system::ComputeLocals;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// Matches VsUniforms in particle.wgsl.
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct VsUniforms {
    view_proj: [[f32; 4]; 4],
    inv_view: [[f32; 4]; 4],
    lifetime_max: f32,
    _pad: [f32; 3],
}

/// Renders the staged particle snapshots as camera-facing billboards. One
/// bind group per ring slot, each windowing the staged pool and alive list
/// buffers at that slot's offset. The direct pipeline draws every pool slot
/// and relies on zero scale collapsing dead ones; the indirect pipeline
/// draws the alive count the GPU wrote into the args buffer.
pub struct ParticleRenderer {
    uniform_buffer: wgpu::Buffer,
    slot_bind_groups: Vec<wgpu::BindGroup>,
    direct_pipeline: wgpu::RenderPipeline,
    indirect_pipeline: wgpu::RenderPipeline,
    depth_view: wgpu::TextureView,
    clear_color: wgpu::Color,
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth buffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl ParticleRenderer {
    pub fn init(
        config: &wgpu::SurfaceConfiguration,
        device: &wgpu::Device,
        locals: &ComputeLocals,
    ) -> Self {
        let uniform_size = std::mem::size_of::<VsUniforms>() as wgpu::BufferAddress;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Render uniforms"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let read_only_storage = |binding, min_size| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(min_size),
            },
            count: None,
        };
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Render bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(uniform_size),
                        },
                        count: None,
                    },
                    read_only_storage(1, locals.buffers.pool_size()),
                    read_only_storage(2, locals.buffers.alive_list_size()),
                ],
            });

        // One bind group per frame in flight, windowing that slot of the
        // staged rings.
        let slot_bind_groups = (0..locals.params.buffer_count)
            .map(|slot| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Render bind group"),
                    layout: &bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: uniform_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &locals.buffers.staged_pool.buffer,
                                offset: locals.buffers.pool_slot_offset(slot),
                                size: wgpu::BufferSize::new(locals.buffers.pool_size()),
                            }),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &locals.buffers.staged_alive.buffer,
                                offset: locals.buffers.alive_slot_offset(slot),
                                size: wgpu::BufferSize::new(locals.buffers.alive_list_size()),
                            }),
                        },
                    ],
                })
            })
            .collect();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle shader module"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(crate::include_shader!(
                "particle.wgsl"
            ))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, vs_entry: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: vs_entry,
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    // Translucent billboards test depth but don't write it.
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };
        let direct_pipeline = make_pipeline("Particle pipeline (direct)", "vs_direct");
        let indirect_pipeline = make_pipeline("Particle pipeline (indirect)", "vs_indirect");

        let depth_view = create_depth_view(device, config.width, config.height);

        ParticleRenderer {
            uniform_buffer,
            slot_bind_groups,
            direct_pipeline,
            indirect_pipeline,
            depth_view,
            clear_color: wgpu::Color {
                r: 0.8,
                g: 0.2,
                b: 0.1,
                a: 1.0,
            },
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) {
        self.depth_view = create_depth_view(device, config.width, config.height);
    }

    pub fn update_camera(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        camera: &CameraState,
        aspect: f32,
        lifetime_max: f32,
    ) {
        let uniforms = VsUniforms {
            view_proj: camera.view_proj(aspect).into(),
            inv_view: camera.inv_view().into(),
            lifetime_max,
            _pad: [0.0; 3],
        };
        let temp_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Render uniform upload"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(
            &temp_buf,
            0,
            &self.uniform_buffer,
            0,
            std::mem::size_of::<VsUniforms>() as wgpu::BufferAddress,
        );
    }

    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        slot: u32,
        locals: &ComputeLocals,
    ) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: true,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: false,
                }),
                stencil_ops: None,
            }),
        });
        rpass.set_bind_group(0, &self.slot_bind_groups[slot as usize], &[]);
        if locals.params.use_indirect_draw {
            rpass.set_pipeline(&self.indirect_pipeline);
            rpass.draw_indirect(&locals.buffers.draw_args.buffer, 0);
        } else {
            rpass.set_pipeline(&self.direct_pipeline);
            rpass.draw(0..4, 0..locals.params.max_particle_count);
        }
    }
}
