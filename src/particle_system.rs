use std::borrow::Cow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::emitter::{EmitPass, SimUniforms};
use crate::particle_buffers::ParticleBuffers;
use crate::sim_params::{dispatch_size, SimParams};
use crate::state_tracker::ResourceState;

// Keep track of the compute members and the per-frame encode logic for the
// particle simulation. Emit and simulate share one bind group layout; the
// two bind groups differ only in which side of the alive ping-pong they
// append to. Emit pushes to the current list, simulate rebuilds the write
// list, and the frame epilogue copies write over current.
pub struct ComputeLocals {
    pub params: SimParams,
    pub buffers: ParticleBuffers,

    uniform_buffer: wgpu::Buffer,
    emit_bind_group: wgpu::BindGroup,
    simulate_bind_group: wgpu::BindGroup,
    args_bind_group: wgpu::BindGroup,

    emit_pass: EmitPass,
    simulate_pipeline: wgpu::ComputePipeline,
    args_pipeline: wgpu::ComputePipeline,

    total_time: f32,
    rng: StdRng,
}

fn storage_entry(binding: u32, min_size: wgpu::BufferAddress) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(min_size),
        },
        count: None,
    }
}

impl ComputeLocals {
    pub fn new(device: &wgpu::Device, params: &SimParams, seed: u64) -> Self {
        let buffers = ParticleBuffers::new(device, params);

        let uniform_size = std::mem::size_of::<SimUniforms>() as wgpu::BufferAddress;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim uniforms"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sim_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sim bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(uniform_size),
                    },
                    count: None,
                },
                storage_entry(1, buffers.pool_size()),
                storage_entry(2, buffers.alive_list_size()),
                storage_entry(3, 4),
                storage_entry(4, buffers.alive_list_size()),
                storage_entry(5, 4),
            ],
        });

        let make_sim_bind_group = |label: &str, list: &wgpu::Buffer, counter: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &sim_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.particle_pool.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: list.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: counter.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: buffers.dead_list.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: buffers.dead_counter.buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let emit_bind_group = make_sim_bind_group(
            "Emit bind group",
            &buffers.alive_lists[0].buffer,
            &buffers.alive_counters[0].buffer,
        );
        let simulate_bind_group = make_sim_bind_group(
            "Simulate bind group",
            &buffers.alive_lists[1].buffer,
            &buffers.alive_counters[1].buffer,
        );

        let emit_pass = EmitPass::new(device, &sim_layout);

        let simulate_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Simulate shader module"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(crate::include_shader!(
                "simulate.wgsl"
            ))),
        });
        let simulate_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Simulate pipeline layout"),
            bind_group_layouts: &[&sim_layout],
            push_constant_ranges: &[],
        });
        let simulate_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Simulate pipeline"),
                layout: Some(&simulate_layout),
                module: &simulate_module,
                entry_point: "simulate_main",
            });

        let args_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw args bind group layout"),
            entries: &[storage_entry(0, 4), storage_entry(1, 16)],
        });
        let args_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw args bind group"),
            layout: &args_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.alive_counters[0].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.draw_args.buffer.as_entire_binding(),
                },
            ],
        });
        let args_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Draw args shader module"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(crate::include_shader!(
                "draw_args.wgsl"
            ))),
        });
        let args_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Draw args pipeline layout"),
                bind_group_layouts: &[&args_layout],
                push_constant_ranges: &[],
            });
        let args_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Draw args pipeline"),
            layout: Some(&args_pipeline_layout),
            module: &args_module,
            entry_point: "args_main",
        });

        ComputeLocals {
            params: *params,
            buffers,
            uniform_buffer,
            emit_bind_group,
            simulate_bind_group,
            args_bind_group,
            emit_pass,
            simulate_pipeline,
            args_pipeline,
            total_time: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Uploads this frame's uniforms through a temp buffer. Encoded before
    /// the compute passes in the same command list.
    pub fn update_state(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        dt: f32,
    ) {
        self.total_time += dt;
        let uniforms = SimUniforms::from_params(
            &self.params,
            dt,
            self.total_time,
            self.params.emit_count_per_frame,
            self.rng.gen(),
        );
        let temp_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim uniform upload"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(
            &temp_buf,
            0,
            &self.uniform_buffer,
            0,
            std::mem::size_of::<SimUniforms>() as wgpu::BufferAddress,
        );
    }

    /// Encodes one frame of simulation. `slot` selects the staged ring
    /// entry this frame snapshots into.
    pub fn compute(&mut self, encoder: &mut wgpu::CommandEncoder, slot: u32) {
        self.buffers.pool_state.transition(ResourceState::UnorderedAccess);
        self.buffers.alive_state.transition(ResourceState::UnorderedAccess);
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Emit pass"),
            });
            self.emit_pass.encode(
                &mut cpass,
                &self.emit_bind_group,
                self.params.emit_count_per_frame,
            );
        }
        // Separate pass so emit's writes land before simulate reads them.
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulate pass"),
            });
            cpass.set_pipeline(&self.simulate_pipeline);
            cpass.set_bind_group(0, &self.simulate_bind_group, &[]);
            cpass.dispatch_workgroups(dispatch_size(self.params.max_particle_count), 1, 1);
        }

        // Snapshot the pool into this frame's ring slot.
        self.buffers.pool_state.transition(ResourceState::CopySrc);
        encoder.copy_buffer_to_buffer(
            &self.buffers.particle_pool.buffer,
            0,
            &self.buffers.staged_pool.buffer,
            self.buffers.pool_slot_offset(slot),
            self.buffers.pool_size(),
        );

        // Ping-pong: the write list becomes next frame's current list, then
        // the stale write counter is cleared for the next simulate pass.
        self.buffers.alive_state.transition(ResourceState::CopyDst);
        encoder.copy_buffer_to_buffer(
            &self.buffers.alive_lists[1].buffer,
            0,
            &self.buffers.alive_lists[0].buffer,
            0,
            self.buffers.alive_list_size(),
        );
        encoder.copy_buffer_to_buffer(
            &self.buffers.alive_counters[1].buffer,
            0,
            &self.buffers.alive_counters[0].buffer,
            0,
            4,
        );
        encoder.copy_buffer_to_buffer(
            &self.buffers.counter_reset.buffer,
            0,
            &self.buffers.alive_counters[1].buffer,
            0,
            4,
        );

        // Snapshot the completed alive list alongside the pool.
        self.buffers.alive_state.transition(ResourceState::CopySrc);
        encoder.copy_buffer_to_buffer(
            &self.buffers.alive_lists[0].buffer,
            0,
            &self.buffers.staged_alive.buffer,
            self.buffers.alive_slot_offset(slot),
            self.buffers.alive_list_size(),
        );

        if self.params.use_indirect_draw {
            self.buffers.args_state.transition(ResourceState::UnorderedAccess);
            {
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Draw args pass"),
                });
                cpass.set_pipeline(&self.args_pipeline);
                cpass.set_bind_group(0, &self.args_bind_group, &[]);
                cpass.dispatch_workgroups(1, 1, 1);
            }
            self.buffers.args_state.transition(ResourceState::ShaderRead);
        }
    }
}
