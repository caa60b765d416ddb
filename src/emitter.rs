use std::borrow::Cow;

use crate::sim_params::{dispatch_size, SimParams};

// This must match the SimUniforms struct declared in emit.wgsl and
// simulate.wgsl; both passes share one uniform buffer.
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SimUniforms {
    pub position_min: [f32; 4],
    pub position_max: [f32; 4],
    pub velocity_min: [f32; 4],
    pub velocity_max: [f32; 4],
    pub acceleration_min: [f32; 4],
    pub acceleration_max: [f32; 4],
    pub delta_time: f32,
    pub total_time: f32,
    pub emit_count: u32,
    pub max_particle_count: u32,
    pub particle_lifetime: f32,
    pub scale_start: f32,
    pub scale_end: f32,
    pub random_seed: u32,
}

fn vec4_of(v: [f32; 3]) -> [f32; 4] {
    [v[0], v[1], v[2], 0.0]
}

impl SimUniforms {
    pub fn from_params(
        params: &SimParams,
        delta_time: f32,
        total_time: f32,
        emit_count: u32,
        random_seed: u32,
    ) -> Self {
        let r = params.emit_ranges;
        SimUniforms {
            position_min: vec4_of(r.position_min),
            position_max: vec4_of(r.position_max),
            velocity_min: vec4_of(r.velocity_min),
            velocity_max: vec4_of(r.velocity_max),
            acceleration_min: vec4_of(r.acceleration_min),
            acceleration_max: vec4_of(r.acceleration_max),
            delta_time,
            total_time,
            emit_count,
            max_particle_count: params.max_particle_count,
            particle_lifetime: params.particle_lifetime,
            scale_start: params.particle_scale.start,
            scale_end: params.particle_scale.end,
            random_seed,
        }
    }
}

/// Compute pipeline for the emit pass. The bind group layout is shared with
/// the simulate pass and owned by the caller.
pub struct EmitPass {
    pipeline: wgpu::ComputePipeline,
}

impl EmitPass {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Emit shader module"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(crate::include_shader!("emit.wgsl"))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Emit pipeline layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Emit pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "emit_main",
        });
        EmitPass { pipeline }
    }

    pub fn encode<'a>(
        &'a self,
        cpass: &mut wgpu::ComputePass<'a>,
        bind_group: &'a wgpu::BindGroup,
        emit_count: u32,
    ) {
        if emit_count == 0 {
            return;
        }
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, bind_group, &[]);
        cpass.dispatch_workgroups(dispatch_size(emit_count), 1, 1);
    }
}
