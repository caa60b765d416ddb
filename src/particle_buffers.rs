use wgpu::util::DeviceExt;

use crate::particles::{Particle, PARTICLE_STRIDE};
use crate::sim_params::SimParams;
use crate::state_tracker::{ResourceState, StateTracker};

pub struct SizedBuffer {
    pub buffer: wgpu::Buffer,
    pub size: wgpu::BufferAddress,
}

/// Storage buffer offsets bound with a dynamic range must honor this.
pub const STORAGE_OFFSET_ALIGNMENT: wgpu::BufferAddress = 256;

pub fn align_to(size: wgpu::BufferAddress, alignment: wgpu::BufferAddress) -> wgpu::BufferAddress {
    (size + alignment - 1) / alignment * alignment
}

fn make_storage_buffer(
    device: &wgpu::Device,
    size: wgpu::BufferAddress,
    usage: wgpu::BufferUsages,
    label: &str,
) -> SizedBuffer {
    SizedBuffer {
        buffer: device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        }),
        size,
    }
}

fn make_init_buffer(
    device: &wgpu::Device,
    contents: &[u8],
    usage: wgpu::BufferUsages,
    label: &str,
) -> SizedBuffer {
    SizedBuffer {
        buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        }),
        size: contents.len() as wgpu::BufferAddress,
    }
}

/// All GPU-resident simulation storage. The pool and list buffers are the
/// working set the compute passes mutate; the staged rings hold per-frame
/// snapshots the render passes read, one slot per frame in flight so a
/// frame's compute never stomps a snapshot an earlier frame still draws.
pub struct ParticleBuffers {
    pub particle_pool: SizedBuffer,
    /// [0] read/current list, [1] write list rebuilt by simulate.
    pub alive_lists: [SizedBuffer; 2],
    pub alive_counters: [SizedBuffer; 2],
    pub dead_list: SizedBuffer,
    pub dead_counter: SizedBuffer,
    pub staged_pool: SizedBuffer,
    pub staged_alive: SizedBuffer,
    /// 4 zero bytes, copied over the write counter each frame.
    pub counter_reset: SizedBuffer,
    pub draw_args: SizedBuffer,

    pub pool_state: StateTracker,
    pub alive_state: StateTracker,
    pub args_state: StateTracker,

    pool_slot_stride: wgpu::BufferAddress,
    alive_slot_stride: wgpu::BufferAddress,
}

impl ParticleBuffers {
    pub fn new(device: &wgpu::Device, params: &SimParams) -> Self {
        let n = params.max_particle_count as wgpu::BufferAddress;
        let ring = params.buffer_count as wgpu::BufferAddress;

        let pool_size = n * PARTICLE_STRIDE;
        let list_size = n * 4;
        let pool_slot_stride = align_to(pool_size, STORAGE_OFFSET_ALIGNMENT);
        let alive_slot_stride = align_to(list_size, STORAGE_OFFSET_ALIGNMENT);

        let inert = vec![Particle::inert(); params.max_particle_count as usize];
        let particle_pool = make_init_buffer(
            device,
            bytemuck::cast_slice(&inert),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            "particle_pool",
        );

        let list_usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let alive_lists = [
            make_storage_buffer(device, list_size, list_usage, "alive_list_0"),
            make_storage_buffer(device, list_size, list_usage, "alive_list_1"),
        ];
        let alive_counters = [
            make_init_buffer(device, &[0u8; 4], list_usage, "alive_counter_0"),
            make_init_buffer(device, &[0u8; 4], list_usage, "alive_counter_1"),
        ];

        // Every slot starts on the free list, identity order.
        let identity: Vec<u32> = (0..params.max_particle_count).collect();
        let dead_list = make_init_buffer(
            device,
            bytemuck::cast_slice(&identity),
            wgpu::BufferUsages::STORAGE,
            "dead_list",
        );
        let dead_counter = make_init_buffer(
            device,
            bytemuck::cast_slice(&[params.max_particle_count]),
            wgpu::BufferUsages::STORAGE,
            "dead_counter",
        );

        let staged_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let staged_pool =
            make_storage_buffer(device, pool_slot_stride * ring, staged_usage, "staged_pool");
        let staged_alive = make_storage_buffer(
            device,
            alive_slot_stride * ring,
            staged_usage,
            "staged_alive",
        );

        let counter_reset = make_init_buffer(
            device,
            &[0u8; 4],
            wgpu::BufferUsages::COPY_SRC,
            "counter_reset",
        );
        let draw_args = make_storage_buffer(
            device,
            16,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
            "draw_args",
        );

        ParticleBuffers {
            particle_pool,
            alive_lists,
            alive_counters,
            dead_list,
            dead_counter,
            staged_pool,
            staged_alive,
            counter_reset,
            draw_args,
            pool_state: StateTracker::new("particle_pool", ResourceState::Common),
            alive_state: StateTracker::new("alive_list_0", ResourceState::Common),
            args_state: StateTracker::new("draw_args", ResourceState::Common),
            pool_slot_stride,
            alive_slot_stride,
        }
    }

    pub fn pool_slot_offset(&self, slot: u32) -> wgpu::BufferAddress {
        slot as wgpu::BufferAddress * self.pool_slot_stride
    }

    pub fn alive_slot_offset(&self, slot: u32) -> wgpu::BufferAddress {
        slot as wgpu::BufferAddress * self.alive_slot_stride
    }

    pub fn pool_size(&self) -> wgpu::BufferAddress {
        self.particle_pool.size
    }

    pub fn alive_list_size(&self) -> wgpu::BufferAddress {
        self.alive_lists[0].size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        // 1000 * 4 bytes, the default alive-list footprint.
        assert_eq!(align_to(4000, 256), 4096);
    }
}
