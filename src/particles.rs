// This must match the Particle struct defined in the compute and render
// shaders, including the trailing pad that rounds the stride up to the
// vec4 alignment WGSL gives the struct.
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Particle {
    pub position: [f32; 4],
    pub velocity: [f32; 4],
    pub acceleration: [f32; 4],
    pub lifetime: f32,
    pub scale: f32,
    pub _pad: [f32; 2],
}

pub const PARTICLE_STRIDE: u64 = std::mem::size_of::<Particle>() as u64;

impl Particle {
    /// Inert slot: zero lifetime makes the simulate pass skip it and the
    /// render pass collapse it to a degenerate quad.
    pub fn inert() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    pub fn is_alive(&self) -> bool {
        self.lifetime > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layout() {
        // Three vec4s plus one scalar quad, no implicit padding.
        assert_eq!(std::mem::size_of::<Particle>(), 64);
        assert_eq!(PARTICLE_STRIDE % 16, 0);
    }

    #[test]
    fn inert_slots_are_dead() {
        assert!(!Particle::inert().is_alive());
    }
}
