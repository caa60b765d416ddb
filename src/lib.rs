pub mod camera;
pub mod command_queue;
pub mod emitter;
pub mod error;
pub mod fps_estimator;
pub mod framework;
pub mod index_list;
pub mod particle_buffers;
pub mod particle_sim;
pub mod particle_system;
pub mod particles;
pub mod render;
pub mod sim_params;
pub mod state_tracker;

/// Embeds a WGSL source file from src/shaders/.
#[macro_export]
macro_rules! include_shader {
    ($path:literal) => {
        include_str!(concat!("shaders/", $path))
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn shaders_are_embedded() {
        assert!(include_shader!("emit.wgsl").contains("emit_main"));
        assert!(include_shader!("simulate.wgsl").contains("simulate_main"));
        assert!(include_shader!("draw_args.wgsl").contains("args_main"));
        assert!(include_shader!("particle.wgsl").contains("fs_main"));
    }
}
