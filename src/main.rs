use winit::event::VirtualKeyCode;

use cinder::camera::{CameraInput, CameraMotion, CameraState};
use cinder::command_queue::{CommandQueue, FLUSH_TIMEOUT};
use cinder::fps_estimator::FpsEstimator;
use cinder::framework::{self, Game, GpuContext};
use cinder::particle_system::ComputeLocals;
use cinder::render::ParticleRenderer;
use cinder::sim_params::SimParams;

gflags::define! {
    --config: &str = "demo_config.toml"
}

fn load_params() -> SimParams {
    match std::fs::read_to_string(CONFIG.flag) {
        Ok(serialized) => match serialized.parse() {
            Ok(params) => params,
            Err(e) => {
                log::error!("Bad config {}: {:?}", CONFIG.flag, e);
                cinder::sim_params::get_params_from_default_file()
            }
        },
        Err(_) => {
            log::info!("No config at {}, using embedded defaults", CONFIG.flag);
            cinder::sim_params::get_params_from_default_file()
        }
    }
}

/// Everything a key press can do. Bindings are a flat table so the mapping
/// is inspectable in one place.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    CameraForward,
    CameraBack,
    CameraLeft,
    CameraRight,
    CameraUp,
    CameraDown,
    ToggleCompute,
    ToggleVsync,
    ToggleIndirect,
}

const KEY_BINDINGS: &[(VirtualKeyCode, Action)] = &[
    (VirtualKeyCode::W, Action::CameraForward),
    (VirtualKeyCode::S, Action::CameraBack),
    (VirtualKeyCode::A, Action::CameraLeft),
    (VirtualKeyCode::D, Action::CameraRight),
    (VirtualKeyCode::E, Action::CameraUp),
    (VirtualKeyCode::Q, Action::CameraDown),
    (VirtualKeyCode::Space, Action::ToggleCompute),
    (VirtualKeyCode::V, Action::ToggleVsync),
    (VirtualKeyCode::I, Action::ToggleIndirect),
];

fn lookup_action(key: VirtualKeyCode) -> Option<Action> {
    KEY_BINDINGS
        .iter()
        .find(|(bound, _)| *bound == key)
        .map(|(_, action)| *action)
}

struct ParticleDemo {
    locals: ComputeLocals,
    renderer: ParticleRenderer,

    compute_queue: CommandQueue,
    direct_queue: CommandQueue,
    /// Direct-queue fence for each ring slot's last frame, 0 before first
    /// use (issued fences start at 1).
    frame_fences: Vec<u64>,
    frame_number: u64,

    camera: CameraState,
    camera_input: CameraInput,
    camera_motion: CameraMotion,
    fps: FpsEstimator,
    frame_dt: f32,

    use_compute: bool,
    vsync: bool,
}

impl ParticleDemo {
    fn flush_queues(&mut self) -> anyhow::Result<()> {
        self.compute_queue.flush()?;
        self.direct_queue.flush()?;
        for fence in &mut self.frame_fences {
            *fence = 0;
        }
        Ok(())
    }
}

impl Game for ParticleDemo {
    fn load_content(context: &GpuContext) -> anyhow::Result<Self> {
        let params = load_params();
        log::info!("Simulation params: {:?}", params);

        let locals = ComputeLocals::new(&context.device, &params, rand::random());
        let renderer = ParticleRenderer::init(&context.config, &context.device, &locals);
        let compute_queue = CommandQueue::new(
            context.device.clone(),
            context.queue.clone(),
            "compute",
        );
        let direct_queue = CommandQueue::new(
            context.device.clone(),
            context.queue.clone(),
            "direct",
        );
        let vsync = params.vsync;
        Ok(ParticleDemo {
            locals,
            renderer,
            compute_queue,
            direct_queue,
            frame_fences: vec![0; params.buffer_count as usize],
            frame_number: 0,
            camera: CameraState::default(),
            camera_input: CameraInput::default(),
            camera_motion: CameraMotion::default(),
            fps: FpsEstimator::new(params.fps),
            frame_dt: 0.0,
            use_compute: true,
            vsync,
        })
    }

    fn on_resize(&mut self, context: &GpuContext) -> anyhow::Result<()> {
        self.flush_queues()?;
        self.renderer.resize(&context.device, &context.config);
        Ok(())
    }

    fn on_key_event(&mut self, key: VirtualKeyCode, pressed: bool) {
        let action = match lookup_action(key) {
            Some(action) => action,
            None => return,
        };
        match action {
            Action::CameraForward => self.camera_input.forward = pressed,
            Action::CameraBack => self.camera_input.back = pressed,
            Action::CameraLeft => self.camera_input.left = pressed,
            Action::CameraRight => self.camera_input.right = pressed,
            Action::CameraUp => self.camera_input.up = pressed,
            Action::CameraDown => self.camera_input.down = pressed,
            Action::ToggleCompute if pressed => {
                // Settle in-flight work before freezing or thawing the
                // simulation.
                if let Err(e) = self.flush_queues() {
                    log::error!("Flush failed: {:?}", e);
                }
                self.use_compute = !self.use_compute;
                log::info!("Compute enabled: {}", self.use_compute);
            }
            Action::ToggleVsync if pressed => {
                self.vsync = !self.vsync;
                log::info!("Vsync: {}", self.vsync);
            }
            Action::ToggleIndirect if pressed => {
                self.locals.params.use_indirect_draw = !self.locals.params.use_indirect_draw;
                log::info!("Indirect draw: {}", self.locals.params.use_indirect_draw);
            }
            _ => {}
        }
    }

    fn on_mouse_wheel(&mut self, delta: f32) {
        self.camera.zoom(delta);
    }

    fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::Immediate
        }
    }

    fn on_update(&mut self, _context: &GpuContext) -> anyhow::Result<()> {
        self.frame_dt = self.fps.tick().as_secs_f32();
        self.camera
            .update(self.frame_dt, &self.camera_input, &self.camera_motion);
        Ok(())
    }

    fn on_render(&mut self, context: &GpuContext, target: &wgpu::TextureView) -> anyhow::Result<()> {
        let dt = self.frame_dt;
        let slot = (self.frame_number % self.locals.params.buffer_count as u64) as u32;

        // This slot's previous frame must be off the GPU before its staged
        // buffers are overwritten.
        let fence = self.frame_fences[slot as usize];
        if fence != 0 {
            self.direct_queue.wait_until(fence, FLUSH_TIMEOUT)?;
        }

        if self.use_compute {
            let compute_slot = self.compute_queue.acquire_slot();
            let mut encoder =
                context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Compute frame"),
                    });
            self.locals.update_state(&context.device, &mut encoder, dt);
            self.locals.compute(&mut encoder, slot);
            let compute_fence = self.compute_queue.submit(encoder, compute_slot);
            self.direct_queue.wait_for(&self.compute_queue, compute_fence);
        }

        let render_slot = self.direct_queue.acquire_slot();
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render frame"),
            });
        self.renderer.update_camera(
            &context.device,
            &mut encoder,
            &self.camera,
            context.aspect(),
            self.locals.params.particle_lifetime,
        );
        self.renderer.render(&mut encoder, target, slot, &self.locals);
        self.frame_fences[slot as usize] = self.direct_queue.submit(encoder, render_slot);

        self.frame_number += 1;

        // Opportunistically retire completed fences.
        self.compute_queue.pump();
        self.direct_queue.pump();
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    framework::run::<ParticleDemo>("Particles")
}
