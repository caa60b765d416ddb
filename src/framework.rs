use std::sync::Arc;

use winit::{
    event::{self, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
};

use crate::error::RenderError;

gflags::define! {
    --log_filter: &str = "warn,cinder=info"
}
gflags::define! {
    -h, --help = false
}

/// Device handles and the current surface configuration, shared with the
/// game for the lifetime of the window.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }
}

// "Framework" for a windowed executable.
pub trait Game: 'static + Sized {
    fn load_content(context: &GpuContext) -> anyhow::Result<Self>;

    /// Per-frame CPU update, called before the surface frame is acquired.
    fn on_update(&mut self, context: &GpuContext) -> anyhow::Result<()>;

    /// Called after the surface has been reconfigured. Work in flight
    /// against the old surface size must be flushed here.
    fn on_resize(&mut self, context: &GpuContext) -> anyhow::Result<()>;

    fn on_render(
        &mut self,
        context: &GpuContext,
        target: &wgpu::TextureView,
    ) -> anyhow::Result<()>;

    fn on_key_event(&mut self, key: event::VirtualKeyCode, pressed: bool);

    fn on_mouse_wheel(&mut self, delta: f32) {
        let _ = delta;
    }

    /// Polled every frame; the framework reconfigures the surface when the
    /// requested mode changes.
    fn present_mode(&self) -> wgpu::PresentMode {
        wgpu::PresentMode::Fifo
    }
}

async fn run_async<G: Game>(title: &str) -> anyhow::Result<()> {
    gflags::parse();
    if HELP.flag {
        gflags::print_help_and_exit(0);
    }
    scrub_log::init_with_filter_string(LOG_FILTER.flag)?;

    let event_loop = EventLoop::new();
    log::info!("Initializing the window...");
    let window = winit::window::WindowBuilder::new()
        .with_title(title)
        .with_inner_size(winit::dpi::Size::from(winit::dpi::LogicalSize::new(
            1280, 720,
        )))
        .build(&event_loop)?;
    let size = window.inner_size();

    let instance = wgpu::Instance::new(wgpu::Backends::PRIMARY);
    let surface = unsafe { instance.create_surface(&window) };

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .ok_or(RenderError::ResourceCreationFailed { what: "adapter" })?;
    log::info!("Adapter: {:?}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::default(),
            },
            None,
        )
        .await?;

    let format = surface
        .get_supported_formats(&adapter)
        .first()
        .copied()
        .ok_or(RenderError::ResourceCreationFailed {
            what: "surface format",
        })?;
    let mut context = GpuContext {
        device: Arc::new(device),
        queue: Arc::new(queue),
        config: wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
        },
    };
    surface.configure(&context.device, &context.config);

    log::info!("Loading content...");
    let mut game = G::load_content(&context)?;

    log::info!("Entering render loop...");
    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            event::Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            }
            | event::Event::WindowEvent {
                event:
                    WindowEvent::ScaleFactorChanged {
                        new_inner_size: &mut size,
                        ..
                    },
                ..
            } => {
                log::info!("Resizing to {:?}", size);
                context.config.width = size.width.max(1);
                context.config.height = size.height.max(1);
                // The game flushes its queues before the surface changes
                // out from under in-flight frames.
                if let Err(e) = game.on_resize(&context) {
                    log::error!("Resize failed: {:?}", e);
                    *control_flow = ControlFlow::Exit;
                    return;
                }
                surface.configure(&context.device, &context.config);
            }
            event::Event::WindowEvent { event, .. } => match event {
                WindowEvent::KeyboardInput {
                    input:
                        event::KeyboardInput {
                            virtual_keycode: Some(event::VirtualKeyCode::Escape),
                            state: event::ElementState::Pressed,
                            ..
                        },
                    ..
                }
                | WindowEvent::CloseRequested => {
                    *control_flow = ControlFlow::Exit;
                }
                WindowEvent::KeyboardInput {
                    input:
                        event::KeyboardInput {
                            virtual_keycode: Some(key),
                            state,
                            ..
                        },
                    ..
                } => {
                    game.on_key_event(key, state == event::ElementState::Pressed);
                }
                WindowEvent::MouseWheel {
                    delta: event::MouseScrollDelta::LineDelta(_, lines),
                    ..
                } => {
                    game.on_mouse_wheel(lines);
                }
                _ => {}
            },
            event::Event::MainEventsCleared => {
                window.request_redraw();
            }
            event::Event::RedrawRequested(_) => {
                if let Err(e) = game.on_update(&context) {
                    log::error!("Update failed: {:?}", e);
                    *control_flow = ControlFlow::Exit;
                    return;
                }

                let wanted = game.present_mode();
                if wanted != context.config.present_mode {
                    log::info!("Present mode: {:?}", wanted);
                    context.config.present_mode = wanted;
                    surface.configure(&context.device, &context.config);
                }

                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                        surface.configure(&context.device, &context.config);
                        return;
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        log::warn!("Surface frame timed out");
                        return;
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        let err = RenderError::DeviceLost {
                            reason: "out of memory acquiring surface frame".to_string(),
                        };
                        log::error!("{}", err);
                        *control_flow = ControlFlow::Exit;
                        return;
                    }
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                if let Err(e) = game.on_render(&context, &view) {
                    log::error!("Render failed: {:?}", e);
                    *control_flow = ControlFlow::Exit;
                    return;
                }
                frame.present();
            }
            _ => {}
        }
    });
}

pub fn run<G: Game>(title: &str) -> anyhow::Result<()> {
    futures::executor::block_on(run_async::<G>(title))
}
