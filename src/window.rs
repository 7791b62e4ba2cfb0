//! Window management using winit

use crate::backend::wgpu_backend::WgpuBackend;
use crate::engine::{Engine, EngineError};
use crate::EngineConfig;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use winit::{
    dpi::PhysicalSize,
    error::{EventLoopError, OsError},
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Event loop failed: {0}")]
    EventLoop(#[from] EventLoopError),
    #[error("Failed to create window: {0}")]
    Os(#[from] OsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, WindowError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        Ok(Self {
            window,
            width,
            height,
            resized: false,
            close_requested: false,
        })
    }

    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Shared handle for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since the flag was last cleared
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Track size and close requests
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Open a window, build a wgpu engine for it and drive frames until closed.
///
/// `setup` runs once before the first frame (load scenes, attach a display).
/// `on_frame` runs every frame before the engine renders, while the frame's
/// input snapshot is still current.
pub fn run<S, F>(config: EngineConfig, setup: S, mut on_frame: F) -> Result<(), WindowError>
where
    S: FnOnce(&mut Engine<WgpuBackend>) -> Result<(), EngineError>,
    F: FnMut(&mut Engine<WgpuBackend>, &mut Window, f32) + 'static,
{
    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let mut engine = Engine::with_window(window.window_arc(), config)?;
    setup(&mut engine)?;

    let drops = engine.drop_slot();
    let mut last_frame = Instant::now();

    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);
                engine.input_mut().handle_window_event(&event);

                match event {
                    WindowEvent::Resized(size) => engine.resize(size.width, size.height),
                    WindowEvent::DroppedFile(path) => {
                        log::info!("Dropped {:?}", path);
                        drops.offer(path);
                    }
                    WindowEvent::CloseRequested => {
                        engine.shutdown();
                        elwt.exit();
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if window.should_close() {
                    return;
                }
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                on_frame(&mut engine, &mut window, dt);
                if let Err(err) = engine.frame(dt) {
                    log::error!("Frame failed: {}", err);
                }
                window.clear_resize_flag();
                window.request_redraw();
            }
            _ => {}
        }
    })?;
    Ok(())
}
