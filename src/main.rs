// =============================================================================
// API WITHOUT SECRETS - 01 Frame Resources Count
// =============================================================================
//
// Shows how the number of frame resource sets cycled by the renderer affects
// CPU/GPU overlap. Sliders change the pool depth, the scene size and the
// amount of fake CPU work done around command submission.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── FrameResourcesSample   (render passes, pipeline, GUI)    │
// │          └── SampleCommon     (frame flow, timer, mouse)        │
// │                └── VulkanCommon (instance, device, swapchain)   │
// │                      └── FrameResources[pool] (sync, commands)  │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Build the GUI frame, wait for the next frame slot's fence
// 2. Acquire swapchain image, create the slot's framebuffer
// 3. Pre-submit CPU work, record + submit the scene, post-submit CPU work
// 4. Record + submit the GUI, present
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod gui;
mod input;
mod sample;
mod sample_common;
mod timer;
mod tools;

use anyhow::Result;
use ash::vk;
use config::Config;
use sample::FrameResourcesSample;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Logger first so config problems are reported
    init_logging();
    let config = Config::load();
    write_log_banner(&config);
    log::info!("Starting {}", config.window.title);
    log::info!(
        "{}x{}, present mode {}, {} frame resource slots",
        config.window.width,
        config.window.height,
        config.graphics.present_mode,
        config.graphics.frame_resources_pool_size
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.init_error.take().map_or(Ok(()), Err)
}

/// Info level by default, RUST_LOG overrides it
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Truncate the optional log file and stamp it with the session start
fn write_log_banner(config: &Config) {
    if !config.debug.log_to_file {
        return;
    }
    let banner = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&config.debug.log_file)
        .and_then(|mut file| {
            writeln!(file, "# {}", config.window.title)?;
            writeln!(file, "# session started {:?}", std::time::SystemTime::now())
        });
    if let Err(e) = banner {
        log::warn!("Could not write {}: {}", config.debug.log_file, e);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the sample's Vulkan objects go before the
/// window their surface was created for.
struct App {
    sample: Option<FrameResourcesSample>,
    window: Option<Arc<Window>>,
    config: Config,
    is_fullscreen: bool,
    /// Initialization failure, returned from main after the loop exits
    init_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            sample: None,
            window: None,
            config,
            is_fullscreen,
            init_error: None,
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(sample) = self.sample.as_mut() else {
            return;
        };
        if !sample.ready_to_draw() {
            return;
        }

        if let Err(e) = sample.draw() {
            match e.downcast_ref::<vk::Result>() {
                Some(&vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    if let Err(e) = sample.on_window_size_changed() {
                        log::error!("Failed to recreate swapchain: {:#}", e);
                        event_loop.exit();
                    }
                }
                _ => {
                    log::error!("Render error: {:#}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn on_window_size_changed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(sample) = self.sample.as_mut() {
            if let Err(e) = sample.on_window_size_changed() {
                log::error!("Failed to handle window resize: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        self.is_fullscreen = !self.is_fullscreen;
        let mode = self.is_fullscreen.then_some(Fullscreen::Borderless(None));
        window.set_fullscreen(mode);
        log::info!("Fullscreen: {}", self.is_fullscreen);
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_fullscreen(self.is_fullscreen.then_some(Fullscreen::Borderless(None)));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Window creation failed: {}", e);
                self.init_error = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        match FrameResourcesSample::new(&window, &self.config) {
            Ok(sample) => self.sample = Some(sample),
            Err(e) => {
                log::error!("Failed to prepare sample: {:#}", e);
                self.init_error = Some(e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.on_window_size_changed(event_loop);
            }

            WindowEvent::CursorMoved { position, .. } => {
                if let Some(sample) = self.sample.as_mut() {
                    sample.mouse_mut().on_move(position.x as f32, position.y as f32);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(sample) = self.sample.as_mut() {
                    sample.mouse_mut().on_button(button, state);
                }
            }

            WindowEvent::RedrawRequested => self.draw(event_loop),

            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(KeyCode::F11) => self.toggle_fullscreen(),
                    _ => {}
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws so the frame time readouts stay live.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
