// =============================================================================
// VULKAN TRIANGLE - the smallest complete path from window to pixels
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, close requests)                      │
// │    └── Renderer                                                  │
// │          └── VulkanDevice (instance, surface, GPU, queues)       │
// │                └── Swapchain → RenderPass → Pipeline             │
// │                      └── Framebuffers, command buffer, semaphores│
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (see frame.rs):
// 1. Acquire swapchain image
// 2. Record one 3-vertex draw
// 3. Submit to the graphics queue
// 4. Present
// 5. Wait for the present queue to drain
//
// Any failure, during setup or in a frame, ends the process with a single
// line naming the stage that failed.
//
// =============================================================================

mod backend;
mod config;
mod error;
mod frame;
mod renderer;

use anyhow::{Context, Result};
use config::Config;
use renderer::Renderer;
use std::fs::File;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    if let Err(e) = run() {
        // {:#} keeps the whole context chain on one line
        eprintln!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Load configuration from config.toml; report it once the logger is up
    let (config, source) = Config::load();

    init_logging(&config)?;
    log::info!("Starting triangle renderer");
    source.report(&config);
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => {
            log::info!("Rendered {} frames", app.frames);
            Ok(())
        }
    }
}

/// Initialize logging, optionally redirected to a file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Failed to initialize logger")?;
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Window plus renderer, created once the event loop is running.
///
/// IMPORTANT: Field order matters for Drop! The renderer owns the surface,
/// which must go before the window it was created from.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,

    /// First unrecoverable error; ends the loop
    fatal: Option<anyhow::Error>,
    frames: u64,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
            frames: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        // Window is fixed-size: the swapchain is never rebuilt
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        let renderer = Renderer::new(&window, &self.config)?;
        log::info!("Ready: {} swapchain images", renderer.image_count());

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Record the error and stop the loop
    fn abort(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        // Drop the renderer first so teardown runs before the window closes
        self.renderer = None;
        self.window = None;
        event_loop.exit();
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

        if let Err(e) = self.init(event_loop) {
            self.abort(event_loop, e.context("Failed to initialize Vulkan"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shut_down(event_loop);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                log::info!("ESC pressed, exiting...");
                self.shut_down(event_loop);
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };

                match frame::draw_frame(renderer) {
                    Ok(_) => self.frames += 1,
                    Err(e) => {
                        let e = anyhow::Error::new(e).context(format!("frame {}", self.frames));
                        self.abort(event_loop, e);
                    }
                }
            }

            _ => {}
        }
    }

    /// Keep the frame loop spinning once pending events are handled
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
