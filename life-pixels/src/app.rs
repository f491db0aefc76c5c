use life_engine::{Random, SimConfig, SimError, SimulationController, Snapshot};
use pixels::wgpu::Color;
use pixels::{Pixels, PixelsBuilder, SurfaceTexture, TextureError};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Cursor, CursorIcon, Window, WindowId};

const WINDOW_TITLE: &str = "Conway's Game of Life";
const LIVE_COLOR: [u8; 4] = [0x00, 0xff, 0x88, 0xff];
const DEAD_COLOR: [u8; 4] = [0x22, 0x22, 0x22, 0xff];
const BACKGROUND_COLOR: Color = Color {
    r: 0.2,
    g: 0.2,
    b: 0.2,
    a: 1.0,
};
const SPEED_STEP_MILLIS: u64 = 25;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to start the tokio runtime")]
    Runtime(#[from] std::io::Error),

    #[error("event loop failed")]
    EventLoop(#[from] EventLoopError),

    #[error("failed to create window")]
    Window(#[from] OsError),

    #[error("failed to render")]
    Pixels(#[from] pixels::Error),

    #[error("failed to resize surface")]
    Texture(#[from] TextureError),

    #[error("simulation error")]
    Sim(#[from] SimError),
}

/// Opens a window on the simulation and runs until it is closed.
pub fn run(config: SimConfig, cell_pixel_width: u32) -> Result<(), AppError> {
    let runtime = Runtime::new()?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut handler = AppEventHandler::new(config, cell_pixel_width, runtime.handle().clone());
    event_loop.run_app(&mut handler)?;
    match handler.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct App {
    controller: SimulationController,
    window: Arc<Window>,
    pixels: Pixels<'static>,
    cursor: Option<PhysicalPosition<f64>>,
}

impl App {
    fn new(
        event_loop: &ActiveEventLoop,
        config: SimConfig,
        cell_pixel_width: u32,
        runtime: Handle,
    ) -> Result<Self, AppError> {
        let window_side = config.grid_size * cell_pixel_width;
        let window = Arc::new(Self::build_window(event_loop, window_side)?);
        let pixels = Self::build_pixels(&window, config.grid_size)?;

        let mut controller = SimulationController::with_runtime(config, runtime, Random::new())?;
        let redraw_window = Arc::clone(&window);
        controller.set_listener(move || redraw_window.request_redraw());
        controller.randomize();

        Ok(Self {
            controller,
            window,
            pixels,
            cursor: None,
        })
    }

    fn build_window(event_loop: &ActiveEventLoop, side: u32) -> Result<Window, AppError> {
        let window_attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(side, side))
            .with_min_inner_size(PhysicalSize::new(side / 4, side / 4))
            .with_cursor(Cursor::Icon(CursorIcon::Crosshair))
            .with_visible(false);
        Ok(event_loop.create_window(window_attributes)?)
    }

    fn build_pixels(window: &Arc<Window>, grid_size: u32) -> Result<Pixels<'static>, AppError> {
        let window_size = window.inner_size();
        let surface_texture =
            SurfaceTexture::new(window_size.width, window_size.height, window.clone());
        Ok(PixelsBuilder::new(grid_size, grid_size, surface_texture)
            .clear_color(BACKGROUND_COLOR)
            .build()?)
    }

    fn on_create(&mut self) {
        self.window.request_redraw();
        self.window.set_visible(true);
    }

    fn on_key(&mut self, code: KeyCode) {
        let controller = &mut self.controller;
        match code {
            KeyCode::Space => {
                if controller.is_running() {
                    controller.pause();
                } else {
                    controller.start();
                }
            }
            KeyCode::KeyR => controller.randomize(),
            KeyCode::KeyC => controller.clear(),
            KeyCode::ArrowUp => {
                let speed = controller.speed_millis().saturating_sub(SPEED_STEP_MILLIS);
                controller.set_speed(speed);
            }
            KeyCode::ArrowDown => {
                let speed = controller.speed_millis().saturating_add(SPEED_STEP_MILLIS);
                controller.set_speed(speed);
            }
            _ => (),
        }
    }

    fn on_click(&mut self) -> Result<(), AppError> {
        let Some(position) = self.cursor else {
            return Ok(());
        };
        // Clicks in the letterbox margin land outside the grid.
        if let Ok((col, row)) = self
            .pixels
            .window_pos_to_pixel((position.x as f32, position.y as f32))
        {
            self.controller.toggle_cell(row as u32, col as u32)?;
        }
        Ok(())
    }

    fn on_resize(&mut self, size: PhysicalSize<u32>) -> Result<(), AppError> {
        if size.width > 0 && size.height > 0 {
            self.pixels.resize_surface(size.width, size.height)?;
            self.window.request_redraw();
        }
        Ok(())
    }

    fn on_redraw(&mut self) -> Result<(), AppError> {
        let snapshot = self.controller.snapshot();
        let screen = self.pixels.frame_mut();
        debug_assert_eq!(screen.len(), 4 * snapshot.grid.num_cells());

        for (&alive, pixel) in snapshot.grid.cells_iter().zip(screen.chunks_exact_mut(4)) {
            pixel.copy_from_slice(if alive { &LIVE_COLOR } else { &DEAD_COLOR });
        }
        self.window.set_title(&status_title(&snapshot));
        self.pixels.render()?;
        Ok(())
    }
}

fn status_title(snapshot: &Snapshot) -> String {
    let run_state = if snapshot.is_running() {
        "Running"
    } else {
        "Paused"
    };
    format!(
        "{WINDOW_TITLE} | Generation: {} | Living Cells: {} | {run_state} | {} ms ({:.1} gen/s)",
        snapshot.generation,
        snapshot.live_cells(),
        snapshot.speed_millis,
        snapshot.generations_per_second()
    )
}

struct AppEventHandler {
    config: SimConfig,
    cell_pixel_width: u32,
    runtime: Handle,
    app: Option<App>,
    error: Option<AppError>,
}

impl AppEventHandler {
    fn new(config: SimConfig, cell_pixel_width: u32, runtime: Handle) -> Self {
        Self {
            config,
            cell_pixel_width,
            runtime,
            app: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        self.error.get_or_insert(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for AppEventHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        match App::new(
            event_loop,
            self.config,
            self.cell_pixel_width,
            self.runtime.clone(),
        ) {
            Ok(mut app) => {
                app.on_create();
                self.app = Some(app);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(app) = self.app.as_mut() else {
            return;
        };
        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Released,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                match code {
                    KeyCode::Escape | KeyCode::KeyQ => event_loop.exit(),
                    _ => app.on_key(code),
                }
                Ok(())
            }
            WindowEvent::CursorMoved { position, .. } => {
                app.cursor = Some(position);
                Ok(())
            }
            WindowEvent::CursorLeft { .. } => {
                app.cursor = None;
                Ok(())
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => app.on_click(),
            WindowEvent::Resized(size) => app.on_resize(size),
            WindowEvent::RedrawRequested => app.on_redraw(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }
}
