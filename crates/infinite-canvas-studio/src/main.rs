use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use infinite_canvas::logging::{init_logging, LoggingConfig};
use infinite_canvas::{
    AntiAliasingType, Circle, CircleConfig, Environment, InfiniteCanvas, InfiniteCanvasConfig,
    RendererKind, Shape,
};

/// Command line: `infinite-canvas-studio [webgl|webgpu] [shader-compiler-path]`.
#[derive(Debug, Clone)]
struct StudioArgs {
    renderer: RendererKind,
    shader_compiler_path: String,
}

impl StudioArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let renderer = match args.next() {
            Some(kind) => kind.parse().context("invalid renderer argument")?,
            None => RendererKind::default(),
        };
        Ok(Self {
            renderer,
            shader_compiler_path: args.next().unwrap_or_default(),
        })
    }
}

struct Studio {
    args: StudioArgs,
    window: Option<Arc<Window>>,
    canvas: Option<InfiniteCanvas>,
}

impl Studio {
    fn new(args: StudioArgs) -> Self {
        Self {
            args,
            window: None,
            canvas: None,
        }
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("infinite canvas")
            .with_inner_size(LogicalSize::new(800.0, 600.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let config = InfiniteCanvasConfig::new(Rc::new(window.clone()))
            .with_renderer(self.args.renderer)
            .with_shader_compiler_path(self.args.shader_compiler_path.clone())
            .with_environment(Environment::from_window(&window));

        let mut canvas = pollster::block_on(InfiniteCanvas::new(config))?;
        for (i, anti_aliasing) in AntiAliasingType::ALL.into_iter().enumerate() {
            let circle = Circle::new(CircleConfig {
                anti_aliasing,
                cx: 120.0 + 180.0 * i as f32,
                cy: 300.0,
                r: 80.0,
                fill: "rgba(0, 102, 255, 0.85)".to_owned(),
            })?;
            canvas.append_child(Shape::from(circle).into_shared());
        }

        window.request_redraw();
        self.window = Some(window);
        self.canvas = Some(canvas);
        Ok(())
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(canvas) = self.canvas.take() {
            canvas.destroy();
        }
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.open(event_loop) {
            log::error!("failed to start studio: {e:#}");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let (Some(window), Some(canvas)) = (self.window.as_ref(), self.canvas.as_ref()) else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => self.close(event_loop),

            WindowEvent::Resized(size) => {
                let logical = size.to_logical::<f32>(window.scale_factor());
                canvas.resize(logical.width, logical.height);
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                canvas.render();
                window.request_redraw();
            }

            _ => {}
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let args = StudioArgs::parse(std::env::args().skip(1))?;
    log::info!("starting studio with {} renderer", args.renderer);

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(args);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    Ok(())
}
