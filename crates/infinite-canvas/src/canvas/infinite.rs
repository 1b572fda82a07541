use std::rc::Rc;

use crate::error::CanvasError;
use crate::plugin::{Hooks, LifecycleContext, Plugin};
use crate::renderer::Renderer;
use crate::shapes::{Renderable, SharedShape};

use super::config::InfiniteCanvasConfig;
use super::handle::CanvasHandle;

/// Plugin-driven canvas holding an ordered list of shapes.
///
/// An instance only exists once every plugin finished its asynchronous
/// initialization, so frames and resizes always reach a ready renderer.
pub struct InfiniteCanvas {
    context: LifecycleContext,
    shapes: Vec<SharedShape>,
}

impl InfiniteCanvas {
    /// Builds a canvas with the default renderer plugin and waits until it
    /// is initialized.
    pub async fn new(config: InfiniteCanvasConfig) -> Result<Self, CanvasError> {
        Self::with_plugins(config, vec![Box::new(Renderer::new())]).await
    }

    /// Builds a canvas with `plugins`, applied in order.
    ///
    /// `init` fires synchronously after every plugin is applied, then the
    /// `init_async` listeners run concurrently; the first failure aborts
    /// construction.
    pub async fn with_plugins(
        config: InfiniteCanvasConfig,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Result<Self, CanvasError> {
        let device_pixel_ratio = config
            .environment
            .resolve_pixel_ratio(config.device_pixel_ratio);

        let mut context = LifecycleContext {
            canvas: config.canvas,
            renderer: config.renderer,
            shader_compiler_path: config.shader_compiler_path,
            device_pixel_ratio,
            environment: config.environment,
            hooks: Hooks::default(),
        };

        log::debug!(
            "applying {} plugin(s), renderer {}, dpr {device_pixel_ratio}",
            plugins.len(),
            context.renderer
        );
        for plugin in plugins {
            plugin.apply(&mut context);
        }

        context.hooks.init.call(());
        context
            .hooks
            .init_async
            .promise(())
            .await
            .map_err(CanvasError::AggregateInit)?;

        log::info!("canvas initialized");
        Ok(Self {
            context,
            shapes: Vec::new(),
        })
    }

    /// Draws one frame: every shape in list order inside a single pass.
    pub fn render(&self) {
        let hooks = &self.context.hooks;
        hooks.begin_frame.call(());
        for shape in &self.shapes {
            hooks.render.call(shape.clone());
        }
        hooks.end_frame.call(());
    }

    /// Resizes to `width`x`height` logical pixels.
    pub fn resize(&self, width: f32, height: f32) {
        self.context.hooks.resize.call((width, height));
    }

    /// Releases every shape, then the plugins' resources.
    pub fn destroy(mut self) {
        for shape in self.shapes.drain(..) {
            shape.borrow_mut().destroy();
        }
        self.context.hooks.destroy.call(());
        log::info!("canvas destroyed");
    }

    /// The drawing surface this canvas renders into.
    pub fn canvas(&self) -> &Rc<dyn CanvasHandle> {
        &self.context.canvas
    }

    pub fn append_child(&mut self, shape: SharedShape) {
        self.shapes.push(shape);
    }

    /// Removes `shape` (by identity). Does nothing if it is not a child.
    pub fn remove_child(&mut self, shape: &SharedShape) {
        if let Some(index) = self.shapes.iter().position(|s| Rc::ptr_eq(s, shape)) {
            self.shapes.remove(index);
        }
    }

    /// Removes every child. Removed shapes keep their device resources until
    /// they are destroyed by their owner.
    pub fn remove_children(&mut self) {
        self.shapes.clear();
    }

    pub fn children(&self) -> &[SharedShape] {
        &self.shapes
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.context
    }

    #[inline]
    pub fn device_pixel_ratio(&self) -> f32 {
        self.context.device_pixel_ratio
    }
}

impl std::fmt::Debug for InfiniteCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfiniteCanvas")
            .field("context", &self.context)
            .field("children", &self.shapes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::canvas::{Environment, RendererKind};
    use crate::gpu::headless::{DeviceCall, HeadlessCanvas, HeadlessContribution, HeadlessProbe};
    use crate::gpu::ResourceHandle;
    use crate::shapes::{AntiAliasingType, Circle, CircleConfig, Shape};

    fn config() -> InfiniteCanvasConfig {
        InfiniteCanvasConfig::new(Rc::new(HeadlessCanvas::new(200, 100)))
    }

    fn headless(config: InfiniteCanvasConfig) -> (InfiniteCanvas, HeadlessProbe) {
        let contribution = HeadlessContribution::new().with_latency(2);
        let probe = contribution.probe();
        let plugins: Vec<Box<dyn Plugin>> =
            vec![Box::new(Renderer::with_contribution(Rc::new(contribution)))];
        let canvas = pollster::block_on(InfiniteCanvas::with_plugins(config, plugins)).unwrap();
        (canvas, probe)
    }

    fn circle(cx: f32, cy: f32, r: f32, fill: &str) -> SharedShape {
        Shape::from(
            Circle::new(CircleConfig {
                cx,
                cy,
                r,
                fill: fill.to_owned(),
                anti_aliasing: AntiAliasingType::Smoothstep,
            })
            .unwrap(),
        )
        .into_shared()
    }

    /// Records hook invocations into a shared log.
    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn apply(self: Box<Self>, context: &mut LifecycleContext) {
            let hooks = &mut context.hooks;
            let name = self.name;

            let log = self.log.clone();
            hooks.init.tap(move |_| log.borrow_mut().push(format!("{name}:init")));
            let log = self.log.clone();
            hooks.init_async.tap_promise(move |_| {
                log.borrow_mut().push(format!("{name}:init_async"));
                async { Ok::<(), anyhow::Error>(()) }
            });
            let log = self.log.clone();
            hooks.begin_frame.tap(move |_| log.borrow_mut().push(format!("{name}:begin")));
            let log = self.log.clone();
            hooks.render.tap(move |shape| {
                let r = shape.borrow().as_circle().map(Circle::r).unwrap_or_default();
                log.borrow_mut().push(format!("{name}:render:{r}"));
            });
            let log = self.log.clone();
            hooks.end_frame.tap(move |_| log.borrow_mut().push(format!("{name}:end")));
            let log = self.log.clone();
            hooks.destroy.tap(move |_| log.borrow_mut().push(format!("{name}:destroy")));
            let log = self.log.clone();
            hooks
                .resize
                .tap(move |(w, h)| log.borrow_mut().push(format!("{name}:resize:{w}x{h}")));
        }
    }

    #[test]
    fn end_to_end_single_circle() {
        let (mut canvas, probe) = headless(config());
        let renderer_allocations = probe.allocations();
        assert_eq!(renderer_allocations, 3);

        canvas.append_child(circle(50.0, 50.0, 25.0, "red"));
        canvas.render();

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BeginFrame)), 1);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::SubmitPass { .. })), 1);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::EndFrame)), 1);
        assert_eq!(
            probe.count(|c| matches!(
                c,
                DeviceCall::DrawIndexed {
                    index_count: 6,
                    instance_count: 1,
                    ..
                }
            )),
            1
        );
        assert_eq!(probe.allocations(), renderer_allocations + 8);

        canvas.render();
        assert_eq!(probe.allocations(), renderer_allocations + 8);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::DrawIndexed { .. })), 2);

        let instances = probe.buffer_labeled("circle instances").unwrap();
        assert_eq!(
            probe.count(|c| matches!(c, DeviceCall::WriteBuffer { buffer, .. } if *buffer == instances)),
            1
        );
    }

    #[test]
    fn teardown_releases_shapes_before_device() {
        let (mut canvas, probe) = headless(config());
        canvas.append_child(circle(50.0, 50.0, 25.0, "red"));
        canvas.render();
        let program = probe
            .calls()
            .into_iter()
            .find_map(|call| match call {
                DeviceCall::CreateProgram { program } => Some(program),
                _ => None,
            })
            .unwrap();

        canvas.destroy();

        let released = probe
            .position(|c| *c == DeviceCall::Destroy { resource: ResourceHandle::from(program) })
            .unwrap();
        let device_destroyed = probe.position(|c| matches!(c, DeviceCall::DestroyDevice)).unwrap();
        assert!(released < device_destroyed);
        assert!(probe.leaks().is_empty());
        assert_eq!(probe.live_count(), 0);
    }

    #[test]
    fn shapes_render_in_list_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(Recorder {
            name: "a",
            log: log.clone(),
        })];
        let mut canvas = pollster::block_on(InfiniteCanvas::with_plugins(config(), plugins)).unwrap();

        canvas.append_child(circle(0.0, 0.0, 1.0, "red"));
        canvas.append_child(circle(0.0, 0.0, 2.0, "red"));
        canvas.append_child(circle(0.0, 0.0, 3.0, "red"));
        log.borrow_mut().clear();
        canvas.render();

        assert_eq!(
            *log.borrow(),
            ["a:begin", "a:render:1", "a:render:2", "a:render:3", "a:end"]
        );
    }

    #[test]
    fn plugins_observe_hooks_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let plugins: Vec<Box<dyn Plugin>> = vec![
            Box::new(Recorder {
                name: "first",
                log: log.clone(),
            }),
            Box::new(Recorder {
                name: "second",
                log: log.clone(),
            }),
        ];
        let canvas = pollster::block_on(InfiniteCanvas::with_plugins(config(), plugins)).unwrap();
        canvas.resize(10.0, 20.0);
        canvas.destroy();

        assert_eq!(
            *log.borrow(),
            [
                "first:init",
                "second:init",
                "first:init_async",
                "second:init_async",
                "first:resize:10x20",
                "second:resize:10x20",
                "first:destroy",
                "second:destroy",
            ]
        );
    }

    #[test]
    fn child_list_mutation() {
        let (mut canvas, _probe) = headless(config());
        let a = circle(0.0, 0.0, 1.0, "red");
        let b = circle(0.0, 0.0, 1.0, "red");
        let c = circle(0.0, 0.0, 1.0, "red");

        canvas.append_child(a.clone());
        canvas.append_child(b.clone());
        canvas.append_child(c.clone());

        canvas.remove_child(&b);
        assert_eq!(canvas.children().len(), 2);
        assert!(Rc::ptr_eq(&canvas.children()[0], &a));
        assert!(Rc::ptr_eq(&canvas.children()[1], &c));

        // Equal attributes but a different shape: not a child.
        canvas.remove_child(&circle(0.0, 0.0, 1.0, "red"));
        assert_eq!(canvas.children().len(), 2);

        canvas.remove_children();
        assert!(canvas.children().is_empty());
    }

    #[test]
    fn resize_uses_device_pixel_ratio() {
        let (canvas, probe) = headless(config().with_device_pixel_ratio(2.0));
        assert_eq!(canvas.device_pixel_ratio(), 2.0);

        canvas.resize(300.0, 150.0);
        assert_eq!(probe.configured_size(), Some((600, 300)));
    }

    #[test]
    fn pixel_ratio_defaults() {
        let (canvas, _) = headless(config());
        assert_eq!(canvas.device_pixel_ratio(), 1.0);

        let env = Environment {
            reported_pixel_ratio: Some(1.5),
            is_browser: true,
        };
        let (canvas, _) = headless(config().with_environment(env));
        assert_eq!(canvas.device_pixel_ratio(), 1.5);
    }

    #[test]
    fn failed_device_creation_aborts_construction() {
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(Renderer::with_contribution(Rc::new(
            HeadlessContribution::failing("context creation failed"),
        )))];
        let err = pollster::block_on(InfiniteCanvas::with_plugins(config(), plugins)).unwrap_err();

        assert!(matches!(err, CanvasError::AggregateInit(_)));
        assert!(err.to_string().contains("context creation failed"));
    }

    #[test]
    fn webgpu_without_shader_compiler_path_fails() {
        let err = pollster::block_on(InfiniteCanvas::new(
            config().with_renderer(RendererKind::WebGpu),
        ))
        .unwrap_err();

        let CanvasError::AggregateInit(inner) = err else {
            panic!("expected an aggregate init error");
        };
        assert!(matches!(
            inner.downcast_ref::<CanvasError>(),
            Some(CanvasError::MissingShaderCompilerPath)
        ));
    }

    #[test]
    fn canvas_handle_is_exposed() {
        let (canvas, _) = headless(config());
        assert_eq!((canvas.canvas().width(), canvas.canvas().height()), (200, 100));
    }
}
