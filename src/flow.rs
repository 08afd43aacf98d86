//! Frame loop and application event loop.
//!
//! A [`Stage`] bundles what a scene needs at runtime: the [`Scene`] itself,
//! its [`InteractionLayer`] and the [`AssetLoader`] feeding it. The
//! [`RenderDriver`] owns a [`Surface`] and a stage and turns host frames into
//! ticks.
//!
//! # Tick order
//!
//! 1. Fail with [`SceneError::SurfaceUnavailable`] if the surface was destroyed
//! 2. Merge finished loads and run their callbacks
//! 3. Advance attached camera controls by `dt`
//! 4. Run every-frame bindings
//! 5. Snapshot the scene (or the loading screen)
//! 6. Issue exactly one draw
//!
//! [`run`] wires all of this to a winit window and a wgpu [`Context`].

use std::sync::Arc;

use instant::Instant;
use log::{debug, error, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::{
    config::DriverConfig,
    context::Context,
    controls::CameraControls,
    data_structures::{
        color::Color4,
        scene_graph::{NodeHandle, Scene},
    },
    error::{LoadError, SceneError},
    interaction::{BindingId, Effect, InteractionLayer, PointerEvent, Target, Trigger},
    pick::pick,
    render::{Frame, Surface, Viewport},
    resources::{
        loader::{Completion, Payload},
        AssetLoader, Spawner,
    },
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Scene, bindings and loader of one running scene.
pub struct Stage {
    pub scene: Scene,
    pub interactions: InteractionLayer,
    pub loader: AssetLoader,
    loading_ui: bool,
    controls: Option<CameraControls>,
    viewport: Viewport,
    frame: u64,
}

impl Stage {
    pub fn new(scene: Scene, loader: AssetLoader) -> Self {
        Self {
            scene,
            interactions: InteractionLayer::new(),
            loader,
            loading_ui: false,
            controls: None,
            viewport: Viewport::default(),
            frame: 0,
        }
    }

    /// Shorthand for [`InteractionLayer::bind`] against this stage's scene.
    pub fn bind(&mut self, trigger: Trigger, target: Target, effect: Effect) -> Result<BindingId, SceneError> {
        self.interactions.bind(&self.scene, trigger, target, effect)
    }

    /// Lets keyboard and mouse input drive `camera`.
    pub fn attach_control(&mut self, camera: NodeHandle) -> Result<(), SceneError> {
        let node = self.scene.node(camera).ok_or(SceneError::UnknownNode(camera))?;
        if node.as_camera().is_none() {
            return Err(SceneError::WrongNodeKind {
                handle: camera,
                expected: "camera",
            });
        }
        self.controls = Some(CameraControls::new(camera));
        Ok(())
    }

    pub fn detach_control(&mut self) -> Option<CameraControls> {
        self.controls.take()
    }

    pub fn controls(&self) -> Option<&CameraControls> {
        self.controls.as_ref()
    }

    pub fn controls_mut(&mut self) -> Option<&mut CameraControls> {
        self.controls.as_mut()
    }

    /// Shows the loading screen until [`Stage::hide_loading_ui`].
    pub fn display_loading_ui(&mut self) {
        self.loading_ui = true;
    }

    pub fn hide_loading_ui(&mut self) {
        self.loading_ui = false;
    }

    pub fn is_loading_ui(&self) -> bool {
        self.loading_ui
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Index of the most recent tick.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Applies every finished load. Returns how many were applied.
    pub fn process_loads(&mut self) -> usize {
        let completions = self.loader.take_completions();
        let count = completions.len();
        for completion in completions {
            self.complete(completion);
        }
        count
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            load,
            result,
            mut callbacks,
            on_texture,
        } = completion;
        let on_success = callbacks.on_success.take();
        let on_error = callbacks.on_error.take();

        let outcome = match result {
            Ok(Payload::Fragment(fragment)) => self
                .scene
                .merge(fragment)
                .map_err(|e| LoadError::malformed(load.reference(), e)),
            Ok(Payload::Material { mesh, material }) => self
                .scene
                .attach_material(mesh, material)
                .map(|_| vec![mesh])
                .map_err(|e| LoadError::unresolved(load.reference(), e)),
            Ok(Payload::Texture(texture)) => {
                load.succeed(Vec::new());
                if let Some(on_texture) = on_texture {
                    on_texture(self, texture);
                }
                if let Some(on_success) = on_success {
                    on_success(self, &[]);
                }
                return;
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(handles) => {
                debug!("load {:?} of '{}' added {} nodes", load.id(), load.reference(), handles.len());
                load.succeed(handles.clone());
                if let Some(on_success) = on_success {
                    on_success(self, &handles);
                }
            }
            Err(e) => {
                load.fail(e.clone());
                match on_error {
                    Some(on_error) => on_error(self, &e),
                    None => error!("loading '{}' failed: {e}", load.reference()),
                }
            }
        }
    }

    /// Picks under (`x`, `y`) and runs pointer-down bindings.
    pub fn pointer_down(&mut self, x: f32, y: f32) -> usize {
        let hit = self.hit(x, y);
        self.interactions.dispatch_pointer(
            &mut self.scene,
            &mut self.loader,
            PointerEvent::Down { x, y, hit },
            self.frame,
        )
    }

    /// Picks under (`x`, `y`) and runs pointer-over bindings on enter.
    pub fn pointer_move(&mut self, x: f32, y: f32) -> usize {
        let hit = self.hit(x, y);
        self.interactions.dispatch_pointer(
            &mut self.scene,
            &mut self.loader,
            PointerEvent::Move { x, y, hit },
            self.frame,
        )
    }

    fn hit(&self, x: f32, y: f32) -> Option<NodeHandle> {
        match pick(&self.scene, self.viewport, x, y) {
            Ok(hit) => hit.map(|hit| hit.node),
            Err(e) => {
                debug!("nothing to pick: {e}");
                None
            }
        }
    }

    fn advance(&mut self, frame: u64, dt: f32) {
        self.frame = frame;
        if let Some(controls) = &mut self.controls {
            if let Err(e) = controls.update(&mut self.scene, dt) {
                warn!("detaching camera controls: {e}");
                self.controls = None;
            }
        }
        self.interactions
            .dispatch_frame(&mut self.scene, &mut self.loader, frame, dt);
    }
}

/// Owns the surface and the stage and drives the frame loop.
pub struct RenderDriver<S: Surface> {
    surface: Option<S>,
    stage: Stage,
    running: bool,
    frame_index: u64,
    last_tick: Option<Instant>,
    loading_colour: Color4,
}

impl<S: Surface> RenderDriver<S> {
    pub fn new(surface: S, stage: Stage) -> Self {
        Self {
            surface: Some(surface),
            stage,
            running: false,
            frame_index: 0,
            last_tick: None,
            loading_colour: DriverConfig::default().loading_colour,
        }
    }

    pub fn with_loading_colour(mut self, colour: impl Into<Color4>) -> Self {
        self.loading_colour = colour.into();
        self
    }

    /// Checks that a tick could draw and starts the loop.
    pub fn start(&mut self) -> Result<(), SceneError> {
        let surface = self.surface.as_ref().ok_or(SceneError::SurfaceUnavailable)?;
        if !self.stage.is_loading_ui() && self.stage.scene.active_camera().is_none() {
            return Err(SceneError::NoActiveCamera);
        }
        self.stage.viewport = surface.viewport();
        self.running = true;
        self.last_tick = Some(Instant::now());
        debug!("render driver started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// One frame with `dt` measured since the previous tick.
    pub fn tick(&mut self) -> Result<(), SceneError> {
        let now = Instant::now();
        let dt = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.tick_with_delta(dt)
    }

    pub fn tick_with_delta(&mut self, dt: f32) -> Result<(), SceneError> {
        let Some(surface) = self.surface.as_mut() else {
            return Err(SceneError::SurfaceUnavailable);
        };
        if !self.running {
            return Err(SceneError::NotRunning);
        }
        self.frame_index += 1;
        self.stage.viewport = surface.viewport();

        self.stage.process_loads();
        self.stage.advance(self.frame_index, dt);

        let frame = if self.stage.is_loading_ui() {
            Frame::loading(self.frame_index, self.loading_colour)
        } else {
            let mut frame = self.stage.scene.render_frame()?;
            frame.index = self.frame_index;
            frame
        };
        surface.draw(&frame)
    }

    /// Cancels in-flight loads, runs their error callbacks and detaches all
    /// bindings.
    pub fn stop(&mut self) {
        self.running = false;
        let cancelled = self.stage.loader.cancel_all();
        self.stage.process_loads();
        self.stage.interactions.clear();
        debug!("render driver stopped, {cancelled} loads cancelled");
    }

    /// Stops the driver and hands back the surface. Later ticks fail with
    /// [`SceneError::SurfaceUnavailable`].
    pub fn destroy_surface(&mut self) -> Option<S> {
        self.stop();
        self.surface.take()
    }

    /// Swaps in a new scene and returns the old one. Bindings, controls and
    /// loads started for the old scene are dropped. Loads that finished but
    /// were not applied yet are cancelled too; their error callbacks run
    /// while the old scene is still in place.
    pub fn replace_scene(&mut self, scene: Scene) -> Scene {
        let cancelled = self.stage.loader.cancel_all();
        self.stage.process_loads();
        self.stage.interactions.clear();
        self.stage.controls = None;
        debug!("replacing scene '{}', {cancelled} loads cancelled", self.stage.scene.name);
        std::mem::replace(&mut self.stage.scene, scene)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(viewport);
            self.stage.viewport = surface.viewport();
        }
    }

    pub fn display_loading_ui(&mut self) {
        self.stage.display_loading_ui();
    }

    pub fn hide_loading_ui(&mut self) {
        self.stage.hide_loading_ui();
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> usize {
        self.stage.pointer_down(x, y)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> usize {
        self.stage.pointer_move(x, y)
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

/// Application hooks for [`run`].
///
/// `on_init` builds the scene: create nodes, bind actions, start loads.
/// `on_update` runs every frame before every-frame bindings.
pub trait SceneFlow {
    fn on_init(&mut self, stage: &mut Stage) -> anyhow::Result<()>;

    fn on_update(&mut self, _stage: &mut Stage, _dt: f32) {}

    fn on_window_event(&mut self, _stage: &mut Stage, _event: &WindowEvent) {}
}

pub(crate) enum HostEvent {
    #[allow(dead_code)]
    ContextReady(anyhow::Result<Context>),
}

struct App<F: SceneFlow> {
    config: DriverConfig,
    flow: F,
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: EventLoopProxy<HostEvent>,
    window: Option<Arc<Window>>,
    driver: Option<RenderDriver<Context>>,
    last_time: Instant,
    cursor: (f32, f32),
}

impl<F: SceneFlow> App<F> {
    fn new(event_loop: &EventLoop<HostEvent>, config: DriverConfig, flow: F) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            flow,
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            window: None,
            driver: None,
            last_time: Instant::now(),
            cursor: (0.0, 0.0),
        })
    }

    fn spawner(&self) -> Spawner {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Spawner::from_handle(self.async_runtime.handle().clone())
        }
        #[cfg(target_arch = "wasm32")]
        {
            Spawner::local()
        }
    }

    fn build_driver(&mut self, ctx: Context) -> anyhow::Result<RenderDriver<Context>> {
        let loader = AssetLoader::new(self.config.asset_source()?, self.spawner());
        let mut stage = Stage::new(Scene::new(self.config.title.clone()), loader);
        self.flow.on_init(&mut stage)?;
        let mut driver = RenderDriver::new(ctx, stage).with_loading_colour(self.config.loading_colour);
        driver.start()?;
        Ok(driver)
    }

    fn init(&mut self, event_loop: &ActiveEventLoop, ctx: anyhow::Result<Context>) {
        let result = ctx.and_then(|ctx| self.build_driver(ctx));
        match result {
            Ok(driver) => {
                self.driver = Some(driver);
                self.last_time = Instant::now();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            Err(e) => {
                error!("Cannot start the scene: {e:#}");
                event_loop.exit();
            }
        }
    }
}

impl<F: SceneFlow> ApplicationHandler<HostEvent> for App<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(self.config.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(&self.config.canvas_id).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Cannot create a window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let ctx = self.async_runtime.block_on(Context::new(window, &self.config));
            self.init(event_loop, ctx);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            let config = self.config.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let ctx = Context::new(window, &config).await;
                if proxy.send_event(HostEvent::ContextReady(ctx)).is_err() {
                    log::error!("event loop closed before the context was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        match event {
            HostEvent::ContextReady(ctx) => {
                self.init(event_loop, ctx);
                if let (Some(window), Some(driver)) = (&self.window, &mut self.driver) {
                    let size = window.inner_size();
                    driver.resize(Viewport::new(size.width, size.height));
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(driver) = &mut self.driver else {
            return;
        };

        self.flow.on_window_event(driver.stage_mut(), &event);
        if let Some(controls) = driver.stage_mut().controls_mut() {
            controls.handle_window_event(&event);
        }

        match event {
            WindowEvent::CloseRequested => {
                driver.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => driver.resize(Viewport::new(size.width, size.height)),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                driver.pointer_move(self.cursor.0, self.cursor.1);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                driver.pointer_down(self.cursor.0, self.cursor.1);
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed().as_secs_f32();
                self.last_time = Instant::now();
                self.flow.on_update(driver.stage_mut(), dt);
                match driver.tick_with_delta(dt) {
                    Ok(()) => (),
                    Err(SceneError::SurfaceUnavailable) => {
                        warn!("surface is gone, leaving the event loop");
                        event_loop.exit();
                        return;
                    }
                    Err(e) => error!("Unable to render {e}"),
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn init_logging(config: &DriverConfig) {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        if let Some(filter) = &config.log_filter {
            builder.parse_filters(filter);
        }
        if let Err(e) = builder.try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        let _ = config;
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::log_1(&format!("Could not initialize logger: {e}").into());
        }
    }
}

/// Opens a window, builds the scene with `flow` and renders until closed.
pub fn run<F: SceneFlow + 'static>(config: DriverConfig, flow: F) -> anyhow::Result<()> {
    init_logging(&config);

    let event_loop: EventLoop<HostEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, flow)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
