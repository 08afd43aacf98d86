#![allow(dead_code)]

use std::{cell::RefCell, f32::consts::FRAC_PI_2, rc::Rc, sync::Arc};

use scene_ngin::{
    Camera, HeadlessSurface, Light, LoadCallbacks, LoadError, MeshData, NodeHandle, Progress,
    RenderDriver, Scene, Stage, Transform, Viewport,
    resources::{
        AssetLoader, AssetSource, MemorySource, Spawner,
        source::{ProgressSink, SourceFuture},
    },
};

/// Handles of the nodes [`basic_scene`] creates.
pub(crate) struct BasicScene {
    pub scene: Scene,
    pub camera: NodeHandle,
    pub light: NodeHandle,
    pub sphere: NodeHandle,
    pub ground: NodeHandle,
}

/// Arc-rotate camera ten units in front of a unit sphere at the origin,
/// looking along +Z, with a hemispheric light and a ground below.
pub(crate) fn basic_scene() -> BasicScene {
    let mut scene = Scene::new("basic");
    let camera = scene.create_node(
        "camera",
        Camera::arc_rotate(-FRAC_PI_2, FRAC_PI_2, 10.0, [0.0, 0.0, 0.0]).active(),
    );
    let light = scene.create_node("light", Light::hemispheric([0.0, 1.0, 0.0]).with_intensity(0.7));
    let sphere = scene.create_node("sphere", MeshData::sphere("sphere", 2.0, 16));
    let ground = scene.create_node_at(
        "ground",
        MeshData::ground("ground", 6.0, 6.0, 2),
        Transform::from_position([0.0, -2.0, 0.0]),
    );
    BasicScene {
        scene,
        camera,
        light,
        sphere,
        ground,
    }
}

/// Multi-threaded runtime for tests that are not async themselves.
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}

pub(crate) fn loader(source: impl AssetSource + 'static, spawner: Spawner) -> AssetLoader {
    AssetLoader::new(Arc::new(source), spawner)
}

/// Stage over `scene` that loads from `source` on the caller's runtime.
pub(crate) fn stage(scene: Scene, source: impl AssetSource + 'static) -> Stage {
    let spawner = Spawner::current().expect("tests run inside a tokio runtime");
    Stage::new(scene, loader(source, spawner))
}

pub(crate) fn stage_on(rt: &tokio::runtime::Runtime, scene: Scene) -> Stage {
    Stage::new(scene, loader(MemorySource::new(), Spawner::from_handle(rt.handle().clone())))
}

/// Source whose fetches never finish, so loads stay in flight.
pub(crate) struct StalledSource;

impl AssetSource for StalledSource {
    fn fetch<'a>(
        &'a self,
        _reference: &'a str,
        _progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>> {
        Box::pin(futures::future::pending())
    }
}

/// Started driver drawing into an 800x600 headless surface.
pub(crate) fn driver(rt: &tokio::runtime::Runtime, scene: Scene) -> RenderDriver<HeadlessSurface> {
    let mut driver = RenderDriver::new(HeadlessSurface::new(Viewport::new(800, 600)), stage_on(rt, scene));
    driver.start().expect("driver should start with an active camera");
    driver
}

/// Records what load callbacks saw.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    pub progress: Rc<RefCell<Vec<Progress>>>,
    pub successes: Rc<RefCell<Vec<Vec<NodeHandle>>>>,
    pub errors: Rc<RefCell<Vec<LoadError>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> LoadCallbacks {
        let progress = self.progress.clone();
        let successes = self.successes.clone();
        let errors = self.errors.clone();
        LoadCallbacks::new()
            .on_progress(move |p| progress.borrow_mut().push(p))
            .on_success(move |_, nodes| successes.borrow_mut().push(nodes.to_vec()))
            .on_error(move |_, e| errors.borrow_mut().push(e.clone()))
    }
}

pub(crate) const TRIANGLE_OBJ: &str = "\
o tri
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
f 1//1 2//1 3//1
";

/// Two separately named objects in one file.
pub(crate) const TWO_OBJECTS_OBJ: &str = "\
o left
v -2.0 0.0 0.0
v -1.0 0.0 0.0
v -1.5 1.0 0.0
f 1 2 3
o right
v 1.0 0.0 0.0
v 2.0 0.0 0.0
v 1.5 1.0 0.0
f 4 5 6
";

/// Little-endian positions of one triangle, as stored in a glTF buffer.
pub(crate) fn triangle_bin() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    positions.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// glTF document with one triangle mesh node whose buffer is `bin_uri`.
pub(crate) fn triangle_gltf(bin_uri: &str) -> String {
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "name": "triangle", "mesh": 0, "translation": [0.0, 1.0, 0.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }} }}] }}],
  "accessors": [{{
    "bufferView": 0,
    "componentType": 5126,
    "count": 3,
    "type": "VEC3",
    "min": [0.0, 0.0, 0.0],
    "max": [1.0, 1.0, 0.0]
  }}],
  "bufferViews": [{{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }}],
  "buffers": [{{ "uri": "{bin_uri}", "byteLength": 36 }}]
}}"#
    )
}

/// A 2x2 PNG, encoded on the fly.
pub(crate) fn tiny_png() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 40, 40, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encoding a png in memory cannot fail");
    bytes.into_inner()
}

pub(crate) fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}
