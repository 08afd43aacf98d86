//! scene-ngin
//!
//! A small scene composition and render-loop driver for native and WASM
//! targets. Build a scene graph of cameras, lights and meshes, bind pointer
//! and per-frame actions to it, stream glTF/OBJ models and textures in the
//! background, and let the driver draw one consistent snapshot per frame.
//!
//! High-level modules
//! - `config`: driver settings and the asset source they describe
//! - `context`: wgpu surface that draws frames
//! - `controls`: keyboard and mouse camera controls
//! - `data_structures`: scene graph, nodes, materials, geometry
//! - `error`: scene and load errors
//! - `flow`: stage, render driver and the winit event loop
//! - `interaction`: action bindings from input and frames to scene edits
//! - `pick`: ray picking of meshes under the pointer
//! - `pipelines`: render pipelines of the wgpu surface
//! - `render`: frame snapshots and the surface abstraction
//! - `resources`: asset sources and the asynchronous loader
//!

pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod interaction;
pub mod pick;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use config::DriverConfig;
pub use data_structures::{
    camera::{Camera, CameraMode},
    color::{Color3, Color4},
    environment::{Environment, EnvironmentTexture},
    light::Light,
    material::{Material, MaterialDesc, MaterialParams, Shading, Texture, TextureRef, TextureSlot},
    model::MeshData,
    scene_graph::{Mesh, NodeHandle, NodeKind, Scene, SceneFragment},
    transform::Transform,
};
pub use error::{LoadError, LoadErrorKind, SceneError};
pub use flow::{run, RenderDriver, SceneFlow, Stage};
pub use interaction::{ActionEvent, Effect, InteractionLayer, Target, Trigger, Value};
pub use render::{Frame, HeadlessSurface, Surface, Viewport};
pub use resources::{AssetLoader, LoadCallbacks, LoadState, PendingLoad, Progress};

pub use cgmath;
pub use winit::event::WindowEvent;
