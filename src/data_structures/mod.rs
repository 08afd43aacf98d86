//! Engine data structures: scene graph, nodes and their payloads.
//!
//! - `scene_graph` owns the node table and produces per-frame snapshots
//! - `camera` and `light` are node payloads
//! - `model` holds mesh geometry and primitive builders
//! - `material` describes surface appearance and texture slots
//! - `texture` wraps GPU textures
//! - `transform` holds local transforms and their GPU layout
//! - `environment` holds scene-level lighting and background
//! - `color` holds RGB and RGBA colours

pub mod camera;
pub mod color;
pub mod environment;
pub mod light;
pub mod material;
pub mod model;
pub mod scene_graph;
pub mod texture;
pub mod transform;
