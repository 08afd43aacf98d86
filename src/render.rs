//! Frame snapshots and the drawable target they are handed to.
//!
//! Each tick the driver asks the scene for a [`Frame`]: an owned, immutable
//! copy of everything a surface needs (camera, lights, draw items and
//! environment). Because the frame owns its data, a draw never observes a
//! half-applied scene edit.
//!
//! # Key types
//!
//! - [`Surface`] is the seam to the rendering engine
//! - [`Frame`] is the per-tick render command
//! - [`DrawItem`] is one mesh with its world matrix and material snapshot
//! - [`HeadlessSurface`] records frames instead of drawing them
//!

use std::collections::VecDeque;
use std::sync::Arc;

use cgmath::{InnerSpace, Matrix4, MetricSpace, Point3};

use crate::{
    data_structures::{
        camera::CameraView,
        color::Color4,
        environment::Environment,
        light::LightView,
        material::MaterialView,
        model::MeshData,
        scene_graph::NodeHandle,
    },
    error::SceneError,
};

/// Size of the drawable area in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

/// One mesh to draw.
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub node: NodeHandle,
    pub mesh: Arc<MeshData>,
    pub world: Matrix4<f32>,
    pub material: MaterialView,
}

impl DrawItem {
    fn distance_to(&self, eye: Point3<f32>) -> f32 {
        let origin = self.world.w.truncate();
        eye.distance(Point3::new(origin.x, origin.y, origin.z))
    }
}

/// Everything one tick draws.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    /// `None` while the loading screen is up.
    pub camera: Option<CameraView>,
    pub lights: Vec<LightView>,
    pub items: Vec<DrawItem>,
    pub environment: Environment,
}

impl Frame {
    /// Frame shown while the loading UI is displayed: clear colour only.
    pub fn loading(index: u64, colour: Color4) -> Self {
        Self {
            index,
            camera: None,
            lights: Vec::new(),
            items: Vec::new(),
            environment: Environment {
                clear_colour: colour,
                ..Environment::default()
            },
        }
    }

    pub fn is_loading(&self) -> bool {
        self.camera.is_none()
    }

    pub fn clear_colour(&self) -> Color4 {
        self.environment.clear_colour
    }

    /// Splits items into opaque ones and transparent ones sorted back to front.
    pub fn batches(&self) -> (Vec<&DrawItem>, Vec<&DrawItem>) {
        let (opaque, mut transparent): (Vec<&DrawItem>, Vec<&DrawItem>) = self
            .items
            .iter()
            .partition(|item| !item.material.is_transparent());
        if let Some(camera) = &self.camera {
            transparent.sort_by(|a, b| {
                b.distance_to(camera.eye)
                    .total_cmp(&a.distance_to(camera.eye))
            });
        }
        (opaque, transparent)
    }

    /// Combined view-projection matrix for `viewport`, if a camera is set.
    pub fn view_proj(&self, viewport: Viewport) -> Option<Matrix4<f32>> {
        self.camera.map(|camera| camera.view_proj(viewport.aspect()))
    }

    pub fn item(&self, node: NodeHandle) -> Option<&DrawItem> {
        self.items.iter().find(|item| item.node == node)
    }
}

/// Drawable target plus its rendering engine.
pub trait Surface {
    /// Issues the draw for one frame.
    fn draw(&mut self, frame: &Frame) -> Result<(), SceneError>;

    fn viewport(&self) -> Viewport;

    fn resize(&mut self, _viewport: Viewport) {}
}

const DEFAULT_HISTORY: usize = 16;

/// Surface without a GPU that records the frames it is asked to draw.
///
/// Only the most recent frames are kept (16 unless set with
/// [`HeadlessSurface::with_history`]); [`HeadlessSurface::draw_count`] counts
/// every draw.
#[derive(Debug)]
pub struct HeadlessSurface {
    viewport: Viewport,
    history: usize,
    frames: VecDeque<Frame>,
    draws: usize,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl HeadlessSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            history: DEFAULT_HISTORY,
            frames: VecDeque::new(),
            draws: 0,
        }
    }

    /// Keeps at most `frames` recent frames, at least one.
    pub fn with_history(mut self, frames: usize) -> Self {
        self.history = frames.max(1);
        while self.frames.len() > self.history {
            self.frames.pop_front();
        }
        self
    }

    /// Recorded frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn draw_count(&self) -> usize {
        self.draws
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.back()
    }
}

impl Surface for HeadlessSurface {
    fn draw(&mut self, frame: &Frame) -> Result<(), SceneError> {
        if let Some(camera) = &frame.camera {
            log::trace!(
                "frame {}: {} items, looking along {:?}",
                frame.index,
                frame.items.len(),
                camera.forward.normalize()
            );
        }
        if self.frames.len() == self.history {
            self.frames.pop_front();
        }
        self.frames.push_back(frame.clone());
        self.draws += 1;
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }
}
