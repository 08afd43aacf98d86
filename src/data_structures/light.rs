use cgmath::{InnerSpace, Matrix4, Vector3, Zero};

use crate::data_structures::color::Color3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Sky light from `direction` blending towards `ground_colour` below.
    Hemispheric {
        direction: Vector3<f32>,
        ground_colour: Color3,
    },
    Directional {
        direction: Vector3<f32>,
    },
    /// Omni light at the node position.
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub intensity: f32,
    pub diffuse: Color3,
}

impl Light {
    pub fn hemispheric(direction: impl Into<Vector3<f32>>) -> Self {
        Self {
            kind: LightKind::Hemispheric {
                direction: direction.into(),
                ground_colour: Color3::BLACK,
            },
            intensity: 1.0,
            diffuse: Color3::WHITE,
        }
    }

    pub fn directional(direction: impl Into<Vector3<f32>>) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.into(),
            },
            intensity: 1.0,
            diffuse: Color3::WHITE,
        }
    }

    pub fn point() -> Self {
        Self {
            kind: LightKind::Point,
            intensity: 1.0,
            diffuse: Color3::WHITE,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub(crate) fn view(&self, world: &Matrix4<f32>) -> LightView {
        let position = world.w.truncate();
        let (direction, ground) = match self.kind {
            LightKind::Hemispheric {
                direction,
                ground_colour,
            } => (direction, ground_colour),
            LightKind::Directional { direction } => (direction, Color3::BLACK),
            LightKind::Point => (Vector3::zero(), Color3::BLACK),
        };
        let direction = (*world * direction.extend(0.0)).truncate();
        LightView {
            kind: self.kind,
            position,
            direction: if direction.magnitude2() > f32::EPSILON {
                direction.normalize()
            } else {
                direction
            },
            ground_colour: ground,
            diffuse: self.diffuse,
            intensity: self.intensity,
        }
    }
}

/// World-space light captured for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightView {
    pub kind: LightKind,
    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub ground_colour: Color3,
    pub diffuse: Color3,
    pub intensity: f32,
}
