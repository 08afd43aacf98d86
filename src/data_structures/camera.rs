//! Camera nodes and the view they produce.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Keeps arc-rotate cameras off the poles where the up vector degenerates.
pub const BETA_LIMIT: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraMode {
    /// Positioned by the node transform, looking along yaw/pitch.
    Free { yaw: f32, pitch: f32 },
    /// Orbits `target` at `radius`. `alpha` is the longitude and `beta` the
    /// angle from the +Y axis, both in radians.
    ArcRotate {
        alpha: f32,
        beta: f32,
        radius: f32,
        target: Vector3<f32>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub mode: CameraMode,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second for keyboard movement.
    pub speed: f32,
    pub(crate) active: bool,
}

impl Camera {
    pub fn free() -> Self {
        Self {
            mode: CameraMode::Free {
                yaw: 0.0,
                pitch: 0.0,
            },
            fov: 0.8,
            near: 0.1,
            far: 1000.0,
            speed: 2.0,
            active: false,
        }
    }

    pub fn arc_rotate(alpha: f32, beta: f32, radius: f32, target: impl Into<Vector3<f32>>) -> Self {
        Self {
            mode: CameraMode::ArcRotate {
                alpha,
                beta: clamp_beta(beta),
                radius: radius.max(f32::EPSILON),
                target: target.into(),
            },
            ..Self::free()
        }
    }

    /// Marks the camera as the one to render through once it is added to a scene.
    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Points a free camera standing at `eye` towards `target`.
    pub fn set_target(&mut self, eye: Vector3<f32>, target: Vector3<f32>) {
        match &mut self.mode {
            CameraMode::Free { yaw, pitch } => {
                let dir = target - eye;
                if dir.magnitude2() <= f32::EPSILON {
                    return;
                }
                *yaw = dir.x.atan2(dir.z);
                *pitch = (-dir.y).atan2((dir.x * dir.x + dir.z * dir.z).sqrt());
            }
            CameraMode::ArcRotate { target: t, .. } => *t = target,
        }
    }

    /// Eye position in the camera's parent space.
    pub fn eye(&self, position: Vector3<f32>) -> Vector3<f32> {
        match self.mode {
            CameraMode::Free { .. } => position,
            CameraMode::ArcRotate {
                alpha,
                beta,
                radius,
                target,
            } => {
                target
                    + Vector3::new(
                        radius * alpha.cos() * beta.sin(),
                        radius * beta.cos(),
                        radius * alpha.sin() * beta.sin(),
                    )
            }
        }
    }

    /// Unit viewing direction in the camera's parent space.
    pub fn forward(&self, position: Vector3<f32>) -> Vector3<f32> {
        match self.mode {
            CameraMode::Free { yaw, pitch } => Vector3::new(
                pitch.cos() * yaw.sin(),
                -pitch.sin(),
                pitch.cos() * yaw.cos(),
            ),
            CameraMode::ArcRotate { target, .. } => {
                let dir = target - self.eye(position);
                if dir.magnitude2() <= f32::EPSILON {
                    Vector3::unit_z()
                } else {
                    dir.normalize()
                }
            }
        }
    }

    /// Resolves the camera into world space using its parent's world matrix.
    pub fn view(&self, position: Vector3<f32>, parent_world: &Matrix4<f32>) -> CameraView {
        let eye_local = self.eye(position);
        let eye = *parent_world * eye_local.extend(1.0);
        let forward = (*parent_world * self.forward(position).extend(0.0)).truncate();
        let forward = if forward.magnitude2() <= f32::EPSILON {
            Vector3::unit_z()
        } else {
            forward.normalize()
        };
        CameraView {
            eye: Point3::new(eye.x, eye.y, eye.z),
            forward,
            up: Vector3::unit_y(),
            fovy: Rad(self.fov),
            znear: self.near,
            zfar: self.far,
        }
    }
}

pub(crate) fn clamp_beta(beta: f32) -> f32 {
    beta.clamp(BETA_LIMIT, std::f32::consts::PI - BETA_LIMIT)
}

/// World-space camera state captured for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub eye: Point3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl CameraView {
    pub fn view_matrix(&self) -> Matrix4<f32> {
        // avoid a degenerate basis when looking straight up or down
        let up = if self.forward.cross(self.up).magnitude2() <= 1e-6 {
            Vector3::unit_z()
        } else {
            self.up
        };
        Matrix4::look_to_rh(self.eye, self.forward, up)
    }

    pub fn projection(&self, aspect: f32) -> Matrix4<f32> {
        cgmath::perspective(self.fovy, aspect.max(f32::EPSILON), self.znear, self.zfar)
    }

    pub fn view_proj(&self, aspect: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.projection(aspect) * self.view_matrix()
    }
}
