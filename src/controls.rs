//! Keyboard and mouse camera controls.
//!
//! [`CameraControls`] collects input between ticks and applies it to one
//! camera node when the driver advances it by the frame's `dt`. Free cameras
//! look around while the left button is held and move with WASD/arrow keys.
//! Arc-rotate cameras orbit their target on drag and zoom on the wheel.

use std::collections::HashSet;
use std::f32::consts::FRAC_PI_2;

use cgmath::{InnerSpace, Vector3};
use winit::{
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::{
    data_structures::{
        camera::CameraMode,
        scene_graph::{NodeHandle, Scene},
    },
    error::SceneError,
};

const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

#[derive(Clone, Debug)]
pub struct CameraControls {
    camera: NodeHandle,
    /// Radians per dragged pixel.
    pub sensitivity: f32,
    /// Radius fraction per wheel line.
    pub zoom_speed: f32,
    keys_held: HashSet<KeyCode>,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    drag: (f32, f32),
    zoom: f32,
}

impl CameraControls {
    pub fn new(camera: NodeHandle) -> Self {
        Self {
            camera,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            keys_held: HashSet::new(),
            dragging: false,
            last_cursor: None,
            drag: (0.0, 0.0),
            zoom: 0.0,
        }
    }

    pub fn camera(&self) -> NodeHandle {
        self.camera
    }

    pub fn key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }
    }

    /// Accumulates a pointer drag in pixels.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.drag.0 += dx;
        self.drag.1 += dy;
    }

    /// Positive values zoom in.
    pub fn zoom(&mut self, lines: f32) {
        self.zoom += lines;
    }

    /// Feeds a window event. Returns true when it was used.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                self.key(*key, *state == ElementState::Pressed);
                true
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.dragging = *state == ElementState::Pressed;
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some((x, y))) = (self.dragging, self.last_cursor) {
                    self.drag((position.x - x) as f32, (position.y - y) as f32);
                }
                self.last_cursor = Some((position.x, position.y));
                self.dragging
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.zoom(lines);
                true
            }
            WindowEvent::Focused(false) => {
                self.keys_held.clear();
                self.dragging = false;
                false
            }
            _ => false,
        }
    }

    fn held(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|key| self.keys_held.contains(key))
    }

    /// Applies input gathered since the last call.
    pub fn update(&mut self, scene: &mut Scene, dt: f32) -> Result<(), SceneError> {
        let (dx, dy) = std::mem::take(&mut self.drag);
        let zoom = std::mem::take(&mut self.zoom);
        let sensitivity = self.sensitivity;
        let zoom_speed = self.zoom_speed;

        let forward_input = axis(self.held(&[KeyCode::KeyW, KeyCode::ArrowUp]), self.held(&[KeyCode::KeyS, KeyCode::ArrowDown]));
        let right_input = axis(self.held(&[KeyCode::KeyD, KeyCode::ArrowRight]), self.held(&[KeyCode::KeyA, KeyCode::ArrowLeft]));
        let up_input = axis(self.held(&[KeyCode::Space]), self.held(&[KeyCode::ShiftLeft]));

        let speed = scene.update_camera(self.camera, |camera| {
            match &mut camera.mode {
                CameraMode::Free { yaw, pitch } => {
                    *yaw += dx * sensitivity;
                    *pitch = (*pitch + dy * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
                }
                CameraMode::ArcRotate { alpha, beta, radius, .. } => {
                    *alpha -= dx * sensitivity + right_input * dt;
                    *beta -= dy * sensitivity - forward_input * dt;
                    *radius *= (1.0 - zoom * zoom_speed).max(0.1);
                }
            }
            match camera.mode {
                CameraMode::Free { .. } => Some(camera.speed),
                CameraMode::ArcRotate { .. } => None,
            }
        })?;

        let Some(speed) = speed else {
            return Ok(());
        };
        if forward_input == 0.0 && right_input == 0.0 && up_input == 0.0 {
            return Ok(());
        }
        let mut transform = scene.transform(self.camera)?;
        let forward = match scene.node(self.camera).and_then(|node| node.as_camera()) {
            Some(camera) => camera.forward(transform.position),
            None => return Err(SceneError::UnknownNode(self.camera)),
        };
        let right = forward.cross(Vector3::unit_y());
        let right = if right.magnitude2() > f32::EPSILON {
            right.normalize()
        } else {
            Vector3::unit_x()
        };
        let step = (forward * forward_input + right * right_input + Vector3::unit_y() * up_input) * speed * dt;
        transform.position += step;
        scene.set_transform(self.camera, transform)
    }
}

fn axis(positive: bool, negative: bool) -> f32 {
    match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    }
}
