//! Local transforms of scene nodes and their GPU representation.
//!
//! A [`Transform`] stores position, rotation and scale relative to the node's
//! parent. World matrices are produced by multiplying down the parent chain.

use cgmath::{Matrix, One, SquareMatrix};

/// Position, rotation and scale of a node relative to its parent.
///
/// `rotation` holds Euler angles in radians, applied yaw (Y), pitch (X), then
/// roll (Z). When `rotation_quaternion` is set it overrides the Euler angles,
/// which is how loaded glTF nodes carry their orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Vector3<f32>,
    pub rotation_quaternion: Option<cgmath::Quaternion<f32>>,
    pub scale: cgmath::Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity transform (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation_quaternion: None,
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_position(position: impl Into<cgmath::Vector3<f32>>) -> Self {
        Self {
            position: position.into(),
            ..Self::new()
        }
    }

    pub fn with_scale(mut self, scale: impl Into<cgmath::Vector3<f32>>) -> Self {
        self.scale = scale.into();
        self
    }

    pub fn with_rotation(mut self, rotation: impl Into<cgmath::Vector3<f32>>) -> Self {
        self.rotation = rotation.into();
        self
    }

    /// Effective orientation, honoring the quaternion override.
    pub fn orientation(&self) -> cgmath::Quaternion<f32> {
        match self.rotation_quaternion {
            Some(quat) => quat,
            None => {
                use cgmath::Rotation3;
                cgmath::Quaternion::from_angle_y(cgmath::Rad(self.rotation.y))
                    * cgmath::Quaternion::from_angle_x(cgmath::Rad(self.rotation.x))
                    * cgmath::Quaternion::from_angle_z(cgmath::Rad(self.rotation.z))
            }
        }
    }

    /// Rotates around `axis` (local space) by `angle` radians.
    ///
    /// Like loaders do, this switches the node over to quaternion rotation so
    /// successive calls accumulate instead of overwriting each other.
    pub fn rotate(&mut self, axis: cgmath::Vector3<f32>, angle: f32) {
        use cgmath::{InnerSpace, Rotation3};
        if axis.magnitude2() == 0.0 {
            return;
        }
        let delta = cgmath::Quaternion::from_axis_angle(axis.normalize(), cgmath::Rad(angle));
        self.rotation_quaternion = Some(self.orientation() * delta);
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.orientation())
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// Per-draw world matrix and normal matrix, laid out for a vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformRaw {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 3]; 3],
}

impl TransformRaw {
    pub fn from_world(world: &cgmath::Matrix4<f32>) -> Self {
        // inverse-transpose keeps normals perpendicular under non-uniform scale
        let upper = cgmath::Matrix3::from_cols(
            world.x.truncate(),
            world.y.truncate(),
            world.z.truncate(),
        );
        let normal = upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or_else(cgmath::Matrix3::one);
        Self {
            model: (*world).into(),
            normal: normal.into(),
        }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<TransformRaw>() as wgpu::BufferAddress,
            // Switches from per-vertex to per-instance stepping.
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}
