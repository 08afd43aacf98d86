//! Mesh geometry: vertices, indices and primitive builders.
//!
//! Geometry is engine independent and lives on the CPU. The wgpu surface
//! uploads a [`MeshData`] once per [`MeshId`] and reuses the buffers while the
//! mesh stays in the scene.

use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{InnerSpace, Vector3, Zero};
use image::GenericImageView;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an uploaded geometry buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Triangle-list geometry owned by a mesh node.
#[derive(Debug)]
pub struct MeshData {
    id: MeshId,
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl Clone for MeshData {
    // A clone is a new geometry as far as GPU caches are concerned.
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.vertices.clone(), self.indices.clone())
    }
}

impl MeshData {
    pub fn new(name: impl Into<String>, vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        Self {
            id: MeshId::next(),
            name: name.into(),
            vertices,
            indices,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates triangles as position triples in mesh-local space.
    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f32>; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let a = self.vertices.get(tri[0] as usize)?;
            let b = self.vertices.get(tri[1] as usize)?;
            let c = self.vertices.get(tri[2] as usize)?;
            Some([a.position.into(), b.position.into(), c.position.into()])
        })
    }

    /// Center and radius of a sphere enclosing all vertices.
    pub fn bounding_sphere(&self) -> (Vector3<f32>, f32) {
        if self.vertices.is_empty() {
            return (Vector3::zero(), 0.0);
        }
        let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
        for v in &self.vertices {
            min.x = min.x.min(v.position[0]);
            min.y = min.y.min(v.position[1]);
            min.z = min.z.min(v.position[2]);
            max.x = max.x.max(v.position[0]);
            max.y = max.y.max(v.position[1]);
            max.z = max.z.max(v.position[2]);
        }
        let center = (min + max) * 0.5;
        let radius = self
            .vertices
            .iter()
            .map(|v| (Vector3::from(v.position) - center).magnitude())
            .fold(0.0, f32::max);
        (center, radius)
    }

    /// A flat `width` x `height` plane on the XZ axes facing +Y.
    pub fn ground(name: impl Into<String>, width: f32, height: f32, subdivisions: u32) -> Self {
        let sub = subdivisions.max(1);
        let mut vertices = Vec::with_capacity(((sub + 1) * (sub + 1)) as usize);
        for row in 0..=sub {
            for col in 0..=sub {
                let u = col as f32 / sub as f32;
                let v = row as f32 / sub as f32;
                vertices.push(ModelVertex {
                    position: [(u - 0.5) * width, 0.0, (0.5 - v) * height],
                    tex_coords: [u, v],
                    normal: [0.0, 1.0, 0.0],
                });
            }
        }
        let stride = sub + 1;
        let mut indices = Vec::with_capacity((sub * sub * 6) as usize);
        for row in 0..sub {
            for col in 0..sub {
                let v0 = row * stride + col;
                let v1 = v0 + stride;
                let v2 = v0 + 1;
                let v3 = v1 + 1;
                indices.extend_from_slice(&[v0, v2, v1, v2, v3, v1]);
            }
        }
        Self::new(name, vertices, indices)
    }

    /// UV sphere centered on the origin.
    pub fn sphere(name: impl Into<String>, diameter: f32, segments: u32) -> Self {
        let rings = segments.max(3);
        let slices = rings * 2;
        let radius = diameter * 0.5;
        let mut vertices = Vec::with_capacity(((rings + 1) * (slices + 1)) as usize);
        for i in 0..=rings {
            let theta = i as f32 * std::f32::consts::PI / rings as f32;
            for j in 0..=slices {
                let phi = j as f32 * std::f32::consts::TAU / slices as f32;
                let normal = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
                vertices.push(ModelVertex {
                    position: [normal[0] * radius, normal[1] * radius, normal[2] * radius],
                    tex_coords: [j as f32 / slices as f32, i as f32 / rings as f32],
                    normal,
                });
            }
        }
        let stride = slices + 1;
        let mut indices = Vec::with_capacity((rings * slices * 6) as usize);
        for i in 0..rings {
            for j in 0..slices {
                let a = i * stride + j;
                let b = a + stride;
                let c = a + 1;
                let d = b + 1;
                indices.extend_from_slice(&[a, c, b, c, d, b]);
            }
        }
        Self::new(name, vertices, indices)
    }

    /// Axis aligned cube with edge length `size`, one quad per face.
    pub fn cuboid(name: impl Into<String>, size: f32) -> Self {
        let h = size * 0.5;
        // (normal, u axis, v axis) with u x v == normal
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let n = Vector3::from(normal) * h;
            let u = Vector3::from(u) * h;
            let v = Vector3::from(v) * h;
            let base = vertices.len() as u32;
            let corners = [(-u - v, [0.0, 1.0]), (u - v, [1.0, 1.0]), (u + v, [1.0, 0.0]), (-u + v, [0.0, 0.0])];
            for (offset, uv) in corners {
                vertices.push(ModelVertex {
                    position: (n + offset).into(),
                    tex_coords: uv,
                    normal,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(name, vertices, indices)
    }

    /// Open tube of constant `radius` swept along `path`.
    pub fn tube(
        name: impl Into<String>,
        path: &[Vector3<f32>],
        radius: f32,
        tessellation: u32,
    ) -> Self {
        let tess = tessellation.max(3);
        if path.len() < 2 {
            return Self::new(name, Vec::new(), Vec::new());
        }
        let mut vertices = Vec::with_capacity(path.len() * (tess as usize + 1));
        for (i, point) in path.iter().enumerate() {
            let prev = path[i.saturating_sub(1)];
            let next = path[(i + 1).min(path.len() - 1)];
            let tangent = (next - prev).normalize();
            let up = if tangent.y.abs() > 0.99 {
                Vector3::unit_x()
            } else {
                Vector3::unit_y()
            };
            let normal = (up - tangent * tangent.dot(up)).normalize();
            let binormal = tangent.cross(normal);
            for k in 0..=tess {
                let angle = k as f32 * std::f32::consts::TAU / tess as f32;
                let dir = normal * angle.cos() + binormal * angle.sin();
                vertices.push(ModelVertex {
                    position: (point + dir * radius).into(),
                    tex_coords: [
                        k as f32 / tess as f32,
                        i as f32 / (path.len() - 1) as f32,
                    ],
                    normal: dir.into(),
                });
            }
        }
        let stride = tess + 1;
        let mut indices = Vec::new();
        for i in 0..(path.len() as u32 - 1) {
            for k in 0..tess {
                let a = i * stride + k;
                let b = a + 1;
                let c = a + stride;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, c, b, d, c]);
            }
        }
        Self::new(name, vertices, indices)
    }

    /// Pushes every vertex along its normal by the height map value at its UV.
    ///
    /// Grey levels map linearly onto `[min, max]`. Normals are recomputed
    /// afterwards.
    pub fn apply_displacement_map(&mut self, height_map: &image::DynamicImage, min: f32, max: f32) {
        let (width, height) = height_map.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let luma = height_map.to_luma8();
        for vertex in &mut self.vertices {
            let u = vertex.tex_coords[0].rem_euclid(1.0);
            let v = vertex.tex_coords[1].rem_euclid(1.0);
            let x = ((u * (width - 1) as f32).round() as u32).min(width - 1);
            let y = ((v * (height - 1) as f32).round() as u32).min(height - 1);
            let grey = luma.get_pixel(x, y).0[0] as f32 / 255.0;
            let offset = min + (max - min) * grey;
            let normal = Vector3::from(vertex.normal);
            vertex.position = (Vector3::from(vertex.position) + normal * offset).into();
        }
        self.recompute_normals();
    }

    /// Area weighted vertex normals from the current triangles.
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vector3::<f32>::zero(); self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let pa = Vector3::from(self.vertices[a].position);
            let pb = Vector3::from(self.vertices[b].position);
            let pc = Vector3::from(self.vertices[c].position);
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            if normal.magnitude2() > f32::EPSILON {
                vertex.normal = normal.normalize().into();
            }
        }
    }
}
