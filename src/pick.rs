//! Pointer picking against scene geometry.
//!
//! A ray is cast from the active camera through the pointer position and
//! tested on the CPU: first against each mesh's bounding sphere, then against
//! its triangles. Only visible, pickable meshes with geometry take part.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4};

use crate::{
    data_structures::scene_graph::{NodeHandle, NodeKind, Scene},
    error::SceneError,
    render::Viewport,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub node: NodeHandle,
    pub distance: f32,
    pub point: Vector3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    /// Unit length.
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }

    /// Ray through pixel (`x`, `y`) of the viewport, top-left origin.
    pub fn from_screen(view_proj: Matrix4<f32>, viewport: Viewport, x: f32, y: f32) -> Option<Self> {
        let inverse = view_proj.invert()?;
        let ndc_x = 2.0 * x / viewport.width.max(1) as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * y / viewport.height.max(1) as f32;
        let unproject = |z: f32| {
            let p = inverse * Vector4::new(ndc_x, ndc_y, z, 1.0);
            p.truncate() / p.w
        };
        let near = unproject(0.0);
        let far = unproject(1.0);
        let direction = far - near;
        if direction.magnitude2() <= f32::EPSILON {
            return None;
        }
        Some(Self {
            origin: near,
            direction: direction.normalize(),
        })
    }

    /// Distance to the first sphere intersection in front of the origin.
    pub fn intersect_sphere(&self, center: Vector3<f32>, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.magnitude2() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let (t1, t2) = (-b - root, -b + root);
        if t1 >= 0.0 {
            Some(t1)
        } else if t2 >= 0.0 {
            // origin inside the sphere
            Some(t2)
        } else {
            None
        }
    }

    /// Möller–Trumbore; both faces count.
    pub fn intersect_triangle(&self, [a, b, c]: [Vector3<f32>; 3]) -> Option<f32> {
        let edge1 = b - a;
        let edge2 = c - a;
        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < 1e-7 {
            return None;
        }
        let f = 1.0 / det;
        let s = self.origin - a;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = f * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(q);
        (t > 1e-6).then_some(t)
    }
}

/// Nearest mesh under pixel (`x`, `y`), if any.
pub fn pick(scene: &Scene, viewport: Viewport, x: f32, y: f32) -> Result<Option<PickHit>, SceneError> {
    let view_proj = scene.active_camera_view()?.view_proj(viewport.aspect());
    let Some(ray) = Ray::from_screen(view_proj, viewport, x, y) else {
        return Ok(None);
    };
    Ok(pick_ray(scene, &ray))
}

pub fn pick_ray(scene: &Scene, ray: &Ray) -> Option<PickHit> {
    let mut candidates = Vec::new();
    scene.walk(|handle, node| {
        if let NodeKind::Mesh(mesh) = node.kind() {
            if let (true, Some(geometry)) = (mesh.pickable, &mesh.geometry) {
                candidates.push((handle, geometry.clone()));
            }
        }
    });

    let mut best: Option<PickHit> = None;
    for (handle, geometry) in candidates {
        if !scene.is_visible(handle) {
            continue;
        }
        let Ok(world) = scene.world_matrix(handle) else {
            continue;
        };
        let (center, radius) = geometry.bounding_sphere();
        let world_center = (world * center.extend(1.0)).truncate();
        let world_radius = radius * max_scale(&world);
        match ray.intersect_sphere(world_center, world_radius) {
            Some(t) if best.is_none_or(|hit| t <= hit.distance) => (),
            _ => continue,
        }
        for triangle in geometry.triangles() {
            let world_triangle = triangle.map(|p| (world * p.extend(1.0)).truncate());
            if let Some(t) = ray.intersect_triangle(world_triangle) {
                if best.is_none_or(|hit| t < hit.distance) {
                    best = Some(PickHit {
                        node: handle,
                        distance: t,
                        point: ray.at(t),
                    });
                }
            }
        }
    }
    best
}

fn max_scale(world: &Matrix4<f32>) -> f32 {
    world
        .x
        .truncate()
        .magnitude()
        .max(world.y.truncate().magnitude())
        .max(world.z.truncate().magnitude())
}
