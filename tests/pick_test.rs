use cgmath::{InnerSpace, Vector3};
use scene_ngin::{
    Mesh, MeshData, Scene, SceneError, Transform, Viewport,
    pick::{Ray, pick, pick_ray},
};

use crate::common::test_utils::{BasicScene, approx, basic_scene};

mod common;

#[test]
fn should_pick_nearest_mesh_under_pointer() {
    let BasicScene { mut scene, sphere, .. } = basic_scene();
    // a box behind the sphere, seen from the camera
    scene.create_node_at("behind", MeshData::cuboid("behind", 1.0), Transform::from_position([0.0, 0.0, 4.0]));

    let hit = pick(&scene, Viewport::new(800, 600), 405.0, 296.0).unwrap().unwrap();

    assert_eq!(hit.node, sphere);
    assert!(hit.distance > 8.0 && hit.distance < 10.0);
}

#[test]
fn should_skip_hidden_and_unpickable_meshes() {
    let BasicScene { mut scene, sphere, .. } = basic_scene();
    let behind = scene.create_node_at(
        "behind",
        MeshData::cuboid("behind", 1.0),
        Transform::from_position([0.0, 0.0, 4.0]),
    );

    scene.update_mesh(sphere, |mesh| mesh.pickable = false).unwrap();
    let hit = pick(&scene, Viewport::new(800, 600), 405.0, 296.0).unwrap();
    assert_eq!(hit.map(|h| h.node), Some(behind));

    scene.set_visible(behind, false).unwrap();
    assert!(pick(&scene, Viewport::new(800, 600), 405.0, 296.0).unwrap().is_none());
}

#[test]
fn should_need_an_active_camera_to_pick() {
    let mut scene = Scene::new("blind");
    scene.create_node("box", MeshData::cuboid("box", 1.0));

    assert_eq!(
        pick(&scene, Viewport::default(), 400.0, 300.0).unwrap_err(),
        SceneError::NoActiveCamera
    );
}

#[test]
fn should_respect_parent_transforms_when_picking() {
    let mut scene = Scene::new("nested");
    let group = scene.create_node_at("group", Mesh::empty(), Transform::from_position([5.0, 0.0, 0.0]));
    let cube = scene.create_node("cube", MeshData::cuboid("cube", 1.0));
    scene.set_parent(cube, Some(group)).unwrap();
    let ray = Ray {
        origin: Vector3::new(5.1, 0.2, -10.0),
        direction: Vector3::unit_z(),
    };

    let hit = pick_ray(&scene, &ray).unwrap();

    assert_eq!(hit.node, cube);
    assert!(approx(hit.point.z, -0.5));
    assert!(pick_ray(&scene, &Ray { origin: Vector3::new(0.0, 0.0, -10.0), ..ray }).is_none());
}

#[test]
fn should_shoot_centre_ray_along_camera_forward() {
    let BasicScene { scene, .. } = basic_scene();
    let view = scene.active_camera_view().unwrap();
    let viewport = Viewport::new(800, 600);

    let ray = Ray::from_screen(view.view_proj(viewport.aspect()), viewport, 400.0, 300.0).unwrap();

    assert!(approx(ray.direction.magnitude(), 1.0));
    assert!(ray.direction.dot(Vector3::unit_z()) > 0.999);
}
