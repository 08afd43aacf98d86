use cgmath::Vector3;
use scene_ngin::{
    Camera, CameraMode, Light, Material, Mesh, MeshData, Scene, SceneError, SceneFragment,
    Transform,
};

use crate::common::test_utils::{BasicScene, approx, basic_scene};

mod common;

#[test]
fn should_remove_node_with_its_descendants() {
    let mut scene = Scene::new("tree");
    let root = scene.create_node("root", Mesh::empty());
    let child = scene.create_node("child", Mesh::empty());
    let grandchild = scene.create_node("grandchild", MeshData::cuboid("box", 1.0));
    let unrelated = scene.create_node("unrelated", Mesh::empty());
    scene.set_parent(child, Some(root)).unwrap();
    scene.set_parent(grandchild, Some(child)).unwrap();

    let removed = scene.remove(root).unwrap();

    assert_eq!(removed.len(), 3);
    assert_eq!(removed[0], root);
    assert!(!scene.contains(child));
    assert!(!scene.contains(grandchild));
    assert!(scene.contains(unrelated));
    assert_eq!(scene.roots(), &[unrelated]);
}

#[test]
fn should_reject_parent_cycles() {
    let mut scene = Scene::new("tree");
    let a = scene.create_node("a", Mesh::empty());
    let b = scene.create_node("b", Mesh::empty());
    scene.set_parent(b, Some(a)).unwrap();

    let result = scene.set_parent(a, Some(b));

    assert_eq!(result, Err(SceneError::ParentCycle { child: a, parent: b }));
    assert_eq!(scene.parent(a).unwrap(), None);
    assert_eq!(scene.set_parent(a, Some(a)), Err(SceneError::ParentCycle { child: a, parent: a }));
}

#[test]
fn should_keep_last_activated_camera() {
    let mut scene = Scene::new("cameras");
    let first = scene.create_node("first", Camera::free().active());
    assert_eq!(scene.active_camera(), Some(first));

    let second = scene.create_node("second", Camera::arc_rotate(0.0, 1.0, 5.0, [0.0, 0.0, 0.0]).active());
    assert_eq!(scene.active_camera(), Some(second));
    assert!(!scene.node(first).unwrap().as_camera().unwrap().is_active());

    scene.set_active_camera(first).unwrap();
    assert_eq!(scene.active_camera(), Some(first));
    assert!(!scene.node(second).unwrap().as_camera().unwrap().is_active());
}

#[test]
fn should_refuse_to_activate_a_non_camera() {
    let BasicScene { mut scene, sphere, camera, .. } = basic_scene();

    let result = scene.set_active_camera(sphere);

    assert!(matches!(result, Err(SceneError::WrongNodeKind { expected: "camera", .. })));
    assert_eq!(scene.active_camera(), Some(camera));
}

#[test]
fn should_fail_to_render_without_active_camera() {
    let mut scene = Scene::new("dark");
    scene.create_node("box", MeshData::cuboid("box", 1.0));

    assert_eq!(scene.render_frame().unwrap_err(), SceneError::NoActiveCamera);
}

#[test]
fn should_merge_fragment_under_its_own_parents() {
    let BasicScene { mut scene, .. } = basic_scene();
    let before = scene.len();
    let mut fragment = SceneFragment::new();
    let group = fragment.push("group", Mesh::empty(), Transform::from_position([0.0, 2.0, 0.0]), None);
    fragment.push("leaf", MeshData::cuboid("leaf", 1.0), Transform::from_position([1.0, 0.0, 0.0]), Some(group));

    let handles = scene.merge(fragment).unwrap();

    assert_eq!(handles.len(), 2);
    assert_eq!(scene.len(), before + 2);
    assert_eq!(scene.parent(handles[1]).unwrap(), Some(handles[0]));
    let world = scene.world_position(handles[1]).unwrap();
    assert!(approx(world.x, 1.0) && approx(world.y, 2.0) && approx(world.z, 0.0));
}

#[test]
fn should_reject_fragment_with_forward_parent_without_inserting() {
    let mut scene = Scene::new("fragments");
    let mut fragment = SceneFragment::new();
    fragment.push("orphan", Mesh::empty(), Transform::new(), Some(1));
    fragment.push("late parent", Mesh::empty(), Transform::new(), None);

    let result = scene.merge(fragment);

    assert!(matches!(result, Err(SceneError::InvalidFragment(_))));
    assert!(scene.is_empty());
}

#[test]
fn should_compose_world_transforms_through_parents() {
    let mut scene = Scene::new("transforms");
    let parent = scene.create_node_at(
        "parent",
        Mesh::empty(),
        Transform::from_position([0.0, 0.0, 5.0]).with_scale([2.0, 2.0, 2.0]),
    );
    let child = scene.create_node_at("child", Mesh::empty(), Transform::from_position([1.0, 0.0, 0.0]));
    scene.set_parent(child, Some(parent)).unwrap();

    let world = scene.world_position(child).unwrap();

    assert!(approx(world.x, 2.0));
    assert!(approx(world.z, 5.0));
}

#[test]
fn should_hide_subtree_of_invisible_parent() {
    let BasicScene { mut scene, sphere, ground, .. } = basic_scene();
    scene.set_parent(ground, Some(sphere)).unwrap();

    scene.set_visible(sphere, false).unwrap();

    assert!(!scene.is_visible(ground));
    let frame = scene.render_frame().unwrap();
    assert!(frame.items.is_empty());
    assert_eq!(frame.lights.len(), 1);
}

#[test]
fn should_render_mesh_without_material_with_default_material() {
    let BasicScene { scene, sphere, .. } = basic_scene();

    let frame = scene.render_frame().unwrap();

    let item = frame.item(sphere).unwrap();
    assert_eq!(item.material.id, None);
    assert!(!item.material.is_transparent());
}

#[test]
fn should_replace_material_and_return_previous_one() {
    let BasicScene { mut scene, sphere, light, .. } = basic_scene();
    let first = Material::standard("first");
    let first_id = first.id();

    assert!(scene.attach_material(sphere, first).unwrap().is_none());
    let previous = scene.attach_material(sphere, Material::pbr("second")).unwrap();

    assert_eq!(previous.map(|m| m.id()), Some(first_id));
    assert!(matches!(
        scene.attach_material(light, Material::standard("light")),
        Err(SceneError::WrongNodeKind { expected: "mesh", .. })
    ));
}

#[test]
fn should_keep_arc_rotate_camera_off_the_poles() {
    let BasicScene { mut scene, camera, .. } = basic_scene();

    scene
        .update_camera(camera, |camera| {
            if let CameraMode::ArcRotate { beta, radius, .. } = &mut camera.mode {
                *beta = 0.0;
                *radius = -1.0;
            }
        })
        .unwrap();

    let node = scene.node(camera).unwrap().as_camera().unwrap();
    match node.mode {
        CameraMode::ArcRotate { beta, radius, .. } => {
            assert!(beta > 0.0);
            assert!(radius > 0.0);
        }
        _ => panic!("camera mode changed"),
    }
    assert!(node.is_active());
}

#[test]
fn should_collect_lights_in_world_space() {
    let mut scene = Scene::new("lights");
    scene.create_node("camera", Camera::free().active());
    let lamp = scene.create_node_at("lamp", Light::point(), Transform::from_position([0.0, 3.0, 0.0]));
    let holder = scene.create_node_at("holder", Mesh::empty(), Transform::from_position([2.0, 0.0, 0.0]));
    scene.set_parent(lamp, Some(holder)).unwrap();

    let frame = scene.render_frame().unwrap();

    assert_eq!(frame.lights.len(), 1);
    let position: Vector3<f32> = frame.lights[0].position;
    assert!(approx(position.x, 2.0) && approx(position.y, 3.0));
}

#[test]
fn should_snapshot_environment_and_detached_material() {
    let BasicScene { mut scene, sphere, ground, .. } = basic_scene();
    scene.attach_material(sphere, Material::pbr("shiny")).unwrap();
    scene.set_environment_intensity(0.5);
    scene.create_default_skybox(1000.0, true, 0.2);
    scene.enable_glow(1.0);
    scene.set_transform(ground, Transform::from_position([0.0, -3.0, 0.0])).unwrap();

    let detached = scene.detach_material(sphere).unwrap();
    let frame = scene.render_frame().unwrap();

    assert_eq!(detached.map(|m| m.name), Some("shiny".to_string()));
    assert_eq!(frame.item(sphere).unwrap().material.id, None);
    assert!(approx(frame.item(ground).unwrap().world.w.y, -3.0));
    assert!(approx(frame.environment.intensity, 0.5));
    assert_eq!(frame.environment.skybox.map(|s| s.size), Some(1000.0));
    assert_eq!(frame.environment.glow_intensity, Some(1.0));
    assert!(matches!(scene.detach_material(scene.active_camera().unwrap()), Err(SceneError::WrongNodeKind { .. })));
}
