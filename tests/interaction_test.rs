use std::{cell::RefCell, rc::Rc};

use scene_ngin::{
    ActionEvent, Effect, MeshData, SceneError, Target, Transform, Trigger, Value,
    interaction::PointerEvent,
};

use crate::common::test_utils::{BasicScene, approx, basic_scene, driver, runtime, stage_on};

mod common;

#[test]
fn should_scale_clicked_mesh_only() {
    let rt = runtime();
    let BasicScene { scene, sphere, ground, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let ground_before = stage.scene.transform(ground).unwrap();
    stage
        .bind(
            Trigger::PointerDown,
            Target::Node(sphere),
            Effect::set("scaling", [1.5, 1.5, 1.5]),
        )
        .unwrap();

    // slightly off centre so the ray does not graze a shared vertex
    let ran = stage.pointer_down(405.0, 296.0);

    assert_eq!(ran, 1);
    let scale = stage.scene.transform(sphere).unwrap().scale;
    assert!(approx(scale.x, 1.5) && approx(scale.y, 1.5) && approx(scale.z, 1.5));
    assert_eq!(stage.scene.transform(ground).unwrap(), ground_before);
}

#[test]
fn should_not_fire_when_pointer_misses() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    stage
        .bind(Trigger::PointerDown, Target::Node(sphere), Effect::set("visible", false))
        .unwrap();

    let ran = stage.pointer_down(5.0, 5.0);

    assert_eq!(ran, 0);
    assert!(stage.scene.is_visible(sphere));
}

#[test]
fn should_fire_scene_bindings_for_any_picked_mesh() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let sources = Rc::new(RefCell::new(Vec::new()));
    let seen = sources.clone();
    stage
        .bind(
            Trigger::PointerDown,
            Target::Scene,
            Effect::execute(move |event: &ActionEvent, _, _| seen.borrow_mut().push(event.source)),
        )
        .unwrap();

    stage.pointer_down(405.0, 296.0);

    assert_eq!(*sources.borrow(), vec![Some(sphere)]);
}

#[test]
fn should_fire_pointer_over_once_per_entry() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    stage
        .bind(Trigger::PointerOver, Target::Node(sphere), Effect::increment("position.y", 1.0))
        .unwrap();

    assert_eq!(stage.pointer_move(405.0, 296.0), 1);
    assert_eq!(stage.pointer_move(406.0, 296.0), 0);

    let y = stage.scene.transform(sphere).unwrap().position.y;
    assert!(approx(y, 1.0));
}

#[test]
fn should_accumulate_every_frame_increment_per_tick() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut driver = driver(&rt, scene);
    let pointer_events = Rc::new(RefCell::new(0));
    let counter = pointer_events.clone();
    let stage = driver.stage_mut();
    stage
        .bind(Trigger::EveryFrame, Target::Node(sphere), Effect::increment("rotation.y", 0.01))
        .unwrap();
    stage
        .bind(Trigger::PointerDown, Target::Node(sphere), Effect::increment("position.x", 0.0))
        .unwrap();
    stage
        .bind(Trigger::PointerOver, Target::Node(sphere), Effect::set("scaling", [1.0, 1.0, 1.0]))
        .unwrap();
    stage
        .bind(
            Trigger::PointerDown,
            Target::Scene,
            Effect::execute(move |_, _, _| *counter.borrow_mut() += 1),
        )
        .unwrap();

    for i in 0..10 {
        driver.tick_with_delta(0.016).unwrap();
        // clicks and hover changes land between ticks
        driver.pointer_down(405.0, 296.0);
        driver.pointer_move(if i % 2 == 0 { 5.0 } else { 405.0 }, 296.0);
        driver.pointer_down(405.0, 296.0);
    }

    let rotation = driver.stage().scene.transform(sphere).unwrap().rotation;
    assert!(approx(rotation.y, 0.1));
    assert_eq!(*pointer_events.borrow(), 20);
}

#[test]
fn should_run_every_frame_bindings_once_per_frame_index() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();
    stage
        .bind(
            Trigger::EveryFrame,
            Target::Scene,
            Effect::execute(move |_, _, _| *counter.borrow_mut() += 1),
        )
        .unwrap();
    let (scene, interactions, loader) = (&mut stage.scene, &mut stage.interactions, &mut stage.loader);

    interactions.dispatch_frame(scene, loader, 1, 0.016);
    interactions.dispatch_frame(scene, loader, 1, 0.016);
    interactions.dispatch_frame(scene, loader, 2, 0.016);

    assert_eq!(*calls.borrow(), 2);
}

#[test]
fn should_clear_rotation_quaternion_when_rotation_is_set() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let mut transform = stage.scene.transform(sphere).unwrap();
    transform.rotation_quaternion = Some(cgmath::Quaternion::new(1.0, 0.0, 0.0, 0.0));
    stage.scene.set_transform(sphere, transform).unwrap();
    stage
        .bind(Trigger::EveryFrame, Target::Node(sphere), Effect::set("rotation.x", 0.5))
        .unwrap();
    let (scene, interactions, loader) = (&mut stage.scene, &mut stage.interactions, &mut stage.loader);

    interactions.dispatch_frame(scene, loader, 1, 0.016);

    let transform = scene.transform(sphere).unwrap();
    assert!(transform.rotation_quaternion.is_none());
    assert!(approx(transform.rotation.x, 0.5));
}

#[test]
fn should_create_default_material_when_editing_material_fields() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    stage
        .bind(Trigger::EveryFrame, Target::Node(sphere), Effect::set("material.alpha", 0.5))
        .unwrap();
    let (scene, interactions, loader) = (&mut stage.scene, &mut stage.interactions, &mut stage.loader);

    interactions.dispatch_frame(scene, loader, 1, 0.016);

    let frame = scene.render_frame().unwrap();
    let item = frame.item(sphere).unwrap();
    assert!(item.material.id.is_some());
    assert!(item.material.is_transparent());
}

#[test]
fn should_reject_invalid_bindings() {
    let rt = runtime();
    let BasicScene { mut scene, camera, light, sphere, .. } = basic_scene();
    let removed = scene.create_node("removed", MeshData::cuboid("removed", 1.0));
    scene.remove(removed).unwrap();
    let mut stage = stage_on(&rt, scene);

    let invalid = |result: Result<_, SceneError>| matches!(result, Err(SceneError::InvalidBinding(_)));

    assert!(invalid(stage.bind(Trigger::PointerDown, Target::Node(removed), Effect::set("visible", false))));
    assert!(invalid(stage.bind(Trigger::PointerDown, Target::Node(camera), Effect::set("fov", 1.0))));
    assert!(invalid(stage.bind(Trigger::PointerOver, Target::Node(light), Effect::set("intensity", 1.0))));
    assert!(invalid(stage.bind(Trigger::EveryFrame, Target::Node(sphere), Effect::set("colour", 1.0))));
    assert!(invalid(stage.bind(Trigger::EveryFrame, Target::Node(sphere), Effect::set("position", 1.0))));
    assert!(invalid(stage.bind(Trigger::EveryFrame, Target::Node(sphere), Effect::increment("visible", true))));
    assert!(invalid(stage.bind(Trigger::EveryFrame, Target::Node(light), Effect::set("fov", 1.0))));
    assert!(invalid(stage.bind(Trigger::EveryFrame, Target::Scene, Effect::set("position.x", 1.0))));
    assert!(stage.interactions.is_empty());

    assert!(stage.bind(Trigger::EveryFrame, Target::Node(light), Effect::set("intensity", 0.2)).is_ok());
    assert!(stage.bind(Trigger::EveryFrame, Target::Scene, Effect::set("environmentIntensity", 0.2)).is_ok());
    assert_eq!(stage.interactions.len(), 2);
}

#[test]
fn should_drop_bindings_of_removed_nodes() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    stage
        .bind(Trigger::EveryFrame, Target::Node(sphere), Effect::increment("position.x", 1.0))
        .unwrap();
    stage
        .bind(Trigger::EveryFrame, Target::Scene, Effect::increment("environmentIntensity", 0.5))
        .unwrap();
    stage.scene.remove(sphere).unwrap();
    let (scene, interactions, loader) = (&mut stage.scene, &mut stage.interactions, &mut stage.loader);

    let ran = interactions.dispatch_frame(scene, loader, 1, 0.016);

    assert_eq!(ran, 1);
    assert_eq!(interactions.len(), 1);
}

#[test]
fn should_unbind_single_binding() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let id = stage
        .bind(Trigger::PointerDown, Target::Node(sphere), Effect::set("visible", false))
        .unwrap();

    assert!(stage.interactions.unbind(id));
    assert!(!stage.interactions.unbind(id));
    assert_eq!(stage.pointer_down(405.0, 296.0), 0);
}

#[test]
fn should_hand_pointer_details_to_handlers() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);
    let events = Rc::new(RefCell::new(Vec::new()));
    let seen = events.clone();
    stage
        .bind(
            Trigger::PointerDown,
            Target::Node(sphere),
            Effect::execute(move |event: &ActionEvent, scene, _| {
                seen.borrow_mut().push((event.pointer, event.frame));
                let mut transform = scene.transform(sphere).unwrap_or_else(|_| Transform::new());
                transform.position.z += 1.0;
                let _ = scene.set_transform(sphere, transform);
            }),
        )
        .unwrap();
    let (scene, interactions, loader) = (&mut stage.scene, &mut stage.interactions, &mut stage.loader);

    let ran = interactions.dispatch_pointer(
        scene,
        loader,
        PointerEvent::Down {
            x: 12.0,
            y: 34.0,
            hit: Some(sphere),
        },
        7,
    );

    assert_eq!(ran, 1);
    assert_eq!(*events.borrow(), vec![(Some((12.0, 34.0)), 7)]);
    assert!(approx(scene.transform(sphere).unwrap().position.z, 1.0));
}

#[test]
fn should_convert_plain_values() {
    assert_eq!(Value::from(2.0), Value::Scalar(2.0));
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from([1.0, 2.0, 3.0]), Value::Vector(cgmath::Vector3::new(1.0, 2.0, 3.0)));
}
