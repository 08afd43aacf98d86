use std::{cell::RefCell, rc::Rc};

use scene_ngin::{
    Camera, CameraMode, Color4, Effect, HeadlessSurface, LoadCallbacks, LoadErrorKind, LoadState,
    MeshData, RenderDriver, Scene, SceneError, Stage, Target, Trigger, Viewport,
    resources::{MemorySource, Spawner},
};

use crate::common::test_utils::{
    BasicScene, Recorder, StalledSource, TRIANGLE_OBJ, basic_scene, driver, loader, runtime,
    stage_on,
};

mod common;

#[test]
fn should_draw_exactly_once_per_tick() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let mut driver = driver(&rt, scene);

    for _ in 0..3 {
        driver.tick_with_delta(0.016).unwrap();
    }

    let surface = driver.surface().unwrap();
    assert_eq!(surface.draw_count(), 3);
    let indices: Vec<u64> = surface.frames().map(|f| f.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(driver.frame_index(), 3);
}

#[test]
fn should_draw_default_material_for_bare_mesh() {
    let rt = runtime();
    let BasicScene { scene, sphere, ground, .. } = basic_scene();
    let mut driver = driver(&rt, scene);

    driver.tick().unwrap();

    let frame = driver.surface().unwrap().last_frame().unwrap();
    assert!(!frame.is_loading());
    assert_eq!(frame.items.len(), 2);
    assert!(frame.item(sphere).unwrap().material.id.is_none());
    assert!(frame.item(ground).is_some());
}

#[test]
fn should_refuse_to_start_without_active_camera() {
    let rt = runtime();
    let mut scene = Scene::new("no camera");
    scene.create_node("box", MeshData::cuboid("box", 1.0));
    let mut driver = RenderDriver::new(HeadlessSurface::default(), stage_on(&rt, scene));

    assert_eq!(driver.start(), Err(SceneError::NoActiveCamera));
    assert!(!driver.is_running());
    assert_eq!(driver.tick(), Err(SceneError::NotRunning));
    assert_eq!(driver.surface().unwrap().draw_count(), 0);
}

#[test]
fn should_fail_tick_when_active_camera_is_removed() {
    let rt = runtime();
    let BasicScene { scene, camera, .. } = basic_scene();
    let mut driver = driver(&rt, scene);

    driver.stage_mut().scene.remove(camera).unwrap();

    assert_eq!(driver.tick_with_delta(0.016), Err(SceneError::NoActiveCamera));
    assert_eq!(driver.surface().unwrap().draw_count(), 0);
}

#[test]
fn should_show_loading_frame_while_loading_ui_is_displayed() {
    let rt = runtime();
    let mut driver = RenderDriver::new(HeadlessSurface::default(), stage_on(&rt, Scene::new("empty")))
        .with_loading_colour(Color4::new(0.2, 0.2, 0.3, 1.0));
    driver.display_loading_ui();

    driver.start().unwrap();
    driver.tick_with_delta(0.016).unwrap();

    let frame = driver.surface().unwrap().last_frame().unwrap();
    assert!(frame.is_loading());
    assert_eq!(frame.clear_colour(), Color4::new(0.2, 0.2, 0.3, 1.0));

    driver.hide_loading_ui();
    assert_eq!(driver.tick_with_delta(0.016), Err(SceneError::NoActiveCamera));
}

#[test]
fn should_fail_with_surface_unavailable_after_destroy() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let mut driver = driver(&rt, scene);
    driver.tick_with_delta(0.016).unwrap();

    let surface = driver.destroy_surface().unwrap();

    assert_eq!(surface.draw_count(), 1);
    assert!(!driver.is_running());
    assert_eq!(driver.tick_with_delta(0.016), Err(SceneError::SurfaceUnavailable));
    assert_eq!(driver.start(), Err(SceneError::SurfaceUnavailable));
}

#[test]
fn should_keep_only_recent_frames_but_count_every_draw() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let surface = HeadlessSurface::new(Viewport::new(800, 600)).with_history(2);
    let mut driver = RenderDriver::new(surface, stage_on(&rt, scene));
    driver.start().unwrap();

    for _ in 0..5 {
        driver.tick_with_delta(0.016).unwrap();
    }

    let surface = driver.surface().unwrap();
    assert_eq!(surface.draw_count(), 5);
    let indices: Vec<u64> = surface.frames().map(|f| f.index).collect();
    assert_eq!(indices, vec![4, 5]);
    assert_eq!(surface.last_frame().map(|f| f.index), Some(5));
}

#[test]
fn should_cancel_loads_and_detach_bindings_on_stop() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let stage = Stage::new(scene, loader(StalledSource, Spawner::from_handle(rt.handle().clone())));
    let mut driver = RenderDriver::new(HeadlessSurface::default(), stage);
    driver.start().unwrap();
    let recorder = Recorder::default();
    driver
        .stage_mut()
        .bind(Trigger::EveryFrame, Target::Node(sphere), Effect::increment("position.x", 1.0))
        .unwrap();
    let load = driver.stage_mut().loader.load_with("slow/model.glb", recorder.callbacks());

    driver.stop();

    assert!(driver.stage().interactions.is_empty());
    assert_eq!(driver.stage().loader.in_flight(), 0);
    assert_eq!(load.state(), LoadState::Failed);
    let errors = recorder.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, LoadErrorKind::Cancelled);
    assert!(recorder.successes.borrow().is_empty());
}

#[test]
fn should_not_merge_finished_loads_into_replacement_scene() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let source = MemorySource::new().with("tri.obj", TRIANGLE_OBJ);
    let stage = Stage::new(scene, loader(source, Spawner::from_handle(rt.handle().clone())));
    let mut driver = RenderDriver::new(HeadlessSurface::default(), stage);
    driver.start().unwrap();
    let failures = Rc::new(RefCell::new(Vec::new()));
    let seen = failures.clone();
    let callbacks = LoadCallbacks::new()
        .on_error(move |stage, e| seen.borrow_mut().push((stage.scene.name.clone(), e.kind)));
    let load = driver.stage_mut().loader.load_with("tri.obj", callbacks);
    // the result is delivered but not applied yet
    rt.block_on(driver.stage_mut().loader.wait_idle());

    let mut next = Scene::new("next");
    next.create_node("camera", Camera::free().active());
    let old = driver.replace_scene(next);
    driver.tick_with_delta(0.016).unwrap();

    assert_eq!(driver.stage().scene.len(), 1);
    assert!(old.find_by_name("tri").is_none());
    assert_eq!(load.state(), LoadState::Failed);
    assert!(load.nodes().is_empty());
    assert_eq!(*failures.borrow(), vec![("basic".to_string(), LoadErrorKind::Cancelled)]);
    assert_eq!(driver.stage().loader.in_flight(), 0);
}

#[test]
fn should_drop_bindings_and_controls_when_replacing_scene() {
    let rt = runtime();
    let BasicScene { scene, sphere, camera, .. } = basic_scene();
    let mut driver = driver(&rt, scene);
    driver
        .stage_mut()
        .bind(Trigger::PointerDown, Target::Node(sphere), Effect::set("visible", false))
        .unwrap();
    driver.stage_mut().attach_control(camera).unwrap();

    let mut next = Scene::new("next");
    next.create_node("camera", Camera::free().active());
    let old = driver.replace_scene(next);

    assert_eq!(old.name, "basic");
    assert!(driver.stage().interactions.is_empty());
    assert!(driver.stage().controls().is_none());
    driver.tick_with_delta(0.016).unwrap();
    assert!(driver.surface().unwrap().last_frame().unwrap().items.is_empty());
}

#[test]
fn should_take_viewport_from_surface() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let mut driver = driver(&rt, scene);

    driver.resize(Viewport::new(1024, 512));
    driver.tick_with_delta(0.016).unwrap();

    assert_eq!(driver.stage().viewport(), Viewport::new(1024, 512));
    assert_eq!(driver.stage().frame(), 1);
}

#[test]
fn should_apply_finished_loads_before_drawing() {
    let rt = runtime();
    let BasicScene { scene, .. } = basic_scene();
    let source = MemorySource::new().with("tri.obj", TRIANGLE_OBJ);
    let spawner = Spawner::from_handle(rt.handle().clone());
    let stage = Stage::new(scene, loader(source, spawner));
    let mut driver = RenderDriver::new(HeadlessSurface::default(), stage);
    driver.start().unwrap();
    let added = Rc::new(RefCell::new(Vec::new()));
    let seen = added.clone();
    let callbacks = LoadCallbacks::new().on_success(move |_, nodes| seen.borrow_mut().extend_from_slice(nodes));
    let load = driver.stage_mut().loader.load_with("tri.obj", callbacks);
    rt.block_on(driver.stage_mut().loader.wait_idle());

    driver.tick_with_delta(0.016).unwrap();

    assert_eq!(added.borrow().len(), 2);
    assert_eq!(load.nodes(), *added.borrow());
    let frame = driver.surface().unwrap().last_frame().unwrap();
    assert_eq!(frame.items.len(), 3);
}

#[test]
fn should_advance_attached_arc_rotate_controls() {
    let rt = runtime();
    let BasicScene { scene, camera, .. } = basic_scene();
    let mut driver = driver(&rt, scene);
    driver.stage_mut().attach_control(camera).unwrap();
    let before = driver.stage().scene.node(camera).unwrap().as_camera().copied().unwrap();

    driver.stage_mut().controls_mut().unwrap().drag(100.0, 0.0);
    driver.tick_with_delta(0.016).unwrap();

    let after = driver.stage().scene.node(camera).unwrap().as_camera().copied().unwrap();
    match (before.mode, after.mode) {
        (
            CameraMode::ArcRotate { alpha: a0, .. },
            CameraMode::ArcRotate { alpha: a1, .. },
        ) => assert!((a0 - a1 - 0.5).abs() < 1e-4),
        _ => panic!("camera is no longer arc-rotate"),
    }
}

#[test]
fn should_reject_controls_on_non_camera() {
    let rt = runtime();
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage_on(&rt, scene);

    assert!(matches!(
        stage.attach_control(sphere),
        Err(SceneError::WrongNodeKind { expected: "camera", .. })
    ));
}
