use std::{cell::RefCell, rc::Rc};

use scene_ngin::{
    LoadErrorKind, LoadState, MaterialDesc, Progress, Shading, TextureRef, TextureSlot,
    resources::{FileSource, MemorySource},
};

use crate::common::test_utils::{
    BasicScene, Recorder, TRIANGLE_OBJ, TWO_OBJECTS_OBJ, approx, basic_scene, stage, tiny_png,
    triangle_bin, triangle_gltf,
};

mod common;

fn red_triangle_obj() -> String {
    let body = TRIANGLE_OBJ.replacen("o tri\n", "o tri\nusemtl red\n", 1);
    format!("mtllib tri.mtl\n{body}")
}

#[tokio::test]
async fn should_fail_missing_model_without_touching_scene() {
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new());
    let before = stage.scene.len();
    let recorder = Recorder::default();

    let load = stage.loader.load_with("missing.glb", recorder.callbacks());
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Failed);
    assert_eq!(load.error().map(|e| e.kind), Some(LoadErrorKind::NotFound));
    assert_eq!(recorder.errors.borrow().len(), 1);
    assert!(recorder.successes.borrow().is_empty());
    assert_eq!(stage.scene.len(), before);
}

#[tokio::test]
async fn should_add_obj_fragment_under_loader_root() {
    let BasicScene { scene, .. } = basic_scene();
    let source = MemorySource::new().with("models/pair.obj", TWO_OBJECTS_OBJ);
    let mut stage = stage(scene, source);
    let before = stage.scene.len();
    let recorder = Recorder::default();

    let load = stage.loader.load_with("models/pair.obj", recorder.callbacks());
    assert_eq!(load.state(), LoadState::Pending);
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Succeeded);
    let nodes = load.nodes();
    assert_eq!(nodes.len(), 3);
    assert_eq!(stage.scene.len(), before + 3);
    assert_eq!(*recorder.successes.borrow(), vec![nodes.clone()]);
    let root = stage.scene.node(nodes[0]).unwrap();
    assert_eq!(root.name, "__root__");
    assert_eq!(root.children(), &nodes[1..]);
    assert!(stage.scene.find_by_name("left").is_some());
    assert!(stage.scene.find_by_name("right").is_some());
}

#[tokio::test]
async fn should_resolve_obj_material_library_next_to_model() {
    let obj = red_triangle_obj();
    let mtl = "newmtl red\nKd 1.0 0.0 0.0\nd 0.5\nmap_Kd red.png\n";
    let source = MemorySource::new()
        .with("models/tri.obj", obj)
        .with("models/tri.mtl", mtl)
        .with("models/red.png", tiny_png());
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);

    let load = stage.loader.load("models/tri.obj");
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Succeeded);
    let mesh = stage.scene.node(load.nodes()[1]).unwrap().as_mesh().unwrap();
    let material = mesh.material.as_ref().unwrap();
    assert!(approx(material.params().alpha, 0.5));
    assert!(material.texture(TextureSlot::Albedo).unwrap().is_loaded());
}

#[tokio::test]
async fn should_fail_obj_with_missing_texture() {
    let obj = red_triangle_obj();
    let source = MemorySource::new()
        .with("tri.obj", obj)
        .with("tri.mtl", "newmtl red\nmap_Kd nowhere.png\n");
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);
    let before = stage.scene.len();

    let load = stage.loader.load("tri.obj");
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.error().map(|e| e.kind), Some(LoadErrorKind::NotFound));
    assert_eq!(stage.scene.len(), before);
}

#[tokio::test]
async fn should_load_gltf_with_external_buffer() {
    let source = MemorySource::new()
        .with("models/tri.gltf", triangle_gltf("tri.bin"))
        .with("models/tri.bin", triangle_bin());
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);

    let load = stage.loader.load("models/tri.gltf");
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Succeeded);
    let triangle = stage.scene.find_by_name("triangle").unwrap();
    assert_eq!(load.nodes(), vec![stage.scene.parent(triangle).unwrap().unwrap(), triangle]);
    let mesh = stage.scene.node(triangle).unwrap().as_mesh().unwrap();
    assert_eq!(mesh.geometry.as_ref().unwrap().triangle_count(), 1);
    assert!(approx(stage.scene.world_position(triangle).unwrap().y, 1.0));
}

#[tokio::test]
async fn should_fail_gltf_whose_buffer_is_missing() {
    let source = MemorySource::new().with("tri.gltf", triangle_gltf("gone.bin"));
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);
    let before = stage.scene.len();

    let load = stage.loader.load("tri.gltf");
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.error().map(|e| e.kind), Some(LoadErrorKind::NotFound));
    assert_eq!(stage.scene.len(), before);
}

#[tokio::test]
async fn should_report_malformed_documents() {
    let source = MemorySource::new().with("broken.gltf", "{ this is not json");
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);

    let load = stage.loader.load("broken.gltf");
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.error().map(|e| e.kind), Some(LoadErrorKind::Malformed));
}

#[tokio::test]
async fn should_reject_unknown_asset_kind_on_next_tick() {
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new().with("model.fbx", "binary"));
    let recorder = Recorder::default();

    let load = stage.loader.load_with("model.fbx", recorder.callbacks());
    assert_eq!(load.state(), LoadState::Pending);
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Failed);
    let errors = recorder.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, LoadErrorKind::UnresolvedReference);
    assert_eq!(errors[0].reference, "model.fbx");
}

#[tokio::test]
async fn should_report_non_decreasing_progress() {
    let source = MemorySource::new()
        .with_chunk_size(16)
        .with("pair.obj", TWO_OBJECTS_OBJ);
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);
    let recorder = Recorder::default();

    let load = stage.loader.load_with("pair.obj", recorder.callbacks());
    stage.loader.wait_idle().await;
    stage.process_loads();

    let ratios: Vec<f32> = recorder
        .progress
        .borrow()
        .iter()
        .map(|p| p.ratio().unwrap())
        .collect();
    assert!(ratios.len() > 1);
    assert!(ratios.windows(2).all(|w| w[0] <= w[1]));
    assert!(approx(*ratios.last().unwrap(), 1.0));
    assert_eq!(load.progress(), Some(Progress::Ratio(1.0)));
}

#[tokio::test]
async fn should_report_indeterminate_progress_without_length() {
    let source = MemorySource::new()
        .without_length()
        .with_chunk_size(16)
        .with("pair.obj", TWO_OBJECTS_OBJ);
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, source);
    let recorder = Recorder::default();

    stage.loader.load_with("pair.obj", recorder.callbacks());
    stage.loader.wait_idle().await;
    stage.process_loads();

    let progress = recorder.progress.borrow();
    assert!(!progress.is_empty());
    assert!(progress.iter().all(|p| p.ratio().is_none()));
    assert_eq!(
        progress.last().copied(),
        Some(Progress::Indeterminate {
            bytes_loaded: TWO_OBJECTS_OBJ.len() as u64
        })
    );
}

#[test]
fn should_truncate_megabytes_to_two_decimals() {
    let progress = Progress::Indeterminate {
        bytes_loaded: 1_572_864 + 10_000,
    };

    assert_eq!(progress.megabytes(), Some(1.5));
    assert_eq!(Progress::Ratio(0.5).megabytes(), None);
}

#[tokio::test]
async fn should_attach_loaded_material_to_mesh() {
    let source = MemorySource::new().with("textures/albedo.png", tiny_png());
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage(scene, source);
    let desc = MaterialDesc::new("painted", Shading::Standard)
        .with_texture(TextureRef::new(TextureSlot::Albedo, "textures/albedo.png").with_uv_scale(2.0, 2.0));
    let recorder = Recorder::default();

    let load = stage.loader.load_material(sphere, desc, recorder.callbacks());
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Succeeded);
    assert_eq!(*recorder.successes.borrow(), vec![vec![sphere]]);
    let mesh = stage.scene.node(sphere).unwrap().as_mesh().unwrap();
    let material = mesh.material.as_ref().unwrap();
    let albedo = material.texture(TextureSlot::Albedo).unwrap();
    assert!(albedo.is_loaded());
    assert!(approx(albedo.u_scale, 2.0));
}

#[tokio::test]
async fn should_fail_material_with_non_image_texture() {
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new().with("textures/notes.txt", "hello"));
    let desc = MaterialDesc::new("broken", Shading::Pbr)
        .with_texture(TextureRef::new(TextureSlot::Albedo, "textures/notes.txt"));

    let load = stage.loader.load_material(sphere, desc, Default::default());
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.error().map(|e| e.kind), Some(LoadErrorKind::UnresolvedReference));
    assert!(stage.scene.node(sphere).unwrap().as_mesh().unwrap().material.is_none());
}

#[tokio::test]
async fn should_hand_decoded_texture_to_callback() {
    let BasicScene { scene, sphere, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new().with("sky.png", tiny_png()));
    let sizes = Rc::new(RefCell::new(Vec::new()));
    let seen = sizes.clone();

    let load = stage.loader.load_texture("sky.png", move |stage, texture| {
        if let Some(image) = &texture.image {
            seen.borrow_mut().push(image.dimensions());
        }
        let material = scene_ngin::Material::standard("sky").with_texture(TextureSlot::Emissive, texture);
        let _ = stage.scene.attach_material(sphere, material);
    });
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Succeeded);
    assert_eq!(*sizes.borrow(), vec![(2, 2)]);
    let frame = stage.scene.render_frame().unwrap();
    assert!(frame.item(sphere).unwrap().material.emissive_map.is_some());
}

#[tokio::test]
async fn should_run_error_callback_for_cancelled_load() {
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new().with("tri.obj", TRIANGLE_OBJ));
    let before = stage.scene.len();
    let recorder = Recorder::default();

    let load = stage.loader.load_with("tri.obj", recorder.callbacks());
    assert!(stage.loader.cancel(load.id()));
    assert!(!stage.loader.cancel(load.id()));
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert_eq!(load.state(), LoadState::Failed);
    assert_eq!(
        recorder.errors.borrow().iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![LoadErrorKind::Cancelled]
    );
    assert!(recorder.successes.borrow().is_empty());
    assert_eq!(stage.scene.len(), before);
    assert_eq!(stage.loader.in_flight(), 0);
}

#[tokio::test]
async fn should_let_success_callback_edit_the_stage() {
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, MemorySource::new().with("tri.obj", TRIANGLE_OBJ));
    let callbacks = scene_ngin::LoadCallbacks::new().on_success(|stage, nodes| {
        if let Some(root) = nodes.first() {
            let _ = stage.scene.set_visible(*root, false);
        }
        stage.hide_loading_ui();
    });
    stage.display_loading_ui();

    let load = stage.loader.load_with("tri.obj", callbacks);
    stage.loader.wait_idle().await;
    stage.process_loads();

    assert!(!stage.is_loading_ui());
    assert!(!stage.scene.is_visible(load.nodes()[1]));
}

#[tokio::test]
async fn should_read_models_below_the_asset_root() {
    let root = std::env::temp_dir().join(format!("scene-ngin-assets-{}", std::process::id()));
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::write(root.join("models/pair.obj"), TWO_OBJECTS_OBJ).unwrap();
    let BasicScene { scene, .. } = basic_scene();
    let mut stage = stage(scene, FileSource::new(&root));
    let recorder = Recorder::default();

    let found = stage.loader.load_with("models/pair.obj", recorder.callbacks());
    let missing = stage.loader.load("models/none.obj");
    stage.loader.wait_idle().await;
    stage.process_loads();
    std::fs::remove_dir_all(&root).unwrap();

    assert_eq!(found.state(), LoadState::Succeeded);
    assert_eq!(found.nodes().len(), 3);
    assert!(recorder.progress.borrow().iter().any(|p| p.ratio() == Some(1.0)));
    assert_eq!(missing.error().map(|e| e.kind), Some(LoadErrorKind::NotFound));
}
