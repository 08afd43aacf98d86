//! Six small scenes showing off scene-ngin. Pick one by name:
//!
//! `cargo run -p gallery -- pbr`
//!
//! Scenes: basic, standard, pbr, actions, loading, camera.

use std::f32::consts::PI;

use scene_ngin::{
    Camera, Color3, DriverConfig, Effect, EnvironmentTexture, Light, LoadCallbacks, Material,
    MaterialDesc, MaterialParams, MeshData, NodeHandle, Progress, SceneFlow, Shading, Stage,
    Target, TextureRef, TextureSlot, Transform, Trigger, cgmath::Vector3,
};

#[derive(Clone, Copy, Debug)]
enum Gallery {
    Basic,
    StandardMaterials,
    Pbr,
    MeshActions,
    CustomLoading,
    CameraMechanics,
}

impl Gallery {
    fn parse(name: &str) -> Option<Self> {
        let scene = match name {
            "basic" => Gallery::Basic,
            "standard" => Gallery::StandardMaterials,
            "pbr" => Gallery::Pbr,
            "actions" => Gallery::MeshActions,
            "loading" => Gallery::CustomLoading,
            "camera" => Gallery::CameraMechanics,
            _ => return None,
        };
        Some(scene)
    }
}

impl SceneFlow for Gallery {
    fn on_init(&mut self, stage: &mut Stage) -> anyhow::Result<()> {
        match self {
            Gallery::Basic => basic(stage),
            Gallery::StandardMaterials => standard_materials(stage),
            Gallery::Pbr => pbr(stage),
            Gallery::MeshActions => mesh_actions(stage),
            Gallery::CustomLoading => custom_loading(stage),
            Gallery::CameraMechanics => camera_mechanics(stage),
        }
    }
}

fn free_camera(stage: &mut Stage, position: [f32; 3], speed: f32) -> anyhow::Result<NodeHandle> {
    let mut camera = Camera::free().active();
    camera.speed = speed;
    let handle = stage
        .scene
        .create_node_at("camera", camera, Transform::from_position(position));
    stage.attach_control(handle)?;
    Ok(handle)
}

fn hemi_light(stage: &mut Stage, intensity: f32) -> NodeHandle {
    stage
        .scene
        .create_node("hemiLight", Light::hemispheric([0.0, 1.0, 0.0]).with_intensity(intensity))
}

/// Textures of one material set, all scaled by `uv_scale`.
fn textured(name: &str, shading: Shading, textures: &[(TextureSlot, &str)], uv_scale: f32) -> MaterialDesc {
    textures.iter().fold(MaterialDesc::new(name, shading), |desc, (slot, reference)| {
        desc.with_texture(TextureRef::new(*slot, *reference).with_uv_scale(uv_scale, uv_scale))
    })
}

/// Displaces `mesh` once its height map arrives.
fn displace(stage: &mut Stage, mesh: NodeHandle, height_map: &str, max: f32) {
    stage.loader.load_texture(height_map, move |stage, texture| {
        let Some(image) = texture.image else {
            return;
        };
        let height_map = image::DynamicImage::ImageRgba8((*image).clone());
        let result = stage.scene.update_mesh(mesh, |m| {
            if let Some(geometry) = &m.geometry {
                let mut displaced = (**geometry).clone();
                displaced.apply_displacement_map(&height_map, 0.0, max);
                m.geometry = Some(displaced.into());
            }
        });
        if let Err(e) = result {
            log::warn!("displacement skipped: {e}");
        }
    });
}

fn basic(stage: &mut Stage) -> anyhow::Result<()> {
    free_camera(stage, [0.0, 1.0, -5.0], 0.25)?;
    hemi_light(stage, 0.5);
    stage.scene.create_node("ground", MeshData::ground("ground", 10.0, 10.0, 1));
    let ball = stage.scene.create_node_at(
        "ball",
        MeshData::sphere("ball", 1.0, 32),
        Transform::from_position([0.0, 1.0, 0.0]),
    );
    displace(stage, ball, "textures/painted/painted_displacement.png", 0.05);
    let desc = textured(
        "painted",
        Shading::Standard,
        &[
            (TextureSlot::Albedo, "textures/painted/painted_diffuse.png"),
            (TextureSlot::Bump, "textures/painted/painted_normal.png"),
        ],
        1.0,
    );
    stage.loader.load_material(ball, desc, LoadCallbacks::new());
    Ok(())
}

fn standard_materials(stage: &mut Stage) -> anyhow::Result<()> {
    free_camera(stage, [0.0, 1.0, -5.0], 0.25)?;
    hemi_light(stage, 1.0);
    let ground = stage
        .scene
        .create_node("ground", MeshData::ground("ground", 10.0, 10.0, 1));
    let ball = stage.scene.create_node_at(
        "ball",
        MeshData::sphere("ball", 1.0, 32),
        Transform::from_position([0.0, 1.0, 0.0]),
    );

    let stone = textured(
        "groundMat",
        Shading::Standard,
        &[
            (TextureSlot::Albedo, "textures/stone/stone_diffuse.jpg"),
            (TextureSlot::Bump, "textures/stone/stone_normal.jpg"),
            (TextureSlot::Ambient, "textures/stone/stone_ao.jpg"),
            (TextureSlot::Specular, "textures/stone/stone_spec.jpg"),
        ],
        4.0,
    );
    let metal = textured(
        "ballMat",
        Shading::Standard,
        &[
            (TextureSlot::Albedo, "textures/metal/metal_diffuse.jpg"),
            (TextureSlot::Bump, "textures/metal/metal_normal.jpg"),
            (TextureSlot::Ambient, "textures/metal/metal_ao.jpg"),
            (TextureSlot::Specular, "textures/metal/metal_spec.jpg"),
        ],
        2.0,
    )
    .with_params(MaterialParams {
        specular_power: 4.0,
        ..MaterialParams::default()
    });
    stage.loader.load_material(ground, stone, LoadCallbacks::new());
    stage.loader.load_material(ball, metal, LoadCallbacks::new());
    Ok(())
}

fn pbr(stage: &mut Stage) -> anyhow::Result<()> {
    free_camera(stage, [0.0, 1.0, -5.0], 0.25)?;
    hemi_light(stage, 0.0);
    stage
        .scene
        .set_environment_texture(EnvironmentTexture::new("environment/sky.env"));
    stage.scene.create_default_skybox(1000.0, true, 0.0);
    stage.scene.enable_glow(1.0);

    let ground = stage
        .scene
        .create_node("ground", MeshData::ground("ground", 10.0, 10.0, 1));
    let ball = stage.scene.create_node_at(
        "ball",
        MeshData::sphere("ball", 1.0, 32),
        Transform::from_position([0.0, 1.0, 0.0]),
    );
    displace(stage, ball, "textures/painted/painted_displacement.png", 0.1);

    let packed = MaterialParams {
        invert_normal_map_x: true,
        invert_normal_map_y: true,
        ambient_occlusion_from_metallic_r: true,
        roughness_from_metallic_g: true,
        metalness_from_metallic_b: true,
        ..MaterialParams::default()
    };
    let asphalt = textured(
        "asphalt",
        Shading::Pbr,
        &[
            (TextureSlot::Albedo, "textures/asphalt/asphalt_diffuse.jpg"),
            (TextureSlot::Bump, "textures/asphalt/asphalt_normal.jpg"),
            (TextureSlot::Metallic, "textures/asphalt/asphalt_ao_rough_metal.jpg"),
        ],
        1.0,
    )
    .with_params(packed.clone());
    let magic = textured(
        "magic",
        Shading::Pbr,
        &[
            (TextureSlot::Albedo, "textures/painted/painted_diffuse.png"),
            (TextureSlot::Bump, "textures/painted/painted_normal.png"),
            (TextureSlot::Metallic, "textures/painted/painted_arm.png"),
            (TextureSlot::MicroSurface, "textures/painted/painted_displacement.png"),
        ],
        1.0,
    )
    .with_params(MaterialParams {
        environment_intensity: 0.2,
        emissive_colour: Color3::new(0.55, 0.08, 0.0),
        emissive_intensity: 0.06,
        roughness: 1.0,
        ..packed
    });
    stage.loader.load_material(ground, asphalt, LoadCallbacks::new());
    stage.loader.load_material(ball, magic, LoadCallbacks::new());
    Ok(())
}

fn mesh_actions(stage: &mut Stage) -> anyhow::Result<()> {
    free_camera(stage, [0.0, 0.0, -30.0], 2.0)?;
    hemi_light(stage, 0.0);
    stage
        .scene
        .set_environment_texture(EnvironmentTexture::new("environment/xmas_bg.env"));
    stage.scene.create_default_skybox(1000.0, true, 0.2);
    stage.scene.set_environment_intensity(1.5);

    let path: Vec<Vector3<f32>> = (-20..2).map(|i| Vector3::new(i as f32 * 0.2, 0.0, 0.0)).collect();
    let mut see_through = Material::standard("mat1");
    {
        let params = see_through.params_mut();
        params.alpha = 0.8;
        params.emissive_colour = Color3::new(0.0, 1.0, 1.0);
        params.back_face_culling = false;
    }
    let tube = stage.scene.create_node_at(
        "cube",
        MeshData::tube("cube", &path, 2.0, 16),
        Transform::from_position([-10.0, 0.0, 0.0]),
    );
    stage.scene.attach_material(tube, see_through)?;

    let mut red = Material::pbr("sphereMat");
    red.params_mut().albedo_colour = Color3::new(1.0, 0.0, 0.0);
    red.params_mut().roughness = 1.0;
    let sphere = stage.scene.create_node("sphere", MeshData::sphere("sphere", 1.0, 32));
    stage.scene.attach_material(sphere, red)?;

    let ground = stage.scene.create_node_at(
        "ground",
        MeshData::ground("ground", 10.0, 10.0, 1),
        Transform::from_position([10.0, 0.0, 0.0]),
    );
    let mut ground_mat = Material::standard("mat1");
    ground_mat.params_mut().alpha = 0.8;
    ground_mat.params_mut().emissive_colour = Color3::new(0.0, 1.0, 1.0);
    ground_mat.params_mut().back_face_culling = false;
    stage.scene.attach_material(ground, ground_mat)?;

    stage.bind(
        Trigger::PointerDown,
        Target::Node(tube),
        Effect::set("scaling", [1.5, 1.5, 1.5]),
    )?;
    stage.bind(
        Trigger::EveryFrame,
        Target::Node(tube),
        Effect::increment("rotation.z", -0.01),
    )?;
    stage.bind(
        Trigger::PointerOver,
        Target::Scene,
        Effect::execute(|event, _, _| log::info!("pointer over {:?} at {:?}", event.source, event.pointer)),
    )?;
    Ok(())
}

fn custom_loading(stage: &mut Stage) -> anyhow::Result<()> {
    stage.display_loading_ui();
    free_camera(stage, [0.0, 0.75, -8.0], 0.25)?;
    stage
        .scene
        .set_environment_texture(EnvironmentTexture::new("environment/sky.env"));
    stage.scene.create_default_skybox(1000.0, true, 0.0);
    stage.scene.set_environment_intensity(0.5);
    hemi_light(stage, 0.7);

    let callbacks = LoadCallbacks::new()
        .on_progress(|progress| match progress {
            Progress::Ratio(ratio) => log::info!("{}%", (ratio * 100.0).round()),
            Progress::Indeterminate { .. } => {
                log::info!("{} MB", progress.megabytes().unwrap_or_default())
            }
        })
        .on_success(|stage, nodes| {
            log::info!("cornell box ready with {} nodes", nodes.len());
            stage.hide_loading_ui();
        })
        .on_error(|stage, e| {
            log::error!("{e}");
            stage.hide_loading_ui();
        });
    stage
        .loader
        .load_with("http://models.babylonjs.com/CornellBox/cornellBox.glb", callbacks);
    Ok(())
}

fn camera_mechanics(stage: &mut Stage) -> anyhow::Result<()> {
    hemi_light(stage, 0.0);
    let mut environment = EnvironmentTexture::new("environment/xmas_bg.env");
    environment.rotation_y = PI;
    stage.scene.set_environment_texture(environment);
    stage.scene.create_default_skybox(1000.0, true, 0.0);

    let camera = stage
        .scene
        .create_node("camera", Camera::arc_rotate(0.0, 0.0, 5.0, [0.0, 0.0, 0.0]).active());
    stage.attach_control(camera)?;
    stage.display_loading_ui();

    let callbacks = LoadCallbacks::new()
        .on_success(move |stage, nodes| {
            if let Some(face) = nodes.get(2) {
                match stage.scene.world_position(*face) {
                    Ok(target) => {
                        let _ = stage
                            .scene
                            .update_camera(camera, |c| c.set_target(Vector3::new(0.0, 0.0, 0.0), target));
                    }
                    Err(e) => log::warn!("cannot aim camera: {e}"),
                }
            }
            stage.hide_loading_ui();
        })
        .on_error(|stage, e| {
            log::error!("{e}");
            stage.hide_loading_ui();
        });
    stage.loader.load_with("models/vintage_watch.glb", callbacks);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "basic".to_string());
    let Some(gallery) = Gallery::parse(&name) else {
        anyhow::bail!("unknown scene '{name}', expected basic, standard, pbr, actions, loading or camera");
    };
    let config = DriverConfig::from_env().with_title(format!("scene-ngin gallery: {name}"));
    scene_ngin::run(config, gallery)
}
