//! glTF 2.0 / GLB import into a [`SceneFragment`].
//!
//! External buffers and images are fetched through the same [`AssetSource`]
//! as the document, relative to its location. The fragment's first node is a
//! geometry-less `__root__` mesh that parents every scene root.

use std::sync::Arc;

use cgmath::{InnerSpace, Quaternion, Rotation, Vector3};
use image::RgbaImage;
use log::warn;

use crate::{
    data_structures::{
        camera::{Camera, CameraMode},
        color::Color3,
        material::{Material, Texture, TextureSlot},
        model::{MeshData, ModelVertex},
        scene_graph::{Mesh, NodeKind, SceneFragment},
        transform::Transform,
    },
    error::LoadError,
    resources::{sibling_reference, source::AssetSource, texture::decode_image},
};

pub const ROOT_NODE_NAME: &str = "__root__";

pub async fn load_gltf(
    source: &dyn AssetSource,
    reference: &str,
    bytes: &[u8],
) -> Result<SceneFragment, LoadError> {
    let gltf = gltf::Gltf::from_slice(bytes).map_err(|e| LoadError::malformed(reference, e))?;
    let buffers = load_buffers(source, reference, &gltf).await?;
    let images = load_images(source, reference, &gltf, &buffers).await?;

    let mut fragment = SceneFragment::new();
    let root = fragment.push(ROOT_NODE_NAME, Mesh::empty(), Transform::new(), None);
    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| LoadError::malformed(reference, "document contains no scene"))?;
    for node in scene.nodes() {
        add_node(reference, &node, root, &buffers, &images, &mut fragment)?;
    }
    Ok(fragment)
}

async fn load_buffers(
    source: &dyn AssetSource,
    reference: &str,
    gltf: &gltf::Gltf,
) -> Result<Vec<Vec<u8>>, LoadError> {
    let embedded_only = gltf.buffers().all(|buffer| match buffer.source() {
        gltf::buffer::Source::Bin => true,
        gltf::buffer::Source::Uri(uri) => uri.starts_with("data:"),
    });
    let has_data_uri = gltf
        .buffers()
        .any(|buffer| matches!(buffer.source(), gltf::buffer::Source::Uri(uri) if uri.starts_with("data:")));
    if embedded_only && has_data_uri {
        // base64 payloads are decoded by the gltf crate itself
        let data = gltf::import_buffers(&gltf.document, None, gltf.blob.clone())
            .map_err(|e| LoadError::malformed(reference, e))?;
        return Ok(data.into_iter().map(|d| d.0).collect());
    }

    let mut buffers = Vec::with_capacity(gltf.buffers().len());
    let mut ignore = |_: u64, _: Option<u64>| ();
    for buffer in gltf.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| LoadError::malformed(reference, "missing binary chunk"))?,
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(LoadError::unresolved(
                    reference,
                    "embedded data URIs cannot be mixed with external buffers",
                ));
            }
            gltf::buffer::Source::Uri(uri) => {
                source
                    .fetch(&sibling_reference(reference, uri), &mut ignore)
                    .await?
            }
        };
        if data.len() < buffer.length() {
            return Err(LoadError::malformed(
                reference,
                format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ),
            ));
        }
        buffers.push(data);
    }
    Ok(buffers)
}

async fn load_images(
    source: &dyn AssetSource,
    reference: &str,
    gltf: &gltf::Gltf,
    buffers: &[Vec<u8>],
) -> Result<Vec<Option<Arc<RgbaImage>>>, LoadError> {
    let mut images = Vec::with_capacity(gltf.images().len());
    let mut ignore = |_: u64, _: Option<u64>| ();
    for image in gltf.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let end = start + view.length();
                let bytes = buffers
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.get(start..end))
                    .ok_or_else(|| {
                        LoadError::malformed(reference, format!("image {} points outside its buffer", image.index()))
                    })?;
                Some(decode_image(reference, bytes, Some(mime_type))?)
            }
            gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                warn!("{reference}: skipping embedded data URI image {}", image.index());
                None
            }
            gltf::image::Source::Uri { uri, mime_type } => {
                let image_ref = sibling_reference(reference, uri);
                let bytes = source.fetch(&image_ref, &mut ignore).await?;
                Some(decode_image(&image_ref, &bytes, mime_type)?)
            }
        };
        images.push(decoded.map(Arc::new));
    }
    Ok(images)
}

fn add_node(
    reference: &str,
    node: &gltf::Node,
    parent: usize,
    buffers: &[Vec<u8>],
    images: &[Option<Arc<RgbaImage>>],
    fragment: &mut SceneFragment,
) -> Result<(), LoadError> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let orientation = Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]);
    let transform = Transform {
        position: translation.into(),
        rotation: Vector3::new(0.0, 0.0, 0.0),
        rotation_quaternion: Some(orientation),
        scale: scale.into(),
    };
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", node.index()));

    let index = if let Some(mesh) = node.mesh() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "{reference}: skipping primitive {} of '{}' with mode {:?}",
                    primitive.index(),
                    name,
                    primitive.mode()
                );
                continue;
            }
            let geometry = read_primitive(reference, &name, &primitive, buffers)?;
            let material = primitive
                .material()
                .index()
                .map(|_| read_material(&primitive.material(), images));
            primitives.push(Mesh {
                geometry: Some(Arc::new(geometry)),
                material,
                pickable: true,
            });
        }
        if primitives.len() == 1 {
            let mesh = primitives.remove(0);
            fragment.push(name, mesh, transform, Some(parent))
        } else {
            let group = fragment.push(name.clone(), Mesh::empty(), transform, Some(parent));
            for (i, mesh) in primitives.into_iter().enumerate() {
                fragment.push(format!("{name}_primitive{i}"), mesh, Transform::new(), Some(group));
            }
            group
        }
    } else if let Some(camera) = node.camera() {
        fragment.push(name, NodeKind::Camera(read_camera(&camera, orientation)), transform, Some(parent))
    } else {
        fragment.push(name, Mesh::empty(), transform, Some(parent))
    };

    for child in node.children() {
        add_node(reference, &child, index, buffers, images, fragment)?;
    }
    Ok(())
}

fn read_primitive(
    reference: &str,
    name: &str,
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
) -> Result<MeshData, LoadError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let mut vertices: Vec<ModelVertex> = reader
        .read_positions()
        .ok_or_else(|| LoadError::malformed(reference, format!("mesh '{name}' has no positions")))?
        .map(|position| ModelVertex {
            position,
            ..Default::default()
        })
        .collect();
    let has_normals = if let Some(normals) = reader.read_normals() {
        vertices
            .iter_mut()
            .zip(normals)
            .for_each(|(vertex, normal)| vertex.normal = normal);
        true
    } else {
        false
    };
    if let Some(tex_coords) = reader.read_tex_coords(0) {
        vertices
            .iter_mut()
            .zip(tex_coords.into_f32())
            .for_each(|(vertex, uv)| vertex.tex_coords = uv);
    }
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if let Some(bad) = indices.iter().find(|i| **i as usize >= vertices.len()) {
        return Err(LoadError::malformed(
            reference,
            format!("mesh '{name}' index {bad} exceeds {} vertices", vertices.len()),
        ));
    }
    let mut mesh = MeshData::new(name, vertices, indices);
    if !has_normals {
        mesh.recompute_normals();
    }
    Ok(mesh)
}

fn texture_from(images: &[Option<Arc<RgbaImage>>], texture: gltf::Texture) -> Option<Texture> {
    let image = images.get(texture.source().index())?.clone()?;
    let source = texture
        .source()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("image{}", texture.source().index()));
    Some(Texture {
        image: Some(image),
        ..Texture::new(source)
    })
}

fn read_material(material: &gltf::Material, images: &[Option<Arc<RgbaImage>>]) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let name = material.name().unwrap_or("material").to_string();
    let mut result = Material::pbr(name);

    let metallic_index = pbr
        .metallic_roughness_texture()
        .map(|info| info.texture().source().index());
    let occlusion_packed = material
        .occlusion_texture()
        .is_some_and(|occ| Some(occ.texture().source().index()) == metallic_index);

    if let Some(tex) = pbr.base_color_texture().and_then(|info| texture_from(images, info.texture())) {
        result = result.with_texture(TextureSlot::Albedo, tex);
    }
    if let Some(tex) = material
        .normal_texture()
        .and_then(|info| texture_from(images, info.texture()))
    {
        result = result.with_texture(TextureSlot::Bump, tex);
    }
    if let Some(tex) = pbr
        .metallic_roughness_texture()
        .and_then(|info| texture_from(images, info.texture()))
    {
        result = result.with_texture(TextureSlot::Metallic, tex);
    }
    if !occlusion_packed {
        if let Some(tex) = material
            .occlusion_texture()
            .and_then(|info| texture_from(images, info.texture()))
        {
            result = result.with_texture(TextureSlot::Ambient, tex);
        }
    }
    if let Some(tex) = material
        .emissive_texture()
        .and_then(|info| texture_from(images, info.texture()))
    {
        result = result.with_texture(TextureSlot::Emissive, tex);
    }

    let [r, g, b, a] = pbr.base_color_factor();
    let params = result.params_mut();
    params.albedo_colour = Color3::new(r, g, b);
    params.alpha = a;
    params.metallic = pbr.metallic_factor();
    params.roughness = pbr.roughness_factor();
    params.emissive_colour = Color3::from(material.emissive_factor());
    params.back_face_culling = !material.double_sided();
    params.roughness_from_metallic_g = metallic_index.is_some();
    params.metalness_from_metallic_b = metallic_index.is_some();
    params.ambient_occlusion_from_metallic_r = occlusion_packed;
    result
}

fn read_camera(camera: &gltf::Camera, orientation: Quaternion<f32>) -> Camera {
    // glTF cameras look down their local -Z
    let forward = orientation.rotate_vector(-Vector3::unit_z());
    let forward = if forward.magnitude2() > f32::EPSILON {
        forward.normalize()
    } else {
        -Vector3::unit_z()
    };
    let mut result = Camera::free();
    result.mode = CameraMode::Free {
        yaw: forward.x.atan2(forward.z),
        pitch: (-forward.y).atan2((forward.x * forward.x + forward.z * forward.z).sqrt()),
    };
    if let gltf::camera::Projection::Perspective(perspective) = camera.projection() {
        result.fov = perspective.yfov();
        result.near = perspective.znear();
        if let Some(far) = perspective.zfar() {
            result.far = far;
        }
    }
    result
}
