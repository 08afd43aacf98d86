//! Wavefront OBJ import with `mtllib` materials.
//!
//! Material libraries and the textures they name are fetched before parsing,
//! since tobj resolves them synchronously. A texture that cannot be fetched or
//! decoded fails the whole load.

use std::collections::HashMap;
use std::io::{BufReader, Cursor};
use std::sync::Arc;

use image::RgbaImage;

use crate::{
    data_structures::{
        color::Color3,
        material::{Material, Texture, TextureSlot},
        model::{MeshData, ModelVertex},
        scene_graph::{Mesh, SceneFragment},
        transform::Transform,
    },
    error::LoadError,
    resources::{gltf::ROOT_NODE_NAME, sibling_reference, source::AssetSource, texture::decode_image},
};

pub async fn load_obj(
    source: &dyn AssetSource,
    reference: &str,
    bytes: &[u8],
) -> Result<SceneFragment, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|e| LoadError::malformed(reference, e))?;
    let mut ignore = |_: u64, _: Option<u64>| ();

    let mut libraries: HashMap<String, Vec<u8>> = HashMap::new();
    for name in material_libraries(text) {
        let data = source
            .fetch(&sibling_reference(reference, &name), &mut ignore)
            .await?;
        libraries.insert(name, data);
    }

    let (models, materials) = tobj::load_obj_buf(
        &mut BufReader::new(Cursor::new(bytes)),
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |path| {
            let key = path.to_string_lossy();
            match libraries.get(key.as_ref()) {
                Some(data) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(data.as_slice()))),
                None => Err(tobj::LoadError::OpenFileFailed),
            }
        },
    )
    .map_err(|e| LoadError::malformed(reference, e))?;
    let materials = materials.map_err(|e| LoadError::malformed(reference, e))?;

    let mut images: HashMap<String, Arc<RgbaImage>> = HashMap::new();
    for material in &materials {
        let names = [
            &material.diffuse_texture,
            &material.normal_texture,
            &material.specular_texture,
            &material.ambient_texture,
        ];
        for name in names.into_iter().flatten() {
            if images.contains_key(name) {
                continue;
            }
            let texture_ref = sibling_reference(reference, name);
            let data = source.fetch(&texture_ref, &mut ignore).await?;
            images.insert(name.clone(), Arc::new(decode_image(&texture_ref, &data, None)?));
        }
    }

    let mut fragment = SceneFragment::new();
    let root = fragment.push(ROOT_NODE_NAME, Mesh::empty(), Transform::new(), None);
    for (index, model) in models.into_iter().enumerate() {
        let name = if model.name.is_empty() {
            format!("mesh{index}")
        } else {
            model.name.clone()
        };
        let geometry = to_mesh_data(&name, &model.mesh, reference)?;
        let material = model
            .mesh
            .material_id
            .and_then(|id| materials.get(id))
            .map(|m| to_material(m, &images));
        let mesh = Mesh {
            geometry: Some(Arc::new(geometry)),
            material,
            pickable: true,
        };
        fragment.push(name, mesh, Transform::new(), Some(root));
    }
    Ok(fragment)
}

/// File names listed on `mtllib` lines.
fn material_libraries(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.trim_start().strip_prefix("mtllib"))
        .flat_map(|rest| rest.split_whitespace())
        .map(str::to_string)
        .collect()
}

fn to_mesh_data(name: &str, mesh: &tobj::Mesh, reference: &str) -> Result<MeshData, LoadError> {
    let vertex_count = mesh.positions.len() / 3;
    let vertices: Vec<ModelVertex> = (0..vertex_count)
        .map(|i| ModelVertex {
            position: [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ],
            tex_coords: [
                mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ],
            normal: [
                mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ],
        })
        .collect();
    if mesh.indices.iter().any(|i| *i as usize >= vertex_count) {
        return Err(LoadError::malformed(
            reference,
            format!("mesh '{name}' references a vertex that does not exist"),
        ));
    }
    let mut data = MeshData::new(name, vertices, mesh.indices.clone());
    if mesh.normals.is_empty() {
        data.recompute_normals();
    }
    Ok(data)
}

fn to_material(material: &tobj::Material, images: &HashMap<String, Arc<RgbaImage>>) -> Material {
    let slots = [
        (TextureSlot::Albedo, &material.diffuse_texture),
        (TextureSlot::Bump, &material.normal_texture),
        (TextureSlot::Specular, &material.specular_texture),
        (TextureSlot::Ambient, &material.ambient_texture),
    ];
    let mut result = Material::standard(material.name.clone());
    for (slot, name) in slots {
        let Some(name) = name else { continue };
        if let Some(image) = images.get(name) {
            result = result.with_texture(
                slot,
                Texture {
                    image: Some(image.clone()),
                    ..Texture::new(name.clone())
                },
            );
        }
    }
    let params = result.params_mut();
    if let Some(diffuse) = material.diffuse {
        params.albedo_colour = Color3::from(diffuse);
    }
    if let Some(ambient) = material.ambient {
        params.ambient_colour = Color3::from(ambient);
    }
    if let Some(specular) = material.specular {
        params.specular_colour = Color3::from(specular);
    }
    if let Some(shininess) = material.shininess {
        params.specular_power = shininess;
    }
    if let Some(dissolve) = material.dissolve {
        params.alpha = dissolve;
    }
    result
}
