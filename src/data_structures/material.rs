//! Surface appearance: texture slots plus scalar and colour parameters.
//!
//! A [`Material`] belongs to exactly one mesh. Its texture slots are fixed once
//! the instance exists; to swap a texture build a new material with
//! [`Material::with_texture`]. Scalar parameters stay editable in place
//! through [`Material::params`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use crate::data_structures::color::{Color3, Color4};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Shading {
    #[default]
    Standard,
    Pbr,
}

/// Named texture slot of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    /// Base colour (diffuse for standard shading).
    Albedo,
    /// Normal map.
    Bump,
    /// Packed ambient occlusion (R), roughness (G) and metallic (B).
    Metallic,
    Emissive,
    Ambient,
    Specular,
    MicroSurface,
}

impl TextureSlot {
    pub fn parse(name: &str) -> Option<Self> {
        let slot = match name {
            "albedo" | "diffuse" | "albedoTexture" | "diffuseTexture" => Self::Albedo,
            "bump" | "normal" | "bumpTexture" => Self::Bump,
            "metallic" | "metallicTexture" => Self::Metallic,
            "emissive" | "emissiveTexture" => Self::Emissive,
            "ambient" | "ambientTexture" => Self::Ambient,
            "specular" | "specularTexture" => Self::Specular,
            "microSurface" | "microSurfaceTexture" => Self::MicroSurface,
            _ => return None,
        };
        Some(slot)
    }
}

/// CPU side of a texture: where it came from and, once decoded, its pixels.
#[derive(Clone, Debug)]
pub struct Texture {
    pub source: String,
    pub u_scale: f32,
    pub v_scale: f32,
    pub image: Option<Arc<RgbaImage>>,
}

impl Texture {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            u_scale: 1.0,
            v_scale: 1.0,
            image: None,
        }
    }

    pub fn from_image(source: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            image: Some(Arc::new(image)),
            ..Self::new(source)
        }
    }

    pub fn with_uv_scale(mut self, u_scale: f32, v_scale: f32) -> Self {
        self.u_scale = u_scale;
        self.v_scale = v_scale;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }
}

/// Scalar and colour parameters. These may be edited after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialParams {
    pub albedo_colour: Color3,
    pub alpha: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive_colour: Color3,
    pub emissive_intensity: f32,
    pub ambient_colour: Color3,
    pub specular_colour: Color3,
    pub specular_power: f32,
    pub environment_intensity: f32,
    pub back_face_culling: bool,
    pub invert_normal_map_x: bool,
    pub invert_normal_map_y: bool,
    pub ambient_occlusion_from_metallic_r: bool,
    pub roughness_from_metallic_g: bool,
    pub metalness_from_metallic_b: bool,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            albedo_colour: Color3::WHITE,
            alpha: 1.0,
            roughness: 1.0,
            metallic: 0.0,
            emissive_colour: Color3::BLACK,
            emissive_intensity: 1.0,
            ambient_colour: Color3::BLACK,
            specular_colour: Color3::WHITE,
            specular_power: 64.0,
            environment_intensity: 1.0,
            back_face_culling: true,
            invert_normal_map_x: false,
            invert_normal_map_y: false,
            ambient_occlusion_from_metallic_r: false,
            roughness_from_metallic_g: false,
            metalness_from_metallic_b: false,
        }
    }
}

/// Appearance of one mesh. Deliberately not `Clone`.
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    shading: Shading,
    slots: BTreeMap<TextureSlot, Arc<Texture>>,
    params: MaterialParams,
}

impl Material {
    pub fn new(name: impl Into<String>, shading: Shading) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            shading,
            slots: BTreeMap::new(),
            params: MaterialParams::default(),
        }
    }

    pub fn standard(name: impl Into<String>) -> Self {
        Self::new(name, Shading::Standard)
    }

    pub fn pbr(name: impl Into<String>) -> Self {
        Self::new(name, Shading::Pbr)
    }

    pub fn with_params(mut self, params: MaterialParams) -> Self {
        self.params = params;
        self
    }

    /// Returns a new material instance with `texture` placed in `slot`.
    ///
    /// The receiver is consumed; the result carries a fresh id.
    pub fn with_texture(self, slot: TextureSlot, texture: Texture) -> Self {
        let mut slots = self.slots;
        slots.insert(slot, Arc::new(texture));
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            shading: self.shading,
            slots,
            params: self.params,
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn shading(&self) -> Shading {
        self.shading
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&Texture> {
        self.slots.get(&slot).map(Arc::as_ref)
    }

    pub fn textures(&self) -> impl Iterator<Item = (TextureSlot, &Texture)> {
        self.slots.iter().map(|(slot, tex)| (*slot, tex.as_ref()))
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut MaterialParams {
        &mut self.params
    }

    /// Immutable per-frame view used by surfaces.
    pub fn view(&self) -> MaterialView {
        let p = &self.params;
        let albedo_colour = p.albedo_colour.with_alpha(p.alpha);
        MaterialView {
            id: Some(self.id),
            albedo_colour,
            emissive: p.emissive_colour.scaled(p.emissive_intensity),
            ambient: p.ambient_colour,
            roughness: p.roughness,
            metallic: p.metallic,
            environment_intensity: p.environment_intensity,
            albedo: self.slots.get(&TextureSlot::Albedo).cloned(),
            emissive_map: self.slots.get(&TextureSlot::Emissive).cloned(),
            back_face_culling: p.back_face_culling,
        }
    }
}

/// Snapshot of the parameters a surface needs to draw a mesh.
#[derive(Clone, Debug)]
pub struct MaterialView {
    /// `None` for the default material.
    pub id: Option<MaterialId>,
    pub albedo_colour: Color4,
    pub emissive: Color3,
    pub ambient: Color3,
    pub roughness: f32,
    pub metallic: f32,
    pub environment_intensity: f32,
    pub albedo: Option<Arc<Texture>>,
    pub emissive_map: Option<Arc<Texture>>,
    pub back_face_culling: bool,
}

impl MaterialView {
    pub fn is_transparent(&self) -> bool {
        self.albedo_colour.a < 1.0
    }
}

impl Default for MaterialView {
    fn default() -> Self {
        Self {
            id: None,
            albedo_colour: Color4::new(1.0, 1.0, 1.0, 1.0),
            emissive: Color3::BLACK,
            ambient: Color3::BLACK,
            roughness: 1.0,
            metallic: 0.0,
            environment_intensity: 1.0,
            albedo: None,
            emissive_map: None,
            back_face_culling: true,
        }
    }
}

/// Texture reference inside a [`MaterialDesc`], fetched by the asset loader.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureRef {
    pub slot: TextureSlot,
    pub reference: String,
    pub u_scale: f32,
    pub v_scale: f32,
}

impl TextureRef {
    pub fn new(slot: TextureSlot, reference: impl Into<String>) -> Self {
        Self {
            slot,
            reference: reference.into(),
            u_scale: 1.0,
            v_scale: 1.0,
        }
    }

    pub fn with_uv_scale(mut self, u_scale: f32, v_scale: f32) -> Self {
        self.u_scale = u_scale;
        self.v_scale = v_scale;
        self
    }
}

/// Blueprint of a material whose textures still have to be fetched.
#[derive(Clone, Debug, Default)]
pub struct MaterialDesc {
    pub name: String,
    pub shading: Shading,
    pub params: MaterialParams,
    pub textures: Vec<TextureRef>,
}

impl MaterialDesc {
    pub fn new(name: impl Into<String>, shading: Shading) -> Self {
        Self {
            name: name.into(),
            shading,
            ..Default::default()
        }
    }

    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.textures.push(texture);
        self
    }

    pub fn with_params(mut self, params: MaterialParams) -> Self {
        self.params = params;
        self
    }

    /// Builds the material once every referenced image is decoded.
    pub(crate) fn build(&self, images: Vec<(TextureRef, RgbaImage)>) -> Material {
        images.into_iter().fold(
            Material::new(self.name.clone(), self.shading).with_params(self.params.clone()),
            |material, (tex, image)| {
                material.with_texture(
                    tex.slot,
                    Texture::from_image(tex.reference, image).with_uv_scale(tex.u_scale, tex.v_scale),
                )
            },
        )
    }
}
