use crate::data_structures::color::{Color3, Color4};

/// Prefiltered environment map used for reflections and image based lighting.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentTexture {
    pub reference: String,
    pub gamma_space: bool,
    /// Rotation around Y in radians.
    pub rotation_y: f32,
}

impl EnvironmentTexture {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            gamma_space: false,
            rotation_y: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Skybox {
    pub size: f32,
    pub blur: f32,
    pub pbr: bool,
}

/// Scene level lighting and background state.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub texture: Option<EnvironmentTexture>,
    pub intensity: f32,
    pub skybox: Option<Skybox>,
    pub clear_colour: Color4,
    pub ambient_colour: Color3,
    /// Glow layer strength, `None` when no glow layer exists.
    pub glow_intensity: Option<f32>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            texture: None,
            intensity: 1.0,
            skybox: None,
            clear_colour: Color4::new(0.2, 0.2, 0.3, 1.0),
            ambient_colour: Color3::BLACK,
            glow_intensity: None,
        }
    }
}
