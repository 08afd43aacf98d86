//! Driver and host configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    data_structures::color::Color4,
    error::LoadError,
    resources::source::{AssetSource, HttpSource},
};

/// Environment variable overriding [`DriverConfig::asset_root`].
pub const ASSETS_ENV: &str = "SCENE_NGIN_ASSETS";
/// Environment variable setting [`DriverConfig::base_url`].
pub const BASE_URL_ENV: &str = "SCENE_NGIN_BASE_URL";

#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub title: String,
    /// Id of the `<canvas>` element on the web.
    pub canvas_id: String,
    pub asset_root: PathBuf,
    /// Base for relative references fetched over HTTP.
    pub base_url: Option<String>,
    /// 1 disables MSAA.
    pub msaa_samples: u32,
    pub present_mode: wgpu::PresentMode,
    pub loading_colour: Color4,
    /// env_logger filter; `RUST_LOG` applies when unset.
    pub log_filter: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            title: "scene-ngin".to_string(),
            canvas_id: "canvas".to_string(),
            asset_root: PathBuf::from("./assets"),
            base_url: None,
            msaa_samples: 4,
            present_mode: wgpu::PresentMode::AutoVsync,
            loading_colour: Color4::new(0.1, 0.1, 0.12, 1.0),
            log_filter: None,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SCENE_NGIN_ASSETS` and `SCENE_NGIN_BASE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ASSETS_ENV) {
            config.asset_root = PathBuf::from(root);
        }
        if let Ok(base) = std::env::var(BASE_URL_ENV) {
            if !base.is_empty() {
                config.base_url = Some(base);
            }
        }
        config
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_canvas_id(mut self, canvas_id: impl Into<String>) -> Self {
        self.canvas_id = canvas_id.into();
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples.max(1);
        self
    }

    pub fn with_present_mode(mut self, present_mode: wgpu::PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_loading_colour(mut self, colour: impl Into<Color4>) -> Self {
        self.loading_colour = colour.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Source for the configured locations.
    ///
    /// Native builds read relative references below `asset_root` and send
    /// absolute URLs over HTTP. On the web every reference goes over HTTP,
    /// relative ones against `base_url` or the page's `assets/` folder.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn asset_source(&self) -> Result<Arc<dyn AssetSource>, LoadError> {
        use crate::resources::source::{FileSource, SourceRouter};

        let http = HttpSource::new(self.base_url.as_deref())?;
        let files = FileSource::new(self.asset_root.clone());
        Ok(Arc::new(SourceRouter::new(http, files)))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn asset_source(&self) -> Result<Arc<dyn AssetSource>, LoadError> {
        let http = match &self.base_url {
            Some(base) => HttpSource::new(Some(base))?,
            None => HttpSource::from_location()?,
        };
        Ok(Arc::new(http))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_never_configure_zero_msaa_samples() {
        let config = DriverConfig::default().with_msaa_samples(0);
        assert_eq!(config.msaa_samples, 1);
    }
}
