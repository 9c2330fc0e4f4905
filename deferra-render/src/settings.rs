use std::{
    f32::consts::PI,
    path::{Path, PathBuf},
};

use deferra_render_rhi::{Extent2D, Format};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientOcclusionSettings {
    pub enabled: bool,
    pub sample_kernel_size: u32,
    pub noise_texture_dimension: u32,
    pub occlusion_radius: f32,
    pub ssao_power: f32,
}

impl Default for AmbientOcclusionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_kernel_size: 8,
            noise_texture_dimension: 4,
            occlusion_radius: 2.0,
            ssao_power: 2.0,
        }
    }
}

/// Renderer configuration. Every field has a default, so a settings file
/// only needs to list what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub window_width: u32,
    pub window_height: u32,
    pub swap_chain_buffer_count: u32,
    /// How many frames the CPU may record ahead of the GPU.
    pub queued_frame_count: u32,
    pub vsync: bool,
    /// Vertical field of view, in radians.
    pub field_of_view: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub seconds_per_frame: f32,
    pub color_buffer_format: Format,
    pub depth_format: Format,
    /// Pipeline build workers. 0 uses the available parallelism.
    pub worker_threads: usize,
    pub shader_directory: PathBuf,
    pub ambient_occlusion: AmbientOcclusionSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            window_width: 1920,
            window_height: 1080,
            swap_chain_buffer_count: 3,
            queued_frame_count: 2,
            vsync: true,
            field_of_view: 0.25 * PI,
            near_plane: 1.0,
            far_plane: 5000.0,
            seconds_per_frame: 1.0 / 60.0,
            color_buffer_format: Format::Rgba16Float,
            depth_format: Format::D32Float,
            worker_threads: 0,
            shader_directory: PathBuf::from("shaders"),
            ambient_occlusion: AmbientOcclusionSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Reads settings from a JSON file and validates them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = Self::from_json(&text)?;
        log::info!("Loaded render settings from `{}`", path.display());
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |message: String| Err(SettingsError::Invalid(message));

        if self.window_extent().is_empty() {
            return invalid(format!(
                "window extent {}x{} is empty",
                self.window_width, self.window_height
            ));
        }
        if !(2..=4).contains(&self.swap_chain_buffer_count) {
            return invalid(format!(
                "swap chain buffer count {} is outside 2..=4",
                self.swap_chain_buffer_count
            ));
        }
        if self.queued_frame_count == 0 || self.queued_frame_count >= self.swap_chain_buffer_count {
            return invalid(format!(
                "queued frame count {} must be at least 1 and below the swap chain buffer count {}",
                self.queued_frame_count, self.swap_chain_buffer_count
            ));
        }
        if !(self.near_plane > 0.0 && self.near_plane < self.far_plane) {
            return invalid(format!(
                "clip planes {}..{} must be positive and increasing",
                self.near_plane, self.far_plane
            ));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < PI) {
            return invalid(format!("field of view {} is outside (0, pi)", self.field_of_view));
        }
        if self.seconds_per_frame <= 0.0 {
            return invalid(format!("seconds per frame {} is not positive", self.seconds_per_frame));
        }
        if self.color_buffer_format.is_depth() {
            return invalid(format!("color buffer format {:?} is a depth format", self.color_buffer_format));
        }
        if !self.depth_format.is_depth() {
            return invalid(format!("depth format {:?} is not a depth format", self.depth_format));
        }

        let ambient_occlusion = &self.ambient_occlusion;
        if ambient_occlusion.sample_kernel_size == 0 || ambient_occlusion.noise_texture_dimension == 0 {
            return invalid("ambient occlusion kernel and noise dimension must be non-zero".to_string());
        }

        Ok(())
    }

    pub fn window_extent(&self) -> Extent2D {
        Extent2D::new(self.window_width, self.window_height)
    }

    /// The present sync interval matching `vsync`.
    pub fn sync_interval(&self) -> u32 {
        self.vsync as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = RenderSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.swap_chain_buffer_count, 3);
        assert_eq!(settings.queued_frame_count, 2);
        assert!(settings.ambient_occlusion.enabled);
    }

    #[test]
    fn test_json_overrides_only_listed_fields() {
        let settings = RenderSettings::from_json(
            r#"{
                "window_width": 1280,
                "vsync": false,
                "color_buffer_format": "rgba8_unorm",
                "ambient_occlusion": { "enabled": false }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.window_width, 1280);
        assert_eq!(settings.window_height, 1080);
        assert!(!settings.vsync);
        assert_eq!(settings.sync_interval(), 0);
        assert_eq!(settings.color_buffer_format, Format::Rgba8Unorm);
        assert!(!settings.ambient_occlusion.enabled);
        assert_eq!(settings.ambient_occlusion.sample_kernel_size, 8);
    }

    #[test]
    fn test_queued_frames_must_stay_below_buffer_count() {
        let settings = RenderSettings {
            swap_chain_buffer_count: 2,
            queued_frame_count: 2,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let settings = RenderSettings {
            queued_frame_count: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_invalid_planes_and_formats() {
        let settings = RenderSettings {
            near_plane: 10.0,
            far_plane: 1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RenderSettings {
            depth_format: Format::Rgba8Unorm,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RenderSettings {
            window_width: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = RenderSettings::from_json("{ \"window_width\": \"wide\" }");
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let path = std::env::temp_dir().join("deferra-missing-settings.json");
        let result = RenderSettings::load(&path);
        assert!(matches!(result, Err(SettingsError::Io { .. })));
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!("deferra-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "queued_frame_count": 1 }"#).unwrap();

        let settings = RenderSettings::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.queued_frame_count, 1);
    }
}
