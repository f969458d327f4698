//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock 1600x900 viewer pointing at `resources/`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RenderError, Result};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "vulkano-scenes.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
  pub window:   WindowConfig,
  pub renderer: RendererConfig,
  pub assets:   AssetConfig,
  pub compute:  ComputeConfig,
  pub logging:  LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
  pub width:  u32,
  pub height: u32,
  pub title:  String,
}

impl Default for WindowConfig {
  fn default() -> Self {
    Self {
      width:  1600,
      height: 900,
      title:  "Hello Vulkan!".to_owned(),
    }
  }
}

/// Present mode the swapchain should try first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
  /// No vsync, may tear.
  Immediate,
  /// Triple buffering.
  #[default]
  Mailbox,
  /// Vsync, always supported.
  Fifo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
  pub present_mode: PresentModePreference,
  pub wireframe:    bool,
  pub line_width:   f32,
}

impl Default for RendererConfig {
  fn default() -> Self {
    Self {
      present_mode: PresentModePreference::default(),
      wireframe:    false,
      line_width:   1.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetConfig {
  pub room_model:   PathBuf,
  pub room_texture: PathBuf,
  pub cube_model:   PathBuf,
  pub cube_texture: PathBuf,
}

impl Default for AssetConfig {
  fn default() -> Self {
    Self {
      room_model:   "resources/models/viking_room.obj".into(),
      room_texture: "resources/textures/viking_room.png".into(),
      cube_model:   "resources/models/cube.obj".into(),
      cube_texture: "resources/textures/white.png".into(),
    }
  }
}

/// Size of the images the compute preview renders into.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
  pub width:  u32,
  pub height: u32,
}

impl Default for ComputeConfig {
  fn default() -> Self {
    Self {
      width:  1600,
      height: 900,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
  /// `env_logger` filter used when `RUST_LOG` is unset.
  pub level: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_owned(),
    }
  }
}

impl AppConfig {
  pub fn from_toml_str(contents: &str) -> Result<Self> {
    let config: Self = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  /// Rejects values that parse but cannot be rendered with.
  pub fn validate(&self) -> Result<()> {
    let sizes = [
      ("window.width", self.window.width),
      ("window.height", self.window.height),
      ("compute.width", self.compute.width),
      ("compute.height", self.compute.height),
    ];
    if let Some((key, _)) = sizes.into_iter().find(|&(_, value)| value == 0) {
      return Err(RenderError::InvalidSetting {
        key,
        reason: "must be greater than zero",
      });
    }

    let line_width = self.renderer.line_width;
    if line_width.is_nan() || line_width < 1.0 {
      return Err(RenderError::InvalidSetting {
        key:    "renderer.line_width",
        reason: "must be at least 1.0",
      });
    }
    Ok(())
  }

  pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
    let contents = std::fs::read_to_string(path)?;
    Self::from_toml_str(&contents)
  }

  /// Loads `explicit` if given, otherwise [`DEFAULT_CONFIG_PATH`] when it exists,
  /// otherwise the defaults.
  pub fn discover(explicit: Option<&Path>) -> Result<Self> {
    match explicit {
      Some(path) => Self::load_from_file(path),
      None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load_from_file(DEFAULT_CONFIG_PATH),
      None => Ok(Self::default()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_yields_defaults() {
    let config = AppConfig::from_toml_str("").unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.window.width, 1600);
    assert_eq!(config.window.height, 900);
    assert_eq!(config.renderer.present_mode, PresentModePreference::Mailbox);
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let config = AppConfig::from_toml_str(
      r#"
        [window]
        title = "Scenes"

        [renderer]
        present_mode = "fifo"
        wireframe = true

        [compute]
        width = 800
      "#,
    )
    .unwrap();

    assert_eq!(config.window.title, "Scenes");
    assert_eq!(config.window.width, 1600);
    assert_eq!(config.renderer.present_mode, PresentModePreference::Fifo);
    assert!(config.renderer.wireframe);
    assert_eq!(config.compute.width, 800);
    assert_eq!(config.compute.height, 900);
    assert_eq!(
      config.assets.cube_model,
      PathBuf::from("resources/models/cube.obj")
    );
  }

  #[test]
  fn shipped_config_matches_defaults() {
    let config = AppConfig::from_toml_str(include_str!("../vulkano-scenes.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let err = AppConfig::from_toml_str("[window]\nfullscreen = true\n");
    assert!(err.is_err());
  }

  #[test]
  fn zero_sizes_are_rejected() {
    let err = AppConfig::from_toml_str("[compute]\nwidth = 0\n").unwrap_err();
    assert!(matches!(err, RenderError::InvalidSetting {
      key: "compute.width",
      ..
    }));

    let err = AppConfig::from_toml_str("[window]\nheight = 0\n").unwrap_err();
    assert!(matches!(err, RenderError::InvalidSetting {
      key: "window.height",
      ..
    }));
  }

  #[test]
  fn thin_lines_are_rejected() {
    let err = AppConfig::from_toml_str("[renderer]\nline_width = 0.5\n").unwrap_err();
    assert!(err.to_string().contains("renderer.line_width"));
    assert!(AppConfig::default().validate().is_ok());
  }

  #[test]
  fn unknown_present_mode_is_rejected() {
    assert!(AppConfig::from_toml_str("[renderer]\npresent_mode = \"vsync\"\n").is_err());
  }

  #[test]
  fn missing_explicit_file_is_an_io_error() {
    let err = AppConfig::discover(Some(Path::new("does/not/exist.toml"))).unwrap_err();
    assert!(matches!(err, crate::error::RenderError::Io(_)));
  }
}
