//! Error type shared by every layer of the viewer.
//!
//! Vulkano reports failures through a zoo of error types (`Validated<VulkanError>`,
//! `Box<ValidationError>`, allocation errors, host access errors...). Those are
//! folded into [`RenderError::Gpu`] together with a short description of what was
//! being attempted, using [`GpuResultExt::gpu`].

use std::{fmt::Display, path::PathBuf};

use vulkano::descriptor_set::layout::DescriptorType;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
  /// A vulkano call failed.
  #[error("{context}: {message}")]
  Gpu {
    context: &'static str,
    message: String,
  },

  #[error("no physical device supports swapchains, dynamic rendering and a graphics+compute queue")]
  NoSuitableDevice,

  #[error("shader module has no `main` entry point")]
  MissingEntryPoint,

  #[error("failed to load model: {0}")]
  ModelLoad(#[from] tobj::LoadError),

  #[error("model {path} has {count} vertices, at least 3 are required")]
  DegenerateModel { path: PathBuf, count: usize },

  #[error("failed to load texture: {0}")]
  TextureLoad(#[from] image::ImageError),

  #[error("descriptor pool has not been created")]
  NoDescriptorPool,

  #[error("descriptor pool exhausted: requested {requested} more sets, {available} left")]
  DescriptorSetsExhausted { requested: u32, available: u32 },

  #[error("descriptor pool exhausted for {ty:?}: requested {requested}, {available} left")]
  DescriptorsExhausted {
    ty:        DescriptorType,
    requested: u32,
    available: u32,
  },

  #[error("failed to read configuration: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid configuration: {0}")]
  Config(#[from] toml::de::Error),

  #[error("invalid configuration: `{key}` {reason}")]
  InvalidSetting {
    key:    &'static str,
    reason: &'static str,
  },

  #[error("window error: {0}")]
  Window(String),
}

/// Attaches a context string to any displayable vulkano error.
pub trait GpuResultExt<T> {
  fn gpu(self, context: &'static str) -> Result<T>;
}

impl<T, E: Display> GpuResultExt<T> for std::result::Result<T, E> {
  fn gpu(self, context: &'static str) -> Result<T> {
    self.map_err(|e| RenderError::Gpu {
      context,
      message: e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gpu_context_is_part_of_the_message() {
    let failed: std::result::Result<(), &str> = Err("out of device memory");
    let err = failed.gpu("allocating vertex buffer").unwrap_err();
    assert_eq!(
      err.to_string(),
      "allocating vertex buffer: out of device memory"
    );
  }

  #[test]
  fn exhausted_pool_names_the_descriptor_type() {
    let err = RenderError::DescriptorsExhausted {
      ty:        DescriptorType::UniformBuffer,
      requested: 2,
      available: 0,
    };
    assert!(err.to_string().contains("UniformBuffer"));
  }
}
