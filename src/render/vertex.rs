use glam::Mat4;
use vulkano::{buffer::BufferContents, pipeline::graphics::vertex_input::Vertex};

/// Interleaved vertex consumed by the mesh pipelines.
#[derive(BufferContents, Vertex, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct MeshVertex {
  #[format(R32G32B32_SFLOAT)]
  pub position:  [f32; 3],
  #[format(R32G32B32_SFLOAT)]
  pub color:     [f32; 3],
  #[format(R32G32_SFLOAT)]
  pub tex_coord: [f32; 2],
}

/// Per-frame transform block bound at set 0, binding 0.
#[derive(BufferContents, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct UniformBufferObject {
  pub model: [[f32; 4]; 4],
  pub view:  [[f32; 4]; 4],
  pub proj:  [[f32; 4]; 4],
}

impl UniformBufferObject {
  pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
    Self {
      model: model.to_cols_array_2d(),
      view:  view.to_cols_array_2d(),
      proj:  proj.to_cols_array_2d(),
    }
  }
}

impl Default for UniformBufferObject {
  fn default() -> Self {
    Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
  }
}

/// Push constants of the mesh pipelines: an extra model-space transform and a
/// colour multiplied into the sampled texture.
#[derive(BufferContents, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct MeshPushConstants {
  pub transform: [[f32; 4]; 4],
  pub color:     [f32; 4],
}

impl MeshPushConstants {
  pub fn new(transform: Mat4, color: [f32; 4]) -> Self {
    Self {
      transform: transform.to_cols_array_2d(),
      color,
    }
  }
}

impl Default for MeshPushConstants {
  fn default() -> Self {
    Self::new(Mat4::IDENTITY, [1.0; 4])
  }
}

/// Push constants of the Perlin noise compute shader.
#[derive(BufferContents, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct PerlinPushConstants {
  pub offset: [f32; 2],
  pub scale:  f32,
}

impl Default for PerlinPushConstants {
  fn default() -> Self {
    Self {
      offset: [0.0, 0.0],
      scale:  8.0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gpu_block_sizes_match_the_shaders() {
    assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    assert_eq!(std::mem::size_of::<UniformBufferObject>(), 192);
    assert_eq!(std::mem::size_of::<MeshPushConstants>(), 80);
    assert_eq!(std::mem::size_of::<PerlinPushConstants>(), 12);
  }

  #[test]
  fn defaults_are_identity_and_white() {
    let pc = MeshPushConstants::default();
    assert_eq!(pc.transform, Mat4::IDENTITY.to_cols_array_2d());
    assert_eq!(pc.color, [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(UniformBufferObject::default().proj, Mat4::IDENTITY.to_cols_array_2d());
  }
}
