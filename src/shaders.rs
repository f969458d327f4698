//! GLSL shaders compiled at build time by `vulkano_shaders`.

/// Mesh vertex shader: MVP from the uniform block, extra transform and tint from
/// push constants.
pub mod mesh_vs {
  vulkano_shaders::shader! {
    ty: "vertex",
    path: "src/shaders/mesh.vert",
  }
}

/// Mesh fragment shader: texture sample times the interpolated tint.
pub mod mesh_fs {
  vulkano_shaders::shader! {
    ty: "fragment",
    path: "src/shaders/mesh.frag",
  }
}

/// Fractal Perlin noise written into a storage image, 16x16 work groups.
pub mod perlin_cs {
  vulkano_shaders::shader! {
    ty: "compute",
    path: "src/shaders/perlin.comp",
  }
}

/// Work group edge length of `perlin_cs`.
pub const PERLIN_LOCAL_SIZE: u32 = 16;
