//! OBJ meshes and their per-frame GPU resources.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use vulkano::{
  buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
  command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer},
  descriptor_set::{DescriptorSet, WriteDescriptorSet, layout::DescriptorSetLayout},
  image::{sampler::Sampler, view::ImageView},
  memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
  pipeline::{PipelineBindPoint, PipelineLayout},
};

use crate::{
  core::{frames::FrameRing, init::VulkanContext},
  error::{GpuResultExt, RenderError, Result},
  render::{
    descriptors::DescriptorAllocator,
    pipeline::{ApplicationPipelines, PipelineKind},
    vertex::{MeshVertex, UniformBufferObject},
  },
};

/// Vertex colour of loaded meshes. Tinting happens through push constants.
const VERTEX_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// CPU side of a mesh: one interleaved vertex stream and a triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
  pub vertices: Vec<MeshVertex>,
  pub indices:  Vec<u32>,
}

impl MeshData {
  /// Merges every object of an OBJ file into a single mesh. `path` only labels
  /// the error for meshes with fewer than three vertices.
  pub fn from_obj_models(models: &[tobj::Model], path: &Path) -> Result<Self> {
    let mut data = Self::default();

    for model in models {
      let mesh = &model.mesh;
      let base = data.vertices.len() as u32;

      data.vertices.extend(
        mesh
          .positions
          .chunks_exact(3)
          .enumerate()
          .map(|(i, xyz)| MeshVertex {
            position:  [xyz[0], xyz[1], xyz[2]],
            color:     VERTEX_COLOR,
            tex_coord: mesh
              .texcoords
              .get(2 * i..2 * i + 2)
              .map_or([0.0, 0.0], |uv| [uv[0], 1.0 - uv[1]]),
          }),
      );
      data.indices.extend(mesh.indices.iter().map(|&i| base + i));
    }

    if data.vertices.len() < 3 {
      return Err(RenderError::DegenerateModel {
        path:  path.to_path_buf(),
        count: data.vertices.len(),
      });
    }

    Ok(data)
  }
}

pub fn obj_load_options() -> tobj::LoadOptions {
  tobj::LoadOptions {
    triangulate: true,
    single_index: true,
    ..Default::default()
  }
}

/// Reads and triangulates an OBJ file. Materials are ignored.
pub fn load_mesh(path: &Path) -> Result<MeshData> {
  let (models, _materials) = tobj::load_obj(path, &obj_load_options())?;
  let data = MeshData::from_obj_models(&models, path)?;
  log::debug!(
    "Loaded {}: {} vertices, {} triangles",
    path.display(),
    data.vertices.len(),
    data.indices.len() / 3
  );
  Ok(data)
}

/// Texture and sampler bound at binding 1 of a model's descriptor sets.
#[derive(Clone)]
pub struct ModelTexture {
  pub view:    Arc<ImageView>,
  pub sampler: Arc<Sampler>,
}

/// A mesh on the GPU, ready to be drawn with one of the graphics pipelines.
pub struct Model {
  source:          PathBuf,
  kind:            PipelineKind,
  vertex_buffer:   Subbuffer<[MeshVertex]>,
  index_buffer:    Subbuffer<[u32]>,
  index_count:     u32,
  uniform_buffers: FrameRing<Subbuffer<UniformBufferObject>>,
  texture:         ModelTexture,
  descriptor_sets: Vec<Arc<DescriptorSet>>,
}

/// One set per frame: the frame's uniform buffer at binding 0, the texture at
/// binding 1.
fn allocate_descriptor_sets(
  descriptors: &mut DescriptorAllocator,
  layout: &Arc<DescriptorSetLayout>,
  uniform_buffers: &FrameRing<Subbuffer<UniformBufferObject>>,
  texture: &ModelTexture,
) -> Result<Vec<Arc<DescriptorSet>>> {
  descriptors.allocate_per_frame(layout, |frame| {
    vec![
      WriteDescriptorSet::buffer(0, uniform_buffers.get(frame).clone()),
      WriteDescriptorSet::image_view_sampler(1, texture.view.clone(), texture.sampler.clone()),
    ]
  })
}

impl Model {
  /// Loads `path` and allocates its buffers and one descriptor set per frame in
  /// flight from `descriptors`.
  pub fn load(
    gpu: &VulkanContext,
    pipelines: &ApplicationPipelines,
    descriptors: &mut DescriptorAllocator,
    kind: PipelineKind,
    path: &Path,
    texture: ModelTexture,
  ) -> Result<Self> {
    let mesh = load_mesh(path)?;
    Self::new(gpu, pipelines, descriptors, kind, path, &mesh, texture)
  }

  pub fn new(
    gpu: &VulkanContext,
    pipelines: &ApplicationPipelines,
    descriptors: &mut DescriptorAllocator,
    kind: PipelineKind,
    source: &Path,
    mesh: &MeshData,
    texture: ModelTexture,
  ) -> Result<Self> {
    let vertex_buffer = Buffer::from_iter(
      gpu.memory_allocator.clone(),
      BufferCreateInfo {
        usage: BufferUsage::VERTEX_BUFFER,
        ..Default::default()
      },
      AllocationCreateInfo {
        memory_type_filter: MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
        ..Default::default()
      },
      mesh.vertices.iter().copied(),
    )
    .gpu("creating vertex buffer")?;

    let index_buffer = Buffer::from_iter(
      gpu.memory_allocator.clone(),
      BufferCreateInfo {
        usage: BufferUsage::INDEX_BUFFER,
        ..Default::default()
      },
      AllocationCreateInfo {
        memory_type_filter: MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
        ..Default::default()
      },
      mesh.indices.iter().copied(),
    )
    .gpu("creating index buffer")?;

    let uniform_buffers = FrameRing::try_new(|_| {
      Buffer::from_data(
        gpu.memory_allocator.clone(),
        BufferCreateInfo {
          usage: BufferUsage::UNIFORM_BUFFER,
          ..Default::default()
        },
        AllocationCreateInfo {
          memory_type_filter: MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
          ..Default::default()
        },
        UniformBufferObject::default(),
      )
      .gpu("creating uniform buffer")
    })?;

    let descriptor_sets = allocate_descriptor_sets(
      descriptors,
      pipelines.set_layout(kind),
      &uniform_buffers,
      &texture,
    )?;

    Ok(Self {
      source: source.to_path_buf(),
      kind,
      vertex_buffer,
      index_buffer,
      index_count: mesh.indices.len() as u32,
      uniform_buffers,
      texture,
      descriptor_sets,
    })
  }

  /// Reallocates the per-frame sets from `descriptors` against the current set
  /// layout of this model's pipeline. Buffers and texture are reused.
  pub fn rebind(
    &mut self,
    pipelines: &ApplicationPipelines,
    descriptors: &mut DescriptorAllocator,
  ) -> Result<()> {
    self.descriptor_sets = allocate_descriptor_sets(
      descriptors,
      pipelines.set_layout(self.kind),
      &self.uniform_buffers,
      &self.texture,
    )?;
    Ok(())
  }

  pub fn pipeline_kind(&self) -> PipelineKind {
    self.kind
  }

  pub fn source(&self) -> &Path {
    &self.source
  }

  /// Writes the transforms used by `frame`. The caller must have waited on that
  /// frame's fence.
  pub fn update_uniform_buffer(&self, ubo: UniformBufferObject, frame: usize) -> Result<()> {
    *self
      .uniform_buffers
      .get(frame)
      .write()
      .gpu("writing uniform buffer")? = ubo;
    Ok(())
  }

  /// Binds vertex, index buffer and the descriptor set of `frame`.
  pub fn bind(
    &self,
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    layout: &Arc<PipelineLayout>,
    frame: usize,
  ) -> Result<()> {
    builder
      .bind_vertex_buffers(0, self.vertex_buffer.clone())
      .gpu("binding vertex buffer")?
      .bind_index_buffer(self.index_buffer.clone())
      .gpu("binding index buffer")?
      .bind_descriptor_sets(
        PipelineBindPoint::Graphics,
        layout.clone(),
        0,
        self.descriptor_sets[frame].clone(),
      )
      .gpu("binding model descriptor set")?;
    Ok(())
  }

  pub fn draw(&self, builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>) -> Result<()> {
    unsafe { builder.draw_indexed(self.index_count, 1, 0, 0, 0) }.gpu("recording indexed draw")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::io::{BufReader, Cursor};

  use approx::assert_relative_eq;

  use super::*;

  fn parse(source: &str) -> Result<MeshData> {
    let mut reader = BufReader::new(Cursor::new(source.as_bytes()));
    let (models, _) = tobj::load_obj_buf(&mut reader, &obj_load_options(), |_| {
      Err(tobj::LoadError::OpenFileFailed)
    })?;
    MeshData::from_obj_models(&models, Path::new("test.obj"))
  }

  const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

  #[test]
  fn quads_are_triangulated_and_v_is_flipped() {
    let mesh = parse(QUAD).unwrap();
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices.len(), 6);

    let top_right = mesh
      .vertices
      .iter()
      .find(|v| v.position == [1.0, 1.0, 0.0])
      .unwrap();
    assert_relative_eq!(top_right.tex_coord[0], 1.0);
    assert_relative_eq!(top_right.tex_coord[1], 0.0);
    assert!(mesh.vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
  }

  #[test]
  fn shared_corners_are_deduplicated() {
    let mesh = parse(
      "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3
f 1 3 4
",
    )
    .unwrap();
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices, [0, 1, 2, 0, 2, 3]);
  }

  #[test]
  fn missing_texture_coordinates_default_to_zero() {
    let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    assert!(mesh.vertices.iter().all(|v| v.tex_coord == [0.0, 0.0]));
  }

  #[test]
  fn meshes_without_a_triangle_are_rejected() {
    let err = parse("v 0 0 0\nv 1 0 0\n").unwrap_err();
    assert!(matches!(err, RenderError::DegenerateModel { count: 0, .. }));
  }

  #[test]
  fn objects_are_merged_with_offset_indices() {
    let mesh = parse(
      "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
",
    )
    .unwrap();
    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.indices, [0, 1, 2, 3, 4, 5]);
  }
}
