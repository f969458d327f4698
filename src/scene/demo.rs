//! Textured room with a tinted, alpha-blended cube, both spinning around Z.

use std::{collections::BTreeMap, f32::consts::FRAC_PI_2, sync::Arc};

use glam::Mat4;
use vulkano::{
  command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer},
  descriptor_set::layout::DescriptorType,
  pipeline::{GraphicsPipeline, Pipeline},
};

use super::{Scene, SceneContext};
use crate::{
  core::{frames::MAX_FRAMES_IN_FLIGHT, swapchain::FrameTarget},
  error::{GpuResultExt, Result},
  input::InputState,
  render::{
    camera::Camera,
    commands::AutoCommandBufferBuilderExt,
    descriptors::DescriptorAllocator,
    model::{Model, ModelTexture},
    pipeline::PipelineKind,
    texture::{create_sampler, load_texture},
    vertex::{MeshPushConstants, UniformBufferObject},
  },
};

const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

pub const DEFAULT_CUBE_COLOR: [f32; 4] = [
  114.0 / 255.0,
  144.0 / 255.0,
  154.0 / 255.0,
  200.0 / 255.0,
];

/// Pool quotas for `model_count` textured models: one uniform buffer and one
/// combined image sampler per model and frame in flight.
pub fn pool_sizes(model_count: usize) -> (Vec<(DescriptorType, u32)>, u32) {
  let sets = (model_count * MAX_FRAMES_IN_FLIGHT) as u32;
  (
    vec![
      (DescriptorType::UniformBuffer, sets),
      (DescriptorType::CombinedImageSampler, sets),
    ],
    sets,
  )
}

/// Quarter turn per second around +Z.
pub fn model_matrix(elapsed_secs: f64) -> Mat4 {
  Mat4::from_rotation_z(elapsed_secs as f32 * FRAC_PI_2)
}

/// Opaque geometry is drawn untinted, transparent geometry takes the cube colour.
pub fn push_constants_for(kind: PipelineKind, cube_color: [f32; 4]) -> MeshPushConstants {
  match kind {
    PipelineKind::Opaque => MeshPushConstants::default(),
    PipelineKind::Transparent => MeshPushConstants::new(Mat4::IDENTITY, cube_color),
  }
}

struct Batch {
  pipeline: Arc<GraphicsPipeline>,
  models:   Vec<Model>,
}

struct DemoResources {
  descriptors: DescriptorAllocator,
  batches:     BTreeMap<PipelineKind, Batch>,
}

pub struct DemoScene {
  camera:     Camera,
  cube_color: [f32; 4],
  elapsed:    f64,
  resources:  Option<DemoResources>,
}

impl Default for DemoScene {
  fn default() -> Self {
    Self::new()
  }
}

impl DemoScene {
  pub fn new() -> Self {
    Self {
      camera:     Camera::default(),
      cube_color: DEFAULT_CUBE_COLOR,
      elapsed:    0.0,
      resources:  None,
    }
  }

  pub fn cube_color(&self) -> [f32; 4] {
    self.cube_color
  }
}

impl Scene for DemoScene {
  fn name(&self) -> &str {
    "Demo Scene"
  }

  fn init(&mut self, ctx: &SceneContext) -> Result<()> {
    let gpu = ctx.gpu;
    let assets = &ctx.config.assets;

    let sampler = create_sampler(gpu)?;
    let room_texture = ModelTexture {
      view:    load_texture(gpu, &assets.room_texture)?,
      sampler: sampler.clone(),
    };
    let cube_texture = ModelTexture {
      view: load_texture(gpu, &assets.cube_texture)?,
      sampler,
    };

    let sources = [
      (PipelineKind::Opaque, &assets.room_model, room_texture),
      (PipelineKind::Transparent, &assets.cube_model, cube_texture),
    ];

    let (sizes, max_sets) = pool_sizes(sources.len());
    let mut descriptors = DescriptorAllocator::new(gpu.descriptor_set_allocator.clone());
    descriptors.create_pool(&sizes, max_sets);

    let mut batches: BTreeMap<PipelineKind, Batch> = BTreeMap::new();
    for (kind, path, texture) in sources {
      let model = Model::load(gpu, ctx.pipelines, &mut descriptors, kind, path, texture)?;
      log::debug!("{} drawn with the {kind:?} pipeline", model.source().display());
      batches
        .entry(kind)
        .or_insert_with(|| Batch {
          pipeline: ctx.pipelines.graphics(kind).clone(),
          models:   Vec::new(),
        })
        .models
        .push(model);
    }

    self.resources = Some(DemoResources {
      descriptors,
      batches,
    });
    Ok(())
  }

  fn destroy(&mut self) {
    if let Some(mut resources) = self.resources.take() {
      resources.descriptors.destroy_pool();
    }
  }

  fn rebind_pipelines(&mut self, ctx: &SceneContext) -> Result<()> {
    let Some(resources) = &mut self.resources else {
      return Ok(());
    };

    let model_count = resources.batches.values().map(|batch| batch.models.len()).sum();
    let (sizes, max_sets) = pool_sizes(model_count);
    resources.descriptors.destroy_pool();
    resources.descriptors.create_pool(&sizes, max_sets);

    for (&kind, batch) in &mut resources.batches {
      batch.pipeline = ctx.pipelines.graphics(kind).clone();
      for model in &mut batch.models {
        model.rebind(ctx.pipelines, &mut resources.descriptors)?;
      }
    }
    Ok(())
  }

  fn update(
    &mut self,
    frame: usize,
    extent: [u32; 2],
    delta_time: f64,
    input: &InputState,
  ) -> Result<()> {
    self.camera.apply_input(input, delta_time);
    self.elapsed += delta_time;

    let Some(resources) = &self.resources else {
      return Ok(());
    };

    let aspect_ratio = extent[0] as f32 / extent[1].max(1) as f32;
    let ubo = UniformBufferObject::new(
      model_matrix(self.elapsed),
      self.camera.view_matrix(),
      self.camera.projection_matrix(aspect_ratio),
    );

    for model in resources.batches.values().flat_map(|batch| &batch.models) {
      model.update_uniform_buffer(ubo, frame)?;
    }
    Ok(())
  }

  fn draw(
    &mut self,
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    target: &FrameTarget,
    frame: usize,
  ) -> Result<()> {
    let Some(resources) = &self.resources else {
      return Ok(());
    };

    builder
      .begin_scene_rendering(target, CLEAR_COLOR)?
      .set_full_viewport(target.extent)?;

    for (&kind, batch) in &resources.batches {
      let layout = batch.pipeline.layout();
      builder
        .bind_pipeline_graphics(batch.pipeline.clone())
        .gpu("binding graphics pipeline")?;

      let constants = push_constants_for(kind, self.cube_color);
      for model in &batch.models {
        model.bind(builder, layout, frame)?;
        builder
          .push_constants(layout.clone(), 0, constants)
          .gpu("pushing mesh constants")?;
        model.draw(builder)?;
      }
    }

    builder.end_rendering().gpu("ending dynamic rendering")?;
    Ok(())
  }

  fn show_gui(&mut self, ctx: &egui::Context) {
    egui::Window::new("Cube Color")
      .default_pos([10.0, 560.0])
      .show(ctx, |ui| {
        ui.horizontal(|ui| {
          ui.label("Cube Color");
          ui.color_edit_button_rgba_unmultiplied(&mut self.cube_color);
        });
        if ui.button("Reset").clicked() {
          self.cube_color = DEFAULT_CUBE_COLOR;
        }
      });

    self.camera.show_parameter_gui(ctx);
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use glam::Vec3;

  use super::*;
  use crate::render::descriptors::PoolBudget;

  #[test]
  fn model_turns_a_quarter_per_second() {
    let turned = model_matrix(1.0).transform_vector3(Vec3::X);
    assert_relative_eq!(turned.x, 0.0, epsilon = 1e-6);
    assert_relative_eq!(turned.y, 1.0, epsilon = 1e-6);
    assert_relative_eq!(turned.z, 0.0);

    assert_eq!(model_matrix(0.0), Mat4::IDENTITY);
  }

  #[test]
  fn only_transparent_models_are_tinted() {
    let color = [0.5, 0.25, 0.125, 0.75];
    assert_eq!(push_constants_for(PipelineKind::Opaque, color).color, [1.0; 4]);
    assert_eq!(push_constants_for(PipelineKind::Transparent, color).color, color);
  }

  #[test]
  fn default_cube_color_is_translucent_teal() {
    let scene = DemoScene::new();
    assert_eq!(scene.name(), "Demo Scene");
    assert_relative_eq!(scene.cube_color()[3], 200.0 / 255.0);
  }

  #[test]
  fn pool_fits_both_models_for_every_frame() {
    let (sizes, max_sets) = pool_sizes(2);
    let mut budget = PoolBudget::new(&sizes, max_sets);
    let per_set = [
      (DescriptorType::UniformBuffer, 1),
      (DescriptorType::CombinedImageSampler, 1),
    ];

    budget.reserve(&per_set, MAX_FRAMES_IN_FLIGHT as u32).unwrap();
    budget.reserve(&per_set, MAX_FRAMES_IN_FLIGHT as u32).unwrap();
    assert!(budget.reserve(&per_set, 1).is_err());
  }
}
