//! Perlin noise generated by a compute shader and blitted onto the frame.

use std::sync::Arc;

use vulkano::{
  command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer},
  descriptor_set::{DescriptorSet, WriteDescriptorSet, layout::DescriptorType},
  image::view::ImageView,
  pipeline::{ComputePipeline, Pipeline, PipelineBindPoint},
};

use super::{Scene, SceneContext};
use crate::{
  core::{
    frames::{FrameRing, MAX_FRAMES_IN_FLIGHT},
    swapchain::FrameTarget,
  },
  error::{GpuResultExt, Result},
  input::InputState,
  render::{
    commands::AutoCommandBufferBuilderExt,
    descriptors::DescriptorAllocator,
    pipeline::ApplicationPipelines,
    texture::{create_storage_image, dispatch_groups},
    vertex::PerlinPushConstants,
  },
  shaders::PERLIN_LOCAL_SIZE,
};

/// Noise-space units per second the offset moves while auto-scrolling.
const SCROLL_SPEED: f32 = 0.5;

/// One storage image per frame in flight.
pub fn pool_sizes() -> (Vec<(DescriptorType, u32)>, u32) {
  let frames = MAX_FRAMES_IN_FLIGHT as u32;
  (vec![(DescriptorType::StorageImage, frames)], frames)
}

/// Resets the pool and binds each frame's storage image at binding 0.
fn allocate_image_sets(
  descriptors: &mut DescriptorAllocator,
  pipelines: &ApplicationPipelines,
  images: &FrameRing<Arc<ImageView>>,
) -> Result<Vec<Arc<DescriptorSet>>> {
  let (sizes, max_sets) = pool_sizes();
  descriptors.destroy_pool();
  descriptors.create_pool(&sizes, max_sets);
  descriptors.allocate_per_frame(pipelines.perlin_set_layout(), |frame| {
    vec![WriteDescriptorSet::image_view(0, images.get(frame).clone())]
  })
}

struct ComputeResources {
  pipeline:    Arc<ComputePipeline>,
  descriptors: DescriptorAllocator,
  images:      FrameRing<Arc<ImageView>>,
  sets:        Vec<Arc<DescriptorSet>>,
  extent:      [u32; 2],
}

pub struct ComputeScene {
  params:      PerlinPushConstants,
  auto_scroll: bool,
  resources:   Option<ComputeResources>,
}

impl Default for ComputeScene {
  fn default() -> Self {
    Self::new()
  }
}

impl ComputeScene {
  pub fn new() -> Self {
    Self {
      params:      PerlinPushConstants::default(),
      auto_scroll: true,
      resources:   None,
    }
  }

  pub fn params(&self) -> PerlinPushConstants {
    self.params
  }

  fn scroll(&mut self, delta_time: f64) {
    if self.auto_scroll {
      self.params.offset[0] += SCROLL_SPEED * delta_time as f32;
    }
  }
}

impl Scene for ComputeScene {
  fn name(&self) -> &str {
    "Compute Preview Scene"
  }

  fn init(&mut self, ctx: &SceneContext) -> Result<()> {
    let gpu = ctx.gpu;
    let requested = [ctx.config.compute.width, ctx.config.compute.height];

    let images = FrameRing::try_new(|_| create_storage_image(gpu, requested))?;
    let [width, height, _] = images.get(0).image().extent();
    let extent = [width, height];

    let mut descriptors = DescriptorAllocator::new(gpu.descriptor_set_allocator.clone());
    let sets = allocate_image_sets(&mut descriptors, ctx.pipelines, &images)?;

    log::debug!("Compute preview images created at {}x{}", extent[0], extent[1]);
    self.resources = Some(ComputeResources {
      pipeline: ctx.pipelines.perlin.clone(),
      descriptors,
      images,
      sets,
      extent,
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
    resources.pipeline = ctx.pipelines.perlin.clone();
    resources.sets = allocate_image_sets(&mut resources.descriptors, ctx.pipelines, &resources.images)?;
    Ok(())
  }

  fn update(
    &mut self,
    _frame: usize,
    _extent: [u32; 2],
    delta_time: f64,
    _input: &InputState,
  ) -> Result<()> {
    self.scroll(delta_time);
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
    let layout = resources.pipeline.layout();

    builder
      .bind_pipeline_compute(resources.pipeline.clone())
      .gpu("binding compute pipeline")?
      .bind_descriptor_sets(
        PipelineBindPoint::Compute,
        layout.clone(),
        0,
        resources.sets[frame].clone(),
      )
      .gpu("binding storage image")?
      .push_constants(layout.clone(), 0, self.params)
      .gpu("pushing noise parameters")?;

    unsafe { builder.dispatch(dispatch_groups(resources.extent, PERLIN_LOCAL_SIZE)) }
      .gpu("recording dispatch")?;

    builder.blit_to_target(resources.images.get(frame).image().clone(), target)?;
    Ok(())
  }

  fn show_gui(&mut self, ctx: &egui::Context) {
    egui::Window::new("Noise")
      .default_pos([10.0, 320.0])
      .show(ctx, |ui| {
        ui.add(egui::Slider::new(&mut self.params.offset[0], -100.0..=100.0).text("Offset X"));
        ui.add(egui::Slider::new(&mut self.params.offset[1], -100.0..=100.0).text("Offset Y"));
        ui.add(egui::Slider::new(&mut self.params.scale, 0.5..=64.0).text("Scale"));
        ui.checkbox(&mut self.auto_scroll, "Auto Scroll");
      });
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn pool_holds_one_storage_image_per_frame() {
    let (sizes, max_sets) = pool_sizes();
    assert_eq!(sizes, [(
      DescriptorType::StorageImage,
      MAX_FRAMES_IN_FLIGHT as u32
    )]);
    assert_eq!(max_sets, MAX_FRAMES_IN_FLIGHT as u32);
  }

  #[test]
  fn auto_scroll_moves_the_offset() {
    let mut scene = ComputeScene::new();
    scene
      .update(0, [1, 1], 2.0, &InputState::default())
      .unwrap();
    assert_relative_eq!(scene.params().offset[0], 2.0 * SCROLL_SPEED);
    assert_relative_eq!(scene.params().offset[1], 0.0);

    scene.auto_scroll = false;
    scene
      .update(0, [1, 1], 2.0, &InputState::default())
      .unwrap();
    assert_relative_eq!(scene.params().offset[0], 2.0 * SCROLL_SPEED);
  }

  #[test]
  fn destroy_before_init_is_harmless() {
    let mut scene = ComputeScene::new();
    assert_eq!(scene.name(), "Compute Preview Scene");
    scene.destroy();
    assert!(scene.resources.is_none());
  }
}
