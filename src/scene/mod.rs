//! Scenes: self-contained sets of GPU resources with their own draw recording.
//!
//! A scene is constructed cheaply and only allocates GPU resources in
//! [`Scene::init`]. The [`manager::SceneManager`] makes sure no frame in flight
//! still uses a scene's resources when [`Scene::destroy`] runs.

pub mod compute;
pub mod demo;
pub mod manager;

use vulkano::command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer};

pub use self::{compute::ComputeScene, demo::DemoScene, manager::SceneManager};
use crate::{
  config::AppConfig,
  core::{init::VulkanContext, swapchain::FrameTarget},
  error::Result,
  input::InputState,
  render::pipeline::ApplicationPipelines,
};

/// Shared state a scene builds its resources from.
#[derive(Clone, Copy)]
pub struct SceneContext<'a> {
  pub gpu:       &'a VulkanContext,
  pub pipelines: &'a ApplicationPipelines,
  pub config:    &'a AppConfig,
}

pub trait Scene {
  fn name(&self) -> &str;

  /// Allocates every GPU resource of the scene.
  fn init(&mut self, ctx: &SceneContext) -> Result<()>;

  /// Releases the GPU resources. The scene can be initialised again later.
  fn destroy(&mut self);

  /// Switches an initialised scene to rebuilt pipelines, keeping its meshes and
  /// images. Descriptor sets are reallocated against the new set layouts.
  fn rebind_pipelines(&mut self, ctx: &SceneContext) -> Result<()>;

  /// Per-frame CPU work: input, animation and uniform writes for `frame`.
  fn update(
    &mut self,
    frame: usize,
    extent: [u32; 2],
    delta_time: f64,
    input: &InputState,
  ) -> Result<()>;

  /// Records the scene's commands for `frame` into the swapchain image `target`.
  fn draw(
    &mut self,
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    target: &FrameTarget,
    frame: usize,
  ) -> Result<()>;

  /// Scene-specific overlay windows.
  fn show_gui(&mut self, ctx: &egui::Context);
}
