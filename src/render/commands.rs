//! Command-recording helpers shared by the scenes.

use std::sync::Arc;

use vulkano::{
  command_buffer::{AutoCommandBufferBuilder, BlitImageInfo, RenderingAttachmentInfo, RenderingInfo},
  image::{Image, sampler::Filter},
  pipeline::graphics::viewport::{Scissor, Viewport},
  render_pass::{AttachmentLoadOp, AttachmentStoreOp},
};

use crate::{
  core::swapchain::FrameTarget,
  error::{GpuResultExt, Result},
};

/// Viewport covering a whole `extent` with the full depth range.
pub fn full_viewport(extent: [u32; 2]) -> Viewport {
  Viewport {
    offset:      [0.0, 0.0],
    extent:      [extent[0] as f32, extent[1] as f32],
    depth_range: 0.0..=1.0,
  }
}

pub trait AutoCommandBufferBuilderExt {
  /// Starts dynamic rendering into the frame's colour and depth images, clearing
  /// colour to `clear_color` and depth to 1.0.
  fn begin_scene_rendering(&mut self, target: &FrameTarget, clear_color: [f32; 4]) -> Result<&mut Self>;

  /// Viewport and scissor covering the whole target.
  fn set_full_viewport(&mut self, extent: [u32; 2]) -> Result<&mut Self>;

  /// Scales `source` onto the frame image with linear filtering.
  fn blit_to_target(&mut self, source: Arc<Image>, target: &FrameTarget) -> Result<&mut Self>;
}

impl<L> AutoCommandBufferBuilderExt for AutoCommandBufferBuilder<L> {
  fn begin_scene_rendering(&mut self, target: &FrameTarget, clear_color: [f32; 4]) -> Result<&mut Self> {
    self
      .begin_rendering(RenderingInfo {
        render_area_extent: target.extent,
        color_attachments: vec![Some(RenderingAttachmentInfo {
          load_op: AttachmentLoadOp::Clear,
          store_op: AttachmentStoreOp::Store,
          clear_value: Some(clear_color.into()),
          ..RenderingAttachmentInfo::image_view(target.view.clone())
        })],
        depth_attachment: Some(RenderingAttachmentInfo {
          load_op: AttachmentLoadOp::Clear,
          store_op: AttachmentStoreOp::DontCare,
          clear_value: Some(1.0f32.into()),
          ..RenderingAttachmentInfo::image_view(target.depth.clone())
        }),
        ..Default::default()
      })
      .gpu("beginning dynamic rendering")
  }

  fn set_full_viewport(&mut self, extent: [u32; 2]) -> Result<&mut Self> {
    self
      .set_viewport(0, [full_viewport(extent)].into_iter().collect())
      .gpu("setting viewport")?
      .set_scissor(
        0,
        [Scissor {
          offset: [0, 0],
          extent,
        }]
        .into_iter()
        .collect(),
      )
      .gpu("setting scissor")
  }

  fn blit_to_target(&mut self, source: Arc<Image>, target: &FrameTarget) -> Result<&mut Self> {
    self
      .blit_image(BlitImageInfo {
        filter: Filter::Linear,
        ..BlitImageInfo::images(source, target.image.clone())
      })
      .gpu("blitting to swapchain image")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn viewport_covers_extent() {
    let viewport = full_viewport([1600, 900]);
    assert_eq!(viewport.offset, [0.0, 0.0]);
    assert_eq!(viewport.extent, [1600.0, 900.0]);
    assert_eq!(viewport.depth_range, 0.0..=1.0);
  }
}
