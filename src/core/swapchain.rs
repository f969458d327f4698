//! Swapchain, its image views and the matching depth images.

use std::sync::Arc;

use vulkano::{
  Validated,
  VulkanError,
  device::Device,
  format::Format,
  image::{Image, ImageCreateInfo, ImageType, ImageUsage, view::ImageView},
  memory::allocator::{AllocationCreateInfo, StandardMemoryAllocator},
  swapchain::{
    self,
    CompositeAlpha,
    PresentMode,
    Surface,
    Swapchain,
    SwapchainAcquireFuture,
    SwapchainCreateInfo,
  },
};
use winit::window::Window;

use crate::{
  config::PresentModePreference,
  error::{GpuResultExt, RenderError, Result},
};

pub const DEPTH_FORMAT: Format = Format::D32_SFLOAT;

/// Picks the preferred present mode, degrading towards FIFO which every surface
/// supports.
pub fn choose_present_mode(
  preference: PresentModePreference,
  supported: &[PresentMode],
) -> PresentMode {
  let candidates: &[PresentMode] = match preference {
    PresentModePreference::Immediate => &[PresentMode::Immediate, PresentMode::Mailbox],
    PresentModePreference::Mailbox => &[PresentMode::Mailbox],
    PresentModePreference::Fifo => &[],
  };

  candidates
    .iter()
    .copied()
    .find(|mode| supported.contains(mode))
    .unwrap_or(PresentMode::Fifo)
}

/// Prefers an 8-bit UNORM colour format so the overlay and compute blits need no
/// sRGB conversion.
pub fn choose_image_format(supported: &[Format]) -> Option<Format> {
  supported
    .iter()
    .copied()
    .find(|format| {
      matches!(
        format,
        Format::B8G8R8A8_UNORM | Format::R8G8B8A8_UNORM | Format::A8B8G8R8_UNORM_PACK32
      )
    })
    .or_else(|| supported.first().copied())
}

/// Image the current frame renders into.
#[derive(Clone)]
pub struct FrameTarget {
  pub image:  Arc<Image>,
  pub view:   Arc<ImageView>,
  pub depth:  Arc<ImageView>,
  pub extent: [u32; 2],
}

pub struct SwapchainState {
  pub swapchain:   Arc<Swapchain>,
  pub images:      Vec<Arc<Image>>,
  pub views:       Vec<Arc<ImageView>>,
  pub depth_views: Vec<Arc<ImageView>>,
  memory_allocator: Arc<StandardMemoryAllocator>,
}

pub enum Acquired {
  Image {
    index:      u32,
    suboptimal: bool,
    future:     SwapchainAcquireFuture,
  },
  OutOfDate,
}

impl SwapchainState {
  pub fn new(
    device: Arc<Device>,
    surface: Arc<Surface>,
    window: &Window,
    memory_allocator: Arc<StandardMemoryAllocator>,
    preference: PresentModePreference,
  ) -> Result<Self> {
    let physical_device = device.physical_device();
    let surface_capabilities = physical_device
      .surface_capabilities(&surface, Default::default())
      .gpu("querying surface capabilities")?;

    let present_modes: Vec<PresentMode> = physical_device
      .surface_present_modes(&surface, Default::default())
      .gpu("querying present modes")?
      .into_iter()
      .collect();
    let present_mode = choose_present_mode(preference, &present_modes);
    log::info!("Using {present_mode:?} present mode");

    let formats: Vec<Format> = physical_device
      .surface_formats(&surface, Default::default())
      .gpu("querying surface formats")?
      .into_iter()
      .map(|(format, _)| format)
      .collect();
    let image_format = choose_image_format(&formats).ok_or(RenderError::Gpu {
      context: "choosing a surface format",
      message: "surface reports no formats".to_owned(),
    })?;
    log::info!("Selected format: {image_format:?}");

    // Two images at least, so one can be presented while the next is drawn
    let (swapchain, images) = Swapchain::new(device.clone(), surface, SwapchainCreateInfo {
      min_image_count: surface_capabilities.min_image_count.max(2),
      image_format,
      image_extent: window.inner_size().into(),
      image_usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
      composite_alpha: CompositeAlpha::Opaque,
      pre_transform: surface_capabilities.current_transform,
      clipped: true,
      present_mode,
      ..Default::default()
    })
    .gpu("creating swapchain")?;

    let mut state = Self {
      swapchain,
      images: Vec::new(),
      views: Vec::new(),
      depth_views: Vec::new(),
      memory_allocator,
    };
    state.rebuild_views(images)?;
    Ok(state)
  }

  pub fn image_format(&self) -> Format {
    self.swapchain.image_format()
  }

  pub fn extent(&self) -> [u32; 2] {
    self.swapchain.image_extent()
  }

  /// Recreates the swapchain for a new window size.
  pub fn recreate(&mut self, image_extent: [u32; 2]) -> Result<()> {
    let (swapchain, images) = self
      .swapchain
      .recreate(SwapchainCreateInfo {
        image_extent,
        ..self.swapchain.create_info()
      })
      .gpu("recreating swapchain")?;

    log::debug!("Swapchain recreated at {}x{}", image_extent[0], image_extent[1]);
    self.swapchain = swapchain;
    self.rebuild_views(images)
  }

  fn rebuild_views(&mut self, images: Vec<Arc<Image>>) -> Result<()> {
    self.views = images
      .iter()
      .map(|image| ImageView::new_default(image.clone()).gpu("creating swapchain image view"))
      .collect::<Result<_>>()?;

    // Depth is never read back, so it can stay transient
    self.depth_views = images
      .iter()
      .map(|image| {
        let depth = Image::new(
          self.memory_allocator.clone(),
          ImageCreateInfo {
            image_type: ImageType::Dim2d,
            format: DEPTH_FORMAT,
            extent: image.extent(),
            usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::TRANSIENT_ATTACHMENT,
            ..Default::default()
          },
          AllocationCreateInfo::default(),
        )
        .gpu("creating depth image")?;
        ImageView::new_default(depth).gpu("creating depth image view")
      })
      .collect::<Result<_>>()?;

    self.images = images;
    Ok(())
  }

  pub fn acquire(&self) -> Result<Acquired> {
    match swapchain::acquire_next_image(self.swapchain.clone(), None).map_err(Validated::unwrap) {
      Ok((index, suboptimal, future)) => Ok(Acquired::Image {
        index,
        suboptimal,
        future,
      }),
      // Window resized between the last recreate and now
      Err(VulkanError::OutOfDate) => Ok(Acquired::OutOfDate),
      Err(e) => Err(e).gpu("acquiring swapchain image"),
    }
  }

  pub fn target(&self, image_index: u32) -> FrameTarget {
    let i = image_index as usize;
    FrameTarget {
      image:  self.images[i].clone(),
      view:   self.views[i].clone(),
      depth:  self.depth_views[i].clone(),
      extent: self.extent(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preferred_mode_is_used_when_available() {
    let supported = [PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate];
    assert_eq!(
      choose_present_mode(PresentModePreference::Immediate, &supported),
      PresentMode::Immediate
    );
    assert_eq!(
      choose_present_mode(PresentModePreference::Mailbox, &supported),
      PresentMode::Mailbox
    );
    assert_eq!(
      choose_present_mode(PresentModePreference::Fifo, &supported),
      PresentMode::Fifo
    );
  }

  #[test]
  fn immediate_falls_back_to_mailbox_then_fifo() {
    assert_eq!(
      choose_present_mode(PresentModePreference::Immediate, &[
        PresentMode::Fifo,
        PresentMode::Mailbox
      ]),
      PresentMode::Mailbox
    );
    assert_eq!(
      choose_present_mode(PresentModePreference::Immediate, &[PresentMode::Fifo]),
      PresentMode::Fifo
    );
    assert_eq!(
      choose_present_mode(PresentModePreference::Mailbox, &[PresentMode::Fifo]),
      PresentMode::Fifo
    );
  }

  #[test]
  fn unorm_formats_are_preferred() {
    let formats = [Format::B8G8R8A8_SRGB, Format::B8G8R8A8_UNORM];
    assert_eq!(choose_image_format(&formats), Some(Format::B8G8R8A8_UNORM));
    assert_eq!(
      choose_image_format(&[Format::B8G8R8A8_SRGB]),
      Some(Format::B8G8R8A8_SRGB)
    );
    assert_eq!(choose_image_format(&[]), None);
  }
}
