//! Sampled textures, samplers and compute storage images.

use std::{path::Path, sync::Arc};

use image::RgbaImage;
use vulkano::{
  buffer::{Buffer, BufferCreateInfo, BufferUsage},
  command_buffer::{
    AutoCommandBufferBuilder,
    CommandBufferUsage,
    CopyBufferToImageInfo,
    PrimaryCommandBufferAbstract,
  },
  format::Format,
  image::{
    Image,
    ImageCreateInfo,
    ImageType,
    ImageUsage,
    sampler::{Filter, Sampler, SamplerAddressMode, SamplerCreateInfo},
    view::ImageView,
  },
  memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
  sync::GpuFuture,
};

use crate::{
  core::init::{DeviceCapabilities, VulkanContext},
  error::{GpuResultExt, Result},
};

/// Format of images written by compute shaders and blitted to the swapchain.
pub const STORAGE_IMAGE_FORMAT: Format = Format::R8G8B8A8_UNORM;

/// Decodes an image file into tightly packed RGBA8 pixels.
pub fn decode_rgba8(path: &Path) -> Result<RgbaImage> {
  Ok(image::open(path)?.to_rgba8())
}

/// Loads an image file into a device-local sRGB texture. Blocks until the upload
/// has finished.
pub fn load_texture(gpu: &VulkanContext, path: &Path) -> Result<Arc<ImageView>> {
  let pixels = decode_rgba8(path)?;
  let (width, height) = pixels.dimensions();
  log::debug!("Uploading texture {} ({width}x{height})", path.display());

  let image = Image::new(
    gpu.memory_allocator.clone(),
    ImageCreateInfo {
      image_type: ImageType::Dim2d,
      format: Format::R8G8B8A8_SRGB,
      extent: [width, height, 1],
      usage: ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED,
      ..Default::default()
    },
    AllocationCreateInfo {
      memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
      ..Default::default()
    },
  )
  .gpu("creating texture image")?;

  let staging_buffer = Buffer::from_iter(
    gpu.memory_allocator.clone(),
    BufferCreateInfo {
      usage: BufferUsage::TRANSFER_SRC,
      ..Default::default()
    },
    AllocationCreateInfo {
      memory_type_filter: MemoryTypeFilter::PREFER_HOST | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
      ..Default::default()
    },
    pixels.into_raw(),
  )
  .gpu("creating texture staging buffer")?;

  let mut upload = AutoCommandBufferBuilder::primary(
    gpu.command_buffer_allocator.clone(),
    gpu.queue.queue_family_index(),
    CommandBufferUsage::OneTimeSubmit,
  )
  .gpu("creating upload command buffer")?;

  upload
    .copy_buffer_to_image(CopyBufferToImageInfo::buffer_image(
      staging_buffer,
      image.clone(),
    ))
    .gpu("recording texture upload")?;

  upload
    .build()
    .gpu("building upload command buffer")?
    .execute(gpu.queue.clone())
    .gpu("submitting texture upload")?
    .then_signal_fence_and_flush()
    .gpu("flushing texture upload")?
    .wait(None)
    .gpu("waiting for texture upload")?;

  ImageView::new_default(image).gpu("creating texture view")
}

/// Linear, repeating sampler. Anisotropic filtering is enabled at the device
/// maximum when the device supports it.
pub fn create_sampler(gpu: &VulkanContext) -> Result<Arc<Sampler>> {
  Sampler::new(gpu.device.clone(), sampler_create_info(&gpu.capabilities))
    .gpu("creating sampler")
}

fn sampler_create_info(capabilities: &DeviceCapabilities) -> SamplerCreateInfo {
  SamplerCreateInfo {
    mag_filter: Filter::Linear,
    min_filter: Filter::Linear,
    address_mode: [SamplerAddressMode::Repeat; 3],
    anisotropy: capabilities.max_sampler_anisotropy,
    ..Default::default()
  }
}

/// Device-local image a compute shader writes and the frame blits from.
pub fn create_storage_image(gpu: &VulkanContext, extent: [u32; 2]) -> Result<Arc<ImageView>> {
  let image = Image::new(
    gpu.memory_allocator.clone(),
    ImageCreateInfo {
      image_type: ImageType::Dim2d,
      format: STORAGE_IMAGE_FORMAT,
      extent: [extent[0].max(1), extent[1].max(1), 1],
      usage: ImageUsage::STORAGE | ImageUsage::TRANSFER_SRC,
      ..Default::default()
    },
    AllocationCreateInfo {
      memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
      ..Default::default()
    },
  )
  .gpu("creating storage image")?;

  ImageView::new_default(image).gpu("creating storage image view")
}

/// Work groups needed to cover `extent` with square groups of `local_size`.
pub fn dispatch_groups(extent: [u32; 2], local_size: u32) -> [u32; 3] {
  [
    extent[0].div_ceil(local_size),
    extent[1].div_ceil(local_size),
    1,
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dispatch_rounds_partial_groups_up() {
    assert_eq!(dispatch_groups([1600, 900], 16), [100, 57, 1]);
    assert_eq!(dispatch_groups([16, 16], 16), [1, 1, 1]);
    assert_eq!(dispatch_groups([17, 1], 16), [2, 1, 1]);
  }

  #[test]
  fn anisotropy_follows_device_support() {
    let mut capabilities = DeviceCapabilities {
      supports_wide_lines:    false,
      max_line_width:         1.0,
      supports_wireframe:     true,
      max_sampler_anisotropy: None,
    };
    assert_eq!(sampler_create_info(&capabilities).anisotropy, None);

    capabilities.max_sampler_anisotropy = Some(16.0);
    let info = sampler_create_info(&capabilities);
    assert_eq!(info.anisotropy, Some(16.0));
    assert_eq!(info.address_mode, [SamplerAddressMode::Repeat; 3]);
  }

  #[test]
  fn missing_texture_is_an_error() {
    assert!(decode_rgba8(Path::new("does/not/exist.png")).is_err());
  }
}
