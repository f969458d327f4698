//! Vulkan instance, device and allocator setup.

use std::sync::Arc;

use vulkano::{
  Version,
  VulkanLibrary,
  command_buffer::allocator::StandardCommandBufferAllocator,
  descriptor_set::allocator::StandardDescriptorSetAllocator,
  device::{
    Device,
    DeviceCreateInfo,
    DeviceExtensions,
    DeviceFeatures,
    Queue,
    QueueCreateInfo,
    QueueFlags,
    physical::{PhysicalDevice, PhysicalDeviceType},
  },
  instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
  memory::allocator::StandardMemoryAllocator,
  swapchain::Surface,
};
use winit::event_loop::EventLoop;

use crate::error::{GpuResultExt, RenderError, Result};

/// Device limits the rest of the viewer adapts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
  pub supports_wide_lines:    bool,
  pub max_line_width:         f32,
  pub supports_wireframe:     bool,
  /// `None` when anisotropic filtering is unavailable.
  pub max_sampler_anisotropy: Option<f32>,
}

/// Everything created once at startup and shared by every scene.
#[derive(Clone)]
pub struct VulkanContext {
  pub instance:                 Arc<Instance>,
  pub device:                   Arc<Device>,
  pub queue:                    Arc<Queue>,
  pub memory_allocator:         Arc<StandardMemoryAllocator>,
  pub descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
  pub command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
  pub capabilities:             DeviceCapabilities,
}

impl VulkanContext {
  pub fn device_name(&self) -> &str {
    &self.device.physical_device().properties().device_name
  }
}

/// Lower is better.
fn device_type_rank(device_type: PhysicalDeviceType) -> u32 {
  match device_type {
    PhysicalDeviceType::DiscreteGpu => 0,
    PhysicalDeviceType::IntegratedGpu => 1,
    PhysicalDeviceType::VirtualGpu => 2,
    PhysicalDeviceType::Cpu => 3,
    PhysicalDeviceType::Other => 4,
    _ => 5,
  }
}

fn supports_dynamic_rendering(physical_device: &PhysicalDevice) -> bool {
  physical_device.api_version() >= Version::V1_3
    || physical_device.supported_extensions().khr_dynamic_rendering
}

pub fn initialize_vulkan(event_loop: &EventLoop<()>) -> Result<VulkanContext> {
  let library = VulkanLibrary::new().gpu("loading the Vulkan library")?;
  let required_extensions =
    Surface::required_extensions(event_loop).gpu("querying surface extensions")?;
  let instance = Instance::new(library, InstanceCreateInfo {
    flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
    enabled_extensions: required_extensions,
    ..Default::default()
  })
  .gpu("creating instance")?;

  let mut device_extensions = DeviceExtensions {
    khr_swapchain: true,
    ..DeviceExtensions::empty()
  };

  let (physical_device, queue_family_index) = instance
    .enumerate_physical_devices()
    .gpu("enumerating physical devices")?
    .filter(|p| p.supported_extensions().contains(&device_extensions))
    .filter(|p| supports_dynamic_rendering(p))
    .filter_map(|p| {
      p.queue_family_properties()
        .iter()
        .enumerate()
        .position(|(i, q)| {
          q.queue_flags
            .contains(QueueFlags::GRAPHICS | QueueFlags::COMPUTE)
            && p.presentation_support(i as u32, event_loop).unwrap_or(false)
        })
        .map(|i| (p, i as u32))
    })
    .min_by_key(|(p, _)| device_type_rank(p.properties().device_type))
    .ok_or(RenderError::NoSuitableDevice)?;

  log::info!(
    "Using device: {} (type: {:?}, api {})",
    physical_device.properties().device_name,
    physical_device.properties().device_type,
    physical_device.api_version(),
  );

  if physical_device.api_version() < Version::V1_3 {
    device_extensions.khr_dynamic_rendering = true;
  }

  let supported = physical_device.supported_features();
  let supports_wide_lines = supported.wide_lines;
  let supports_wireframe = supported.fill_mode_non_solid;
  let supports_anisotropy = supported.sampler_anisotropy;

  let (device, mut queues) = Device::new(physical_device.clone(), DeviceCreateInfo {
    enabled_extensions: device_extensions,
    enabled_features: DeviceFeatures {
      dynamic_rendering: true,
      fill_mode_non_solid: supports_wireframe,
      wide_lines: supports_wide_lines,
      sampler_anisotropy: supports_anisotropy,
      ..DeviceFeatures::empty()
    },
    queue_create_infos: vec![QueueCreateInfo {
      queue_family_index,
      ..Default::default()
    }],
    ..Default::default()
  })
  .gpu("creating logical device")?;

  let properties = physical_device.properties();
  let capabilities = DeviceCapabilities {
    supports_wide_lines,
    max_line_width: if supports_wide_lines {
      properties.line_width_range[1]
    } else {
      1.0
    },
    supports_wireframe,
    max_sampler_anisotropy: supports_anisotropy.then_some(properties.max_sampler_anisotropy),
  };

  log::debug!("Device capabilities: {capabilities:?}");

  let queue = queues.next().ok_or(RenderError::NoSuitableDevice)?;

  let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
  let descriptor_set_allocator = Arc::new(StandardDescriptorSetAllocator::new(
    device.clone(),
    Default::default(),
  ));
  let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
    device.clone(),
    Default::default(),
  ));

  Ok(VulkanContext {
    instance,
    device,
    queue,
    memory_allocator,
    descriptor_set_allocator,
    command_buffer_allocator,
    capabilities,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn discrete_gpus_rank_first() {
    let mut types = [
      PhysicalDeviceType::Cpu,
      PhysicalDeviceType::IntegratedGpu,
      PhysicalDeviceType::Other,
      PhysicalDeviceType::DiscreteGpu,
      PhysicalDeviceType::VirtualGpu,
    ];
    types.sort_by_key(|t| device_type_rank(*t));
    assert_eq!(types, [
      PhysicalDeviceType::DiscreteGpu,
      PhysicalDeviceType::IntegratedGpu,
      PhysicalDeviceType::VirtualGpu,
      PhysicalDeviceType::Cpu,
      PhysicalDeviceType::Other,
    ]);
  }
}
