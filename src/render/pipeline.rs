//! Graphics and compute pipeline construction.
//!
//! Pipelines target dynamic rendering: instead of a render pass and subpass, the
//! graphics pipeline records the colour and depth formats it renders into
//! (`PipelineRenderingCreateInfo`). Viewport and scissor are dynamic, so nothing
//! here depends on the window size and a resize never rebuilds a pipeline. Only a
//! change of [`RasterOptions`] (wireframe, line width) does.
//!
//! # Pipeline Configuration
//! * Opaque: depth test + write, back-face culling, blending off
//! * Transparent: depth test + write, back-face culling, alpha blending
//! * Perlin: compute pipeline writing a storage image

use std::sync::Arc;

use vulkano::{
  descriptor_set::layout::DescriptorSetLayout,
  device::Device,
  format::Format,
  pipeline::{
    ComputePipeline,
    DynamicState,
    GraphicsPipeline,
    Pipeline,
    PipelineLayout,
    PipelineShaderStageCreateInfo,
    compute::ComputePipelineCreateInfo,
    graphics::{
      GraphicsPipelineCreateInfo,
      color_blend::{
        AttachmentBlend,
        BlendFactor,
        BlendOp,
        ColorBlendAttachmentState,
        ColorBlendState,
        ColorComponents,
      },
      depth_stencil::{CompareOp, DepthState, DepthStencilState},
      input_assembly::{InputAssemblyState, PrimitiveTopology},
      multisample::MultisampleState,
      rasterization::{CullMode, FrontFace, PolygonMode, RasterizationState},
      subpass::PipelineRenderingCreateInfo,
      vertex_input::{Vertex, VertexDefinition},
      viewport::ViewportState,
    },
    layout::PipelineDescriptorSetLayoutCreateInfo,
  },
  shader::EntryPoint,
};

use crate::{
  core::{init::DeviceCapabilities, swapchain::DEPTH_FORMAT},
  error::{GpuResultExt, RenderError, Result},
  render::vertex::MeshVertex,
  shaders::{mesh_fs, mesh_vs, perlin_cs},
};

/// Graphics pipelines a model can be drawn with. The ordering is the draw order:
/// opaque geometry first, blended geometry on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineKind {
  Opaque,
  Transparent,
}

/// Raster settings that require a pipeline rebuild when they change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
  pub wireframe:  bool,
  pub line_width: f32,
}

impl Default for RasterOptions {
  fn default() -> Self {
    Self {
      wireframe:  false,
      line_width: 1.0,
    }
  }
}

impl RasterOptions {
  /// Drops whatever the device cannot do: wireframe needs `fill_mode_non_solid`,
  /// lines wider than 1.0 need `wide_lines`.
  pub fn clamped_to(self, capabilities: &DeviceCapabilities) -> Self {
    Self {
      wireframe:  self.wireframe && capabilities.supports_wireframe,
      line_width: if capabilities.supports_wide_lines {
        self.line_width.clamp(1.0, capabilities.max_line_width)
      } else {
        1.0
      },
    }
  }
}

/// Fixed-function state of a graphics pipeline, filled in step by step.
#[derive(Clone)]
pub struct PipelineBuilder {
  pub stages:                  Vec<EntryPoint>,
  pub input_assembly:          InputAssemblyState,
  pub rasterization:           RasterizationState,
  pub multisample:             MultisampleState,
  pub color_blend_attachment:  ColorBlendAttachmentState,
  pub depth_stencil:           DepthStencilState,
  pub color_attachment_format: Option<Format>,
  pub depth_attachment_format: Option<Format>,
}

impl Default for PipelineBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineBuilder {
  pub fn new() -> Self {
    Self {
      stages:                  Vec::new(),
      input_assembly:          InputAssemblyState::default(),
      rasterization:           RasterizationState::default(),
      multisample:             MultisampleState::default(),
      color_blend_attachment:  ColorBlendAttachmentState::default(),
      depth_stencil:           DepthStencilState::default(),
      color_attachment_format: None,
      depth_attachment_format: None,
    }
  }

  /// Resets every setting to its initial state.
  pub fn clear(&mut self) {
    *self = Self::new();
  }

  pub fn set_shaders(&mut self, vertex: EntryPoint, fragment: EntryPoint) -> &mut Self {
    self.stages = vec![vertex, fragment];
    self
  }

  pub fn set_input_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
    self.input_assembly = InputAssemblyState {
      topology,
      primitive_restart_enable: false,
      ..Default::default()
    };
    self
  }

  pub fn set_polygon_mode(&mut self, mode: PolygonMode, line_width: f32) -> &mut Self {
    self.rasterization.polygon_mode = mode;
    self.rasterization.line_width = line_width;
    self
  }

  pub fn set_cull_mode(&mut self, cull_mode: CullMode, front_face: FrontFace) -> &mut Self {
    self.rasterization.cull_mode = cull_mode;
    self.rasterization.front_face = front_face;
    self
  }

  pub fn set_multisampling_none(&mut self) -> &mut Self {
    self.multisample = MultisampleState::default();
    self
  }

  pub fn disable_blending(&mut self) -> &mut Self {
    self.color_blend_attachment = ColorBlendAttachmentState {
      blend: None,
      color_write_mask: ColorComponents::all(),
      ..Default::default()
    };
    self
  }

  /// Classic `src_alpha / one_minus_src_alpha` blending.
  pub fn enable_blending(&mut self) -> &mut Self {
    self.color_blend_attachment = ColorBlendAttachmentState {
      blend: Some(AttachmentBlend {
        src_color_blend_factor: BlendFactor::SrcAlpha,
        dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
        color_blend_op:         BlendOp::Add,
        src_alpha_blend_factor: BlendFactor::One,
        dst_alpha_blend_factor: BlendFactor::OneMinusSrcAlpha,
        alpha_blend_op:         BlendOp::Add,
      }),
      color_write_mask: ColorComponents::all(),
      ..Default::default()
    };
    self
  }

  pub fn set_color_attachment_format(&mut self, format: Format) -> &mut Self {
    self.color_attachment_format = Some(format);
    self
  }

  pub fn set_depth_format(&mut self, format: Format) -> &mut Self {
    self.depth_attachment_format = Some(format);
    self
  }

  pub fn enable_depth_test(&mut self) -> &mut Self {
    self.depth_stencil = DepthStencilState {
      depth: Some(DepthState {
        write_enable: true,
        compare_op:   CompareOp::Less,
      }),
      ..Default::default()
    };
    self
  }

  pub fn disable_depth_test(&mut self) -> &mut Self {
    self.depth_stencil = DepthStencilState::default();
    self
  }

  /// Creates the pipeline together with a layout reflected from the shaders.
  pub fn build(&self, device: Arc<Device>) -> Result<Arc<GraphicsPipeline>> {
    let vertex_shader = self.stages.first().ok_or(RenderError::MissingEntryPoint)?;

    let vertex_input_state = MeshVertex::per_vertex()
      .definition(vertex_shader)
      .gpu("matching vertex layout to shader")?;

    let stages: Vec<_> = self
      .stages
      .iter()
      .cloned()
      .map(PipelineShaderStageCreateInfo::new)
      .collect();

    let layout = PipelineLayout::new(
      device.clone(),
      PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages)
        .into_pipeline_layout_create_info(device.clone())
        .gpu("deriving pipeline layout")?,
    )
    .gpu("creating pipeline layout")?;

    let rendering = PipelineRenderingCreateInfo {
      color_attachment_formats: vec![self.color_attachment_format],
      depth_attachment_format: self.depth_attachment_format,
      ..Default::default()
    };

    GraphicsPipeline::new(device, None, GraphicsPipelineCreateInfo {
      stages: stages.into_iter().collect(),
      vertex_input_state: Some(vertex_input_state),
      input_assembly_state: Some(self.input_assembly.clone()),
      viewport_state: Some(ViewportState::default()),
      rasterization_state: Some(self.rasterization.clone()),
      multisample_state: Some(self.multisample.clone()),
      depth_stencil_state: Some(self.depth_stencil.clone()),
      color_blend_state: Some(ColorBlendState::with_attachment_states(
        1,
        self.color_blend_attachment.clone(),
      )),
      dynamic_state: [DynamicState::Viewport, DynamicState::Scissor]
        .into_iter()
        .collect(),
      subpass: Some(rendering.into()),
      ..GraphicsPipelineCreateInfo::layout(layout)
    })
    .gpu("creating graphics pipeline")
  }
}

fn load_entry_point(
  module: std::result::Result<
    Arc<vulkano::shader::ShaderModule>,
    vulkano::Validated<vulkano::VulkanError>,
  >,
) -> Result<EntryPoint> {
  module
    .gpu("loading shader module")?
    .entry_point("main")
    .ok_or(RenderError::MissingEntryPoint)
}

/// Builds a compute pipeline with a layout reflected from its single stage.
pub fn build_compute_pipeline(
  device: Arc<Device>,
  shader: EntryPoint,
) -> Result<Arc<ComputePipeline>> {
  let stage = PipelineShaderStageCreateInfo::new(shader);
  let layout = PipelineLayout::new(
    device.clone(),
    PipelineDescriptorSetLayoutCreateInfo::from_stages([&stage])
      .into_pipeline_layout_create_info(device.clone())
      .gpu("deriving compute pipeline layout")?,
  )
  .gpu("creating compute pipeline layout")?;

  ComputePipeline::new(
    device,
    None,
    ComputePipelineCreateInfo::stage_layout(stage, layout),
  )
  .gpu("creating compute pipeline")
}

/// Every pipeline the scenes draw with, plus the options they were built from.
pub struct ApplicationPipelines {
  pub opaque:      Arc<GraphicsPipeline>,
  pub transparent: Arc<GraphicsPipeline>,
  pub perlin:      Arc<ComputePipeline>,
  pub raster:      RasterOptions,
}

impl ApplicationPipelines {
  pub fn new(
    device: Arc<Device>,
    color_format: Format,
    raster: RasterOptions,
  ) -> Result<Self> {
    let vertex_shader = load_entry_point(mesh_vs::load(device.clone()))?;
    let fragment_shader = load_entry_point(mesh_fs::load(device.clone()))?;
    let compute_shader = load_entry_point(perlin_cs::load(device.clone()))?;

    let polygon_mode = if raster.wireframe {
      PolygonMode::Line
    } else {
      PolygonMode::Fill
    };

    let mut builder = PipelineBuilder::new();
    builder
      .set_shaders(vertex_shader, fragment_shader)
      .set_input_topology(PrimitiveTopology::TriangleList)
      .set_polygon_mode(polygon_mode, raster.line_width)
      .set_cull_mode(CullMode::Back, FrontFace::CounterClockwise)
      .set_multisampling_none()
      .disable_blending()
      .enable_depth_test()
      .set_color_attachment_format(color_format)
      .set_depth_format(DEPTH_FORMAT);
    let opaque = builder.build(device.clone())?;

    builder.enable_blending();
    let transparent = builder.build(device.clone())?;

    let perlin = build_compute_pipeline(device, compute_shader)?;

    log::info!(
      "Pipelines built (wireframe: {}, line width: {:.1})",
      raster.wireframe,
      raster.line_width
    );

    Ok(Self {
      opaque,
      transparent,
      perlin,
      raster,
    })
  }

  pub fn graphics(&self, kind: PipelineKind) -> &Arc<GraphicsPipeline> {
    match kind {
      PipelineKind::Opaque => &self.opaque,
      PipelineKind::Transparent => &self.transparent,
    }
  }

  /// Set 0 layout of a graphics pipeline, the one models allocate against.
  pub fn set_layout(&self, kind: PipelineKind) -> &Arc<DescriptorSetLayout> {
    &self.graphics(kind).layout().set_layouts()[0]
  }

  pub fn perlin_set_layout(&self) -> &Arc<DescriptorSetLayout> {
    &self.perlin.layout().set_layouts()[0]
  }
}
