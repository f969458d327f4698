//! Application shell: window, overlay, scenes and the frame loop.
//!
//! Each redraw follows this sequence:
//! 1. Sample input and apply deferred work (swapchain recreation, pipeline
//!    rebuild, scene switch)
//! 2. Wait for the current frame slot and acquire a swapchain image
//! 3. Build the overlay, update the active scene
//! 4. Record the scene, submit, draw the overlay and present

use std::{sync::Arc, time::Instant};

use egui_winit_vulkano::{Gui, GuiConfig};
use gilrs::Gilrs;
use vulkano::{
  Validated,
  VulkanError,
  command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage},
  swapchain::{Surface, SwapchainPresentInfo},
  sync::{self, GpuFuture},
};
use winit::{
  application::ApplicationHandler,
  dpi::LogicalSize,
  event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, WindowEvent},
  event_loop::{ActiveEventLoop, EventLoop},
  keyboard::{KeyCode, PhysicalKey},
  window::{CursorGrabMode, Window, WindowId},
};

use crate::{
  config::AppConfig,
  core::{
    frames::FrameSync,
    init::{VulkanContext, initialize_vulkan},
    swapchain::{Acquired, SwapchainState},
  },
  error::{GpuResultExt, RenderError, Result},
  gui::{FrameStats, StatsView, show_stats_window},
  input::InputState,
  render::pipeline::{ApplicationPipelines, RasterOptions},
  scene::{SceneContext, SceneManager},
};

/// Longest frame the simulation steps over, so a stall doesn't fling the camera.
const MAX_DELTA_TIME: f64 = 0.1;

/// Everything that only exists while there is a window.
struct RenderContext {
  window:             Arc<Window>,
  swapchain:          SwapchainState,
  pipelines:          ApplicationPipelines,
  gui:                Gui,
  recreate_swapchain: bool,
  pending_raster:     Option<RasterOptions>,
}

pub struct App {
  config:     AppConfig,
  gpu:        VulkanContext,
  gilrs:      Option<Gilrs>,
  rcx:        Option<RenderContext>,
  scenes:     SceneManager,
  frames:     FrameSync,
  input:      InputState,
  stats:      FrameStats,
  last_frame: Instant,
  error:      Option<RenderError>,
}

impl App {
  pub fn new(event_loop: &EventLoop<()>, config: AppConfig) -> Result<Self> {
    let gpu = initialize_vulkan(event_loop)?;

    let gilrs = match Gilrs::new() {
      Ok(gilrs) => Some(gilrs),
      Err(e) => {
        log::warn!("Gamepad support unavailable: {e}");
        None
      }
    };

    Ok(Self {
      config,
      gpu,
      gilrs,
      rcx: None,
      scenes: SceneManager::default(),
      frames: FrameSync::new(),
      input: InputState::default(),
      stats: FrameStats::default(),
      last_frame: Instant::now(),
      error: None,
    })
  }

  /// The error that stopped the event loop, if any.
  pub fn take_error(&mut self) -> Option<RenderError> {
    self.error.take()
  }

  fn fail(&mut self, event_loop: &ActiveEventLoop, error: RenderError) {
    log::error!("{error}");
    self.shutdown();
    self.error = Some(error);
    event_loop.exit();
  }

  /// Waits for the GPU and releases the active scene.
  fn shutdown(&mut self) {
    if let Err(e) = self.frames.wait_all() {
      log::warn!("Failed to wait for frames in flight: {e}");
    }
    self.scenes.destroy_active();
  }

  fn create_render_context(&mut self, event_loop: &ActiveEventLoop) -> Result<RenderContext> {
    let window_config = &self.config.window;
    let window = Arc::new(
      event_loop
        .create_window(
          Window::default_attributes()
            .with_decorations(true)
            .with_title(window_config.title.clone())
            .with_inner_size(LogicalSize::new(window_config.width, window_config.height)),
        )
        .map_err(|e| RenderError::Window(e.to_string()))?,
    );

    let surface =
      Surface::from_window(self.gpu.instance.clone(), window.clone()).gpu("creating surface")?;

    let swapchain = SwapchainState::new(
      self.gpu.device.clone(),
      surface.clone(),
      &window,
      self.gpu.memory_allocator.clone(),
      self.config.renderer.present_mode,
    )?;

    let raster = RasterOptions {
      wireframe:  self.config.renderer.wireframe,
      line_width: self.config.renderer.line_width,
    }
    .clamped_to(&self.gpu.capabilities);
    let pipelines =
      ApplicationPipelines::new(self.gpu.device.clone(), swapchain.image_format(), raster)?;

    let gui = Gui::new(
      event_loop,
      surface,
      self.gpu.queue.clone(),
      swapchain.image_format(),
      GuiConfig {
        is_overlay: true,
        ..Default::default()
      },
    );

    self.scenes.init_active(&SceneContext {
      gpu:       &self.gpu,
      pipelines: &pipelines,
      config:    &self.config,
    })?;

    Ok(RenderContext {
      window,
      swapchain,
      pipelines,
      gui,
      recreate_swapchain: false,
      pending_raster: None,
    })
  }

  fn capture_cursor(&mut self) {
    let Some(rcx) = &self.rcx else {
      return;
    };
    let grabbed = rcx
      .window
      .set_cursor_grab(CursorGrabMode::Locked)
      .or_else(|_| rcx.window.set_cursor_grab(CursorGrabMode::Confined));
    if let Err(e) = grabbed {
      log::warn!("Failed to grab cursor: {e}");
    }
    rcx.window.set_cursor_visible(false);
    self.input.capture_cursor();
  }

  fn release_cursor(&mut self) {
    if let Some(rcx) = &self.rcx {
      if let Err(e) = rcx.window.set_cursor_grab(CursorGrabMode::None) {
        log::warn!("Failed to release cursor: {e}");
      }
      rcx.window.set_cursor_visible(true);
    }
    self.input.release_cursor();
  }

  fn redraw(&mut self) -> Result<()> {
    let now = Instant::now();
    let frame_time = now.duration_since(self.last_frame).as_secs_f64();
    self.last_frame = now;
    let delta_time = frame_time.min(MAX_DELTA_TIME);

    // Gamepad state is sampled once per frame, keyboard and mouse arrive as events
    if let Some(gilrs) = &mut self.gilrs {
      self.input.poll_gamepad(gilrs);
    }

    let Some(rcx) = self.rcx.as_mut() else {
      return Ok(());
    };

    // A minimised window has no extent to render into
    let window_size = rcx.window.inner_size();
    if window_size.width == 0 || window_size.height == 0 {
      return Ok(());
    }

    // Resize or out-of-date swapchain: the old images must be idle first
    if rcx.recreate_swapchain {
      self.frames.wait_all()?;
      rcx.swapchain.recreate(window_size.into())?;
      rcx.recreate_swapchain = false;
    }

    // Deferred work from last frame's GUI. Both wait for every frame in flight.
    if let Some(raster) = rcx.pending_raster.take() {
      rcx.pipelines = ApplicationPipelines::new(
        self.gpu.device.clone(),
        rcx.swapchain.image_format(),
        raster.clamped_to(&self.gpu.capabilities),
      )?;
      self.scenes.rebind_pipelines(
        &SceneContext {
          gpu:       &self.gpu,
          pipelines: &rcx.pipelines,
          config:    &self.config,
        },
        &mut self.frames,
      )?;
    } else if self.scenes.should_change_scene() {
      self.scenes.change_scene(
        &SceneContext {
          gpu:       &self.gpu,
          pipelines: &rcx.pipelines,
          config:    &self.config,
        },
        &mut self.frames,
      )?;
    }

    // The current slot's uniform buffers and descriptor sets are free once its
    // last submission has finished
    self.frames.wait_current()?;

    let (image_index, acquire_future) = match rcx.swapchain.acquire()? {
      Acquired::Image {
        index,
        suboptimal,
        future,
      } => {
        rcx.recreate_swapchain |= suboptimal;
        (index, future)
      }
      Acquired::OutOfDate => {
        rcx.recreate_swapchain = true;
        return Ok(());
      }
    };

    self.stats.record(frame_time as f32);

    // Build the overlay. Raster changes are applied at the start of the next frame.

    let scene_name = self.scenes.active_name().to_owned();
    let current_raster = rcx.pipelines.raster;
    let mut raster_change = None;
    {
      let stats = &self.stats;
      let scenes = &mut self.scenes;
      let gpu = &self.gpu;
      rcx.gui.immediate_ui(|gui| {
        let ctx = gui.context();
        let view = StatsView {
          stats,
          device_name: gpu.device_name(),
          scene_name: &scene_name,
          capabilities: &gpu.capabilities,
        };
        raster_change = show_stats_window(&ctx, &view, current_raster);
        scenes.show_scene_select_gui(&ctx);
        scenes.show_scene_gui(&ctx);
      });
    }
    if raster_change.is_some() {
      rcx.pending_raster = raster_change;
    }

    let frame = self.frames.current();
    let target = rcx.swapchain.target(image_index);

    let mut builder = AutoCommandBufferBuilder::primary(
      self.gpu.command_buffer_allocator.clone(),
      self.gpu.queue.queue_family_index(),
      CommandBufferUsage::OneTimeSubmit,
    )
    .gpu("allocating command buffer")?;

    // Per-frame CPU updates, then the scene records into the acquired image
    if let Some(scene) = self.scenes.current_scene() {
      scene.update(frame, target.extent, delta_time, &self.input)?;
      scene.draw(&mut builder, &target, frame)?;
    }
    self.input.end_frame();

    let command_buffer = builder.build().gpu("building command buffer")?;

    // Start after the previous frame's submission and the image acquisition
    let previous: Box<dyn GpuFuture> = match self.frames.last_submission() {
      Some(fence) => fence.join(acquire_future).boxed(),
      None => sync::now(self.gpu.device.clone())
        .join(acquire_future)
        .boxed(),
    };

    let after_scene = previous
      .then_execute(self.gpu.queue.clone(), command_buffer)
      .gpu("submitting command buffer")?;
    // The overlay is drawn on top of the scene into the same swapchain image
    let after_gui = rcx.gui.draw_on_image(after_scene, target.view.clone());

    let submitted = after_gui
      .then_swapchain_present(
        self.gpu.queue.clone(),
        SwapchainPresentInfo::swapchain_image_index(rcx.swapchain.swapchain.clone(), image_index),
      )
      .boxed()
      .then_signal_fence_and_flush();

    // The fence goes into the current slot, which also advances the frame index
    match submitted.map_err(Validated::unwrap) {
      Ok(fence) => self.frames.submit(Some(Arc::new(fence))),
      Err(VulkanError::OutOfDate) => {
        rcx.recreate_swapchain = true;
        self.frames.submit(None);
      }
      Err(e) => {
        log::warn!("Failed to flush frame: {e}");
        self.frames.submit(None);
      }
    }

    Ok(())
  }
}

impl ApplicationHandler for App {
  fn resumed(&mut self, event_loop: &ActiveEventLoop) {
    if self.rcx.is_some() {
      return;
    }

    match self.create_render_context(event_loop) {
      Ok(rcx) => {
        self.rcx = Some(rcx);
        self.last_frame = Instant::now();
      }
      Err(e) => self.fail(event_loop, e),
    }
  }

  fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
    let Some(rcx) = self.rcx.as_mut() else {
      return;
    };
    let consumed_by_gui = rcx.gui.update(&event);

    match event {
      WindowEvent::CloseRequested => {
        self.shutdown();
        event_loop.exit();
      }
      WindowEvent::Resized(_) => {
        rcx.recreate_swapchain = true;
      }
      WindowEvent::MouseInput {
        state: ElementState::Pressed,
        button: MouseButton::Left,
        ..
      } if !consumed_by_gui => self.capture_cursor(),
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            physical_key: PhysicalKey::Code(key),
            state,
            ..
          },
        ..
      } => {
        if key == KeyCode::Escape {
          if state.is_pressed() {
            self.release_cursor();
          }
        } else {
          self.input.set_key(key, state.is_pressed());
        }
      }
      WindowEvent::RedrawRequested => {
        if let Err(e) = self.redraw() {
          self.fail(event_loop, e);
        }
      }
      _ => {}
    }
  }

  fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
    if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
      self.input.add_mouse_motion(dx, dy);
    }
  }

  fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
    if let Some(rcx) = &self.rcx {
      rcx.window.request_redraw();
    }
  }

  fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
    self.shutdown();
  }
}
