//! Stats and rendering overlay drawn with egui.

use crate::{core::init::DeviceCapabilities, render::pipeline::RasterOptions};

/// Frame timing shown in the stats window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
  /// Instantaneous frames per second.
  pub fps:          f32,
  /// Average over the last full second.
  pub avg_fps:      f32,
  /// Duration of the last frame in seconds.
  pub frame_time:   f32,
  frame_count:      u32,
  since_avg_update: f32,
}

impl FrameStats {
  pub fn record(&mut self, frame_time: f32) {
    self.frame_time = frame_time;
    if frame_time > 0.0 {
      self.fps = 1.0 / frame_time;
    }

    self.frame_count += 1;
    self.since_avg_update += frame_time;
    if self.since_avg_update >= 1.0 {
      self.avg_fps = self.frame_count as f32 / self.since_avg_update;
      self.frame_count = 0;
      self.since_avg_update = 0.0;
    }
  }
}

/// What the stats window shows besides timing.
pub struct StatsView<'a> {
  pub stats:        &'a FrameStats,
  pub device_name:  &'a str,
  pub scene_name:   &'a str,
  pub capabilities: &'a DeviceCapabilities,
}

/// Draws the stats window. Returns the new raster options when the user changed
/// them.
pub fn show_stats_window(
  ctx: &egui::Context,
  view: &StatsView,
  current: RasterOptions,
) -> Option<RasterOptions> {
  let mut raster = current;

  egui::Window::new("Stats & Controls")
    .default_pos([1300.0, 10.0])
    .show(ctx, |ui| {
      ui.heading("Performance");
      ui.label(format!("FPS: {:.1}", view.stats.fps));
      ui.label(format!("Avg FPS: {:.1}", view.stats.avg_fps));
      ui.label(format!("Frame Time: {:.2}ms", view.stats.frame_time * 1000.0));

      ui.separator();
      ui.label(format!("Device: {}", view.device_name));
      ui.label(format!("Scene: {}", view.scene_name));

      ui.separator();
      ui.heading("Rendering");
      if view.capabilities.supports_wireframe {
        ui.checkbox(&mut raster.wireframe, "Wireframe Mode");
      } else {
        ui.label("Wireframe not supported on this device");
      }

      if raster.wireframe {
        if view.capabilities.supports_wide_lines {
          ui.add(
            egui::Slider::new(&mut raster.line_width, 1.0..=view.capabilities.max_line_width)
              .text("Line Width"),
          );
        } else {
          ui.label("Wide lines not supported on this device");
        }
      }
    });

  (raster != current).then_some(raster)
}
