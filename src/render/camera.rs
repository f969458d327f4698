//! Free-flying camera with smoothed movement.
//!
//! The world is Z-up. Orientation is stored as yaw (around Z, measured from +X)
//! and pitch (towards +Z) in radians, and the camera moves with a velocity that
//! eases towards the input direction instead of jumping to full speed.
//!
//! # Example
//! ```
//! use glam::DVec3;
//! use vulkano_scenes::render::camera::Camera;
//!
//! let mut camera = Camera::looking_at(DVec3::new(2.0, 2.0, 2.0), DVec3::ZERO);
//! camera.update_movement(DVec3::X, 0.016);
//! assert!(camera.position.x > 2.0);
//! ```

use glam::{DMat4, DVec3, Mat4};

use crate::input::{InputState, STICK_DEAD_ZONE, apply_dead_zone};

const PITCH_LIMIT: f64 = 89.0 * std::f64::consts::PI / 180.0;

/// Right-stick look speed in radians per second at full deflection.
const GAMEPAD_LOOK_SPEED: f64 = 2.5;

#[derive(Debug, Clone)]
pub struct Camera {
  pub position:              DVec3,
  /// Radians around +Z, 0 looks along +X.
  pub yaw:                   f64,
  /// Radians, clamped to ±89°.
  pub pitch:                 f64,
  pub front:                 DVec3,
  pub velocity:              DVec3,
  pub movement_acceleration: f64,
  pub movement_deceleration: f64,
  pub max_speed:             f64,
  /// Vertical field of view in degrees.
  pub fov:                   f32,
  pub near:                  f32,
  pub far:                   f32,
  pub mouse_sensitivity:     f64,
  home:                      (DVec3, DVec3),
}

impl Camera {
  /// Camera at `eye` facing `target`. [`Camera::reset`] returns here.
  pub fn looking_at(eye: DVec3, target: DVec3) -> Self {
    let mut camera = Self {
      position:              eye,
      yaw:                   0.0,
      pitch:                 0.0,
      front:                 DVec3::X,
      velocity:              DVec3::ZERO,
      movement_acceleration: 20.0,
      movement_deceleration: 10.0,
      max_speed:             2.0,
      fov:                   45.0,
      near:                  0.1,
      far:                   10.0,
      mouse_sensitivity:     0.005,
      home:                  (eye, target),
    };
    camera.look_at(eye, target);
    camera
  }

  /// Moves to `eye` and turns towards `target`. Does nothing to the orientation
  /// if both points coincide.
  pub fn look_at(&mut self, eye: DVec3, target: DVec3) {
    self.position = eye;
    let Some(direction) = (target - eye).try_normalize() else {
      return;
    };
    self.yaw = direction.y.atan2(direction.x);
    self.pitch = direction.z.clamp(-1.0, 1.0).asin();
    self.rotate(0.0, 0.0);
  }

  /// Back to the initial position, orientation and speed settings.
  pub fn reset(&mut self) {
    let (eye, target) = self.home;
    *self = Self::looking_at(eye, target);
  }

  /// Adds to yaw and pitch. Yaw wraps to `[-π, π]`, pitch stops short of the
  /// poles so the view never flips.
  pub fn rotate(&mut self, yaw_delta: f64, pitch_delta: f64) {
    use std::f64::consts::{PI, TAU};

    self.yaw += yaw_delta;
    self.yaw -= TAU * (self.yaw / TAU).floor();
    if self.yaw > PI {
      self.yaw -= TAU;
    }

    self.pitch = (self.pitch + pitch_delta).clamp(-PITCH_LIMIT, PITCH_LIMIT);

    let (yaw_sin, yaw_cos) = self.yaw.sin_cos();
    let (pitch_sin, pitch_cos) = self.pitch.sin_cos();
    self.front = DVec3::new(yaw_cos * pitch_cos, yaw_sin * pitch_cos, pitch_sin).normalize();
  }

  /// Eases the velocity towards `movement_input * max_speed` and integrates the
  /// position.
  pub fn update_movement(&mut self, movement_input: DVec3, delta_time: f64) {
    let moving = movement_input.length_squared() > 0.0;
    let target_velocity = if moving {
      movement_input * self.max_speed
    } else {
      DVec3::ZERO
    };
    let rate = if moving {
      self.movement_acceleration
    } else {
      self.movement_deceleration
    };

    self.velocity = self
      .velocity
      .lerp(target_velocity, (rate * delta_time).min(1.0));
    self.position += self.velocity * delta_time;
  }

  /// Applies one frame of keyboard, mouse and gamepad input.
  pub fn apply_input(&mut self, input: &InputState, delta_time: f64) {
    let (yaw_sin, yaw_cos) = self.yaw.sin_cos();
    let forward = DVec3::new(yaw_cos, yaw_sin, 0.0);
    let right = DVec3::new(yaw_sin, -yaw_cos, 0.0);

    let mut horizontal = DVec3::ZERO;
    if input.forward {
      horizontal += forward;
    }
    if input.back {
      horizontal -= forward;
    }
    if input.right {
      horizontal += right;
    }
    if input.left {
      horizontal -= right;
    }
    if horizontal == DVec3::ZERO {
      let stick = apply_dead_zone(input.left_stick, STICK_DEAD_ZONE);
      horizontal = forward * stick.y + right * stick.x;
    }

    let mut vertical = 0.0;
    if input.up || input.gamepad_up {
      vertical += 1.0;
    }
    if input.down || input.gamepad_down {
      vertical -= 1.0;
    }

    self.update_movement(
      horizontal.clamp_length_max(1.0) + DVec3::Z * vertical,
      delta_time,
    );

    self.rotate(
      -input.mouse_delta.x * self.mouse_sensitivity,
      -input.mouse_delta.y * self.mouse_sensitivity,
    );

    let look = apply_dead_zone(input.right_stick, STICK_DEAD_ZONE) * GAMEPAD_LOOK_SPEED * delta_time;
    if look.x != 0.0 || look.y != 0.0 {
      self.rotate(-look.x, look.y);
    }
  }

  pub fn view_matrix(&self) -> Mat4 {
    DMat4::look_at_rh(self.position, self.position + self.front, DVec3::Z).as_mat4()
  }

  /// Vulkan-style projection: depth in `[0, 1]` and clip-space Y pointing down.
  pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(self.fov.to_radians(), aspect_ratio, self.near, self.far);
    proj.y_axis.y *= -1.0;
    proj
  }

  /// Camera window: position readout, lens and movement tuning.
  pub fn show_parameter_gui(&mut self, ctx: &egui::Context) {
    egui::Window::new("Camera")
      .default_pos([10.0, 320.0])
      .show(ctx, |ui| {
        ui.label(format!(
          "Position: ({:.2}, {:.2}, {:.2})",
          self.position.x, self.position.y, self.position.z
        ));
        ui.label(format!("Yaw: {:.1}°", self.yaw.to_degrees()));
        ui.label(format!("Pitch: {:.1}°", self.pitch.to_degrees()));

        ui.separator();
        ui.add(egui::Slider::new(&mut self.fov, 30.0..=120.0).text("Field of View"));
        ui.add(egui::Slider::new(&mut self.max_speed, 0.1..=10.0).text("Speed"));
        ui.add(egui::Slider::new(&mut self.movement_acceleration, 1.0..=50.0).text("Acceleration"));
        ui.add(egui::Slider::new(&mut self.movement_deceleration, 1.0..=50.0).text("Deceleration"));
        ui.add(
          egui::Slider::new(&mut self.mouse_sensitivity, 0.001..=0.02)
            .logarithmic(true)
            .text("Sensitivity"),
        );

        ui.separator();
        ui.label("Click to capture the mouse, Escape to release");
        ui.label("WASD - Move, Space/Shift - Up/Down");
        if ui.button("Reset Camera").clicked() {
          self.reset();
        }
      });
  }
}

impl Default for Camera {
  fn default() -> Self {
    Self::looking_at(DVec3::splat(2.0), DVec3::ZERO)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use glam::{DVec2, Vec3, Vec4};

  use super::*;

  #[test]
  fn default_camera_looks_at_the_origin() {
    let camera = Camera::default();
    let expected = DVec3::splat(-1.0).normalize();
    assert_relative_eq!(camera.front.x, expected.x, epsilon = 1e-9);
    assert_relative_eq!(camera.front.y, expected.y, epsilon = 1e-9);
    assert_relative_eq!(camera.front.z, expected.z, epsilon = 1e-9);

    let origin = camera.view_matrix().transform_point3(Vec3::ZERO);
    assert_relative_eq!(origin.x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(origin.y, 0.0, epsilon = 1e-5);
    assert_relative_eq!(origin.z, -(12.0f32).sqrt(), epsilon = 1e-5);
  }

  #[test]
  fn projection_flips_y() {
    let camera = Camera::default();
    let proj = camera.projection_matrix(16.0 / 9.0);
    let above = proj * Vec4::new(0.0, 1.0, -1.0, 1.0);
    assert!(above.y / above.w < 0.0);

    let near = proj * Vec4::new(0.0, 0.0, -camera.near, 1.0);
    assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
    let far = proj * Vec4::new(0.0, 0.0, -camera.far, 1.0);
    assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
  }

  #[test]
  fn pitch_is_clamped_and_yaw_wraps() {
    let mut camera = Camera::looking_at(DVec3::ZERO, DVec3::X);
    camera.rotate(0.0, 10.0);
    assert_relative_eq!(camera.pitch, PITCH_LIMIT);
    camera.rotate(0.0, -20.0);
    assert_relative_eq!(camera.pitch, -PITCH_LIMIT);

    camera.rotate(3.0 * std::f64::consts::PI, 0.0);
    assert!(camera.yaw.abs() <= std::f64::consts::PI);
    assert_relative_eq!(camera.yaw.abs(), std::f64::consts::PI, epsilon = 1e-9);
  }

  #[test]
  fn velocity_eases_in_and_out() {
    let mut camera = Camera::looking_at(DVec3::ZERO, DVec3::X);
    camera.update_movement(DVec3::X, 0.01);
    assert!(camera.velocity.x > 0.0 && camera.velocity.x < camera.max_speed);

    camera.update_movement(DVec3::X, 1.0);
    assert_relative_eq!(camera.velocity.x, camera.max_speed);

    camera.update_movement(DVec3::ZERO, 1.0);
    assert_relative_eq!(camera.velocity.length(), 0.0);
  }

  #[test]
  fn forward_follows_yaw_on_the_ground_plane() {
    let mut camera = Camera::looking_at(DVec3::ZERO, DVec3::Y + DVec3::Z);
    let input = InputState {
      forward: true,
      ..Default::default()
    };
    camera.apply_input(&input, 1.0);

    assert_relative_eq!(camera.position.x, 0.0, epsilon = 1e-9);
    assert!(camera.position.y > 0.0);
    assert_relative_eq!(camera.position.z, 0.0, epsilon = 1e-9);
  }

  #[test]
  fn diagonal_movement_is_not_faster() {
    let mut camera = Camera::looking_at(DVec3::ZERO, DVec3::X);
    let input = InputState {
      forward: true,
      right: true,
      ..Default::default()
    };
    camera.apply_input(&input, 1.0);
    assert_relative_eq!(camera.velocity.length(), camera.max_speed, epsilon = 1e-9);
  }

  #[test]
  fn mouse_right_turns_right() {
    let mut camera = Camera::looking_at(DVec3::ZERO, DVec3::X);
    let input = InputState {
      mouse_delta: DVec2::new(100.0, 0.0),
      ..Default::default()
    };
    camera.apply_input(&input, 0.016);
    assert!(camera.yaw < 0.0);
    assert!(camera.front.y < 0.0);
  }

  #[test]
  fn reset_restores_the_initial_view() {
    let mut camera = Camera::default();
    camera.rotate(1.0, 0.3);
    camera.update_movement(DVec3::X, 1.0);
    camera.max_speed = 9.0;

    camera.reset();
    let fresh = Camera::default();
    assert_eq!(camera.position, fresh.position);
    assert_eq!(camera.front, fresh.front);
    assert_eq!(camera.max_speed, fresh.max_speed);
    assert_eq!(camera.velocity, DVec3::ZERO);
  }
}
