//! Keyboard, mouse and gamepad state sampled once per frame.

use gilrs::{Axis, Button, Gilrs};
use glam::DVec2;
use winit::keyboard::KeyCode;

/// Stick deflection below which input is ignored.
pub const STICK_DEAD_ZONE: f64 = 0.15;

/// Rescales a stick so the dead zone maps to zero and full deflection to one,
/// then applies a squared response curve for finer control near the centre.
pub fn apply_dead_zone(stick: DVec2, dead_zone: f64) -> DVec2 {
  let length = stick.length();
  if length <= dead_zone {
    return DVec2::ZERO;
  }

  let normalized = ((length - dead_zone) / (1.0 - dead_zone)).min(1.0);
  stick / length * normalized * normalized
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
  pub forward:         bool,
  pub back:            bool,
  pub left:            bool,
  pub right:           bool,
  pub up:              bool,
  pub down:            bool,
  /// Keyboard and mouse only steer the camera while the cursor is captured.
  pub cursor_captured: bool,
  /// Mouse motion accumulated since the last frame, in device units.
  pub mouse_delta:     DVec2,
  /// Raw stick values, +y is up/forward.
  pub left_stick:      DVec2,
  pub right_stick:     DVec2,
  pub gamepad_up:      bool,
  pub gamepad_down:    bool,
}

impl InputState {
  /// Records a movement key. Returns whether the key is a movement key.
  pub fn set_key(&mut self, key: KeyCode, pressed: bool) -> bool {
    let slot = match key {
      KeyCode::KeyW => &mut self.forward,
      KeyCode::KeyS => &mut self.back,
      KeyCode::KeyA => &mut self.left,
      KeyCode::KeyD => &mut self.right,
      KeyCode::Space => &mut self.up,
      KeyCode::ShiftLeft => &mut self.down,
      _ => return false,
    };
    *slot = pressed && self.cursor_captured;
    true
  }

  pub fn capture_cursor(&mut self) {
    self.cursor_captured = true;
  }

  /// Releases the cursor and drops any held keys so the camera stops.
  pub fn release_cursor(&mut self) {
    self.cursor_captured = false;
    self.forward = false;
    self.back = false;
    self.left = false;
    self.right = false;
    self.up = false;
    self.down = false;
    self.mouse_delta = DVec2::ZERO;
  }

  pub fn add_mouse_motion(&mut self, dx: f64, dy: f64) {
    if self.cursor_captured {
      self.mouse_delta += DVec2::new(dx, dy);
    }
  }

  /// Clears per-frame accumulators once the frame has consumed them.
  pub fn end_frame(&mut self) {
    self.mouse_delta = DVec2::ZERO;
  }

  /// Drains pending gamepad events and samples the sticks and the A/B buttons of
  /// the gamepad that sent the last one.
  pub fn poll_gamepad(&mut self, gilrs: &mut Gilrs) {
    while let Some(event) = gilrs.next_event() {
      let gamepad = gilrs.gamepad(event.id);
      let read = |axis: Axis| {
        gamepad
          .axis_data(axis)
          .map_or(0.0, |data| f64::from(data.value()))
      };

      self.left_stick = DVec2::new(read(Axis::LeftStickX), read(Axis::LeftStickY));
      self.right_stick = DVec2::new(read(Axis::RightStickX), read(Axis::RightStickY));
      self.gamepad_up = gamepad.is_pressed(Button::South);
      self.gamepad_down = gamepad.is_pressed(Button::East);
    }
    gilrs.inc();
  }
}
