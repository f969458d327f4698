//! Frames in flight.
//!
//! The CPU may record frame `n + 1` while the GPU still executes frame `n`. Every
//! per-frame resource (uniform buffer, descriptor set, compute image) exists
//! [`MAX_FRAMES_IN_FLIGHT`] times and is indexed by [`FrameRing::current`]. Each
//! slot remembers the fence of the last submission that used it, and the slot is
//! waited on before its resources are written again.

use std::sync::Arc;

use vulkano::sync::{
  GpuFuture,
  future::FenceSignalFuture,
};

use crate::error::{GpuResultExt, Result};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Fixed ring of per-frame values with a cursor on the frame being recorded.
#[derive(Debug)]
pub struct FrameRing<T> {
  slots:   Vec<T>,
  current: usize,
}

impl<T> FrameRing<T> {
  pub fn new(mut init: impl FnMut(usize) -> T) -> Self {
    Self {
      slots:   (0..MAX_FRAMES_IN_FLIGHT).map(&mut init).collect(),
      current: 0,
    }
  }

  /// Like [`FrameRing::new`] for fallible initialisation.
  pub fn try_new<E>(init: impl FnMut(usize) -> std::result::Result<T, E>) -> std::result::Result<Self, E> {
    Ok(Self {
      slots:   (0..MAX_FRAMES_IN_FLIGHT).map(init).collect::<std::result::Result<_, _>>()?,
      current: 0,
    })
  }

  pub fn current(&self) -> usize {
    self.current
  }

  /// Index of the frame recorded just before the current one.
  pub fn previous(&self) -> usize {
    (self.current + MAX_FRAMES_IN_FLIGHT - 1) % MAX_FRAMES_IN_FLIGHT
  }

  pub fn advance(&mut self) {
    self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
  }

  pub fn get(&self, index: usize) -> &T {
    &self.slots[index]
  }

  pub fn get_mut(&mut self, index: usize) -> &mut T {
    &mut self.slots[index]
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
    self.slots.iter_mut()
  }
}

pub type FrameFence = Arc<FenceSignalFuture<Box<dyn GpuFuture>>>;

/// Fence bookkeeping for the frames in flight.
pub struct FrameSync {
  fences: FrameRing<Option<FrameFence>>,
}

impl Default for FrameSync {
  fn default() -> Self {
    Self::new()
  }
}

impl FrameSync {
  pub fn new() -> Self {
    Self {
      fences: FrameRing::new(|_| None),
    }
  }

  pub fn current(&self) -> usize {
    self.fences.current()
  }

  /// Blocks until the GPU is done with the current frame's resources.
  pub fn wait_current(&mut self) -> Result<()> {
    let current = self.fences.current();
    if let Some(fence) = self.fences.get_mut(current).take() {
      fence.wait(None).gpu("waiting for frame fence")?;
    }
    Ok(())
  }

  /// Blocks until every frame in flight has finished.
  pub fn wait_all(&mut self) -> Result<()> {
    for slot in self.fences.iter_mut() {
      if let Some(fence) = slot.take() {
        fence.wait(None).gpu("waiting for frame fence")?;
      }
    }
    Ok(())
  }

  /// Future the next submission has to start after: the last submitted frame,
  /// or `None` when nothing is in flight.
  pub fn last_submission(&self) -> Option<FrameFence> {
    self.fences.get(self.fences.previous()).clone()
  }

  /// Stores the fence of the submission recorded for the current frame and moves
  /// on to the next frame.
  pub fn submit(&mut self, fence: Option<FrameFence>) {
    let current = self.fences.current();
    *self.fences.get_mut(current) = fence;
    self.fences.advance();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ring_wraps_after_max_frames() {
    let mut ring = FrameRing::new(|i| i * 10);
    assert_eq!(ring.current(), 0);
    assert_eq!(*ring.get(ring.current()), 0);

    ring.advance();
    assert_eq!(ring.current(), 1);
    assert_eq!(*ring.get(ring.current()), 10);

    for _ in 0..MAX_FRAMES_IN_FLIGHT - 1 {
      ring.advance();
    }
    assert_eq!(ring.current(), 0);
  }

  #[test]
  fn try_new_stops_at_the_first_error() {
    let ring: std::result::Result<FrameRing<usize>, usize> =
      FrameRing::try_new(|i| if i == 1 { Err(i) } else { Ok(i) });
    assert_eq!(ring.unwrap_err(), 1);
  }

  #[test]
  fn previous_is_the_frame_before_current() {
    let mut ring = FrameRing::new(|_| ());
    assert_eq!(ring.previous(), MAX_FRAMES_IN_FLIGHT - 1);
    ring.advance();
    assert_eq!(ring.previous(), 0);
  }

  #[test]
  fn slots_are_independent() {
    let mut ring = FrameRing::new(|_| Vec::<u32>::new());
    ring.get_mut(0).push(7);
    ring.advance();
    ring.get_mut(ring.current()).push(9);
    assert_eq!(ring.get(0), &[7]);
    assert_eq!(ring.get(1), &[9]);
  }

  #[test]
  fn submit_without_fence_still_advances() {
    let mut sync = FrameSync::new();
    assert!(sync.last_submission().is_none());
    sync.submit(None);
    assert_eq!(sync.current(), 1);
    assert!(sync.last_submission().is_none());
    sync.wait_current().unwrap();
    sync.wait_all().unwrap();
  }
}
