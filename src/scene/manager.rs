//! Owns the scenes and switches between them between frames.

use super::{ComputeScene, DemoScene, Scene, SceneContext};
use crate::{core::frames::FrameSync, error::Result};

pub struct SceneManager {
  scenes:            Vec<Box<dyn Scene>>,
  active:            usize,
  pending:           Option<usize>,
  initialized:       bool,
  show_demo_windows: bool,
  demo_windows:      egui_demo_lib::DemoWindows,
}

impl Default for SceneManager {
  fn default() -> Self {
    let scenes: Vec<Box<dyn Scene>> = vec![Box::new(DemoScene::new()), Box::new(ComputeScene::new())];
    Self::new(scenes)
  }
}

impl SceneManager {
  /// Starts on the first scene. Nothing is initialised until
  /// [`SceneManager::init_active`].
  pub fn new(scenes: Vec<Box<dyn Scene>>) -> Self {
    Self {
      scenes,
      active: 0,
      pending: None,
      initialized: false,
      show_demo_windows: false,
      demo_windows: egui_demo_lib::DemoWindows::default(),
    }
  }

  pub fn active_index(&self) -> usize {
    self.active
  }

  pub fn active_name(&self) -> &str {
    self.scenes.get(self.active).map_or("", |scene| scene.name())
  }

  pub fn scene_names(&self) -> Vec<&str> {
    self.scenes.iter().map(|scene| scene.name()).collect()
  }

  pub fn current_scene(&mut self) -> Option<&mut dyn Scene> {
    Some(self.scenes.get_mut(self.active)?.as_mut())
  }

  /// Queues a switch to `index`, applied by [`SceneManager::change_scene`].
  /// Out-of-range indices and the active scene are ignored.
  pub fn request_change(&mut self, index: usize) {
    if index < self.scenes.len() && index != self.active {
      self.pending = Some(index);
    }
  }

  pub fn should_change_scene(&self) -> bool {
    self.pending.is_some()
  }

  /// Initialises the active scene. Nothing may be in flight that uses it.
  pub fn init_active(&mut self, ctx: &SceneContext) -> Result<()> {
    self.switch_to(self.active, |scene| scene.init(ctx))
  }

  /// Applies the pending switch once no frame in flight uses the old scene.
  pub fn change_scene(&mut self, ctx: &SceneContext, frames: &mut FrameSync) -> Result<()> {
    if self.pending.is_none() {
      return Ok(());
    }
    frames.wait_all()?;
    self.apply_pending(|scene| scene.init(ctx))
  }

  /// Points the active scene at freshly built pipelines. Loaded meshes and
  /// textures are kept, only pipeline-dependent bindings are rebuilt.
  pub fn rebind_pipelines(&mut self, ctx: &SceneContext, frames: &mut FrameSync) -> Result<()> {
    frames.wait_all()?;
    self.rebind_active(|scene| scene.rebind_pipelines(ctx))
  }

  fn apply_pending<F>(&mut self, init: F) -> Result<()>
  where
    F: FnOnce(&mut dyn Scene) -> Result<()>,
  {
    match self.pending.take() {
      Some(target) => self.switch_to(target, init),
      None => Ok(()),
    }
  }

  /// Destroys the active scene, makes `target` active and initialises it with
  /// `init`. `target` stays active but uninitialised when `init` fails.
  fn switch_to<F>(&mut self, target: usize, init: F) -> Result<()>
  where
    F: FnOnce(&mut dyn Scene) -> Result<()>,
  {
    self.destroy_active();
    if target != self.active {
      log::info!(
        "Switching scene: \"{}\" -> \"{}\"",
        self.active_name(),
        self.scenes.get(target).map_or("", |scene| scene.name())
      );
    }
    self.active = target;

    let Some(scene) = self.scenes.get_mut(target) else {
      return Ok(());
    };
    init(scene.as_mut())?;
    self.initialized = true;
    log::info!("Scene \"{}\" initialised", scene.name());
    Ok(())
  }

  fn rebind_active<F>(&mut self, rebind: F) -> Result<()>
  where
    F: FnOnce(&mut dyn Scene) -> Result<()>,
  {
    if !self.initialized {
      return Ok(());
    }
    match self.scenes.get_mut(self.active) {
      Some(scene) => rebind(scene.as_mut()),
      None => Ok(()),
    }
  }

  /// Releases the active scene's resources. The caller must have waited for the
  /// frames in flight.
  pub fn destroy_active(&mut self) {
    if !self.initialized {
      return;
    }
    if let Some(scene) = self.scenes.get_mut(self.active) {
      scene.destroy();
    }
    self.initialized = false;
  }

  pub fn show_scene_select_gui(&mut self, ctx: &egui::Context) {
    let mut selected = self.pending.unwrap_or(self.active);

    egui::Window::new("Scenes")
      .default_pos([10.0, 10.0])
      .show(ctx, |ui| {
        for (index, scene) in self.scenes.iter().enumerate() {
          ui.radio_value(&mut selected, index, scene.name());
        }
        ui.separator();
        ui.checkbox(&mut self.show_demo_windows, "egui demo windows");
      });

    if selected == self.active {
      self.pending = None;
    } else {
      self.request_change(selected);
    }
    if self.show_demo_windows {
      self.demo_windows.ui(ctx);
    }
  }

  /// Scene-specific windows of the active scene.
  pub fn show_scene_gui(&mut self, ctx: &egui::Context) {
    if let Some(scene) = self.current_scene() {
      scene.show_gui(ctx);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, rc::Rc};

  use vulkano::command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer};

  use super::*;
  use crate::{core::swapchain::FrameTarget, error::RenderError, input::InputState};

  type Events = Rc<RefCell<Vec<String>>>;

  struct NamedScene {
    name:   &'static str,
    events: Events,
  }

  impl Scene for NamedScene {
    fn name(&self) -> &str {
      self.name
    }

    fn init(&mut self, _ctx: &SceneContext) -> Result<()> {
      Ok(())
    }

    fn destroy(&mut self) {
      self.events.borrow_mut().push(format!("destroy {}", self.name));
    }

    fn rebind_pipelines(&mut self, _ctx: &SceneContext) -> Result<()> {
      Ok(())
    }

    fn update(&mut self, _: usize, _: [u32; 2], _: f64, _: &InputState) -> Result<()> {
      Ok(())
    }

    fn draw(
      &mut self,
      _: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
      _: &FrameTarget,
      _: usize,
    ) -> Result<()> {
      Ok(())
    }

    fn show_gui(&mut self, _: &egui::Context) {}
  }

  fn manager() -> (SceneManager, Events) {
    let events = Events::default();
    let scenes: Vec<Box<dyn Scene>> = ["first", "second", "third"]
      .into_iter()
      .map(|name| {
        Box::new(NamedScene {
          name,
          events: events.clone(),
        }) as Box<dyn Scene>
      })
      .collect();
    (SceneManager::new(scenes), events)
  }

  /// Initialiser that records the scene it was called for.
  fn record(events: &Events) -> impl FnOnce(&mut dyn Scene) -> Result<()> + '_ {
    move |scene| {
      events.borrow_mut().push(format!("init {}", scene.name()));
      Ok(())
    }
  }

  #[test]
  fn starts_on_the_first_scene() {
    let (manager, _) = manager();
    assert_eq!(manager.active_index(), 0);
    assert_eq!(manager.active_name(), "first");
    assert_eq!(manager.scene_names(), ["first", "second", "third"]);
    assert!(!manager.should_change_scene());
  }

  #[test]
  fn requests_are_validated() {
    let (mut manager, _) = manager();
    manager.request_change(0);
    assert!(!manager.should_change_scene());
    manager.request_change(3);
    assert!(!manager.should_change_scene());

    manager.request_change(2);
    assert!(manager.should_change_scene());
  }

  #[test]
  fn latest_request_wins() {
    let (mut manager, _) = manager();
    manager.request_change(1);
    manager.request_change(2);
    assert_eq!(manager.pending, Some(2));
  }

  #[test]
  fn switch_destroys_the_old_scene_before_initialising_the_new_one() {
    let (mut manager, events) = manager();
    manager.switch_to(0, record(&events)).unwrap();
    assert!(manager.initialized);

    manager.request_change(2);
    manager.apply_pending(record(&events)).unwrap();

    assert_eq!(*events.borrow(), ["init first", "destroy first", "init third"]);
    assert_eq!(manager.active_index(), 2);
    assert!(!manager.should_change_scene());
    assert!(manager.initialized);
  }

  #[test]
  fn nothing_happens_without_a_pending_switch() {
    let (mut manager, events) = manager();
    manager.switch_to(0, record(&events)).unwrap();
    manager.apply_pending(record(&events)).unwrap();
    assert_eq!(*events.borrow(), ["init first"]);
  }

  #[test]
  fn failed_init_leaves_nothing_to_destroy() {
    let (mut manager, events) = manager();
    manager.switch_to(0, record(&events)).unwrap();

    manager.request_change(1);
    let result = manager.apply_pending(|_| Err(RenderError::NoDescriptorPool));
    assert!(matches!(result, Err(RenderError::NoDescriptorPool)));
    assert_eq!(manager.active_index(), 1);
    assert!(!manager.initialized);

    manager.destroy_active();
    assert_eq!(*events.borrow(), ["init first", "destroy first"]);
  }

  #[test]
  fn rebinding_only_touches_an_initialised_active_scene() {
    let (mut manager, events) = manager();
    let rebind = |scene: &mut dyn Scene| {
      events.borrow_mut().push(format!("rebind {}", scene.name()));
      Ok(())
    };

    manager.rebind_active(rebind).unwrap();
    assert!(events.borrow().is_empty());

    manager.switch_to(0, record(&events)).unwrap();
    manager.rebind_active(rebind).unwrap();
    assert_eq!(*events.borrow(), ["init first", "rebind first"]);
    assert!(manager.initialized);
  }

  #[test]
  fn default_scenes_are_demo_then_compute() {
    let manager = SceneManager::default();
    assert_eq!(manager.scene_names(), ["Demo Scene", "Compute Preview Scene"]);
  }
}
