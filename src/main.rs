use std::{path::PathBuf, process::ExitCode};

use vulkano_scenes::{
  App,
  config::AppConfig,
  error::{RenderError, Result},
};
use winit::event_loop::EventLoop;

fn run(config: AppConfig) -> Result<()> {
  let event_loop = EventLoop::new().map_err(|e| RenderError::Window(e.to_string()))?;
  let mut app = App::new(&event_loop, config)?;
  event_loop
    .run_app(&mut app)
    .map_err(|e| RenderError::Window(e.to_string()))?;

  match app.take_error() {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

fn main() -> ExitCode {
  let config_path = std::env::args_os().nth(1).map(PathBuf::from);
  let config = match AppConfig::discover(config_path.as_deref()) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{e}");
      return ExitCode::FAILURE;
    }
  };

  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
    .init();

  match run(config) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      log::error!("{e}");
      ExitCode::FAILURE
    }
  }
}
