pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod gui;
pub mod input;
pub mod render;
pub mod scene;
pub mod shaders;

// Re-export commonly used items
pub use app::App;
pub use config::AppConfig;
pub use error::{RenderError, Result};
