pub mod camera;
pub mod commands;
pub mod descriptors;
pub mod model;
pub mod pipeline;
pub mod texture;
pub mod vertex;
