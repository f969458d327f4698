pub mod frames;
pub mod init;
pub mod swapchain;
