pub mod camera;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod pixels;
pub mod processing;
pub mod render;
pub mod scene;
pub mod session;
