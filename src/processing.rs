pub mod color;
pub mod hue;
