pub mod frame_loop;
pub mod raster;
pub mod surface;
