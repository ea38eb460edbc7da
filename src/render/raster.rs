//! CPU frame composition: projects the color cube through the orbit camera
//! and overlays a thumbnail of the transformed image.

use std::sync::Arc;

use glam::{Mat4, Vec4};
use serde::Deserialize;

use crate::camera::CameraPose;
use crate::pixels::PixelBuffer;
use crate::scene::ColorCube;

/// Frames larger than this along either edge are clamped.
pub const MAX_FRAME_DIMENSION: u32 = 8_192;
const INSET_MARGIN_PX: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderSettings {
    pub background: [u8; 3],
    pub field_of_view_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Thumbnail height as a fraction of the frame; 0 hides it.
    pub inset_fraction: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            background: [24, 24, 28],
            field_of_view_degrees: 45.0,
            near: 0.1,
            far: 500.0,
            inset_fraction: 0.3,
        }
    }
}

/// Everything a tick needs besides the pose. Published as a whole and never
/// modified afterwards.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    /// Transformed upload, if any.
    pub image: Option<Arc<PixelBuffer>>,
    pub cube: Arc<ColorCube>,
}

impl SceneFrame {
    pub fn empty(cube: ColorCube) -> Self {
        Self {
            image: None,
            cube: Arc::new(cube),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Splat {
    depth: f32,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    color: [u8; 3],
}

#[derive(Debug, Clone)]
pub struct Rasterizer {
    settings: RenderSettings,
}

impl Rasterizer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Compose one frame. Never fails; degenerate sizes yield an empty buffer.
    pub fn render(
        &self,
        scene: &SceneFrame,
        pose: &CameraPose,
        width: u32,
        height: u32,
    ) -> PixelBuffer {
        let mut frame = PixelBuffer::default();
        self.render_into(scene, pose, width, height, &mut frame);
        frame
    }

    /// Compose into `frame`, reusing its allocation across ticks.
    pub fn render_into(
        &self,
        scene: &SceneFrame,
        pose: &CameraPose,
        width: u32,
        height: u32,
        frame: &mut PixelBuffer,
    ) {
        let width = width.min(MAX_FRAME_DIMENSION);
        let height = height.min(MAX_FRAME_DIMENSION);
        let [br, bg, bb] = self.settings.background;
        if frame.refill(width, height, [br, bg, bb, 255]).is_err() {
            *frame = PixelBuffer::default();
            return;
        }
        if width == 0 || height == 0 {
            return;
        }

        let data = frame.as_bytes_mut();
        let splats = self.project(&scene.cube, pose, width, height);
        for splat in &splats {
            fill_rect(data, width, height, splat);
        }
        if let Some(image) = scene.image.as_deref() {
            self.draw_inset(data, width, height, image);
        }
    }

    fn project(&self, cube: &ColorCube, pose: &CameraPose, width: u32, height: u32) -> Vec<Splat> {
        let fov = self.settings.field_of_view_degrees.clamp(1.0, 179.0).to_radians();
        let near = self.settings.near.max(1e-4);
        let far = self.settings.far.max(near * 2.0);
        let aspect = width as f32 / height as f32;
        let view_proj = Mat4::perspective_rh(fov, aspect, near, far) * pose.view_matrix();
        let focal_px = (height as f32 / 2.0) / (fov / 2.0).tan();

        let mut splats: Vec<Splat> = cube
            .occupied()
            .filter_map(|cell| {
                let center = cube.world_center(cell);
                let clip: Vec4 = view_proj * center.extend(1.0);
                if clip.w <= near || clip.w >= far {
                    return None;
                }
                let ndc_x = clip.x / clip.w;
                let ndc_y = clip.y / clip.w;
                let sx = (ndc_x + 1.0) * 0.5 * width as f32;
                let sy = (1.0 - ndc_y) * 0.5 * height as f32;
                let half_world = cell.scale * cube.size() * 0.5;
                let radius = (half_world * focal_px / clip.w).max(0.5);
                Some(Splat {
                    depth: clip.w,
                    x0: (sx - radius).floor() as i64,
                    y0: (sy - radius).floor() as i64,
                    x1: (sx + radius).ceil() as i64,
                    y1: (sy + radius).ceil() as i64,
                    color: cell.color,
                })
            })
            .collect();

        // painter's order: far cells first
        splats.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        splats
    }

    fn draw_inset(&self, data: &mut [u8], width: u32, height: u32, image: &PixelBuffer) {
        let fraction = self.settings.inset_fraction.clamp(0.0, 1.0);
        if fraction <= 0.0 || image.is_empty() {
            return;
        }
        let max_h = (height as f32 * fraction).floor();
        let max_w = (width as f32 * fraction).floor();
        let scale = (max_h / image.height() as f32).min(max_w / image.width() as f32);
        let inset_w = (image.width() as f32 * scale).floor() as u32;
        let inset_h = (image.height() as f32 * scale).floor() as u32;
        if inset_w == 0 || inset_h == 0 {
            return;
        }

        let ox = INSET_MARGIN_PX.min(width.saturating_sub(inset_w));
        let oy = height.saturating_sub(inset_h + INSET_MARGIN_PX.min(height - inset_h));
        for y in 0..inset_h {
            let sy = (y as u64 * image.height() as u64 / inset_h as u64) as u32;
            for x in 0..inset_w {
                let sx = (x as u64 * image.width() as u64 / inset_w as u64) as u32;
                let Some([r, g, b, a]) = image.pixel(sx, sy) else {
                    continue;
                };
                let (dx, dy) = (ox + x, oy + y);
                if dx >= width || dy >= height {
                    continue;
                }
                let idx = (dy as usize * width as usize + dx as usize) * 4;
                blend_over(&mut data[idx..idx + 4], [r, g, b], a);
            }
        }
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}

fn fill_rect(data: &mut [u8], width: u32, height: u32, splat: &Splat) {
    let x0 = splat.x0.clamp(0, width as i64) as usize;
    let x1 = splat.x1.clamp(0, width as i64) as usize;
    let y0 = splat.y0.clamp(0, height as i64) as usize;
    let y1 = splat.y1.clamp(0, height as i64) as usize;
    let [r, g, b] = splat.color;
    for y in y0..y1 {
        let row = y * width as usize * 4;
        for px in data[row + x0 * 4..row + x1 * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&[r, g, b, 255]);
        }
    }
}

fn blend_over(dst: &mut [u8], src: [u8; 3], alpha: u8) {
    let a = u16::from(alpha);
    for c in 0..3 {
        let blended = u16::from(src[c]) * a + u16::from(dst[c]) * (255 - a);
        dst[c] = ((blended + 127) / 255) as u8;
    }
    dst[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ColorCubeSettings;

    fn background_only(frame: &PixelBuffer, bg: [u8; 3]) -> bool {
        frame.pixels().all(|px| px == [bg[0], bg[1], bg[2], 255])
    }

    #[test]
    fn frame_matches_requested_size() {
        let raster = Rasterizer::default();
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings::default()));
        let frame = raster.render(&scene, &CameraPose::default(), 64, 48);
        assert_eq!(frame.dimensions(), (64, 48));
    }

    #[test]
    fn uniform_cube_is_visible_from_default_pose() {
        let raster = Rasterizer::default();
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings {
            resolution: 4,
            ..ColorCubeSettings::default()
        }));
        let frame = raster.render(&scene, &CameraPose::default(), 80, 60);
        assert!(!background_only(&frame, raster.settings().background));
    }

    #[test]
    fn cells_beyond_far_plane_are_culled() {
        let raster = Rasterizer::new(RenderSettings {
            far: 2.0,
            ..RenderSettings::default()
        });
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings {
            resolution: 3,
            size: 1.0,
            threshold: 0.001,
        }));
        let frame = raster.render(&scene, &CameraPose::new(0.0, 0.0, 50.0), 32, 32);
        assert!(background_only(&frame, raster.settings().background));
    }

    #[test]
    fn inset_shows_transformed_image() {
        let raster = Rasterizer::new(RenderSettings {
            inset_fraction: 0.5,
            ..RenderSettings::default()
        });
        let image = Arc::new(PixelBuffer::filled(2, 2, [0, 255, 255, 255]).unwrap());
        let scene = SceneFrame {
            image: Some(image),
            cube: Arc::new(ColorCube::uniform(&ColorCubeSettings::default())),
        };
        let frame = raster.render(&scene, &CameraPose::new(0.0, 0.0, 400.0), 100, 100);
        // 50x50 inset anchored bottom-left with an 8px margin
        assert_eq!(frame.pixel(10, 60), Some([0, 255, 255, 255]));
        assert_eq!(frame.pixel(57, 91), Some([0, 255, 255, 255]));
    }

    #[test]
    fn reused_frame_matches_a_fresh_render() {
        let raster = Rasterizer::default();
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings {
            resolution: 4,
            ..ColorCubeSettings::default()
        }));
        let pose = CameraPose::default();
        let mut frame = raster.render(&scene, &pose, 120, 90);

        raster.render_into(&scene, &pose, 40, 30, &mut frame);
        assert_eq!(frame, raster.render(&scene, &pose, 40, 30));
        raster.render_into(&scene, &pose, 64, 48, &mut frame);
        assert_eq!(frame, raster.render(&scene, &pose, 64, 48));
    }

    #[test]
    fn oversized_surfaces_are_clamped() {
        let raster = Rasterizer::default();
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings {
            resolution: 2,
            ..ColorCubeSettings::default()
        }));
        let frame = raster.render(&scene, &CameraPose::default(), 4, u32::MAX);
        assert_eq!(frame.dimensions(), (4, MAX_FRAME_DIMENSION));
    }

    #[test]
    fn zero_sized_surface_yields_empty_frame() {
        let raster = Rasterizer::default();
        let scene = SceneFrame::empty(ColorCube::uniform(&ColorCubeSettings::default()));
        let frame = raster.render(&scene, &CameraPose::default(), 0, 10);
        assert!(frame.is_empty());
    }
}
