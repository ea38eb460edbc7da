//! The color cube: an RGB-space histogram of the current image, laid out as a
//! lattice of cells inside a cube centred on the orbit target.

use glam::Vec3;
use serde::Deserialize;

use crate::pixels::PixelBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ColorCubeSettings {
    /// Cells per axis.
    pub resolution: u32,
    /// Edge length of the cube in world units.
    pub size: f32,
    /// Fraction of all pixels a bin needs to reach full cell size.
    pub threshold: f32,
}

impl Default for ColorCubeSettings {
    fn default() -> Self {
        Self {
            resolution: 32,
            size: 10.0,
            threshold: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Position inside the unit cube; axes are R, G, B.
    pub position: Vec3,
    pub color: [u8; 3],
    /// Edge length in unit-cube space, `0..=step`.
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorCube {
    resolution: u32,
    size: f32,
    cells: Vec<Cell>,
}

impl ColorCube {
    /// Every cell at full size: the scene shown before any upload.
    pub fn uniform(settings: &ColorCubeSettings) -> Self {
        let resolution = settings.resolution.max(2);
        let step = step_for(resolution);
        let mut cells = Vec::with_capacity((resolution as usize).pow(3));
        for xi in 0..resolution {
            let x = xi as f32 * step;
            for yi in 0..resolution {
                let y = yi as f32 * step;
                for zi in 0..resolution {
                    let z = zi as f32 * step;
                    cells.push(Cell {
                        position: Vec3::new(x, y, z),
                        color: [unit_byte(x), unit_byte(y), unit_byte(z)],
                        scale: step,
                    });
                }
            }
        }
        Self {
            resolution,
            size: settings.size,
            cells,
        }
    }

    /// Histogram `image` into the lattice; cell size tracks bin population.
    pub fn from_image(settings: &ColorCubeSettings, image: &PixelBuffer) -> Self {
        let mut cube = Self::uniform(settings);
        let step = cube.step();
        for cell in &mut cube.cells {
            cell.scale = 0.0;
        }

        let mut counts = vec![0u32; cube.cells.len()];
        for [r, g, b, _] in image.pixels() {
            counts[cube.cell_index(r, g, b)] += 1;
        }

        let saturation_count = settings.threshold * image.len() as f32;
        for (cell, &count) in cube.cells.iter_mut().zip(&counts) {
            cell.scale = if count == 0 {
                0.0
            } else if saturation_count <= 0.0 {
                step
            } else {
                (count as f32 * step / saturation_count).clamp(0.0, step)
            };
        }
        cube
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    /// Spacing between neighbouring cells in unit-cube space.
    pub fn step(&self) -> f32 {
        step_for(self.resolution)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cells with a visible footprint.
    pub fn occupied(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.scale > 0.0)
    }

    pub fn cell_index(&self, r: u8, g: u8, b: u8) -> usize {
        let res = self.resolution as usize;
        let bin = |v: u8| ((usize::from(v) * res) / 255).min(res - 1);
        bin(r) * res * res + bin(g) * res + bin(b)
    }

    /// Centre of `cell` in world space.
    pub fn world_center(&self, cell: &Cell) -> Vec3 {
        cell.position * self.size - Vec3::splat(self.size / 2.0)
    }
}

fn step_for(resolution: u32) -> f32 {
    1.0 / (resolution.max(2) - 1) as f32
}

fn unit_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
