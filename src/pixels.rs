//! Canonical RGBA8 raster shared by every pipeline stage.

use crate::error::PixelBufferError;

/// Straight-alpha RGBA8 pixel.
pub type Rgba8 = [u8; 4];

/// Row-major, top-left origin RGBA8 image.
///
/// The byte length always equals `width * height * 4`; constructors refuse
/// anything else. Once shared behind an `Arc` a buffer is never mutated again:
/// stages build a new buffer and publish that instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 bytes.
    ///
    /// # Errors
    /// Returns [`PixelBufferError::LengthMismatch`] when `data` does not hold
    /// exactly `width * height` pixels.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PixelBufferError> {
        let expected = byte_len(width, height)?;
        if data.len() != expected {
            return Err(PixelBufferError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from a pixel sequence.
    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: impl IntoIterator<Item = Rgba8>,
    ) -> Result<Self, PixelBufferError> {
        let data: Vec<u8> = pixels.into_iter().flatten().collect();
        Self::from_raw(width, height, data)
    }

    /// A buffer filled with a single color.
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Result<Self, PixelBufferError> {
        let count = byte_len(width, height)? / 4;
        Ok(Self {
            width,
            height,
            data: color.repeat(count),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of pixels (`width * height`).
    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes in one row.
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn pixels(&self) -> impl Iterator<Item = Rgba8> + '_ {
        self.data
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Resize to `width x height` and fill with `color`, keeping the existing
    /// allocation when it is large enough.
    pub(crate) fn refill(
        &mut self,
        width: u32,
        height: u32,
        color: Rgba8,
    ) -> Result<(), PixelBufferError> {
        let len = byte_len(width, height)?;
        self.data.resize(len, 0);
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        self.width = width;
        self.height = height;
        Ok(())
    }
}

fn byte_len(width: u32, height: u32) -> Result<usize, PixelBufferError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or(PixelBufferError::Overflow { width, height })
}
