//! Hue rotation applied to the uploaded image before it reaches the scene.

use rayon::prelude::*;
use serde::Deserialize;
use tracing::trace;

use crate::error::InvalidParameterError;
use crate::pixels::PixelBuffer;
use crate::processing::color::{hsv_to_rgb, rgb_to_hsv, u8_to_unit, unit_to_u8, wrap_degrees};

/// User-adjustable transform state.
///
/// `angle` is always finite and inside `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "f32")]
pub struct TransformParameters {
    angle: f32,
}

impl TransformParameters {
    pub const IDENTITY: Self = Self { angle: 0.0 };

    /// Checked constructor used by the slider feed.
    ///
    /// # Errors
    /// Rejects NaN, infinities and anything outside `[0, 360)`.
    pub fn new(angle: f32) -> Result<Self, InvalidParameterError> {
        if angle.is_finite() && (0.0..360.0).contains(&angle) {
            Ok(Self { angle })
        } else {
            Err(InvalidParameterError {
                name: "angle",
                value: angle,
            })
        }
    }

    /// Wraps any finite angle into range.
    pub fn wrapped(angle: f32) -> Result<Self, InvalidParameterError> {
        if !angle.is_finite() {
            return Err(InvalidParameterError {
                name: "angle",
                value: angle,
            });
        }
        Ok(Self {
            angle: wrap_degrees(angle),
        })
    }

    /// Nudge by `delta` degrees, wrapping; non-finite deltas leave it unchanged.
    #[must_use]
    pub fn rotated_by(self, delta: f32) -> Self {
        Self::wrapped(self.angle + delta).unwrap_or(self)
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

impl TryFrom<f32> for TransformParameters {
    type Error = InvalidParameterError;

    fn try_from(angle: f32) -> Result<Self, Self::Error> {
        Self::new(angle)
    }
}

/// Rotate every pixel's hue by `params.angle`.
pub fn apply(buffer: &PixelBuffer, params: TransformParameters) -> PixelBuffer {
    rotate_hue(buffer, params.angle())
}

/// Rotate hue by an arbitrary finite angle.
///
/// The angle is reduced through its representative in `[360, 720)`, so `a`
/// and `a + 360` resolve to the same rotation bit for bit, and a zero rotation
/// returns an exact copy. Non-finite angles are treated as zero.
pub fn rotate_hue(buffer: &PixelBuffer, degrees: f32) -> PixelBuffer {
    let degrees = if degrees.is_finite() {
        resolve_degrees(degrees)
    } else {
        0.0
    };
    if degrees == 0.0 || buffer.is_empty() {
        return buffer.clone();
    }

    let mut out = buffer.clone();
    let stride = out.stride();
    out.as_bytes_mut()
        .par_chunks_mut(stride)
        .for_each(|row| rotate_row(row, degrees));
    trace!(
        width = out.width(),
        height = out.height(),
        degrees,
        "rotated hue"
    );
    out
}

fn rotate_row(row: &mut [u8], degrees: f32) {
    for px in row.chunks_exact_mut(4) {
        let (h, s, v) = rgb_to_hsv(u8_to_unit(px[0]), u8_to_unit(px[1]), u8_to_unit(px[2]));
        if s <= 0.0 {
            // achromatic pixels have no hue to rotate
            continue;
        }
        let (r, g, b) = hsv_to_rgb(wrap_degrees(h + degrees), s, v);
        px[0] = unit_to_u8(r);
        px[1] = unit_to_u8(g);
        px[2] = unit_to_u8(b);
    }
}

/// For `a` in `[0, 360)`, `b = a + 360` is already a float in `[360, 720]`
/// and `b % 360 == b - 360` exactly, so both inputs land on the same `b`.
fn resolve_degrees(degrees: f32) -> f32 {
    let shifted = wrap_degrees(degrees) + 360.0;
    let resolved = shifted - 360.0;
    if resolved >= 360.0 { 0.0 } else { resolved }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PixelBuffer {
        PixelBuffer::from_pixels(
            3,
            2,
            [
                [255, 0, 0, 255],
                [12, 200, 99, 128],
                [0, 0, 0, 0],
                [40, 40, 40, 255],
                [250, 251, 3, 17],
                [1, 2, 254, 255],
            ],
        )
        .unwrap()
    }

    #[test]
    fn zero_angle_is_identity() {
        let input = sample();
        assert_eq!(apply(&input, TransformParameters::IDENTITY), input);
    }

    #[test]
    fn adding_a_full_turn_changes_nothing() {
        let input = sample();
        for angle in [0.1_f32, 45.0, 90.0, 179.5, 270.25, 359.0] {
            assert_eq!(
                rotate_hue(&input, angle),
                rotate_hue(&input, angle + 360.0),
                "angle {angle}"
            );
        }
    }

    fn rgb_sweep() -> PixelBuffer {
        let steps: Vec<u8> = (0..=255u8).step_by(17).collect();
        let mut pixels = Vec::new();
        for &r in &steps {
            for &g in &steps {
                for &b in &steps {
                    pixels.push([r, g, b, 255]);
                }
            }
        }
        let n = steps.len() as u32;
        PixelBuffer::from_pixels(n * n, n, pixels).unwrap()
    }

    #[test]
    fn full_turn_holds_for_fractional_angles() {
        let input = rgb_sweep();
        let mut mismatched = Vec::new();
        for i in 0..720u32 {
            // half-millidegree steps sit on rounding boundaries
            let angle = i as f32 * 0.5 + 0.0005;
            if rotate_hue(&input, angle) != rotate_hue(&input, angle + 360.0) {
                mismatched.push(angle);
            }
        }
        assert!(mismatched.is_empty(), "mismatching angles: {mismatched:?}");
    }

    #[test]
    fn resolved_rotation_is_periodic() {
        for i in 0..36_000u32 {
            let angle = i as f32 * 0.01 + 0.0005;
            assert_eq!(
                resolve_degrees(angle).to_bits(),
                resolve_degrees(angle + 360.0).to_bits(),
                "angle {angle}"
            );
        }
        assert_eq!(resolve_degrees(0.0), 0.0);
        assert_eq!(resolve_degrees(360.0), 0.0);
    }

    #[test]
    fn red_rotates_to_cyan() {
        let red = PixelBuffer::from_pixels(1, 1, [[255, 0, 0, 77]]).unwrap();
        let out = apply(&red, TransformParameters::new(180.0).unwrap());
        assert_eq!(out.pixel(0, 0), Some([0, 255, 255, 77]));
    }

    #[test]
    fn alpha_and_greys_are_untouched() {
        let out = rotate_hue(&sample(), 123.0);
        let before: Vec<_> = sample().pixels().collect();
        let after: Vec<_> = out.pixels().collect();
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a[3], b[3]);
        }
        assert_eq!(after[3], [40, 40, 40, 255]);
        assert_eq!(after[2], [0, 0, 0, 0]);
    }

    #[test]
    fn repeated_application_is_deterministic() {
        let input = sample();
        let params = TransformParameters::new(211.0).unwrap();
        assert_eq!(apply(&input, params), apply(&input, params));
    }

    #[test]
    fn small_angles_stay_close_to_input() {
        let input = sample();
        let out = rotate_hue(&input, 359.9);
        for (a, b) in input.pixels().zip(out.pixels()) {
            for c in 0..3 {
                assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 2);
            }
        }
    }

    #[test]
    fn checked_constructor_rejects_out_of_range() {
        assert!(TransformParameters::new(360.0).is_err());
        assert!(TransformParameters::new(-0.5).is_err());
        assert!(TransformParameters::new(f32::NAN).is_err());
        assert!(TransformParameters::new(359.9).is_ok());
    }

    #[test]
    fn wrapped_constructor_and_nudges() {
        let p = TransformParameters::wrapped(-30.0).unwrap();
        assert!((p.angle() - 330.0).abs() < 1e-4);
        let q = p.rotated_by(40.0);
        assert!((q.angle() - 10.0).abs() < 1e-3);
        assert_eq!(q.rotated_by(f32::NAN), q);
        assert!(TransformParameters::wrapped(f32::INFINITY).is_err());
    }
}
