//! Decodes uploaded image bytes into a [`PixelBuffer`].
//!
//! The container is sniffed from the leading bytes; the caller's file name is
//! never consulted. Decoding keeps no shared state, so independent uploads may
//! be decoded concurrently.

use std::io::Cursor;

use image::error::UnsupportedErrorKind;
use image::{ImageError, ImageFormat, ImageReader, Limits};
use tracing::debug;

use crate::error::DecodeError;
use crate::pixels::PixelBuffer;

/// Largest edge accepted when no explicit limit is configured.
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// Decode with the default size limit.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
    decode_with_limit(bytes, DEFAULT_MAX_DIMENSION)
}

/// Decode `bytes` to straight-alpha RGBA8 at natural size.
///
/// # Errors
/// Fails with [`DecodeError`] when the format is unknown, the data is
/// truncated or corrupt, or either dimension is zero or above `max_dimension`.
pub fn decode_with_limit(bytes: &[u8], max_dimension: u32) -> Result<PixelBuffer, DecodeError> {
    let format = sniff_format(bytes)?;

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(map_image_error)?;
    check_dimensions(width, height, max_dimension)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let rgba = reader.decode().map_err(map_image_error)?.to_rgba8();
    debug!(?format, width, height, "decoded image");

    let (width, height) = rgba.dimensions();
    PixelBuffer::from_raw(width, height, rgba.into_raw())
        .map_err(|err| DecodeError::Malformed(err.to_string()))
}

fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| DecodeError::Malformed(err.to_string()))?;
    reader.format().ok_or(DecodeError::UnrecognizedFormat)
}

fn check_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyDimensions { width, height });
    }
    if width > max_dimension || height > max_dimension {
        return Err(DecodeError::TooLarge {
            width,
            height,
            max_dimension,
        });
    }
    Ok(())
}

fn map_image_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::Unsupported(ref inner)
            if matches!(inner.kind(), UnsupportedErrorKind::Format(_)) =>
        {
            DecodeError::UnrecognizedFormat
        }
        other => DecodeError::Malformed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encode(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn decodes_red_png() {
        let bytes = encode(
            &RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])),
            ImageFormat::Png,
        );
        let buf = decode(&bytes).unwrap();
        assert_eq!(buf.dimensions(), (2, 2));
        assert_eq!(buf.pixels().collect::<Vec<_>>(), vec![[255, 0, 0, 255]; 4]);
    }

    #[test]
    fn keeps_straight_alpha() {
        let bytes = encode(
            &RgbaImage::from_pixel(1, 1, Rgba([100, 50, 200, 128])),
            ImageFormat::Png,
        );
        let buf = decode(&bytes).unwrap();
        assert_eq!(buf.pixel(0, 0), Some([100, 50, 200, 128]));
    }

    #[test]
    fn keeps_row_major_order() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        img.put_pixel(1, 0, Rgba([4, 5, 6, 255]));
        let buf = decode(&encode(&img, ImageFormat::Png)).unwrap();
        assert_eq!(buf.pixel(0, 0), Some([1, 2, 3, 255]));
        assert_eq!(buf.pixel(1, 0), Some([4, 5, 6, 255]));
    }

    #[test]
    fn rejects_unknown_bytes() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedFormat));
    }

    #[test]
    fn rejects_truncated_png() {
        let bytes = encode(
            &RgbaImage::from_pixel(16, 16, Rgba([0, 128, 0, 255])),
            ImageFormat::Png,
        );
        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_images_over_limit() {
        let bytes = encode(
            &RgbaImage::from_pixel(8, 4, Rgba([0, 0, 0, 255])),
            ImageFormat::Png,
        );
        let err = decode_with_limit(&bytes, 4).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TooLarge {
                width: 8,
                height: 4,
                max_dimension: 4
            }
        ));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            check_dimensions(0, 10, 100),
            Err(DecodeError::EmptyDimensions {
                width: 0,
                height: 10
            })
        ));
        assert!(check_dimensions(1, 1, 100).is_ok());
    }
}
