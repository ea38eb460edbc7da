use thiserror::Error;

/// Rejected image upload.
///
/// Recoverable: the session keeps whatever input image it already had.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The leading bytes do not match any supported container.
    #[error("unrecognized image format")]
    UnrecognizedFormat,

    /// The byte source ended early or the encoded data is corrupt.
    #[error("malformed image data: {0}")]
    Malformed(String),

    /// The image declares zero width or height.
    #[error("image has zero-sized dimension ({width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    /// The image exceeds the configured decode limit.
    #[error("image {width}x{height} exceeds the {max_dimension}px decode limit")]
    TooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },
}

/// A second session tried to bind a surface that already has one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface `{surface_id}` is already bound to a session")]
pub struct SessionConflictError {
    pub surface_id: String,
}

/// A parameter setter received a value outside its domain.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value {value} for `{name}`")]
pub struct InvalidParameterError {
    pub name: &'static str,
    pub value: f32,
}

/// The host destroyed the drawable surface while the session was using it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface `{surface_id}` is no longer available")]
pub struct SurfaceLostError {
    pub surface_id: String,
}

/// `start()` found no surface to draw on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// The host destroyed the surface. Recreate it and rebind.
    #[error(transparent)]
    Lost(#[from] SurfaceLostError),

    /// A previous `stop()` released the surface binding.
    #[error("surface `{surface_id}` was released by stop; rebind it before starting")]
    Released { surface_id: String },
}

/// Raw pixel data did not match the declared dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PixelBufferError {
    #[error("expected {expected} bytes for {width}x{height} RGBA8, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("dimensions {width}x{height} overflow the address space")]
    Overflow { width: u32, height: u32 },
}
