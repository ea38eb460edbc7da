use crate::error::{DecodeError, SurfaceLostError};

/// Decoded upload as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Opaque identifier supplied with the upload (typically a file name).
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// Notifications a session pushes back to its host.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The bound surface went away; the loop has stopped for good.
    SurfaceLost(SurfaceLostError),
    /// An upload failed to decode; the previous input stays in use.
    UploadRejected { source: String, error: DecodeError },
    /// A new input image was accepted and queued for transformation.
    InputReady(ImageInfo),
}
