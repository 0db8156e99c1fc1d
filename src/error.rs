use thiserror::Error;

/// Why an image could not be turned into terminal bytes
///
/// None of these reach the user: the draw for that image is skipped and the
/// reason is logged.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("image {0:#x} has no decoded bitmap yet")]
    MissingBitmap(u32),

    #[error("failed to encode PNG: {0}")]
    Png(#[from] image::ImageError),

    #[error("failed to format escape sequence: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EncodeError>;
