use thiserror::Error;

/// Everything that can terminate a download attempt.
///
/// Cloneable so snapshots of failed entries can carry the error around
/// without re-running anything.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Blocked file extension: .{0}")]
    BlockedExtension(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned HTTP {status}")]
    Http { status: u16 },

    #[error("Download cancelled by user")]
    Cancelled,
}

impl DownloadError {
    /// Errors that make trying another transfer mechanism pointless.
    pub fn is_fatal_for_fallback(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TooLarge { .. })
    }
}
