use reqwest::StatusCode;

/// Errors that can happen within the blobbench-client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// IO errors related to payload streaming or file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The storage account key is not valid base64.
    #[error("invalid account key: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    /// Error when URL manipulation fails.
    #[error("{message}")]
    InvalidUrl {
        /// The URL error message.
        message: String,
    },
    /// The storage service answered with a non-success status.
    #[error("request failed with status {status} ({code}): {message}")]
    Status {
        /// HTTP status of the response.
        status: StatusCode,
        /// The service error code, taken from the `x-ms-error-code` header if present.
        code: String,
        /// The response body, usually an XML error document.
        message: String,
    },
    /// A download returned a different number of bytes than expected.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Number of bytes the caller expected.
        expected: u64,
        /// Number of bytes actually received.
        actual: u64,
    },
}

impl Error {
    /// Returns the HTTP status if this error was returned by the storage service.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
