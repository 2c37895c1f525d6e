use std::fmt;
use std::io;

/// Errors surfaced by the recording client.
///
/// Every variant is handled at the boundary of the component that detects it
/// and turned into a user-visible status message; none may leave the engine
/// in an in-between state.
#[derive(Debug)]
pub enum ClientError {
    /// User declined device or display access. Recoverable, user retries.
    PermissionDenied(String),
    /// Platform cannot provide the requested capture at all.
    Unsupported(String),
    /// A local precondition failed; rejected before any network call.
    Validation(String),
    /// The request never completed (timeout, connectivity).
    Network(String),
    /// The backend returned a structured failure; message passed through verbatim.
    Server(String),
    /// The trim controller could not learn the source duration in time.
    MetadataTimeout,
    /// A media track failed while being read.
    Media(String),
    Io(io::Error),
    Config(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// True for errors that were raised before any network call was made.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::Validation(_) | ClientError::Config(_) | ClientError::MetadataTimeout
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::PermissionDenied(what) => write!(f, "Permission denied: {what}"),
            ClientError::Unsupported(what) => write!(f, "Not supported on this platform: {what}"),
            ClientError::Validation(msg) => write!(f, "{msg}"),
            ClientError::Network(msg) => write!(f, "Network error: {msg}"),
            ClientError::Server(msg) => write!(f, "Server error: {msg}"),
            ClientError::MetadataTimeout => {
                write!(f, "Timed out waiting for the recording's duration")
            }
            ClientError::Media(msg) => write!(f, "Media stream error: {msg}"),
            ClientError::Io(err) => write!(f, "Filesystem error: {err}"),
            ClientError::Config(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Io(value)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        ClientError::Network(value.to_string())
    }
}
