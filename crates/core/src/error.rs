/// Result alias that carries the custom [`SampleMapError`] type.
pub type Result<T> = std::result::Result<T, SampleMapError>;

/// Common error type for the core crate.
///
/// Only loading, preset parsing and bouncing surface errors. Everything that
/// runs inside the frame loop or the sequencer degrades silently instead.
#[derive(Debug, thiserror::Error)]
pub enum SampleMapError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a sample list, preset or config file.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Audio bytes could not be decoded into a buffer.
    #[error("failed to decode `{path}`: {reason}")]
    Decode { path: String, reason: String },
    /// Writing the bounced WAV failed.
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
    /// The sample list contained no usable entries.
    #[error("sample list contains no usable entries")]
    EmptyLibrary,
    /// A bounce was requested for a pattern without a single active step.
    #[error("pattern has no active steps")]
    EmptyPattern,
    /// A relative audio path tried to leave the sample root.
    #[error("path `{0}` escapes the sample root")]
    PathEscapesRoot(String),
}

impl SampleMapError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn decode(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for SampleMapError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SampleMapError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
