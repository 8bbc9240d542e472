//! Error types for the collaboration engine

use thiserror::Error;

/// Main error type for collaboration engine operations
#[derive(Error, Debug)]
pub enum CollabError {
    /// Connection to the collaboration endpoint could not be established
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The message channel is closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Error during serialization/deserialization of an envelope
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport-level error while sending or receiving
    #[error("Transport error: {0}")]
    Transport(String),

    /// An identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type alias using CollabError
pub type CollabResult<T> = Result<T, CollabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollabError::Connect("refused".to_string());
        assert_eq!(format!("{}", err), "Connect failed: refused");

        let err = CollabError::ChannelClosed;
        assert_eq!(format!("{}", err), "Channel closed");
    }
}
