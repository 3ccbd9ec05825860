//! Error types for the chatsync core

use thiserror::Error;

/// Main error type for chatsync operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// A record that the operation requires is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// A raw tree value was present but did not match the expected schema
    #[error("Decode error: {0}")]
    Decode(String),

    /// The remote store failed to serve a read
    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    /// The remote store failed to apply a write
    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    /// A dependent step of a multi-step operation failed after an earlier
    /// step had already committed, leaving cross-user state inconsistent
    #[error("Partial saga failure: {0}")]
    PartialSaga(String),

    /// A versioned write lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::NotFound("user node missing: a-x-com".to_string());
        assert_eq!(format!("{}", err), "Not found: user node missing: a-x-com");
    }

    #[test]
    fn test_decode_display() {
        let err = ChatError::Decode("users: expected array".to_string());
        assert_eq!(format!("{}", err), "Decode error: users: expected array");
    }
}
