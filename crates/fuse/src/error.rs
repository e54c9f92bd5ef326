/// Errors that can occur when setting up a FUSE session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Framing problems that cause a request to be dropped or rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("request too short: {len} bytes")]
    TooShort { len: usize },

    #[error("malformed header: read {actual} bytes, header declares {declared}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("truncated payload for opcode {opcode}: {len} bytes, need {needed}")]
    TruncatedPayload {
        opcode: u32,
        len: usize,
        needed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_config() {
        let err = Error::InvalidConfig("max_handles must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_handles must be at least 1"
        );
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("no such device"));
    }

    #[test]
    fn frame_error_display() {
        let err = FrameError::LengthMismatch {
            declared: 80,
            actual: 64,
        };
        assert_eq!(
            err.to_string(),
            "malformed header: read 64 bytes, header declares 80"
        );
    }
}
