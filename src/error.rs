//! Crate-level error type

use std::fmt;

/// Top-level error for server operation.
///
/// Fallback pipeline errors never reach this type: the upload route
/// converts them into HTTP status codes at the boundary.
#[derive(Debug)]
pub enum Error {
    /// I/O failure (bind, accept, serve).
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_wraps_with_source() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken").into();
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
