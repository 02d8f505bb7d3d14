//! Error types for mailcraft

use thiserror::Error;

/// Main error type for mailcraft
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Preflight error: {0}")]
    Preflight(String),
}

/// Result type alias for mailcraft
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Process exit code used by the command line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::Validation(_) => 2,
            Error::Io { .. } => 3,
            Error::Preflight(_) => 4,
            Error::Render(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Config("x".into()).exit_code(), 2);
        assert_eq!(Error::Validation("x".into()).exit_code(), 2);
        assert_eq!(Error::Preflight("x".into()).exit_code(), 4);
        assert_eq!(Error::Render("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "/etc/mail/users",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/etc/mail/users"));
        assert_eq!(err.exit_code(), 3);
    }
}
