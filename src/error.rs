use thiserror::Error;

/// audioseg's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// audioseg's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream consumers aren't forced to
/// adopt `anyhow` in their own public APIs. Internal modules work in `anyhow::Result` and
/// convert at the boundary via `From<anyhow::Error>`, which tries to recover a specific kind
/// via [`ErrorKind`] markers attached with [`mark`].
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed CLI input or incompatible flag combinations. Surfaced before any job runs.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unreadable or ill-formed configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required external tool or library is unavailable for the selected strategy.
    #[error("missing dependency: {0}")]
    DependencyMissing(String),

    /// The audio path does not exist or is not readable.
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// Tool invocation, parsing, or feature computation failure within a job.
    #[error("runtime processing error: {0}")]
    RuntimeProcessing(String),

    /// Raised only by the `validate` command.
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// The process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => 2,
            Error::Config(_) => 2,
            Error::DependencyMissing(_) => 2,
            Error::InputNotFound(_) => 2,
            Error::RuntimeProcessing(_) => 1,
            Error::Validation(_) => 2,
        }
    }
}

/// A marker attached to an `anyhow::Error` chain so that `From<anyhow::Error>` can recover the
/// intended [`Error`] variant instead of collapsing everything to `RuntimeProcessing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Config,
    DependencyMissing,
    InputNotFound,
    Validation,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
struct TaggedError {
    kind: ErrorKind,
    message: String,
}

/// Wrap `err` so that converting it to [`Error`] later recovers `kind` instead of defaulting
/// to `RuntimeProcessing`.
pub fn mark(kind: ErrorKind, err: anyhow::Error) -> anyhow::Error {
    anyhow::anyhow!(TaggedError {
        kind,
        message: format!("{err:#}"),
    })
}

/// Shorthand for `mark(kind, anyhow::anyhow!(msg))`.
pub fn tagged(kind: ErrorKind, msg: impl Into<String>) -> anyhow::Error {
    anyhow::anyhow!(TaggedError {
        kind,
        message: msg.into(),
    })
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        if let Some(tagged) = err.downcast_ref::<TaggedError>() {
            let message = tagged.message.clone();
            return match tagged.kind {
                ErrorKind::InvalidArgument => Error::InvalidArgument(message),
                ErrorKind::Config => Error::Config(message),
                ErrorKind::DependencyMissing => Error::DependencyMissing(message),
                ErrorKind::InputNotFound => Error::InputNotFound(message),
                ErrorKind::Validation => Error::Validation(message),
            };
        }
        Error::RuntimeProcessing(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::RuntimeProcessing(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::RuntimeProcessing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_tagged_kind() {
        let err: anyhow::Error = tagged(ErrorKind::InputNotFound, "no such file");
        let converted: Error = err.into();
        assert!(matches!(converted, Error::InputNotFound(_)));
        assert_eq!(converted.exit_code(), 2);
    }

    #[test]
    fn defaults_to_runtime_processing() {
        let err = anyhow::anyhow!("boom");
        let converted: Error = err.into();
        assert!(matches!(converted, Error::RuntimeProcessing(_)));
        assert_eq!(converted.exit_code(), 1);
    }

    #[test]
    fn mark_preserves_context_message() {
        let inner = anyhow::anyhow!("bad flag combo");
        let err = mark(ErrorKind::InvalidArgument, inner);
        let converted: Error = err.into();
        match converted {
            Error::InvalidArgument(msg) => assert!(msg.contains("bad flag combo")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
