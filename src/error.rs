//! Genome sort errors.

use std::io;

use crate::chunk::ExternalChunkError;
use crate::input::InputError;
use crate::record::ParseError;
use crate::sort::SortError;

/// Genome sort error. Every error is fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid invocation: no inputs, too many variant inputs, mixed formats or out of range options.
    #[error("usage error: {0}")]
    Usage(String),
    /// Malformed input record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Unreadable input, corrupt compressed data or unwritable destination.
    #[error("{context}: {error}")]
    Io {
        context: String,
        #[source]
        error: io::Error,
    },
    /// Temporary storage or worker threads can't be allocated.
    #[error("{context}: {error}")]
    Resource {
        context: String,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Temporary run encoding error.
    #[error("temporary data serialization error: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),
    /// Temporary run decoding error.
    #[error("temporary data deserialization error: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(context: impl Into<String>, error: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            error,
        }
    }

    /// Process exit code matching the error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            _ => 1,
        }
    }
}

impl From<InputError> for Error {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Io { source_name, error } => Error::io(format!("failed to read {}", source_name), error),
            InputError::Parse(err) => Error::Parse(err),
        }
    }
}

impl From<SortError<InputError>> for Error {
    fn from(err: SortError<InputError>) -> Self {
        match err {
            SortError::TempDir(err) => Error::Resource {
                context: "temporary directory or file not created".to_string(),
                error: Box::new(err),
            },
            SortError::ThreadPoolBuildError(err) => Error::Resource {
                context: "thread pool initialization failed".to_string(),
                error: Box::new(err),
            },
            SortError::IO(err) => Error::io("temporary run I/O failed", err),
            SortError::SerializationError(err) => Error::Serialization(err),
            SortError::DeserializationError(err) => Error::Deserialization(err),
            SortError::InputError(err) => Error::from(err),
            SortError::InvalidConfig(message) => Error::Usage(message),
        }
    }
}

impl From<ExternalChunkError> for Error {
    fn from(err: ExternalChunkError) -> Self {
        Error::from(SortError::<InputError>::from(err))
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::Error;
    use crate::input::InputError;
    use crate::record::ParseError;
    use crate::sort::SortError;

    #[test]
    fn test_input_errors_keep_their_kind() {
        let parse = ParseError {
            source_name: "a.bed".to_string(),
            line: 4,
            message: "missing end column".to_string(),
        };
        let err = Error::from(SortError::InputError(InputError::Parse(parse)));
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.to_string(), "parse error: a.bed:4: missing end column");

        let err = Error::from(SortError::InputError(InputError::Io {
            source_name: "b.bed".to_string(),
            error: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        }));
        assert_eq!(err.to_string(), "failed to read b.bed: no such file");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_resource_errors() {
        let err = Error::from(SortError::<InputError>::TempDir(io::Error::new(
            io::ErrorKind::Other,
            "no space left on device",
        )));
        assert!(matches!(err, Error::Resource { .. }));
        assert!(err.to_string().contains("no space left"));
    }

    #[test]
    fn test_usage_exit_code() {
        assert_eq!(Error::Usage("no input files".to_string()).exit_code(), 2);
    }
}
