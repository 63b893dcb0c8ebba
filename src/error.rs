use sqlproxy_client::protocol::DriverError;
use thiserror::Error;

/// Failures raised by a backing engine while running a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Type coercion error: {0}")]
    TypeCoercion(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::ToSqlConversionFailure(_) => {
                BackendError::TypeCoercion(err.to_string())
            }
            other => BackendError::Execution(other.to_string()),
        }
    }
}

impl From<BackendError> for DriverError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::TypeCoercion(msg) => DriverError::ArgumentError(
                sqlproxy_client::protocol::ArgumentErrorKind::TypeCoercion(msg),
            ),
            BackendError::Execution(msg) | BackendError::Unavailable(msg) => {
                DriverError::ExecutionError(msg)
            }
        }
    }
}

/// Failures while starting or running the listener.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
