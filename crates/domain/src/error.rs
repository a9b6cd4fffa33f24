/// Shared error type returned by every component in the orchestration core.
///
/// Variants map 1:1 onto the caller-facing outcomes the gateway must be able
/// to distinguish (see the error handling design notes); anything that
/// originates below that boundary (I/O, serialization, SQL) is folded into
/// `DependencyFailure` or `Internal` at the point it crosses into domain code.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing credentials")]
    AuthMissing,

    #[error("invalid credentials: {0}")]
    AuthInvalid(String),

    #[error("caller does not own this resource")]
    Ownership,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Malformed(format!("json: {e}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::DependencyFailure(format!("sqlite: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
