/// Shared error type used across all SerialAgent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// Malformed structured output, a schema mismatch, or any input that
    /// fails validation after the node's built-in re-prompt has already
    /// been exhausted.
    #[error("validation: {0}")]
    Validation(String),

    /// A tool-call budget or continuation-iteration budget was exceeded.
    /// Fatal for the node that raised it; the run terminates with this
    /// as its diagnostic.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
