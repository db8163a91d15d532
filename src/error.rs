use thiserror::Error;

/// sockwatch error types.
///
/// Every variant except `Io` is produced at load time and is fatal: a
/// single violation aborts startup. `Io` covers the server bind path; a
/// failed connection-table query never surfaces as a `WatchError` at all,
/// since the collector logs the underlying `io::Error` and reports zero
/// entries for that scrape cycle.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("socket rule #{index} must have the field name set")]
    MissingName { index: usize },

    #[error("socket rule '{rule}' must have {field} set")]
    MissingField { rule: String, field: &'static str },

    #[error("socket rule '{rule}': '{value}' is not a valid protocol")]
    InvalidProtocol { rule: String, value: String },

    #[error("socket rule '{rule}': '{value}' is not a valid status")]
    InvalidStatus { rule: String, value: String },

    #[error("socket rule '{rule}': failed to resolve host '{host}': {message}")]
    Resolve {
        rule: String,
        host: String,
        message: String,
    },

    #[error("socket rule '{rule}': invalid process pattern: {source}")]
    ProcessPattern { rule: String, source: regex::Error },

    #[error("socket rule '{rule}' produces the same label set as an earlier rule")]
    DuplicateLabels { rule: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
