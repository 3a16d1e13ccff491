use thiserror::Error;

/// Result type for dynamoutil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while transferring table data
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown job name, malformed job file or an invalid rename rule
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure to open an authenticated session with a table endpoint
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Describe-table reported that the table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A describe or scan call failed
    #[error("Store error: {0}")]
    Store(String),

    /// A batch-write call failed outright or never drained its unprocessed set
    #[error("Batch write failed: {0}")]
    HardWrite(String),

    /// Creating the destination table failed
    #[error("Create table failed: {0}")]
    CreateTable(String),

    /// A single store call exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The operator interrupted the transfer
    #[error("Transfer cancelled")]
    Cancelled,

    /// Errors related to JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors related to YAML job files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true for the not-found kind raised by describe-table
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TableNotFound(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("write task failed: {}", err))
    }
}
