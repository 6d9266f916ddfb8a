use thiserror::Error;

#[derive(Error, Debug)]
pub enum MidasError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} account '{name}' does not exist. Create it with `midas accounts create`.")]
    AccountNotFound { kind: String, name: String },

    #[error("{kind} account '{name}' already exists")]
    AccountExists { kind: String, name: String },

    #[error("No transactions found for the specified criteria")]
    EmptyResult,

    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    #[error("Parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, MidasError>;
