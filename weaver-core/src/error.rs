use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeaverError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Table names are interpolated into SQL, so only plain identifiers pass.
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}
