use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration")]
    Config(#[from] config::ConfigError),

    #[error("Query failed: {0}")]
    Query(#[from] frost_common::Error),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}
