//! Metrics store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    /// Transport failure (connect, timeout, broken body)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Store answered with a non-success status
    #[error("Store rejected write with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Adapter could not be built from its configuration
    #[error("Store configuration error: {0}")]
    Config(String),
}
