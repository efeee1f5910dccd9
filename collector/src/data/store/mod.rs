//! Metrics store boundary
//!
//! The dispatch loop only needs `write`; `InfluxStore` is the HTTP
//! implementation used by the binary.

mod error;
mod influx;
pub mod line_protocol;

use async_trait::async_trait;

pub use error::WriteError;
pub use influx::InfluxStore;

use crate::domain::types::Batch;

/// Sink accepting batches of metric points
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Submit one batch. Errors are sink faults, never data-model violations.
    async fn write(&self, batch: &Batch) -> Result<(), WriteError>;
}
