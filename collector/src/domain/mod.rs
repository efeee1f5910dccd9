//! Unit state collection
//!
//! - `state` - active state classification and ordinals
//! - `point` - notification to metric point conversion
//! - `pipeline` - dispatch loop between the bus and the store
//! - `persist` - batch writes with retry

pub mod error;
pub mod persist;
pub mod pipeline;
pub mod point;
pub mod state;
pub mod stats;
pub mod types;

pub use error::PipelineError;
pub use pipeline::DispatchLoop;
pub use state::{ActiveState, classify};
pub use stats::{PipelineStats, StatsSnapshot};
