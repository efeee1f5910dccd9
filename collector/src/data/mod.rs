//! External systems: the service manager bus and the metrics store

pub mod bus;
pub mod store;

pub use bus::{BusError, SystemdBus, UnitBus};
pub use store::{InfluxStore, MetricStore, WriteError};
