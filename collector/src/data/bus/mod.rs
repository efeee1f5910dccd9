//! Service manager event bus boundary
//!
//! A `UnitBus` pushes unit property changes into one bounded channel and
//! transport faults into another. Sends await channel capacity, so a slow
//! dispatch loop holds the producer back instead of growing memory.

mod error;
pub mod path;
mod systemd;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use error::BusError;
pub use systemd::{SystemdBus, render_value};

use crate::domain::types::ChangeNotification;

#[async_trait]
pub trait UnitBus: Send {
    /// Ask the service manager to emit unit signals and start matching them.
    async fn subscribe(&mut self) -> Result<(), BusError>;

    /// Register the channels the bus pushes into and start forwarding.
    ///
    /// Must be called after [`UnitBus::subscribe`]. The returned task ends
    /// when the signal stream ends or both receivers are gone.
    fn set_subscriber(
        &mut self,
        updates: mpsc::Sender<ChangeNotification>,
        errors: mpsc::Sender<BusError>,
    ) -> Result<JoinHandle<()>, BusError>;
}
