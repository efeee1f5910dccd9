//! systemd over the D-Bus system bus

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zbus::message::Type as MessageType;
use zbus::zvariant::{OwnedValue, Value};
use zbus::{Connection, MatchRule, Message, MessageStream, Proxy};

use super::path::unit_name_from_path;
use super::{BusError, UnitBus};
use crate::core::constants::{
    DBUS_PROPERTIES_INTERFACE, PROP_STATE_CHANGE_TIMESTAMP, SYSTEMD_DESTINATION,
    SYSTEMD_MANAGER_INTERFACE, SYSTEMD_MANAGER_PATH, SYSTEMD_UNIT_INTERFACE,
    SYSTEMD_UNIT_PATH_NAMESPACE,
};
use crate::domain::types::{ChangeNotification, PropertyValue};
use crate::utils::time::usec_to_datetime;

/// Unit property changes from the systemd manager
pub struct SystemdBus {
    connection: Connection,
    stream: Option<MessageStream>,
    queue_capacity: usize,
}

impl SystemdBus {
    /// Open a connection to the system bus.
    ///
    /// `queue_capacity` bounds the signals zbus buffers before the forwarder
    /// reads them.
    pub async fn connect(queue_capacity: usize) -> Result<Self, BusError> {
        let connection = Connection::system()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        tracing::debug!(
            unique_name = ?connection.unique_name(),
            "Connected to system bus"
        );
        Ok(Self {
            connection,
            stream: None,
            queue_capacity,
        })
    }

    fn unit_signal_rule() -> Result<MatchRule<'static>, zbus::Error> {
        Ok(MatchRule::builder()
            .msg_type(MessageType::Signal)
            .interface(DBUS_PROPERTIES_INTERFACE)?
            .member("PropertiesChanged")?
            .path_namespace(SYSTEMD_UNIT_PATH_NAMESPACE)?
            .arg(0, SYSTEMD_UNIT_INTERFACE)?
            .build())
    }
}

#[async_trait]
impl UnitBus for SystemdBus {
    async fn subscribe(&mut self) -> Result<(), BusError> {
        let subscribe_err = |e: zbus::Error| BusError::Subscribe(e.to_string());

        let manager = Proxy::new(
            &self.connection,
            SYSTEMD_DESTINATION,
            SYSTEMD_MANAGER_PATH,
            SYSTEMD_MANAGER_INTERFACE,
        )
        .await
        .map_err(subscribe_err)?;

        // Without Subscribe the manager only emits signals other clients asked for
        manager
            .call_method("Subscribe", &())
            .await
            .map_err(subscribe_err)?;

        let rule = Self::unit_signal_rule().map_err(subscribe_err)?;
        let stream =
            MessageStream::for_match_rule(rule, &self.connection, Some(self.queue_capacity))
                .await
                .map_err(subscribe_err)?;

        tracing::debug!("Subscribed to systemd unit property changes");
        self.stream = Some(stream);
        Ok(())
    }

    fn set_subscriber(
        &mut self,
        updates: mpsc::Sender<ChangeNotification>,
        errors: mpsc::Sender<BusError>,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut stream = self.stream.take().ok_or(BusError::NotSubscribed)?;

        Ok(tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let delivered = match item {
                    Ok(msg) => match decode_properties_changed(&msg) {
                        Ok(Some(notification)) => updates.send(notification).await.is_ok(),
                        Ok(None) => true,
                        Err(e) => errors.send(e).await.is_ok(),
                    },
                    Err(e) => errors.send(BusError::Signal(e.to_string())).await.is_ok(),
                };

                if !delivered {
                    tracing::debug!("Dispatch loop closed its channels, stopping bus forwarder");
                    return;
                }
            }
            tracing::warn!("systemd signal stream ended");
        }))
    }
}

fn decode_properties_changed(msg: &Message) -> Result<Option<ChangeNotification>, BusError> {
    let header = msg.header();
    let path = header
        .path()
        .ok_or_else(|| BusError::Decode("signal without object path".to_string()))?;

    let (interface, changed, _invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
        msg.body()
            .deserialize()
            .map_err(|e| BusError::Decode(format!("{}: {}", path.as_str(), e)))?;

    if interface != SYSTEMD_UNIT_INTERFACE {
        return Ok(None);
    }

    let unit_name = unit_name_from_path(path.as_str());
    if unit_name.is_empty() {
        return Err(BusError::Decode(format!(
            "no unit name in object path {}",
            path.as_str()
        )));
    }

    let mut notification = ChangeNotification::new(unit_name);
    for (name, value) in &changed {
        apply_property(&mut notification, name, value);
    }
    Ok(Some(notification))
}

fn apply_property(notification: &mut ChangeNotification, name: &str, value: &Value<'_>) {
    if name == PROP_STATE_CHANGE_TIMESTAMP
        && let Value::U64(usec) = value
    {
        notification.event_time = usec_to_datetime(*usec);
    }
    notification
        .changed_properties
        .insert(name.to_string(), PropertyValue::new(render_value(value)));
}

/// Render a bus value the way it is stored: strings double-quoted, numbers
/// and booleans as plain text. Containers use the zvariant text format.
pub fn render_value(value: &Value<'_>) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s.as_str()),
        Value::Value(inner) => render_value(inner),
        Value::Bool(b) => b.to_string(),
        Value::U8(n) => n.to_string(),
        Value::I16(n) => n.to_string(),
        Value::U16(n) => n.to_string(),
        Value::I32(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        Value::F64(n) => n.to_string(),
        other => other.to_string(),
    }
}
