//! Pipeline data model
//!
//! `ChangeNotification` comes in from the bus, `MetricPoint` and `Batch` go
//! out to the store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::constants::{DEFAULT_DATABASE, DEFAULT_RETENTION_POLICY};

// ============================================================================
// Inbound
// ============================================================================

/// Textual rendering of a bus property value, exactly as delivered.
///
/// String values keep their surrounding double quotes (`"active"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue(String);

impl PropertyValue {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self(rendered.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One property-change signal for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub unit_name: String,
    pub changed_properties: HashMap<String, PropertyValue>,
    /// Transition time reported by the service manager, if any
    pub event_time: Option<DateTime<Utc>>,
}

impl ChangeNotification {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            changed_properties: HashMap::new(),
            event_time: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.changed_properties.insert(name.into(), value);
        self
    }

    pub fn with_event_time(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = Some(event_time);
        self
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Field value of a metric point
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
}

/// Normalized metric record, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

/// Timestamp resolution accepted by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "u")]
    Microseconds,
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Express a timestamp as an integer in this precision
    pub fn timestamp(&self, ts: &DateTime<Utc>) -> i64 {
        match self {
            // Out of range past year 2262; fall back to scaled micros
            Self::Nanoseconds => ts
                .timestamp_nanos_opt()
                .unwrap_or_else(|| ts.timestamp_micros().saturating_mul(1000)),
            Self::Microseconds => ts.timestamp_micros(),
            Self::Milliseconds => ts.timestamp_millis(),
            Self::Seconds => ts.timestamp(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of replicas that must acknowledge a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    #[default]
    Any,
    One,
    Quorum,
    All,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a batch is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub database: String,
    pub retention_policy: String,
    pub precision: Precision,
    pub consistency: Consistency,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            precision: Precision::Milliseconds,
            consistency: Consistency::Any,
        }
    }
}

/// One submission to the store
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub points: Vec<MetricPoint>,
    pub destination: Destination,
}

impl Batch {
    pub fn new(destination: Destination) -> Self {
        Self {
            points: Vec::new(),
            destination,
        }
    }

    pub fn single(point: MetricPoint, destination: Destination) -> Self {
        Self {
            points: vec![point],
            destination,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
