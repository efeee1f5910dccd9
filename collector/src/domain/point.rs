//! Change notification -> metric point

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use super::error::PipelineError;
use super::state::classify;
use super::types::{ChangeNotification, FieldValue, MetricPoint};
use crate::core::constants::{
    FIELD_STATE, FIELD_VALUE, MEASUREMENT_SERVICES, PROP_ACTIVE_STATE, TAG_SERVICE,
};

/// Build the `services` point for a notification.
///
/// Returns `Ok(None)` when the notification does not touch `ActiveState`.
/// The stored `state` field keeps the value exactly as delivered; `now` is
/// truncated to whole milliseconds.
pub fn build_point(
    notification: &ChangeNotification,
    now: DateTime<Utc>,
) -> Result<Option<MetricPoint>, PipelineError> {
    let Some(raw_state) = notification.changed_properties.get(PROP_ACTIVE_STATE) else {
        return Ok(None);
    };

    let state = classify(raw_state.as_str())?;

    let mut tags = BTreeMap::new();
    tags.insert(TAG_SERVICE.to_string(), notification.unit_name.clone());

    let mut fields = BTreeMap::new();
    fields.insert(
        FIELD_STATE.to_string(),
        FieldValue::String(raw_state.as_str().to_string()),
    );
    fields.insert(FIELD_VALUE.to_string(), FieldValue::Integer(state.ordinal()));

    Ok(Some(MetricPoint {
        measurement: MEASUREMENT_SERVICES.to_string(),
        tags,
        fields,
        timestamp: truncate_millis(now),
    }))
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(ts)
}
