//! Unit lifecycle state classification
//!
//! Maps the `ActiveState` strings systemd emits to the integer ordinals stored
//! in the `value` field. The numbering is not contiguous (there is no 3) and
//! dashboards read the literal values, so it must stay as is.

use std::fmt;
use std::str::FromStr;

use super::error::PipelineError;

/// Known unit lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveState {
    Failed,
    Inactive,
    Active,
    Reloading,
    Activating,
    Deactivating,
}

impl ActiveState {
    pub const ALL: [ActiveState; 6] = [
        Self::Failed,
        Self::Inactive,
        Self::Active,
        Self::Reloading,
        Self::Activating,
        Self::Deactivating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Reloading => "reloading",
            Self::Activating => "activating",
            Self::Deactivating => "deactivating",
        }
    }

    /// Severity ordinal written to the store
    pub fn ordinal(&self) -> i64 {
        match self {
            Self::Failed => -1,
            Self::Inactive => 0,
            Self::Active => 1,
            Self::Reloading => 2,
            Self::Activating => 4,
            Self::Deactivating => 5,
        }
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveState {
    type Err = PipelineError;

    /// Parse a state name as delivered by the bus.
    ///
    /// String properties arrive rendered with their surrounding double quotes
    /// (`"active"`); exactly one such pair is removed before matching.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = strip_quotes(s);
        match name {
            "failed" => Ok(Self::Failed),
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            "reloading" => Ok(Self::Reloading),
            "activating" => Ok(Self::Activating),
            "deactivating" => Ok(Self::Deactivating),
            _ => Err(PipelineError::UnrecognizedState(s.to_string())),
        }
    }
}

/// Classify a raw state string into its lifecycle state.
pub fn classify(state_name: &str) -> Result<ActiveState, PipelineError> {
    state_name.parse()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}
