//! Alarm data model: severity, state, per-occurrence record, and the
//! catalog entry each occurrence is raised against.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Process-wide disambiguator appended to `alarm_id`. `timestamp_millis()`
/// alone collides whenever the same code is raised twice inside one
/// millisecond (easily hit in a tight retry/recurrence loop), which would
/// make the later occurrence silently overwrite the earlier one in the
/// engine's alarm map.
static ALARM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Three-level severity. Lower ordinal is more severe:
/// `CRITICAL < WARNING < INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum AlarmSeverity {
    Critical = 0,
    Warning = 1,
    Info = 2,
}

// Deserialize by hand rather than deriving: an unrecognized severity
// string in the config file defaults to INFO rather than failing the
// load, matching the parser this was ported from.
impl<'de> Deserialize<'de> for AlarmSeverity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("AlarmSeverity::from_str is infallible"))
    }
}

impl AlarmSeverity {
    /// Promote one step toward CRITICAL: INFO -> WARNING -> CRITICAL,
    /// CRITICAL stays CRITICAL.
    pub fn escalate_one_step(self) -> Self {
        match self {
            AlarmSeverity::Info => AlarmSeverity::Warning,
            AlarmSeverity::Warning => AlarmSeverity::Critical,
            AlarmSeverity::Critical => AlarmSeverity::Critical,
        }
    }

    pub fn requires_immediate_action(self) -> bool {
        self == AlarmSeverity::Critical
    }
}

impl std::str::FromStr for AlarmSeverity {
    type Err = std::convert::Infallible;

    /// Unknown strings default to `INFO`, matching the donor parser's
    /// behavior rather than rejecting the config.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CRITICAL" => AlarmSeverity::Critical,
            "WARNING" => AlarmSeverity::Warning,
            _ => AlarmSeverity::Info,
        })
    }
}

/// Alarm lifecycle state. Acknowledgement is optional; resolution is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmState {
    Active,
    Acknowledged,
    Resolved,
}

impl AlarmState {
    /// "Active" for every statistics and query purpose means "not yet
    /// resolved" (§8's testable property), not the donor's narrower
    /// `state == ACTIVE` check. See DESIGN.md open question 4.
    pub fn is_active_set_member(self) -> bool {
        self != AlarmState::Resolved
    }
}

/// A configured alarm type, loaded from the alarm configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlarmConfig {
    pub code: String,
    pub name: String,
    pub severity: AlarmSeverity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default = "default_recurrence_window")]
    pub recurrence_window_secs: u64,
    #[serde(default = "default_recurrence_threshold")]
    pub recurrence_threshold: u32,
    #[serde(default)]
    pub auto_reset: bool,
}

fn default_recurrence_window() -> u64 {
    60
}

fn default_recurrence_threshold() -> u32 {
    3
}

/// A single alarm occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_id: String,
    pub code: String,
    pub name: String,
    pub severity: AlarmSeverity,
    pub state: AlarmState,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
    pub source: String,
    pub recurrence_count: u32,
    pub last_recurrence: Option<DateTime<Utc>>,
    pub acknowledged_time: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_time: Option<DateTime<Utc>>,
}

impl Alarm {
    pub fn new(code: &str, name: &str, severity: AlarmSeverity, source: &str) -> Self {
        let timestamp = Utc::now();
        let sequence = ALARM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let alarm_id = format!("{}_{}_{}", code, timestamp.timestamp_millis(), sequence);
        Self {
            alarm_id,
            code: code.to_string(),
            name: name.to_string(),
            severity,
            state: AlarmState::Active,
            timestamp,
            details: None,
            source: source.to_string(),
            recurrence_count: 1,
            last_recurrence: None,
            acknowledged_time: None,
            acknowledged_by: None,
            resolved_time: None,
        }
    }

    pub fn is_active_set_member(&self) -> bool {
        self.state.is_active_set_member()
    }
}
