//! Bag message framing: one JSON-lines record per logged sample.

use serde::{Deserialize, Serialize};

/// Kind of data a [`BagMessage`] carries, mirrored from the data store's
/// own classification so replay tooling can special-case high-frequency
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    RobotMode,
    InterfaceData,
    Config,
    Para,
    Alarm,
    Event,
    MissionState,
    TaskState,
}

/// A single logged sample. Serialized to one JSON-lines record:
/// `{"timestamp":..,"topic":..,"type":..,"value":..}\n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BagMessage {
    pub timestamp_ns: i64,
    pub topic: String,
    pub data_type: DataType,
    /// Pre-serialized JSON text for `value`. Kept as a string (rather
    /// than a nested `Value`) so the writer never re-parses what the
    /// producer already serialized.
    pub serialized_value: String,
}

#[derive(Serialize, Deserialize)]
struct WireRecord<'a> {
    timestamp: i64,
    topic: &'a str,
    #[serde(rename = "type")]
    data_type: DataType,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct WireRecordOwned {
    timestamp: i64,
    topic: String,
    #[serde(rename = "type")]
    data_type: DataType,
    value: serde_json::Value,
}

impl BagMessage {
    pub fn new(
        timestamp_ns: i64,
        topic: impl Into<String>,
        data_type: DataType,
        serialized_value: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ns,
            topic: topic.into(),
            data_type,
            serialized_value: serialized_value.into(),
        }
    }

    /// `timestamp_ns > 0`, non-empty topic no longer than 256 bytes,
    /// non-empty value.
    pub fn is_valid(&self) -> bool {
        self.timestamp_ns > 0
            && !self.topic.is_empty()
            && self.topic.len() <= 256
            && !self.serialized_value.is_empty()
    }

    /// Render as one JSON-lines record, including the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(&self.serialized_value)?;
        let record = WireRecord {
            timestamp: self.timestamp_ns,
            topic: &self.topic,
            data_type: self.data_type,
            value,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one JSON-lines record. Accepts the line with or without a
    /// trailing `\n`/`\r\n`.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let record: WireRecordOwned = serde_json::from_str(trimmed)?;
        Ok(Self {
            timestamp_ns: record.timestamp,
            topic: record.topic,
            data_type: record.data_type,
            serialized_value: record.value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json_line() {
        let msg = BagMessage::new(1_700_000_000_000_000_000, "mission_state", DataType::MissionState, r#"{"stage":"pick"}"#);
        let line = msg.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        let back = BagMessage::from_json_line(&line).unwrap();
        assert_eq!(back.timestamp_ns, msg.timestamp_ns);
        assert_eq!(back.topic, msg.topic);
        assert_eq!(back.data_type, DataType::MissionState);
    }

    #[test]
    fn rejects_empty_topic_and_zero_timestamp() {
        let a = BagMessage::new(0, "x", DataType::Event, "1");
        assert!(!a.is_valid());
        let b = BagMessage::new(1, "", DataType::Event, "1");
        assert!(!b.is_valid());
        let c = BagMessage::new(1, "x", DataType::Event, "");
        assert!(!c.is_valid());
    }

    #[test]
    fn from_json_line_tolerates_crlf() {
        let msg = BagMessage::new(42, "t", DataType::Alarm, "true");
        let line = msg.to_json_line().unwrap();
        let crlf = line.trim_end_matches('\n').to_string() + "\r\n";
        let back = BagMessage::from_json_line(&crlf).unwrap();
        assert_eq!(back.topic, "t");
    }
}
