// src/event.rs - webhook payloads sent by the recorder

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EventType {
    SessionStarted,
    FileOpening,
    FileClosed,
    SessionEnded,
    StreamStarted,
    StreamEnded,
    #[serde(other)]
    Unknown,
}

/// Envelope of every recorder webhook call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    #[serde(rename = "EventType")]
    pub event_type: EventType,
    #[serde(rename = "EventTimestamp")]
    pub timestamp: String,
    #[serde(rename = "EventId", default)]
    pub id: String,
    #[serde(rename = "EventData", default)]
    pub data: serde_json::Value,
}

impl Event {
    pub fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    /// RFC 3339 timestamp with up to 7 fractional digits.
    pub fn time(&self) -> chrono::ParseResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp).map(|t| t.with_timezone(&Utc))
    }

    pub fn data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// Room and stream details shared by every event payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomData {
    #[serde(rename = "RoomId")]
    pub room_id: u64,
    #[serde(rename = "ShortId", default)]
    pub short_id: u64,
    #[serde(rename = "Name", default)]
    pub streamer_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub area_name_parent: String,
    #[serde(default)]
    pub area_name_child: String,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub danmaku_connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SessionData {
    #[serde(rename = "SessionId", default)]
    pub session_id: String,
    #[serde(flatten)]
    pub room: RoomData,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileOpenData {
    pub relative_path: String,
    #[serde(default)]
    pub file_open_time: String,
    #[serde(rename = "SessionId", default)]
    pub session_id: String,
    #[serde(flatten)]
    pub room: RoomData,
}

impl FileOpenData {
    /// Directory levels between the recording root and the new file.
    pub fn traverse_depth(&self) -> usize {
        self.relative_path
            .trim_start_matches(std::path::MAIN_SEPARATOR)
            .matches(std::path::MAIN_SEPARATOR)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileCloseData {
    pub relative_path: String,
    #[serde(default)]
    pub file_size: u64,
    /// Recording length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub file_open_time: String,
    #[serde(default)]
    pub file_close_time: String,
    #[serde(rename = "SessionId", default)]
    pub session_id: String,
    #[serde(flatten)]
    pub room: RoomData,
}

impl FileCloseData {
    pub fn file_name(&self) -> &str {
        Path::new(&self.relative_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.relative_path)
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration).unwrap_or_default()
    }
}
