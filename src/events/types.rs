//! File-operation event definitions.
//!
//! [`OperationEvent`] is the immutable fact recorded for every tracked file action.
//! [`EventInput`] is the loose shape delivered by clients; [`EventInput::validate`]
//! turns it into an event or rejects it as [`Error::InvalidEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// UUID v7 (time-sortable) identifier assigned at record time.
pub type EventId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Read,
    Write,
    Delete,
    Rename,
    Move,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        Self::Create,
        Self::Read,
        Self::Write,
        Self::Delete,
        Self::Rename,
        Self::Move,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Move => "move",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    /// Accepts the canonical names plus the desktop client's vocabulary
    /// (`open`, `save`, `modify`, `copy`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "copy" => Ok(Self::Create),
            "read" | "open" => Ok(Self::Read),
            "write" | "save" | "modify" => Ok(Self::Write),
            "delete" => Ok(Self::Delete),
            "rename" => Ok(Self::Rename),
            "move" => Ok(Self::Move),
            _ => Err(format!("unknown operation kind: {s}")),
        }
    }
}

/// The pairing scope for mining: events only co-occur within the same stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "id")]
pub enum Stream {
    Session(String),
    /// Events without a session, grouped by device.
    Device(String),
    /// Events with neither a session nor a device.
    Global,
}

/// An immutable record of one file operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// When the operation happened, at millisecond precision.
    pub timestamp: DateTime<Utc>,
    pub operation_kind: OperationKind,
    pub file_path: String,
    pub file_name: String,
    /// Lowercased, without the leading dot.
    pub extension: Option<String>,
    pub size: Option<u64>,
    pub directory_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
}

impl OperationEvent {
    /// Build an event with name, extension, and directory derived from the path.
    pub fn new(operation_kind: OperationKind, file_path: &str, timestamp: DateTime<Utc>) -> Self {
        let (file_name, extension, directory_path) = split_path(file_path);
        Self {
            timestamp: truncate_to_millis(timestamp),
            operation_kind,
            file_path: file_path.to_string(),
            file_name,
            extension,
            size: None,
            directory_path,
            context: BTreeMap::new(),
            session_id: None,
            device_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn stream(&self) -> Stream {
        match (&self.session_id, &self.device_id) {
            (Some(session), _) => Stream::Session(session.clone()),
            (None, Some(device)) => Stream::Device(device.clone()),
            (None, None) => Stream::Global,
        }
    }

    /// True when any path component is a dotfile / dot-directory.
    pub fn is_hidden(&self) -> bool {
        is_hidden_path(&self.file_path)
    }

    /// Identity used for at-least-once deduplication.
    pub fn dedup_key(&self) -> (i64, String, OperationKind) {
        (
            self.timestamp.timestamp_millis(),
            self.file_path.clone(),
            self.operation_kind,
        )
    }
}

/// A recorded event with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: EventId,
    /// Insertion order, used to break timestamp ties.
    pub seq: i64,
    #[serde(flatten)]
    pub event: OperationEvent,
}

/// Outcome of [`EventStore::record`](super::EventStore::record).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recorded {
    pub id: EventId,
    pub seq: i64,
    /// `true` if an event with the same (timestamp, path, kind) was already stored.
    pub duplicate: bool,
}

/// Loosely-typed ingestion record as delivered by watchers and clients.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventInput {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "operation_type")]
    pub operation_kind: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    #[serde(alias = "file_extension")]
    pub extension: Option<String>,
    #[serde(alias = "file_size")]
    pub size: Option<u64>,
    pub directory_path: Option<String>,
    pub context: Option<BTreeMap<String, serde_json::Value>>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
}

impl EventInput {
    /// Check required fields and fill derivable ones. `now` stamps events without a timestamp.
    pub fn validate(self, now: DateTime<Utc>) -> Result<OperationEvent> {
        let file_path = self
            .file_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidEvent("file_path is required".into()))?;

        let operation_kind = self
            .operation_kind
            .ok_or_else(|| Error::InvalidEvent("operation_kind is required".into()))?
            .parse::<OperationKind>()
            .map_err(Error::InvalidEvent)?;

        let (derived_name, derived_ext, derived_dir) = split_path(&file_path);

        Ok(OperationEvent {
            timestamp: truncate_to_millis(self.timestamp.unwrap_or(now)),
            operation_kind,
            file_name: non_empty(self.file_name).unwrap_or(derived_name),
            extension: non_empty(self.extension)
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .or(derived_ext),
            size: self.size,
            directory_path: non_empty(self.directory_path).unwrap_or(derived_dir),
            context: self.context.unwrap_or_default(),
            session_id: non_empty(self.session_id),
            device_id: non_empty(self.device_id),
            file_path,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Split a path into (file name, lowercased extension, parent directory).
pub fn split_path(file_path: &str) -> (String, Option<String>, String) {
    let path = Path::new(file_path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let directory = match path.parent().map(|p| p.to_string_lossy().into_owned()) {
        Some(dir) if !dir.is_empty() => dir,
        _ => ".".to_string(),
    };
    (file_name, extension, directory)
}

pub fn is_hidden_path(file_path: &str) -> bool {
    file_path
        .split(['/', '\\'])
        .any(|c| c.starts_with('.') && c != "." && c != "..")
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn new_derives_name_extension_and_directory() {
        let ev = OperationEvent::new(
            OperationKind::Read,
            "/proj/Report.DOCX",
            at("2026-01-05T10:00:00Z"),
        );
        assert_eq!(ev.file_name, "Report.DOCX");
        assert_eq!(ev.extension.as_deref(), Some("docx"));
        assert_eq!(ev.directory_path, "/proj");
    }

    #[test]
    fn validate_rejects_missing_path() {
        let input = EventInput {
            operation_kind: Some("read".into()),
            file_path: Some("   ".into()),
            ..Default::default()
        };
        let err = input.validate(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
    }

    #[test]
    fn validate_rejects_missing_or_unknown_kind() {
        let missing = EventInput {
            file_path: Some("/a.txt".into()),
            ..Default::default()
        };
        assert!(matches!(
            missing.validate(Utc::now()),
            Err(Error::InvalidEvent(_))
        ));

        let unknown = EventInput {
            file_path: Some("/a.txt".into()),
            operation_kind: Some("teleport".into()),
            ..Default::default()
        };
        assert!(matches!(
            unknown.validate(Utc::now()),
            Err(Error::InvalidEvent(_))
        ));
    }

    #[test]
    fn validate_accepts_client_vocabulary_and_fills_defaults() {
        let now = at("2026-01-05T10:00:00.987654Z");
        let input: EventInput = serde_json::from_value(serde_json::json!({
            "operation_type": "open",
            "file_path": "/home/u/notes.md",
            "file_extension": ".MD",
            "session_id": "",
        }))
        .unwrap();

        let ev = input.validate(now).unwrap();
        assert_eq!(ev.operation_kind, OperationKind::Read);
        assert_eq!(ev.extension.as_deref(), Some("md"));
        assert_eq!(ev.directory_path, "/home/u");
        assert_eq!(ev.session_id, None);
        assert_eq!(ev.timestamp.timestamp_subsec_micros(), 987_000);
    }

    #[test]
    fn stream_prefers_session_then_device() {
        let t = at("2026-01-05T10:00:00Z");
        let base = OperationEvent::new(OperationKind::Read, "/a", t);
        assert_eq!(base.stream(), Stream::Global);
        assert_eq!(
            base.clone().with_device("laptop").stream(),
            Stream::Device("laptop".into())
        );
        assert_eq!(
            base.with_device("laptop").with_session("s1").stream(),
            Stream::Session("s1".into())
        );
    }

    #[test]
    fn hidden_paths_detected() {
        assert!(is_hidden_path("/home/u/.cache/x.bin"));
        assert!(is_hidden_path("/home/u/.bashrc"));
        assert!(!is_hidden_path("/home/u/../proj/a.rs"));
        assert!(!is_hidden_path("./proj/a.rs"));
    }
}
