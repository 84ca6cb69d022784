// src/event.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a path under the served root.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    DirectoryCreated,
    DirectoryRemoved,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
            ChangeKind::DirectoryCreated => "directory-created",
            ChangeKind::DirectoryRemoved => "directory-removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filesystem change, produced by the watcher and consumed by the viewer hub.
///
/// `path` is relative to the served root in canonical form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// The JSON message pushed to a browser tab over the live-reload channel.
///
/// Serializes as `{"type":"update","event":"modified","path":"guide/intro.md"}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    Update { event: ChangeKind, path: String },
}

impl From<&ChangeEvent> for ReloadMessage {
    fn from(event: &ChangeEvent) -> Self {
        ReloadMessage::Update {
            event: event.kind,
            path: event.path.clone(),
        }
    }
}
