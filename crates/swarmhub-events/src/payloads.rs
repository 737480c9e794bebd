//! Event payload types carried to the external bus.

use serde::{Deserialize, Serialize};

/// Fixed topic every lifecycle event is published to.
pub const DEFAULT_TOPIC: &str = "torrent";

/// Closed set of lifecycle transitions surfaced to external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A transfer spec was registered with the engine.
    Added,
    /// Transfer metadata became available.
    Loaded,
    /// The transfer started downloading or seeding.
    Started,
    /// The transfer was stopped.
    Stopped,
    /// The transfer was removed, keeping its data.
    Removed,
    /// The transfer was removed together with its data.
    Deleted,
    /// All pieces of the transfer are present locally.
    Completed,
}

impl EventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Added,
        Self::Loaded,
        Self::Started,
        Self::Stopped,
        Self::Removed,
        Self::Deleted,
        Self::Completed,
    ];

    /// Wire name used in the `eventType` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Loaded => "loaded",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
            Self::Deleted => "deleted",
            Self::Completed => "completed",
        }
    }

    /// Human-readable result label shown to users for this transition.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Added => "Torrent Spec Added",
            Self::Loaded => "Torrent is Loaded",
            Self::Started => "Torrent Started",
            Self::Stopped => "Torrent Stopped",
            Self::Removed => "Torrent Removed",
            Self::Deleted => "Torrent Deleted",
            Self::Completed => "Torrent Completed",
        }
    }

    /// Classify a result label; anything outside the lifecycle vocabulary yields `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload published to the bus for one lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Hex-encoded content hash of the transfer.
    pub hash: String,
    /// Transition that occurred.
    #[serde(rename = "eventType")]
    pub event_type: EventKind,
}

impl BusEvent {
    /// Build an event for the given hash and kind.
    #[must_use]
    pub fn new(hash: impl Into<String>, event_type: EventKind) -> Self {
        Self {
            hash: hash.into(),
            event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_classify_into_kinds() {
        assert_eq!(
            EventKind::from_label("Torrent Spec Added"),
            Some(EventKind::Added)
        );
        assert_eq!(
            EventKind::from_label("Torrent is Loaded"),
            Some(EventKind::Loaded)
        );
        assert_eq!(
            EventKind::from_label("Torrent Completed"),
            Some(EventKind::Completed)
        );
        assert_eq!(
            EventKind::from_label("Torrent Deleted"),
            Some(EventKind::Deleted)
        );
        assert_eq!(EventKind::from_label("torrent completed"), None);
        assert_eq!(EventKind::from_label("Torrent Spec Removed"), None);
        assert_eq!(EventKind::from_label(""), None);
    }

    #[test]
    fn every_kind_round_trips_through_its_label() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn bus_event_uses_wire_field_names() -> Result<(), serde_json::Error> {
        let event = BusEvent::new("abcd", EventKind::Completed);
        let value = serde_json::to_value(&event)?;
        assert_eq!(value, json!({"hash": "abcd", "eventType": "completed"}));
        Ok(())
    }
}
