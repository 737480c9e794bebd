//! Frames written to sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frame type used for command results and errors.
pub const TYPE_RESP: &str = "resp";
/// State reported for successful results.
pub const STATE_SUCCESS: &str = "success";
/// State reported for failures.
pub const STATE_ERROR: &str = "error";

/// Notification written to every session of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Outcome state.
    pub state: String,
    /// Content hash the notification refers to, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infohash: Option<String>,
    /// Human-readable message.
    pub msg: String,
}

impl Notification {
    /// Notification without a content hash.
    #[must_use]
    pub fn new(kind: impl Into<String>, state: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            state: state.into(),
            infohash: None,
            msg: msg.into(),
        }
    }

    /// Notification about one transfer.
    #[must_use]
    pub fn with_hash(
        kind: impl Into<String>,
        state: impl Into<String>,
        infohash: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            infohash: Some(infohash.into()),
            ..Self::new(kind, state, msg)
        }
    }

    /// `{"type":"resp","state":"error"}` frame.
    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(TYPE_RESP, STATE_ERROR, msg)
    }

    /// `{"type":"resp","state":"success"}` frame.
    #[must_use]
    pub fn success(msg: impl Into<String>) -> Self {
        Self::new(TYPE_RESP, STATE_SUCCESS, msg)
    }
}

/// Typed data frame, `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMsg<T> {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload.
    pub data: T,
}

impl<T> DataMsg<T> {
    /// Wrap `data` under frame type `kind`.
    pub fn new(kind: impl Into<String>, data: T) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// One entry of the admin connection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConnMsg {
    /// Owner of the session.
    pub username: String,
    /// Session token.
    pub token: String,
    /// Whether the session carries admin rights.
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    /// When the session was established.
    pub time: DateTime<Utc>,
    /// Peer address of the connection.
    #[serde(rename = "remoteAddr")]
    pub remote_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_omits_missing_hash() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(Notification::error("torrent not found"))?;
        assert_eq!(
            value,
            json!({"type": "resp", "state": "error", "msg": "torrent not found"})
        );

        let value = serde_json::to_value(Notification::with_hash(
            "torrentstream",
            "added",
            "ab12",
            "Torrent Spec Added",
        ))?;
        assert_eq!(value["infohash"], "ab12");
        assert_eq!(value["type"], "torrentstream");
        Ok(())
    }

    #[test]
    fn user_conn_uses_camel_case_fields() -> Result<(), serde_json::Error> {
        let entry = UserConnMsg {
            username: "alice".into(),
            token: "t1".into(),
            is_admin: true,
            time: DateTime::<Utc>::UNIX_EPOCH,
            remote_addr: "10.0.0.1:5000".into(),
        };
        let value = serde_json::to_value(DataMsg::new("userconn", vec![entry]))?;
        assert_eq!(value["type"], "userconn");
        assert_eq!(value["data"][0]["isAdmin"], true);
        assert_eq!(value["data"][0]["remoteAddr"], "10.0.0.1:5000");
        Ok(())
    }
}
