use crate::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ConnectionId = u32;
pub type SessionId = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const DEFAULT_USERNAME: &str = "Guest";
pub const UNKNOWN_AUTHOR: &str = "Unknown";
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Session ids travel in URLs, so only a conservative alphabet is accepted.
pub fn is_well_formed_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn normalize_username(username: Option<&str>) -> String {
    match username.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => DEFAULT_USERNAME.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub username: String,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(username: Option<&str>, joined_at: Timestamp) -> Self {
        Self {
            username: normalize_username(username),
            joined_at,
        }
    }
}

/// Editor caret position, 1-based like the browser editor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub line_number: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Completed,
    Unavailable,
    TranslationError,
    SyntaxError,
    RuntimeError,
    StepLimitExceeded,
    TimedOut,
    Cancelled,
    SandboxError,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Last run shown to a session. Transient: replaced by every new result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    pub author: String,
    pub timestamp: Timestamp,
}

pub type Participants = BTreeMap<ConnectionId, Participant>;

/// Everything a joining participant needs to render the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub code: String,
    pub language: Language,
    pub participants: Participants,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_defaults_blank_usernames() {
        assert_eq!(normalize_username(None), DEFAULT_USERNAME);
        assert_eq!(normalize_username(Some("   ")), DEFAULT_USERNAME);
        assert_eq!(normalize_username(Some("  Host ")), "Host");
    }

    #[test]
    fn it_validates_session_ids() {
        assert!(is_well_formed_session_id("3f2a9c1b"));
        assert!(is_well_formed_session_id("room_1-a"));
        assert!(!is_well_formed_session_id(""));
        assert!(!is_well_formed_session_id("../etc"));
        assert!(!is_well_formed_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)));
    }

    #[test]
    fn snapshot_keys_participants_by_connection() {
        let mut participants = Participants::new();
        participants.insert(7, Participant::new(Some("Host"), 1_000));
        let snapshot = SessionSnapshot {
            id: "abc".into(),
            code: "print(1)".into(),
            language: Language::Python,
            participants,
            last_run: None,
        };
        let value = serde_json::to_value(&snapshot).expect("");
        assert_eq!(value["participants"]["7"]["username"], "Host");
        assert_eq!(value["participants"]["7"]["joinedAt"], 1_000);
        assert!(value.get("lastRun").is_none());
    }
}
