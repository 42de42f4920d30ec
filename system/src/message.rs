use crate::{ConnectionId, Cursor, Language, RunStatus, SessionId, SessionSnapshot, Timestamp};
use serde::{Deserialize, Serialize};

/// Inbound frame of the live protocol: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "session:join")]
    Join(JoinPayload),
    #[serde(rename = "session:leave")]
    Leave(SessionRef),
    #[serde(rename = "editor:update")]
    EditorUpdate(EditorUpdatePayload),
    #[serde(rename = "language:update")]
    LanguageUpdate(LanguageUpdatePayload),
    #[serde(rename = "cursor:update")]
    CursorUpdate(CursorUpdatePayload),
    #[serde(rename = "run:result")]
    RunResult(RunResultPayload),
    #[serde(rename = "run:request")]
    RunRequest(SessionRef),
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Join(p) => &p.session_id,
            Self::Leave(p) | Self::RunRequest(p) => &p.session_id,
            Self::EditorUpdate(p) => &p.session_id,
            Self::LanguageUpdate(p) => &p.session_id,
            Self::CursorUpdate(p) => &p.session_id,
            Self::RunResult(p) => &p.session_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join(_) => "session:join",
            Self::Leave(_) => "session:leave",
            Self::EditorUpdate(_) => "editor:update",
            Self::LanguageUpdate(_) => "language:update",
            Self::CursorUpdate(_) => "cursor:update",
            Self::RunResult(_) => "run:result",
            Self::RunRequest(_) => "run:request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub session_id: SessionId,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorUpdatePayload {
    pub session_id: SessionId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageUpdatePayload {
    pub session_id: SessionId,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdatePayload {
    pub session_id: SessionId,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResultPayload {
    pub session_id: SessionId,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Outbound frame of the live protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "session:init")]
    SessionInit(SessionSnapshot),
    #[serde(rename = "session:error")]
    SessionError(SessionErrorEvent),
    #[serde(rename = "session:left")]
    SessionLeft(SessionRef),
    #[serde(rename = "presence:join")]
    PresenceJoined(PresenceJoinedEvent),
    #[serde(rename = "presence:left")]
    PresenceLeft(PresenceLeftEvent),
    #[serde(rename = "editor:update")]
    EditorUpdated(EditorUpdatedEvent),
    #[serde(rename = "language:update")]
    LanguageUpdated(LanguageUpdatedEvent),
    #[serde(rename = "cursor:update")]
    CursorUpdated(CursorUpdatedEvent),
    #[serde(rename = "run:started")]
    RunStarted(RunStartedEvent),
    #[serde(rename = "run:result")]
    RunResult(RunResultEvent),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::SessionError(SessionErrorEvent {
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionInit(_) => "session:init",
            Self::SessionError(_) => "session:error",
            Self::SessionLeft(_) => "session:left",
            Self::PresenceJoined(_) => "presence:join",
            Self::PresenceLeft(_) => "presence:left",
            Self::EditorUpdated(_) => "editor:update",
            Self::LanguageUpdated(_) => "language:update",
            Self::CursorUpdated(_) => "cursor:update",
            Self::RunStarted(_) => "run:started",
            Self::RunResult(_) => "run:result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceJoinedEvent {
    pub id: ConnectionId,
    pub username: String,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceLeftEvent {
    pub id: ConnectionId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorUpdatedEvent {
    pub code: String,
    pub author: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageUpdatedEvent {
    pub language: Language,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdatedEvent {
    pub cursor: Cursor,
    pub user_id: ConnectionId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedEvent {
    pub author: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResultEvent {
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    pub author: String,
    pub timestamp: Timestamp,
}
