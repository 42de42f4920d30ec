use codepad_system::{
    ConnectionId, Language, Participant, Participants, RunRecord, SessionId, SessionSnapshot,
    Timestamp, UNKNOWN_AUTHOR,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub language: Language,
    pub code: String,
    pub participants: Participants,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunRecord>,
}

impl Session {
    pub fn new(id: SessionId, language: Language, created_at: Timestamp) -> Self {
        Self {
            id,
            language,
            code: language.starter_template().to_owned(),
            participants: Participants::new(),
            created_at,
            last_run: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            code: self.code.clone(),
            language: self.language,
            participants: self.participants.clone(),
            last_run: self.last_run.clone(),
        }
    }

    pub fn participant(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    /// Display name for events caused by `connection_id`.
    pub fn author(&self, connection_id: &ConnectionId) -> String {
        self.participant(connection_id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned())
    }
}

pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
