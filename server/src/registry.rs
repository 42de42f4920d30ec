use crate::session::{now_millis, Session};
use codepad_system::{Language, Participants, RunRecord, SessionId};
use std::collections::HashMap;
use uuid::Uuid;

const SESSION_ID_LEN: usize = 8;

/// Fields to overwrite on a session. `None` leaves the field untouched.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub language: Option<Language>,
    pub code: Option<String>,
    pub participants: Option<Participants>,
    pub last_run: Option<RunRecord>,
}

/// Every live session, owned by the server task.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown or missing languages fall back to javascript.
    pub fn create(&mut self, language: Option<&str>) -> &Session {
        let language = Language::parse_or_default(language);
        let id = self.fresh_id();
        log::info!("Session {} created ({})", id, language);
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id, language, now_millis()))
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Shallow merge into an existing session; never creates one.
    pub fn update(&mut self, id: &str, update: SessionUpdate) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;
        if let Some(language) = update.language {
            session.language = language;
        }
        if let Some(code) = update.code {
            session.code = code;
        }
        if let Some(participants) = update.participants {
            session.participants = participants;
        }
        if let Some(last_run) = update.last_run {
            session.last_run = Some(last_run);
        }
        Some(session)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            log::info!("Session {} deleted", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn fresh_id(&self) -> SessionId {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(SESSION_ID_LEN);
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepad_system::{is_well_formed_session_id, Participant};

    #[test]
    fn it_creates_sessions_from_templates() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(Some("python")).clone();
        assert_eq!(session.language, Language::Python);
        assert_eq!(session.code, Language::Python.starter_template());
        assert!(session.participants.is_empty());
        assert_eq!(session.id.len(), 8);
        assert!(session.id.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(is_well_formed_session_id(&session.id));
        assert_eq!(registry.get(&session.id), Some(&session));
    }

    #[test]
    fn it_falls_back_to_javascript() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.create(Some("klingon")).language, Language::JavaScript);
        assert_eq!(registry.create(None).language, Language::JavaScript);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ids_are_unique() {
        let mut registry = SessionRegistry::new();
        for _ in 0..500 {
            registry.create(None);
        }
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn update_merges_only_given_fields() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(Some("js")).id.clone();
        let mut participants = Participants::new();
        participants.insert(1, Participant::new(Some("Host"), 0));

        let updated = registry
            .update(
                &id,
                SessionUpdate {
                    code: Some("print(1)".into()),
                    participants: Some(participants.clone()),
                    ..SessionUpdate::default()
                },
            )
            .cloned()
            .expect("session exists");
        assert_eq!(updated.code, "print(1)");
        assert_eq!(updated.language, Language::JavaScript);
        assert_eq!(updated.participants, participants);

        let untouched = registry
            .update(&id, SessionUpdate::default())
            .cloned()
            .expect("session exists");
        assert_eq!(untouched, updated);
    }

    #[test]
    fn update_never_creates() {
        let mut registry = SessionRegistry::new();
        let update = SessionUpdate {
            code: Some("x".into()),
            ..SessionUpdate::default()
        };
        assert!(registry.update("missing", update).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None).id.clone();
        assert!(registry.delete(&id));
        assert!(!registry.delete(&id));
        assert!(registry.get(&id).is_none());
    }
}
