use crate::session::Session;
use codepad_system::SessionId;
use tokio::sync::oneshot::Sender;

/// Requests from the HTTP handlers, answered through the oneshot `tx`.
#[derive(Debug)]
pub enum TransportCommand {
    CreateSession {
        language: Option<String>,
        tx: Sender<Session>,
    },
    GetSession {
        session_id: SessionId,
        tx: Sender<Option<Session>>,
    },
    DeleteSession {
        session_id: SessionId,
        tx: Sender<bool>,
    },
    CountSessions {
        tx: Sender<usize>,
    },
}
