use std::collections::HashMap;
use std::sync::Arc;

use codepad_sandbox::{CancellationToken, Dispatcher, ExecutionResult};
use codepad_system::{
    ClientMessage, ConnectionId, CursorUpdatePayload, CursorUpdatedEvent, EditorUpdatePayload,
    EditorUpdatedEvent, JoinPayload, LanguageUpdatePayload, LanguageUpdatedEvent, Participant,
    PresenceJoinedEvent, PresenceLeftEvent, RunRecord, RunResultEvent, RunResultPayload,
    RunStartedEvent, ServerMessage, SessionId, SessionRef,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::registry::SessionUpdate;
use crate::server_state::ServerState;
use crate::session::now_millis;
use crate::transport::TransportCommand;

pub type ServerTx = UnboundedSender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    Connection(ConnectionCommand),
    Transport(TransportCommand),
    RunFinished {
        session_id: SessionId,
        author: String,
        result: ExecutionResult,
    },
}

/// Reported to the offending connection as `session:error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Not joined to session {0}")]
    NotJoined(SessionId),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("A run is already in progress")]
    RunInProgress,
}

struct Server {
    state: ServerState,
    connections: ConnectionTxStorage,
    dispatcher: Arc<Dispatcher>,
    runs: HashMap<SessionId, CancellationToken>,
    srv_tx: ServerTx,
}

impl Server {
    fn new(dispatcher: Arc<Dispatcher>, srv_tx: ServerTx) -> Self {
        Self {
            state: ServerState::new(),
            connections: ConnectionTxStorage::new(),
            dispatcher,
            runs: HashMap::new(),
            srv_tx,
        }
    }

    fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connection(command) => self.handle_connection_command(command),
            ServerCommand::Transport(command) => self.handle_transport_command(command),
            ServerCommand::RunFinished {
                session_id,
                author,
                result,
            } => self.finish_run(session_id, author, result),
        }
        self.evict_slow_connections();
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { from, tx } => {
                log::info!("Connection {} opened", from);
                self.state.connect(from);
                self.connections.insert(from, tx);
            }
            ConnectionCommand::Disconnect { from } => {
                if self.connections.contains(&from) {
                    log::info!("Connection {} closed", from);
                }
                self.drop_connection(&from);
            }
            ConnectionCommand::Message { from, message } => {
                log::debug!(
                    "{} for session {} from connection {}",
                    message.event_name(),
                    message.session_id(),
                    from
                );
                if let Err(e) = self.handle_client_message(&from, message) {
                    log::debug!("Rejected frame from connection {}: {}", from, e);
                    self.send(&from, ServerMessage::error(e.to_string()));
                }
            }
            ConnectionCommand::Malformed { from, reason } => {
                log::debug!("Malformed frame from connection {}: {}", from, reason);
                let error = ProtocolError::InvalidPayload(reason);
                self.send(&from, ServerMessage::error(error.to_string()));
            }
        }
    }

    fn handle_client_message(
        &mut self,
        from: &ConnectionId,
        message: ClientMessage,
    ) -> Result<(), ProtocolError> {
        match message {
            ClientMessage::Join(payload) => self.join(from, payload),
            ClientMessage::Leave(payload) => {
                self.leave(from, payload);
                Ok(())
            }
            ClientMessage::EditorUpdate(payload) => self.update_code(from, payload),
            ClientMessage::LanguageUpdate(payload) => self.update_language(from, payload),
            ClientMessage::CursorUpdate(payload) => self.relay_cursor(from, payload),
            ClientMessage::RunResult(payload) => self.relay_run_result(from, payload),
            ClientMessage::RunRequest(payload) => self.start_run(from, payload),
        }
    }

    fn join(&mut self, from: &ConnectionId, payload: JoinPayload) -> Result<(), ProtocolError> {
        let JoinPayload {
            session_id,
            username,
        } = payload;
        if self.state.registry.get(&session_id).is_none() {
            return Err(ProtocolError::SessionNotFound);
        }
        self.leave_current_session(from);

        let participant = Participant::new(username.as_deref(), now_millis());
        let mut participants = self
            .state
            .registry
            .get(&session_id)
            .map(|session| session.participants.clone())
            .unwrap_or_default();
        participants.insert(*from, participant.clone());
        let update = SessionUpdate {
            participants: Some(participants),
            ..SessionUpdate::default()
        };
        let snapshot = match self.state.registry.update(&session_id, update) {
            Some(session) => session.snapshot(),
            None => return Err(ProtocolError::SessionNotFound),
        };
        self.state.bind(*from, session_id.clone());
        log::info!(
            "Connection {} joined session {} as {}",
            from,
            session_id,
            participant.username
        );

        self.send(from, ServerMessage::SessionInit(snapshot));
        self.broadcast(
            &session_id,
            ServerMessage::PresenceJoined(PresenceJoinedEvent {
                id: *from,
                username: participant.username,
                joined_at: participant.joined_at,
            }),
            Some(from),
        );
        Ok(())
    }

    fn leave(&mut self, from: &ConnectionId, payload: SessionRef) {
        if self.state.bound_session(from) != Some(&payload.session_id) {
            log::debug!(
                "Connection {} is not in session {}, ignoring leave",
                from,
                payload.session_id
            );
            return;
        }
        self.leave_current_session(from);
        self.send(from, ServerMessage::SessionLeft(payload));
    }

    /// The connection must currently be bound to `session_id`.
    fn require_bound(&self, from: &ConnectionId, session_id: &str) -> Result<(), ProtocolError> {
        if self.state.bound_session(from).map(String::as_str) == Some(session_id) {
            return Ok(());
        }
        if self.state.registry.get(session_id).is_none() {
            Err(ProtocolError::SessionNotFound)
        } else {
            Err(ProtocolError::NotJoined(session_id.to_owned()))
        }
    }

    fn author(&self, from: &ConnectionId, session_id: &str) -> Result<String, ProtocolError> {
        self.state
            .registry
            .get(session_id)
            .map(|session| session.author(from))
            .ok_or(ProtocolError::SessionNotFound)
    }

    fn update_code(
        &mut self,
        from: &ConnectionId,
        payload: EditorUpdatePayload,
    ) -> Result<(), ProtocolError> {
        self.require_bound(from, &payload.session_id)?;
        let author = self.author(from, &payload.session_id)?;
        let update = SessionUpdate {
            code: Some(payload.code.clone()),
            ..SessionUpdate::default()
        };
        self.state
            .registry
            .update(&payload.session_id, update)
            .ok_or(ProtocolError::SessionNotFound)?;
        self.broadcast(
            &payload.session_id,
            ServerMessage::EditorUpdated(EditorUpdatedEvent {
                code: payload.code,
                author,
                timestamp: now_millis(),
            }),
            Some(from),
        );
        Ok(())
    }

    fn update_language(
        &mut self,
        from: &ConnectionId,
        payload: LanguageUpdatePayload,
    ) -> Result<(), ProtocolError> {
        self.require_bound(from, &payload.session_id)?;
        let author = self.author(from, &payload.session_id)?;
        let update = SessionUpdate {
            language: Some(payload.language),
            ..SessionUpdate::default()
        };
        self.state
            .registry
            .update(&payload.session_id, update)
            .ok_or(ProtocolError::SessionNotFound)?;
        self.broadcast(
            &payload.session_id,
            ServerMessage::LanguageUpdated(LanguageUpdatedEvent {
                language: payload.language,
                author,
            }),
            Some(from),
        );
        Ok(())
    }

    fn relay_cursor(
        &mut self,
        from: &ConnectionId,
        payload: CursorUpdatePayload,
    ) -> Result<(), ProtocolError> {
        self.require_bound(from, &payload.session_id)?;
        let username = self.author(from, &payload.session_id)?;
        self.broadcast(
            &payload.session_id,
            ServerMessage::CursorUpdated(CursorUpdatedEvent {
                cursor: payload.cursor,
                user_id: *from,
                username,
            }),
            Some(from),
        );
        Ok(())
    }

    /// A participant ran the buffer on their side and shares what they got.
    fn relay_run_result(
        &mut self,
        from: &ConnectionId,
        payload: RunResultPayload,
    ) -> Result<(), ProtocolError> {
        self.require_bound(from, &payload.session_id)?;
        let author = self.author(from, &payload.session_id)?;
        let record = RunRecord {
            output: payload.output,
            error: payload.error,
            status: None,
            author,
            timestamp: now_millis(),
        };
        self.record_run(&payload.session_id, record, Some(from));
        Ok(())
    }

    fn start_run(&mut self, from: &ConnectionId, payload: SessionRef) -> Result<(), ProtocolError> {
        let session_id = payload.session_id;
        self.require_bound(from, &session_id)?;
        if self.runs.contains_key(&session_id) {
            return Err(ProtocolError::RunInProgress);
        }
        let (language, code, author) = match self.state.registry.get(&session_id) {
            Some(session) => (session.language, session.code.clone(), session.author(from)),
            None => return Err(ProtocolError::SessionNotFound),
        };
        log::info!("{} runs {} in session {}", author, language, session_id);

        let cancel = CancellationToken::new();
        self.runs.insert(session_id.clone(), cancel.clone());
        self.broadcast(
            &session_id,
            ServerMessage::RunStarted(RunStartedEvent {
                author: author.clone(),
                language,
            }),
            None,
        );

        let dispatcher = self.dispatcher.clone();
        let srv_tx = self.srv_tx.clone();
        tokio::spawn(async move {
            let result = dispatcher
                .run_with_cancel(language.as_str(), &code, cancel)
                .await;
            let finished = ServerCommand::RunFinished {
                session_id,
                author,
                result,
            };
            if srv_tx.send(finished).is_err() {
                log::warn!("Server stopped before a run finished");
            }
        });
        Ok(())
    }

    fn finish_run(&mut self, session_id: SessionId, author: String, result: ExecutionResult) {
        self.runs.remove(&session_id);
        if self.state.registry.get(&session_id).is_none() {
            log::debug!("Discarding run result of deleted session {}", session_id);
            return;
        }
        if !result.is_success() {
            log::warn!(
                "Run in session {} ended with {:?}",
                session_id,
                result.status
            );
        }
        let record = RunRecord {
            output: Some(result.output),
            error: result.error,
            status: Some(result.status),
            author,
            timestamp: now_millis(),
        };
        self.record_run(&session_id, record, None);
    }

    fn record_run(&mut self, session_id: &str, record: RunRecord, without: Option<&ConnectionId>) {
        let event = RunResultEvent {
            output: record.output.clone(),
            error: record.error.clone(),
            status: record.status,
            author: record.author.clone(),
            timestamp: record.timestamp,
        };
        let update = SessionUpdate {
            last_run: Some(record),
            ..SessionUpdate::default()
        };
        if self.state.registry.update(session_id, update).is_some() {
            self.broadcast(session_id, ServerMessage::RunResult(event), without);
        }
    }

    fn handle_transport_command(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::CreateSession { language, tx } => {
                let session = self.state.registry.create(language.as_deref()).clone();
                let _ = tx.send(session);
            }
            TransportCommand::GetSession { session_id, tx } => {
                let _ = tx.send(self.state.registry.get(&session_id).cloned());
            }
            TransportCommand::DeleteSession { session_id, tx } => {
                let _ = tx.send(self.delete_session(&session_id));
            }
            TransportCommand::CountSessions { tx } => {
                let _ = tx.send(self.state.registry.len());
            }
        }
    }

    fn delete_session(&mut self, session_id: &str) -> bool {
        if let Some(cancel) = self.runs.remove(session_id) {
            cancel.cancel();
        }
        for connection_id in self.state.connection_ids_in_session(session_id) {
            self.state.unbind(&connection_id);
            self.send(&connection_id, ServerMessage::error("Session closed"));
        }
        self.state.registry.delete(session_id)
    }

    /// Removes the connection's participant and tells the rest of the room.
    fn leave_current_session(&mut self, from: &ConnectionId) -> Option<SessionId> {
        let session_id = self.state.unbind(from)?;
        let mut participants = self
            .state
            .registry
            .get(&session_id)
            .map(|session| session.participants.clone())?;
        let participant = participants.remove(from);
        let update = SessionUpdate {
            participants: Some(participants),
            ..SessionUpdate::default()
        };
        self.state.registry.update(&session_id, update);
        if let Some(participant) = participant {
            log::info!("Connection {} left session {}", from, session_id);
            self.broadcast(
                &session_id,
                ServerMessage::PresenceLeft(PresenceLeftEvent {
                    id: *from,
                    username: participant.username,
                }),
                None,
            );
        }
        Some(session_id)
    }

    fn drop_connection(&mut self, connection_id: &ConnectionId) {
        self.leave_current_session(connection_id);
        self.state.disconnect(connection_id);
        self.connections.remove(connection_id);
    }

    fn evict_slow_connections(&mut self) {
        loop {
            let evicted = self.connections.take_evicted();
            if evicted.is_empty() {
                break;
            }
            for connection_id in evicted {
                log::warn!("Evicting connection {}", connection_id);
                // Dropping the sender closes the websocket.
                self.drop_connection(&connection_id);
            }
        }
    }

    fn send(&mut self, to: &ConnectionId, message: ServerMessage) {
        self.connections.send(to, ConnectionEvent::Message(message));
    }

    fn broadcast(
        &mut self,
        session_id: &str,
        message: ServerMessage,
        without: Option<&ConnectionId>,
    ) {
        for connection_id in self.state.connection_ids_in_session(session_id) {
            if without.map_or(true, |c| *c != connection_id) {
                self.send(&connection_id, message.clone());
            }
        }
    }
}

pub fn spawn_server(dispatcher: Arc<Dispatcher>) -> ServerTx {
    let (srv_tx, mut srv_rx) = unbounded_channel::<ServerCommand>();
    let mut server = Box::new(Server::new(dispatcher, srv_tx.clone()));

    tokio::spawn(async move {
        while let Some(command) = srv_rx.recv().await {
            server.handle_command(command);
        }
    });

    srv_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepad_sandbox::{Limits, SandboxConfig};
    use codepad_system::{Cursor, Language, RunStatus};
    use tokio::sync::mpsc::{channel, Receiver};
    use tokio::sync::oneshot;

    fn test_server() -> (Server, tokio::sync::mpsc::UnboundedReceiver<ServerCommand>) {
        let (srv_tx, srv_rx) = unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::empty(Limits::default()));
        (Server::new(dispatcher, srv_tx), srv_rx)
    }

    fn connect(server: &mut Server, id: ConnectionId, capacity: usize) -> Receiver<ConnectionEvent> {
        let (tx, rx) = channel(capacity);
        server.handle_command(ServerCommand::Connection(ConnectionCommand::Connect {
            from: id,
            tx,
        }));
        rx
    }

    fn message(server: &mut Server, from: ConnectionId, json: &str) {
        let message = ClientMessage::from_json(json).expect("valid frame");
        server.handle_command(ServerCommand::Connection(ConnectionCommand::Message {
            from,
            message,
        }));
    }

    fn create_session(server: &mut Server, language: &str) -> SessionId {
        server
            .state
            .registry
            .create(Some(language))
            .id
            .clone()
    }

    fn drain(rx: &mut Receiver<ConnectionEvent>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ConnectionEvent::Message(message) = event {
                messages.push(message);
            }
        }
        messages
    }

    fn join(server: &mut Server, from: ConnectionId, session_id: &str, username: &str) {
        message(
            server,
            from,
            &format!(
                r#"{{"event":"session:join","data":{{"sessionId":"{}","username":"{}"}}}}"#,
                session_id, username
            ),
        );
    }

    #[test]
    fn joining_an_unknown_session_only_tells_the_sender() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        drain(&mut host);

        join(&mut server, 2, "nope", "Guest");
        assert_eq!(
            drain(&mut guest),
            vec![ServerMessage::error("Session not found")]
        );
        assert!(drain(&mut host).is_empty());
        assert_eq!(server.state.bound_session(&2), None);
    }

    #[test]
    fn malformed_frames_are_answered_and_ignored() {
        let (mut server, _srv_rx) = test_server();
        let mut conn = connect(&mut server, 1, 16);
        let reason = ClientMessage::from_json(r#"{"event":"editor:update","data":{"code":"x"}}"#)
            .expect_err("missing sessionId")
            .to_string();
        server.handle_command(ServerCommand::Connection(ConnectionCommand::Malformed {
            from: 1,
            reason: reason.clone(),
        }));

        assert_eq!(
            drain(&mut conn),
            vec![ServerMessage::error(format!("Invalid payload: {}", reason))]
        );
        assert!(server.connections.contains(&1));
        assert_eq!(server.state.bound_session(&1), None);
    }

    #[test]
    fn join_sends_snapshot_and_presence() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "  ");

        match drain(&mut guest).as_slice() {
            [ServerMessage::SessionInit(snapshot)] => {
                assert_eq!(snapshot.id, id);
                assert_eq!(snapshot.language, Language::Python);
                assert_eq!(snapshot.participants.len(), 2);
                assert_eq!(snapshot.participants[&2].username, "Guest");
            }
            other => panic!("unexpected {:?}", other),
        }
        let host_messages = drain(&mut host);
        assert!(matches!(host_messages[0], ServerMessage::SessionInit(_)));
        match &host_messages[1] {
            ServerMessage::PresenceJoined(event) => {
                assert_eq!(event.id, 2);
                assert_eq!(event.username, "Guest");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn edits_are_relayed_to_others_only() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "javascript");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "Guest");
        drain(&mut host);
        drain(&mut guest);

        message(
            &mut server,
            1,
            &format!(
                r#"{{"event":"editor:update","data":{{"sessionId":"{}","code":"print(1)"}}}}"#,
                id
            ),
        );
        message(
            &mut server,
            1,
            &format!(
                r#"{{"event":"language:update","data":{{"sessionId":"{}","language":"python"}}}}"#,
                id
            ),
        );
        message(
            &mut server,
            2,
            &format!(
                r#"{{"event":"cursor:update","data":{{"sessionId":"{}","cursor":{{"lineNumber":3,"column":7}}}}}}"#,
                id
            ),
        );

        assert_eq!(
            drain(&mut host),
            vec![ServerMessage::CursorUpdated(CursorUpdatedEvent {
                cursor: Cursor {
                    line_number: 3,
                    column: 7
                },
                user_id: 2,
                username: "Guest".into(),
            })]
        );
        match drain(&mut guest).as_slice() {
            [ServerMessage::EditorUpdated(edit), ServerMessage::LanguageUpdated(language)] => {
                assert_eq!(edit.code, "print(1)");
                assert_eq!(edit.author, "Host");
                assert_eq!(language.language, Language::Python);
                assert_eq!(language.author, "Host");
            }
            other => panic!("unexpected {:?}", other),
        }
        let session = server.state.registry.get(&id).expect("session exists");
        assert_eq!(session.code, "print(1)");
        assert_eq!(session.language, Language::Python);
    }

    #[test]
    fn unbound_senders_get_an_error() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "javascript");
        let before = server.state.registry.get(&id).cloned();
        let mut stranger = connect(&mut server, 3, 16);
        message(
            &mut server,
            3,
            &format!(
                r#"{{"event":"editor:update","data":{{"sessionId":"{}","code":"x"}}}}"#,
                id
            ),
        );
        assert_eq!(
            drain(&mut stranger),
            vec![ServerMessage::error(format!("Not joined to session {}", id))]
        );
        assert_eq!(server.state.registry.get(&id).cloned(), before);
    }

    #[test]
    fn relayed_run_results_become_last_run() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "Guest");
        drain(&mut host);
        drain(&mut guest);

        message(
            &mut server,
            2,
            &format!(
                r#"{{"event":"run:result","data":{{"sessionId":"{}","output":"1\n","error":null}}}}"#,
                id
            ),
        );
        match drain(&mut host).as_slice() {
            [ServerMessage::RunResult(event)] => {
                assert_eq!(event.output.as_deref(), Some("1\n"));
                assert_eq!(event.author, "Guest");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(drain(&mut guest).is_empty());
        let last_run = server
            .state
            .registry
            .get(&id)
            .and_then(|s| s.last_run.clone())
            .expect("recorded");
        assert_eq!(last_run.author, "Guest");
    }

    #[test]
    fn leaving_and_disconnecting_are_idempotent() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "Guest");
        drain(&mut host);
        drain(&mut guest);

        message(
            &mut server,
            2,
            &format!(r#"{{"event":"session:leave","data":{{"sessionId":"{}"}}}}"#, id),
        );
        assert_eq!(
            drain(&mut guest),
            vec![ServerMessage::SessionLeft(SessionRef {
                session_id: id.clone()
            })]
        );
        assert_eq!(
            drain(&mut host),
            vec![ServerMessage::PresenceLeft(PresenceLeftEvent {
                id: 2,
                username: "Guest".into()
            })]
        );

        for _ in 0..2 {
            server.handle_command(ServerCommand::Connection(ConnectionCommand::Disconnect {
                from: 2,
            }));
        }
        assert!(drain(&mut host).is_empty());

        server.handle_command(ServerCommand::Connection(ConnectionCommand::Disconnect {
            from: 1,
        }));
        let session = server.state.registry.get(&id).expect("empty sessions live on");
        assert!(session.participants.is_empty());
    }

    #[test]
    fn deleting_a_session_closes_it_for_bound_connections() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        join(&mut server, 1, &id, "Host");
        drain(&mut host);

        let (tx, mut rx) = oneshot::channel();
        server.handle_command(ServerCommand::Transport(TransportCommand::DeleteSession {
            session_id: id.clone(),
            tx,
        }));
        assert_eq!(rx.try_recv(), Ok(true));
        assert_eq!(drain(&mut host), vec![ServerMessage::error("Session closed")]);
        assert_eq!(server.state.bound_session(&1), None);
    }

    #[test]
    fn slow_connections_are_evicted() {
        let (mut server, _srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 64);
        let _slow = connect(&mut server, 2, 1);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "Slow");
        drain(&mut host);

        for n in 0..3 {
            message(
                &mut server,
                1,
                &format!(
                    r#"{{"event":"editor:update","data":{{"sessionId":"{}","code":"{}"}}}}"#,
                    id, n
                ),
            );
        }
        assert!(!server.connections.contains(&2));
        assert_eq!(server.state.bound_session(&2), None);
        let session = server.state.registry.get(&id).expect("session exists");
        assert_eq!(session.participants.keys().collect::<Vec<_>>(), vec![&1]);
        assert!(drain(&mut host)
            .iter()
            .any(|m| matches!(m, ServerMessage::PresenceLeft(e) if e.id == 2)));
    }

    #[tokio::test]
    async fn run_requests_without_a_strategy_report_unavailable() {
        let (mut server, mut srv_rx) = test_server();
        let id = create_session(&mut server, "python");
        let mut host = connect(&mut server, 1, 16);
        let mut guest = connect(&mut server, 2, 16);
        join(&mut server, 1, &id, "Host");
        join(&mut server, 2, &id, "Guest");
        drain(&mut host);
        drain(&mut guest);

        message(
            &mut server,
            2,
            &format!(r#"{{"event":"run:request","data":{{"sessionId":"{}"}}}}"#, id),
        );
        let finished = srv_rx.recv().await.expect("run finishes");
        server.handle_command(finished);

        for rx in [&mut host, &mut guest] {
            match drain(rx).as_slice() {
                [ServerMessage::RunStarted(started), ServerMessage::RunResult(result)] => {
                    assert_eq!(started.author, "Guest");
                    assert_eq!(started.language, Language::Python);
                    assert_eq!(result.status, Some(RunStatus::Unavailable));
                    assert_eq!(
                        result.error.as_deref(),
                        Some("Execution is not available for python yet.")
                    );
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(server.runs.is_empty());
    }

    async fn recv_message(rx: &mut Receiver<ConnectionEvent>) -> ServerMessage {
        loop {
            match rx.recv().await {
                Some(ConnectionEvent::Message(message)) => return message,
                Some(ConnectionEvent::Close) => continue,
                None => panic!("connection closed"),
            }
        }
    }

    #[tokio::test]
    async fn host_and_guest_see_the_same_python_run() {
        let dispatcher = Arc::new(Dispatcher::new(&SandboxConfig::default()));
        if dispatcher.probe().await.get(&Language::Python) != Some(&true) {
            eprintln!("skipping: python3 is not installed");
            return;
        }
        let srv_tx = spawn_server(dispatcher);
        let (tx, rx) = oneshot::channel();
        srv_tx
            .send(ServerCommand::Transport(TransportCommand::CreateSession {
                language: Some("python".into()),
                tx,
            }))
            .expect("server running");
        let id = rx.await.expect("created").id;

        let mut rxs = Vec::new();
        for (from, username) in [(1, "Host"), (2, "Guest")] {
            let (tx, rx) = channel(32);
            let commands = vec![
                ConnectionCommand::Connect { from, tx },
                ConnectionCommand::Message {
                    from,
                    message: ClientMessage::Join(JoinPayload {
                        session_id: id.clone(),
                        username: Some(username.into()),
                    }),
                },
            ];
            for command in commands {
                srv_tx
                    .send(ServerCommand::Connection(command))
                    .expect("server running");
            }
            rxs.push(rx);
        }
        let code = ClientMessage::EditorUpdate(EditorUpdatePayload {
            session_id: id.clone(),
            code: "print(1)".into(),
        });
        let run = ClientMessage::RunRequest(SessionRef {
            session_id: id.clone(),
        });
        for message in [code, run] {
            srv_tx
                .send(ServerCommand::Connection(ConnectionCommand::Message {
                    from: 1,
                    message,
                }))
                .expect("server running");
        }

        for rx in rxs.iter_mut() {
            loop {
                if let ServerMessage::RunResult(result) = recv_message(rx).await {
                    assert_eq!(result.output.as_deref(), Some("1\n"));
                    assert_eq!(result.error, None);
                    assert_eq!(result.status, Some(RunStatus::Completed));
                    assert_eq!(result.author, "Host");
                    break;
                }
            }
        }
    }
}
