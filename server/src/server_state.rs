use crate::registry::SessionRegistry;
use codepad_system::{ConnectionId, SessionId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Bound(SessionId),
}

/// Registry plus which session each live connection is bound to.
#[derive(Default)]
pub struct ServerState {
    pub registry: SessionRegistry,
    pub connection_states: HashMap<ConnectionId, ConnectionState>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.connection_states
            .insert(connection_id, ConnectionState::Unbound);
    }

    pub fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.connection_states.remove(connection_id);
    }

    pub fn bound_session(&self, connection_id: &ConnectionId) -> Option<&SessionId> {
        match self.connection_states.get(connection_id) {
            Some(ConnectionState::Bound(session_id)) => Some(session_id),
            _ => None,
        }
    }

    pub fn bind(&mut self, connection_id: ConnectionId, session_id: SessionId) {
        self.connection_states
            .insert(connection_id, ConnectionState::Bound(session_id));
    }

    /// Returns the session the connection was bound to, if any.
    pub fn unbind(&mut self, connection_id: &ConnectionId) -> Option<SessionId> {
        let state = self.connection_states.get_mut(connection_id)?;
        match std::mem::replace(state, ConnectionState::Unbound) {
            ConnectionState::Bound(session_id) => Some(session_id),
            ConnectionState::Unbound => None,
        }
    }

    /// Connections bound to `session_id`, in id order.
    pub fn connection_ids_in_session(&self, session_id: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connection_states
            .iter()
            .filter(|(_, state)| matches!(state, ConnectionState::Bound(s) if s == session_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
