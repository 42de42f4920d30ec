use crate::connection::ConnectionEvent;
use codepad_system::ConnectionId;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

/// Outbound queues of every live connection.
///
/// Sends never wait: a queue that is full or closed marks its connection
/// for eviction, which the server performs once the current command is done.
#[derive(Default)]
pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
    evicted: Vec<ConnectionId>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connection_txs.contains_key(connection_id)
    }

    pub fn send(&mut self, to: &ConnectionId, event: ConnectionEvent) {
        let result = match self.connection_txs.get(to) {
            Some(tx) => tx.try_send(event),
            None => {
                log::debug!("Dropping event for unknown connection {}", to);
                return;
            }
        };
        match result {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("Connection {} is not keeping up, evicting", to);
                self.evict(*to);
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("Connection {} already closed", to);
                self.evict(*to);
            }
        }
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }

    pub fn take_evicted(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.evicted)
    }

    fn evict(&mut self, connection_id: ConnectionId) {
        if !self.evicted.contains(&connection_id) {
            self.evicted.push(connection_id);
        }
    }
}
