//! Connected-client registry for daemon-wide broadcasts.
//!
//! Session output goes through per-session subscriber lists; this hub
//! carries the events every client should see, like task completion
//! broadcasts.

use tokio::sync::mpsc;
use tracing::warn;

use agentboard_core::protocol::DaemonEvent;

struct ConnectedClient {
    id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Default)]
pub struct ClientHub {
    clients: Vec<ConnectedClient>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&mut self, id: usize, event_tx: mpsc::Sender<DaemonEvent>) {
        self.clients.push(ConnectedClient { id, event_tx });
    }

    pub fn remove_client(&mut self, id: usize) {
        self.clients.retain(|c| c.id != id);
    }

    /// Broadcast an event to every connected client. Disconnected clients
    /// and clients too far behind to accept the event are removed.
    pub fn broadcast(&mut self, event: &DaemonEvent) {
        self.clients.retain(|client| {
            match client.event_tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client_id = client.id, "event channel full, dropping client");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
