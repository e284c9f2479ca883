//! Bounded session registry.
//!
//! Holds every session, running or stopped, behind one lock. The capacity
//! ceiling counts sessions that are still active, so stopping a session
//! frees its slot even before it is removed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use agentboard_core::config::Settings;
use agentboard_core::message::Message;
use agentboard_core::protocol::SessionInfo;

use crate::session::AgentSession;

pub struct SessionRegistry {
    settings: Settings,
    sessions: Mutex<HashMap<String, Arc<AgentSession>>>,
}

impl SessionRegistry {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a session and register it, then wait out the warm-up delay
    /// before the session accepts input. Fails when the registry is full or
    /// the id is already taken; capacity is checked before anything spawns.
    pub async fn create(
        &self,
        session_id: Option<String>,
        task_id: Option<String>,
        cwd: Option<PathBuf>,
    ) -> Result<SessionInfo, String> {
        let id = session_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        let (msg_tx, msg_rx) = mpsc::channel::<Message>(1024);
        let session = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| "Session registry lock poisoned".to_string())?;
            let active = sessions.values().filter(|s| s.is_active()).count();
            if active >= self.settings.max_sessions {
                return Err(format!(
                    "Session limit reached ({active} of {})",
                    self.settings.max_sessions
                ));
            }
            if sessions.contains_key(&id) {
                return Err(format!("Session {id} already exists"));
            }
            let session = Arc::new(AgentSession::spawn(
                id.clone(),
                task_id,
                &self.settings,
                cwd,
                msg_tx,
            )?);
            sessions.insert(id.clone(), session.clone());
            session
        };

        // Pump classified output from the reader thread into the session.
        let pump = session.clone();
        tokio::spawn(async move {
            let mut msg_rx = msg_rx;
            while let Some(message) = msg_rx.recv().await {
                pump.publish(message);
            }
        });

        if self.settings.warmup_secs > 0 {
            tokio::time::sleep(Duration::from_secs(self.settings.warmup_secs)).await;
        }
        session.mark_ready();
        info!(session = %id, "session ready");
        Ok(session.info())
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.lock().ok()?.get(id).cloned()
    }

    /// Ids of the sessions created for the given task.
    pub fn ids_for_task(&self, task_id: &str) -> Vec<String> {
        match self.sessions.lock() {
            Ok(sessions) => sessions
                .values()
                .filter(|s| s.task_id.as_deref() == Some(task_id))
                .map(|s| s.id.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Stop the session's process. The registry entry stays; false for an
    /// unknown id.
    pub async fn stop(&self, id: &str) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };
        session.stop().await;
        true
    }

    /// Stop and drop the session, discarding its history and queue.
    pub async fn remove(&self, id: &str) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };
        session.stop().await;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(id);
        }
        true
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = match self.sessions.lock() {
            Ok(sessions) => sessions.values().map(|s| s.info()).collect(),
            Err(_) => Vec::new(),
        };
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn list_active(&self) -> Vec<SessionInfo> {
        self.list()
            .into_iter()
            .filter(|info| info.state != agentboard_core::protocol::SessionState::Stopped)
            .collect()
    }

    /// Detach one client from every session it may be subscribed to.
    pub fn drop_client(&self, client_id: usize) {
        if let Ok(sessions) = self.sessions.lock() {
            for session in sessions.values() {
                session.unsubscribe(client_id);
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let all: Vec<Arc<AgentSession>> = match self.sessions.lock() {
            Ok(sessions) => sessions.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        for session in all {
            session.stop().await;
        }
    }
}
