//! One interactive agent session: a PTY-hosted child process, a reader
//! thread that turns raw output into classified [`Message`]s, and a
//! writer thread that feeds it input.
//!
//! The reader and writer are std threads because PTY I/O is blocking;
//! they bridge into tokio through channels. Stopping a session keeps its
//! history and queued messages; only removal discards them.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use agentboard_core::config::Settings;
use agentboard_core::keys::encode_key;
use agentboard_core::message::{
    classify_line, comparison_form, should_ignore, DedupWindow, Message, MessageKind,
    MessageSubtype,
};
use agentboard_core::protocol::{DaemonEvent, SessionInfo, SessionState};

pub const PTY_ROWS: u16 = 24;
pub const PTY_COLS: u16 = 80;

/// Input handed to the writer thread.
enum PtyInput {
    Text(String),
    Bytes(Vec<u8>),
    Shutdown,
}

pub struct AgentSession {
    pub id: String,
    pub task_id: Option<String>,
    pub created_at: String,
    state: Mutex<SessionState>,
    history: Mutex<Vec<Message>>,
    pending: Mutex<VecDeque<Message>>,
    subscribers: Mutex<Vec<(usize, mpsc::Sender<DaemonEvent>)>>,
    input_tx: mpsc::UnboundedSender<PtyInput>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    // Master must stay alive for the PTY to stay open.
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    reader_stop: std::sync::Arc<AtomicBool>,
    reader_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    // Cleared by the reader thread when the child's output stream ends.
    child_alive: std::sync::Arc<AtomicBool>,
    accepting_input: AtomicBool,
}

impl AgentSession {
    /// Open a PTY, launch the agent CLI inside it, and start the reader and
    /// writer threads. Classified output lands on `msg_tx`.
    pub fn spawn(
        id: String,
        task_id: Option<String>,
        settings: &Settings,
        cwd: Option<PathBuf>,
        msg_tx: mpsc::Sender<Message>,
    ) -> Result<Self, String> {
        if let Some(ref dir) = cwd {
            if !dir.is_dir() {
                return Err(format!("Working directory does not exist: {}", dir.display()));
            }
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| format!("Failed to open PTY: {e}"))?;

        let mut cmd = CommandBuilder::new(&settings.agent_command);
        if settings.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        cmd.env("TERM", &settings.term);
        match cwd {
            Some(ref dir) => cmd.cwd(dir),
            None => cmd.cwd(std::env::current_dir().unwrap_or_default()),
        };

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| format!("Failed to spawn {} in PTY: {e}", settings.agent_command))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| format!("Failed to clone PTY reader: {e}"))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| format!("Failed to take PTY writer: {e}"))?;

        let reader_stop = std::sync::Arc::new(AtomicBool::new(false));
        let child_alive = std::sync::Arc::new(AtomicBool::new(true));

        // Reader thread: assemble lines, strip ANSI, drop ignorable and
        // recently-seen lines, classify what remains.
        let stop = reader_stop.clone();
        let alive = child_alive.clone();
        let session_id = id.clone();
        let reader_handle = std::thread::spawn(move || {
            let mut dedup = DedupWindow::new();
            let mut acc: Vec<u8> = Vec::new();
            let mut buf = [0u8; 4096];
            'read: loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF, child exited
                    Ok(n) => {
                        acc.extend_from_slice(&buf[..n]);
                        while let Some(pos) = acc.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = acc.drain(..=pos).collect();
                            let text = String::from_utf8_lossy(&line).into_owned();
                            if emit_line(&session_id, &text, &mut dedup, &msg_tx).is_err() {
                                break 'read;
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
            // Flush a trailing partial line before exiting.
            if !acc.is_empty() {
                let text = String::from_utf8_lossy(&acc).into_owned();
                let _ = emit_line(&session_id, &text, &mut dedup, &msg_tx);
            }
            // The output stream is gone, whether by child exit or stop.
            alive.store(false, Ordering::Relaxed);
        });

        // Writer thread: owns the PTY writer until shutdown.
        let (input_tx, input_rx) = mpsc::unbounded_channel::<PtyInput>();
        std::thread::spawn(move || {
            let mut writer = writer;
            let mut input_rx = input_rx;
            while let Some(msg) = input_rx.blocking_recv() {
                match msg {
                    PtyInput::Text(text) => {
                        if writer.write_all(text.as_bytes()).is_err() {
                            break;
                        }
                        let _ = writer.flush();
                    }
                    PtyInput::Bytes(bytes) => {
                        if writer.write_all(&bytes).is_err() {
                            break;
                        }
                        let _ = writer.flush();
                    }
                    PtyInput::Shutdown => break,
                }
            }
            // Writer dropped here -> PTY master EOF -> child gets SIGHUP
        });

        Ok(Self {
            id,
            task_id,
            created_at: chrono::Utc::now().to_rfc3339(),
            state: Mutex::new(SessionState::Starting),
            history: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
            input_tx,
            child: Mutex::new(Some(child)),
            master: Mutex::new(Some(pair.master)),
            reader_stop,
            reader_handle: Mutex::new(Some(reader_handle)),
            child_alive,
            accepting_input: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> SessionState {
        // A session whose child has gone away is stopped no matter what
        // the recorded state says.
        if !self.child_alive.load(Ordering::Relaxed) {
            return SessionState::Stopped;
        }
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Stopped)
    }

    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Stopped
    }

    /// Warm-up finished: start accepting input.
    pub fn mark_ready(&self) {
        self.accepting_input.store(true, Ordering::Relaxed);
        if let Ok(mut state) = self.state.lock() {
            if *state == SessionState::Starting {
                *state = SessionState::Running;
            }
        }
    }

    /// Append a message to history and the pending queue, and fan it out to
    /// attached clients. Disconnected and backed-up subscribers are pruned;
    /// a detached client can re-attach and catch up from history.
    pub fn publish(&self, message: Message) {
        if let Ok(mut history) = self.history.lock() {
            history.push(message.clone());
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(message.clone());
        }
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|(client_id, tx)| {
            let event = DaemonEvent::Message {
                session_id: self.id.clone(),
                message: message.clone(),
            };
            match tx.try_send(event) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client_id, session = %self.id, "event channel full, detaching subscriber");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Take everything off the pending queue. History is unaffected.
    pub fn drain(&self) -> Vec<Message> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn subscribe(&self, client_id: usize, tx: mpsc::Sender<DaemonEvent>) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|(id, _)| *id != client_id);
            subscribers.push((client_id, tx));
        }
    }

    pub fn unsubscribe(&self, client_id: usize) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|(id, _)| *id != client_id);
        }
    }

    /// Write text to the PTY followed by a carriage return to submit it.
    /// A `user/prompt` message is recorded first so attached clients see
    /// what was sent, not just what came back.
    pub fn send_text(&self, text: &str) -> Result<(), String> {
        if !self.child_alive.load(Ordering::Relaxed) {
            return Err(format!("Session {} process has exited", self.id));
        }
        if !self.accepting_input.load(Ordering::Relaxed) {
            return Err(format!("Session {} is not accepting input", self.id));
        }
        self.publish(
            Message::new(&self.id, MessageKind::User, text).with_subtype(MessageSubtype::Prompt),
        );
        self.input_tx
            .send(PtyInput::Text(format!("{text}\r")))
            .map_err(|_| format!("Session {} writer is gone", self.id))
    }

    /// Encode a named key and write its control sequence to the PTY.
    /// Unknown key names are ignored without error.
    pub fn send_key(&self, key: &str) -> Result<(), String> {
        if !self.child_alive.load(Ordering::Relaxed) {
            return Err(format!("Session {} process has exited", self.id));
        }
        if !self.accepting_input.load(Ordering::Relaxed) {
            return Err(format!("Session {} is not accepting input", self.id));
        }
        let Some(bytes) = encode_key(key) else {
            debug!(session = %self.id, key, "unknown key name ignored");
            return Ok(());
        };
        self.input_tx
            .send(PtyInput::Bytes(bytes))
            .map_err(|_| format!("Session {} writer is gone", self.id))
    }

    /// Stop the agent process: interrupt, ask it to exit, kill after a grace
    /// period. History and the pending queue survive.
    pub async fn stop(&self) {
        if self.state() == SessionState::Stopped {
            return;
        }
        self.accepting_input.store(false, Ordering::Relaxed);

        let _ = self.input_tx.send(PtyInput::Bytes(vec![0x03]));
        let _ = self.input_tx.send(PtyInput::Text("exit\r".to_string()));

        let mut exited = false;
        for _ in 0..20 {
            {
                let mut child = match self.child.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                match child.as_mut().map(|c| c.try_wait()) {
                    Some(Ok(Some(_))) | None => {
                        exited = true;
                    }
                    Some(Ok(None)) => {}
                    Some(Err(e)) => {
                        debug!(session = %self.id, error = %e, "try_wait failed");
                        exited = true;
                    }
                }
            }
            if exited {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if !exited {
            if let Ok(mut child) = self.child.lock() {
                if let Some(c) = child.as_mut() {
                    let _ = c.kill();
                }
            }
        }

        self.reader_stop.store(true, Ordering::Relaxed);
        let _ = self.input_tx.send(PtyInput::Shutdown);
        if let Ok(mut child) = self.child.lock() {
            *child = None;
        }
        // Dropping the master closes the PTY and unblocks the reader.
        if let Ok(mut master) = self.master.lock() {
            *master = None;
        }
        let handle = self.reader_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            for _ in 0..20 {
                if handle.is_finished() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(session = %self.id, "reader thread missed the stop deadline");
            }
        }
        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Stopped;
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            task_id: self.task_id.clone(),
            state: self.state(),
            created_at: self.created_at.clone(),
            history_len: self.history.lock().map(|h| h.len()).unwrap_or(0),
            queued: self.pending.lock().map(|p| p.len()).unwrap_or(0),
            subscribers: self.subscribers.lock().map(|s| s.len()).unwrap_or(0),
        }
    }
}

/// Shared line pipeline for the reader thread: strip, ignore, dedup,
/// classify, send. Err means the daemon side hung up.
fn emit_line(
    session_id: &str,
    raw: &str,
    dedup: &mut DedupWindow,
    msg_tx: &mpsc::Sender<Message>,
) -> Result<(), ()> {
    let form = comparison_form(raw);
    if should_ignore(&form) {
        return Ok(());
    }
    if !dedup.admit(&form) {
        return Ok(());
    }
    let kind = classify_line(&form);
    // Subscribers get the original text; only filtering uses the stripped
    // form.
    let message = Message::new(session_id, kind, raw.trim_end());
    msg_tx.blocking_send(message).map_err(|_| ())
}
