use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Conversational state of one open ticket channel. In-memory only: a
/// restart drops every open session, and ticket channels that survive the
/// restart are picked up again through the channel-name heuristic.
#[derive(Clone, Debug)]
pub struct TicketSession {
    pub step: String,
    pub reason: Option<String>,
    pub closing: bool,
}

impl TicketSession {
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            reason: None,
            closing: false,
        }
    }
}

/// Session store keyed by channel id. Reads are concurrent, writes are
/// exclusive per key. The separate lock table serializes whole turns on one
/// channel (decision + step mutation are atomic per channel) while turns on
/// unrelated channels proceed in parallel.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<u64, TicketSession>,
    turn_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: u64) -> Option<TicketSession> {
        self.sessions.get(&channel_id).map(|entry| entry.clone())
    }

    pub fn put(&self, channel_id: u64, session: TicketSession) {
        self.sessions.insert(channel_id, session);
    }

    /// Removes the session together with its turn-lock entry.
    pub fn delete(&self, channel_id: u64) {
        self.sessions.remove(&channel_id);
        self.turn_locks.remove(&channel_id);
    }

    pub fn update_step(&self, channel_id: u64, step: &str) {
        if let Some(mut entry) = self.sessions.get_mut(&channel_id) {
            entry.step = step.to_string();
        }
    }

    /// Transitions a session into the closing state. Returns `false` when the
    /// session is already closing, which makes repeated delete requests
    /// no-ops. An untracked channel gets a closing marker inserted so the
    /// same guarantee holds for tickets only known through the name
    /// heuristic.
    pub fn mark_closing(&self, channel_id: u64) -> bool {
        let mut entry = self
            .sessions
            .entry(channel_id)
            .or_insert_with(|| TicketSession::new("closing"));
        if entry.closing {
            return false;
        }
        entry.closing = true;
        true
    }

    /// Per-channel turn lock. Entries are created on demand and dropped with
    /// the session.
    pub fn turn_lock(&self, channel_id: u64) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(channel_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
