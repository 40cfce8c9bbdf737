//! Recording test doubles for the platform gateway and the decision
//! backend. Unit tests drive the whole turn pipeline against these instead
//! of a live connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::decision_agent::DecisionBackend;
use super::gateway::{ChannelInfo, ChatGateway, TranscriptLine};

pub(crate) struct StubBackend {
    replies: Mutex<VecDeque<String>>,
    inputs: Mutex<Vec<String>>,
    hang_when_empty: bool,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::with_replies(Vec::new())
    }
}

impl StubBackend {
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            inputs: Mutex::new(Vec::new()),
            hang_when_empty: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(Vec::new()),
            hang_when_empty: true,
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionBackend for StubBackend {
    async fn complete(&self, _system_prompt: &str, input_json: &str) -> anyhow::Result<String> {
        self.inputs.lock().unwrap().push(input_json.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => Ok(reply),
            None if self.hang_when_empty => std::future::pending().await,
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

pub(crate) struct RecordingGateway {
    next_channel_id: AtomicU64,
    pub created: Mutex<Vec<(u64, u64, u64, Vec<u64>)>>,
    pub sent: Mutex<Vec<(u64, String)>>,
    pub deleted: Mutex<Vec<u64>>,
    pub banned: Mutex<Vec<(u64, String)>>,
    pub kicked: Mutex<Vec<(u64, String)>>,
    pub timeouts: Mutex<Vec<(u64, i64, String)>>,
    pub cleared_timeouts: Mutex<Vec<u64>>,
    pub bannable: AtomicBool,
    pub kickable: AtomicBool,
    pub moderatable: AtomicBool,
    pub directory: Mutex<Vec<ChannelInfo>>,
    pub transcript: Mutex<Vec<TranscriptLine>>,
    pub fail_directory: AtomicBool,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            next_channel_id: AtomicU64::new(500),
            created: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            banned: Mutex::new(Vec::new()),
            kicked: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            cleared_timeouts: Mutex::new(Vec::new()),
            bannable: AtomicBool::new(true),
            kickable: AtomicBool::new(true),
            moderatable: AtomicBool::new(true),
            directory: Mutex::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
            fail_directory: AtomicBool::new(false),
        }
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn create_ticket_channel(
        &self,
        guild_id: u64,
        opener_id: u64,
        _opener_name: &str,
        staff_ids: &[u64],
    ) -> anyhow::Result<u64> {
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .unwrap()
            .push((guild_id, channel_id, opener_id, staff_ids.to_vec()));
        Ok(channel_id)
    }

    async fn delete_channel(&self, channel_id: u64) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(channel_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((channel_id, text.to_string()));
        Ok(())
    }

    async fn recent_messages(
        &self,
        _channel_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<TranscriptLine>> {
        let transcript = self.transcript.lock().unwrap();
        Ok(transcript.iter().take(limit).cloned().collect())
    }

    async fn channel_directory(&self, _guild_id: u64) -> anyhow::Result<Vec<ChannelInfo>> {
        if self.fail_directory.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(self.directory.lock().unwrap().clone())
    }

    async fn is_bannable(&self, _guild_id: u64, _user_id: u64) -> anyhow::Result<bool> {
        Ok(self.bannable.load(Ordering::SeqCst))
    }

    async fn is_kickable(&self, _guild_id: u64, _user_id: u64) -> anyhow::Result<bool> {
        Ok(self.kickable.load(Ordering::SeqCst))
    }

    async fn is_moderatable(&self, _guild_id: u64, _user_id: u64) -> anyhow::Result<bool> {
        Ok(self.moderatable.load(Ordering::SeqCst))
    }

    async fn ban(&self, _guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()> {
        self.banned.lock().unwrap().push((user_id, reason.to_string()));
        Ok(())
    }

    async fn kick(&self, _guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()> {
        self.kicked.lock().unwrap().push((user_id, reason.to_string()));
        Ok(())
    }

    async fn timeout(
        &self,
        _guild_id: u64,
        user_id: u64,
        until_unix: i64,
        reason: &str,
    ) -> anyhow::Result<()> {
        self.timeouts
            .lock()
            .unwrap()
            .push((user_id, until_unix, reason.to_string()));
        Ok(())
    }

    async fn clear_timeout(&self, _guild_id: u64, user_id: u64) -> anyhow::Result<()> {
        self.cleared_timeouts.lock().unwrap().push(user_id);
        Ok(())
    }
}
