use async_trait::async_trait;
use serde::Serialize;

/// One entry of the guild channel directory handed to the decision model.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// One line of the bounded recent-message window, oldest first.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    pub author_id: String,
    pub author_name: String,
    pub text: String,
}

/// Capability interface of the chat platform. The core only ever talks to
/// the platform through this trait; the serenity implementation lives in the
/// adapter layer and tests substitute a recording double.
///
/// Eligibility checks (`is_bannable` & friends) re-validate against the
/// platform's own membership and role data at execution time. The model
/// output alone never authorizes a sanction.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Creates the private ticket channel: hidden from the guild, visible to
    /// the opener, the bot and all current staff. Returns the channel id.
    async fn create_ticket_channel(
        &self,
        guild_id: u64,
        opener_id: u64,
        opener_name: &str,
        staff_ids: &[u64],
    ) -> anyhow::Result<u64>;

    async fn delete_channel(&self, channel_id: u64) -> anyhow::Result<()>;

    async fn send_message(&self, channel_id: u64, text: &str) -> anyhow::Result<()>;

    /// Bounded recent-message window, chronological oldest-first.
    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<TranscriptLine>>;

    async fn channel_directory(&self, guild_id: u64) -> anyhow::Result<Vec<ChannelInfo>>;

    async fn is_bannable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool>;
    async fn is_kickable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool>;
    async fn is_moderatable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()>;
    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()>;

    /// Communication timeout until the given unix timestamp.
    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until_unix: i64,
        reason: &str,
    ) -> anyhow::Result<()>;

    /// Lifts an active communication timeout.
    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> anyhow::Result<()>;
}
