use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateChannel, EditMember, GetMessages};
use serenity::http::Http;
use serenity::model::channel::{ChannelType, PermissionOverwrite, PermissionOverwriteType};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::{Permissions, Timestamp};
use tokio::sync::OnceCell;

use crate::application::{ChannelInfo, ChatGateway, TranscriptLine, TICKET_CHANNEL_PREFIX};

const CHANNEL_NAME_LIMIT: usize = 90;

fn sanitize_channel_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(CHANNEL_NAME_LIMIT)
        .collect()
}

/// `ChatGateway` over the Discord HTTP API. Eligibility checks compare role
/// hierarchy between the bot and the target and never sanction the guild
/// owner; the API call itself remains the final arbiter and its failures are
/// handled by the executor.
pub struct DiscordGateway {
    http: Arc<Http>,
    bot_user_id: OnceCell<u64>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            bot_user_id: OnceCell::new(),
        }
    }

    async fn bot_user_id(&self) -> anyhow::Result<u64> {
        let id = self
            .bot_user_id
            .get_or_try_init(|| async {
                let me = self.http.get_current_user().await?;
                anyhow::Ok(me.id.get())
            })
            .await?;
        Ok(*id)
    }

    /// Role-hierarchy check shared by ban, kick and timeout eligibility.
    /// An unresolvable target is never eligible.
    async fn can_act_on(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        let guild = GuildId::new(guild_id);
        let target = match guild.member(&self.http, UserId::new(user_id)).await {
            Ok(member) => member,
            Err(_) => return Ok(false),
        };

        let partial = guild.to_partial_guild(&self.http).await?;
        if partial.owner_id == target.user.id {
            return Ok(false);
        }

        let me = guild.member(&self.http, UserId::new(self.bot_user_id().await?)).await?;
        let target_top = target
            .roles
            .iter()
            .filter_map(|role_id| partial.roles.get(role_id))
            .map(|role| role.position)
            .max()
            .unwrap_or_default();
        let my_top = me
            .roles
            .iter()
            .filter_map(|role_id| partial.roles.get(role_id))
            .map(|role| role.position)
            .max()
            .unwrap_or_default();
        Ok(my_top > target_top)
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    async fn create_ticket_channel(
        &self,
        guild_id: u64,
        opener_id: u64,
        opener_name: &str,
        staff_ids: &[u64],
    ) -> anyhow::Result<u64> {
        let allow = Permissions::VIEW_CHANNEL
            | Permissions::SEND_MESSAGES
            | Permissions::READ_MESSAGE_HISTORY;

        let mut member_ids = vec![opener_id, self.bot_user_id().await?];
        for id in staff_ids {
            if !member_ids.contains(id) {
                member_ids.push(*id);
            }
        }

        // deny @everyone, allow-list the participants
        let mut permissions = vec![PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(RoleId::new(guild_id)),
        }];
        for id in member_ids {
            permissions.push(PermissionOverwrite {
                allow,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(UserId::new(id)),
            });
        }

        let name = format!(
            "{}{}",
            TICKET_CHANNEL_PREFIX,
            sanitize_channel_name(opener_name)
        );
        let channel = GuildId::new(guild_id)
            .create_channel(
                &self.http,
                CreateChannel::new(name)
                    .kind(ChannelType::Text)
                    .permissions(permissions),
            )
            .await?;
        Ok(channel.id.get())
    }

    async fn delete_channel(&self, channel_id: u64) -> anyhow::Result<()> {
        ChannelId::new(channel_id).delete(&self.http).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> anyhow::Result<()> {
        ChannelId::new(channel_id).say(&self.http, text).await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<TranscriptLine>> {
        let mut messages = ChannelId::new(channel_id)
            .messages(&self.http, GetMessages::new().limit(limit as u8))
            .await?;
        // the API returns newest first
        messages.reverse();
        Ok(messages
            .into_iter()
            .map(|message| TranscriptLine {
                author_id: message.author.id.get().to_string(),
                author_name: message.author.name,
                text: message.content,
            })
            .collect())
    }

    async fn channel_directory(&self, guild_id: u64) -> anyhow::Result<Vec<ChannelInfo>> {
        let channels = GuildId::new(guild_id).channels(&self.http).await?;
        let mut directory: Vec<ChannelInfo> = channels
            .into_iter()
            .map(|(id, channel)| ChannelInfo {
                id: id.get().to_string(),
                name: channel.name,
                kind: channel.kind.name().to_string(),
            })
            .collect();
        directory.sort_by_key(|channel| channel.id.parse::<u64>().unwrap_or(0));
        Ok(directory)
    }

    async fn is_bannable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        self.can_act_on(guild_id, user_id).await
    }

    async fn is_kickable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        self.can_act_on(guild_id, user_id).await
    }

    async fn is_moderatable(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        self.can_act_on(guild_id, user_id).await
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await?;
        Ok(())
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<()> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await?;
        Ok(())
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until_unix: i64,
        reason: &str,
    ) -> anyhow::Result<()> {
        let until = Timestamp::from_unix_timestamp(until_unix)?;
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(())
    }

    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> anyhow::Result<()> {
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new().enable_communication(),
            )
            .await?;
        Ok(())
    }
}
