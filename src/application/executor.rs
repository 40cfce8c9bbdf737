use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use super::{Action, ChatGateway, Decision, SessionRegistry, MUTE_WINDOW_SECS};

pub(crate) const DELETE_GRACE: Duration = Duration::from_secs(5);

const CANNOT_SANCTION_NOTICE: &str = "This member cannot be sanctioned.";
const SANCTION_FAILED_NOTICE: &str = "The sanction could not be applied.";
const CLOSING_NOTICE: &str = "This ticket will be deleted in a few seconds.";

/// Applies a validated decision to the platform. Sanctions are re-checked
/// against live membership data before the call; every platform failure is
/// reported into the channel and logged, never propagated into the event
/// loop. Ban and kick are irreversible once issued.
pub struct ActionExecutor {
    gateway: Arc<dyn ChatGateway>,
    registry: Arc<SessionRegistry>,
    owner_id: u64,
    // 0 = no log channel configured
    log_channel: AtomicU64,
}

impl ActionExecutor {
    pub fn new(gateway: Arc<dyn ChatGateway>, registry: Arc<SessionRegistry>, owner_id: u64) -> Self {
        Self {
            gateway,
            registry,
            owner_id,
            log_channel: AtomicU64::new(0),
        }
    }

    pub fn set_log_channel(&self, channel_id: u64) {
        self.log_channel.store(channel_id, Ordering::SeqCst);
    }

    pub fn log_channel(&self) -> Option<u64> {
        match self.log_channel.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub async fn apply(&self, guild_id: u64, channel_id: u64, decision: &Decision) {
        match decision.action {
            Action::None => {}
            Action::Ban | Action::Kick | Action::Mute => {
                self.sanction(guild_id, channel_id, decision).await
            }
            Action::DeleteTicket => self.close_ticket(channel_id).await,
            Action::PingOwner => {
                let text = format!("<@{}> your attention is requested here.", self.owner_id);
                self.notify(channel_id, &text).await;
            }
        }
    }

    async fn sanction(&self, guild_id: u64, channel_id: u64, decision: &Decision) {
        let Some(target) = decision.target_user_id else {
            // the decision client already rejects targetless sanctions
            self.notify(channel_id, CANNOT_SANCTION_NOTICE).await;
            return;
        };
        let reason = decision
            .reason
            .clone()
            .unwrap_or_else(|| String::from("No reason provided"));

        let eligible = match decision.action {
            Action::Ban => self.gateway.is_bannable(guild_id, target).await,
            Action::Kick => self.gateway.is_kickable(guild_id, target).await,
            Action::Mute => self.gateway.is_moderatable(guild_id, target).await,
            _ => return,
        }
        .unwrap_or(false);

        if !eligible {
            self.notify(channel_id, CANNOT_SANCTION_NOTICE).await;
            return;
        }

        let outcome = match decision.action {
            Action::Ban => self.gateway.ban(guild_id, target, &reason).await,
            Action::Kick => self.gateway.kick(guild_id, target, &reason).await,
            Action::Mute => {
                let until_unix = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap()
                    .as_secs() as i64
                    + MUTE_WINDOW_SECS as i64;
                self.gateway
                    .timeout(guild_id, target, until_unix, &reason)
                    .await
            }
            _ => return,
        };

        match outcome {
            Ok(()) => {
                info!(
                    "Applied {} to user {} in guild {}: {}",
                    decision.action.as_wire(),
                    target,
                    guild_id,
                    reason
                );
                let line = format!(
                    "[MOD] {} user {} — {}",
                    decision.action.as_wire(),
                    target,
                    reason
                );
                self.emit_log(&line).await;
            }
            Err(e) => {
                warn!(
                    "Could not apply {} to user {}: {}",
                    decision.action.as_wire(),
                    target,
                    e
                );
                self.notify(channel_id, SANCTION_FAILED_NOTICE).await;
            }
        }
    }

    /// Schedules the grace-delayed deletion exactly once per channel; a
    /// repeated delete decision finds the session already closing and
    /// returns.
    async fn close_ticket(&self, channel_id: u64) {
        if !self.registry.mark_closing(channel_id) {
            return;
        }
        self.notify(channel_id, CLOSING_NOTICE).await;

        let gateway = self.gateway.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DELETE_GRACE).await;
            if let Err(e) = gateway.delete_channel(channel_id).await {
                warn!("Could not delete ticket channel {}: {}", channel_id, e);
            }
            registry.delete(channel_id);
        });
    }

    async fn emit_log(&self, line: &str) {
        let Some(log_channel) = self.log_channel() else {
            return;
        };
        if let Err(e) = self.gateway.send_message(log_channel, line).await {
            warn!("Could not write to log channel: {}", e);
        }
    }

    async fn notify(&self, channel_id: u64, text: &str) {
        if let Err(e) = self.gateway.send_message(channel_id, text).await {
            warn!("Could not send notice to channel {}: {}", channel_id, e);
        }
    }
}

#[cfg(test)]
mod executor_test {
    use super::*;
    use crate::application::doubles::RecordingGateway;
    use crate::application::TicketSession;

    const OWNER: u64 = 1000;
    const GUILD: u64 = 1;
    const TICKET: u64 = 500;

    fn decision(action: Action, target: Option<u64>, reason: Option<&str>) -> Decision {
        Decision {
            reply: String::from("ok"),
            action,
            target_user_id: target,
            reason: reason.map(String::from),
            new_step: None,
        }
    }

    fn executor() -> (Arc<RecordingGateway>, Arc<SessionRegistry>, ActionExecutor) {
        let gateway = Arc::new(RecordingGateway::new());
        let registry = Arc::new(SessionRegistry::new());
        let executor = ActionExecutor::new(gateway.clone(), registry.clone(), OWNER);
        (gateway, registry, executor)
    }

    #[tokio::test]
    async fn should_ban_eligible_target_with_reason_and_log() {
        let (gateway, _registry, executor) = executor();
        executor.set_log_channel(900);

        executor
            .apply(GUILD, TICKET, &decision(Action::Ban, Some(42), Some("spam")))
            .await;

        let banned = gateway.banned.lock().unwrap().clone();
        assert_eq!(banned, vec![(42, String::from("spam"))]);

        let log_lines = gateway.sent_to(900);
        assert_eq!(log_lines.len(), 1);
        assert!(log_lines[0].contains("BAN"));
        assert!(log_lines[0].contains("42"));
    }

    #[tokio::test]
    async fn should_skip_ban_and_notify_when_target_not_bannable() {
        let (gateway, _registry, executor) = executor();
        gateway.bannable.store(false, Ordering::SeqCst);

        executor
            .apply(GUILD, TICKET, &decision(Action::Ban, Some(42), Some("spam")))
            .await;

        assert!(gateway.banned.lock().unwrap().is_empty());
        let notices = gateway.sent_to(TICKET);
        assert_eq!(notices, vec![String::from(CANNOT_SANCTION_NOTICE)]);
    }

    #[tokio::test]
    async fn should_apply_fixed_mute_window() {
        let (gateway, _registry, executor) = executor();
        let before = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        executor
            .apply(GUILD, TICKET, &decision(Action::Mute, Some(42), None))
            .await;

        let timeouts = gateway.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts.len(), 1);
        let (user, until, reason) = &timeouts[0];
        assert_eq!(*user, 42);
        assert_eq!(reason, "No reason provided");
        assert!(*until >= before + MUTE_WINDOW_SECS as i64);
    }

    #[tokio::test]
    async fn should_kick_eligible_target() {
        let (gateway, _registry, executor) = executor();

        executor
            .apply(GUILD, TICKET, &decision(Action::Kick, Some(7), Some("raid")))
            .await;

        let kicked = gateway.kicked.lock().unwrap().clone();
        assert_eq!(kicked, vec![(7, String::from("raid"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_delete_ticket_after_grace_and_clear_session() {
        let (gateway, registry, executor) = executor();
        registry.put(TICKET, TicketSession::new("init"));

        executor
            .apply(GUILD, TICKET, &decision(Action::DeleteTicket, None, None))
            .await;

        assert!(registry.get(TICKET).unwrap().closing);
        assert!(gateway.deleted.lock().unwrap().is_empty());

        tokio::time::sleep(DELETE_GRACE + Duration::from_secs(1)).await;
        assert_eq!(gateway.deleted.lock().unwrap().clone(), vec![TICKET]);
        assert!(registry.get(TICKET).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_double_schedule_repeated_delete() {
        let (gateway, registry, executor) = executor();
        registry.put(TICKET, TicketSession::new("init"));

        let delete = decision(Action::DeleteTicket, None, None);
        executor.apply(GUILD, TICKET, &delete).await;
        executor.apply(GUILD, TICKET, &delete).await;

        // one closing notice, one scheduled deletion
        assert_eq!(gateway.sent_to(TICKET).len(), 1);
        tokio::time::sleep(DELETE_GRACE + Duration::from_secs(1)).await;
        assert_eq!(gateway.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_mention_owner_on_ping_owner() {
        let (gateway, _registry, executor) = executor();

        executor
            .apply(GUILD, TICKET, &decision(Action::PingOwner, None, None))
            .await;

        let notices = gateway.sent_to(TICKET);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains(&format!("<@{}>", OWNER)));
    }

    #[tokio::test]
    async fn should_do_nothing_for_none() {
        let (gateway, _registry, executor) = executor();

        executor
            .apply(GUILD, TICKET, &decision(Action::None, None, None))
            .await;

        assert!(gateway.sent.lock().unwrap().is_empty());
        assert!(gateway.banned.lock().unwrap().is_empty());
    }
}
