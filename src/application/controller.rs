use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{
    ActionExecutor, ChatGateway, ConversationContext, DecisionAgent, SessionRegistry, StaffRoster,
    TicketSession,
};

pub const TICKET_CHANNEL_PREFIX: &str = "ticket-";
pub const TRANSCRIPT_WINDOW: usize = 25;

// lets the freshly created channel propagate before the first message
const OPENING_PROMPT_DELAY: Duration = Duration::from_secs(1);

const INITIAL_STEP: &str = "init";
const EPHEMERAL_STEP: &str = "conversation";
const TURN_FAILURE_NOTICE: &str =
    "Something went wrong while handling this ticket. Please try again.";

/// One qualifying inbound message, already stripped of platform types.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub guild_id: u64,
    pub channel_id: u64,
    pub channel_name: String,
    pub author_id: u64,
    pub author_name: String,
    pub text: String,
    pub attachment_count: usize,
}

/// Ticket lifecycle: session creation on the open trigger, one decision
/// round-trip per inbound message, teardown through the executor's delete
/// path. Turns on the same channel are serialized by the registry's
/// per-channel lock; unrelated tickets never wait on each other.
pub struct TicketController {
    gateway: Arc<dyn ChatGateway>,
    registry: Arc<SessionRegistry>,
    roster: Arc<StaffRoster>,
    agent: DecisionAgent,
    executor: Arc<ActionExecutor>,
}

impl TicketController {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        registry: Arc<SessionRegistry>,
        roster: Arc<StaffRoster>,
        agent: DecisionAgent,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            gateway,
            registry,
            roster,
            agent,
            executor,
        }
    }

    /// Creates the private ticket channel and its session, then sends the
    /// opening prompt once the channel had a moment to propagate.
    pub async fn open_ticket(
        &self,
        guild_id: u64,
        opener_id: u64,
        opener_name: &str,
    ) -> anyhow::Result<u64> {
        let staff_ids: Vec<u64> = self.roster.list_staff().iter().map(|e| e.id).collect();
        let channel_id = self
            .gateway
            .create_ticket_channel(guild_id, opener_id, opener_name, &staff_ids)
            .await?;
        self.registry.put(channel_id, TicketSession::new(INITIAL_STEP));
        info!("Opened ticket channel {} for user {}", channel_id, opener_id);

        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            tokio::time::sleep(OPENING_PROMPT_DELAY).await;
            let prompt = format!("Hello <@{}>, what is this ticket about?", opener_id);
            if let Err(e) = gateway.send_message(channel_id, &prompt).await {
                warn!("Could not send opening prompt to {}: {}", channel_id, e);
            }
        });
        Ok(channel_id)
    }

    pub async fn handle_message(&self, message: InboundMessage) {
        let lock = self.registry.turn_lock(message.channel_id);
        let _turn = lock.lock().await;

        let (session, tracked) = match self.registry.get(message.channel_id) {
            Some(session) => (session, true),
            // a ticket channel that predates the current process keeps
            // answering, without persisting step state
            None if message.channel_name.starts_with(TICKET_CHANNEL_PREFIX) => {
                (TicketSession::new(EPHEMERAL_STEP), false)
            }
            None => return,
        };
        if session.closing {
            return;
        }

        if let Err(e) = self.run_turn(&message, &session, tracked).await {
            error!(
                "Ticket turn failed in channel {}: {}",
                message.channel_id, e
            );
            if let Err(e) = self
                .gateway
                .send_message(message.channel_id, TURN_FAILURE_NOTICE)
                .await
            {
                warn!("Could not send failure notice: {}", e);
            }
        }
    }

    async fn run_turn(
        &self,
        message: &InboundMessage,
        session: &TicketSession,
        tracked: bool,
    ) -> anyhow::Result<()> {
        let context = self.gather_context(message, session).await?;
        let decision = self.agent.decide(&context).await;

        if let Err(e) = self
            .gateway
            .send_message(message.channel_id, &decision.reply)
            .await
        {
            warn!("Could not deliver reply to {}: {}", message.channel_id, e);
        }

        if tracked {
            if let Some(step) = &decision.new_step {
                self.registry.update_step(message.channel_id, step);
            }
        }

        self.executor
            .apply(message.guild_id, message.channel_id, &decision)
            .await;
        Ok(())
    }

    async fn gather_context(
        &self,
        message: &InboundMessage,
        session: &TicketSession,
    ) -> anyhow::Result<ConversationContext> {
        let mut channels = self.gateway.channel_directory(message.guild_id).await?;
        channels.sort_by_key(|channel| channel.id.parse::<u64>().unwrap_or(0));
        let transcript = self
            .gateway
            .recent_messages(message.channel_id, TRANSCRIPT_WINDOW)
            .await?;

        let text = if message.text.trim().is_empty() {
            String::from("[empty message]")
        } else {
            message.text.clone()
        };

        Ok(ConversationContext {
            step: session.step.clone(),
            owner_id: self.roster.owner_id().to_string(),
            staff: self.roster.list_staff(),
            channels,
            transcript,
            author_id: message.author_id.to_string(),
            author_name: message.author_name.clone(),
            message: text,
            attachment_count: message.attachment_count,
        })
    }
}
