mod controller;
mod decision_agent;
mod executor;
mod gateway;
mod roster;
mod session;
pub use controller::InboundMessage;
pub use controller::TicketController;
pub use controller::TICKET_CHANNEL_PREFIX;
pub use controller::TRANSCRIPT_WINDOW;
pub use decision_agent::DecisionAgent;
pub use decision_agent::DecisionBackend;
pub use decision_agent::OllamaBackend;
pub use decision_agent::TICKET_PROMPT_FILE;
pub use executor::ActionExecutor;
pub use gateway::ChannelInfo;
pub use gateway::ChatGateway;
pub use gateway::TranscriptLine;
pub use roster::StaffRoster;
pub use session::SessionRegistry;
pub use session::TicketSession;

#[cfg(test)]
pub(crate) mod doubles;

use anyhow::Context;
use serde::Serialize;
use std::env;

use crate::adapter::StaffEntry;

/// Fixed communication-timeout window for the MUTE sanction and the `/mute`
/// command.
pub const MUTE_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Moderation effect requested by the decision model for one turn.
/// Anything the model emits outside this set is coerced to `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    None,
    Ban,
    Kick,
    Mute,
    DeleteTicket,
    PingOwner,
}

impl Action {
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "BAN" => Action::Ban,
            "KICK" => Action::Kick,
            "MUTE" => Action::Mute,
            "DELETE_TICKET" => Action::DeleteTicket,
            "PING_OWNER" => Action::PingOwner,
            _ => Action::None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Action::None => "NONE",
            Action::Ban => "BAN",
            Action::Kick => "KICK",
            Action::Mute => "MUTE",
            Action::DeleteTicket => "DELETE_TICKET",
            Action::PingOwner => "PING_OWNER",
        }
    }
}

/// Validated output of one decision round-trip.
#[derive(Clone, Debug)]
pub struct Decision {
    pub reply: String,
    pub action: Action,
    pub target_user_id: Option<u64>,
    pub reason: Option<String>,
    pub new_step: Option<String>,
}

/// Everything the decision model sees for one turn. Rebuilt from scratch
/// every turn; the transcript window is the only conversational memory.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub step: String,
    pub owner_id: String,
    pub staff: Vec<StaffEntry>,
    pub channels: Vec<ChannelInfo>,
    pub transcript: Vec<TranscriptLine>,
    pub author_id: String,
    pub author_name: String,
    pub message: String,
    pub attachment_count: usize,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub owner_id: u64,
    pub bot_name: String,
    /// Legacy behavior: substitute the message author when the model omits
    /// the sanction target. Off by default, see DESIGN.md.
    pub default_target_to_author: bool,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let owner_id = env::var("OWNER_ID")
            .context("OWNER_ID is not set")?
            .parse()
            .context("OWNER_ID must be a numeric user id")?;
        let bot_name = env::var("BOT_NAME").unwrap_or(String::from("Warden"));
        let default_target_to_author = env::var("DEFAULT_TARGET_TO_AUTHOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self {
            owner_id,
            bot_name,
            default_target_to_author,
        })
    }
}
