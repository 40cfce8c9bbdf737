mod adapter;
mod application;
pub use adapter::BotController;
pub use adapter::DiscordGateway;
pub use adapter::RosterDatabase;
pub use adapter::StaffEntry;
pub use application::Action;
pub use application::ActionExecutor;
pub use application::BotConfig;
pub use application::ChannelInfo;
pub use application::ChatGateway;
pub use application::ConversationContext;
pub use application::Decision;
pub use application::DecisionAgent;
pub use application::DecisionBackend;
pub use application::InboundMessage;
pub use application::OllamaBackend;
pub use application::SessionRegistry;
pub use application::StaffRoster;
pub use application::TicketController;
pub use application::TicketSession;
pub use application::TranscriptLine;
pub use application::TICKET_PROMPT_FILE;
