mod discord;
mod endpoints;
mod roster_repository;
pub use discord::DiscordGateway;
pub use endpoints::BotController;
pub use roster_repository::RosterDatabase;
pub use roster_repository::StaffEntry;
