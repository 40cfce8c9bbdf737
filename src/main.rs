use std::env;
use std::sync::Arc;

use anyhow::Context as _;
use serenity::http::Http;
use serenity::prelude::GatewayIntents;
use serenity::Client;
use tracing_subscriber::EnvFilter;

use wardenbot::{
    ActionExecutor, BotConfig, BotController, ChatGateway, DecisionAgent, DiscordGateway,
    OllamaBackend, RosterDatabase, SessionRegistry, StaffRoster, TicketController,
    TICKET_PROMPT_FILE,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wardenbot=info,serenity=warn")),
        )
        .init();

    let token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;
    let config = Arc::new(BotConfig::from_env()?);
    let prompt_template = std::fs::read_to_string(TICKET_PROMPT_FILE)
        .with_context(|| format!("Could not read the prompt template {}", TICKET_PROMPT_FILE))?;

    let http = Arc::new(Http::new(&token));
    let gateway: Arc<dyn ChatGateway> = Arc::new(DiscordGateway::new(http));
    let roster = Arc::new(StaffRoster::new(config.owner_id, RosterDatabase::try_init()));
    let registry = Arc::new(SessionRegistry::new());

    let agent = DecisionAgent::new(
        &config.bot_name,
        &prompt_template,
        config.owner_id,
        config.default_target_to_author,
        Arc::new(OllamaBackend::from_env()),
    );
    let executor = Arc::new(ActionExecutor::new(
        gateway.clone(),
        registry.clone(),
        config.owner_id,
    ));
    let controller = Arc::new(TicketController::new(
        gateway.clone(),
        registry.clone(),
        roster.clone(),
        agent,
        executor.clone(),
    ));

    let handler = BotController::new(roster, controller, executor, gateway);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("Could not build the gateway client")?;

    client.start().await.context("Gateway connection failed")?;
    Ok(())
}
