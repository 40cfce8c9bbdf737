use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use regex::Regex;
use serenity::all::{
    ActivityData, ButtonStyle, Channel, ChannelType, Command, CommandInteraction,
    CommandOptionType, ComponentInteraction, Context, CreateActionRow, CreateAttachment,
    CreateButton, CreateChannel, CreateCommand, CreateCommandOption, CreateEmbed,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateInvite, EditProfile,
    EventHandler, Guild, GuildId, Interaction, Message, Ready, ResolvedOption, ResolvedValue,
    UserId,
};
use serenity::async_trait;
use tracing::{error, info, warn};

use crate::adapter::StaffEntry;
use crate::application::{
    ActionExecutor, ChatGateway, InboundMessage, StaffRoster, TicketController, MUTE_WINDOW_SECS,
};

const OPEN_TICKET_BUTTON: &str = "open_ticket";
const STREAM_URL: &str = "https://www.twitch.tv/discord";
const NO_PERMISSION_NOTICE: &str = "You don't have permission to do that.";

fn extract_mention_ids(value: &str) -> Vec<u64> {
    let Ok(mention) = Regex::new(r"<@!?(\d+)>") else {
        return Vec::new();
    };
    mention
        .captures_iter(value)
        .filter_map(|capture| capture[1].parse().ok())
        .collect()
}

#[derive(Clone, Copy)]
enum StatusKind {
    Playing,
    Watching,
    Streaming,
}

impl StatusKind {
    fn parse(value: &str) -> Self {
        match value {
            "WATCHING" => StatusKind::Watching,
            "STREAMING" => StatusKind::Streaming,
            _ => StatusKind::Playing,
        }
    }
}

struct StatusConfig {
    kind: StatusKind,
    text: String,
}

/// Serenity-facing surface: slash commands, the open-ticket button and the
/// `+` prefix commands, all dispatching into the injected core components.
pub struct BotController {
    pub roster: Arc<StaffRoster>,
    pub controller: Arc<TicketController>,
    pub executor: Arc<ActionExecutor>,
    pub gateway: Arc<dyn ChatGateway>,
    status: RwLock<StatusConfig>,
}

impl BotController {
    pub fn new(
        roster: Arc<StaffRoster>,
        controller: Arc<TicketController>,
        executor: Arc<ActionExecutor>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        Self {
            roster,
            controller,
            executor,
            gateway,
            status: RwLock::new(StatusConfig {
                kind: StatusKind::Streaming,
                text: String::from("MANAGING {server_count} servers"),
            }),
        }
    }

    fn update_status(&self, ctx: &Context) {
        let guild_count = ctx.cache.guilds().len();
        let (kind, text) = {
            let status = self.status.read().unwrap();
            (status.kind, status.text.clone())
        };
        let text = text.replace("{server_count}", guild_count.to_string().as_str());
        let activity = match kind {
            StatusKind::Playing => ActivityData::playing(text),
            StatusKind::Watching => ActivityData::watching(text),
            StatusKind::Streaming => match ActivityData::streaming(text.clone(), STREAM_URL) {
                Ok(activity) => activity,
                Err(_) => ActivityData::playing(text),
            },
        };
        ctx.set_activity(Some(activity));
    }

    fn command_is_admin(cmd: &CommandInteraction) -> bool {
        cmd.member
            .as_ref()
            .and_then(|member| member.permissions)
            .map(|permissions| permissions.administrator())
            .unwrap_or(false)
    }

    /// Admin check for plain-text commands, answered from the guild cache.
    fn member_is_admin(&self, ctx: &Context, guild_id: GuildId, user_id: UserId) -> bool {
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return false;
        };
        if guild.owner_id == user_id {
            return true;
        }
        guild
            .members
            .get(&user_id)
            .map(|member| {
                member
                    .roles
                    .iter()
                    .filter_map(|role_id| guild.roles.get(role_id))
                    .any(|role| role.permissions.administrator())
            })
            .unwrap_or(false)
    }

    async fn respond_ephemeral(
        &self,
        ctx: &Context,
        cmd: &CommandInteraction,
        text: &str,
    ) -> anyhow::Result<()> {
        cmd.create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
        Ok(())
    }

    async fn reply(&self, ctx: &Context, msg: &Message, text: &str) {
        if let Err(e) = msg.channel_id.say(&ctx.http, text).await {
            warn!("Could not reply in channel {}: {}", msg.channel_id, e);
        }
    }

    async fn set_avatar_from_url(&self, ctx: &Context, url: &str) -> anyhow::Result<()> {
        let bytes = reqwest::get(url).await?.bytes().await?;
        let attachment = CreateAttachment::bytes(bytes.to_vec(), "avatar.png");
        let mut me = ctx.cache.current_user().clone();
        me.edit(&ctx.http, EditProfile::new().avatar(&attachment))
            .await?;
        Ok(())
    }

    // ── slash commands ──────────────────────────────────────────────

    async fn dispatch_command(&self, ctx: &Context, cmd: CommandInteraction) {
        let result = match cmd.data.name.as_str() {
            "ticket" => self.cmd_ticket(ctx, &cmd).await,
            "bot" => self.cmd_bot(ctx, &cmd).await,
            "acces" => self.cmd_access(ctx, &cmd).await,
            "leave" => self.cmd_leave(ctx, &cmd).await,
            "mute" => self.cmd_mute(ctx, &cmd, true).await,
            "unmute" => self.cmd_mute(ctx, &cmd, false).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!("Command /{} failed: {}", cmd.data.name, e);
            let _ = self
                .respond_ephemeral(ctx, &cmd, "Something went wrong while running the command.")
                .await;
        }
    }

    async fn cmd_ticket(&self, ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
        if !Self::command_is_admin(cmd) {
            return self.respond_ephemeral(ctx, cmd, NO_PERMISSION_NOTICE).await;
        }
        let embed = CreateEmbed::new()
            .title("Support")
            .description("Need help or want to report a member? Open a private ticket below.");
        let button = CreateButton::new(OPEN_TICKET_BUTTON)
            .label("Open a ticket")
            .style(ButtonStyle::Primary);
        cmd.create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(vec![CreateActionRow::Buttons(vec![button])]),
            ),
        )
        .await?;
        Ok(())
    }

    async fn cmd_bot(&self, ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
        if !self.roster.is_owner(cmd.user.id.get()) {
            return self.respond_ephemeral(ctx, cmd, NO_PERMISSION_NOTICE).await;
        }
        let options = cmd.data.options();
        let Some(ResolvedOption {
            name,
            value: ResolvedValue::SubCommand(args),
            ..
        }) = options.first()
        else {
            return self.respond_ephemeral(ctx, cmd, "Unknown subcommand.").await;
        };

        match *name {
            "setname" => {
                let Some(new_name) = str_arg(args, "name") else {
                    return self.respond_ephemeral(ctx, cmd, "Missing name.").await;
                };
                let mut me = ctx.cache.current_user().clone();
                me.edit(&ctx.http, EditProfile::new().username(new_name))
                    .await?;
                self.respond_ephemeral(ctx, cmd, &format!("Name changed to {}.", new_name))
                    .await
            }
            "setavatar" => {
                let Some(url) = str_arg(args, "url") else {
                    return self.respond_ephemeral(ctx, cmd, "Missing image url.").await;
                };
                self.set_avatar_from_url(ctx, url).await?;
                self.respond_ephemeral(ctx, cmd, "Avatar changed.").await
            }
            "setstatus" => {
                let kind = str_arg(args, "type").map(StatusKind::parse);
                let text = str_arg(args, "text");
                let (Some(kind), Some(text)) = (kind, text) else {
                    return self.respond_ephemeral(ctx, cmd, "Missing type or text.").await;
                };
                {
                    let mut status = self.status.write().unwrap();
                    status.kind = kind;
                    status.text = text.to_string();
                }
                self.update_status(ctx);
                self.respond_ephemeral(ctx, cmd, "Status updated.").await
            }
            _ => self.respond_ephemeral(ctx, cmd, "Unknown subcommand.").await,
        }
    }

    async fn cmd_access(&self, ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
        if !self.roster.is_privileged(cmd.user.id.get()) {
            return self.respond_ephemeral(ctx, cmd, NO_PERMISSION_NOTICE).await;
        }
        let Some((user_id, user_name)) = user_arg(&cmd.data.options()) else {
            return self.respond_ephemeral(ctx, cmd, "Missing member.").await;
        };
        self.roster.add_staff(StaffEntry::new(user_id, &user_name));
        self.respond_ephemeral(ctx, cmd, &format!("{} now has staff access.", user_name))
            .await
    }

    async fn cmd_leave(&self, ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
        if !self.roster.is_privileged(cmd.user.id.get()) {
            return self.respond_ephemeral(ctx, cmd, NO_PERMISSION_NOTICE).await;
        }
        let Some(guild_id) = cmd.guild_id else {
            return self.respond_ephemeral(ctx, cmd, "Only usable in a server.").await;
        };
        self.respond_ephemeral(ctx, cmd, "Leaving this server.").await?;
        guild_id.leave(&ctx.http).await?;
        Ok(())
    }

    async fn cmd_mute(
        &self,
        ctx: &Context,
        cmd: &CommandInteraction,
        mute: bool,
    ) -> anyhow::Result<()> {
        if !self.roster.is_privileged(cmd.user.id.get()) {
            return self.respond_ephemeral(ctx, cmd, NO_PERMISSION_NOTICE).await;
        }
        let Some(guild_id) = cmd.guild_id else {
            return self.respond_ephemeral(ctx, cmd, "Only usable in a server.").await;
        };
        let options = cmd.data.options();
        let Some((user_id, user_name)) = user_arg(&options) else {
            return self.respond_ephemeral(ctx, cmd, "Missing member.").await;
        };

        if mute {
            let reason = str_arg(&options, "reason").unwrap_or("No reason provided");
            let until_unix = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64
                + MUTE_WINDOW_SECS as i64;
            self.gateway
                .timeout(guild_id.get(), user_id, until_unix, reason)
                .await?;
            self.respond_ephemeral(ctx, cmd, &format!("{} is muted for 24 hours.", user_name))
                .await
        } else {
            self.gateway.clear_timeout(guild_id.get(), user_id).await?;
            self.respond_ephemeral(ctx, cmd, &format!("{} is no longer muted.", user_name))
                .await
        }
    }

    async fn open_ticket_interaction(&self, ctx: &Context, comp: ComponentInteraction) {
        let Some(guild_id) = comp.guild_id else {
            respond_component(ctx, &comp, "Tickets only work in a server.").await;
            return;
        };
        match self
            .controller
            .open_ticket(guild_id.get(), comp.user.id.get(), &comp.user.name)
            .await
        {
            Ok(channel_id) => {
                respond_component(ctx, &comp, &format!("Ticket created: <#{}>", channel_id)).await;
            }
            Err(e) => {
                error!("Could not create ticket: {}", e);
                respond_component(ctx, &comp, "Could not create the ticket.").await;
            }
        }
    }

    // ── prefix commands ─────────────────────────────────────────────

    async fn handle_prefix_command(&self, ctx: &Context, msg: &Message, guild_id: GuildId) {
        let mut parts = msg.content.split_whitespace();
        let Some(command) = parts.next() else {
            return;
        };
        let author_id = msg.author.id.get();

        match command {
            "+server" => {
                if !self.roster.is_privileged(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let lines: Vec<String> = ctx
                    .cache
                    .guilds()
                    .into_iter()
                    .map(|id| {
                        let name = id
                            .name(&ctx.cache)
                            .unwrap_or_else(|| String::from("<unknown>"));
                        format!("- {} ({})", name, id.get())
                    })
                    .collect();
                self.reply(ctx, msg, &format!("Connected servers:\n{}", lines.join("\n")))
                    .await;
            }
            "+inv" => {
                if !self.roster.is_privileged(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let Some(target_guild) = parts.next().and_then(|raw| raw.parse::<u64>().ok())
                else {
                    return self.reply(ctx, msg, "Usage: +inv <serverId>").await;
                };
                match self.mint_invite(ctx, target_guild).await {
                    Ok(url) => self.reply(ctx, msg, &url).await,
                    Err(e) => {
                        warn!("Could not mint invite for {}: {}", target_guild, e);
                        self.reply(ctx, msg, "Could not create an invite for that server.")
                            .await;
                    }
                }
            }
            "+add" => {
                if !self.roster.is_owner(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let ids = extract_mention_ids(&msg.content);
                if ids.is_empty() {
                    return self.reply(ctx, msg, "Missing member mention.").await;
                }
                for id in ids {
                    let display_name = msg
                        .mentions
                        .iter()
                        .find(|user| user.id.get() == id)
                        .map(|user| user.name.clone())
                        .unwrap_or_else(|| id.to_string());
                    self.roster.add_staff(StaffEntry::new(id, &display_name));
                }
                self.reply(ctx, msg, "Added to the staff list.").await;
            }
            "+del" => {
                if !self.roster.is_owner(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let ids = extract_mention_ids(&msg.content);
                if ids.is_empty() {
                    return self.reply(ctx, msg, "Missing member mention.").await;
                }
                for id in ids {
                    self.roster.remove_staff(id);
                }
                self.reply(ctx, msg, "Removed from the staff list.").await;
            }
            "+list" => {
                if !self.roster.is_owner(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let staff = self.roster.list_staff();
                if staff.is_empty() {
                    return self.reply(ctx, msg, "No staff registered.").await;
                }
                let lines: Vec<String> = staff
                    .iter()
                    .map(|entry| format!("- {} ({})", entry.display_name, entry.id))
                    .collect();
                self.reply(ctx, msg, &format!("Staff:\n{}", lines.join("\n")))
                    .await;
            }
            "+avatar" => {
                if !self.roster.is_owner(author_id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                let Some(attachment) = msg.attachments.first() else {
                    return self.reply(ctx, msg, "Attach an image to use as avatar.").await;
                };
                match self.set_avatar_from_url(ctx, &attachment.url).await {
                    Ok(()) => self.reply(ctx, msg, "Avatar changed.").await,
                    Err(e) => {
                        warn!("Could not set avatar: {}", e);
                        self.reply(ctx, msg, "Could not set the avatar.").await;
                    }
                }
            }
            "+logs" => {
                if !self.member_is_admin(ctx, guild_id, msg.author.id) {
                    return self.reply(ctx, msg, NO_PERMISSION_NOTICE).await;
                }
                match guild_id
                    .create_channel(
                        &ctx.http,
                        CreateChannel::new("moderation-logs").kind(ChannelType::Text),
                    )
                    .await
                {
                    Ok(channel) => {
                        self.executor.set_log_channel(channel.id.get());
                        self.reply(ctx, msg, &format!("Log channel ready: <#{}>", channel.id))
                            .await;
                    }
                    Err(e) => {
                        warn!("Could not create log channel: {}", e);
                        self.reply(ctx, msg, "Could not create the log channel.").await;
                    }
                }
            }
            _ => {}
        }
    }

    async fn mint_invite(&self, ctx: &Context, guild_id: u64) -> anyhow::Result<String> {
        let channels = GuildId::new(guild_id).channels(&ctx.http).await?;
        let channel = channels
            .values()
            .find(|channel| channel.kind == ChannelType::Text)
            .ok_or_else(|| anyhow::anyhow!("no text channel available"))?;
        let invite = channel
            .id
            .create_invite(&ctx.http, CreateInvite::new().max_age(86400))
            .await?;
        Ok(format!("https://discord.gg/{}", invite.code))
    }
}

#[async_trait]
impl EventHandler for BotController {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);
        self.update_status(&ctx);

        let commands = vec![
            CreateCommand::new("ticket").description("Post the ticket opener (admin only)"),
            CreateCommand::new("bot")
                .description("Customize the bot identity (owner only)")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::SubCommand,
                        "setname",
                        "Change the bot name",
                    )
                    .add_sub_option(
                        CreateCommandOption::new(CommandOptionType::String, "name", "New name")
                            .required(true),
                    ),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::SubCommand,
                        "setavatar",
                        "Change the bot avatar",
                    )
                    .add_sub_option(
                        CreateCommandOption::new(CommandOptionType::String, "url", "Image url")
                            .required(true),
                    ),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::SubCommand,
                        "setstatus",
                        "Change the bot status",
                    )
                    .add_sub_option(
                        CreateCommandOption::new(
                            CommandOptionType::String,
                            "type",
                            "PLAYING, WATCHING or STREAMING",
                        )
                        .add_string_choice("Play", "PLAYING")
                        .add_string_choice("Watch", "WATCHING")
                        .add_string_choice("Stream", "STREAMING")
                        .required(true),
                    )
                    .add_sub_option(
                        CreateCommandOption::new(CommandOptionType::String, "text", "Status text")
                            .required(true),
                    ),
                ),
            CreateCommand::new("acces")
                .description("Grant a member staff access")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::User, "user", "Member to grant")
                        .required(true),
                ),
            CreateCommand::new("leave").description("Make the bot leave this server"),
            CreateCommand::new("mute")
                .description("Timeout a member for 24 hours")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::User, "user", "Member to mute")
                        .required(true),
                )
                .add_option(CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "Reason",
                )),
            CreateCommand::new("unmute")
                .description("Lift a member timeout")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::User, "user", "Member to unmute")
                        .required(true),
                ),
        ];

        if let Err(e) = Command::set_global_commands(&ctx.http, commands).await {
            error!("Could not register slash commands: {}", e);
        }
    }

    async fn guild_create(&self, ctx: Context, _guild: Guild, _is_new: Option<bool>) {
        self.update_status(&ctx);
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => self.dispatch_command(&ctx, cmd).await,
            Interaction::Component(comp) if comp.data.custom_id == OPEN_TICKET_BUTTON => {
                self.open_ticket_interaction(&ctx, comp).await
            }
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        if msg.content.starts_with('+') {
            self.handle_prefix_command(&ctx, &msg, guild_id).await;
            return;
        }

        let channel_name = match msg.channel(&ctx).await {
            Ok(Channel::Guild(channel)) => channel.name,
            _ => return,
        };

        self.controller
            .handle_message(InboundMessage {
                guild_id: guild_id.get(),
                channel_id: msg.channel_id.get(),
                channel_name,
                author_id: msg.author.id.get(),
                author_name: msg.author.name.clone(),
                text: msg.content.clone(),
                attachment_count: msg.attachments.len(),
            })
            .await;
    }
}

async fn respond_component(ctx: &Context, comp: &ComponentInteraction, text: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(true),
    );
    if let Err(e) = comp.create_response(&ctx.http, response).await {
        warn!("Could not answer component interaction: {}", e);
    }
}

fn str_arg<'a>(args: &'a [ResolvedOption<'a>], key: &str) -> Option<&'a str> {
    args.iter().find_map(|option| match option {
        ResolvedOption {
            name,
            value: ResolvedValue::String(value),
            ..
        } if *name == key => Some(*value),
        _ => None,
    })
}

fn user_arg(args: &[ResolvedOption<'_>]) -> Option<(u64, String)> {
    args.iter().find_map(|option| match &option.value {
        ResolvedValue::User(user, _) => Some((user.id.get(), user.name.clone())),
        _ => None,
    })
}
