//! Command handlers. Each prints its result as pretty JSON on stdout.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use sarufi_core::{
    load_flows, load_intents, AccessTokenRequest, ConversationRequest, ConversationStatusRequest,
    CreateBotRequest, PredictRequest, RegisterRequest,
};
use serde::Serialize;
use tracing::info;

use crate::config::{Credentials, DotEnvReader, Settings, PASSWORD_KEY, TOKEN_KEY, USERNAME_KEY};
use crate::manager::Manager;
use crate::Commands;

#[derive(Debug, Subcommand)]
pub enum BotsCommand {
    /// List your chatbots
    List,

    /// Show one chatbot
    Get { id: i64 },

    /// Create a chatbot
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "general")]
        industry: String,
        /// Show the bot on the community page
        #[arg(long)]
        visible: bool,
        /// JSON file mapping intent names to example phrases
        #[arg(long, value_name = "FILE")]
        intents: Option<PathBuf>,
        /// JSON file mapping node names to flow nodes
        #[arg(long, value_name = "FILE")]
        flows: Option<PathBuf>,
    },

    /// Change a chatbot; omitted fields keep their current value
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "FILE")]
        intents: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        flows: Option<PathBuf>,
    },

    /// Delete a chatbot
    Delete { id: i64 },

    /// List the chat ids that have talked to a chatbot
    Users { id: i64 },
}

/// What every command gets to work with.
pub struct Context<'a> {
    pub reader: &'a DotEnvReader,
    pub settings: &'a Settings,
    pub manager: &'a Manager,
}

pub fn run(command: Commands, ctx: &Context<'_>) -> Result<()> {
    match command {
        Commands::Register { username, password } => {
            let credentials = explicit_credentials(ctx, username, password)?;
            let response = ctx.manager.with_api(|api| {
                api.register(&RegisterRequest {
                    username: credentials.username,
                    password: credentials.password,
                })
            })?;
            print_json(&response)
        }
        Commands::Login {
            username,
            password,
            save,
        } => login(ctx, username, password, save),
        Commands::AccessToken {
            api_key,
            api_secret,
        } => {
            let request = AccessTokenRequest {
                api_key: required(api_key.or_else(|| ctx.settings.api_key.clone()), "--api-key or SARUFI_API_KEY")?,
                api_secret: required(
                    api_secret.or_else(|| ctx.settings.api_secret.clone()),
                    "--api-secret or SARUFI_API_SECRET",
                )?,
            };
            let response = ctx.manager.with_api(|api| api.access_token(&request))?;
            print_json(&response)
        }
        Commands::Profile => print_json(&ctx.manager.with_session(|api| Ok(api.profile()?))?),
        Commands::Bots { command } => bots(ctx, command),
        Commands::Chat {
            bot_id,
            message,
            chat_id,
            channel,
            language,
        } => {
            let mut request = ConversationRequest::text(bot_id, chat_id, message);
            request.channel = channel;
            request.language = language;
            let reply = ctx.manager.with_session(|api| Ok(api.send_message(&mut request)?))?;
            info!(chat_id = %request.chat_id, "conversation turn sent");
            print_json(&serde_json::json!({
                "chat_id": request.chat_id,
                "reply": reply,
            }))
        }
        Commands::Status { bot_id, chat_id } => {
            let request = ConversationStatusRequest { chat_id, bot_id };
            print_json(&ctx.manager.with_session(|api| Ok(api.conversation_status(&request)?))?)
        }
        Commands::Predict { bot_id, message } => {
            let request = PredictRequest { message, bot_id };
            print_json(&ctx.manager.with_session(|api| Ok(api.predict_intent(&request)?))?)
        }
        Commands::History { bot_id, chat_id } => print_json(
            &ctx.manager
                .with_session(|api| Ok(api.conversation_history(bot_id, &chat_id)?))?,
        ),
    }
}

fn login(ctx: &Context<'_>, username: Option<String>, password: Option<String>, save: bool) -> Result<()> {
    let credentials = explicit_credentials(ctx, username, password)?;
    ctx.manager.set_credentials(credentials.clone());
    let response = ctx.manager.with_api(|api| {
        api.authenticate(&credentials.username, &credentials.password)
    })?;

    if save {
        ctx.reader.set(USERNAME_KEY, &credentials.username)?;
        ctx.reader.set(PASSWORD_KEY, &credentials.password)?;
        ctx.reader.set(TOKEN_KEY, &response.token)?;
        info!(path = %ctx.reader.path().display(), "saved credentials and token");
    }
    print_json(&response)
}

fn bots(ctx: &Context<'_>, command: BotsCommand) -> Result<()> {
    let manager = ctx.manager;
    match command {
        BotsCommand::List => print_json(&manager.with_session(|api| Ok(api.list_bots()?))?),
        BotsCommand::Get { id } => print_json(&manager.with_session(|api| Ok(api.get_bot(id)?))?),
        BotsCommand::Create {
            name,
            description,
            industry,
            visible,
            intents,
            flows,
        } => {
            let request = CreateBotRequest {
                name,
                description,
                industry,
                visible_on_community: visible,
                intents: intents.map(load_intents).transpose()?.unwrap_or_default(),
                flows: flows.map(load_flows).transpose()?.unwrap_or_default(),
            };
            print_json(&manager.with_session(|api| Ok(api.create_bot(&request)?))?)
        }
        BotsCommand::Update {
            id,
            name,
            description,
            intents,
            flows,
        } => {
            let intents = intents.map(load_intents).transpose()?;
            let flows = flows.map(load_flows).transpose()?;
            let updated = manager.with_session(|api| {
                let mut bot = api.get_bot(id)?;
                if let Some(name) = name {
                    bot.name = name;
                }
                if let Some(description) = description {
                    bot.description = description;
                }
                if let Some(intents) = intents {
                    bot.intents = intents;
                }
                if let Some(flows) = flows {
                    bot.flows = flows;
                }
                Ok(api.update_bot(id, &bot.to_update())?)
            })?;
            print_json(&updated)
        }
        BotsCommand::Delete { id } => {
            manager.with_session(|api| Ok(api.delete_bot(id)?))?;
            print_json(&serde_json::json!({"deleted": id}))
        }
        BotsCommand::Users { id } => print_json(&manager.with_session(|api| Ok(api.chat_users(id)?))?),
    }
}

/// Flags win over the configured credentials, field by field.
fn explicit_credentials(
    ctx: &Context<'_>,
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials> {
    let configured = ctx.manager.credentials();
    let credentials = Credentials {
        username: username.unwrap_or(configured.username),
        password: password.unwrap_or(configured.password),
    };
    if !credentials.is_complete() {
        bail!("username and password are required: pass --username/--password or configure {USERNAME_KEY} and {PASSWORD_KEY}");
    }
    Ok(credentials)
}

fn required(value: Option<String>, hint: &str) -> Result<String> {
    match value.filter(|v| !v.is_empty()) {
        Some(value) => Ok(value),
        None => bail!("missing value: pass {hint}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering output")?;
    println!("{rendered}");
    Ok(())
}
