use std::error::Error;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::InlineQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod dedup;
mod handlers;
mod llm;
mod pipeline;
mod state;
mod utils;

use config::CONFIG;
use handlers::{commands, hokku, inline};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting TelegramHokkuBot");

    let state = AppState::new();

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .endpoint(ignore_message);

    let inline_handler = Update::filter_inline_query().endpoint(handle_inline_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(inline_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(bot: Bot, message: Message, command: Command) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, message).await?,
    }
    Ok(())
}

async fn handle_photo(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = hokku::photo_handler(bot, state, message).await {
            error!("photo handler failed: {err}");
        }
    });
    Ok(())
}

async fn handle_inline_query(bot: Bot, query: InlineQuery) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = inline::caps_handler(bot, query).await {
            error!("inline query handler failed: {err}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
