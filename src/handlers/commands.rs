use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

use crate::config::START_GREETING;

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, START_GREETING)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}
