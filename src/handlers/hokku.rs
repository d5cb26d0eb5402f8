use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ReplyParameters};
use tracing::{debug, info};

use crate::state::AppState;
use crate::utils::telegram::{get_file_url, start_chat_action_heartbeat};

/// Replies to a photo message with a generated hokku. Albums arrive as one
/// message per photo sharing a media-group id; only the first admitted
/// message of an album produces a reply.
pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !state.seen_groups.admit(message.media_group_id()) {
        debug!(
            chat_id = message.chat.id.0,
            "skipping already-handled album message"
        );
        return Ok(());
    }

    // Telegram orders photo sizes smallest first; take the largest.
    let Some(photo) = message.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };

    let image_url = get_file_url(&bot, &photo.file.id).await?;
    let _typing = start_chat_action_heartbeat(bot.clone(), message.chat.id, ChatAction::Typing);

    match state.pipeline.generate(&image_url).await {
        Some(text) => {
            bot.send_message(message.chat.id, text)
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
        }
        None => {
            info!(chat_id = message.chat.id.0, "no hokku produced; staying silent");
        }
    }

    Ok(())
}
