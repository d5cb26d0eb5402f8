use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQuery, InlineQueryResult, InlineQueryResultArticle, InputMessageContent,
    InputMessageContentText,
};

/// Inline queries get a single article that shouts the query back.
pub async fn caps_handler(bot: Bot, query: InlineQuery) -> Result<()> {
    if query.query.trim().is_empty() {
        return Ok(());
    }

    let content =
        InputMessageContent::Text(InputMessageContentText::new(query.query.to_uppercase()));
    let article = InlineQueryResultArticle::new("caps", "Caps", content);

    bot.answer_inline_query(query.id, vec![InlineQueryResult::Article(article)])
        .await?;
    Ok(())
}
