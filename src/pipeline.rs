use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{
    HOKKU_SYSTEM_PROMPT, HOKKU_USER_PROMPT, SCENE_IMPRESSION_SYSTEM_PROMPT,
    SCENE_IMPRESSION_USER_PROMPT,
};

/// Literal markers the generative service embeds in its reply when it
/// declines on content-policy grounds. Matched case-sensitively.
const REFUSAL_MARKERS: [&str; 2] = ["I cannot", "I'm sorry"];

/// The generative-language collaborator: one request, an optional image
/// attachment, plain text back.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        image_url: Option<&str>,
        user_text: &str,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Direct,
    TwoStep,
}

impl Strategy {
    fn label(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::TwoStep => "two_step",
        }
    }
}

/// Fallback order: a straight image-to-hokku request first, then the
/// indirection through an abstract scene impression.
const STRATEGY_ORDER: [Strategy; 2] = [Strategy::Direct, Strategy::TwoStep];

enum StrategyOutcome {
    Success(String),
    Failed(String),
}

/// Produces a hokku for one image by walking the strategy chain. Service
/// failures never escape: each strategy absorbs its own errors and the
/// chain either yields a poem or nothing.
pub struct HokkuPipeline {
    model: Arc<dyn GenerativeModel>,
}

impl HokkuPipeline {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        HokkuPipeline { model }
    }

    /// Returns the first poem a strategy produces, or `None` once every
    /// strategy has failed. A `None` means the caller stays silent.
    pub async fn generate(&self, image_url: &str) -> Option<String> {
        for strategy in STRATEGY_ORDER {
            match self.attempt(strategy, image_url).await {
                StrategyOutcome::Success(text) => {
                    info!("hokku produced by the {} strategy", strategy.label());
                    return Some(text);
                }
                StrategyOutcome::Failed(reason) => {
                    warn!("{} strategy failed: {reason}", strategy.label());
                }
            }
        }

        None
    }

    async fn attempt(&self, strategy: Strategy, image_url: &str) -> StrategyOutcome {
        match strategy {
            Strategy::Direct => self.direct(image_url).await,
            Strategy::TwoStep => self.two_step(image_url).await,
        }
    }

    async fn direct(&self, image_url: &str) -> StrategyOutcome {
        let text = match self
            .model
            .complete(HOKKU_SYSTEM_PROMPT, Some(image_url), HOKKU_USER_PROMPT)
            .await
        {
            Ok(text) => text,
            Err(err) => return StrategyOutcome::Failed(format!("hokku request failed: {err}")),
        };

        if let Some(marker) = refusal_marker(&text) {
            return StrategyOutcome::Failed(format!("service declined (matched \"{marker}\")"));
        }

        StrategyOutcome::Success(text)
    }

    /// First distill the photo into an abstract impression, then write the
    /// hokku from that impression alone, without attaching the image. The
    /// refusal scan applies to the direct strategy only; whatever the
    /// second call returns is taken as-is.
    async fn two_step(&self, image_url: &str) -> StrategyOutcome {
        let impression = match self
            .model
            .complete(
                SCENE_IMPRESSION_SYSTEM_PROMPT,
                Some(image_url),
                SCENE_IMPRESSION_USER_PROMPT,
            )
            .await
        {
            Ok(impression) => impression,
            Err(err) => {
                return StrategyOutcome::Failed(format!("impression request failed: {err}"))
            }
        };

        match self
            .model
            .complete(HOKKU_SYSTEM_PROMPT, None, &impression)
            .await
        {
            Ok(text) => StrategyOutcome::Success(text),
            Err(err) => {
                StrategyOutcome::Failed(format!("hokku-from-impression request failed: {err}"))
            }
        }
    }
}

fn refusal_marker(text: &str) -> Option<&'static str> {
    REFUSAL_MARKERS
        .iter()
        .copied()
        .find(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use anyhow::anyhow;
    use parking_lot::Mutex;

    use super::*;

    const IMAGE_URL: &str = "https://cdn.example/img123.jpg";
    const POEM: &str = "Лист падає тихо\n🍂🍁🌾🌧️🕯️";
    const REFUSAL: &str = "I'm sorry, I cannot assist with that.";
    const IMPRESSION: &str = "Golden dusk, soft amber light, quiet autumn chill";
    const DUSK_POEM: &str = "Сутінки золоті\n🌇🍂🌫️✨🕊️";

    #[derive(Debug)]
    struct RecordedCall {
        system_prompt: String,
        image_url: Option<String>,
        user_text: String,
    }

    /// Scripted collaborator: hands out canned replies in order and records
    /// how it was called.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Self {
            ScriptedModel {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn complete(
            &self,
            system_prompt: &str,
            image_url: Option<&str>,
            user_text: &str,
        ) -> Result<String> {
            self.calls.lock().push(RecordedCall {
                system_prompt: system_prompt.to_owned(),
                image_url: image_url.map(str::to_owned),
                user_text: user_text.to_owned(),
            });
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }

    fn pipeline_with(replies: Vec<Result<String>>) -> (HokkuPipeline, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(replies));
        (HokkuPipeline::new(model.clone()), model)
    }

    #[tokio::test]
    async fn direct_reply_is_returned_verbatim() {
        let (pipeline, model) = pipeline_with(vec![Ok(POEM.to_owned())]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result.as_deref(), Some(POEM));

        let calls = model.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_prompt, HOKKU_SYSTEM_PROMPT);
        assert_eq!(calls[0].image_url.as_deref(), Some(IMAGE_URL));
        assert_eq!(calls[0].user_text, HOKKU_USER_PROMPT);
    }

    #[tokio::test]
    async fn refusal_reply_falls_through_to_the_two_step_strategy() {
        let (pipeline, model) = pipeline_with(vec![
            Ok(REFUSAL.to_owned()),
            Ok(IMPRESSION.to_owned()),
            Ok(DUSK_POEM.to_owned()),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result.as_deref(), Some(DUSK_POEM));

        let calls = model.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].system_prompt, SCENE_IMPRESSION_SYSTEM_PROMPT);
        assert_eq!(calls[1].image_url.as_deref(), Some(IMAGE_URL));
        // The second hokku attempt is text-only: the impression stands in
        // for the image.
        assert_eq!(calls[2].system_prompt, HOKKU_SYSTEM_PROMPT);
        assert_eq!(calls[2].image_url, None);
        assert_eq!(calls[2].user_text, IMPRESSION);
    }

    #[tokio::test]
    async fn partial_refusal_marker_is_enough_to_fall_through() {
        let (pipeline, _model) = pipeline_with(vec![
            Ok("Unfortunately I cannot write about this image.".to_owned()),
            Ok(IMPRESSION.to_owned()),
            Ok(DUSK_POEM.to_owned()),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result.as_deref(), Some(DUSK_POEM));
    }

    #[tokio::test]
    async fn service_error_behaves_like_a_refusal() {
        let (pipeline, model) = pipeline_with(vec![
            Err(anyhow!("quota exhausted")),
            Ok(IMPRESSION.to_owned()),
            Ok(DUSK_POEM.to_owned()),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result.as_deref(), Some(DUSK_POEM));
        assert_eq!(model.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_nothing() {
        let (pipeline, model) = pipeline_with(vec![
            Err(anyhow!("connection reset")),
            Err(anyhow!("connection reset")),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result, None);
        // Direct call plus the failed impression call; the second step of
        // the two-step strategy is never reached.
        assert_eq!(model.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn failed_second_step_also_exhausts_the_chain() {
        let (pipeline, model) = pipeline_with(vec![
            Ok(REFUSAL.to_owned()),
            Ok(IMPRESSION.to_owned()),
            Err(anyhow!("request timed out")),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result, None);
        assert_eq!(model.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn two_step_accepts_text_containing_a_refusal_marker() {
        // The refusal scan is a direct-strategy policy only: a two-step
        // reply containing a marker is still accepted. Known inconsistency,
        // kept deliberately.
        let (pipeline, _model) = pipeline_with(vec![
            Ok(REFUSAL.to_owned()),
            Ok(IMPRESSION.to_owned()),
            Ok(REFUSAL.to_owned()),
        ]);

        let result = pipeline.generate(IMAGE_URL).await;
        assert_eq!(result.as_deref(), Some(REFUSAL));
    }
}
