use std::sync::Arc;

use crate::dedup::SeenGroups;
use crate::llm::GeminiClient;
use crate::pipeline::HokkuPipeline;

#[derive(Clone)]
pub struct AppState {
    pub seen_groups: Arc<SeenGroups>,
    pub pipeline: Arc<HokkuPipeline>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            seen_groups: Arc::new(SeenGroups::new()),
            pipeline: Arc::new(HokkuPipeline::new(Arc::new(GeminiClient))),
        }
    }
}
