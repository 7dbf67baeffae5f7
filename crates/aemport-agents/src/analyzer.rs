//! Model-backed file analysis.

use std::sync::Arc;

use aemport_core::{AnalysisRequest, CollaboratorOutput, FileAnalyzer};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::client::ChatModel;
use crate::json::parse_reply;
use crate::prompts::{analysis_prompt, ANALYSIS_SYSTEM};

/// Describes one component source file through a chat model.
pub struct LlmFileAnalyzer {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl LlmFileAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl FileAnalyzer for LlmFileAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> CollaboratorOutput<Value> {
        debug!(file = %request.path.display(), kind = request.kind.label(), "analysing file");
        let reply = match self
            .model
            .complete(ANALYSIS_SYSTEM, &analysis_prompt(request), self.temperature)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return CollaboratorOutput::Failed(e),
        };
        match parse_reply::<Value>(&reply) {
            CollaboratorOutput::Structured(value) if value.is_object() => {
                CollaboratorOutput::Structured(value)
            }
            _ => CollaboratorOutput::Raw(reply),
        }
    }
}
