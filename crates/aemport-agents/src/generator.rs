//! Model-backed generation and repair.

use std::sync::Arc;

use aemport_core::{
    CodeGenerator, CodeRepairer, CollaboratorError, CollaboratorOutput, GeneratedArtifact,
    GenerationRequest, RepairRequest,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::client::ChatModel;
use crate::json::parse_reply;
use crate::prompts::{generation_prompt, repair_prompt, GENERATION_SYSTEM, REPAIR_SYSTEM};

/// JSON objects naming a source field are read field by field; a blank
/// source is a malformed response. Anything else is passed on as raw text
/// for code-block extraction.
fn artifact_reply(reply: String) -> CollaboratorOutput<GeneratedArtifact> {
    let CollaboratorOutput::Structured(Value::Object(object)) = parse_reply::<Value>(&reply) else {
        return CollaboratorOutput::Raw(reply);
    };
    if !(object.contains_key("source") || object.contains_key("code")) {
        return CollaboratorOutput::Raw(reply);
    }
    match GeneratedArtifact::from_json_value(&Value::Object(object)) {
        Some(artifact) => CollaboratorOutput::Structured(artifact),
        None => CollaboratorOutput::Failed(CollaboratorError::MalformedResponse(
            "reply carried no component source".to_string(),
        )),
    }
}

pub struct LlmCodeGenerator {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl LlmCodeGenerator {
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
impl CodeGenerator for LlmCodeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> CollaboratorOutput<GeneratedArtifact> {
        let prompt = generation_prompt(request);
        debug!(
            component = %request.component_id,
            prompt_chars = prompt.len(),
            "requesting generation"
        );
        match self
            .model
            .complete(GENERATION_SYSTEM, &prompt, self.temperature)
            .await
        {
            Ok(reply) => artifact_reply(reply),
            Err(e) => CollaboratorOutput::Failed(e),
        }
    }
}

pub struct LlmCodeRepairer {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl LlmCodeRepairer {
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
impl CodeRepairer for LlmCodeRepairer {
    async fn repair(&self, request: &RepairRequest) -> CollaboratorOutput<GeneratedArtifact> {
        debug!(
            component = %request.component_id,
            iteration = request.iteration,
            findings = request.failing_findings.len(),
            "requesting repair"
        );
        match self
            .model
            .complete(REPAIR_SYSTEM, &repair_prompt(request), self.temperature)
            .await
        {
            Ok(reply) => artifact_reply(reply),
            Err(e) => CollaboratorOutput::Failed(e),
        }
    }
}
