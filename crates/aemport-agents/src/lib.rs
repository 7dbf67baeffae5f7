//! aemport-agents: collaborators backed by a chat completion service and
//! by local commands.
//!
//! The core pipeline only sees the collaborator traits from `aemport_core`;
//! this crate supplies the implementations used by the CLI.

pub mod analyzer;
pub mod client;
pub mod config;
pub mod generator;
pub mod json;
pub mod prompts;
pub mod validators;

use std::sync::Arc;

use aemport_core::{Collaborators, PortConfig, Result, ReviewAggregator, Validator};

pub use analyzer::LlmFileAnalyzer;
pub use client::{ChatModel, OpenAiChatClient};
pub use config::ServiceConfig;
pub use generator::{LlmCodeGenerator, LlmCodeRepairer};
pub use json::{extract_json_block, parse_reply};
pub use validators::{CommandValidator, LlmValidator, StaticSyntaxValidator};

/// Syntax scan, the model reviews, then the build command if any. Model
/// reviews sample at `temperature`.
pub fn standard_validators(
    model: Arc<dyn ChatModel>,
    temperature: f32,
    build: Option<CommandValidator>,
) -> Vec<Arc<dyn Validator>> {
    let mut validators: Vec<Arc<dyn Validator>> = vec![Arc::new(StaticSyntaxValidator::new())];
    for preset in LlmValidator::presets(model) {
        validators.push(Arc::new(preset.with_temperature(temperature)));
    }
    if let Some(build) = build {
        validators.push(Arc::new(build));
    }
    validators
}

/// Full collaborator set sharing one model and one sampling temperature.
pub fn model_collaborators(
    model: Arc<dyn ChatModel>,
    config: &PortConfig,
    temperature: f32,
    build: Option<CommandValidator>,
) -> Result<Collaborators> {
    let reviewer = ReviewAggregator::new(
        standard_validators(model.clone(), temperature, build),
        config.severity_threshold,
        config.retry,
    )?;
    Ok(Collaborators {
        analyzer: Arc::new(LlmFileAnalyzer::new(model.clone()).with_temperature(temperature)),
        generator: Arc::new(LlmCodeGenerator::new(model.clone()).with_temperature(temperature)),
        repairer: Arc::new(LlmCodeRepairer::new(model).with_temperature(temperature)),
        reviewer,
    })
}
