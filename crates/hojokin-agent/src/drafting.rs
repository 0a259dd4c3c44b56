use std::sync::Arc;

use chrono::Utc;
use hojokin_applications::{Application, GeneratedContent, GeneratedSection, SubsidyProgram};
use hojokin_core::config::GeminiConfig;
use hojokin_users::User;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::prompt::PromptBuilder;
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("program {program} has no section {section}")]
    UnknownSection { program: String, section: String },

    #[error("model returned an empty draft for section {0}")]
    EmptyReply(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Cut `text` to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Drafts application sections one request at a time.
pub struct DraftGenerator {
    provider: Arc<dyn LlmProvider>,
    prompts: PromptBuilder,
    model: String,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl DraftGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            provider,
            prompts: PromptBuilder::new(),
            model: model.into(),
            max_output_tokens,
            temperature: None,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, cfg: &GeminiConfig) -> Self {
        let mut generator = Self::new(provider, cfg.model.clone(), cfg.max_output_tokens);
        generator.temperature = cfg.temperature;
        generator
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Draft every section of `program` in catalog order, or only `only`.
    ///
    /// Fails on the first section that cannot be drafted; partial results
    /// are discarded.
    #[instrument(skip_all, fields(application_id = %app.id, program = %program.id, section = ?only))]
    pub async fn generate(
        &self,
        program: &SubsidyProgram,
        company: &User,
        app: &Application,
        only: Option<&str>,
    ) -> Result<GeneratedContent, DraftError> {
        let specs: Vec<_> = match only {
            Some(key) => vec![program.section(key).ok_or_else(|| DraftError::UnknownSection {
                program: program.id.clone(),
                section: key.to_string(),
            })?],
            None => program.sections.iter().collect(),
        };

        let mut sections = Vec::with_capacity(specs.len());
        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;
        let mut model = self.model.clone();

        for spec in specs {
            let req = ChatRequest {
                model: self.model.clone(),
                system: self.prompts.system_prompt().to_string(),
                messages: vec![Message::user(
                    self.prompts.section_prompt(program, spec, company, app),
                )],
                max_tokens: self.max_output_tokens,
                temperature: self.temperature,
            };
            let resp = self.provider.send(&req).await?;

            let text = resp.content.trim();
            if text.is_empty() {
                warn!(section = %spec.key, stop_reason = %resp.stop_reason, "empty draft");
                return Err(DraftError::EmptyReply(spec.key.clone()));
            }
            let clipped = truncate_chars(text, spec.max_chars);
            if clipped.len() < text.len() {
                debug!(section = %spec.key, max_chars = spec.max_chars, "draft truncated");
            }

            tokens_in = tokens_in.saturating_add(resp.tokens_in);
            tokens_out = tokens_out.saturating_add(resp.tokens_out);
            model = resp.model;
            sections.push(GeneratedSection {
                key: spec.key.clone(),
                title: spec.title.clone(),
                text: clipped.to_string(),
            });
        }

        info!(sections = sections.len(), tokens_in, tokens_out, "draft generated");
        Ok(GeneratedContent {
            sections,
            model,
            tokens_in,
            tokens_out,
            generated_at: Utc::now().to_rfc3339(),
        })
    }
}
