//! First-page document summary through a Vision Language Model.
//!
//! The coordinator only sees the [`Summarizer`] trait, so the summary is an
//! injected, optional collaborator: no provider configured means no summary,
//! never a failed conversion. [`LlmSummarizer`] is the production
//! implementation on top of `edgequake-llm`.
//!
//! ## Provider resolution
//!
//! Same fallback chain as every edgequake tool, most specific first:
//!
//! 1. **Pre-built provider** (`config.provider`);
//! 2. **Named provider + model** (`config.provider_name`);
//! 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`);
//! 4. **OpenAI key present** (`OPENAI_API_KEY`);
//! 5. **Full auto-detection** (`ProviderFactory::from_env`).

use crate::config::ConversionConfig;
use crate::error::Pdf2ImgError;
use crate::pipeline::encode;
use crate::project::{ConvertedPage, DocumentAnalysis};
use crate::prompts::{ANALYSIS_SYSTEM_PROMPT, ANALYSIS_USER_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Produces a structured summary from a rendered page.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(
        &'a self,
        page: &'a ConvertedPage,
    ) -> BoxFuture<'a, Result<DocumentAnalysis, Pdf2ImgError>>;
}

/// [`Summarizer`] that sends the page image to a vision model.
pub struct LlmSummarizer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Build a summarizer from the config's provider settings.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2ImgError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize<'a>(
        &'a self,
        page: &'a ConvertedPage,
    ) -> BoxFuture<'a, Result<DocumentAnalysis, Pdf2ImgError>> {
        Box::pin(async move {
            let start = Instant::now();
            let (header, payload) = encode::split_data_uri(&page.image_data)
                .map_err(|e| Pdf2ImgError::AnalysisFailed(e.to_string()))?;
            let mime = header.trim_end_matches(";base64");
            let image = ImageData::new(payload.to_string(), mime.to_string()).with_detail("high");

            let messages = vec![
                ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
                ChatMessage::user_with_images(ANALYSIS_USER_PROMPT, vec![image]),
            ];

            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| Pdf2ImgError::AnalysisFailed(format!("{}", e)))?;

            debug!(
                "Analysis of page {}: {} input tokens, {} output tokens, {:?}",
                page.page_number,
                response.prompt_tokens,
                response.completion_tokens,
                start.elapsed()
            );

            parse_analysis(&response.content)
        })
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json|JSON)?\s*\n(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// Parse the model's reply into a [`DocumentAnalysis`].
///
/// Tolerates a surrounding code fence and chatter before or after the object.
pub fn parse_analysis(reply: &str) -> Result<DocumentAnalysis, Pdf2ImgError> {
    let body = JSON_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(Pdf2ImgError::AnalysisFailed(
                "reply contains no JSON object".into(),
            ))
        }
    };

    serde_json::from_str(json)
        .map_err(|e| Pdf2ImgError::AnalysisFailed(format!("unexpected reply shape: {e}")))
}

/// Resolve the LLM provider, from most-specific to least-specific.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2ImgError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| Pdf2ImgError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY to enable document summaries.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2ImgError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2ImgError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
