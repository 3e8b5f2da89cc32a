//! Vision-LLM adapter for the extraction call, built on edgequake-llm.
//!
//! The whole batch goes out as a single user message: the prompt text plus
//! every compressed photo as an image attachment, in batch order. The menu
//! schema travels inside the prompt, so any vision-capable provider the
//! factory knows can serve the request.

use crate::config::PipelineConfig;
use crate::error::{ItemError, MenuError};
use crate::remote::{ExtractionRequest, MenuExtractor};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// [`MenuExtractor`] backed by an edgequake-llm provider.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl VisionExtractor {
    /// Wrap an already constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build the provider named in `config` through the edgequake-llm factory.
    ///
    /// The factory reads the provider's API key (e.g. `OPENROUTER_API_KEY`)
    /// from the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let provider = ProviderFactory::create_llm_provider(
            &config.extraction_provider,
            &config.extraction_model,
        )
        .map_err(|e| MenuError::ProviderNotConfigured {
            provider: config.extraction_provider.clone(),
            hint: format!("{e}"),
        })?;
        Ok(Self::new(provider, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Convert the request into the provider's message format.
fn build_messages(request: &ExtractionRequest) -> Vec<ChatMessage> {
    let images = request
        .images
        .iter()
        .map(|img| ImageData::new(img.base64.clone(), img.mime_type()).with_detail("high"))
        .collect();
    vec![ChatMessage::user_with_images(request.prompt.as_str(), images)]
}

#[async_trait]
impl MenuExtractor for VisionExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ItemError> {
        let start = Instant::now();
        let messages = build_messages(request);
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ItemError::Remote {
                capability: "extraction".to_string(),
                detail: format!("{e}"),
            })?;

        debug!(
            "Extraction: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ItemError::EmptyOutput {
                capability: "extraction".to_string(),
            });
        }
        Ok(response.content)
    }
}

impl std::fmt::Debug for VisionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionExtractor")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::CompressedImage;

    #[test]
    fn one_message_carries_prompt_and_all_images() {
        let request = ExtractionRequest {
            prompt: "read the menu".into(),
            images: vec![
                CompressedImage { base64: "/9j/AAA".into() },
                CompressedImage { base64: "iVBORw0KGgoAAA".into() },
            ],
        };
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 1);
    }
}
