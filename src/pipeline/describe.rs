//! Image descriptions from a vision-capable LLM.
//!
//! The description collaborator never fails: every problem is reported as a
//! sentinel string so one bad image cannot interrupt extraction. Callers
//! hold a [`DescriptionService`], which is either `Unavailable` (disabled
//! or no provider could be resolved at setup) or `Available` with a handle.
//!
//! ## Fallback
//!
//! [`DescriptionService::describe`] first asks about the persisted file. If
//! that yields an error or "unavailable" sentinel it retries exactly once
//! from the in-memory bytes. There is no other retry.

use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::pipeline::encode;
use crate::prompts::{describe_prompt, DEFAULT_DESCRIBE_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Returned when the provider gave no usable description.
pub const DESCRIPTION_UNAVAILABLE: &str = "Image description not available";
/// Returned when the image file to describe does not exist.
pub const DESCRIPTION_FILE_NOT_FOUND: &str = "Image description not available - file not found";
/// Prefix of every error sentinel.
pub const DESCRIPTION_ERROR_PREFIX: &str = "Error generating description";
/// Used when the service is unavailable; no call is made.
pub const NO_DESCRIPTION: &str = "No description available";

fn error_sentinel(cause: impl std::fmt::Display) -> String {
    format!("{DESCRIPTION_ERROR_PREFIX}: {cause}")
}

/// Whether a description is an error or "unavailable" sentinel.
pub fn is_failure_sentinel(description: &str) -> bool {
    description.starts_with("Error") || description.starts_with(DESCRIPTION_UNAVAILABLE)
}

/// Something that can describe an image.
///
/// Both methods return a description or a sentinel; they never fail.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// Describe the image stored at `path`.
    async fn describe(&self, path: &Path) -> String;

    /// Describe an image from its encoded bytes.
    async fn describe_from_bytes(&self, bytes: &[u8]) -> String;
}

/// Explicit availability of the description collaborator.
#[derive(Clone)]
pub enum DescriptionService {
    Unavailable,
    Available(Arc<dyn ImageDescriber>),
}

impl std::fmt::Debug for DescriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptionService::Unavailable => f.write_str("Unavailable"),
            DescriptionService::Available(_) => f.write_str("Available(<dyn ImageDescriber>)"),
        }
    }
}

impl DescriptionService {
    pub fn is_available(&self) -> bool {
        matches!(self, DescriptionService::Available(_))
    }

    /// Describe one persisted image, falling back to its bytes once.
    pub async fn describe(&self, path: &Path, bytes: &[u8]) -> String {
        let describer = match self {
            DescriptionService::Unavailable => return NO_DESCRIPTION.to_string(),
            DescriptionService::Available(d) => d,
        };

        let first = describer.describe(path).await;
        if !is_failure_sentinel(&first) {
            return first;
        }
        debug!(path = %path.display(), "path description failed ({first}); retrying from bytes");
        describer.describe_from_bytes(bytes).await
    }

    /// Resolve the service from configuration.
    ///
    /// Never fails: an unresolvable provider downgrades to `Unavailable`.
    pub fn from_config(ctx: &IngestContext, config: &IngestConfig) -> Self {
        if !config.describe_images {
            debug!(request_id = %ctx.request_id(), "image descriptions disabled");
            return DescriptionService::Unavailable;
        }
        if let Some(ref describer) = config.describer {
            return DescriptionService::Available(Arc::clone(describer));
        }
        match resolve_provider(config) {
            Ok(provider) => {
                info!(request_id = %ctx.request_id(), "image descriptions enabled");
                DescriptionService::Available(Arc::new(LlmDescriber::from_config(provider, config)))
            }
            Err(reason) => {
                warn!(
                    request_id = %ctx.request_id(),
                    "no vision provider available, images will not be described: {reason}"
                );
                DescriptionService::Unavailable
            }
        }
    }
}

/// Default model when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`).
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI key** (`OPENAI_API_KEY`) with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, String> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| format!("provider '{name}': {e}"));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return ProviderFactory::create_llm_provider(&prov, &model)
                .map_err(|e| format!("provider '{prov}': {e}"));
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return ProviderFactory::create_llm_provider("openai", model)
            .map_err(|e| format!("provider 'openai': {e}"));
    }

    ProviderFactory::from_env()
        .map(|(llm, _embedding)| llm)
        .map_err(|e| format!("auto-detection failed: {e}"))
}

/// [`ImageDescriber`] backed by an edgequake-llm provider.
pub struct LlmDescriber {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>, prompt: String, options: CompletionOptions, timeout: Duration) -> Self {
        Self {
            provider,
            prompt,
            options,
            timeout,
        }
    }

    fn from_config(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        let template = config
            .describe_prompt
            .as_deref()
            .unwrap_or(DEFAULT_DESCRIBE_PROMPT);
        Self::new(
            provider,
            describe_prompt(template, &config.describe_topic),
            build_options(config),
            Duration::from_secs(config.describe_timeout_secs),
        )
    }
}

#[async_trait]
impl ImageDescriber for LlmDescriber {
    async fn describe(&self, path: &Path) -> String {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.describe_from_bytes(&bytes).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                DESCRIPTION_FILE_NOT_FOUND.to_string()
            }
            Err(e) => error_sentinel(e),
        }
    }

    async fn describe_from_bytes(&self, bytes: &[u8]) -> String {
        let messages = vec![ChatMessage::user_with_images(
            &self.prompt,
            vec![encode::image_data(bytes)],
        )];

        match tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&self.options))).await {
            Ok(Ok(response)) => {
                let text = response.content.trim().to_string();
                debug!(
                    "description: {} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                if text.is_empty() {
                    DESCRIPTION_UNAVAILABLE.to_string()
                } else {
                    text
                }
            }
            Ok(Err(e)) => error_sentinel(e),
            Err(_) => error_sentinel(format!("timed out after {}s", self.timeout.as_secs())),
        }
    }
}

/// Build `CompletionOptions` from the ingestion config.
fn build_options(config: &IngestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted describer: fixed answers for path and bytes calls.
    struct Scripted {
        by_path: String,
        by_bytes: String,
        path_calls: AtomicUsize,
        bytes_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(by_path: &str, by_bytes: &str) -> Arc<Self> {
            Arc::new(Self {
                by_path: by_path.into(),
                by_bytes: by_bytes.into(),
                path_calls: AtomicUsize::new(0),
                bytes_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageDescriber for Scripted {
        async fn describe(&self, _path: &Path) -> String {
            self.path_calls.fetch_add(1, Ordering::SeqCst);
            self.by_path.clone()
        }

        async fn describe_from_bytes(&self, _bytes: &[u8]) -> String {
            self.bytes_calls.fetch_add(1, Ordering::SeqCst);
            self.by_bytes.clone()
        }
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_failure_sentinel(DESCRIPTION_UNAVAILABLE));
        assert!(is_failure_sentinel(DESCRIPTION_FILE_NOT_FOUND));
        assert!(is_failure_sentinel(&error_sentinel("boom")));
        assert!(!is_failure_sentinel(NO_DESCRIPTION));
        assert!(!is_failure_sentinel("A bar chart of revenue."));
    }

    #[test]
    fn unavailable_service_makes_no_calls() {
        let svc = DescriptionService::Unavailable;
        let description = tokio_test::block_on(svc.describe(Path::new("x.png"), b""));
        assert_eq!(description, NO_DESCRIPTION);
    }

    #[tokio::test]
    async fn successful_path_description_skips_bytes() {
        let d = Scripted::new("A red square.", "unused");
        let svc = DescriptionService::Available(d.clone());
        assert_eq!(svc.describe(Path::new("x.png"), b"").await, "A red square.");
        assert_eq!(d.bytes_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_sentinel_retries_from_bytes_once() {
        let d = Scripted::new("Error generating description: 503", "From bytes.");
        let svc = DescriptionService::Available(d.clone());
        assert_eq!(svc.describe(Path::new("x.png"), b"png").await, "From bytes.");
        assert_eq!(d.path_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.bytes_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_sentinel_retries_and_keeps_second_answer() {
        let d = Scripted::new(DESCRIPTION_UNAVAILABLE, DESCRIPTION_UNAVAILABLE);
        let svc = DescriptionService::Available(d.clone());
        assert_eq!(svc.describe(Path::new("x.png"), b"").await, DESCRIPTION_UNAVAILABLE);
        assert_eq!(d.bytes_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_config_is_unavailable() {
        let config = IngestConfig::builder().describe_images(false).build().unwrap();
        let ctx = IngestContext::new(None);
        assert!(!DescriptionService::from_config(&ctx, &config).is_available());
    }

    #[test]
    fn injected_describer_wins() {
        let config = IngestConfig::builder()
            .describer(Scripted::new("a", "b"))
            .build()
            .unwrap();
        let ctx = IngestContext::new(None);
        assert!(DescriptionService::from_config(&ctx, &config).is_available());
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&IngestConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
