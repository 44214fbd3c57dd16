//! Provider factory.
//!
//! The runtime holds a factory value, not a provider instance, so a leading
//! `@model` directive in an automation can construct a fresh provider with
//! the requested driver and model for just that job.

use hearth_config::AppConfig;
use hearth_core::automation::ModelSpec;
use hearth_core::error::ProviderError;
use hearth_core::provider::Provider;
use std::sync::Arc;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Builds providers from driver names and the configured credentials.
#[derive(Clone)]
pub struct ProviderFactory {
    config: Arc<AppConfig>,
}

impl ProviderFactory {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl hearth_core::provider::LlmFactory for ProviderFactory {
    /// The configured default driver + model pair.
    fn default_spec(&self) -> ModelSpec {
        ModelSpec {
            driver: self.config.default_driver.clone(),
            model: Some(self.config.default_model.clone()),
        }
    }

    /// Build a provider for the given spec, falling back to configured
    /// defaults for a missing model name. Returns the provider and the
    /// resolved model.
    fn build(&self, spec: &ModelSpec) -> Result<(Arc<dyn Provider>, String), ProviderError> {
        let provider_cfg = self.config.providers.get(&spec.driver);

        let model = spec
            .model
            .clone()
            .or_else(|| provider_cfg.and_then(|c| c.default_model.clone()))
            .unwrap_or_else(|| self.config.default_model.clone());

        let provider: Arc<dyn Provider> = match spec.driver.as_str() {
            "anthropic" => {
                let api_key = provider_cfg
                    .and_then(|c| c.api_key.clone())
                    .ok_or_else(|| {
                        ProviderError::NotConfigured("anthropic api key missing".into())
                    })?;
                let mut provider = AnthropicProvider::new(api_key)?;
                if let Some(url) = provider_cfg.and_then(|c| c.api_url.clone()) {
                    provider = provider.with_base_url(url);
                }
                Arc::new(provider)
            }
            "ollama" => {
                let url = provider_cfg.and_then(|c| c.api_url.clone());
                Arc::new(OpenAiCompatProvider::ollama(url.as_deref())?)
            }
            // Any other configured driver is an OpenAI-compatible endpoint.
            other => {
                let cfg = provider_cfg
                    .ok_or_else(|| ProviderError::UnknownDriver(other.to_string()))?;
                let url = cfg.api_url.clone().ok_or_else(|| {
                    ProviderError::NotConfigured(format!("{other}: api_url missing"))
                })?;
                let api_key = cfg.api_key.clone().unwrap_or_default();
                Arc::new(OpenAiCompatProvider::new(other, url, api_key)?)
            }
        };

        Ok((provider, model))
    }
}
