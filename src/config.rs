//! Provider configuration helpers.
//!
//! These helpers are deliberately independent of the `LLMClient`/`Session`
//! traits: the core doesn't know which provider family a concrete client
//! talks to, but every concrete client needs *some* way to resolve a base URL
//! and model name from environment overrides and defaults. This mirrors the
//! precedence a local-server client commonly wants: explicit environment
//! variable, then the provider's own default, then a caller-supplied
//! fallback.

use std::env;

/// Supported local LLM provider families.
///
/// `Generic` covers any OpenAI-compatible endpoint that isn't one of the
/// well-known local servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
    Generic,
}

impl Provider {
    /// The provider's conventional default base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
            Provider::Generic => "http://localhost:8080/v1",
        }
    }

    /// The environment variable consulted for a base URL override.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::LMStudio => "LMSTUDIO_BASE_URL",
            Provider::Ollama => "OLLAMA_BASE_URL",
            Provider::LlamaCpp => "LLAMACPP_BASE_URL",
            Provider::VLLM => "VLLM_BASE_URL",
            Provider::Generic => "AGENT_BASE_URL",
        }
    }

    /// The environment variable consulted for a model name override.
    pub fn model_env_var(&self) -> &'static str {
        match self {
            Provider::LMStudio => "LMSTUDIO_MODEL",
            Provider::Ollama => "OLLAMA_MODEL",
            Provider::LlamaCpp => "LLAMACPP_MODEL",
            Provider::VLLM => "VLLM_MODEL",
            Provider::Generic => "AGENT_MODEL",
        }
    }
}

/// Resolve the base URL for a provider.
///
/// Priority: environment variable > provider default > `fallback`.
pub fn get_base_url(provider: Provider, fallback: Option<&str>) -> String {
    if let Ok(val) = env::var(provider.env_var()) {
        if !val.is_empty() {
            return val;
        }
    }
    fallback
        .map(|s| s.to_string())
        .unwrap_or_else(|| provider.default_base_url().to_string())
}

/// Resolve the model name for a provider.
///
/// If `prefer_env` is true, the environment variable takes priority over
/// `fallback`; otherwise `fallback` is used unconditionally unless it's
/// empty.
pub fn get_model(provider: Provider, fallback: &str, prefer_env: bool) -> String {
    if prefer_env {
        if let Ok(val) = env::var(provider.model_env_var()) {
            if !val.is_empty() {
                return val;
            }
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_url() {
        assert_eq!(Provider::LMStudio.default_base_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_get_base_url_falls_back_to_default() {
        // SAFETY: env var manipulation is fine in a single-threaded test.
        unsafe { env::remove_var(Provider::Generic.env_var()) };
        let url = get_base_url(Provider::Generic, None);
        assert_eq!(url, Provider::Generic.default_base_url());
    }

    #[test]
    fn test_get_base_url_uses_fallback_over_default() {
        unsafe { env::remove_var(Provider::Generic.env_var()) };
        let url = get_base_url(Provider::Generic, Some("http://example.com"));
        assert_eq!(url, "http://example.com");
    }

    #[test]
    fn test_get_model_without_env_preference() {
        let model = get_model(Provider::Ollama, "llama3", false);
        assert_eq!(model, "llama3");
    }
}
