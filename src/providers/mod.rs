use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::settings::TranslateSettings;

mod ollama;
mod openai;

pub use ollama::{Ollama, list_ollama_models};
pub use openai::{OpenAiCompatible, preset_base_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any endpoint speaking the OpenAI chat completions protocol (OpenAI, Gemini, Groq).
    OpenAi,
    Ollama,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" => Some(ProviderKind::OpenAi),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }

    fn role_str(&self) -> &'static str {
        match self.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// A chat/completion backend. Messages are accumulated by value, then sent once.
///
/// `json` asks the backend for a structured JSON reply where it supports one.
pub trait ChatClient: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn complete(self, json: bool) -> ProviderFuture;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAi(OpenAiCompatible),
    Ollama(Ollama),
}

impl ChatClient for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAi(provider) => {
                ProviderImpl::OpenAi(provider.append_system_input(input))
            }
            ProviderImpl::Ollama(provider) => {
                ProviderImpl::Ollama(provider.append_system_input(input))
            }
        }
    }

    fn append_user_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAi(provider) => ProviderImpl::OpenAi(provider.append_user_input(input)),
            ProviderImpl::Ollama(provider) => ProviderImpl::Ollama(provider.append_user_input(input)),
        }
    }

    fn complete(self, json: bool) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAi(provider) => provider.complete(json),
            ProviderImpl::Ollama(provider) => provider.complete(json),
        }
    }
}

/// Builds the configured backend. `model` and `override_key` come from the command line
/// and win over settings.
pub fn build_provider(
    settings: &TranslateSettings,
    model: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderImpl> {
    let model = model
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(settings.model.as_str())
        .to_string();
    if model.is_empty() {
        return Err(anyhow!("no model selected"));
    }

    match settings.provider {
        ProviderKind::Ollama => Ok(ProviderImpl::Ollama(
            Ollama::new(settings.ollama_host.clone()).with_model(model),
        )),
        ProviderKind::OpenAi => {
            let base_url = settings
                .base_url
                .clone()
                .or_else(|| preset_base_url(&model).map(str::to_string))
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());
            let key = resolve_key(&base_url, override_key)?;
            Ok(ProviderImpl::OpenAi(
                OpenAiCompatible::new(key)
                    .with_base_url(base_url)
                    .with_model(model),
            ))
        }
    }
}

/// API key for an OpenAI-compatible endpoint, picked by host.
pub fn resolve_key(base_url: &str, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }

    let (label, key) = match key_family(base_url) {
        KeyFamily::Gemini => (
            "GEMINI_API_KEY/GOOGLE_API_KEY",
            get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
        ),
        KeyFamily::Groq => ("GROQ_API_KEY", get_env("GROQ_API_KEY")),
        KeyFamily::OpenAi => ("OPENAI_API_KEY", get_env("OPENAI_API_KEY")),
    };
    key.ok_or_else(|| anyhow!("API key not found (checked {}); pass --key", label))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    OpenAi,
    Gemini,
    Groq,
}

fn key_family(base_url: &str) -> KeyFamily {
    let lower = base_url.to_ascii_lowercase();
    if lower.contains("generativelanguage.googleapis.com") {
        KeyFamily::Gemini
    } else if lower.contains("groq.com") {
        KeyFamily::Groq
    } else {
        KeyFamily::OpenAi
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse() {
        assert_eq!(ProviderKind::parse("OpenAI"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse(" ollama "), Some(ProviderKind::Ollama));
        assert_eq!(ProviderKind::parse("claude"), None);
    }

    #[test]
    fn key_family_follows_endpoint_host() {
        assert_eq!(
            key_family("https://generativelanguage.googleapis.com/v1beta/openai/"),
            KeyFamily::Gemini
        );
        assert_eq!(key_family("https://api.groq.com/openai/v1"), KeyFamily::Groq);
        assert_eq!(key_family("https://api.openai.com/v1"), KeyFamily::OpenAi);
    }

    #[test]
    fn explicit_key_wins() {
        let key = resolve_key("https://api.groq.com/openai/v1", Some("sk-test")).expect("key");
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = TranslateSettings {
            provider: ProviderKind::Ollama,
            ..TranslateSettings::default()
        };
        let provider = build_provider(&settings, Some("llama3"), None).expect("provider");
        assert!(matches!(provider, ProviderImpl::Ollama(_)));
    }

    #[test]
    fn preset_url_is_used_for_known_models() {
        let settings = TranslateSettings::default();
        let provider =
            build_provider(&settings, Some("llama3-70b-8192"), Some("gsk-test")).expect("provider");
        let ProviderImpl::OpenAi(client) = provider else {
            panic!("expected an OpenAI-compatible client");
        };
        assert_eq!(client.base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(client.model(), "llama3-70b-8192");
    }
}
