use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ChatClient, Message, ProviderFuture, ProviderResponse, ProviderUsage};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Endpoint for models whose provider is known; `None` keeps the configured URL.
pub fn preset_base_url(model: &str) -> Option<&'static str> {
    match model.trim() {
        "gpt-4o" | "gpt-4o-mini" | "gpt-3.5-turbo" => Some(DEFAULT_BASE_URL),
        "gemini-2.0-flash"
        | "gemini-2.0-flash-lite"
        | "gemini-2.5-pro"
        | "gemini-2.5-flash"
        | "gemini-2.5-flash-lite" => Some(GEMINI_BASE_URL),
        "llama3-8b-8192" | "llama3-70b-8192" => Some(GROQ_BASE_URL),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    key: String,
    base_url: String,
    model: String,
    messages: Vec<Message>,
}

impl OpenAiCompatible {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatClient for OpenAiCompatible {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn complete(self, json: bool) -> ProviderFuture {
        Box::pin(async move { call_chat_completions(self, json).await })
    }
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

async fn call_chat_completions(provider: OpenAiCompatible, json: bool) -> Result<ProviderResponse> {
    let client = reqwest::Client::new();
    let url = chat_completions_url(&provider.base_url);

    let messages = provider
        .messages
        .iter()
        .map(|message| json!({"role": message.role_str(), "content": message.content}))
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": provider.model,
        "messages": messages,
    });
    if json {
        body["response_format"] = json!({"type": "json_object"});
    }
    debug!("POST {} (model {}, json {})", url, provider.model, json);

    let response = client
        .post(&url)
        .bearer_auth(&provider.key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read chat completions response ({})", status))?;
    if !status.is_success() {
        return Err(anyhow!(
            "chat completions API error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ));
    }
    extract_chat_response(&text, &provider.model)
}

fn extract_chat_response(text: &str, fallback_model: &str) -> Result<ProviderResponse> {
    let payload: ChatCompletion =
        serde_json::from_str(text).with_context(|| "failed to parse chat completions JSON")?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from chat completions"))?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse {
        text: content,
        model,
        usage,
    })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<serde_json::Value>,
    }

    // Gemini's compatibility layer wraps the error object in a one-element array.
    let error = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error?,
        Err(_) => serde_json::from_str::<Vec<ErrorBody>>(body)
            .ok()?
            .into_iter()
            .next()?
            .error?,
    };
    let code = error.code.map(|code| match code {
        serde_json::Value::String(code) => code,
        other => other.to_string(),
    });
    Some(format_error_parts(error.message, error.kind, code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = non_blank(message) {
        parts.push(message);
    }
    if let Some(kind) = non_blank(kind) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = non_blank(code) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}
