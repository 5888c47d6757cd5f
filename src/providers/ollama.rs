use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ChatClient, Message, ProviderFuture, ProviderResponse, ProviderUsage};

const DEFAULT_MODEL: &str = "llama3";

/// Local Ollama server (`/api/chat`).
#[derive(Debug, Clone)]
pub struct Ollama {
    host: String,
    model: String,
    messages: Vec<Message>,
}

impl Ollama {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
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

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatClient for Ollama {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn complete(self, json: bool) -> ProviderFuture {
        Box::pin(async move { call_chat(self, json).await })
    }
}

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{}", host.trim_end_matches('/'), path)
}

async fn call_chat(provider: Ollama, json: bool) -> Result<ProviderResponse> {
    let url = endpoint(&provider.host, "api/chat");
    let messages = provider
        .messages
        .iter()
        .map(|message| json!({"role": message.role_str(), "content": message.content}))
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": provider.model,
        "messages": messages,
        "stream": false,
    });
    if json {
        body["format"] = json!("json");
    }
    debug!("POST {} (model {}, json {})", url, provider.model, json);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach Ollama at {}", provider.host))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read Ollama chat response ({})", status))?;
    if !status.is_success() {
        return Err(anyhow!(
            "Ollama API error ({}): {}",
            status,
            extract_ollama_error(&text).unwrap_or(text)
        ));
    }
    extract_chat_response(&text, &provider.model)
}

/// Model names installed on the server; doubles as a connection check.
pub async fn list_ollama_models(host: &str) -> Result<Vec<String>> {
    let url = endpoint(host, "api/tags");
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach Ollama at {}", host))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read Ollama model list ({})", status))?;
    if !status.is_success() {
        return Err(anyhow!("Ollama API error ({}): {}", status, text));
    }
    parse_tags(&text)
}

fn parse_tags(text: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct Tags {
        #[serde(default)]
        models: Vec<TagModel>,
    }

    #[derive(Deserialize)]
    struct TagModel {
        name: String,
    }

    let tags: Tags =
        serde_json::from_str(text).with_context(|| "failed to parse Ollama model list")?;
    Ok(tags.models.into_iter().map(|model| model.name).collect())
}

fn extract_chat_response(text: &str, fallback_model: &str) -> Result<ProviderResponse> {
    let payload: ChatReply =
        serde_json::from_str(text).with_context(|| "failed to parse Ollama response JSON")?;
    let content = payload
        .message
        .map(|message| message.content)
        .ok_or_else(|| anyhow!("no message returned from Ollama"))?;
    let usage = match (payload.prompt_eval_count, payload.eval_count) {
        (None, None) => None,
        (prompt, completion) => Some(ProviderUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt.zip(completion).map(|(a, b)| a + b),
        }),
    };
    Ok(ProviderResponse {
        text: content,
        model: payload
            .model
            .filter(|value| !value.trim().is_empty())
            .or_else(|| Some(fallback_model.to_string())),
        usage,
    })
}

fn extract_ollama_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body).ok()?.error
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: Option<String>,
    message: Option<ReplyMessage>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}
