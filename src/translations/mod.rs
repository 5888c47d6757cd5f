use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

use crate::mapping::OutputFormat;
use crate::settings::TranslateSettings;

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub target_language: String,
    pub source_language: String,
    pub format: OutputFormat,
    /// Operator instructions appended to the system prompt.
    pub extra_prompt: Option<String>,
}

impl TranslateOptions {
    pub fn from_settings(settings: &TranslateSettings) -> Self {
        Self {
            target_language: settings.target_language.clone(),
            source_language: settings.source_language.clone(),
            format: settings.format,
            extra_prompt: settings.prompt.clone(),
        }
    }
}

pub fn render_system_prompt(options: &TranslateOptions, count: usize) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", options.source_language.trim());
    context.insert("target_lang", options.target_language.trim());
    context.insert("format", options.format.as_str());
    context.insert("count", &count);
    let extra = options
        .extra_prompt
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    context.insert("extra", &extra);

    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

/// The sentence batch as sent to the model: a JSON array for the JSON formats, one
/// sentence per line otherwise.
pub fn render_user_input(sentences: &[String], format: OutputFormat) -> Result<String> {
    if format.is_json() {
        return serde_json::to_string_pretty(sentences)
            .with_context(|| "failed to encode sentences");
    }
    Ok(sentences
        .iter()
        .map(|sentence| sentence.replace(['\r', '\n'], " "))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(format: OutputFormat) -> TranslateOptions {
        TranslateOptions {
            target_language: "Thai".to_string(),
            source_language: "auto".to_string(),
            format,
            extra_prompt: None,
        }
    }

    #[test]
    fn keyed_prompt_asks_for_object() {
        let prompt = render_system_prompt(&options(OutputFormat::Keyed), 3).unwrap();
        assert!(prompt.contains("into Thai."));
        assert!(!prompt.contains("from auto"));
        assert!(prompt.contains("single JSON object"));
        assert!(prompt.contains("copied exactly"));
    }

    #[test]
    fn ordered_prompt_states_count() {
        let mut opts = options(OutputFormat::Ordered);
        opts.source_language = "Japanese".to_string();
        let prompt = render_system_prompt(&opts, 7).unwrap();
        assert!(prompt.contains("from Japanese into Thai"));
        assert!(prompt.contains(r#"{"translations": [...]}"#));
        assert!(prompt.contains("exactly 7 strings"));
    }

    #[test]
    fn lines_prompt_and_extra_instructions() {
        let mut opts = options(OutputFormat::Lines);
        opts.extra_prompt = Some("Keep honorifics.".to_string());
        let prompt = render_system_prompt(&opts, 2).unwrap();
        assert!(prompt.contains("exactly 2 lines"));
        assert!(prompt.trim_end().ends_with("Keep honorifics."));
    }

    #[test]
    fn user_input_shape_follows_format() {
        let sentences = vec!["Hello".to_string(), "Two\nlines".to_string()];
        let json = render_user_input(&sentences, OutputFormat::Keyed).unwrap();
        let decoded: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, sentences);

        let lines = render_user_input(&sentences, OutputFormat::Lines).unwrap();
        assert_eq!(lines, "Hello\nTwo lines");
    }
}
