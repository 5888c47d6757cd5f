use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Output shape requested from the translation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON object keyed by original sentence.
    Keyed,
    /// JSON array in sentence order.
    Ordered,
    /// One translation per line.
    Lines,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyed" | "json" | "object" => Some(OutputFormat::Keyed),
            "ordered" | "array" | "list" => Some(OutputFormat::Ordered),
            "lines" | "text" | "line" => Some(OutputFormat::Lines),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Keyed => "keyed",
            OutputFormat::Ordered => "ordered",
            OutputFormat::Lines => "lines",
        }
    }

    pub fn is_json(&self) -> bool {
        !matches!(self, OutputFormat::Lines)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranslationPayload {
    Keyed(HashMap<String, String>),
    Ordered(Vec<String>),
    LineDelimited(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedTranslations {
    pub texts: Vec<String>,
    pub count_matches: bool,
    /// Sentences that had no keyed translation and kept their original text.
    pub fallbacks: usize,
}

/// A response that was expected to be JSON but did not parse.
#[derive(Debug, Clone)]
pub struct MalformedResponse {
    pub format: OutputFormat,
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for MalformedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed {} translation response: {} (reply: {:?})",
            self.format.as_str(),
            self.reason,
            excerpt(&self.raw, RAW_EXCERPT_CHARS)
        )
    }
}

const RAW_EXCERPT_CHARS: usize = 200;

fn excerpt(raw: &str, max_chars: usize) -> String {
    let raw = raw.trim();
    match raw.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &raw[..cut]),
        None => raw.to_string(),
    }
}

impl std::error::Error for MalformedResponse {}

pub fn parse_payload(raw: &str, format: OutputFormat) -> Result<TranslationPayload, MalformedResponse> {
    if format == OutputFormat::Lines {
        let lines = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(TranslationPayload::LineDelimited(lines));
    }

    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body).map_err(|err| MalformedResponse {
        format,
        raw: raw.to_string(),
        reason: err.to_string(),
    })?;

    match value {
        Value::Array(items) => Ok(TranslationPayload::Ordered(
            items.into_iter().map(value_to_text).collect(),
        )),
        Value::Object(map) => {
            // json_object mode forces a top-level object; an ordered reply then arrives
            // wrapped as {"translations": [...]}
            if format == OutputFormat::Ordered && map.len() == 1 {
                if let Some(Value::Array(items)) = map.values().next() {
                    return Ok(TranslationPayload::Ordered(
                        items.iter().cloned().map(value_to_text).collect(),
                    ));
                }
            }
            let entries = map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key, value_to_text(value)))
                .collect();
            Ok(TranslationPayload::Keyed(entries))
        }
        other => Err(MalformedResponse {
            format,
            raw: raw.to_string(),
            reason: format!("expected a JSON object or array, got {}", json_kind(&other)),
        }),
    }
}

/// Projects a payload back onto the original sentence order.
pub fn map_translations(sentences: &[String], payload: TranslationPayload) -> MappedTranslations {
    match payload {
        TranslationPayload::Keyed(map) => {
            let mut fallbacks = 0;
            let texts = sentences
                .iter()
                .map(|sentence| match map.get(sentence) {
                    Some(translated) => translated.clone(),
                    None => {
                        fallbacks += 1;
                        sentence.clone()
                    }
                })
                .collect::<Vec<_>>();
            MappedTranslations {
                count_matches: texts.len() == sentences.len(),
                texts,
                fallbacks,
            }
        }
        TranslationPayload::Ordered(texts) | TranslationPayload::LineDelimited(texts) => {
            MappedTranslations {
                count_matches: texts.len() == sentences.len(),
                texts,
                fallbacks: 0,
            }
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn keyed_miss_falls_back_to_original() {
        let input = sentences(&["Hello", "World"]);
        let payload = parse_payload(r#"{"Hello": "สวัสดี"}"#, OutputFormat::Keyed).unwrap();
        let mapped = map_translations(&input, payload);
        assert_eq!(mapped.texts, vec!["สวัสดี", "World"]);
        assert!(mapped.count_matches);
        assert_eq!(mapped.fallbacks, 1);
    }

    #[test]
    fn keyed_output_length_always_matches() {
        let input = sentences(&["A", "B", "C"]);
        let payload = parse_payload(r#"{"Z": "z", "A": "a"}"#, OutputFormat::Keyed).unwrap();
        let mapped = map_translations(&input, payload);
        assert_eq!(mapped.texts, vec!["a", "B", "C"]);
    }

    #[test]
    fn short_line_response_is_flagged() {
        let input = sentences(&["One", "Two", "Three"]);
        let payload = parse_payload("uno\n\n  dos  \n", OutputFormat::Lines).unwrap();
        let mapped = map_translations(&input, payload);
        assert!(!mapped.count_matches);
        assert_eq!(mapped.texts, vec!["uno", "dos"]);
    }

    #[test]
    fn array_is_used_positionally() {
        let input = sentences(&["One", "Two"]);
        let payload = parse_payload(r#"["uno", "dos", "tres"]"#, OutputFormat::Keyed).unwrap();
        let mapped = map_translations(&input, payload);
        assert!(!mapped.count_matches);
        insta::assert_json_snapshot!(mapped.texts, @r#"
        [
          "uno",
          "dos",
          "tres"
        ]
        "#);
    }

    #[test]
    fn wrapped_array_is_unwrapped_for_ordered_format() {
        let payload = parse_payload(r#"{"translations": ["a", "b"]}"#, OutputFormat::Ordered).unwrap();
        assert_eq!(
            payload,
            TranslationPayload::Ordered(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn code_fences_are_ignored() {
        let raw = "```json\n{\"Hi\": \"Hola\"}\n```";
        let payload = parse_payload(raw, OutputFormat::Keyed).unwrap();
        let mapped = map_translations(&sentences(&["Hi"]), payload);
        assert_eq!(mapped.texts, vec!["Hola"]);
    }

    #[test]
    fn malformed_json_keeps_raw_text() {
        let err = parse_payload("Sorry, I cannot help", OutputFormat::Keyed).unwrap_err();
        assert_eq!(err.raw, "Sorry, I cannot help");
        assert_eq!(err.format, OutputFormat::Keyed);
        assert!(err.to_string().starts_with("malformed keyed translation response"));
        assert!(err.to_string().ends_with("(reply: \"Sorry, I cannot help\")"));
    }

    #[test]
    fn long_reply_is_cut_in_message() {
        let raw = "ข".repeat(300);
        let err = parse_payload(&raw, OutputFormat::Ordered).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&format!("\"{}…\"", "ข".repeat(200))));
        assert!(!message.contains(&"ข".repeat(201)));
        assert_eq!(err.raw.chars().count(), 300);
    }

    #[test]
    fn scalar_json_is_rejected() {
        let err = parse_payload("42", OutputFormat::Ordered).unwrap_err();
        assert!(err.reason.contains("a number"));
    }
}
