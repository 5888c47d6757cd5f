use anyhow::Result;
use tracing::{info, warn};

use crate::mapping::{MappedTranslations, map_translations, parse_payload};
use crate::providers::{ChatClient, ProviderUsage};
use crate::translations::{self, TranslateOptions};

#[derive(Debug, Clone)]
pub struct Translator<C: ChatClient> {
    client: C,
    options: TranslateOptions,
}

#[derive(Debug, Clone)]
pub struct BatchTranslation {
    pub mapped: MappedTranslations,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

impl<C: ChatClient> Translator<C> {
    pub fn new(client: C, options: TranslateOptions) -> Self {
        Self { client, options }
    }

    /// Translates the whole batch in one call and maps the reply back onto `sentences`.
    ///
    /// Transport failures and unparseable replies are errors; a reply with the wrong
    /// number of entries is not, and is reported through `count_matches`.
    pub async fn translate_batch(&self, sentences: &[String]) -> Result<BatchTranslation> {
        let format = self.options.format;
        let system_prompt = translations::render_system_prompt(&self.options, sentences.len())?;
        let user_input = translations::render_user_input(sentences, format)?;

        let response = self
            .client
            .clone()
            .append_system_input(system_prompt)
            .append_user_input(user_input)
            .complete(format.is_json())
            .await?;

        let payload = parse_payload(&response.text, format).inspect_err(|err| {
            warn!("unparseable translation reply ({}): {}", err.reason, err.raw);
        })?;
        let mapped = map_translations(sentences, payload);
        if !mapped.count_matches {
            warn!(
                "translation count mismatch: sent {} sentences, received {}",
                sentences.len(),
                mapped.texts.len()
            );
        }
        if mapped.fallbacks > 0 {
            warn!(
                "{} sentence(s) missing from the keyed reply kept their original text",
                mapped.fallbacks
            );
        }
        info!(
            "translated {} sentences with {}",
            sentences.len(),
            response.model.as_deref().unwrap_or("unknown model")
        );

        Ok(BatchTranslation {
            mapped,
            model: response.model,
            usage: response.usage,
        })
    }
}
