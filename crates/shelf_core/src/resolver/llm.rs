//! Fallback metadata source: asks a generative text model behind an OpenAI-compatible chat
//! completions endpoint.
use crate::library::types::RecordSource;
use crate::resolver::MetadataProvider;
use crate::resolver::errors::ResolverError;
use crate::resolver::metadata::{BookMetadata, to_page_count};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Models tried in order until one answers with a usable payload.
pub const DEFAULT_MODELS: [&str; 3] = [
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "gemma2-9b-it",
];

const SYSTEM_PROMPT: &str = "You are a bibliographic assistant. Answer with a single JSON object \
and nothing else. If you do not know the book, answer {\"title\": null}.";

/// Connection settings for the chat completions endpoint.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
}

impl LlmConfig {
    /// Settings for `api_key` with the default endpoint and model list.
    #[must_use]
    #[inline]
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.to_owned(),
            models: DEFAULT_MODELS.map(str::to_owned).to_vec(),
        }
    }
}

pub struct LlmProvider {
    http_client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmBook {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default, alias = "genres")]
    genre: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    page_count: Value,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    series_order: Value,
}

impl LlmProvider {
    #[must_use]
    #[inline]
    pub const fn new(http_client: reqwest::Client, config: LlmConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Asks a single model about `isbn`. `Ok(None)` means the model answered but the payload
    /// failed the schema check.
    async fn ask(&self, model: &str, isbn: &str) -> Result<Option<BookMetadata>, ResolverError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": model,
            "temperature": 0.1,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(isbn)},
            ],
        });
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ResolverError::Status(response.status().as_u16()));
        }
        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ResolverError::Parse("completion without content".to_owned()))?;
        parse_completion_content(&content)
    }
}

#[async_trait]
impl MetadataProvider for LlmProvider {
    #[inline]
    fn name(&self) -> &'static str {
        "llm"
    }

    #[inline]
    fn source(&self) -> RecordSource {
        RecordSource::Llm
    }

    async fn attempt(&self, isbn: &str) -> Result<Option<BookMetadata>, ResolverError> {
        for model in &self.config.models {
            match self.ask(model, isbn).await {
                Ok(Some(metadata)) => {
                    info!("Model {model} answered for {isbn}");
                    return Ok(Some(metadata));
                }
                Ok(None) => debug!("Model {model} gave no usable answer for {isbn}"),
                Err(error) => warn!("Model {model} failed for {isbn}: {error}"),
            }
        }
        Ok(None)
    }
}

fn build_prompt(isbn: &str) -> String {
    format!(
        "Give the bibliographic data of the book with ISBN {isbn} as strict JSON with the fields \
         {{\"title\": string, \"authors\": [string], \"genre\": [string], \"description\": string, \
         \"pageCount\": number, \"series\": string or null, \"seriesOrder\": number or null}}. \
         No markdown, no commentary."
    )
}

/// Removes a surrounding markdown code fence such as "```json ... ```".
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per lookup")]
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json"), with or without a line break after it.
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the model's answer and checks it against the expected shape. A payload without a
/// title is treated as no answer.
/// # Errors
/// Fails if the content is not a JSON object.
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per lookup")]
pub fn parse_completion_content(content: &str) -> Result<Option<BookMetadata>, ResolverError> {
    let book: LlmBook = serde_json::from_str(strip_code_fences(content))?;
    let Some(title) = book
        .title
        .map(|title| title.trim().to_owned())
        .filter(|title| !title.is_empty())
    else {
        return Ok(None);
    };
    let series_order = book
        .series_order
        .as_f64()
        .or_else(|| book.series_order.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|order| order as f32);

    Ok(Some(BookMetadata {
        title: Some(title),
        authors: book.authors,
        genres: book.genre,
        description: book.description,
        cover_url: None,
        page_count: to_page_count(&book.page_count),
        publisher: None,
        publish_year: None,
        language: None,
        series: book.series.filter(|series| !series.trim().is_empty()),
        series_order,
    }))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(
            strip_code_fences("```json {\"title\": \"The Odyssey\"}```"),
            "{\"title\": \"The Odyssey\"}"
        );
        assert_eq!(strip_code_fences("```{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn parses_single_line_fence() {
        let metadata = parse_completion_content("```json {\"title\": \"The Odyssey\"}```")
            .unwrap()
            .unwrap();
        assert_eq!(metadata.title.as_deref(), Some("The Odyssey"));
    }

    #[test]
    fn parses_fenced_payload() {
        let content = "```json\n{\"title\": \"The Way of Kings\", \"authors\": [\"Brandon Sanderson\"], \
            \"genre\": [\"Fantasy\"], \"description\": \"Epic fantasy.\", \"pageCount\": 1007, \
            \"series\": \"The Stormlight Archive\", \"seriesOrder\": 1}\n```";
        let metadata = parse_completion_content(content).unwrap().unwrap();
        assert_eq!(metadata.title.as_deref(), Some("The Way of Kings"));
        assert_eq!(metadata.authors, vec!["Brandon Sanderson".to_owned()]);
        assert_eq!(metadata.genres, vec!["Fantasy".to_owned()]);
        assert_eq!(metadata.page_count, Some(1007));
        assert_eq!(metadata.series.as_deref(), Some("The Stormlight Archive"));
        assert_eq!(metadata.series_order, Some(1.0));
    }

    #[test]
    fn payload_without_title_is_rejected() {
        assert_eq!(parse_completion_content("{\"title\": null}").unwrap(), None);
        assert_eq!(
            parse_completion_content("{\"authors\": [\"Someone\"]}").unwrap(),
            None
        );
    }

    #[test]
    fn unparseable_payload_is_an_error() {
        assert!(parse_completion_content("I am not sure about this book.").is_err());
        assert!(parse_completion_content("[1, 2, 3]").is_err());
    }

    #[test]
    fn lenient_numbers() {
        let metadata =
            parse_completion_content("{\"title\": \"Novella\", \"pageCount\": \"120\", \"seriesOrder\": \"1.5\"}")
                .unwrap()
                .unwrap();
        assert_eq!(metadata.page_count, Some(120));
        assert_eq!(metadata.series_order, Some(1.5));
    }

    #[test]
    fn default_config_lists_models_in_order() {
        let config = LlmConfig::new("secret");
        assert_eq!(config.models.first().map(String::as_str), Some("llama-3.3-70b-versatile"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
