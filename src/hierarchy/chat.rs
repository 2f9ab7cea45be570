//! [Summarizer] backed by an OpenAI-compatible chat completions endpoint (Groq by default).

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{CallSettings, SummarizerSettings};

use super::summarizer::{SummarizeError, Summarizer};

const REFINE_SYSTEM_PROMPT: &str = "You clean up text reconstructed from keystroke logs. \
Fix typos and grammar, drop gibberish and accidental keystrokes, keep the meaning, and format \
commands and code sensibly. Keep line breaks where they separate commands or paragraphs. \
Output only the refined text, without commentary.";

pub struct ChatSummarizer {
    client: Client,
    settings: SummarizerSettings,
    api_key: Option<String>,
}

impl ChatSummarizer {
    /// Creates a backend using the API key from the environment variable named in `settings`.
    /// Without a key every call fails with [SummarizeError::Unavailable].
    pub fn from_settings(settings: SummarizerSettings) -> Result<Self, SummarizeError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            debug!("{} is not set, summaries use fallbacks", settings.api_key_env);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    #[instrument(skip(self, system, prompt))]
    async fn complete(
        &self,
        call: CallSettings,
        system: Option<&str>,
        prompt: String,
    ) -> Result<String, SummarizeError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SummarizeError::Unavailable(format!("{} is not set", self.settings.api_key_env))
        })?;

        let mut messages = vec![];
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system".into(),
                content: system.into(),
            });
        }
        messages.push(ChatMessage {
            role: "user".into(),
            content: prompt,
        });
        let body = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
        };

        let response = self
            .client
            .post(&self.settings.base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(SummarizeError::EmptyResponse)
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn refine(&self, text: &str) -> Result<String, SummarizeError> {
        let prompt = format!("Refine the following keystroke text:\n\n{text}");
        self.complete(self.settings.refine, Some(REFINE_SYSTEM_PROMPT), prompt)
            .await
    }

    async fn extract_concepts(
        &self,
        activity: &str,
        content: &str,
    ) -> Result<Vec<String>, SummarizeError> {
        let prompt = format!(
            "Extract 2-4 high-level concepts or themes describing this computer activity.\n\n\
             Activity: {activity}\n\n{content}\n\n\
             Each concept is a short phrase of 2-5 words. Answer with a JSON array of strings \
             only, for example [\"concept one\", \"concept two\"]. Answer [] if nothing \
             meaningful stands out."
        );
        let response = self.complete(self.settings.extract, None, prompt).await?;
        Ok(parse_label_list(&response))
    }

    async fn merge_concepts(
        &self,
        labels: &[String],
        target: usize,
    ) -> Result<Vec<String>, SummarizeError> {
        let prompt = format!(
            "These concepts describe someone's computer usage during a day:\n{}\n\n\
             Group related concepts and merge them into {target} broader themes, each a short \
             phrase of 2-6 words. Answer with a JSON array of exactly {target} strings only.",
            to_json_list(labels)
        );
        let response = self.complete(self.settings.merge, None, prompt).await?;
        Ok(parse_label_list(&response))
    }

    async fn map_concepts(
        &self,
        labels: &[String],
        categories: &[String],
    ) -> Result<HashMap<String, String>, SummarizeError> {
        let prompt = format!(
            "Assign every concept to the most fitting broader category.\n\n\
             Concepts:\n{}\n\nCategories:\n{}\n\n\
             Answer with a JSON object only, mapping each concept to exactly one category, for \
             example {{\"concept\": \"category\"}}.",
            to_json_list(labels),
            to_json_list(categories)
        );
        let response = self.complete(self.settings.map, None, prompt).await?;
        parse_mapping(&response)
    }

    async fn synthesize_root(&self, labels: &[String]) -> Result<String, SummarizeError> {
        let prompt = format!(
            "These are the top-level themes of someone's whole day at the computer:\n{}\n\n\
             Summarize them in ONE phrase of 3-8 words capturing the essence of the day. Answer \
             with the phrase only, without quotes.",
            to_json_list(labels)
        );
        self.complete(self.settings.root, None, prompt).await
    }
}

fn to_json_list(labels: &[String]) -> String {
    serde_json::to_string_pretty(labels).unwrap_or_else(|_| labels.join("\n"))
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn map_http_error(status: StatusCode, body: String) -> SummarizeError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    SummarizeError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(response: &str) -> &str {
    let response = response.trim();
    let Some(fenced) = response.strip_prefix("```") else {
        return response;
    };
    let inner = fenced.split("```").next().unwrap_or(fenced);
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

/// Reads a list of labels from a JSON array, or failing that from newline or comma separated
/// text. Labels are lowercased.
pub fn parse_label_list(response: &str) -> Vec<String> {
    let response = strip_code_fence(response);
    if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(response) {
        return values
            .into_iter()
            .filter_map(|value| match value {
                Value::String(label) => Some(label),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
    }

    response
        .replace('\n', ",")
        .split(',')
        .map(|item| {
            item.trim()
                .trim_start_matches(['-', '*'])
                .trim()
                .trim_matches(['"', '\'', '[', ']'])
                .trim()
                .to_lowercase()
        })
        .filter(|label| !label.is_empty())
        .collect()
}

/// Reads a label to category JSON object.
pub fn parse_mapping(response: &str) -> Result<HashMap<String, String>, SummarizeError> {
    let response = strip_code_fence(response);
    let Value::Object(entries) = serde_json::from_str::<Value>(response)
        .map_err(|e| SummarizeError::Unparseable(e.to_string()))?
    else {
        return Err(SummarizeError::Unparseable(format!(
            "expected an object, got {response}"
        )));
    };
    Ok(entries
        .into_iter()
        .filter_map(|(label, category)| match category {
            Value::String(category) => Some((label.to_lowercase(), category)),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::{
        config::SummarizerSettings,
        hierarchy::summarizer::{SummarizeError, Summarizer},
    };

    use super::{parse_label_list, parse_mapping, strip_code_fence, ChatSummarizer};

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fence("```\n[\"a\"]```"), "[\"a\"]");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn json_lists_are_parsed_and_lowercased() {
        assert_eq!(
            parse_label_list("```json\n[\"Web Browsing\", \" Email \", null]\n```"),
            ["web browsing", "email"]
        );
    }

    #[test]
    fn non_json_lists_fall_back_to_splitting() {
        assert_eq!(
            parse_label_list("- Coding\n- \"Code Review\", ['Email']"),
            ["coding", "code review", "email"]
        );
    }

    #[test]
    fn mapping_keys_are_lowercased() -> Result<()> {
        let mapping = parse_mapping("```json\n{\"Coding\": \"Work\", \"x\": 3}\n```")?;
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["coding"], "Work");
        assert!(parse_mapping("[\"a\"]").is_err());
        assert!(parse_mapping("not json").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_makes_backend_unavailable() -> Result<()> {
        let settings = SummarizerSettings {
            api_key_env: "TYPETRACE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let backend = ChatSummarizer::from_settings(settings)?;
        assert!(matches!(
            backend.refine("text").await,
            Err(SummarizeError::Unavailable(_))
        ));
        Ok(())
    }
}
