//! The seam between the aggregation algorithm and the service that produces labels.
//!
//! [Summarizer] is the raw backend and is allowed to fail. [ResilientSummarizer] wraps it with
//! retries and falls back to an identity transform when a call keeps failing, so a broken
//! backend degrades a generated tree instead of aborting it.

use std::{collections::HashMap, future::Future, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Most labels kept from a single extraction.
pub const MAX_EXTRACTED_LABELS: usize = 4;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Request to the summarizer failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Summarizer answered with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Summarizer returned no content")]
    EmptyResponse,
    #[error("Summarizer response couldn't be parsed: {0}")]
    Unparseable(String),
    #[error("Summarizer is unavailable: {0}")]
    Unavailable(String),
}

impl SummarizeError {
    fn is_retryable(&self) -> bool {
        !matches!(self, SummarizeError::Unavailable(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Cleans up reconstructed text: typos, stray keystrokes, formatting.
    async fn refine(&self, text: &str) -> Result<String, SummarizeError>;

    /// A few short labels describing `content`, which was typed into `activity`.
    async fn extract_concepts(
        &self,
        activity: &str,
        content: &str,
    ) -> Result<Vec<String>, SummarizeError>;

    /// Merges `labels` into about `target` broader labels.
    async fn merge_concepts(
        &self,
        labels: &[String],
        target: usize,
    ) -> Result<Vec<String>, SummarizeError>;

    /// Assigns every label to one of `categories`. Keys of the result are labels.
    async fn map_concepts(
        &self,
        labels: &[String],
        categories: &[String],
    ) -> Result<HashMap<String, String>, SummarizeError>;

    /// One short phrase summarizing all `labels`.
    async fn synthesize_root(&self, labels: &[String]) -> Result<String, SummarizeError>;
}

pub struct ResilientSummarizer {
    backend: Box<dyn Summarizer>,
    attempts: u32,
    retry_delay: Duration,
}

impl ResilientSummarizer {
    pub fn new(backend: Box<dyn Summarizer>, attempts: u32) -> Self {
        Self {
            backend,
            attempts: attempts.max(1),
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    async fn with_retries<'a, T, Fut>(
        &'a self,
        operation: &str,
        mut call: impl FnMut(&'a dyn Summarizer) -> Fut,
    ) -> Option<T>
    where
        Fut: Future<Output = Result<T, SummarizeError>>,
    {
        for attempt in 1..=self.attempts {
            match call(self.backend.as_ref()).await {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!("{operation} failed on attempt {attempt}/{}: {e}", self.attempts);
                    if !e.is_retryable() {
                        break;
                    }
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        None
    }

    /// Refined text, or `text` itself when the backend fails.
    pub async fn refine(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.into();
        }
        match self.with_retries("Refining", |b| b.refine(text)).await {
            Some(refined) if !refined.trim().is_empty() => refined,
            _ => text.into(),
        }
    }

    /// Between 1 and [MAX_EXTRACTED_LABELS] labels. Falls back to the activity name.
    pub async fn extract_concepts(&self, activity: &str, content: &str) -> Vec<String> {
        let labels = self
            .with_retries("Concept extraction", |b| b.extract_concepts(activity, content))
            .await
            .map(clean_labels)
            .unwrap_or_default();
        if labels.is_empty() {
            debug!("Using {activity:?} as its own concept");
            let fallback = activity.trim().to_lowercase();
            return vec![if fallback.is_empty() {
                "activity".into()
            } else {
                fallback
            }];
        }
        labels.into_iter().take(MAX_EXTRACTED_LABELS).collect()
    }

    /// Merged labels, or `labels` unchanged when the backend fails. The caller is responsible
    /// for the result actually being smaller.
    pub async fn merge_concepts(&self, labels: &[String], target: usize) -> Vec<String> {
        let merged = self
            .with_retries("Concept merge", |b| b.merge_concepts(labels, target))
            .await
            .map(clean_labels)
            .unwrap_or_default();
        if merged.is_empty() {
            return labels.to_vec();
        }
        merged
    }

    /// Index into `categories` for every label. Labels the backend didn't place, or placed into
    /// an unknown category, are assigned round-robin.
    pub async fn map_concepts(&self, labels: &[String], categories: &[String]) -> Vec<usize> {
        if categories.is_empty() {
            return vec![];
        }
        let mapping = self
            .with_retries("Concept mapping", |b| b.map_concepts(labels, categories))
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|(label, category)| (normalize(&label), normalize(&category)))
            .collect::<HashMap<_, _>>();

        labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                mapping
                    .get(&normalize(label))
                    .and_then(|category| categories.iter().position(|c| normalize(c) == *category))
                    .unwrap_or(i % categories.len())
            })
            .collect()
    }

    /// Root label, or the labels joined by ` / ` when the backend fails.
    pub async fn synthesize_root(&self, labels: &[String]) -> String {
        let root = self
            .with_retries("Root synthesis", |b| b.synthesize_root(labels))
            .await
            .map(|root| clean_label(&root))
            .unwrap_or_default();
        if root.is_empty() {
            return labels.join(" / ");
        }
        root
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Trims quotes and whitespace and lowercases.
pub fn clean_label(label: &str) -> String {
    normalize(label.trim().trim_matches(['"', '\'', '`']))
}

/// Cleans every label, dropping empty ones and duplicates while keeping order.
pub fn clean_labels(labels: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = clean_label(&label);
        if !label.is_empty() && !cleaned.contains(&label) {
            cleaned.push(label);
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{MockSummarizer, ResilientSummarizer, SummarizeError};

    fn resilient(mock: MockSummarizer) -> ResilientSummarizer {
        ResilientSummarizer::new(Box::new(mock), 2).with_retry_delay(Duration::ZERO)
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn failed_call_is_retried() {
        let mut mock = MockSummarizer::new();
        let mut calls = 0;
        mock.expect_extract_concepts().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(SummarizeError::EmptyResponse)
            } else {
                Ok(labels(&[" Rust Tooling ", "\"debugging\"", "rust tooling", ""]))
            }
        });

        let concepts = resilient(mock).extract_concepts("editor", "cargo").await;
        assert_eq!(concepts, ["rust tooling", "debugging"]);
    }

    #[tokio::test]
    async fn extraction_keeps_at_most_four_labels() {
        let mut mock = MockSummarizer::new();
        mock.expect_extract_concepts()
            .returning(|_, _| Ok(labels(&["a", "b", "c", "d", "e"])));

        let concepts = resilient(mock).extract_concepts("editor", "text").await;
        assert_eq!(concepts, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn failures_fall_back_to_identity() {
        let mut mock = MockSummarizer::new();
        mock.expect_refine()
            .times(2)
            .returning(|_| Err(SummarizeError::EmptyResponse));
        mock.expect_extract_concepts()
            .times(2)
            .returning(|_, _| Err(SummarizeError::Unparseable("?".into())));
        mock.expect_merge_concepts()
            .times(2)
            .returning(|_, _| Err(SummarizeError::EmptyResponse));
        mock.expect_synthesize_root()
            .times(2)
            .returning(|_| Err(SummarizeError::EmptyResponse));
        let summarizer = resilient(mock);

        assert_eq!(summarizer.refine("teh cat").await, "teh cat");
        assert_eq!(
            summarizer.extract_concepts("Terminal", "ls").await,
            ["terminal"]
        );
        let current = labels(&["coding", "reading"]);
        assert_eq!(summarizer.merge_concepts(&current, 1).await, current);
        assert_eq!(summarizer.synthesize_root(&current).await, "coding / reading");
    }

    #[tokio::test]
    async fn missing_backend_is_not_retried() {
        let mut mock = MockSummarizer::new();
        mock.expect_refine()
            .times(1)
            .returning(|_| Err(SummarizeError::Unavailable("no key".into())));

        assert_eq!(resilient(mock).refine("raw").await, "raw");
    }

    #[tokio::test]
    async fn invalid_mapping_falls_back_to_round_robin() {
        let mut mock = MockSummarizer::new();
        mock.expect_map_concepts().returning(|_, _| {
            Ok(HashMap::from([
                ("Coding".to_string(), "work".to_string()),
                ("reading".to_string(), "nonexistent".to_string()),
            ]))
        });
        let current = labels(&["coding", "reading", "chatting"]);
        let categories = labels(&["leisure", "work"]);

        let assignment = resilient(mock).map_concepts(&current, &categories).await;
        assert_eq!(assignment, [1, 1, 0]);
    }
}
