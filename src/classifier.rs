// src/classifier.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, redirect};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ClassifierSettings;
use crate::error::ClassifierError;

const HTTP_TIMEOUT_SECS: u64 = 15;

/// Modele lubią opakowywać JSON w prozę/markdown – wycinamy pierwszy
/// nawiasowy blok.
static RE_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/* =========================================
   Kontrakt werdyktu
   ========================================= */

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub violation: bool,
    pub reason: String,
    /// 0–100.
    pub severity: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Jedna wiadomość w żądaniu wsadowym.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub message_id: u64,
    pub author: String,
    pub content: String,
    pub detoxify: bool,
    /// Punkty reputacji autora w chwili zakolejkowania (sygnał recydywy).
    pub author_points: u32,
}

/// Linia kontekstu kanału dołączana do promptu.
#[derive(Debug, Clone)]
pub struct ContextLine {
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Tekst regulaminu współdzielony przez cały wsad.
    pub rules: Option<String>,
    /// Nadpisanie promptu systemowego.
    pub prompt: Option<String>,
    pub context: Vec<ContextLine>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze_one(
        &self,
        text: &str,
        image: Option<&ImageData>,
        options: &ClassifyOptions,
    ) -> Result<Verdict, ClassifierError>;

    /// Zwraca mapę message_id -> werdykt. Brak klucza = brak werdyktu.
    async fn analyze_batch(
        &self,
        items: &[BatchItem],
        options: &ClassifyOptions,
    ) -> Result<HashMap<u64, Verdict>, ClassifierError>;
}

/* =========================================
   Klient HTTP (chat-completions)
   ========================================= */

const DEFAULT_SYSTEM_PROMPT: &str = "You are a chat moderation classifier for a community server. \
Judge each message against the server rules. Flag only real violations: targeted insults, \
harassment, spam, extremism, NSFW. Untargeted profanity, memes and in-game slang are not violations.";

pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    model: String,
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl HttpClassifier {
    pub fn new(settings: &ClassifierSettings) -> Self {
        let timeout = settings.timeout_secs.unwrap_or(HTTP_TIMEOUT_SECS);
        let client = Client::builder()
            .user_agent("VigilGuard/1.0")
            .timeout(std::time::Duration::from_secs(timeout))
            .redirect(redirect::Policy::limited(3))
            .build()
            .expect("HTTP client");
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            keys: settings.api_keys.clone(),
            cursor: AtomicUsize::new(0),
        }
    }

    fn next_key(&self) -> Result<&str, ClassifierError> {
        if self.keys.is_empty() {
            return Err(ClassifierError::NoCredentials);
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Ok(&self.keys[i])
    }

    fn system_prompt(&self, options: &ClassifyOptions, batch: bool) -> String {
        let mut prompt = options
            .prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if let Some(rules) = &options.rules {
            prompt.push_str("\n\nServer rules:\n");
            prompt.push_str(rules);
        }
        if batch {
            prompt.push_str(
                "\n\nRespond ONLY with a JSON object keyed by message id:\n\
                 { \"<id>\": { \"violation\": boolean, \"reason\": string, \
                 \"severity\": number (0-100), \"comment\": string (only when violation) } }\n\
                 Include an entry for every message.",
            );
        } else {
            prompt.push_str(
                "\n\nRespond ONLY with a JSON object:\n\
                 { \"violation\": boolean, \"reason\": string, \
                 \"severity\": number (0-100), \"comment\": string (only when violation) }",
            );
        }
        prompt
    }

    fn context_block(options: &ClassifyOptions) -> Option<String> {
        if options.context.is_empty() {
            return None;
        }
        let mut block = String::from("Recent channel context (oldest first):\n");
        for line in &options.context {
            block.push_str(&format!("{}: {}\n", line.author, line.content));
        }
        Some(block)
    }

    async fn complete(
        &self,
        system: &str,
        user_content: serde_json::Value,
    ) -> Result<String, ClassifierError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content },
            ],
        });

        // Prosty retry: padł jeden klucz, próbujemy następnym (ai pool).
        let attempts = self.keys.len().max(1);
        let mut last_err = ClassifierError::NoCredentials;
        for attempt in 0..attempts {
            let key = self.next_key()?;
            let sent = self
                .client
                .post(&self.endpoint)
                .bearer_auth(key)
                .json(&body)
                .send()
                .await;
            match sent {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => {
                        let parsed: ChatCompletion = resp
                            .json()
                            .await
                            .map_err(|e| ClassifierError::BadPayload(e.to_string()))?;
                        let content = parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| {
                                ClassifierError::BadPayload("empty choices".into())
                            })?;
                        return Ok(content);
                    }
                    Err(e) => {
                        warn!(attempt, error=%e, "classifier endpoint rejected request");
                        last_err = ClassifierError::Transport(e.to_string());
                    }
                },
                Err(e) => {
                    warn!(attempt, error=%e, "classifier transport error");
                    last_err = ClassifierError::Transport(e.to_string());
                }
            }
        }
        Err(last_err)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Surowy kształt werdyktu z modelu – tolerancyjny na braki.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    violation: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    severity: Option<f64>,
    #[serde(default)]
    comment: Option<String>,
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        let severity = raw.severity.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8;
        Verdict {
            violation: raw.violation,
            reason: raw
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "policy violation".to_string()),
            severity,
            comment: raw.comment.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Wytnij i sparsuj pierwszy obiekt JSON z odpowiedzi modelu.
fn extract_json<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, ClassifierError> {
    let raw = RE_JSON
        .find(content)
        .map(|m| m.as_str())
        .unwrap_or(content);
    serde_json::from_str(raw).map_err(|e| ClassifierError::BadPayload(e.to_string()))
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn analyze_one(
        &self,
        text: &str,
        image: Option<&ImageData>,
        options: &ClassifyOptions,
    ) -> Result<Verdict, ClassifierError> {
        let system = self.system_prompt(options, false);

        let mut parts = Vec::new();
        if let Some(block) = Self::context_block(options) {
            parts.push(json!({ "type": "text", "text": block }));
        }
        let text = if text.is_empty() { "[no text]" } else { text };
        parts.push(json!({ "type": "text", "text": format!("Message: \"{text}\"") }));
        if let Some(img) = image {
            let url = format!("data:{};base64,{}", img.mime, B64.encode(&img.bytes));
            parts.push(json!({ "type": "image_url", "image_url": { "url": url } }));
        }

        let content = self.complete(&system, serde_json::Value::Array(parts)).await?;
        let raw: RawVerdict = extract_json(&content)?;
        Ok(raw.into())
    }

    async fn analyze_batch(
        &self,
        items: &[BatchItem],
        options: &ClassifyOptions,
    ) -> Result<HashMap<u64, Verdict>, ClassifierError> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let system = self.system_prompt(options, true);

        let mut body = String::new();
        if let Some(block) = Self::context_block(options) {
            body.push_str(&block);
            body.push('\n');
        }
        body.push_str("Messages:\n");
        for item in items {
            if item.author_points > 0 {
                body.push_str(&format!(
                    "[{}] {} (rep points: {}): {}\n",
                    item.message_id, item.author, item.author_points, item.content
                ));
            } else {
                body.push_str(&format!(
                    "[{}] {}: {}\n",
                    item.message_id, item.author, item.content
                ));
            }
        }

        let content = self
            .complete(&system, serde_json::Value::String(body))
            .await?;
        let raw: HashMap<String, RawVerdict> = extract_json(&content)?;

        let mut verdicts = HashMap::new();
        for (key, value) in raw {
            match key.parse::<u64>() {
                Ok(id) => {
                    verdicts.insert(id, Verdict::from(value));
                }
                Err(_) => debug!(key, "classifier returned unknown message key"),
            }
        }
        Ok(verdicts)
    }
}
