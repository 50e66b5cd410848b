//! Ollama chat client and prompt runner.
//!
//! Every LLM stage builds a list of [`Prompt`]s and hands them to a
//! [`PromptRunner`], which sends them with bounded concurrency and returns
//! the replies in input order. A failed prompt is logged and yields `None`,
//! so one bad reply never aborts a batch run.

use crate::config::LlmConfig;
use crate::error::{MonographError, OptionExt, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// A chat model that answers one system + user message pair.
pub trait ChatModel: Sync {
    /// Send a single chat exchange and return the assistant reply
    fn chat(&self, system: &str, prompt: &str) -> impl Future<Output = Result<ChatReply>> + Send;
}

/// Assistant reply with the tokens it cost
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// Token usage tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Accumulated token usage with atomic counters
struct AtomicTokenUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

impl AtomicTokenUsage {
    fn new() -> Self {
        Self {
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        }
    }

    fn add(&self, usage: &TokenUsage) {
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
    }

    fn get(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

// === Ollama API ===

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    options: ChatOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Client for the Ollama `/api/chat` endpoint
pub struct OllamaClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MonographError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.host.trim_end_matches('/'))
    }
}

impl ChatModel for OllamaClient {
    async fn chat(&self, system: &str, prompt: &str) -> Result<ChatReply> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            options: ChatOptions {
                temperature: self.config.temperature,
            },
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(MonographError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MonographError::Api {
                code: i32::from(status.as_u16()),
                message: format!("Ollama error: {} - {}", status, error_text),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| MonographError::Parse(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(message) = body.error {
            return Err(MonographError::Api { code: 200, message });
        }

        let content = body
            .message
            .map(|m| m.content)
            .ok_or_parse("Ollama response has no message")?;

        Ok(ChatReply {
            content,
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
                total_tokens: body.prompt_eval_count + body.eval_count,
            },
        })
    }
}

/// One prompt to send, labelled for logging
#[derive(Debug, Clone)]
pub struct Prompt {
    pub label: String,
    pub system: &'static str,
    pub user: String,
}

impl Prompt {
    pub fn new(label: impl Into<String>, system: &'static str, user: String) -> Self {
        Self {
            label: label.into(),
            system,
            user,
        }
    }
}

/// Sends prompts to a model and tracks token usage across a stage
pub struct PromptRunner<'a, M> {
    model: &'a M,
    concurrency: usize,
    usage: AtomicTokenUsage,
}

impl<'a, M: ChatModel> PromptRunner<'a, M> {
    pub fn new(model: &'a M, concurrency: usize) -> Self {
        Self {
            model,
            concurrency: concurrency.max(1),
            usage: AtomicTokenUsage::new(),
        }
    }

    /// Send one prompt; failures are logged and become `None`
    pub async fn run_one(&self, prompt: &Prompt) -> Option<String> {
        debug!(label = %prompt.label, "Sending prompt");
        match self.model.chat(prompt.system, &prompt.user).await {
            Ok(reply) => {
                self.usage.add(&reply.usage);
                Some(reply.content)
            }
            Err(e) => {
                warn!(label = %prompt.label, error = %e, "LLM request failed");
                None
            }
        }
    }

    /// Send all prompts, at most `concurrency` at once, keeping input order
    pub async fn run(&self, prompts: &[Prompt]) -> Vec<Option<String>> {
        if prompts.is_empty() {
            return Vec::new();
        }

        info!(count = prompts.len(), concurrency = self.concurrency, "Sending prompts");

        let outputs: Vec<Option<String>> = stream::iter(prompts.iter())
            .map(|prompt| self.run_one(prompt))
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = outputs.iter().filter(|o| o.is_none()).count();
        if failed > 0 {
            warn!(failed, total = prompts.len(), "Some prompts failed");
        }
        outputs
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage.get()
    }
}

/// Extract JSON from LLM response (handles markdown code blocks)
pub fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    // Check for markdown code block
    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[1..end].join("\n");
        }
    }

    // Try to find JSON object in the text
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

/// Parse a JSON object reply into `(key, value)` pairs in reply order.
///
/// `null` becomes an empty string; strings are kept as-is and any other
/// value is kept as its JSON text.
pub fn parse_json_object(content: &str) -> Result<Vec<(String, String)>> {
    let json_str = extract_json(content);
    let value: Value = serde_json::from_str(&json_str)?;
    match value {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, json_cell(v)))
            .collect()),
        other => Err(MonographError::Parse(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

fn json_cell(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Merge a JSON object reply into `record`; later keys overwrite earlier ones.
///
/// An unparseable reply is logged with its raw text and leaves the record
/// unchanged.
pub fn merge_json_object(output: &str, record: &mut Vec<(String, String)>) {
    match parse_json_object(output) {
        Ok(pairs) => {
            for (key, value) in pairs {
                match record.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => record.push((key, value)),
                }
            }
        }
        Err(e) => {
            error!(output = %output, error = %e, "Failed to parse JSON");
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted chat model for pipeline tests.

    use super::*;
    use std::sync::Mutex;

    /// Answers each prompt with the first rule whose needle occurs in the
    /// user prompt; records every prompt it receives.
    pub struct ScriptedModel {
        rules: Vec<(String, Option<String>)>,
        fallback: String,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedModel {
        pub fn new(fallback: &str) -> Self {
            Self {
                rules: Vec::new(),
                fallback: fallback.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn on(mut self, needle: &str, reply: &str) -> Self {
            self.rules.push((needle.to_string(), Some(reply.to_string())));
            self
        }

        pub fn fail_on(mut self, needle: &str) -> Self {
            self.rules.push((needle.to_string(), None));
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|c| c.iter().map(|(_, p)| p.clone()).collect())
                .unwrap_or_default()
        }
    }

    impl ChatModel for ScriptedModel {
        async fn chat(&self, system: &str, prompt: &str) -> Result<ChatReply> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((system.to_string(), prompt.to_string()));
            }
            for (needle, reply) in &self.rules {
                if prompt.contains(needle.as_str()) {
                    return match reply {
                        Some(text) => Ok(ChatReply {
                            content: text.clone(),
                            usage: TokenUsage {
                                prompt_tokens: 10,
                                completion_tokens: 2,
                                total_tokens: 12,
                            },
                        }),
                        None => Err(MonographError::Api {
                            code: 500,
                            message: "scripted failure".to_string(),
                        }),
                    };
                }
            }
            Ok(ChatReply {
                content: self.fallback.clone(),
                usage: TokenUsage::default(),
            })
        }
    }
}
