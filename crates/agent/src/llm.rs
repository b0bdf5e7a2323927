//! Text-completion clients. The model only ever translates or picks from a
//! list; it never decides prices or stock.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use kasir_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(http: Client, base_url: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

pub fn gemini_body(system: &str, prompt: &str) -> Value {
    json!({
        "system_instruction": {"parts": [{"text": system}]},
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        "generationConfig": {"temperature": 0.0}
    })
}

pub fn gemini_text(payload: &Value) -> Result<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("gemini response carries no candidate parts"))?;
    let text: String = parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)).collect();
    if text.trim().is_empty() {
        bail!("gemini returned an empty completion");
    }
    Ok(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&gemini_body(system, prompt))
            .send()
            .await
            .context("gemini request failed")?;
        if !response.status().is_success() {
            bail!("gemini returned {}", response.status());
        }
        let payload: Value = response.json().await.context("undecodable gemini response")?;
        gemini_text(&payload)
    }
}

/// Chat-completions API shared by OpenAI and Ollama.
pub struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl ChatCompletionsClient {
    pub fn new(http: Client, base_url: &str, model: &str, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

pub fn chat_text(payload: &Value) -> Result<String> {
    let text = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("chat response carries no message content"))?;
    if text.trim().is_empty() {
        bail!("chat model returned an empty completion");
    }
    Ok(text.to_string())
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ]
        });
        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await.context("chat completion request failed")?;
        if !response.status().is_success() {
            bail!("chat completion returned {}", response.status());
        }
        let payload: Value = response.json().await.context("undecodable chat completion")?;
        chat_text(&payload)
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Ollama => "http://localhost:11434/v1",
    }
}

pub fn build_client(http: Client, config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base_url = config.base_url.as_deref().unwrap_or(default_base_url(config.provider));
    match config.provider {
        LlmProvider::Gemini => {
            let api_key = config.api_key.clone().ok_or_else(|| anyhow!("llm.api_key is required for gemini"))?;
            Ok(Arc::new(GeminiClient::new(http, base_url, &config.model, api_key)))
        }
        LlmProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| anyhow!("llm.api_key is required for openai"))?;
            Ok(Arc::new(ChatCompletionsClient::new(http, base_url, &config.model, Some(api_key))))
        }
        LlmProvider::Ollama => {
            Ok(Arc::new(ChatCompletionsClient::new(http, base_url, &config.model, config.api_key.clone())))
        }
    }
}
