//! Ollama-backed reasoning oracle
//!
//! Streams `/api/generate` and concatenates the NDJSON `response` fragments
//! into a single completion.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::OracleConfig;
use crate::errors::{RecoveryError, Result};
use crate::oracle::{CompletionOptions, ReasoningOracle};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Transport-level timeout; per-call deadlines are enforced by the caller
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Ollama completion client
#[derive(Debug, Clone)]
pub struct OllamaOracle {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaOracle {
    /// Create client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create client with custom endpoint and model
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RecoveryError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Create client from the oracle config section
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        Self::with_config(&config.base_url(), &config.model)
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReasoningOracle for OllamaOracle {
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecoveryError::OracleUnavailable(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecoveryError::OracleUnavailable(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let mut stream = response.bytes_stream();
        let mut collector = CompletionCollector::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| RecoveryError::OracleUnavailable(e.to_string()))?;
            if collector.push(&bytes)? {
                break;
            }
        }
        collector.finish()?;

        debug!(model = %self.model, chars = collector.text.len(), "oracle completion received");
        Ok(collector.text)
    }
}

/// Accumulates NDJSON generate chunks that may be split across reads
#[derive(Debug, Default)]
struct CompletionCollector {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl CompletionCollector {
    /// Feed raw bytes; returns true once the final chunk has been seen
    fn push(&mut self, bytes: &[u8]) -> Result<bool> {
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line)?;
        }

        Ok(self.done)
    }

    /// Flush any trailing line without a newline
    fn finish(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.consume_line(&line)?;
        }
        Ok(())
    }

    fn consume_line(&mut self, line: &[u8]) -> Result<()> {
        let trimmed = String::from_utf8_lossy(line);
        let trimmed = trimmed.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let chunk: GenerateChunk = serde_json::from_str(trimmed)
            .map_err(|e| RecoveryError::JsonParseError(format!("Bad generate chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(RecoveryError::OracleUnavailable(error));
        }

        self.text.push_str(&chunk.response);
        self.done |= chunk.done;
        Ok(())
    }
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// One streamed generate chunk
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
