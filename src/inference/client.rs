//! Inference API client
//!
//! Handles communication with the chat-completions inference service:
//! - text and vision (image) requests
//! - rate limiting (concurrency cap + request spacing)
//! - bounded retry with exponential backoff on rate limits and connectivity
//! - token usage tracking

use crate::config::InferenceSettings;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

/// Failures surfaced by the inference collaborator. The classifiers fold
/// these into upstream classifier errors, which the engine treats as
/// retryable.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited, retries exhausted")]
    RateLimited,

    #[error("empty response from inference service")]
    NoContent,

    #[error("unparseable response: {0}")]
    Parse(String),
}

/// Chat-completions client with rate limiting.
pub struct InferenceClient {
    client: reqwest::Client,
    settings: InferenceSettings,
    rate_limiter: Arc<RateLimiter>,
    tokens_used: AtomicU32,
}

impl InferenceClient {
    pub fn new(settings: InferenceSettings) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| InferenceError::Client(e.to_string()))?;

        let rate_limiter = Arc::new(RateLimiter::new(
            settings.max_concurrent_requests,
            settings.requests_per_second,
        ));

        Ok(Self {
            client,
            settings,
            rate_limiter,
            tokens_used: AtomicU32::new(0),
        })
    }

    /// Send a text-only prompt and return the raw completion text.
    pub async fn complete_text(&self, prompt: &str) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: self.settings.text_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![ContentPart::Text {
                    text: prompt.to_string(),
                }],
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        self.complete(request).await
    }

    /// Send a prompt plus one JPEG page image (base64) to the vision model.
    pub async fn complete_vision(
        &self,
        prompt: &str,
        jpeg_base64: &str,
    ) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: self.settings.vision_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlContent {
                            url: format!("data:image/jpeg;base64,{}", jpeg_base64),
                            detail: "low".to_string(),
                        },
                    },
                ],
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        self.complete(request).await
    }

    /// Total tokens consumed by this client.
    pub fn tokens_used(&self) -> u32 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, InferenceError> {
        self.rate_limiter.acquire().await;

        let response = self.send_request(&request).await?;
        if let Some(usage) = &response.usage {
            self.tokens_used
                .fetch_add(usage.total_tokens, Ordering::Relaxed);
        }

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(InferenceError::NoContent)
    }

    /// Send with retry on 429 and connectivity failures.
    async fn send_request(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        let max_retries = self.settings.max_retries;
        let mut retry_delay = Duration::from_secs(2);

        for retry in 0..=max_retries {
            if retry > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.settings.base_url))
                .header("Authorization", format!("Bearer {}", self.settings.api_key))
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await;

            match resp {
                Ok(r) if r.status().as_u16() == 429 => {
                    tracing::warn!(
                        "[Inference] Rate limited, retry {}/{}",
                        retry + 1,
                        max_retries
                    );
                    continue;
                }
                Ok(r) if r.status().is_success() => {
                    return r
                        .json()
                        .await
                        .map_err(|e| InferenceError::Parse(e.to_string()));
                }
                Ok(r) => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(InferenceError::Api { status, body });
                }
                Err(e) => {
                    if retry == max_retries {
                        return Err(InferenceError::Transport(e.to_string()));
                    }
                    continue;
                }
            }
        }

        Err(InferenceError::RateLimited)
    }
}

/// Caps concurrent requests and enforces a minimum spacing between them so
/// the upstream service's rate budget is respected across all documents.
struct RateLimiter {
    semaphore: Semaphore,
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl RateLimiter {
    fn new(max_concurrent: usize, requests_per_second: f32) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            min_interval: Duration::from_secs_f32(1.0 / requests_per_second.max(0.1)),
            last_request: Mutex::new(Instant::now() - Duration::from_secs(10)),
        }
    }

    async fn acquire(&self) {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            // Closed semaphore only happens at shutdown; proceed unthrottled.
            Err(_) => return,
        };

        let wait_time = {
            let mut last = self.last_request.lock().await;
            let elapsed = last.elapsed();
            let wait = self.min_interval.saturating_sub(elapsed);
            *last = Instant::now() + wait;
            wait
        };

        if !wait_time.is_zero() {
            tokio::time::sleep(wait_time).await;
        }
    }
}

// Wire types (OpenAI-compatible chat completions)

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlContent },
}

#[derive(Serialize)]
struct ImageUrlContent {
    url: String,
    detail: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(4, 50.0); // 20ms spacing
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // Two gaps of at least ~20ms each
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_vision_request_serializes_image_part() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: vec![
                    ContentPart::Text { text: "p".into() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlContent {
                            url: "data:image/jpeg;base64,AAAA".into(),
                            detail: "low".into(),
                        },
                    },
                ],
            }],
            max_tokens: 10,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
    }
}
