// MindHarbor - HTTP generator (OpenAI-compatible chat completions)

use super::*;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// HttpGenerator sends the grounding prompt as a single user message to an
/// OpenAI-compatible `/chat/completions` endpoint (Groq by default).
pub struct HttpGenerator {
    api_key: String,
    api_base: String,
    client: Client,
}

impl HttpGenerator {
    pub fn new(api_key: String, api_base: String) -> anyhow::Result<Self> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30));

        let base = if api_base.is_empty() {
            // Default API bases by key prefix
            if api_key.starts_with("gsk_") {
                "https://api.groq.com/openai/v1".to_string()
            } else if api_key.starts_with("sk-or-") {
                "https://openrouter.ai/api/v1".to_string()
            } else {
                "https://api.openai.com/v1".to_string()
            }
        } else {
            api_base
        };

        Ok(Self {
            api_key,
            api_base: base,
            client: builder.build()?,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let max_retries = params.max_retries;

        // Build request body once
        let body = json!({
            "model": params.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        let mut last_error = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                tracing::info!(
                    attempt = attempt,
                    "Retrying generation request after {}ms delay",
                    params.retry_delay_ms
                );
                tokio::time::sleep(Duration::from_millis(params.retry_delay_ms)).await;
            }

            tracing::debug!(
                url = %url,
                model = %params.model,
                attempt = attempt,
                prompt_len = prompt.len(),
                "Sending generation request"
            );

            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match res {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let response_body = response.text().await?;
                        let completion = parse_response(&response_body)?;
                        if let Some(usage) = &completion.usage {
                            tracing::debug!(
                                prompt_tokens = usage.prompt_tokens,
                                completion_tokens = usage.completion_tokens,
                                finish_reason = %completion.finish_reason,
                                "Generation complete"
                            );
                        }
                        return Ok(completion.content);
                    }

                    let is_transient = status.is_server_error() || status.as_u16() == 429;
                    let response_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "could not read body".to_string());

                    if is_transient && attempt < max_retries {
                        tracing::warn!(status = %status, attempt = attempt, "Transient generator error: {}", response_body);
                        last_error = Some(anyhow::anyhow!(
                            "generator API error ({}): {}",
                            status,
                            response_body
                        ));
                        continue;
                    } else {
                        anyhow::bail!("generator API error ({}): {}", status, response_body);
                    }
                }
                Err(e) if attempt < max_retries => {
                    tracing::warn!(error = %e, attempt = attempt, "Network error during generation request");
                    last_error = Some(anyhow::Error::from(e));
                    continue;
                }
                Err(e) => return Err(anyhow::Error::from(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("generation failed after {} attempts", max_retries + 1)
        }))
    }

    fn name(&self) -> &str {
        &self.api_base
    }
}

/// Parse an OpenAI-compatible chat completion response.
fn parse_response(body: &str) -> anyhow::Result<Completion> {
    let v: serde_json::Value = serde_json::from_str(body)?;

    // Check for API error
    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("generator API error: {}", msg);
    }

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("No choices in generator response"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| anyhow::anyhow!("No message in choice"))?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|f| f.as_str())
        .unwrap_or("stop")
        .to_string();

    let usage = v.get("usage").map(|u| UsageInfo {
        prompt_tokens: u.get("prompt_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(|n| n.as_u64())
            .unwrap_or(0) as usize,
        total_tokens: u.get("total_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
    });

    Ok(Completion {
        content,
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_response() {
        let json = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Try a short walk."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let resp = parse_response(json).unwrap();
        assert_eq!(resp.content, "Try a short walk.");
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_null_content_is_empty() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let resp = parse_response(json).unwrap();
        assert!(resp.content.is_empty());
        assert!(resp.usage.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{"error": {"message": "Invalid API key", "type": "auth_error"}}"#;
        let result = parse_response(json);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid API key"));
    }

    #[test]
    fn test_parse_no_choices() {
        assert!(parse_response(r#"{"choices": []}"#).is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn test_default_base_by_key_prefix() {
        let groq = HttpGenerator::new("gsk_abc".into(), String::new()).unwrap();
        assert_eq!(groq.api_base(), "https://api.groq.com/openai/v1");
        let custom = HttpGenerator::new("k".into(), "http://localhost:9000/v1".into()).unwrap();
        assert_eq!(custom.api_base(), "http://localhost:9000/v1");
    }
}
