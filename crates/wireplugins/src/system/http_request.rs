use async_trait::async_trait;
use std::time::Duration;
use wirecore::{FailureKind, Step, StepInput, StepResult, Value};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// General-purpose HTTP request step.
pub struct HttpRequestStep {
    client: reqwest::Client,
}

impl HttpRequestStep {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpRequestStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for HttpRequestStep {
    fn slug(&self) -> &str {
        "http-request"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        let url = input.config_text("url").unwrap_or_default();
        if url.trim().is_empty() {
            return StepResult::fail(FailureKind::Validation, "No URL provided");
        }
        let method = input
            .config_text("method")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "PATCH" => self.client.patch(&url),
            "DELETE" => self.client.delete(&url),
            other => {
                return StepResult::fail(
                    FailureKind::Validation,
                    format!("Unsupported method: {}", other),
                )
            }
        };

        if let Some(Value::Object(headers)) = input.config.get("headers") {
            for (key, value) in headers {
                request = request.header(key.as_str(), value.render());
            }
        }

        if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
            if let Some(body) = input.config.get("body") {
                request = match body {
                    Value::Object(_) | Value::Array(_) | Value::Json(_) => {
                        request.json(&body.to_json())
                    }
                    other => request.body(other.render()),
                };
            }
        }

        tracing::debug!(method = %method, url = %url, "http request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Network
                };
                return StepResult::fail(kind, format!("HTTP request failed: {}", e));
            }
        };

        let status = response.status().as_u16();
        let headers: std::collections::HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Value::String(v.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return StepResult::fail(
                    FailureKind::Network,
                    format!("Failed to read response body: {}", e),
                )
            }
        };

        StepResult::success()
            .with_field("status", status as f64)
            .with_field("body", body)
            .with_field("headers", Value::Object(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::Fields;

    #[tokio::test]
    async fn missing_url_is_validation_failure() {
        let result = HttpRequestStep::new()
            .run(StepInput::new(Fields::new()))
            .await;
        match result {
            StepResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::Validation),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsupported_method_is_validation_failure() {
        let mut config = Fields::new();
        config.insert("url".to_string(), Value::String("http://example.com".into()));
        config.insert("method".to_string(), Value::String("BREW".into()));

        let result = HttpRequestStep::new().run(StepInput::new(config)).await;
        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Validation);
                assert!(failure.message.contains("BREW"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_network_failure() {
        let mut config = Fields::new();
        config.insert("url".to_string(), Value::String("http://127.0.0.1:1".into()));

        let result = HttpRequestStep::new().run(StepInput::new(config)).await;
        match result {
            StepResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::Network),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
