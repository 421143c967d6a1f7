use async_trait::async_trait;
use wirecore::{FailureKind, Step, StepInput, StepResult};

/// Sends a message through the Telegram Bot API.
///
/// Blank `chatId`/`text` fall back to the trigger payload's fields of
/// the same name, so a bare node wired after a Telegram trigger replies
/// to the sender with the incoming text. Both fallbacks failing is a
/// validation failure before any network call.
pub struct SendMessageStep {
    client: reqwest::Client,
    api_url: String,
}

impl SendMessageStep {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: super::DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

impl Default for SendMessageStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for SendMessageStep {
    fn slug(&self) -> &str {
        "send-message"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        let token = match input.credentials.get("botToken").filter(|t| !t.is_empty()) {
            Some(token) => token.clone(),
            None => {
                return StepResult::fail(
                    FailureKind::CredentialMissing,
                    "Telegram bot token is not configured",
                )
            }
        };

        let chat_id = input.text_or_trigger("chatId");
        let text = input.text_or_trigger("text");

        // Pre-flight validation keeps provider "Bad Request" noise out of
        // the run report and guarantees no call without a destination.
        let chat_id = match chat_id {
            Some(chat_id) => chat_id,
            None => {
                return StepResult::fail(
                    FailureKind::Validation,
                    "No chat ID found. Connect a Telegram trigger or enter a chat ID manually.",
                )
            }
        };
        let text = match text {
            Some(text) => text,
            None => {
                return StepResult::fail(
                    FailureKind::Validation,
                    "Message text is empty. Type a message or ensure the trigger sent text.",
                )
            }
        };

        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(mode) = input.config_text("parseMode").filter(|m| !m.is_empty()) {
            body["parse_mode"] = serde_json::Value::String(mode);
        }

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, token))
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return StepResult::fail(
                    FailureKind::Network,
                    format!("Failed to reach Telegram: {}", e),
                )
            }
        };

        let status = response.status();
        let data: serde_json::Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                return StepResult::fail(
                    FailureKind::ExternalApi,
                    format!("Telegram returned invalid JSON: {}", e),
                )
            }
        };

        if !status.is_success() || data["ok"] != serde_json::Value::Bool(true) {
            let description = data["description"]
                .as_str()
                .map(|d| d.to_string())
                .unwrap_or_else(|| format!("Telegram API error: {}", status.as_u16()));
            return StepResult::fail(FailureKind::ExternalApi, description);
        }

        let message_id = data["result"]["message_id"].as_f64().unwrap_or(0.0);
        let chat_id = data["result"]["chat"]["id"].as_f64().unwrap_or(0.0);

        StepResult::success()
            .with_field("messageId", message_id)
            .with_field("chatId", chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wirecore::{Fields, StepFailure, Value};

    fn credentials() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("botToken".to_string(), "12345:TEST".to_string());
        map
    }

    #[tokio::test]
    async fn missing_token_is_credential_failure() {
        let step = SendMessageStep::new();
        let result = step.run(StepInput::new(Fields::new())).await;
        match result {
            StepResult::Failure(StepFailure { kind, .. }) => {
                assert_eq!(kind, FailureKind::CredentialMissing);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_chat_id_fails_validation_without_network() {
        // Unroutable api_url: a network attempt would fail differently
        let step = SendMessageStep::new().with_api_url("http://127.0.0.1:1");
        let mut config = Fields::new();
        config.insert("text".to_string(), Value::String("hello".to_string()));

        let result = step
            .run(StepInput::new(config).with_credentials(credentials()))
            .await;
        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Validation);
                assert!(failure.message.contains("chat ID"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_text_fails_validation_without_network() {
        let step = SendMessageStep::new().with_api_url("http://127.0.0.1:1");
        let mut config = Fields::new();
        config.insert("chatId".to_string(), Value::String("42".to_string()));

        let result = step
            .run(StepInput::new(config).with_credentials(credentials()))
            .await;
        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Validation);
                assert!(failure.message.contains("text"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn trigger_fallback_supplies_chat_and_text() {
        // Both fields blank in config, present in trigger data; the step
        // gets past validation and fails only at the (unroutable) network.
        let step = SendMessageStep::new().with_api_url("http://127.0.0.1:1");
        let mut trigger = Fields::new();
        trigger.insert("chatId".to_string(), Value::Number(42.0));
        trigger.insert("text".to_string(), Value::String("echo me".to_string()));

        let result = step
            .run(
                StepInput::new(Fields::new())
                    .with_credentials(credentials())
                    .with_trigger(trigger),
            )
            .await;
        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Network);
            }
            other => panic!("expected network failure, got {:?}", other),
        }
    }
}
