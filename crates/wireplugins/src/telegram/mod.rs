//! Telegram integration: bot messaging plus the webhook plumbing that
//! turns incoming updates into trigger payloads.

mod send_message;

pub use send_message::SendMessageStep;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use wirecore::{
    ActionDescriptor, ConfigField, ConnectivityTest, CredentialField, Fields, InputKind,
    IntegrationDescriptor, Plugin, StepFailure, StepResult, Value,
};

pub(crate) const DEFAULT_API_URL: &str = "https://api.telegram.org";

pub fn plugin() -> Plugin {
    let descriptor = IntegrationDescriptor::new("telegram", "Telegram", "Connect bots")
        .with_credential_field(
            CredentialField::new("botToken", "Bot Token", InputKind::Password)
                .with_placeholder("12345:ABC...")
                .with_env_var("TELEGRAM_BOT_TOKEN")
                .with_help_text("Get from @BotFather"),
        )
        .with_action(
            ActionDescriptor::new("send-message", "telegram", "Send Message")
                .with_description("Reply to chat")
                .with_category("Telegram")
                .with_output("messageId", "Sent Message ID")
                .with_output("chatId", "Chat the message was sent to")
                .with_config_field(
                    ConfigField::new("chatId", "Chat ID", InputKind::TemplateInput)
                        .with_placeholder("Leave empty to reply to sender"),
                )
                .with_config_field(
                    ConfigField::new("text", "Message Text", InputKind::TemplateTextarea)
                        .with_placeholder("Leave empty to echo the incoming message..."),
                )
                .with_config_field(ConfigField::new(
                    "parseMode",
                    "Parse Mode",
                    InputKind::Text,
                )),
        );

    Plugin::new(descriptor)
        .with_step(Arc::new(SendMessageStep::new()))
        .with_connectivity(Arc::new(TelegramConnectivity::new()))
}

/// Validates a bot token against `getMe`.
pub struct TelegramConnectivity {
    client: reqwest::Client,
    api_url: String,
}

impl TelegramConnectivity {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Default for TelegramConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectivityTest for TelegramConnectivity {
    async fn test(&self, credentials: &HashMap<String, String>) -> StepResult {
        let token = match credentials.get("botToken").filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                return StepResult::Failure(StepFailure::validation("Token required"));
            }
        };

        let response = self
            .client
            .get(format!("{}/bot{}/getMe", self.api_url, token))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return StepResult::Failure(StepFailure::network(format!(
                    "Failed to reach Telegram: {}",
                    e
                )))
            }
        };

        let status = response.status();
        let data: serde_json::Value = match response.json().await {
            Ok(data) => data,
            Err(_) => {
                return StepResult::Failure(StepFailure::external_api("Invalid token"));
            }
        };

        if !status.is_success() || data["ok"] != serde_json::Value::Bool(true) {
            let description = data["description"].as_str().unwrap_or("Invalid token");
            return StepResult::Failure(StepFailure::external_api(description));
        }
        StepResult::success()
    }
}

/// Registers `webhook_url` with Telegram for the bot the credentials
/// describe. Used by the server's webhook-registration boundary.
pub async fn register_webhook(
    credentials: &HashMap<String, String>,
    webhook_url: &str,
) -> Result<(), StepFailure> {
    let token = credentials
        .get("botToken")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            StepFailure::validation("Integration does not contain a Telegram bot token")
        })?;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/bot{}/setWebhook", DEFAULT_API_URL, token))
        .query(&[("url", webhook_url)])
        .send()
        .await
        .map_err(|e| StepFailure::network(format!("Failed to reach Telegram: {}", e)))?;

    let data: serde_json::Value = response
        .json()
        .await
        .map_err(|e| StepFailure::external_api(format!("Telegram returned invalid JSON: {}", e)))?;

    if data["ok"] != serde_json::Value::Bool(true) {
        let description = data["description"].as_str().unwrap_or("webhook rejected");
        return Err(StepFailure::external_api(format!(
            "Telegram error: {}",
            description
        )));
    }
    Ok(())
}

/// Flatten a Telegram update into trigger fields: `chatId`, `text`,
/// `messageId`, `from`.
pub fn trigger_fields_from_update(update: &serde_json::Value) -> Fields {
    let message = &update["message"];
    let mut fields = Fields::new();
    if let Some(chat_id) = message["chat"]["id"].as_f64() {
        fields.insert("chatId".to_string(), Value::Number(chat_id));
    }
    if let Some(text) = message["text"].as_str() {
        fields.insert("text".to_string(), Value::String(text.to_string()));
    }
    if let Some(message_id) = message["message_id"].as_f64() {
        fields.insert("messageId".to_string(), Value::Number(message_id));
    }
    if let Some(username) = message["from"]["username"].as_str() {
        fields.insert("from".to_string(), Value::String(username.to_string()));
    }
    fields
}
