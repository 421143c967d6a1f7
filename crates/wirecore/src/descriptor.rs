use crate::Value;
use serde::{Deserialize, Serialize};

/// Owning integration type used for the built-in system actions.
pub const SYSTEM_INTEGRATION: &str = "system";

/// Declarative description of one third-party integration: identity,
/// credential requirements, and the actions it offers. Consumed by
/// authoring collaborators (UI, CLI listings) and by the registries.
/// Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationDescriptor {
    #[serde(rename = "type")]
    pub integration_type: String,
    pub label: String,
    pub description: String,
    pub credential_fields: Vec<CredentialField>,
    pub actions: Vec<ActionDescriptor>,
}

impl IntegrationDescriptor {
    pub fn new(
        integration_type: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            integration_type: integration_type.into(),
            label: label.into(),
            description: description.into(),
            credential_fields: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_credential_field(mut self, field: CredentialField) -> Self {
        self.credential_fields.push(field);
        self
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }
}

/// One secret an integration instance must carry (e.g. a bot token).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialField {
    pub id: String,
    pub label: String,
    pub input_type: InputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub config_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

impl CredentialField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, input_type: InputKind) -> Self {
        let id = id.into();
        Self {
            config_key: id.clone(),
            id,
            label: label.into(),
            input_type,
            placeholder: None,
            env_var: None,
            help_text: None,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }
}

/// Display type of an authoring form field. Template variants accept
/// `{{NodeTitle.field}}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Text,
    Textarea,
    Password,
    TemplateInput,
    TemplateTextarea,
    TemplatePassword,
}

/// Declarative description of one action: its stable slug, owning
/// integration, and declared input/output schema. The schema is validated
/// by the action registry before every invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub slug: String,
    pub integration_type: String,
    pub label: String,
    pub description: String,
    pub category: String,
    pub output_fields: Vec<OutputField>,
    pub config_fields: Vec<ConfigField>,
}

impl ActionDescriptor {
    pub fn new(
        slug: impl Into<String>,
        integration_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            integration_type: integration_type.into(),
            label: label.into(),
            description: String::new(),
            category: String::new(),
            output_fields: Vec::new(),
            config_fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_output(mut self, field: impl Into<String>, description: impl Into<String>) -> Self {
        self.output_fields.push(OutputField {
            field: field.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_config_field(mut self, field: ConfigField) -> Self {
        self.config_fields.push(field);
        self
    }
}

/// One declared output of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputField {
    pub field: String,
    pub description: String,
}

/// One declared config field of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub key: String,
    pub label: String,
    pub input_type: InputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub required: bool,
}

impl ConfigField {
    pub fn new(key: impl Into<String>, label: impl Into<String>, input_type: InputKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            input_type,
            placeholder: None,
            default_value: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}
