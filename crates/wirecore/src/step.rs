use crate::{Fields, IntegrationDescriptor, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executable implementation bound to an action slug.
///
/// Steps report every expected failure as a `StepResult::Failure` value.
/// Returning is the only error channel: a step that panics is caught by
/// the invocation wrapper and normalized to an Internal failure, but that
/// path is reserved for genuine bugs.
#[async_trait]
pub trait Step: Send + Sync {
    /// Action slug this step implements (e.g. "send-message").
    fn slug(&self) -> &str;

    async fn run(&self, input: StepInput) -> StepResult;
}

/// Input handed to a step: resolved config, credentials scoped to this
/// invocation, and a read-only view of the run so far.
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    /// Config after template resolution.
    pub config: Fields,
    /// Decrypted credential values; empty when the node has no
    /// integration instance bound.
    pub credentials: HashMap<String, String>,
    /// Trigger payload seeded at run start.
    pub trigger: Fields,
    /// Outputs of nodes completed before this invocation, keyed by title.
    pub outputs: HashMap<String, Fields>,
}

impl StepInput {
    pub fn new(config: Fields) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: HashMap<String, String>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_trigger(mut self, trigger: Fields) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_outputs(mut self, outputs: HashMap<String, Fields>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Config value rendered to text, or None when absent.
    pub fn config_text(&self, key: &str) -> Option<String> {
        self.config.get(key).map(Value::render)
    }

    /// The documented fallback convention: take the config value; if it
    /// is absent or blank after trimming, fall back to the trigger field
    /// of the same name. Returns None only when both are unavailable.
    pub fn text_or_trigger(&self, key: &str) -> Option<String> {
        let configured = self
            .config_text(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        configured.or_else(|| {
            self.trigger
                .get(key)
                .map(Value::render)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
    }
}

/// Outcome of one step call. Every step returns exactly this shape,
/// never an unlabeled value.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Success(Fields),
    Failure(StepFailure),
}

impl StepResult {
    pub fn success() -> Self {
        StepResult::Success(Fields::new())
    }

    pub fn fail(kind: FailureKind, message: impl Into<String>) -> Self {
        StepResult::Failure(StepFailure::new(kind, message))
    }

    /// Add an output field; no-op on a Failure.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let StepResult::Success(fields) = &mut self {
            fields.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success(_))
    }

    /// Wire shape for external collaborators:
    /// `{"success": true, ...fields}` or `{"success": false, "error": "..."}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StepResult::Success(fields) => {
                let mut map = serde_json::Map::new();
                map.insert("success".to_string(), serde_json::Value::Bool(true));
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
            StepResult::Failure(failure) => serde_json::json!({
                "success": false,
                "error": failure.message,
            }),
        }
    }
}

/// A step failure: classified kind plus the literal message shown to the
/// user on the failing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn external_api(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ExternalApi, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Failure classes a node can end with. Expected classes are returned by
/// steps as values; Internal is reserved for the invocation wrapper's
/// panic normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Validation,
    UpstreamFailure,
    CredentialMissing,
    CredentialDecrypt,
    ExternalApi,
    Network,
    Timeout,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Validation => "validation",
            FailureKind::UpstreamFailure => "upstream-failure",
            FailureKind::CredentialMissing => "credential-missing",
            FailureKind::CredentialDecrypt => "credential-decrypt",
            FailureKind::ExternalApi => "external-api",
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Optional connectivity check an integration can offer, run against a
/// credential set when the user saves an integration instance.
#[async_trait]
pub trait ConnectivityTest: Send + Sync {
    async fn test(&self, credentials: &HashMap<String, String>) -> StepResult;
}

/// One integration bundle: the declarative descriptor plus the step
/// implementations for its actions. Plugins are constructed by plain
/// functions and handed to the registry at start-up; there is no
/// self-registering global state.
pub struct Plugin {
    pub descriptor: IntegrationDescriptor,
    pub steps: Vec<Arc<dyn Step>>,
    pub connectivity: Option<Arc<dyn ConnectivityTest>>,
}

impl Plugin {
    pub fn new(descriptor: IntegrationDescriptor) -> Self {
        Self {
            descriptor,
            steps: Vec::new(),
            connectivity: None,
        }
    }

    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_connectivity(mut self, test: Arc<dyn ConnectivityTest>) -> Self {
        self.connectivity = Some(test);
        self
    }
}
