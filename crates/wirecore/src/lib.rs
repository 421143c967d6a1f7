//! Core abstractions for the wireflow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the dynamic value type, integration/action
//! descriptors, the graph model, the step contract, the per-run execution
//! context, and execution events. It performs no network I/O.

mod context;
mod descriptor;
mod error;
mod events;
mod graph;
mod step;
mod value;

pub use context::RunContext;
pub use descriptor::{
    ActionDescriptor, ConfigField, CredentialField, InputKind, IntegrationDescriptor, OutputField,
    SYSTEM_INTEGRATION,
};
pub use error::{CredentialError, EngineError, GraphError, RegistryError};
pub use events::{EventBus, RunEvent, RunId};
pub use graph::{
    Edge, ErrorPolicy, FlowGraph, FlowNode, GraphId, NodeKind, NodeRunState, RunSettings,
};
pub use step::{ConnectivityTest, FailureKind, Plugin, Step, StepFailure, StepInput, StepResult};
pub use value::{fields_from_json, Fields, Value};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
