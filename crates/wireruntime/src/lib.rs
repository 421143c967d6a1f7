//! Workflow execution runtime
//!
//! This crate provides the registries, template-based data binding,
//! credential resolution, and the DAG executor that runs a graph of
//! heterogeneous integration steps with per-node failure isolation.

mod actions;
mod credentials;
mod executor;
mod invoke;
mod plugins;
mod runtime;
mod template;

pub use actions::ActionRegistry;
pub use credentials::{CredentialResolver, EncryptedCredentialStore, MemoryCredentials};
pub use executor::{GraphExecutor, NodeReport, RunReport};
pub use invoke::invoke_step;
pub use plugins::PluginRegistry;
pub use runtime::{Runtime, RuntimeConfig};
pub use template::{resolve_template, tokenize, Segment};
