use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Registry construction and lookup errors. Hard errors at start-up or
/// dispatch time, never part of a step's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Integration type already registered: {0}")]
    DuplicateType(String),

    #[error("Action slug already registered: {0}")]
    DuplicateSlug(String),

    #[error("Unknown action slug: {0}")]
    ActionNotFound(String),

    #[error("Action '{slug}' declared by plugin '{plugin}' has no step implementation")]
    MissingStep { plugin: String, slug: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph not found: {0}")]
    NotFound(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Duplicate node title: {0}")]
    DuplicateTitle(String),

    #[error("Edge references unknown node: {0}")]
    DanglingEdge(String),

    #[error("Trigger node '{0}' must not bind an action")]
    TriggerWithAction(String),

    #[error("Node '{0}' has no bound action")]
    MissingAction(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No credentials found for integration: {0}")]
    NotFound(String),

    #[error("Failed to decrypt credentials for integration: {0}")]
    Decrypt(String),

    #[error("Credential store error: {0}")]
    Store(String),
}
