use crate::{ActionRegistry, CredentialResolver, GraphExecutor, PluginRegistry, RunReport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wirecore::{EngineError, EventBus, Fields, FlowGraph, GraphId, GraphError, Plugin, RunEvent};

/// Main entry point: owns the registries, credential resolver, event bus
/// and executor, and runs graphs against them.
///
/// Registries are built once from the injected plugin list and read-only
/// thereafter; any number of runs may proceed concurrently against them.
pub struct Runtime {
    plugins: PluginRegistry,
    actions: ActionRegistry,
    credentials: Arc<dyn CredentialResolver>,
    executor: GraphExecutor,
    event_bus: EventBus,
    graphs: RwLock<HashMap<GraphId, FlowGraph>>,
}

impl Runtime {
    pub fn new(
        plugin_list: Vec<Plugin>,
        credentials: Arc<dyn CredentialResolver>,
        config: RuntimeConfig,
    ) -> Result<Self, EngineError> {
        let plugins = PluginRegistry::from_plugins(&plugin_list)?;
        let actions = ActionRegistry::from_plugins(&plugin_list)?;
        Ok(Self {
            plugins,
            actions,
            credentials,
            executor: GraphExecutor::new(config.max_parallel_nodes),
            event_bus: EventBus::new(config.event_buffer_size),
            graphs: RwLock::new(HashMap::new()),
        })
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialResolver> {
        &self.credentials
    }

    /// Register a graph for later execution by id. The graph is
    /// validated up front so authoring errors surface before any run.
    pub async fn register_graph(&self, graph: FlowGraph) -> Result<GraphId, EngineError> {
        graph.validate()?;
        let id = graph.id;
        self.graphs.write().await.insert(id, graph);
        Ok(id)
    }

    pub async fn graph(&self, id: GraphId) -> Option<FlowGraph> {
        self.graphs.read().await.get(&id).cloned()
    }

    pub async fn list_graphs(&self) -> Vec<FlowGraph> {
        self.graphs.read().await.values().cloned().collect()
    }

    pub async fn remove_graph(&self, id: GraphId) -> bool {
        self.graphs.write().await.remove(&id).is_some()
    }

    /// Execute a graph directly (without registration).
    pub async fn run(&self, graph: &FlowGraph, trigger: Fields) -> Result<RunReport, EngineError> {
        self.executor
            .execute(
                graph,
                &self.actions,
                self.credentials.as_ref(),
                &self.event_bus,
                trigger,
            )
            .await
    }

    /// Execute a previously registered graph.
    pub async fn run_registered(
        &self,
        id: GraphId,
        trigger: Fields,
    ) -> Result<RunReport, EngineError> {
        let graph = self
            .graph(id)
            .await
            .ok_or_else(|| EngineError::Graph(GraphError::NotFound(id.to_string())))?;
        self.run(&graph, trigger).await
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }
}

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
        }
    }
}
