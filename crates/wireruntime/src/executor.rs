use crate::actions::ActionRegistry;
use crate::credentials::CredentialResolver;
use crate::template::resolve_template;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;
use wirecore::{
    CredentialError, EngineError, ErrorPolicy, EventBus, FailureKind, Fields, FlowGraph, FlowNode,
    GraphError, GraphId, NodeKind, NodeRunState, RunContext, RunEvent, RunId, StepFailure,
    StepInput, StepResult,
};

/// Walks a graph in dependency order, materializing each node's live
/// config through the template resolver, fetching credentials on demand,
/// and dispatching steps through the action registry.
///
/// Nodes with no transitive dependency relation run concurrently, up to
/// `max_parallel` in flight at once. All state transitions happen in the
/// scheduler loop; node futures only compute an outcome.
pub struct GraphExecutor {
    max_parallel: usize,
}

/// Outcome of one node future: node id, step result, duration.
type NodeOutcome = (String, StepResult, u64);

impl GraphExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Execute one run of `graph`, seeded with the external trigger
    /// payload. Returns a report with every node's final state; a failed
    /// node surfaces there, not as an `Err` (hard errors are reserved
    /// for invalid graphs and unknown action slugs).
    pub async fn execute(
        &self,
        graph: &FlowGraph,
        actions: &ActionRegistry,
        credentials: &dyn CredentialResolver,
        event_bus: &EventBus,
        trigger: Fields,
    ) -> Result<RunReport, EngineError> {
        graph.validate()?;
        check_acyclic(graph)?;
        // Unknown slugs are a hard registry error before anything runs.
        for node in &graph.nodes {
            if let Some(slug) = &node.action {
                actions.resolve(slug)?;
            }
        }

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        event_bus.emit(RunEvent::RunStarted {
            run_id,
            graph_id: graph.id,
            timestamp: Utc::now(),
        });
        tracing::info!(run_id = %run_id, graph = %graph.name, "starting run");

        let ctx = RunContext::new(trigger);
        let mut states: HashMap<String, NodeRunState> = graph
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeRunState::Pending))
            .collect();
        let mut errors: HashMap<String, StepFailure> = HashMap::new();
        let mut skip_reasons: HashMap<String, String> = HashMap::new();
        let mut durations: HashMap<String, u64> = HashMap::new();

        // Triggers complete immediately: their outputs are the external
        // payload, recorded under their titles. No step, no credentials.
        for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::Trigger) {
            ctx.record(&node.title, ctx.trigger().clone())?;
            states.insert(node.id.clone(), NodeRunState::Success);
            durations.insert(node.id.clone(), 0);
            event_bus.emit(RunEvent::NodeSucceeded {
                run_id,
                node_id: node.id.clone(),
                title: node.title.clone(),
                outputs: ctx.trigger().clone(),
                duration_ms: 0,
                timestamp: Utc::now(),
            });
        }

        let drive = self.drive(
            graph,
            actions,
            credentials,
            &ctx,
            &mut states,
            &mut errors,
            &mut skip_reasons,
            &mut durations,
            event_bus,
            run_id,
        );

        match graph.settings.run_timeout_ms {
            Some(limit) => {
                if timeout(Duration::from_millis(limit), drive).await.is_err() {
                    // In-flight node futures were dropped with the loop.
                    tracing::warn!(run_id = %run_id, limit_ms = limit, "run deadline exceeded");
                    for node in &graph.nodes {
                        match states[&node.id] {
                            NodeRunState::Running => {
                                states.insert(node.id.clone(), NodeRunState::Error);
                                errors.insert(
                                    node.id.clone(),
                                    StepFailure::new(
                                        FailureKind::Timeout,
                                        format!("Run deadline of {}ms exceeded", limit),
                                    ),
                                );
                            }
                            NodeRunState::Pending => {
                                states.insert(node.id.clone(), NodeRunState::Skipped);
                                skip_reasons
                                    .insert(node.id.clone(), "run deadline exceeded".to_string());
                            }
                            _ => {}
                        }
                    }
                }
            }
            None => drive.await?,
        }

        let success = !states.values().any(|s| *s == NodeRunState::Error);
        let duration_ms = start.elapsed().as_millis() as u64;
        event_bus.emit(RunEvent::RunCompleted {
            run_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(run_id = %run_id, success, duration_ms, "run finished");

        let nodes = graph
            .nodes
            .iter()
            .map(|node| NodeReport {
                node_id: node.id.clone(),
                title: node.title.clone(),
                state: states[&node.id],
                error: errors.get(&node.id).cloned(),
                skip_reason: skip_reasons.get(&node.id).cloned(),
                duration_ms: durations.get(&node.id).copied().unwrap_or(0),
            })
            .collect();

        Ok(RunReport {
            run_id,
            graph_id: graph.id,
            success,
            duration_ms,
            nodes,
            outputs: ctx.snapshot(),
        })
    }

    /// Scheduler loop: mark skips, spawn ready nodes, absorb one
    /// completion, repeat until the graph is settled.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        graph: &FlowGraph,
        actions: &ActionRegistry,
        credentials: &dyn CredentialResolver,
        ctx: &RunContext,
        states: &mut HashMap<String, NodeRunState>,
        errors: &mut HashMap<String, StepFailure>,
        skip_reasons: &mut HashMap<String, String>,
        durations: &mut HashMap<String, u64>,
        event_bus: &EventBus,
        run_id: RunId,
    ) -> Result<(), EngineError> {
        let predecessors: HashMap<&str, Vec<&str>> = graph
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), graph.predecessors(&n.id)))
            .collect();
        let node_deadline = graph.settings.node_timeout_ms.map(Duration::from_millis);

        let mut running: FuturesUnordered<BoxFuture<'_, NodeOutcome>> = FuturesUnordered::new();
        let mut halted = false;

        loop {
            // Propagate skips until the frontier is stable, so a skipped
            // node immediately skips its own dependents.
            loop {
                let mut changed = false;
                for node in &graph.nodes {
                    if states[&node.id] != NodeRunState::Pending {
                        continue;
                    }
                    // Condition nodes run regardless of which branch
                    // failed; their purpose is to choose a path. A halt
                    // still skips them: nothing is scheduled after it.
                    let failed_upstream = node.kind != NodeKind::Condition
                        && predecessors[node.id.as_str()].iter().any(|p| {
                            matches!(states[*p], NodeRunState::Error | NodeRunState::Skipped)
                        });
                    let reason = if failed_upstream {
                        FailureKind::UpstreamFailure.to_string()
                    } else if halted {
                        "run aborted after upstream error".to_string()
                    } else {
                        continue;
                    };
                    states.insert(node.id.clone(), NodeRunState::Skipped);
                    skip_reasons.insert(node.id.clone(), reason.clone());
                    event_bus.emit(RunEvent::NodeSkipped {
                        run_id,
                        node_id: node.id.clone(),
                        title: node.title.clone(),
                        reason,
                        timestamp: Utc::now(),
                    });
                    changed = true;
                }
                if !changed {
                    break;
                }
            }

            // Schedule every eligible node up to the parallelism cap.
            if !halted {
                for node in &graph.nodes {
                    if running.len() >= self.max_parallel {
                        break;
                    }
                    if states[&node.id] != NodeRunState::Pending {
                        continue;
                    }
                    let preds = &predecessors[node.id.as_str()];
                    let eligible = match node.kind {
                        // A join blocks until all predecessors settle.
                        NodeKind::Condition => preds.iter().all(|p| {
                            !matches!(states[*p], NodeRunState::Pending | NodeRunState::Running)
                        }),
                        _ => preds.iter().all(|p| states[*p] == NodeRunState::Success),
                    };
                    if !eligible {
                        continue;
                    }

                    states.insert(node.id.clone(), NodeRunState::Running);
                    event_bus.emit(RunEvent::NodeStarted {
                        run_id,
                        node_id: node.id.clone(),
                        title: node.title.clone(),
                        action: node.action.clone(),
                        timestamp: Utc::now(),
                    });
                    running.push(node_future(
                        node.clone(),
                        actions,
                        credentials,
                        ctx,
                        node_deadline,
                    ));
                }
            }

            if running.is_empty() {
                let any_pending = states.values().any(|s| *s == NodeRunState::Pending);
                if !any_pending {
                    break;
                }
                // Acyclic + validated means some pending node always has
                // fully settled predecessors; reaching here is a bug.
                return Err(EngineError::Execution(
                    "scheduler stalled with pending nodes".to_string(),
                ));
            }

            let (node_id, result, duration_ms) =
                running.next().await.expect("non-empty running set");
            let node = graph.find_node(&node_id).expect("node exists");
            durations.insert(node_id.clone(), duration_ms);

            match result {
                StepResult::Success(fields) => {
                    ctx.record(&node.title, fields.clone())?;
                    states.insert(node_id.clone(), NodeRunState::Success);
                    event_bus.emit(RunEvent::NodeSucceeded {
                        run_id,
                        node_id,
                        title: node.title.clone(),
                        outputs: fields,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
                StepResult::Failure(failure) => {
                    states.insert(node_id.clone(), NodeRunState::Error);
                    event_bus.emit(RunEvent::NodeFailed {
                        run_id,
                        node_id: node_id.clone(),
                        title: node.title.clone(),
                        error: failure.message.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    errors.insert(node_id, failure);
                    if graph.settings.on_error == ErrorPolicy::FailRun {
                        halted = true;
                    }
                }
            }
        }

        Ok(())
    }
}

/// The per-node pipeline: merge declared defaults, resolve templates
/// against the current context, fetch credentials, invoke through the
/// registry. Returns an outcome; never touches shared state.
fn node_future<'a>(
    node: FlowNode,
    actions: &'a ActionRegistry,
    credentials: &'a dyn CredentialResolver,
    ctx: &'a RunContext,
    deadline: Option<Duration>,
) -> BoxFuture<'a, NodeOutcome> {
    Box::pin(async move {
        let start = Instant::now();
        let slug = node.action.clone().expect("non-trigger node has an action");

        let descriptor = match actions.resolve(&slug) {
            Ok(d) => d,
            Err(e) => {
                // Guarded against at run start; kept as a failure value
                // so a bug here cannot poison the scheduler.
                let failure = StepResult::fail(FailureKind::Internal, e.to_string());
                return (node.id, failure, start.elapsed().as_millis() as u64);
            }
        };

        let mut raw = node.config.clone();
        for field in &descriptor.config_fields {
            if !raw.contains_key(&field.key) {
                if let Some(default) = &field.default_value {
                    raw.insert(field.key.clone(), default.clone());
                }
            }
        }

        let config: Fields = raw
            .iter()
            .map(|(k, v)| (k.clone(), resolve_template(v, ctx)))
            .collect();

        let credential_map = match &node.integration_id {
            Some(integration_id) => match credentials.fetch(integration_id).await {
                Ok(map) => map,
                Err(e) => {
                    let failure = StepResult::Failure(credential_failure(e));
                    return (node.id, failure, start.elapsed().as_millis() as u64);
                }
            },
            None => HashMap::new(),
        };

        let input = StepInput::new(config)
            .with_credentials(credential_map)
            .with_trigger(ctx.trigger().clone())
            .with_outputs(ctx.snapshot());

        let result = actions
            .invoke(&slug, input, deadline)
            .await
            .unwrap_or_else(|e| StepResult::fail(FailureKind::Internal, e.to_string()));

        (node.id, result, start.elapsed().as_millis() as u64)
    })
}

fn credential_failure(error: CredentialError) -> StepFailure {
    let kind = match &error {
        CredentialError::NotFound(_) => FailureKind::CredentialMissing,
        CredentialError::Decrypt(_) => FailureKind::CredentialDecrypt,
        CredentialError::Store(_) => FailureKind::Internal,
    };
    StepFailure::new(kind, error.to_string())
}

fn check_acyclic(graph: &FlowGraph) -> Result<(), GraphError> {
    let mut dag = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for node in &graph.nodes {
        indices.insert(node.id.as_str(), dag.add_node(node.id.as_str()));
    }
    for edge in &graph.edges {
        dag.add_edge(indices[edge.source.as_str()], indices[edge.target.as_str()], ());
    }
    if toposort(&dag, None).is_err() {
        return Err(GraphError::CyclicDependency);
    }
    Ok(())
}

/// Result of one run: the overall outcome plus every node's final state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub success: bool,
    pub duration_ms: u64,
    pub nodes: Vec<NodeReport>,
    pub outputs: HashMap<String, Fields>,
}

impl RunReport {
    pub fn node(&self, title: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.title == title)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub node_id: String,
    pub title: String,
    pub state: NodeRunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
}
