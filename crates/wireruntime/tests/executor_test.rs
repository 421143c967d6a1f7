//! Executor state-machine tests against stub steps.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wirecore::{
    ActionDescriptor, ConfigField, ErrorPolicy, EventBus, FailureKind, Fields, FlowGraph,
    FlowNode, GraphError, InputKind, IntegrationDescriptor, NodeRunState, Plugin, Step,
    StepFailure, StepInput, StepResult, Value,
};
use wireruntime::{ActionRegistry, GraphExecutor, MemoryCredentials};

/// Stub step with a call counter and a scripted outcome.
struct StubStep {
    slug: String,
    calls: Arc<AtomicUsize>,
    outcome: Outcome,
}

#[derive(Clone)]
enum Outcome {
    /// Succeed, echoing the resolved config as outputs.
    EchoConfig,
    Fail(FailureKind, &'static str),
    SleepMs(u64),
}

#[async_trait]
impl Step for StubStep {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn run(&self, input: StepInput) -> StepResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::EchoConfig => StepResult::Success(input.config),
            Outcome::Fail(kind, message) => {
                StepResult::Failure(StepFailure::new(*kind, *message))
            }
            Outcome::SleepMs(ms) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                StepResult::Success(input.config)
            }
        }
    }
}

struct Harness {
    registry: ActionRegistry,
    counters: std::collections::HashMap<String, Arc<AtomicUsize>>,
}

impl Harness {
    fn new(steps: Vec<(&str, Outcome)>) -> Self {
        let mut counters = std::collections::HashMap::new();
        let mut descriptor = IntegrationDescriptor::new("stub", "Stub", "test integration");
        let mut plugin_steps: Vec<Arc<dyn Step>> = Vec::new();
        for (slug, outcome) in steps {
            let calls = Arc::new(AtomicUsize::new(0));
            counters.insert(slug.to_string(), calls.clone());
            descriptor = descriptor.with_action(
                ActionDescriptor::new(slug, "stub", slug).with_config_field(ConfigField::new(
                    "value",
                    "Value",
                    InputKind::TemplateInput,
                )),
            );
            plugin_steps.push(Arc::new(StubStep {
                slug: slug.to_string(),
                calls,
                outcome,
            }));
        }
        let mut plugin = Plugin::new(descriptor);
        for step in plugin_steps {
            plugin = plugin.with_step(step);
        }
        Self {
            registry: ActionRegistry::from_plugins(&[plugin]).unwrap(),
            counters,
        }
    }

    fn calls(&self, slug: &str) -> usize {
        self.counters[slug].load(Ordering::SeqCst)
    }
}

fn trigger_fields(text: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("text".to_string(), Value::String(text.to_string()));
    fields
}

#[tokio::test]
async fn failed_predecessor_skips_dependent_without_invoking() {
    let harness = Harness::new(vec![
        ("step-a", Outcome::Fail(FailureKind::ExternalApi, "provider down")),
        ("step-b", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("skip test");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("a", "A", "step-a"));
    graph.add_node(FlowNode::action("b", "B", "step-b"));
    graph.connect("t", "a");
    graph.connect("a", "b");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            trigger_fields("hi"),
        )
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.node("A").unwrap().state, NodeRunState::Error);
    assert_eq!(
        report.node("A").unwrap().error.as_ref().unwrap().message,
        "provider down"
    );
    assert_eq!(report.node("B").unwrap().state, NodeRunState::Skipped);
    assert_eq!(
        report.node("B").unwrap().skip_reason.as_deref(),
        Some("upstream-failure")
    );
    assert_eq!(harness.calls("step-b"), 0);
}

#[tokio::test]
async fn condition_runs_even_after_upstream_failure() {
    let harness = Harness::new(vec![
        ("step-a", Outcome::Fail(FailureKind::Network, "unreachable")),
        ("check", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("condition test");
    graph.settings.on_error = ErrorPolicy::IsolateBranch;
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("a", "A", "step-a"));
    graph.add_node(FlowNode::condition("c", "Check", "check"));
    graph.connect("t", "a");
    graph.connect("a", "c");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            trigger_fields("hi"),
        )
        .await
        .unwrap();

    assert_eq!(report.node("Check").unwrap().state, NodeRunState::Success);
    assert_eq!(harness.calls("check"), 1);
}

#[tokio::test]
async fn template_binding_flows_between_nodes() {
    let harness = Harness::new(vec![
        ("produce", Outcome::EchoConfig),
        ("consume", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("binding test");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("p", "Produce", "produce").with_config("value", "{{Trigger.text}}"));
    graph.add_node(FlowNode::action("c", "Consume", "consume").with_config("value", "got {{Produce.value}}"));
    graph.connect("t", "p");
    graph.connect("p", "c");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            trigger_fields("payload"),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(
        report.outputs["Consume"]["value"],
        Value::String("got payload".to_string())
    );
}

#[tokio::test]
async fn join_waits_for_all_predecessors() {
    let harness = Harness::new(vec![
        ("fast", Outcome::EchoConfig),
        ("slow", Outcome::SleepMs(50)),
        ("join", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("join test");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("f", "Fast", "fast").with_config("value", "1"));
    graph.add_node(FlowNode::action("s", "Slow", "slow").with_config("value", "2"));
    graph.add_node(
        FlowNode::action("j", "Join", "join")
            .with_config("value", "{{Fast.value}}+{{Slow.value}}"),
    );
    graph.connect("t", "f");
    graph.connect("t", "s");
    graph.connect("f", "j");
    graph.connect("s", "j");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await
        .unwrap();

    assert!(report.success);
    // Both sibling outputs were available when the join resolved.
    assert_eq!(
        report.outputs["Join"]["value"],
        Value::String("1+2".to_string())
    );
}

#[tokio::test]
async fn fail_run_policy_skips_unrelated_pending_nodes() {
    let harness = Harness::new(vec![
        ("boom", Outcome::Fail(FailureKind::ExternalApi, "no")),
        ("slow", Outcome::SleepMs(50)),
        ("after", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("fail-run test");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("b", "Boom", "boom"));
    graph.add_node(FlowNode::action("s", "Slow", "slow"));
    graph.add_node(FlowNode::action("x", "After", "after"));
    graph.connect("t", "b");
    graph.connect("t", "s");
    graph.connect("s", "x");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await
        .unwrap();

    assert!(!report.success);
    // In-flight sibling finishes; its dependent is never scheduled.
    assert_eq!(report.node("Slow").unwrap().state, NodeRunState::Success);
    assert_eq!(report.node("After").unwrap().state, NodeRunState::Skipped);
    assert_eq!(harness.calls("after"), 0);
}

#[tokio::test]
async fn isolate_branch_policy_lets_siblings_finish() {
    let harness = Harness::new(vec![
        ("boom", Outcome::Fail(FailureKind::ExternalApi, "no")),
        ("slow", Outcome::SleepMs(20)),
        ("after", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("isolate test");
    graph.settings.on_error = ErrorPolicy::IsolateBranch;
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("b", "Boom", "boom"));
    graph.add_node(FlowNode::action("s", "Slow", "slow"));
    graph.add_node(FlowNode::action("x", "After", "after"));
    graph.connect("t", "b");
    graph.connect("t", "s");
    graph.connect("s", "x");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await
        .unwrap();

    // Overall outcome still reflects the error, but the healthy branch ran.
    assert!(!report.success);
    assert_eq!(report.node("After").unwrap().state, NodeRunState::Success);
    assert_eq!(harness.calls("after"), 1);
}

#[tokio::test]
async fn node_deadline_marks_error_and_skips_downstream() {
    let harness = Harness::new(vec![
        ("slow", Outcome::SleepMs(5_000)),
        ("after", Outcome::EchoConfig),
    ]);

    let mut graph = FlowGraph::new("deadline test");
    graph.settings.node_timeout_ms = Some(50);
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("s", "Slow", "slow"));
    graph.add_node(FlowNode::action("x", "After", "after"));
    graph.connect("t", "s");
    graph.connect("s", "x");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await
        .unwrap();

    let slow = report.node("Slow").unwrap();
    assert_eq!(slow.state, NodeRunState::Error);
    assert_eq!(slow.error.as_ref().unwrap().kind, FailureKind::Timeout);
    assert_eq!(report.node("After").unwrap().state, NodeRunState::Skipped);
    assert_eq!(harness.calls("after"), 0);
}

#[tokio::test]
async fn missing_credentials_fail_node_without_invoking_step() {
    let harness = Harness::new(vec![("needs-creds", Outcome::EchoConfig)]);

    let mut graph = FlowGraph::new("credential test");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(
        FlowNode::action("n", "Needy", "needs-creds").with_integration("missing-integration"),
    );
    graph.connect("t", "n");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await
        .unwrap();

    let node = report.node("Needy").unwrap();
    assert_eq!(node.state, NodeRunState::Error);
    assert_eq!(
        node.error.as_ref().unwrap().kind,
        FailureKind::CredentialMissing
    );
    assert_eq!(harness.calls("needs-creds"), 0);
}

#[tokio::test]
async fn unknown_slug_is_hard_error_before_anything_runs() {
    let harness = Harness::new(vec![("known", Outcome::EchoConfig)]);

    let mut graph = FlowGraph::new("unknown slug");
    graph.add_node(FlowNode::trigger("t", "Trigger"));
    graph.add_node(FlowNode::action("a", "A", "known"));
    graph.add_node(FlowNode::action("b", "B", "unknown-slug"));
    graph.connect("t", "a");
    graph.connect("a", "b");

    let executor = GraphExecutor::new(4);
    let result = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(harness.calls("known"), 0);
}

#[tokio::test]
async fn cyclic_graph_is_rejected() {
    let harness = Harness::new(vec![("step", Outcome::EchoConfig)]);

    let mut graph = FlowGraph::new("cycle");
    graph.add_node(FlowNode::action("a", "A", "step"));
    graph.add_node(FlowNode::action("b", "B", "step"));
    graph.connect("a", "b");
    graph.connect("b", "a");

    let executor = GraphExecutor::new(4);
    let result = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            Fields::new(),
        )
        .await;

    match result {
        Err(wirecore::EngineError::Graph(GraphError::CyclicDependency)) => {}
        other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn trigger_outputs_are_recorded_under_title() {
    let harness = Harness::new(vec![("echo", Outcome::EchoConfig)]);

    let mut graph = FlowGraph::new("trigger outputs");
    graph.add_node(FlowNode::trigger("t", "Telegram"));
    graph.add_node(FlowNode::action("e", "Echo", "echo").with_config("value", "{{Telegram.text}}"));
    graph.connect("t", "e");

    let executor = GraphExecutor::new(4);
    let report = executor
        .execute(
            &graph,
            &harness.registry,
            &MemoryCredentials::new(),
            &EventBus::default(),
            trigger_fields("from the webhook"),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(
        report.outputs["Echo"]["value"],
        Value::String("from the webhook".to_string())
    );
}
