use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use wirecore::{fields_from_json, Fields, FlowGraph, FlowNode, RunEvent};
use wireruntime::{MemoryCredentials, Runtime, RuntimeConfig};

#[derive(Parser)]
#[command(name = "wire")]
#[command(about = "Wireflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph file against a trigger payload
    Run {
        /// Path to graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger payload as a JSON object
        #[arg(short, long)]
        trigger: Option<String>,

        /// Path to a plaintext credentials JSON file
        /// ({"integrationId": {"fieldId": "secret"}})
        #[arg(short, long)]
        credentials: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a graph file against the action catalog
    Validate {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// List available actions
    Actions,

    /// Create an example graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            trigger,
            credentials,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_graph(file, trigger, credentials).await?;
        }

        Commands::Validate { file } => {
            validate_graph(file)?;
        }

        Commands::Actions => {
            list_actions()?;
        }

        Commands::Init { output } => {
            create_example_graph(output)?;
        }
    }

    Ok(())
}

fn build_runtime(credentials_file: Option<PathBuf>) -> Result<Runtime> {
    let mut credentials = MemoryCredentials::new();
    if let Some(path) = credentials_file {
        let content = std::fs::read_to_string(&path)?;
        let parsed: HashMap<String, HashMap<String, String>> = serde_json::from_str(&content)?;
        for (integration_id, fields) in parsed {
            credentials.insert(integration_id, fields);
        }
    }

    Ok(Runtime::new(
        wireplugins::builtin_plugins(),
        Arc::new(credentials),
        RuntimeConfig::default(),
    )?)
}

async fn run_graph(
    file: PathBuf,
    trigger: Option<String>,
    credentials: Option<PathBuf>,
) -> Result<()> {
    println!("Loading graph from: {}", file.display());

    let graph_json = std::fs::read_to_string(&file)?;
    let graph: FlowGraph = serde_json::from_str(&graph_json)?;

    println!("Graph: {}", graph.name);
    println!("  Nodes: {}", graph.nodes.len());
    println!("  Edges: {}", graph.edges.len());
    println!();

    let trigger: Fields = match trigger {
        Some(raw) => {
            let json: serde_json::Value = serde_json::from_str(&raw)?;
            if !json.is_object() {
                return Err(anyhow::anyhow!("Trigger payload must be a JSON object"));
            }
            fields_from_json(json)
        }
        None => Fields::new(),
    };

    let runtime = build_runtime(credentials)?;

    // Print node lifecycle events as the run progresses
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::RunStarted { .. } => {
                    println!("▶ run started");
                }
                RunEvent::NodeStarted { title, action, .. } => {
                    match action {
                        Some(action) => println!("  ⚡ {} ({})", title, action),
                        None => println!("  ⚡ {}", title),
                    }
                }
                RunEvent::NodeSucceeded {
                    title, duration_ms, ..
                } => {
                    println!("  ✅ {} ({}ms)", title, duration_ms);
                }
                RunEvent::NodeFailed { title, error, .. } => {
                    println!("  ❌ {}: {}", title, error);
                }
                RunEvent::NodeSkipped { title, reason, .. } => {
                    println!("  ⤼ {} skipped: {}", title, reason);
                }
                RunEvent::RunCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ run completed in {}ms", duration_ms);
                    } else {
                        println!("💥 run failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let report = runtime.run(&graph, trigger).await?;

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("Run {}: {}", report.run_id, if report.success { "success" } else { "failed" });
    for node in &report.nodes {
        print!("  {:<20} {:?}", node.title, node.state);
        if let Some(error) = &node.error {
            print!("  {}", error.message);
        }
        println!();
    }

    if !report.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for (title, fields) in &report.outputs {
            if fields.is_empty() {
                continue;
            }
            println!("  {}:", title);
            for (key, value) in fields {
                println!("    {}: {}", key, value.render());
            }
        }
    }

    Ok(())
}

fn validate_graph(file: PathBuf) -> Result<()> {
    println!("Validating graph: {}", file.display());

    let graph_json = std::fs::read_to_string(&file)?;
    let graph: FlowGraph = serde_json::from_str(&graph_json)?;
    graph.validate()?;

    // Check bound slugs against the real catalog too
    let runtime = build_runtime(None)?;
    for node in &graph.nodes {
        if let Some(slug) = &node.action {
            runtime.actions().resolve(slug)?;
        }
    }

    println!("Graph is valid:");
    println!("  Name: {}", graph.name);
    println!("  Nodes: {}", graph.nodes.len());
    println!("  Edges: {}", graph.edges.len());

    Ok(())
}

fn list_actions() -> Result<()> {
    let runtime = build_runtime(None)?;

    println!("Available actions:");
    println!();
    for action in runtime.actions().all() {
        println!("  • {} [{}]", action.slug, action.integration_type);
        if !action.description.is_empty() {
            println!("    {}", action.description);
        }
    }
    Ok(())
}

fn create_example_graph(output: PathBuf) -> Result<()> {
    let mut graph = FlowGraph::new("Buy Signal Pipeline");
    graph.description =
        Some("Extracts a contract address from a Telegram message and trades it".to_string());

    graph.add_node(FlowNode::trigger("trigger", "Telegram"));
    graph.add_node(
        FlowNode::action("extract", "ExtractCA", "extract-ca")
            .with_config("text", "{{Telegram.text}}"),
    );
    graph.add_node(
        FlowNode::action("trade", "TradeToken", "trade-token")
            .with_config("targetTokenMint", "{{ExtractCA.firstAddress}}")
            .with_config("sourceAmountUnits", "0.001")
            .with_config("solanaPrivateKey", "PASTE_PRIVATE_KEY_HERE"),
    );
    graph.add_node(
        FlowNode::action("notify", "Notify", "send-message")
            .with_config(
                "text",
                "Bought! https://solscan.io/tx/{{TradeToken.signature}}",
            )
            .with_integration("telegram-bot"),
    );
    graph.connect("trigger", "extract");
    graph.connect("extract", "trade");
    graph.connect("trade", "notify");

    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(&output, json)?;

    println!("Created example graph: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  wire run --file {} --trigger '{{\"chatId\": 42, \"text\": \"buy <mint> now\"}}'",
        output.display()
    );

    Ok(())
}
