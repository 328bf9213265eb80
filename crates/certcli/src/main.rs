// crates/certcli/src/main.rs

use anyhow::{Context, Result};
use certcore::{
    catalog, create_node, validate, GraphError, GraphStore, NodeId, NodeOptions, Violation,
    WorkflowGraph,
};
use certrun::{DispatchError, DispatcherConfig, RunEvent, RunSession, WorkflowDispatcher};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "certflow")]
#[command(about = "Certificate workflow CLI", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the node types a workflow can use
    Catalog,

    /// Create an example workflow file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Print a workflow as Graphviz
    Dot {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Insert a node after an existing one
    Add {
        #[arg(short, long)]
        file: PathBuf,

        /// Id of the node to insert after
        #[arg(long)]
        after: NodeId,

        /// Node type, e.g. apply, deploy, notify, branch
        #[arg(long = "type")]
        node_type: String,

        /// Provider sub-type for apply and deploy nodes
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Insert a branch after an existing node
    Branch {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        after: NodeId,

        #[arg(long, default_value_t = 2)]
        chains: usize,

        /// Chain that receives the nodes that used to follow the anchor.
        /// Without it those nodes are dropped.
        #[arg(long)]
        reattach: Option<usize>,
    },

    /// Remove a node and everything it contains
    Remove {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        node: NodeId,
    },

    /// Trigger a run of a workflow stored on the server
    Run {
        /// Workflow id on the server
        #[arg(long)]
        id: String,

        /// Local copy of the workflow, validated before the run is sent
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long, env = "CERTFLOW_SERVER", default_value = "http://127.0.0.1:8090")]
        server: String,

        #[arg(long, env = "CERTFLOW_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Catalog => list_catalog(),
        Commands::Init { output } => create_example_workflow(output)?,
        Commands::Validate { file } => validate_workflow(&file)?,
        Commands::Dot { file } => println!("{}", load_graph(&file)?.to_dot()),
        Commands::Add {
            file,
            after,
            node_type,
            provider,
            name,
        } => {
            let mut options = NodeOptions::new();
            options.provider_type = provider;
            options.name = name;
            let node = create_node(&node_type, options)?;
            let id = node.id();
            edit_workflow(&file, |g| g.insert_after(after, node))?;
            println!("✅ Added {} node {}", node_type, id);
        }
        Commands::Branch {
            file,
            after,
            chains,
            reattach,
        } => {
            let mut report = None;
            edit_workflow(&file, |g| {
                let (graph, outcome) = branch_after(g, after, chains, reattach)?;
                report = Some(outcome);
                Ok(graph)
            })?;
            if let Some(report) = report {
                println!("✅ Added branch {}", report.branch_id);
                if report.dropped > 0 {
                    println!(
                        "⚠️  Dropped {} node(s) that followed the anchor",
                        report.dropped
                    );
                }
            }
        }
        Commands::Remove { file, node } => {
            edit_workflow(&file, |g| g.remove_node(node))?;
            println!("✅ Removed node {}", node);
        }
        Commands::Run {
            id,
            file,
            server,
            token,
        } => {
            let mut config = DispatcherConfig::new(server);
            config.auth_token = token;
            run_workflow(config, id, file).await?;
        }
    }

    Ok(())
}

fn load_graph(file: &Path) -> Result<WorkflowGraph> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(WorkflowGraph::from_json(&json)?)
}

fn save_graph(file: &Path, graph: &WorkflowGraph) -> Result<()> {
    std::fs::write(file, graph.to_json()?)
        .with_context(|| format!("Failed to write {}", file.display()))
}

fn print_violations(violations: &[Violation]) {
    for violation in violations {
        println!("   ❌ {}", violation);
    }
}

/// What a branch insertion did, reported once it has been saved
#[derive(Debug, PartialEq)]
struct BranchReport {
    branch_id: NodeId,
    dropped: usize,
}

/// Insert a branch after `after`, moving the old continuation into chain
/// `reattach` when given and dropping it otherwise
fn branch_after(
    graph: &WorkflowGraph,
    after: NodeId,
    chains: usize,
    reattach: Option<usize>,
) -> Result<(WorkflowGraph, BranchReport), GraphError> {
    let insertion = graph.insert_branch_after(after, chains)?;
    let branch_id = insertion.branch_id;

    match (insertion.detached, reattach) {
        (Some(detached), Some(index)) => {
            let head = insertion
                .graph
                .find(branch_id)
                .and_then(|b| b.branches().get(index))
                .map(|h| h.id())
                .ok_or(GraphError::ChainIndexOutOfRange { branch_id, index })?;
            let graph = insertion.graph.insert_after(head, detached)?;
            Ok((graph, BranchReport { branch_id, dropped: 0 }))
        }
        (Some(detached), None) => {
            let dropped = detached.iter().count();
            Ok((insertion.graph, BranchReport { branch_id, dropped }))
        }
        (None, _) => Ok((insertion.graph, BranchReport { branch_id, dropped: 0 })),
    }
}

/// Load a workflow into the process store, apply one edit and write it back
fn edit_workflow<F>(file: &Path, op: F) -> Result<()>
where
    F: FnOnce(&WorkflowGraph) -> Result<WorkflowGraph, GraphError>,
{
    let store = GraphStore::global();
    store.reset(load_graph(file)?);
    tracing::debug!(
        "Loaded {} node(s) from {}",
        store.select(|s| s.graph.node_count()),
        file.display()
    );
    store.apply(op)?;

    if store.is_dirty() {
        save_graph(file, &store.get_tree())?;
        store.mark_clean();
    }

    let violations = store.select(|s| validate(&s.graph));
    if !violations.is_empty() {
        println!("⚠️  Workflow now has {} violation(s):", violations.len());
        print_violations(&violations);
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let graph = load_graph(file)?;
    let violations = validate(&graph);
    if !violations.is_empty() {
        print_violations(&violations);
        return Err(certcore::Error::Invalid(violations).into());
    }

    println!("✅ Workflow is valid:");
    println!("   Nodes: {}", graph.node_count());
    Ok(())
}

fn list_catalog() {
    println!("📦 Available Node Types:");
    println!();

    for entry in catalog() {
        println!("  • {} ({})", entry.name, entry.kind);
        for provider in &entry.children {
            println!("      - {} ({})", provider.name, provider.key);
        }
    }
}

async fn run_workflow(config: DispatcherConfig, id: String, file: Option<PathBuf>) -> Result<()> {
    let dispatcher = WorkflowDispatcher::http(config);
    let mut events = dispatcher.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::Submitted { workflow_id, .. } => {
                    println!("▶️  Submitted run for {}", workflow_id)
                }
                RunEvent::Accepted { workflow_id, .. } => {
                    println!("✨ Run accepted for {}", workflow_id)
                }
                RunEvent::Rejected { code, .. } => println!("💥 Run rejected with code {}", code),
                RunEvent::Failed { error, .. } => println!("❌ Run request failed: {}", error),
            }
        }
    });

    let mut session = RunSession::new(id);
    let outcome = match file {
        Some(file) => {
            let graph = load_graph(&file)?;
            session.submit_validated(&dispatcher, &graph).await
        }
        None => session.submit(&dispatcher).await,
    };

    drop(dispatcher);
    let _ = event_task.await;

    match outcome {
        Ok(ack) => {
            if !ack.payload.is_empty() {
                println!("📤 {}", serde_json::Value::Object(ack.payload));
            }
            Ok(())
        }
        Err(DispatchError::InvalidWorkflow(violations)) => {
            println!("🚫 Not submitted, the workflow is invalid:");
            print_violations(&violations);
            Err(DispatchError::InvalidWorkflow(violations).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let graph = WorkflowGraph::new();
    let start = graph.root().id();

    let mut config = certcore::NodeConfig::new();
    config.insert("domain".to_string(), json!("example.com"));
    config.insert("email".to_string(), json!("admin@example.com"));
    let apply = create_node(
        "apply",
        NodeOptions::new()
            .with_provider("aws-route53")
            .with_name("Issue certificate")
            .with_config(config),
    )?;
    let apply_id = apply.id();
    let graph = graph.insert_after(start, apply)?;

    let insertion = graph.insert_branch_after(apply_id, 2)?;
    let branch = insertion.branch_id;
    let mut graph = insertion.graph;
    graph = graph.insert_after(branch, create_node("notify", NodeOptions::new())?)?;

    let heads: Vec<NodeId> = graph
        .find(branch)
        .map(|b| b.branches().iter().map(|h| h.id()).collect())
        .unwrap_or_default();
    let targets = ["aliyun-cas-deploy", "ssh"];
    for (head, target) in heads.iter().zip(targets) {
        let deploy = create_node("deploy", NodeOptions::new().with_provider(target))?;
        graph = graph.insert_after(*head, deploy)?;
    }

    save_graph(&output, &graph)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Inspect it with:");
    println!("  certflow dot {}", output.display());
    Ok(())
}
