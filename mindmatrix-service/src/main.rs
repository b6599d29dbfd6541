//! MindMatrix command-line host
//!
//! Loads configuration, registers built-in and compiled-in plugins, and
//! drives agents or workflows, printing frames as they arrive.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use mindmatrix_service::{relay, DemoPlugin, HandlerKind, MindMatrix};
use mm_core::config::load_environment;
use mm_core::MindMatrixConfig;
use mm_workflows::WorkflowInfo;

#[derive(Parser, Debug)]
#[command(name = "mindmatrix")]
#[command(about = "Run pluggable agents and workflows")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Load compiled-in plugins regardless of configuration
    #[arg(long, global = true)]
    enable_plugins: bool,

    /// Print only the final answer
    #[arg(long, global = true)]
    batch: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List registered agents and workflows
    List,
    /// Run a workflow
    Run {
        /// Workflow name (defaults to service.default_workflow)
        #[arg(short, long)]
        workflow: Option<String>,
        /// Workflow input
        #[arg(short, long)]
        input: String,
    },
    /// Run a single agent
    Agent {
        #[arg(short, long)]
        agent: String,
        #[arg(short, long)]
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/mindmatrix/environment (if exists)
    load_environment();

    // Initialize tracing; stdout carries frames
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mindmatrix_service=info".parse()?)
                .add_directive("mm_workflows=info".parse()?)
                .add_directive("mm_plugins=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MindMatrixConfig::load(path)?,
        None => MindMatrixConfig::load_default()?,
    };
    if args.enable_plugins {
        config.plugins.enable_plugins = true;
    }

    let mm = MindMatrix::new(config).with_plugin(Arc::new(DemoPlugin::new()));
    mm.start()?;

    match args.command {
        Commands::List => {
            println!("agents:");
            for name in mm.registry().agent_names() {
                println!("  {}", name);
            }
            println!("workflows:");
            for name in mm.registry().workflow_names() {
                match mm.registry().build_workflow(&name) {
                    Ok(workflow) => print_workflow(&workflow.info()),
                    Err(e) => println!("  {} (unavailable: {})", name, e),
                }
            }
            Ok(())
        }
        Commands::Run { workflow, input } => {
            let name = match workflow.or_else(|| mm.config().service.default_workflow.clone()) {
                Some(name) => name,
                None => bail!("no workflow given and service.default_workflow is unset"),
            };
            drive(&mm, HandlerKind::Workflow, &name, input, args.batch).await
        }
        Commands::Agent { agent, input } => {
            drive(&mm, HandlerKind::Agent, &agent, input, args.batch).await
        }
    }
}

fn print_workflow(info: &WorkflowInfo) {
    if info.description.is_empty() {
        println!("  {}", info.name);
    } else {
        println!("  {} - {}", info.name, info.description);
    }
    for (index, step) in info.steps.iter().enumerate() {
        println!("    {}. {} [{}] {}", index + 1, step.name, step.kind, step.description);
    }
}

async fn drive(
    mm: &MindMatrix,
    kind: HandlerKind,
    name: &str,
    input: String,
    batch: bool,
) -> Result<()> {
    let handle = match mm.run(kind, name, input) {
        Ok(handle) => handle,
        Err(e) if e.is_configuration() => bail!("{} '{}' is misconfigured: {}", kind, name, e),
        Err(e) => return Err(e.into()),
    };
    info!(run_id = %handle.run_id(), "Driving run");

    let outcome = if batch {
        let outcome = handle.wait().await;
        println!("{}", outcome.content_text());
        outcome
    } else {
        let (tx, mut rx) = mpsc::channel(32);
        let relay_task = tokio::spawn(relay(handle, tx));
        while let Some(frame) = rx.recv().await {
            print!("{}", frame.to_sse());
        }
        relay_task.await?
    };

    if !outcome.is_success() {
        match outcome.error {
            Some(failure) => bail!("run failed ({}): {}", failure.kind, failure.message),
            None => bail!("run failed"),
        }
    }
    Ok(())
}
