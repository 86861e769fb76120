//! Scribe CLI - generate project documentation from local sources.
//!
//! Provides a `scribe` command that profiles a project directory, plans a
//! section layout, and drives the orchestration engine with built-in offline
//! writers and reviewers to produce a README.

mod builtins;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use scribe_models::Plan;
use scribe_orchestrator::capabilities::{SectionReviewer, WriterRouter};
use scribe_orchestrator::config::EngineConfig;
use scribe_orchestrator::engine::Orchestrator;
use scribe_orchestrator::events::RunEvent;
use scribe_orchestrator::policy::RuleBasedPolicy;

use builtins::{
    DefaultPlanner, HeadingReviewer, LengthReviewer, ManifestProfiler, MetaWriter,
    TemplateWriter, META_SECTIONS,
};

/// Scribe - multi-section document generation
#[derive(Parser, Debug)]
#[command(
    name = "scribe",
    author,
    version,
    about = "Generate project documentation through an orchestrated section pipeline"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a README for a project directory
    ///
    /// Profiles the directory's package manifest, plans the sections, writes
    /// and reviews them concurrently, and assembles the result in plan order.
    Generate(GenerateArgs),
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    /// Project directory to document
    path: PathBuf,

    /// Subject name (defaults to the directory name)
    #[arg(long)]
    name: Option<String>,

    /// Output file (defaults to README.md inside the project directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON plan file to use instead of the built-in planner
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Print the full run report as JSON instead of writing the artifact
    #[arg(long)]
    json: bool,

    /// Stream run events to stderr as JSON lines
    #[arg(long)]
    events: bool,

    /// Cap on concurrently running section tasks
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Cap on decision-loop turns before the run is forced to finish
    #[arg(long)]
    max_turns: Option<u32>,

    /// Review rejections allowed per section before forced acceptance
    #[arg(long)]
    retry_budget: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Generate(generate_args) => generate(generate_args).await,
    }
}

async fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let subject = match args.name {
        Some(name) => name,
        None => args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };
    let source = args.path.to_string_lossy().into_owned();

    let initial_plan: Option<Plan> = match args.plan {
        Some(plan_path) => {
            let text = std::fs::read_to_string(&plan_path)
                .with_context(|| format!("reading plan file {}", plan_path.display()))?;
            Some(serde_json::from_str(&text).context("parsing plan file")?)
        }
        None => None,
    };

    let mut config = EngineConfig::default();
    config.dispatch.max_parallel = args.max_parallel.or(config.dispatch.max_parallel);
    if let Some(max_turns) = args.max_turns {
        config.hard_cap = max_turns;
    }
    if let Some(retry_budget) = args.retry_budget {
        config.retry_budget = retry_budget;
    }

    let writers = WriterRouter::new(Arc::new(TemplateWriter))
        .with_rule(META_SECTIONS, Arc::new(MetaWriter));
    let reviewers: Vec<Arc<dyn SectionReviewer>> =
        vec![Arc::new(HeadingReviewer), Arc::new(LengthReviewer)];
    let mut orchestrator = Orchestrator::new(
        Arc::new(RuleBasedPolicy),
        Arc::new(ManifestProfiler),
        Arc::new(DefaultPlanner),
        writers,
        reviewers,
        config,
    );

    let listener = if args.events {
        let (tx, mut rx) = broadcast::channel::<RunEvent>(256);
        orchestrator.set_event_sender(Some(tx));
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Ok(line) = serde_json::to_string(&event) {
                            eprintln!("{line}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    } else {
        None
    };

    let result = orchestrator.run(&subject, &source, initial_plan).await;
    // Dropping the engine closes the event channel so the listener can drain.
    drop(orchestrator);
    if let Some(listener) = listener {
        let _ = listener.await;
    }

    let report = result.context("run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let output_path = args.output.unwrap_or_else(|| args.path.join("README.md"));
    std::fs::write(&output_path, format!("{}\n", report.artifact))
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!(
        "Wrote {} ({} sections, {} turns, {})",
        output_path.display(),
        report.sections.len(),
        report.iterations,
        report.finish_reason
    );
    Ok(())
}
