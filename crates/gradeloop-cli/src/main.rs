use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use gradeloop_core::{
    sse_frame, ChannelSink, OllamaBackend, RunOrchestrator, RunStatus,
};
use gradeloop_types::{ProgressEvent, RunConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gradeloop", about = "Run looped two-model QA evaluations")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	Run(RunArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// JSON file with project, models, testConfig and testCases
	#[arg(long)]
	config: PathBuf,

	/// Base URL of the Ollama-compatible model backend
	#[arg(long, default_value = "http://localhost:11434")]
	backend_url: String,

	/// Root directory holding project/<name>/knowledge and result/<timestamp>
	#[arg(long, default_value = "output")]
	output: PathBuf,

	/// Retries per model call after the first attempt
	#[arg(long, default_value_t = 2)]
	max_retries: u32,

	/// Print raw text/event-stream frames instead of readable progress
	#[arg(long, action = ArgAction::SetTrue)]
	sse: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Run(args) => run(args).await?,
	}
	Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
	let raw = tokio::fs::read_to_string(&args.config)
		.await
		.with_context(|| format!("Failed to read {:?}", args.config))?;
	let config: RunConfig =
		serde_json::from_str(&raw).with_context(|| format!("Invalid config in {:?}", args.config))?;

	let (sink, mut rx) = ChannelSink::new();
	let orchestrator = RunOrchestrator::builder()
		.backend(Arc::new(OllamaBackend::new(&args.backend_url)))
		.sink(Arc::new(sink))
		.output_root(&args.output)
		.max_retries(args.max_retries)
		.build()?;

	// Ctrl-C stands in for the transport abort signal.
	let token = orchestrator.cancel_token();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("interrupt received, cancelling run");
			token.cancel();
		}
	});

	let as_sse = args.sse;
	let printer = tokio::spawn(async move {
		while let Some(event) = rx.recv().await {
			if as_sse {
				print!("{}", sse_frame(&event));
			} else {
				print_event(&event);
			}
		}
	});

	let status = orchestrator.execute(&config).await;
	// Dropping the orchestrator releases the sink so the printer drains out.
	drop(orchestrator);
	printer.await.ok();

	match status {
		RunStatus::Completed => {
			print_summaries(&args.output, config.test_config.loop_count).await?;
			Ok(())
		}
		RunStatus::Cancelled => {
			println!("Run cancelled.");
			Ok(())
		}
		RunStatus::Failed(message) => anyhow::bail!("run failed: {message}"),
	}
}

fn print_event(event: &ProgressEvent) {
	match event {
		ProgressEvent::Log { message } => println!("[log] {message}"),
		ProgressEvent::Update {
			active_task_message,
			progress,
			current_task,
		} => println!("[{progress:>5.1}%] task {current_task}: {active_task_message}"),
		ProgressEvent::StateUpdate(_) => {}
		ProgressEvent::TokenUsage { token_usage } => println!("[tokens] {token_usage}"),
		ProgressEvent::Done { message } => println!("[done] {message}"),
		ProgressEvent::Error { message } => println!("[error] {message}"),
	}
}

/// Locate the newest run directory (names are sortable timestamps) and print
/// one summary table per loop from its persisted snapshots.
async fn print_summaries(output_root: &Path, loop_count: u32) -> Result<()> {
	let result_root = output_root.join("result");
	let mut entries = tokio::fs::read_dir(&result_root)
		.await
		.with_context(|| format!("Failed to read {:?}", result_root))?;
	let mut run_dirs = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		run_dirs.push(entry.path());
	}
	run_dirs.sort();
	let Some(run_dir) = run_dirs.pop() else {
		return Ok(());
	};

	for loop_index in 1..=loop_count {
		let snapshot = run_dir.join(loop_index.to_string()).join("results.json");
		if !snapshot.exists() {
			continue;
		}
		let records = gradeloop_store::read_snapshot(&snapshot).await?;
		println!("\nLoop {loop_index}:");
		println!("{}", gradeloop_types::summary_table(&records));
	}
	Ok(())
}
