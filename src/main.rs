use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use easysong_pipeline::config::{DirArgs, LlmArgs, OutputArgs, ResourceArgs};
use easysong_pipeline::pipeline::{Pipeline, WATCH_INTERVAL};
use easysong_pipeline::progress::{init_tracing, set_log_only};
use easysong_pipeline::resources::{SystemProbe, MAX_RESOURCE_WAIT};
use easysong_pipeline::safety::validate_pipeline_dirs;
use easysong_pipeline::scheduler::ResourceGate;

#[derive(Parser)]
#[command(name = "process-lyrics")]
#[command(about = "Turn pending lyric segment files into annotated song documents")]
struct Args {
    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    resources: ResourceArgs,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Keep running and re-check the input directory every 30 seconds
    #[arg(long)]
    watch: bool,

    /// Process at most this many files
    #[arg(long)]
    limit: Option<usize>,

    /// Skip the memory check for local models
    #[arg(long)]
    skip_resource_check: bool,

    /// Wait up to 30 minutes for memory instead of exiting
    #[arg(long)]
    wait_for_resources: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.output.verbose);
    set_log_only(args.output.log_only);

    let llm = args.llm.validate()?;
    let thresholds = args.resources.thresholds()?;
    let poll_interval = args.resources.poll_interval()?;
    let dirs = args.dirs.resolve();
    validate_pipeline_dirs(&dirs)?;
    dirs.ensure_dirs().await?;

    let mut pipeline = Pipeline::from_config(&llm, dirs)?;
    info!(
        "Using {} backend with model {}",
        pipeline.llm().name(),
        llm.model
    );

    if pipeline.llm().is_local() && !args.skip_resource_check {
        let max_wait = if args.wait_for_resources {
            MAX_RESOURCE_WAIT
        } else {
            Duration::ZERO
        };
        let mut gate = ResourceGate::new(Box::new(SystemProbe::new()), thresholds, poll_interval).with_max_wait(max_wait);
        if let Err(reason) = gate.admit().await {
            bail!("Insufficient resources for a local model: {reason} (use --wait-for-resources or --skip-resource-check)");
        }
    }

    if args.watch {
        if args.limit.is_some() {
            warn!("--limit is ignored in watch mode");
        }
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        pipeline.watch(WATCH_INTERVAL, shutdown).await;
        return Ok(());
    }

    let summary = tokio::select! {
        result = pipeline.run_batch(args.limit) => result.context("Batch failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            return Ok(());
        }
    };

    println!();
    println!("=== SUMMARY ===");
    println!("Pending files:  {}", summary.listed);
    println!("Processed:      {}", summary.succeeded);
    println!("Failed:         {}", summary.failed);
    if summary.deferred() > 0 {
        println!("Left pending:   {}", summary.deferred());
    }
    Ok(())
}
