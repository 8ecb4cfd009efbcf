//! Cron-friendly wrapper around the pipeline.
//!
//! One-shot by default; `--daemon` keeps running and starts a batch every
//! `--interval` minutes. Exits 1 when a one-shot run had to be skipped
//! because memory never became available.

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};

use easysong_pipeline::config::{DirArgs, LlmArgs, OutputArgs, ResourceArgs};
use easysong_pipeline::pipeline::Pipeline;
use easysong_pipeline::progress::{init_tracing, set_log_only};
use easysong_pipeline::resources::SystemProbe;
use easysong_pipeline::safety::validate_pipeline_dirs;
use easysong_pipeline::scheduler::{daemon_interval, BatchOutcome, ResourceGate, RunMode, ScheduledRunner};

#[derive(Parser)]
#[command(name = "scheduled-runner")]
#[command(about = "Run the lyrics pipeline once or on a fixed schedule")]
struct Args {
    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    resources: ResourceArgs,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Keep running and start a batch every --interval minutes
    #[arg(long)]
    daemon: bool,

    /// Minutes between batches in daemon mode
    #[arg(long, env = "CHECK_INTERVAL_MINUTES", default_value_t = 60)]
    interval: u64,

    /// Maximum number of songs per batch (unlimited when unset)
    #[arg(long, env = "MAX_SONGS_PER_RUN")]
    max_songs: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.output.verbose);
    set_log_only(args.output.log_only);

    let llm = args.llm.validate()?;
    let thresholds = args.resources.thresholds()?;
    let poll_interval = args.resources.poll_interval()?;
    let Some(interval) = daemon_interval(args.interval) else {
        bail!("CHECK_INTERVAL_MINUTES must be between 1 and {}", u64::MAX / 60);
    };
    if args.max_songs == Some(0) {
        bail!("MAX_SONGS_PER_RUN must be greater than zero");
    }
    let dirs = args.dirs.resolve();
    validate_pipeline_dirs(&dirs)?;
    dirs.ensure_dirs().await?;

    let pipeline = Pipeline::from_config(&llm, dirs)?;
    info!(
        "Using {} backend with model {}, max {} songs per run",
        pipeline.llm().name(),
        llm.model,
        args.max_songs.map(|n| n.to_string()).unwrap_or_else(|| "unlimited".into())
    );

    let gate = ResourceGate::new(Box::new(SystemProbe::new()), thresholds, poll_interval);
    let mut runner = ScheduledRunner::new(pipeline, gate, args.max_songs);

    let mode = if args.daemon {
        RunMode::Daemon { interval }
    } else {
        RunMode::Once
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match runner.run(mode, shutdown).await? {
        Some(BatchOutcome::Skipped { reason }) => bail!("Batch skipped, resources insufficient: {}", reason),
        Some(BatchOutcome::Completed(summary)) => {
            info!(
                "Run complete: {} processed, {} failed, {} left pending",
                summary.succeeded,
                summary.failed,
                summary.deferred()
            );
        }
        None => {}
    }
    Ok(())
}
