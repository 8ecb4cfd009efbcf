//! Analyze a single song by video id or URL.
//!
//! A pending file goes through the normal lifecycle. A song that was already
//! processed is regenerated from its archived segments; the input stays where
//! it is and the stats are left alone.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use easysong_pipeline::config::{DirArgs, LlmArgs, OutputArgs, ResourceArgs};
use easysong_pipeline::metadata::extract_video_id;
use easysong_pipeline::pipeline::{read_segments, FinalStatus, Pipeline};
use easysong_pipeline::progress::{init_tracing, set_log_only};
use easysong_pipeline::resources::{SystemProbe, MAX_RESOURCE_WAIT};
use easysong_pipeline::safety::validate_pipeline_dirs;
use easysong_pipeline::scheduler::ResourceGate;

#[derive(Parser)]
#[command(name = "analyze-song")]
#[command(about = "Generate the song document for one video")]
struct Args {
    /// Video id or YouTube URL
    video: Option<String>,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    resources: ResourceArgs,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Skip the memory check for local models
    #[arg(long)]
    skip_resource_check: bool,

    /// Wait up to 30 minutes for memory instead of exiting
    #[arg(long)]
    wait_for_resources: bool,

    /// Print the generated document to stdout
    #[arg(long)]
    print: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.output.verbose);
    set_log_only(args.output.log_only);

    let Some(input) = args.video.as_deref() else {
        bail!("Missing video id or URL");
    };
    let Some(video_id) = extract_video_id(input) else {
        bail!("'{}' is not a video id or a recognised YouTube URL", input);
    };

    let llm = args.llm.validate()?;
    let thresholds = args.resources.thresholds()?;
    let poll_interval = args.resources.poll_interval()?;
    let dirs = args.dirs.resolve();
    validate_pipeline_dirs(&dirs)?;
    dirs.ensure_dirs().await?;

    let file = format!("{video_id}.json");
    let pending = dirs.input.join(&file);
    let archived = dirs.processed.join(&file);
    if !pending.is_file() && !archived.is_file() {
        bail!(
            "No lyrics for {} in {} or {}",
            video_id,
            dirs.input.display(),
            dirs.processed.display()
        );
    }

    let mut pipeline = Pipeline::from_config(&llm, dirs)?;
    if pipeline.llm().is_local() && !args.skip_resource_check {
        let max_wait = if args.wait_for_resources {
            MAX_RESOURCE_WAIT
        } else {
            Duration::ZERO
        };
        let mut gate = ResourceGate::new(Box::new(SystemProbe::new()), thresholds, poll_interval).with_max_wait(max_wait);
        if let Err(reason) = gate.admit().await {
            bail!("Insufficient resources for a local model: {reason}");
        }
    }

    let output_path = if pending.is_file() {
        let outcome = pipeline.process_file(&pending).await;
        match outcome.status {
            FinalStatus::Done { .. } => outcome.output_path.context("Missing output path")?,
            FinalStatus::Failed { reason_code, error } => bail!("{} failed ({}): {}", video_id, reason_code, error),
        }
    } else {
        info!("Regenerating {} from {}", video_id, archived.display());
        let segments = read_segments(&archived).await?;
        let analysis = pipeline.analyze(&video_id, &segments).await?;
        info!(
            "Matched {}/{} lines ({:.1}%)",
            analysis.report.matched,
            analysis.report.total,
            analysis.report.match_rate()
        );
        pipeline.write_document(&analysis.document).await?
    };

    info!("Wrote {}", output_path.display());
    if args.print {
        let body = tokio::fs::read_to_string(&output_path)
            .await
            .with_context(|| format!("Failed to read {}", output_path.display()))?;
        print!("{body}");
    }
    Ok(())
}
