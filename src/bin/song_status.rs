//! Show where videos sit in the pipeline.

use anyhow::{bail, Result};
use clap::Parser;

use easysong_pipeline::config::DirArgs;
use easysong_pipeline::inventory::{list_generated, list_known, song_status};
use easysong_pipeline::metadata::extract_video_id;
use easysong_pipeline::progress::init_tracing;

#[derive(Parser)]
#[command(name = "song-status")]
#[command(about = "Report pipeline status for videos (all known videos when none are given)")]
struct Args {
    /// Video ids or YouTube URLs
    videos: Vec<String>,

    #[command(flatten)]
    dirs: DirArgs,

    /// Only list ids that have a generated song document
    #[arg(long)]
    generated: bool,
}

fn mark(flag: bool) -> &'static str {
    if flag {
        "x"
    } else {
        "-"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(false);
    let dirs = args.dirs.resolve();

    if args.generated {
        for id in list_generated(&dirs).await? {
            println!("{id}");
        }
        return Ok(());
    }

    let ids = if args.videos.is_empty() {
        list_known(&dirs).await?
    } else {
        let mut ids = Vec::with_capacity(args.videos.len());
        for input in &args.videos {
            match extract_video_id(input) {
                Some(id) => ids.push(id),
                None => bail!("'{}' is not a video id or a recognised YouTube URL", input),
            }
        }
        ids
    };

    println!("{:<14} {:<10} {:>7} {:>9} {:>6} {:>9}", "VIDEO", "STATUS", "PENDING", "PROCESSED", "FAILED", "GENERATED");
    let mut unknown = 0;
    for id in &ids {
        let status = song_status(&dirs, id).await;
        if !status.is_known() {
            unknown += 1;
        }
        println!(
            "{:<14} {:<10} {:>7} {:>9} {:>6} {:>9}",
            status.video_id,
            status.label(),
            mark(status.pending),
            mark(status.processed),
            mark(status.failed),
            mark(status.generated)
        );
    }

    if !args.videos.is_empty() && unknown > 0 {
        bail!("{} of {} videos are unknown", unknown, ids.len());
    }
    Ok(())
}
