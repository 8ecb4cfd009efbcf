//! Safety checks on the directory layout, run before any file is touched.
//!
//! A misconfigured layout (error directory equal to the input directory, the
//! stats file sitting among pending files) would make the pipeline re-process
//! or destroy its own files.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineDirs;

/// Compare two paths, resolving them when both exist.
fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validates that the pipeline directories cannot clobber each other.
///
/// Checks:
/// - input, output, processed and error directories are pairwise distinct
/// - the examples directory is not the input directory
/// - the stats file does not live in the input directory
/// - the prompt template exists
pub fn validate_pipeline_dirs(dirs: &PipelineDirs) -> Result<()> {
    let named: [(&str, &PathBuf); 4] = [
        ("input", &dirs.input),
        ("output", &dirs.output),
        ("processed", &dirs.processed),
        ("error", &dirs.error),
    ];
    for (i, (name_a, a)) in named.iter().enumerate() {
        for (name_b, b) in &named[i + 1..] {
            if same_path(a, b) {
                bail!(
                    "Safety check failed: {} directory '{}' cannot be the same as {} directory '{}'",
                    name_a,
                    a.display(),
                    name_b,
                    b.display()
                );
            }
        }
    }

    if same_path(&dirs.examples, &dirs.input) {
        bail!(
            "Safety check failed: examples directory '{}' cannot be the input directory",
            dirs.examples.display()
        );
    }

    if let Some(parent) = dirs.stats_file.parent() {
        if same_path(parent, &dirs.input) {
            bail!(
                "Safety check failed: stats file '{}' would be picked up as a pending song",
                dirs.stats_file.display()
            );
        }
    }

    if !dirs.template.is_file() {
        bail!("Prompt template '{}' does not exist", dirs.template.display());
    }

    Ok(())
}
