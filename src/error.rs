//! Failure taxonomy for a single lyric file.
//!
//! Every variant is scoped to one file: the orchestrator relocates the file
//! to the error directory and moves on. Batch-scoped problems (an unreadable
//! input directory) travel as plain `anyhow` errors instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed lyrics JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("segment {index} in {path} ends before it starts ({start_ms} > {end_ms})")]
    InvalidSegment {
        path: PathBuf,
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },

    /// An empty segment array. There is nothing to translate, and an empty
    /// document would look like a finished song to the app, so the file is
    /// treated as bad input.
    #[error("{0} contains no lyric segments")]
    NoSegments(PathBuf),

    #[error("file name {0} is not a <videoId>.json name")]
    BadFileName(PathBuf),

    #[error("prompt preparation failed: {0:#}")]
    Prompt(anyhow::Error),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("LLM response is not a song analysis: {0}")]
    Analysis(#[source] serde_json::Error),

    #[error("cannot write song document {path}: {source:#}")]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot move {path} to the processed directory: {source:#}")]
    Relocate {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl FileError {
    /// Short machine-friendly reason code for logs and summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            FileError::Read { .. } => "READ_FAILED",
            FileError::Parse { .. }
            | FileError::InvalidSegment { .. }
            | FileError::NoSegments(_)
            | FileError::BadFileName(_) => "BAD_INPUT",
            FileError::Prompt(_) => "PROMPT_FAILED",
            FileError::Llm(_) | FileError::Analysis(_) => "LLM_FAILED",
            FileError::Write { .. } => "WRITE_FAILED",
            FileError::Relocate { .. } => "RELOCATE_FAILED",
        }
    }
}
