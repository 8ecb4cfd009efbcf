//! Easy Song content pipeline - shared modules for all binaries.

pub mod config;
pub mod error;
pub mod inventory;
pub mod language;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod resources;
pub mod safety;
pub mod scheduler;
pub mod stats;
pub mod storage;
