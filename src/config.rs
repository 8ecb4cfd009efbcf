//! Command-line and environment configuration shared by all binaries.
//!
//! Each binary flattens the argument groups it needs. Every option can also
//! come from the environment, so cron jobs and daemons can be configured
//! without long command lines.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use thiserror::Error;

use crate::llm::{LOCAL_BASE_URL, OPENAI_BASE_URL};
use crate::pipeline::PipelineDirs;
use crate::resources::{
    ResourceThresholds, DEFAULT_MAX_MEMORY_USAGE_PERCENT, DEFAULT_MIN_FREE_MEMORY_MB, DEFAULT_POLL_INTERVAL,
};

/// Default model per provider when `LLM_MODEL` is not set.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is required when LLM_PROVIDER=openai")]
    MissingApiKey,

    #[error("{name} must be an http(s) URL, got '{value}'")]
    InvalidUrl { name: &'static str, value: String },

    #[error("LLM_TEMPERATURE must be between 0 and 2, got {0}")]
    InvalidTemperature(f32),

    #[error("MAX_MEMORY_USAGE_PERCENT must be between 1 and 100, got {0}")]
    InvalidUsagePercent(f64),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LlmProvider {
    /// Hosted OpenAI-compatible API
    #[value(name = "openai")]
    OpenAi,
    /// Local inference server on this host
    Local,
}

// ============================================================================
// LLM
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct LlmArgs {
    /// LLM backend to call
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openai")]
    pub provider: LlmProvider,

    /// Model name (default depends on provider)
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Credential for the hosted API
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the hosted API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = OPENAI_BASE_URL)]
    pub openai_base_url: String,

    /// Base URL of the local inference server
    #[arg(long, env = "LOCAL_LLM_URL", default_value = LOCAL_BASE_URL)]
    pub local_url: String,

    /// Sampling temperature
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 600)]
    pub llm_timeout_secs: u64,
}

/// Validated LLM settings.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub openai_base_url: String,
    pub local_url: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmArgs {
    /// Validate before any file is touched; a failure here is fatal.
    pub fn validate(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = self.api_key.clone().filter(|k| !k.trim().is_empty());
        if self.provider == LlmProvider::OpenAi && api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        let (url_name, url) = match self.provider {
            LlmProvider::OpenAi => ("OPENAI_BASE_URL", &self.openai_base_url),
            LlmProvider::Local => ("LOCAL_LLM_URL", &self.local_url),
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                name: url_name,
                value: url.clone(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("LLM_TIMEOUT_SECS"));
        }

        let model = self.model.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::OpenAi => DEFAULT_OPENAI_MODEL,
                LlmProvider::Local => DEFAULT_LOCAL_MODEL,
            }
            .to_string()
        });

        Ok(LlmConfig {
            provider: self.provider,
            model,
            api_key,
            openai_base_url: self.openai_base_url.clone(),
            local_url: self.local_url.clone(),
            temperature: self.temperature,
            timeout_secs: self.llm_timeout_secs,
        })
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct ResourceArgs {
    /// Minimum free memory (MB) before calling a local model
    #[arg(long, env = "MIN_FREE_MEMORY_MB", default_value_t = DEFAULT_MIN_FREE_MEMORY_MB)]
    pub min_free_memory_mb: u64,

    /// Maximum memory usage (%) before calling a local model
    #[arg(long, env = "MAX_MEMORY_USAGE_PERCENT", default_value_t = DEFAULT_MAX_MEMORY_USAGE_PERCENT)]
    pub max_memory_usage_percent: f64,

    /// Seconds between memory polls while waiting
    #[arg(long, env = "RESOURCE_POLL_SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub resource_poll_secs: u64,
}

impl ResourceArgs {
    pub fn thresholds(&self) -> Result<ResourceThresholds, ConfigError> {
        if !(1.0..=100.0).contains(&self.max_memory_usage_percent) {
            return Err(ConfigError::InvalidUsagePercent(self.max_memory_usage_percent));
        }
        Ok(ResourceThresholds {
            min_free_memory_mb: self.min_free_memory_mb,
            max_memory_usage_percent: self.max_memory_usage_percent,
        })
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        if self.resource_poll_secs == 0 {
            return Err(ConfigError::NotPositive("RESOURCE_POLL_SECS"));
        }
        Ok(Duration::from_secs(self.resource_poll_secs))
    }
}

// ============================================================================
// Directories
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct DirArgs {
    /// Root data directory; the other paths default to folders inside it
    #[arg(long, env = "EASYSONG_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Pending lyric files (<videoId>.json) (default: <data-dir>/pending-lyrics)
    #[arg(long, env = "EASYSONG_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Generated song documents (default: <data-dir>/songs)
    #[arg(long, env = "EASYSONG_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Successfully processed inputs (default: <data-dir>/processed-lyrics)
    #[arg(long, env = "EASYSONG_PROCESSED_DIR")]
    pub processed_dir: Option<PathBuf>,

    /// Failed inputs (default: <data-dir>/error-lyrics)
    #[arg(long, env = "EASYSONG_ERROR_DIR")]
    pub error_dir: Option<PathBuf>,

    /// Few-shot example song documents (default: <data-dir>/examples)
    #[arg(long, env = "EASYSONG_EXAMPLES_DIR")]
    pub examples_dir: Option<PathBuf>,

    /// Prompt template with [Song Title] and [Artist] placeholders (default: prompts/lyrics-analysis.txt)
    #[arg(long, env = "EASYSONG_PROMPT_TEMPLATE", default_value = "prompts/lyrics-analysis.txt")]
    pub prompt_template: PathBuf,

    /// Language statistics file (default: <data-dir>/language-stats.json)
    #[arg(long, env = "EASYSONG_STATS_FILE")]
    pub stats_file: Option<PathBuf>,
}

impl DirArgs {
    pub fn resolve(&self) -> PipelineDirs {
        let root = &self.data_dir;
        PipelineDirs {
            input: self.input_dir.clone().unwrap_or_else(|| root.join("pending-lyrics")),
            output: self.output_dir.clone().unwrap_or_else(|| root.join("songs")),
            processed: self
                .processed_dir
                .clone()
                .unwrap_or_else(|| root.join("processed-lyrics")),
            error: self.error_dir.clone().unwrap_or_else(|| root.join("error-lyrics")),
            examples: self.examples_dir.clone().unwrap_or_else(|| root.join("examples")),
            template: self.prompt_template.clone(),
            stats_file: self
                .stats_file
                .clone()
                .unwrap_or_else(|| root.join("language-stats.json")),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct OutputArgs {
    /// Log-only mode: hide progress bars for tail-friendly output
    #[arg(long)]
    pub log_only: bool,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        llm: LlmArgs,
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        dirs: DirArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv)
    }

    #[test]
    fn test_openai_requires_key() {
        let cli = parse(&["--provider", "openai", "--api-key", " "]);
        assert!(matches!(cli.llm.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_local_defaults() {
        let cli = parse(&["--provider", "local"]);
        let cfg = cli.llm.validate().unwrap();
        assert_eq!(cfg.provider, LlmProvider::Local);
        assert_eq!(cfg.model, DEFAULT_LOCAL_MODEL);
        assert_eq!(cfg.local_url, LOCAL_BASE_URL);
    }

    #[test]
    fn test_explicit_model_and_key() {
        let cli = parse(&["--provider", "openai", "--api-key", "sk-1", "--model", "gpt-4o"]);
        let cfg = cli.llm.validate().unwrap();
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_bad_local_url() {
        let cli = parse(&["--provider", "local", "--local-url", "localhost:11434"]);
        assert!(matches!(cli.llm.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_threshold_validation() {
        let cli = parse(&["--provider", "local", "--max-memory-usage-percent", "150"]);
        assert!(cli.resources.thresholds().is_err());

        let cli = parse(&["--provider", "local"]);
        let thresholds = cli.resources.thresholds().unwrap();
        assert_eq!(thresholds, ResourceThresholds::default());
    }

    #[test]
    fn test_dirs_default_under_data_dir() {
        let cli = parse(&["--provider", "local", "--data-dir", "/srv/easysong", "--error-dir", "/tmp/bad"]);
        let dirs = cli.dirs.resolve();
        assert_eq!(dirs.input, PathBuf::from("/srv/easysong/pending-lyrics"));
        assert_eq!(dirs.output, PathBuf::from("/srv/easysong/songs"));
        assert_eq!(dirs.error, PathBuf::from("/tmp/bad"));
        assert_eq!(dirs.stats_file, PathBuf::from("/srv/easysong/language-stats.json"));
    }
}
