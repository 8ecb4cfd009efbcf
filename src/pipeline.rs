//! Folder-driven pipeline: pending lyric files in, song documents out.
//!
//! Each `<videoId>.json` file in the input directory goes through
//! `Pending → Reading → Transforming → Writing → Relocated(..)`. Files are
//! processed strictly one at a time; a failure only ever affects the file it
//! belongs to, which is moved to the error directory.
//!
//! Concurrent runs against the same directories are unsupported: there is no
//! locking around the file moves or the statistics file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::error::FileError;
use crate::language::detect_language;
use crate::llm::{build_client, ChatOptions, LlmClient};
use crate::metadata::{fetch_metadata, MetadataSource, OEmbedSource};
use crate::models::{LyricSegment, Section, SongAnalysis, SongDocument, DEFAULT_SECTION_TITLE};
use crate::normalize::{reconcile_with_report, ReconcileReport};
use crate::progress::{create_progress_bar, format_duration, log_progress};
use crate::prompt::{build_messages, load_template, ExampleCache};
use crate::stats::LanguageStats;
use crate::storage::{move_into, write_json_atomic};

/// Re-list interval for watch mode.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Directories
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDirs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub processed: PathBuf,
    pub error: PathBuf,
    pub examples: PathBuf,
    pub template: PathBuf,
    pub stats_file: PathBuf,
}

impl PipelineDirs {
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.input, &self.output, &self.processed, &self.error] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn output_path(&self, video_id: &str) -> PathBuf {
        self.output.join(format!("{video_id}.json"))
    }
}

// ============================================================================
// File state
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    Processed,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Reading,
    Transforming,
    Writing,
    Relocated(Destination),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FinalStatus {
    Done {
        lines: usize,
        matched: usize,
        language: String,
        metadata_enriched: bool,
    },
    Failed {
        reason_code: &'static str,
        error: String,
    },
}

/// What happened to one input file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileOutcome {
    pub video_id: String,
    pub source: PathBuf,
    /// Last state reached. Stays below `Relocated` if the file could not be moved.
    pub state: FileState,
    pub status: FinalStatus,
    /// Where the input ended up, if it was moved.
    pub dest_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FinalStatus::Done { .. })
    }
}

/// A generated document plus its reconciliation diagnostics.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub document: SongDocument,
    pub report: ReconcileReport,
    pub metadata_enriched: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub listed: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl BatchSummary {
    /// Files left in the input directory because of the batch limit.
    pub fn deferred(&self) -> usize {
        self.listed - self.attempted
    }
}

fn advance(video_id: &str, state: &mut FileState, next: FileState) {
    debug!(video_id, from = ?*state, to = ?next, "File state");
    *state = next;
}

/// `<videoId>.json` → `videoId`.
pub fn video_id_from_path(path: &Path) -> Result<String, FileError> {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) if is_json && !stem.is_empty() => Ok(stem.to_string()),
        _ => Err(FileError::BadFileName(path.to_path_buf())),
    }
}

/// Read and validate a segment file.
pub async fn read_segments(path: &Path) -> Result<Vec<LyricSegment>, FileError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| FileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let segments: Vec<LyricSegment> = serde_json::from_str(&raw).map_err(|source| FileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if segments.is_empty() {
        return Err(FileError::NoSegments(path.to_path_buf()));
    }
    if let Some((index, seg)) = segments.iter().enumerate().find(|(_, s)| !s.is_well_formed()) {
        return Err(FileError::InvalidSegment {
            path: path.to_path_buf(),
            index,
            start_ms: seg.start_ms,
            end_ms: seg.end_ms,
        });
    }
    Ok(segments)
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    llm: Box<dyn LlmClient>,
    metadata: Box<dyn MetadataSource>,
    model: String,
    options: ChatOptions,
    examples: ExampleCache,
    dirs: PipelineDirs,
}

impl Pipeline {
    pub fn new(
        llm: Box<dyn LlmClient>,
        metadata: Box<dyn MetadataSource>,
        model: impl Into<String>,
        options: ChatOptions,
        dirs: PipelineDirs,
    ) -> Self {
        Self {
            llm,
            metadata,
            model: model.into(),
            options,
            examples: ExampleCache::new(dirs.examples.clone()),
            dirs,
        }
    }

    /// Production wiring: configured LLM backend and the oEmbed metadata source.
    pub fn from_config(config: &LlmConfig, dirs: PipelineDirs) -> Result<Self> {
        let llm = build_client(config).context("Failed to build LLM client")?;
        let metadata = OEmbedSource::new().context("Failed to build metadata client")?;
        let options = ChatOptions {
            json_response: true,
            temperature: config.temperature,
        };
        Ok(Self::new(llm, Box::new(metadata), config.model.clone(), options, dirs))
    }

    pub fn dirs(&self) -> &PipelineDirs {
        &self.dirs
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    /// Drop cached examples so the next file re-reads the directory.
    pub fn invalidate_examples(&mut self) {
        self.examples.invalidate();
    }

    /// Pending `*.json` files, sorted by name.
    pub async fn list_pending(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dirs.input)
            .await
            .with_context(|| format!("Failed to list input directory {}", self.dirs.input.display()))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Metadata, prompt, LLM call and reconciliation for one song.
    pub async fn analyze(&mut self, video_id: &str, segments: &[LyricSegment]) -> Result<Analysis, FileError> {
        let metadata = fetch_metadata(self.metadata.as_ref(), video_id).await;
        let resolved = metadata.resolved();

        let template = load_template(&self.dirs.template).await.map_err(FileError::Prompt)?;
        let examples = self.examples.get().await.map_err(FileError::Prompt)?;
        let messages = build_messages(&template, &resolved.title, &resolved.artist, examples, segments);

        info!(
            video_id,
            backend = self.llm.name(),
            model = %self.model,
            lines = segments.len(),
            "Requesting analysis"
        );
        let completion = self.llm.complete(&self.model, &messages, self.options).await?;
        if let Some(usage) = completion.usage {
            debug!(
                video_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        let analysis: SongAnalysis = serde_json::from_str(&completion.content).map_err(FileError::Analysis)?;
        let items = analysis.into_items();
        if items.is_empty() {
            warn!(video_id, "Analysis contains no lines, every line gets a placeholder");
        }

        let (lines, report) = reconcile_with_report(segments, &items);
        for miss in &report.unmatched {
            match &miss.nearest {
                Some((key, score)) => debug!(
                    video_id,
                    position = miss.position,
                    "Unmatched line {:?} (closest analysis line {:?}, similarity {:.2})",
                    miss.text,
                    key,
                    score
                ),
                None => debug!(video_id, position = miss.position, "Unmatched line {:?}", miss.text),
            }
        }
        if !report.segment_collisions.is_empty() {
            warn!(
                video_id,
                "Distinct lines share a normalized form and get the same translation: {:?}",
                report.segment_collisions
            );
        }

        let language = detect_language(segments);
        let thumbnail = Some(resolved.thumbnail_url).filter(|t| !t.is_empty());
        let document = SongDocument {
            video_id: video_id.to_string(),
            title: resolved.title,
            artist: resolved.artist,
            thumbnail_url: thumbnail,
            language: Some(language.to_string()),
            sections: vec![Section {
                title: DEFAULT_SECTION_TITLE.to_string(),
                lines,
            }],
        };

        Ok(Analysis {
            document,
            report,
            metadata_enriched: metadata.is_enriched(),
        })
    }

    /// Write a document to `<output>/<videoId>.json`, replacing any previous version.
    pub async fn write_document(&self, document: &SongDocument) -> Result<PathBuf, FileError> {
        let path = self.dirs.output_path(&document.video_id);
        write_json_atomic(&path, document)
            .await
            .map_err(|source| FileError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    async fn generate(
        &mut self,
        path: &Path,
        video_id: &str,
        state: &mut FileState,
    ) -> Result<(Analysis, PathBuf), FileError> {
        advance(video_id, state, FileState::Reading);
        let segments = read_segments(path).await?;

        advance(video_id, state, FileState::Transforming);
        let analysis = self.analyze(video_id, &segments).await?;

        advance(video_id, state, FileState::Writing);
        let output = self.write_document(&analysis.document).await?;
        Ok((analysis, output))
    }

    /// Run one file through its whole lifecycle. Never fails: errors are
    /// carried in the outcome together with where the input was moved.
    pub async fn process_file(&mut self, path: &Path) -> FileOutcome {
        let start = Instant::now();
        let mut state = FileState::Pending;
        let parsed_id = video_id_from_path(path);
        let video_id = match &parsed_id {
            Ok(id) => id.clone(),
            Err(_) => path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        };

        let result = match parsed_id {
            Ok(_) => self.generate(path, &video_id, &mut state).await,
            Err(e) => Err(e),
        };

        let (status, dest_path, output_path, result) = match result {
            Ok((analysis, output)) => match move_into(path, &self.dirs.processed).await {
                Ok(dest) => {
                    advance(&video_id, &mut state, FileState::Relocated(Destination::Processed));
                    let language = analysis.document.language.clone().unwrap_or_default();
                    if let Err(e) = LanguageStats::record_and_save(&self.dirs.stats_file, &language, Utc::now()).await {
                        warn!(video_id = %video_id, "Failed to update language stats: {:#}", e);
                    }
                    let status = FinalStatus::Done {
                        lines: analysis.document.line_count(),
                        matched: analysis.report.matched,
                        language,
                        metadata_enriched: analysis.metadata_enriched,
                    };
                    (status, Some(dest), Some(output), Ok(()))
                }
                // The output is already written; leaving the input pending means
                // the next run regenerates it.
                Err(source) => {
                    let err = FileError::Relocate {
                        path: path.to_path_buf(),
                        source,
                    };
                    (failed(&err), None, Some(output), Err(err))
                }
            },
            Err(err) => {
                let dest = match move_into(path, &self.dirs.error).await {
                    Ok(dest) => {
                        advance(&video_id, &mut state, FileState::Relocated(Destination::Error));
                        Some(dest)
                    }
                    Err(e) => {
                        error!(video_id = %video_id, "Failed to move {} to error directory: {:#}", path.display(), e);
                        None
                    }
                };
                (failed(&err), dest, None, Err(err))
            }
        };

        let duration = start.elapsed();
        match (&result, &status) {
            (Ok(()), FinalStatus::Done { lines, matched, language, .. }) => info!(
                video_id = %video_id,
                "Generated {} lines ({} matched, language {}) in {}",
                lines,
                matched,
                language,
                format_duration(duration)
            ),
            (Err(err), _) => {
                let moved_to = dest_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<not moved>".to_string());
                error!(
                    video_id = %video_id,
                    reason = err.reason_code(),
                    moved_to = %moved_to,
                    "Failed: {}",
                    err
                );
            }
            _ => {}
        }

        FileOutcome {
            video_id,
            source: path.to_path_buf(),
            state,
            status,
            dest_path,
            output_path,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// List once, then process up to `limit` files in name order.
    /// Only a failure to list the input directory is an error.
    pub async fn run_batch(&mut self, limit: Option<usize>) -> Result<BatchSummary> {
        let start = Instant::now();
        let pending = self.list_pending().await?;
        let mut summary = BatchSummary {
            listed: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            debug!("No pending lyric files in {}", self.dirs.input.display());
            return Ok(summary);
        }

        let selected: Vec<PathBuf> = match limit {
            Some(n) => pending.into_iter().take(n).collect(),
            None => pending,
        };
        info!(
            "Processing {} of {} pending lyric files from {}",
            selected.len(),
            summary.listed,
            self.dirs.input.display()
        );

        let total = selected.len() as u64;
        let pb = create_progress_bar(total, "Analyzing lyrics");
        for (i, path) in selected.iter().enumerate() {
            let outcome = self.process_file(path).await;
            summary.attempted += 1;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            pb.inc(1);
            log_progress("batch", i as u64 + 1, total, 10);
        }
        pb.finish_and_clear();

        summary.duration = start.elapsed();
        info!(
            "Batch done: {} succeeded, {} failed, {} deferred in {}",
            summary.succeeded,
            summary.failed,
            summary.deferred(),
            format_duration(summary.duration)
        );
        Ok(summary)
    }

    /// Re-list the input directory every `interval` until `shutdown` resolves.
    /// A batch interrupted by shutdown leaves its current file pending or in
    /// the error directory.
    pub async fn watch<F>(&mut self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Watching {} every {}", self.dirs.input.display(), format_duration(interval));

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            self.examples.invalidate();
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.run_batch(None) => {
                    if let Err(e) = result {
                        error!("Batch failed, retrying next tick: {:#}", e);
                    }
                }
            }
        }
        info!("Shutdown requested, stopping watch");
    }
}

fn failed(err: &FileError) -> FinalStatus {
    FinalStatus::Failed {
        reason_code: err.reason_code(),
        error: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::{ChatCompletion, ChatMessage, LlmError, LlmFuture};
    use crate::metadata::{MetadataError, MetadataFuture, VideoMetadata};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Returns a fixed response and records every request.
    pub(crate) struct FakeLlm {
        pub response: Result<String, ()>,
        pub local: bool,
        pub calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl FakeLlm {
        pub(crate) fn ok(body: &str) -> Self {
            Self {
                response: Ok(body.to_string()),
                local: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl LlmClient for FakeLlm {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_local(&self) -> bool {
            self.local
        }

        fn complete<'a>(&'a self, _model: &'a str, messages: &'a [ChatMessage], _options: ChatOptions) -> LlmFuture<'a> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let response = self.response.clone();
            Box::pin(async move {
                match response {
                    Ok(content) => Ok(ChatCompletion { content, usage: None }),
                    Err(()) => Err(LlmError::EmptyContent),
                }
            })
        }
    }

    pub(crate) struct FakeMetadata(pub Option<VideoMetadata>);

    impl MetadataSource for FakeMetadata {
        fn lookup<'a>(&'a self, video_id: &'a str) -> MetadataFuture<'a> {
            let result = self.0.clone().ok_or_else(|| MetadataError::NotFound(video_id.to_string()));
            Box::pin(async move { result })
        }
    }

    pub(crate) fn test_dirs(root: &Path) -> PipelineDirs {
        let dirs = PipelineDirs {
            input: root.join("pending"),
            output: root.join("songs"),
            processed: root.join("processed"),
            error: root.join("error"),
            examples: root.join("examples"),
            template: root.join("template.txt"),
            stats_file: root.join("stats.json"),
        };
        for d in [&dirs.input, &dirs.output, &dirs.processed, &dirs.error, &dirs.examples] {
            std::fs::create_dir_all(d).unwrap();
        }
        std::fs::write(&dirs.template, "Analyze [Song Title] by [Artist].").unwrap();
        dirs
    }

    const SEGMENTS: &str = r#"[
        {"text": "¡Hola, mundo!", "start_ms": 0, "end_ms": 1000},
        {"text": "Adiós", "start_ms": 1000, "end_ms": 2000},
        {"text": "Te quiero", "start_ms": 2000, "end_ms": 3000}
    ]"#;

    const ANALYSIS: &str = r#"{"sections": [{"lines": [
        {"spanish": "hola mundo", "english": "hello world", "explanation": "greeting"},
        {"spanish": "Te quiero.", "english": "I love you"}
    ]}]}"#;

    fn pipeline(dirs: &PipelineDirs, llm: FakeLlm, meta: Option<VideoMetadata>) -> Pipeline {
        Pipeline::new(Box::new(llm), Box::new(FakeMetadata(meta)), "test-model", ChatOptions::default(), dirs.clone())
    }

    #[tokio::test]
    async fn test_success_writes_document_and_relocates() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("abc123DEF45.json");
        std::fs::write(&input, SEGMENTS).unwrap();

        let meta = VideoMetadata {
            title: "Canción".into(),
            artist: "Artista".into(),
            thumbnail_url: "https://i.ytimg.com/vi/abc123DEF45/hqdefault.jpg".into(),
        };
        let llm = FakeLlm::ok(ANALYSIS);
        let calls = llm.calls.clone();
        let mut p = pipeline(&dirs, llm, Some(meta));

        let outcome = p.process_file(&input).await;
        assert!(outcome.is_success(), "{:?}", outcome.status);
        assert_eq!(outcome.state, FileState::Relocated(Destination::Processed));
        assert!(!input.exists());
        assert!(dirs.processed.join("abc123DEF45.json").exists());

        let doc: SongDocument =
            serde_json::from_str(&std::fs::read_to_string(dirs.output_path("abc123DEF45")).unwrap()).unwrap();
        assert_eq!(doc.title, "Canción");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title, "Lyrics");
        assert_eq!(doc.line_count(), 3);
        let lines = &doc.sections[0].lines;
        assert_eq!(lines[0].english, "hello world");
        assert_eq!(lines[0].spanish, "¡Hola, mundo!");
        assert_eq!(lines[1].english, "...");
        assert_eq!(lines[1].explanation, None);
        assert_eq!(lines[2].english, "I love you");

        let sent = calls.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0][1].content.starts_with("Analyze Canción by Artista."));

        let stats = LanguageStats::load(&dirs.stats_file).await.unwrap();
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test]
    async fn test_malformed_input_goes_to_error_without_output() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("broken.json");
        std::fs::write(&input, "[{\"text\": ").unwrap();

        let llm = FakeLlm::ok(ANALYSIS);
        let calls = llm.calls.clone();
        let mut p = pipeline(&dirs, llm, None);
        let outcome = p.process_file(&input).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.state, FileState::Relocated(Destination::Error));
        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "BAD_INPUT", .. }));
        assert!(dirs.error.join("broken.json").exists());
        assert!(!dirs.output_path("broken").exists());
        assert!(calls.lock().unwrap().is_empty());
        assert!(!dirs.stats_file.exists());
    }

    #[tokio::test]
    async fn test_inverted_segment_is_bad_input() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("inv.json");
        std::fs::write(&input, r#"[{"text": "a", "start_ms": 500, "end_ms": 100}]"#).unwrap();

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        let outcome = p.process_file(&input).await;
        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "BAD_INPUT", .. }));
        assert!(dirs.error.join("inv.json").exists());
    }

    #[tokio::test]
    async fn test_empty_segment_file_is_bad_input() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("empty.json");
        std::fs::write(&input, "[]").unwrap();

        let llm = FakeLlm::ok(ANALYSIS);
        let calls = llm.calls.clone();
        let mut p = pipeline(&dirs, llm, None);
        let outcome = p.process_file(&input).await;
        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "BAD_INPUT", .. }));
        assert!(dirs.error.join("empty.json").exists());
        assert!(!dirs.output_path("empty").exists());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relocation_failure_keeps_input_pending() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("stuck.json");
        std::fs::write(&input, SEGMENTS).unwrap();
        // A regular file where the processed directory should be
        std::fs::remove_dir(&dirs.processed).unwrap();
        std::fs::write(&dirs.processed, "").unwrap();

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        let outcome = p.process_file(&input).await;

        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "RELOCATE_FAILED", .. }));
        assert_eq!(outcome.state, FileState::Writing);
        assert_eq!(outcome.dest_path, None);
        assert_eq!(outcome.output_path, Some(dirs.output_path("stuck")));
        assert!(input.exists());
        assert!(dirs.output_path("stuck").exists());
        assert!(!dirs.error.join("stuck.json").exists());
        assert!(!dirs.stats_file.exists());
    }

    #[tokio::test]
    async fn test_llm_failure_and_bad_response_go_to_error() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        std::fs::write(dirs.input.join("a.json"), SEGMENTS).unwrap();
        std::fs::write(dirs.input.join("b.json"), SEGMENTS).unwrap();

        let mut failing = FakeLlm::ok("");
        failing.response = Err(());
        let mut p = pipeline(&dirs, failing, None);
        let outcome = p.process_file(&dirs.input.join("a.json")).await;
        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "LLM_FAILED", .. }));

        let mut p = pipeline(&dirs, FakeLlm::ok(r#"{"verdict": "nice song"}"#), None);
        let outcome = p.process_file(&dirs.input.join("b.json")).await;
        assert!(matches!(outcome.status, FinalStatus::Failed { reason_code: "LLM_FAILED", .. }));

        assert!(dirs.error.join("a.json").exists());
        assert!(dirs.error.join("b.json").exists());
        assert!(!dirs.output_path("a").exists());
    }

    #[tokio::test]
    async fn test_metadata_failure_uses_placeholders() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        let input = dirs.input.join("nometa.json");
        std::fs::write(&input, SEGMENTS).unwrap();

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        let outcome = p.process_file(&input).await;
        assert!(matches!(outcome.status, FinalStatus::Done { metadata_enriched: false, .. }));

        let doc: SongDocument =
            serde_json::from_str(&std::fs::read_to_string(dirs.output_path("nometa")).unwrap()).unwrap();
        assert_eq!(doc.title, "Unknown Title");
        assert_eq!(doc.artist, "Unknown Artist");
        assert_eq!(doc.thumbnail_url, None);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure_and_respects_limit() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        std::fs::write(dirs.input.join("a.json"), SEGMENTS).unwrap();
        std::fs::write(dirs.input.join("b.json"), "not json").unwrap();
        std::fs::write(dirs.input.join("c.json"), SEGMENTS).unwrap();
        std::fs::write(dirs.input.join("d.json"), SEGMENTS).unwrap();
        std::fs::write(dirs.input.join("notes.txt"), "skip me").unwrap();

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        let summary = p.run_batch(Some(3)).await.unwrap();
        assert_eq!(summary.listed, 4);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.deferred(), 1);
        assert!(dirs.input.join("d.json").exists());
        assert!(dirs.error.join("b.json").exists());
        assert!(dirs.processed.join("c.json").exists());

        let stats = LanguageStats::load(&dirs.stats_file).await.unwrap();
        assert_eq!(stats.total(), 2);
    }

    #[tokio::test]
    async fn test_missing_input_dir_fails_batch() {
        let tmp = TempDir::new().unwrap();
        let mut dirs = test_dirs(tmp.path());
        dirs.input = tmp.path().join("does-not-exist");
        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        assert!(p.run_batch(None).await.is_err());
    }

    #[tokio::test]
    async fn test_reprocessing_overwrites_output() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        std::fs::write(dirs.output_path("again"), "{\"stale\": true}").unwrap();
        std::fs::write(dirs.input.join("again.json"), SEGMENTS).unwrap();

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        assert!(p.process_file(&dirs.input.join("again.json")).await.is_success());
        let doc: SongDocument =
            serde_json::from_str(&std::fs::read_to_string(dirs.output_path("again")).unwrap()).unwrap();
        assert_eq!(doc.video_id, "again");
    }

    #[tokio::test]
    async fn test_watch_processes_then_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        std::fs::write(dirs.input.join("w.json"), SEGMENTS).unwrap();

        let output = dirs.output_path("w");
        let done = dirs.processed.join("w.json");
        let shutdown = async move {
            while !(output.exists() && done.exists()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };

        let mut p = pipeline(&dirs, FakeLlm::ok(ANALYSIS), None);
        tokio::time::timeout(Duration::from_secs(10), p.watch(Duration::from_millis(50), shutdown))
            .await
            .unwrap();

        assert!(dirs.processed.join("w.json").exists());
        assert!(dirs.output_path("w").exists());
    }

    #[test]
    fn test_video_id_from_path() {
        assert_eq!(video_id_from_path(Path::new("/x/dQw4w9WgXcQ.json")).unwrap(), "dQw4w9WgXcQ");
        assert!(video_id_from_path(Path::new("/x/readme.txt")).is_err());
    }
}
