use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::app_config::{Config, ProviderKind};
use crate::errors::ErrorKind;
use crate::language_utils::MetaLanguage;
use crate::models::{ItemId, MetadataOption, UserInput};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::export::{DirectoryExporter, ExportArtifact};
use crate::pipeline::gate::{CheckpointPreview, ConfirmMode, ConfirmRequest, Decision, DecisionSource, GateAction};
use crate::pipeline::job::{ItemCounts, JobError, JobSnapshot, JobStatus, StageTransition};
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::pipeline::reporter::{LogSink, NdjsonSink, PipelineEvent, ProgressSink, Stage, StageStatus};
use crate::providers::GenerationService;
use crate::providers::gemini::GeminiGenerator;
use crate::providers::mock::MockGenerator;

/// How a run reports to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Progress bars and a human summary
    #[default]
    Human,
    /// NDJSON events and a final result object on stdout
    Json,
}

/// Main application controller
pub struct Controller {
    config: Config,
}

impl Controller {
    /// Build a controller from a validated configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generation service selected by the configuration
    pub fn build_generator(&self) -> Result<Arc<dyn GenerationService>> {
        match self.config.generation.provider {
            ProviderKind::Gemini => {
                let generator = GeminiGenerator::new(self.config.generation.gemini_settings())
                    .map_err(|e| anyhow!("Failed to create Gemini client: {}", e))?;
                Ok(Arc::new(generator))
            }
            ProviderKind::Mock => Ok(Arc::new(MockGenerator::new())),
        }
    }

    fn exporter(&self) -> DirectoryExporter {
        DirectoryExporter::new(self.config.output_dir.clone())
    }

    /// Run one job to completion and write its session summary
    pub async fn run(&self, input: UserInput, output: OutputMode) -> Result<SessionSummary> {
        let start_time = std::time::Instant::now();
        let generator = self.build_generator()?;
        let exporter = self.exporter();

        info!(
            "Generating a {} sticker set with {}",
            input.language,
            self.config.generation.provider.display_name()
        );

        let mut orchestrator = PipelineOrchestrator::new(generator, self.config.pipeline_config()?)
            .with_exporter(Arc::new(exporter.clone()));
        orchestrator = match output {
            OutputMode::Json => orchestrator.with_sink(Arc::new(NdjsonSink)),
            OutputMode::Human => orchestrator
                .with_sink(Arc::new(LogSink))
                .with_sink(Arc::new(ProgressBarSink::new())),
        };
        if self.config.confirm_mode == ConfirmMode::Interactive {
            orchestrator = orchestrator.with_decision_source(Arc::new(StdinDecisionSource::new()));
        }

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling the run");
                    cancel.cancel();
                }
            })
        };

        let job = orchestrator.create_job(input);
        let snapshot = orchestrator.execute(&job, &cancel).await;
        ctrl_c.abort();

        let summary = SessionSummary::from_snapshot(&snapshot, start_time.elapsed());
        let session_dir = exporter.job_dir(snapshot.id);
        if let Err(e) = summary.write(&session_dir) {
            error!("Failed to write session summary: {}", e);
        }

        match output {
            OutputMode::Json => {
                let json = serde_json::to_string(&summary).context("Failed to serialize run result")?;
                println!("{}", json);
            }
            OutputMode::Human => summary.log(),
        }
        Ok(summary)
    }
}

/// Record of a finished run, without image bytes
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub job_id: String,
    pub concept: String,
    pub language: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub items: ItemCounts,
    pub failed_items: Vec<FailedItem>,
    pub stages: Vec<StageTransition>,
    pub selected_metadata: Vec<MetadataOption>,
    pub exports: Vec<ExportArtifact>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub id: ItemId,
    pub expression: String,
    pub kind: ErrorKind,
    pub error: String,
}

impl SessionSummary {
    pub fn from_snapshot(snapshot: &JobSnapshot, elapsed: Duration) -> Self {
        let failed_items = snapshot
            .items
            .iter()
            .filter(|item| item.error.is_some())
            .map(|item| FailedItem {
                id: item.id,
                expression: item.idea.expression.clone(),
                kind: ErrorKind::ItemGenerationFailure,
                error: item.error.clone().unwrap_or_default(),
            })
            .collect();
        Self {
            job_id: snapshot.id.to_string(),
            concept: snapshot.input.concept.clone(),
            language: snapshot.input.language.to_string(),
            status: snapshot.status,
            error: snapshot.last_error.clone(),
            items: snapshot.counts(),
            failed_items,
            stages: snapshot.transitions.clone(),
            selected_metadata: snapshot.selected_metadata.clone(),
            exports: snapshot.exports.clone(),
            duration_secs: elapsed.as_secs_f64(),
        }
    }

    /// Write `session.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join("session.json");
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session summary")?;
        std::fs::write(&path, json).context(format!("Failed to write {}", path.display()))?;
        debug!("Session summary written to {}", path.display());
        Ok(path)
    }

    fn log(&self) {
        match self.status {
            JobStatus::Completed => info!(
                "Job {} completed in {:.1}s: {} of {} stickers generated",
                self.job_id,
                self.duration_secs,
                self.items.done,
                self.items.total()
            ),
            JobStatus::Cancelled => warn!("Job {} was cancelled", self.job_id),
            _ => error!(
                "Job {} failed: {}",
                self.job_id,
                self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error")
            ),
        }
        for item in &self.failed_items {
            warn!("Sticker {} ({}) failed: {}", item.id, item.expression, item.error);
        }
        for option in &self.selected_metadata {
            info!("[{}] {}", option.language, option.title);
        }
        for export in &self.exports {
            info!("{} stickers for {} in {}", export.image_count, export.platform, export.location.display());
        }
    }
}

/// Terminal progress bars, one per stage
pub struct ProgressBarSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<Stage, ProgressBar>>,
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBarSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn print_preview(&self, request: &ConfirmRequest) {
        self.multi.suspend(|| {
            eprintln!("\n== Checkpoint {} ==", request.checkpoint);
            match &request.preview {
                CheckpointPreview::KeyVisual { character_spec, strategy, .. } => {
                    eprintln!("Style: {}", strategy.visual_style().name);
                    eprintln!("Character: {}", character_spec.physical_description);
                }
                CheckpointPreview::PostProcess { images, options } => {
                    eprintln!("{} stickers processed (outline: {:?})", images.len(), options.outline);
                }
                CheckpointPreview::Metadata { candidates } => {
                    for language in candidates {
                        eprintln!("[{}]", language.language);
                        for (index, option) in language.options.iter().enumerate() {
                            eprintln!("  {}: {} ({:.1})", index, option.title, option.evaluation.average());
                        }
                    }
                }
            }
            eprintln!("{}", request.message);
            let actions: Vec<String> = request.allowed_actions.iter().map(|a| a.to_string()).collect();
            if request.awaiting_input {
                eprintln!("Enter one of: {}", actions.join(", "));
            }
        });
    }
}

impl ProgressSink for ProgressBarSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Progress(progress) => {
                let mut bars = self.bars.lock();
                match progress.status {
                    StageStatus::Started => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(Self::spinner_style());
                        bar.set_prefix(progress.stage.label());
                        bar.set_message(progress.message.clone());
                        bar.enable_steady_tick(Duration::from_millis(120));
                        if let Some(previous) = bars.insert(progress.stage, bar) {
                            previous.finish_and_clear();
                        }
                    }
                    StageStatus::Running => {
                        if let Some(bar) = bars.get(&progress.stage) {
                            if let (Some(current), Some(total)) = (progress.current, progress.total) {
                                if bar.length().is_none() {
                                    bar.set_style(Self::bar_style());
                                }
                                bar.set_length(total as u64);
                                bar.set_position(current as u64);
                            }
                            bar.set_message(progress.message.clone());
                        }
                    }
                    StageStatus::Complete => {
                        if let Some(bar) = bars.remove(&progress.stage) {
                            bar.finish_with_message(progress.message.clone());
                        }
                    }
                }
            }
            PipelineEvent::Confirm(request) => self.print_preview(request),
            PipelineEvent::Finished { .. } => {
                for (_, bar) in self.bars.lock().drain() {
                    bar.abandon();
                }
            }
            _ => {}
        }
    }
}

/// Reads checkpoint decisions from stdin, one per line
pub struct StdinDecisionSource {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for StdinDecisionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinDecisionSource {
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl DecisionSource for StdinDecisionSource {
    async fn next_decision(&self, request: &ConfirmRequest) -> Option<Decision> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    error!("Failed to read decision from stdin: {}", e);
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_decision_line(&line) {
                Ok(decision) => return Some(decision),
                Err(e) => warn!("Ignoring decision for {}: {}", request.checkpoint, e),
            }
        }
    }
}

/// Parse one operator line.
///
/// Accepts a JSON decision object, or `<action> [index] [lang=index ...]`,
/// e.g. `approve 1` or `approve ja=2 en=0`.
pub fn parse_decision_line(line: &str) -> Result<Decision> {
    let line = line.trim();
    if line.starts_with('{') {
        return serde_json::from_str(line).context("Invalid decision JSON");
    }

    let mut words = line.split_whitespace();
    let action: GateAction = words
        .next()
        .ok_or_else(|| anyhow!("Empty decision"))?
        .parse()?;
    let mut decision = Decision::new(action);
    for word in words {
        match word.split_once('=') {
            Some((code, index)) => {
                let language: MetaLanguage = code.parse()?;
                let index: usize = index
                    .parse()
                    .context(format!("Invalid option index: {}", index))?;
                decision = decision.with_language_choice(language, index);
            }
            None => {
                let index: usize = word
                    .parse()
                    .context(format!("Invalid option index: {}", word))?;
                decision = decision.with_selected_option(index);
            }
        }
    }
    Ok(decision)
}
