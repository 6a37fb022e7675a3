/*!
 * Progress reporting.
 *
 * The reporter is a stateless pass-through: the orchestrator, the batcher and
 * the confirmation gate hand it `PipelineEvent`s and it forwards them to every
 * registered `ProgressSink`. Sinks are fire-and-forget; a panicking sink is
 * contained and logged, never propagated into the run.
 */

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::errors::ErrorKind;
use crate::models::sticker::{ItemId, ItemStatus};
use crate::pipeline::gate::{Checkpoint, ConfirmRequest, GateAction};
use crate::pipeline::job::JobStatus;

/// Stage tags, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ConceptAnalysis,
    CharacterGeneration,
    StyleSelection,
    EmoteIdeation,
    StickerGeneration,
    PostProcessing,
    MetadataGeneration,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConceptAnalysis => "concept-analysis",
            Self::CharacterGeneration => "character-generation",
            Self::StyleSelection => "style-selection",
            Self::EmoteIdeation => "emote-ideation",
            Self::StickerGeneration => "sticker-generation",
            Self::PostProcessing => "post-processing",
            Self::MetadataGeneration => "metadata-generation",
            Self::Export => "export",
        }
    }

    /// Short label for human output
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConceptAnalysis => "Strategy",
            Self::CharacterGeneration => "Character",
            Self::StyleSelection => "Style Selection",
            Self::EmoteIdeation => "Emote Ideation",
            Self::StickerGeneration => "Sticker Generation",
            Self::PostProcessing => "Post Processing",
            Self::MetadataGeneration => "Metadata",
            Self::Export => "Export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Running,
    Complete,
}

/// Progress of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    pub message: String,
}

/// Everything a run publishes to its observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Confirm(ConfirmRequest),
    /// A checkpoint resolved to an action
    Resolved {
        checkpoint: Checkpoint,
        action: GateAction,
        auto_approved: bool,
    },
    /// An interactive decision was refused; the gate keeps waiting
    DecisionRejected {
        checkpoint: Checkpoint,
        reason: String,
    },
    ItemSettled {
        id: ItemId,
        status: ItemStatus,
    },
    Finished {
        job_id: String,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
    },
}

/// Receiver of pipeline events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Fans events out to the registered sinks
#[derive(Clone, Default)]
pub struct StageReporter {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl StageReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: PipelineEvent) {
        for sink in &self.sinks {
            let delivered = catch_unwind(AssertUnwindSafe(|| sink.emit(&event)));
            if delivered.is_err() {
                warn!("Progress sink panicked while handling an event; ignoring");
            }
        }
    }

    pub fn started(&self, stage: Stage, message: impl Into<String>) {
        self.progress(stage, StageStatus::Started, None, None, message);
    }

    pub fn running(&self, stage: Stage, current: usize, total: usize, message: impl Into<String>) {
        self.progress(stage, StageStatus::Running, Some(current), Some(total), message);
    }

    pub fn complete(&self, stage: Stage, message: impl Into<String>) {
        self.progress(stage, StageStatus::Complete, None, None, message);
    }

    fn progress(
        &self,
        stage: Stage,
        status: StageStatus,
        current: Option<usize>,
        total: Option<usize>,
        message: impl Into<String>,
    ) {
        self.emit(PipelineEvent::Progress(ProgressEvent {
            stage,
            status,
            current,
            total,
            message: message.into(),
        }));
    }
}

impl fmt::Debug for StageReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageReporter").field("sinks", &self.sinks.len()).finish()
    }
}

/// Writes events through the `log` facade
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Progress(progress) => match (progress.current, progress.total) {
                (Some(current), Some(total)) => info!(
                    "[{}] {} ({}/{})",
                    progress.stage.label(),
                    progress.message,
                    current,
                    total
                ),
                _ => info!("[{}] {}", progress.stage.label(), progress.message),
            },
            PipelineEvent::Confirm(request) => {
                info!("Checkpoint {}: {}", request.checkpoint, request.message)
            }
            PipelineEvent::Resolved {
                checkpoint,
                action,
                auto_approved,
            } => {
                let suffix = if *auto_approved { " (auto)" } else { "" };
                info!("Checkpoint {} resolved: {}{}", checkpoint, action, suffix)
            }
            PipelineEvent::DecisionRejected { checkpoint, reason } => {
                warn!("Decision refused at {}: {}", checkpoint, reason)
            }
            PipelineEvent::ItemSettled { id, status } => {
                debug!("Sticker {} settled as {}", id, status)
            }
            PipelineEvent::Finished { job_id, status, .. } => {
                info!("Job {} finished: {}", job_id, status)
            }
        }
    }
}

/// Writes one JSON object per event to stdout
#[derive(Debug, Default)]
pub struct NdjsonSink;

impl ProgressSink for NdjsonSink {
    fn emit(&self, event: &PipelineEvent) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
                let _ = stdout.flush();
            }
            Err(e) => warn!("Failed to serialize pipeline event: {}", e),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Progress(progress) => Some(progress.clone()),
                _ => None,
            })
            .collect()
    }

    /// Stages that reported `started`, in order
    pub fn started_stages(&self) -> Vec<Stage> {
        self.progress_events()
            .into_iter()
            .filter(|p| p.status == StageStatus::Started)
            .map(|p| p.stage)
            .collect()
    }

    pub fn confirm_requests(&self) -> Vec<ConfirmRequest> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Confirm(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
    }
}
