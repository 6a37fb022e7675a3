/*!
 * Job state.
 *
 * `JobState` is the mutable record of one run. Every mutator checks that the
 * job is still running, so a finished job is read-only: late writes from a
 * straggling task are rejected with `JobStateError::Terminal`.
 *
 * `JobHandle` is the shared owner the orchestrator and the batcher write
 * through. Observers only ever get snapshots.
 */

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ErrorKind, JobStateError, PipelineError};
use crate::models::{
    CharacterSpec, ImageBytes, ItemId, ItemStatus, LanguageOptions, MetadataOption, ProcessedImage,
    StickerIdea, Strategy, UserInput, WorkItem,
};
use crate::pipeline::export::ExportArtifact;
use crate::pipeline::reporter::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Steps of a run in their fixed order. Both character steps report the
/// `character-generation` stage tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ConceptAnalysis,
    BaseCharacter,
    StyleSelection,
    SpecExtraction,
    EmoteIdeation,
    StickerGeneration,
    PostProcessing,
    MetadataGeneration,
    Export,
}

impl PipelineStep {
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::ConceptAnalysis => Stage::ConceptAnalysis,
            Self::BaseCharacter | Self::SpecExtraction => Stage::CharacterGeneration,
            Self::StyleSelection => Stage::StyleSelection,
            Self::EmoteIdeation => Stage::EmoteIdeation,
            Self::StickerGeneration => Stage::StickerGeneration,
            Self::PostProcessing => Stage::PostProcessing,
            Self::MetadataGeneration => Stage::MetadataGeneration,
            Self::Export => Stage::Export,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub step: PipelineStep,
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Failure recorded on a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: Option<Stage>,
}

impl JobError {
    pub fn from_pipeline(error: &PipelineError, stage: Option<Stage>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            stage,
        }
    }
}

/// Per-status item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemCounts {
    pub pending: usize,
    pub loading: usize,
    pub done: usize,
    pub error: usize,
}

impl ItemCounts {
    pub fn total(&self) -> usize {
        self.pending + self.loading + self.done + self.error
    }

    pub fn settled(&self) -> usize {
        self.done + self.error
    }
}

/// The mutable record of one run
#[derive(Debug, Clone)]
pub struct JobState {
    pub id: Uuid,
    pub input: UserInput,
    pub status: JobStatus,
    pub current_stage: Option<Stage>,
    pub strategy: Option<Strategy>,
    pub base_image: Option<ImageBytes>,
    pub main_image: Option<ImageBytes>,
    pub character_spec: Option<CharacterSpec>,
    /// Bumped every time the character is swapped
    pub character_revision: u32,
    pub character_locked: bool,
    pub items: Vec<WorkItem>,
    pub processed: Vec<ProcessedImage>,
    pub metadata_candidates: Vec<LanguageOptions>,
    pub selected_metadata: Vec<MetadataOption>,
    pub exports: Vec<ExportArtifact>,
    pub transitions: Vec<StageTransition>,
    pub last_error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Read-only copy of a job handed to observers
pub type JobSnapshot = JobState;

impl JobState {
    pub fn new(input: UserInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            status: JobStatus::Running,
            current_stage: None,
            strategy: None,
            base_image: None,
            main_image: None,
            character_spec: None,
            character_revision: 0,
            character_locked: false,
            items: Vec::new(),
            processed: Vec::new(),
            metadata_candidates: Vec::new(),
            selected_metadata: Vec::new(),
            exports: Vec::new(),
            transitions: Vec::new(),
            last_error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn ensure_running(&self) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            Err(JobStateError::Terminal(self.status))
        } else {
            Ok(())
        }
    }

    /// Record entry into a step and move the current stage tag
    pub fn enter_step(&mut self, step: PipelineStep) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.current_stage = Some(step.stage());
        self.transitions.push(StageTransition {
            step,
            stage: step.stage(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Move the current stage tag without logging a transition
    pub fn set_stage(&mut self, stage: Stage) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.current_stage = Some(stage);
        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: Strategy) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.strategy = Some(strategy);
        Ok(())
    }

    pub fn set_base_image(&mut self, image: ImageBytes) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.base_image = Some(image);
        Ok(())
    }

    pub fn set_main_image(&mut self, image: ImageBytes) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.main_image = Some(image);
        Ok(())
    }

    pub fn set_character_spec(&mut self, spec: CharacterSpec) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.character_spec = Some(spec);
        Ok(())
    }

    /// Fail unless the character may still be swapped
    pub fn ensure_character_editable(&self) -> Result<(), JobStateError> {
        self.ensure_running()?;
        if self.character_locked || !self.items.is_empty() {
            return Err(JobStateError::CharacterLocked);
        }
        Ok(())
    }

    /// Freeze the character once its key visual is approved
    pub fn lock_character(&mut self) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.character_locked = true;
        Ok(())
    }

    /// Swap in a new character. Only allowed before the key visual is approved.
    pub fn replace_character(
        &mut self,
        base_image: Option<ImageBytes>,
        main_image: ImageBytes,
        spec: CharacterSpec,
    ) -> Result<(), JobStateError> {
        self.ensure_character_editable()?;
        self.base_image = base_image;
        self.main_image = Some(main_image);
        self.character_spec = Some(spec);
        self.character_revision += 1;
        Ok(())
    }

    /// Create the work items of the job. Ids must be unique and can only be
    /// assigned once.
    pub fn seed_items(&mut self, ideas: Vec<StickerIdea>) -> Result<Vec<ItemId>, JobStateError> {
        self.ensure_running()?;
        if !self.items.is_empty() {
            return Err(JobStateError::ItemsAlreadySeeded);
        }
        let mut seen = HashSet::with_capacity(ideas.len());
        for idea in &ideas {
            if !seen.insert(idea.id) {
                return Err(JobStateError::DuplicateItem(idea.id));
            }
        }
        self.items = ideas.into_iter().map(WorkItem::new).collect();
        Ok(self.item_ids())
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn item(&self, id: ItemId) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut WorkItem, JobStateError> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(JobStateError::UnknownItem(id))
    }

    fn transition(&mut self, id: ItemId, to: ItemStatus) -> Result<&mut WorkItem, JobStateError> {
        self.ensure_running()?;
        let item = self.item_mut(id)?;
        if !item.status.can_transition_to(to) {
            return Err(JobStateError::InvalidTransition {
                id,
                from: item.status,
                to,
            });
        }
        item.status = to;
        Ok(item)
    }

    /// Dispatch an item. Clears any previous payload or error.
    pub fn mark_loading(&mut self, id: ItemId) -> Result<(), JobStateError> {
        let item = self.transition(id, ItemStatus::Loading)?;
        item.payload = None;
        item.error = None;
        item.attempts += 1;
        Ok(())
    }

    pub fn mark_done(&mut self, id: ItemId, payload: ImageBytes) -> Result<(), JobStateError> {
        if payload.is_empty() {
            return Err(JobStateError::EmptyPayload(id));
        }
        let item = self.transition(id, ItemStatus::Done)?;
        item.payload = Some(payload);
        Ok(())
    }

    pub fn mark_error(
        &mut self,
        id: ItemId,
        message: impl Into<String>,
    ) -> Result<(), JobStateError> {
        let item = self.transition(id, ItemStatus::Error)?;
        item.payload = None;
        item.error = Some(message.into());
        Ok(())
    }

    /// Replace the image prompt of an item that is not in flight
    pub fn update_item_prompt(
        &mut self,
        id: ItemId,
        prompt: impl Into<String>,
    ) -> Result<(), JobStateError> {
        self.ensure_running()?;
        let item = self.item_mut(id)?;
        if item.status == ItemStatus::Loading {
            return Err(JobStateError::InvalidTransition {
                id,
                from: ItemStatus::Loading,
                to: ItemStatus::Loading,
            });
        }
        item.idea.image_prompt = prompt.into();
        Ok(())
    }

    /// Settle every in-flight item as failed
    pub fn abandon_in_flight(&mut self, reason: &str) -> Result<Vec<ItemId>, JobStateError> {
        self.ensure_running()?;
        let mut abandoned = Vec::new();
        for item in self.items.iter_mut().filter(|item| item.status == ItemStatus::Loading) {
            item.status = ItemStatus::Error;
            item.payload = None;
            item.error = Some(reason.to_string());
            abandoned.push(item.id);
        }
        Ok(abandoned)
    }

    pub fn set_processed(&mut self, processed: Vec<ProcessedImage>) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.processed = processed;
        Ok(())
    }

    pub fn set_metadata_candidates(
        &mut self,
        candidates: Vec<LanguageOptions>,
    ) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.metadata_candidates = candidates;
        self.selected_metadata.clear();
        Ok(())
    }

    pub fn select_metadata(&mut self, selected: Vec<MetadataOption>) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.selected_metadata = selected;
        Ok(())
    }

    pub fn add_export(&mut self, artifact: ExportArtifact) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.exports.push(artifact);
        Ok(())
    }

    /// Move the job to a terminal status. Happens exactly once.
    pub fn finish(
        &mut self,
        status: JobStatus,
        error: Option<JobError>,
    ) -> Result<(), JobStateError> {
        self.ensure_running()?;
        if !status.is_terminal() {
            return Err(JobStateError::NotTerminal(status));
        }
        self.status = status;
        self.last_error = error;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn counts(&self) -> ItemCounts {
        let mut counts = ItemCounts::default();
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Loading => counts.loading += 1,
                ItemStatus::Done => counts.done += 1,
                ItemStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn done_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter().filter(|item| item.is_done())
    }

    pub fn failed_item_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Error)
            .map(|item| item.id)
            .collect()
    }
}

/// Shared owner of a job's state
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<RwLock<JobState>>,
}

impl JobHandle {
    pub fn new(state: JobState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.read().id
    }

    pub fn status(&self) -> JobStatus {
        self.inner.read().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.read().clone()
    }

    /// Read a projection of the state without cloning all of it
    pub fn read<R>(&self, f: impl FnOnce(&JobState) -> R) -> R {
        f(&self.inner.read())
    }

    /// Short, non-awaiting critical section
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        f(&mut self.inner.write())
    }
}
