/*!
 * Confirmation checkpoints.
 *
 * After the key visual, post-processing and metadata phases the run stops at
 * a checkpoint. In `auto` mode the gate approves immediately (selecting the
 * first metadata option of every language). In `interactive` mode it emits a
 * `ConfirmRequest` and waits for a `DecisionSource` to produce a valid
 * decision. Invalid actions and out-of-range selections are refused and the
 * gate keeps waiting; there is no timeout. Cancellation abandons the wait.
 */

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::language_utils::MetaLanguage;
use crate::models::{
    CharacterSpec, ImageBytes, LanguageOptions, ProcessedImage, ProcessingOptions, Strategy,
    image_base64,
};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::reporter::{PipelineEvent, StageReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    KeyVisual,
    PostProcess,
    Metadata,
}

impl Checkpoint {
    pub fn allowed_actions(&self) -> &'static [GateAction] {
        match self {
            Self::KeyVisual => &[GateAction::Approve, GateAction::Reject, GateAction::Regenerate],
            Self::PostProcess => &[GateAction::Approve, GateAction::Reject, GateAction::Reprocess],
            Self::Metadata => &[GateAction::Approve, GateAction::Reject, GateAction::Regenerate],
        }
    }

    pub fn allows(&self, action: GateAction) -> bool {
        self.allowed_actions().contains(&action)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyVisual => "key_visual",
            Self::PostProcess => "post_process",
            Self::Metadata => "metadata",
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            Self::KeyVisual => "Review the main character image and specification",
            Self::PostProcess => "Review the post-processed stickers",
            Self::Metadata => "Choose one metadata option per language",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Approve,
    Reject,
    Regenerate,
    Reprocess,
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Regenerate => "regenerate",
            Self::Reprocess => "reprocess",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for GateAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "a" | "y" | "yes" => Ok(Self::Approve),
            "reject" | "r" | "n" | "no" => Ok(Self::Reject),
            "regenerate" | "regen" => Ok(Self::Regenerate),
            "reprocess" => Ok(Self::Reprocess),
            other => Err(anyhow::anyhow!("Unknown checkpoint action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    #[default]
    Auto,
    Interactive,
}

/// What the operator is shown at a checkpoint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointPreview {
    KeyVisual {
        #[serde(with = "image_base64")]
        main_image: ImageBytes,
        character_spec: CharacterSpec,
        strategy: Strategy,
    },
    PostProcess {
        images: Vec<ProcessedImage>,
        options: ProcessingOptions,
    },
    Metadata {
        candidates: Vec<LanguageOptions>,
    },
}

impl CheckpointPreview {
    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Self::KeyVisual { .. } => Checkpoint::KeyVisual,
            Self::PostProcess { .. } => Checkpoint::PostProcess,
            Self::Metadata { .. } => Checkpoint::Metadata,
        }
    }
}

/// Structured request emitted when a checkpoint is reached
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmRequest {
    pub checkpoint: Checkpoint,
    pub message: String,
    pub preview: CheckpointPreview,
    pub allowed_actions: Vec<GateAction>,
    pub awaiting_input: bool,
    pub auto_approved: bool,
}

impl ConfirmRequest {
    pub fn new(preview: CheckpointPreview, mode: ConfirmMode) -> Self {
        let checkpoint = preview.checkpoint();
        let auto = mode == ConfirmMode::Auto;
        Self {
            checkpoint,
            message: checkpoint.prompt().to_string(),
            preview,
            allowed_actions: checkpoint.allowed_actions().to_vec(),
            awaiting_input: !auto,
            auto_approved: auto,
        }
    }
}

/// An operator decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: GateAction,
    /// Option index applied to every language at the metadata checkpoint
    #[serde(default, alias = "selectedOption", skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<usize>,
    /// Explicit per-language choice; wins over `selected_option`
    #[serde(default, alias = "perLanguage", skip_serializing_if = "Option::is_none")]
    pub per_language: Option<BTreeMap<MetaLanguage, usize>>,
}

impl Decision {
    pub fn new(action: GateAction) -> Self {
        Self {
            action,
            selected_option: None,
            per_language: None,
        }
    }

    pub fn approve() -> Self {
        Self::new(GateAction::Approve)
    }

    pub fn reject() -> Self {
        Self::new(GateAction::Reject)
    }

    pub fn with_selected_option(mut self, index: usize) -> Self {
        self.selected_option = Some(index);
        self
    }

    pub fn with_language_choice(mut self, language: MetaLanguage, index: usize) -> Self {
        self.per_language.get_or_insert_with(BTreeMap::new).insert(language, index);
        self
    }
}

/// How a checkpoint was resolved
#[derive(Debug, Clone, PartialEq)]
pub struct GateResolution {
    pub checkpoint: Checkpoint,
    pub action: GateAction,
    /// Chosen option index per language; only filled when approving metadata
    pub selections: Vec<(MetaLanguage, usize)>,
    pub auto_approved: bool,
}

/// Supplies decisions in interactive mode
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Next decision for `request`; `None` once the source is closed
    async fn next_decision(&self, request: &ConfirmRequest) -> Option<Decision>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    AwaitingDecision,
    Resolved(GateResolution),
}

/// A checkpoint waiting for its decision
#[derive(Debug)]
pub struct PendingConfirmation {
    request: ConfirmRequest,
    state: GateState,
}

impl PendingConfirmation {
    pub fn new(request: ConfirmRequest) -> Self {
        Self {
            request,
            state: GateState::AwaitingDecision,
        }
    }

    pub fn request(&self) -> &ConfirmRequest {
        &self.request
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Apply a decision. A refused decision leaves the state untouched.
    pub fn submit(
        &mut self,
        decision: Decision,
        auto: bool,
    ) -> Result<GateResolution, PipelineError> {
        if let GateState::Resolved(resolution) = &self.state {
            return Ok(resolution.clone());
        }

        let checkpoint = self.request.checkpoint;
        if !checkpoint.allows(decision.action) {
            return Err(PipelineError::InvalidCheckpointAction {
                checkpoint,
                action: decision.action,
            });
        }

        let selections = match (&self.request.preview, decision.action) {
            (CheckpointPreview::Metadata { candidates }, GateAction::Approve) => {
                resolve_selections(candidates, &decision)?
            }
            _ => Vec::new(),
        };

        let resolution = GateResolution {
            checkpoint,
            action: decision.action,
            selections,
            auto_approved: auto,
        };
        self.state = GateState::Resolved(resolution.clone());
        Ok(resolution)
    }
}

fn resolve_selections(
    candidates: &[LanguageOptions],
    decision: &Decision,
) -> Result<Vec<(MetaLanguage, usize)>, PipelineError> {
    if let Some(per_language) = &decision.per_language {
        if let Some(unknown) = per_language
            .keys()
            .find(|lang| !candidates.iter().any(|c| c.language == **lang))
        {
            return Err(PipelineError::InvalidSelection(format!(
                "no metadata was generated for {}",
                unknown
            )));
        }
    }

    let default_index = decision.selected_option.unwrap_or(0);
    candidates
        .iter()
        .map(|candidate| {
            let index = decision
                .per_language
                .as_ref()
                .and_then(|choices| choices.get(&candidate.language))
                .copied()
                .unwrap_or(default_index);
            if index >= candidate.options.len() {
                return Err(PipelineError::InvalidSelection(format!(
                    "option {} is out of range for {} ({} available)",
                    index,
                    candidate.language,
                    candidate.options.len()
                )));
            }
            Ok((candidate.language, index))
        })
        .collect()
}

/// Resolves checkpoints according to the confirm mode
#[derive(Clone)]
pub struct ConfirmationGate {
    mode: ConfirmMode,
    reporter: StageReporter,
    source: Option<Arc<dyn DecisionSource>>,
}

impl ConfirmationGate {
    pub fn new(mode: ConfirmMode, reporter: StageReporter) -> Self {
        Self {
            mode,
            reporter,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DecisionSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn mode(&self) -> ConfirmMode {
        self.mode
    }

    pub async fn confirm(
        &self,
        preview: CheckpointPreview,
        cancel: &CancellationToken,
    ) -> Result<GateResolution, PipelineError> {
        cancel.check()?;
        let request = ConfirmRequest::new(preview, self.mode);
        let checkpoint = request.checkpoint;
        self.reporter.emit(PipelineEvent::Confirm(request.clone()));
        let mut pending = PendingConfirmation::new(request);

        let resolution = match self.mode {
            ConfirmMode::Auto => pending.submit(Decision::approve(), true)?,
            ConfirmMode::Interactive => {
                let source = self
                    .source
                    .as_ref()
                    .ok_or(PipelineError::DecisionSourceClosed(checkpoint))?;
                loop {
                    let decision = tokio::select! {
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        decision = source.next_decision(pending.request()) => decision,
                    };
                    let Some(decision) = decision else {
                        return Err(PipelineError::DecisionSourceClosed(checkpoint));
                    };
                    match pending.submit(decision, false) {
                        Ok(resolution) => break resolution,
                        Err(e) => {
                            warn!("Refusing decision at {}: {}", checkpoint, e);
                            self.reporter.emit(PipelineEvent::DecisionRejected {
                                checkpoint,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        };

        debug!("Checkpoint {} resolved with {}", checkpoint, resolution.action);
        self.reporter.emit(PipelineEvent::Resolved {
            checkpoint,
            action: resolution.action,
            auto_approved: resolution.auto_approved,
        });
        Ok(resolution)
    }
}

impl fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("mode", &self.mode)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
