/*!
 * Error types for the stickerflow application.
 *
 * Errors are split by layer: the generation collaborator reports
 * `ProviderError`, job bookkeeping reports `JobStateError`, and the
 * orchestrator folds everything into `PipelineError`, whose `kind()` is what
 * gets recorded on a finished job.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::sticker::{ItemId, ItemStatus};
use crate::pipeline::gate::{Checkpoint, GateAction};
use crate::pipeline::job::JobStatus;
use crate::pipeline::reporter::Stage;

/// Errors that can occur when talking to a generation service
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The service answered but produced nothing usable
    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

impl ProviderError {
    /// Whether a retry of the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Rejected mutation of a job record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobStateError {
    #[error("job already finished with status {0}")]
    Terminal(JobStatus),

    #[error("unknown work item {0}")]
    UnknownItem(ItemId),

    #[error("duplicate work item id {0}")]
    DuplicateItem(ItemId),

    #[error("work items were already created for this job")]
    ItemsAlreadySeeded,

    #[error("work item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("work item {0} settled with an empty payload")]
    EmptyPayload(ItemId),

    #[error("the character is locked once the key visual is approved or stickers exist")]
    CharacterLocked,

    #[error("{0} is not available yet")]
    MissingArtifact(&'static str),

    #[error("cannot finish a job with non-terminal status {0}")]
    NotTerminal(JobStatus),
}

/// Failure of the image transform collaborator
#[derive(Error, Debug, Clone)]
pub enum ImageOpsError {
    #[error("image {id} could not be processed: {message}")]
    Transform { id: ItemId, message: String },
}

/// Failure of the packaging collaborator
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing to export")]
    NothingToExport,

    #[error("failed to write export files: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serializable classification of a run failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Cancelled,
    FatalGenerationFailure,
    /// Recorded on the sticker itself; never ends a run
    ItemGenerationFailure,
    InvalidCheckpointAction,
    InvalidSelection,
    ProcessingFailure,
    ExportFailure,
    DecisionSourceClosed,
    InvalidState,
}

impl ErrorKind {
    /// Whether running the same job again could plausibly succeed
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::FatalGenerationFailure | Self::ItemGenerationFailure | Self::ExportFailure
        )
    }
}

/// Errors produced while driving a job through its stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline cancelled")]
    Cancelled,

    #[error("{0} checkpoint was rejected")]
    Rejected(Checkpoint),

    #[error("{stage} failed: {source}")]
    FatalGeneration {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("action {action} is not allowed at the {checkpoint} checkpoint")]
    InvalidCheckpointAction {
        checkpoint: Checkpoint,
        action: GateAction,
    },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("post-processing failed: {0}")]
    Processing(#[from] ImageOpsError),

    #[error("no generated stickers to post-process")]
    NothingToProcess,

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("decision source closed while waiting at the {0} checkpoint")]
    DecisionSourceClosed(Checkpoint),

    #[error("invalid job state: {0}")]
    State(#[from] JobStateError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled | Self::Rejected(_) => ErrorKind::Cancelled,
            Self::FatalGeneration { .. } | Self::NothingToProcess => {
                ErrorKind::FatalGenerationFailure
            }
            Self::InvalidCheckpointAction { .. } => ErrorKind::InvalidCheckpointAction,
            Self::InvalidSelection(_) => ErrorKind::InvalidSelection,
            Self::Processing(_) => ErrorKind::ProcessingFailure,
            Self::Export(_) => ErrorKind::ExportFailure,
            Self::DecisionSourceClosed(_) => ErrorKind::DecisionSourceClosed,
            Self::State(_) => ErrorKind::InvalidState,
        }
    }

    /// Cancellation and checkpoint rejection end a run as cancelled, not failed
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
