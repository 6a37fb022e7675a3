/*!
 * Staged generation pipeline.
 *
 * - `orchestrator`: sequences the stages of a job
 * - `job`: job state and its single-owner handle
 * - `batcher`: rate limited fan-out of sticker generation
 * - `gate`: human confirmation checkpoints
 * - `reporter`: progress events and sinks
 * - `cancellation`: cooperative cancellation token
 * - `imaging`: post-processing transform seam
 * - `export`: platform export
 */

pub mod batcher;
pub mod cancellation;
pub mod export;
pub mod gate;
pub mod imaging;
pub mod job;
pub mod orchestrator;
pub mod reporter;

pub use batcher::{BatchConfig, BatchSummary, ItemWork, RateLimitedBatcher};
pub use cancellation::{CancellationToken, SleepOutcome};
pub use export::{DirectoryExporter, ExportArtifact, ExportBundle, Exporter};
pub use gate::{
    Checkpoint, CheckpointPreview, ConfirmMode, ConfirmRequest, ConfirmationGate, Decision,
    DecisionSource, GateAction, GateResolution, PendingConfirmation,
};
pub use imaging::{ImageOps, PassthroughImageOps};
pub use job::{JobHandle, JobSnapshot, JobState, JobStatus, PipelineStep};
pub use orchestrator::{PipelineConfig, PipelineOrchestrator};
pub use reporter::{
    CollectingSink, LogSink, NdjsonSink, PipelineEvent, ProgressEvent, ProgressSink, Stage,
    StageReporter, StageStatus,
};
