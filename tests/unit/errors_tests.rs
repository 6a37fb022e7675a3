/*!
 * Tests for error classification
 */

use std::error::Error;

use stickerflow::errors::{
    ErrorKind, ExportError, ImageOpsError, JobStateError, PipelineError, ProviderError,
};
use stickerflow::pipeline::gate::{Checkpoint, GateAction};
use stickerflow::pipeline::job::JobStatus;
use stickerflow::pipeline::reporter::Stage;

#[test]
fn test_pipelineError_kind_shouldClassifyEveryVariant() {
    let cases = vec![
        (PipelineError::Cancelled, ErrorKind::Cancelled),
        (
            PipelineError::FatalGeneration {
                stage: Stage::ConceptAnalysis,
                source: ProviderError::EmptyResponse("no candidates".into()),
            },
            ErrorKind::FatalGenerationFailure,
        ),
        (PipelineError::NothingToProcess, ErrorKind::FatalGenerationFailure),
        (
            PipelineError::InvalidCheckpointAction {
                checkpoint: Checkpoint::KeyVisual,
                action: GateAction::Reprocess,
            },
            ErrorKind::InvalidCheckpointAction,
        ),
        (PipelineError::InvalidSelection("x".into()), ErrorKind::InvalidSelection),
        (
            PipelineError::from(ImageOpsError::Transform { id: 1, message: "bad".into() }),
            ErrorKind::ProcessingFailure,
        ),
        (PipelineError::from(ExportError::NothingToExport), ErrorKind::ExportFailure),
        (
            PipelineError::DecisionSourceClosed(Checkpoint::Metadata),
            ErrorKind::DecisionSourceClosed,
        ),
        (
            PipelineError::from(JobStateError::Terminal(JobStatus::Completed)),
            ErrorKind::InvalidState,
        ),
    ];
    for (error, kind) in cases {
        assert_eq!(error.kind(), kind, "{}", error);
    }
}

#[test]
fn test_fatalGeneration_shouldExposeProviderSource() {
    let error = PipelineError::FatalGeneration {
        stage: Stage::MetadataGeneration,
        source: ProviderError::RateLimitExceeded("slow down".into()),
    };
    assert!(error.source().is_some());
    assert!(error.to_string().contains("slow down"));
}

#[test]
fn test_errorKind_serialization_shouldUseSnakeCase() {
    let json = serde_json::to_string(&ErrorKind::FatalGenerationFailure).unwrap();
    assert_eq!(json, "\"fatal_generation_failure\"");
    assert!(ErrorKind::FatalGenerationFailure.retryable());
    assert!(!ErrorKind::Cancelled.retryable());
}

#[test]
fn test_errorKind_itemGenerationFailure_shouldBeRetryable() {
    let json = serde_json::to_string(&ErrorKind::ItemGenerationFailure).unwrap();
    assert_eq!(json, "\"item_generation_failure\"");
    assert!(ErrorKind::ItemGenerationFailure.retryable());
    assert!(!ErrorKind::InvalidState.retryable());
}
