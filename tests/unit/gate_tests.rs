/*!
 * Tests for confirmation checkpoints
 */

use std::sync::Arc;
use std::time::Duration;

use stickerflow::errors::PipelineError;
use stickerflow::language_utils::MetaLanguage;
use stickerflow::models::{Evaluation, LanguageOptions, MetadataOption, MetadataOptionType, ProcessingOptions};
use stickerflow::pipeline::cancellation::CancellationToken;
use stickerflow::pipeline::gate::{
    Checkpoint, CheckpointPreview, ConfirmMode, ConfirmationGate, Decision, GateAction,
};
use stickerflow::pipeline::reporter::{CollectingSink, PipelineEvent, StageReporter};

use crate::common::{ParkedDecisions, ScriptedDecisions};

fn candidates(languages: &[MetaLanguage]) -> Vec<LanguageOptions> {
    languages
        .iter()
        .map(|language| LanguageOptions {
            language: *language,
            options: [
                MetadataOptionType::Personality,
                MetadataOptionType::Utility,
                MetadataOptionType::Creative,
            ]
            .into_iter()
            .map(|option_type| MetadataOption {
                language: *language,
                option_type,
                title: format!("{} title", option_type),
                description: "description".to_string(),
                tags: vec!["cat".to_string()],
                evaluation: Evaluation {
                    naturalness: 4.0,
                    tone: 4.0,
                    searchability: 4.0,
                    creativity: 4.0,
                },
                reasoning: "fits".to_string(),
            })
            .collect(),
        })
        .collect()
}

fn post_process_preview() -> CheckpointPreview {
    CheckpointPreview::PostProcess {
        images: Vec::new(),
        options: ProcessingOptions::default(),
    }
}

fn gate(mode: ConfirmMode) -> (ConfirmationGate, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    (ConfirmationGate::new(mode, StageReporter::new().with_sink(sink.clone())), sink)
}

#[tokio::test]
async fn test_confirm_autoMode_shouldApproveWithDefaultSelection() {
    let (gate, sink) = gate(ConfirmMode::Auto);
    let preview = CheckpointPreview::Metadata {
        candidates: candidates(&[MetaLanguage::Ko, MetaLanguage::En]),
    };

    let resolution = gate.confirm(preview, &CancellationToken::new()).await.unwrap();

    assert_eq!(resolution.action, GateAction::Approve);
    assert!(resolution.auto_approved);
    assert_eq!(resolution.selections, vec![(MetaLanguage::Ko, 0), (MetaLanguage::En, 0)]);

    let requests = sink.confirm_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].auto_approved);
    assert!(!requests[0].awaiting_input);
}

#[tokio::test]
async fn test_confirm_interactive_invalidActionShouldKeepWaiting() {
    let source = ScriptedDecisions::new([
        Decision::new(GateAction::Regenerate),
        Decision::new(GateAction::Reprocess),
    ]);
    let (gate, sink) = gate(ConfirmMode::Interactive);
    let gate = gate.with_source(source.clone());

    let resolution = gate
        .confirm(post_process_preview(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolution.action, GateAction::Reprocess);
    assert!(!resolution.auto_approved);
    assert_eq!(source.seen(), vec![Checkpoint::PostProcess, Checkpoint::PostProcess]);
    let refused = sink
        .events()
        .iter()
        .filter(|event| matches!(event, PipelineEvent::DecisionRejected { .. }))
        .count();
    assert_eq!(refused, 1);
}

#[tokio::test]
async fn test_confirm_interactive_outOfRangeSelectionShouldKeepWaiting() {
    let source = ScriptedDecisions::new([
        Decision::approve().with_selected_option(7),
        Decision::approve().with_language_choice(MetaLanguage::Ja, 2),
    ]);
    let (gate, _) = gate(ConfirmMode::Interactive);
    let gate = gate.with_source(source);
    let preview = CheckpointPreview::Metadata {
        candidates: candidates(&[MetaLanguage::Ja]),
    };

    let resolution = gate.confirm(preview, &CancellationToken::new()).await.unwrap();

    assert_eq!(resolution.selections, vec![(MetaLanguage::Ja, 2)]);
}

#[tokio::test]
async fn test_confirm_interactive_closedSourceShouldFail() {
    let (gate, _) = gate(ConfirmMode::Interactive);
    let gate = gate.with_source(ScriptedDecisions::new([]));

    let result = gate.confirm(post_process_preview(), &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(PipelineError::DecisionSourceClosed(Checkpoint::PostProcess))
    ));
}

#[tokio::test]
async fn test_confirm_interactiveWithoutSource_shouldFail() {
    let (gate, _) = gate(ConfirmMode::Interactive);
    let result = gate.confirm(post_process_preview(), &CancellationToken::new()).await;
    assert!(matches!(result, Err(PipelineError::DecisionSourceClosed(_))));
}

#[tokio::test(start_paused = true)]
async fn test_confirm_cancelledWhileWaiting_shouldReturnCancelled() {
    let source = ParkedDecisions::new([Decision::approve()]);
    let (gate, sink) = gate(ConfirmMode::Interactive);
    let gate = gate.with_source(source);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        trigger.cancel();
    });

    let result = gate.confirm(post_process_preview(), &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(
        !sink
            .events()
            .iter()
            .any(|event| matches!(event, PipelineEvent::Resolved { .. }))
    );
}

#[tokio::test]
async fn test_confirm_alreadyCancelled_shouldNotEmitRequest() {
    let (gate, sink) = gate(ConfirmMode::Auto);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = gate.confirm(post_process_preview(), &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(sink.confirm_requests().is_empty());
}

#[test]
fn test_checkpoint_allowedActions_shouldMatchCheckpoint() {
    assert!(Checkpoint::KeyVisual.allows(GateAction::Regenerate));
    assert!(!Checkpoint::KeyVisual.allows(GateAction::Reprocess));
    assert!(Checkpoint::PostProcess.allows(GateAction::Reprocess));
    assert!(!Checkpoint::PostProcess.allows(GateAction::Regenerate));
    assert!(Checkpoint::Metadata.allows(GateAction::Regenerate));
    for checkpoint in [Checkpoint::KeyVisual, Checkpoint::PostProcess, Checkpoint::Metadata] {
        assert!(checkpoint.allows(GateAction::Approve));
        assert!(checkpoint.allows(GateAction::Reject));
    }
}
