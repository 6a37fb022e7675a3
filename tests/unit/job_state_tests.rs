/*!
 * Tests for job state transitions
 */

use stickerflow::errors::JobStateError;
use stickerflow::models::{ImageBytes, ItemStatus};
use stickerflow::pipeline::job::{JobState, JobStatus, PipelineStep};
use stickerflow::pipeline::reporter::Stage;

use crate::common::{fixture_idea, fixture_input};

fn seeded(count: u32) -> JobState {
    let mut state = JobState::new(fixture_input());
    state.seed_items((1..=count).map(fixture_idea).collect()).unwrap();
    state
}

#[test]
fn test_itemLifecycle_pendingLoadingDone_shouldStorePayload() {
    let mut state = seeded(1);
    state.mark_loading(1).unwrap();
    assert_eq!(state.item(1).unwrap().status, ItemStatus::Loading);
    state.mark_done(1, ImageBytes::from_static(b"png")).unwrap();

    let item = state.item(1).unwrap();
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.payload.as_deref(), Some(&b"png"[..]));
    assert_eq!(item.attempts, 1);
}

#[test]
fn test_markDone_withEmptyPayload_shouldBeRejected() {
    let mut state = seeded(1);
    state.mark_loading(1).unwrap();
    assert_eq!(
        state.mark_done(1, ImageBytes::new()),
        Err(JobStateError::EmptyPayload(1))
    );
}

#[test]
fn test_markDone_fromPending_shouldBeInvalidTransition() {
    let mut state = seeded(1);
    assert!(matches!(
        state.mark_done(1, ImageBytes::from_static(b"png")),
        Err(JobStateError::InvalidTransition { id: 1, .. })
    ));
}

#[test]
fn test_markLoading_afterError_shouldClearPreviousError() {
    let mut state = seeded(1);
    state.mark_loading(1).unwrap();
    state.mark_error(1, "boom").unwrap();
    state.mark_loading(1).unwrap();

    let item = state.item(1).unwrap();
    assert!(item.error.is_none());
    assert_eq!(item.attempts, 2);
}

#[test]
fn test_markLoading_whileLoading_shouldBeRejected() {
    let mut state = seeded(1);
    state.mark_loading(1).unwrap();
    assert!(state.mark_loading(1).is_err());
}

#[test]
fn test_updateItemPrompt_whileLoading_shouldBeRejected() {
    let mut state = seeded(1);
    state.mark_loading(1).unwrap();
    assert!(state.update_item_prompt(1, "new prompt").is_err());
}

#[test]
fn test_unknownItem_shouldBeReported() {
    let mut state = seeded(1);
    assert_eq!(state.mark_loading(9), Err(JobStateError::UnknownItem(9)));
}

#[test]
fn test_seedItems_twice_shouldBeRejected() {
    let mut state = seeded(2);
    assert_eq!(
        state.seed_items(vec![fixture_idea(3)]),
        Err(JobStateError::ItemsAlreadySeeded)
    );
}

#[test]
fn test_finish_shouldBeSticky() {
    let mut state = seeded(1);
    state.finish(JobStatus::Cancelled, None).unwrap();

    assert_eq!(state.finish(JobStatus::Completed, None), Err(JobStateError::Terminal(JobStatus::Cancelled)));
    assert!(state.enter_step(PipelineStep::Export).is_err());
    assert!(state.mark_loading(1).is_err());
    assert_eq!(state.status, JobStatus::Cancelled);
    assert!(state.finished_at.is_some());
}

#[test]
fn test_finish_withRunningStatus_shouldBeRejected() {
    let mut state = seeded(0);
    assert_eq!(
        state.finish(JobStatus::Running, None),
        Err(JobStateError::NotTerminal(JobStatus::Running))
    );
}

#[test]
fn test_abandonInFlight_shouldSettleOnlyLoadingItems() {
    let mut state = seeded(3);
    state.mark_loading(1).unwrap();
    state.mark_loading(2).unwrap();
    state.mark_done(2, ImageBytes::from_static(b"png")).unwrap();

    let abandoned = state.abandon_in_flight("cancelled").unwrap();

    assert_eq!(abandoned, vec![1]);
    let counts = state.counts();
    assert_eq!((counts.pending, counts.loading, counts.done, counts.error), (1, 0, 1, 1));
}

#[test]
fn test_enterStep_shouldRecordOrderedTransitions() {
    let mut state = seeded(0);
    state.enter_step(PipelineStep::ConceptAnalysis).unwrap();
    state.enter_step(PipelineStep::BaseCharacter).unwrap();
    state.enter_step(PipelineStep::StyleSelection).unwrap();

    let stages: Vec<Stage> = state.transitions.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::ConceptAnalysis, Stage::CharacterGeneration, Stage::StyleSelection]
    );
    assert_eq!(state.current_stage, Some(Stage::StyleSelection));
}

#[test]
fn test_setMetadataCandidates_shouldClearSelection() {
    let mut state = seeded(0);
    state.select_metadata(Vec::new()).unwrap();
    state.set_metadata_candidates(Vec::new()).unwrap();
    assert!(state.selected_metadata.is_empty());
}

#[test]
fn test_lockCharacter_shouldBlockEditsAndRequireRunningJob() {
    let mut state = JobState::new(fixture_input());
    assert!(state.ensure_character_editable().is_ok());

    state.lock_character().unwrap();
    assert!(state.character_locked);
    assert_eq!(state.ensure_character_editable(), Err(JobStateError::CharacterLocked));

    state.finish(JobStatus::Cancelled, None).unwrap();
    assert_eq!(
        state.lock_character(),
        Err(JobStateError::Terminal(JobStatus::Cancelled))
    );
}
