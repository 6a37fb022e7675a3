/*!
 * Tests for the rate limited batcher
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use stickerflow::errors::{PipelineError, ProviderError};
use stickerflow::models::{ImageBytes, ItemId, ItemStatus};
use stickerflow::pipeline::batcher::{BatchConfig, ItemWork, RateLimitedBatcher};
use stickerflow::pipeline::cancellation::CancellationToken;
use stickerflow::pipeline::job::JobHandle;
use stickerflow::pipeline::reporter::{
    CollectingSink, PipelineEvent, Stage, StageReporter, StageStatus,
};
use stickerflow::providers::GenerationService;
use stickerflow::providers::mock::MockGenerator;

use crate::common::{fixture_idea, fixture_spec, seeded_job};

/// Generates fixture stickers through the mock
struct MockWork(MockGenerator);

#[async_trait]
impl ItemWork for MockWork {
    async fn run(&self, id: ItemId) -> Result<ImageBytes, ProviderError> {
        self.0
            .generate_one(&fixture_idea(id), &ImageBytes::from_static(b"png:main"), &fixture_spec())
            .await
    }
}

fn work(mock: &MockGenerator) -> Arc<dyn ItemWork> {
    Arc::new(MockWork(mock.clone()))
}

fn batcher(max_concurrency: usize, delay: Duration) -> (RateLimitedBatcher, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let reporter = StageReporter::new().with_sink(sink.clone());
    (RateLimitedBatcher::new(BatchConfig::new(max_concurrency, delay), reporter), sink)
}

fn statuses(job: &JobHandle) -> Vec<ItemStatus> {
    job.read(|state| state.items.iter().map(|item| item.status).collect())
}

#[tokio::test(start_paused = true)]
async fn test_run_fortyFiveItemsWithTwoFailures_shouldSettleEveryItem() {
    let job = seeded_job(45);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().failing_items([7, 30]);
    let (batcher, sink) = batcher(3, Duration::from_secs(10));

    let summary = batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.groups, 15);
    assert_eq!(summary.settled, 45);
    assert_eq!(summary.succeeded, 43);
    assert_eq!(summary.failed, 2);

    let counts = job.read(|state| state.counts());
    assert_eq!(counts.done, 43);
    assert_eq!(counts.error, 2);
    assert_eq!(counts.pending + counts.loading, 0);
    assert_eq!(job.read(|state| state.failed_item_ids()), vec![7, 30]);

    let settled_events = sink
        .events()
        .iter()
        .filter(|event| matches!(event, PipelineEvent::ItemSettled { .. }))
        .count();
    assert_eq!(settled_events, 45);
}

#[tokio::test(start_paused = true)]
async fn test_run_groups_shouldBeSeparatedByInterBatchDelay() {
    let job = seeded_job(9);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().with_latency(Duration::from_secs(2));
    let (batcher, _) = batcher(3, Duration::from_secs(10));

    let summary = batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.group_timings.len(), 3);
    for pair in summary.group_timings.windows(2) {
        assert!(pair[1].started >= pair[0].settled + Duration::from_secs(10));
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_shouldNeverExceedMaxConcurrency() {
    let job = seeded_job(10);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().with_latency(Duration::from_secs(1));
    let (batcher, _) = batcher(4, Duration::ZERO);

    batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.peak_concurrency(), 4);
}

#[tokio::test]
async fn test_run_withEmptyInput_shouldReturnImmediately() {
    let job = seeded_job(0);
    let mock = MockGenerator::new();
    let (batcher, sink) = batcher(3, Duration::from_secs(10));

    let summary = batcher
        .run(&job, &[], work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 0);
    assert_eq!(summary.groups, 0);
    assert_eq!(mock.call_count(stickerflow::providers::mock::MockStage::Sticker), 0);
    let progress = sink.progress_events();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].stage, Stage::StickerGeneration);
    assert_eq!(progress[0].status, StageStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_run_singleGroup_shouldNotSleep() {
    let job = seeded_job(2);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new();
    let (batcher, _) = batcher(3, Duration::from_secs(10));

    let started = tokio::time::Instant::now();
    let summary = batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.groups, 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_run_cancelledDuringDelay_shouldLeaveLaterItemsPending() {
    let job = seeded_job(9);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new();
    let (batcher, _) = batcher(3, Duration::from_secs(10));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let result = batcher.run(&job, &ids, work(&mock), &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    let statuses = statuses(&job);
    assert!(statuses[..6].iter().all(|s| *s == ItemStatus::Done));
    assert!(statuses[6..].iter().all(|s| *s == ItemStatus::Pending));
    assert_eq!(mock.call_count(stickerflow::providers::mock::MockStage::Sticker), 6);
}

#[tokio::test(start_paused = true)]
async fn test_run_cancelledDuringGroup_shouldNotLeaveItemsLoading() {
    let job = seeded_job(6);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().with_latency(Duration::from_secs(5));
    let (batcher, _) = batcher(3, Duration::from_secs(10));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let result = batcher.run(&job, &ids, work(&mock), &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    let counts = job.read(|state| state.counts());
    assert_eq!(counts.loading, 0);
    assert_eq!(counts.error, 3);
    assert_eq!(counts.pending, 3);
}

#[tokio::test]
async fn test_run_panickingItem_shouldOnlyFailThatItem() {
    let job = seeded_job(3);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().panicking_items([2]);
    let (batcher, _) = batcher(3, Duration::ZERO);

    let summary = batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(
        statuses(&job),
        vec![ItemStatus::Done, ItemStatus::Error, ItemStatus::Done]
    );
}

#[tokio::test]
async fn test_run_emptyPayload_shouldSettleAsError() {
    let job = seeded_job(2);
    let ids = job.read(|state| state.item_ids());
    let mock = MockGenerator::new().empty_items([1]);
    let (batcher, _) = batcher(3, Duration::ZERO);

    batcher
        .run(&job, &ids, work(&mock), &CancellationToken::new())
        .await
        .unwrap();

    job.read(|state| {
        let item = state.item(1).unwrap();
        assert_eq!(item.status, ItemStatus::Error);
        assert!(item.payload.is_none());
        assert!(item.error.is_some());
    });
}
