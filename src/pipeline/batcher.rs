/*!
 * Rate limited fan-out of independent work items.
 *
 * Items are split into consecutive groups of at most `max_concurrency`.
 * A group is dispatched concurrently, every item in it is awaited, and the
 * batcher then sleeps `inter_batch_delay` before the next group. Groups
 * never overlap.
 *
 * A failing item (error, empty payload or panic) is recorded on the item
 * and never stops its siblings or later groups. Cancellation is checked
 * before each group and aborts the pacing delay and in-flight waits
 * promptly; items still in flight at that point are settled as failed.
 */

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::errors::{PipelineError, ProviderError};
use crate::models::{ImageBytes, ItemId, ItemStatus};
use crate::pipeline::cancellation::{CancellationToken, SleepOutcome};
use crate::pipeline::job::JobHandle;
use crate::pipeline::reporter::{PipelineEvent, Stage, StageReporter};

/// Default group size
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default pause between groups
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(10_000);

/// Produces the payload of one work item
#[async_trait]
pub trait ItemWork: Send + Sync + 'static {
    async fn run(&self, id: ItemId) -> Result<ImageBytes, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub inter_batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }
}

impl BatchConfig {
    pub fn new(max_concurrency: usize, inter_batch_delay: Duration) -> Self {
        Self {
            max_concurrency,
            inter_batch_delay,
        }
    }

    /// No pacing; handy for local providers
    pub fn unpaced(max_concurrency: usize) -> Self {
        Self::new(max_concurrency, Duration::ZERO)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Group size actually used; zero is treated as one
    pub fn group_size(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn group_count(&self, total: usize) -> usize {
        total.div_ceil(self.group_size())
    }
}

/// When a group was dispatched and when its last item settled
#[derive(Debug, Clone, Copy)]
pub struct GroupTiming {
    pub index: usize,
    pub size: usize,
    pub started: Instant,
    pub settled: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub groups: usize,
    pub settled: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub group_timings: Vec<GroupTiming>,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{}/{} settled in {} group(s): {} done, {} failed",
            self.settled, self.total, self.groups, self.succeeded, self.failed
        )
    }
}

enum Settlement {
    Done(ImageBytes),
    Failed(String),
}

impl Settlement {
    fn from_join(id: ItemId, joined: Result<Result<ImageBytes, ProviderError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(payload)) if payload.is_empty() => {
                Self::Failed("service returned an empty payload".to_string())
            }
            Ok(Ok(payload)) => Self::Done(payload),
            Ok(Err(e)) => Self::Failed(e.to_string()),
            Err(e) if e.is_panic() => {
                warn!("Generation task for sticker {} panicked", id);
                Self::Failed("generation task panicked".to_string())
            }
            Err(e) => Self::Failed(format!("generation task aborted: {}", e)),
        }
    }
}

/// Bounded-concurrency, paced, cancellable scheduler
#[derive(Debug, Clone)]
pub struct RateLimitedBatcher {
    config: BatchConfig,
    reporter: StageReporter,
}

impl RateLimitedBatcher {
    pub fn new(config: BatchConfig, reporter: StageReporter) -> Self {
        Self { config, reporter }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `work` for every id, writing each settlement into `job`
    pub async fn run(
        &self,
        job: &JobHandle,
        ids: &[ItemId],
        work: Arc<dyn ItemWork>,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, PipelineError> {
        let total = ids.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        if ids.is_empty() {
            self.reporter.complete(Stage::StickerGeneration, "No stickers to generate");
            return Ok(summary);
        }

        let group_size = self.config.group_size();
        let group_count = self.config.group_count(total);
        info!(
            "Generating {} sticker(s) in {} group(s) of up to {}",
            total, group_count, group_size
        );

        for (index, group) in ids.chunks(group_size).enumerate() {
            cancel.check()?;

            let started = Instant::now();
            for id in group {
                job.update(|state| state.mark_loading(*id))?;
            }

            let handles: Vec<_> = group
                .iter()
                .map(|id| {
                    let id = *id;
                    let work = Arc::clone(&work);
                    tokio::spawn(async move { work.run(id).await })
                })
                .collect();

            let joined = tokio::select! {
                results = join_all(handles) => results,
                _ = cancel.cancelled() => {
                    let abandoned = job
                        .update(|state| state.abandon_in_flight("cancelled before settling"))?;
                    debug!("Abandoned {} in-flight sticker(s) on cancellation", abandoned.len());
                    return Err(PipelineError::Cancelled);
                }
            };

            for (id, result) in group.iter().zip(joined) {
                let status = match Settlement::from_join(*id, result) {
                    Settlement::Done(payload) => {
                        job.update(|state| state.mark_done(*id, payload))?;
                        summary.succeeded += 1;
                        ItemStatus::Done
                    }
                    Settlement::Failed(message) => {
                        warn!("Sticker {} failed: {}", id, message);
                        job.update(|state| state.mark_error(*id, message))?;
                        summary.failed += 1;
                        ItemStatus::Error
                    }
                };
                summary.settled += 1;
                self.reporter.emit(PipelineEvent::ItemSettled { id: *id, status });
            }

            summary.groups += 1;
            summary.group_timings.push(GroupTiming {
                index,
                size: group.len(),
                started,
                settled: Instant::now(),
            });
            self.reporter.running(
                Stage::StickerGeneration,
                summary.settled,
                total,
                format!("Generated {}/{} stickers", summary.settled, total),
            );

            let is_last = index + 1 == group_count;
            if !is_last && !self.config.inter_batch_delay.is_zero() {
                debug!(
                    "Waiting {:?} before group {}/{}",
                    self.config.inter_batch_delay,
                    index + 2,
                    group_count
                );
                if cancel.sleep(self.config.inter_batch_delay).await == SleepOutcome::Cancelled {
                    return Err(PipelineError::Cancelled);
                }
            }
        }

        self.reporter.complete(Stage::StickerGeneration, summary.summary());
        Ok(summary)
    }
}
