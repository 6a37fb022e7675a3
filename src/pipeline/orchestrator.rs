/*!
 * Pipeline orchestrator for turning a concept into a sticker set.
 *
 * Stages run in a fixed order:
 * 1. Concept analysis: expert panel strategy
 * 2. Character generation: base character (skipped with a reference image)
 * 3. Style selection: restyled main image (skipped with a reference image)
 * 4. Character generation: specification extraction
 * 5. Checkpoint `key_visual`
 * 6. Emote ideation
 * 7. Sticker generation through the rate limited batcher
 * 8. Post-processing
 * 9. Checkpoint `post_process`
 * 10. Metadata generation per language
 * 11. Checkpoint `metadata`
 * 12. Export
 *
 * Cancellation is checked at every stage boundary and abandons in-flight
 * waits. Failures of the single-artifact stages end the run; per-sticker
 * failures are recorded on the item and the run carries on.
 */

use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{JobStateError, PipelineError, ProviderError};
use crate::language_utils::{MetaLanguage, resolve_metadata_languages};
use crate::models::metadata::OPTIONS_PER_LANGUAGE;
use crate::models::platform::ALL_PLATFORMS;
use crate::models::{
    CharacterSpec, ImageBytes, ItemId, ItemStatus, LanguageOptions, MetadataOption, PlatformId,
    ProcessingOptions, StickerIdea, Strategy, UserInput,
};
use crate::pipeline::batcher::{BatchConfig, BatchSummary, ItemWork, RateLimitedBatcher};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::export::{ExportBundle, Exporter};
use crate::pipeline::gate::{
    Checkpoint, CheckpointPreview, ConfirmMode, ConfirmationGate, DecisionSource, GateAction,
    GateResolution,
};
use crate::pipeline::imaging::{ImageOps, PassthroughImageOps, post_process};
use crate::pipeline::job::{JobError, JobHandle, JobSnapshot, JobState, JobStatus, PipelineStep};
use crate::pipeline::reporter::{PipelineEvent, ProgressSink, Stage, StageReporter};
use crate::providers::{GenerationService, IdeationRequest, MetadataRequest};

/// Number of processed stickers shown to the metadata writer
pub const METADATA_SAMPLE_SIZE: usize = 6;

/// Number of sticker ideas requested per run
pub const DEFAULT_STICKER_COUNT: usize = 45;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fan-out settings for sticker generation
    pub batch: BatchConfig,

    /// How checkpoints are resolved
    pub confirm_mode: ConfirmMode,

    /// Options handed to the image transform
    pub processing: ProcessingOptions,

    /// Metadata locales; empty means the market's own locale
    pub metadata_languages: Vec<MetaLanguage>,

    /// Export targets
    pub platforms: Vec<PlatformId>,

    /// Number of sticker ideas to ask for
    pub sticker_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            confirm_mode: ConfirmMode::Auto,
            processing: ProcessingOptions::default(),
            metadata_languages: Vec::new(),
            platforms: ALL_PLATFORMS.to_vec(),
            sticker_count: DEFAULT_STICKER_COUNT,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unattended run without pacing; for local providers and tests.
    pub fn fast() -> Self {
        Self {
            batch: BatchConfig::unpaced(BatchConfig::default().max_concurrency),
            ..Default::default()
        }
    }

    /// Operator confirms every checkpoint.
    pub fn interactive() -> Self {
        Self {
            confirm_mode: ConfirmMode::Interactive,
            ..Default::default()
        }
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.batch.max_concurrency = max_concurrency;
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.batch.inter_batch_delay = delay;
        self
    }

    pub fn with_confirm_mode(mut self, mode: ConfirmMode) -> Self {
        self.confirm_mode = mode;
        self
    }

    pub fn with_processing(mut self, processing: ProcessingOptions) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_metadata_languages(mut self, languages: Vec<MetaLanguage>) -> Self {
        self.metadata_languages = languages;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<PlatformId>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_sticker_count(mut self, count: usize) -> Self {
        self.sticker_count = count;
        self
    }
}

/// Generates one sticker through the generation service
struct StickerWork {
    generator: Arc<dyn GenerationService>,
    ideas: HashMap<ItemId, StickerIdea>,
    main_image: ImageBytes,
    spec: CharacterSpec,
}

#[async_trait]
impl ItemWork for StickerWork {
    async fn run(&self, id: ItemId) -> Result<ImageBytes, ProviderError> {
        let idea = self
            .ideas
            .get(&id)
            .ok_or_else(|| ProviderError::RequestFailed(format!("no idea for sticker {}", id)))?;
        self.generator.generate_one(idea, &self.main_image, &self.spec).await
    }
}

/// Main image, optional base image and the spec extracted from it
struct CharacterArtifacts {
    base_image: Option<ImageBytes>,
    main_image: ImageBytes,
    spec: CharacterSpec,
}

/// Sequences the stages of a run.
pub struct PipelineOrchestrator {
    generator: Arc<dyn GenerationService>,
    image_ops: Arc<dyn ImageOps>,
    exporter: Option<Arc<dyn Exporter>>,
    decisions: Option<Arc<dyn DecisionSource>>,
    reporter: StageReporter,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(generator: Arc<dyn GenerationService>, config: PipelineConfig) -> Self {
        Self {
            generator,
            image_ops: Arc::new(PassthroughImageOps),
            exporter: None,
            decisions: None,
            reporter: StageReporter::new(),
            config,
        }
    }

    pub fn with_image_ops(mut self, image_ops: Arc<dyn ImageOps>) -> Self {
        self.image_ops = image_ops;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_decision_source(mut self, source: Arc<dyn DecisionSource>) -> Self {
        self.decisions = Some(source);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.reporter.add_sink(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create the record of a new run
    pub fn create_job(&self, input: UserInput) -> JobHandle {
        let state = JobState::new(input);
        info!("Created job {}", state.id);
        JobHandle::new(state)
    }

    fn batcher(&self) -> RateLimitedBatcher {
        RateLimitedBatcher::new(self.config.batch.clone(), self.reporter.clone())
    }

    fn gate(&self) -> ConfirmationGate {
        let gate = ConfirmationGate::new(self.config.confirm_mode, self.reporter.clone());
        match &self.decisions {
            Some(source) => gate.with_source(Arc::clone(source)),
            None => gate,
        }
    }

    /// Run every stage and return the final snapshot. Never fails: the
    /// outcome is recorded on the job.
    pub async fn execute(&self, job: &JobHandle, cancel: &CancellationToken) -> JobSnapshot {
        let outcome = self.run_stages(job, cancel).await;

        let stage = job.read(|state| state.current_stage);
        let (status, error) = match &outcome {
            Ok(()) => (JobStatus::Completed, None),
            Err(e) if e.is_cancellation() => {
                info!("Job {} cancelled: {}", job.id(), e);
                (JobStatus::Cancelled, Some(JobError::from_pipeline(e, stage)))
            }
            Err(e) => {
                warn!("Job {} failed: {}", job.id(), e);
                (JobStatus::Failed, Some(JobError::from_pipeline(e, stage)))
            }
        };
        let error_kind = error.as_ref().map(|e| e.kind);

        let finished = job.update(|state| {
            state.abandon_in_flight("run ended before the sticker settled")?;
            state.finish(status, error)
        });
        if let Err(e) = finished {
            warn!("Job {} could not be finalized: {}", job.id(), e);
        }

        let snapshot = job.snapshot();
        self.reporter.emit(PipelineEvent::Finished {
            job_id: snapshot.id.to_string(),
            status: snapshot.status,
            error_kind,
        });
        snapshot
    }

    async fn run_stages(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let input = job.read(|state| state.input.clone());

        // Concept analysis
        self.enter(job, cancel, PipelineStep::ConceptAnalysis)?;
        self.reporter.started(Stage::ConceptAnalysis, "Consulting the expert panel");
        let strategy = self
            .call(Stage::ConceptAnalysis, cancel, self.generator.analyze_concept(&input))
            .await?;
        self.reporter.complete(
            Stage::ConceptAnalysis,
            format!("Selected style: {}", strategy.visual_style().name),
        );
        job.update(|state| state.set_strategy(strategy.clone()))?;

        // Character and key visual
        let character = self
            .build_character(job, &input, &strategy, cancel, true)
            .await?;
        job.update(|state| {
            if let Some(base) = character.base_image.clone() {
                state.set_base_image(base)?;
            }
            state.set_main_image(character.main_image.clone())?;
            state.set_character_spec(character.spec.clone())
        })?;

        // A character swapped while the gate waits is presented again
        loop {
            let revision = job.read(|state| state.character_revision);
            let resolution = self.confirm(job, Checkpoint::KeyVisual, cancel).await?;
            match resolution.action {
                GateAction::Approve => {
                    let approved = job.update(|state| {
                        if state.character_revision != revision {
                            return Ok(false);
                        }
                        state.lock_character().map(|()| true)
                    })?;
                    if approved {
                        break;
                    }
                    info!("Character changed while awaiting approval; presenting it again");
                }
                GateAction::Regenerate => {
                    info!("Key visual regeneration requested; ending the run");
                    return Err(PipelineError::Rejected(Checkpoint::KeyVisual));
                }
                _ => return Err(PipelineError::Rejected(Checkpoint::KeyVisual)),
            }
        }

        // Ideation
        self.enter(job, cancel, PipelineStep::EmoteIdeation)?;
        self.reporter.started(Stage::EmoteIdeation, "Brainstorming sticker ideas");
        let (strategy, spec, main_image) = job.read(|state| {
            (
                state.strategy.clone(),
                state.character_spec.clone(),
                state.main_image.clone(),
            )
        });
        let strategy = strategy.ok_or(JobStateError::MissingArtifact("strategy"))?;
        let spec = spec.ok_or(JobStateError::MissingArtifact("character specification"))?;
        let main_image = main_image.ok_or(JobStateError::MissingArtifact("main image"))?;
        let request = IdeationRequest {
            input: &input,
            style: strategy.visual_style(),
            spec: &spec,
            strategy: &strategy,
            count: self.config.sticker_count,
        };
        let ideas = self
            .call(Stage::EmoteIdeation, cancel, self.generator.generate_ideas(&request))
            .await?;
        // Ids are assigned here, in order, regardless of what the service proposed
        let ideas: Vec<StickerIdea> = ideas
            .into_iter()
            .enumerate()
            .map(|(index, idea)| StickerIdea {
                id: index as ItemId + 1,
                ..idea
            })
            .collect();
        if ideas.is_empty() {
            warn!("Ideation returned no sticker ideas");
        }
        let ids = job.update(|state| state.seed_items(ideas))?;
        self.reporter
            .complete(Stage::EmoteIdeation, format!("{} sticker ideas ready", ids.len()));

        // Sticker generation
        self.enter(job, cancel, PipelineStep::StickerGeneration)?;
        self.reporter.started(
            Stage::StickerGeneration,
            format!("Generating {} stickers", ids.len()),
        );
        let work = self.sticker_work(job, main_image, spec)?;
        let summary = self.batcher().run(job, &ids, work, cancel).await?;
        info!("Sticker generation finished: {}", summary.summary());

        // Post-processing and review
        loop {
            self.enter(job, cancel, PipelineStep::PostProcessing)?;
            self.run_post_processing(job)?;
            let resolution = self.confirm(job, Checkpoint::PostProcess, cancel).await?;
            match resolution.action {
                GateAction::Approve => break,
                GateAction::Reprocess => {
                    info!("Reprocessing stickers on request");
                    continue;
                }
                _ => return Err(PipelineError::Rejected(Checkpoint::PostProcess)),
            }
        }

        // Metadata and selection
        loop {
            self.enter(job, cancel, PipelineStep::MetadataGeneration)?;
            self.run_metadata(job, cancel).await?;
            let resolution = self.confirm(job, Checkpoint::Metadata, cancel).await?;
            match resolution.action {
                GateAction::Approve => {
                    self.apply_selection(job, &resolution)?;
                    break;
                }
                GateAction::Regenerate => {
                    info!("Regenerating metadata on request");
                    continue;
                }
                _ => return Err(PipelineError::Rejected(Checkpoint::Metadata)),
            }
        }

        // Export
        self.enter(job, cancel, PipelineStep::Export)?;
        self.run_export(job).await?;
        Ok(())
    }

    fn enter(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
        step: PipelineStep,
    ) -> Result<(), PipelineError> {
        cancel.check()?;
        debug!("Entering step {:?}", step);
        job.update(|state| state.enter_step(step))?;
        Ok(())
    }

    /// Await a single-artifact call, abandoning it on cancellation
    async fn call<T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        future: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, PipelineError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = future => {
                result.map_err(|source| PipelineError::FatalGeneration { stage, source })
            }
        }
    }

    async fn build_character(
        &self,
        job: &JobHandle,
        input: &UserInput,
        strategy: &Strategy,
        cancel: &CancellationToken,
        record_steps: bool,
    ) -> Result<CharacterArtifacts, PipelineError> {
        let step = |step: PipelineStep| -> Result<(), PipelineError> {
            if record_steps {
                self.enter(job, cancel, step)
            } else {
                cancel.check()?;
                job.update(|state| state.set_stage(step.stage()))?;
                Ok(())
            }
        };

        let (base_image, main_image) = match input.reference_image.clone() {
            Some(reference) if input.uses_reference_shortcut() => {
                info!("Using the reference image as the main image");
                (None, reference)
            }
            _ => {
                step(PipelineStep::BaseCharacter)?;
                self.reporter.started(Stage::CharacterGeneration, "Drawing the base character");
                let base = self
                    .call(
                        Stage::CharacterGeneration,
                        cancel,
                        self.generator.generate_base_character(input),
                    )
                    .await?;
                self.reporter.complete(Stage::CharacterGeneration, "Base character ready");

                step(PipelineStep::StyleSelection)?;
                let style = strategy.visual_style();
                self.reporter
                    .started(Stage::StyleSelection, format!("Applying the {} style", style.name));
                let main = self
                    .call(
                        Stage::StyleSelection,
                        cancel,
                        self.generator.generate_visual_variation(&base, style, input.language),
                    )
                    .await?;
                self.reporter.complete(Stage::StyleSelection, "Main image ready");
                (Some(base), main)
            }
        };

        step(PipelineStep::SpecExtraction)?;
        self.reporter
            .started(Stage::CharacterGeneration, "Extracting the character specification");
        let spec = self
            .call(
                Stage::CharacterGeneration,
                cancel,
                self.generator.extract_character_spec(&main_image, &input.concept),
            )
            .await?;
        self.reporter
            .complete(Stage::CharacterGeneration, "Character specification locked");

        Ok(CharacterArtifacts {
            base_image,
            main_image,
            spec,
        })
    }

    async fn confirm(
        &self,
        job: &JobHandle,
        checkpoint: Checkpoint,
        cancel: &CancellationToken,
    ) -> Result<GateResolution, PipelineError> {
        let preview = self.preview(job, checkpoint)?;
        self.gate().confirm(preview, cancel).await
    }

    fn preview(
        &self,
        job: &JobHandle,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointPreview, PipelineError> {
        use JobStateError::MissingArtifact;

        job.read(|state| -> Result<CheckpointPreview, PipelineError> {
            match checkpoint {
                Checkpoint::KeyVisual => Ok(CheckpointPreview::KeyVisual {
                    main_image: state.main_image.clone().ok_or(MissingArtifact("main image"))?,
                    character_spec: state
                        .character_spec
                        .clone()
                        .ok_or(MissingArtifact("character specification"))?,
                    strategy: state.strategy.clone().ok_or(MissingArtifact("strategy"))?,
                }),
                Checkpoint::PostProcess => Ok(CheckpointPreview::PostProcess {
                    images: state.processed.clone(),
                    options: self.config.processing.clone(),
                }),
                Checkpoint::Metadata => Ok(CheckpointPreview::Metadata {
                    candidates: state.metadata_candidates.clone(),
                }),
            }
        })
    }

    fn sticker_work(
        &self,
        job: &JobHandle,
        main_image: ImageBytes,
        spec: CharacterSpec,
    ) -> Result<Arc<dyn ItemWork>, PipelineError> {
        let ideas = job.read(|state| {
            state
                .items
                .iter()
                .map(|item| (item.id, item.idea.clone()))
                .collect::<HashMap<_, _>>()
        });
        Ok(Arc::new(StickerWork {
            generator: Arc::clone(&self.generator),
            ideas,
            main_image,
            spec,
        }))
    }

    fn run_post_processing(&self, job: &JobHandle) -> Result<(), PipelineError> {
        let done = job.read(|state| state.counts().done);
        if done == 0 {
            return Err(PipelineError::NothingToProcess);
        }
        self.reporter
            .started(Stage::PostProcessing, format!("Processing {} stickers", done));
        let processed = job.read(|state| {
            post_process(state.items.iter(), self.image_ops.as_ref(), &self.config.processing)
        })?;
        let count = processed.len();
        job.update(|state| state.set_processed(processed))?;
        self.reporter
            .complete(Stage::PostProcessing, format!("{} stickers processed", count));
        Ok(())
    }

    fn metadata_languages(&self, job: &JobHandle) -> Vec<MetaLanguage> {
        let market = job.read(|state| state.input.language);
        resolve_metadata_languages(&self.config.metadata_languages, market)
    }

    async fn run_metadata(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let languages = self.metadata_languages(job);
        let (samples, strategy, spec) = job.read(|state| {
            (
                state
                    .processed
                    .iter()
                    .take(METADATA_SAMPLE_SIZE)
                    .map(|image| image.data.clone())
                    .collect::<Vec<_>>(),
                state.strategy.clone(),
                state.character_spec.clone(),
            )
        });

        self.reporter.started(
            Stage::MetadataGeneration,
            format!("Writing metadata for {} language(s)", languages.len()),
        );

        let calls = languages.iter().map(|language| {
            let request = MetadataRequest {
                samples: &samples,
                language: *language,
                strategy: strategy.as_ref(),
                spec: spec.as_ref(),
            };
            async move {
                let options = self.generator.generate_metadata(&request).await?;
                if options.len() != OPTIONS_PER_LANGUAGE {
                    return Err(ProviderError::ParseError(format!(
                        "expected {} metadata options for {}, got {}",
                        OPTIONS_PER_LANGUAGE,
                        request.language,
                        options.len()
                    )));
                }
                Ok(LanguageOptions {
                    language: request.language,
                    options,
                })
            }
        });
        let candidates = self
            .call(Stage::MetadataGeneration, cancel, try_join_all(calls))
            .await?;

        job.update(|state| state.set_metadata_candidates(candidates))?;
        self.reporter.complete(Stage::MetadataGeneration, "Metadata options ready");
        Ok(())
    }

    fn apply_selection(
        &self,
        job: &JobHandle,
        resolution: &GateResolution,
    ) -> Result<(), PipelineError> {
        job.update(|state| {
            let selected: Vec<MetadataOption> = resolution
                .selections
                .iter()
                .filter_map(|(language, index)| {
                    state
                        .metadata_candidates
                        .iter()
                        .find(|c| c.language == *language)
                        .and_then(|c| c.options.get(*index))
                        .cloned()
                })
                .collect();
            if selected.len() != state.metadata_candidates.len() {
                return Err(PipelineError::InvalidSelection(
                    "every language needs exactly one selected option".to_string(),
                ));
            }
            state.select_metadata(selected)?;
            Ok(())
        })
    }

    async fn run_export(&self, job: &JobHandle) -> Result<(), PipelineError> {
        let Some(exporter) = self.exporter.as_ref() else {
            self.reporter.complete(Stage::Export, "No exporter configured; skipping export");
            return Ok(());
        };

        let (job_id, images, metadata) = job.read(|state| {
            (state.id, state.processed.clone(), state.selected_metadata.clone())
        });
        let bundle = ExportBundle {
            job_id,
            images: &images,
            metadata: &metadata,
        };

        self.reporter.started(
            Stage::Export,
            format!("Exporting for {} platform(s)", self.config.platforms.len()),
        );
        for (index, platform) in self.config.platforms.iter().enumerate() {
            let artifact = exporter.export(&bundle, *platform).await?;
            self.reporter.running(
                Stage::Export,
                index + 1,
                self.config.platforms.len(),
                format!("{} written to {}", platform, artifact.location.display()),
            );
            job.update(|state| state.add_export(artifact))?;
        }
        self.reporter.complete(Stage::Export, "Export finished");
        Ok(())
    }

    /// Regenerate one sticker. The item must not be in flight.
    pub async fn regenerate_item(
        &self,
        job: &JobHandle,
        id: ItemId,
        cancel: &CancellationToken,
    ) -> Result<ItemStatus, PipelineError> {
        cancel.check()?;
        job.read(|state| state.ensure_running())?;
        let (idea, main_image, spec) = job.read(|state| {
            (
                state.item(id).map(|item| item.idea.clone()),
                state.main_image.clone(),
                state.character_spec.clone(),
            )
        });
        let idea = idea.ok_or(JobStateError::UnknownItem(id))?;
        let main_image = main_image.ok_or(JobStateError::MissingArtifact("main image"))?;
        let spec = spec.ok_or(JobStateError::MissingArtifact("character specification"))?;

        job.update(|state| state.mark_loading(id))?;
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                job.update(|state| state.mark_error(id, "cancelled before settling"))?;
                return Err(PipelineError::Cancelled);
            }
            result = self.generator.generate_one(&idea, &main_image, &spec) => result,
        };

        let status = match result {
            Ok(payload) if !payload.is_empty() => {
                job.update(|state| state.mark_done(id, payload))?;
                ItemStatus::Done
            }
            Ok(_) => {
                job.update(|state| state.mark_error(id, "service returned an empty payload"))?;
                ItemStatus::Error
            }
            Err(e) => {
                warn!("Regenerating sticker {} failed: {}", id, e);
                job.update(|state| state.mark_error(id, e.to_string()))?;
                ItemStatus::Error
            }
        };
        self.reporter.emit(PipelineEvent::ItemSettled { id, status });
        Ok(status)
    }

    /// Replace a sticker's prompt, then regenerate it
    pub async fn edit_and_regenerate(
        &self,
        job: &JobHandle,
        id: ItemId,
        image_prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<ItemStatus, PipelineError> {
        job.update(|state| state.update_item_prompt(id, image_prompt))?;
        self.regenerate_item(job, id, cancel).await
    }

    /// Run every failed sticker through the batcher again
    pub async fn retry_failed_items(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, PipelineError> {
        cancel.check()?;
        job.read(|state| state.ensure_running())?;
        let (ids, main_image, spec) = job.read(|state| {
            (
                state.failed_item_ids(),
                state.main_image.clone(),
                state.character_spec.clone(),
            )
        });
        let main_image = main_image.ok_or(JobStateError::MissingArtifact("main image"))?;
        let spec = spec.ok_or(JobStateError::MissingArtifact("character specification"))?;
        info!("Retrying {} failed sticker(s)", ids.len());
        let work = self.sticker_work(job, main_image, spec)?;
        self.batcher().run(job, &ids, work, cancel).await
    }

    /// Redraw the character and swap it in. Only possible until the key
    /// visual is approved; a pending key visual checkpoint is presented again.
    pub async fn regenerate_character(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        job.read(|state| state.ensure_character_editable())?;
        let (input, strategy) = job.read(|state| (state.input.clone(), state.strategy.clone()));
        let strategy = strategy.ok_or(JobStateError::MissingArtifact("strategy"))?;

        let character = self
            .build_character(job, &input, &strategy, cancel, false)
            .await?;
        job.update(|state| {
            state.replace_character(character.base_image, character.main_image, character.spec)
        })?;
        info!("Character regenerated for job {}", job.id());
        Ok(())
    }
}
