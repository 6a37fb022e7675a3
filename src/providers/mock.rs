/*!
 * Mock generation service for testing.
 *
 * `MockGenerator` answers every call deterministically and can be told to:
 * - fail specific stickers permanently (`failing_items`) or only on their
 *   first attempt (`flaky_items`)
 * - panic or return an empty payload for specific stickers
 * - fail a whole stage (`failing_at`)
 * - take a fixed amount of (tokio) time per sticker (`with_latency`)
 *
 * Clones share their call log and concurrency counters, so a test can keep a
 * clone and inspect what the pipeline did with the other one.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::language_utils::{MarketLanguage, MetaLanguage};
use crate::models::metadata::OPTIONS_PER_LANGUAGE;
use crate::models::{
    CharacterSpec, Evaluation, ImageBytes, ItemId, MetadataOption, MetadataOptionType,
    PersonaInsight, StickerIdea, Strategy, UserInput, VisualStyle,
};
use crate::providers::{GenerationService, IdeationRequest, MetadataRequest};

/// Number of ideas generated by default
pub const DEFAULT_IDEA_COUNT: usize = 45;

const EXPRESSIONS: [&str; 9] = [
    "happy", "sad", "angry", "surprised", "sleepy", "love", "thanks", "sorry", "ok",
];

/// The call a mock answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStage {
    Analysis,
    BaseCharacter,
    Variation,
    SpecExtraction,
    Ideation,
    Sticker,
    Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub stage: MockStage,
    pub item: Option<ItemId>,
    pub language: Option<MetaLanguage>,
}

#[derive(Debug, Default)]
struct MockCounters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<MockCall>>,
    attempts: Mutex<HashMap<ItemId, u32>>,
}

/// Decrements the in-flight counter even if the call panics
struct InFlight<'a>(&'a MockCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a MockCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic generation service
#[derive(Debug, Clone)]
pub struct MockGenerator {
    idea_count: usize,
    style_index: i64,
    options_per_language: usize,
    failing_items: HashSet<ItemId>,
    flaky_items: HashSet<ItemId>,
    panicking_items: HashSet<ItemId>,
    empty_items: HashSet<ItemId>,
    failing_stage: Option<MockStage>,
    latency: Duration,
    counters: Arc<MockCounters>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    /// A generator where every call succeeds
    pub fn new() -> Self {
        Self {
            idea_count: DEFAULT_IDEA_COUNT,
            style_index: 1,
            options_per_language: OPTIONS_PER_LANGUAGE,
            failing_items: HashSet::new(),
            flaky_items: HashSet::new(),
            panicking_items: HashSet::new(),
            empty_items: HashSet::new(),
            failing_stage: None,
            latency: Duration::ZERO,
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn with_idea_count(mut self, count: usize) -> Self {
        self.idea_count = count;
        self
    }

    /// Raw style index suggested by the analysis, clamped like a real answer
    pub fn with_style_index(mut self, index: i64) -> Self {
        self.style_index = index;
        self
    }

    /// Number of metadata options returned per call
    pub fn with_options_per_language(mut self, count: usize) -> Self {
        self.options_per_language = count;
        self
    }

    pub fn failing_items(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.failing_items.extend(ids);
        self
    }

    pub fn flaky_items(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.flaky_items.extend(ids);
        self
    }

    pub fn panicking_items(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.panicking_items.extend(ids);
        self
    }

    pub fn empty_items(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.empty_items.extend(ids);
        self
    }

    pub fn failing_at(mut self, stage: MockStage) -> Self {
        self.failing_stage = Some(stage);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.counters.calls.lock().clone()
    }

    pub fn call_count(&self, stage: MockStage) -> usize {
        self.counters.calls.lock().iter().filter(|c| c.stage == stage).count()
    }

    /// Highest number of concurrent `generate_one` calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, id: ItemId) -> u32 {
        self.counters.attempts.lock().get(&id).copied().unwrap_or(0)
    }

    fn record(&self, stage: MockStage, item: Option<ItemId>, language: Option<MetaLanguage>) -> Result<(), ProviderError> {
        self.counters.calls.lock().push(MockCall { stage, item, language });
        if self.failing_stage == Some(stage) {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("mock failure at {:?}", stage),
            });
        }
        Ok(())
    }

    fn image(label: impl AsRef<str>) -> ImageBytes {
        ImageBytes::from(format!("png:{}", label.as_ref()).into_bytes())
    }
}

#[async_trait]
impl GenerationService for MockGenerator {
    async fn analyze_concept(&self, input: &UserInput) -> Result<Strategy, ProviderError> {
        self.record(MockStage::Analysis, None, None)?;
        let personas = ["Market Analyst", "Art Director", "Cultural Expert"];
        Ok(Strategy {
            selected_visual_style_index: Strategy::clamp_style_index(self.style_index),
            cultural_notes: format!("{} buyers like warm colors", input.language),
            sales_reasoning: format!("'{}' fits everyday chat", input.concept),
            persona_insights: personas
                .iter()
                .map(|persona| PersonaInsight {
                    persona: persona.to_string(),
                    analysis: format!("{} view on {}", persona, input.concept),
                })
                .collect(),
        })
    }

    async fn generate_base_character(&self, input: &UserInput) -> Result<ImageBytes, ProviderError> {
        self.record(MockStage::BaseCharacter, None, None)?;
        Ok(Self::image(format!("base:{}", input.concept)))
    }

    async fn generate_visual_variation(
        &self,
        _base: &ImageBytes,
        style: &VisualStyle,
        _language: MarketLanguage,
    ) -> Result<ImageBytes, ProviderError> {
        self.record(MockStage::Variation, None, None)?;
        Ok(Self::image(format!("main:{}", style.name)))
    }

    async fn extract_character_spec(
        &self,
        _main_image: &ImageBytes,
        concept: &str,
    ) -> Result<CharacterSpec, ProviderError> {
        self.record(MockStage::SpecExtraction, None, None)?;
        Ok(CharacterSpec {
            physical_description: format!("round {}", concept),
            facial_features: "large round eyes, tiny mouth".to_string(),
            color_palette: "#FFFFFF body, #FFB6C1 cheeks".to_string(),
            distinguishing_features: "red bow".to_string(),
            art_style: "thick outlines, flat shading".to_string(),
        })
    }

    async fn generate_ideas(&self, request: &IdeationRequest<'_>) -> Result<Vec<StickerIdea>, ProviderError> {
        self.record(MockStage::Ideation, None, None)?;
        Ok((0..self.idea_count)
            .map(|index| {
                let expression = EXPRESSIONS[index % EXPRESSIONS.len()];
                StickerIdea {
                    id: index as ItemId + 1,
                    expression: expression.to_string(),
                    action: format!("{} pose", expression),
                    category: "Basic Emotions".to_string(),
                    use_case: format!("feeling {}", expression),
                    image_prompt: format!("{} looking {}", request.input.concept, expression),
                    text: None,
                }
            })
            .collect())
    }

    async fn generate_one(
        &self,
        idea: &StickerIdea,
        _main_image: &ImageBytes,
        _spec: &CharacterSpec,
    ) -> Result<ImageBytes, ProviderError> {
        let attempt = {
            let mut attempts = self.counters.attempts.lock();
            let counter = attempts.entry(idea.id).or_insert(0);
            *counter += 1;
            *counter
        };
        self.record(MockStage::Sticker, Some(idea.id), None)?;

        let _guard = InFlight::enter(&self.counters);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.panicking_items.contains(&idea.id) {
            panic!("mock panic for sticker {}", idea.id);
        }
        if self.failing_items.contains(&idea.id) || (self.flaky_items.contains(&idea.id) && attempt == 1) {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("mock failure for sticker {}", idea.id),
            });
        }
        if self.empty_items.contains(&idea.id) {
            return Ok(ImageBytes::new());
        }
        Ok(Self::image(format!("sticker:{}:{}:v{}", idea.id, idea.image_prompt, attempt)))
    }

    async fn generate_metadata(&self, request: &MetadataRequest<'_>) -> Result<Vec<MetadataOption>, ProviderError> {
        self.record(MockStage::Metadata, None, Some(request.language))?;
        let types = [
            MetadataOptionType::Personality,
            MetadataOptionType::Utility,
            MetadataOptionType::Creative,
        ];
        Ok((0..self.options_per_language)
            .map(|index| {
                let option_type = types[index % types.len()];
                MetadataOption {
                    language: request.language,
                    option_type,
                    title: format!("{} pack {}", option_type, index + 1),
                    description: format!(
                        "{} sticker(s) sampled for {}",
                        request.samples.len(),
                        request.language
                    ),
                    tags: vec!["cute".to_string(), option_type.to_string()],
                    evaluation: Evaluation {
                        naturalness: 4.0,
                        tone: 4.0,
                        searchability: 3.5,
                        creativity: 3.0 + index as f32 * 0.5,
                    },
                    reasoning: format!("{} focus", option_type),
                }
            })
            .collect())
    }
}
