/*!
 * Generation service implementations.
 *
 * - `gemini`: Gemini `generateContent` REST client
 * - `mock`: deterministic in-process generator for tests and dry runs
 * - `prompts`: prompt builders shared by remote implementations
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;
use crate::language_utils::{MarketLanguage, MetaLanguage};
use crate::models::{
    CharacterSpec, ImageBytes, MetadataOption, StickerIdea, Strategy, UserInput, VisualStyle,
};

/// Inputs of the ideation call
#[derive(Debug, Clone, Copy)]
pub struct IdeationRequest<'a> {
    pub input: &'a UserInput,
    pub style: &'a VisualStyle,
    pub spec: &'a CharacterSpec,
    pub strategy: &'a Strategy,
    /// Number of ideas to ask for
    pub count: usize,
}

/// Inputs of one metadata call
#[derive(Debug, Clone, Copy)]
pub struct MetadataRequest<'a> {
    /// Representative processed stickers
    pub samples: &'a [ImageBytes],
    pub language: MetaLanguage,
    pub strategy: Option<&'a Strategy>,
    pub spec: Option<&'a CharacterSpec>,
}

/// The external text and image synthesis collaborator
///
/// Failures of `generate_one` are isolated to one work item by the caller;
/// every other failure ends the run.
#[async_trait]
pub trait GenerationService: Send + Sync + Debug {
    /// Run the expert panel and decide the visual strategy
    async fn analyze_concept(&self, input: &UserInput) -> Result<Strategy, ProviderError>;

    /// Synthesize the base character
    async fn generate_base_character(&self, input: &UserInput) -> Result<ImageBytes, ProviderError>;

    /// Restyle the base character into the main image
    async fn generate_visual_variation(
        &self,
        base: &ImageBytes,
        style: &VisualStyle,
        language: MarketLanguage,
    ) -> Result<ImageBytes, ProviderError>;

    /// Describe the character in the main image precisely
    async fn extract_character_spec(
        &self,
        main_image: &ImageBytes,
        concept: &str,
    ) -> Result<CharacterSpec, ProviderError>;

    /// Produce the ordered sticker ideas
    async fn generate_ideas(&self, request: &IdeationRequest<'_>) -> Result<Vec<StickerIdea>, ProviderError>;

    /// Produce one sticker image
    async fn generate_one(
        &self,
        idea: &StickerIdea,
        main_image: &ImageBytes,
        spec: &CharacterSpec,
    ) -> Result<ImageBytes, ProviderError>;

    /// Produce exactly three metadata options for one language
    async fn generate_metadata(&self, request: &MetadataRequest<'_>) -> Result<Vec<MetadataOption>, ProviderError>;
}

pub mod gemini;
pub mod mock;
pub mod prompts;
