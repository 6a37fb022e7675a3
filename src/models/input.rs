use serde::{Deserialize, Serialize};

use super::{ImageBytes, image_base64};
use crate::language_utils::MarketLanguage;

/// What the operator asked for. Immutable once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInput {
    /// Free-form character concept
    pub concept: String,

    /// Target storefront
    pub language: MarketLanguage,

    /// Optional reference image
    #[serde(default, with = "image_base64::option", skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ImageBytes>,

    /// Use the reference image as the main image instead of synthesizing one
    #[serde(default)]
    pub skip_character_generation: bool,
}

impl UserInput {
    pub fn new(concept: impl Into<String>, language: MarketLanguage) -> Self {
        Self {
            concept: concept.into(),
            language,
            reference_image: None,
            skip_character_generation: false,
        }
    }

    pub fn with_reference_image(mut self, image: ImageBytes) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn skip_character_generation(mut self, skip: bool) -> Self {
        self.skip_character_generation = skip;
        self
    }

    /// True when base-character synthesis and style selection are bypassed
    pub fn uses_reference_shortcut(&self) -> bool {
        self.skip_character_generation
            && self.reference_image.as_ref().is_some_and(|image| !image.is_empty())
    }
}
