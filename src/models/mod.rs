/*!
 * Domain types shared by the pipeline, the providers and the CLI.
 *
 * - `input`: what the operator asks for
 * - `strategy`: concept analysis results and the visual style table
 * - `character`: the character specification used as a consistency anchor
 * - `sticker`: ideas, work items and processed images
 * - `metadata`: listing metadata options per locale
 * - `platform`: storefront export formats
 * - `processing`: image post-processing options
 */

pub mod character;
pub mod input;
pub mod metadata;
pub mod platform;
pub mod processing;
pub mod sticker;
pub mod strategy;

pub use character::CharacterSpec;
pub use input::UserInput;
pub use metadata::{Evaluation, LanguageOptions, MetadataOption, MetadataOptionType};
pub use platform::{PlatformId, PlatformSpec};
pub use processing::{OutlineStyle, ProcessingOptions};
pub use sticker::{ItemId, ItemStatus, ProcessedImage, StickerIdea, WorkItem};
pub use strategy::{PersonaInsight, Strategy, VISUAL_STYLES, VisualStyle};

/// Raw image payload (PNG bytes)
pub type ImageBytes = bytes::Bytes;

/// Serde adapter that carries image bytes as standard base64 text
pub mod image_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ImageBytes;

    pub fn serialize<S: Serializer>(bytes: &ImageBytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ImageBytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(ImageBytes::from)
            .map_err(serde::de::Error::custom)
    }

    /// Same encoding for optional payloads
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<ImageBytes>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<ImageBytes>, D::Error> {
            let text = Option::<String>::deserialize(deserializer)?;
            text.map(|text| {
                STANDARD
                    .decode(text.as_bytes())
                    .map(ImageBytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
