use serde::{Deserialize, Serialize};

/// Consistency anchor extracted once from the main image and passed to every
/// per-sticker generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSpec {
    pub physical_description: String,
    pub facial_features: String,
    pub color_palette: String,
    pub distinguishing_features: String,
    pub art_style: String,
}
