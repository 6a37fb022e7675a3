use serde::{Deserialize, Serialize};
use std::fmt;

use crate::language_utils::MetaLanguage;

/// Number of options every metadata call must produce
pub const OPTIONS_PER_LANGUAGE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataOptionType {
    Personality,
    Utility,
    Creative,
}

impl fmt::Display for MetadataOptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Personality => "personality",
            Self::Utility => "utility",
            Self::Creative => "creative",
        };
        write!(f, "{}", name)
    }
}

/// Self-assessed scores, 1 to 5
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub naturalness: f32,
    pub tone: f32,
    pub searchability: f32,
    pub creativity: f32,
}

impl Evaluation {
    pub fn average(&self) -> f32 {
        (self.naturalness + self.tone + self.searchability + self.creativity) / 4.0
    }
}

/// One candidate listing bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOption {
    pub language: MetaLanguage,
    pub option_type: MetadataOptionType,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub evaluation: Evaluation,
    pub reasoning: String,
}

/// Candidate options generated for one locale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageOptions {
    pub language: MetaLanguage,
    pub options: Vec<MetadataOption>,
}
