use anyhow::{Result, anyhow};
use isolang::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language utilities for target markets and metadata locales
///
/// A `MarketLanguage` is the storefront a sticker set is designed for, while a
/// `MetaLanguage` is a locale that listing metadata can be written in. Locale
/// codes are BCP-47 style (`zh-TW`), with the primary subtag checked against
/// ISO 639-1 through `isolang`.

/// Storefront a sticker set targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketLanguage {
    Korean,
    Japanese,
    TraditionalChinese,
}

impl MarketLanguage {
    /// Human readable name, also used verbatim inside prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Korean => "Korean",
            Self::Japanese => "Japanese",
            Self::TraditionalChinese => "Traditional Chinese",
        }
    }

    /// Locale used for metadata when none are configured
    pub fn metadata_language(&self) -> MetaLanguage {
        match self {
            Self::Korean => MetaLanguage::Ko,
            Self::Japanese => MetaLanguage::Ja,
            Self::TraditionalChinese => MetaLanguage::ZhTw,
        }
    }
}

impl fmt::Display for MarketLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for MarketLanguage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "korean" | "ko" => Ok(Self::Korean),
            "japanese" | "ja" => Ok(Self::Japanese),
            "traditional-chinese" | "zh-tw" => Ok(Self::TraditionalChinese),
            _ => Err(anyhow!("Unsupported market language: {}", s)),
        }
    }
}

/// Locale that listing metadata can be generated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetaLanguage {
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "ko")]
    Ko,
}

/// Every supported metadata locale, in display order
pub const META_LANGUAGES: [MetaLanguage; 5] = [
    MetaLanguage::En,
    MetaLanguage::Ja,
    MetaLanguage::ZhTw,
    MetaLanguage::ZhCn,
    MetaLanguage::Ko,
];

impl MetaLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ja => "ja",
            Self::ZhTw => "zh-TW",
            Self::ZhCn => "zh-CN",
            Self::Ko => "ko",
        }
    }

    /// English label, e.g. "Japanese" or "Traditional Chinese"
    pub fn label(&self) -> String {
        match self {
            Self::ZhTw => "Traditional Chinese".to_string(),
            Self::ZhCn => "Simplified Chinese".to_string(),
            _ => Language::from_639_1(self.primary_subtag())
                .map(|lang| lang.to_name().to_string())
                .unwrap_or_else(|| self.code().to_string()),
        }
    }

    /// Name of the language in that language
    pub fn native_name(&self) -> String {
        match self {
            Self::ZhTw => "繁體中文".to_string(),
            Self::ZhCn => "简体中文".to_string(),
            _ => Language::from_639_1(self.primary_subtag())
                .and_then(|lang| lang.to_autonym())
                .map(|name| name.to_string())
                .unwrap_or_else(|| self.label()),
        }
    }

    fn primary_subtag(&self) -> &'static str {
        self.code().split('-').next().unwrap_or("en")
    }
}

impl fmt::Display for MetaLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for MetaLanguage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        META_LANGUAGES
            .iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| anyhow!("Unsupported metadata language: {}", s))
    }
}

/// Validate a locale code: the primary subtag must be a known ISO 639-1 code
/// and the full code must be one of the supported metadata locales
pub fn validate_language_code(code: &str) -> Result<MetaLanguage> {
    let primary = code.trim().split('-').next().unwrap_or_default().to_lowercase();
    if Language::from_639_1(&primary).is_none() {
        return Err(anyhow!("Invalid language code: {}", code));
    }
    code.parse()
}

/// Get the English name of a language from its code
pub fn get_language_name(code: &str) -> Result<String> {
    validate_language_code(code).map(|lang| lang.label())
}

/// Resolve the metadata locales for a run, falling back to the market language
pub fn resolve_metadata_languages(
    configured: &[MetaLanguage],
    market: MarketLanguage,
) -> Vec<MetaLanguage> {
    if configured.is_empty() {
        return vec![market.metadata_language()];
    }
    let mut resolved = Vec::with_capacity(configured.len());
    for lang in configured {
        if !resolved.contains(lang) {
            resolved.push(*lang);
        }
    }
    resolved
}
