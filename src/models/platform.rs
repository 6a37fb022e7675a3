use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel dimensions of an exported asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Export format of a storefront
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSpec {
    pub label: &'static str,
    /// Maximum number of stickers in one pack
    pub count: usize,
    pub content: Dimensions,
    /// Pack cover image; not every platform has one
    pub main: Option<Dimensions>,
    pub tab: Dimensions,
    /// Zero-padding width of content file names
    pub file_name_digits: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformId {
    OgqSticker,
    LineSticker,
    LineEmoji,
}

pub const ALL_PLATFORMS: [PlatformId; 3] = [
    PlatformId::OgqSticker,
    PlatformId::LineSticker,
    PlatformId::LineEmoji,
];

impl PlatformId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OgqSticker => "ogq_sticker",
            Self::LineSticker => "line_sticker",
            Self::LineEmoji => "line_emoji",
        }
    }

    pub fn spec(&self) -> PlatformSpec {
        let tab = Dimensions { width: 96, height: 74 };
        match self {
            Self::OgqSticker => PlatformSpec {
                label: "OGQ Sticker",
                count: 24,
                content: Dimensions { width: 740, height: 640 },
                main: Some(Dimensions { width: 240, height: 240 }),
                tab,
                file_name_digits: 2,
            },
            Self::LineSticker => PlatformSpec {
                label: "LINE Sticker",
                count: 40,
                content: Dimensions { width: 370, height: 320 },
                main: Some(Dimensions { width: 240, height: 240 }),
                tab,
                file_name_digits: 2,
            },
            Self::LineEmoji => PlatformSpec {
                label: "LINE Emoji",
                count: 40,
                content: Dimensions { width: 180, height: 180 },
                main: None,
                tab,
                file_name_digits: 3,
            },
        }
    }

    /// File name of the content image at zero-based `index`
    pub fn file_name(&self, index: usize) -> String {
        let digits = self.spec().file_name_digits;
        format!("{:0width$}.png", index + 1, width = digits)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ALL_PLATFORMS
            .iter()
            .find(|p| p.as_str() == s.trim().to_lowercase().replace('-', "_"))
            .copied()
            .ok_or_else(|| anyhow!("Unknown platform: {}", s))
    }
}
