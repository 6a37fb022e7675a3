use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ImageBytes, image_base64};

/// Stable work item id, assigned once at ideation
pub type ItemId = u32;

/// Generation instructions for one sticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerIdea {
    #[serde(default)]
    pub id: ItemId,
    pub expression: String,
    pub action: String,
    pub category: String,
    pub use_case: String,
    pub image_prompt: String,
    /// Optional caption; never rendered into the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Per-item lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Loading,
    Done,
    Error,
}

impl ItemStatus {
    /// Allowed moves: pending, done and error may be (re)dispatched; only a
    /// dispatched item may settle
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Loading) | (Done, Loading) | (Error, Loading) | (Loading, Done) | (Loading, Error)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// One sticker slot of a job. Never removed or renumbered once created.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: ItemId,
    pub idea: StickerIdea,
    pub status: ItemStatus,
    /// Present exactly when `status` is `Done`
    pub payload: Option<ImageBytes>,
    pub error: Option<String>,
    /// Number of times the item has been dispatched
    pub attempts: u32,
}

impl WorkItem {
    pub fn new(idea: StickerIdea) -> Self {
        Self {
            id: idea.id,
            idea,
            status: ItemStatus::Pending,
            payload: None,
            error: None,
            attempts: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ItemStatus::Done
    }
}

/// Post-processed image of a `done` work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Source work item id
    pub id: ItemId,
    /// The item's expression, used as a display name
    pub name: String,
    #[serde(with = "image_base64")]
    pub data: ImageBytes,
}
