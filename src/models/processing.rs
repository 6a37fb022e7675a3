use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutlineStyle {
    None,
    #[default]
    White,
    Black,
}

/// Options handed to the image transform collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default = "default_true")]
    pub remove_background: bool,

    #[serde(default)]
    pub outline: OutlineStyle,

    /// Outline thickness in pixels
    #[serde(default = "default_outline_thickness")]
    pub outline_thickness: u32,

    /// Outline opacity in percent
    #[serde(default = "default_outline_opacity")]
    pub outline_opacity: u8,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            remove_background: true,
            outline: OutlineStyle::default(),
            outline_thickness: default_outline_thickness(),
            outline_opacity: default_outline_opacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_outline_thickness() -> u32 {
    3
}

fn default_outline_opacity() -> u8 {
    100
}
