use serde::{Deserialize, Serialize};

/// One entry of the visual style table the concept analysis chooses from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualStyle {
    pub name: &'static str,
    pub description: &'static str,
    /// Prepended to the variation prompt when restyling the base character
    pub prompt_prefix: &'static str,
}

pub const VISUAL_STYLES: [VisualStyle; 5] = [
    VisualStyle {
        name: "Soft Pastel",
        description: "Rounded shapes, muted pastel fills and gentle shading",
        prompt_prefix: "Redraw this character in a soft pastel style with rounded shapes and gentle cel shading.",
    },
    VisualStyle {
        name: "Bold Pop",
        description: "Saturated flat colors with thick black outlines",
        prompt_prefix: "Redraw this character in a bold pop-art style with saturated flat colors and thick black outlines.",
    },
    VisualStyle {
        name: "Hand Drawn",
        description: "Crayon texture, slightly wobbly lines and a playful feel",
        prompt_prefix: "Redraw this character as a hand-drawn crayon doodle with slightly wobbly lines.",
    },
    VisualStyle {
        name: "Chibi Anime",
        description: "Oversized head, sparkling eyes and clean anime linework",
        prompt_prefix: "Redraw this character in a chibi anime style with an oversized head and sparkling eyes.",
    },
    VisualStyle {
        name: "Minimal Line",
        description: "Few colors, simple geometry and generous white space",
        prompt_prefix: "Redraw this character in a minimal line-art style with very few colors and simple geometry.",
    },
];

/// Output of one expert persona during concept analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaInsight {
    pub persona: String,
    pub analysis: String,
}

/// Concept analysis result. Produced once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub selected_visual_style_index: usize,
    pub cultural_notes: String,
    pub sales_reasoning: String,
    pub persona_insights: Vec<PersonaInsight>,
}

impl Strategy {
    /// Clamp a model-suggested style index into the style table
    pub fn clamp_style_index(raw: i64) -> usize {
        raw.clamp(0, VISUAL_STYLES.len() as i64 - 1) as usize
    }

    pub fn visual_style(&self) -> &'static VisualStyle {
        &VISUAL_STYLES[self.selected_visual_style_index.min(VISUAL_STYLES.len() - 1)]
    }
}
