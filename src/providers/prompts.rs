/*!
 * Prompt builders for remote generation services.
 */

use crate::language_utils::{MarketLanguage, MetaLanguage};
use crate::models::{CharacterSpec, StickerIdea, Strategy, VISUAL_STYLES};

/// Maximum title length requested from the metadata writer
pub const TITLE_MAX_LENGTH: usize = 40;
/// Maximum description length requested from the metadata writer
pub const DESCRIPTION_MAX_LENGTH: usize = 160;
/// Number of tags requested per option
pub const TAGS_COUNT: usize = 10;

/// Market-specific buyer preferences
pub fn cultural_context(language: MarketLanguage) -> &'static str {
    match language {
        MarketLanguage::Korean => {
            "Target the Korean sticker market: buyers favour cute, expressive characters with warm colors, \
             aegyo reactions, food and daily-life situations."
        }
        MarketLanguage::Japanese => {
            "Target the Japanese sticker market: buyers favour polished kawaii art, polite response variations, \
             seasonal greetings and workplace communication."
        }
        MarketLanguage::TraditionalChinese => {
            "Target the Traditional Chinese sticker market: buyers favour vibrant, lucky-themed designs, \
             festive greetings, humorous reactions and trendy slang."
        }
    }
}

fn style_table() -> String {
    VISUAL_STYLES
        .iter()
        .enumerate()
        .map(|(index, style)| format!("[{}] \"{}\": {}", index, style.name, style.description))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn market_analyst(concept: &str, language: MarketLanguage) -> String {
    format!(
        "You are a senior sticker market analyst for the {lang} market.\n\
         Concept: {concept}\n{context}\n\n\
         In 3 to 5 short paragraphs cover current trends for this concept, target demographics, \
         how saturated the category is and a recommended pricing tier. Be specific.",
        lang = language,
        concept = concept,
        context = cultural_context(language),
    )
}

pub fn art_director(concept: &str, language: MarketLanguage, market_insight: &str) -> String {
    format!(
        "You are the art director of a sticker studio for the {lang} market.\n\
         Market analysis:\n---\n{insight}\n---\n\
         Concept: {concept}\n\nAvailable visual styles:\n{styles}\n\n\
         Recommend exactly one style index and explain the color strategy for tiny display sizes.",
        lang = language,
        insight = market_insight,
        concept = concept,
        styles = style_table(),
    )
}

pub fn cultural_expert(concept: &str, language: MarketLanguage) -> String {
    format!(
        "You are a cultural marketing expert for the {lang} market.\n\
         Concept: {concept}\n\n\
         Cover cultural nuances that affect purchases, gestures, colors or symbols to avoid, \
         current trends worth using, and tone recommendations.",
        lang = language,
        concept = concept,
    )
}

pub fn synthesis(concept: &str, language: MarketLanguage, insights: &str) -> String {
    format!(
        "You make the final creative decision for a {lang} sticker pack.\n\n{insights}\n\n\
         Available visual styles:\n{styles}\n\nConcept: {concept}\n\n\
         Answer with JSON: {{\"selectedVisualStyleIndex\": <0-{max}>, \"culturalNotes\": <string>, \
         \"salesReasoning\": <string>}}.",
        lang = language,
        insights = insights,
        styles = style_table(),
        concept = concept,
        max = VISUAL_STYLES.len() - 1,
    )
}

pub fn base_character(concept: &str, language: MarketLanguage, has_reference: bool) -> String {
    let reference = if has_reference {
        "Use the attached reference image as the primary visual reference.\n"
    } else {
        ""
    };
    format!(
        "Design a single sticker character.\nConcept: {concept}\n{reference}{context}\n\n\
         Output exactly one character on a solid white background, large head, thick bold outlines, \
         high contrast colors and no text.",
        concept = concept,
        reference = reference,
        context = cultural_context(language),
    )
}

pub fn visual_variation(prompt_prefix: &str, language: MarketLanguage) -> String {
    format!(
        "{prefix}\n{context}\n\n\
         Keep exactly one character centered on a solid white background with clean thick lines. \
         Expression: excited and happy.",
        prefix = prompt_prefix,
        context = cultural_context(language),
    )
}

pub fn extract_character_spec(concept: &str) -> String {
    format!(
        "Describe the character in this image precisely enough to redraw it identically in dozens of stickers.\n\
         Concept: {concept}\n\n\
         Answer with JSON containing physicalDescription, facialFeatures, colorPalette, \
         distinguishingFeatures and artStyle. Be exhaustive about facial features: eye shape, size, \
         color and spacing, nose, mouth, eyebrows, ears and cheek marks.",
        concept = concept,
    )
}

pub fn sticker_ideas(
    concept: &str,
    language: MarketLanguage,
    style_name: &str,
    spec: &CharacterSpec,
    strategy: &Strategy,
    count: usize,
) -> String {
    format!(
        "Generate {count} distinct sticker ideas for a {lang} sticker pack.\n\
         Character: {concept}\nStyle: {style}\n\
         Appearance: {appearance}\nColors: {colors}\nKey features: {features}\nArt style: {art}\n\n\
         {context}\n\n\
         Strategy: {sales}\nCultural notes: {cultural}\n\n\
         Spread the ideas over basic emotions, greetings and responses, daily actions, emphasis reactions, \
         trending humor and special occasions. No text in the images.\n\
         Answer with JSON: {{\"ideas\": [{{\"id\", \"expression\", \"action\", \"category\", \"useCase\", \
         \"imagePrompt\", \"text\"}}]}} where imagePrompt is one sentence.",
        count = count,
        lang = language,
        concept = concept,
        style = style_name,
        appearance = spec.physical_description,
        colors = spec.color_palette,
        features = spec.distinguishing_features,
        art = spec.art_style,
        context = cultural_context(language),
        sales = strategy.sales_reasoning,
        cultural = strategy.cultural_notes,
    )
}

pub fn single_sticker(idea: &StickerIdea, spec: &CharacterSpec) -> String {
    format!(
        "Draw one sticker of the character in the reference image.\n\
         Appearance: {appearance}\nColors: {colors}\nKey features: {features}\nArt style: {art}\n\
         Facial features (must not change): {face}\n\n\
         Scene: {scene}\n\n\
         Only the expression and pose change. Solid white background, square, single character, no text.",
        appearance = spec.physical_description,
        colors = spec.color_palette,
        features = spec.distinguishing_features,
        art = spec.art_style,
        face = spec.facial_features,
        scene = idea.image_prompt,
    )
}

pub fn metadata_instruction(
    language: MetaLanguage,
    strategy: Option<&Strategy>,
    spec: Option<&CharacterSpec>,
) -> String {
    let mut instruction = format!(
        "You write store listing metadata for sticker packs, natively in {label} ({native}).\n",
        label = language.label(),
        native = language.native_name(),
    );
    if let Some(strategy) = strategy {
        instruction.push_str(&format!(
            "\nSales strategy: {}\nCultural notes: {}\n",
            strategy.sales_reasoning, strategy.cultural_notes
        ));
        for insight in &strategy.persona_insights {
            let summary: String = insight.analysis.chars().take(200).collect();
            instruction.push_str(&format!("- {}: {}\n", insight.persona, summary));
        }
    }
    if let Some(spec) = spec {
        instruction.push_str(&format!(
            "\nCharacter: {}; {}; colors {}\n",
            spec.physical_description, spec.art_style, spec.color_palette
        ));
    }
    instruction.push_str(&format!(
        "\nProduce exactly 3 options with optionType personality, utility and creative. \
         Title at most {title} characters, description at most {desc} characters, exactly {tags} tags. \
         Rate each option 1-5 for naturalness, tone, searchability and creativity and give a one sentence reasoning. \
         Answer with JSON: {{\"options\": [...]}}.",
        title = TITLE_MAX_LENGTH,
        desc = DESCRIPTION_MAX_LENGTH,
        tags = TAGS_COUNT,
    ));
    instruction
}

pub const METADATA_REQUEST: &str = "Analyze these sticker images and generate three distinct metadata options \
     (personality, utility and creative focus) optimized for store discovery.";
