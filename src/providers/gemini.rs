use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::language_utils::MarketLanguage;
use crate::models::{
    CharacterSpec, Evaluation, ImageBytes, MetadataOption, MetadataOptionType, PersonaInsight,
    StickerIdea, Strategy, UserInput, VisualStyle,
};
use crate::providers::{GenerationService, IdeationRequest, MetadataRequest, prompts};

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").ok());

/// Connection settings for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub endpoint: String,
    /// Model for reasoning and JSON answers
    pub text_model: String,
    /// Model for image synthesis
    pub image_model: String,
    /// Faster model for metadata writing
    pub flash_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

/// Gemini `generateContent` client
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    base_url: Url,
    settings: GeminiSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisAnswer {
    selected_visual_style_index: i64,
    cultural_notes: String,
    sales_reasoning: String,
}

#[derive(Debug, Deserialize)]
struct IdeasAnswer {
    ideas: Vec<StickerIdea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadataOption {
    option_type: MetadataOptionType,
    title: String,
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    evaluation: Evaluation,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct MetadataAnswer {
    options: Vec<RawMetadataOption>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn png(image: &ImageBytes) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: "image/png".to_string(),
                data: STANDARD.encode(image),
            }),
        }
    }
}

impl GenerateRequest {
    fn new(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: None,
            generation_config: None,
        }
    }

    fn json(mut self) -> Self {
        self.generation_config = Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        });
        self
    }

    fn image(mut self) -> Self {
        self.generation_config = Some(GenerationConfig {
            response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            ..Default::default()
        });
        self
    }

    fn system(mut self, instruction: String) -> Self {
        self.system_instruction = Some(Content {
            role: None,
            parts: vec![Part::text(instruction)],
        });
        self
    }
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .into_iter()
            .flatten()
    }

    fn text(&self, what: &str) -> Result<String, ProviderError> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse(format!("no text returned for {}", what)));
        }
        Ok(text)
    }

    fn image(&self, what: &str) -> Result<ImageBytes, ProviderError> {
        let data = self
            .parts()
            .filter_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
            .find(|d| !d.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse(format!("no image returned for {}", what)))?;
        STANDARD
            .decode(data)
            .map(ImageBytes::from)
            .map_err(|e| ProviderError::ParseError(format!("invalid image data for {}: {}", what, e)))
    }
}

/// Parse a JSON answer that may be wrapped in a markdown code fence
pub fn parse_json_answer<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    let body = CODE_FENCE
        .as_ref()
        .and_then(|fence| fence.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    serde_json::from_str(body.trim()).map_err(|e| ProviderError::ParseError(e.to_string()))
}

impl GeminiGenerator {
    pub fn new(settings: GeminiSettings) -> Result<Self, ProviderError> {
        if settings.api_key.trim().is_empty() {
            return Err(ProviderError::AuthenticationError("Gemini API key is not set".to_string()));
        }
        let base_url = Url::parse(settings.endpoint.trim_end_matches('/'))
            .map_err(|e| ProviderError::RequestFailed(format!("invalid endpoint {}: {}", settings.endpoint, e)))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.as_str().trim_end_matches('/'),
            model
        )
    }

    /// Send a request with retry and exponential backoff on transient errors
    async fn send(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let url = self.model_url(model);
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.settings.max_retries {
            let result = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.settings.api_key)
                .json(request)
                .send()
                .await;

            let error = match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<GenerateResponse>()
                        .await
                        .map_err(|e| ProviderError::ParseError(e.to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            error!("Gemini rejected the API key ({})", status);
                            return Err(ProviderError::AuthenticationError(message));
                        }
                        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(message),
                        _ => ProviderError::ApiError {
                            status_code: status.as_u16(),
                            message,
                        },
                    }
                }
                Err(e) => ProviderError::ConnectionError(e.to_string()),
            };

            if !error.is_transient() {
                error!("Gemini API error: {}", error);
                return Err(error);
            }
            warn!(
                "Gemini API error: {} - attempt {}/{}",
                error,
                attempt + 1,
                self.settings.max_retries + 1
            );
            last_error = Some(error);

            attempt += 1;
            if attempt <= self.settings.max_retries {
                tokio::time::sleep(backoff_delay(self.settings.backoff_base_ms, attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::RequestFailed(format!(
                "Gemini request failed after {} attempts",
                self.settings.max_retries + 1
            ))
        }))
    }

    async fn ask_text(&self, model: &str, parts: Vec<Part>, what: &str) -> Result<String, ProviderError> {
        self.send(model, &GenerateRequest::new(parts)).await?.text(what)
    }

    async fn ask_image(&self, parts: Vec<Part>, what: &str) -> Result<ImageBytes, ProviderError> {
        let request = GenerateRequest::new(parts).image();
        self.send(&self.settings.image_model, &request).await?.image(what)
    }

    fn with_reference(input: &UserInput, prompt: String) -> Vec<Part> {
        let mut parts = Vec::with_capacity(2);
        if let Some(reference) = input.reference_image.as_ref().filter(|r| !r.is_empty()) {
            parts.push(Part::png(reference));
        }
        parts.push(Part::text(prompt));
        parts
    }
}

#[async_trait]
impl GenerationService for GeminiGenerator {
    async fn analyze_concept(&self, input: &UserInput) -> Result<Strategy, ProviderError> {
        let model = &self.settings.text_model;
        let market = self
            .ask_text(
                model,
                Self::with_reference(input, prompts::market_analyst(&input.concept, input.language)),
                "market analysis",
            )
            .await?;

        let (art, culture) = tokio::join!(
            self.ask_text(
                model,
                Self::with_reference(input, prompts::art_director(&input.concept, input.language, &market)),
                "art direction",
            ),
            self.ask_text(
                model,
                vec![Part::text(prompts::cultural_expert(&input.concept, input.language))],
                "cultural review",
            )
        );

        let insights = vec![
            PersonaInsight { persona: "Market Analyst".to_string(), analysis: market },
            PersonaInsight { persona: "Art Director".to_string(), analysis: art? },
            PersonaInsight { persona: "Cultural Expert".to_string(), analysis: culture? },
        ];
        let summary = insights
            .iter()
            .map(|i| format!("=== {} ===\n{}", i.persona, i.analysis))
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = GenerateRequest::new(Self::with_reference(
            input,
            prompts::synthesis(&input.concept, input.language, &summary),
        ))
        .json();
        let text = self.send(model, &request).await?.text("strategy synthesis")?;
        let answer: SynthesisAnswer = parse_json_answer(&text)?;
        debug!("Synthesis picked style index {}", answer.selected_visual_style_index);

        Ok(Strategy {
            selected_visual_style_index: Strategy::clamp_style_index(answer.selected_visual_style_index),
            cultural_notes: answer.cultural_notes,
            sales_reasoning: answer.sales_reasoning,
            persona_insights: insights,
        })
    }

    async fn generate_base_character(&self, input: &UserInput) -> Result<ImageBytes, ProviderError> {
        let prompt = prompts::base_character(&input.concept, input.language, input.reference_image.is_some());
        self.ask_image(Self::with_reference(input, prompt), "base character").await
    }

    async fn generate_visual_variation(
        &self,
        base: &ImageBytes,
        style: &VisualStyle,
        language: MarketLanguage,
    ) -> Result<ImageBytes, ProviderError> {
        let parts = vec![
            Part::png(base),
            Part::text(prompts::visual_variation(style.prompt_prefix, language)),
        ];
        self.ask_image(parts, style.name).await
    }

    async fn extract_character_spec(
        &self,
        main_image: &ImageBytes,
        concept: &str,
    ) -> Result<CharacterSpec, ProviderError> {
        let request = GenerateRequest::new(vec![
            Part::png(main_image),
            Part::text(prompts::extract_character_spec(concept)),
        ])
        .json();
        let text = self
            .send(&self.settings.text_model, &request)
            .await?
            .text("character specification")?;
        parse_json_answer(&text)
    }

    async fn generate_ideas(&self, request: &IdeationRequest<'_>) -> Result<Vec<StickerIdea>, ProviderError> {
        let prompt = prompts::sticker_ideas(
            &request.input.concept,
            request.input.language,
            request.style.name,
            request.spec,
            request.strategy,
            request.count,
        );
        let text = self
            .send(&self.settings.text_model, &GenerateRequest::new(vec![Part::text(prompt)]).json())
            .await?
            .text("sticker ideas")?;
        let answer: IdeasAnswer = parse_json_answer(&text)?;
        Ok(answer.ideas)
    }

    async fn generate_one(
        &self,
        idea: &StickerIdea,
        main_image: &ImageBytes,
        spec: &CharacterSpec,
    ) -> Result<ImageBytes, ProviderError> {
        let parts = vec![Part::png(main_image), Part::text(prompts::single_sticker(idea, spec))];
        self.ask_image(parts, &format!("sticker {}", idea.id)).await
    }

    async fn generate_metadata(&self, request: &MetadataRequest<'_>) -> Result<Vec<MetadataOption>, ProviderError> {
        let mut parts: Vec<Part> = request.samples.iter().map(Part::png).collect();
        parts.push(Part::text(prompts::METADATA_REQUEST));
        let body = GenerateRequest::new(parts)
            .system(prompts::metadata_instruction(request.language, request.strategy, request.spec))
            .json();
        let text = self
            .send(&self.settings.flash_model, &body)
            .await?
            .text("metadata")?;
        let answer: MetadataAnswer = parse_json_answer(&text)?;
        Ok(answer
            .options
            .into_iter()
            .map(|option| MetadataOption {
                language: request.language,
                option_type: option.option_type,
                title: option.title,
                description: option.description,
                tags: option.tags,
                evaluation: option.evaluation,
                reasoning: option.reasoning,
            })
            .collect())
    }
}

/// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
