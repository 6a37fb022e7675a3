/*!
 * Tests for configuration loading and validation
 */

use std::time::Duration;

use stickerflow::app_config::{Config, LogLevel, ProviderKind};
use stickerflow::models::PlatformId;
use stickerflow::pipeline::gate::ConfirmMode;

use crate::common::create_temp_dir;

fn mock_config() -> Config {
    let mut config = Config::default();
    config.generation.provider = ProviderKind::Mock;
    config
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.batch.max_concurrency, 3);
    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.generation.provider, ProviderKind::Gemini);
    assert_eq!(reloaded.log_level, LogLevel::Info);
}

#[test]
fn test_load_withInvalidJson_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn test_load_shouldParseEnumsAndPlatforms() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(
        &path,
        r#"{
            "generation": {"provider": "mock"},
            "confirm_mode": "interactive",
            "platforms": ["line_emoji"],
            "processing": {"outline": "black", "outline_thickness": 5},
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.generation.provider, ProviderKind::Mock);
    assert_eq!(config.confirm_mode, ConfirmMode::Interactive);
    assert_eq!(config.platforms, vec![PlatformId::LineEmoji]);
    assert_eq!(config.processing.outline_thickness, 5);
    assert!(config.processing.remove_background);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withOpacityAbove100_shouldFail() {
    let mut config = mock_config();
    config.processing.outline_opacity = 150;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withNoPlatforms_shouldFail() {
    let mut config = mock_config();
    config.platforms.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withHugeRetryCount_shouldFail() {
    let mut config = mock_config();
    config.generation.retry_count = 64;
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("retry_count"));

    config.generation.retry_count = 10;
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_geminiWithConfiguredKey_shouldPass() {
    let mut config = Config::default();
    config.generation.api_key = "test-key".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_pipelineConfig_shouldConvertDelayAndLanguages() {
    let mut config = mock_config();
    config.batch.max_concurrency = 5;
    config.batch.inter_batch_delay_ms = 1500;
    config.metadata_languages = vec!["zh-TW".to_string(), "en".to_string()];
    config.confirm_mode = ConfirmMode::Interactive;

    let pipeline = config.pipeline_config().unwrap();

    assert_eq!(pipeline.batch.max_concurrency, 5);
    assert_eq!(pipeline.batch.inter_batch_delay, Duration::from_millis(1500));
    assert_eq!(pipeline.confirm_mode, ConfirmMode::Interactive);
    assert_eq!(pipeline.metadata_languages.len(), 2);
}

#[test]
fn test_providerKind_fromStr_shouldBeCaseInsensitive() {
    assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
    assert_eq!("MOCK".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
    assert!("openai".parse::<ProviderKind>().is_err());
}
