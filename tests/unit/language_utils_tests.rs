/*!
 * Tests for market and metadata languages
 */

use stickerflow::language_utils::{
    META_LANGUAGES, MarketLanguage, MetaLanguage, get_language_name, resolve_metadata_languages,
    validate_language_code,
};

#[test]
fn test_validateLanguageCode_withSupportedCodes_shouldParse() {
    assert_eq!(validate_language_code("en").unwrap(), MetaLanguage::En);
    assert_eq!(validate_language_code("zh-TW").unwrap(), MetaLanguage::ZhTw);
    assert_eq!(validate_language_code("zh-CN").unwrap(), MetaLanguage::ZhCn);
}

#[test]
fn test_validateLanguageCode_withUnknownOrUnsupportedCode_shouldFail() {
    assert!(validate_language_code("xx").is_err());
    assert!(validate_language_code("fr").is_err());
    assert!(validate_language_code("").is_err());
}

#[test]
fn test_getLanguageName_shouldReturnEnglishLabel() {
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
    assert_eq!(get_language_name("en").unwrap(), "English");
}

#[test]
fn test_marketLanguage_metadataLanguage_shouldMapEachMarket() {
    assert_eq!(MarketLanguage::Korean.metadata_language(), MetaLanguage::Ko);
    assert_eq!(MarketLanguage::Japanese.metadata_language(), MetaLanguage::Ja);
    assert_eq!(MarketLanguage::TraditionalChinese.metadata_language(), MetaLanguage::ZhTw);
}

#[test]
fn test_resolveMetadataLanguages_shouldKeepConfiguredOrder() {
    let resolved = resolve_metadata_languages(
        &[MetaLanguage::En, MetaLanguage::Ja, MetaLanguage::En],
        MarketLanguage::Korean,
    );
    assert_eq!(resolved, vec![MetaLanguage::En, MetaLanguage::Ja]);
}

#[test]
fn test_metaLanguage_codes_shouldRoundTripThroughSerde() {
    for language in META_LANGUAGES {
        let json = serde_json::to_string(&language).unwrap();
        assert_eq!(json, format!("\"{}\"", language.code()));
    }
}
