//! Language codes understood by the recognizers and translators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoxsubError;

/// An ISO 639-1 language code, plus `auto` for "let the model decide".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    Auto,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "zh")]
    Chinese,
}

impl LanguageCode {
    /// Every known code, `Auto` first.
    pub const ALL: [LanguageCode; 5] = [
        LanguageCode::Auto,
        LanguageCode::Korean,
        LanguageCode::English,
        LanguageCode::Japanese,
        LanguageCode::Chinese,
    ];

    /// The wire/file code, e.g. `"en"`.
    pub fn code(&self) -> &'static str {
        match self {
            LanguageCode::Auto => "auto",
            LanguageCode::Korean => "ko",
            LanguageCode::English => "en",
            LanguageCode::Japanese => "ja",
            LanguageCode::Chinese => "zh",
        }
    }

    /// Look up a code, ignoring case and any region suffix (`en-US`, `zh_CN`).
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|lang| lang.code() == primary)
    }

    /// Whether this is a concrete language rather than `Auto`.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, LanguageCode::Auto)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LanguageCode {
    type Err = VoxsubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| VoxsubError::unsupported_language(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        assert_eq!(LanguageCode::from_code("ko"), Some(LanguageCode::Korean));
        assert_eq!(LanguageCode::from_code("EN"), Some(LanguageCode::English));
        assert_eq!(LanguageCode::from_code("zh-CN"), Some(LanguageCode::Chinese));
        assert_eq!(LanguageCode::from_code("ja_JP"), Some(LanguageCode::Japanese));
        assert_eq!(LanguageCode::from_code("fr"), None);
    }

    #[test]
    fn test_parse_unknown_is_unsupported() {
        let err = "xx".parse::<LanguageCode>().unwrap_err();
        assert!(matches!(err, VoxsubError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&LanguageCode::Japanese).unwrap();
        assert_eq!(json, "\"ja\"");
        let back: LanguageCode = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(back, LanguageCode::Auto);
    }
}
