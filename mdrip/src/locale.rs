//! Supported languages and per-field fallback resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Display language for song, artist and album names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// The game's base tables, used verbatim.
    #[default]
    Default,
    ChineseSimplified,
    ChineseTraditional,
    English,
    Japanese,
    Korean,
}

impl Language {
    /// Languages that have override tables.
    pub const EXPLICIT: [Self; 5] = [
        Self::ChineseSimplified,
        Self::ChineseTraditional,
        Self::English,
        Self::Japanese,
        Self::Korean,
    ];

    /// Suffix the game uses for this language's tables and bundles.
    pub fn table_suffix(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::ChineseSimplified => Some("ChineseS"),
            Self::ChineseTraditional => Some("ChineseT"),
            Self::English => Some("English"),
            Self::Japanese => Some("Japanese"),
            Self::Korean => Some("Korean"),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::ChineseSimplified => "Chinese Simplified",
            Self::ChineseTraditional => "Chinese Traditional",
            Self::English => "English",
            Self::Japanese => "Japanese",
            Self::Korean => "Korean",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = Error;

    /// Accepts display names, table suffixes and short codes, ignoring case,
    /// spaces, dashes and underscores.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "" | "default" | "none" => Ok(Self::Default),
            "chinesesimplified" | "chineses" | "zhhans" | "zhcn" => Ok(Self::ChineseSimplified),
            "chinesetraditional" | "chineset" | "zhhant" | "zhtw" => Ok(Self::ChineseTraditional),
            "english" | "en" => Ok(Self::English),
            "japanese" | "ja" | "jp" => Ok(Self::Japanese),
            "korean" | "ko" | "kr" => Ok(Self::Korean),
            _ => Err(Error::Config(format!("unsupported language '{s}'"))),
        }
    }
}

/// A default text with optional per-language overrides.
///
/// One slot per supported language; the set is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedString {
    default: String,
    chinese_simplified: Option<String>,
    chinese_traditional: Option<String>,
    english: Option<String>,
    japanese: Option<String>,
    korean: Option<String>,
}

impl LocalizedString {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            ..Self::default()
        }
    }

    /// Builder-style override for tests and table loading.
    #[must_use]
    pub fn with(mut self, language: Language, text: impl Into<String>) -> Self {
        self.set(language, text.into());
        self
    }

    pub fn default_text(&self) -> &str {
        &self.default
    }

    /// Set the override for `language`; `Language::Default` replaces the default.
    pub fn set(&mut self, language: Language, text: String) {
        match self.slot_mut(language) {
            Some(slot) => *slot = Some(text),
            None => self.default = text,
        }
    }

    pub fn get(&self, language: Language) -> Option<&str> {
        match language {
            Language::Default => Some(&self.default),
            Language::ChineseSimplified => self.chinese_simplified.as_deref(),
            Language::ChineseTraditional => self.chinese_traditional.as_deref(),
            Language::English => self.english.as_deref(),
            Language::Japanese => self.japanese.as_deref(),
            Language::Korean => self.korean.as_deref(),
        }
    }

    /// The text to display for `language`: its override when present and
    /// non-empty, otherwise the default.
    pub fn resolve(&self, language: Language) -> &str {
        self.get(language)
            .filter(|text| !text.is_empty())
            .unwrap_or(&self.default)
    }

    /// Apply `f` to the default and every override.
    pub fn map_all(&mut self, f: impl Fn(&str) -> String) {
        self.default = f(&self.default);
        for language in Language::EXPLICIT {
            if let Some(Some(text)) = self.slot_mut(language) {
                *text = f(text);
            }
        }
    }

    fn slot_mut(&mut self, language: Language) -> Option<&mut Option<String>> {
        match language {
            Language::Default => None,
            Language::ChineseSimplified => Some(&mut self.chinese_simplified),
            Language::ChineseTraditional => Some(&mut self.chinese_traditional),
            Language::English => Some(&mut self.english),
            Language::Japanese => Some(&mut self.japanese),
            Language::Korean => Some(&mut self.korean),
        }
    }
}
