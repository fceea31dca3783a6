//! Translation direction: the source/target language pair of a single call.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Direction of one translation request.
///
/// The wire strings (`indonesia-japanese` / `japanese-indonesia`) are part of
/// the public API and of the persisted history records, so they are fixed here
/// rather than derived from the variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "indonesia-japanese")]
    IndonesiaJapanese,
    #[serde(rename = "japanese-indonesia")]
    JapaneseIndonesia,
}

impl Direction {
    /// Parse a direction from its wire string.
    pub fn from_str(value: &str) -> Result<Direction> {
        match value {
            "indonesia-japanese" => Ok(Direction::IndonesiaJapanese),
            "japanese-indonesia" => Ok(Direction::JapaneseIndonesia),
            other => bail!("Unknown translation direction: '{}'", other),
        }
    }

    /// The wire string for this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::IndonesiaJapanese => "indonesia-japanese",
            Direction::JapaneseIndonesia => "japanese-indonesia",
        }
    }

    /// ISO 639-1 code of the source language.
    pub fn source_lang(&self) -> &'static str {
        match self {
            Direction::IndonesiaJapanese => "id",
            Direction::JapaneseIndonesia => "ja",
        }
    }

    /// ISO 639-1 code of the target language.
    pub fn target_lang(&self) -> &'static str {
        match self {
            Direction::IndonesiaJapanese => "ja",
            Direction::JapaneseIndonesia => "id",
        }
    }

    /// The opposite direction.
    pub fn reversed(&self) -> Direction {
        match self {
            Direction::IndonesiaJapanese => Direction::JapaneseIndonesia,
            Direction::JapaneseIndonesia => Direction::IndonesiaJapanese,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
