//! Word records the corridor is built from

use serde::{Deserialize, Serialize};

/// One vocabulary card as supplied by the lesson layer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSource {
    pub word: String,
    pub translation: String,
    pub transcription: String,
    pub example: String,
    /// Picture for the card face, relative to the tile source's root
    pub image_path: Option<String>,
}

impl CardSource {
    pub fn new(word: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation: translation.into(),
            ..Default::default()
        }
    }

    /// Text fields carried by every instance and interaction proxy
    pub fn metadata(&self) -> CardMetadata {
        CardMetadata {
            word: self.word.clone(),
            translation: self.translation.clone(),
            transcription: self.transcription.clone(),
            example: self.example.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardMetadata {
    pub word: String,
    pub translation: String,
    pub transcription: String,
    pub example: String,
}

/// Parse a JSON array of cards
pub fn cards_from_json(text: &str) -> crate::core::Result<Vec<CardSource>> {
    Ok(serde_json::from_str(text)?)
}
