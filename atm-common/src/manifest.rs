//! Manifest of audio/label items
//!
//! The manifest is supplied externally as a JSON array of items. Stored
//! responses refer to items by their position in this array.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Display name used when neither the item nor its audio URI names a file
pub const DEFAULT_FILENAME: &str = "audio.wav";

/// One audio clip paired with a candidate transcription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    pub audio: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Item {
    /// Filename shown to the participant.
    ///
    /// Explicit filename first, then the last path segment of the audio URI,
    /// then [`DEFAULT_FILENAME`].
    pub fn display_filename(&self) -> String {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.audio
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string()
    }

    /// Prompt shown above the candidate transcription
    pub fn question(&self) -> String {
        format!(
            "Does the following sentence match what you heard in the audio: {}?",
            self.display_filename()
        )
    }
}

/// Non-empty, immutable list of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    items: Vec<Item>,
}

impl Manifest {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::EmptyManifest);
        }
        Ok(Self { items })
    }

    /// Parse a manifest from its JSON representation
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let items: Vec<Item> = serde_json::from_slice(bytes)?;
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, manifest_index: usize) -> Option<&Item> {
        self.items.get(manifest_index)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }
}
