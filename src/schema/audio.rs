/// Audio data collection and the playback back-end boundary.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("unknown audio id: {0}")]
    UnknownId(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

fn default_volume() -> f32 {
    1.0
}

/// A clip addressable from the script by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDefinition {
    pub id: String,
    /// Opaque clip reference handed to the audio back-end.
    pub clip: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub looping: bool,
}

/// The configured set of clips a script may reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioCollection {
    pub definitions: Vec<AudioDefinition>,
}

impl AudioCollection {
    pub fn new(definitions: Vec<AudioDefinition>) -> Self {
        Self { definitions }
    }

    /// Load a collection from a RON file containing a list of definitions.
    pub fn load_from_ron(path: &Path) -> Result<AudioCollection, AudioError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<AudioCollection, AudioError> {
        let definitions: Vec<AudioDefinition> = ron::from_str(input)?;
        Ok(Self { definitions })
    }

    pub fn find(&self, id: &str) -> Option<&AudioDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&AudioDefinition, AudioError> {
        self.find(id).ok_or_else(|| AudioError::UnknownId(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Playback back-end driven by the audio module. Implementations own
/// their mixing state and use interior mutability where needed.
pub trait AudioPlayer {
    fn play_one_shot(&self, clip: &AudioDefinition);
    fn fade_in_and_play(&self, clip: &AudioDefinition);
    fn fade_out_and_stop(&self, clip: &AudioDefinition);
}
