/// Director configuration, loadable from RON.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::binding::duration_from_seconds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Command that pauses every channel of every running module.
    pub global_wait_command: String,
    /// Stitch appended to a knot id to find its entry point
    /// (`"<knot>.<stitch>"`). `None` uses the knot id as the path.
    pub entry_stitch: Option<String>,
    /// Advance once right after a story starts. Disable to display the
    /// first line manually.
    pub display_first_line_on_start: bool,
    pub skip_interval_seconds: f32,
    /// Reveal a covered screen before each story starts and cover it again
    /// once the story ends. Stages may override this.
    pub auto_story_fade: bool,
    pub story_fade_duration_seconds: f32,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            global_wait_command: "wait".to_string(),
            entry_stitch: Some("begin".to_string()),
            display_first_line_on_start: true,
            skip_interval_seconds: 0.2,
            auto_story_fade: true,
            story_fade_duration_seconds: 1.0,
        }
    }
}

impl DirectorConfig {
    pub fn load_from_ron(path: &Path) -> Result<DirectorConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<DirectorConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    /// Script path of a knot's entry point.
    pub fn entry_path(&self, knot: &str) -> String {
        match self.entry_stitch.as_deref() {
            Some(stitch) if !stitch.is_empty() => format!("{}.{}", knot, stitch),
            _ => knot.to_string(),
        }
    }

    pub fn skip_interval(&self) -> Duration {
        duration_from_seconds(self.skip_interval_seconds)
    }

    pub fn story_fade_duration(&self) -> Duration {
        duration_from_seconds(self.story_fade_duration_seconds)
    }
}
