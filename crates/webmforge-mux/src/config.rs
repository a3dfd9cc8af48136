//! Muxer configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use webmforge_ebml::model::DEFAULT_TIMECODE_SCALE;
use webmforge_ebml::{Error, Result};

/// Settings for a [`Segment`](crate::Segment).
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MuxerConfig {
    /// Maximum encoded cluster size in bytes (0 = unlimited)
    #[serde(default)]
    pub max_cluster_size: u64,

    /// Maximum cluster duration in nanoseconds (0 = unlimited)
    #[serde(default)]
    pub max_cluster_duration: u64,

    /// Write a Cues element at finalize
    #[serde(default = "default_output_cues")]
    pub output_cues: bool,

    /// Only key frames on this track generate cue points
    #[serde(default)]
    pub cues_track: Option<u64>,

    /// Start a new cluster on every video key frame
    #[serde(default)]
    pub new_cluster_on_video_key: bool,

    /// Nanoseconds per tick
    #[serde(default = "default_timecode_scale")]
    pub timecode_scale: u64,

    #[serde(default = "default_doc_type")]
    pub doc_type: String,

    #[serde(default = "default_app")]
    pub muxing_app: String,

    #[serde(default = "default_app")]
    pub writing_app: String,

    /// Fixed segment duration in ticks, instead of the computed one
    #[serde(default)]
    pub duration: Option<f64>,
}

fn default_output_cues() -> bool {
    true
}

fn default_timecode_scale() -> u64 {
    DEFAULT_TIMECODE_SCALE
}

fn default_doc_type() -> String {
    "webm".to_string()
}

fn default_app() -> String {
    concat!("webmforge-", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            max_cluster_size: 0,
            max_cluster_duration: 0,
            output_cues: default_output_cues(),
            cues_track: None,
            new_cluster_on_video_key: false,
            timecode_scale: default_timecode_scale(),
            doc_type: default_doc_type(),
            muxing_app: default_app(),
            writing_app: default_app(),
            duration: None,
        }
    }
}

impl MuxerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::validation(format!("Failed to parse muxer config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::validation(format!("Failed to serialize muxer config: {e}")))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.timecode_scale == 0 {
            return Err(Error::validation("timecode_scale cannot be 0"));
        }
        if self.doc_type.is_empty() {
            return Err(Error::validation("doc_type cannot be empty"));
        }
        if self.cues_track == Some(0) {
            return Err(Error::validation("cues_track cannot be 0"));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(Error::validation(format!("invalid duration {duration}")));
            }
        }
        Ok(())
    }
}
