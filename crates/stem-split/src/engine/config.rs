//! Engine configuration types

use serde::{Deserialize, Serialize};

use super::models;

/// Configuration an engine instance is built and loaded with
///
/// The cache compares the whole struct, so changing any field (not only the
/// model) forces a reload on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier passed to the engine (e.g. `htdemucs_ft.yaml`)
    pub model: String,

    /// Number of random shifts for shift augmentation (0 disables it)
    pub shifts: u32,

    /// Overlap fraction between processing segments, in `[0.0, 1.0)`
    pub overlap: f32,

    /// Audio container the engine writes stems in
    pub output_format: OutputFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: models::DEFAULT_MODEL.to_string(),
            shifts: 2,
            overlap: 0.25,
            output_format: OutputFormat::Wav,
        }
    }
}

impl EngineConfig {
    /// Upper bound for shift augmentation (each shift is a full extra pass)
    pub const MAX_SHIFTS: u32 = 20;

    /// Upper bound for the overlap fraction (must stay below 1.0)
    pub const MAX_OVERLAP: f32 = 0.99;

    /// Validate configuration values
    pub fn validate(&mut self) {
        self.shifts = self.shifts.min(Self::MAX_SHIFTS);
        if !self.overlap.is_finite() {
            self.overlap = Self::default().overlap;
        }
        self.overlap = self.overlap.clamp(0.0, Self::MAX_OVERLAP);
        let trimmed = self.model.trim();
        if trimmed.is_empty() {
            self.model = models::DEFAULT_MODEL.to_string();
        } else if trimmed.len() != self.model.len() {
            self.model = trimmed.to_string();
        }
    }
}

/// Output container written by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    #[default]
    Wav,
    Flac,
    Mp3,
}

impl OutputFormat {
    /// Name passed on the engine command line
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Wav => "WAV",
            Self::Flac => "FLAC",
            Self::Mp3 => "MP3",
        }
    }

    /// File extension of produced stems
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
        }
    }

    /// All formats (for CLI enumeration)
    pub fn all() -> &'static [Self] {
        &[Self::Wav, Self::Flac, Self::Mp3]
    }

    /// Parse a user-supplied format name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|f| f.as_arg().eq_ignore_ascii_case(name.trim()))
    }
}
