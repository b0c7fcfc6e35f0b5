//! Catalogue of separation models the engine understands

/// Model loaded when nothing else is configured
pub const DEFAULT_MODEL: &str = "htdemucs_ft.yaml";

/// Static description of a separation model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    /// Identifier passed to the engine
    pub id: &'static str,
    /// Display name for the front end
    pub display_name: &'static str,
    /// Short description of the stems produced
    pub description: &'static str,
    /// Number of output stems
    pub stem_count: usize,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "htdemucs_ft.yaml",
        display_name: "HT-Demucs fine-tuned",
        description: "Vocals, Drums, Bass, Other - best quality, slowest",
        stem_count: 4,
    },
    ModelInfo {
        id: "htdemucs.yaml",
        display_name: "HT-Demucs",
        description: "Vocals, Drums, Bass, Other - fast and efficient",
        stem_count: 4,
    },
    ModelInfo {
        id: "htdemucs_6s.yaml",
        display_name: "HT-Demucs 6-stem",
        description: "Adds Guitar and Piano stems",
        stem_count: 6,
    },
    ModelInfo {
        id: "hdemucs_mmi.yaml",
        display_name: "Hybrid Demucs MMI",
        description: "Vocals, Drums, Bass, Other - trained on extra data",
        stem_count: 4,
    },
];

/// All known models, in presentation order
pub fn all() -> &'static [ModelInfo] {
    MODELS
}

/// Look up a model by identifier (exact match)
pub fn lookup(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}
