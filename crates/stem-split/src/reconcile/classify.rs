//! Stem classification from engine filenames
//!
//! The engine names its outputs after the input plus the stem and model, e.g.
//! `song_(Vocals)_htdemucs_ft.wav`. The classifier maps such a name to a
//! canonical output name (`vocal`, `drums`, ...) using an ordered keyword
//! table: the first rule whose keyword matches wins.

use serde::{Deserialize, Serialize};

/// One (keyword, canonical name) rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemRule {
    /// Case-sensitive keyword searched for in the filename
    pub keyword: String,
    /// Output basename (without extension) for matching files
    pub canonical: String,
}

impl StemRule {
    pub fn new(keyword: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            canonical: canonical.into(),
        }
    }

    /// `(K)`, then `_K_`, then bare `K` anywhere in the filename
    pub fn matches(&self, filename: &str) -> bool {
        if self.keyword.is_empty() {
            return false;
        }
        let k = self.keyword.as_str();
        filename.contains(&format!("({})", k))
            || filename.contains(&format!("_{}_", k))
            || filename.contains(k)
    }
}

/// Built-in rules in precedence order
///
/// The table is global: every model variant is classified against all six
/// stems, even four-stem models that never produce guitar or piano.
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    ("Vocals", "vocal"),
    ("Drums", "drums"),
    ("Bass", "bass"),
    ("Other", "other"),
    ("Guitar", "guitar"),
    ("Piano", "piano"),
];

/// Ordered keyword classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemClassifier {
    rules: Vec<StemRule>,
}

impl StemClassifier {
    /// Classifier over an explicit rule list (order is precedence)
    pub fn new(rules: Vec<StemRule>) -> Self {
        Self { rules }
    }

    /// Append a rule with the lowest precedence
    pub fn with_rule(mut self, rule: StemRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[StemRule] {
        &self.rules
    }

    /// Canonical name for `filename`, or `None` when no keyword matches
    pub fn classify(&self, filename: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(filename))
            .map(|rule| rule.canonical.as_str())
    }

    /// Canonical name with the source file's extension appended
    ///
    /// `song_(Vocals)_model.wav` → `vocal.wav`
    pub fn target_name(&self, filename: &str) -> Option<String> {
        let canonical = self.classify(filename)?;
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str());
        Some(match extension {
            Some(ext) => format!("{}.{}", canonical, ext),
            None => canonical.to_string(),
        })
    }
}

impl Default for StemClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(k, c)| StemRule::new(*k, *c))
                .collect(),
        )
    }
}
