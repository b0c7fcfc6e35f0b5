//! Separation engine abstraction
//!
//! The separation engine is an opaque, model-backed collaborator: given an
//! input file it writes stem files into an output directory and reports their
//! names. This module defines the seam the rest of the crate talks to, the
//! cache that keeps one loaded engine alive across runs, and a process-backed
//! implementation driving the `audio-separator` command line.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     EngineCache                          │
//! │  • Holds at most one engine + the config it was loaded   │
//! │  • Reloads only when the config changes                  │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │      EngineFactory / SeparationEngine (traits)           │
//! │  • create() - construct an engine instance               │
//! │  • load_model() / separate()                             │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │    ProcessEngine    │
//!                   │  (audio-separator)  │
//!                   └─────────────────────┘
//! ```

mod cache;
mod config;
mod error;
pub mod models;
mod process;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;

pub use cache::EngineCache;
pub use config::{EngineConfig, OutputFormat};
pub use error::{EngineError, Result};
pub use models::ModelInfo;
pub use process::{ProcessEngine, ProcessEngineFactory, ENGINE_LOG_TARGET};

/// A loaded (or loadable) separation engine instance
///
/// Instances are owned by [`EngineCache`] and only ever driven from one run
/// at a time.
pub trait SeparationEngine: Send {
    /// Apply `config` and (re)load its model
    ///
    /// Fails with [`EngineError::UnknownModel`] when the identifier is not
    /// recognised by the engine.
    fn load_model(&mut self, config: &EngineConfig) -> Result<()>;

    /// Separate `input` into stems written under `output_dir`
    ///
    /// Returns the produced filenames relative to `output_dir`. The engine
    /// does not guarantee those files exist; callers must check.
    fn separate(&mut self, input: &Path, output_dir: &Path) -> Result<Vec<String>>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// Constructs engine instances for the cache
pub trait EngineFactory: Send + Sync {
    /// Build a fresh, not yet loaded engine for `config`
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn SeparationEngine>>;
}
