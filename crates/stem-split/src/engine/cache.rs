//! Lifecycle cache for the separation engine
//!
//! Model loads are the expensive part of a run, so the cache keeps the last
//! engine alive together with the exact [`EngineConfig`] it was loaded with
//! and skips the reload when the next run asks for the same config.

use super::config::EngineConfig;
use super::error::{EngineError, Result};
use super::{EngineFactory, SeparationEngine};

/// An engine together with the configuration it was last loaded with
struct CachedEngine {
    engine: Box<dyn SeparationEngine>,
    config: EngineConfig,
}

/// Owns zero or one live engine instance
pub struct EngineCache {
    factory: Box<dyn EngineFactory>,
    slot: Option<CachedEngine>,
    /// Number of successful model loads (diagnostics)
    loads: u64,
}

impl EngineCache {
    /// Create an empty cache; the engine is built lazily on first use
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            factory,
            slot: None,
            loads: 0,
        }
    }

    /// Return an engine ready to separate with `config`
    ///
    /// - empty cache: construct and load
    /// - same config (field for field): return the cached engine untouched
    /// - different config: reload the cached engine with the new config
    ///
    /// On any failure the slot is left empty so the next run starts clean.
    pub fn ensure_ready(&mut self, config: &EngineConfig) -> Result<&mut dyn SeparationEngine> {
        match self.slot.take() {
            Some(cached) if cached.config == *config => {
                log::debug!(
                    "EngineCache: reusing {} with model {}",
                    cached.engine.name(),
                    config.model
                );
                self.slot = Some(cached);
            }
            previous => {
                let mut engine = match previous {
                    Some(cached) => {
                        log::info!(
                            "EngineCache: configuration changed ({} -> {}), reloading",
                            cached.config.model,
                            config.model
                        );
                        cached.engine
                    }
                    None => {
                        log::info!("EngineCache: creating separation engine");
                        self.factory.create(config)?
                    }
                };

                log::info!("Loading model {}...", config.model);
                engine.load_model(config)?;
                log::info!("Model loaded.");

                self.loads += 1;
                self.slot = Some(CachedEngine {
                    engine,
                    config: config.clone(),
                });
            }
        }

        match self.slot.as_mut() {
            Some(cached) => Ok(cached.engine.as_mut()),
            None => Err(EngineError::NotLoaded),
        }
    }

    /// Configuration of the cached engine, if any
    pub fn current_config(&self) -> Option<&EngineConfig> {
        self.slot.as_ref().map(|c| &c.config)
    }

    /// Whether an engine is currently held
    pub fn is_loaded(&self) -> bool {
        self.slot.is_some()
    }

    /// Number of model loads performed so far
    pub fn load_count(&self) -> u64 {
        self.loads
    }

    /// Drop the cached engine
    pub fn clear(&mut self) {
        if self.slot.take().is_some() {
            log::info!("EngineCache: engine released");
        }
    }
}
