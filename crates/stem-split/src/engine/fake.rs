//! In-memory engine used by tests
//!
//! Counts constructions and model loads, and "separates" by writing a
//! scripted list of files into the output directory.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::Receiver;

use super::config::EngineConfig;
use super::error::{EngineError, Result};
use super::models;
use super::{EngineFactory, SeparationEngine};

/// Shared counters observed by tests
#[derive(Clone, Default)]
pub(crate) struct FakeCounters {
    created: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    separations: Arc<AtomicUsize>,
    loaded_models: Arc<Mutex<Vec<String>>>,
}

impl FakeCounters {
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn separations(&self) -> usize {
        self.separations.load(Ordering::SeqCst)
    }

    pub(crate) fn loaded_models(&self) -> Vec<String> {
        self.loaded_models.lock().unwrap().clone()
    }
}

/// A scripted engine output: filename template and the content to write
///
/// `{stem}` in the name is replaced with the input file stem. `None` content
/// means the engine reports the file without writing it.
#[derive(Clone)]
pub(crate) struct FakeOutput {
    pub name: String,
    pub content: Option<String>,
}

impl FakeOutput {
    pub(crate) fn written(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: Some(content.to_string()),
        }
    }

    pub(crate) fn phantom(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct FakeFactory {
    counters: FakeCounters,
    fail_create: bool,
    fail_separate: bool,
    panic_separate: bool,
    outputs: Vec<FakeOutput>,
    gate: Option<Receiver<()>>,
}

impl FakeFactory {
    pub(crate) fn new(counters: FakeCounters) -> Self {
        Self {
            counters,
            fail_create: false,
            fail_separate: false,
            panic_separate: false,
            outputs: Vec::new(),
            gate: None,
        }
    }

    pub(crate) fn failing(counters: FakeCounters) -> Self {
        Self {
            fail_create: true,
            ..Self::new(counters)
        }
    }

    pub(crate) fn with_outputs(mut self, outputs: Vec<FakeOutput>) -> Self {
        self.outputs = outputs;
        self
    }

    pub(crate) fn failing_separation(mut self) -> Self {
        self.fail_separate = true;
        self
    }

    pub(crate) fn panicking_separation(mut self) -> Self {
        self.panic_separate = true;
        self
    }

    /// Each separation blocks until a message arrives on `gate`
    pub(crate) fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl EngineFactory for FakeFactory {
    fn create(&self, _config: &EngineConfig) -> Result<Box<dyn SeparationEngine>> {
        if self.fail_create {
            return Err(EngineError::Unavailable("fake engine refused".to_string()));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            counters: self.counters.clone(),
            fail_separate: self.fail_separate,
            panic_separate: self.panic_separate,
            outputs: self.outputs.clone(),
            gate: self.gate.clone(),
            loaded: None,
        }))
    }
}

struct FakeEngine {
    counters: FakeCounters,
    fail_separate: bool,
    panic_separate: bool,
    outputs: Vec<FakeOutput>,
    gate: Option<Receiver<()>>,
    loaded: Option<String>,
}

impl SeparationEngine for FakeEngine {
    fn load_model(&mut self, config: &EngineConfig) -> Result<()> {
        if models::lookup(&config.model).is_none() {
            self.loaded = None;
            return Err(EngineError::UnknownModel(config.model.clone()));
        }
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        self.counters
            .loaded_models
            .lock()
            .unwrap()
            .push(config.model.clone());
        self.loaded = Some(config.model.clone());
        Ok(())
    }

    fn separate(&mut self, input: &Path, output_dir: &Path) -> Result<Vec<String>> {
        if self.loaded.is_none() {
            return Err(EngineError::NotLoaded);
        }
        self.counters.separations.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if self.panic_separate {
            panic!("fake engine blew up");
        }
        if self.fail_separate {
            return Err(EngineError::SeparationFailed(
                "inference crashed\nTraceback: fake frame 1\nfake frame 2".to_string(),
            ));
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut produced = Vec::new();
        for output in &self.outputs {
            let name = output.name.replace("{stem}", &stem);
            if let Some(content) = &output.content {
                std::fs::write(output_dir.join(&name), content)?;
            }
            produced.push(name);
        }
        Ok(produced)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
