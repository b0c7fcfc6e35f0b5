//! Separation run coordinator
//!
//! Sequences one run through its states and owns the failure boundary:
//!
//! ```text
//! Idle ──start──▶ Preparing ──▶ Separating ──▶ Reconciling ──▶ Done
//!                     │              │               │
//!                     └──────────────┴───────────────┴──────▶ Failed
//! ```
//!
//! `Done`/`Failed` return to `Idle` when the worker releases its slot. Errors
//! from any step are logged with full detail (durable log only) and replaced
//! by one generic status line on the user-facing channel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use thiserror::Error;

use crate::engine::{EngineCache, EngineConfig};
use crate::logging::LogFunnel;
use crate::reconcile::{reconcile, ReconcileReport, StemClassifier};
use crate::sink::StatusSink;

/// Audio extensions accepted as input (case-insensitive)
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac"];

/// Shown when nothing is selected
pub const NO_FILE_SELECTED: &str = "No file selected";

/// Coordinator state, reported through [`StatusSink::state_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Separating,
    Reconciling,
    Done,
    Failed,
}

impl RunState {
    /// Whether a run is in flight (controls stay disabled)
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RunState::Preparing | RunState::Separating | RunState::Reconciling
        )
    }
}

/// Rejected input, before any run starts
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("File not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Unsupported file type {0:?} (expected mp3, wav or flac)")]
    UnsupportedExtension(PathBuf),

    #[error("Output folder for {0:?} would be inside the input's own folder")]
    OutputBesideInput(PathBuf),
}

/// Rejected start request
#[derive(Error, Debug)]
pub enum StartError {
    #[error("No file selected")]
    NoInput,

    #[error("A separation is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Check that `path` is an existing file with an accepted extension
pub fn validate_input(path: &Path) -> Result<(), InputError> {
    let accepted = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|a| a.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false);
    if !accepted {
        return Err(InputError::UnsupportedExtension(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    Ok(())
}

/// Currently selected input file, as the picker leaves it
#[derive(Debug, Clone, Default)]
pub struct Selection {
    path: Option<PathBuf>,
    can_start: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a picker result
    ///
    /// An empty pick disables start but keeps the previous path. An invalid
    /// file is rejected and leaves the selection unchanged.
    pub fn pick(&mut self, picked: Option<PathBuf>) -> Result<(), InputError> {
        match picked {
            None => {
                self.can_start = false;
                Err(InputError::NoFileSelected)
            }
            Some(path) => {
                validate_input(&path)?;
                log::info!("Selected {:?}", path);
                self.path = Some(path);
                self.can_start = true;
                Ok(())
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn can_start(&self) -> bool {
        self.can_start && self.path.is_some()
    }

    /// Text for the selection label
    pub fn label(&self) -> String {
        match (&self.path, self.can_start) {
            (Some(path), true) => path.display().to_string(),
            _ => NO_FILE_SELECTED.to_string(),
        }
    }

    /// Selected path, only while start is enabled
    pub fn startable(&self) -> Result<&Path, StartError> {
        match self.path.as_deref() {
            Some(path) if self.can_start => Ok(path),
            _ => Err(StartError::NoInput),
        }
    }
}

/// Everything one run needs; fixed once the run starts
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationRequest {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub engine: EngineConfig,
}

impl SeparationRequest {
    pub fn new(input: impl Into<PathBuf>, output_root: impl Into<PathBuf>, engine: EngineConfig) -> Self {
        Self {
            input: input.into(),
            output_root: output_root.into(),
            engine,
        }
    }

    /// `<output_root>/<input stem>`, made absolute
    pub fn output_dir(&self) -> Result<PathBuf, InputError> {
        let stem = self
            .input
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| InputError::UnsupportedExtension(self.input.clone()))?;

        let root = if self.output_root.is_absolute() {
            self.output_root.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.output_root))
                .unwrap_or_else(|_| self.output_root.clone())
        };
        let dir = root.join(stem);

        let Some(input_dir) = self
            .input
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        else {
            return Ok(dir);
        };
        let root_resolved = root.canonicalize().unwrap_or_else(|_| root.clone());
        let dir_resolved = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        if root_resolved == input_dir || dir_resolved == input_dir {
            return Err(InputError::OutputBesideInput(self.input.clone()));
        }

        Ok(dir)
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Absolute output directory
    pub output_dir: PathBuf,
    pub reconcile: ReconcileReport,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done(RunReport),
    /// Carries the generic user-facing message only
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Done(report) => Some(report),
            RunOutcome::Failed(_) => None,
        }
    }
}

/// Runs separations against the shared engine cache
pub struct SeparationCoordinator {
    cache: Arc<Mutex<EngineCache>>,
    classifier: StemClassifier,
    sink: Arc<dyn StatusSink>,
    log_path: Option<PathBuf>,
    log_view: Option<LogFunnel>,
}

impl SeparationCoordinator {
    pub fn new(
        cache: Arc<Mutex<EngineCache>>,
        classifier: StemClassifier,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            cache,
            classifier,
            sink,
            log_path: None,
            log_view: None,
        }
    }

    /// Durable log referenced by failure messages
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    /// Funnel whose display log is cleared when a run starts
    pub fn with_log_view(mut self, funnel: LogFunnel) -> Self {
        self.log_view = Some(funnel);
        self
    }

    pub fn sink(&self) -> &Arc<dyn StatusSink> {
        &self.sink
    }

    /// Run one separation to a terminal state
    ///
    /// An unusable output location is an input error: it is reported on the
    /// status line without entering any run state.
    pub fn run(&self, request: &SeparationRequest) -> RunOutcome {
        match request.output_dir() {
            Ok(output_dir) => self.run_in(request, output_dir),
            Err(e) => {
                log::warn!("{}", e);
                self.sink.update_status(&e.to_string());
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run with an output directory already resolved by the caller
    pub(crate) fn run_in(&self, request: &SeparationRequest, output_dir: PathBuf) -> RunOutcome {
        if let Some(view) = &self.log_view {
            view.display().clear();
        }
        self.sink.clear_log();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(request, output_dir)))
            .unwrap_or_else(|payload| Err(anyhow!("Separation panicked: {}", panic_text(&*payload))));

        match result {
            Ok(report) => {
                let summary = report.reconcile.final_names().join(", ");
                log::info!("Produced: {}", if summary.is_empty() { "nothing" } else { summary.as_str() });
                if report.reconcile.has_warnings() {
                    log::warn!(
                        "{} produced file(s) were skipped, see log above",
                        report.reconcile.skipped.len()
                    );
                }
                let status = format!("Success! Output saved to {}", report.output_dir.display());
                log::info!("{}", status);
                self.sink.update_status(&status);
                self.enter(RunState::Done);
                RunOutcome::Done(report)
            }
            Err(e) => {
                log::error!("Error during separation.\n{:?}", e);
                let message = self.failure_message();
                self.sink.update_status(&message);
                self.enter(RunState::Failed);
                RunOutcome::Failed(message)
            }
        }
    }

    fn execute(&self, request: &SeparationRequest, output_dir: PathBuf) -> anyhow::Result<RunReport> {
        self.enter(RunState::Preparing);
        self.sink.update_status("Preparing...");

        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
        let output_dir = output_dir.canonicalize().unwrap_or(output_dir);
        log::info!("Processing {:?} into {:?}", request.input, output_dir);

        self.enter(RunState::Separating);
        self.sink.update_status("Separating... this may take a while");

        let produced = {
            let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            let engine = cache
                .ensure_ready(&request.engine)
                .context("Failed to prepare separation engine")?;
            engine
                .separate(&request.input, &output_dir)
                .with_context(|| format!("Separation of {:?} failed", request.input))?
        };
        log::info!("Engine reported {} file(s)", produced.len());

        self.enter(RunState::Reconciling);
        self.sink.update_status("Renaming stems...");
        let reconcile = reconcile(&self.classifier, &output_dir, &produced);

        Ok(RunReport {
            output_dir,
            reconcile,
        })
    }

    pub(crate) fn failure_message(&self) -> String {
        match &self.log_path {
            Some(path) => format!("Error during separation. See {} for details.", path.display()),
            None => "Error during separation. See the log for details.".to_string(),
        }
    }

    fn enter(&self, state: RunState) {
        log::debug!("Coordinator: -> {:?}", state);
        self.sink.state_changed(state);
    }
}

/// Message carried by a panic payload
fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{FakeCounters, FakeFactory, FakeOutput};
    use crate::sink::{ChannelSink, UiEvent};
    use std::fs;

    fn demucs_outputs() -> Vec<FakeOutput> {
        vec![
            FakeOutput::written("{stem}_(Vocals)_model.wav", "new vocals"),
            FakeOutput::written("{stem}_(Drums)_model.wav", "new drums"),
        ]
    }

    fn coordinator(factory: FakeFactory) -> (SeparationCoordinator, crossbeam::channel::Receiver<UiEvent>) {
        let (sink, rx) = ChannelSink::new();
        let cache = Arc::new(Mutex::new(EngineCache::new(Box::new(factory))));
        (
            SeparationCoordinator::new(cache, StemClassifier::default(), Arc::new(sink)),
            rx,
        )
    }

    fn song(dir: &Path) -> PathBuf {
        let input = dir.join("music").join("song.mp3");
        fs::create_dir_all(input.parent().unwrap()).unwrap();
        fs::write(&input, "audio").unwrap();
        input
    }

    #[test]
    fn test_output_dir_is_under_root_not_beside_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let request = SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default());

        let out = request.output_dir().unwrap();

        assert!(out.ends_with("output/song"));
        assert!(out.is_absolute());
        assert_ne!(out.parent(), input.parent());
    }

    #[test]
    fn test_output_dir_equal_to_input_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("output").join("song").join("song.wav");
        fs::create_dir_all(input.parent().unwrap()).unwrap();
        fs::write(&input, "audio").unwrap();

        let request = SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default());
        assert!(matches!(
            request.output_dir(),
            Err(InputError::OutputBesideInput(_))
        ));
    }

    #[test]
    fn test_end_to_end_canonical_names_and_absolute_status() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let factory = FakeFactory::new(FakeCounters::default()).with_outputs(demucs_outputs());
        let (coordinator, rx) = coordinator(factory);

        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        let report = outcome.report().expect("run should succeed").clone();
        assert_eq!(report.reconcile.final_names(), vec!["vocal.wav", "drums.wav"]);
        assert!(report.output_dir.is_absolute());
        assert_eq!(fs::read_to_string(report.output_dir.join("vocal.wav")).unwrap(), "new vocals");

        let events: Vec<UiEvent> = rx.try_iter().collect();
        let expected = format!("Success! Output saved to {}", report.output_dir.display());
        assert!(events.contains(&UiEvent::Status(expected)));

        let states: Vec<RunState> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::State(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                RunState::Preparing,
                RunState::Separating,
                RunState::Reconciling,
                RunState::Done
            ]
        );
    }

    #[test]
    fn test_existing_vocal_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let out = dir.path().join("output").join("song");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("vocal.wav"), "A").unwrap();

        let factory = FakeFactory::new(FakeCounters::default()).with_outputs(demucs_outputs());
        let (coordinator, _rx) = coordinator(factory);
        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        assert!(outcome.is_success());
        assert_eq!(fs::read_to_string(out.join("vocal.wav")).unwrap(), "A");
        assert_eq!(fs::read_to_string(out.join("vocal_1.wav")).unwrap(), "new vocals");
    }

    #[test]
    fn test_failure_message_is_generic() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let factory = FakeFactory::new(FakeCounters::default())
            .with_outputs(demucs_outputs())
            .failing_separation();
        let (coordinator, rx) = coordinator(factory);
        let coordinator = coordinator.with_log_path(Some(PathBuf::from("/tmp/stem-split.log")));

        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        assert_eq!(
            outcome,
            RunOutcome::Failed(
                "Error during separation. See /tmp/stem-split.log for details.".to_string()
            )
        );
        for event in rx.try_iter() {
            if let UiEvent::Status(s) | UiEvent::Log(s) = event {
                assert!(!s.contains("Traceback"), "leaked detail: {}", s);
                assert!(!s.contains("inference crashed"), "leaked detail: {}", s);
            }
        }
    }

    #[test]
    fn test_construction_failure_fails_run_and_retries_next_time() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let counters = FakeCounters::default();
        let (coordinator, rx) = coordinator(FakeFactory::failing(counters.clone()));
        let request = SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default());

        assert!(!coordinator.run(&request).is_success());
        assert!(!coordinator.run(&request).is_success());
        assert!(rx.try_iter().any(|e| e == UiEvent::State(RunState::Failed)));
        assert_eq!(counters.created(), 0);
    }

    #[test]
    fn test_cache_loads_once_for_identical_config() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let counters = FakeCounters::default();
        let factory = FakeFactory::new(counters.clone()).with_outputs(demucs_outputs());
        let (coordinator, _rx) = coordinator(factory);
        let request = SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default());

        assert!(coordinator.run(&request).is_success());
        assert!(coordinator.run(&request).is_success());
        assert_eq!(counters.loads(), 1);

        let retuned = SeparationRequest {
            engine: EngineConfig {
                shifts: 5,
                ..EngineConfig::default()
            },
            ..request
        };
        assert!(coordinator.run(&retuned).is_success());
        assert_eq!(counters.loads(), 2);
        assert_eq!(counters.separations(), 3);
    }

    #[test]
    fn test_selection_keeps_path_on_empty_pick() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let mut selection = Selection::new();
        assert_eq!(selection.label(), NO_FILE_SELECTED);
        assert!(matches!(selection.startable(), Err(StartError::NoInput)));

        selection.pick(Some(input.clone())).unwrap();
        assert!(selection.can_start());
        assert_eq!(selection.label(), input.display().to_string());

        assert_eq!(selection.pick(None), Err(InputError::NoFileSelected));
        assert_eq!(selection.path(), Some(input.as_path()));
        assert!(!selection.can_start());
        assert_eq!(selection.label(), NO_FILE_SELECTED);
    }

    #[test]
    fn test_selection_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        fs::write(&text, "x").unwrap();
        let upper = dir.path().join("LOUD.FLAC");
        fs::write(&upper, "x").unwrap();

        let mut selection = Selection::new();
        assert!(matches!(
            selection.pick(Some(text)),
            Err(InputError::UnsupportedExtension(_))
        ));
        assert!(selection.path().is_none());
        assert!(selection.pick(Some(upper)).is_ok());
        assert!(matches!(
            validate_input(&dir.path().join("missing.wav")),
            Err(InputError::NotFound(_))
        ));
    }

    #[test]
    fn test_output_root_equal_to_input_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let music = input.parent().unwrap().to_path_buf();

        let request = SeparationRequest::new(&input, &music, EngineConfig::default());
        assert!(matches!(
            request.output_dir(),
            Err(InputError::OutputBesideInput(_))
        ));

        // Same folder spelled differently
        let dotted = SeparationRequest::new(&input, music.join("."), EngineConfig::default());
        assert!(matches!(
            dotted.output_dir(),
            Err(InputError::OutputBesideInput(_))
        ));
    }

    #[test]
    fn test_output_root_next_to_input_dir_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let request = SeparationRequest::new(&input, dir.path(), EngineConfig::default());
        assert!(request.output_dir().unwrap().ends_with("song"));
    }

    #[test]
    fn test_rejected_output_location_enters_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let counters = FakeCounters::default();
        let (coordinator, rx) = coordinator(FakeFactory::new(counters.clone()));

        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            input.parent().unwrap(),
            EngineConfig::default(),
        ));

        assert!(!outcome.is_success());
        assert!(!rx.try_iter().any(|e| matches!(e, UiEvent::State(_))));
        assert_eq!(counters.created(), 0);
    }

    #[test]
    fn test_engine_panic_becomes_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let factory = FakeFactory::new(FakeCounters::default()).panicking_separation();
        let (coordinator, rx) = coordinator(factory);

        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        let message = "Error during separation. See the log for details.".to_string();
        assert_eq!(outcome, RunOutcome::Failed(message.clone()));
        let events: Vec<UiEvent> = rx.try_iter().collect();
        assert!(events.contains(&UiEvent::Status(message)));
        assert_eq!(events.last(), Some(&UiEvent::State(RunState::Failed)));
    }

    #[test]
    fn test_unmovable_stem_is_skipped_and_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let factory = FakeFactory::new(FakeCounters::default()).with_outputs(vec![
            FakeOutput::written("{stem}_(Vocals)_model.wav", "v"),
            FakeOutput::written("{stem}_(Instrumental)_model.wav", "i"),
        ]);
        let (sink, rx) = ChannelSink::new();
        let cache = Arc::new(Mutex::new(EngineCache::new(Box::new(factory))));
        // Longer than any filesystem allows for one name
        let classifier = StemClassifier::default()
            .with_rule(crate::reconcile::StemRule::new("Instrumental", "x".repeat(300)));
        let coordinator = SeparationCoordinator::new(cache, classifier, Arc::new(sink));

        let outcome = coordinator.run(&SeparationRequest::new(
            &input,
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        let report = outcome.report().expect("run should still complete").clone();
        assert_eq!(report.reconcile.final_names(), vec!["vocal.wav"]);
        assert_eq!(report.reconcile.skipped.len(), 1);
        assert!(matches!(
            report.reconcile.skipped[0].reason,
            crate::reconcile::SkipReason::MoveFailed(_)
        ));
        assert!(report.output_dir.join("song_(Instrumental)_model.wav").exists());
        assert!(rx.try_iter().any(|e| e == UiEvent::State(RunState::Done)));
    }

    #[test]
    fn test_log_view_is_cleared_when_run_starts() {
        let dir = tempfile::tempdir().unwrap();
        let input = song(dir.path());
        let funnel = LogFunnel::new(crate::logging::FunnelConfig::default()).unwrap();
        funnel.display().push("line from the previous run");

        let factory = FakeFactory::new(FakeCounters::default()).with_outputs(demucs_outputs());
        let (coordinator, rx) = coordinator(factory);
        let coordinator = coordinator.with_log_view(funnel.clone());

        assert!(coordinator
            .run(&SeparationRequest::new(
                &input,
                dir.path().join("output"),
                EngineConfig::default(),
            ))
            .is_success());

        assert!(!funnel
            .display()
            .lines()
            .iter()
            .any(|l| l.contains("previous run")));
        assert_eq!(rx.try_iter().next(), Some(UiEvent::ClearLog));
    }
}
