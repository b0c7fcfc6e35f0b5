//! Single-slot background worker
//!
//! At most one separation runs at a time. The slot is claimed with an atomic
//! compare-exchange before the thread is spawned, so a second start is refused
//! synchronously at the call site. The slot is released by a drop guard on
//! every exit path (success, failure, panic), which also reports `Idle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::coordinator::{
    validate_input, RunOutcome, RunState, SeparationCoordinator, SeparationRequest, StartError,
};
use crate::sink::StatusSink;

/// Releases the run slot and re-enables controls when dropped
struct SlotGuard {
    active: Arc<AtomicBool>,
    sink: Arc<dyn StatusSink>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.sink.state_changed(RunState::Idle);
    }
}

/// Handle to an in-flight run
pub struct RunHandle {
    handle: JoinHandle<RunOutcome>,
    fallback: String,
}

impl RunHandle {
    /// Block until the run finishes
    pub fn join(self) -> RunOutcome {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!("Separation worker panicked");
                RunOutcome::Failed(self.fallback)
            }
        }
    }
}

/// Owns the coordinator and the one run slot
pub struct SeparationWorker {
    coordinator: Arc<SeparationCoordinator>,
    active: Arc<AtomicBool>,
}

impl SeparationWorker {
    pub fn new(coordinator: SeparationCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run currently holds the slot
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start `request` on a background thread
    ///
    /// Input errors and a busy slot are rejected here, before any thread
    /// exists and without changing state.
    pub fn start(&self, request: SeparationRequest) -> Result<RunHandle, StartError> {
        validate_input(&request.input)?;
        let output_dir = request.output_dir()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Start ignored: a separation is already running");
            return Err(StartError::AlreadyRunning);
        }

        let guard = SlotGuard {
            active: self.active.clone(),
            sink: self.coordinator.sink().clone(),
        };
        let coordinator = self.coordinator.clone();
        let fallback = coordinator.failure_message();

        log::info!("Starting separation of {:?}", request.input);
        let handle = thread::Builder::new()
            .name("separation-worker".to_string())
            .spawn(move || {
                let _guard = guard;
                coordinator.run_in(&request, output_dir)
            })?;

        Ok(RunHandle { handle, fallback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::InputError;
    use crate::engine::fake::{FakeCounters, FakeFactory, FakeOutput};
    use crate::engine::{EngineCache, EngineConfig};
    use crate::reconcile::StemClassifier;
    use crate::sink::{ChannelSink, UiEvent};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    fn worker(factory: FakeFactory) -> (SeparationWorker, crossbeam::channel::Receiver<UiEvent>) {
        let (sink, rx) = ChannelSink::new();
        let cache = Arc::new(Mutex::new(EngineCache::new(Box::new(factory))));
        let coordinator =
            SeparationCoordinator::new(cache, StemClassifier::default(), Arc::new(sink));
        (SeparationWorker::new(coordinator), rx)
    }

    fn input_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "audio").unwrap();
        path
    }

    fn outputs() -> Vec<FakeOutput> {
        vec![
            FakeOutput::written("{stem}_(Vocals)_model.wav", "v"),
            FakeOutput::written("{stem}_(Drums)_model.wav", "d"),
        ]
    }

    #[test]
    fn test_run_ends_idle_and_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path(), "song.mp3");
        let (worker, rx) = worker(FakeFactory::new(FakeCounters::default()).with_outputs(outputs()));

        let outcome = worker
            .start(SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default()))
            .unwrap()
            .join();

        assert!(outcome.is_success());
        assert!(!worker.is_running());
        let states: Vec<RunState> = rx
            .try_iter()
            .filter_map(|e| match e {
                UiEvent::State(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(states.last(), Some(&RunState::Idle));
        assert_eq!(states[states.len() - 2], RunState::Done);
    }

    #[test]
    fn test_failed_run_still_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path(), "song.wav");
        let (worker, rx) = worker(
            FakeFactory::new(FakeCounters::default())
                .with_outputs(outputs())
                .failing_separation(),
        );

        let outcome = worker
            .start(SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default()))
            .unwrap()
            .join();

        assert!(!outcome.is_success());
        assert!(!worker.is_running());
        let states: Vec<UiEvent> = rx
            .try_iter()
            .filter(|e| matches!(e, UiEvent::State(_)))
            .collect();
        assert_eq!(
            &states[states.len() - 2..],
            &[UiEvent::State(RunState::Failed), UiEvent::State(RunState::Idle)]
        );
    }

    #[test]
    fn test_second_start_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path(), "song.mp3");
        let (release, gate) = crossbeam::channel::unbounded();
        let counters = FakeCounters::default();
        let (worker, _rx) = worker(
            FakeFactory::new(counters.clone())
                .with_outputs(outputs())
                .gated(gate),
        );
        let request =
            SeparationRequest::new(&input, dir.path().join("output"), EngineConfig::default());

        let first = worker.start(request.clone()).unwrap();
        assert!(worker.is_running());
        assert!(matches!(
            worker.start(request.clone()),
            Err(StartError::AlreadyRunning)
        ));

        release.send(()).unwrap();
        assert!(first.join().is_success());
        assert_eq!(counters.separations(), 1);

        release.send(()).unwrap();
        assert!(worker.start(request).unwrap().join().is_success());
        assert_eq!(counters.separations(), 2);
        assert_eq!(counters.loads(), 1);
    }

    #[test]
    fn test_invalid_input_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let counters = FakeCounters::default();
        let (worker, rx) = worker(FakeFactory::new(counters.clone()));

        let result = worker.start(SeparationRequest::new(
            dir.path().join("missing.mp3"),
            dir.path().join("output"),
            EngineConfig::default(),
        ));

        assert!(matches!(result, Err(StartError::Input(_))));
        assert!(!worker.is_running());
        assert!(rx.try_iter().next().is_none());
        assert_eq!(counters.created(), 0);
    }

    #[test]
    fn test_output_in_input_folder_rejected_before_any_state() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path(), "song.mp3");
        let counters = FakeCounters::default();
        let (worker, rx) = worker(FakeFactory::new(counters.clone()).with_outputs(outputs()));

        let result = worker.start(SeparationRequest::new(
            &input,
            dir.path(),
            EngineConfig::default(),
        ));

        assert!(matches!(
            result,
            Err(StartError::Input(InputError::OutputBesideInput(_)))
        ));
        assert!(!worker.is_running());
        assert!(!rx.try_iter().any(|e| matches!(e, UiEvent::State(_))));
        assert_eq!(counters.created(), 0);
    }
}
