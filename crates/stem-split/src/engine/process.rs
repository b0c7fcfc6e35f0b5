//! Process-backed separation engine
//!
//! Drives the `audio-separator` command line. Every separation is one child
//! process; "loading" a model validates the identifier and records the tuning
//! passed on the next invocation.
//!
//! The child's stderr carries tqdm progress bars and Python tracebacks. It is
//! copied to our own stderr through a [`ProgressTap`] so progress reaches the
//! status line, and its tail is kept for the failure diagnostic. Stdout lines
//! are logged under the `engine` target.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use super::config::EngineConfig;
use super::error::{EngineError, Result};
use super::models;
use super::{EngineFactory, SeparationEngine};
use crate::logging::ProgressTap;
use crate::sink::StatusSink;

/// Log target for lines the engine prints on stdout
pub const ENGINE_LOG_TARGET: &str = "engine";

/// Bytes of stderr kept for the failure diagnostic
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Builds [`ProcessEngine`] instances after probing the program
pub struct ProcessEngineFactory {
    program: String,
    program_args: Vec<String>,
    log_level: String,
    sink: Arc<dyn StatusSink>,
}

impl ProcessEngineFactory {
    /// Factory for `program`, reporting progress to `sink`
    pub fn new(program: impl Into<String>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            program: program.into(),
            program_args: Vec::new(),
            log_level: String::from("info"),
            sink,
        }
    }

    /// Arguments placed before everything else (e.g. `-m audio_separator`)
    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.program_args = args;
        self
    }

    /// Value passed as `--log_level`
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.program_args);
        command
    }
}

impl EngineFactory for ProcessEngineFactory {
    fn create(&self, _config: &EngineConfig) -> Result<Box<dyn SeparationEngine>> {
        let output = self
            .command()
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| EngineError::Unavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} --version exited with {}",
                self.program, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        log::info!(
            "ProcessEngine: using {} ({})",
            self.program,
            version.lines().next().unwrap_or("unknown version").trim()
        );

        Ok(Box::new(ProcessEngine {
            program: self.program.clone(),
            program_args: self.program_args.clone(),
            log_level: self.log_level.clone(),
            sink: self.sink.clone(),
            config: None,
        }))
    }
}

/// One configured `audio-separator` invocation target
pub struct ProcessEngine {
    program: String,
    program_args: Vec<String>,
    log_level: String,
    sink: Arc<dyn StatusSink>,
    config: Option<EngineConfig>,
}

impl ProcessEngine {
    fn command(&self, config: &EngineConfig, input: &Path, output_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.program_args)
            .arg(input)
            .arg("--model_filename")
            .arg(&config.model)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--output_format")
            .arg(config.output_format.as_arg())
            .arg("--demucs_shifts")
            .arg(config.shifts.to_string())
            .arg("--demucs_overlap")
            .arg(config.overlap.to_string())
            .arg("--log_level")
            .arg(&self.log_level)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl SeparationEngine for ProcessEngine {
    fn load_model(&mut self, config: &EngineConfig) -> Result<()> {
        if models::lookup(&config.model).is_none() {
            self.config = None;
            return Err(EngineError::UnknownModel(config.model.clone()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn separate(&mut self, input: &Path, output_dir: &Path) -> Result<Vec<String>> {
        let config = self.config.clone().ok_or(EngineError::NotLoaded)?;

        if !input.is_file() {
            return Err(EngineError::InputMissing {
                path: input.to_path_buf(),
            });
        }

        fs::create_dir_all(output_dir)?;
        let before = list_files(output_dir)?;

        log::info!(
            "ProcessEngine: separating {:?} with {} (shifts {}, overlap {})",
            input,
            config.model,
            config.shifts,
            config.overlap
        );

        let mut child = self
            .command(&config, input, output_dir)
            .spawn()
            .map_err(|e| {
                EngineError::ProcessFailed(format!("failed to start {}: {}", self.program, e))
            })?;

        let stderr = child.stderr.take();
        let sink = self.sink.clone();
        let stderr_thread = thread::Builder::new()
            .name("engine-stderr".to_string())
            .spawn(move || match stderr {
                Some(stderr) => pump_stderr(stderr, ProgressTap::new(io::stderr(), sink)),
                None => Vec::new(),
            })?;

        if let Some(stdout) = child.stdout.take() {
            log_stdout(stdout);
        }

        let status = child.wait()?;
        let tail = stderr_thread.join().unwrap_or_default();

        if !status.success() {
            let tail = String::from_utf8_lossy(&tail);
            return Err(EngineError::ProcessFailed(format!(
                "{}\n{}",
                status,
                tail.trim()
            )));
        }

        let after = list_files(output_dir)?;
        let produced: Vec<String> = after.difference(&before).cloned().collect();
        log::info!("ProcessEngine: produced {} file(s)", produced.len());
        Ok(produced)
    }

    fn name(&self) -> &'static str {
        "audio-separator"
    }
}

/// Log each stdout line until EOF
///
/// Lines need not be UTF-8 (track titles in legacy encodings). The pipe is
/// always drained to the end so the child never writes into a closed pipe.
fn log_stdout<R: Read>(stdout: R) {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.trim().is_empty() {
                    log::info!(target: ENGINE_LOG_TARGET, "{}", text);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("ProcessEngine: stopped logging engine output: {}", e);
                let _ = io::copy(&mut reader, &mut io::sink());
                return;
            }
        }
    }
}

/// Copy `stderr` through `tap` and return its last bytes
fn pump_stderr<R: Read, W: Write>(mut stderr: R, mut tap: ProgressTap<W>) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let _ = tap.write_all(&buf[..n]);
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    let _ = tap.flush();
    tail
}

/// Names of regular files directly inside `dir`
fn list_files(dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}
