//! stem-split command line front end
//!
//! Separates one audio file into stems and files them under
//! `<output root>/<track name>/` with canonical names. Settings come from
//! `~/.config/stem-split/config.yaml`; flags override them for this run.
//!
//! ## Examples
//!
//! ```text
//! stem-split song.mp3
//! stem-split song.flac --model htdemucs_6s.yaml --shifts 4 --format FLAC
//! stem-split --list-models
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::LevelFilter;

use stem_split::config::{self, Config};
use stem_split::coordinator::{RunOutcome, RunState, SeparationRequest, Selection};
use stem_split::engine::{models, EngineCache, OutputFormat, ProcessEngineFactory};
use stem_split::logging::{FunnelConfig, LogFunnel, ProgressMatcher};
use stem_split::sink::StatusSink;
use stem_split::worker::SeparationWorker;

#[derive(Parser, Debug)]
#[command(name = "stem-split", version, about = "Split a song into stems with stable file names")]
struct Args {
    /// Audio file to separate (mp3, wav or flac)
    input: Option<PathBuf>,

    /// Model identifier (see --list-models)
    #[arg(long)]
    model: Option<String>,

    /// Number of random shifts averaged per prediction
    #[arg(long)]
    shifts: Option<u32>,

    /// Overlap between prediction windows, 0.0 to 0.99
    #[arg(long)]
    overlap: Option<f32>,

    /// Output format: WAV, FLAC or MP3
    #[arg(long)]
    format: Option<String>,

    /// Root folder receiving one subfolder per track
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the known models and exit
    #[arg(long)]
    list_models: bool,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save_config: bool,
}

/// Prints status changes to the terminal
///
/// Log lines already reach the console through env_logger and progress bars
/// through the engine's own stderr, so only plain status lines are printed.
struct ConsoleSink {
    matcher: ProgressMatcher,
}

impl StatusSink for ConsoleSink {
    fn append_log(&self, _line: &str) {}

    fn update_status(&self, line: &str) {
        if self.matcher.is_progress(line) {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "» {}", line);
    }

    fn state_changed(&self, state: RunState) {
        log::debug!("state: {:?}", state);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_models {
        print_models();
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_models() {
    println!("Available models:");
    for model in models::all() {
        let marker = if model.id == models::DEFAULT_MODEL { " (default)" } else { "" };
        println!(
            "  {:<20} {} - {} stems{}\n  {:<20} {}",
            model.id, model.display_name, model.stem_count, marker, "", model.description
        );
    }
}

/// Returns whether the separation succeeded
fn run(args: Args) -> Result<bool> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(&config_path);
    apply_overrides(&mut config, &args)?;
    config.validate();

    let funnel = LogFunnel::new(FunnelConfig {
        log_file: Some(config.log_file.clone()),
        display_capacity: config.display_capacity,
        level: LevelFilter::Info,
        quiet_targets: config.quiet_targets.clone(),
    })?;
    funnel.install()?;
    log::info!("stem-split {} starting up", env!("CARGO_PKG_VERSION"));
    log::info!("Config: {:?}", config_path);

    if args.save_config {
        config::save_config(&config, &config_path)?;
    }

    let Some(input) = args.input else {
        if args.save_config {
            return Ok(true);
        }
        return Err(anyhow!("No file selected (pass an mp3, wav or flac file)"));
    };

    let mut selection = Selection::new();
    selection
        .pick(Some(input))
        .context("Cannot use input file")?;
    let input = selection.startable()?.to_path_buf();

    let sink: Arc<dyn StatusSink> = Arc::new(ConsoleSink {
        matcher: ProgressMatcher::new(),
    });
    funnel.set_sink(sink.clone());

    let factory = ProcessEngineFactory::new(config.engine.program.clone(), sink.clone())
        .with_program_args(config.engine.program_args.clone())
        .with_log_level(config.engine.log_level.clone());
    let cache = Arc::new(Mutex::new(EngineCache::new(Box::new(factory))));
    let coordinator = stem_split::SeparationCoordinator::new(cache, config.classifier(), sink)
        .with_log_path(funnel.log_path().map(|p| p.to_path_buf()))
        .with_log_view(funnel.clone());
    let worker = SeparationWorker::new(coordinator);

    let request = SeparationRequest::new(
        input,
        config.output_root.clone(),
        config.engine.separation.clone(),
    );
    let outcome = worker.start(request)?.join();
    funnel.flush();

    match outcome {
        RunOutcome::Done(report) => {
            println!();
            println!("Output folder: {}", report.output_dir.display());
            for placed in &report.reconcile.placed {
                println!("  {}", placed.final_name);
            }
            for skipped in &report.reconcile.skipped {
                println!("  skipped {} ({:?})", skipped.source, skipped.reason);
            }
            Ok(true)
        }
        RunOutcome::Failed(message) => {
            eprintln!("{}", message);
            Ok(false)
        }
    }
}

fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    let engine = &mut config.engine.separation;
    if let Some(model) = &args.model {
        if models::lookup(model).is_none() {
            return Err(anyhow!(
                "Unknown model {:?} (use --list-models to see the choices)",
                model
            ));
        }
        engine.model = model.clone();
    }
    if let Some(shifts) = args.shifts {
        engine.shifts = shifts;
    }
    if let Some(overlap) = args.overlap {
        engine.overlap = overlap;
    }
    if let Some(format) = &args.format {
        engine.output_format = OutputFormat::parse(format)
            .ok_or_else(|| anyhow!("Unknown output format {:?} (WAV, FLAC or MP3)", format))?;
    }
    if let Some(root) = &args.output_root {
        config.output_root = root.clone();
    }
    Ok(())
}
