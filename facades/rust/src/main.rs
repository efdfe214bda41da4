//! Binary entry point: parses the CLI, wires up logging and
//! persistence, drives the GPU dispatch engine to completion or
//! cancellation, and writes the resume/progress state on the way out.
//!
//! New module (the teacher is a library with no binary); grounded in
//! the corpus-wide `clap` + `tracing`/`tracing-subscriber` convention
//! this pack's binaries use for exactly this shape of long-running,
//! loggable CLI tool. Every fallible path here already terminates in a
//! `GpuError`/`io::Error` with an explicit log-and-continue or
//! log-and-exit policy, so `anyhow` adds nothing and is not carried.

mod cli;
mod persistence;
mod watcher;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use cli::{ColourLevel, Cli};
use collatz_search_gpu::{init_engine, CancelFlag, DeviceRequirements};
use tracing_subscriber::fmt::writer::MakeWriterExt;

const DEFAULT_CANCEL_KEY: u8 = b'q';
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(cli: &Cli, working_dir: &PathBuf) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(working_dir, "debug.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let ansi = match cli.colour_level {
        ColourLevel::None => false,
        ColourLevel::All => true,
        ColourLevel::Tty => std::io::stdout().is_terminal(),
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.output_level.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    guard
}

fn main() -> ExitCode {
    let cli = cli::parse_tolerant(std::env::args().collect());
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let _logging_guard = init_logging(&cli, &working_dir);

    if cli.extension_layers || cli.profile_layers || cli.log_allocations {
        tracing::warn!(
            "--extension-layers/--profile-layers/--log-allocations are accepted for CLI \
             compatibility but have no portable wgpu equivalent; they do not change runtime behaviour"
        );
    }
    tracing::debug!(
        iter_size = %format!("{:?}", cli.iter_size),
        "shader arithmetic is always two u32 limbs (64 working bits); --iter-size is logged, not yet threaded into shader variant selection"
    );

    let state = persistence::load(&working_dir, cli.restart_count);
    let cancel = CancelFlag::new();

    let requirements = DeviceRequirements {
        require_shader_int64: cli.prefer_int64,
        require_storage_16bit: cli.prefer_int16,
    };

    let engine_result = pollster::block_on(init_engine(
        requirements,
        cli.max_memory,
        state.position,
        cancel.clone(),
        cli.validation_layers,
    ));

    let mut engine = match engine_result {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(
                operation = "init_engine",
                max_memory = cli.max_memory,
                prefer_int16 = cli.prefer_int16,
                prefer_int64 = cli.prefer_int64,
                error = %err,
                "fatal: GPU initialisation failed; no device/memory/pipeline fallback is attempted"
            );
            return ExitCode::FAILURE;
        }
    };

    if let Some(cache) = persistence::load_pipeline_cache(&working_dir) {
        tracing::debug!(bytes = cache.len(), "loaded pipeline cache blob");
    }

    let _watcher = watcher::spawn_watcher(DEFAULT_CANCEL_KEY, cancel.clone());
    tracing::info!(cancel_key = %(DEFAULT_CANCEL_KEY as char), "press the cancel key then Enter to stop cleanly");

    // §6 ties a nonzero exit code to hard initialisation failure only;
    // a steady-state submit/wait failure still drains in-flight slots,
    // flushes whatever records and position were recovered, and exits
    // 0 like any other clean shutdown (see DESIGN.md).
    loop {
        let started = Instant::now();
        match engine.run_dispatch() {
            Ok(outcome) => {
                if cli.query_benchmarking {
                    tracing::info!(elapsed_ms = started.elapsed().as_millis(), records = outcome.records_found, "dispatch timing");
                }
                if outcome.cancelled {
                    break;
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "dispatch submit/wait failed; draining in-flight work and shutting down");
                break;
            }
        }
    }

    engine.drain_in_flight(SHUTDOWN_DRAIN_TIMEOUT);

    persistence::save(&working_dir, engine.position(), engine.records());
    if cli.capture_pipelines {
        // No portable wgpu pipeline-cache bytes are currently captured
        // from `ResourceSet`; this records the operator's intent so a
        // future backend with `wgpu::Features::PIPELINE_CACHE` has
        // somewhere to write. See DESIGN.md.
        persistence::save_pipeline_cache(&working_dir, &[]);
    }

    tracing::info!(
        records_found = engine.records().len(),
        cur_start_value = %engine.position().cur_start_value,
        "shutdown complete"
    );

    ExitCode::SUCCESS
}
