mod aggregator;
mod capture;
mod config;
mod error;
mod frame;
mod gateway;
mod pipeline;
mod rep_writer;
mod segmentation;
mod session;
mod stream;

use aggregator::Axis;
use capture::CaptureTransport;
use config::Config;
use error::SessionError;
use gateway::{JsonlGateway, MemoryGateway, PersistenceGateway};
use pipeline::PipelineHandle;
use rep_writer::RepWriter;
use session::{SetSummary, WorkoutSession};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use stream::LinkState;
use tokio::runtime::Runtime;

const USAGE: &str = "usage: repstream <capture> [--exercise NAME] [--weight KG] [--dry-run]";

const SAVE_ATTEMPTS: u32 = 3;
const SAVE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
struct Args {
    capture: PathBuf,
    exercise: String,
    weight: f32,
    dry_run: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut capture = None;
    let mut exercise = "Unknown".to_string();
    let mut weight = 0.0;
    let mut dry_run = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--exercise" => {
                exercise = args.next().ok_or("--exercise needs a value")?;
            }
            "--weight" => {
                let value = args.next().ok_or("--weight needs a value")?;
                weight = value
                    .parse::<f32>()
                    .ok()
                    .filter(|w| w.is_finite() && *w >= 0.0)
                    .ok_or_else(|| format!("invalid weight: {}", value))?;
            }
            "--dry-run" => dry_run = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option: {}", flag)),
            path if capture.is_none() => capture = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument: {}", extra)),
        }
    }

    Ok(Args {
        capture: capture.ok_or("missing capture file")?,
        exercise,
        weight,
        dry_run,
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Using default config: {}", e);
        Config::default()
    });
    let frames = capture::load_capture(&args.capture)?;

    let runtime = Runtime::new()?;
    let mut dry_run_store = None;
    let mut journal_path = None;
    let gateway: Arc<dyn PersistenceGateway> = if args.dry_run {
        log::info!("Dry run: workout data is kept in memory only");
        let memory = Arc::new(MemoryGateway::new());
        dry_run_store = Some(memory.clone());
        memory
    } else {
        let journal = JsonlGateway::open(config.output_dir())?;
        journal_path = Some(journal.path().to_path_buf());
        Arc::new(journal)
    };

    let link = LinkState::new();
    let (sender, stream) = stream::channel(config.frame_queue_capacity, link.clone());
    let rep_writer = RepWriter::spawn(runtime.handle(), gateway.clone(), config.rep_queue_capacity);
    let session = WorkoutSession::new(gateway, rep_writer, config.segmentation.clone(), link);
    let pipeline = pipeline::spawn(session, stream, runtime.handle().clone())?;

    let transport = CaptureTransport::new(frames, config.replay_interval());
    let stop = transport.stop_flag();

    runtime.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, ending set");
                stop.store(true, Ordering::Relaxed);
            }
        });

        let connected = transport.connect(sender)?;
        pipeline.start_workout().await?;
        pipeline.start_set(&args.exercise, args.weight).await?;

        let replay = connected.start_streaming()?;
        let delivered = tokio::task::spawn_blocking(move || replay.join())
            .await?
            .map_err(|_| "capture replay thread panicked")?;
        log::debug!("Replay delivered {} frames", delivered);

        let summary = pipeline.end_set().await;
        if let Err(e) = &summary {
            log::warn!("{}", e);
        }
        let unsaved = save_pending_sets(&pipeline, SAVE_ATTEMPTS, SAVE_RETRY_DELAY).await?;
        let ended = pipeline.end_workout().await;
        let stats = pipeline.shutdown().await?;

        match &summary {
            Ok(summary) => print_summary(summary),
            Err(SessionError::Persistence { .. }) if unsaved == 0 => println!("set saved after retry"),
            Err(_) => {}
        }
        println!(
            "reps saved: {} (failed {}, dropped {})",
            stats.saved, stats.failed, stats.dropped
        );
        if let Some(path) = &journal_path {
            println!("journal: {}", path.display());
        }
        if let Some(memory) = &dry_run_store {
            println!("{}", serde_json::to_string_pretty(&memory.workouts())?);
        }

        if unsaved > 0 {
            return Err(format!("{} set(s) could not be saved", unsaved).into());
        }
        ended?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Retry failed set saves; returns how many sets are still unsaved
async fn save_pending_sets(
    pipeline: &PipelineHandle,
    attempts: u32,
    delay: Duration,
) -> Result<usize, SessionError> {
    for attempt in 1..=attempts {
        let pending = pipeline.snapshot().await?.pending_saves;
        if pending == 0 {
            return Ok(0);
        }

        log::info!("Retrying {} unsaved set(s), attempt {}/{}", pending, attempt, attempts);
        match pipeline.retry_pending_saves().await {
            Ok(saved) => log::info!("Saved {} pending set(s)", saved),
            Err(e) => {
                log::warn!("{}", e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Ok(pipeline.snapshot().await?.pending_saves)
}

fn print_summary(summary: &SetSummary) {
    println!(
        "{} @ {:.1}: {} rep(s) over {} samples",
        summary.exercise_type, summary.weight, summary.rep_count, summary.sample_count
    );
    println!("workout {} / set {}", summary.workout_id, summary.set_id);
    if summary.columns.is_empty() {
        println!("no samples recorded");
        return;
    }

    if let (Some(first), Some(last)) = (summary.columns.timestamps.first(), summary.columns.timestamps.last()) {
        println!("device time {} .. {} ms", first, last);
    }
    for axis in Axis::all() {
        let (min, max) = summary
            .columns
            .column(axis)
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        println!("  {:<15} {:>9.3} .. {:.3}", axis.column_name(), min, max);
    }
}
