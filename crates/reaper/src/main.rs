#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use sy_reaper::{Reaper, ReaperConfig};
use sy_storage::SqliteStore;

fn usage() -> &'static str {
    "sy_reaper — delete derived rows of long-idle terminal jobs\n\n\
USAGE:\n\
  sy_reaper [--storage-dir DIR] [--reap-age-minutes N] [--period-sec N] [--once]\n\n\
ENVIRONMENT:\n\
  SWITCHYARD_STORAGE_DIR        storage directory (default: ./switchyard-data)\n\
  SWITCHYARD_REAP_AGE_MINUTES   reapable age threshold (default: 1440)\n\
  SWITCHYARD_REAPER_PERIOD_SEC  loop period (default: 360)\n"
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

struct Args {
    storage_dir: PathBuf,
    config: ReaperConfig,
    once: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut storage_dir = env_var("SWITCHYARD_STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./switchyard-data"));
    let mut config = ReaperConfig::default();
    if let Some(raw) = env_var("SWITCHYARD_REAP_AGE_MINUTES") {
        config.reapable_work_age_minutes = raw
            .parse()
            .map_err(|_| "SWITCHYARD_REAP_AGE_MINUTES must be an integer".to_string())?;
    }
    if let Some(raw) = env_var("SWITCHYARD_REAPER_PERIOD_SEC") {
        config.work_reaper_period_sec = raw
            .parse()
            .map_err(|_| "SWITCHYARD_REAPER_PERIOD_SEC must be an integer".to_string())?;
    }
    let mut once = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--storage-dir" => {
                let value = args.next().ok_or("--storage-dir needs a value")?;
                storage_dir = PathBuf::from(value);
            }
            "--reap-age-minutes" => {
                let value = args.next().ok_or("--reap-age-minutes needs a value")?;
                config.reapable_work_age_minutes = value
                    .parse()
                    .map_err(|_| "--reap-age-minutes must be an integer".to_string())?;
            }
            "--period-sec" => {
                let value = args.next().ok_or("--period-sec needs a value")?;
                config.work_reaper_period_sec = value
                    .parse()
                    .map_err(|_| "--period-sec must be an integer".to_string())?;
            }
            "--once" => once = true,
            "--help" | "-h" => {
                print!("{}", usage());
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if config.reapable_work_age_minutes <= 0 {
        return Err("reap age must be positive".to_string());
    }
    Ok(Args {
        storage_dir,
        config,
        once,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n\n{}", usage());
            return ExitCode::FAILURE;
        }
    };

    let store = match SqliteStore::open(&args.storage_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open store at {}: {err}", args.storage_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let mut reaper = Reaper::new(store, args.config);
    if args.once {
        match reaper.tick() {
            Ok(counts) => {
                tracing::info!(
                    work_items = counts.work_items,
                    workflow_steps = counts.workflow_steps,
                    orphaned_user_work = counts.orphaned_user_work,
                    "reap pass finished"
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!("reap pass failed: {err}");
                ExitCode::FAILURE
            }
        }
    } else {
        reaper.start();
        ExitCode::SUCCESS
    }
}
