use std::fs::File;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use mediabin::cli::{render_table, AssetSummary, Args};
use mediabin::config::{self, BinSettings, PathConfig};
use mediabin::entities::bin::Bin;
use mediabin::entities::status::ClipStatus;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| path_config.config_file(config::LOG_FILE));
        let file = File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn run(args: Args) -> Result<bool> {
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.config_file(config::SETTINGS_FILE);
    let mut settings = BinSettings::load(&settings_path)?;
    if let Some(workers) = args.workers {
        settings.workers = workers.max(1);
    }
    if args.generate_proxy {
        settings.generate_proxy = true;
    }
    info!("Config path: {}", settings_path.display());
    info!("Cache path: {}", path_config.cache_dir().display());

    let bin = Bin::new(settings, path_config.cache_dir())?;
    for file in &args.files {
        bin.import(file);
    }
    if !bin.wait_idle(Duration::from_secs(args.timeout)) {
        warn!("Timed out with {} jobs pending", bin.pending_jobs());
    }

    let rows: Vec<AssetSummary> = bin.assets().iter().map(|a| AssetSummary::from_asset(a)).collect();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows).context("Failed to serialize report")?);
    } else {
        print!("{}", render_table(&rows));
    }

    let missing = bin.assets().iter().filter(|a| a.status() == ClipStatus::Missing).count();
    if missing > 0 {
        warn!("{} of {} assets missing", missing, bin.len());
    }
    Ok(missing == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
