//! stillframed - keyframe snapshots from RTSP cameras
//!
//! This daemon:
//! 1. Loads the camera list and capture policy from a JSON config
//! 2. Starts one supervisor thread per camera
//! 3. Writes a still image per camera every capture interval
//! 4. Runs until SIGINT or SIGTERM

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use stillframe::{CancelToken, Fleet, StillframeConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture keyframe snapshots from RTSP cameras",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long, env = "STILLFRAME_CONFIG", value_name = "config")]
    config: PathBuf,

    /// Print help.
    #[allow(dead_code)]
    #[arg(short = 'h', short_alias = '?', long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version and exit.
    #[allow(dead_code)]
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(args) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Arc::new(StillframeConfig::load(&args.config)?);
    log::info!(
        "stillframed {} loaded {}: {} cameras, interval {}s, output {}",
        env!("CARGO_PKG_VERSION"),
        args.config.display(),
        config.cameras.len(),
        config.interval_secs,
        config.save_path.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting signal handler")?;

    let cancel = CancelToken::new();
    let fleet = Fleet::new(config).start(&cancel)?;

    log::info!("stillframed waiting for shutdown signal (Ctrl-C / SIGTERM)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping {} supervisors", fleet.len());
    fleet.cancel();

    Ok(())
}
