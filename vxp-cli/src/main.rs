//! `vxp`: background estimation and camera calibration over camera directories

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};
use vxp_io::pipeline::{CalibrationStatus, RunSummary, Stage};

#[derive(Parser)]
#[command(name = "vxp")]
#[command(about = "Prepare per-camera background images and intrinsic calibrations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the static background of every camera.
    Background(StageArgs),
    /// Calibrate every camera from its calibration video.
    Calibrate(StageArgs),
    /// Background estimation followed by calibration.
    Run(StageArgs),
}

#[derive(clap::Args)]
struct StageArgs {
    /// Pipeline configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Only process this camera directory.
    #[arg(long)]
    camera: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (stage, args) = match cli.command {
        Commands::Background(args) => (Stage::Background, args),
        Commands::Calibrate(args) => (Stage::Calibrate, args),
        Commands::Run(args) => (Stage::All, args),
    };

    match run(stage, &args.config, args.camera.as_deref()) {
        Ok(summary) if summary.all_succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run(stage: Stage, config: &Path, camera: Option<&str>) -> vxp_core::Result<RunSummary> {
    let config = vxp_io::load_config(config)?;
    let summary = vxp_io::process_cameras(&config, stage, camera)?;

    for run in &summary.cameras {
        if let Some(e) = &run.error {
            error!("{}: {e}", run.name);
            continue;
        }
        if let Some(background) = &run.background {
            info!("{}: background {background:?}", run.name);
        }
        match &run.calibration {
            Some(CalibrationStatus::Created {
                views,
                removed_frame,
                avg_error,
            }) => info!(
                "{}: calibrated from {views} views (dropped frame {removed_frame:?}), avg error {avg_error:.4}",
                run.name
            ),
            Some(CalibrationStatus::Cached) => info!("{}: calibration already present", run.name),
            None => {}
        }
    }
    info!(
        "{} cameras processed, {} failed",
        summary.cameras.len(),
        summary.failed().count()
    );
    Ok(summary)
}
