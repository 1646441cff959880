use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;

use sketch2portrait::model::{
    checkpoint::Checkpoints,
    evaluation,
    training::{self, TrainingConfig},
};

#[cfg(feature = "cuda")]
mod backend {
    pub type Backend = burn::backend::Cuda<f32, i32>;
    pub type Device = burn::backend::cuda::CudaDevice;
}

#[cfg(not(feature = "cuda"))]
mod backend {
    pub type Backend = burn::backend::NdArray;
    pub type Device = burn::backend::ndarray::NdArrayDevice;
}

type MyBackend = backend::Backend;
type MyAutodiffBackend = Autodiff<MyBackend>;

const DEFAULT_SKETCH_DIR: &str = "gamma_inverted_sketches";
const DEFAULT_PHOTO_DIR: &str = "portraits";
const DEFAULT_ARTIFACT_DIR: &str = "saved_models";

#[derive(Parser, Debug)]
#[command(version, about = "Train a pix2pix sketch-to-portrait model")]
struct Cli {
    /// Defaults to `train` with default arguments.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the generator and discriminator, keeping the best snapshot.
    Train(PathArgs),
    /// Score the best saved generator on the test split.
    Evaluate {
        #[command(flatten)]
        paths: PathArgs,
        /// Write `sketch | generated | portrait` strips for the first test batch here.
        #[arg(long)]
        sample_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Sketch images, e.g. `gamma_inverted_sketches` or `sketches`.
    #[arg(long, default_value = DEFAULT_SKETCH_DIR)]
    sketch_dir: PathBuf,
    /// Portraits, matched to sketches by file stem.
    #[arg(long, default_value = DEFAULT_PHOTO_DIR)]
    photo_dir: PathBuf,
    /// Where snapshots and `config.json` live.
    #[arg(long, default_value = DEFAULT_ARTIFACT_DIR)]
    artifact_dir: PathBuf,
    /// Training configuration in JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Default for PathArgs {
    fn default() -> Self {
        Self {
            sketch_dir: DEFAULT_SKETCH_DIR.into(),
            photo_dir: DEFAULT_PHOTO_DIR.into(),
            artifact_dir: DEFAULT_ARTIFACT_DIR.into(),
            config: None,
        }
    }
}

fn run_training(args: PathArgs, device: backend::Device) -> Result<()> {
    let config = match &args.config {
        Some(path) => TrainingConfig::from_file(path)?,
        None => TrainingConfig::pix2pix(),
    };

    let summary = training::train::<MyAutodiffBackend>(
        &args.sketch_dir,
        &args.photo_dir,
        &args.artifact_dir,
        &config,
        device,
    )
    .context("training failed")?;

    match summary.best_epoch {
        Some(epoch) => info!(
            "Best validation loss {:.4} at epoch {} after {} epochs",
            summary.best_val_loss,
            epoch,
            summary.epochs.len()
        ),
        None => warn!("Validation loss never improved; no model was saved"),
    }
    Ok(())
}

fn run_evaluation(
    args: PathArgs,
    sample_dir: Option<PathBuf>,
    device: backend::Device,
) -> Result<()> {
    // The split depends on the seed and ratios used for training.
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Checkpoints::new(&args.artifact_dir).config_path());
    let config = TrainingConfig::from_file(&config_path)?;

    let evaluation = evaluation::evaluate::<MyBackend>(
        &args.sketch_dir,
        &args.photo_dir,
        &args.artifact_dir,
        &config,
        sample_dir.as_deref(),
        device,
    )
    .context("evaluation failed")?;

    println!(
        "Test Loss: {:.4} ({} pairs)",
        evaluation.test_loss, evaluation.test_pairs
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let device = backend::Device::default();
    info!("Using device: {device:?}");

    match cli.command.unwrap_or(Command::Train(PathArgs::default())) {
        Command::Train(args) => run_training(args, device),
        Command::Evaluate { paths, sample_dir } => run_evaluation(paths, sample_dir, device),
    }
}
