//! VAE-WGAN with Dynamic Tanh
//!
//! Main entry point providing CLI interface for:
//! - Writing a default configuration
//! - Training the VAE-GAN on an image folder
//! - Generating images from a checkpoint
//! - Rendering a synthetic video clip from one generated image

use std::path::Path;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vae_wgan_dyt::{
    data::{save_image, DataLoader, ImageFolder, SyntheticVideo, SyntheticVideoConfig},
    model::VaeGan,
    training::Trainer,
    utils::{ensure_config_exists, find_latest_checkpoint, load_checkpoint, Config},
};

/// VAE generator trained against a Wasserstein critic
#[derive(Parser)]
#[command(name = "vae-wgan")]
#[command(version = "0.1.0")]
#[command(about = "Train a VAE-GAN with a dynamic tanh output activation")]
struct Cli {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Train the model
    Train {
        /// Image folder, overrides the configured one
        #[arg(short, long)]
        data: Option<String>,

        /// Number of epochs, overrides the configured one
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Resume from a checkpoint directory, or "latest"
        #[arg(long)]
        resume: Option<String>,
    },

    /// Generate images from a checkpoint
    Generate {
        /// Checkpoint directory
        #[arg(short, long)]
        model: String,

        /// Number of images to generate
        #[arg(short, long, default_value = "16")]
        num_samples: i64,

        /// Activation time for the time-varying mode
        #[arg(short, long, default_value = "0.0")]
        time: f64,

        /// Output directory
        #[arg(short, long, default_value = "samples")]
        output: String,
    },

    /// Render a frame sequence from one generated image
    Video {
        /// Checkpoint directory
        #[arg(short, long)]
        model: String,

        /// Number of frames
        #[arg(short, long, default_value = "30")]
        frames: usize,

        /// Frames per second
        #[arg(long, default_value = "30.0")]
        fps: f64,

        /// Per-pixel noise standard deviation
        #[arg(long, default_value = "0.05")]
        noise_std: f64,

        /// Output directory
        #[arg(short, long, default_value = "video")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { output } => {
            init_config(&output)?;
        }
        Commands::Train {
            data,
            epochs,
            resume,
        } => {
            train_model(&cli.config, data, epochs, resume)?;
        }
        Commands::Generate {
            model,
            num_samples,
            time,
            output,
        } => {
            generate_images(&cli.config, &model, num_samples, time, &output)?;
        }
        Commands::Video {
            model,
            frames,
            fps,
            noise_std,
            output,
        } => {
            render_video(&cli.config, &model, frames, fps, noise_std, &output)?;
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        Config::load(path)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };
    config.validate()?;
    tch::manual_seed(config.training.seed as i64);
    Ok(config)
}

/// Build a model from the configuration and load a checkpoint into it
fn load_model(config: &Config, checkpoint: &str) -> Result<VaeGan> {
    let mut model = VaeGan::new(config.model_config()?, config.get_device());
    let (epoch, _, _) = load_checkpoint(&mut model, checkpoint)?;
    info!("Loaded model from {} (epoch {})", checkpoint, epoch);
    Ok(model)
}

/// Write the default configuration
fn init_config(output: &str) -> Result<()> {
    if Path::new(output).exists() {
        bail!("{} already exists", output);
    }
    ensure_config_exists(output)?;
    info!("Created default configuration at {}", output);
    Ok(())
}

/// Train the model
fn train_model(
    config_path: &str,
    data: Option<String>,
    epochs: Option<usize>,
    resume: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(data) = data {
        config.data.data_dir = data;
    }
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    config.validate()?;

    let device = config.get_device();
    info!("Using device: {:?}", device);

    let folder = ImageFolder::scan(&config.data.data_dir)?;
    let mut data_loader = DataLoader::from_folder(
        folder,
        config.model.image_size,
        config.data.batch_size,
        config.data.shuffle,
        config.data.drop_last,
    )?
    .with_seed(config.training.seed);

    let mut model = VaeGan::new(config.model_config()?, device);
    info!(
        "Generator output {}x{}, critic input {}x{}",
        model.output_size(),
        model.output_size(),
        config.model.image_size,
        config.model.image_size
    );

    let training_config = config.training_config();
    let mut trainer = Trainer::new(training_config.clone(), &model)?;

    let resume = match resume.as_deref() {
        Some("latest") => find_latest_checkpoint(&training_config.checkpoint_dir),
        other => other.map(str::to_string),
    };
    if let Some(checkpoint) = resume {
        let (epoch, step, metrics) = load_checkpoint(&mut model, &checkpoint)?;
        info!("Resumed from epoch {} (step {})", epoch, step);
        trainer = trainer.with_history(metrics, step);
    }

    let metrics = trainer.train(&mut model, &mut data_loader)?;

    info!(
        "Training complete. Final G_loss: {:.4}, D_loss: {:.4}, \
         non-finite steps: {}, skipped steps: {}",
        metrics.latest_gen_loss().unwrap_or(0.0),
        metrics.latest_critic_loss().unwrap_or(0.0),
        metrics.non_finite_steps,
        metrics.skipped_steps
    );

    Ok(())
}

/// Generate images and write them as PNG files
fn generate_images(
    config_path: &str,
    checkpoint: &str,
    num_samples: i64,
    time: f64,
    output: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let model = load_model(&config, checkpoint)?;

    info!("Generating {} images", num_samples);
    let t = model.requires_time().then_some(time);
    let images = tch::no_grad(|| model.sample(num_samples, t))?;

    std::fs::create_dir_all(output)?;
    for i in 0..num_samples {
        save_image(&images.get(i), format!("{}/sample_{:04}.png", output, i))?;
    }
    info!("Saved {} images to {}", num_samples, output);

    Ok(())
}

/// Render a synthetic clip as numbered PNG frames
fn render_video(
    config_path: &str,
    checkpoint: &str,
    frames: usize,
    fps: f64,
    noise_std: f64,
    output: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let model = load_model(&config, checkpoint)?;
    let _guard = tch::no_grad_guard();

    let z = tch::Tensor::randn([1, model.latent_dim()], (tch::Kind::Float, model.device));
    let base = model.vae.decode(&z);

    let mut video = SyntheticVideo::new(
        &base,
        SyntheticVideoConfig {
            num_frames: frames,
            fps,
            noise_std,
            seed: config.training.seed,
        },
    )?;
    if let Some(tanh) = model.tanh.as_ref() {
        video = video.with_tanh(tanh);
    }

    std::fs::create_dir_all(output)?;
    for (k, frame) in video.enumerate() {
        save_image(&frame?, format!("{}/frame_{:04}.png", output, k))?;
    }
    info!("Saved {} frames to {}", frames, output);

    Ok(())
}
