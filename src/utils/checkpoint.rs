//! Checkpoint save/load utilities
//!
//! A checkpoint is a directory `checkpoint_epoch_NNNN/` holding both variable
//! stores, a JSON metadata file and the metrics history.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::VaeGan;
use crate::training::TrainingMetrics;

const CHECKPOINT_PREFIX: &str = "checkpoint_epoch_";

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Completed epochs
    pub epoch: usize,
    /// Completed training steps
    pub global_step: u64,
    /// Generator loss at checkpoint
    pub gen_loss: f64,
    /// Critic loss at checkpoint
    pub critic_loss: f64,
    /// Activation mode, if any
    pub tanh_mode: Option<String>,
    /// Timestamp of checkpoint
    pub timestamp: String,
    /// Model shape parameters (as JSON)
    pub config: String,
}

/// Save a complete checkpoint (model + metadata)
///
/// # Arguments
///
/// * `model` - VaeGan model to save
/// * `metrics` - Training metrics
/// * `epoch` - Completed epochs
/// * `global_step` - Completed training steps
/// * `dir` - Directory to save checkpoint
///
/// # Returns
///
/// Path to saved checkpoint
pub fn save_checkpoint(
    model: &VaeGan,
    metrics: &TrainingMetrics,
    epoch: usize,
    global_step: u64,
    dir: &str,
) -> Result<String> {
    let checkpoint_dir = format!("{}/{}{:04}", dir, CHECKPOINT_PREFIX, epoch);
    std::fs::create_dir_all(&checkpoint_dir)?;

    let gen_path = format!("{}/generator.pt", checkpoint_dir);
    let disc_path = format!("{}/discriminator.pt", checkpoint_dir);
    model.save(&gen_path, &disc_path)?;

    let meta = CheckpointMeta {
        epoch,
        global_step,
        gen_loss: metrics.latest_gen_loss().unwrap_or(0.0),
        critic_loss: metrics.latest_critic_loss().unwrap_or(0.0),
        tanh_mode: model.tanh_mode().map(|m| m.to_string()),
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: serde_json::json!({
            "latent_dim": model.latent_dim(),
            "image_size": model.vae.config().image_size,
            "output_size": model.output_size(),
            "restore_resolution": model.vae.config().restore_resolution,
        })
        .to_string(),
    };

    let meta_path = format!("{}/meta.json", checkpoint_dir);
    std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)?;

    let metrics_path = format!("{}/metrics.csv", checkpoint_dir);
    metrics.save_csv(&metrics_path)?;

    tracing::info!("Saved checkpoint to {}", checkpoint_dir);
    Ok(checkpoint_dir)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(checkpoint_dir: &str) -> Result<CheckpointMeta> {
    let meta_path = format!("{}/meta.json", checkpoint_dir);
    let content = std::fs::read_to_string(&meta_path)?;
    let meta: CheckpointMeta = serde_json::from_str(&content)?;
    Ok(meta)
}

/// Load a complete checkpoint into `model`
///
/// The checkpoint's activation mode must match the model's, otherwise the
/// variable stores would not line up.
///
/// # Returns
///
/// Tuple of (epoch, global_step, metrics)
pub fn load_checkpoint(
    model: &mut VaeGan,
    checkpoint_dir: &str,
) -> Result<(usize, u64, TrainingMetrics)> {
    let meta = load_checkpoint_meta(checkpoint_dir)?;
    let model_mode = model.tanh_mode().map(|m| m.to_string());
    if meta.tanh_mode != model_mode {
        return Err(Error::InvalidConfiguration(format!(
            "checkpoint activation {:?} does not match model activation {:?}",
            meta.tanh_mode, model_mode
        )));
    }

    let gen_path = format!("{}/generator.pt", checkpoint_dir);
    let disc_path = format!("{}/discriminator.pt", checkpoint_dir);
    model.load(&gen_path, &disc_path)?;

    let metrics_path = format!("{}/metrics.csv", checkpoint_dir);
    let metrics = if Path::new(&metrics_path).exists() {
        TrainingMetrics::load_csv(&metrics_path)?
    } else {
        TrainingMetrics::new()
    };

    tracing::info!(
        "Loaded checkpoint from {} (epoch {}, step {})",
        checkpoint_dir,
        meta.epoch,
        meta.global_step
    );
    Ok((meta.epoch, meta.global_step, metrics))
}

/// Find the latest checkpoint in a directory
pub fn find_latest_checkpoint(dir: &str) -> Option<String> {
    let mut checkpoints: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(CHECKPOINT_PREFIX))
                .unwrap_or(false)
        })
        .collect();

    checkpoints.sort_by_key(|e| e.file_name());

    checkpoints
        .last()
        .map(|e| e.path().to_string_lossy().to_string())
}
