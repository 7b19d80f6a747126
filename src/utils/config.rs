//! Configuration management
//!
//! Provides unified configuration for the entire VAE-WGAN pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{DiscriminatorConfig, TanhMode, VaeConfig, VaeGanConfig, FRAME_RATE};
use crate::training::{GeneratorInput, InterpolationSampling, TrainingConfig, DEFAULT_LAMBDA_GP};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data configuration
    #[serde(default)]
    pub data: DataConfig,
    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Training configuration
    #[serde(default)]
    pub training: TrainingConfigFile,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the directory-per-class image corpus
    pub data_dir: String,
    /// Batch size
    pub batch_size: usize,
    /// Shuffle every epoch
    pub shuffle: bool,
    /// Drop the last incomplete batch
    pub drop_last: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/images".to_string(),
            batch_size: 16,
            shuffle: true,
            drop_last: false,
        }
    }
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Latent dimension size
    pub latent_dim: i64,
    /// Input image height and width
    pub image_size: i64,
    /// Output activation: "single", "matrix" or "time_function"; absent for none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tanh_mode: Option<String>,
    /// Initial alpha of the activation
    pub tanh_init_alpha: f64,
    /// Frame rate of the time-varying activation
    pub frame_rate: f64,
    /// Upsample the decoder back to `image_size`
    pub restore_resolution: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latent_dim: 64,
            image_size: 128,
            tanh_mode: None,
            tanh_init_alpha: 1.0,
            frame_rate: FRAME_RATE,
            restore_resolution: true,
        }
    }
}

/// Training-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfigFile {
    /// Number of epochs
    pub epochs: usize,
    /// Generator learning rate
    pub gen_lr: f64,
    /// Discriminator learning rate
    pub disc_lr: f64,
    /// Discriminator steps per generator step
    pub disc_steps: usize,
    /// Gradient penalty weight
    pub lambda_gp: f64,
    /// Interpolation weight distribution: "normal" or "uniform"
    pub interpolation: InterpolationSampling,
    /// Seconds between training steps for time-varying activations
    pub time_step: f64,
    /// Generator input: "real" or "noise"
    pub generator_input: GeneratorInput,
    /// Reconstruction term weight
    pub recon_weight: f64,
    /// KL term weight
    pub kl_weight: f64,
    /// Checkpoint save frequency
    pub checkpoint_every: usize,
    /// Checkpoint directory
    pub checkpoint_dir: String,
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Random seed
    pub seed: u64,
    /// Fail on NaN/Inf losses
    pub abort_on_non_finite: bool,
}

impl Default for TrainingConfigFile {
    fn default() -> Self {
        let defaults = TrainingConfig::default();
        Self {
            epochs: defaults.epochs,
            gen_lr: defaults.gen_lr,
            disc_lr: defaults.disc_lr,
            disc_steps: defaults.disc_steps,
            lambda_gp: DEFAULT_LAMBDA_GP,
            interpolation: defaults.interpolation,
            time_step: defaults.time_step,
            generator_input: defaults.generator_input,
            recon_weight: defaults.recon_weight,
            kl_weight: defaults.kl_weight,
            checkpoint_every: defaults.checkpoint_every,
            checkpoint_dir: defaults.checkpoint_dir,
            device: "cpu".to_string(),
            seed: 42,
            abort_on_non_finite: defaults.abort_on_non_finite,
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Starter configuration written by [`ensure_config_exists`], with a
    /// single-alpha tanh layer enabled
    pub fn template() -> Self {
        let mut config = Self::default();
        config.model.tanh_mode = Some(TanhMode::Single.to_string());
        config
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from TOML or JSON depending on the extension
    pub fn load(path: &str) -> Result<Self> {
        if path.ends_with(".toml") {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Parsed activation mode
    pub fn tanh_mode(&self) -> Result<Option<TanhMode>> {
        self.model
            .tanh_mode
            .as_deref()
            .filter(|s| !s.eq_ignore_ascii_case("none"))
            .map(str::parse)
            .transpose()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfiguration(msg.to_string()));

        if self.data.batch_size == 0 {
            return invalid("batch size must be > 0");
        }
        if self.model.latent_dim <= 0 {
            return invalid("latent dimension must be > 0");
        }
        if self.model.image_size < 8 || self.model.image_size % 8 != 0 {
            return invalid("image size must be a positive multiple of 8");
        }
        if self.training.epochs == 0 {
            return invalid("number of epochs must be > 0");
        }
        if self.training.disc_steps == 0 {
            return invalid("disc_steps must be > 0");
        }
        if !(self.training.gen_lr > 0.0) || !(self.training.disc_lr > 0.0) {
            return invalid("learning rates must be > 0");
        }
        if !(self.training.lambda_gp >= 0.0) {
            return invalid("lambda_gp must be >= 0");
        }
        if !(self.model.frame_rate > 0.0) {
            return invalid("frame rate must be > 0");
        }
        self.tanh_mode()?;
        Ok(())
    }

    /// Model configuration for [`crate::model::VaeGan::new`]
    pub fn model_config(&self) -> Result<VaeGanConfig> {
        Ok(VaeGanConfig {
            vae: VaeConfig {
                image_size: self.model.image_size,
                latent_dim: self.model.latent_dim,
                restore_resolution: self.model.restore_resolution,
                ..Default::default()
            },
            discriminator: DiscriminatorConfig {
                image_size: self.model.image_size,
                ..Default::default()
            },
            tanh_mode: self.tanh_mode()?,
            tanh_init_alpha: self.model.tanh_init_alpha,
            frame_rate: self.model.frame_rate,
        })
    }

    /// Trainer configuration
    pub fn training_config(&self) -> TrainingConfig {
        let t = &self.training;
        TrainingConfig {
            epochs: t.epochs,
            gen_lr: t.gen_lr,
            disc_lr: t.disc_lr,
            disc_steps: t.disc_steps,
            lambda_gp: t.lambda_gp,
            interpolation: t.interpolation,
            time_step: t.time_step,
            generator_input: t.generator_input,
            recon_weight: t.recon_weight,
            kl_weight: t.kl_weight,
            checkpoint_every: t.checkpoint_every,
            checkpoint_dir: t.checkpoint_dir.clone(),
            abort_on_non_finite: t.abort_on_non_finite,
        }
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(path)
    } else {
        let config = Config::template();
        if path.ends_with(".toml") {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        tracing::info!("Wrote default configuration to {}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model.latent_dim, 64);
        assert_eq!(config.model.image_size, 128);
        assert!(config.model.restore_resolution);
        assert_eq!(config.training.lambda_gp, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.data.data_dir, loaded.data.data_dir);
        assert_eq!(config.model.tanh_mode, loaded.model.tanh_mode);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\ntanh_mode = \"Time-Function\"\n\n\
             [training]\nepochs = 3\ninterpolation = \"uniform\""
        )
        .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let config: Config = toml::from_str(&content).unwrap();

        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.interpolation, InterpolationSampling::Uniform);
        assert_eq!(config.model.latent_dim, 64);
        assert_eq!(config.tanh_mode().unwrap(), Some(TanhMode::TimeFunction));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.tanh_mode = Some("cubic".to_string());
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));

        let mut config = Config::default();
        config.training.lambda_gp = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_tanh_layer() {
        let mut config = Config::default();
        assert_eq!(config.model.tanh_mode, None);
        assert_eq!(config.model_config().unwrap().tanh_mode, None);

        config.model.tanh_mode = Some("none".to_string());
        assert_eq!(config.tanh_mode().unwrap(), None);

        let config: Config = toml::from_str("[model]\nlatent_dim = 64").unwrap();
        assert_eq!(config.model.tanh_mode, None);
    }

    #[test]
    fn test_absent_tanh_mode_survives_toml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::template();
        config.model.tanh_mode = None;
        config.save_toml(path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(!content.contains("tanh_mode"));

        let loaded = Config::from_toml(path).unwrap();
        assert_eq!(loaded.model.tanh_mode, None);
        assert_eq!(loaded.model_config().unwrap().tanh_mode, None);
    }

    #[test]
    fn test_conversions() {
        let mut config = Config::template();
        config.model.latent_dim = 32;
        config.training.disc_steps = 5;

        let model = config.model_config().unwrap();
        assert_eq!(model.vae.latent_dim, 32);
        assert!(model.vae.restore_resolution);
        assert_eq!(model.tanh_mode, Some(TanhMode::Single));

        let training = config.training_config();
        assert_eq!(training.disc_steps, 5);
        assert_eq!(training.checkpoint_dir, "checkpoints");
    }

    #[test]
    fn test_ensure_config_exists_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let written = ensure_config_exists(path).unwrap();
        assert!(Path::new(path).exists());

        assert_eq!(written.model.tanh_mode.as_deref(), Some("single"));

        let loaded = ensure_config_exists(path).unwrap();
        assert_eq!(loaded.training.epochs, written.training.epochs);
        assert_eq!(loaded.model.tanh_mode, written.model.tanh_mode);
    }
}
