//! Training loop for the VAE-GAN
//!
//! Each step runs `disc_steps` critic updates on detached generator output,
//! then one generator update through the critic. The two optimizers only
//! step their own variable stores.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tch::{nn, Device, Kind, Tensor};
use tracing::{debug, info, warn};

use super::losses::{
    adversarial_loss, critic_loss, reconstruction_loss, wasserstein_loss, InterpolationSampling,
    DEFAULT_LAMBDA_GP,
};
use super::metrics::{EmaTracker, TrainingMetrics};
use crate::data::DataLoader;
use crate::error::{ensure_device, Error, Result};
use crate::model::{Vae, VaeGan};
use crate::utils::save_checkpoint;

/// What the generator encodes during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorInput {
    /// The real batch itself
    #[default]
    Real,
    /// Uniform noise images shaped like the real batch
    Noise,
}

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Learning rate for the generator (VAE and tanh alpha)
    pub gen_lr: f64,
    /// Learning rate for the discriminator
    pub disc_lr: f64,
    /// Number of critic updates per generator update
    pub disc_steps: usize,
    /// Weight of the gradient penalty
    pub lambda_gp: f64,
    /// Distribution of the interpolation weight
    pub interpolation: InterpolationSampling,
    /// Seconds between steps, used as `t` by time-varying activations
    pub time_step: f64,
    /// What the generator encodes
    pub generator_input: GeneratorInput,
    /// Weight of the reconstruction term in the generator loss
    pub recon_weight: f64,
    /// Weight of the KL term in the generator loss
    pub kl_weight: f64,
    /// Save checkpoint every N epochs (0 disables)
    pub checkpoint_every: usize,
    /// Directory to save checkpoints
    pub checkpoint_dir: String,
    /// Fail the step on NaN/Inf losses instead of only reporting them
    pub abort_on_non_finite: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            gen_lr: 2e-4,
            disc_lr: 2e-4,
            disc_steps: 1,
            lambda_gp: DEFAULT_LAMBDA_GP,
            interpolation: InterpolationSampling::Normal,
            time_step: 1.0 / 30.0,
            generator_input: GeneratorInput::Real,
            recon_weight: 0.0,
            kl_weight: 0.0,
            checkpoint_every: 10,
            checkpoint_dir: "checkpoints".to_string(),
            abort_on_non_finite: false,
        }
    }
}

/// Losses of one training step, averaged over its critic updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    /// Critic objective `-wasserstein + lambda_gp * gp`
    pub critic: f64,
    /// Generator objective
    pub generator: f64,
    /// Wasserstein estimate from the critic updates
    pub wasserstein: f64,
    /// Gradient penalty from the critic updates
    pub gradient_penalty: f64,
}

impl StepLosses {
    /// Whether every loss is a finite number
    pub fn is_finite(&self) -> bool {
        self.critic.is_finite()
            && self.generator.is_finite()
            && self.wasserstein.is_finite()
            && self.gradient_penalty.is_finite()
    }
}

/// VAE-GAN Trainer
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    metrics: TrainingMetrics,
    gen_opt: nn::Optimizer,
    disc_opt: nn::Optimizer,
    global_step: u64,
}

impl Trainer {
    /// Create a new trainer with Adam optimizers for both networks
    pub fn new(config: TrainingConfig, model: &VaeGan) -> Result<Self> {
        if config.disc_steps == 0 {
            return Err(Error::InvalidConfiguration(
                "disc_steps must be at least 1".to_string(),
            ));
        }
        let gen_opt = model.gen_optimizer(config.gen_lr)?;
        let disc_opt = model.disc_optimizer(config.disc_lr)?;

        Ok(Self {
            config,
            device: model.device,
            metrics: TrainingMetrics::new(),
            gen_opt,
            disc_opt,
            global_step: 0,
        })
    }

    /// Resume with previously recorded metrics and step count
    pub fn with_history(mut self, metrics: TrainingMetrics, global_step: u64) -> Self {
        self.metrics = metrics;
        self.global_step = global_step;
        self
    }

    /// Time value handed to the activation at the current step
    pub fn current_time(&self, model: &VaeGan) -> Option<f64> {
        if model.requires_time() {
            Some(self.global_step as f64 * self.config.time_step)
        } else {
            None
        }
    }

    fn generator_input(&self, real: &Tensor) -> Tensor {
        match self.config.generator_input {
            GeneratorInput::Real => real.shallow_clone(),
            GeneratorInput::Noise => real.rand_like(),
        }
    }

    fn check_finite(&self, what: &str, value: f64) -> Result<()> {
        if value.is_finite() {
            return Ok(());
        }
        warn!("{} is not finite at step {}: {}", what, self.global_step, value);
        if self.config.abort_on_non_finite {
            return Err(Error::NonFinite(format!("{} at step {}", what, self.global_step)));
        }
        Ok(())
    }

    /// One critic phase followed by one generator update
    ///
    /// Shape, device and (optionally) non-finite errors abort the step before
    /// the failing optimizer update is applied.
    pub fn train_step(&mut self, model: &VaeGan, real: &Tensor) -> Result<StepLosses> {
        ensure_device("training batch", self.device, real)?;
        let t = self.current_time(model);
        let lambda_gp = self.config.lambda_gp;

        let mut critic_sum = 0.0;
        let mut wasserstein_sum = 0.0;
        let mut gp_sum = 0.0;

        // ========== Train Critic ==========
        for _ in 0..self.config.disc_steps {
            let input = self.generator_input(real);
            let generated = tch::no_grad(|| model.generate(&input, t))?.reconstruction;

            let parts = adversarial_loss(
                real,
                &generated,
                &model.discriminator,
                self.device,
                lambda_gp,
                self.config.interpolation,
            )?;
            let d_loss = critic_loss(&parts, lambda_gp);
            let d_value = d_loss.double_value(&[]);
            self.check_finite("critic loss", d_value)?;

            self.disc_opt.zero_grad();
            d_loss.backward();
            self.disc_opt.step();

            critic_sum += d_value;
            wasserstein_sum += parts.wasserstein.double_value(&[]);
            gp_sum += parts.gradient_penalty.double_value(&[]);
        }

        // ========== Train Generator ==========
        let input = self.generator_input(real);
        let output = model.generate(&input, t)?;
        let mut g_loss = wasserstein_loss(real, &output.reconstruction, &model.discriminator)?;
        if self.config.recon_weight > 0.0 {
            let recon = reconstruction_loss(&output.reconstruction, real)?;
            g_loss = g_loss + recon * self.config.recon_weight;
        }
        if self.config.kl_weight > 0.0 {
            let kl = Vae::kl_divergence(&output.mu, &output.logvar);
            g_loss = g_loss + kl * self.config.kl_weight;
        }
        let g_value = g_loss.double_value(&[]);
        self.check_finite("generator loss", g_value)?;

        self.gen_opt.zero_grad();
        g_loss.backward();
        self.gen_opt.step();

        self.global_step += 1;

        let n = self.config.disc_steps as f64;
        let losses = StepLosses {
            critic: critic_sum / n,
            generator: g_value,
            wasserstein: wasserstein_sum / n,
            gradient_penalty: gp_sum / n,
        };
        if !losses.is_finite() {
            self.metrics.non_finite_steps += 1;
        }
        debug!(step = self.global_step, ?losses, "training step");
        Ok(losses)
    }

    /// Run one epoch over `batches` and record its averages
    ///
    /// Steps failing with a shape, device or missing-argument error are
    /// logged, counted in `skipped_steps` and skipped. Non-finite aborts and
    /// any other error end the epoch. An epoch without a single successful
    /// step returns the last step error.
    pub fn train_epoch<I>(
        &mut self,
        model: &VaeGan,
        batches: I,
        num_batches: usize,
    ) -> Result<StepLosses>
    where
        I: IntoIterator<Item = Tensor>,
    {
        let mut totals = StepLosses {
            critic: 0.0,
            generator: 0.0,
            wasserstein: 0.0,
            gradient_penalty: 0.0,
        };
        let mut batch_count = 0usize;
        let mut last_error = None;
        let mut gen_ema = EmaTracker::new(0.1);
        let mut critic_ema = EmaTracker::new(0.1);

        let pb = ProgressBar::new(num_batches as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        for real_batch in batches {
            let real = real_batch.to_device(self.device).to_kind(Kind::Float);

            let losses = match self.train_step(model, &real) {
                Ok(losses) => losses,
                Err(e) if e.is_step_error() && !matches!(e, Error::NonFinite(_)) => {
                    warn!("Aborted step {}: {}", self.global_step, e);
                    self.metrics.skipped_steps += 1;
                    last_error = Some(e);
                    pb.inc(1);
                    continue;
                }
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                }
            };

            totals.critic += losses.critic;
            totals.generator += losses.generator;
            totals.wasserstein += losses.wasserstein;
            totals.gradient_penalty += losses.gradient_penalty;
            batch_count += 1;

            gen_ema.update(losses.generator);
            critic_ema.update(losses.critic);
            pb.set_message(format!(
                "G: {:.4}, D: {:.4}, W: {:.4}",
                gen_ema.value(),
                critic_ema.value(),
                losses.wasserstein
            ));
            pb.inc(1);
        }

        pb.finish_with_message("done");

        if batch_count == 0 {
            return Err(last_error.unwrap_or_else(|| {
                Error::DataError("data loader produced no batches".to_string())
            }));
        }

        let n = batch_count as f64;
        let averages = StepLosses {
            critic: totals.critic / n,
            generator: totals.generator / n,
            wasserstein: totals.wasserstein / n,
            gradient_penalty: totals.gradient_penalty / n,
        };
        self.metrics.record_epoch(
            averages.generator,
            averages.critic,
            averages.wasserstein,
            averages.gradient_penalty,
        );
        Ok(averages)
    }

    /// Train the model
    ///
    /// # Arguments
    ///
    /// * `model` - VaeGan model to train
    /// * `data_loader` - DataLoader providing batches of real images
    ///
    /// # Returns
    ///
    /// Training metrics
    pub fn train(
        &mut self,
        model: &mut VaeGan,
        data_loader: &mut DataLoader,
    ) -> Result<&TrainingMetrics> {
        let num_batches = data_loader.num_batches();
        let start_epoch = self.metrics.num_epochs();

        info!(
            "Starting training for {} epochs, {} batches per epoch",
            self.config.epochs, num_batches
        );
        if let Some(mode) = model.tanh_mode() {
            info!("Output activation: dynamic tanh ({})", mode);
        }

        std::fs::create_dir_all(&self.config.checkpoint_dir)?;

        for epoch in start_epoch..start_epoch + self.config.epochs {
            let averages = self.train_epoch(model, data_loader.iter(), num_batches)?;

            info!(
                "Epoch {}/{}: G_loss={:.4}, D_loss={:.4}, W={:.4}, GP={:.4}",
                epoch + 1,
                start_epoch + self.config.epochs,
                averages.generator,
                averages.critic,
                averages.wasserstein,
                averages.gradient_penalty
            );

            if self.config.checkpoint_every > 0 && (epoch + 1) % self.config.checkpoint_every == 0 {
                if let Err(e) = save_checkpoint(
                    model,
                    &self.metrics,
                    epoch + 1,
                    self.global_step,
                    &self.config.checkpoint_dir,
                ) {
                    warn!("Failed to save checkpoint: {}", e);
                }
            }
        }

        let gen_path = format!("{}/generator_final.pt", self.config.checkpoint_dir);
        let disc_path = format!("{}/discriminator_final.pt", self.config.checkpoint_dir);
        if let Err(e) = model.save(&gen_path, &disc_path) {
            warn!("Failed to save final model: {}", e);
        }

        let metrics_path = format!("{}/training_metrics.csv", self.config.checkpoint_dir);
        if let Err(e) = self.metrics.save_csv(&metrics_path) {
            warn!("Failed to save metrics: {}", e);
        }

        Ok(&self.metrics)
    }

    /// Get training metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Number of completed steps
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}
