//! Training module for the VAE-GAN
//!
//! This module provides:
//! - Training loop implementation
//! - Wasserstein loss with gradient penalty
//! - Training configuration and metrics

mod losses;
mod metrics;
mod trainer;

pub use losses::{
    adversarial_loss, combined_loss, critic_loss, gradient_penalty, gradient_penalty_with,
    reconstruction_loss, wasserstein_loss, AdversarialLoss, Critic, InterpolationSampling,
    DEFAULT_LAMBDA_GP,
};
pub use metrics::{EmaTracker, TrainingMetrics};
pub use trainer::{GeneratorInput, StepLosses, Trainer, TrainingConfig};
