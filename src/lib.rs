//! # VAE-WGAN with Dynamic Tanh
//!
//! A variational autoencoder used as the generator of a Wasserstein GAN with
//! gradient penalty. Generated images can pass through a dynamic tanh whose
//! scale is a learnable scalar, a learnable per-pixel matrix, or a fixed
//! oscillation in time.
//!
//! ## Modules
//!
//! - `data`: Image folders, batching and synthetic video clips
//! - `model`: Dynamic tanh, VAE generator and Discriminator
//! - `training`: Training loop and loss functions
//! - `utils`: Configuration and checkpoints

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{DataLoader, ImageFolder, SyntheticVideo, SyntheticVideoConfig};
pub use error::{Error, Result};
pub use model::{Discriminator, DynamicTanh, TanhMode, Vae, VaeGan, VaeGanConfig};
pub use training::{
    gradient_penalty, wasserstein_loss, Trainer, TrainingConfig, TrainingMetrics,
};
pub use utils::{load_checkpoint, save_checkpoint, Config};
