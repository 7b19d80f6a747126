//! Model module containing the VAE-GAN architecture components
//!
//! This module provides:
//! - Dynamic tanh output activation (scalar, per-pixel, time-varying alpha)
//! - Conv encoder shared by both networks
//! - VAE generator and Discriminator
//! - VaeGan wrapper owning both variable stores

mod discriminator;
mod dynamic_tanh;
mod encoder;
mod vae;
mod vae_gan;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use dynamic_tanh::{
    xavier_uniform_bound, ConstantParamTanh, DynamicTanh, TanhConfig, TanhMode, FRAME_RATE,
};
pub use encoder::{ConvEncoder, EncoderConfig};
pub use vae::{Vae, VaeConfig, VaeOutput};
pub use vae_gan::{VaeGan, VaeGanConfig};
