//! Discriminator network
//!
//! Scores how real an image looks. It reuses the VAE's conv encoder layout,
//! then two ReLU linear layers of width 64 and a sigmoid scalar head.

use tch::{nn, nn::Module, Device, Tensor};

use super::encoder::{ConvEncoder, EncoderConfig};
use crate::error::Result;

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Input image channels
    pub in_channels: i64,
    /// Input height and width; the linear layers are sized for exactly this
    pub image_size: i64,
    /// Conv stage channels
    pub channels: [i64; 3],
    /// Width of the hidden linear layers
    pub hidden_dim: i64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            image_size: 128,
            channels: [12, 24, 48],
            hidden_dim: 64,
        }
    }
}

/// Discriminator network
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    encoder: ConvEncoder,
    fc1: nn::Linear,
    fc2: nn::Linear,
    fc_out: nn::Linear,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let encoder_config = EncoderConfig {
            in_channels: config.in_channels,
            image_size: config.image_size,
            channels: config.channels,
        };
        let feature_dim = encoder_config.feature_dim();
        let encoder = ConvEncoder::new(&(vs / "encoder"), encoder_config);

        let hidden = config.hidden_dim;
        let fc1 = nn::linear(vs / "fc1", feature_dim, hidden, Default::default());
        let fc2 = nn::linear(vs / "fc2", hidden, hidden, Default::default());
        let fc_out = nn::linear(vs / "fc_out", hidden, 1, Default::default());

        Self {
            config,
            encoder,
            fc1,
            fc2,
            fc_out,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (batch_size, 3, image_size, image_size)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1) with sigmoid probabilities. Inputs of
    /// any other spatial size fail with `ShapeMismatch`.
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let x = self.encoder.forward(images)?;
        let x = self.fc1.forward(&x).relu();
        let x = self.fc2.forward(&x).relu();
        Ok(self.fc_out.forward(&x).sigmoid())
    }

    /// Device holding the weights
    pub fn device(&self) -> Device {
        self.encoder.device()
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}
