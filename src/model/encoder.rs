//! Convolutional feature extractor shared by the VAE and the Discriminator
//!
//! Three conv + ReLU + 2x max-pool stages reduce an S×S image to an
//! (S/8)×(S/8) feature map, which is flattened per sample.

use tch::{nn, nn::Module, Device, Tensor};

use crate::error::{ensure_device, Error, Result};

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Input image channels
    pub in_channels: i64,
    /// Input image height and width
    pub image_size: i64,
    /// Output channels of the three conv stages
    pub channels: [i64; 3],
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            image_size: 128,
            channels: [12, 24, 48],
        }
    }
}

impl EncoderConfig {
    /// Spatial size of the final feature map
    pub fn feature_size(&self) -> i64 {
        self.image_size / 8
    }

    /// Length of the flattened feature vector
    pub fn feature_dim(&self) -> i64 {
        self.channels[2] * self.feature_size() * self.feature_size()
    }
}

/// Conv/pool encoder
#[derive(Debug)]
pub struct ConvEncoder {
    config: EncoderConfig,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    device: Device,
}

impl ConvEncoder {
    /// Create a new encoder
    pub fn new(vs: &nn::Path, config: EncoderConfig) -> Self {
        let conv_config = nn::ConvConfig {
            padding: 1,
            ..Default::default()
        };
        let [c1, c2, c3] = config.channels;

        let conv1 = nn::conv2d(vs / "conv1", config.in_channels, c1, 3, conv_config);
        let conv2 = nn::conv2d(vs / "conv2", c1, c2, 3, conv_config);
        let conv3 = nn::conv2d(vs / "conv3", c2, c3, 3, conv_config);

        Self {
            config,
            conv1,
            conv2,
            conv3,
            device: vs.device(),
        }
    }

    /// Extract flattened features
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (batch, in_channels, image_size, image_size)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch, feature_dim)
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        self.check_input(images)?;

        let x = self.conv1.forward(images).relu().max_pool2d_default(2);
        let x = self.conv2.forward(&x).relu().max_pool2d_default(2);
        let x = self.conv3.forward(&x).relu().max_pool2d_default(2);

        Ok(x.flatten(1, -1))
    }

    /// Get configuration
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Device holding the encoder weights
    pub fn device(&self) -> Device {
        self.device
    }

    fn check_input(&self, images: &Tensor) -> Result<()> {
        let size = images.size();
        let s = self.config.image_size;
        let expected = [self.config.in_channels, s, s];
        if size.len() != 4 || size[1..] != expected {
            return Err(Error::ShapeMismatch {
                context: "conv encoder input".to_string(),
                expected: format!("[B, {}, {}, {}]", expected[0], s, s),
                actual: format!("{:?}", size),
            });
        }
        ensure_device("conv encoder input", self.device, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Kind};

    #[test]
    fn test_feature_dim() {
        let config = EncoderConfig::default();
        assert_eq!(config.feature_size(), 16);
        assert_eq!(config.feature_dim(), 48 * 16 * 16);
    }

    #[test]
    fn test_encoder_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let encoder = ConvEncoder::new(&vs.root(), EncoderConfig::default());

        let images = Tensor::rand([2, 3, 128, 128], (Kind::Float, Device::Cpu));
        let features = encoder.forward(&images).unwrap();

        assert_eq!(features.size(), vec![2, 12288]);
        assert!(features.min().double_value(&[]) >= 0.0);
    }

    #[test]
    fn test_encoder_rejects_wrong_size() {
        let vs = VarStore::new(Device::Cpu);
        let encoder = ConvEncoder::new(&vs.root(), EncoderConfig::default());

        let images = Tensor::rand([2, 3, 64, 64], (Kind::Float, Device::Cpu));
        assert!(matches!(
            encoder.forward(&images),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
