//! Variational autoencoder used as the generator
//!
//! Architecture:
//! 1. Shared conv encoder, 3×128×128 -> 48×16×16 -> flat 12288
//! 2. Two linear heads to `mu` and `logvar`, both passed through ReLU
//! 3. Reparameterized sample `z = mu + eps * exp(0.5 * logvar)`
//! 4. Linear back to 12288, reshape to 48×16×16, three transposed convs,
//!    sigmoid on the last one
//!
//! With `restore_resolution = false` the transposed convolutions keep the
//! 16×16 size, so the decoder output is 3×16×16. Setting it to `true` makes
//! every decoder stage upsample by 2 and brings the output back to 128×128.

use tch::{nn, nn::Module, Device, Kind, Tensor};

use super::dynamic_tanh::DynamicTanh;
use super::encoder::{ConvEncoder, EncoderConfig};
use crate::error::{Error, Result};

/// VAE configuration
#[derive(Debug, Clone)]
pub struct VaeConfig {
    /// Image channels
    pub in_channels: i64,
    /// Input height and width
    pub image_size: i64,
    /// Latent dimension
    pub latent_dim: i64,
    /// Conv stage channels, also used in reverse by the decoder
    pub channels: [i64; 3],
    /// Upsample in the decoder instead of keeping the bottleneck size
    pub restore_resolution: bool,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            image_size: 128,
            latent_dim: 64,
            channels: [12, 24, 48],
            restore_resolution: false,
        }
    }
}

impl VaeConfig {
    fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            in_channels: self.in_channels,
            image_size: self.image_size,
            channels: self.channels,
        }
    }
}

/// Result of a VAE forward pass
#[derive(Debug)]
pub struct VaeOutput {
    /// Decoded image, optionally passed through the dynamic tanh
    pub reconstruction: Tensor,
    /// Latent mean, shape (batch, latent_dim)
    pub mu: Tensor,
    /// Latent log-variance, shape (batch, latent_dim)
    pub logvar: Tensor,
}

/// VAE generator network
#[derive(Debug)]
pub struct Vae {
    config: VaeConfig,
    encoder: ConvEncoder,
    fc_mu: nn::Linear,
    fc_logvar: nn::Linear,
    fc_decode: nn::Linear,
    deconv1: nn::ConvTranspose2D,
    deconv2: nn::ConvTranspose2D,
    deconv3: nn::ConvTranspose2D,
}

impl Vae {
    /// Create a new VAE
    pub fn new(vs: &nn::Path, config: VaeConfig) -> Self {
        let encoder_config = config.encoder_config();
        let feature_dim = encoder_config.feature_dim();
        let encoder = ConvEncoder::new(&(vs / "encoder"), encoder_config);

        let fc_mu = nn::linear(vs / "fc_mu", feature_dim, config.latent_dim, Default::default());
        let fc_logvar =
            nn::linear(vs / "fc_logvar", feature_dim, config.latent_dim, Default::default());
        let fc_decode =
            nn::linear(vs / "fc_decode", config.latent_dim, feature_dim, Default::default());

        let (kernel, deconv_config) = if config.restore_resolution {
            (
                4,
                nn::ConvTransposeConfig {
                    stride: 2,
                    padding: 1,
                    ..Default::default()
                },
            )
        } else {
            (
                3,
                nn::ConvTransposeConfig {
                    stride: 1,
                    padding: 1,
                    ..Default::default()
                },
            )
        };

        let [c1, c2, c3] = config.channels;
        let deconv1 = nn::conv_transpose2d(vs / "deconv1", c3, c2, kernel, deconv_config);
        let deconv2 = nn::conv_transpose2d(vs / "deconv2", c2, c1, kernel, deconv_config);
        let deconv3 =
            nn::conv_transpose2d(vs / "deconv3", c1, config.in_channels, kernel, deconv_config);

        Self {
            config,
            encoder,
            fc_mu,
            fc_logvar,
            fc_decode,
            deconv1,
            deconv2,
            deconv3,
        }
    }

    /// Flattened encoder features, shape (batch, 12288) for the default config
    pub fn encode(&self, images: &Tensor) -> Result<Tensor> {
        self.encoder.forward(images)
    }

    /// Latent mean and log-variance
    ///
    /// Both heads end in ReLU, so `logvar >= 0` and the sampling std is
    /// never below 1.
    pub fn latent_params(&self, features: &Tensor) -> (Tensor, Tensor) {
        let mu = self.fc_mu.forward(features).relu();
        let logvar = self.fc_logvar.forward(features).relu();
        (mu, logvar)
    }

    /// Reparameterization trick with fresh noise on every call
    pub fn reparameterize(&self, mu: &Tensor, logvar: &Tensor) -> Result<Tensor> {
        let mu_size = mu.size();
        let logvar_size = logvar.size();
        if mu_size.len() != 2 || mu_size[1] != self.config.latent_dim {
            return Err(Error::shape(
                "reparameterize mu",
                &[-1, self.config.latent_dim],
                &mu_size,
            ));
        }
        if logvar_size != mu_size {
            return Err(Error::shape("reparameterize logvar", &mu_size, &logvar_size));
        }

        let std = (logvar * 0.5).exp();
        let eps = std.randn_like();
        Ok(mu + eps * std)
    }

    /// Decode latent codes to images in [0, 1]
    pub fn decode(&self, z: &Tensor) -> Tensor {
        let batch_size = z.size()[0];
        let c = self.config.channels[2];
        let s = self.bottleneck_size();

        let x = self.fc_decode.forward(z).relu();
        let x = x.view([batch_size, c, s, s]);

        let x = self.deconv1.forward(&x).relu();
        let x = self.deconv2.forward(&x).relu();
        self.deconv3.forward(&x).sigmoid()
    }

    /// Full pass: encode, sample, decode and optionally apply `tanh_layer`
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (batch, 3, image_size, image_size)
    /// * `tanh_layer` - Activation applied to the decoder output
    /// * `t` - Time value forwarded to the activation
    pub fn forward(
        &self,
        images: &Tensor,
        tanh_layer: Option<&DynamicTanh>,
        t: Option<f64>,
    ) -> Result<VaeOutput> {
        let features = self.encode(images)?;
        let (mu, logvar) = self.latent_params(&features);
        let z = self.reparameterize(&mu, &logvar)?;
        let decoded = self.decode(&z);

        let reconstruction = match tanh_layer {
            Some(layer) => layer.forward(&decoded, t)?,
            None => decoded,
        };

        Ok(VaeOutput {
            reconstruction,
            mu,
            logvar,
        })
    }

    /// Decode samples from a standard normal prior
    pub fn sample(
        &self,
        num_samples: i64,
        tanh_layer: Option<&DynamicTanh>,
        t: Option<f64>,
    ) -> Result<Tensor> {
        let z = Tensor::randn(
            [num_samples, self.config.latent_dim],
            (Kind::Float, self.encoder.device()),
        );
        let decoded = self.decode(&z);
        match tanh_layer {
            Some(layer) => layer.forward(&decoded, t),
            None => Ok(decoded),
        }
    }

    /// KL divergence of N(mu, exp(logvar)) from N(0, 1), averaged over the batch
    pub fn kl_divergence(mu: &Tensor, logvar: &Tensor) -> Tensor {
        let per_sample = (logvar.exp() + mu.square() - 1.0 - logvar).sum_dim_intlist(
            [1i64].as_slice(),
            false,
            Kind::Float,
        ) * 0.5;
        per_sample.mean(Kind::Float)
    }

    /// Spatial size of the decoder input map
    pub fn bottleneck_size(&self) -> i64 {
        self.config.image_size / 8
    }

    /// Spatial size of the decoder output
    pub fn output_size(&self) -> i64 {
        if self.config.restore_resolution {
            self.bottleneck_size() * 8
        } else {
            self.bottleneck_size()
        }
    }

    /// Latent dimension
    pub fn latent_dim(&self) -> i64 {
        self.config.latent_dim
    }

    /// Device holding the weights
    pub fn device(&self) -> Device {
        self.encoder.device()
    }

    /// Get configuration
    pub fn config(&self) -> &VaeConfig {
        &self.config
    }
}
