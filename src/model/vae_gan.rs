//! VAE-GAN wrapper combining the VAE generator, the optional dynamic tanh
//! and the Discriminator
//!
//! Generator-side parameters (VAE weights and a learnable tanh alpha) live in
//! one variable store, the Discriminator in another, so each optimizer only
//! ever touches its own network.

use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::dynamic_tanh::{DynamicTanh, TanhConfig, TanhMode, FRAME_RATE};
use super::vae::{Vae, VaeConfig, VaeOutput};
use crate::error::{Error, Result};

/// Configuration of the complete model
#[derive(Debug, Clone)]
pub struct VaeGanConfig {
    /// Generator configuration
    pub vae: VaeConfig,
    /// Discriminator configuration
    pub discriminator: DiscriminatorConfig,
    /// Output activation mode, `None` for no activation
    pub tanh_mode: Option<TanhMode>,
    /// Initial alpha for the activation
    pub tanh_init_alpha: f64,
    /// Frame rate for the time-varying activation
    pub frame_rate: f64,
}

impl Default for VaeGanConfig {
    fn default() -> Self {
        Self {
            vae: VaeConfig::default(),
            discriminator: DiscriminatorConfig::default(),
            tanh_mode: None,
            tanh_init_alpha: 1.0,
            frame_rate: FRAME_RATE,
        }
    }
}

/// Complete VAE-GAN model
pub struct VaeGan {
    /// Generator network
    pub vae: Vae,
    /// Output activation applied to generated images
    pub tanh: Option<DynamicTanh>,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for the VAE and tanh alpha
    pub gen_vs: VarStore,
    /// Variable store for the discriminator
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl VaeGan {
    /// Create a new model
    ///
    /// The activation is sized to the decoder's actual output, not to the
    /// input image size.
    pub fn new(config: VaeGanConfig, device: Device) -> Self {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let vae = Vae::new(&(gen_vs.root() / "vae"), config.vae);
        let tanh = config.tanh_mode.map(|mode| {
            let size = vae.output_size();
            DynamicTanh::new(
                &(gen_vs.root() / "tanh"),
                TanhConfig {
                    height: size,
                    width: size,
                    init_alpha: config.tanh_init_alpha,
                    mode,
                    frame_rate: config.frame_rate,
                },
            )
        });
        let discriminator = Discriminator::new(&disc_vs.root(), config.discriminator);

        Self {
            vae,
            tanh,
            discriminator,
            gen_vs,
            disc_vs,
            device,
        }
    }

    /// Create a model with default networks and the given activation mode
    pub fn with_defaults(tanh_mode: Option<TanhMode>, device: Device) -> Self {
        Self::new(
            VaeGanConfig {
                tanh_mode,
                ..Default::default()
            },
            device,
        )
    }

    /// Run the generator on a batch, applying the activation at time `t`
    pub fn generate(&self, images: &Tensor, t: Option<f64>) -> Result<VaeOutput> {
        self.vae.forward(images, self.tanh.as_ref(), t)
    }

    /// Decode `num_samples` draws from the latent prior
    pub fn sample(&self, num_samples: i64, t: Option<f64>) -> Result<Tensor> {
        self.vae.sample(num_samples, self.tanh.as_ref(), t)
    }

    /// Discriminator probabilities for a batch of images
    pub fn discriminate(&self, images: &Tensor) -> Result<Tensor> {
        self.discriminator.forward(images)
    }

    /// Generator optimizer over VAE and learnable alpha (Adam, GAN betas)
    pub fn gen_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        let opt = nn::Adam {
            beta1: 0.5,
            beta2: 0.999,
            wd: 0.0,
            ..Default::default()
        }
        .build(&self.gen_vs, lr)?;
        Ok(opt)
    }

    /// Discriminator optimizer (Adam, GAN betas)
    pub fn disc_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        let opt = nn::Adam {
            beta1: 0.5,
            beta2: 0.999,
            wd: 0.0,
            ..Default::default()
        }
        .build(&self.disc_vs, lr)?;
        Ok(opt)
    }

    /// Save model weights
    pub fn save(&self, gen_path: &str, disc_path: &str) -> Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load model weights
    pub fn load(&mut self, gen_path: &str, disc_path: &str) -> Result<()> {
        self.gen_vs.load(gen_path)?;
        self.disc_vs.load(disc_path)?;
        Ok(())
    }

    /// Activation mode, if any
    pub fn tanh_mode(&self) -> Option<TanhMode> {
        self.tanh.as_ref().map(|t| t.mode())
    }

    /// Whether generation needs a time value
    pub fn requires_time(&self) -> bool {
        self.tanh.as_ref().map_or(false, |t| t.requires_time())
    }

    /// Get latent dimension
    pub fn latent_dim(&self) -> i64 {
        self.vae.latent_dim()
    }

    /// Spatial size of generated images
    pub fn output_size(&self) -> i64 {
        self.vae.output_size()
    }

    /// Decode a straight line between two latent codes
    ///
    /// # Returns
    ///
    /// Tensor of shape (steps, 3, output_size, output_size)
    pub fn interpolate(
        &self,
        z1: &Tensor,
        z2: &Tensor,
        steps: i64,
        t: Option<f64>,
    ) -> Result<Tensor> {
        if steps < 1 {
            return Err(Error::InvalidConfiguration(format!(
                "interpolation needs at least one step, got {}",
                steps
            )));
        }
        let mut codes = Vec::with_capacity(steps as usize);
        for i in 0..steps {
            let alpha = if steps > 1 {
                i as f64 / (steps - 1) as f64
            } else {
                0.0
            };
            codes.push(z1 * (1.0 - alpha) + z2 * alpha);
        }
        let z = Tensor::f_stack(&codes, 0)?;
        let decoded = self.vae.decode(&z);
        match &self.tanh {
            Some(layer) => layer.forward(&decoded, t),
            None => Ok(decoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn test_generator_store_holds_learnable_alpha() {
        let plain = VaeGan::with_defaults(None, Device::Cpu);
        let single = VaeGan::with_defaults(Some(TanhMode::Single), Device::Cpu);
        let timed = VaeGan::with_defaults(Some(TanhMode::TimeFunction), Device::Cpu);

        let count = |m: &VaeGan| m.gen_vs.trainable_variables().len();
        assert_eq!(count(&single), count(&plain) + 1);
        assert_eq!(count(&timed), count(&plain));
        assert!(timed.requires_time());
        assert!(!single.requires_time());
    }

    #[test]
    fn test_tanh_sized_to_decoder_output() {
        let model = VaeGan::with_defaults(Some(TanhMode::Matrix), Device::Cpu);
        let alpha = model.tanh.as_ref().and_then(|t| t.alpha()).unwrap();
        assert_eq!(alpha.size(), vec![1, 1, 16, 16]);
    }

    #[test]
    fn test_sample_and_interpolate_shapes() {
        let config = VaeGanConfig {
            vae: VaeConfig {
                restore_resolution: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let model = VaeGan::new(config, Device::Cpu);

        let samples = model.sample(3, None).unwrap();
        assert_eq!(samples.size(), vec![3, 3, 128, 128]);

        let z1 = Tensor::randn([64], (Kind::Float, Device::Cpu));
        let z2 = Tensor::randn([64], (Kind::Float, Device::Cpu));
        let path = model.interpolate(&z1, &z2, 4, None).unwrap();
        assert_eq!(path.size(), vec![4, 3, 128, 128]);

        let probs = model.discriminate(&samples).unwrap();
        assert_eq!(probs.size(), vec![3, 1]);
    }

    #[test]
    fn test_interpolate_rejects_empty_path() {
        let model = VaeGan::with_defaults(None, Device::Cpu);
        let z1 = Tensor::randn([64], (Kind::Float, Device::Cpu));
        let z2 = Tensor::randn([64], (Kind::Float, Device::Cpu));

        for steps in [0, -3] {
            assert!(matches!(
                model.interpolate(&z1, &z2, steps, None),
                Err(Error::InvalidConfiguration(_))
            ));
        }
        let single = model.interpolate(&z1, &z2, 1, None).unwrap();
        assert_eq!(single.size(), vec![1, 3, 16, 16]);
    }
}
