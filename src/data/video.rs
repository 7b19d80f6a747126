//! Synthetic video clips built from a single generated image
//!
//! Every frame replays the same image with fresh Gaussian noise. Frames are
//! produced lazily and the sequence is fully determined by the seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tch::{Kind, Tensor};

use crate::error::{Error, Result};
use crate::model::DynamicTanh;

/// Synthetic clip configuration
#[derive(Debug, Clone)]
pub struct SyntheticVideoConfig {
    /// Number of frames in the clip
    pub num_frames: usize,
    /// Frames per second, used to derive each frame's time value
    pub fps: f64,
    /// Standard deviation of the per-pixel noise
    pub noise_std: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for SyntheticVideoConfig {
    fn default() -> Self {
        Self {
            num_frames: 16,
            fps: 30.0,
            noise_std: 0.05,
            seed: 42,
        }
    }
}

/// Finite, restartable frame sequence
pub struct SyntheticVideo<'a> {
    base: Tensor,
    config: SyntheticVideoConfig,
    tanh: Option<&'a DynamicTanh>,
    rng: StdRng,
    noise: Normal<f32>,
    frame: usize,
}

impl<'a> SyntheticVideo<'a> {
    /// Create a clip from an image of shape (3, H, W) or (1, 3, H, W)
    pub fn new(image: &Tensor, config: SyntheticVideoConfig) -> Result<Self> {
        let base = match image.size().as_slice() {
            [3, _, _] => image.shallow_clone(),
            [1, 3, _, _] => image.squeeze_dim(0),
            other => {
                return Err(Error::ShapeMismatch {
                    context: "synthetic video".to_string(),
                    expected: "[3, H, W] or [1, 3, H, W]".to_string(),
                    actual: format!("{:?}", other),
                })
            }
        };
        if !(config.fps > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "fps must be positive, got {}",
                config.fps
            )));
        }
        let noise = Normal::new(0.0f32, config.noise_std as f32).map_err(|e| {
            Error::InvalidConfiguration(format!("noise std {}: {}", config.noise_std, e))
        })?;

        Ok(Self {
            base: base.detach().to_kind(Kind::Float),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            tanh: None,
            noise,
            frame: 0,
        })
    }

    /// Pass every frame through `tanh` at the frame's time
    pub fn with_tanh(mut self, tanh: &'a DynamicTanh) -> Self {
        self.tanh = Some(tanh);
        self
    }

    /// Rewind to the first frame; the replay is identical
    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.frame = 0;
    }

    /// Time of frame `k` in seconds
    pub fn frame_time(&self, k: usize) -> f64 {
        k as f64 / self.config.fps
    }

    /// Consume the remaining frames into a (T, 3, H, W) tensor
    pub fn collect_clip(self) -> Result<Tensor> {
        let frames = self.collect::<Result<Vec<_>>>()?;
        if frames.is_empty() {
            return Err(Error::InvalidConfiguration("clip has no frames".to_string()));
        }
        Ok(Tensor::stack(&frames, 0))
    }

    fn render(&mut self) -> Result<Tensor> {
        let numel = self.base.numel();
        let samples: Vec<f32> = (0..numel).map(|_| self.noise.sample(&mut self.rng)).collect();
        let noise = Tensor::from_slice(&samples)
            .view(self.base.size().as_slice())
            .to_device(self.base.device());

        let frame = (&self.base + noise).clamp(0.0, 1.0);
        match self.tanh {
            Some(tanh) => {
                let t = self.frame_time(self.frame);
                Ok(tanh.forward(&frame.unsqueeze(0), Some(t))?.squeeze_dim(0))
            }
            None => Ok(frame),
        }
    }
}

impl Iterator for SyntheticVideo<'_> {
    type Item = Result<Tensor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frame >= self.config.num_frames {
            return None;
        }
        let frame = self.render();
        self.frame += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.config.num_frames.saturating_sub(self.frame);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SyntheticVideo<'_> {}
