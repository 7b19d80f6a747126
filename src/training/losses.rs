//! Loss functions for Wasserstein GAN training with gradient penalty
//!
//! The critic is anything implementing [`Critic`]; the Discriminator is the
//! production implementation. All functions validate that real and generated
//! batches agree in shape and share the critic's device before computing.

use serde::{Deserialize, Serialize};
use tch::{Device, Kind, Reduction, Tensor};

use crate::error::{ensure_device, Error, Result};
use crate::model::Discriminator;

/// Default weight of the gradient penalty
pub const DEFAULT_LAMBDA_GP: f64 = 10.0;

/// A network scoring image batches, one score per sample
pub trait Critic {
    /// Scores of shape (batch, 1)
    fn score(&self, images: &Tensor) -> Result<Tensor>;

    /// Device the critic's parameters live on
    fn device(&self) -> Device;
}

impl Critic for Discriminator {
    fn score(&self, images: &Tensor) -> Result<Tensor> {
        self.forward(images)
    }

    fn device(&self) -> Device {
        Discriminator::device(self)
    }
}

/// Distribution of the per-sample interpolation weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationSampling {
    /// Standard normal draws, not restricted to [0, 1]
    #[default]
    Normal,
    /// Uniform draws on [0, 1)
    Uniform,
}

/// Parts of the adversarial objective, kept for logging
#[derive(Debug)]
pub struct AdversarialLoss {
    /// `mean(D(real)) - mean(D(generated))`
    pub wasserstein: Tensor,
    /// `mean((||grad||_2 - 1)^2)` on interpolated samples
    pub gradient_penalty: Tensor,
    /// `wasserstein + lambda_gp * gradient_penalty`
    pub total: Tensor,
}

fn check_pair<C: Critic + ?Sized>(
    context: &str,
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
) -> Result<()> {
    let real_size = real.size();
    let generated_size = generated.size();
    if real_size.len() != 4 {
        return Err(Error::ShapeMismatch {
            context: context.to_string(),
            expected: "[B, C, H, W]".to_string(),
            actual: format!("{:?}", real_size),
        });
    }
    if real_size != generated_size {
        return Err(Error::shape(context, &real_size, &generated_size));
    }
    ensure_device(context, critic.device(), real)?;
    ensure_device(context, critic.device(), generated)
}

/// Wasserstein distance estimate: `mean(D(real)) - mean(D(generated))`
pub fn wasserstein_loss<C: Critic + ?Sized>(
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
) -> Result<Tensor> {
    check_pair("wasserstein loss", real, generated, critic)?;
    let real_score = critic.score(real)?.mean(Kind::Float);
    let generated_score = critic.score(generated)?.mean(Kind::Float);
    Ok(real_score - generated_score)
}

/// Gradient penalty with normally drawn interpolation weights
pub fn gradient_penalty<C: Critic + ?Sized>(
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
    device: Device,
) -> Result<Tensor> {
    gradient_penalty_with(real, generated, critic, device, InterpolationSampling::Normal)
}

/// Gradient penalty: `mean((||dD(x_hat)/dx_hat||_2 - 1)^2)`
///
/// `x_hat = alpha * real + (1 - alpha) * generated` with one `alpha` per
/// sample. The input gradient is built with `create_graph`, so the returned
/// penalty can itself be backpropagated into the critic's parameters, and
/// the graph is kept for later backward passes in the same step.
pub fn gradient_penalty_with<C: Critic + ?Sized>(
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
    device: Device,
    sampling: InterpolationSampling,
) -> Result<Tensor> {
    check_pair("gradient penalty", real, generated, critic)?;
    if device != critic.device() {
        return Err(Error::device("gradient penalty", critic.device(), device));
    }

    let batch_size = real.size()[0];
    let options = (real.kind(), device);
    let alpha = match sampling {
        InterpolationSampling::Normal => Tensor::randn([batch_size, 1, 1, 1], options),
        InterpolationSampling::Uniform => Tensor::rand([batch_size, 1, 1, 1], options),
    };

    let mixed = &alpha * real + (alpha.neg() + 1.0) * generated;
    let interpolated = if mixed.requires_grad() {
        mixed
    } else {
        mixed.set_requires_grad(true)
    };

    let scores = critic.score(&interpolated)?;
    let gradients = if scores.requires_grad() {
        let mut grads = Tensor::f_run_backward(
            &[scores.sum(Kind::Float)],
            &[&interpolated],
            true,
            true,
        )?;
        grads.pop().unwrap_or_else(|| interpolated.zeros_like())
    } else {
        // A score that does not depend on the input has zero gradient.
        interpolated.zeros_like()
    };

    let norms = gradients
        .reshape([batch_size, -1])
        .norm_scalaropt_dim(2.0, [1i64].as_slice(), false);
    Ok((norms - 1.0).square().mean(Kind::Float))
}

/// `wasserstein_loss + lambda_gp * gradient_penalty`
pub fn combined_loss<C: Critic + ?Sized>(
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
    device: Device,
    lambda_gp: f64,
) -> Result<Tensor> {
    let parts = adversarial_loss(
        real,
        generated,
        critic,
        device,
        lambda_gp,
        InterpolationSampling::Normal,
    )?;
    Ok(parts.total)
}

/// Combined objective with its parts
pub fn adversarial_loss<C: Critic + ?Sized>(
    real: &Tensor,
    generated: &Tensor,
    critic: &C,
    device: Device,
    lambda_gp: f64,
    sampling: InterpolationSampling,
) -> Result<AdversarialLoss> {
    let wasserstein = wasserstein_loss(real, generated, critic)?;
    let gradient_penalty = gradient_penalty_with(real, generated, critic, device, sampling)?;
    let total = &wasserstein + &gradient_penalty * lambda_gp;
    Ok(AdversarialLoss {
        wasserstein,
        gradient_penalty,
        total,
    })
}

/// Critic objective to minimize: `-wasserstein + lambda_gp * gradient_penalty`
pub fn critic_loss(parts: &AdversarialLoss, lambda_gp: f64) -> Tensor {
    -&parts.wasserstein + &parts.gradient_penalty * lambda_gp
}

/// Pixel-wise reconstruction error of the VAE
pub fn reconstruction_loss(reconstruction: &Tensor, target: &Tensor) -> Result<Tensor> {
    let (r, t) = (reconstruction.size(), target.size());
    if r != t {
        return Err(Error::shape("reconstruction loss", &t, &r));
    }
    Ok(reconstruction.mse_loss(target, Reduction::Mean))
}
