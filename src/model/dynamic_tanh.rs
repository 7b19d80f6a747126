//! Dynamic tanh activation
//!
//! Computes `tanh(alpha * x)` where `alpha` is either a learnable scalar, a
//! learnable per-pixel grid, or a non-learnable cosine of time. The variant is
//! fixed when the layer is built.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use tch::{nn, Device, Kind, Tensor};

use crate::error::{ensure_device, Error, Result};

/// Frame rate used by the time-varying alpha
pub const FRAME_RATE: f64 = 188.5;

/// How `alpha` is parameterized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TanhMode {
    /// One learnable scalar shared by every element
    Single,
    /// One learnable weight per spatial cell, shape (1, 1, H, W)
    Matrix,
    /// `cos(omega * t + (i * W + j) * pi / 2)`, recomputed on every call
    TimeFunction,
}

impl TanhMode {
    /// Canonical config-file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            TanhMode::Single => "single",
            TanhMode::Matrix => "matrix",
            TanhMode::TimeFunction => "time_function",
        }
    }
}

impl fmt::Display for TanhMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TanhMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "single" => Ok(TanhMode::Single),
            "matrix" => Ok(TanhMode::Matrix),
            "time_function" | "timefunction" => Ok(TanhMode::TimeFunction),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown tanh mode '{}', expected one of single, matrix, time_function",
                other
            ))),
        }
    }
}

/// Dynamic tanh configuration
#[derive(Debug, Clone)]
pub struct TanhConfig {
    /// Height of the activated feature map
    pub height: i64,
    /// Width of the activated feature map
    pub width: i64,
    /// Initial constant for `alpha`
    pub init_alpha: f64,
    /// Parameterization of `alpha`
    pub mode: TanhMode,
    /// Frequency of the time-varying alpha
    pub frame_rate: f64,
}

impl Default for TanhConfig {
    fn default() -> Self {
        Self {
            height: 128,
            width: 128,
            init_alpha: 1.0,
            mode: TanhMode::Single,
            frame_rate: FRAME_RATE,
        }
    }
}

#[derive(Debug)]
enum Alpha {
    Single(Tensor),
    Matrix(Tensor),
    TimeFunction { omega: f64 },
}

/// `tanh(alpha * x)` with a mode-dependent `alpha`
#[derive(Debug)]
pub struct DynamicTanh {
    config: TanhConfig,
    alpha: Alpha,
}

/// Name used for this layer where it stands in for a constant-parameter tanh
pub type ConstantParamTanh = DynamicTanh;

impl DynamicTanh {
    /// Create a new dynamic tanh layer
    ///
    /// Learnable variants register `alpha` under `vs`, so they are trained
    /// by whichever optimizer owns that variable store.
    pub fn new(vs: &nn::Path, config: TanhConfig) -> Self {
        let alpha = match config.mode {
            TanhMode::Single => {
                Alpha::Single(vs.var("alpha", &[1], nn::Init::Const(config.init_alpha)))
            }
            TanhMode::Matrix => {
                let dims = [1, 1, config.height, config.width];
                let mut alpha = vs.var("alpha", &dims, nn::Init::Const(config.init_alpha));
                // The Xavier draw replaces the constant fill entirely.
                let bound = xavier_uniform_bound(&dims);
                tch::no_grad(|| {
                    let _ = alpha.uniform_(-bound, bound);
                });
                Alpha::Matrix(alpha)
            }
            TanhMode::TimeFunction => Alpha::TimeFunction {
                omega: 2.0 * PI * config.frame_rate,
            },
        };

        Self { config, alpha }
    }

    /// Create a layer from a mode string such as `"matrix"`
    pub fn from_mode_str(
        vs: &nn::Path,
        height: i64,
        width: i64,
        init_alpha: f64,
        mode: &str,
    ) -> Result<Self> {
        let mode = mode.parse::<TanhMode>()?;
        Ok(Self::new(
            vs,
            TanhConfig {
                height,
                width,
                init_alpha,
                mode,
                ..Default::default()
            },
        ))
    }

    /// Apply the activation
    ///
    /// `t` is mandatory in `TimeFunction` mode and ignored otherwise.
    pub fn forward(&self, x: &Tensor, t: Option<f64>) -> Result<Tensor> {
        match &self.alpha {
            Alpha::Single(alpha) => {
                ensure_device("dynamic tanh", alpha.device(), x)?;
                Ok((x * alpha).tanh())
            }
            Alpha::Matrix(alpha) => {
                self.check_spatial(x)?;
                ensure_device("dynamic tanh", alpha.device(), x)?;
                Ok((x * alpha).tanh())
            }
            Alpha::TimeFunction { .. } => {
                let t = t.ok_or_else(|| {
                    Error::MissingArgument(
                        "time value `t` is required in time_function mode".to_string(),
                    )
                })?;
                self.check_spatial(x)?;
                let alpha = self.time_alpha(t, x.size()[0], x.device())?;
                Ok((x * alpha.to_kind(x.kind())).tanh())
            }
        }
    }

    /// Apply the activation at time `t`
    pub fn forward_at(&self, x: &Tensor, t: f64) -> Result<Tensor> {
        self.forward(x, Some(t))
    }

    /// Time-varying alpha grid of shape (batch, 1, H, W)
    pub fn time_alpha(&self, t: f64, batch: i64, device: Device) -> Result<Tensor> {
        let omega = match self.alpha {
            Alpha::TimeFunction { omega } => omega,
            _ => {
                return Err(Error::InvalidConfiguration(format!(
                    "time alpha requested from a {} layer",
                    self.config.mode
                )))
            }
        };
        let (h, w) = (self.config.height, self.config.width);

        // Phase is computed in double precision; cell indices reach H * W.
        let cells = Tensor::arange(h * w, (Kind::Double, device)).view([1, 1, h, w]);
        let grid = (cells * (PI / 2.0) + omega * t).cos().to_kind(Kind::Float);
        Ok(grid.expand([batch, 1, h, w], false))
    }

    /// Learnable alpha, if this mode has one
    pub fn alpha(&self) -> Option<&Tensor> {
        match &self.alpha {
            Alpha::Single(alpha) | Alpha::Matrix(alpha) => Some(alpha),
            Alpha::TimeFunction { .. } => None,
        }
    }

    /// Activation mode
    pub fn mode(&self) -> TanhMode {
        self.config.mode
    }

    /// Whether `forward` needs a time value
    pub fn requires_time(&self) -> bool {
        matches!(self.alpha, Alpha::TimeFunction { .. })
    }

    /// Whether `alpha` is trained
    pub fn is_learnable(&self) -> bool {
        !self.requires_time()
    }

    /// Get configuration
    pub fn config(&self) -> &TanhConfig {
        &self.config
    }

    fn check_spatial(&self, x: &Tensor) -> Result<()> {
        let size = x.size();
        let expected = [self.config.height, self.config.width];
        if size.len() != 4 || size[2..] != expected {
            return Err(Error::ShapeMismatch {
                context: format!("dynamic tanh ({})", self.config.mode),
                expected: format!("[B, C, {}, {}]", expected[0], expected[1]),
                actual: format!("{:?}", size),
            });
        }
        Ok(())
    }
}

/// Xavier-uniform bound `sqrt(6 / (fan_in + fan_out))` for a weight of `dims`
///
/// Fans follow the convolution convention: dims 0 and 1 are output and input
/// channels, trailing dims form the receptive field.
pub fn xavier_uniform_bound(dims: &[i64]) -> f64 {
    let (fan_in, fan_out) = match dims.len() {
        0 | 1 => {
            let n = dims.first().copied().unwrap_or(1);
            (n, n)
        }
        _ => {
            let receptive: i64 = dims[2..].iter().product();
            (dims[1] * receptive, dims[0] * receptive)
        }
    };
    (6.0 / (fan_in + fan_out) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tch::nn::VarStore;

    fn layer(mode: TanhMode, init_alpha: f64) -> (VarStore, DynamicTanh) {
        let vs = VarStore::new(Device::Cpu);
        let config = TanhConfig {
            height: 8,
            width: 8,
            init_alpha,
            mode,
            ..Default::default()
        };
        let tanh = DynamicTanh::new(&vs.root(), config);
        (vs, tanh)
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f64 {
        (a - b).abs().max().double_value(&[])
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("single".parse::<TanhMode>().unwrap(), TanhMode::Single);
        assert_eq!("Matrix".parse::<TanhMode>().unwrap(), TanhMode::Matrix);
        assert_eq!(
            "time-function".parse::<TanhMode>().unwrap(),
            TanhMode::TimeFunction
        );
        for mode in [TanhMode::Single, TanhMode::Matrix, TanhMode::TimeFunction] {
            assert_eq!(mode.as_str().parse::<TanhMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let vs = VarStore::new(Device::Cpu);
        let result = DynamicTanh::from_mode_str(&vs.root(), 8, 8, 1.0, "vector");
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_single_unit_alpha_is_plain_tanh() {
        let (_vs, tanh) = layer(TanhMode::Single, 1.0);
        let x = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));

        let out = tanh.forward(&x, None).unwrap();

        assert_eq!(out.size(), x.size());
        assert_abs_diff_eq!(max_abs_diff(&out, &x.tanh()), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_single_broadcasts_over_any_shape() {
        let (_vs, tanh) = layer(TanhMode::Single, 0.5);
        let x = Tensor::randn([4, 1, 3, 5], (Kind::Float, Device::Cpu));

        let out = tanh.forward(&x, None).unwrap();

        assert_abs_diff_eq!(max_abs_diff(&out, &(&x * 0.5).tanh()), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_alpha_is_xavier_not_constant() {
        let (_vs, tanh) = layer(TanhMode::Matrix, 5.0);
        let alpha = tanh.alpha().unwrap();

        assert_eq!(alpha.size(), vec![1, 1, 8, 8]);

        let bound = xavier_uniform_bound(&[1, 1, 8, 8]);
        assert_abs_diff_eq!(bound, (6.0f64 / 128.0).sqrt(), epsilon = 1e-12);

        let max_abs = alpha.abs().max().double_value(&[]);
        assert!(max_abs <= bound + 1e-6, "alpha exceeds Xavier bound");
        assert!(alpha.std(true).double_value(&[]) > 0.0);
    }

    #[test]
    fn test_matrix_rejects_wrong_spatial_size() {
        let (_vs, tanh) = layer(TanhMode::Matrix, 1.0);
        let x = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));

        let result = tanh.forward(&x, None);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_time_function_requires_t() {
        let (_vs, tanh) = layer(TanhMode::TimeFunction, 1.0);
        let x = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));

        assert!(tanh.requires_time());
        assert!(tanh.alpha().is_none());
        assert!(matches!(
            tanh.forward(&x, None),
            Err(Error::MissingArgument(_))
        ));
    }

    #[test]
    fn test_time_function_is_deterministic() {
        let (_vs, tanh) = layer(TanhMode::TimeFunction, 1.0);
        let x = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));

        let a = tanh.forward_at(&x, 0.25).unwrap();
        let b = tanh.forward_at(&x, 0.25).unwrap();

        assert_eq!(a.size(), x.size());
        assert_abs_diff_eq!(max_abs_diff(&a, &b), 0.0);
    }

    #[test]
    fn test_time_alpha_values_at_zero() {
        let (_vs, tanh) = layer(TanhMode::TimeFunction, 1.0);
        let alpha = tanh.time_alpha(0.0, 3, Device::Cpu).unwrap();

        assert_eq!(alpha.size(), vec![3, 1, 8, 8]);
        // cos(k * pi / 2) cycles through 1, 0, -1, 0
        assert_abs_diff_eq!(alpha.double_value(&[0, 0, 0, 0]), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(alpha.double_value(&[0, 0, 0, 1]), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(alpha.double_value(&[1, 0, 0, 2]), -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(alpha.double_value(&[2, 0, 1, 0]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_single_alpha_receives_gradient() {
        let (_vs, tanh) = layer(TanhMode::Single, 1.0);
        let x = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));

        let out = tanh.forward(&x, None).unwrap();
        out.sum(Kind::Float).backward();

        let grad = tanh.alpha().unwrap().grad();
        assert!(grad.defined());
        assert!(grad.abs().sum(Kind::Float).double_value(&[]) > 0.0);
    }
}
