//! Training metrics for monitoring adversarial training
//!
//! Per-epoch averages of the critic and generator objectives and of the two
//! parts of the adversarial loss, with CSV persistence.

/// Metrics collected during training
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Generator losses per epoch
    pub gen_losses: Vec<f64>,
    /// Critic losses per epoch
    pub critic_losses: Vec<f64>,
    /// Wasserstein estimates per epoch
    pub wasserstein: Vec<f64>,
    /// Gradient penalties per epoch
    pub gradient_penalty: Vec<f64>,
    /// Steps whose losses were NaN or infinite
    pub non_finite_steps: usize,
    /// Steps aborted by shape or device errors
    pub skipped_steps: usize,
}

impl TrainingMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record epoch metrics
    pub fn record_epoch(
        &mut self,
        gen_loss: f64,
        critic_loss: f64,
        wasserstein: f64,
        gradient_penalty: f64,
    ) {
        self.gen_losses.push(gen_loss);
        self.critic_losses.push(critic_loss);
        self.wasserstein.push(wasserstein);
        self.gradient_penalty.push(gradient_penalty);
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.gen_losses.len()
    }

    /// Get latest generator loss
    pub fn latest_gen_loss(&self) -> Option<f64> {
        self.gen_losses.last().copied()
    }

    /// Get latest critic loss
    pub fn latest_critic_loss(&self) -> Option<f64> {
        self.critic_losses.last().copied()
    }

    /// Get latest Wasserstein estimate
    pub fn latest_wasserstein(&self) -> Option<f64> {
        self.wasserstein.last().copied()
    }

    /// Moving average of the Wasserstein estimate
    pub fn wasserstein_ma(&self, window: usize) -> f64 {
        moving_average(&self.wasserstein, window)
    }

    /// Moving average of the gradient penalty
    pub fn gradient_penalty_ma(&self, window: usize) -> f64 {
        moving_average(&self.gradient_penalty, window)
    }

    /// Save metrics to CSV file
    pub fn save_csv(&self, path: &str) -> crate::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record([
            "epoch",
            "gen_loss",
            "critic_loss",
            "wasserstein",
            "gradient_penalty",
        ])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                (i + 1).to_string(),
                self.gen_losses[i].to_string(),
                self.critic_losses[i].to_string(),
                self.wasserstein[i].to_string(),
                self.gradient_penalty[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load metrics from CSV file
    pub fn load_csv(path: &str) -> crate::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut metrics = Self::new();

        for result in reader.records() {
            let record = result?;
            metrics.gen_losses.push(parse_field(&record, 1)?);
            metrics.critic_losses.push(parse_field(&record, 2)?);
            metrics.wasserstein.push(parse_field(&record, 3)?);
            metrics.gradient_penalty.push(parse_field(&record, 4)?);
        }

        Ok(metrics)
    }
}

fn parse_field(record: &csv::StringRecord, index: usize) -> crate::Result<f64> {
    let field = record.get(index).unwrap_or_default();
    field.parse().map_err(|_| {
        crate::Error::DataError(format!("bad metrics field {} '{}'", index, field))
    })
}

/// Exponential moving average tracker
#[derive(Debug)]
pub struct EmaTracker {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl EmaTracker {
    /// Create new EMA tracker
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor (0 < alpha <= 1). Higher = more weight on recent
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(0.001, 1.0),
            initialized: false,
        }
    }

    /// Update with new value; non-finite values are ignored
    pub fn update(&mut self, new_value: f64) {
        if !new_value.is_finite() {
            return;
        }
        if !self.initialized {
            self.value = new_value;
            self.initialized = true;
        } else {
            self.value = self.alpha * new_value + (1.0 - self.alpha) * self.value;
        }
    }

    /// Get current EMA value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Reset tracker
    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}

fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
