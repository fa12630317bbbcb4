//! # GP Kalman Adapter
//!
//! $$
//! \phi=e^{-1/\gamma},\qquad \sigma_v^2=1-e^{-2/\gamma}
//! $$
//!
//! Exponential-kernel Gaussian process expressed as an AR(1) state-space model.
use crate::error::KalmanError;
use crate::filter::kalman::filter_and_forecast;
use crate::filter::kalman::FilterTrace;
use crate::filter::kalman::ModelParameters;
use crate::filter::FilterConfig;

/// The two calibrated quantities: length-scale `γ` and observation noise `σ_w²`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperparameters {
  pub gamma: f64,
  pub obs_variance: f64,
}

impl Default for Hyperparameters {
  fn default() -> Self {
    Self {
      gamma: 5.0,
      obs_variance: 0.5,
    }
  }
}

impl Hyperparameters {
  pub fn new(gamma: f64, obs_variance: f64) -> Self {
    Self {
      gamma,
      obs_variance,
    }
  }

  /// Recovers `γ` from a transition coefficient `φ ∈ (0, 1)`.
  pub fn from_filter_params(phi: f64, obs_variance: f64) -> Result<Self, KalmanError> {
    if !(phi > 0.0 && phi < 1.0) {
      return Err(KalmanError::invalid("phi", phi, "must lie in (0, 1)"));
    }
    Ok(Self::new(-1.0 / phi.ln(), obs_variance))
  }

  /// Whether both values are finite and strictly positive.
  pub fn is_valid(&self) -> bool {
    self.gamma.is_finite()
      && self.gamma > 0.0
      && self.obs_variance.is_finite()
      && self.obs_variance > 0.0
  }

  /// Full model parameters for the given prior.
  pub fn to_model(&self, cfg: &FilterConfig) -> Result<ModelParameters, KalmanError> {
    let (phi, process_variance) = to_filter_params(self.gamma)?;
    Ok(ModelParameters::new(
      phi,
      process_variance,
      self.obs_variance,
      cfg.prior_mean,
      cfg.prior_variance,
    ))
  }
}

impl From<Hyperparameters> for Vec<f64> {
  fn from(h: Hyperparameters) -> Self {
    vec![h.gamma, h.obs_variance]
  }
}

/// `[γ, σ_w²]` in optimizer order.
impl TryFrom<&[f64]> for Hyperparameters {
  type Error = KalmanError;

  fn try_from(x: &[f64]) -> Result<Self, Self::Error> {
    match *x {
      [gamma, obs_variance] => Ok(Hyperparameters::new(gamma, obs_variance)),
      _ => Err(KalmanError::invalid(
        "hyperparameters",
        x.len() as f64,
        "expected exactly two values (gamma, obs_variance)",
      )),
    }
  }
}

/// Maps the length-scale to `(φ, σ_v²)`.
pub fn to_filter_params(gamma: f64) -> Result<(f64, f64), KalmanError> {
  if !(gamma > 0.0) {
    return Err(KalmanError::invalid("gamma", gamma, "must be > 0"));
  }
  let phi = (-1.0 / gamma).exp();
  let process_variance = 1.0 - (-2.0 / gamma).exp();
  Ok((phi, process_variance))
}

/// Filters `y` with the model implied by `hyper` and forecasts `n` steps.
pub fn run(
  y: &[f64],
  hyper: &Hyperparameters,
  cfg: &FilterConfig,
  n: usize,
) -> Result<FilterTrace, KalmanError> {
  let params = hyper.to_model(cfg)?;
  filter_and_forecast(y, &params, n)
}
