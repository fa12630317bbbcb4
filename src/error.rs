//! # Errors
//!
//! $$
//! \text{InvalidParameter} \;|\; \text{DegenerateLikelihood} \;|\; \text{CalibrationFailed}
//! $$
//!
use crate::filter::gp::Hyperparameters;

/// Error type for every fallible operation in the crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KalmanError {
  /// Malformed or out-of-domain numeric input. Fatal to the single call.
  #[error("invalid parameter `{name}` = {value}: {reason}")]
  InvalidParameter {
    /// Name of the offending argument.
    name: &'static str,
    /// Value that was rejected (`NaN` for non-numeric conditions such as an empty series).
    value: f64,
    /// Human readable constraint that was violated.
    reason: &'static str,
  },

  /// A one-step predictive variance collapsed to a non-positive value.
  #[error("degenerate likelihood at step {step}: predictive variance {variance} <= 0")]
  DegenerateLikelihood {
    /// Zero-based time index of the failing contribution.
    step: usize,
    /// Offending variance `Σ_p[t] + σ_w²`.
    variance: f64,
  },

  /// The calibrator could not produce acceptable hyperparameters.
  #[error("calibration failed ({reason}); best effort gamma={}, obs_variance={}, log-likelihood={log_likelihood}", .best.gamma, .best.obs_variance)]
  CalibrationFailed {
    /// Best point seen across all attempts.
    best: Hyperparameters,
    /// Log-likelihood at `best` (`-inf` if it could not be evaluated).
    log_likelihood: f64,
    /// Why the result was rejected.
    reason: String,
  },
}

impl KalmanError {
  pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
    KalmanError::InvalidParameter {
      name,
      value,
      reason,
    }
  }
}
