//! # kalman-gp
//!
//! $$
//! k(t,t')=e^{-|t-t'|/\gamma}\ \Longleftrightarrow\ x_t=e^{-1/\gamma}x_{t-1}+\varepsilon_t
//! $$
//!
//! Sequential Kalman filtering of a scalar signal under a Gaussian-process
//! equivalent prior, marginal-likelihood calibration of its two hyperparameters
//! and short-horizon forecasting with confidence bands.
pub mod calibration;
pub mod error;
pub mod filter;
pub mod pipeline;

pub mod prelude {
  pub use crate::calibration::calibrate;
  pub use crate::calibration::minimizer::LbfgsMinimizer;
  pub use crate::calibration::minimizer::Minimizer;
  pub use crate::calibration::minimizer::NelderMeadMinimizer;
  pub use crate::calibration::CalibrationConfig;
  pub use crate::calibration::CalibrationResult;
  pub use crate::calibration::Calibrator;
  pub use crate::error::KalmanError;
  pub use crate::filter::gp::to_filter_params;
  pub use crate::filter::gp::Hyperparameters;
  pub use crate::filter::kalman::filter_and_forecast;
  pub use crate::filter::kalman::FilterTrace;
  pub use crate::filter::kalman::ModelParameters;
  pub use crate::filter::likelihood::joint_log_density;
  pub use crate::filter::likelihood::log_likelihood;
  pub use crate::filter::FilterConfig;
  pub use crate::pipeline::confidence_band;
  pub use crate::pipeline::Band;
  pub use crate::pipeline::ForecastConfig;
  pub use crate::pipeline::ForecastPipeline;
  pub use crate::pipeline::ForecastResult;
}
