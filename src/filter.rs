//! # Filter
//!
//! $$
//! x_t=\phi x_{t-1}+\varepsilon_t,\qquad y_t=x_t+\eta_t
//! $$
//!
//! Forward filtering, the Gaussian-process reparameterization and the
//! marginal likelihood built on top of it.
pub mod gp;
pub mod kalman;
pub mod likelihood;

/// Prior of the latent state at the first observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterConfig {
  /// Prior mean `m₀`.
  pub prior_mean: f64,
  /// Prior variance `Σ₀`.
  pub prior_variance: f64,
}

impl Default for FilterConfig {
  fn default() -> Self {
    Self {
      prior_mean: 0.0,
      prior_variance: 1.0,
    }
  }
}
