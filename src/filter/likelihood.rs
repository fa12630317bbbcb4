//! # Marginal Log-Likelihood
//!
//! $$
//! \log p(y_{1:T})=\log p(y_1)+\sum_{t=2}^{T}\log\mathcal N\bigl(y_t;\mu_{p,t},\Sigma_{p,t}+\sigma_w^2\bigr)
//! $$
//!
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::ArrayView1;
use statrs::distribution::Continuous;
use statrs::distribution::Normal;

use crate::error::KalmanError;
use crate::filter::kalman::validate_signal;
use crate::filter::kalman::FilterTrace;
use crate::filter::kalman::ModelParameters;

fn normal_ln_pdf(x: f64, mean: f64, variance: f64, step: usize) -> Result<f64, KalmanError> {
  if !(variance > 0.0) || !variance.is_finite() {
    return Err(KalmanError::DegenerateLikelihood { step, variance });
  }
  let dist = Normal::new(mean, variance.sqrt())
    .map_err(|_| KalmanError::DegenerateLikelihood { step, variance })?;
  Ok(dist.ln_pdf(x))
}

/// Sums the one-step predictive log-densities of `y`.
///
/// `mean` and `variance` are the first `T` predictive entries of a trace. The
/// first term ignores them and scores `y[0]` against the prior directly.
pub fn log_likelihood(
  y: &[f64],
  mean: ArrayView1<f64>,
  variance: ArrayView1<f64>,
  obs_variance: f64,
  prior_mean: f64,
  prior_variance: f64,
) -> Result<f64, KalmanError> {
  validate_signal(y)?;
  if mean.len() != y.len() || variance.len() != y.len() {
    return Err(KalmanError::invalid(
      "predictive",
      mean.len().min(variance.len()) as f64,
      "predictive sequences must have the same length as the signal",
    ));
  }

  let mut ll = normal_ln_pdf(y[0], prior_mean, prior_variance + obs_variance, 0)?;
  for t in 1..y.len() {
    ll += normal_ln_pdf(y[t], mean[t], variance[t] + obs_variance, t)?;
  }
  Ok(ll)
}

/// [`log_likelihood`] for a trace produced with `params`.
pub fn trace_log_likelihood(
  y: &[f64],
  trace: &FilterTrace,
  params: &ModelParameters,
) -> Result<f64, KalmanError> {
  log_likelihood(
    y,
    trace.one_step_mean(),
    trace.one_step_variance(),
    params.obs_variance,
    params.prior_mean,
    params.prior_variance,
  )
}

/// Log-density of `y` under the full joint Gaussian implied by `params`.
///
/// The latent variance follows `V_1 = Σ₀`, `V_t = φ² V_{t-1} + σ_w²` with
/// `Cov(x_s, x_t) = φ^{t-s} V_s` for `s <= t`; `σ_w²` is added on the diagonal
/// for the observation noise. Cost is `O(T³)`, intended for short series.
pub fn joint_log_density(y: &[f64], params: &ModelParameters) -> Result<f64, KalmanError> {
  validate_signal(y)?;
  params.validate()?;

  let t_len = y.len();
  let phi = params.phi;
  let r = params.obs_variance;

  let mut latent_var = vec![0.0; t_len];
  let mut latent_mean = vec![0.0; t_len];
  latent_var[0] = params.prior_variance;
  latent_mean[0] = params.prior_mean;
  for t in 1..t_len {
    latent_var[t] = phi * phi * latent_var[t - 1] + r;
    latent_mean[t] = phi * latent_mean[t - 1];
  }

  let cov = DMatrix::from_fn(t_len, t_len, |i, j| {
    let (s, t) = if i <= j { (i, j) } else { (j, i) };
    let c = phi.powi((t - s) as i32) * latent_var[s];
    if i == j {
      c + r
    } else {
      c
    }
  });

  let chol = cov
    .clone()
    .cholesky()
    .ok_or_else(|| KalmanError::DegenerateLikelihood {
      step: 0,
      variance: cov.diagonal().min(),
    })?;

  let resid = DVector::from_iterator(t_len, y.iter().zip(&latent_mean).map(|(a, b)| a - b));
  let sol = chol.solve(&resid);
  let quad = resid.dot(&sol);
  let log_det = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();

  Ok(-0.5 * (t_len as f64 * (2.0 * std::f64::consts::PI).ln() + log_det + quad))
}
