//! # Kalman Core
//!
//! $$
//! \mu_{p,t}=\phi\,\mu_{f,t-1},\quad \Sigma_{p,t}=\phi^2\Sigma_{f,t-1}+\sigma_w^2,\quad
//! \mu_{f,t}=\frac{\sigma_w^2\mu_{p,t}+\Sigma_{p,t}\,y_t}{\sigma_w^2+\Sigma_{p,t}}
//! $$
//!
//! Scalar linear-Gaussian forward filter with a pure-forecast tail.
use impl_new_derive::ImplNew;
use ndarray::s;
use ndarray::Array1;
use ndarray::ArrayView1;

use crate::error::KalmanError;

/// Parameters of the scalar state-space model.
///
/// `process_variance` is carried for reporting only: the prediction step adds
/// `obs_variance` as its innovation noise, so both noise terms share one value.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct ModelParameters {
  /// Transition coefficient `φ`.
  pub phi: f64,
  /// Process noise variance `σ_v²`.
  pub process_variance: f64,
  /// Observation noise variance `σ_w²`.
  pub obs_variance: f64,
  /// Prior mean `m₀`.
  pub prior_mean: f64,
  /// Prior variance `Σ₀`.
  pub prior_variance: f64,
}

impl ModelParameters {
  /// Checks the domain constraints the recursion relies on.
  pub fn validate(&self) -> Result<(), KalmanError> {
    if !self.phi.is_finite() {
      return Err(KalmanError::invalid("phi", self.phi, "must be finite"));
    }
    if !(self.process_variance >= 0.0) {
      return Err(KalmanError::invalid(
        "process_variance",
        self.process_variance,
        "must be >= 0",
      ));
    }
    if !(self.obs_variance > 0.0) || !self.obs_variance.is_finite() {
      return Err(KalmanError::invalid(
        "obs_variance",
        self.obs_variance,
        "must be finite and > 0",
      ));
    }
    if !self.prior_mean.is_finite() {
      return Err(KalmanError::invalid(
        "prior_mean",
        self.prior_mean,
        "must be finite",
      ));
    }
    if !(self.prior_variance >= 0.0) || !self.prior_variance.is_finite() {
      return Err(KalmanError::invalid(
        "prior_variance",
        self.prior_variance,
        "must be finite and >= 0",
      ));
    }
    Ok(())
  }
}

/// Output of one forward pass.
///
/// `filtered_*` have length `T`. `predictive_*` have length `T + n`: the first
/// `T` entries are one-step-ahead predictions, the last `n` are pure forecasts.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterTrace {
  pub filtered_mean: Array1<f64>,
  pub filtered_variance: Array1<f64>,
  pub predictive_mean: Array1<f64>,
  pub predictive_variance: Array1<f64>,
}

impl FilterTrace {
  /// Number of observed time steps `T`.
  pub fn len(&self) -> usize {
    self.filtered_mean.len()
  }

  pub fn is_empty(&self) -> bool {
    self.filtered_mean.is_empty()
  }

  /// Number of pure-forecast steps `n`.
  pub fn horizon(&self) -> usize {
    self.predictive_mean.len() - self.len()
  }

  /// One-step-ahead predictive means over the observed range.
  pub fn one_step_mean(&self) -> ArrayView1<'_, f64> {
    self.predictive_mean.slice(s![..self.len()])
  }

  /// One-step-ahead predictive variances over the observed range.
  pub fn one_step_variance(&self) -> ArrayView1<'_, f64> {
    self.predictive_variance.slice(s![..self.len()])
  }

  /// Forecast means beyond the observed horizon.
  pub fn forecast_mean(&self) -> ArrayView1<'_, f64> {
    self.predictive_mean.slice(s![self.len()..])
  }

  /// Forecast variances beyond the observed horizon.
  pub fn forecast_variance(&self) -> ArrayView1<'_, f64> {
    self.predictive_variance.slice(s![self.len()..])
  }

  /// Appends `k` further pure-forecast steps using the same recursion as
  /// [`filter_and_forecast`], so `n + k` steps match a single run with horizon `n + k`.
  pub fn extend_forecast(&mut self, params: &ModelParameters, k: usize) -> Result<(), KalmanError> {
    params.validate()?;
    if self.is_empty() {
      return Err(KalmanError::invalid(
        "trace",
        f64::NAN,
        "cannot extend an empty trace",
      ));
    }

    let (mut mean, mut var) = match self.horizon() {
      0 => {
        let last = self.len() - 1;
        (self.filtered_mean[last], self.filtered_variance[last])
      }
      _ => {
        let last = self.predictive_mean.len() - 1;
        (self.predictive_mean[last], self.predictive_variance[last])
      }
    };

    let mut means = self.predictive_mean.to_vec();
    let mut vars = self.predictive_variance.to_vec();
    means.reserve(k);
    vars.reserve(k);

    for i in 0..k {
      (mean, var) = predict(mean, var, params.phi, params.obs_variance);
      check_variance(self.predictive_mean.len() + i, var)?;
      means.push(mean);
      vars.push(var);
    }

    self.predictive_mean = Array1::from_vec(means);
    self.predictive_variance = Array1::from_vec(vars);
    Ok(())
  }
}

#[inline]
fn predict(mean: f64, var: f64, phi: f64, q: f64) -> (f64, f64) {
  (phi * mean, phi * phi * var + q)
}

fn check_variance(step: usize, var: f64) -> Result<(), KalmanError> {
  if var >= 0.0 && var.is_finite() {
    Ok(())
  } else {
    tracing::debug!(step, var, "variance left the valid range");
    Err(KalmanError::invalid(
      "variance",
      var,
      "became negative or non-finite; the parameters are degenerate",
    ))
  }
}

pub(crate) fn validate_signal(y: &[f64]) -> Result<(), KalmanError> {
  if y.is_empty() {
    return Err(KalmanError::invalid(
      "signal",
      f64::NAN,
      "must contain at least one observation",
    ));
  }
  if let Some(bad) = y.iter().copied().find(|v| !v.is_finite()) {
    return Err(KalmanError::invalid(
      "signal",
      bad,
      "must not contain NaN or infinite values",
    ));
  }
  Ok(())
}

/// Runs the forward filter over `y` and forecasts `n` steps past its end.
///
/// Pure function of its inputs: identical arguments give bit-identical traces.
pub fn filter_and_forecast(
  y: &[f64],
  params: &ModelParameters,
  n: usize,
) -> Result<FilterTrace, KalmanError> {
  validate_signal(y)?;
  params.validate()?;

  let t_len = y.len();
  let phi = params.phi;
  let r = params.obs_variance;
  let m0 = params.prior_mean;
  let p0 = params.prior_variance;

  let mut mu_f = Array1::<f64>::zeros(t_len);
  let mut sigma_f = Array1::<f64>::zeros(t_len);
  let mut mu_p = Array1::<f64>::zeros(t_len + n);
  let mut sigma_p = Array1::<f64>::zeros(t_len + n);

  mu_p[0] = m0;
  sigma_p[0] = p0;
  mu_f[0] = m0 + (y[0] - m0) * p0 / (p0 + r);
  sigma_f[0] = p0 * r / (p0 + r);
  check_variance(0, sigma_f[0])?;

  for t in 1..t_len {
    let (m, v) = predict(mu_f[t - 1], sigma_f[t - 1], phi, r);
    check_variance(t, v)?;
    mu_p[t] = m;
    sigma_p[t] = v;

    let deno = r + v;
    mu_f[t] = r * m / deno + v * y[t] / deno;
    sigma_f[t] = r * v / deno;
    check_variance(t, sigma_f[t])?;
  }

  let (mut m, mut v) = (mu_f[t_len - 1], sigma_f[t_len - 1]);
  for t in t_len..t_len + n {
    (m, v) = predict(m, v, phi, r);
    check_variance(t, v)?;
    mu_p[t] = m;
    sigma_p[t] = v;
  }

  Ok(FilterTrace {
    filtered_mean: mu_f,
    filtered_variance: sigma_f,
    predictive_mean: mu_p,
    predictive_variance: sigma_p,
  })
}
