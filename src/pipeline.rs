//! # Forecast Pipeline
//!
//! $$
//! \hat y_{T+h}\in\Bigl[\mu_{p,T+h}-z_{1-\alpha/2}\sqrt{\Sigma_{p,T+h}},\ \mu_{p,T+h}+z_{1-\alpha/2}\sqrt{\Sigma_{p,T+h}}\Bigr]
//! $$
//!
//! Calibrate, refit and forecast one signal, or many independent signals in parallel.
use ndarray::Array1;
use ndarray::ArrayView1;
use rayon::prelude::*;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::info;
use tracing::warn;

use crate::calibration::minimizer::Minimizer;
use crate::calibration::minimizer::NelderMeadMinimizer;
use crate::calibration::CalibrationConfig;
use crate::calibration::Calibrator;
use crate::error::KalmanError;
use crate::filter::gp;
use crate::filter::gp::Hyperparameters;
use crate::filter::kalman::FilterTrace;
use crate::filter::kalman::ModelParameters;

/// Pipeline settings.
#[derive(Clone, Debug)]
pub struct ForecastConfig {
  /// Pure-forecast steps past the last observation.
  pub horizon: usize,
  /// Two-sided significance level of the confidence bands.
  pub alpha: f64,
  pub calibration: CalibrationConfig,
}

impl Default for ForecastConfig {
  fn default() -> Self {
    Self {
      horizon: 2,
      alpha: 0.01,
      calibration: CalibrationConfig::default(),
    }
  }
}

/// Lower and upper edges of a symmetric Gaussian band.
#[derive(Clone, Debug, PartialEq)]
pub struct Band {
  pub lower: Array1<f64>,
  pub upper: Array1<f64>,
}

/// Calibrated forecast of a single signal.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastResult {
  pub trace: FilterTrace,
  pub hyper: Hyperparameters,
  /// Model parameters the trace was produced with.
  pub model: ModelParameters,
  pub log_likelihood: f64,
  /// Whether calibration met the minimizer's convergence criterion.
  pub converged: bool,
}

impl ForecastResult {
  /// Bands around the filtered estimates.
  pub fn filtered_band(&self, alpha: f64) -> Result<Band, KalmanError> {
    confidence_band(
      self.trace.filtered_mean.view(),
      self.trace.filtered_variance.view(),
      alpha,
    )
  }

  /// Bands around the one-step predictions and the forecasts.
  pub fn predictive_band(&self, alpha: f64) -> Result<Band, KalmanError> {
    confidence_band(
      self.trace.predictive_mean.view(),
      self.trace.predictive_variance.view(),
      alpha,
    )
  }
}

/// `μ ∓ z_{1-α/2} √Σ` elementwise.
pub fn confidence_band(
  mean: ArrayView1<f64>,
  variance: ArrayView1<f64>,
  alpha: f64,
) -> Result<Band, KalmanError> {
  if !(alpha > 0.0 && alpha < 1.0) {
    return Err(KalmanError::invalid("alpha", alpha, "must lie in (0, 1)"));
  }
  if mean.len() != variance.len() {
    return Err(KalmanError::invalid(
      "variance",
      variance.len() as f64,
      "must have the same length as the mean",
    ));
  }
  if let Some(bad) = variance.iter().copied().find(|v| !(*v >= 0.0)) {
    return Err(KalmanError::invalid("variance", bad, "must be >= 0"));
  }

  let std_normal = Normal::new(0.0, 1.0)
    .map_err(|_| KalmanError::invalid("alpha", alpha, "standard normal unavailable"))?;
  let z = std_normal.inverse_cdf(1.0 - alpha / 2.0);

  let half_width = variance.mapv(|v| z * v.sqrt());
  Ok(Band {
    lower: &mean - &half_width,
    upper: &mean + &half_width,
  })
}

/// Calibrate-then-forecast driver.
#[derive(Clone, Debug)]
pub struct ForecastPipeline<M = NelderMeadMinimizer> {
  pub horizon: usize,
  pub alpha: f64,
  pub calibrator: Calibrator<M>,
}

impl Default for ForecastPipeline<NelderMeadMinimizer> {
  fn default() -> Self {
    Self::new(ForecastConfig::default())
  }
}

impl ForecastPipeline<NelderMeadMinimizer> {
  pub fn new(config: ForecastConfig) -> Self {
    Self {
      horizon: config.horizon,
      alpha: config.alpha,
      calibrator: Calibrator::new(config.calibration),
    }
  }
}

impl<M: Minimizer> ForecastPipeline<M> {
  pub fn with_calibrator(config: ForecastConfig, calibrator: Calibrator<M>) -> Self {
    Self {
      horizon: config.horizon,
      alpha: config.alpha,
      calibrator,
    }
  }

  /// Calibrates on `y`, refits with the calibrated hyperparameters and
  /// forecasts `n` steps ahead.
  pub fn forecast(&self, y: &[f64], n: usize) -> Result<ForecastResult, KalmanError> {
    let calibration = self.calibrator.calibrate(y)?;
    let filter = &self.calibrator.config.filter;
    let model = calibration.hyper.to_model(filter)?;
    let trace = gp::run(y, &calibration.hyper, filter, n)?;

    Ok(ForecastResult {
      trace,
      hyper: calibration.hyper,
      model,
      log_likelihood: calibration.log_likelihood,
      converged: calibration.converged,
    })
  }

  /// [`Self::forecast`] with the configured horizon.
  pub fn run(&self, y: &[f64]) -> Result<ForecastResult, KalmanError> {
    self.forecast(y, self.horizon)
  }
}

impl<M: Minimizer + Sync> ForecastPipeline<M> {
  /// Forecasts independent signals in parallel. One result per signal, in
  /// input order; a failing signal does not affect the others.
  pub fn forecast_many<S: AsRef<[f64]> + Sync>(
    &self,
    signals: &[S],
  ) -> Vec<Result<ForecastResult, KalmanError>> {
    let results: Vec<_> = signals
      .par_iter()
      .enumerate()
      .map(|(idx, y)| {
        let res = self.run(y.as_ref());
        if let Err(err) = &res {
          warn!(series = idx, error = %err, "forecast failed");
        }
        res
      })
      .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(series = results.len(), failed, "batch forecast finished");
    results
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal as NormalDistr;

  use super::*;

  fn ar1(n: usize, phi: f64, sd: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = NormalDistr::new(0.0, sd).unwrap();
    let mut x = 0.0;
    (0..n)
      .map(|_| {
        x = phi * x + noise.sample(&mut rng);
        x + noise.sample(&mut rng)
      })
      .collect()
  }

  #[test]
  fn band_uses_normal_quantile() {
    let mean = array![0.0, 1.0];
    let var = array![1.0, 4.0];
    let band = confidence_band(mean.view(), var.view(), 0.05).unwrap();

    assert_abs_diff_eq!(band.upper[0], 1.959964, epsilon = 1e-5);
    assert_abs_diff_eq!(band.lower[0], -1.959964, epsilon = 1e-5);
    assert_abs_diff_eq!(band.upper[1], 1.0 + 2.0 * 1.959964, epsilon = 1e-5);

    let wide = confidence_band(mean.view(), var.view(), 0.01).unwrap();
    assert_abs_diff_eq!(wide.upper[0], 2.575829, epsilon = 1e-5);
  }

  #[test]
  fn zero_variance_band_collapses() {
    let mean = array![0.5];
    let band = confidence_band(mean.view(), array![0.0].view(), 0.01).unwrap();
    assert_eq!(band.lower, mean);
    assert_eq!(band.upper, mean);
  }

  #[test]
  fn band_rejects_bad_inputs() {
    let mean = array![0.0];
    for alpha in [0.0, 1.0, -0.1, f64::NAN] {
      assert!(confidence_band(mean.view(), array![1.0].view(), alpha).is_err());
    }
    assert!(confidence_band(mean.view(), array![-1.0].view(), 0.05).is_err());
    assert!(confidence_band(mean.view(), array![1.0, 1.0].view(), 0.05).is_err());
  }

  #[test]
  fn forecast_produces_full_trace_and_bands() {
    let y = ar1(150, 0.9, 0.2, 4);
    let pipeline = ForecastPipeline::default();
    let out = pipeline.run(&y).unwrap();

    assert_eq!(out.trace.len(), 150);
    assert_eq!(out.trace.horizon(), 2);
    assert!(out.hyper.is_valid());
    assert!(out.log_likelihood.is_finite());

    let band = out.predictive_band(pipeline.alpha).unwrap();
    for t in 0..out.trace.predictive_mean.len() {
      assert!(band.lower[t] <= out.trace.predictive_mean[t]);
      assert!(band.upper[t] >= out.trace.predictive_mean[t]);
    }
    let filtered = out.filtered_band(0.05).unwrap();
    assert_eq!(filtered.lower.len(), 150);
  }

  #[test]
  fn forecast_is_horizon_stable() {
    let y = ar1(80, 0.8, 0.3, 8);
    let pipeline = ForecastPipeline::default();

    let two = pipeline.forecast(&y, 2).unwrap();
    let mut one = pipeline.forecast(&y, 1).unwrap();
    assert_eq!(one.hyper, two.hyper);
    assert_eq!(one.trace.predictive_mean[80], two.trace.predictive_mean[80]);

    one.trace.extend_forecast(&one.model, 1).unwrap();
    assert_eq!(one.trace, two.trace);
  }

  #[test]
  fn forecast_variance_widens_with_horizon() {
    let y = ar1(100, 0.95, 0.2, 12);
    let out = ForecastPipeline::default().forecast(&y, 5).unwrap();
    let v = out.trace.forecast_variance();
    for h in 1..v.len() {
      assert!(v[h] >= v[h - 1] - 1e-12);
    }
  }

  #[test]
  fn one_bad_series_does_not_abort_the_batch() {
    let good_a = ar1(60, 0.7, 0.3, 1);
    let good_b = ar1(60, 0.5, 0.4, 2);
    let bad = vec![0.1, f64::NAN, 0.2];
    let short = vec![0.4];

    let out = ForecastPipeline::default().forecast_many(&[good_a, bad, good_b, short]);
    assert_eq!(out.len(), 4);
    assert!(out[0].is_ok());
    assert!(matches!(out[1], Err(KalmanError::InvalidParameter { .. })));
    assert!(out[2].is_ok());
    assert!(out[3].is_err());
  }

  #[test]
  fn batch_matches_sequential_runs() {
    let signals: Vec<Vec<f64>> = (0..4).map(|s| ar1(50, 0.6, 0.25, 20 + s)).collect();
    let pipeline = ForecastPipeline::default();
    let batch = pipeline.forecast_many(&signals);
    for (y, res) in signals.iter().zip(batch) {
      assert_eq!(res.unwrap(), pipeline.run(y).unwrap());
    }
  }
}
