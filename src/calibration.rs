//! # Hyperparameter Calibration
//!
//! $$
//! (\hat\gamma,\hat\sigma_w^2)=\arg\max_{\gamma,\sigma_w^2}\ \log p\bigl(y_{1:T}\mid\gamma,\sigma_w^2\bigr)
//! $$
//!
//! Type-II maximum likelihood for the GP-equivalent filter. The search is
//! unconstrained; points outside `γ > 0, σ_w² > 0` or with a degenerate
//! likelihood get a large finite cost so the minimizer is pushed back.
pub mod minimizer;

use std::iter;

use tracing::debug;
use tracing::info;
use tracing::warn;

use self::minimizer::Minimizer;
use self::minimizer::NelderMeadMinimizer;
use self::minimizer::Objective;
use crate::error::KalmanError;
use crate::filter::gp;
use crate::filter::gp::Hyperparameters;
use crate::filter::kalman::validate_signal;
use crate::filter::likelihood::log_likelihood;
use crate::filter::FilterConfig;

/// Cost assigned to invalid or degenerate parameter regions.
///
/// Kept well below `f64::MAX` so simplex statistics over several penalized
/// vertices stay finite.
pub const INVALID_COST: f64 = 1e300;

/// Calibration settings.
#[derive(Clone, Debug)]
pub struct CalibrationConfig {
  /// First starting point of the search.
  pub start: Hyperparameters,
  /// Further starting points, tried in order when a run is rejected.
  pub restarts: Vec<Hyperparameters>,
  /// Prior used inside every likelihood evaluation.
  pub filter: FilterConfig,
  /// Reject runs that hit the iteration cap instead of flagging them.
  pub require_convergence: bool,
}

impl Default for CalibrationConfig {
  fn default() -> Self {
    Self {
      start: Hyperparameters::default(),
      restarts: Vec::new(),
      filter: FilterConfig::default(),
      require_convergence: false,
    }
  }
}

/// Accepted calibration outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
  pub hyper: Hyperparameters,
  /// Marginal log-likelihood at `hyper`.
  pub log_likelihood: f64,
  pub iterations: u64,
  /// Whether the accepted run met the minimizer's convergence criterion.
  pub converged: bool,
  /// Number of starting points tried, including the accepted one.
  pub attempts: usize,
  pub termination: String,
}

/// Negative marginal log-likelihood over `(γ, σ_w²)`.
pub struct NegLogLikelihood<'a> {
  y: &'a [f64],
  filter: FilterConfig,
}

impl<'a> NegLogLikelihood<'a> {
  pub fn new(y: &'a [f64], filter: FilterConfig) -> Self {
    Self { y, filter }
  }

  /// Marginal log-likelihood at `hyper`, propagating every failure.
  pub fn log_likelihood(&self, hyper: &Hyperparameters) -> Result<f64, KalmanError> {
    let trace = gp::run(self.y, hyper, &self.filter, 0)?;
    log_likelihood(
      self.y,
      trace.one_step_mean(),
      trace.one_step_variance(),
      hyper.obs_variance,
      self.filter.prior_mean,
      self.filter.prior_variance,
    )
  }
}

impl Objective for NegLogLikelihood<'_> {
  fn value(&self, x: &[f64]) -> f64 {
    let ll = Hyperparameters::try_from(x).and_then(|hyper| self.log_likelihood(&hyper));
    match ll {
      Ok(ll) if ll.is_finite() => -ll,
      _ => INVALID_COST,
    }
  }
}

/// Marginal-likelihood calibrator with a pluggable minimizer.
#[derive(Clone, Debug, Default)]
pub struct Calibrator<M = NelderMeadMinimizer> {
  pub config: CalibrationConfig,
  pub minimizer: M,
}

impl Calibrator<NelderMeadMinimizer> {
  pub fn new(config: CalibrationConfig) -> Self {
    Self {
      config,
      minimizer: NelderMeadMinimizer::default(),
    }
  }
}

impl<M: Minimizer> Calibrator<M> {
  pub fn with_minimizer(config: CalibrationConfig, minimizer: M) -> Self {
    Self { config, minimizer }
  }

  /// Maximizes the marginal likelihood of `y`.
  ///
  /// Runs from `config.start`, then from each of `config.restarts` while the
  /// previous run is rejected. A run is rejected when its optimum is outside
  /// `γ > 0, σ_w² > 0`, its likelihood cannot be evaluated, or (with
  /// `require_convergence`) it stopped at the iteration cap.
  pub fn calibrate(&self, y: &[f64]) -> Result<CalibrationResult, KalmanError> {
    validate_signal(y)?;
    if y.len() < 2 {
      return Err(KalmanError::invalid(
        "signal",
        y.len() as f64,
        "calibration needs at least two observations",
      ));
    }

    let objective = NegLogLikelihood::new(y, self.config.filter);
    let starts = iter::once(self.config.start).chain(self.config.restarts.iter().copied());

    let mut best_effort: Option<(Hyperparameters, f64)> = None;
    let mut reason = String::from("no starting point produced an acceptable optimum");

    for (attempt, start) in starts.enumerate() {
      debug!(
        attempt,
        gamma = start.gamma,
        obs_variance = start.obs_variance,
        "calibration start"
      );

      let report = match self.minimizer.minimize(&objective, &Vec::from(start)) {
        Ok(report) => report,
        Err(err) => {
          warn!(attempt, error = %err, "minimizer failed");
          reason = format!("minimizer failed: {err}");
          continue;
        }
      };

      let hyper = match Hyperparameters::try_from(report.best_param.as_slice()) {
        Ok(hyper) => hyper,
        Err(err) => {
          warn!(attempt, error = %err, "minimizer returned a malformed optimum");
          reason = err.to_string();
          continue;
        }
      };
      let ll = objective.log_likelihood(&hyper).unwrap_or(f64::NEG_INFINITY);
      if best_effort.map_or(true, |(_, best_ll)| ll > best_ll) {
        best_effort = Some((hyper, ll));
      }

      if !hyper.is_valid() || !ll.is_finite() {
        warn!(
          attempt,
          gamma = hyper.gamma,
          obs_variance = hyper.obs_variance,
          "optimum outside the valid region, rejected"
        );
        reason = format!(
          "optimum gamma={}, obs_variance={} is outside the valid region",
          hyper.gamma, hyper.obs_variance
        );
        continue;
      }

      if self.config.require_convergence && !report.converged {
        warn!(
          attempt,
          termination = %report.termination,
          "minimizer did not converge, rejected"
        );
        reason = format!("minimizer did not converge: {}", report.termination);
        continue;
      }

      info!(
        gamma = hyper.gamma,
        obs_variance = hyper.obs_variance,
        log_likelihood = ll,
        iterations = report.iterations,
        converged = report.converged,
        "calibration finished"
      );

      return Ok(CalibrationResult {
        hyper,
        log_likelihood: ll,
        iterations: report.iterations,
        converged: report.converged,
        attempts: attempt + 1,
        termination: report.termination,
      });
    }

    let (best, log_likelihood) =
      best_effort.unwrap_or((self.config.start, f64::NEG_INFINITY));
    Err(KalmanError::CalibrationFailed {
      best,
      log_likelihood,
      reason,
    })
  }
}

/// Calibrates `y` with the default Nelder-Mead minimizer.
pub fn calibrate(y: &[f64], config: &CalibrationConfig) -> Result<CalibrationResult, KalmanError> {
  Calibrator::new(config.clone()).calibrate(y)
}
