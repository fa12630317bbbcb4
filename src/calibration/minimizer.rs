//! # Minimizers
//!
//! $$
//! \hat x=\arg\min_{x\in\mathbb R^d} f(x)
//! $$
//!
//! Local minimizers behind a small trait, backed by `argmin`.
use anyhow::anyhow;
use anyhow::Result;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;

/// Scalar objective over `ℝ^d`.
pub trait Objective {
  fn value(&self, x: &[f64]) -> f64;
}

impl<F: Fn(&[f64]) -> f64> Objective for F {
  fn value(&self, x: &[f64]) -> f64 {
    self(x)
  }
}

/// Outcome of a single local minimization.
#[derive(Clone, Debug, PartialEq)]
pub struct MinimizerReport {
  pub best_param: Vec<f64>,
  pub best_cost: f64,
  pub iterations: u64,
  /// `true` when the solver met its own convergence criterion.
  pub converged: bool,
  pub termination: String,
}

/// Any local minimizer that starts from a point and reports its best point.
pub trait Minimizer {
  fn minimize<O: Objective>(&self, objective: &O, start: &[f64]) -> Result<MinimizerReport>;
}

struct ArgminProblem<'a, O> {
  objective: &'a O,
  fd_step: f64,
}

impl<O: Objective> CostFunction for ArgminProblem<'_, O> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.objective.value(x))
  }
}

impl<O: Objective> Gradient for ArgminProblem<'_, O> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
      let h = self.fd_step * x[i].abs().max(1.0);
      let mut x_plus = x.clone();
      let mut x_minus = x.clone();
      x_plus[i] += h;
      x_minus[i] -= h;
      grad[i] = (self.cost(&x_plus)? - self.cost(&x_minus)?) / (2.0 * h);
    }
    Ok(grad)
  }
}

fn report<S: State<Param = Vec<f64>, Float = f64>>(state: &S) -> Result<MinimizerReport> {
  let best_param = state
    .get_best_param()
    .cloned()
    .ok_or_else(|| anyhow!("solver finished without a best parameter"))?;
  let status = state.get_termination_status();
  let converged = matches!(
    status,
    TerminationStatus::Terminated(TerminationReason::SolverConverged)
      | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
  );

  Ok(MinimizerReport {
    best_param,
    best_cost: state.get_best_cost(),
    iterations: state.get_iter(),
    converged,
    termination: status.to_string(),
  })
}

/// Derivative-free Nelder-Mead simplex search.
#[derive(Clone, Debug)]
pub struct NelderMeadMinimizer {
  pub max_iters: u64,
  /// Stop once the standard deviation of the simplex costs drops below this.
  pub sd_tolerance: f64,
  /// Relative offset of the initial simplex vertices from the start point.
  pub initial_step: f64,
}

impl Default for NelderMeadMinimizer {
  fn default() -> Self {
    Self {
      max_iters: 1000,
      sd_tolerance: 1e-10,
      initial_step: 0.5,
    }
  }
}

impl NelderMeadMinimizer {
  fn simplex(&self, start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
      let mut vertex = start.to_vec();
      vertex[i] = if vertex[i] != 0.0 {
        vertex[i] * (1.0 + self.initial_step)
      } else {
        self.initial_step
      };
      simplex.push(vertex);
    }
    simplex
  }
}

impl Minimizer for NelderMeadMinimizer {
  fn minimize<O: Objective>(&self, objective: &O, start: &[f64]) -> Result<MinimizerReport> {
    if start.is_empty() {
      return Err(anyhow!("start point must not be empty"));
    }

    let problem = ArgminProblem {
      objective,
      fd_step: 0.0,
    };
    let solver = NelderMead::new(self.simplex(start)).with_sd_tolerance(self.sd_tolerance)?;
    let res = Executor::new(problem, solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run()?;

    report(res.state())
  }
}

/// L-BFGS with central-difference gradients and a More-Thuente line search.
#[derive(Clone, Debug)]
pub struct LbfgsMinimizer {
  pub max_iters: u64,
  /// History length of the inverse Hessian approximation.
  pub memory: usize,
  pub tol_grad: f64,
  pub tol_cost: f64,
  /// Relative step used for the finite-difference gradient.
  pub fd_step: f64,
}

impl Default for LbfgsMinimizer {
  fn default() -> Self {
    Self {
      max_iters: 200,
      memory: 7,
      tol_grad: 1e-6,
      tol_cost: 1e-12,
      fd_step: 1e-6,
    }
  }
}

impl Minimizer for LbfgsMinimizer {
  fn minimize<O: Objective>(&self, objective: &O, start: &[f64]) -> Result<MinimizerReport> {
    if start.is_empty() {
      return Err(anyhow!("start point must not be empty"));
    }

    let problem = ArgminProblem {
      objective,
      fd_step: self.fd_step,
    };
    let linesearch = MoreThuenteLineSearch::new().with_c(1e-4, 0.9)?;
    let solver = LBFGS::new(linesearch, self.memory)
      .with_tolerance_grad(self.tol_grad)?
      .with_tolerance_cost(self.tol_cost)?;
    let res = Executor::new(problem, solver)
      .configure(|state| state.param(start.to_vec()).max_iters(self.max_iters))
      .run()?;

    report(res.state())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn bowl(x: &[f64]) -> f64 {
    (x[0] - 2.0).powi(2) + 3.0 * (x[1] + 1.0).powi(2)
  }

  #[test]
  fn nelder_mead_finds_quadratic_minimum() {
    let out = NelderMeadMinimizer::default()
      .minimize(&bowl, &[0.5, 0.5])
      .unwrap();
    assert!(out.converged, "{}", out.termination);
    assert_abs_diff_eq!(out.best_param[0], 2.0, epsilon = 1e-3);
    assert_abs_diff_eq!(out.best_param[1], -1.0, epsilon = 1e-3);
    assert!(out.best_cost < 1e-6);
  }

  #[test]
  fn lbfgs_finds_quadratic_minimum() {
    let out = LbfgsMinimizer::default().minimize(&bowl, &[0.5, 0.5]).unwrap();
    assert_abs_diff_eq!(out.best_param[0], 2.0, epsilon = 1e-3);
    assert_abs_diff_eq!(out.best_param[1], -1.0, epsilon = 1e-3);
  }

  #[test]
  fn closures_are_objectives() {
    let shift = 4.0;
    let f = move |x: &[f64]| (x[0] - shift).powi(2);
    let out = NelderMeadMinimizer::default().minimize(&f, &[1.0]).unwrap();
    assert_abs_diff_eq!(out.best_param[0], shift, epsilon = 1e-3);
  }

  #[test]
  fn iteration_cap_is_reported_not_fatal() {
    let nm = NelderMeadMinimizer {
      max_iters: 2,
      ..NelderMeadMinimizer::default()
    };
    let out = nm.minimize(&bowl, &[10.0, 10.0]).unwrap();
    assert!(!out.converged);
    assert!(out.iterations <= 2);
  }

  #[test]
  fn simplex_offsets_zero_coordinates() {
    let nm = NelderMeadMinimizer::default();
    let s = nm.simplex(&[5.0, 0.0]);
    assert_eq!(s, vec![vec![5.0, 0.0], vec![7.5, 0.0], vec![5.0, 0.5]]);
  }

  #[test]
  fn solver_defaults() {
    let nm = NelderMeadMinimizer::default();
    assert_eq!((nm.max_iters, nm.sd_tolerance, nm.initial_step), (1000, 1e-10, 0.5));
    let lbfgs = LbfgsMinimizer::default();
    assert_eq!((lbfgs.max_iters, lbfgs.memory), (200, 7));
    assert_eq!((lbfgs.tol_grad, lbfgs.tol_cost, lbfgs.fd_step), (1e-6, 1e-12, 1e-6));
  }

  #[test]
  fn empty_start_is_an_error() {
    assert!(NelderMeadMinimizer::default().minimize(&bowl, &[]).is_err());
  }
}
