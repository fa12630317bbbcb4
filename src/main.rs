use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use kalman_gp::prelude::*;
use tracing_subscriber::EnvFilter;

/// Calibrate a GP-equivalent Kalman filter per signal and forecast ahead.
#[derive(Parser, Debug)]
#[command(name = "kalman-gp", version, about)]
struct Cli {
  /// Increase verbosity (-v info, -vv debug, -vvv trace).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Pure-forecast steps past the last observation.
  #[arg(long, default_value_t = 2)]
  horizon: usize,

  /// Two-sided significance level of the confidence bands.
  #[arg(long, default_value_t = 0.01, value_parser = parse_alpha)]
  alpha: f64,

  /// Signal files, one value per line.
  #[arg(required = true)]
  paths: Vec<PathBuf>,
}

fn parse_alpha(s: &str) -> Result<f64, String> {
  let alpha: f64 = s.parse().map_err(|_| format!("not a number: {s:?}"))?;
  if alpha > 0.0 && alpha < 1.0 {
    Ok(alpha)
  } else {
    Err(format!("must lie in (0, 1), got {alpha}"))
  }
}

/// `-v` count to a default filter for this crate; `RUST_LOG` wins when set.
fn init_logging(verbosity: u8) {
  let level = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("kalman_gp={level}")));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// One finite value per line; blank lines are skipped.
fn read_signal(path: &Path) -> Result<Vec<f64>> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  let reader = BufReader::new(file);
  let mut data = Vec::new();

  for (lineno, line) in reader.lines().enumerate() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let value: f64 = line
      .parse()
      .with_context(|| format!("{}:{}: not a number: {line:?}", path.display(), lineno + 1))?;
    data.push(value);
  }

  Ok(data)
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let signals = cli
    .paths
    .iter()
    .map(|p| read_signal(p))
    .collect::<Result<Vec<_>>>()?;

  let config = ForecastConfig {
    horizon: cli.horizon,
    alpha: cli.alpha,
    ..ForecastConfig::default()
  };
  let pipeline = ForecastPipeline::new(config);
  let results = pipeline.forecast_many(&signals);

  for (path, res) in cli.paths.iter().zip(results) {
    println!("\nProcessing {}", path.display());
    let out = match res {
      Ok(out) => out,
      Err(err) => {
        println!("  failed: {err}");
        continue;
      }
    };

    println!("  gamma: {}", out.hyper.gamma);
    println!("  obs variance: {}", out.hyper.obs_variance);
    println!("  phi: {}", out.model.phi);
    println!("  log-likelihood: {}", out.log_likelihood);
    println!("  converged: {}", out.converged);

    let band = match out.predictive_band(cli.alpha) {
      Ok(band) => band,
      Err(err) => {
        println!("  failed: {err}");
        continue;
      }
    };
    let t_len = out.trace.len();
    for (h, (m, v)) in out
      .trace
      .forecast_mean()
      .iter()
      .zip(out.trace.forecast_variance())
      .enumerate()
    {
      println!(
        "  t+{}: mean {m:.6} var {v:.6} band [{:.6}, {:.6}]",
        h + 1,
        band.lower[t_len + h],
        band.upper[t_len + h]
      );
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn parses_flags_in_both_forms() {
    let argv = ["kalman-gp", "-vv", "--alpha=0.05", "--horizon", "3", "a.txt", "b.txt"];
    let cli = Cli::try_parse_from(argv).unwrap();
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.alpha, 0.05);
    assert_eq!(cli.horizon, 3);
    assert_eq!(cli.paths, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
  }

  #[test]
  fn defaults_match_forecast_config() {
    let cli = Cli::try_parse_from(["kalman-gp", "a.txt"]).unwrap();
    let cfg = ForecastConfig::default();
    assert_eq!(cli.verbose, 0);
    assert_eq!(cli.alpha, cfg.alpha);
    assert_eq!(cli.horizon, cfg.horizon);
  }

  #[test]
  fn out_of_range_alpha_is_rejected_up_front() {
    for alpha in ["0", "1", "-0.2", "1.5", "abc"] {
      assert!(
        Cli::try_parse_from(["kalman-gp", "--alpha", alpha, "a.txt"]).is_err(),
        "{alpha}"
      );
    }
  }

  #[test]
  fn missing_paths_and_unknown_flags_are_usage_errors() {
    assert!(Cli::try_parse_from(["kalman-gp"]).is_err());
    assert!(Cli::try_parse_from(["kalman-gp", "-x", "a.txt"]).is_err());
  }

  #[test]
  fn reads_one_value_per_line() {
    let path = std::env::temp_dir().join(format!("kalman-gp-signal-{}.txt", std::process::id()));
    let mut file = File::create(&path).unwrap();
    writeln!(file, "0.5\n\n-1.25\n 3 ").unwrap();
    drop(file);

    let data = read_signal(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(data, vec![0.5, -1.25, 3.0]);
  }
}
