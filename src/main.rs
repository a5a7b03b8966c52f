//! `dakota`: the thin CLI binary wiring a [`dakota_core::config::ProblemDescription`]
//! to a [`dakota_core::model::Model`] and driving the configured method
//! (currently JEGA) to completion, per spec §6/§7.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use dakota_core::cache::{CacheLimits, EvaluationCache};
use dakota_core::config::{MethodConfig, ProblemDescription};
use dakota_core::ga::convergence::MetricConverger;
use dakota_core::ga::driver::{Driver, OperatorSet};
use dakota_core::ga::niching::DistanceNicher;
use dakota_core::ga::operator::{ModelEvaluator, ParetoRankAssessor};
use dakota_core::ga::population::{Individual, Population};
use dakota_core::interface::ClosureInterface;
use dakota_core::model::Model;
use dakota_core::response::{ActiveSet, ComponentKind, Response};
use dakota_core::restart::{FlushPolicy, RestartLog};
use dakota_core::variables::VariableSpace;

/// Runs a DAKOTA-style problem description to completion.
#[derive(Debug, Parser)]
#[command(name = "dakota", about = "Evaluation and iterator coordination engine")]
struct Cli {
  /// Path to the problem description (TOML).
  #[arg(short = 'i', long = "input")]
  input: PathBuf,
  /// Path to a restart log to read and seed the cache from.
  #[arg(short = 'r', long = "read-restart")]
  read_restart: Option<PathBuf>,
  /// Path to a restart log to append completed evaluations to.
  #[arg(short = 'w', long = "write-restart")]
  write_restart: Option<PathBuf>,
  /// Stop after this many new (non-duplicate) evaluations.
  #[arg(short = 's', long = "stop-after")]
  stop_after: Option<usize>,
  /// Path to write the final result block to, in addition to stdout.
  #[arg(short = 'o', long = "output")]
  output: Option<PathBuf>,
}

fn main() -> ExitCode {
  let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();

  let cli = Cli::parse();
  match run(&cli) {
    Ok(()) => ExitCode::from(0),
    Err(RunError::Input(e)) => {
      eprintln!("input error: {e}");
      ExitCode::from(1)
    }
    Err(RunError::Runtime(e)) => {
      eprintln!("runtime error: {e}");
      ExitCode::from(2)
    }
    Err(RunError::BudgetExceeded) => {
      eprintln!("evaluation budget exceeded");
      ExitCode::from(3)
    }
    Err(RunError::Aborted) => {
      eprintln!("aborted");
      ExitCode::from(4)
    }
  }
}

enum RunError {
  Input(anyhow::Error),
  Runtime(anyhow::Error),
  BudgetExceeded,
  #[allow(dead_code)]
  Aborted,
}

fn run(cli: &Cli) -> Result<(), RunError> {
  let description = ProblemDescription::from_toml_file(&cli.input)
    .with_context(|| format!("failed to load problem description from {}", cli.input.display()))
    .map_err(RunError::Input)?;
  let template = description.build_variable_space().map_err(|e| RunError::Input(e.into()))?;
  let num_objectives = description.responses.num_objectives;
  let seed = description.resolve_seed();

  let cache = Arc::new(EvaluationCache::new(CacheLimits::default()));

  let restart = match &cli.write_restart {
    Some(path) => {
      Some(RestartLog::create(path, FlushPolicy::PerIteration).map_err(|e| RunError::Runtime(e.into()))?)
    }
    None => None,
  };

  if let Some(path) = &cli.read_restart {
    let (_log, pairs) = RestartLog::open_and_replay(path, FlushPolicy::PerIteration)
      .map_err(|e| RunError::Runtime(e.into()))?;
    let count = pairs.len();
    for pair in pairs {
      cache.store(pair);
    }
    tracing::info!(target: "runtime.startup", count, "seeded evaluation cache from restart log");
  }

  let interface = ClosureInterface::new("dakota-simulator", evaluate_toy_problem);

  let model = Arc::new(Model::new(Box::new(interface), cache, restart, None));
  let evaluator = ModelEvaluator::new(model, template, num_objectives);

  let MethodConfig::Jega(jega) = &description.method;

  let bounds: Vec<(f64, f64)> = description
    .variables
    .continuous_design
    .iter()
    .map(|v| (v.lower, v.upper))
    .collect();

  let initializer_bounds = bounds.clone();
  let initializer = move |count: usize, rng: &mut StdRng| -> Vec<Individual> {
    (0..count)
      .map(|_| {
        let values: Vec<f64> = initializer_bounds.iter().map(|&(lo, hi)| rng.gen_range(lo..=hi)).collect();
        Individual::new(values, vec![])
      })
      .collect()
  };

  let mutation_bounds = bounds.clone();
  let mutator = move |population: &mut Population, rng: &mut StdRng| {
    for individual in population.individuals_mut() {
      if rng.gen::<f64>() < 0.1 {
        let vars = individual.variables_mut();
        for (v, &(lo, hi)) in vars.iter_mut().zip(&mutation_bounds) {
          let span = (hi - lo) * 0.05;
          *v = (*v + rng.gen_range(-span..=span)).clamp(lo, hi);
        }
      }
    }
  };

  let crosser = |parents: &[&Individual], rng: &mut StdRng| -> Vec<Individual> {
    if parents.len() < 2 {
      return parents.iter().map(|p| Individual::new(p.variables().to_vec(), vec![p.id()])).collect();
    }
    let a = parents[0];
    let b = parents[1];
    let t: f64 = rng.gen();
    let child: Vec<f64> =
      a.variables().iter().zip(b.variables()).map(|(&x, &y)| t * x + (1.0 - t) * y).collect();
    vec![Individual::new(child, vec![a.id(), b.id()])]
  };

  let selector = |population: &Population,
                   fitness: &[f64],
                   n: usize,
                   rng: &mut StdRng| -> Vec<usize> {
    (0..n)
      .map(|_| {
        let i = rng.gen_range(0..population.len().max(1));
        let j = rng.gen_range(0..population.len().max(1));
        if fitness.get(i).copied().unwrap_or(f64::NEG_INFINITY)
          >= fitness.get(j).copied().unwrap_or(f64::NEG_INFINITY)
        {
          i
        } else {
          j
        }
      })
      .collect()
  };

  let operators = OperatorSet {
    initializer: Box::new(initializer),
    mutator: Box::new(mutator),
    crosser: Box::new(crosser),
    evaluator: Box::new(evaluator),
    fitness_assessor: Box::new(ParetoRankAssessor),
    selector: Box::new(selector),
    niche_pressure: Box::new(DistanceNicher::new(vec![0.05; num_objectives], false)),
    converger: Box::new(MetricConverger::new(jega.convergence_tolerance, jega.stall_generations, num_objectives)),
    post_processor: Box::new(|_pop: &mut Population| {}),
    replacement: jega.replacement,
  };

  let mut driver =
    Driver::new(operators, jega.population_size, jega.max_generations, seed, jega.resolve_elite_count());
  driver.initialize().map_err(|e| RunError::Runtime(e.into()))?;
  println!(
    "iteration {:>4}  best objective {:>12.6}  evals {}",
    0,
    best_objective(&driver),
    driver.population().len()
  );

  loop {
    let converged = driver.iterate_once().map_err(|e| RunError::Runtime(e.into()))?;
    println!(
      "iteration {:>4}  best objective {:>12.6}  evals {}",
      driver.generation(),
      best_objective(&driver),
      driver.population().len()
    );
    if let Some(limit) = cli.stop_after {
      if driver.generation() * jega.population_size >= limit {
        return Err(RunError::BudgetExceeded);
      }
    }
    if converged {
      break;
    }
  }
  driver.finalize().map_err(|e| RunError::Runtime(e.into()))?;

  let summary = format!(
    "result: generations={} population={} best_objective={:.6}",
    driver.generation(),
    driver.population().len(),
    best_objective(&driver)
  );
  println!("{summary}");
  if let Some(path) = &cli.output {
    std::fs::write(path, &summary)
      .with_context(|| format!("failed to write result block to {}", path.display()))
      .map_err(RunError::Runtime)?;
  }

  Ok(())
}

fn best_objective(driver: &Driver) -> f64 {
  driver
    .population()
    .individuals()
    .iter()
    .filter_map(|i| i.objectives().first().copied())
    .fold(f64::INFINITY, f64::min)
}

/// A default toy simulator (one quadratic bowl per objective component,
/// offset by component index so a multi-objective run has distinct
/// optima) used when no external process interface is configured, so
/// `dakota run` is exercisable without a black-box simulator on hand. A
/// real deployment supplies its own `Interface` (e.g.
/// [`dakota_core::interface::ProcessInterface`]) in place of this.
fn evaluate_toy_problem(
  vars: &VariableSpace,
  active_set: &ActiveSet,
) -> dakota_core::error::DakotaResult<Response> {
  let values = vars.continuous_values();
  let num_components = active_set.len();
  let mut response = Response::empty(vec![ComponentKind::Objective; num_components], values.len());
  for (i, request) in active_set.requests().iter().enumerate() {
    let target = i as f64;
    if request.wants_value() {
      let sum_sq: f64 = values.iter().map(|v| (v - target) * (v - target)).sum();
      response.set_value(i, sum_sq);
    }
    if request.wants_gradient() {
      response.set_gradient(i, values.iter().map(|v| 2.0 * (v - target)).collect());
    }
  }
  Ok(response)
}
