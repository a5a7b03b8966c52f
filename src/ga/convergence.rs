//! [`MetricConverger`]: the expansion/density/depth composite convergence
//! metric, ported from `MOGAConverger::GetMetricValue` with its
//! stall-generation counter generalized to a runtime-configured tolerance
//! and patience (see DESIGN.md).

use crate::ga::operator::Converger;
use crate::ga::population::Population;

/// Per-objective `[min, max]` extremes, the Rust analogue of
/// `eddy::utilities::DoubleExtremes`.
#[derive(Debug, Clone, PartialEq)]
struct Extremes(Vec<(f64, f64)>);

impl Extremes {
  fn from_objectives<'a>(rows: impl Iterator<Item = &'a [f64]>, num_objectives: usize) -> Self {
    let mut mins = vec![f64::INFINITY; num_objectives];
    let mut maxs = vec![f64::NEG_INFINITY; num_objectives];
    for row in rows {
      for (i, &v) in row.iter().enumerate() {
        mins[i] = mins[i].min(v);
        maxs[i] = maxs[i].max(v);
      }
    }
    Extremes(mins.into_iter().zip(maxs).collect())
  }

  fn range(&self, i: usize) -> f64 {
    self.0[i].1 - self.0[i].0
  }

  fn len(&self) -> usize {
    self.0.len()
  }

  /// `ComputeVolume`: product of nonzero per-dimension ranges.
  fn volume(&self) -> f64 {
    self.0.iter().map(|&(lo, hi)| hi - lo).filter(|&r| r != 0.0).product()
  }
}

fn dominates(a: &[f64], b: &[f64]) -> bool {
  a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
}

/// The three convergence sub-metrics computed each generation (all zero on
/// the first generation, since there is no previous state to compare
/// against).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConvergenceMetrics {
  /// Maximum fractional change in range along any objective dimension of
  /// the best-fitness (Pareto) set, `GetMaxRangeChange`.
  pub expansion: f64,
  /// Fractional change in point density (`count / volume`) of the full
  /// population, `GetDensityChange`.
  pub density: f64,
  /// Fraction of the previous best-fitness set now dominated by the
  /// current one, `GetFractionDominated`.
  pub depth: f64,
}

impl ConvergenceMetrics {
  /// Sum of the three sub-metrics' absolute values, the composite value
  /// `GetMetricValue` returns and compares against `tolerance`.
  pub fn composite(&self) -> f64 {
    self.expansion.abs() + self.density.abs() + self.depth.abs()
  }
}

/// Tracks the expansion/density/depth metric generation-over-generation and
/// declares convergence once the composite value stays below `tolerance`
/// for `stall_generations` consecutive generations.
#[derive(Debug, Clone)]
pub struct MetricConverger {
  tolerance: f64,
  stall_generations: usize,
  num_objectives: usize,
  prev_pareto_extremes: Option<Extremes>,
  prev_pop_extremes: Option<Extremes>,
  prev_pareto_objectives: Vec<Vec<f64>>,
  prev_pop_size: usize,
  stall_count: usize,
  generation: usize,
}

impl MetricConverger {
  /// Builds a converger requiring the composite metric to stay under
  /// `tolerance` for `stall_generations` consecutive generations before
  /// declaring convergence.
  pub fn new(tolerance: f64, stall_generations: usize, num_objectives: usize) -> Self {
    MetricConverger {
      tolerance,
      stall_generations,
      num_objectives,
      prev_pareto_extremes: None,
      prev_pop_extremes: None,
      prev_pareto_objectives: Vec::new(),
      prev_pop_size: 0,
      stall_count: 0,
      generation: 0,
    }
  }

  /// Computes this generation's metric without mutating tracked state or
  /// the stall counter; useful for reporting.
  pub fn compute(&self, population: &Population, fitness: &[f64]) -> ConvergenceMetrics {
    let best_indices = population.best_fitness_indices();
    if best_indices.is_empty() || self.generation == 0 {
      return ConvergenceMetrics::default();
    }
    let individuals = population.individuals();
    let pareto_objectives: Vec<&[f64]> = best_indices.iter().map(|&i| individuals[i].objectives()).collect();
    let new_pareto_ext = Extremes::from_objectives(pareto_objectives.iter().copied(), self.num_objectives);
    let new_pop_ext =
      Extremes::from_objectives(individuals.iter().map(|i| i.objectives()), self.num_objectives);

    let (Some(prev_pareto), Some(prev_pop)) = (&self.prev_pareto_extremes, &self.prev_pop_extremes) else {
      return ConvergenceMetrics::default();
    };

    let expansion = max_range_change(prev_pareto, &new_pareto_ext);
    let density = density_change(self.prev_pop_size, prev_pop.volume(), individuals.len(), new_pop_ext.volume());
    let depth = fraction_dominated(&self.prev_pareto_objectives, &pareto_objectives);

    let _ = fitness;
    ConvergenceMetrics { expansion, density, depth }
  }

  /// Advances the tracker by one generation: computes the metric against
  /// the previously recorded state, records the new state, updates the
  /// stall counter, and returns whether convergence has now been reached.
  pub fn advance(&mut self, population: &Population, fitness: &[f64]) -> bool {
    self.generation += 1;
    let metrics = self.compute(population, fitness);

    let best_indices = population.best_fitness_indices();
    let individuals = population.individuals();
    if !best_indices.is_empty() {
      let pareto_objectives: Vec<&[f64]> = best_indices.iter().map(|&i| individuals[i].objectives()).collect();
      self.prev_pareto_extremes =
        Some(Extremes::from_objectives(pareto_objectives.iter().copied(), self.num_objectives));
      self.prev_pop_extremes =
        Some(Extremes::from_objectives(individuals.iter().map(|i| i.objectives()), self.num_objectives));
      self.prev_pareto_objectives = pareto_objectives.iter().map(|o| o.to_vec()).collect();
      self.prev_pop_size = individuals.len();
    }

    if self.generation > 1 && metrics.composite() < self.tolerance {
      self.stall_count += 1;
    } else {
      self.stall_count = 0;
    }

    self.stall_count >= self.stall_generations
  }
}

/// `MOGAConverger::GetMaxRangeChange`: the signed fractional range change
/// with the largest absolute value, across objective dimensions.
fn max_range_change(prev: &Extremes, curr: &Extremes) -> f64 {
  let mut max_chng = 0.0f64;
  for i in 0..prev.len() {
    let overall_range = prev.range(i);
    let curr_chng =
      if overall_range == 0.0 { curr.range(i) } else { (curr.range(i) - overall_range) / overall_range };
    if curr_chng.abs() > max_chng.abs() {
      max_chng = curr_chng;
    }
  }
  max_chng
}

/// `MOGAConverger::GetDensityChange`: fractional change in `count/volume`.
fn density_change(prev_count: usize, prev_volume: f64, curr_count: usize, curr_volume: f64) -> f64 {
  if prev_volume == 0.0 || prev_count == 0 {
    return 0.0;
  }
  let old_den = prev_count as f64 / prev_volume;
  let new_den = curr_count as f64 / curr_volume;
  if old_den == 0.0 {
    return 0.0;
  }
  (new_den - old_den) / old_den
}

/// `MOGAConverger::GetFractionDominated`: the fraction of `prev`'s members
/// now dominated by at least one member of `curr`.
fn fraction_dominated(prev: &[Vec<f64>], curr: &[&[f64]]) -> f64 {
  if prev.is_empty() {
    return 0.0;
  }
  let num_dominated = prev.iter().filter(|p| curr.iter().any(|c| dominates(c, p))).count();
  num_dominated as f64 / prev.len() as f64
}

impl Converger for MetricConverger {
  fn is_converged(&mut self, population: &Population, fitness: &[f64]) -> bool {
    self.advance(population, fitness)
  }
}
