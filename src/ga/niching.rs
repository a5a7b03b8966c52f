//! [`DistanceNicher`] and [`RadialNicher`]: objective-space crowding
//! reduction, ported from `DistanceNichePressureApplicator` and
//! `RadialNichePressureApplicator`. Both sort the best-fitness set by the
//! first objective and break the inner scan as soon as that objective's
//! distance exceeds the cutoff, since the sort guarantees nothing further
//! out can be close enough to matter.

use crate::ga::operator::NichePressureApplicator;
use crate::ga::population::{Individual, Population};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extremes<'a>(&'a [(f64, f64)]);

impl<'a> Extremes<'a> {
  fn range(&self, i: usize) -> f64 {
    self.0[i].1 - self.0[i].0
  }
}

fn objective_extremes(objectives: &[&[f64]], num_objectives: usize) -> Vec<(f64, f64)> {
  let mut mins = vec![f64::INFINITY; num_objectives];
  let mut maxs = vec![f64::NEG_INFINITY; num_objectives];
  for row in objectives {
    for (i, &v) in row.iter().enumerate() {
      mins[i] = mins[i].min(v);
      maxs[i] = maxs[i].max(v);
    }
  }
  mins.into_iter().zip(maxs).collect()
}

/// Whether `candidate` is an extreme design within `extremes`: best
/// (matching the min or the max) on every objective but at most one.
/// This is the glossary's literal definition; no original-source
/// `IsExtremeDesign` implementation was present in the retrieved pack.
fn is_extreme_design(candidate: &[f64], extremes: &[(f64, f64)]) -> bool {
  let non_extreme_count = candidate
    .iter()
    .zip(extremes)
    .filter(|(&v, &(lo, hi))| v != lo && v != hi)
    .count();
  non_extreme_count <= 1
}

fn cutoff_distances(pcts: &[f64], extremes: &[(f64, f64)]) -> Vec<f64> {
  let ext = Extremes(extremes);
  (0..pcts.len()).map(|i| (pcts[i] * ext.range(i)).abs()).collect()
}

fn objective_distance(a: &[f64], b: &[f64], of: usize) -> f64 {
  (a[of] - b[of]).abs()
}

/// Runs the sort-by-objective-0, break-early niche reduction shared by
/// both niching strategies, given a per-objective cutoff distance vector.
/// Returns the indices (into `population`) to keep.
fn apply_sorted_cutoff(
  population: &Population,
  best_indices: &[usize],
  cutoffs: &[f64],
  num_objectives: usize,
) -> Vec<usize> {
  let individuals = population.individuals();
  let mut sorted = best_indices.to_vec();
  sorted.sort_by(|&a, &b| {
    individuals[a].objectives()[0]
      .partial_cmp(&individuals[b].objectives()[0])
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let objectives: Vec<&[f64]> = sorted.iter().map(|&i| individuals[i].objectives()).collect();
  let extremes = objective_extremes(&objectives, num_objectives);

  let mut removed = vec![false; sorted.len()];
  let mut extremes_found = 0usize;

  for curr in 0..sorted.len() {
    if removed[curr] {
      continue;
    }
    let mut next = curr + 1;
    while next < sorted.len() {
      if removed[next] {
        next += 1;
        continue;
      }
      let obj0_dist = objective_distance(objectives[curr], objectives[next], 0);
      if obj0_dist > cutoffs[0] {
        break;
      }
      if extremes_found < num_objectives && is_extreme_design(objectives[next], &extremes) {
        extremes_found += 1;
        next += 1;
        continue;
      }
      let keep = (1..num_objectives).any(|of| objective_distance(objectives[curr], objectives[next], of) > cutoffs[of]);
      if keep {
        next += 1;
        continue;
      }
      removed[next] = true;
      next += 1;
    }
  }

  sorted.into_iter().zip(removed).filter(|(_, r)| !*r).map(|(i, _)| i).collect()
}

/// Applies the retained-index decision from [`apply_sorted_cutoff`] to the
/// population: non-best individuals and kept best individuals stay, culled
/// best individuals are removed (and buffered, if `buffer` is `Some`).
fn cull_and_maybe_buffer(
  population: &mut Population,
  best_indices: &[usize],
  keep: &[usize],
  buffer: Option<&mut Vec<Individual>>,
) {
  let keep_set: std::collections::HashSet<usize> = keep.iter().copied().collect();
  let to_remove: std::collections::HashSet<usize> =
    best_indices.iter().copied().filter(|i| !keep_set.contains(i)).collect();
  if to_remove.is_empty() {
    return;
  }
  let individuals = std::mem::take(population.individuals_mut());
  let mut kept = Vec::with_capacity(individuals.len());
  let mut buffered = Vec::new();
  for (i, ind) in individuals.into_iter().enumerate() {
    if to_remove.contains(&i) {
      buffered.push(ind);
    } else {
      kept.push(ind);
    }
  }
  if let Some(buf) = buffer {
    buf.extend(buffered);
  }
  population.replace_all(kept);
}

/// Niches by per-objective Euclidean-style (actually per-axis, see
/// `ComputeObjectiveDistance`) distance: two best-fitness designs are too
/// close when every objective's absolute difference is below that
/// objective's cutoff (`pct * pareto range`).
#[derive(Debug, Clone)]
pub struct DistanceNicher {
  pcts: Vec<f64>,
  cache_designs: bool,
  buffer: Vec<Individual>,
}

impl DistanceNicher {
  /// Builds a nicher with one distance percentage per objective. When
  /// `cache_designs` is true, culled individuals are buffered rather than
  /// discarded and can be reclaimed via [`DistanceNicher::take_buffer`].
  pub fn new(pcts: Vec<f64>, cache_designs: bool) -> Self {
    DistanceNicher { pcts, cache_designs, buffer: Vec::new() }
  }

  /// Drains and returns the buffered (culled) individuals, for
  /// re-assimilation before the next selection round.
  pub fn take_buffer(&mut self) -> Vec<Individual> {
    std::mem::take(&mut self.buffer)
  }
}

impl NichePressureApplicator for DistanceNicher {
  fn apply_niche_pressure(
    &mut self,
    population: &mut Population,
    fitness: Vec<f64>,
    _target_size: usize,
  ) -> Vec<f64> {
    let best_indices = population.best_fitness_indices();
    if best_indices.is_empty() {
      return fitness;
    }
    let num_objectives = population.individuals()[best_indices[0]].objectives().len();
    let objectives: Vec<&[f64]> = best_indices.iter().map(|&i| population.individuals()[i].objectives()).collect();
    let extremes = objective_extremes(&objectives, num_objectives);
    let cutoffs = cutoff_distances(&self.pcts, &extremes);
    let keep = apply_sorted_cutoff(population, &best_indices, &cutoffs, num_objectives);

    let removed_count = best_indices.len() - keep.len();
    let buffer_ref = if self.cache_designs { Some(&mut self.buffer) } else { None };
    cull_and_maybe_buffer(population, &best_indices, &keep, buffer_ref);
    population.synchronize();

    if removed_count > 0 {
      // Fitness indices no longer line up 1:1 with the (now shorter)
      // population; callers re-run the assessor after niching rather than
      // reuse this vector, so an empty vector signals "recompute".
      Vec::new()
    } else {
      fitness
    }
  }
}

/// Niches by the combined (normalized, sqrt-sum-of-squares) radial
/// distance across all objectives against a single threshold.
#[derive(Debug, Clone)]
pub struct RadialNicher {
  threshold: f64,
  cache_designs: bool,
  buffer: Vec<Individual>,
}

impl RadialNicher {
  /// Builds a radial nicher with a single normalized-distance threshold.
  pub fn new(threshold: f64, cache_designs: bool) -> Self {
    RadialNicher { threshold, cache_designs, buffer: Vec::new() }
  }

  /// Drains and returns the buffered (culled) individuals.
  pub fn take_buffer(&mut self) -> Vec<Individual> {
    std::mem::take(&mut self.buffer)
  }
}

impl NichePressureApplicator for RadialNicher {
  fn apply_niche_pressure(
    &mut self,
    population: &mut Population,
    fitness: Vec<f64>,
    _target_size: usize,
  ) -> Vec<f64> {
    let best_indices = population.best_fitness_indices();
    if best_indices.is_empty() {
      return fitness;
    }
    let num_objectives = population.individuals()[best_indices[0]].objectives().len();
    let individuals = population.individuals();
    let mut sorted = best_indices.clone();
    sorted.sort_by(|&a, &b| {
      individuals[a].objectives()[0]
        .partial_cmp(&individuals[b].objectives()[0])
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    let objectives: Vec<&[f64]> = sorted.iter().map(|&i| individuals[i].objectives()).collect();
    let extremes = objective_extremes(&objectives, num_objectives);

    let normalized_radial = |a: &[f64], b: &[f64]| -> f64 {
      (0..num_objectives)
        .map(|of| {
          let range = (extremes[of].1 - extremes[of].0).max(f64::EPSILON);
          ((a[of] - b[of]) / range).powi(2)
        })
        .sum::<f64>()
        .sqrt()
    };

    let mut removed = vec![false; sorted.len()];
    let mut extremes_found = 0usize;
    for curr in 0..sorted.len() {
      if removed[curr] {
        continue;
      }
      for next in (curr + 1)..sorted.len() {
        if removed[next] {
          continue;
        }
        if extremes_found < num_objectives && is_extreme_design(objectives[next], &extremes) {
          extremes_found += 1;
          continue;
        }
        if normalized_radial(objectives[curr], objectives[next]) < self.threshold {
          removed[next] = true;
        }
      }
    }

    let keep: Vec<usize> =
      sorted.iter().zip(&removed).filter(|(_, r)| !**r).map(|(&i, _)| i).collect();
    let removed_count = best_indices.len() - keep.len();
    let buffer_ref = if self.cache_designs { Some(&mut self.buffer) } else { None };
    cull_and_maybe_buffer(population, &best_indices, &keep, buffer_ref);
    population.synchronize();

    if removed_count > 0 {
      Vec::new()
    } else {
      fitness
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn individual_with(objectives: Vec<f64>) -> Individual {
    let mut ind = Individual::new(vec![0.0], vec![]);
    ind.set_objectives(objectives);
    ind.set_fitness(0.0);
    ind
  }

  #[test]
  fn test_distance_nicher_removes_exact_count_on_linear_front() {
    // A five-point linear trade-off front (0,4)..(4,0): with a 0.3 cutoff
    // percentage on each objective (range 4 each, cutoff 1.2), the two
    // neighbors adjacent to each kept point fall inside the cutoff and
    // are removed, while both extremes and the middle point survive.
    let mut pop = Population::new(
      (0..5).map(|i| individual_with(vec![i as f64, (4 - i) as f64])).collect(),
    );
    pop.synchronize();
    let mut nicher = DistanceNicher::new(vec![0.3, 0.3], false);
    nicher.apply_niche_pressure(&mut pop, vec![0.0; 5], 5);
    assert_eq!(pop.len(), 3);
    let survivors: Vec<f64> = pop.individuals().iter().map(|i| i.objectives()[0]).collect();
    assert!(survivors.contains(&0.0));
    assert!(survivors.contains(&2.0));
    assert!(survivors.contains(&4.0));
  }

  #[test]
  fn test_distance_nicher_preserves_extreme_designs() {
    let mut pop = Population::new(vec![
      individual_with(vec![0.0, 10.0]),
      individual_with(vec![0.01, 9.99]),
      individual_with(vec![10.0, 0.0]),
    ]);
    pop.synchronize();
    let mut nicher = DistanceNicher::new(vec![1.0, 1.0], false);
    nicher.apply_niche_pressure(&mut pop, vec![0.0; 3], 3);
    let survivors: Vec<f64> = pop.individuals().iter().map(|i| i.objectives()[0]).collect();
    assert!(survivors.contains(&0.0) || survivors.contains(&10.0));
  }

  #[test]
  fn test_distance_nicher_buffers_culled_designs_when_caching() {
    let mut pop = Population::new(
      (0..5).map(|i| individual_with(vec![i as f64, (4 - i) as f64])).collect(),
    );
    pop.synchronize();
    let mut nicher = DistanceNicher::new(vec![0.3, 0.3], true);
    nicher.apply_niche_pressure(&mut pop, vec![0.0; 5], 5);
    assert_eq!(pop.len(), 3);
    assert_eq!(nicher.take_buffer().len(), 2);
  }

  #[test]
  fn test_radial_nicher_removes_crowded_points() {
    let mut pop = Population::new(vec![
      individual_with(vec![0.0, 0.0]),
      individual_with(vec![0.001, 0.001]),
      individual_with(vec![10.0, 10.0]),
    ]);
    pop.synchronize();
    let mut nicher = RadialNicher::new(0.1, false);
    nicher.apply_niche_pressure(&mut pop, vec![0.0; 3], 3);
    assert!(pop.len() < 3);
  }
}
