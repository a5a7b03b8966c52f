//! [`ReplacementStrategy`]: how the next generation's survivors are chosen
//! from the previous population plus this generation's trial offspring.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::ga::population::Individual;

/// Names one of JEGA's generational replacement policies.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementStrategy {
  /// Keeps `elite_count` of `previous` chosen uniformly at random; the
  /// rest of `previous` is discarded in favor of `trials`.
  Random,
  /// Keeps the best `elite_count` of `previous`, filling the remaining
  /// slots with the best of `trials`.
  Elitist,
  /// Cross-generational elitist (CHC-style): elite-retains the best
  /// `elite_count` of the combined pool, then fills the remaining slots
  /// by uniform sampling without replacement from everyone else.
  Chc,
  /// Exponential-decay: iterates the combined pool in best-first order,
  /// keeping each individual with probability decaying by the carried
  /// rate, until `popsize` survivors are chosen or the pool is exhausted.
  Exponential(f64),
}

impl ReplacementStrategy {
  /// Selects `popsize` survivors for the next generation from `previous`
  /// (the outgoing population) and `trials` (this generation's
  /// offspring), ranked by `fitness` (parallel to `previous` then
  /// `trials` concatenated, in that order).
  ///
  /// `elite_count` is the number of individuals `Random`, `Elitist` and
  /// `Chc` retain or elite-protect before filling the remaining
  /// `popsize - elite_count` slots per their own policy; `Exponential`
  /// ignores it and decays down the full merged ranking toward `popsize`
  /// instead.
  pub fn replace(
    &self,
    previous: Vec<Individual>,
    trials: Vec<Individual>,
    fitness: &[f64],
    popsize: usize,
    elite_count: usize,
    rng: &mut StdRng,
  ) -> Vec<Individual> {
    let previous_len = previous.len();
    let trials_len = trials.len();
    let previous_fitness = &fitness[..previous_len];
    let trials_fitness = &fitness[previous_len..previous_len + trials_len];

    match self {
      ReplacementStrategy::Random => {
        let keep = elite_count.min(previous_len);
        let mut indices: Vec<usize> = (0..previous_len).collect();
        indices.shuffle(rng);
        let keep_set: HashSet<usize> = indices.into_iter().take(keep).collect();
        let mut survivors: Vec<Individual> = previous
          .into_iter()
          .enumerate()
          .filter(|(i, _)| keep_set.contains(i))
          .map(|(_, ind)| ind)
          .collect();
        let fill = popsize.saturating_sub(survivors.len());
        survivors.extend(trials.into_iter().take(fill));
        survivors
      }
      ReplacementStrategy::Elitist => {
        let mut ranked_previous: Vec<(Individual, f64)> =
          previous.into_iter().zip(previous_fitness.iter().copied()).collect();
        ranked_previous.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let keep = elite_count.min(ranked_previous.len());
        let mut survivors: Vec<Individual> =
          ranked_previous.into_iter().take(keep).map(|(ind, _)| ind).collect();

        let mut ranked_trials: Vec<(Individual, f64)> =
          trials.into_iter().zip(trials_fitness.iter().copied()).collect();
        ranked_trials.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let fill = popsize.saturating_sub(survivors.len());
        survivors.extend(ranked_trials.into_iter().take(fill).map(|(ind, _)| ind));
        survivors
      }
      ReplacementStrategy::Chc => {
        let mut combined: Vec<(Individual, f64)> =
          previous.into_iter().chain(trials).zip(fitness.iter().copied()).collect();
        combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let elite = elite_count.min(combined.len());
        let mut remainder = combined.split_off(elite);
        remainder.shuffle(rng);
        let fill = popsize.saturating_sub(elite).min(remainder.len());
        let mut survivors: Vec<Individual> = combined.into_iter().map(|(ind, _)| ind).collect();
        survivors.extend(remainder.into_iter().take(fill).map(|(ind, _)| ind));
        survivors
      }
      ReplacementStrategy::Exponential(rate) => {
        let mut combined: Vec<(Individual, f64)> =
          previous.into_iter().chain(trials).zip(fitness.iter().copied()).collect();
        combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut survivors = Vec::with_capacity(popsize);
        let mut pool = combined;
        while survivors.len() < popsize && !pool.is_empty() {
          let mut picked = None;
          for (rank, _) in pool.iter().enumerate() {
            let survive_prob = (-rate * rank as f64).exp();
            if rng.gen::<f64>() < survive_prob {
              picked = Some(rank);
              break;
            }
          }
          let rank = picked.unwrap_or(0);
          survivors.push(pool.remove(rank).0);
        }
        survivors
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;

  /// An individual carrying `fitness` both as its sole variable value
  /// (so a survivor can be identified after `replace` discards the
  /// external fitness array) and as the value to place in the `fitness`
  /// slice passed to `replace`.
  fn individual_with_fitness(fitness: f64) -> (Individual, f64) {
    (Individual::new(vec![fitness], vec![]), fitness)
  }

  fn values_of(survivors: &[Individual]) -> Vec<f64> {
    survivors.iter().map(|i| i.variables()[0]).collect()
  }

  #[test]
  fn test_elitist_keeps_best_by_fitness() {
    let previous = vec![individual_with_fitness(1.0).0, individual_with_fitness(2.0).0];
    let trials = vec![individual_with_fitness(3.0).0, individual_with_fitness(0.0).0];
    let fitness = vec![1.0, 2.0, 3.0, 0.0];
    let mut rng = StdRng::seed_from_u64(0);
    let survivors = ReplacementStrategy::Elitist.replace(previous, trials, &fitness, 2, 1, &mut rng);
    assert_eq!(survivors.len(), 2);
    let mut values = values_of(&survivors);
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(values, vec![2.0, 3.0]);
  }

  #[test]
  fn test_random_replacement_keeps_requested_count() {
    let previous = vec![individual_with_fitness(1.0).0, individual_with_fitness(2.0).0];
    let trials = vec![individual_with_fitness(3.0).0];
    let fitness = vec![1.0, 2.0, 3.0];
    let mut rng = StdRng::seed_from_u64(42);
    let survivors = ReplacementStrategy::Random.replace(previous, trials, &fitness, 2, 1, &mut rng);
    assert_eq!(survivors.len(), 2);
  }

  #[test]
  fn test_exponential_replacement_keeps_requested_count() {
    let previous = vec![individual_with_fitness(1.0).0, individual_with_fitness(2.0).0];
    let trials = vec![individual_with_fitness(3.0).0, individual_with_fitness(0.5).0];
    let fitness = vec![1.0, 2.0, 3.0, 0.5];
    let mut rng = StdRng::seed_from_u64(7);
    let survivors = ReplacementStrategy::Exponential(0.5).replace(previous, trials, &fitness, 3, 0, &mut rng);
    assert_eq!(survivors.len(), 3);
  }

  #[test]
  fn test_chc_retains_elite_and_can_fill_from_non_elite_previous() {
    let previous = vec![
      individual_with_fitness(10.0).0,
      individual_with_fitness(9.0).0,
      individual_with_fitness(1.0).0,
      individual_with_fitness(1.0).0,
    ];
    let trials = vec![individual_with_fitness(8.0).0, individual_with_fitness(7.0).0];
    let fitness = vec![10.0, 9.0, 1.0, 1.0, 8.0, 7.0];

    // Elitist is fully deterministic here: keep the single best of
    // `previous` (10.0), then the best `popsize - elite_count` (2) of
    // `trials` (8.0, 7.0) — it never dips into the rest of `previous`.
    let mut rng = StdRng::seed_from_u64(1);
    let elitist = ReplacementStrategy::Elitist.replace(previous.clone(), trials.clone(), &fitness, 3, 1, &mut rng);
    let mut elitist_values = values_of(&elitist);
    elitist_values.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(elitist_values, vec![10.0, 8.0, 7.0]);

    // Chc always elite-retains the single overall best (10.0), but its
    // remaining fill is a uniform draw without replacement from
    // *everyone* outside the elite set — so across enough seeds it must
    // sometimes surface a `previous` individual (9.0 or 1.0) that
    // Elitist, with the same inputs, would never keep.
    let saw_non_elitist_fill = (0..64).any(|seed| {
      let mut rng = StdRng::seed_from_u64(seed);
      let survivors = ReplacementStrategy::Chc.replace(previous.clone(), trials.clone(), &fitness, 3, 1, &mut rng);
      let values = values_of(&survivors);
      assert!(values.contains(&10.0), "chc must always retain the single elite");
      assert_eq!(values.len(), 3);
      values.contains(&9.0) || values.contains(&1.0)
    });
    assert!(
      saw_non_elitist_fill,
      "chc's random fill should occasionally keep a non-elite previous individual elitist never would"
    );
  }

  #[test]
  fn test_random_replacement_samples_survivors_from_previous_only() {
    let previous =
      vec![individual_with_fitness(5.0).0, individual_with_fitness(4.0).0, individual_with_fitness(3.0).0];
    let trials = vec![individual_with_fitness(100.0).0, individual_with_fitness(200.0).0];
    let fitness = vec![5.0, 4.0, 3.0, 100.0, 200.0];

    // popsize=4, elite_count=2: two of `previous` survive uniformly at
    // random (fitness plays no role in which two), and both `trials`
    // fill the remaining slots — never a third `previous` individual
    // chosen by fitness, as `Elitist` would.
    for seed in 0..16 {
      let mut rng = StdRng::seed_from_u64(seed);
      let survivors = ReplacementStrategy::Random.replace(previous.clone(), trials.clone(), &fitness, 4, 2, &mut rng);
      let values = values_of(&survivors);
      assert_eq!(values.len(), 4);
      assert!(values.contains(&100.0) && values.contains(&200.0), "both trials must fill the replaced slots");
      let previous_survivor_count = values.iter().filter(|&&v| v == 5.0 || v == 4.0 || v == 3.0).count();
      assert_eq!(
        previous_survivor_count, 2,
        "random keeps exactly elite_count individuals from previous, not from trials"
      );
    }
  }
}
