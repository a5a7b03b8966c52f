//! The JEGA operator set: one single-method trait per operator family
//! (`Initializer`, `Mutator`, `Crosser`, `Evaluator`, `FitnessAssessor`,
//! `Selector`, `NichePressureApplicator`, `Converger`, `PostProcessor`),
//! each with a blanket impl for a matching `Fn` closure — the same shape
//! the teacher uses for `Mutator<S>`/`Recombinator<S>`, generalized from a
//! compile-time objective count to the runtime-configured one DAKOTA reads
//! from the problem description.

use std::sync::Arc;

use rand::rngs::StdRng;

use crate::error::DakotaResult;
use crate::ga::population::{Individual, Population};
use crate::model::Model;
use crate::response::{ActiveSet, ComponentKind};
use crate::variables::VariableSpace;

/// Produces the initial population.
pub trait Initializer {
  /// Creates `count` individuals to seed generation zero.
  fn initialize(&self, count: usize, rng: &mut StdRng) -> Vec<Individual>;
}

impl<F> Initializer for F
where
  F: Fn(usize, &mut StdRng) -> Vec<Individual>,
{
  fn initialize(&self, count: usize, rng: &mut StdRng) -> Vec<Individual> {
    self(count, rng)
  }
}

/// Mutates individuals of a population in place.
pub trait Mutator {
  /// Applies mutation to (a subset of) `population`'s individuals.
  fn mutate(&self, population: &mut Population, rng: &mut StdRng);
}

impl<F> Mutator for F
where
  F: Fn(&mut Population, &mut StdRng),
{
  fn mutate(&self, population: &mut Population, rng: &mut StdRng) {
    self(population, rng)
  }
}

/// Produces offspring from selected parents.
pub trait Crosser {
  /// Recombines `parents` into zero or more new individuals.
  fn cross_over(&self, parents: &[&Individual], rng: &mut StdRng) -> Vec<Individual>;
}

impl<F> Crosser for F
where
  F: Fn(&[&Individual], &mut StdRng) -> Vec<Individual>,
{
  fn cross_over(&self, parents: &[&Individual], rng: &mut StdRng) -> Vec<Individual> {
    self(parents, rng)
  }
}

/// Computes objective values for every individual that needs evaluation.
pub trait Evaluator {
  /// Fills in `objectives` for every individual in `population` with
  /// [`Individual::needs_evaluation`] set.
  fn evaluate(&self, population: &mut Population) -> DakotaResult<()>;
}

/// An [`Evaluator`] that drives a shared [`Model`] through a template
/// [`VariableSpace`], mapping each individual's continuous variable vector
/// onto the template before evaluating it. Individuals are evaluated one
/// at a time, in population order, matching the single-threaded
/// cooperative scheduling model the evaluation core specifies.
pub struct ModelEvaluator {
  model: Arc<Model>,
  template: VariableSpace,
  num_objectives: usize,
}

impl ModelEvaluator {
  /// Builds an evaluator around `model`, using `template` as the
  /// variable-space shape every individual's values are substituted into.
  pub fn new(model: Arc<Model>, template: VariableSpace, num_objectives: usize) -> Self {
    ModelEvaluator { model, template, num_objectives }
  }
}

impl Evaluator for ModelEvaluator {
  fn evaluate(&self, population: &mut Population) -> DakotaResult<()> {
    let num_objectives = self.num_objectives;
    for individual in population.individuals_mut() {
      if !individual.needs_evaluation() {
        continue;
      }
      let mut vars = self.template.clone();
      vars.set_continuous_values(individual.variables())?;
      let active_set = ActiveSet::values_only(num_objectives);
      let response = self.model.evaluate(&vars, &active_set)?;
      let objectives: Vec<f64> = response
        .indices_of(ComponentKind::Objective)
        .map(|i| response.value(i).unwrap_or(f64::INFINITY))
        .collect();
      individual.set_objectives(objectives);
    }
    Ok(())
  }
}

/// Assigns a scalar fitness to every individual, from its objectives.
pub trait FitnessAssessor {
  /// Computes and returns one fitness value per individual, parallel to
  /// [`Population::individuals`]. Higher is better.
  fn assess(&self, population: &Population) -> Vec<f64>;
}

impl<F> FitnessAssessor for F
where
  F: Fn(&Population) -> Vec<f64>,
{
  fn assess(&self, population: &Population) -> Vec<f64> {
    self(population)
  }
}

/// Pareto-rank fitness: fitness is `-front_index`, where front 0 is the
/// non-dominated set, front 1 is non-dominated once front 0 is removed,
/// and so on — so maximizing fitness favors earlier (better) fronts,
/// matching the teacher's `crowding_distance_selection` front assignment
/// generalized to a runtime objective count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParetoRankAssessor;

impl ParetoRankAssessor {
  fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
  }
}

impl FitnessAssessor for ParetoRankAssessor {
  fn assess(&self, population: &Population) -> Vec<f64> {
    let objectives: Vec<&[f64]> = population.individuals().iter().map(|i| i.objectives()).collect();
    let n = objectives.len();
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut fronts = vec![0usize; n];
    let mut front_index = 0usize;

    while !remaining.is_empty() {
      let mut non_dominated = Vec::new();
      for &i in &remaining {
        let dominated = remaining
          .iter()
          .any(|&j| j != i && Self::dominates(objectives[j], objectives[i]));
        if !dominated {
          non_dominated.push(i);
        }
      }
      for &i in &non_dominated {
        fronts[i] = front_index;
      }
      remaining.retain(|i| !non_dominated.contains(i));
      front_index += 1;
    }

    fronts.into_iter().map(|f| -(f as f64)).collect()
  }
}

/// Selects parent indices for recombination.
pub trait Selector {
  /// Chooses `n` individuals (with repetition allowed) from `population`,
  /// guided by `fitness`, returning their indices.
  fn select(&self, population: &Population, fitness: &[f64], n: usize, rng: &mut StdRng) -> Vec<usize>;
}

impl<F> Selector for F
where
  F: Fn(&Population, &[f64], usize, &mut StdRng) -> Vec<usize>,
{
  fn select(&self, population: &Population, fitness: &[f64], n: usize, rng: &mut StdRng) -> Vec<usize> {
    self(population, fitness, n, rng)
  }
}

/// Applies niche pressure, trimming crowded regions of objective space.
pub trait NichePressureApplicator {
  /// Removes individuals from `population` that are too close to others
  /// in objective space, leaving at most `target_size`, and returns the
  /// (possibly adjusted) fitness vector for the survivors.
  fn apply_niche_pressure(
    &mut self,
    population: &mut Population,
    fitness: Vec<f64>,
    target_size: usize,
  ) -> Vec<f64>;
}

/// Decides whether the run has converged.
pub trait Converger {
  /// Inspects the current generation and returns whether the run should
  /// stop.
  fn is_converged(&mut self, population: &Population, fitness: &[f64]) -> bool;
}

/// Final, one-shot processing after the run stops (e.g. trimming the
/// archive to the reported Pareto set).
pub trait PostProcessor {
  /// Adjusts `population` in place after the driver has finalized.
  fn post_process(&self, population: &mut Population);
}

impl<F> PostProcessor for F
where
  F: Fn(&mut Population),
{
  fn post_process(&self, population: &mut Population) {
    self(population)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn individual_with_objectives(objectives: Vec<f64>) -> Individual {
    let mut ind = Individual::new(vec![0.0], vec![]);
    ind.set_objectives(objectives);
    ind
  }

  #[test]
  fn test_pareto_rank_assessor_separates_fronts() {
    let population = Population::new(vec![
      individual_with_objectives(vec![0.0, 1.0]),
      individual_with_objectives(vec![1.0, 0.0]),
      individual_with_objectives(vec![2.0, 2.0]),
    ]);
    let fitness = ParetoRankAssessor.assess(&population);
    assert_eq!(fitness[0], 0.0);
    assert_eq!(fitness[1], 0.0);
    assert_eq!(fitness[2], -1.0);
  }

  #[test]
  fn test_pareto_rank_assessor_identical_population_same_front() {
    let population = Population::new(vec![
      individual_with_objectives(vec![1.0, 1.0]),
      individual_with_objectives(vec![1.0, 1.0]),
    ]);
    let fitness = ParetoRankAssessor.assess(&population);
    assert_eq!(fitness, vec![0.0, 0.0]);
  }

  #[test]
  fn test_closure_mutator_blanket_impl() {
    let mutator = |pop: &mut Population, _rng: &mut StdRng| {
      for ind in pop.individuals_mut() {
        ind.variables_mut()[0] += 1.0;
      }
    };
    let mut population = Population::new(vec![Individual::new(vec![1.0], vec![])]);
    let mut rng = rand::SeedableRng::seed_from_u64(0);
    mutator.mutate(&mut population, &mut rng);
    assert_eq!(population.individuals()[0].variables()[0], 2.0);
  }
}
