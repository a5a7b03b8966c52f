//! [`Individual`] and [`Population`]: the GA's container type, with the two
//! sorted index views (variable- and objective-lexicographic) the data
//! model calls for and an explicit [`Population::synchronize`] to keep them
//! consistent, rather than an always-synchronized invariant — matching the
//! spec's "between mutations the views may temporarily disagree" note.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One candidate design in a GA population: its continuous variable
/// values, the raw objective values last computed for it (empty until
/// evaluated), a scalar fitness assigned by a `FitnessAssessor`, and
/// bookkeeping for where it came from.
#[derive(Debug, Clone)]
pub struct Individual {
  id: u64,
  variables: Vec<f64>,
  objectives: Vec<f64>,
  fitness: Option<f64>,
  /// `false` once this individual has been evaluated and its fitness value
  /// is meaningful; mirrors the data model's evaluate-flag invariant.
  needs_evaluation: bool,
  parent_ids: Vec<u64>,
}

impl Individual {
  /// Creates a fresh, not-yet-evaluated individual with its own id.
  pub fn new(variables: Vec<f64>, parent_ids: Vec<u64>) -> Self {
    Individual {
      id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
      variables,
      objectives: Vec::new(),
      fitness: None,
      needs_evaluation: true,
      parent_ids,
    }
  }

  /// This individual's id, stable for its lifetime, used to track lineage
  /// (`parent_ids`) across generations.
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Current continuous variable values.
  pub fn variables(&self) -> &[f64] {
    &self.variables
  }

  /// Mutable access to the variable values, used by `Mutator`/`Crosser`
  /// operators. Mutating marks the individual for re-evaluation.
  pub fn variables_mut(&mut self) -> &mut Vec<f64> {
    self.needs_evaluation = true;
    &mut self.variables
  }

  /// The objective values last computed for this individual, or empty if
  /// it has never been evaluated.
  pub fn objectives(&self) -> &[f64] {
    &self.objectives
  }

  /// Records freshly computed objective values and clears the
  /// needs-evaluation flag.
  pub fn set_objectives(&mut self, objectives: Vec<f64>) {
    self.objectives = objectives;
    self.needs_evaluation = false;
  }

  /// This individual's scalar fitness, if a `FitnessAssessor` has run since
  /// its objectives were last set.
  pub fn fitness(&self) -> Option<f64> {
    self.fitness
  }

  /// Assigns a scalar fitness value.
  pub fn set_fitness(&mut self, fitness: f64) {
    self.fitness = Some(fitness);
  }

  /// Whether this individual's fitness is stale (unevaluated or mutated
  /// since its last evaluation).
  pub fn needs_evaluation(&self) -> bool {
    self.needs_evaluation
  }

  /// Ids of the individuals this one was produced from by recombination,
  /// empty for initial-generation individuals.
  pub fn parent_ids(&self) -> &[u64] {
    &self.parent_ids
  }
}

/// A population of [`Individual`]s with two index views kept synchronized
/// only on demand: variable-lexicographic and objective-lexicographic.
#[derive(Debug, Clone, Default)]
pub struct Population {
  individuals: Vec<Individual>,
  variable_order: Vec<usize>,
  objective_order: Vec<usize>,
  synchronized: bool,
}

impl Population {
  /// Builds a population from a set of individuals; the two sorted views
  /// are not yet computed until [`Population::synchronize`] is called.
  pub fn new(individuals: Vec<Individual>) -> Self {
    Population { individuals, variable_order: Vec::new(), objective_order: Vec::new(), synchronized: false }
  }

  /// Number of individuals.
  pub fn len(&self) -> usize {
    self.individuals.len()
  }

  /// Whether the population holds no individuals.
  pub fn is_empty(&self) -> bool {
    self.individuals.is_empty()
  }

  /// All individuals, in their current (unsorted, insertion) order.
  pub fn individuals(&self) -> &[Individual] {
    &self.individuals
  }

  /// Mutable access to individuals in insertion order. Any caller that
  /// changes variables or adds/removes individuals should call
  /// [`Population::synchronize`] again before relying on the sorted views.
  pub fn individuals_mut(&mut self) -> &mut Vec<Individual> {
    self.synchronized = false;
    &mut self.individuals
  }

  /// Appends new individuals (e.g. offspring), invalidating the sorted
  /// views until the next `synchronize`.
  pub fn extend(&mut self, new_individuals: impl IntoIterator<Item = Individual>) {
    self.individuals.extend(new_individuals);
    self.synchronized = false;
  }

  /// Replaces the individuals outright (e.g. after a replacement-strategy
  /// generational transition), invalidating the sorted views.
  pub fn replace_all(&mut self, individuals: Vec<Individual>) {
    self.individuals = individuals;
    self.synchronized = false;
  }

  /// `SynchronizeOFAndDVContainers()`: recomputes both sorted index views
  /// from the current individuals. Until this is called after a mutation,
  /// `variable_sorted`/`objective_sorted` reflect the previous generation.
  pub fn synchronize(&mut self) {
    let n = self.individuals.len();
    let mut variable_order: Vec<usize> = (0..n).collect();
    variable_order.sort_by(|&a, &b| {
      self.individuals[a]
        .variables()
        .partial_cmp(self.individuals[b].variables())
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut objective_order: Vec<usize> = (0..n).collect();
    objective_order.sort_by(|&a, &b| {
      self.individuals[a]
        .objectives()
        .partial_cmp(self.individuals[b].objectives())
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    self.variable_order = variable_order;
    self.objective_order = objective_order;
    self.synchronized = true;
  }

  /// Whether the sorted views are consistent with the current individuals
  /// (i.e. `synchronize` has run since the last mutation).
  pub fn is_synchronized(&self) -> bool {
    self.synchronized
  }

  /// Individuals in variable-lexicographic order, as of the last
  /// `synchronize`.
  pub fn variable_sorted(&self) -> impl Iterator<Item = &Individual> {
    self.variable_order.iter().map(move |&i| &self.individuals[i])
  }

  /// Individuals in objective-lexicographic order, as of the last
  /// `synchronize`.
  pub fn objective_sorted(&self) -> impl Iterator<Item = &Individual> {
    self.objective_order.iter().map(move |&i| &self.individuals[i])
  }

  /// Indices of the individuals whose fitness equals the maximum fitness
  /// currently assigned (the "best-fitness set" of the data model,
  /// typically the non-dominated set once a Pareto-rank `FitnessAssessor`
  /// has run). Individuals with no fitness yet are ignored.
  pub fn best_fitness_indices(&self) -> Vec<usize> {
    let best = self.individuals.iter().filter_map(|i| i.fitness()).fold(f64::NEG_INFINITY, f64::max);
    if best == f64::NEG_INFINITY {
      return Vec::new();
    }
    self
      .individuals
      .iter()
      .enumerate()
      .filter(|(_, ind)| ind.fitness() == Some(best))
      .map(|(i, _)| i)
      .collect()
  }
}
