//! [`Driver`]: the JEGA state machine (`Uninitialized` → `Initialized` →
//! `Iterating` → `Finalized`) coordinating one [`OperatorSet`] over
//! successive generations, and [`Runtime`], the explicit execution context
//! threaded through instead of global mutable state (see DESIGN.md's
//! Design Notes resolution).

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{DakotaError, DakotaResult};
use crate::ga::operator::{Converger, Crosser, Evaluator, FitnessAssessor, Initializer, Mutator, NichePressureApplicator, PostProcessor, Selector};
use crate::ga::population::Population;
use crate::ga::selection::ReplacementStrategy;

/// Execution context passed down to operators and nested sub-iterators,
/// tracking nesting depth explicitly rather than through global state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runtime {
  nest_level: u32,
}

impl Runtime {
  /// A top-level runtime context.
  pub fn new() -> Self {
    Runtime { nest_level: 0 }
  }

  /// A context one level deeper, for a nested sub-iterator invocation.
  pub fn nested(&self) -> Self {
    Runtime { nest_level: self.nest_level + 1 }
  }

  /// Current nesting depth; 0 at the top level.
  pub fn nest_level(&self) -> u32 {
    self.nest_level
  }
}

/// The driver's lifecycle phase. Operations are only valid in specific
/// phases; calling one out of order is a logic error the caller should not
/// be able to trigger through normal use of [`Driver`]'s public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
  /// No population yet; `initialize` has not run.
  Uninitialized,
  /// Population seeded and evaluated; ready to iterate.
  Initialized,
  /// At least one generation has run; further `iterate_once` calls are
  /// valid.
  Iterating,
  /// `finalize` has run; the driver will not iterate further.
  Finalized,
}

/// The full complement of operators one JEGA run uses, boxed as trait
/// objects so the driver can be configured generically regardless of
/// which concrete strategy backs each slot.
pub struct OperatorSet {
  /// Produces the initial population.
  pub initializer: Box<dyn Initializer>,
  /// In-place mutation applied to offspring.
  pub mutator: Box<dyn Mutator>,
  /// Recombination producing offspring from selected parents.
  pub crosser: Box<dyn Crosser>,
  /// Computes objective values.
  pub evaluator: Box<dyn Evaluator>,
  /// Assigns scalar fitness from objectives.
  pub fitness_assessor: Box<dyn FitnessAssessor>,
  /// Chooses parents for recombination.
  pub selector: Box<dyn Selector>,
  /// Thins crowded regions of objective space.
  pub niche_pressure: Box<dyn NichePressureApplicator>,
  /// Decides when to stop.
  pub converger: Box<dyn Converger>,
  /// One-shot cleanup after the run stops.
  pub post_processor: Box<dyn PostProcessor>,
  /// How the next generation's survivors are chosen.
  pub replacement: ReplacementStrategy,
}

/// Drives one JEGA run through its explicit lifecycle phases.
pub struct Driver {
  state: DriverState,
  operators: OperatorSet,
  population: Population,
  rng: StdRng,
  population_size: usize,
  max_generations: usize,
  elite_count: usize,
  generation: usize,
}

impl Driver {
  /// Builds a driver around `operators`, seeding its RNG from `seed` (use
  /// [`crate::config::ProblemDescription::resolve_seed`] upstream to apply
  /// the zero-means-from-entropy rule). `elite_count` is the elite/retain
  /// count `operators.replacement` reads each generation (see
  /// [`crate::config::JegaConfig::resolve_elite_count`]), clamped to
  /// `population_size`.
  pub fn new(
    operators: OperatorSet,
    population_size: usize,
    max_generations: usize,
    seed: u64,
    elite_count: usize,
  ) -> Self {
    let rng = if seed == 0 { StdRng::from_entropy() } else { StdRng::seed_from_u64(seed) };
    Driver {
      state: DriverState::Uninitialized,
      operators,
      population: Population::new(Vec::new()),
      rng,
      population_size,
      max_generations,
      elite_count: elite_count.min(population_size),
      generation: 0,
    }
  }

  /// Current lifecycle phase.
  pub fn state(&self) -> DriverState {
    self.state
  }

  /// Number of generations completed so far.
  pub fn generation(&self) -> usize {
    self.generation
  }

  /// The current population, valid once [`Driver::initialize`] has run.
  pub fn population(&self) -> &Population {
    &self.population
  }

  /// Seeds and evaluates the initial population. Valid only from
  /// [`DriverState::Uninitialized`].
  pub fn initialize(&mut self) -> DakotaResult<()> {
    if self.state != DriverState::Uninitialized {
      return Err(DakotaError::InputError(
        "driver must be Uninitialized to initialize".to_string(),
      ));
    }
    let individuals = self.operators.initializer.initialize(self.population_size, &mut self.rng);
    self.population = Population::new(individuals);
    self.operators.evaluator.evaluate(&mut self.population)?;
    self.population.synchronize();
    self.state = DriverState::Initialized;
    Ok(())
  }

  /// Runs one generation: select parents, cross over, mutate, evaluate
  /// offspring, assess fitness, apply niche pressure, replace, check
  /// convergence. Valid from [`DriverState::Initialized`] or
  /// [`DriverState::Iterating`]. Returns whether the run has now
  /// converged (the caller should stop calling `iterate_once` and call
  /// `finalize` once this or the generation budget is reached).
  pub fn iterate_once(&mut self) -> DakotaResult<bool> {
    if self.state != DriverState::Initialized && self.state != DriverState::Iterating {
      return Err(DakotaError::InputError(
        "driver must be Initialized or Iterating to iterate".to_string(),
      ));
    }

    let mut fitness = self.operators.fitness_assessor.assess(&self.population);

    let parent_indices =
      self.operators.selector.select(&self.population, &fitness, self.population_size, &mut self.rng);
    let parents: Vec<_> = {
      let individuals = self.population.individuals();
      parent_indices.iter().map(|&i| individuals[i].clone()).collect()
    };

    let mut offspring = Vec::new();
    for pair in parents.chunks(2) {
      let refs: Vec<&_> = pair.iter().collect();
      offspring.extend(self.operators.crosser.cross_over(&refs, &mut self.rng));
    }

    let mut offspring_population = Population::new(offspring);
    self.operators.mutator.mutate(&mut offspring_population, &mut self.rng);
    self.operators.evaluator.evaluate(&mut offspring_population)?;

    let previous = std::mem::replace(&mut self.population, Population::new(Vec::new()));
    let previous_individuals = previous.individuals().to_vec();
    let offspring_individuals = offspring_population.individuals().to_vec();
    let previous_ids: std::collections::HashSet<u64> =
      previous_individuals.iter().map(|ind| ind.id()).collect();

    let mut merged = Population::new(
      previous_individuals.iter().cloned().chain(offspring_individuals.iter().cloned()).collect(),
    );
    merged.synchronize();
    fitness = self.operators.fitness_assessor.assess(&merged);
    Self::record_fitness(&mut merged, &fitness);
    let niched_fitness =
      self.operators.niche_pressure.apply_niche_pressure(&mut merged, fitness, self.population_size);
    let final_fitness = if niched_fitness.is_empty() {
      let recomputed = self.operators.fitness_assessor.assess(&merged);
      Self::record_fitness(&mut merged, &recomputed);
      recomputed
    } else {
      niched_fitness
    };

    // Niche pressure may have thinned `merged`, mixing what survived from
    // `previous` and from this generation's offspring. Recover the split
    // by individual id so `replace` still sees the two cohorts its
    // strategies (`random`'s "from the previous population", `chc`'s
    // elite-then-fill) are defined over, instead of one pre-merged pool.
    let mut surviving_previous = Vec::new();
    let mut surviving_previous_fitness = Vec::new();
    let mut surviving_trials = Vec::new();
    let mut surviving_trials_fitness = Vec::new();
    for (individual, &f) in merged.individuals().iter().zip(&final_fitness) {
      if previous_ids.contains(&individual.id()) {
        surviving_previous.push(individual.clone());
        surviving_previous_fitness.push(f);
      } else {
        surviving_trials.push(individual.clone());
        surviving_trials_fitness.push(f);
      }
    }
    let replace_fitness: Vec<f64> =
      surviving_previous_fitness.into_iter().chain(surviving_trials_fitness).collect();

    let survivors = self.operators.replacement.replace(
      surviving_previous,
      surviving_trials,
      &replace_fitness,
      self.population_size,
      self.elite_count,
      &mut self.rng,
    );
    self.population = Population::new(survivors);
    self.population.synchronize();

    self.generation += 1;
    let fitness_for_convergence = self.operators.fitness_assessor.assess(&self.population);
    Self::record_fitness(&mut self.population, &fitness_for_convergence);
    let converged = self.operators.converger.is_converged(&self.population, &fitness_for_convergence);

    self.state = DriverState::Iterating;
    Ok(converged || self.generation >= self.max_generations)
  }

  /// Writes a freshly computed fitness vector back onto each individual
  /// (parallel to [`Population::individuals`]), so consumers that key off
  /// [`Individual::fitness`] directly — [`Population::best_fitness_indices`],
  /// and through it every [`crate::ga::operator::NichePressureApplicator`]
  /// and [`crate::ga::operator::Converger`] — see the current generation's
  /// values rather than stale ones from before the last mutation.
  fn record_fitness(population: &mut Population, fitness: &[f64]) {
    for (individual, &f) in population.individuals_mut().iter_mut().zip(fitness) {
      individual.set_fitness(f);
    }
  }

  /// Runs generations until convergence or the generation budget is
  /// exhausted.
  pub fn run_to_convergence(&mut self) -> DakotaResult<()> {
    loop {
      let done = self.iterate_once()?;
      if done {
        break;
      }
    }
    Ok(())
  }

  /// Runs the post-processor and transitions to [`DriverState::Finalized`].
  /// Valid from [`DriverState::Initialized`] or [`DriverState::Iterating`].
  pub fn finalize(&mut self) -> DakotaResult<()> {
    if self.state != DriverState::Initialized && self.state != DriverState::Iterating {
      return Err(DakotaError::InputError(
        "driver must be Initialized or Iterating to finalize".to_string(),
      ));
    }
    self.operators.post_processor.post_process(&mut self.population);
    self.state = DriverState::Finalized;
    Ok(())
  }
}
