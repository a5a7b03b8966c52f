//! A full JEGA driver run converges on the metric-threshold convergence
//! criterion well before its generation budget is exhausted, for a
//! single-variable single-objective bowl that has nowhere left to improve
//! once the population collapses onto the optimum.

use rand::rngs::StdRng;
use rand::Rng;

use dakota_core::ga::convergence::MetricConverger;
use dakota_core::ga::driver::{Driver, OperatorSet};
use dakota_core::ga::operator::{Evaluator, FitnessAssessor, ParetoRankAssessor};
use dakota_core::ga::population::{Individual, Population};
use dakota_core::ga::selection::ReplacementStrategy;
use dakota_core::error::DakotaResult;

struct BowlEvaluator;

impl Evaluator for BowlEvaluator {
  fn evaluate(&self, population: &mut Population) -> DakotaResult<()> {
    for ind in population.individuals_mut() {
      if ind.needs_evaluation() {
        let x = ind.variables()[0];
        ind.set_objectives(vec![x * x]);
      }
    }
    Ok(())
  }
}

fn build_driver(max_generations: usize) -> Driver {
  let initializer = |count: usize, rng: &mut StdRng| -> Vec<Individual> {
    (0..count).map(|_| Individual::new(vec![rng.gen_range(-1.0..1.0)], vec![])).collect()
  };
  let mutator = |population: &mut Population, rng: &mut StdRng| {
    for ind in population.individuals_mut() {
      if rng.gen::<f64>() < 0.2 {
        let v = &mut ind.variables_mut()[0];
        *v = (*v + rng.gen_range(-0.05..0.05)).clamp(-5.0, 5.0);
      }
    }
  };
  let crosser = |parents: &[&Individual], rng: &mut StdRng| -> Vec<Individual> {
    if parents.len() < 2 {
      return parents.iter().map(|p| Individual::new(p.variables().to_vec(), vec![p.id()])).collect();
    }
    let t: f64 = rng.gen();
    let child = t * parents[0].variables()[0] + (1.0 - t) * parents[1].variables()[0];
    vec![Individual::new(vec![child], vec![parents[0].id(), parents[1].id()])]
  };
  let selector = |population: &Population, fitness: &[f64], n: usize, rng: &mut StdRng| -> Vec<usize> {
    (0..n)
      .map(|_| {
        let i = rng.gen_range(0..population.len());
        let j = rng.gen_range(0..population.len());
        if fitness[i] >= fitness[j] { i } else { j }
      })
      .collect()
  };

  let operators = OperatorSet {
    initializer: Box::new(initializer),
    mutator: Box::new(mutator),
    crosser: Box::new(crosser),
    evaluator: Box::new(BowlEvaluator),
    fitness_assessor: Box::new(ParetoRankAssessor),
    selector: Box::new(selector),
    niche_pressure: Box::new(dakota_core::ga::niching::DistanceNicher::new(vec![0.01], false)),
    converger: Box::new(MetricConverger::new(1e-3, 4, 1)),
    post_processor: Box::new(|_pop: &mut Population| {}),
    replacement: ReplacementStrategy::Elitist,
  };
  Driver::new(operators, 20, max_generations, 11, 10)
}

#[test]
fn driver_converges_before_generation_budget_is_exhausted() {
  let mut driver = build_driver(200);
  driver.initialize().unwrap();
  driver.run_to_convergence().unwrap();
  assert!(
    driver.generation() < 200,
    "a collapsing single-optimum population should stall the convergence metric well before the budget"
  );

  let fitness = ParetoRankAssessor.assess(driver.population());
  let best = driver
    .population()
    .individuals()
    .iter()
    .zip(&fitness)
    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
    .map(|(ind, _)| ind.objectives()[0])
    .unwrap();
  assert!(best < 1.0, "population should have collapsed close to the bowl's minimum at x=0, got objective {best}");
}

#[test]
fn driver_stops_at_generation_budget_when_given_too_few_generations() {
  let mut driver = build_driver(3);
  driver.initialize().unwrap();
  driver.run_to_convergence().unwrap();
  assert!(driver.generation() <= 3);
}
