//! Distance-niche pressure applied directly to a crowded trade-off front
//! always keeps both extreme designs, across repeated applications as a
//! driver would apply it generation after generation.

use dakota_core::ga::niching::DistanceNicher;
use dakota_core::ga::operator::NichePressureApplicator;
use dakota_core::ga::population::{Individual, Population};

fn trade_off_front(n: usize) -> Population {
  let individuals = (0..n)
    .map(|i| {
      let t = i as f64 / (n - 1) as f64;
      let mut ind = Individual::new(vec![t], vec![]);
      ind.set_objectives(vec![t * 10.0, (1.0 - t) * 10.0]);
      ind.set_fitness(0.0);
      ind
    })
    .collect();
  let mut pop = Population::new(individuals);
  pop.synchronize();
  pop
}

#[test]
fn extreme_designs_survive_repeated_niching_on_a_crowded_front() {
  let mut pop = trade_off_front(20);
  let mut nicher = DistanceNicher::new(vec![0.05, 0.05], false);

  for _ in 0..5 {
    let fitness = vec![0.0; pop.len()];
    nicher.apply_niche_pressure(&mut pop, fitness, pop.len());
    // every surviving individual still has fitness set, since niching
    // only removes rows, so the driver's best_fitness_indices stays valid
    assert!(pop.individuals().iter().all(|i| i.fitness().is_some()));
  }

  let first_obj: Vec<f64> = pop.individuals().iter().map(|i| i.objectives()[0]).collect();
  assert!(first_obj.iter().any(|&v| v == 0.0), "the extreme minimizing the first objective must survive");
  assert!(first_obj.iter().any(|&v| (v - 10.0).abs() < 1e-9), "the extreme minimizing the second objective must survive");
}

#[test]
fn niching_never_grows_the_population() {
  let mut pop = trade_off_front(12);
  let mut nicher = DistanceNicher::new(vec![0.2, 0.2], false);
  let before = pop.len();
  let fitness = vec![0.0; pop.len()];
  nicher.apply_niche_pressure(&mut pop, fitness, pop.len());
  assert!(pop.len() <= before);
}
