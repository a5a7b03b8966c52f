//! Concurrent in-flight registrations for the same point coalesce to one
//! launch: a second caller attaches to the first's eval-id instead of
//! triggering a redundant simulator call, and once that eval-id completes
//! both callers' lookups see the same response.

use dakota_core::cache::{CacheLimits, EvaluationCache, RegisterOutcome};
use dakota_core::response::{ActiveSet, AsvRequest, ComponentKind, Response};
use dakota_core::variables::Value;
use dakota_core::pair::VariablesSnapshot;

fn snap(x: f64) -> VariablesSnapshot {
  VariablesSnapshot::from_values(&[Value::Real(x)])
}

#[test]
fn concurrent_requests_for_the_same_point_coalesce_to_one_launch() {
  let cache = EvaluationCache::new(CacheLimits::default());
  let vars = snap(7.0);

  let first = cache.register_in_flight("sim", &vars, 100);
  assert_eq!(first, RegisterOutcome::Launch, "the first request must be told to launch");

  let second = cache.register_in_flight("sim", &vars, 200);
  assert_eq!(second, RegisterOutcome::AttachTo(100), "a concurrent request for the same point must attach, not relaunch");

  let third = cache.register_in_flight("sim", &vars, 300);
  assert_eq!(third, RegisterOutcome::AttachTo(100), "a third concurrent request must also attach to the original launch");

  // Nothing is visible to a plain lookup while still in flight.
  assert!(cache.lookup("sim", &vars).is_none());

  let asv = ActiveSet::new(vec![AsvRequest::value_only()]);
  let mut response = Response::empty(vec![ComponentKind::Objective], 1);
  response.set_value(0, 49.0);
  cache.complete_in_flight(100, "sim", &vars, &asv, &response).unwrap();

  // Every caller that attached now sees the same completed response.
  let found = cache.lookup("sim", &vars).expect("completed response must now be cached");
  assert_eq!(found.value(0), Some(49.0));
}

#[test]
fn distinct_points_never_coalesce() {
  let cache = EvaluationCache::new(CacheLimits::default());
  let first = cache.register_in_flight("sim", &snap(1.0), 1);
  let second = cache.register_in_flight("sim", &snap(2.0), 2);
  assert_eq!(first, RegisterOutcome::Launch);
  assert_eq!(second, RegisterOutcome::Launch);
}
