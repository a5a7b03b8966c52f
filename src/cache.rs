//! [`EvaluationCache`]: duplicate-detection multi-index over evaluated
//! pairs, with in-flight registration and bounded LRU eviction.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{DakotaError, DakotaResult};
use crate::pair::{PairOrigin, ParameterResponsePair, VariablesSnapshot};
use crate::response::{ActiveSet, Response};

type Key = (String, VariablesSnapshot);

/// Configuration for the cache's optional bounded-size LRU behavior (Open
/// Question (c)): when `max_entries` is set, the least-recently-looked-up
/// entry that is not restart-sourced is evicted to make room.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheLimits {
  /// Maximum number of complete entries to retain, or `None` for
  /// unbounded.
  pub max_entries: Option<usize>,
}

#[derive(Debug, Clone)]
struct CompleteEntry {
  pair: ParameterResponsePair,
  last_used: u64,
}

#[derive(Debug, Clone)]
enum Slot {
  InFlight { eval_id: u64 },
  Complete(CompleteEntry),
}

struct Inner {
  slots: HashMap<Key, Slot>,
  in_flight_keys: HashMap<u64, Key>,
  clock: u64,
  limits: CacheLimits,
}

/// Result of registering an evaluation for asynchronous dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
  /// This is the first request for this key; the caller should launch it.
  Launch,
  /// Another request for this key is already in flight under this
  /// eval-id; the caller should attach rather than launch a new job
  /// (scenario 6: concurrent requests coalesce to one simulator call).
  AttachTo(u64),
}

/// Duplicate-detection cache over `(interface-id, variables)` pairs.
pub struct EvaluationCache {
  inner: RwLock<Inner>,
}

impl EvaluationCache {
  /// Creates an empty cache with the given bounded-size policy.
  pub fn new(limits: CacheLimits) -> Self {
    EvaluationCache {
      inner: RwLock::new(Inner {
        slots: HashMap::new(),
        in_flight_keys: HashMap::new(),
        clock: 0,
        limits,
      }),
    }
  }

  fn key(interface_id: &str, vars: &VariablesSnapshot) -> Key {
    (interface_id.to_string(), vars.clone())
  }

  /// Looks up a complete response for `(interface_id, vars)`, by exact
  /// variable match. Returns `None` if absent or still in flight.
  pub fn lookup(&self, interface_id: &str, vars: &VariablesSnapshot) -> Option<Response> {
    let mut inner = self.inner.write();
    inner.clock += 1;
    let clock = inner.clock;
    let key = Self::key(interface_id, vars);
    match inner.slots.get_mut(&key) {
      Some(Slot::Complete(entry)) => {
        entry.last_used = clock;
        Some(entry.pair.response())
      }
      _ => None,
    }
  }

  /// Looks up the full cached pair (including restart/live origin), by
  /// exact variable match.
  pub fn lookup_pair(&self, interface_id: &str, vars: &VariablesSnapshot) -> Option<ParameterResponsePair> {
    let mut inner = self.inner.write();
    inner.clock += 1;
    let clock = inner.clock;
    let key = Self::key(interface_id, vars);
    match inner.slots.get_mut(&key) {
      Some(Slot::Complete(entry)) => {
        entry.last_used = clock;
        Some(entry.pair.clone())
      }
      _ => None,
    }
  }

  /// Retrieves the in-flight skeleton response for `eval_id`, erroring if
  /// the eval-id was registered under a different interface than
  /// `expected_interface_id`.
  pub fn check_interface(&self, eval_id: u64, expected_interface_id: &str) -> DakotaResult<()> {
    let inner = self.inner.read();
    match inner.in_flight_keys.get(&eval_id) {
      Some((actual, _)) if actual != expected_interface_id => Err(DakotaError::InterfaceMismatch {
        eval_id,
        expected: expected_interface_id.to_string(),
        actual: actual.clone(),
      }),
      _ => Ok(()),
    }
  }

  /// Registers an evaluation for launch under `eval_id`. Concurrent
  /// registration for the same `(interface_id, vars)` key attaches to the
  /// existing in-flight eval-id instead of re-launching.
  pub fn register_in_flight(
    &self,
    interface_id: &str,
    vars: &VariablesSnapshot,
    eval_id: u64,
  ) -> RegisterOutcome {
    let mut inner = self.inner.write();
    let key = Self::key(interface_id, vars);
    if let Some(Slot::InFlight { eval_id: existing }) = inner.slots.get(&key) {
      return RegisterOutcome::AttachTo(*existing);
    }
    inner.slots.insert(key.clone(), Slot::InFlight { eval_id });
    inner.in_flight_keys.insert(eval_id, key);
    RegisterOutcome::Launch
  }

  /// Completes an in-flight evaluation, storing the resulting pair.
  pub fn complete_in_flight(
    &self,
    eval_id: u64,
    interface_id: &str,
    vars: &VariablesSnapshot,
    active_set: &ActiveSet,
    response: &Response,
  ) -> DakotaResult<()> {
    self.check_interface(eval_id, interface_id)?;
    let pair = ParameterResponsePair::new(interface_id, vars.clone(), active_set, response, PairOrigin::Live);
    {
      let mut inner = self.inner.write();
      inner.in_flight_keys.remove(&eval_id);
    }
    self.store(pair);
    Ok(())
  }

  /// Stores a completed pair directly (used for synchronous evaluations
  /// and for restart replay). If an entry already exists for this key,
  /// the response is replaced only when the new active set is a superset
  /// of the old one — otherwise the existing entry is kept untouched.
  pub fn store(&self, pair: ParameterResponsePair) {
    let mut inner = self.inner.write();
    inner.clock += 1;
    let clock = inner.clock;
    let key = Self::key(pair.interface_id(), pair.variables());

    let should_replace = match inner.slots.get(&key) {
      // Only replace when the new active set is a superset of the
      // existing one; otherwise the existing, already-sufficient
      // response is left untouched.
      Some(Slot::Complete(existing)) => existing.pair.active_set().is_subset_of(&pair.active_set()),
      _ => true,
    };

    if should_replace {
      inner.slots.insert(key.clone(), Slot::Complete(CompleteEntry { pair, last_used: clock }));
    }

    Inner::evict_if_needed(&mut inner);
  }

  /// Number of complete (non-in-flight) entries currently cached.
  pub fn len(&self) -> usize {
    self.inner.read().slots.values().filter(|s| matches!(s, Slot::Complete(_))).count()
  }

  /// Whether the cache holds no complete entries.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Inner {
  fn evict_if_needed(inner: &mut Inner) {
    let Some(max) = inner.limits.max_entries else { return };
    loop {
      let complete_count = inner.slots.values().filter(|s| matches!(s, Slot::Complete(_))).count();
      if complete_count <= max {
        break;
      }
      let victim = inner
        .slots
        .iter()
        .filter_map(|(k, s)| match s {
          Slot::Complete(e) if e.pair.origin() != PairOrigin::RestartSourced => Some((k.clone(), e.last_used)),
          _ => None,
        })
        .min_by_key(|(_, last_used)| *last_used)
        .map(|(k, _)| k);
      match victim {
        Some(k) => {
          inner.slots.remove(&k);
        }
        None => break, // everything remaining is restart-sourced; keep it all
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::response::{AsvRequest, ComponentKind};
  use crate::variables::Value;

  fn snap(x: f64) -> VariablesSnapshot {
    VariablesSnapshot::from_values(&[Value::Real(x)])
  }

  fn resp(v: f64) -> Response {
    let mut r = Response::empty(vec![ComponentKind::Objective], 1);
    r.set_value(0, v);
    r
  }

  #[test]
  fn test_store_and_lookup_exact_match() {
    let cache = EvaluationCache::new(CacheLimits::default());
    let vars = snap(0.5);
    let asv = ActiveSet::new(vec![AsvRequest::value_only()]);
    let pair = ParameterResponsePair::new("sim", vars.clone(), &asv, &resp(0.5), PairOrigin::Live);
    cache.store(pair);
    let found = cache.lookup("sim", &vars).expect("present");
    assert_eq!(found.value(0), Some(0.5));
  }

  #[test]
  fn test_lookup_returns_superset_response() {
    // property 1: a subsequent lookup with the same key returns a
    // response whose active set is a superset of the one it was
    // inserted with.
    let cache = EvaluationCache::new(CacheLimits::default());
    let vars = snap(1.0);
    let small = ActiveSet::new(vec![AsvRequest::value_only()]);
    let big = ActiveSet::new(vec![AsvRequest::value_and_gradient()]);

    let r1 = resp(1.0);
    cache.store(ParameterResponsePair::new("sim", vars.clone(), &small, &r1, PairOrigin::Live));

    let mut r2 = resp(1.0);
    r2.set_gradient(0, vec![2.0]);
    cache.store(ParameterResponsePair::new("sim", vars.clone(), &big, &r2, PairOrigin::Live));

    let found_pair = cache.lookup_pair("sim", &vars).unwrap();
    assert!(small.is_subset_of(&found_pair.active_set()));
  }

  #[test]
  fn test_store_does_not_downgrade_superset_entry() {
    let cache = EvaluationCache::new(CacheLimits::default());
    let vars = snap(2.0);
    let small = ActiveSet::new(vec![AsvRequest::value_only()]);
    let big = ActiveSet::new(vec![AsvRequest::value_and_gradient()]);

    let mut r_big = resp(2.0);
    r_big.set_gradient(0, vec![4.0]);
    cache.store(ParameterResponsePair::new("sim", vars.clone(), &big, &r_big, PairOrigin::Live));
    cache.store(ParameterResponsePair::new("sim", vars.clone(), &small, &resp(99.0), PairOrigin::Live));

    let found = cache.lookup_pair("sim", &vars).unwrap();
    assert!(big.is_subset_of(&found.active_set()));
    assert_eq!(found.response().value(0), Some(2.0));
  }

  #[test]
  fn test_in_flight_registration_coalesces() {
    let cache = EvaluationCache::new(CacheLimits::default());
    let vars = snap(3.0);
    let first = cache.register_in_flight("sim", &vars, 1);
    assert_eq!(first, RegisterOutcome::Launch);
    let second = cache.register_in_flight("sim", &vars, 2);
    assert_eq!(second, RegisterOutcome::AttachTo(1));
  }

  #[test]
  fn test_interface_mismatch_detected() {
    let cache = EvaluationCache::new(CacheLimits::default());
    let vars = snap(4.0);
    cache.register_in_flight("sim-a", &vars, 7);
    let err = cache.check_interface(7, "sim-b");
    assert!(matches!(err, Err(DakotaError::InterfaceMismatch { .. })));
  }

  #[test]
  fn test_bounded_cache_evicts_lru_not_restart_sourced() {
    let cache = EvaluationCache::new(CacheLimits { max_entries: Some(1) });
    let asv = ActiveSet::new(vec![AsvRequest::value_only()]);
    let restart_pair =
      ParameterResponsePair::new("sim", snap(10.0), &asv, &resp(10.0), PairOrigin::RestartSourced);
    cache.store(restart_pair);
    cache.store(ParameterResponsePair::new("sim", snap(11.0), &asv, &resp(11.0), PairOrigin::Live));
    cache.store(ParameterResponsePair::new("sim", snap(12.0), &asv, &resp(12.0), PairOrigin::Live));

    assert!(cache.lookup("sim", &snap(10.0)).is_some(), "restart-sourced entry must survive eviction");
  }
}
