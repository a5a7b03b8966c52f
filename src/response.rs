//! The active-set request protocol and the [`Response`] type every
//! evaluation produces.

use typed_builder::TypedBuilder;

use crate::error::{DakotaError, DakotaResult};

/// Per-response-component request code. Bit 0 is value, bit 1 is
/// gradient, bit 2 is Hessian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsvRequest(u8);

impl AsvRequest {
  /// Builds a request code, validating it is in `0..=7`.
  pub fn new(code: u8) -> DakotaResult<Self> {
    if code > 7 {
      return Err(DakotaError::InputError(format!(
        "active-set request code {code} out of range 0..=7"
      )));
    }
    Ok(AsvRequest(code))
  }

  /// A request for the function value only.
  pub fn value_only() -> Self {
    AsvRequest(0b001)
  }

  /// A request for value and gradient.
  pub fn value_and_gradient() -> Self {
    AsvRequest(0b011)
  }

  /// A request for value, gradient, and Hessian.
  pub fn all() -> Self {
    AsvRequest(0b111)
  }

  /// The raw bitmask.
  pub fn code(&self) -> u8 {
    self.0
  }

  /// Whether the function value is requested.
  pub fn wants_value(&self) -> bool {
    self.0 & 0b001 != 0
  }

  /// Whether the gradient is requested.
  pub fn wants_gradient(&self) -> bool {
    self.0 & 0b010 != 0
  }

  /// Whether the Hessian is requested.
  pub fn wants_hessian(&self) -> bool {
    self.0 & 0b100 != 0
  }

  /// Whether `self`'s requested fields are a subset of `other`'s, i.e.
  /// `other` is a superset covering everything `self` asks for.
  pub fn is_subset_of(&self, other: &AsvRequest) -> bool {
    self.0 & other.0 == self.0
  }
}

/// One request code per response component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSet(Vec<AsvRequest>);

impl ActiveSet {
  /// Builds an active set from per-component request codes.
  pub fn new(requests: Vec<AsvRequest>) -> Self {
    ActiveSet(requests)
  }

  /// An active set requesting only function values for `n` components.
  pub fn values_only(n: usize) -> Self {
    ActiveSet(vec![AsvRequest::value_only(); n])
  }

  /// Number of response components this active set governs.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Whether there are no components.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// The per-component request codes.
  pub fn requests(&self) -> &[AsvRequest] {
    &self.0
  }

  /// Whether every component of `self` is covered by the corresponding
  /// component of `other` (used by the cache's superset-replace rule).
  pub fn is_subset_of(&self, other: &ActiveSet) -> bool {
    self.0.len() == other.0.len()
      && self.0.iter().zip(&other.0).all(|(a, b)| a.is_subset_of(b))
  }
}

/// The role a response component plays, used to partition `Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
  /// An objective function component.
  Objective,
  /// A nonlinear inequality constraint component.
  NonlinearInequality,
  /// A nonlinear equality constraint component.
  NonlinearEquality,
}

/// Function values, gradients, and Hessians for one evaluation, honoring
/// whatever [`ActiveSet`] was requested. Linear constraints are not stored
/// here — they live in the problem description and are evaluated on
/// demand from the coefficient matrix (see [`crate::constraint`]).
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Response {
  /// Number of design/state variables the gradients and Hessians are
  /// taken with respect to.
  num_vars: usize,
  /// Component kind, parallel to `values`.
  kinds: Vec<ComponentKind>,
  /// Function values, one per component, present where requested.
  #[builder(default)]
  values: Vec<Option<f64>>,
  /// Gradient rows (length `num_vars`), one per component, present where
  /// requested.
  #[builder(default)]
  gradients: Vec<Option<Vec<f64>>>,
  /// Hessian matrices, flattened row-major (`num_vars * num_vars`), one
  /// per component, present where requested.
  #[builder(default)]
  hessians: Vec<Option<Vec<f64>>>,
  /// Marks a component as failed (domain error or evaluation failure);
  /// the iterator decides how to react.
  #[builder(default)]
  failed: Vec<bool>,
}

impl Response {
  /// Creates an empty response shell for `kinds.len()` components over
  /// `num_vars` variables, with nothing populated yet.
  pub fn empty(kinds: Vec<ComponentKind>, num_vars: usize) -> Self {
    let n = kinds.len();
    Response {
      num_vars,
      kinds,
      values: vec![None; n],
      gradients: vec![None; n],
      hessians: vec![None; n],
      failed: vec![false; n],
    }
  }

  /// Number of response components.
  pub fn len(&self) -> usize {
    self.kinds.len()
  }

  /// Whether there are no components.
  pub fn is_empty(&self) -> bool {
    self.kinds.is_empty()
  }

  /// Component kinds, in order.
  pub fn kinds(&self) -> &[ComponentKind] {
    &self.kinds
  }

  /// Number of variables gradients/Hessians are taken with respect to.
  pub fn num_vars(&self) -> usize {
    self.num_vars
  }

  /// Indices of components of a given kind.
  pub fn indices_of(&self, kind: ComponentKind) -> impl Iterator<Item = usize> + '_ {
    self.kinds.iter().enumerate().filter(move |(_, k)| **k == kind).map(|(i, _)| i)
  }

  /// The function value of component `i`, if present.
  pub fn value(&self, i: usize) -> Option<f64> {
    self.values[i]
  }

  /// Sets the function value of component `i`.
  pub fn set_value(&mut self, i: usize, v: f64) {
    self.values[i] = Some(v);
  }

  /// The gradient row of component `i`, if present.
  pub fn gradient(&self, i: usize) -> Option<&[f64]> {
    self.gradients[i].as_deref()
  }

  /// Sets the gradient row of component `i`.
  pub fn set_gradient(&mut self, i: usize, g: Vec<f64>) {
    debug_assert_eq!(g.len(), self.num_vars, "gradient row length must equal num_vars");
    self.gradients[i] = Some(g);
  }

  /// The flattened Hessian of component `i`, if present.
  pub fn hessian(&self, i: usize) -> Option<&[f64]> {
    self.hessians[i].as_deref()
  }

  /// Sets the flattened Hessian of component `i`.
  pub fn set_hessian(&mut self, i: usize, h: Vec<f64>) {
    debug_assert_eq!(
      h.len(),
      self.num_vars * self.num_vars,
      "hessian must have num_vars^2 entries"
    );
    self.hessians[i] = Some(h);
  }

  /// Marks component `i` as failed.
  pub fn mark_failed(&mut self, i: usize) {
    self.failed[i] = true;
  }

  /// Whether component `i` is marked failed.
  pub fn is_failed(&self, i: usize) -> bool {
    self.failed[i]
  }

  /// Whether any component is marked failed.
  pub fn any_failed(&self) -> bool {
    self.failed.iter().any(|&f| f)
  }

  /// Checks that this response covers every field `active_set` requested:
  /// per §4.1, the evaluator must return a response with exactly the
  /// fields the active set requested set (extra fields, e.g. from a
  /// cached superset match, are fine — only missing fields are a
  /// violation).
  pub fn honors(&self, active_set: &ActiveSet) -> DakotaResult<()> {
    if active_set.len() != self.len() {
      return Err(DakotaError::InputError(format!(
        "active set has {} components, response has {}",
        active_set.len(),
        self.len()
      )));
    }
    let mut missing = Vec::new();
    for (i, req) in active_set.requests().iter().enumerate() {
      if self.failed[i] {
        continue;
      }
      if req.wants_value() && self.values[i].is_none() {
        missing.push(i);
        continue;
      }
      if req.wants_gradient() && self.gradients[i].is_none() {
        missing.push(i);
        continue;
      }
      if req.wants_hessian() && self.hessians[i].is_none() {
        missing.push(i);
      }
    }
    if missing.is_empty() {
      Ok(())
    } else {
      Err(DakotaError::PartialResponse { missing })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_asv_request_bits() {
    let r = AsvRequest::new(0b101).unwrap();
    assert!(r.wants_value());
    assert!(!r.wants_gradient());
    assert!(r.wants_hessian());
  }

  #[test]
  fn test_asv_request_out_of_range() {
    assert!(AsvRequest::new(8).is_err());
  }

  #[test]
  fn test_active_set_subset() {
    let small = ActiveSet::new(vec![AsvRequest::value_only()]);
    let big = ActiveSet::new(vec![AsvRequest::value_and_gradient()]);
    assert!(small.is_subset_of(&big));
    assert!(!big.is_subset_of(&small));
  }

  #[test]
  fn test_response_honors_active_set() {
    let asv = ActiveSet::new(vec![AsvRequest::value_and_gradient()]);
    let mut resp = Response::empty(vec![ComponentKind::Objective], 2);
    assert!(resp.honors(&asv).is_err());
    resp.set_value(0, 1.0);
    assert!(resp.honors(&asv).is_err());
    resp.set_gradient(0, vec![0.1, 0.2]);
    assert!(resp.honors(&asv).is_ok());
  }

  #[test]
  fn test_response_honors_ignores_failed_components() {
    let asv = ActiveSet::new(vec![AsvRequest::value_only()]);
    let mut resp = Response::empty(vec![ComponentKind::Objective], 1);
    resp.mark_failed(0);
    assert!(resp.honors(&asv).is_ok());
  }
}
