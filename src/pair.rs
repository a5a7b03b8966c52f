//! [`ParameterResponsePair`]: the atomic cached record of one evaluation.

use serde::{Deserialize, Serialize};

use crate::response::{ActiveSet, ComponentKind, Response};
use crate::variables::Value;

/// An immutable snapshot of a [`crate::variables::VariableSpace`]'s current
/// values, in variable-insertion order. Used as the cache key's variable
/// component and as the persisted representation in the restart log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariablesSnapshot(Vec<SnapshotValue>);

// `serde` cannot derive through the crate's hand-rolled `Value` hashing
// impls directly, so the snapshot is stored as a small serializable mirror
// type and converted at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum SnapshotValue {
  Real(u64),
  Integer(i64),
  Categorical(String),
}

impl From<&Value> for SnapshotValue {
  fn from(v: &Value) -> Self {
    match v {
      Value::Real(x) => SnapshotValue::Real(x.to_bits()),
      Value::Integer(x) => SnapshotValue::Integer(*x),
      Value::Categorical(s) => SnapshotValue::Categorical(s.clone()),
    }
  }
}

impl From<&SnapshotValue> for Value {
  fn from(v: &SnapshotValue) -> Self {
    match v {
      SnapshotValue::Real(bits) => Value::Real(f64::from_bits(*bits)),
      SnapshotValue::Integer(x) => Value::Integer(*x),
      SnapshotValue::Categorical(s) => Value::Categorical(s.clone()),
    }
  }
}

impl VariablesSnapshot {
  /// Builds a snapshot from an ordered slice of current variable values.
  pub fn from_values(values: &[Value]) -> Self {
    VariablesSnapshot(values.iter().map(SnapshotValue::from).collect())
  }

  /// The snapshotted values, in order.
  pub fn values(&self) -> Vec<Value> {
    self.0.iter().map(Value::from).collect()
  }
}

/// Component kinds as a serializable mirror, stored alongside a pair so
/// the restart log can reconstruct a full [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
enum SnapshotKind {
  Objective,
  NonlinearInequality,
  NonlinearEquality,
}

impl From<ComponentKind> for SnapshotKind {
  fn from(k: ComponentKind) -> Self {
    match k {
      ComponentKind::Objective => SnapshotKind::Objective,
      ComponentKind::NonlinearInequality => SnapshotKind::NonlinearInequality,
      ComponentKind::NonlinearEquality => SnapshotKind::NonlinearEquality,
    }
  }
}

impl From<&SnapshotKind> for ComponentKind {
  fn from(k: &SnapshotKind) -> Self {
    match k {
      SnapshotKind::Objective => ComponentKind::Objective,
      SnapshotKind::NonlinearInequality => ComponentKind::NonlinearInequality,
      SnapshotKind::NonlinearEquality => ComponentKind::NonlinearEquality,
    }
  }
}

/// A serializable mirror of [`Response`], used for restart persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  num_vars: usize,
  kinds: Vec<SnapshotKind>,
  values: Vec<Option<f64>>,
  gradients: Vec<Option<Vec<f64>>>,
  hessians: Vec<Option<Vec<f64>>>,
  failed: Vec<bool>,
}

impl From<&Response> for ResponseSnapshot {
  fn from(r: &Response) -> Self {
    let kinds: Vec<SnapshotKind> = r.kinds().iter().map(|&k| k.into()).collect();
    ResponseSnapshot {
      num_vars: r.num_vars(),
      kinds,
      values: (0..r.len()).map(|i| r.value(i)).collect(),
      gradients: (0..r.len()).map(|i| r.gradient(i).map(|g| g.to_vec())).collect(),
      hessians: (0..r.len()).map(|i| r.hessian(i).map(|h| h.to_vec())).collect(),
      failed: (0..r.len()).map(|i| r.is_failed(i)).collect(),
    }
  }
}

impl ResponseSnapshot {
  /// Reconstructs a full [`Response`] from the snapshot.
  pub fn to_response(&self) -> Response {
    let kinds: Vec<ComponentKind> = self.kinds.iter().map(ComponentKind::from).collect();
    let mut resp = Response::empty(kinds, self.num_vars);
    for i in 0..self.values.len() {
      if let Some(v) = self.values[i] {
        resp.set_value(i, v);
      }
      if let Some(g) = &self.gradients[i] {
        resp.set_gradient(i, g.clone());
      }
      if let Some(h) = &self.hessians[i] {
        resp.set_hessian(i, h.clone());
      }
      if self.failed[i] {
        resp.mark_failed(i);
      }
    }
    resp
  }
}

/// Marks whether a pair was produced by the live evaluator this run, or
/// seeded from a restart log at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairOrigin {
  /// Produced by a live evaluation during this process.
  Live,
  /// Read back from the restart log at startup.
  RestartSourced,
}

/// The immutable `(interface-id, variables, response)` tuple that is the
/// cache's and restart log's atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterResponsePair {
  interface_id: String,
  variables: VariablesSnapshot,
  active_set: Vec<u8>,
  response: ResponseSnapshot,
  origin: PairOrigin,
}

impl ParameterResponsePair {
  /// Constructs a new pair, as done by `Model` when an evaluation
  /// completes.
  pub fn new(
    interface_id: impl Into<String>,
    variables: VariablesSnapshot,
    active_set: &ActiveSet,
    response: &Response,
    origin: PairOrigin,
  ) -> Self {
    ParameterResponsePair {
      interface_id: interface_id.into(),
      variables,
      active_set: active_set.requests().iter().map(|r| r.code()).collect(),
      response: ResponseSnapshot::from(response),
      origin,
    }
  }

  /// The interface this pair was evaluated against.
  pub fn interface_id(&self) -> &str {
    &self.interface_id
  }

  /// The variables snapshot this pair was evaluated at.
  pub fn variables(&self) -> &VariablesSnapshot {
    &self.variables
  }

  /// The active set that was honored when this pair was produced.
  pub fn active_set(&self) -> ActiveSet {
    use crate::response::AsvRequest;
    ActiveSet::new(self.active_set.iter().map(|&c| AsvRequest::new(c).expect("valid stored code")).collect())
  }

  /// The response computed for this pair.
  pub fn response(&self) -> Response {
    self.response.to_response()
  }

  /// Whether this pair came from the live evaluator or was seeded from
  /// the restart log.
  pub fn origin(&self) -> PairOrigin {
    self.origin
  }
}
