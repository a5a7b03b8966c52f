//! Typed multi-category variable schema: [`Variable`] and [`VariableSpace`].
//!
//! The original DAKOTA `DesignVariableTypeBase`/`DesignVariableNatureBase`
//! pair wires each variable to a `Type` object holding a `Nature` object
//! holding a back-reference to the `Type`. There is no need for that cycle
//! here: every per-kind operation dispatches on a plain tag, so a flat
//! record with a kind field is enough.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::Deserialize;

use crate::error::{DakotaError, DakotaResult};

/// The three variable value types DAKOTA distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
  /// Continuous real-valued variable.
  Real,
  /// Discrete integer-valued variable.
  Integer,
  /// Discrete categorical (string-labeled) variable.
  CategoricalString,
}

/// The four roles a variable may play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
  /// Subject to the optimizer/UQ method's control.
  Design,
  /// Random input with an aleatory (irreducible) distribution.
  AleatoryUncertain,
  /// Random input with an epistemic (reducible) distribution.
  EpistemicUncertain,
  /// Fixed at evaluation time, not iterated over by the method.
  State,
}

/// A variable bound, finite or explicitly infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
  /// A finite bound value.
  Finite(f64),
  /// No lower limit.
  NegInfinity,
  /// No upper limit.
  PosInfinity,
}

impl Bound {
  /// Returns the numeric value, using IEEE infinities for unbounded ends.
  pub fn as_f64(&self) -> f64 {
    match self {
      Bound::Finite(v) => *v,
      Bound::NegInfinity => f64::NEG_INFINITY,
      Bound::PosInfinity => f64::INFINITY,
    }
  }
}

/// A lower/upper bound pair on a continuous or integer variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
  /// Lower bound, inclusive.
  pub lower: Bound,
  /// Upper bound, inclusive.
  pub upper: Bound,
}

impl Bounds {
  /// Convenience constructor for a finite `[lower, upper]` interval.
  pub fn finite(lower: f64, upper: f64) -> Self {
    Bounds { lower: Bound::Finite(lower), upper: Bound::Finite(upper) }
  }

  /// Whether `value` lies within the bounds.
  pub fn contains(&self, value: f64) -> bool {
    value >= self.lower.as_f64() && value <= self.upper.as_f64()
  }
}

/// A scalar value of one of DAKOTA's variable kinds.
///
/// `PartialEq`/`Eq`/`Hash` compare real values bit-exactly (via
/// `f64::to_bits`) rather than by numeric equality: the evaluation cache's
/// duplicate-detection keys on exact bit patterns, since it only matters
/// when an algorithm literally re-asks the same point (restart replay,
/// finite-difference recentering).
#[derive(Debug, Clone)]
pub enum Value {
  /// A continuous real value.
  Real(f64),
  /// A discrete integer value.
  Integer(i64),
  /// A discrete categorical label.
  Categorical(String),
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
      (Value::Integer(a), Value::Integer(b)) => a == b,
      (Value::Categorical(a), Value::Categorical(b)) => a == b,
      _ => false,
    }
  }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    match self {
      Value::Real(v) => {
        0u8.hash(state);
        v.to_bits().hash(state);
      }
      Value::Integer(v) => {
        1u8.hash(state);
        v.hash(state);
      }
      Value::Categorical(v) => {
        2u8.hash(state);
        v.hash(state);
      }
    }
  }
}

impl Value {
  /// Returns the kind this value belongs to.
  pub fn kind(&self) -> VariableKind {
    match self {
      Value::Real(_) => VariableKind::Real,
      Value::Integer(_) => VariableKind::Integer,
      Value::Categorical(_) => VariableKind::CategoricalString,
    }
  }

  /// Returns the value as `f64`, for variables where that is meaningful
  /// (real and integer). Returns `None` for categorical values.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Real(v) => Some(*v),
      Value::Integer(v) => Some(*v as f64),
      Value::Categorical(_) => None,
    }
  }
}

/// Parameters of a named probability distribution, one variant per kind
/// DAKOTA supports for aleatory/epistemic variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Distribution {
  /// Normal (Gaussian) distribution.
  Normal { mean: f64, std_dev: f64 },
  /// Lognormal distribution.
  Lognormal { mean: f64, std_dev: f64 },
  /// Continuous uniform distribution.
  Uniform { lower: f64, upper: f64 },
  /// Log-uniform distribution.
  LogUniform { lower: f64, upper: f64 },
  /// Triangular distribution.
  Triangular { mode: f64, lower: f64, upper: f64 },
  /// Exponential distribution.
  Exponential { beta: f64 },
  /// Beta distribution.
  Beta { alpha: f64, beta: f64, lower: f64, upper: f64 },
  /// Gamma distribution.
  Gamma { alpha: f64, beta: f64 },
  /// Weibull distribution.
  Weibull { alpha: f64, beta: f64 },
  /// Gumbel (type I extreme value) distribution.
  Gumbel { alpha: f64, beta: f64 },
  /// Frechet (type II extreme value) distribution.
  Frechet { alpha: f64, beta: f64 },
  /// Histogram defined over bins: `(bin_lower_bound, count)` pairs.
  HistogramBin { bins: Vec<(f64, f64)> },
  /// Histogram defined over discrete points: `(value, count)` pairs.
  HistogramPoint { points: Vec<(f64, f64)> },
  /// Poisson distribution.
  Poisson { lambda: f64 },
  /// Binomial distribution.
  Binomial { num_trials: u64, prob_per_trial: f64 },
  /// Negative binomial distribution.
  NegativeBinomial { num_trials: u64, prob_per_trial: f64 },
  /// Geometric distribution.
  Geometric { prob_per_trial: f64 },
  /// Hypergeometric distribution.
  Hypergeometric { total_population: u64, num_successes: u64, num_drawn: u64 },
}

/// A single named variable belonging to exactly one `(kind, role)` category.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
  name: String,
  kind: VariableKind,
  role: Role,
  bounds: Option<Bounds>,
  discrete_set: Option<Vec<Value>>,
  distribution: Option<Distribution>,
  value: Value,
}

impl Variable {
  /// Constructs a variable, validating the invariants from the data model:
  /// the value's kind must match `kind`, bounds (if any) must contain the
  /// value, and a discrete-set value (if any) must be in the set.
  pub fn new(
    name: impl Into<String>,
    kind: VariableKind,
    role: Role,
    value: Value,
    bounds: Option<Bounds>,
    discrete_set: Option<Vec<Value>>,
    distribution: Option<Distribution>,
  ) -> DakotaResult<Self> {
    if value.kind() != kind {
      return Err(DakotaError::InputError(format!(
        "variable value kind does not match declared kind for {}",
        name.into()
      )));
    }
    if let (Some(b), Some(v)) = (&bounds, value.as_f64()) {
      if !b.contains(v) {
        return Err(DakotaError::InputError(format!(
          "initial value out of bounds for variable"
        )));
      }
    }
    if let Some(set) = &discrete_set {
      if !set.contains(&value) {
        return Err(DakotaError::InputError(format!(
          "initial value not a member of the discrete set for variable"
        )));
      }
    }
    Ok(Variable { name: name.into(), kind, role, bounds, discrete_set, distribution, value })
  }

  /// The variable's name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The variable's kind.
  pub fn kind(&self) -> VariableKind {
    self.kind
  }

  /// The variable's role.
  pub fn role(&self) -> Role {
    self.role
  }

  /// The variable's bounds, if any.
  pub fn bounds(&self) -> Option<&Bounds> {
    self.bounds.as_ref()
  }

  /// The variable's discrete value set, if any.
  pub fn discrete_set(&self) -> Option<&[Value]> {
    self.discrete_set.as_deref()
  }

  /// The variable's distribution descriptor, if any.
  pub fn distribution(&self) -> Option<&Distribution> {
    self.distribution.as_ref()
  }

  /// The variable's current value.
  pub fn value(&self) -> &Value {
    &self.value
  }

  /// Replaces the current value, re-checking bounds and discrete-set
  /// membership.
  pub fn set_value(&mut self, value: Value) -> DakotaResult<()> {
    if value.kind() != self.kind {
      return Err(DakotaError::InputError(format!(
        "cannot assign a {:?} value to variable {} of kind {:?}",
        value.kind(),
        self.name,
        self.kind
      )));
    }
    if let (Some(b), Some(v)) = (&self.bounds, value.as_f64()) {
      if !b.contains(v) {
        return Err(DakotaError::InputError(format!(
          "value out of bounds for variable {}",
          self.name
        )));
      }
    }
    if let Some(set) = &self.discrete_set {
      if !set.contains(&value) {
        return Err(DakotaError::InputError(format!(
          "value not a member of the discrete set for variable {}",
          self.name
        )));
      }
    }
    self.value = value;
    Ok(())
  }
}

/// Insertion-ordered sequence of [`Variable`]s, partitioned into contiguous
/// spans by `(kind, role)`, with a stable flattened continuous-only view.
#[derive(Debug, Clone)]
pub struct VariableSpace {
  variables: Vec<Variable>,
  spans: BTreeMap<(VariableKind, Role), Range<usize>>,
  continuous_indices: Vec<usize>,
}

impl VariableSpace {
  /// Builds a `VariableSpace` from a sequence of variables. The sequence
  /// must already be grouped contiguously by `(kind, role)` — i.e. once a
  /// `(kind, role)` group ends it must not recur later in the sequence.
  /// This mirrors the memory layout DAKOTA's variable containers assume.
  pub fn new(variables: Vec<Variable>) -> DakotaResult<Self> {
    let mut spans: BTreeMap<(VariableKind, Role), Range<usize>> = BTreeMap::new();
    let mut seen_keys: Vec<(VariableKind, Role)> = Vec::new();
    let mut current_key: Option<(VariableKind, Role)> = None;
    let mut span_start = 0usize;

    for (idx, var) in variables.iter().enumerate() {
      let key = (var.kind, var.role);
      if current_key != Some(key) {
        if let Some(prev_key) = current_key {
          spans.insert(prev_key, span_start..idx);
        }
        if seen_keys.contains(&key) {
          return Err(DakotaError::InputError(format!(
            "variables of kind {:?} / role {:?} are not contiguous",
            key.0, key.1
          )));
        }
        seen_keys.push(key);
        current_key = Some(key);
        span_start = idx;
      }
    }
    if let Some(prev_key) = current_key {
      spans.insert(prev_key, span_start..variables.len());
    }

    let continuous_indices = variables
      .iter()
      .enumerate()
      .filter(|(_, v)| v.kind == VariableKind::Real)
      .map(|(i, _)| i)
      .collect();

    Ok(VariableSpace { variables, spans, continuous_indices })
  }

  /// Total number of variables across all categories.
  pub fn len(&self) -> usize {
    self.variables.len()
  }

  /// Whether the space is empty.
  pub fn is_empty(&self) -> bool {
    self.variables.is_empty()
  }

  /// All variables in insertion order.
  pub fn variables(&self) -> &[Variable] {
    &self.variables
  }

  /// The contiguous index range for a `(kind, role)` category, if present.
  pub fn span(&self, kind: VariableKind, role: Role) -> Option<Range<usize>> {
    self.spans.get(&(kind, role)).cloned()
  }

  /// The flattened continuous-only view: indices (into `variables()`) of
  /// every real-valued variable, in insertion order. Stable across
  /// evaluations since it is computed once at construction.
  pub fn continuous_indices(&self) -> &[usize] {
    &self.continuous_indices
  }

  /// The current values of the flattened continuous view.
  pub fn continuous_values(&self) -> Vec<f64> {
    self
      .continuous_indices
      .iter()
      .map(|&i| self.variables[i].value().as_f64().expect("continuous view index is real"))
      .collect()
  }

  /// Replaces the current values of the flattened continuous view, in
  /// order. Returns an error if `values.len()` does not match.
  pub fn set_continuous_values(&mut self, values: &[f64]) -> DakotaResult<()> {
    if values.len() != self.continuous_indices.len() {
      return Err(DakotaError::InputError(format!(
        "expected {} continuous values, got {}",
        self.continuous_indices.len(),
        values.len()
      )));
    }
    for (&idx, &v) in self.continuous_indices.iter().zip(values) {
      self.variables[idx].set_value(Value::Real(v))?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn real(name: &str, role: Role, value: f64, bounds: Bounds) -> Variable {
    Variable::new(name, VariableKind::Real, role, Value::Real(value), Some(bounds), None, None)
      .unwrap()
  }

  #[test]
  fn test_variable_space_total_count() {
    let vars = vec![
      real("x1", Role::Design, 0.5, Bounds::finite(0.0, 1.0)),
      real("x2", Role::Design, 0.5, Bounds::finite(0.0, 1.0)),
      real("s1", Role::State, 1.0, Bounds::finite(0.0, 2.0)),
    ];
    let space = VariableSpace::new(vars).unwrap();
    assert_eq!(space.len(), 3);
    assert_eq!(space.span(VariableKind::Real, Role::Design), Some(0..2));
    assert_eq!(space.span(VariableKind::Real, Role::State), Some(2..3));
  }

  #[test]
  fn test_flattened_continuous_view_stable() {
    let vars = vec![
      real("x1", Role::Design, 0.1, Bounds::finite(0.0, 1.0)),
      real("x2", Role::Design, 0.2, Bounds::finite(0.0, 1.0)),
    ];
    let mut space = VariableSpace::new(vars).unwrap();
    let before = space.continuous_indices().to_vec();
    space.set_continuous_values(&[0.9, 0.8]).unwrap();
    let after = space.continuous_indices().to_vec();
    assert_eq!(before, after);
    assert_eq!(space.continuous_values(), vec![0.9, 0.8]);
  }

  #[test]
  fn test_non_contiguous_categories_rejected() {
    let vars = vec![
      real("x1", Role::Design, 0.5, Bounds::finite(0.0, 1.0)),
      real("s1", Role::State, 0.5, Bounds::finite(0.0, 1.0)),
      real("x2", Role::Design, 0.5, Bounds::finite(0.0, 1.0)),
    ];
    assert!(VariableSpace::new(vars).is_err());
  }

  #[test]
  fn test_bounds_violation_rejected() {
    let err = Variable::new(
      "x",
      VariableKind::Real,
      Role::Design,
      Value::Real(5.0),
      Some(Bounds::finite(0.0, 1.0)),
      None,
      None,
    );
    assert!(err.is_err());
  }

  #[test]
  fn test_discrete_set_membership() {
    let set = vec![Value::Integer(1), Value::Integer(3), Value::Integer(5)];
    let ok = Variable::new(
      "n",
      VariableKind::Integer,
      Role::Design,
      Value::Integer(3),
      None,
      Some(set.clone()),
      None,
    );
    assert!(ok.is_ok());

    let bad =
      Variable::new("n", VariableKind::Integer, Role::Design, Value::Integer(4), None, Some(set), None);
    assert!(bad.is_err());
  }
}
