//! Declarative problem description: `ProblemDescription`, loaded from TOML,
//! and the tagged `MethodConfig` record replacing DAKOTA's dotted-string
//! parameter database (see DESIGN.md's Design Notes resolution).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::DakotaResult;
use crate::ga::selection::ReplacementStrategy;
use crate::model::{FdMethod, FdPolicy, FdStep};
use crate::response::ComponentKind;
use crate::variables::{Bounds, Distribution, Role, Value, Variable, VariableKind, VariableSpace};

/// Top-level problem description: the file a user hands to the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemDescription {
  /// Variable declarations, by category.
  pub variables: VariablesConfig,
  /// Response component counts and optional finite-difference policy.
  pub responses: ResponsesConfig,
  /// The iterative method to run and its options.
  pub method: MethodConfig,
}

/// Variable declarations, one section per category DAKOTA distinguishes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariablesConfig {
  /// Continuous design variables, subject to optimization.
  #[serde(default)]
  pub continuous_design: Vec<ContinuousVarConfig>,
  /// Discrete integer design variables with an explicit value set.
  #[serde(default)]
  pub discrete_design_integer: Vec<DiscreteIntegerVarConfig>,
  /// Continuous aleatory-uncertain variables with a named distribution.
  #[serde(default)]
  pub continuous_aleatory_uncertain: Vec<UncertainVarConfig>,
  /// Continuous state variables, fixed during the method's iteration.
  #[serde(default)]
  pub continuous_state: Vec<ContinuousVarConfig>,
}

/// A bounded continuous variable declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinuousVarConfig {
  /// Variable name.
  pub name: String,
  /// Initial value.
  pub initial: f64,
  /// Lower bound.
  pub lower: f64,
  /// Upper bound.
  pub upper: f64,
}

/// A discrete integer variable declaration with an explicit value set.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscreteIntegerVarConfig {
  /// Variable name.
  pub name: String,
  /// Initial value.
  pub initial: i64,
  /// The admissible discrete values.
  pub set: Vec<i64>,
}

/// A continuous uncertain variable declaration with a named distribution.
#[derive(Debug, Clone, Deserialize)]
pub struct UncertainVarConfig {
  /// Variable name.
  pub name: String,
  /// Initial (e.g. mean) value used to seed the method.
  pub initial: f64,
  /// The distribution descriptor.
  pub distribution: Distribution,
}

/// Response component counts and the finite-difference policy applied to
/// whichever of them the interface does not supply analytic gradients for.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesConfig {
  /// Number of objective function components.
  pub num_objectives: usize,
  /// Number of nonlinear inequality constraint components.
  #[serde(default)]
  pub num_nonlinear_inequality: usize,
  /// Number of nonlinear equality constraint components.
  #[serde(default)]
  pub num_nonlinear_equality: usize,
  /// Optional finite-difference policy; absent means gradients must come
  /// from the interface analytically.
  #[serde(default)]
  pub finite_difference: Option<FiniteDifferenceConfig>,
}

/// On-disk mirror of [`FdPolicy`].
#[derive(Debug, Clone, Deserialize)]
pub struct FiniteDifferenceConfig {
  /// `"forward"`, `"central"`, or `"backward"`.
  pub method: FdMethodConfig,
  /// `"relative"` step, a fraction of `max(|x|, 1)`.
  #[serde(default)]
  pub relative_step: Option<f64>,
  /// `"absolute"` step, independent of the variable's value.
  #[serde(default)]
  pub absolute_step: Option<f64>,
}

/// On-disk mirror of [`FdMethod`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FdMethodConfig {
  /// See [`FdMethod::Forward`].
  Forward,
  /// See [`FdMethod::Central`].
  Central,
  /// See [`FdMethod::Backward`].
  Backward,
}

impl FiniteDifferenceConfig {
  /// Converts to the runtime [`FdPolicy`], preferring a relative step when
  /// both are given.
  pub fn to_policy(&self) -> FdPolicy {
    let step = match (self.relative_step, self.absolute_step) {
      (Some(r), _) => FdStep::Relative(r),
      (None, Some(a)) => FdStep::Absolute(a),
      (None, None) => FdStep::Relative(1e-6),
    };
    let method = match self.method {
      FdMethodConfig::Forward => FdMethod::Forward,
      FdMethodConfig::Central => FdMethod::Central,
      FdMethodConfig::Backward => FdMethod::Backward,
    };
    FdPolicy { method, step }
  }
}

/// The iterative method to run. A tagged enum, one variant per algorithm
/// family, in place of DAKOTA's untyped dotted-string parameter database —
/// each variant still carries a `custom` passthrough map so
/// operator-defined parameters the typed fields don't name are not lost.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MethodConfig {
  /// The JEGA multi-objective genetic algorithm.
  Jega(JegaConfig),
}

/// Options for the JEGA genetic algorithm method.
#[derive(Debug, Clone, Deserialize)]
pub struct JegaConfig {
  /// Population size maintained each generation.
  pub population_size: usize,
  /// Maximum number of generations to run before stopping regardless of
  /// convergence.
  pub max_generations: usize,
  /// RNG seed; `0` means "seed from entropy" (see §5 of the expanded
  /// spec).
  #[serde(default)]
  pub seed: u64,
  /// Replacement/selection strategy name.
  #[serde(default = "default_replacement")]
  pub replacement: ReplacementStrategy,
  /// Elite/retain count `replacement` reads each generation (the
  /// `keep_num` of spec §4.11) — distinct from `population_size`, the
  /// total size of the next generation. Defaults to half
  /// `population_size` (at least 1) when unset; see
  /// [`JegaConfig::resolve_elite_count`].
  #[serde(default)]
  pub elite_count: Option<usize>,
  /// Convergence stall-generation threshold.
  #[serde(default = "default_stall_generations")]
  pub stall_generations: usize,
  /// Convergence metric tolerance (applied to expansion, density, depth
  /// alike).
  #[serde(default = "default_convergence_tolerance")]
  pub convergence_tolerance: f64,
  /// Operator-defined parameters not named by the fields above.
  #[serde(default)]
  pub custom: HashMap<String, toml::Value>,
}

fn default_replacement() -> ReplacementStrategy {
  ReplacementStrategy::Elitist
}

fn default_stall_generations() -> usize {
  10
}

fn default_convergence_tolerance() -> f64 {
  1e-4
}

impl JegaConfig {
  /// The elite/retain count `replacement` strategies key off each
  /// generation: the configured `elite_count`, or half `population_size`
  /// (at least 1) when not configured, clamped to `population_size`.
  pub fn resolve_elite_count(&self) -> usize {
    self.elite_count.unwrap_or_else(|| (self.population_size / 2).max(1)).min(self.population_size)
  }
}

impl ProblemDescription {
  /// Parses a problem description from a TOML string.
  pub fn from_toml_str(s: &str) -> DakotaResult<Self> {
    Ok(toml::from_str(s)?)
  }

  /// Parses a problem description from a TOML file on disk.
  pub fn from_toml_file(path: impl AsRef<Path>) -> DakotaResult<Self> {
    let s = std::fs::read_to_string(path)?;
    Self::from_toml_str(&s)
  }

  /// Builds the runtime `VariableSpace` from the declared categories, in
  /// the fixed category order the engine expects: continuous design,
  /// discrete integer design, continuous aleatory-uncertain, continuous
  /// state.
  pub fn build_variable_space(&self) -> DakotaResult<VariableSpace> {
    let mut vars = Vec::new();

    for v in &self.variables.continuous_design {
      vars.push(Variable::new(
        &v.name,
        VariableKind::Real,
        Role::Design,
        Value::Real(v.initial),
        Some(Bounds::finite(v.lower, v.upper)),
        None,
        None,
      )?);
    }
    for v in &self.variables.discrete_design_integer {
      vars.push(Variable::new(
        &v.name,
        VariableKind::Integer,
        Role::Design,
        Value::Integer(v.initial),
        None,
        Some(v.set.iter().map(|&i| Value::Integer(i)).collect()),
        None,
      )?);
    }
    for v in &self.variables.continuous_aleatory_uncertain {
      vars.push(Variable::new(
        &v.name,
        VariableKind::Real,
        Role::AleatoryUncertain,
        Value::Real(v.initial),
        None,
        None,
        Some(v.distribution.clone()),
      )?);
    }
    for v in &self.variables.continuous_state {
      vars.push(Variable::new(
        &v.name,
        VariableKind::Real,
        Role::State,
        Value::Real(v.initial),
        Some(Bounds::finite(v.lower, v.upper)),
        None,
        None,
      )?);
    }

    VariableSpace::new(vars)
  }

  /// The response component kinds, in the fixed order objectives, then
  /// nonlinear inequalities, then nonlinear equalities.
  pub fn response_kinds(&self) -> Vec<ComponentKind> {
    let mut kinds = Vec::new();
    kinds.extend(std::iter::repeat(ComponentKind::Objective).take(self.responses.num_objectives));
    kinds.extend(
      std::iter::repeat(ComponentKind::NonlinearInequality).take(self.responses.num_nonlinear_inequality),
    );
    kinds.extend(
      std::iter::repeat(ComponentKind::NonlinearEquality).take(self.responses.num_nonlinear_equality),
    );
    kinds
  }

  /// Resolves the RNG seed configured in `method`, overridden by the
  /// `RANDOM_SEED` environment variable when it parses to a nonzero `u64`.
  pub fn resolve_seed(&self) -> u64 {
    let MethodConfig::Jega(jega) = &self.method;
    resolve_seed_with_env(jega.seed, std::env::var("RANDOM_SEED").ok())
  }
}

fn resolve_seed_with_env(configured: u64, env_value: Option<String>) -> u64 {
  match env_value.and_then(|s| s.parse::<u64>().ok()) {
    Some(seed) if seed != 0 => seed,
    _ => configured,
  }
}
