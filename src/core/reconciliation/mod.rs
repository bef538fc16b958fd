//! Reconciliation of a sector×region consumption matrix against national sector totals and
//! regional totals by iterative proportional fitting.

pub mod convergence;
pub mod engine;
pub mod materializer;

use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use strum_macros::Display;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_STAGNATION_WINDOW: usize = 5;
/// One watt-hour, expressed in MWh.
pub const DEFAULT_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    #[serde(default = "default_tolerance")]
    #[validate(exclusive_minimum = 0.)]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    #[validate(minimum = 1)]
    pub max_iterations: usize,
    /// Number of consecutive non-improving iterations after which the run gives up. `None`
    /// disables the check so the run only stops at `max_iterations`.
    #[serde(default = "default_stagnation_window")]
    pub stagnation_window: Option<usize>,
    /// Floor substituted for zero targets when computing relative residuals.
    #[serde(default = "default_epsilon")]
    #[validate(exclusive_minimum = 0.)]
    pub epsilon: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_stagnation_window() -> Option<usize> {
    Some(DEFAULT_STAGNATION_WINDOW)
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stagnation_window: Some(DEFAULT_STAGNATION_WINDOW),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// How the consumption of a sector was placed onto regions.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResolutionMethod {
    /// Fitted against regional totals.
    Iterative,
    /// Employee share only.
    Direct,
}

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxIterationsReached,
    Stagnated,
}

/// Non-fatal conditions recorded against a run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The sector has no employees in any region so none of its national total could be placed.
    ZeroAllocation {
        sector: String,
        resolution_method: ResolutionMethod,
    },
    /// A region expects consumption from constrained sectors but none of them employ anyone there.
    UnreachableRegionalTarget { region: String, target: f64 },
    /// Subtracting the directly resolved sectors left a negative regional target.
    ClampedRegionalTarget { region: String, unclamped: f64 },
    NonConvergence {
        iterations: usize,
        residual: f64,
        reason: TerminationReason,
    },
}
