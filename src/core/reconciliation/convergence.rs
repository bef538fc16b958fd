use crate::core::matrix::ConsumptionMatrix;
use crate::core::reconciliation::TerminationReason;
use bounded_vec_deque::BoundedVecDeque;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// An iteration only counts as an improvement if it beats the previous combined residual by more
/// than this relative margin; otherwise floating point jitter would mask stagnation.
const IMPROVEMENT_RELATIVE_MARGIN: f64 = 1e-9;

/// Relative deviation of every row and column sum from its target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResidualState {
    pub rows: Vec<f64>,
    pub columns: Vec<f64>,
}

impl ResidualState {
    pub fn max_row(&self) -> f64 {
        self.rows.iter().copied().fold(0., f64::max)
    }

    pub fn max_column(&self) -> f64 {
        self.columns.iter().copied().fold(0., f64::max)
    }

    pub fn combined(&self) -> f64 {
        self.max_row().max(self.max_column())
    }
}

/// Summary of a single iteration, kept for diagnostics.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub row_residual: f64,
    pub column_residual: f64,
    /// Consumption removed from regions with a zero target, to be re-absorbed by row scaling.
    pub redistributed: f64,
}

impl IterationRecord {
    pub fn combined(&self) -> f64 {
        self.row_residual.max(self.column_residual)
    }
}

pub fn relative_residual(actual: f64, target: f64, epsilon: f64) -> f64 {
    (actual - target).abs() / target.max(epsilon)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(TerminationReason),
}

/// Tracks residuals across iterations of a reconciliation run and decides when to stop.
#[derive(Debug)]
pub struct ConvergenceMonitor {
    tolerance: f64,
    epsilon: f64,
    recent: Option<BoundedVecDeque<f64>>,
    trace: Vec<IterationRecord>,
    latest: ResidualState,
}

impl ConvergenceMonitor {
    pub fn new(tolerance: f64, epsilon: f64, stagnation_window: Option<usize>) -> Self {
        Self {
            tolerance,
            epsilon,
            // a window of n non-improving steps needs n + 1 residuals to compare
            recent: stagnation_window.map(|window| BoundedVecDeque::new(window.max(1) + 1)),
            trace: vec![],
            latest: Default::default(),
        }
    }

    /// Residuals of `matrix` against the targets. Rows whose `active` flag is false are reported as
    /// zero residual since nothing can be allocated to them.
    pub fn residuals(
        &self,
        matrix: &ConsumptionMatrix,
        row_targets: &[f64],
        active_rows: &[bool],
        column_targets: &[f64],
    ) -> ResidualState {
        let rows = row_targets
            .iter()
            .zip(active_rows)
            .enumerate()
            .map(|(sector, (target, active))| {
                if *active {
                    relative_residual(matrix.row_sum(sector), *target, self.epsilon)
                } else {
                    0.
                }
            })
            .collect();
        let columns = column_targets
            .iter()
            .enumerate()
            .map(|(region, target)| {
                relative_residual(matrix.column_sum(region), *target, self.epsilon)
            })
            .collect();

        ResidualState { rows, columns }
    }

    /// Record the residuals reached at the end of an iteration and decide whether to carry on.
    pub fn observe(
        &mut self,
        iteration: usize,
        residuals: ResidualState,
        redistributed: f64,
    ) -> Decision {
        let record = IterationRecord {
            iteration,
            row_residual: residuals.max_row(),
            column_residual: residuals.max_column(),
            redistributed,
        };
        self.trace.push(record);
        self.latest = residuals;

        if record.row_residual < self.tolerance && record.column_residual < self.tolerance {
            return Decision::Stop(TerminationReason::Converged);
        }

        if let Some(recent) = self.recent.as_mut() {
            recent.push_back(record.combined());
            if recent.is_full() && !improved_within(recent) {
                return Decision::Stop(TerminationReason::Stagnated);
            }
        }

        Decision::Continue
    }

    pub fn trace(&self) -> &[IterationRecord] {
        &self.trace
    }

    pub fn latest(&self) -> &ResidualState {
        &self.latest
    }

    pub fn final_residual(&self) -> f64 {
        self.trace
            .last()
            .map(IterationRecord::combined)
            .unwrap_or(f64::INFINITY)
    }

    pub fn into_parts(self) -> (Vec<IterationRecord>, ResidualState) {
        (self.trace, self.latest)
    }
}

fn improved_within(recent: &BoundedVecDeque<f64>) -> bool {
    recent
        .iter()
        .tuple_windows()
        .any(|(previous, next)| *next < previous * (1. - IMPROVEMENT_RELATIVE_MARGIN))
}
