use crate::core::allocation::allocate_by_employment_share;
use crate::core::matrix::{ConsumptionMatrix, EmploymentMatrix, KeyString, Labels};
use crate::core::reconciliation::convergence::{
    ConvergenceMonitor, Decision, IterationRecord, ResidualState,
};
use crate::core::reconciliation::{
    Diagnostic, ReconciliationConfig, ResolutionMethod, TerminationReason,
};
use crate::errors::{MissingInput, ReconciliationError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Sector {
    pub id: KeyString,
    /// Whether an independent regional total exists that this sector has to be fitted against.
    pub regionally_constrained: bool,
}

impl Sector {
    pub fn new(id: &str, regionally_constrained: bool) -> Self {
        Self {
            id: id.into(),
            regionally_constrained,
        }
    }
}

/// Shared flag a caller can set to abandon runs. Checked at the top of every iteration.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct ReconciliationOutcome {
    /// Constrained sectors, in the row order of `matrix`.
    pub sectors: Labels,
    pub regions: Labels,
    pub matrix: ConsumptionMatrix,
    /// Per row, whether the sector had no employees and so received nothing.
    pub zero_allocation: Vec<bool>,
    pub column_targets: Vec<f64>,
    pub converged: bool,
    pub iterations_used: usize,
    pub termination: TerminationReason,
    pub trace: Vec<IterationRecord>,
    pub final_residuals: ResidualState,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconciliationOutcome {
    pub fn final_residual(&self) -> f64 {
        self.final_residuals.combined()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReconciliationEngine {
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconciliationConfig) -> Result<Self, ReconciliationError> {
        if !(config.tolerance.is_finite() && config.tolerance > 0.) {
            return Err(ReconciliationError::invalid_parameter(
                "tolerance",
                format!("must be a positive number, got {}", config.tolerance),
            ));
        }
        if config.max_iterations < 1 {
            return Err(ReconciliationError::invalid_parameter(
                "max_iterations",
                "must be at least 1",
            ));
        }
        if !(config.epsilon.is_finite() && config.epsilon > 0.) {
            return Err(ReconciliationError::invalid_parameter(
                "epsilon",
                format!("must be a positive number, got {}", config.epsilon),
            ));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Fit the regionally constrained `sectors` so that each row sums to its national total and
    /// each region's column approaches its regional total.
    ///
    /// Columns follow the regions of `employment`. Sectors without a regional constraint are
    /// ignored here; see the materializer.
    pub fn reconcile(
        &self,
        sectors: &[Sector],
        national_totals: &IndexMap<KeyString, f64>,
        regional_totals: &IndexMap<KeyString, f64>,
        employment: &EmploymentMatrix,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let eligible = sectors
            .iter()
            .filter(|sector| sector.regionally_constrained)
            .collect::<Vec<_>>();
        let regions = employment.regions().clone();

        let mut row_targets = Vec::with_capacity(eligible.len());
        let mut employment_rows = Vec::with_capacity(eligible.len());
        for sector in &eligible {
            let target = *national_totals.get(sector.id.as_str()).ok_or_else(|| {
                ReconciliationError::MissingInput(MissingInput::NationalTotal(sector.id.to_string()))
            })?;
            check_total("national_totals", &sector.id, target)?;
            let position = employment.sectors().position(&sector.id).ok_or_else(|| {
                ReconciliationError::MissingInput(MissingInput::Employment(sector.id.to_string()))
            })?;
            row_targets.push(target);
            employment_rows.push(position);
        }

        let column_targets = regions
            .iter()
            .map(|region| {
                let target = *regional_totals.get(region).ok_or_else(|| {
                    ReconciliationError::MissingInput(MissingInput::RegionalTotal(region.to_string()))
                })?;
                check_total("regional_totals", region, target)?;
                Ok(target)
            })
            .collect::<Result<Vec<_>, ReconciliationError>>()?;

        let mut diagnostics = vec![];
        let mut matrix = ConsumptionMatrix::zeros(eligible.len(), regions.len());
        let mut priors = Vec::with_capacity(eligible.len());
        for (row, (sector, position)) in eligible.iter().zip(&employment_rows).enumerate() {
            let prior =
                allocate_by_employment_share(row_targets[row], &employment.sector_row(*position));
            match &prior {
                Some(allocation) => matrix.set_row(row, allocation),
                None => {
                    warn!(sector = %sector.id, "sector has no employees, nothing can be allocated");
                    diagnostics.push(Diagnostic::ZeroAllocation {
                        sector: sector.id.to_string(),
                        resolution_method: ResolutionMethod::Iterative,
                    });
                }
            }
            priors.push(prior);
        }
        let active_rows = priors.iter().map(Option::is_some).collect::<Vec<_>>();

        for (region, target) in column_targets.iter().enumerate() {
            // only rows with something to place can fill a region
            let reachable = employment_rows
                .iter()
                .zip(&active_rows)
                .zip(&row_targets)
                .any(|((position, active), row_target)| {
                    *active && *row_target > 0. && employment.count(*position, region) > 0.
                });
            if *target > 0. && !reachable {
                warn!(region = regions.label(region), target, "regional total cannot be reached");
                diagnostics.push(Diagnostic::UnreachableRegionalTarget {
                    region: regions.label(region).to_string(),
                    target: *target,
                });
            }
        }
        for (region, target) in regional_totals {
            if !regions.contains(region) && *target > 0. {
                warn!(region = %region, target, "regional total given for a region without employment data");
                diagnostics.push(Diagnostic::UnreachableRegionalTarget {
                    region: region.to_string(),
                    target: *target,
                });
            }
        }

        info!(
            sectors = eligible.len(),
            regions = regions.len(),
            tolerance = self.config.tolerance,
            max_iterations = self.config.max_iterations,
            "starting regional reconciliation"
        );

        let mut monitor = ConvergenceMonitor::new(
            self.config.tolerance,
            self.config.epsilon,
            self.config.stagnation_window,
        );
        let mut termination = TerminationReason::MaxIterationsReached;
        let mut iterations_used = 0;

        for iteration in 1..=self.config.max_iterations {
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                info!(iterations_used, "reconciliation cancelled");
                return Err(ReconciliationError::Cancelled {
                    iterations: iterations_used,
                });
            }

            // columns first so that every iteration ends on the authoritative row constraint
            let redistributed = scale_columns(&mut matrix, &column_targets);
            scale_rows(&mut matrix, &row_targets, &priors);
            iterations_used = iteration;

            let residuals = monitor.residuals(&matrix, &row_targets, &active_rows, &column_targets);
            debug!(
                iteration,
                row_residual = residuals.max_row(),
                column_residual = residuals.max_column(),
                redistributed,
                "reconciliation iteration"
            );
            if let Decision::Stop(reason) = monitor.observe(iteration, residuals, redistributed) {
                termination = reason;
                break;
            }
        }

        let converged = termination == TerminationReason::Converged;
        let final_residual = monitor.final_residual();
        if converged {
            info!(iterations_used, final_residual, "reconciliation converged");
        } else {
            warn!(
                iterations_used,
                final_residual,
                reason = %termination,
                "reconciliation did not converge"
            );
            diagnostics.push(Diagnostic::NonConvergence {
                iterations: iterations_used,
                residual: final_residual,
                reason: termination,
            });
        }

        let (trace, final_residuals) = monitor.into_parts();

        Ok(ReconciliationOutcome {
            sectors: eligible.iter().map(|sector| sector.id.as_str()).collect(),
            regions,
            matrix,
            zero_allocation: active_rows.iter().map(|active| !active).collect(),
            column_targets,
            converged,
            iterations_used,
            termination,
            trace,
            final_residuals,
            diagnostics,
        })
    }
}

/// Reconcile every sector present in `national_totals` against `regional_totals`, using default
/// settings other than the given tolerance and iteration cap.
pub fn reconcile(
    national_totals: &IndexMap<KeyString, f64>,
    regional_totals: &IndexMap<KeyString, f64>,
    employment: &EmploymentMatrix,
    tolerance: f64,
    max_iterations: usize,
) -> Result<ReconciliationOutcome, ReconciliationError> {
    let engine = ReconciliationEngine::new(ReconciliationConfig {
        tolerance,
        max_iterations,
        ..Default::default()
    })?;
    let sectors = national_totals
        .keys()
        .map(|id| Sector::new(id, true))
        .collect::<Vec<_>>();

    engine.reconcile(&sectors, national_totals, regional_totals, employment, None)
}

fn check_total(name: &'static str, id: &str, value: f64) -> Result<(), ReconciliationError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(ReconciliationError::invalid_parameter(
            name,
            format!("'{id}' must be finite and non-negative, got {value}"),
        ))
    }
}

/// Scale every region's column to its target. Columns with a zero target are emptied; the
/// amount removed is returned so it can be traced, and row scaling puts it back elsewhere.
fn scale_columns(matrix: &mut ConsumptionMatrix, targets: &[f64]) -> f64 {
    let mut removed = 0.;
    for (region, target) in targets.iter().enumerate() {
        let column_sum = matrix.column_sum(region);
        if column_sum <= 0. {
            continue;
        }
        if *target == 0. {
            removed += column_sum;
            matrix.scale_column(region, 0.);
        } else {
            matrix.scale_column(region, target / column_sum);
        }
    }

    removed
}

/// Scale every allocatable row back to its national total. A row emptied entirely by column
/// scaling is reset to its employee-share prior.
fn scale_rows(matrix: &mut ConsumptionMatrix, targets: &[f64], priors: &[Option<Vec<f64>>]) {
    for (sector, (target, prior)) in targets.iter().zip(priors).enumerate() {
        let Some(prior) = prior else {
            continue;
        };
        let row_sum = matrix.row_sum(sector);
        if row_sum > 0. {
            matrix.scale_row(sector, target / row_sum);
        } else if *target > 0. {
            matrix.set_row(sector, prior);
        }
    }
}
