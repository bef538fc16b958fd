#![allow(clippy::too_many_arguments)]

pub mod assembly;
pub mod batch;
pub mod cache;
pub mod core;
pub mod errors;
pub mod input;
pub mod output;
mod statistics;

#[macro_use]
extern crate is_close;

use crate::core::reconciliation::convergence::{IterationRecord, ResidualState};
use crate::core::reconciliation::engine::{CancellationToken, ReconciliationEngine};
use crate::core::reconciliation::materializer::{ConsumptionTable, ResultMaterializer};
use crate::core::reconciliation::{Diagnostic, TerminationReason};
use crate::errors::{DisaggError, OutputError};
use crate::input::{ingest_for_processing, ConfigOverrides, FuelType, RunInputs};
use crate::output::{write_consumption_table, write_diagnostics, Output};
use bitflags::bitflags;
pub use statistics::DeviationSummary;
use std::io::Read;
use tracing::{info, warn};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RunFlags: u8 {
        /// Treat a run that stops short of tolerance as a failure rather than a diagnostic.
        const REJECT_NON_CONVERGED = 0b001;
        /// Leave sectors without a regional constraint out of the table.
        const SKIP_DIRECT_SECTORS = 0b010;
        const WRITE_DIAGNOSTICS = 0b100;
    }
}

#[derive(Clone, Debug)]
pub struct RunResults {
    pub year: u16,
    pub fuel_type: FuelType,
    pub table: ConsumptionTable,
    pub converged: bool,
    pub iterations_used: usize,
    pub termination: TerminationReason,
    pub trace: Vec<IterationRecord>,
    pub final_residuals: ResidualState,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: DeviationSummary,
}

impl RunResults {
    pub fn final_residual(&self) -> f64 {
        self.trace
            .last()
            .map(IterationRecord::combined)
            .unwrap_or(f64::INFINITY)
    }

    /// Key under which this run's outputs are written, e.g. `2015_gas`.
    pub fn output_key(&self) -> String {
        format!("{}_{}", self.year, self.fuel_type)
    }
}

pub fn run_project(
    input: impl Read,
    output: impl Output,
    overrides: &ConfigOverrides,
    flags: RunFlags,
) -> Result<RunResults, DisaggError> {
    let mut input_for_processing = ingest_for_processing(input)?;
    input_for_processing.apply_overrides(overrides);

    let inputs = input_for_processing.finalize()?;

    let results = run_inputs(&inputs, flags, None)?;

    write_results(&output, &results, flags)?;

    Ok(results)
}

/// Reconcile finalized inputs and merge in the directly resolved sectors.
pub fn run_inputs(
    inputs: &RunInputs,
    flags: RunFlags,
    cancellation: Option<&CancellationToken>,
) -> Result<RunResults, DisaggError> {
    let engine = ReconciliationEngine::new(inputs.config)?;
    let outcome = engine.reconcile(
        &inputs.sectors,
        &inputs.national_totals,
        &inputs.regional_totals,
        &inputs.employment,
        cancellation,
    )?;

    if !outcome.converged && flags.contains(RunFlags::REJECT_NON_CONVERGED) {
        return Err(DisaggError::NotConverged {
            iterations: outcome.iterations_used,
            residual: outcome.final_residual(),
        });
    }

    let materializer =
        ResultMaterializer::new(&inputs.sectors, &inputs.national_totals, &inputs.employment);
    let (table, materialization_diagnostics) =
        materializer.materialize(&outcome, !flags.contains(RunFlags::SKIP_DIRECT_SECTORS))?;

    let diagnostics = inputs
        .diagnostics
        .iter()
        .chain(&outcome.diagnostics)
        .chain(&materialization_diagnostics)
        .cloned()
        .collect::<Vec<_>>();
    let summary = DeviationSummary::from_deviations(&outcome.final_residuals.columns);

    info!(
        year = inputs.year,
        fuel_type = %inputs.fuel_type,
        converged = outcome.converged,
        iterations = outcome.iterations_used,
        termination = %outcome.termination,
        max_column_deviation = summary.max_column_deviation,
        "run complete"
    );
    if !diagnostics.is_empty() {
        warn!(count = diagnostics.len(), "run raised diagnostics");
    }

    Ok(RunResults {
        year: inputs.year,
        fuel_type: inputs.fuel_type,
        table,
        converged: outcome.converged,
        iterations_used: outcome.iterations_used,
        termination: outcome.termination,
        trace: outcome.trace,
        final_residuals: outcome.final_residuals,
        diagnostics,
        summary,
    })
}

pub fn write_results(
    output: &impl Output,
    results: &RunResults,
    flags: RunFlags,
) -> Result<(), DisaggError> {
    if output.is_noop() {
        return Ok(());
    }

    write_result_files(output, results, flags)
        .map_err(|e| DisaggError::ErrorInOutput(OutputError::new(e)))
}

fn write_result_files(
    output: &impl Output,
    results: &RunResults,
    flags: RunFlags,
) -> Result<(), anyhow::Error> {
    let output_key = results.output_key();
    info!("writing out to {output_key}");

    write_consumption_table(
        output.writer_for_location_key(&format!("{output_key}_consumption.csv"))?,
        &results.table,
    )?;

    if flags.contains(RunFlags::WRITE_DIAGNOSTICS) {
        write_diagnostics(
            output.writer_for_location_key(&format!("{output_key}_diagnostics.json"))?,
            results,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests;
