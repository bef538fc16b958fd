//! Running many independent year/fuel reconciliations concurrently.

use crate::assembly::{InputAssembler, StatisticsSource, StatisticsTable};
use crate::cache::TableCache;
use crate::core::reconciliation::engine::CancellationToken;
use crate::errors::DisaggError;
use crate::input::{ConfigOverrides, FuelType, RunInputs};
use crate::{run_inputs, RunFlags, RunResults};
use rayon::prelude::*;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BatchJob {
    pub year: u16,
    pub fuel_type: FuelType,
}

/// Run each of `jobs` on the rayon pool. Results come back in the order of `jobs`, and one job
/// failing has no effect on the others. Cancelling `cancellation` stops every job still iterating.
pub fn run_batch(
    jobs: &[RunInputs],
    flags: RunFlags,
    cancellation: &CancellationToken,
) -> Vec<Result<RunResults, DisaggError>> {
    info!(jobs = jobs.len(), "starting batch");

    jobs.par_iter()
        .map(|inputs| {
            debug!(year = inputs.year, fuel_type = %inputs.fuel_type, "batch job started");
            run_inputs(inputs, flags, Some(cancellation))
        })
        .collect()
}

/// Assemble inputs for each job from `assembler` and run them as a batch. Tables shared between
/// jobs are only fetched once.
pub fn run_assembled_batch<S, C>(
    assembler: &InputAssembler<S, C>,
    jobs: &[BatchJob],
    overrides: &ConfigOverrides,
    flags: RunFlags,
    cancellation: &CancellationToken,
    force_refresh: bool,
) -> Vec<Result<RunResults, DisaggError>>
where
    S: StatisticsSource,
    C: TableCache<StatisticsTable> + Sync,
{
    jobs.par_iter()
        .map(|job| {
            let mut input = assembler.assemble(job.year, job.fuel_type, force_refresh)?;
            input.apply_overrides(overrides);
            let inputs = input.finalize()?;
            run_inputs(&inputs, flags, Some(cancellation))
        })
        .collect()
}
