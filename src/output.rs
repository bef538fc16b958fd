use crate::core::reconciliation::convergence::IterationRecord;
use crate::core::reconciliation::materializer::ConsumptionTable;
use crate::core::reconciliation::{Diagnostic, TerminationReason};
use crate::input::FuelType;
use crate::{DeviationSummary, RunResults};
use anyhow::anyhow;
use formatx::formatx;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Writes each location key to its own file in a directory, named by a template such as
/// `"{}.csv"`.
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    pub(crate) fn path_for_location_key(&self, location_key: &str) -> anyhow::Result<PathBuf> {
        let file_name = formatx!(&self.file_template, location_key)
            .map_err(|e| anyhow!("Could not apply file template to {location_key}: {e:?}"))?;
        Ok(self.directory_path.join(file_name))
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(BufWriter::new(File::create(
            self.path_for_location_key(location_key)?,
        )?))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// One row per sector and region, with a `sector_id,region_id,value,resolution_method` header.
pub fn write_consumption_table(
    writer: impl Write,
    table: &ConsumptionTable,
) -> Result<(), anyhow::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for row in table.rows() {
        writer.serialize(row)?;
    }

    writer.flush()?;

    Ok(())
}

#[derive(Serialize)]
struct DiagnosticsReport<'a> {
    year: u16,
    fuel_type: FuelType,
    converged: bool,
    iterations_used: usize,
    termination: TerminationReason,
    final_residual: f64,
    summary: DeviationSummary,
    diagnostics: &'a [Diagnostic],
    trace: &'a [IterationRecord],
}

pub fn write_diagnostics(writer: impl Write, results: &RunResults) -> Result<(), anyhow::Error> {
    let report = DiagnosticsReport {
        year: results.year,
        fuel_type: results.fuel_type,
        converged: results.converged,
        iterations_used: results.iterations_used,
        termination: results.termination,
        final_residual: results.final_residual(),
        summary: results.summary,
        diagnostics: &results.diagnostics,
        trace: &results.trace,
    };

    serde_json::to_writer_pretty(writer, &report)?;

    Ok(())
}
