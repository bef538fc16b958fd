extern crate disagg;

use anyhow::bail;
use clap::Parser;
use disagg::assembly::{FileStatisticsSource, InputAssembler};
use disagg::batch::{run_assembled_batch, run_batch, BatchJob};
use disagg::cache::InMemoryTableCache;
use disagg::core::reconciliation::engine::CancellationToken;
use disagg::errors::DisaggError;
use disagg::input::{ingest_for_processing, ConfigOverrides, FuelType, RunInputs};
use disagg::output::FileOutput;
use disagg::{run_project, write_results, RunFlags, RunResults};
use itertools::Itertools;
use std::ffi::OsStr;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct DisaggArgs {
    #[arg(
        help = "Input file(s) in .json format; more than one is run as a batch",
        required_unless_present = "statistics_dir"
    )]
    input_files: Vec<String>,
    #[arg(
        long,
        help = "Directory of statistics tables to assemble inputs from instead of input files",
        conflicts_with = "input_files",
        requires_all = ["year", "fuel"]
    )]
    statistics_dir: Option<PathBuf>,
    #[arg(long, help = "Year(s) to run when assembling from statistics tables")]
    year: Vec<u16>,
    #[arg(long, help = "Fuel(s) to run when assembling from statistics tables")]
    fuel: Vec<FuelType>,
    #[arg(long, default_value_t = false, help = "Ignore cached statistics tables")]
    force_refresh: bool,
    #[arg(long, short, help = "Directory to write results to")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "Maximum relative residual at which a run counts as converged")]
    tolerance: Option<f64>,
    #[arg(long, help = "Maximum number of fitting iterations")]
    max_iterations: Option<usize>,
    #[arg(
        long,
        default_value_t = false,
        help = "Only stop at the iteration cap, never on stagnation"
    )]
    no_stagnation_check: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Fail runs that do not converge instead of reporting them"
    )]
    reject_non_converged: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Leave sectors without a regional constraint out of the results"
    )]
    skip_direct_sectors: bool,
    #[arg(long, default_value_t = false, help = "Also write a diagnostics report per run")]
    diagnostics: bool,
    #[arg(long, short, default_value_t = false, help = "Log every iteration")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = DisaggArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = ConfigOverrides::from(&args);
    let flags = RunFlags::from(&args);

    match args.statistics_dir {
        Some(ref statistics_dir) => run_from_statistics(&args, statistics_dir, &overrides, flags),
        None => run_from_input_files(&args, &overrides, flags),
    }
}

fn run_from_input_files(
    args: &DisaggArgs,
    overrides: &ConfigOverrides,
    flags: RunFlags,
) -> anyhow::Result<()> {
    if let [input_file] = args.input_files.as_slice() {
        let output_path = match args.output_dir {
            Some(ref output_dir) => output_dir.clone(),
            None => {
                let input_file_stem = Path::new(input_file)
                    .file_stem()
                    .and_then(OsStr::to_str)
                    .unwrap_or(input_file);
                Path::new(input_file)
                    .with_file_name(format!("{input_file_stem}__results"))
            }
        };
        fs::create_dir_all(&output_path)?;
        let file_output = FileOutput::new(output_path, "{}".to_string());

        let results = run_project(
            BufReader::new(File::open(Path::new(input_file))?),
            &file_output,
            overrides,
            flags,
        )?;
        report(&results);

        return Ok(());
    }

    let inputs = args
        .input_files
        .iter()
        .map(|input_file| {
            let mut input = ingest_for_processing(BufReader::new(File::open(input_file)?))?;
            input.apply_overrides(overrides);
            input.finalize()
        })
        .collect::<anyhow::Result<Vec<RunInputs>>>()?;

    let results = run_batch(&inputs, flags, &CancellationToken::new());

    write_batch(results, &batch_output(args)?, flags)
}

fn run_from_statistics(
    args: &DisaggArgs,
    statistics_dir: &Path,
    overrides: &ConfigOverrides,
    flags: RunFlags,
) -> anyhow::Result<()> {
    let assembler = InputAssembler::new(
        FileStatisticsSource::new(statistics_dir.to_path_buf()),
        InMemoryTableCache::new(),
    );
    let jobs = args
        .year
        .iter()
        .cartesian_product(&args.fuel)
        .map(|(year, fuel_type)| BatchJob {
            year: *year,
            fuel_type: *fuel_type,
        })
        .collect::<Vec<_>>();

    let results = run_assembled_batch(
        &assembler,
        &jobs,
        overrides,
        flags,
        &CancellationToken::new(),
        args.force_refresh,
    );

    write_batch(results, &batch_output(args)?, flags)
}

fn batch_output(args: &DisaggArgs) -> anyhow::Result<FileOutput> {
    let output_path = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("disagg__results"));
    fs::create_dir_all(&output_path)?;

    Ok(FileOutput::new(output_path, "{}".to_string()))
}

fn write_batch(
    results: Vec<Result<RunResults, DisaggError>>,
    output: &FileOutput,
    flags: RunFlags,
) -> anyhow::Result<()> {
    let total = results.len();
    let mut failures = 0;

    for result in results {
        match result {
            Ok(results) => {
                write_results(output, &results, flags)?;
                report(&results);
            }
            Err(e) => {
                error!("{e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {total} runs failed");
    }

    Ok(())
}

fn report(results: &RunResults) {
    info!(
        year = results.year,
        fuel_type = %results.fuel_type,
        converged = results.converged,
        iterations = results.iterations_used,
        final_residual = results.final_residual(),
        "results written for {}",
        results.output_key()
    );
}

impl From<&DisaggArgs> for ConfigOverrides {
    fn from(args: &DisaggArgs) -> Self {
        ConfigOverrides {
            tolerance: args.tolerance,
            max_iterations: args.max_iterations,
            disable_stagnation_check: args.no_stagnation_check,
        }
    }
}

impl From<&DisaggArgs> for RunFlags {
    fn from(args: &DisaggArgs) -> Self {
        let mut flags = RunFlags::empty();
        if args.reject_non_converged {
            flags.insert(RunFlags::REJECT_NON_CONVERGED);
        }
        if args.skip_direct_sectors {
            flags.insert(RunFlags::SKIP_DIRECT_SECTORS);
        }
        if args.diagnostics {
            flags.insert(RunFlags::WRITE_DIAGNOSTICS);
        }
        flags
    }
}
