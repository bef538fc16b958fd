//! Assembles run inputs from the published statistics tables: national consumption by sector,
//! regional consumption and employees by sector and region.

use crate::cache::{fetch_with_cache, CacheKey, TableCache};
use crate::core::matrix::KeyString;
use crate::core::reconciliation::ReconciliationConfig;
use crate::core::units::{check_year, regional_statistic_year};
use crate::input::{FuelType, Input, InputForProcessing, RegionalTotalsInput, TotalsInput};
use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const NATIONAL_TOTALS_TABLE: &str = "ugr";
pub const REGIONAL_TOTALS_TABLE: &str = "jevi";
pub const EMPLOYMENT_TABLE: &str = "employees";

pub type EmploymentCounts = IndexMap<KeyString, IndexMap<KeyString, u64>>;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum StatisticsTable {
    NationalTotals(TotalsInput),
    RegionalTotals(RegionalTotalsInput),
    Employment(EmploymentCounts),
}

impl StatisticsTable {
    fn kind(&self) -> &'static str {
        match self {
            StatisticsTable::NationalTotals(_) => NATIONAL_TOTALS_TABLE,
            StatisticsTable::RegionalTotals(_) => REGIONAL_TOTALS_TABLE,
            StatisticsTable::Employment(_) => EMPLOYMENT_TABLE,
        }
    }
}

/// Somewhere statistics tables can be fetched from.
pub trait StatisticsSource: Send + Sync {
    fn fetch(&self, key: &CacheKey) -> anyhow::Result<StatisticsTable>;
}

/// Reads tables from JSON files in a directory, one file per cache key (e.g. `ugr_2015_gas.json`).
#[derive(Debug)]
pub struct FileStatisticsSource {
    directory_path: PathBuf,
}

impl FileStatisticsSource {
    pub fn new(directory_path: PathBuf) -> Self {
        Self { directory_path }
    }
}

impl StatisticsSource for FileStatisticsSource {
    fn fetch(&self, key: &CacheKey) -> anyhow::Result<StatisticsTable> {
        let path = self.directory_path.join(format!("{key}.json"));
        let reader = BufReader::new(
            File::open(&path).map_err(|e| anyhow!("Could not open {}: {e}", path.display()))?,
        );

        Ok(match key.table_id.as_str() {
            NATIONAL_TOTALS_TABLE => StatisticsTable::NationalTotals(serde_json::from_reader(reader)?),
            REGIONAL_TOTALS_TABLE => StatisticsTable::RegionalTotals(serde_json::from_reader(reader)?),
            EMPLOYMENT_TABLE => StatisticsTable::Employment(serde_json::from_reader(reader)?),
            table_id => bail!("Unknown statistics table {table_id}"),
        })
    }
}

pub struct InputAssembler<S, C> {
    source: S,
    cache: C,
}

impl<S, C> InputAssembler<S, C>
where
    S: StatisticsSource,
    C: TableCache<StatisticsTable>,
{
    pub fn new(source: S, cache: C) -> Self {
        Self { source, cache }
    }

    /// Fetch (or reuse) the three tables for a year and fuel and combine them into an input
    /// ready for finalizing. Regional statistics are only published for a limited range of years,
    /// so the nearest published year stands in outside it.
    pub fn assemble(
        &self,
        year: u16,
        fuel_type: FuelType,
        force_refresh: bool,
    ) -> anyhow::Result<InputForProcessing> {
        check_year(year)?;
        let fuel = fuel_type.to_string();
        let regional_year = regional_statistic_year(year);
        if regional_year != year {
            info!(year, regional_year, "using nearest published regional statistics");
        }

        let national_totals = match self.fetch(
            &CacheKey::new(NATIONAL_TOTALS_TABLE, year, [("fuel", fuel.as_str())]),
            force_refresh,
        )? {
            StatisticsTable::NationalTotals(totals) => totals,
            other => return Err(unexpected_table(NATIONAL_TOTALS_TABLE, &other)),
        };
        let regional_totals = match self.fetch(
            &CacheKey::new(REGIONAL_TOTALS_TABLE, regional_year, [("fuel", fuel.as_str())]),
            force_refresh,
        )? {
            StatisticsTable::RegionalTotals(totals) => totals,
            other => return Err(unexpected_table(REGIONAL_TOTALS_TABLE, &other)),
        };
        let employment = match self.fetch(&CacheKey::new(EMPLOYMENT_TABLE, year, []), force_refresh)? {
            StatisticsTable::Employment(counts) => counts,
            other => return Err(unexpected_table(EMPLOYMENT_TABLE, &other)),
        };

        Ok(InputForProcessing::new(Input {
            year,
            fuel_type,
            config: ReconciliationConfig::default(),
            sectors: vec![],
            national_totals,
            regional_totals,
            employment,
        }))
    }

    fn fetch(&self, key: &CacheKey, force_refresh: bool) -> anyhow::Result<StatisticsTable> {
        let table = fetch_with_cache(&self.cache, key, force_refresh, |key| self.source.fetch(key))?;
        Ok(Arc::unwrap_or_clone(table))
    }
}

fn unexpected_table(expected: &str, table: &StatisticsTable) -> anyhow::Error {
    anyhow!("Expected a {expected} table but got {}", table.kind())
}
