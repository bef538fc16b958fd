use crate::core::allocation::resolve_sector_ranges;
use crate::core::matrix::{EmploymentMatrix, KeyString, Labels};
use crate::core::reconciliation::engine::Sector;
use crate::core::reconciliation::{Diagnostic, ReconciliationConfig};
use crate::core::regional_targets::derive_regional_targets;
use crate::core::sectors::is_regionally_constrained;
use crate::core::units::{check_year, EnergyUnit};
use anyhow::{anyhow, bail};
use itertools::Itertools;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::io::{BufReader, Read};
use strum::{Display, EnumIter, EnumString};

pub fn ingest_for_processing(json: impl Read) -> Result<InputForProcessing, anyhow::Error> {
    InputForProcessing::init_with_json(json)
}

#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FuelType {
    Power,
    Gas,
    Petrol,
}

/// Which sectors a regional statistic covers.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionalScope {
    /// Only the regionally constrained sectors, aggregated.
    #[default]
    ConstrainedSectors,
    /// All of industry, including sectors that are resolved by employee share alone.
    AllIndustry,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub year: u16,
    pub fuel_type: FuelType,
    #[serde(default)]
    pub config: ReconciliationConfig,
    /// Explicit classification of sectors; anything not listed falls back to the default
    /// energy-intensive classification for the fuel.
    #[serde(default)]
    pub sectors: Vec<Sector>,
    pub national_totals: TotalsInput,
    pub regional_totals: RegionalTotalsInput,
    /// Employee counts per sector, then per region. Pairs not listed have no employees.
    pub employment: IndexMap<KeyString, IndexMap<KeyString, u64>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TotalsInput {
    #[serde(default)]
    pub unit: EnergyUnit,
    pub values: IndexMap<KeyString, f64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegionalTotalsInput {
    #[serde(default)]
    pub unit: EnergyUnit,
    #[serde(default)]
    pub scope: RegionalScope,
    pub values: IndexMap<KeyString, f64>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigOverrides {
    pub tolerance: Option<f64>,
    pub max_iterations: Option<usize>,
    pub disable_stagnation_check: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: ReconciliationConfig) -> ReconciliationConfig {
        ReconciliationConfig {
            tolerance: self.tolerance.unwrap_or(config.tolerance),
            max_iterations: self.max_iterations.unwrap_or(config.max_iterations),
            stagnation_window: if self.disable_stagnation_check {
                None
            } else {
                config.stagnation_window
            },
            ..config
        }
    }
}

/// Everything one reconciliation run needs, keyed by stable positions and in MWh.
#[derive(Clone, Debug)]
pub struct RunInputs {
    pub year: u16,
    pub fuel_type: FuelType,
    pub config: ReconciliationConfig,
    pub sectors: Vec<Sector>,
    pub national_totals: IndexMap<KeyString, f64>,
    pub regional_totals: IndexMap<KeyString, f64>,
    pub employment: EmploymentMatrix,
    /// Conditions noticed while preparing the inputs.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct InputForProcessing {
    input: Input,
}

impl InputForProcessing {
    pub fn init_with_json(json: impl Read) -> Result<Self, anyhow::Error> {
        let reader = BufReader::new(json);

        let input: Input = serde_json::from_reader(reader)?;

        Ok(Self { input })
    }

    pub fn new(input: Input) -> Self {
        Self { input }
    }

    pub fn year(&self) -> u16 {
        self.input.year
    }

    pub fn fuel_type(&self) -> FuelType {
        self.input.fuel_type
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.input.config
    }

    pub fn set_config(&mut self, config: ReconciliationConfig) -> &Self {
        self.input.config = config;
        self
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> &Self {
        self.input.config = overrides.apply(self.input.config);
        self
    }

    /// Mark a sector as (not) regionally constrained, overriding the default classification.
    pub fn set_sector_constraint(&mut self, sector_id: &str, regionally_constrained: bool) -> &Self {
        match self
            .input
            .sectors
            .iter_mut()
            .find(|sector| sector.id.as_str() == sector_id)
        {
            Some(sector) => sector.regionally_constrained = regionally_constrained,
            None => self
                .input
                .sectors
                .push(Sector::new(sector_id, regionally_constrained)),
        }
        self
    }

    pub fn finalize(self) -> anyhow::Result<RunInputs> {
        let Input {
            year,
            fuel_type,
            config,
            sectors: sector_overrides,
            national_totals,
            regional_totals,
            employment,
        } = self.input;

        check_year(year)?;
        config
            .validate()
            .map_err(|errors| anyhow!("Invalid reconciliation config: {errors}"))?;
        if let Some(duplicate) = sector_overrides
            .iter()
            .map(|sector| &sector.id)
            .duplicates()
            .next()
        {
            bail!("Sector '{duplicate}' is classified more than once");
        }

        let employment = build_employment_matrix(&employment, &regional_totals.values)?;

        let national_totals: IndexMap<KeyString, f64> = national_totals
            .values
            .iter()
            .map(|(sector, value)| (sector.clone(), national_totals.unit.to_mwh(*value)))
            .collect();
        let national_totals = resolve_sector_ranges(&national_totals, &employment)?;

        let mut sectors = national_totals
            .keys()
            .map(|id| {
                let regionally_constrained = sector_overrides
                    .iter()
                    .find(|sector| sector.id == *id)
                    .map(|sector| sector.regionally_constrained)
                    .unwrap_or_else(|| is_regionally_constrained(id, fuel_type));
                Sector::new(id, regionally_constrained)
            })
            .collect::<Vec<_>>();
        // classified sectors without a national total are kept so the gap surfaces as an error
        for sector in sector_overrides {
            if !national_totals.contains_key(sector.id.as_str()) {
                sectors.push(sector);
            }
        }

        let statistic: IndexMap<KeyString, f64> = regional_totals
            .values
            .iter()
            .map(|(region, value)| (region.clone(), regional_totals.unit.to_mwh(*value)))
            .collect();
        let targets = derive_regional_targets(
            &statistic,
            regional_totals.scope,
            fuel_type,
            &sectors,
            &national_totals,
            &employment,
        )?;

        Ok(RunInputs {
            year,
            fuel_type,
            config,
            sectors,
            national_totals,
            regional_totals: targets.totals,
            employment,
            diagnostics: targets.diagnostics,
        })
    }
}

/// Regions are taken in the order first seen in the employment data, followed by any region that
/// only appears in the regional statistic.
fn build_employment_matrix(
    employment: &IndexMap<KeyString, IndexMap<KeyString, u64>>,
    regional_values: &IndexMap<KeyString, f64>,
) -> anyhow::Result<EmploymentMatrix> {
    let sectors = employment.keys().map(|id| id.as_str()).collect::<Labels>();
    let regions = employment
        .values()
        .flat_map(|counts| counts.keys())
        .chain(regional_values.keys())
        .map(|id| id.as_str())
        .collect::<Labels>();

    let rows = employment
        .values()
        .map(|counts| {
            regions
                .iter()
                .map(|region| counts.get(region).copied().unwrap_or(0))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    EmploymentMatrix::from_rows(sectors, regions, &rows)
}
