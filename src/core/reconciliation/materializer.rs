use crate::core::allocation::allocate_by_employment_share;
use crate::core::matrix::{ConsumptionMatrix, EmploymentMatrix, KeyString, Labels};
use crate::core::reconciliation::engine::{ReconciliationOutcome, Sector};
use crate::core::reconciliation::{Diagnostic, ResolutionMethod};
use crate::errors::{MissingInput, ReconciliationError};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

/// Relative tolerance on the grand total of the merged table against the national totals.
const CONSERVATION_RELATIVE_TOLERANCE: f64 = 0.01;

/// One `(sector, region)` cell of the final table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableRow<'a> {
    pub sector_id: &'a str,
    pub region_id: &'a str,
    pub value: f64,
    pub resolution_method: ResolutionMethod,
}

/// Final sector×region consumption for one run, rows tagged with how they were resolved.
#[derive(Clone, Debug)]
pub struct ConsumptionTable {
    sectors: Labels,
    regions: Labels,
    values: ConsumptionMatrix,
    methods: Vec<ResolutionMethod>,
    zero_allocation: Vec<bool>,
}

impl ConsumptionTable {
    pub fn sectors(&self) -> &Labels {
        &self.sectors
    }

    pub fn regions(&self) -> &Labels {
        &self.regions
    }

    pub fn value(&self, sector_id: &str, region_id: &str) -> Option<f64> {
        Some(self.values.get(
            self.sectors.position(sector_id)?,
            self.regions.position(region_id)?,
        ))
    }

    pub fn resolution_method(&self, sector_id: &str) -> Option<ResolutionMethod> {
        self.sectors.position(sector_id).map(|s| self.methods[s])
    }

    pub fn is_zero_allocation(&self, sector_id: &str) -> bool {
        self.sectors
            .position(sector_id)
            .is_some_and(|s| self.zero_allocation[s])
    }

    pub fn sector_row(&self, sector_id: &str) -> Option<Vec<f64>> {
        self.sectors.position(sector_id).map(|s| self.values.row(s))
    }

    pub fn sector_total(&self, sector_id: &str) -> Option<f64> {
        self.sectors
            .position(sector_id)
            .map(|s| self.values.row_sum(s))
    }

    /// Column sum over the rows resolved by `method` only.
    pub fn region_total_for(&self, region_id: &str, method: ResolutionMethod) -> Option<f64> {
        let region = self.regions.position(region_id)?;
        Some(
            self.methods
                .iter()
                .enumerate()
                .filter(|(_, row_method)| **row_method == method)
                .map(|(sector, _)| self.values.get(sector, region))
                .sum(),
        )
    }

    pub fn total(&self) -> f64 {
        self.values.total()
    }

    pub fn len(&self) -> usize {
        self.sectors.len() * self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in sector-major order.
    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        (0..self.sectors.len()).flat_map(move |sector| {
            (0..self.regions.len()).map(move |region| TableRow {
                sector_id: self.sectors.label(sector),
                region_id: self.regions.label(region),
                value: self.values.get(sector, region),
                resolution_method: self.methods[sector],
            })
        })
    }
}

/// Merges the iteratively fitted rows with the sectors resolved directly by employee share.
#[derive(Debug)]
pub struct ResultMaterializer<'a> {
    sectors: &'a [Sector],
    national_totals: &'a IndexMap<KeyString, f64>,
    employment: &'a EmploymentMatrix,
}

impl<'a> ResultMaterializer<'a> {
    pub fn new(
        sectors: &'a [Sector],
        national_totals: &'a IndexMap<KeyString, f64>,
        employment: &'a EmploymentMatrix,
    ) -> Self {
        Self {
            sectors,
            national_totals,
            employment,
        }
    }

    /// Build the final table from `outcome`, appending the directly resolved sectors unless
    /// `include_direct` is false. Returns the table and any diagnostics raised along the way.
    pub fn materialize(
        &self,
        outcome: &ReconciliationOutcome,
        include_direct: bool,
    ) -> Result<(ConsumptionTable, Vec<Diagnostic>), ReconciliationError> {
        let direct_sectors = self
            .sectors
            .iter()
            .filter(|sector| include_direct && !sector.regionally_constrained)
            .collect::<Vec<_>>();
        let regions = outcome.regions.clone();

        let mut direct_rows = Vec::with_capacity(direct_sectors.len());
        let mut diagnostics = vec![];
        for sector in &direct_sectors {
            let total = *self
                .national_totals
                .get(sector.id.as_str())
                .ok_or_else(|| {
                    ReconciliationError::MissingInput(MissingInput::NationalTotal(
                        sector.id.to_string(),
                    ))
                })?;
            // a sector the employment data never mentions has no employees anywhere
            let allocation = self
                .employment
                .sectors()
                .position(&sector.id)
                .and_then(|position| {
                    allocate_by_employment_share(total, &self.employment.sector_row(position))
                });
            match allocation {
                Some(row) => direct_rows.push((row, false)),
                None => {
                    warn!(sector = %sector.id, "sector has no employees, nothing can be allocated");
                    diagnostics.push(Diagnostic::ZeroAllocation {
                        sector: sector.id.to_string(),
                        resolution_method: ResolutionMethod::Direct,
                    });
                    direct_rows.push((vec![0.; regions.len()], true));
                }
            }
        }

        let iterative_count = outcome.sectors.len();
        let mut sectors = outcome.sectors.clone();
        let mut values = ConsumptionMatrix::zeros(iterative_count + direct_rows.len(), regions.len());
        let mut methods = vec![ResolutionMethod::Iterative; iterative_count];
        let mut zero_allocation = outcome.zero_allocation.clone();

        for sector in 0..iterative_count {
            values.set_row(sector, &outcome.matrix.row(sector));
        }
        for (sector, (row, zero)) in direct_sectors.iter().zip(direct_rows) {
            let position = sectors.insert(&sector.id);
            values.set_row(position, &row);
            methods.push(ResolutionMethod::Direct);
            zero_allocation.push(zero);
        }

        let table = ConsumptionTable {
            sectors,
            regions,
            values,
            methods,
            zero_allocation,
        };
        self.validate_conservation(&table)?;

        Ok((table, diagnostics))
    }

    /// The merged table must be finite and, over all sectors that could be allocated, add up to
    /// their national totals.
    fn validate_conservation(&self, table: &ConsumptionTable) -> Result<(), ReconciliationError> {
        if !table.values.is_finite() {
            return Err(ReconciliationError::ConservationViolated(
                "table contains non-finite values".to_string(),
            ));
        }

        let expected = table
            .sectors
            .iter()
            .enumerate()
            .filter(|(position, _)| !table.zero_allocation[*position])
            .filter_map(|(_, sector_id)| self.national_totals.get(sector_id))
            .sum::<f64>();
        let actual = table.total();
        if !is_close!(actual, expected, rel_tol = CONSERVATION_RELATIVE_TOLERANCE) {
            return Err(ReconciliationError::ConservationViolated(format!(
                "table total {actual} differs from national total {expected}"
            )));
        }

        Ok(())
    }
}
