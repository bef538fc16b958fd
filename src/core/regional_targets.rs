use crate::core::allocation::allocate_by_employment_share;
use crate::core::matrix::{EmploymentMatrix, KeyString};
use crate::core::reconciliation::engine::Sector;
use crate::core::reconciliation::Diagnostic;
use crate::core::sectors::is_industry_sector;
use crate::input::{FuelType, RegionalScope};
use anyhow::bail;
use indexmap::IndexMap;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionalTargets {
    pub totals: IndexMap<KeyString, f64>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Turn a regional statistic (already in MWh) into the per-region totals the constrained sectors
/// have to be fitted against.
///
/// A statistic covering all of industry has the employee-share consumption of the unconstrained
/// industry sectors taken off. There is no regional petrol statistic, so for petrol the
/// statistic is a proxy that first gets scaled to the national petrol total. Every region with
/// employment data gets a target, with 0 where the statistic says nothing.
pub fn derive_regional_targets(
    statistic: &IndexMap<KeyString, f64>,
    scope: RegionalScope,
    fuel_type: FuelType,
    sectors: &[Sector],
    national_totals: &IndexMap<KeyString, f64>,
    employment: &EmploymentMatrix,
) -> anyhow::Result<RegionalTargets> {
    let mut totals: IndexMap<KeyString, f64> = employment
        .regions()
        .iter()
        .map(|region| (region.into(), statistic.get(region).copied().unwrap_or(0.)))
        .collect();
    for (region, value) in statistic {
        totals.entry(region.clone()).or_insert(*value);
    }

    if scope == RegionalScope::ConstrainedSectors {
        return Ok(RegionalTargets {
            totals,
            diagnostics: vec![],
        });
    }

    if fuel_type == FuelType::Petrol {
        let proxy_total = totals.values().sum::<f64>();
        if proxy_total <= 0. {
            bail!("Regional statistic used as petrol proxy has no consumption to scale");
        }
        let factor = national_totals.values().sum::<f64>() / proxy_total;
        debug!(factor, "scaling regional proxy to national petrol total");
        totals.values_mut().for_each(|value| *value *= factor);
    }

    for sector in sectors
        .iter()
        .filter(|sector| !sector.regionally_constrained && is_industry_sector(&sector.id))
    {
        let (Some(total), Some(position)) = (
            national_totals.get(sector.id.as_str()),
            employment.sectors().position(&sector.id),
        ) else {
            continue;
        };
        let Some(allocation) =
            allocate_by_employment_share(*total, &employment.sector_row(position))
        else {
            continue;
        };
        for (region, value) in employment.regions().iter().zip(allocation) {
            if let Some(target) = totals.get_mut(region) {
                *target -= value;
            }
        }
    }

    let mut diagnostics = vec![];
    for (region, target) in totals.iter_mut() {
        if *target < 0. {
            warn!(region = %region, unclamped = *target, "regional target clamped to zero");
            diagnostics.push(Diagnostic::ClampedRegionalTarget {
                region: region.to_string(),
                unclamped: *target,
            });
            *target = 0.;
        }
    }

    Ok(RegionalTargets {
        totals,
        diagnostics,
    })
}
