use crate::core::matrix::{EmploymentMatrix, KeyString};
use anyhow::{anyhow, bail};
use indexmap::IndexMap;

/// Spread a sector's national total across regions in proportion to its employee counts.
///
/// Returns `None` when the sector has no employees anywhere, in which case nothing can be
/// allocated.
pub fn allocate_by_employment_share(total: f64, employees: &[f64]) -> Option<Vec<f64>> {
    let employees_total = employees.iter().sum::<f64>();
    if employees_total <= 0. {
        return None;
    }

    Some(
        employees
            .iter()
            .map(|count| total * count / employees_total)
            .collect(),
    )
}

const RANGE_SUM_RELATIVE_TOLERANCE: f64 = 1e-5;

/// Split national totals keyed by sector ranges (e.g. "10-12") into their member sectors.
///
/// Each member receives a share proportional to its national employment. If nobody in the
/// range is employed, the range total is split equally between all members.
pub fn resolve_sector_ranges(
    national_totals: &IndexMap<KeyString, f64>,
    employment: &EmploymentMatrix,
) -> anyhow::Result<IndexMap<KeyString, f64>> {
    let mut resolved: IndexMap<KeyString, f64> = IndexMap::new();

    for (key, total) in national_totals {
        let Some((start, end)) = parse_sector_range(key)? else {
            *resolved.entry(key.clone()).or_default() += total;
            continue;
        };

        let members = (start..=end).map(|code| code.to_string()).collect::<Vec<_>>();
        let member_employees = members
            .iter()
            .map(|member| {
                employment
                    .sectors()
                    .position(member)
                    .map(|s| employment.sector_total(s))
            })
            .collect::<Vec<_>>();
        let range_employees = member_employees.iter().flatten().sum::<f64>();

        for (member, employees) in members.iter().zip(member_employees) {
            let share = if range_employees > 0. {
                match employees {
                    Some(employees) => employees / range_employees,
                    // members with no employment data are left out entirely
                    None => continue,
                }
            } else {
                1. / members.len() as f64
            };
            *resolved.entry(member.as_str().into()).or_default() += total * share;
        }
    }

    let total_before = national_totals.values().sum::<f64>();
    let total_after = resolved.values().sum::<f64>();
    let larger = total_before.abs().max(total_after.abs());
    if larger > 0. && (total_before - total_after).abs() / larger > RANGE_SUM_RELATIVE_TOLERANCE {
        bail!(
            "Resolving sector ranges changed the national total from {total_before} to {total_after}"
        );
    }

    Ok(resolved)
}

fn parse_sector_range(key: &str) -> anyhow::Result<Option<(u32, u32)>> {
    let Some((start, end)) = key.split_once('-') else {
        return Ok(None);
    };
    let parse = |code: &str| {
        code.trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("Could not parse sector range '{key}'"))
    };
    let (start, end) = (parse(start)?, parse(end)?);
    if start > end {
        bail!("Sector range '{key}' is reversed");
    }

    Ok(Some((start, end)))
}
