use crate::input::FuelType;
use std::ops::RangeInclusive;

/// WZ2008 divisions counted as manufacturing/mining, i.e. covered by the regional industry
/// statistic.
pub const INDUSTRY_SECTORS: RangeInclusive<u32> = 5..=33;

// Energy intensive divisions (specific consumption of at least 10 MWh per employee), per fuel.
const ENERGY_INTENSIVE_POWER: &[u32] = &[
    5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 22, 23, 24, 25, 27, 28, 29, 33,
];
const ENERGY_INTENSIVE_GAS: &[u32] = &[
    5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 30,
];

fn sector_code(sector_id: &str) -> Option<u32> {
    sector_id.trim().parse::<u32>().ok()
}

/// Whether a sector has an independent regional total to match for the given fuel by default.
pub fn is_regionally_constrained(sector_id: &str, fuel_type: FuelType) -> bool {
    let intensive = match fuel_type {
        FuelType::Power => ENERGY_INTENSIVE_POWER,
        FuelType::Gas | FuelType::Petrol => ENERGY_INTENSIVE_GAS,
    };

    sector_code(sector_id).is_some_and(|code| intensive.contains(&code))
}

pub fn is_industry_sector(sector_id: &str) -> bool {
    sector_code(sector_id).is_some_and(|code| INDUSTRY_SECTORS.contains(&code))
}
