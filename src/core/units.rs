use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GIGAJOULES_PER_MEGAWATT_HOUR: f64 = 3.6;
pub const TERAJOULES_PER_GIGAWATT_HOUR: f64 = 3.6;
pub const MEGAWATT_HOURS_PER_GIGAWATT_HOUR: f64 = 1_000.;

pub const FIRST_SUPPORTED_YEAR: u16 = 2000;
pub const LAST_SUPPORTED_YEAR: u16 = 2050;

/// Regional industry statistic is only published for these years; other years borrow the nearest.
pub const FIRST_REGIONAL_STATISTIC_YEAR: u16 = 2003;
pub const LAST_REGIONAL_STATISTIC_YEAR: u16 = 2017;

pub fn gigajoules_to_mwh(value_gj: f64) -> f64 {
    value_gj / GIGAJOULES_PER_MEGAWATT_HOUR
}

pub fn terajoules_to_mwh(value_tj: f64) -> f64 {
    value_tj / TERAJOULES_PER_GIGAWATT_HOUR * MEGAWATT_HOURS_PER_GIGAWATT_HOUR
}

/// Energy unit a raw statistic is reported in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum EnergyUnit {
    #[default]
    #[serde(rename = "MWh")]
    MegawattHours,
    #[serde(rename = "GJ")]
    Gigajoules,
    #[serde(rename = "TJ")]
    Terajoules,
}

impl EnergyUnit {
    pub fn to_mwh(&self, value: f64) -> f64 {
        match self {
            EnergyUnit::MegawattHours => value,
            EnergyUnit::Gigajoules => gigajoules_to_mwh(value),
            EnergyUnit::Terajoules => terajoules_to_mwh(value),
        }
    }
}

pub fn check_year(year: u16) -> Result<u16, YearOutOfRangeError> {
    if (FIRST_SUPPORTED_YEAR..=LAST_SUPPORTED_YEAR).contains(&year) {
        Ok(year)
    } else {
        Err(YearOutOfRangeError(year))
    }
}

/// The year of regional statistic used to calibrate a run for the given year.
pub fn regional_statistic_year(year: u16) -> u16 {
    year.clamp(FIRST_REGIONAL_STATISTIC_YEAR, LAST_REGIONAL_STATISTIC_YEAR)
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("Year {0} is outside the supported range {FIRST_SUPPORTED_YEAR}..={LAST_SUPPORTED_YEAR}")]
pub struct YearOutOfRangeError(pub u16);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_convert_gigajoules_to_mwh() {
        assert_relative_eq!(gigajoules_to_mwh(36.), 10.);
    }

    #[rstest]
    fn should_convert_terajoules_to_mwh() {
        assert_relative_eq!(terajoules_to_mwh(3.6), 1_000.);
    }

    #[rstest]
    #[case(EnergyUnit::MegawattHours, 7.2, 7.2)]
    #[case(EnergyUnit::Gigajoules, 7.2, 2.)]
    #[case(EnergyUnit::Terajoules, 7.2, 2_000.)]
    fn should_convert_energy_unit_to_mwh(
        #[case] unit: EnergyUnit,
        #[case] value: f64,
        #[case] expected: f64,
    ) {
        assert_relative_eq!(unit.to_mwh(value), expected, max_relative = 1e-12);
    }

    #[rstest]
    fn should_accept_years_within_range() {
        assert_eq!(check_year(2000), Ok(2000));
        assert_eq!(check_year(2050), Ok(2050));
    }

    #[rstest]
    fn should_reject_years_outside_range() {
        assert_eq!(check_year(1999), Err(YearOutOfRangeError(1999)));
        assert_eq!(check_year(2051), Err(YearOutOfRangeError(2051)));
    }

    #[rstest]
    #[case(2001, 2003)]
    #[case(2010, 2010)]
    #[case(2030, 2017)]
    fn should_clamp_regional_statistic_year(#[case] year: u16, #[case] expected: u16) {
        assert_eq!(regional_statistic_year(year), expected);
    }
}
