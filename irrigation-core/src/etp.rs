//! Hourly potential evapotranspiration (FAO-56 Penman-Monteith, hourly step).
//!
//! Every hour is computed on its own from the localized weather:
//!
//! | Step | Quantity | Formula |
//! |------|----------|---------|
//! | 1 | saturation vapour pressure, slope | `es = 0.6108·exp(17.27·(T−273.15)/(T−35.85))`, `Δ = 4098·es/(T−35.85)²` |
//! | 2 | psychrometric constant | `γ = 0.665e-3·P(z)` |
//! | 3 | actual vapour pressure | `ee = es·RH/100` |
//! | 4 | net shortwave | `(1 − 0.23)·Rs` |
//! | 5 | net longwave | `σ·T⁴·(0.34 − 0.14·√ee)·(1.35·clarity − 0.35)` |
//! | 6 | wind at 2 m | logarithmic profile from the anemometer height |
//! | 7 | ETP | `max(0, Δ·Rn/λ/D) + max(0, γ·(37/T)·u2·(es−ee)/D)` |
//!
//! The clarity index needs clear-sky radiation, derived from solar geometry in
//! [`solar`]. Night hours reuse a daytime clarity value, see
//! [`solar::fill_night_clarity`].

pub mod solar;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::model::{HourlySeries, ReferencePoint, Variable};

/// Latent heat of vaporization (MJ kg-1).
pub const LATENT_HEAT: f64 = 2.45;

/// Psychrometric constant per unit of pressure (K-1).
pub const PSYCHROMETRIC_FACTOR: f64 = 0.665e-3;

/// Stefan-Boltzmann constant (MJ m-2 K-4 h-1).
pub const STEFAN_BOLTZMANN: f64 = 2.043e-10;

/// Albedo of the reference grass surface.
pub const ALBEDO: f64 = 0.23;

/// Offset of the Tetens denominator (K). Temperatures at or below it are rejected.
const TETENS_OFFSET_K: f64 = 35.85;

const REQUIRED: [Variable; 4] = [
    Variable::Temperature,
    Variable::RelativeHumidity,
    Variable::WindSpeed,
    Variable::GlobalRadiation,
];

/// Site-independent parameters of the ETP computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtpParameters {
    /// Offset of local standard time from UTC (hours).
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset_hours: f64,

    /// Height of the wind measurement (m).
    #[serde(default = "default_anemometer_height")]
    pub anemometer_height_m: f64,
}

impl Default for EtpParameters {
    fn default() -> Self {
        Self {
            timezone_offset_hours: default_timezone_offset(),
            anemometer_height_m: default_anemometer_height(),
        }
    }
}

fn default_timezone_offset() -> f64 {
    1.0
}
fn default_anemometer_height() -> f64 {
    10.0
}

/// Weather of a single hour, as consumed by [`hourly_etp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourInputs {
    /// Air temperature (K).
    pub temperature: f64,
    /// Relative humidity (%).
    pub relative_humidity: f64,
    /// Wind speed at 2 m (m/s).
    pub wind_speed_2m: f64,
    /// Incoming global radiation (MJ m-2 h-1).
    pub radiation: f64,
    /// Clarity index in `[0, 1]`.
    pub clarity: f64,
}

/// Saturation vapour pressure (kPa) at temperature `t` (K).
pub fn saturation_vapour_pressure(t: f64) -> f64 {
    0.6108 * (17.27 * (t - 273.15) / (t - TETENS_OFFSET_K)).exp()
}

/// Slope of the saturation vapour pressure curve (kPa K-1).
pub fn vapour_pressure_slope(t: f64) -> f64 {
    4098.0 * saturation_vapour_pressure(t) / (t - TETENS_OFFSET_K).powi(2)
}

/// Standard atmospheric pressure (kPa) at `altitude` metres.
pub fn atmospheric_pressure(altitude: f64) -> f64 {
    101.3 * ((293.0 - 0.0065 * altitude) / 293.0).powf(5.26)
}

pub fn psychrometric_constant(pressure: f64) -> f64 {
    PSYCHROMETRIC_FACTOR * pressure
}

/// Factor converting wind speed at `height` metres to 2 m.
pub fn wind_profile_factor(height: f64) -> f64 {
    4.87 / (67.8 * height - 5.42).ln()
}

/// Net longwave radiation (MJ m-2 h-1).
pub fn net_longwave_radiation(t: f64, actual_vapour_pressure: f64, clarity: f64) -> f64 {
    STEFAN_BOLTZMANN
        * t.powi(4)
        * (0.34 - 0.14 * actual_vapour_pressure.max(0.0).sqrt())
        * (1.35 * clarity - 0.35)
}

/// Potential evapotranspiration (mm) of one hour.
///
/// The energy and aerodynamic terms are clamped to zero separately.
pub fn hourly_etp(hour: &HourInputs, gamma: f64) -> f64 {
    let t = hour.temperature;
    let es = saturation_vapour_pressure(t);
    let delta = vapour_pressure_slope(t);
    let ee = es * hour.relative_humidity / 100.0;

    let net_shortwave = (1.0 - ALBEDO) * hour.radiation;
    let net_radiation = net_shortwave - net_longwave_radiation(t, ee, hour.clarity);

    let u2 = hour.wind_speed_2m;
    let denominator = delta + gamma * (1.0 + 0.34 * u2);

    let radiative = (delta * net_radiation / LATENT_HEAT / denominator).max(0.0);
    let aerodynamic = (gamma * 37.0 / t * u2 * (es - ee) / denominator).max(0.0);

    radiative + aerodynamic
}

/// [`compute_etp_with`] using default [`EtpParameters`].
pub fn compute_etp(series: &HourlySeries, point: &ReferencePoint) -> Result<HourlySeries> {
    compute_etp_with(series, point, &EtpParameters::default())
}

/// Add an hourly `etp` (mm) value to a localized series.
///
/// Hours lacking temperature, humidity, wind or radiation, and night hours
/// without any daytime clarity to borrow, get no ETP value.
///
/// # Errors
///
/// - [`CoreError::MissingData`] if one of the required variables has no value
///   at all in a non-empty series.
/// - [`CoreError::InvalidInput`] for a non-finite or non-physical temperature,
///   an out-of-range reference point, or an anemometer height too low for the
///   wind profile.
pub fn compute_etp_with(
    series: &HourlySeries,
    point: &ReferencePoint,
    params: &EtpParameters,
) -> Result<HourlySeries> {
    validate(point, params)?;

    if series.is_empty() {
        return Ok(HourlySeries::new());
    }
    if let Some(&variable) = REQUIRED.iter().find(|v| !series.has_values(**v)) {
        return Err(CoreError::MissingData { variable });
    }
    if let Some(t) = series
        .values(Variable::Temperature)
        .find(|t| !t.is_finite() || *t <= TETENS_OFFSET_K)
    {
        return Err(CoreError::InvalidInput {
            field: "temperature",
            value: t,
            expected: "a finite air temperature in kelvin",
        });
    }

    let gamma = psychrometric_constant(atmospheric_pressure(point.altitude));
    let wind_factor = wind_profile_factor(params.anemometer_height_m);

    let raw_clarity: Vec<Option<f64>> = series
        .iter()
        .map(|(time, row)| {
            let observed = row.get(&Variable::GlobalRadiation)? * 1e-6;
            let ra = solar::extraterrestrial_radiation(
                *time,
                point.latitude,
                point.longitude,
                params.timezone_offset_hours,
            );
            solar::clarity_index(observed, solar::clear_sky_radiation(ra, point.altitude))
        })
        .collect();
    let clarity = solar::fill_night_clarity(&raw_clarity);

    let mut out = series.clone();
    let mut computed = 0usize;
    let mut without_clarity = 0usize;

    for ((time, row), clarity) in series.iter().zip(clarity) {
        let (Some(t), Some(rh), Some(wind), Some(rs)) = (
            row.get(&Variable::Temperature),
            row.get(&Variable::RelativeHumidity),
            row.get(&Variable::WindSpeed),
            row.get(&Variable::GlobalRadiation),
        ) else {
            continue;
        };
        let Some(clarity) = clarity else {
            without_clarity += 1;
            continue;
        };

        let hour = HourInputs {
            temperature: *t,
            relative_humidity: *rh,
            wind_speed_2m: wind * wind_factor,
            radiation: rs * 1e-6,
            clarity,
        };
        out.insert(*time, Variable::Etp, hourly_etp(&hour, gamma));
        computed += 1;
    }

    if without_clarity > 0 {
        warn!(
            hours = without_clarity,
            "no daytime radiation to estimate night clarity, ETP left missing"
        );
    }
    debug!(hours = series.len(), computed, "computed hourly ETP");

    Ok(out)
}

fn validate(point: &ReferencePoint, params: &EtpParameters) -> Result<()> {
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(CoreError::InvalidInput {
            field: "latitude",
            value: point.latitude,
            expected: "a latitude within [-90, 90] degrees",
        });
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(CoreError::InvalidInput {
            field: "longitude",
            value: point.longitude,
            expected: "a longitude within [-180, 180] degrees",
        });
    }
    if !point.altitude.is_finite() {
        return Err(CoreError::InvalidInput {
            field: "altitude",
            value: point.altitude,
            expected: "a finite altitude in metres",
        });
    }
    if !params.timezone_offset_hours.is_finite() {
        return Err(CoreError::InvalidInput {
            field: "timezone_offset_hours",
            value: params.timezone_offset_hours,
            expected: "a finite offset in hours",
        });
    }
    // ln(67.8 z - 5.42) must be positive.
    let h = params.anemometer_height_m;
    if !h.is_finite() || 67.8 * h - 5.42 <= 1.0 {
        return Err(CoreError::InvalidInput {
            field: "anemometer_height_m",
            value: h,
            expected: "a measurement height above 0.095 m",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, TimeZone, Utc};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 21, h, 0, 0).unwrap()
    }

    fn point() -> ReferencePoint {
        ReferencePoint::new("La Petite Claye", 48.541356, -1.6154, 50.0)
    }

    fn summer_day() -> HourlySeries {
        let mut series = HourlySeries::new();
        for h in 0..24 {
            let sun = ((h as f64 - 12.0) / 8.0 * std::f64::consts::FRAC_PI_2).cos().max(0.0);
            series.insert(hour(h), Variable::Temperature, 288.15 + 8.0 * sun);
            series.insert(hour(h), Variable::RelativeHumidity, 85.0 - 30.0 * sun);
            series.insert(hour(h), Variable::WindSpeed, 3.0);
            series.insert(hour(h), Variable::GlobalRadiation, 2.8e6 * sun);
        }
        series
    }

    #[test]
    fn fao_constants() {
        // FAO-56 table 2.3: es(20°C) = 2.338 kPa, slope 0.145 kPa/°C
        assert_relative_eq!(saturation_vapour_pressure(293.15), 2.338, epsilon = 1e-3);
        assert_relative_eq!(vapour_pressure_slope(293.15), 0.145, epsilon = 1e-3);
        assert_relative_eq!(atmospheric_pressure(0.0), 101.3);
        // 10 m to 2 m: 0.748
        assert_relative_eq!(wind_profile_factor(10.0), 0.748, epsilon = 1e-3);
    }

    #[test]
    fn daytime_etp_is_plausible() {
        let out = compute_etp(&summer_day(), &point()).unwrap();
        let noon = out.get(hour(12), Variable::Etp).unwrap();
        assert!(noon > 0.3 && noon < 1.0, "noon ETP {noon}");

        let total: f64 = out.values(Variable::Etp).sum();
        assert!(total > 2.0 && total < 8.0, "daily ETP {total}");
    }

    #[test]
    fn etp_is_added_without_touching_other_variables() {
        let input = summer_day();
        let out = compute_etp(&input, &point()).unwrap();
        assert_eq!(out.len(), input.len());
        for (time, row) in input.iter() {
            for (variable, value) in row {
                assert_eq!(out.get(*time, *variable), Some(*value));
            }
            assert!(out.get(*time, Variable::Etp).unwrap() >= 0.0);
        }
    }

    #[test]
    fn missing_inputs_leave_hour_without_etp() {
        let mut series = summer_day();
        let mut gap = HourlySeries::new();
        for (time, row) in series.iter() {
            for (variable, value) in row {
                if !(*time == hour(10) && *variable == Variable::WindSpeed) {
                    gap.insert(*time, *variable, *value);
                }
            }
        }
        series = gap;

        let out = compute_etp(&series, &point()).unwrap();
        assert_eq!(out.get(hour(10), Variable::Etp), None);
        assert!(out.get(hour(11), Variable::Etp).is_some());
    }

    #[test]
    fn series_without_radiation_is_missing_data() {
        let mut series = HourlySeries::new();
        series.insert(hour(0), Variable::Temperature, 290.0);
        series.insert(hour(0), Variable::RelativeHumidity, 80.0);
        series.insert(hour(0), Variable::WindSpeed, 2.0);

        let err = compute_etp(&series, &point()).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingData {
                variable: Variable::GlobalRadiation
            }
        );
    }

    #[test]
    fn non_finite_temperature_is_rejected() {
        let mut series = summer_day();
        series.insert(hour(5), Variable::Temperature, f64::NAN);
        let err = compute_etp(&series, &point()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { field: "temperature", .. }));
    }

    #[test]
    fn all_night_series_has_no_etp() {
        let mut series = HourlySeries::new();
        for h in 0..4 {
            series.insert(hour(h), Variable::Temperature, 285.0);
            series.insert(hour(h), Variable::RelativeHumidity, 90.0);
            series.insert(hour(h), Variable::WindSpeed, 1.0);
            series.insert(hour(h), Variable::GlobalRadiation, 0.0);
        }
        let out = compute_etp(&series, &point()).unwrap();
        assert!(!out.has_values(Variable::Etp));
    }

    #[test]
    fn empty_series_is_ok() {
        assert!(compute_etp(&HourlySeries::new(), &point()).unwrap().is_empty());
    }

    #[test]
    fn low_anemometer_is_rejected() {
        let params = EtpParameters {
            anemometer_height_m: 0.05,
            ..EtpParameters::default()
        };
        let err = compute_etp_with(&summer_day(), &point(), &params).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { field: "anemometer_height_m", .. }));
    }

    #[test]
    fn saturated_still_night_has_zero_etp() {
        let hour = HourInputs {
            temperature: 283.15,
            relative_humidity: 100.0,
            wind_speed_2m: 0.0,
            radiation: 0.0,
            clarity: 0.8,
        };
        assert_eq!(hourly_etp(&hour, psychrometric_constant(101.3)), 0.0);
    }
}
