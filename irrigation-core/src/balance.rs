//! Soil water balance and irrigation decision.
//!
//! The balance over one period compares the readily usable reserve (RFU)
//! left after crop consumption and rainfall with a target reserve:
//!
//! ```text
//! need = target_RFU − (RFU + precipitation − ETM)
//! ```
//!
//! Every evaluation is independent: the soil fill state is an input
//! (`fill_fraction`), not carried over from previous periods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::PeriodWeather;
use crate::error::{CoreError, Result};
use crate::model::Variable;
use crate::tables::SoilCropTables;

/// Root-zone capacity derived from soil and crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsableReserve {
    /// Usable reserve (mm).
    pub ru: f64,
    /// Depth of fine soil explored by roots (cm).
    pub fine_soil_depth: f64,
    /// Typical rooting depth of the crop (cm).
    pub rooting_depth: f64,
}

/// Outcome of the irrigation rule for one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrrigationDecision {
    /// Water deficit against the target reserve (mm); negative means surplus.
    pub need: f64,
    pub irrigate: bool,
    /// Irrigation duration (min), when a duration factor is configured.
    pub duration: Option<f64>,
}

/// Soil, crop and decision parameters of a water balance evaluation.
///
/// Fields missing from a serialized form take their value from
/// [`BalanceParameters::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceParameters {
    pub texture: String,
    pub crop: String,
    pub stage: String,

    /// Volume fraction of stones and gravel, in `[0, 1]`.
    pub stoniness_fraction: f64,

    /// Fraction of the usable reserve currently filled, in `[0, 1]`.
    pub fill_fraction: f64,

    /// Share of RU readily usable by the crop, conventionally 1/2 to 2/3.
    pub ru_to_rfu_ratio: f64,

    /// Target reserve (mm); the computed RFU when absent.
    pub target_rfu: Option<f64>,

    /// Irrigate only when the need exceeds this height (mm).
    pub irrigation_threshold: f64,

    /// Minutes of irrigation per mm of need.
    pub duration_factor: Option<f64>,
}

impl Default for BalanceParameters {
    /// Tomatoes at mid-season on a silty soil with 10 % stones, a 0.67
    /// RU to RFU ratio, a 0.1 mm threshold and 10 min of irrigation per mm.
    fn default() -> Self {
        Self {
            stoniness_fraction: 0.1,
            ru_to_rfu_ratio: 0.67,
            irrigation_threshold: 0.1,
            duration_factor: Some(10.0),
            ..Self::new("Terres limoneuses", "Tomate", "Mi-saison")
        }
    }
}

impl BalanceParameters {
    /// Parameters with a stone-free, fully filled soil, a 2/3 RU to RFU
    /// ratio, no threshold and no duration conversion.
    pub fn new(texture: impl Into<String>, crop: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            crop: crop.into(),
            stage: stage.into(),
            stoniness_fraction: 0.0,
            fill_fraction: 1.0,
            ru_to_rfu_ratio: 2.0 / 3.0,
            target_rfu: None,
            irrigation_threshold: 0.0,
            duration_factor: None,
        }
    }
}

/// Balance result for one evaluation period. One row of the summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hours: usize,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub global_radiation: Option<f64>,
    pub precipitation: f64,
    pub etp: f64,
    pub texture: String,
    pub crop: String,
    pub stage: String,
    pub rooting_depth: f64,
    pub fine_soil_depth: f64,
    pub ru: f64,
    pub rfu: f64,
    pub target_rfu: f64,
    pub etm: f64,
    pub irrigation_need: f64,
    pub irrigation: bool,
    pub irrigation_duration: Option<f64>,
}

/// Usable reserve of the root zone.
///
/// `fine_soil_depth = rooting_depth · (1 − stoniness)` and
/// `RU = coefficient(texture) · fine_soil_depth · fill_fraction`.
///
/// # Errors
///
/// [`CoreError::InvalidInput`] when a fraction is outside `[0, 1]`,
/// [`CoreError::UnknownCrop`] or [`CoreError::UnknownTexture`] on table misses.
pub fn compute_usable_reserve(
    tables: &SoilCropTables,
    texture: &str,
    stoniness_fraction: f64,
    crop: &str,
    fill_fraction: f64,
) -> Result<UsableReserve> {
    check_fraction("stoniness_fraction", stoniness_fraction)?;
    check_fraction("fill_fraction", fill_fraction)?;

    let rooting_depth = tables.rooting_depth(crop)?;
    let coefficient = tables.texture_coefficient(texture)?;
    let fine_soil_depth = rooting_depth * (1.0 - stoniness_fraction);

    Ok(UsableReserve {
        ru: coefficient * fine_soil_depth * fill_fraction,
        fine_soil_depth,
        rooting_depth,
    })
}

/// Readily usable reserve: `RU · ratio`.
pub fn compute_readily_usable_reserve(ru: f64, ru_to_rfu_ratio: f64) -> Result<f64> {
    check_fraction("ru_to_rfu_ratio", ru_to_rfu_ratio)?;
    check_finite("ru", ru)?;
    Ok(ru * ru_to_rfu_ratio)
}

/// Crop evapotranspiration (ETM): `Kc(crop, stage) · ETP`.
pub fn compute_crop_demand(
    tables: &SoilCropTables,
    crop: &str,
    stage: &str,
    etp_period_total: f64,
) -> Result<f64> {
    check_finite("etp", etp_period_total)?;
    Ok(tables.crop_coefficient(crop, stage)? * etp_period_total)
}

/// Apply the irrigation rule to the period's water terms.
pub fn decide_irrigation(
    target_rfu: f64,
    rfu: f64,
    precipitation: f64,
    etm: f64,
    threshold: f64,
    duration_factor: Option<f64>,
) -> IrrigationDecision {
    let need = target_rfu - (rfu + precipitation - etm);
    let irrigate = need > threshold;
    let duration = duration_factor.map(|factor| if irrigate { factor * need } else { 0.0 });

    IrrigationDecision {
        need,
        irrigate,
        duration,
    }
}

/// Evaluate the water balance of one aggregated period.
///
/// # Errors
///
/// - [`CoreError::MissingData`] if the period has no ETP or no precipitation.
/// - [`CoreError::InvalidInput`] for out-of-range parameters.
/// - Table misses as in [`compute_usable_reserve`] and [`compute_crop_demand`].
pub fn evaluate_balance(
    tables: &SoilCropTables,
    params: &BalanceParameters,
    weather: &PeriodWeather,
) -> Result<PeriodSummary> {
    let etp = weather.get(Variable::Etp).ok_or(CoreError::MissingData {
        variable: Variable::Etp,
    })?;
    let precipitation = weather
        .get(Variable::Precipitation)
        .ok_or(CoreError::MissingData {
            variable: Variable::Precipitation,
        })?;
    check_finite("precipitation", precipitation)?;
    check_finite("irrigation_threshold", params.irrigation_threshold)?;
    if let Some(target) = params.target_rfu {
        check_finite("target_rfu", target)?;
    }
    if let Some(factor) = params.duration_factor {
        if !factor.is_finite() || factor < 0.0 {
            return Err(CoreError::InvalidInput {
                field: "duration_factor",
                value: factor,
                expected: "a finite, non-negative number of minutes per mm",
            });
        }
    }

    let reserve = compute_usable_reserve(
        tables,
        &params.texture,
        params.stoniness_fraction,
        &params.crop,
        params.fill_fraction,
    )?;
    let rfu = compute_readily_usable_reserve(reserve.ru, params.ru_to_rfu_ratio)?;
    let etm = compute_crop_demand(tables, &params.crop, &params.stage, etp)?;
    let target_rfu = params.target_rfu.unwrap_or(rfu);

    let decision = decide_irrigation(
        target_rfu,
        rfu,
        precipitation,
        etm,
        params.irrigation_threshold,
        params.duration_factor,
    );

    debug!(
        ru = reserve.ru,
        rfu,
        etm,
        precipitation,
        need = decision.need,
        irrigate = decision.irrigate,
        "evaluated water balance"
    );

    Ok(PeriodSummary {
        start: weather.start,
        end: weather.end,
        hours: weather.hours,
        temperature: weather.get(Variable::Temperature),
        relative_humidity: weather.get(Variable::RelativeHumidity),
        wind_speed: weather.get(Variable::WindSpeed),
        global_radiation: weather.get(Variable::GlobalRadiation),
        precipitation,
        etp,
        texture: params.texture.clone(),
        crop: params.crop.clone(),
        stage: params.stage.clone(),
        rooting_depth: reserve.rooting_depth,
        fine_soil_depth: reserve.fine_soil_depth,
        ru: reserve.ru,
        rfu,
        target_rfu,
        etm,
        irrigation_need: decision.need,
        irrigation: decision.irrigate,
        irrigation_duration: decision.duration,
    })
}

fn check_fraction(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidInput {
            field,
            value,
            expected: "a fraction within [0, 1]",
        })
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CoreError::InvalidInput {
            field,
            value,
            expected: "a finite height in mm",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn tables() -> SoilCropTables {
        SoilCropTables::builtin().unwrap()
    }

    fn period(precipitation: f64, etp: f64) -> PeriodWeather {
        PeriodWeather {
            start: Utc.with_ymd_and_hms(2025, 1, 4, 16, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 5, 15, 0, 0).unwrap(),
            hours: 24,
            values: BTreeMap::from([
                (Variable::Precipitation, precipitation),
                (Variable::Etp, etp),
                (Variable::Temperature, 279.0),
            ]),
        }
    }

    #[test]
    fn usable_reserve_loam_tomato() {
        let r = compute_usable_reserve(&tables(), "Terres limoneuses", 0.0, "Tomate", 1.0).unwrap();
        assert_relative_eq!(r.ru, 54.0);
        assert_relative_eq!(r.fine_soil_depth, 30.0);
        assert_relative_eq!(r.rooting_depth, 30.0);
    }

    #[test]
    fn stones_reduce_fine_soil() {
        let r = compute_usable_reserve(&tables(), "Terres limoneuses", 0.1, "Tomate", 1.0).unwrap();
        assert_relative_eq!(r.fine_soil_depth, 27.0);
        assert_relative_eq!(r.ru, 48.6, epsilon = 1e-12);
        assert_relative_eq!(r.rooting_depth, 30.0);
    }

    #[test]
    fn usable_reserve_is_linear_in_fill() {
        let t = tables();
        let full = compute_usable_reserve(&t, "Terres sableuses", 0.2, "Carotte", 1.0).unwrap();
        for fill in [0.0, 0.25, 0.5, 0.9] {
            let r = compute_usable_reserve(&t, "Terres sableuses", 0.2, "Carotte", fill).unwrap();
            assert_relative_eq!(r.ru, full.ru * fill, epsilon = 1e-12);
            assert_relative_eq!(r.fine_soil_depth, full.fine_soil_depth);
        }
    }

    #[test]
    fn fractions_are_validated_not_clamped() {
        let t = tables();
        assert!(matches!(
            compute_usable_reserve(&t, "Terres limoneuses", 1.2, "Tomate", 1.0),
            Err(CoreError::InvalidInput { field: "stoniness_fraction", .. })
        ));
        assert!(matches!(
            compute_usable_reserve(&t, "Terres limoneuses", 0.0, "Tomate", -0.1),
            Err(CoreError::InvalidInput { field: "fill_fraction", .. })
        ));
        assert!(matches!(
            compute_readily_usable_reserve(54.0, f64::NAN),
            Err(CoreError::InvalidInput { field: "ru_to_rfu_ratio", .. })
        ));
    }

    #[test]
    fn usable_reserve_table_misses() {
        let t = tables();
        assert!(matches!(
            compute_usable_reserve(&t, "Terres limoneuses", 0.0, "Maïs", 1.0),
            Err(CoreError::UnknownCrop { .. })
        ));
        assert!(matches!(
            compute_usable_reserve(&t, "Tourbe", 0.0, "Tomate", 1.0),
            Err(CoreError::UnknownTexture { .. })
        ));
    }

    #[test]
    fn readily_usable_reserve_two_thirds() {
        assert_relative_eq!(compute_readily_usable_reserve(54.0, 2.0 / 3.0).unwrap(), 36.0);
    }

    #[test]
    fn crop_demand_scales_etp() {
        assert_relative_eq!(compute_crop_demand(&tables(), "Tomate", "Mi-saison", 4.0).unwrap(), 4.6);
        assert!(matches!(
            compute_crop_demand(&tables(), "Tomate", "Récolte", 4.0),
            Err(CoreError::UnknownStage { .. })
        ));
    }

    #[test]
    fn deficit_triggers_irrigation() {
        let d = decide_irrigation(36.0, 36.0, 2.0, 5.0, 0.1, Some(10.0));
        assert_relative_eq!(d.need, 3.0);
        assert!(d.irrigate);
        assert_relative_eq!(d.duration.unwrap(), 30.0);
    }

    #[test]
    fn surplus_does_not_irrigate() {
        let d = decide_irrigation(36.0, 36.0, 10.0, 5.0, 0.1, Some(10.0));
        assert_relative_eq!(d.need, -5.0);
        assert!(!d.irrigate);
        assert_eq!(d.duration, Some(0.0));
    }

    #[test]
    fn need_at_threshold_does_not_irrigate() {
        let d = decide_irrigation(36.0, 36.0, 0.0, 0.5, 0.5, None);
        assert!(!d.irrigate);
        assert_eq!(d.duration, None);
    }

    #[test]
    fn evaluate_balance_composes_everything() {
        let mut params = BalanceParameters::new("Terres limoneuses", "Tomate", "Mi-saison");
        params.irrigation_threshold = 0.1;
        params.duration_factor = Some(10.0);

        // ETM = 1.15 * 4 = 4.6, need = 36 - (36 + 1 - 4.6) = 3.6
        let summary = evaluate_balance(&tables(), &params, &period(1.0, 4.0)).unwrap();
        assert_relative_eq!(summary.ru, 54.0);
        assert_relative_eq!(summary.rfu, 36.0);
        assert_relative_eq!(summary.target_rfu, 36.0);
        assert_relative_eq!(summary.etm, 4.6, epsilon = 1e-12);
        assert_relative_eq!(summary.irrigation_need, 3.6, epsilon = 1e-12);
        assert!(summary.irrigation);
        assert_relative_eq!(summary.irrigation_duration.unwrap(), 36.0, epsilon = 1e-9);
        assert_eq!(summary.temperature, Some(279.0));
        assert_eq!(summary.wind_speed, None);
    }

    #[test]
    fn explicit_target_overrides_rfu() {
        let mut params = BalanceParameters::new("Terres limoneuses", "Tomate", "Initial");
        params.target_rfu = Some(40.0);

        // ETM = 0.6 * 5 = 3, need = 40 - (36 + 0 - 3) = 7
        let summary = evaluate_balance(&tables(), &params, &period(0.0, 5.0)).unwrap();
        assert_relative_eq!(summary.irrigation_need, 7.0, epsilon = 1e-12);
        assert!(summary.irrigation);
        assert_eq!(summary.irrigation_duration, None);
    }

    #[test]
    fn period_without_etp_is_missing_data() {
        let mut weather = period(1.0, 0.0);
        weather.values.remove(&Variable::Etp);
        let params = BalanceParameters::new("Terres limoneuses", "Tomate", "Initial");
        assert_eq!(
            evaluate_balance(&tables(), &params, &weather).unwrap_err(),
            CoreError::MissingData {
                variable: Variable::Etp
            }
        );
    }
}
