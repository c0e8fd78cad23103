//! End-to-end flow: station series → localized series → ETP → period balance.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::aggregate::aggregate_period;
use crate::balance::{BalanceParameters, PeriodSummary, evaluate_balance};
use crate::error::{CoreError, Result};
use crate::etp::{EtpParameters, compute_etp_with};
use crate::geo::{NeighborSet, interpolate_inverse_distance, select_neighbors};
use crate::model::{HourlySeries, ReferencePoint, Station, StationId, Variable};
use crate::tables::SoilCropTables;

/// Weather estimated at the reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct Localized {
    /// Every station within the radius, whether it reported or not.
    pub neighbors: NeighborSet,
    /// Number of neighbors that contributed a series.
    pub contributors: usize,
    pub series: HourlySeries,
}

/// Outcome of one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Localized series with the ETP column added.
    pub series: HourlySeries,
    pub summary: PeriodSummary,
}

/// Interpolate station series to the reference point from the stations
/// within `radius_km`. Neighbors without a series are skipped; without any
/// contributing neighbor the localized series is empty.
pub fn localize(
    stations: &[Station],
    series_by_station: &BTreeMap<StationId, HourlySeries>,
    point: &ReferencePoint,
    radius_km: f64,
) -> Result<Localized> {
    let neighbors = select_neighbors(stations, point.latlon(), radius_km)?;

    let (series, distances): (Vec<HourlySeries>, Vec<f64>) = neighbors
        .iter()
        .filter_map(|n| {
            series_by_station
                .get(&n.station.id)
                .map(|s| (s.clone(), n.distance_km))
        })
        .unzip();

    if neighbors.is_empty() {
        warn!(radius_km, point = %point.name, "no station within radius");
    } else if series.is_empty() {
        warn!(neighbors = neighbors.len(), "no neighbor reported observations");
    }
    info!(
        neighbors = neighbors.len(),
        contributors = series.len(),
        "localizing weather at {}",
        point.name
    );

    let localized = interpolate_inverse_distance(&series, &distances)?;
    Ok(Localized {
        neighbors,
        contributors: series.len(),
        series: localized,
    })
}

/// Compute ETP on the localized series, keep the last `window_hours` hours
/// and evaluate the water balance over them.
///
/// # Errors
///
/// [`CoreError::MissingData`] when the window holds no observation or lacks
/// ETP or precipitation, plus any error of the ETP and balance steps.
pub fn evaluate(
    tables: &SoilCropTables,
    point: &ReferencePoint,
    localized: &HourlySeries,
    etp: &EtpParameters,
    balance: &BalanceParameters,
    window_hours: i64,
) -> Result<Evaluation> {
    let series = compute_etp_with(localized, point, etp)?;
    let window = series.last_hours(window_hours);

    let weather = aggregate_period(&window).ok_or(CoreError::MissingData {
        variable: Variable::Etp,
    })?;
    let summary = evaluate_balance(tables, balance, &weather)?;

    info!(
        start = %summary.start,
        end = %summary.end,
        need = summary.irrigation_need,
        irrigation = summary.irrigation,
        "evaluated period"
    );
    Ok(Evaluation { series, summary })
}
