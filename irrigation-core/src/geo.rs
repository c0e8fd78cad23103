//! Neighbor station selection and inverse-distance-squared interpolation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::{HourlySeries, Station, Variable};

/// Mean earth radius used by the spherical distance (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A selected station and its great-circle distance to the reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub station: Station,
    pub distance_km: f64,
}

/// Stations within the selection radius, sorted by ascending distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborSet {
    neighbors: Vec<Neighbor>,
}

impl NeighborSet {
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.neighbors.iter().map(|n| n.distance_km).collect()
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.neighbors
    }
}

impl From<Vec<Neighbor>> for NeighborSet {
    fn from(neighbors: Vec<Neighbor>) -> Self {
        Self { neighbors }
    }
}

/// Haversine distance between two `[lat, lon]` points in degrees (km).
pub fn haversine_km(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lat1, lat2) = (a[0].to_radians(), b[0].to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b[1] - a[1]).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Select every station within `radius_km` of `reference_latlon`.
///
/// The result is sorted by ascending distance; stations at the same distance
/// keep their input order. An empty result is not an error.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] if the reference latitude is outside
/// ±90°, the longitude outside ±180°, or the radius is negative or non-finite.
pub fn select_neighbors(
    stations: &[Station],
    reference_latlon: [f64; 2],
    radius_km: f64,
) -> Result<NeighborSet> {
    let [lat, lon] = reference_latlon;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::InvalidInput {
            field: "latitude",
            value: lat,
            expected: "a latitude within [-90, 90] degrees",
        });
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(CoreError::InvalidInput {
            field: "longitude",
            value: lon,
            expected: "a longitude within [-180, 180] degrees",
        });
    }
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(CoreError::InvalidInput {
            field: "radius_km",
            value: radius_km,
            expected: "a finite, non-negative distance",
        });
    }

    let mut neighbors: Vec<Neighbor> = stations
        .iter()
        .filter_map(|station| {
            let distance_km = haversine_km(reference_latlon, [station.latitude, station.longitude]);
            (distance_km <= radius_km).then(|| Neighbor {
                station: station.clone(),
                distance_km,
            })
        })
        .collect();

    // sort_by is stable
    neighbors.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    debug!(
        candidates = stations.len(),
        selected = neighbors.len(),
        radius_km,
        "selected neighbor stations"
    );

    Ok(NeighborSet { neighbors })
}

/// Inverse-distance-squared average of per-station hourly series.
///
/// `series_by_station[i]` is observed at `distances[i]` km from the reference
/// point. For every timestamp and variable, only stations with a value
/// contribute. A station at distance zero that has a value is used as is.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] if the two slices differ in length or a
/// distance is negative or non-finite.
pub fn interpolate_inverse_distance(
    series_by_station: &[HourlySeries],
    distances: &[f64],
) -> Result<HourlySeries> {
    if series_by_station.len() != distances.len() {
        return Err(CoreError::InvalidInput {
            field: "distances",
            value: distances.len() as f64,
            expected: "one distance per station series",
        });
    }
    if let Some(&bad) = distances.iter().find(|d| !d.is_finite() || **d < 0.0) {
        return Err(CoreError::InvalidInput {
            field: "distance_km",
            value: bad,
            expected: "a finite, non-negative distance",
        });
    }

    let timestamps: BTreeSet<DateTime<Utc>> =
        series_by_station.iter().flat_map(|s| s.timestamps()).collect();

    let mut localized = HourlySeries::new();
    for time in timestamps {
        for &variable in Variable::all() {
            let contributions = series_by_station
                .iter()
                .zip(distances)
                .filter_map(|(series, &d)| series.get(time, variable).map(|v| (v, d)));

            if let Some(value) = weighted_value(contributions) {
                localized.insert(time, variable, value);
            }
        }
    }

    debug!(
        stations = series_by_station.len(),
        hours = localized.len(),
        "interpolated hourly series"
    );

    Ok(localized)
}

/// Weighted mean of `(value, distance)` pairs, or `None` if there are none.
///
/// A lone contributor is returned unchanged. A distance so small that its
/// weight overflows counts as zero.
fn weighted_value(contributions: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut first = None;
    let mut count = 0usize;

    for (value, distance) in contributions {
        let w = 1.0 / (distance * distance);
        if !w.is_finite() {
            return Some(value);
        }
        first.get_or_insert(value);
        count += 1;
        numerator += value * w;
        denominator += w;
    }

    match count {
        0 => None,
        1 => first,
        _ => Some(numerator / denominator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, h, 0, 0).unwrap()
    }

    fn stations() -> Vec<Station> {
        vec![
            Station::new("35281001", "Rennes-St Jacques", 48.0689, -1.7339, 36.0),
            Station::new("50025001", "Avranches", 48.6867, -1.3633, 50.0),
            Station::new("50215002", "Granville", 48.8380, -1.5683, 47.0),
            Station::new("35228001", "Pleurtuit", 48.5850, -2.0767, 58.0),
        ]
    }

    #[test]
    fn haversine_is_zero_on_same_point() {
        assert_eq!(haversine_km([48.5, -1.6], [48.5, -1.6]), 0.0);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        // pi * R / 180
        assert_relative_eq!(haversine_km([0.0, 0.0], [1.0, 0.0]), 111.19492664455873, epsilon = 1e-9);
    }

    #[test]
    fn select_neighbors_sorted_by_distance() {
        let set = select_neighbors(&stations(), [48.541356, -1.6154], 100.0).unwrap();
        let d = set.distances();
        assert_eq!(set.len(), 4);
        assert!(d.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn select_neighbors_radius_filters() {
        let set = select_neighbors(&stations(), [48.541356, -1.6154], 30.0).unwrap();
        let ids: Vec<_> = set.iter().map(|n| n.station.id.as_str()).collect();
        assert_eq!(ids, vec!["50025001"]);
    }

    #[test]
    fn select_neighbors_ties_keep_input_order() {
        let twins = vec![
            Station::new("b", "B", 48.0, -1.0, 0.0),
            Station::new("a", "A", 48.0, -1.0, 0.0),
        ];
        let set = select_neighbors(&twins, [48.1, -1.0], 50.0).unwrap();
        let ids: Vec<_> = set.iter().map(|n| n.station.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn select_neighbors_empty_is_ok() {
        let set = select_neighbors(&stations(), [0.0, 0.0], 10.0).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn select_neighbors_rejects_bad_inputs() {
        assert!(matches!(
            select_neighbors(&stations(), [91.0, 0.0], 10.0),
            Err(CoreError::InvalidInput { field: "latitude", .. })
        ));
        assert!(matches!(
            select_neighbors(&stations(), [0.0, -180.5], 10.0),
            Err(CoreError::InvalidInput { field: "longitude", .. })
        ));
        assert!(matches!(
            select_neighbors(&stations(), [0.0, 0.0], -1.0),
            Err(CoreError::InvalidInput { field: "radius_km", .. })
        ));
    }

    #[test]
    fn interpolation_weights_by_inverse_square() {
        let mut near = HourlySeries::new();
        near.insert(hour(0), Variable::Temperature, 280.0);
        let mut far = HourlySeries::new();
        far.insert(hour(0), Variable::Temperature, 290.0);

        let out = interpolate_inverse_distance(&[near, far], &[1.0, 2.0]).unwrap();
        // weights 1 and 1/4
        let expected = (280.0 + 290.0 / 4.0) / 1.25;
        assert_relative_eq!(out.get(hour(0), Variable::Temperature).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn interpolation_skips_missing_contributors() {
        let mut a = HourlySeries::new();
        a.insert(hour(0), Variable::Precipitation, 1.0);
        a.insert(hour(1), Variable::Precipitation, 2.0);
        let mut b = HourlySeries::new();
        b.insert(hour(0), Variable::Precipitation, 3.0);
        b.insert(hour(2), Variable::WindSpeed, 4.0);

        let out = interpolate_inverse_distance(&[a, b], &[5.0, 5.0]).unwrap();
        assert_relative_eq!(out.get(hour(0), Variable::Precipitation).unwrap(), 2.0);
        assert_relative_eq!(out.get(hour(1), Variable::Precipitation).unwrap(), 2.0);
        assert_eq!(out.get(hour(2), Variable::Precipitation), None);
        assert_relative_eq!(out.get(hour(2), Variable::WindSpeed).unwrap(), 4.0);
    }

    #[test]
    fn interpolation_zero_distance_wins() {
        let mut colocated = HourlySeries::new();
        colocated.insert(hour(0), Variable::Temperature, 275.0);
        let mut other = HourlySeries::new();
        other.insert(hour(0), Variable::Temperature, 300.0);

        let out = interpolate_inverse_distance(&[other, colocated], &[3.0, 0.0]).unwrap();
        assert_eq!(out.get(hour(0), Variable::Temperature), Some(275.0));
    }

    #[test]
    fn interpolation_zero_distance_without_value_falls_back() {
        let mut colocated = HourlySeries::new();
        colocated.insert(hour(0), Variable::WindSpeed, 1.0);
        let mut other = HourlySeries::new();
        other.insert(hour(0), Variable::Temperature, 300.0);

        let out = interpolate_inverse_distance(&[colocated, other], &[0.0, 3.0]).unwrap();
        assert_eq!(out.get(hour(0), Variable::Temperature), Some(300.0));
    }

    #[test]
    fn interpolation_single_contributor_is_exact() {
        let mut only = HourlySeries::new();
        only.insert(hour(0), Variable::Temperature, 299.09);

        let out = interpolate_inverse_distance(&[only], &[6.01]).unwrap();
        assert_eq!(out.get(hour(0), Variable::Temperature), Some(299.09));
    }

    #[test]
    fn interpolation_tiny_distance_acts_as_colocated() {
        let mut near = HourlySeries::new();
        near.insert(hour(0), Variable::Temperature, 281.0);
        let mut far = HourlySeries::new();
        far.insert(hour(0), Variable::Temperature, 290.0);

        let out = interpolate_inverse_distance(&[far, near], &[10.0, 1e-170]).unwrap();
        assert_eq!(out.get(hour(0), Variable::Temperature), Some(281.0));
    }

    #[test]
    fn interpolation_rejects_mismatched_lengths() {
        let result = interpolate_inverse_distance(&[HourlySeries::new()], &[]);
        assert!(matches!(result, Err(CoreError::InvalidInput { field: "distances", .. })));
    }

    #[test]
    fn interpolation_rejects_negative_distance() {
        let result = interpolate_inverse_distance(&[HourlySeries::new()], &[-2.0]);
        assert!(matches!(
            result,
            Err(CoreError::InvalidInput { field: "distance_km", value, .. }) if value == -2.0
        ));
    }
}
