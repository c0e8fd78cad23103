use chrono::{Duration, TimeZone, Utc};
use irrigation_core::balance::decide_irrigation;
use irrigation_core::etp::solar::clarity_index;
use irrigation_core::etp::{HourInputs, atmospheric_pressure, hourly_etp, psychrometric_constant};
use irrigation_core::{
    HourlySeries, Station, Variable, interpolate_inverse_distance, select_neighbors,
};
use proptest::prelude::*;

const REFERENCE: [f64; 2] = [48.541356, -1.6154];

fn stations_strategy() -> impl Strategy<Value = Vec<Station>> {
    prop::collection::vec((47.0..50.0f64, -3.5..0.5f64), 0..20).prop_map(|coords| {
        coords
            .into_iter()
            .enumerate()
            .map(|(i, (lat, lon))| Station::new(format!("{i:08}"), format!("S{i}"), lat, lon, 0.0))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn larger_radius_never_loses_neighbors(
        stations in stations_strategy(),
        r1 in 0.0..150.0f64,
        extra in 0.0..150.0f64,
    ) {
        let small = select_neighbors(&stations, REFERENCE, r1).unwrap();
        let large = select_neighbors(&stations, REFERENCE, r1 + extra).unwrap();

        prop_assert!(small.len() <= large.len());
        for n in small.iter() {
            let same = large.iter().find(|m| m.station.id == n.station.id);
            prop_assert_eq!(same.map(|m| m.distance_km), Some(n.distance_km));
            prop_assert!(n.distance_km <= r1);
        }
        let d = large.distances();
        prop_assert!(d.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn clarity_stays_in_unit_interval(observed in -1.0..10.0f64, clear_sky in -1.0..10.0f64) {
        if let Some(c) = clarity_index(observed, clear_sky) {
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn hourly_etp_is_never_negative(
        temperature in 250.0..320.0f64,
        relative_humidity in 0.0..100.0f64,
        wind_speed_2m in 0.0..20.0f64,
        radiation in 0.0..4.0f64,
        clarity in 0.0..=1.0f64,
        altitude in 0.0..3000.0f64,
    ) {
        let gamma = psychrometric_constant(atmospheric_pressure(altitude));
        let hour = HourInputs { temperature, relative_humidity, wind_speed_2m, radiation, clarity };
        prop_assert!(hourly_etp(&hour, gamma) >= 0.0);
    }

    #[test]
    fn single_neighbor_is_reproduced(
        values in prop::collection::vec(prop::option::of(270.0..300.0f64), 1..30),
        distance in 0.0..50.0f64,
    ) {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut series = HourlySeries::new();
        for (i, v) in values.iter().enumerate() {
            if let Some(v) = v {
                series.insert(start + Duration::hours(i as i64), Variable::Temperature, *v);
            }
        }

        let out = interpolate_inverse_distance(std::slice::from_ref(&series), &[distance]).unwrap();
        prop_assert_eq!(out.len(), series.len());
        for (time, row) in series.iter() {
            let got = out.get(*time, Variable::Temperature).unwrap();
            prop_assert_eq!(got, row[&Variable::Temperature]);
        }
    }

    #[test]
    fn rain_reduces_need_one_for_one(
        rfu in 0.0..100.0f64,
        precipitation in 0.0..50.0f64,
        extra in 0.0..50.0f64,
        etm in 0.0..10.0f64,
    ) {
        let dry = decide_irrigation(rfu, rfu, precipitation, etm, 0.0, None);
        let wet = decide_irrigation(rfu, rfu, precipitation + extra, etm, 0.0, None);
        prop_assert!((dry.need - wet.need - extra).abs() < 1e-9);
        prop_assert!(!(wet.irrigate && !dry.irrigate));
    }
}
