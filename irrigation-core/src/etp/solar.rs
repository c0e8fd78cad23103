//! Solar geometry, clear-sky radiation and the clarity index.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Solar constant (MJ m-2 min-1).
pub const SOLAR_CONSTANT: f64 = 0.0820;

/// Incoming radiation below this value (MJ m-2 h-1) is treated as night.
pub const DAYLIGHT_TOLERANCE: f64 = 1e-8;

/// Solar declination (rad) for a day of year.
pub fn declination(day_of_year: u32) -> f64 {
    0.409 * (2.0 * PI / 365.0 * day_of_year as f64 - 1.39).sin()
}

/// Inverse relative distance Earth-Sun for a day of year.
pub fn inverse_relative_distance(day_of_year: u32) -> f64 {
    1.0 + 0.033 * (2.0 * PI / 365.0 * day_of_year as f64).cos()
}

/// Seasonal correction for solar time (hours).
pub fn seasonal_correction(day_of_year: u32) -> f64 {
    let b = 2.0 * PI * (day_of_year as f64 - 81.0) / 364.0;
    0.1645 * (2.0 * b).sin() - 0.1255 * b.cos() - 0.025 * b.sin()
}

/// Sunset hour angle (rad).
pub fn sunset_hour_angle(latitude_rad: f64, declination: f64) -> f64 {
    (-latitude_rad.tan() * declination.tan()).clamp(-1.0, 1.0).acos()
}

/// Daylight parts of the hour centred on `time`, as solar time angle
/// intervals `(ω1, ω2)` in rad.
///
/// The hour spans `ω ± π/24` around the solar time angle of the timestamp.
/// Only the part within `[−ωs, ωs]` counts. Under the midnight sun an hour
/// straddling solar midnight yields one interval on each side of `±π`.
///
/// `timezone_offset_hours` converts the UTC timestamp to local standard clock
/// time; its meridian is the centre of the local time zone.
pub fn hour_angle_window(
    time: DateTime<Utc>,
    latitude_rad: f64,
    longitude_deg: f64,
    timezone_offset_hours: f64,
) -> impl Iterator<Item = (f64, f64)> {
    let doy = time.ordinal();
    let clock = time.hour() as f64 + time.minute() as f64 / 60.0 + timezone_offset_hours;

    // Both longitudes expressed in degrees west of Greenwich.
    let zone_meridian = (-15.0 * timezone_offset_hours).rem_euclid(360.0);
    let local_meridian = (-longitude_deg).rem_euclid(360.0);
    let solar_time = clock + (zone_meridian - local_meridian) / 15.0 + seasonal_correction(doy);

    let omega = (PI / 12.0 * (solar_time - 12.0) + PI).rem_euclid(2.0 * PI) - PI;
    let half_width = PI / 24.0;
    let omega_s = sunset_hour_angle(latitude_rad, declination(doy));

    (-1..=1).filter_map(move |turn| {
        let centre = omega + 2.0 * PI * turn as f64;
        let omega_1 = (centre - half_width).max(-omega_s);
        let omega_2 = (centre + half_width).min(omega_s);
        (omega_1 < omega_2).then_some((omega_1, omega_2))
    })
}

/// Extraterrestrial radiation over the hour (MJ m-2 h-1).
pub fn extraterrestrial_radiation(
    time: DateTime<Utc>,
    latitude_deg: f64,
    longitude_deg: f64,
    timezone_offset_hours: f64,
) -> f64 {
    let doy = time.ordinal();
    let phi = latitude_deg.to_radians();
    let delta = declination(doy);

    let ra: f64 = hour_angle_window(time, phi, longitude_deg, timezone_offset_hours)
        .map(|(omega_1, omega_2)| {
            12.0 * 60.0 / PI
                * SOLAR_CONSTANT
                * inverse_relative_distance(doy)
                * ((omega_2 - omega_1) * phi.sin() * delta.sin()
                    + phi.cos() * delta.cos() * (omega_2.sin() - omega_1.sin()))
        })
        .sum();

    ra.max(0.0)
}

/// Clear-sky radiation (MJ m-2 h-1) at `altitude` metres.
pub fn clear_sky_radiation(extraterrestrial: f64, altitude: f64) -> f64 {
    (0.75 + 2e-5 * altitude) * extraterrestrial
}

/// Ratio of observed to clear-sky radiation, clipped to `[0, 1]`.
///
/// Returns `None` at night, when the observed radiation is below
/// [`DAYLIGHT_TOLERANCE`] or not a number.
pub fn clarity_index(observed: f64, clear_sky: f64) -> Option<f64> {
    if observed.is_nan() || observed <= DAYLIGHT_TOLERANCE {
        return None;
    }
    if clear_sky <= DAYLIGHT_TOLERANCE {
        // Light measured while the sun is geometrically down.
        return Some(1.0);
    }
    Some((observed / clear_sky).clamp(0.0, 1.0))
}

/// Fill night hours with a daytime clarity value.
///
/// Two passes over the hourly clarity values (`None` is night):
///
/// 1. forward: each night run that follows daylight takes the value observed
///    two hours before its first night hour, or the last daylight hour when the
///    daylight run lasted a single hour;
/// 2. backward: a night run at the start of the series takes the value of the
///    second daylight hour, or the first one if the daylight run is shorter.
///
/// Without any daylight hour the input is returned unchanged.
pub fn fill_night_clarity(clarity: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut filled = clarity.to_vec();

    let Some(sunrise) = clarity.iter().position(Option::is_some) else {
        return filled;
    };

    let mut i = sunrise;
    while i < clarity.len() {
        if clarity[i].is_some() {
            i += 1;
            continue;
        }
        let before_sunset = i
            .checked_sub(2)
            .and_then(|j| clarity[j])
            .or(clarity[i - 1]);
        while i < clarity.len() && clarity[i].is_none() {
            filled[i] = before_sunset;
            i += 1;
        }
    }

    let after_sunrise = clarity
        .get(sunrise + 1)
        .copied()
        .flatten()
        .or(clarity[sunrise]);
    for value in &mut filled[..sunrise] {
        *value = after_sunrise;
    }

    filled
}
