use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Station identifier as published by the station directory.
pub type StationId = String;

/// Canonical weather variables, always expressed in SI units inside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    /// Air temperature (K).
    Temperature,
    /// Relative humidity (%).
    RelativeHumidity,
    /// Wind speed at anemometer height (m/s).
    WindSpeed,
    /// Global radiation over the hour (J m-2).
    GlobalRadiation,
    /// Precipitation over the hour (mm).
    Precipitation,
    /// Potential evapotranspiration over the hour (mm).
    Etp,
}

impl Variable {
    /// Column name used in tabular files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::RelativeHumidity => "relative_humidity",
            Variable::WindSpeed => "wind_speed",
            Variable::GlobalRadiation => "global_radiation",
            Variable::Precipitation => "precipitation",
            Variable::Etp => "etp",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Variable::Temperature => "K",
            Variable::RelativeHumidity => "%",
            Variable::WindSpeed => "m s-1",
            Variable::GlobalRadiation => "J m-2",
            Variable::Precipitation | Variable::Etp => "mm",
        }
    }

    pub const fn all() -> &'static [Variable] {
        &[
            Variable::Temperature,
            Variable::RelativeHumidity,
            Variable::WindSpeed,
            Variable::GlobalRadiation,
            Variable::Precipitation,
            Variable::Etp,
        ]
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Variable {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Variable::all()
            .iter()
            .copied()
            .find(|v| v.as_str() == value.trim())
            .ok_or_else(|| anyhow::anyhow!("Unknown variable '{value}'."))
    }
}

/// A physical weather station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Whether the station is still operating, when the directory publishes it.
    #[serde(default)]
    pub open: Option<bool>,
    #[serde(default)]
    pub public: Option<bool>,
    /// Station category code, when the directory publishes it.
    #[serde(default)]
    pub kind: Option<u8>,
}

impl Station {
    pub fn new(
        id: impl Into<StationId>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            altitude,
            open: None,
            public: None,
            kind: None,
        }
    }
}

/// The virtual location at which weather is estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level (m).
    pub altitude: f64,
}

impl ReferencePoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn latlon(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Values observed (or estimated) for one hour. Absent keys are missing values.
pub type Observation = BTreeMap<Variable, f64>;

/// Hourly series of canonical variables, ordered by timestamp.
///
/// Timestamps are unique and strictly increasing by construction. A timestamp
/// is only present when at least one variable has a value for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlySeries {
    rows: BTreeMap<DateTime<Utc>, Observation>,
}

impl HourlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `variable` at `time`, replacing any previous value.
    pub fn insert(&mut self, time: DateTime<Utc>, variable: Variable, value: f64) {
        self.rows.entry(time).or_default().insert(variable, value);
    }

    pub fn get(&self, time: DateTime<Utc>, variable: Variable) -> Option<f64> {
        self.rows.get(&time).and_then(|row| row.get(&variable).copied())
    }

    pub fn row(&self, time: DateTime<Utc>) -> Option<&Observation> {
        self.rows.get(&time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Observation)> {
        self.rows.iter()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    /// Variables having at least one value in the series.
    pub fn variables(&self) -> BTreeSet<Variable> {
        self.rows.values().flat_map(|row| row.keys().copied()).collect()
    }

    pub fn has_values(&self, variable: Variable) -> bool {
        self.rows.values().any(|row| row.contains_key(&variable))
    }

    /// Non-missing values of `variable`, in time order.
    pub fn values(&self, variable: Variable) -> impl Iterator<Item = f64> + '_ {
        self.rows.values().filter_map(move |row| row.get(&variable).copied())
    }

    /// Rows with `start <= time <= end`.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> HourlySeries {
        if start > end {
            return HourlySeries::new();
        }
        Self {
            rows: self
                .rows
                .range(start..=end)
                .map(|(t, row)| (*t, row.clone()))
                .collect(),
        }
    }

    /// The trailing `hours` hours, ending at the last timestamp of the series.
    pub fn last_hours(&self, hours: i64) -> HourlySeries {
        match self.last_time() {
            Some(end) if hours > 0 => {
                let start = end - Duration::hours(hours) + Duration::seconds(1);
                self.window(start, end)
            }
            _ => HourlySeries::new(),
        }
    }
}

impl FromIterator<(DateTime<Utc>, Observation)> for HourlySeries {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, Observation)>>(iter: I) -> Self {
        let mut series = HourlySeries::new();
        for (time, row) in iter {
            for (variable, value) in row {
                series.insert(time, variable, value);
            }
        }
        series
    }
}
