//! Mapping of provider column labels to canonical variables and units.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{HourlySeries, StationId, Variable};

/// How one provider column becomes a canonical variable:
/// `canonical = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub variable: Variable,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl ColumnSpec {
    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn convert(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// Provider label → canonical variable mapping.
///
/// Example TOML:
/// [mapping.temp_c]
/// variable = "temperature"
/// offset = 273.15
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMapping {
    columns: BTreeMap<String, ColumnSpec>,
}

impl Default for VariableMapping {
    fn default() -> Self {
        Self::meteo_france()
    }
}

impl VariableMapping {
    /// Columns of the Météo-France hourly observation package.
    ///
    /// The package already reports kelvin, %, m/s, J/m² and mm.
    pub fn meteo_france() -> Self {
        Self::from_iter([
            ("t", ColumnSpec::new(Variable::Temperature)),
            ("u", ColumnSpec::new(Variable::RelativeHumidity)),
            ("ff", ColumnSpec::new(Variable::WindSpeed)),
            ("ray_glo01", ColumnSpec::new(Variable::GlobalRadiation)),
            ("rr1", ColumnSpec::new(Variable::Precipitation)),
        ])
    }

    pub fn get(&self, label: &str) -> Option<&ColumnSpec> {
        self.columns.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Canonical variable and value for a raw provider value, or `None` when
    /// the label is not mapped or the value is not a finite number.
    pub fn convert(&self, label: &str, raw: f64) -> Option<(Variable, f64)> {
        let spec = self.columns.get(label)?;
        let value = spec.convert(raw);
        value.is_finite().then_some((spec.variable, value))
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnSpec)> for VariableMapping {
    fn from_iter<I: IntoIterator<Item = (S, ColumnSpec)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One provider observation row before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub station_id: StationId,
    pub time: DateTime<Utc>,
    /// `(label, raw value)` pairs in provider units.
    pub values: Vec<(String, f64)>,
}

/// Group raw rows by station into canonical hourly series.
///
/// Unmapped labels are ignored and non-finite values treated as missing.
/// When a station has several rows for the same hour, later rows overwrite
/// earlier ones variable by variable.
pub fn normalize_records(
    records: impl IntoIterator<Item = RawRecord>,
    mapping: &VariableMapping,
) -> BTreeMap<StationId, HourlySeries> {
    let mut by_station: BTreeMap<StationId, HourlySeries> = BTreeMap::new();
    let mut rows = 0usize;

    for record in records {
        rows += 1;
        let converted: Vec<_> = record
            .values
            .iter()
            .filter_map(|(label, raw)| mapping.convert(label, *raw))
            .collect();
        if converted.is_empty() {
            continue;
        }

        let series = by_station.entry(record.station_id).or_default();
        for (variable, value) in converted {
            series.insert(record.time, variable, value);
        }
    }

    debug!(rows, stations = by_station.len(), "normalized observation records");
    by_station
}
