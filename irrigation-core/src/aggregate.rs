//! Reduction of an hourly series to one record per evaluation period.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HourlySeries, Variable};

/// How a variable is reduced over a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Mean,
}

impl Aggregation {
    pub fn for_variable(variable: Variable) -> Self {
        match variable {
            Variable::Precipitation | Variable::Etp | Variable::GlobalRadiation => Aggregation::Sum,
            Variable::Temperature | Variable::RelativeHumidity | Variable::WindSpeed => {
                Aggregation::Mean
            }
        }
    }

    fn apply(self, values: impl Iterator<Item = f64>) -> Option<f64> {
        let (count, total) = values.fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
        match (self, count) {
            (_, 0) => None,
            (Aggregation::Sum, _) => Some(total),
            (Aggregation::Mean, n) => Some(total / n as f64),
        }
    }
}

/// Aggregated weather over one evaluation period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodWeather {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Number of hourly rows in the period.
    pub hours: usize,
    /// Aggregated value per variable; variables without any value are absent.
    pub values: BTreeMap<Variable, f64>,
}

impl PeriodWeather {
    pub fn get(&self, variable: Variable) -> Option<f64> {
        self.values.get(&variable).copied()
    }
}

/// Aggregate a whole series: sums for water and energy amounts, means for
/// state variables. Missing hours are skipped. Returns `None` for an empty
/// series.
pub fn aggregate_period(series: &HourlySeries) -> Option<PeriodWeather> {
    let start = series.first_time()?;
    let end = series.last_time()?;

    let values = Variable::all()
        .iter()
        .filter_map(|&variable| {
            Aggregation::for_variable(variable)
                .apply(series.values(variable))
                .map(|value| (variable, value))
        })
        .collect();

    Some(PeriodWeather {
        start,
        end,
        hours: series.len(),
        values,
    })
}
