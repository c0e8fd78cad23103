//! CSV persistence of stations, neighbors, hourly series and period summaries.
//!
//! Every writer has a reader that accepts its output. Hourly series use a wide
//! layout: a `time` column (RFC 3339, UTC) and one column per variable, with
//! an empty cell for a missing value.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::balance::PeriodSummary;
use crate::geo::{Neighbor, NeighborSet};
use crate::model::{HourlySeries, Observation, Station, StationId, Variable};
use crate::normalize::RawRecord;

const TIME_COLUMN: &str = "time";

#[derive(Debug, Serialize, Deserialize)]
struct NeighborRow {
    id: StationId,
    name: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    distance_km: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawRow {
    station_id: StationId,
    time: DateTime<Utc>,
    label: String,
    value: f64,
}

pub fn write_stations(path: &Path, stations: &[Station]) -> Result<()> {
    write_rows(path, stations.iter())
}

pub fn read_stations(path: &Path) -> Result<Vec<Station>> {
    read_rows(path)
}

pub fn write_neighbors(path: &Path, neighbors: &NeighborSet) -> Result<()> {
    write_rows(
        path,
        neighbors.iter().map(|n| NeighborRow {
            id: n.station.id.clone(),
            name: n.station.name.clone(),
            latitude: n.station.latitude,
            longitude: n.station.longitude,
            altitude: n.station.altitude,
            distance_km: n.distance_km,
        }),
    )
}

pub fn read_neighbors(path: &Path) -> Result<NeighborSet> {
    let rows: Vec<NeighborRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| Neighbor {
            station: Station::new(r.id, r.name, r.latitude, r.longitude, r.altitude),
            distance_km: r.distance_km,
        })
        .collect::<Vec<_>>()
        .into())
}

pub fn write_summaries(path: &Path, summaries: &[PeriodSummary]) -> Result<()> {
    write_rows(path, summaries.iter())
}

pub fn read_summaries(path: &Path) -> Result<Vec<PeriodSummary>> {
    read_rows(path)
}

/// Store raw provider rows in long layout (`station_id,time,label,value`) so
/// that a run can be replayed without the network.
pub fn write_raw_records(path: &Path, records: &[RawRecord]) -> Result<()> {
    write_rows(
        path,
        records.iter().flat_map(|r| {
            r.values.iter().map(|(label, value)| RawRow {
                station_id: r.station_id.clone(),
                time: r.time,
                label: label.clone(),
                value: *value,
            })
        }),
    )
}

/// Inverse of [`write_raw_records`]; one record per (station, time, label).
pub fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>> {
    let rows: Vec<RawRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| RawRecord {
            station_id: r.station_id,
            time: r.time,
            values: vec![(r.label, r.value)],
        })
        .collect())
}

pub fn write_series(path: &Path, series: &HourlySeries) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(path)?);

    let mut header = vec![TIME_COLUMN];
    header.extend(Variable::all().iter().map(Variable::as_str));
    writer
        .write_record(&header)
        .with_context(|| format!("Failed to write CSV header: {}", path.display()))?;

    for (time, observation) in series.iter() {
        let mut record = vec![time.to_rfc3339_opts(SecondsFormat::Secs, true)];
        record.extend(
            Variable::all()
                .iter()
                .map(|v| observation.get(v).map(f64::to_string).unwrap_or_default()),
        );
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write CSV row: {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV file: {}", path.display()))?;
    Ok(())
}

pub fn read_series(path: &Path) -> Result<HourlySeries> {
    let mut reader = csv::Reader::from_reader(open(path)?);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .clone();
    if headers.get(0) != Some(TIME_COLUMN) {
        return Err(anyhow!(
            "Expected '{TIME_COLUMN}' as first column in {}",
            path.display()
        ));
    }
    let variables = headers
        .iter()
        .skip(1)
        .map(Variable::try_from)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Invalid series header in {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
        let raw_time = record.get(0).unwrap_or_default();
        let time = DateTime::parse_from_rfc3339(raw_time)
            .with_context(|| format!("Invalid time '{raw_time}' on row {}", line + 1))?
            .with_timezone(&Utc);

        let mut observation = Observation::new();
        for (variable, cell) in variables.iter().zip(record.iter().skip(1)) {
            if cell.trim().is_empty() {
                continue;
            }
            let value: f64 = cell.trim().parse().with_context(|| {
                format!("Invalid {variable} value '{cell}' on row {}", line + 1)
            })?;
            observation.insert(*variable, value);
        }
        rows.push((time, observation));
    }

    Ok(rows.into_iter().collect())
}

fn write_rows<T: Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write CSV row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV file: {}", path.display()))?;
    Ok(())
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    csv::Reader::from_reader(open(path)?)
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))
}
