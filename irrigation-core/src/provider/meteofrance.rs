use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{model::Station, normalize::RawRecord};

use super::{ObservationProvider, truncate_body};

const TOKEN_URL: &str = "https://portail-api.meteofrance.fr/token";
const PACKAGE_API_URL: &str = "https://public-api.meteofrance.fr/public/DPPaquetObs/v1";

const STATION_COLUMN: &str = "geo_id_insee";
const TIME_COLUMN: &str = "validity_time";
/// Package columns that are not observations.
const METADATA_COLUMNS: &[&str] = &[STATION_COLUMN, TIME_COLUMN, "reference_time", "insert_time"];

/// Client of the Météo-France hourly observation package API (`DPPaquetObs`).
///
/// Authenticates with OAuth2 client credentials: the application id is sent
/// as Basic credentials to obtain a bearer token, fetched on first use and
/// refreshed once when the API reports it as expired.
#[derive(Debug)]
pub struct MeteoFranceProvider {
    application_id: String,
    http: Client,
    token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StationRow {
    #[serde(rename = "Id_station")]
    id: String,
    #[serde(rename = "Nom_usuel")]
    name: String,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "Altitude", default)]
    altitude: f64,
    #[serde(rename = "posteOuvert", default)]
    open: Option<bool>,
    #[serde(rename = "postePublic", default)]
    public: Option<bool>,
    #[serde(rename = "typePoste", default)]
    kind: Option<u8>,
}

impl MeteoFranceProvider {
    pub fn new(application_id: String) -> Self {
        Self {
            application_id,
            http: Client::new(),
            token: Mutex::new(None),
        }
    }

    async fn obtain_token(&self) -> Result<String> {
        let res = self
            .http
            .post(TOKEN_URL)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", self.application_id),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Failed to send token request to Météo-France")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Météo-France token response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Météo-France token request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).context("Failed to parse Météo-France token JSON")?;

        debug!("obtained Météo-France access token");
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }

    async fn current_token(&self) -> Result<String> {
        let cached = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(token) => Ok(token),
            None => self.obtain_token().await,
        }
    }

    async fn send_get(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<(StatusCode, String)> {
        let res = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Météo-France ({url})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Météo-France response body")?;
        Ok((status, body))
    }

    /// GET with bearer authentication, refreshing the token once on expiry.
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let token = self.current_token().await?;
        let (mut status, mut body) = self.send_get(url, query, &token).await?;

        if token_has_expired(status, &body) {
            debug!("Météo-France token expired, refreshing");
            let token = self.obtain_token().await?;
            (status, body) = self.send_get(url, query, &token).await?;
        }

        if !status.is_success() {
            return Err(anyhow!(
                "Météo-France request to {} failed with status {}: {}",
                url,
                status,
                truncate_body(&body),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl ObservationProvider for MeteoFranceProvider {
    async fn list_stations(&self) -> Result<Vec<Station>> {
        let url = format!("{PACKAGE_API_URL}/liste-stations");
        let body = self.get(&url, &[]).await?;
        let stations = parse_station_list(&body)?;
        info!(count = stations.len(), "downloaded station list");
        Ok(stations)
    }

    async fn fetch_hourly(&self, stations: &[Station]) -> Result<Vec<RawRecord>> {
        let wanted: BTreeSet<&str> = stations.iter().map(|s| s.id.as_str()).collect();
        let departments = stations
            .iter()
            .map(|s| department_of(&s.id))
            .collect::<Result<BTreeSet<_>>>()?;

        let url = format!("{PACKAGE_API_URL}/paquet/horaire");
        let mut records = Vec::new();
        for department in departments {
            let query = [
                ("id-departement", department.to_string()),
                ("format", "csv".to_string()),
            ];
            let body = self.get(&url, &query).await?;
            let rows = parse_package(&body, &wanted)
                .with_context(|| format!("Invalid hourly package for department {department}"))?;
            info!(department, rows = rows.len(), "downloaded hourly package");
            records.extend(rows);
        }
        Ok(records)
    }
}

/// The API answers 401 with a JSON description mentioning an invalid JWT
/// once the bearer token has expired.
fn token_has_expired(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNAUTHORIZED && body.contains("Invalid JWT token")
}

/// Department number encoded in the leading digits of an 8-digit station id.
fn department_of(station_id: &str) -> Result<u64> {
    let id: u64 = station_id
        .trim()
        .parse()
        .with_context(|| format!("Station id '{station_id}' is not numeric"))?;
    Ok(id / 1_000_000)
}

fn semicolon_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

/// Parse the `;`-separated station directory.
pub fn parse_station_list(text: &str) -> Result<Vec<Station>> {
    semicolon_reader(text)
        .deserialize::<StationRow>()
        .map(|row| {
            let row = row.context("Failed to parse Météo-France station list")?;
            let mut station =
                Station::new(row.id, row.name, row.latitude, row.longitude, row.altitude);
            station.open = row.open;
            station.public = row.public;
            station.kind = row.kind;
            Ok(station)
        })
        .collect()
}

/// Parse a `;`-separated hourly package, keeping rows of the `wanted`
/// stations. Cells that are empty or not numbers are dropped.
pub fn parse_package(text: &str, wanted: &BTreeSet<&str>) -> Result<Vec<RawRecord>> {
    let mut reader = semicolon_reader(text);
    let headers = reader
        .headers()
        .context("Failed to read hourly package header")?
        .clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Hourly package has no '{name}' column"))
    };
    let station_idx = position(STATION_COLUMN)?;
    let time_idx = position(TIME_COLUMN)?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read hourly package row")?;
        let station_id = record.get(station_idx).unwrap_or_default();
        if !wanted.contains(station_id) {
            continue;
        }

        let raw_time = record.get(time_idx).unwrap_or_default();
        let time = DateTime::parse_from_rfc3339(raw_time)
            .with_context(|| format!("Invalid validity time '{raw_time}'"))?
            .with_timezone(&Utc);

        let values = headers
            .iter()
            .zip(record.iter())
            .filter(|(label, _)| !METADATA_COLUMNS.contains(label))
            .filter_map(|(label, cell)| cell.parse::<f64>().ok().map(|v| (label.to_string(), v)))
            .collect();

        records.push(RawRecord {
            station_id: station_id.to_string(),
            time,
            values,
        });
    }
    Ok(records)
}
