use crate::{
    Config,
    model::Station,
    normalize::RawRecord,
    provider::meteofrance::MeteoFranceProvider,
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod meteofrance;

/// Station category excluded from interpolation.
const EXCLUDED_STATION_KIND: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    MeteoFrance,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::MeteoFrance => "meteofrance",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::MeteoFrance]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "meteofrance" | "meteo-france" => Ok(ProviderId::MeteoFrance),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: meteofrance."
            )),
        }
    }
}

/// Source of station metadata and raw hourly observations.
#[async_trait]
pub trait ObservationProvider: Send + Sync + Debug {
    async fn list_stations(&self) -> anyhow::Result<Vec<Station>>;

    /// Raw hourly rows for the given stations, in provider labels and units.
    async fn fetch_hourly(&self, stations: &[Station]) -> anyhow::Result<Vec<RawRecord>>;
}

/// Keep stations that are open, public and not of the excluded category.
/// Flags the directory does not publish do not exclude a station.
pub fn filter_valid_stations(stations: Vec<Station>) -> Vec<Station> {
    stations
        .into_iter()
        .filter(|s| {
            s.open != Some(false)
                && s.public != Some(false)
                && s.kind != Some(EXCLUDED_STATION_KIND)
        })
        .collect()
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Box<dyn ObservationProvider>> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No application id configured for provider '{id}'.\n\
                 Hint: run `irrigation configure` and enter your application id."
        )
    })?;

    let boxed: Box<dyn ObservationProvider> = match id {
        ProviderId::MeteoFrance => Box::new(MeteoFranceProvider::new(api_key.to_owned())),
    };

    Ok(boxed)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(
    config: &Config,
) -> anyhow::Result<Box<dyn ObservationProvider>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
