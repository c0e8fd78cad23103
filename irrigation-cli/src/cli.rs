use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use inquire::{CustomType, Password, Select, Text};
use tracing::info;

use irrigation_core::{
    Config, NeighborSet, PeriodSummary, ProviderId, SoilCropTables, Station, evaluate,
    filter_valid_stations, localize, normalize_records, provider::default_provider_from_config,
    select_neighbors, tabular,
};

const STATIONS_FILE: &str = "stations.csv";
const NEIGHBORS_FILE: &str = "neighbors.csv";
const RAW_FILE: &str = "raw_observations.csv";
const SERIES_FILE: &str = "localized_series.csv";
const SUMMARIES_FILE: &str = "summaries.csv";

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "irrigation",
    version,
    about = "Irrigation needs from nearby weather station observations"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set credentials, reference point and soil/crop parameters.
    Configure,

    /// Show the station directory, from cache unless `--refresh` is given.
    Stations {
        #[arg(long)]
        refresh: bool,
    },

    /// List the stations around the reference point.
    Neighbors {
        /// Search radius (km); the configured one when absent.
        #[arg(long)]
        radius: Option<f64>,
    },

    /// Localize observations, compute ETP and evaluate the water balance.
    Balance {
        /// Reuse the last downloaded observations instead of calling the API.
        #[arg(long)]
        replay: bool,

        /// Evaluation window (hours).
        #[arg(long)]
        hours: Option<i64>,

        #[arg(long)]
        crop: Option<String>,

        #[arg(long)]
        stage: Option<String>,

        /// Fraction of the usable reserve currently filled [0-1].
        #[arg(long)]
        fill_fraction: Option<f64>,

        /// Minimum need (mm) that triggers irrigation.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show soil textures, crops and crop coefficients.
    Tables {
        /// Show the growth stages and Kc of this crop.
        #[arg(long)]
        crop: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure => configure(&mut config),
            Command::Stations { refresh } => {
                config.validate()?;
                let stations = load_stations(&config, refresh).await?;
                print_stations(&stations);
                Ok(())
            }
            Command::Neighbors { radius } => {
                if let Some(radius) = radius {
                    config.site.radius_km = radius;
                }
                config.validate()?;
                let neighbors = neighbors(&config).await?;
                print_neighbors(&neighbors);
                Ok(())
            }
            Command::Balance {
                replay,
                hours,
                crop,
                stage,
                fill_fraction,
                threshold,
            } => {
                if let Some(hours) = hours {
                    config.site.window_hours = hours;
                }
                if let Some(crop) = crop {
                    config.balance.crop = crop;
                }
                if let Some(stage) = stage {
                    config.balance.stage = stage;
                }
                if let Some(fill_fraction) = fill_fraction {
                    config.balance.fill_fraction = fill_fraction;
                }
                if let Some(threshold) = threshold {
                    config.balance.irrigation_threshold = threshold;
                }
                config.validate()?;
                let summary = balance(&config, replay).await?;
                print_summary(&summary);
                Ok(())
            }
            Command::Tables { crop } => {
                let tables = load_tables(&config)?;
                print_tables(&tables, crop.as_deref())
            }
        }
    }
}

fn configure(config: &mut Config) -> Result<()> {
    let tables = load_tables(config)?;

    let provider = Select::new("Observation provider:", ProviderId::all().to_vec()).prompt()?;
    let application_id = Password::new(&format!("{provider} application id:"))
        .without_confirmation()
        .with_help_message("Base64 client credentials from the provider's API portal")
        .prompt()?;
    if !application_id.trim().is_empty() {
        config.upsert_provider_api_key(provider, application_id.trim().to_string());
        config.set_default_provider(provider);
    }

    let site = &mut config.site;
    site.reference.name = Text::new("Reference point name:")
        .with_default(&site.reference.name)
        .prompt()?;
    site.reference.latitude = CustomType::<f64>::new("Latitude (°):")
        .with_default(site.reference.latitude)
        .prompt()?;
    site.reference.longitude = CustomType::<f64>::new("Longitude (°):")
        .with_default(site.reference.longitude)
        .prompt()?;
    site.reference.altitude = CustomType::<f64>::new("Altitude (m):")
        .with_default(site.reference.altitude)
        .prompt()?;
    site.radius_km = CustomType::<f64>::new("Neighbor radius (km):")
        .with_default(site.radius_km)
        .prompt()?;

    let balance = &mut config.balance;
    balance.texture = select("Soil texture:", tables.textures(), &balance.texture)?;
    balance.stoniness_fraction = CustomType::<f64>::new("Stoniness fraction [0-1]:")
        .with_default(balance.stoniness_fraction)
        .prompt()?;
    balance.crop = select("Crop:", tables.crops(), &balance.crop)?;
    balance.stage = select("Growth stage:", tables.stages(&balance.crop), &balance.stage)?;
    balance.fill_fraction = CustomType::<f64>::new("Reserve fill fraction [0-1]:")
        .with_default(balance.fill_fraction)
        .with_help_message("Current soil state, `balance --fill-fraction` overrides it per run")
        .prompt()?;
    balance.ru_to_rfu_ratio = CustomType::<f64>::new("RU to RFU ratio [0-1]:")
        .with_default(balance.ru_to_rfu_ratio)
        .prompt()?;
    balance.irrigation_threshold = CustomType::<f64>::new("Irrigation threshold (mm):")
        .with_default(balance.irrigation_threshold)
        .prompt()?;
    balance.duration_factor = Some(
        CustomType::<f64>::new("Irrigation minutes per mm:")
            .with_default(balance.duration_factor.unwrap_or(10.0))
            .prompt()?,
    );

    config.validate()?;
    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

fn select<'a>(prompt: &str, options: impl Iterator<Item = &'a str>, current: &str) -> Result<String> {
    let options: Vec<String> = options.map(str::to_string).collect();
    let cursor = options.iter().position(|o| o == current).unwrap_or(0);
    Ok(Select::new(prompt, options)
        .with_starting_cursor(cursor)
        .prompt()?)
}

fn data_path(config: &Config, file: &str) -> Result<PathBuf> {
    Ok(config.data_dir()?.join(file))
}

fn load_tables(config: &Config) -> Result<SoilCropTables> {
    let tables = SoilCropTables::builtin()?;
    match &config.crop_coefficients {
        Some(path) => tables.with_crop_coefficients_file(path),
        None => Ok(tables),
    }
}

async fn load_stations(config: &Config, refresh: bool) -> Result<Vec<Station>> {
    let path = data_path(config, STATIONS_FILE)?;
    if !refresh && path.exists() {
        info!(path = %path.display(), "reading cached station list");
        return tabular::read_stations(&path);
    }

    let provider = default_provider_from_config(config)?;
    let stations = filter_valid_stations(provider.list_stations().await?);
    tabular::write_stations(&path, &stations)?;
    info!(count = stations.len(), path = %path.display(), "saved station list");
    Ok(stations)
}

async fn neighbors(config: &Config) -> Result<NeighborSet> {
    let stations = load_stations(config, false).await?;
    let neighbors = select_neighbors(
        &stations,
        config.site.reference.latlon(),
        config.site.radius_km,
    )?;
    tabular::write_neighbors(&data_path(config, NEIGHBORS_FILE)?, &neighbors)?;
    Ok(neighbors)
}

async fn balance(config: &Config, replay: bool) -> Result<PeriodSummary> {
    let stations = load_stations(config, false).await?;
    let neighbor_set = neighbors(config).await?;
    let raw_path = data_path(config, RAW_FILE)?;

    let raw = if replay {
        tabular::read_raw_records(&raw_path)
            .context("No observations to replay, run `irrigation balance` once without --replay")?
    } else {
        let provider = default_provider_from_config(config)?;
        let wanted: Vec<Station> = neighbor_set.iter().map(|n| n.station.clone()).collect();
        let raw = provider.fetch_hourly(&wanted).await?;
        tabular::write_raw_records(&raw_path, &raw)?;
        raw
    };

    let by_station = normalize_records(raw, &config.mapping);
    let point = &config.site.reference;
    let localized = localize(&stations, &by_station, point, config.site.radius_km)?;

    let tables = load_tables(config)?;
    let evaluation = evaluate(
        &tables,
        point,
        &localized.series,
        &config.etp,
        &config.balance,
        config.site.window_hours,
    )?;

    tabular::write_series(&data_path(config, SERIES_FILE)?, &evaluation.series)?;
    record_summary(&data_path(config, SUMMARIES_FILE)?, &evaluation.summary)?;
    Ok(evaluation.summary)
}

/// Append to the summary history, replacing a previous run over the same period.
fn record_summary(path: &Path, summary: &PeriodSummary) -> Result<()> {
    let mut history = if path.exists() {
        tabular::read_summaries(path)?
    } else {
        Vec::new()
    };
    history.retain(|s| (s.start, s.end) != (summary.start, summary.end));
    history.push(summary.clone());
    history.sort_by_key(|s| s.end);
    tabular::write_summaries(path, &history)
}

fn print_stations(stations: &[Station]) {
    println!("{} stations", stations.len());
    for s in stations {
        println!(
            "{:<10} {:<32} {:>9.4} {:>9.4} {:>6.0} m",
            s.id, s.name, s.latitude, s.longitude, s.altitude
        );
    }
}

fn print_neighbors(neighbors: &NeighborSet) {
    if neighbors.is_empty() {
        println!("No station within the radius.");
        return;
    }
    for n in neighbors.iter() {
        println!(
            "{:<10} {:<32} {:>7.2} km",
            n.station.id, n.station.name, n.distance_km
        );
    }
}

fn print_summary(s: &PeriodSummary) {
    println!("Period        {} .. {} ({} h)", s.start, s.end, s.hours);
    println!("Crop          {} ({}) on {}", s.crop, s.stage, s.texture);
    println!("Precipitation {:>8.2} mm", s.precipitation);
    println!("ETP           {:>8.2} mm", s.etp);
    println!("ETM           {:>8.2} mm", s.etm);
    println!("RU / RFU      {:>8.2} / {:.2} mm (target {:.2})", s.ru, s.rfu, s.target_rfu);
    println!("Need          {:>8.2} mm", s.irrigation_need);
    match (s.irrigation, s.irrigation_duration) {
        (true, Some(minutes)) => println!("Irrigate for {minutes:.0} min"),
        (true, None) => println!("Irrigate"),
        (false, _) => println!("No irrigation needed"),
    }
}

fn print_tables(tables: &SoilCropTables, crop: Option<&str>) -> Result<()> {
    if let Some(crop) = crop {
        let depth = tables.rooting_depth(crop)?;
        println!("{crop}: rooting depth {depth} cm");
        for stage in tables.stages(crop) {
            println!("  {:<16} Kc {:.3}", stage, tables.crop_coefficient(crop, stage)?);
        }
        return Ok(());
    }

    println!("Textures (mm of usable water per cm):");
    for texture in tables.textures() {
        println!("  {:<34} {:.2}", texture, tables.texture_coefficient(texture)?);
    }
    println!("Crops (rooting depth, cm):");
    for crop in tables.crops() {
        println!("  {:<34} {:.0}", crop, tables.rooting_depth(crop)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_balance_overrides() {
        let cli = Cli::try_parse_from([
            "irrigation",
            "-vv",
            "balance",
            "--replay",
            "--hours",
            "48",
            "--crop",
            "Salade",
            "--fill-fraction",
            "0.5",
            "--threshold",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Balance {
                replay,
                hours,
                crop,
                stage,
                fill_fraction,
                threshold,
            } => {
                assert!(replay);
                assert_eq!(hours, Some(48));
                assert_eq!(crop.as_deref(), Some("Salade"));
                assert_eq!(stage, None);
                assert_eq!(fill_fraction, Some(0.5));
                assert_eq!(threshold, Some(2.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn summary_history_replaces_same_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARIES_FILE);
        let summary = |day: u32, need: f64| PeriodSummary {
            start: Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, day, 23, 0, 0).unwrap(),
            hours: 24,
            temperature: None,
            relative_humidity: None,
            wind_speed: None,
            global_radiation: None,
            precipitation: 0.0,
            etp: 4.0,
            texture: "Terres limoneuses".into(),
            crop: "Tomate".into(),
            stage: "Mi-saison".into(),
            rooting_depth: 30.0,
            fine_soil_depth: 27.0,
            ru: 48.6,
            rfu: 32.562,
            target_rfu: 32.562,
            etm: 4.6,
            irrigation_need: need,
            irrigation: need > 0.1,
            irrigation_duration: Some(10.0 * need),
        };

        record_summary(&path, &summary(21, 4.6)).unwrap();
        record_summary(&path, &summary(20, 4.0)).unwrap();
        record_summary(&path, &summary(21, 3.0)).unwrap();

        let history = tabular::read_summaries(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].irrigation_need, 4.0);
        assert_eq!(history[1].irrigation_need, 3.0);
    }
}
