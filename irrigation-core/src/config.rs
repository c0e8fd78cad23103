use anyhow::{Context, Result, anyhow, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    balance::BalanceParameters, etp::EtpParameters, model::ReferencePoint,
    normalize::VariableMapping, provider::ProviderId,
};

/// Upper bound of the neighbor search radius (km).
pub const MAX_RADIUS_KM: f64 = 1000.0;

/// Configuration for a single provider (e.g., application id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Where weather is estimated and how stations are gathered around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Neighbor selection radius (km).
    pub radius_km: f64,
    /// Length of the evaluation period ending at the last observation (h).
    pub window_hours: i64,
    pub reference: ReferencePoint,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            radius_km: 35.0,
            window_hours: 24,
            reference: ReferencePoint::new("La Petite Claye", 48.541356, -1.6154, 50.0),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional default provider id, e.g. "meteofrance".
    pub default_provider: Option<String>,

    /// Directory for cached stations, observations and results; the
    /// platform data directory when absent.
    pub data_dir: Option<PathBuf>,

    /// JSON crop coefficient table replacing the built-in one.
    pub crop_coefficients: Option<PathBuf>,

    /// Example TOML:
    /// [providers.meteofrance]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    pub site: SiteConfig,
    pub balance: BalanceParameters,
    pub etp: EtpParameters,
    pub mapping: VariableMapping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            data_dir: None,
            crop_coefficients: None,
            providers: HashMap::new(),
            site: SiteConfig::default(),
            balance: BalanceParameters::default(),
            etp: EtpParameters::default(),
            mapping: VariableMapping::meteo_france(),
        }
    }
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow!(
                "No default provider configured.\n\
                 Hint: run `irrigation configure` first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Reject values the computations cannot use.
    pub fn validate(&self) -> Result<()> {
        let site = &self.site;
        ensure!(
            (0.0..=MAX_RADIUS_KM).contains(&site.radius_km),
            "site.radius_km must be within [0, {MAX_RADIUS_KM}] km, got {}",
            site.radius_km
        );
        ensure!(
            site.window_hours >= 1,
            "site.window_hours must be at least 1, got {}",
            site.window_hours
        );
        ensure!(
            (-90.0..=90.0).contains(&site.reference.latitude),
            "site.reference.latitude must be within [-90, 90], got {}",
            site.reference.latitude
        );
        ensure!(
            (-180.0..=180.0).contains(&site.reference.longitude),
            "site.reference.longitude must be within [-180, 180], got {}",
            site.reference.longitude
        );
        ensure!(
            site.reference.altitude.is_finite(),
            "site.reference.altitude must be a number"
        );

        for (name, value) in [
            ("balance.stoniness_fraction", self.balance.stoniness_fraction),
            ("balance.fill_fraction", self.balance.fill_fraction),
            ("balance.ru_to_rfu_ratio", self.balance.ru_to_rfu_ratio),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be within [0, 1], got {value}"
            );
        }
        ensure!(
            self.balance.irrigation_threshold.is_finite()
                && self.balance.irrigation_threshold >= 0.0,
            "balance.irrigation_threshold must be a non-negative number, got {}",
            self.balance.irrigation_threshold
        );
        if let Some(factor) = self.balance.duration_factor {
            ensure!(
                factor.is_finite() && factor >= 0.0,
                "balance.duration_factor must be a non-negative number, got {factor}"
            );
        }
        ensure!(
            (-12.0..=14.0).contains(&self.etp.timezone_offset_hours),
            "etp.timezone_offset_hours must be within [-12, 14], got {}",
            self.etp.timezone_offset_hours
        );
        ensure!(!self.mapping.is_empty(), "mapping must map at least one column");

        Ok(())
    }

    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "irrigation", "irrigation-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for cached and produced CSV files.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Convenience helper: set/replace a provider key and optionally set default provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns the key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }
}
