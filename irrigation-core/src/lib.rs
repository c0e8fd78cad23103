//! Core library for the `irrigation` CLI.
//!
//! This crate defines:
//! - Neighbor selection and inverse-distance interpolation of station weather
//! - Hourly reference evapotranspiration (FAO-56 Penman-Monteith)
//! - Soil water balance and irrigation decision
//! - Configuration, the Météo-France observation provider and CSV persistence
//!
//! The computations (`geo`, `etp`, `balance`) are pure and report
//! [`CoreError`]; the I/O collaborators return `anyhow::Result`.

pub mod aggregate;
pub mod balance;
pub mod config;
pub mod error;
pub mod etp;
pub mod geo;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod tables;
pub mod tabular;

pub use aggregate::{PeriodWeather, aggregate_period};
pub use balance::{
    BalanceParameters, PeriodSummary, UsableReserve, compute_crop_demand,
    compute_readily_usable_reserve, compute_usable_reserve, evaluate_balance,
};
pub use config::Config;
pub use error::{CoreError, Result};
pub use etp::{EtpParameters, compute_etp, compute_etp_with};
pub use geo::{Neighbor, NeighborSet, interpolate_inverse_distance, select_neighbors};
pub use model::{HourlySeries, ReferencePoint, Station, StationId, Variable};
pub use normalize::{RawRecord, VariableMapping, normalize_records};
pub use pipeline::{Evaluation, Localized, evaluate, localize};
pub use provider::{ObservationProvider, ProviderId, filter_valid_stations};
pub use tables::SoilCropTables;
