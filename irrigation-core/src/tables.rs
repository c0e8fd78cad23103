//! Soil and crop reference tables.
//!
//! Loaded once and passed by reference to the water balance; never mutated.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Usable water per cm of fine soil (mm/cm), by texture class.
const USABLE_WATER_PER_CM: &[(&str, f64)] = &[
    ("Terres argileuses", 1.85),
    ("Argiles sableuses", 1.7),
    ("Argiles sablo-limoneuses", 1.8),
    ("Argiles limono-sableuses", 1.8),
    ("Argiles limoneuses", 1.9),
    ("Terres argilo-sableuses", 1.7),
    ("Terres argilo-limono-sableuses", 1.8),
    ("Terres argilo-limoneuses", 2.0),
    ("Terres sablo-argileuses", 1.4),
    ("Terres sablo-limono-argileuses", 1.5),
    ("Terres limono-sablo-argileuses", 1.65),
    ("Terres limono-argileuses", 2.0),
    ("Terres sableuses", 0.7),
    ("Terres sablo-limoneuses", 1.0),
    ("Terres limono-sableuses", 1.55),
    ("Terres limoneuses", 1.8),
];

/// Typical rooting depth (cm), by crop.
const ROOTING_DEPTH_CM: &[(&str, f64)] = &[
    ("Ail", 20.0),
    ("Artichaut", 20.0),
    ("Asperge", 20.0),
    ("Aubergine", 30.0),
    ("Betterave", 20.0),
    ("Carotte", 30.0),
    ("Chou fleur", 20.0),
    ("Choux", 20.0),
    ("Courge", 30.0),
    ("Courgette", 30.0),
    ("Epinard", 20.0),
    ("Fraisier", 30.0),
    ("Haricot", 20.0),
    ("Melon", 30.0),
    ("Oignon", 20.0),
    ("Poireau", 30.0),
    ("Pois", 20.0),
    ("Poivron", 30.0),
    ("Pomme de terre", 30.0),
    ("Radis", 15.0),
    ("Salade", 15.0),
    ("Soja", 20.0),
    ("Tomate de conserve", 30.0),
    ("Tomate", 30.0),
];

const CROP_COEFFICIENTS_JSON: &str = include_str!("../data/crop_coefficients.json");

/// Crop coefficients by crop, then by growth stage.
pub type CropCoefficients = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilCropTables {
    /// mm of usable water per cm of fine soil, by texture.
    pub usable_water_per_cm: BTreeMap<String, f64>,
    /// Typical rooting depth in cm, by crop.
    pub rooting_depth_cm: BTreeMap<String, f64>,
    pub crop_coefficients: CropCoefficients,
}

impl SoilCropTables {
    /// Tables shipped with the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        let crop_coefficients: CropCoefficients = serde_json::from_str(CROP_COEFFICIENTS_JSON)
            .context("Failed to parse built-in crop coefficient table")?;

        let tables = Self {
            usable_water_per_cm: to_map(USABLE_WATER_PER_CM),
            rooting_depth_cm: to_map(ROOTING_DEPTH_CM),
            crop_coefficients,
        };
        tables.check()?;
        Ok(tables)
    }

    /// Replace the crop coefficients with the JSON table at `path`
    /// (`{"crop": {"stage": kc, ...}, ...}`).
    pub fn with_crop_coefficients_file(mut self, path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read crop coefficient file: {}", path.display()))?;

        self.crop_coefficients = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse crop coefficient file: {}", path.display()))?;

        self.check()?;
        Ok(self)
    }

    pub fn texture_coefficient(&self, texture: &str) -> Result<f64> {
        self.usable_water_per_cm
            .get(texture)
            .copied()
            .ok_or_else(|| CoreError::UnknownTexture {
                texture: texture.to_string(),
            })
    }

    pub fn rooting_depth(&self, crop: &str) -> Result<f64> {
        self.rooting_depth_cm
            .get(crop)
            .copied()
            .ok_or_else(|| CoreError::UnknownCrop {
                crop: crop.to_string(),
            })
    }

    pub fn crop_coefficient(&self, crop: &str, stage: &str) -> Result<f64> {
        let stages = self
            .crop_coefficients
            .get(crop)
            .ok_or_else(|| CoreError::UnknownCrop {
                crop: crop.to_string(),
            })?;

        stages
            .get(stage)
            .copied()
            .ok_or_else(|| CoreError::UnknownStage {
                crop: crop.to_string(),
                stage: stage.to_string(),
            })
    }

    pub fn textures(&self) -> impl Iterator<Item = &str> {
        self.usable_water_per_cm.keys().map(String::as_str)
    }

    /// Crops present in both the rooting depth and crop coefficient tables.
    pub fn crops(&self) -> impl Iterator<Item = &str> {
        self.crop_coefficients
            .keys()
            .filter(|crop| self.rooting_depth_cm.contains_key(*crop))
            .map(String::as_str)
    }

    pub fn stages<'a>(&'a self, crop: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.crop_coefficients
            .get(crop)
            .into_iter()
            .flat_map(|stages| stages.keys().map(String::as_str))
    }

    fn check(&self) -> anyhow::Result<()> {
        let bad = |v: f64| !v.is_finite() || v < 0.0;

        if let Some((texture, _)) = self.usable_water_per_cm.iter().find(|(_, v)| bad(**v)) {
            return Err(anyhow!("Invalid usable water coefficient for texture '{texture}'"));
        }
        if let Some((crop, _)) = self.rooting_depth_cm.iter().find(|(_, v)| bad(**v)) {
            return Err(anyhow!("Invalid rooting depth for crop '{crop}'"));
        }
        for (crop, stages) in &self.crop_coefficients {
            if let Some((stage, _)) = stages.iter().find(|(_, v)| bad(**v)) {
                return Err(anyhow!("Invalid crop coefficient for '{crop}' at stage '{stage}'"));
            }
        }
        Ok(())
    }
}

fn to_map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
