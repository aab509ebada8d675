//! Dashboard configuration
//!
//! Source locations and defaults, read from the environment (after `.env` is
//! loaded by the binary) and overridable from the command line.

use crate::error::{DashboardError, Result};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_CRIME_PATH: &str =
    "Index_Crimes_by_County_and_Agency__Beginning_1990_20250906.csv";
pub const DEFAULT_POPULATION_PATH: &str =
    "Annual_Population_Estimates_for_New_York_State_and_Counties__Beginning_1970_20250907.csv";
pub const DEFAULT_BOUNDARY_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json";
pub const DEFAULT_WINDOW_YEARS: u32 = 5;
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardConfig {
    pub crime_path: PathBuf,
    pub population_path: PathBuf,
    pub boundary_url: String,
    /// Years before the latest one covered by the default selection
    pub window_years: u32,
    pub top_n: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            crime_path: PathBuf::from(DEFAULT_CRIME_PATH),
            population_path: PathBuf::from(DEFAULT_POPULATION_PATH),
            boundary_url: DEFAULT_BOUNDARY_URL.to_string(),
            window_years: DEFAULT_WINDOW_YEARS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl DashboardConfig {
    /// Read `CRIME_DATA_PATH`, `POPULATION_DATA_PATH`, `BOUNDARY_URL`,
    /// `DEFAULT_WINDOW_YEARS` and `TOP_N`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("CRIME_DATA_PATH") {
            config.crime_path = PathBuf::from(path);
        }
        if let Some(path) = get("POPULATION_DATA_PATH") {
            config.population_path = PathBuf::from(path);
        }
        if let Some(url) = get("BOUNDARY_URL") {
            config.boundary_url = url;
        }
        if let Some(window) = get("DEFAULT_WINDOW_YEARS") {
            config.window_years = window.trim().parse().map_err(|_| {
                DashboardError::Config(format!("DEFAULT_WINDOW_YEARS must be a whole number, got '{}'", window))
            })?;
        }
        if let Some(top_n) = get("TOP_N") {
            config.top_n = top_n.trim().parse().map_err(|_| {
                DashboardError::Config(format!("TOP_N must be a whole number, got '{}'", top_n))
            })?;
        }

        Ok(config)
    }
}
