//! Map boundary collaborator
//!
//! County boundary polygons arrive as a GeoJSON FeatureCollection keyed by a
//! 5-digit county identifier. Only the identifiers matter here: county-view
//! FIPS codes must match them string for string.

use crate::aggregate::CountyAggregate;
use crate::error::{DashboardError, Result};
use crate::normalize::normalize_fips;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct BoundarySet {
    ids: BTreeSet<String>,
    geojson: Value,
}

impl BoundarySet {
    pub fn from_geojson(geojson: Value) -> Result<Self> {
        let features = geojson
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DashboardError::BoundaryUnavailable("GeoJSON has no 'features' array".to_string())
            })?;

        let mut ids = BTreeSet::new();
        let mut without_id = 0usize;
        for feature in features {
            let id = match feature.get("id") {
                Some(Value::String(s)) => normalize_fips(s),
                Some(Value::Number(n)) => normalize_fips(&n.to_string()),
                _ => None,
            };
            match id {
                Some(id) => {
                    ids.insert(id);
                }
                None => without_id += 1,
            }
        }

        if without_id > 0 {
            warn!("{} boundary features carry no county id", without_id);
        }
        Ok(Self { ids, geojson })
    }

    pub fn contains(&self, fips: &str) -> bool {
        self.ids.contains(fips)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The collection as fetched, for a presentation layer to draw.
    pub fn geojson(&self) -> &Value {
        &self.geojson
    }

    /// Counties that cannot be placed on the map: no FIPS, or a FIPS with no
    /// boundary polygon.
    pub fn unmapped<'a>(&self, county_view: &'a [CountyAggregate]) -> Vec<&'a CountyAggregate> {
        county_view
            .iter()
            .filter(|c| c.fips.as_deref().map_or(true, |fips| !self.contains(fips)))
            .collect()
    }
}

fn unavailable(location: &str, reason: impl std::fmt::Display) -> DashboardError {
    DashboardError::BoundaryUnavailable(format!("{}: {}", location, reason))
}

/// Fetch boundaries over HTTP(S), or read them from a local file when the
/// location is not a URL.
pub async fn load_boundaries(client: &reqwest::Client, location: &str) -> Result<BoundarySet> {
    let geojson: Value = if location.starts_with("http://") || location.starts_with("https://") {
        client
            .get(location)
            .send()
            .await
            .map_err(|e| unavailable(location, e))?
            .error_for_status()
            .map_err(|e| unavailable(location, e))?
            .json::<Value>()
            .await
            .map_err(|e| unavailable(location, e))?
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        let text = tokio::fs::read_to_string(Path::new(path))
            .await
            .map_err(|e| unavailable(location, e))?;
        serde_json::from_str(&text).map_err(|e| unavailable(location, e))?
    };

    let boundaries = BoundarySet::from_geojson(geojson)?;
    info!("Loaded {} county boundaries from {}", boundaries.len(), location);
    Ok(boundaries)
}
