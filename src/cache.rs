//! Source cache
//!
//! Each source is read once per process and reused afterwards. The cache is a
//! plain value owned by the caller; dropping it is the only invalidation.

use crate::boundary::{load_boundaries, BoundarySet};
use crate::error::Result;
use crate::normalize::{
    normalize_crime_source, normalize_population_source, CrimeRecord, PopulationRecord, RawTable,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct SourceCache {
    crime: HashMap<PathBuf, Arc<Vec<CrimeRecord>>>,
    population: HashMap<PathBuf, Arc<Vec<PopulationRecord>>>,
    boundaries: HashMap<String, Arc<BoundarySet>>,
    client: reqwest::Client,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crime(&mut self, path: &Path) -> Result<Arc<Vec<CrimeRecord>>> {
        if let Some(records) = self.crime.get(path) {
            debug!("Crime source cache hit: {}", path.display());
            return Ok(Arc::clone(records));
        }
        let records = Arc::new(normalize_crime_source(&RawTable::from_path(path)?)?);
        self.crime.insert(path.to_path_buf(), Arc::clone(&records));
        Ok(records)
    }

    pub fn population(&mut self, path: &Path) -> Result<Arc<Vec<PopulationRecord>>> {
        if let Some(records) = self.population.get(path) {
            debug!("Population source cache hit: {}", path.display());
            return Ok(Arc::clone(records));
        }
        let records = Arc::new(normalize_population_source(&RawTable::from_path(path)?)?);
        self.population.insert(path.to_path_buf(), Arc::clone(&records));
        Ok(records)
    }

    pub async fn boundaries(&mut self, location: &str) -> Result<Arc<BoundarySet>> {
        if let Some(boundaries) = self.boundaries.get(location) {
            debug!("Boundary cache hit: {}", location);
            return Ok(Arc::clone(boundaries));
        }
        let boundaries = Arc::new(load_boundaries(&self.client, location).await?);
        self.boundaries.insert(location.to_string(), Arc::clone(&boundaries));
        Ok(boundaries)
    }

    pub fn len(&self) -> usize {
        self.crime.len() + self.population.len() + self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
