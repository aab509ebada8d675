//! Dashboard session
//!
//! Loads both sources through the cache, reconciles them once, and recomputes
//! the presentation views for each selection.

use crate::aggregate::{
    agency_slice, aggregate_for_view, default_year_range, rank_counties, year_bounds, AgencyRow,
    DashboardViews, Rankings, ValueType, YearRange,
};
use crate::boundary::BoundarySet;
use crate::cache::SourceCache;
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::metrics::{Metric, MetricSet};
use crate::normalize::{CrimeRecord, PopulationRecord};
use crate::reconcile::{join_misses, reconcile, JoinMiss, ReconciledRecord};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// What the user picked in the filters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Selection {
    pub year_range: YearRange,
    pub metrics: MetricSet,
    pub value_type: ValueType,
}

impl Selection {
    /// Latest `window` years, index crimes, raw counts.
    pub fn default_for(bounds: YearRange, window: u32) -> Self {
        Self {
            year_range: default_year_range(bounds, window),
            metrics: [Metric::IndexTotal].into_iter().collect(),
            value_type: ValueType::Counts,
        }
    }
}

/// Everything the presentation layer needs for one selection.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardSnapshot {
    pub selection: Selection,
    pub views: DashboardViews,
    pub rankings: Rankings,
    pub agency_rows: Vec<AgencyRow>,
    /// Counties in the county view with no boundary polygon; empty when no
    /// boundaries are attached
    pub unmapped_counties: Vec<String>,
}

pub struct Dashboard {
    crime: Arc<Vec<CrimeRecord>>,
    reconciled: Vec<ReconciledRecord>,
    join_misses: Vec<JoinMiss>,
    boundaries: Option<Arc<BoundarySet>>,
}

impl Dashboard {
    pub fn load(cache: &mut SourceCache, config: &DashboardConfig) -> Result<Self> {
        let crime = cache.crime(&config.crime_path)?;
        let population = cache.population(&config.population_path)?;
        Ok(Self::from_records(crime, population))
    }

    pub fn from_records(crime: Arc<Vec<CrimeRecord>>, population: Arc<Vec<PopulationRecord>>) -> Self {
        let reconciled = reconcile(&crime, &population);
        let join_misses = join_misses(&reconciled, &population);
        info!(
            "Dashboard ready: {} agency rows, {} county-years",
            crime.len(),
            reconciled.len()
        );
        Self {
            crime,
            reconciled,
            join_misses,
            boundaries: None,
        }
    }

    pub async fn attach_boundaries(&mut self, cache: &mut SourceCache, location: &str) -> Result<()> {
        self.boundaries = Some(cache.boundaries(location).await?);
        Ok(())
    }

    pub fn reconciled(&self) -> &[ReconciledRecord] {
        &self.reconciled
    }

    pub fn join_misses(&self) -> &[JoinMiss] {
        &self.join_misses
    }

    pub fn boundaries(&self) -> Option<&BoundarySet> {
        self.boundaries.as_deref()
    }

    pub fn year_bounds(&self) -> Option<YearRange> {
        year_bounds(&self.reconciled)
    }

    pub fn default_selection(&self, window: u32) -> Option<Selection> {
        self.year_bounds().map(|bounds| Selection::default_for(bounds, window))
    }

    pub fn recompute(&self, selection: &Selection, top_n: usize) -> Result<DashboardSnapshot> {
        let views = aggregate_for_view(
            &self.reconciled,
            &selection.metrics,
            selection.year_range,
            selection.value_type,
        )?;
        let agency_rows = agency_slice(&self.crime, &selection.metrics, selection.year_range)?;
        let rankings = rank_counties(&views.county_view, selection.value_type, top_n);
        let unmapped_counties: Vec<String> = self
            .boundaries
            .as_ref()
            .map(|b| {
                b.unmapped(&views.county_view)
                    .into_iter()
                    .map(|c| c.county_norm.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(DashboardSnapshot {
            selection: selection.clone(),
            views,
            rankings,
            agency_rows,
            unmapped_counties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use crate::metrics::MetricValues;

    fn dashboard() -> Dashboard {
        let crime = (2010..=2020)
            .map(|year| {
                let mut metrics = MetricValues::default();
                metrics.set(Metric::IndexTotal, Some(100.0));
                CrimeRecord {
                    year,
                    county: "Albany".into(),
                    county_norm: "Albany".into(),
                    agency: Some("Albany City PD".into()),
                    months_reported: Some(12),
                    metrics,
                }
            })
            .collect();
        let population = vec![PopulationRecord {
            year: 2020,
            county_norm: "Albany".into(),
            fips: Some("36001".into()),
            population: Some(100_000.0),
        }];
        Dashboard::from_records(Arc::new(crime), Arc::new(population))
    }

    #[test]
    fn test_default_selection() {
        let selection = dashboard().default_selection(5).unwrap();
        assert_eq!(selection.year_range, YearRange { start: 2015, end: 2020 });
        assert!(selection.metrics.contains(&Metric::IndexTotal));
        assert_eq!(selection.value_type, ValueType::Counts);
    }

    #[test]
    fn test_recompute() {
        let dashboard = dashboard();
        let selection = dashboard.default_selection(5).unwrap();
        let snapshot = dashboard.recompute(&selection, 10).unwrap();

        assert_eq!(snapshot.views.kpi_view.total_selected, 600.0);
        assert_eq!(snapshot.agency_rows.len(), 6);
        assert!(snapshot.unmapped_counties.is_empty());
        assert_eq!(snapshot.views.county_view.len(), 1);
        let albany = &snapshot.views.county_view[0];
        assert_eq!(albany.fips.as_deref(), Some("36001"));
        assert_eq!(albany.combined_metric, Some(600.0));
        // 2015-2019 have no population estimate.
        assert_eq!(albany.combined_rate, None);
        assert_eq!(snapshot.rankings.top.len(), 1);
    }

    #[test]
    fn test_recompute_rejects_empty_selection() {
        let dashboard = dashboard();
        let mut selection = dashboard.default_selection(5).unwrap();
        selection.metrics.clear();
        assert!(matches!(
            dashboard.recompute(&selection, 10),
            Err(DashboardError::EmptySelection)
        ));
    }
}
