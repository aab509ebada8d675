//! Filtered Aggregator
//!
//! Selection-driven views over the reconciled table: per-county totals for the
//! map and rankings, the statewide trend, KPI scalars and the agency slice.

use crate::error::{DashboardError, Result};
use crate::metrics::{Metric, MetricSet};
use crate::normalize::{canonical_field_name, CrimeRecord};
use crate::reconcile::ReconciledRecord;
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Inclusive range of years.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(DashboardError::InvalidYearRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Counts-vs-rate toggle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Counts,
    Per100k,
}

impl ValueType {
    /// The value a county is shown and ranked by.
    pub fn value_of(&self, county: &CountyAggregate) -> Option<f64> {
        match self {
            ValueType::Counts => county.combined_metric,
            ValueType::Per100k => county.combined_rate,
        }
    }

    fn value_of_record(&self, record: &ReconciledRecord, metric: Metric) -> Option<f64> {
        match self {
            ValueType::Counts => record.metrics.get(metric),
            ValueType::Per100k => record.rates.get(metric),
        }
    }
}

impl FromStr for ValueType {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match canonical_field_name(s).as_str() {
            "counts" | "count" => Ok(ValueType::Counts),
            "per_100k" | "per100k" | "rate" => Ok(ValueType::Per100k),
            _ => Err(DashboardError::UnknownValueType(s.to_string())),
        }
    }
}

/// Sum that keeps the missing marker: missing on either side is missing.
fn add_strict(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    Some(acc? + value?)
}

/// One county's totals over the selected years.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountyAggregate {
    pub county_norm: String,
    pub fips: Option<String>,
    pub combined_metric: Option<f64>,
    pub combined_rate: Option<f64>,
    /// Mean over the years that have a population estimate
    pub population: Option<f64>,
    pub years: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrendPoint {
    pub year: i32,
    pub values: BTreeMap<Metric, Option<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Kpi {
    pub total_selected: f64,
    pub start_year_total: f64,
    pub end_year_total: f64,
    pub period_change_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardViews {
    pub county_view: Vec<CountyAggregate>,
    pub trend_view: Vec<TrendPoint>,
    pub kpi_view: Kpi,
}

fn require_metrics(metrics: &MetricSet) -> Result<()> {
    if metrics.is_empty() {
        return Err(DashboardError::EmptySelection);
    }
    Ok(())
}

pub fn aggregate_for_view(
    reconciled: &[ReconciledRecord],
    metrics: &MetricSet,
    year_range: YearRange,
    value_type: ValueType,
) -> Result<DashboardViews> {
    require_metrics(metrics)?;
    YearRange::new(year_range.start, year_range.end)?;

    let views = DashboardViews {
        county_view: county_view(reconciled, metrics, year_range),
        trend_view: trend_view(reconciled, metrics, value_type),
        kpi_view: kpi_view(reconciled, metrics, year_range),
    };
    debug!(
        "Aggregated {} counties and {} trend years for {}",
        views.county_view.len(),
        views.trend_view.len(),
        year_range
    );
    Ok(views)
}

struct CountyAccumulator {
    fips: Option<String>,
    combined_metric: Option<f64>,
    combined_rate: Option<f64>,
    population_sum: f64,
    population_years: usize,
    years: usize,
}

impl Default for CountyAccumulator {
    fn default() -> Self {
        Self {
            fips: None,
            combined_metric: Some(0.0),
            combined_rate: Some(0.0),
            population_sum: 0.0,
            population_years: 0,
            years: 0,
        }
    }
}

fn county_view(
    reconciled: &[ReconciledRecord],
    metrics: &MetricSet,
    year_range: YearRange,
) -> Vec<CountyAggregate> {
    // A county's FIPS is fixed, but years without a population match carry
    // none; the first known code stands for the county.
    let mut grouped: BTreeMap<String, CountyAccumulator> = BTreeMap::new();

    for record in reconciled.iter().filter(|r| year_range.contains(r.year)) {
        let acc = grouped.entry(record.county_norm.clone()).or_default();
        if acc.fips.is_none() {
            acc.fips = record.fips.clone();
        }
        acc.combined_metric = add_strict(acc.combined_metric, record.metrics.sum_of(metrics));
        acc.combined_rate = add_strict(acc.combined_rate, record.rates.sum_of(metrics));
        if let Some(population) = record.population {
            acc.population_sum += population;
            acc.population_years += 1;
        }
        acc.years += 1;
    }

    grouped
        .into_iter()
        .map(|(county_norm, acc)| CountyAggregate {
            county_norm,
            fips: acc.fips,
            combined_metric: acc.combined_metric,
            combined_rate: acc.combined_rate,
            population: (acc.population_years > 0)
                .then(|| acc.population_sum / acc.population_years as f64),
            years: acc.years,
        })
        .collect()
}

fn trend_view(
    reconciled: &[ReconciledRecord],
    metrics: &MetricSet,
    value_type: ValueType,
) -> Vec<TrendPoint> {
    let mut by_year: BTreeMap<i32, BTreeMap<Metric, Option<f64>>> = BTreeMap::new();

    for record in reconciled {
        let values = by_year.entry(record.year).or_default();
        for metric in metrics {
            let total = values.entry(*metric).or_insert(Some(0.0));
            *total = add_strict(*total, value_type.value_of_record(record, *metric));
        }
    }

    by_year
        .into_iter()
        .map(|(year, values)| TrendPoint { year, values })
        .collect()
}

fn selected_total<'a>(
    records: impl Iterator<Item = &'a ReconciledRecord>,
    metrics: &MetricSet,
) -> f64 {
    records
        .flat_map(|r| metrics.iter().filter_map(move |m| r.metrics.get(*m)))
        .sum()
}

/// Percentage change from `start` to `end`; 0 when `start` is zero.
pub fn period_change_pct(start: f64, end: f64) -> f64 {
    if start == 0.0 || !start.is_finite() {
        return 0.0;
    }
    (end - start) * 100.0 / start
}

fn kpi_view(reconciled: &[ReconciledRecord], metrics: &MetricSet, year_range: YearRange) -> Kpi {
    let total_selected = selected_total(
        reconciled.iter().filter(|r| year_range.contains(r.year)),
        metrics,
    );
    let start_year_total = selected_total(
        reconciled.iter().filter(|r| r.year == year_range.start),
        metrics,
    );
    let end_year_total = selected_total(
        reconciled.iter().filter(|r| r.year == year_range.end),
        metrics,
    );

    Kpi {
        total_selected,
        start_year_total,
        end_year_total,
        period_change_pct: period_change_pct(start_year_total, end_year_total),
    }
}

/// Agency-level row restricted to the selected metrics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgencyRow {
    pub year: i32,
    pub county_norm: String,
    pub agency: Option<String>,
    pub months_reported: Option<u8>,
    pub values: BTreeMap<Metric, Option<f64>>,
}

pub fn agency_slice(
    crime: &[CrimeRecord],
    metrics: &MetricSet,
    year_range: YearRange,
) -> Result<Vec<AgencyRow>> {
    require_metrics(metrics)?;

    Ok(crime
        .iter()
        .filter(|r| year_range.contains(r.year))
        .map(|r| AgencyRow {
            year: r.year,
            county_norm: r.county_norm.clone(),
            agency: r.agency.clone(),
            months_reported: r.months_reported,
            values: metrics.iter().map(|m| (*m, r.metrics.get(*m))).collect(),
        })
        .collect())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rankings {
    pub top: Vec<CountyAggregate>,
    pub bottom: Vec<CountyAggregate>,
}

/// Counties ordered by the displayed value, highest first. Counties whose
/// value is undefined are left out.
pub fn rank_counties(county_view: &[CountyAggregate], value_type: ValueType, n: usize) -> Rankings {
    let ranked: Vec<&CountyAggregate> = county_view
        .iter()
        .filter(|c| value_type.value_of(c).is_some())
        .sorted_by(|a, b| {
            value_type
                .value_of(b)
                .partial_cmp(&value_type.value_of(a))
                .unwrap_or(Ordering::Equal)
        })
        .collect();

    let top = ranked.iter().take(n).map(|c| (*c).clone()).collect();
    let bottom = ranked
        .iter()
        .skip(ranked.len().saturating_sub(n))
        .map(|c| (*c).clone())
        .collect();
    Rankings { top, bottom }
}

/// Smallest and largest year present.
pub fn year_bounds(reconciled: &[ReconciledRecord]) -> Option<YearRange> {
    match reconciled.iter().map(|r| r.year).minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(year) => Some(YearRange { start: year, end: year }),
        MinMaxResult::MinMax(start, end) => Some(YearRange { start, end }),
    }
}

/// The last `window` years before the latest one, clamped to the data.
pub fn default_year_range(bounds: YearRange, window: u32) -> YearRange {
    let start = bounds.end.saturating_sub(window as i32).max(bounds.start);
    YearRange { start, end: bounds.end }
}
