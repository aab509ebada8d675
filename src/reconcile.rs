//! Reconciler
//!
//! Aggregates agency-level crime by county and year, left-joins population
//! estimates on the canonical county key, and derives per-100k rates.

use crate::metrics::{Metric, MetricValues, RATE_BASE};
use crate::normalize::{CrimeRecord, PopulationRecord};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use strsim::jaro_winkler;
use tracing::{info, warn};

/// Minimum similarity for a join-miss suggestion
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// One county-year after the join.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReconciledRecord {
    pub county_norm: String,
    pub year: i32,
    pub metrics: MetricValues,
    pub population: Option<f64>,
    pub fips: Option<String>,
    pub rates: MetricValues,
}

/// Count per 100,000 residents. Missing when either side is missing, the
/// population is zero, or the result is not finite.
pub fn per_100k(count: Option<f64>, population: Option<f64>) -> Option<f64> {
    match (count, population) {
        (Some(count), Some(population)) if population != 0.0 => {
            Some(count * RATE_BASE / population).filter(|rate| rate.is_finite())
        }
        _ => None,
    }
}

fn population_index(population: &[PopulationRecord]) -> HashMap<(&str, i32), &PopulationRecord> {
    let mut index = HashMap::with_capacity(population.len());
    for record in population {
        let key = (record.county_norm.as_str(), record.year);
        if index.contains_key(&key) {
            warn!(
                "Duplicate population row for {} {}; keeping the first",
                record.county_norm, record.year
            );
            continue;
        }
        index.insert(key, record);
    }
    index
}

pub fn reconcile(crime: &[CrimeRecord], population: &[PopulationRecord]) -> Vec<ReconciledRecord> {
    let mut grouped: BTreeMap<(String, i32), MetricValues> = BTreeMap::new();
    for record in crime {
        grouped
            .entry((record.county_norm.clone(), record.year))
            .or_insert_with(MetricValues::zeros)
            .accumulate(&record.metrics);
    }

    let lookup = population_index(population);
    let mut unmatched = 0usize;

    let reconciled: Vec<ReconciledRecord> = grouped
        .into_iter()
        .map(|((county_norm, year), metrics)| {
            let matched = lookup.get(&(county_norm.as_str(), year));
            if matched.is_none() {
                unmatched += 1;
            }
            let population = matched.and_then(|p| p.population);
            let fips = matched.and_then(|p| p.fips.clone());

            let mut rates = MetricValues::default();
            for metric in Metric::ALL {
                rates.set(metric, per_100k(metrics.get(metric), population));
            }

            ReconciledRecord {
                county_norm,
                year,
                metrics,
                population,
                fips,
                rates,
            }
        })
        .collect();

    info!(
        "Reconciled {} county-years ({} without a population match)",
        reconciled.len(),
        unmatched
    );
    reconciled
}

/// A crime county whose key never matched the population source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JoinMiss {
    pub county_norm: String,
    /// Closest population county name, when one is similar enough
    pub suggestion: Option<String>,
    pub similarity: f64,
}

/// Crime counties absent from the population source, with the nearest
/// population spelling. Diagnostic only; the join itself is unchanged.
pub fn join_misses(reconciled: &[ReconciledRecord], population: &[PopulationRecord]) -> Vec<JoinMiss> {
    let known: HashSet<&str> = population.iter().map(|p| p.county_norm.as_str()).collect();

    let misses: Vec<JoinMiss> = reconciled
        .iter()
        .map(|r| r.county_norm.as_str())
        .filter(|county| !known.contains(county))
        .unique()
        .sorted()
        .map(|county| {
            let best = known
                .iter()
                .map(|candidate| (*candidate, jaro_winkler(county, candidate)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let similarity = best.map(|(_, score)| score).unwrap_or(0.0);
            JoinMiss {
                county_norm: county.to_string(),
                suggestion: best
                    .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
                    .map(|(name, _)| name.to_string()),
                similarity,
            }
        })
        .collect();

    for miss in &misses {
        match &miss.suggestion {
            Some(suggestion) => warn!(
                "County '{}' has no population match (closest: '{}', {:.2})",
                miss.county_norm, suggestion, miss.similarity
            ),
            None => warn!("County '{}' has no population match", miss.county_norm),
        }
    }
    misses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crime(county: &str, year: i32, values: &[(Metric, Option<f64>)]) -> CrimeRecord {
        let mut metrics = MetricValues::default();
        for (metric, value) in values {
            metrics.set(*metric, *value);
        }
        CrimeRecord {
            year,
            county: county.to_string(),
            county_norm: county.to_string(),
            agency: Some(format!("{} PD", county)),
            months_reported: Some(12),
            metrics,
        }
    }

    fn population(county: &str, year: i32, fips: &str, population: Option<f64>) -> PopulationRecord {
        PopulationRecord {
            year,
            county_norm: county.to_string(),
            fips: Some(fips.to_string()),
            population,
        }
    }

    #[test]
    fn test_rate_correctness() {
        assert_eq!(per_100k(Some(150.0), Some(300_000.0)), Some(50.0));
        assert_eq!(per_100k(Some(150.0), Some(0.0)), None);
        assert_eq!(per_100k(Some(150.0), None), None);
        assert_eq!(per_100k(None, Some(300_000.0)), None);
    }

    #[test]
    fn test_one_row_per_county_year() {
        let crime = vec![
            crime("Albany", 2020, &[(Metric::Murder, Some(1.0))]),
            crime("Albany", 2020, &[(Metric::Murder, Some(2.0))]),
            crime("Albany", 2021, &[(Metric::Murder, Some(4.0))]),
            crime("Bronx", 2020, &[(Metric::Murder, Some(8.0))]),
        ];
        let reconciled = reconcile(&crime, &[]);
        assert_eq!(reconciled.len(), 3);

        let keys: HashSet<(String, i32)> = reconciled
            .iter()
            .map(|r| (r.county_norm.clone(), r.year))
            .collect();
        assert_eq!(keys.len(), 3);

        let albany_2020 = reconciled
            .iter()
            .find(|r| r.county_norm == "Albany" && r.year == 2020)
            .unwrap();
        assert_eq!(albany_2020.metrics.get(Metric::Murder), Some(3.0));
    }

    #[test]
    fn test_partial_reporting_sums_what_was_reported() {
        let crime = vec![
            crime("Albany", 2020, &[(Metric::Robbery, Some(5.0))]),
            crime("Albany", 2020, &[(Metric::Robbery, None)]),
        ];
        let reconciled = reconcile(&crime, &[]);
        assert_eq!(reconciled[0].metrics.get(Metric::Robbery), Some(5.0));
        assert_eq!(reconciled[0].metrics.get(Metric::Burglary), Some(0.0));
    }

    #[test]
    fn test_join_and_rates() {
        let crime = vec![crime("Albany", 2020, &[(Metric::IndexTotal, Some(150.0))])];
        let pop = vec![population("Albany", 2020, "36001", Some(300_000.0))];
        let reconciled = reconcile(&crime, &pop);

        assert_eq!(reconciled[0].fips.as_deref(), Some("36001"));
        assert_eq!(reconciled[0].population, Some(300_000.0));
        assert_eq!(reconciled[0].rates.get(Metric::IndexTotal), Some(50.0));
        assert_eq!(reconciled[0].rates.get(Metric::Murder), Some(0.0));
    }

    #[test]
    fn test_missing_population_leaves_all_rates_undefined() {
        let crime = vec![
            crime("Albany", 2020, &[(Metric::IndexTotal, Some(150.0))]),
            crime("Bronx", 2020, &[(Metric::IndexTotal, Some(150.0))]),
        ];
        let pop = vec![population("Bronx", 2020, "36005", None)];
        let reconciled = reconcile(&crime, &pop);

        for record in &reconciled {
            assert!(record.population.is_none());
            for (_, rate) in record.rates.iter() {
                assert_eq!(rate, None);
            }
        }
        let albany = reconciled.iter().find(|r| r.county_norm == "Albany").unwrap();
        assert!(albany.fips.is_none());
        let bronx = reconciled.iter().find(|r| r.county_norm == "Bronx").unwrap();
        assert_eq!(bronx.fips.as_deref(), Some("36005"));
    }

    #[test]
    fn test_duplicate_population_keeps_first() {
        let crime = vec![crime("Albany", 2020, &[(Metric::IndexTotal, Some(10.0))])];
        let pop = vec![
            population("Albany", 2020, "36001", Some(100_000.0)),
            population("Albany", 2020, "36001", Some(200_000.0)),
        ];
        let reconciled = reconcile(&crime, &pop);
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].population, Some(100_000.0));
    }

    #[test]
    fn test_join_misses_suggest_closest_spelling() {
        let crime = vec![
            crime("St Lawrance", 2020, &[]),
            crime("Albany", 2020, &[]),
            crime("Zzyzx", 2020, &[]),
        ];
        let pop = vec![
            population("Albany", 2020, "36001", Some(1.0)),
            population("St. Lawrence", 2020, "36089", Some(1.0)),
        ];
        let reconciled = reconcile(&crime, &pop);
        let misses = join_misses(&reconciled, &pop);

        assert_eq!(misses.len(), 2);
        assert_eq!(misses[0].county_norm, "St Lawrance");
        assert_eq!(misses[0].suggestion.as_deref(), Some("St. Lawrence"));
        assert_eq!(misses[1].county_norm, "Zzyzx");
        assert!(misses[1].suggestion.is_none());
    }
}
