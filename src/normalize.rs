//! Source Normalizer
//!
//! Reads the crime and population sources into typed records: canonical field
//! names, permissive numeric coercion, canonical county keys and fixed-width FIPS.

use crate::error::{DashboardError, Result};
use crate::metrics::{Metric, MetricValues};
use csv::ReaderBuilder;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

lazy_static! {
    static ref SEPARATOR_RUN: Regex = Regex::new(r"[\s\-]+").expect("valid separator pattern");
}

/// Known spellings of county names that differ between the two sources.
pub const COUNTY_ALIASES: &[(&str, &str)] = &[
    ("St Lawrence", "St. Lawrence"),
    ("Saint Lawrence", "St. Lawrence"),
];

/// Candidate population-count columns, checked in order.
pub const POPULATION_COLUMN_CANDIDATES: &[&str] = &["population", "pop", "est_population"];

const FIPS_COLUMN_CANDIDATES: &[&str] = &["fips_code", "fips"];
const POPULATION_COUNTY_SUFFIX: &str = " County";
const FIPS_WIDTH: usize = 5;

/// Canonical field identifier: trimmed, lower-cased, each run of spaces or
/// hyphens collapsed to `_`.
pub fn canonical_field_name(name: &str) -> String {
    SEPARATOR_RUN
        .replace_all(name.trim(), "_")
        .to_lowercase()
}

/// Canonical county key for the crime source.
pub fn canonical_county(raw: &str) -> String {
    let trimmed = raw.trim();
    COUNTY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Canonical county key for the population source, whose geography names
/// carry a trailing " County".
pub fn canonical_population_county(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_suffix(POPULATION_COUNTY_SUFFIX)
        .unwrap_or(trimmed);
    canonical_county(stripped)
}

/// Permissive numeric parse. Blank, non-numeric and non-finite cells are missing.
pub fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_whole(cell: &str) -> Option<i64> {
    parse_number(cell)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

pub fn parse_year(cell: &str) -> Option<i32> {
    parse_whole(cell).and_then(|y| i32::try_from(y).ok())
}

fn parse_months_reported(cell: &str) -> Option<u8> {
    parse_whole(cell)
        .filter(|m| (0..=12).contains(m))
        .map(|m| m as u8)
}

/// Fixed-width, left-zero-padded FIPS code. Numeric renderings such as
/// `36001.0` are reduced to their integer digits first.
pub fn normalize_fips(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits = match parse_whole(trimmed) {
        Some(n) if n >= 0 => n.to_string(),
        _ => trimmed.to_string(),
    };
    Some(format!("{:0>width$}", digits, width = FIPS_WIDTH))
}

/// Header row plus string cells of one tabular source.
#[derive(Clone, Debug)]
pub struct RawTable {
    source: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = path.display().to_string();
        let file = File::open(path).map_err(|e| DashboardError::SourceUnavailable {
            path: source.clone(),
            reason: e.to_string(),
        })?;
        Self::from_reader(&source, file)
    }

    pub fn from_reader<R: Read>(source: &str, reader: R) -> Result<Self> {
        let unreadable = |e: csv::Error| DashboardError::SourceUnavailable {
            path: source.to_string(),
            reason: e.to_string(),
        };

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(unreadable)?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(unreadable)?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        debug!("Read {} rows from {}", rows.len(), source);
        Ok(Self {
            source: source.to_string(),
            headers,
            rows,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Map of canonical field name to column position; first occurrence wins.
    fn field_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::new();
        for (pos, header) in self.headers.iter().enumerate() {
            index.entry(canonical_field_name(header)).or_insert(pos);
        }
        index
    }
}

fn require(fields: &HashMap<String, usize>, name: &str, source: &str) -> Result<usize> {
    fields.get(name).copied().ok_or_else(|| {
        DashboardError::SchemaMismatch(format!("{}: missing column '{}'", source, name))
    })
}

fn first_present(fields: &HashMap<String, usize>, candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|c| fields.get(*c).copied())
}

/// One agency's report for one year.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrimeRecord {
    pub year: i32,
    pub county: String,
    pub county_norm: String,
    pub agency: Option<String>,
    pub months_reported: Option<u8>,
    pub metrics: MetricValues,
}

/// One county's population estimate for one year.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopulationRecord {
    pub year: i32,
    pub county_norm: String,
    pub fips: Option<String>,
    pub population: Option<f64>,
}

pub fn normalize_crime_source(table: &RawTable) -> Result<Vec<CrimeRecord>> {
    let fields = table.field_index();
    let county_idx = require(&fields, "county", table.source())?;
    let year_idx = require(&fields, "year", table.source())?;
    let agency_idx = fields.get("agency").copied();
    let months_idx = fields.get("months_reported").copied();
    let metric_idx = Metric::ALL
        .iter()
        .map(|m| require(&fields, m.column(), table.source()).map(|idx| (*m, idx)))
        .collect::<Result<Vec<_>>>()?;

    let mut records = Vec::with_capacity(table.len());
    let mut dropped = 0usize;

    for row in &table.rows {
        let county = row[county_idx].trim();
        let year = match parse_year(&row[year_idx]) {
            Some(year) if !county.is_empty() => year,
            _ => {
                dropped += 1;
                continue;
            }
        };

        let mut metrics = MetricValues::default();
        for (metric, idx) in &metric_idx {
            metrics.set(*metric, parse_number(&row[*idx]));
        }

        records.push(CrimeRecord {
            year,
            county: row[county_idx].clone(),
            county_norm: canonical_county(county),
            agency: agency_idx
                .map(|idx| row[idx].trim().to_string())
                .filter(|a| !a.is_empty()),
            months_reported: months_idx.and_then(|idx| parse_months_reported(&row[idx])),
            metrics,
        });
    }

    if dropped > 0 {
        warn!("{}: dropped {} crime rows without county or year", table.source(), dropped);
    }
    info!("Normalized {} crime records from {}", records.len(), table.source());
    Ok(records)
}

pub fn normalize_population_source(table: &RawTable) -> Result<Vec<PopulationRecord>> {
    let fields = table.field_index();
    let population_idx = first_present(&fields, POPULATION_COLUMN_CANDIDATES).ok_or_else(|| {
        DashboardError::SchemaMismatch(format!(
            "{}: no population column (expected one of {})",
            table.source(),
            POPULATION_COLUMN_CANDIDATES.join(", ")
        ))
    })?;
    let geography_idx = require(&fields, "geography", table.source())?;
    let year_idx = require(&fields, "year", table.source())?;
    let fips_idx = first_present(&fields, FIPS_COLUMN_CANDIDATES).ok_or_else(|| {
        DashboardError::SchemaMismatch(format!("{}: missing column 'fips_code'", table.source()))
    })?;

    let mut records = Vec::with_capacity(table.len());
    let mut dropped = 0usize;

    for row in &table.rows {
        let geography = row[geography_idx].trim();
        let year = match parse_year(&row[year_idx]) {
            Some(year) if !geography.is_empty() => year,
            _ => {
                dropped += 1;
                continue;
            }
        };

        records.push(PopulationRecord {
            year,
            county_norm: canonical_population_county(geography),
            fips: normalize_fips(&row[fips_idx]),
            population: parse_number(&row[population_idx]),
        });
    }

    if dropped > 0 {
        warn!("{}: dropped {} population rows without geography or year", table.source(), dropped);
    }
    info!("Normalized {} population records from {}", records.len(), table.source());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRIME_CSV: &str = "\
County,Agency,Year,Months Reported,Index Total,Violent Total,Murder,Rape,Robbery,Aggravated Assault,Property Total,Burglary,Larceny,Motor Vehicle Theft
Albany,Albany City PD,2020,12,100,20,1,2,7,10,80,30,45,5
St Lawrence,Canton Village PD,2020,12,n/a,1,0,0,1,0,9,2,6,1
Albany,Colonie Town PD,,12,5,1,0,0,1,0,4,1,2,1
";

    const POPULATION_CSV: &str = "\
FIPS Code,Geography,Year,Program Type,Population
36001,Albany County,2020,Intercensal,\"314,848\"
36089,St. Lawrence County,2020,Intercensal,108505
36000,New York State,2020,Intercensal,
";

    fn table(csv: &str) -> RawTable {
        RawTable::from_reader("test.csv", csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_canonical_field_name() {
        assert_eq!(canonical_field_name("Months Reported"), "months_reported");
        assert_eq!(canonical_field_name(" Motor-Vehicle  Theft "), "motor_vehicle_theft");
        assert_eq!(canonical_field_name("FIPS Code"), "fips_code");
    }

    #[test]
    fn test_canonical_field_name_is_idempotent() {
        for name in ["Months Reported", "Aggravated - Assault", "index_total", "  Year"] {
            let once = canonical_field_name(name);
            assert_eq!(canonical_field_name(&once), once);
        }
    }

    #[test]
    fn test_county_aliases_resolve_to_one_key() {
        assert_eq!(canonical_county("St Lawrence"), "St. Lawrence");
        assert_eq!(canonical_county("Saint Lawrence"), "St. Lawrence");
        assert_eq!(canonical_county(" St. Lawrence "), "St. Lawrence");
        assert_eq!(canonical_county("Kings"), "Kings");
    }

    #[test]
    fn test_population_county_suffix() {
        assert_eq!(canonical_population_county("Albany County"), "Albany");
        assert_eq!(canonical_population_county("St Lawrence County "), "St. Lawrence");
        assert_eq!(canonical_population_county("New York State"), "New York State");
    }

    #[test]
    fn test_parse_number_is_permissive() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_year("2019.0"), Some(2019));
        assert_eq!(parse_year("2019.5"), None);
    }

    #[test]
    fn test_normalize_fips() {
        assert_eq!(normalize_fips("1001").as_deref(), Some("01001"));
        assert_eq!(normalize_fips("36001.0").as_deref(), Some("36001"));
        assert_eq!(normalize_fips("36001").as_deref(), Some("36001"));
        assert_eq!(normalize_fips(""), None);
    }

    #[test]
    fn test_normalize_crime_source() {
        let records = normalize_crime_source(&table(CRIME_CSV)).unwrap();
        // Row without a year carries no join key.
        assert_eq!(records.len(), 2);

        let albany = &records[0];
        assert_eq!(albany.county_norm, "Albany");
        assert_eq!(albany.agency.as_deref(), Some("Albany City PD"));
        assert_eq!(albany.months_reported, Some(12));
        assert_eq!(albany.metrics.get(Metric::IndexTotal), Some(100.0));
        assert_eq!(albany.metrics.get(Metric::MotorVehicleTheft), Some(5.0));

        let canton = &records[1];
        assert_eq!(canton.county, "St Lawrence");
        assert_eq!(canton.county_norm, "St. Lawrence");
        assert_eq!(canton.metrics.get(Metric::IndexTotal), None);
        assert_eq!(canton.metrics.get(Metric::Robbery), Some(1.0));
    }

    #[test]
    fn test_crime_source_missing_metric_column() {
        let csv = "County,Year,Index Total\nAlbany,2020,5\n";
        let err = normalize_crime_source(&table(csv)).unwrap_err();
        assert!(matches!(err, DashboardError::SchemaMismatch(_)));
    }

    #[test]
    fn test_normalize_population_source() {
        let records = normalize_population_source(&table(POPULATION_CSV)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].county_norm, "Albany");
        assert_eq!(records[0].fips.as_deref(), Some("36001"));
        assert_eq!(records[0].population, Some(314848.0));
        assert_eq!(records[1].county_norm, "St. Lawrence");
        assert_eq!(records[2].population, None);
    }

    #[test]
    fn test_population_column_candidates_in_order() {
        let csv = "FIPS Code,Geography,Year,Est Population,Pop\n36001,Albany County,2020,10,20\n";
        let records = normalize_population_source(&table(csv)).unwrap();
        assert_eq!(records[0].population, Some(20.0));
    }

    #[test]
    fn test_population_column_absent_is_schema_mismatch() {
        let csv = "FIPS Code,Geography,Year,Residents\n36001,Albany County,2020,10\n";
        let err = normalize_population_source(&table(csv)).unwrap_err();
        assert!(matches!(err, DashboardError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let path = std::env::temp_dir().join("county_crime_rates_does_not_exist.csv");
        let err = RawTable::from_path(&path).unwrap_err();
        assert!(matches!(err, DashboardError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let csv = "County,Year,Agency\nAlbany,2020\n";
        let table = table(csv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].len(), 3);
    }
}
