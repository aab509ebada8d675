//! Frame export
//!
//! Turns the reconciled table and the selection views into polars DataFrames
//! and writes them out for a presentation layer.

use crate::aggregate::{AgencyRow, CountyAggregate, Kpi, Rankings, TrendPoint, ValueType};
use crate::dashboard::{DashboardSnapshot, Selection};
use crate::error::{DashboardError, Result};
use crate::metrics::{Metric, MetricSet};
use crate::reconcile::{JoinMiss, ReconciledRecord};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Parquet,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "parquet" => Ok(ExportFormat::Parquet),
            other => Err(DashboardError::Config(format!("unknown export format '{}'", other))),
        }
    }
}

fn polars_err(e: PolarsError) -> DashboardError {
    DashboardError::Polars(e.to_string())
}

pub fn reconciled_frame(records: &[ReconciledRecord]) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new(
            "county_norm",
            records.iter().map(|r| r.county_norm.as_str()).collect::<Vec<_>>(),
        ),
        Series::new("year", records.iter().map(|r| r.year).collect::<Vec<_>>()),
    ];
    for metric in Metric::ALL {
        columns.push(Series::new(
            metric.column(),
            records.iter().map(|r| r.metrics.get(metric)).collect::<Vec<_>>(),
        ));
    }
    columns.push(Series::new(
        "population",
        records.iter().map(|r| r.population).collect::<Vec<_>>(),
    ));
    columns.push(Series::new(
        "fips",
        records.iter().map(|r| r.fips.as_deref()).collect::<Vec<_>>(),
    ));
    for metric in Metric::ALL {
        columns.push(Series::new(
            &metric.rate_column(),
            records.iter().map(|r| r.rates.get(metric)).collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns).map_err(polars_err)
}

pub fn county_frame(county_view: &[CountyAggregate]) -> Result<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            "county_norm",
            county_view.iter().map(|c| c.county_norm.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "fips",
            county_view.iter().map(|c| c.fips.as_deref()).collect::<Vec<_>>(),
        ),
        Series::new(
            "combined_metric",
            county_view.iter().map(|c| c.combined_metric).collect::<Vec<_>>(),
        ),
        Series::new(
            "combined_rate",
            county_view.iter().map(|c| c.combined_rate).collect::<Vec<_>>(),
        ),
        Series::new(
            "population",
            county_view.iter().map(|c| c.population).collect::<Vec<_>>(),
        ),
        Series::new(
            "years",
            county_view.iter().map(|c| c.years as i64).collect::<Vec<_>>(),
        ),
    ])
    .map_err(polars_err)
}

/// One column per selected metric, named after the rate column in
/// per-100k mode.
pub fn trend_frame(
    trend_view: &[TrendPoint],
    metrics: &MetricSet,
    value_type: ValueType,
) -> Result<DataFrame> {
    let mut columns = vec![Series::new(
        "year",
        trend_view.iter().map(|p| p.year).collect::<Vec<_>>(),
    )];
    for metric in metrics {
        let name = match value_type {
            ValueType::Counts => metric.column().to_string(),
            ValueType::Per100k => metric.rate_column(),
        };
        columns.push(Series::new(
            &name,
            trend_view
                .iter()
                .map(|p| p.values.get(metric).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns).map_err(polars_err)
}

pub fn agency_frame(rows: &[AgencyRow], metrics: &MetricSet) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new("year", rows.iter().map(|r| r.year).collect::<Vec<_>>()),
        Series::new(
            "county_norm",
            rows.iter().map(|r| r.county_norm.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "agency",
            rows.iter().map(|r| r.agency.as_deref()).collect::<Vec<_>>(),
        ),
        Series::new(
            "months_reported",
            rows.iter()
                .map(|r| r.months_reported.map(i32::from))
                .collect::<Vec<_>>(),
        ),
    ];
    for metric in metrics {
        columns.push(Series::new(
            metric.column(),
            rows.iter()
                .map(|r| r.values.get(metric).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns).map_err(polars_err)
}

pub fn write_frame(df: &mut DataFrame, path: &Path, format: ExportFormat) -> Result<()> {
    let mut file = File::create(path)?;
    match format {
        ExportFormat::Csv => CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(polars_err)?,
        ExportFormat::Json => JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::Json)
            .finish(df)
            .map_err(polars_err)?,
        ExportFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df).map_err(polars_err)?;
        }
    }
    Ok(())
}

/// Scalars and diagnostics that do not fit a table.
#[derive(Debug, Serialize)]
struct ExportSummary<'a> {
    generated_at: DateTime<Utc>,
    selection: &'a Selection,
    kpi: &'a Kpi,
    rankings: &'a Rankings,
    unmapped_counties: &'a [String],
    join_misses: &'a [JoinMiss],
}

/// Write the reconciled table, the three tabular views and a JSON summary
/// into `dir`. Returns the written paths.
pub fn export_snapshot(
    dir: &Path,
    reconciled: &[ReconciledRecord],
    snapshot: &DashboardSnapshot,
    join_misses: &[JoinMiss],
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let selection = &snapshot.selection;

    let frames = [
        ("reconciled", reconciled_frame(reconciled)?),
        ("county_view", county_frame(&snapshot.views.county_view)?),
        (
            "trend_view",
            trend_frame(&snapshot.views.trend_view, &selection.metrics, selection.value_type)?,
        ),
        ("agency_rows", agency_frame(&snapshot.agency_rows, &selection.metrics)?),
    ];

    let mut written = Vec::with_capacity(frames.len() + 1);
    for (name, mut df) in frames {
        let path = dir.join(format!("{}.{}", name, format.extension()));
        write_frame(&mut df, &path, format)?;
        written.push(path);
    }

    let summary_path = dir.join("summary.json");
    let summary = ExportSummary {
        generated_at: Utc::now(),
        selection,
        kpi: &snapshot.views.kpi_view,
        rankings: &snapshot.rankings,
        unmapped_counties: &snapshot.unmapped_counties,
        join_misses,
    };
    serde_json::to_writer_pretty(File::create(&summary_path)?, &summary)?;
    written.push(summary_path);

    info!("Exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
