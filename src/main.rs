use anyhow::{bail, Context, Result};
use clap::Parser;
use county_crime_rates::aggregate::{ValueType, YearRange};
use county_crime_rates::cache::SourceCache;
use county_crime_rates::config::DashboardConfig;
use county_crime_rates::dashboard::{Dashboard, DashboardSnapshot};
use county_crime_rates::frame::{export_snapshot, ExportFormat};
use county_crime_rates::metrics::parse_metric_list;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "county-crime-rates")]
#[command(about = "County crime rates from agency crime counts and population estimates")]
struct Args {
    /// Crime CSV, one row per agency-year (or set CRIME_DATA_PATH)
    #[arg(long)]
    crime_path: Option<PathBuf>,

    /// Population CSV, one row per county-year (or set POPULATION_DATA_PATH)
    #[arg(long)]
    population_path: Option<PathBuf>,

    /// GeoJSON county boundaries, URL or local file (or set BOUNDARY_URL)
    #[arg(long)]
    boundary_url: Option<String>,

    /// Do not fetch county boundaries
    #[arg(long)]
    skip_boundaries: bool,

    /// First year of the selection (default: five years before the latest)
    #[arg(long)]
    start: Option<i32>,

    /// Last year of the selection (default: latest year)
    #[arg(long)]
    end: Option<i32>,

    /// Comma-separated metrics, e.g. "murder,robbery"
    #[arg(short, long, default_value = "index_total")]
    metrics: String,

    /// "counts" or "per_100k"
    #[arg(long, default_value = "counts")]
    value_type: String,

    /// Counties shown in each ranking
    #[arg(long)]
    top: Option<usize>,

    /// Write reconciled table, views and summary here
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Export format: csv, json or parquet
    #[arg(long, default_value = "csv")]
    format: String,
}

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    let selection = &snapshot.selection;
    let kpi = &snapshot.views.kpi_view;
    let value_type = selection.value_type;

    println!("\n=== Statewide Summary for {} ===", selection.year_range);
    println!("Total selected crimes: {:.0}", kpi.total_selected);
    println!(
        "Change over period ({} vs {}): {:.1}%",
        selection.year_range.start, selection.year_range.end, kpi.period_change_pct
    );

    println!("\n=== Top Counties ===");
    for county in &snapshot.rankings.top {
        println!("  {:<20} {}", county.county_norm, format_value(value_type.value_of(county)));
    }
    println!("\n=== Bottom Counties ===");
    for county in &snapshot.rankings.bottom {
        println!("  {:<20} {}", county.county_norm, format_value(value_type.value_of(county)));
    }

    if !snapshot.unmapped_counties.is_empty() {
        println!("\nCounties without a map boundary: {}", snapshot.unmapped_counties.join(", "));
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = DashboardConfig::from_env()?;
    if let Some(path) = args.crime_path {
        config.crime_path = path;
    }
    if let Some(path) = args.population_path {
        config.population_path = path;
    }
    if let Some(url) = args.boundary_url {
        config.boundary_url = url;
    }
    if let Some(top) = args.top {
        config.top_n = top;
    }

    let metrics = parse_metric_list(&args.metrics)?;
    if metrics.is_empty() {
        bail!("Please select at least one crime metric");
    }
    let value_type: ValueType = args.value_type.parse()?;
    let format: ExportFormat = args.format.parse()?;

    let mut cache = SourceCache::new();
    let mut dashboard = Dashboard::load(&mut cache, &config).context("Could not load data")?;
    if !args.skip_boundaries {
        dashboard
            .attach_boundaries(&mut cache, &config.boundary_url)
            .await
            .context("Could not load county boundaries")?;
    }

    let mut selection = dashboard
        .default_selection(config.window_years)
        .context("No county-years available after reconciliation")?;
    let start = args.start.unwrap_or(selection.year_range.start);
    let end = args.end.unwrap_or(selection.year_range.end);
    selection.year_range = YearRange::new(start, end)?;
    selection.metrics = metrics;
    selection.value_type = value_type;

    info!("Selection: {} {:?} {:?}", selection.year_range, selection.metrics, selection.value_type);
    let snapshot = dashboard.recompute(&selection, config.top_n)?;
    print_snapshot(&snapshot);

    if let Some(dir) = args.out_dir {
        let written = export_snapshot(
            &dir,
            dashboard.reconciled(),
            &snapshot,
            dashboard.join_misses(),
            format,
        )?;
        for path in written {
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("County crime rates starting...");

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
