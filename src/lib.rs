pub mod aggregate;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod normalize;
pub mod reconcile;

pub use aggregate::{aggregate_for_view, DashboardViews, ValueType, YearRange};
pub use dashboard::{Dashboard, DashboardSnapshot, Selection};
pub use error::{DashboardError, Result};
pub use metrics::{Metric, MetricSet};
pub use normalize::{normalize_crime_source, normalize_population_source, RawTable};
pub use reconcile::{reconcile, ReconciledRecord};
