//! Crime metric catalogue
//!
//! The ten metrics carried by the crime source, their column names, and the
//! per-metric value container shared by records and views.

use crate::error::{DashboardError, Result};
use crate::normalize::canonical_field_name;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Suffix of the derived rate columns
pub const RATE_SUFFIX: &str = "_per_100k";

/// Rates are expressed per this many residents
pub const RATE_BASE: f64 = 100_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    IndexTotal,
    ViolentTotal,
    Murder,
    Rape,
    Robbery,
    AggravatedAssault,
    PropertyTotal,
    Burglary,
    Larceny,
    MotorVehicleTheft,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::IndexTotal,
        Metric::ViolentTotal,
        Metric::Murder,
        Metric::Rape,
        Metric::Robbery,
        Metric::AggravatedAssault,
        Metric::PropertyTotal,
        Metric::Burglary,
        Metric::Larceny,
        Metric::MotorVehicleTheft,
    ];

    /// Canonical column name in the normalized crime source
    pub fn column(&self) -> &'static str {
        match self {
            Metric::IndexTotal => "index_total",
            Metric::ViolentTotal => "violent_total",
            Metric::Murder => "murder",
            Metric::Rape => "rape",
            Metric::Robbery => "robbery",
            Metric::AggravatedAssault => "aggravated_assault",
            Metric::PropertyTotal => "property_total",
            Metric::Burglary => "burglary",
            Metric::Larceny => "larceny",
            Metric::MotorVehicleTheft => "motor_vehicle_theft",
        }
    }

    /// Column name of the derived per-100k rate, e.g. `murder_per_100k`
    pub fn rate_column(&self) -> String {
        format!("{}{}", self.column(), RATE_SUFFIX)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = DashboardError;

    /// Accepts the column name in any header spelling ("Index Total", "index-total").
    fn from_str(s: &str) -> Result<Self> {
        let wanted = canonical_field_name(s);
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.column() == wanted)
            .ok_or_else(|| DashboardError::UnknownMetric(s.to_string()))
    }
}

/// User-selected subset of metrics. Ordered so views list metrics stably.
pub type MetricSet = BTreeSet<Metric>;

/// Parse a comma-separated metric list such as `"murder, robbery"`.
pub fn parse_metric_list(list: &str) -> Result<MetricSet> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Metric::from_str)
        .collect()
}

/// One value per metric; `None` is the explicit missing marker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricValues([Option<f64>; 10]);

impl MetricValues {
    /// All ten metrics present with value zero, the identity for summation.
    pub fn zeros() -> Self {
        Self([Some(0.0); 10])
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        self.0[metric.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Option<f64>)> + '_ {
        Metric::ALL.iter().map(move |m| (*m, self.get(*m)))
    }

    /// Add `other` into `self`, treating missing values on either side as zero.
    pub fn accumulate(&mut self, other: &MetricValues) {
        for metric in Metric::ALL {
            let sum = self.get(metric).unwrap_or(0.0) + other.get(metric).unwrap_or(0.0);
            self.set(metric, Some(sum));
        }
    }

    /// Sum of the selected metrics; missing if any selected value is missing.
    pub fn sum_of(&self, metrics: &MetricSet) -> Option<f64> {
        metrics.iter().map(|m| self.get(*m)).sum()
    }
}

impl Serialize for MetricValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::ALL.len()))?;
        for (metric, value) in self.iter() {
            map.serialize_entry(metric.column(), &value)?;
        }
        map.end()
    }
}
