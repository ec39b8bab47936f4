//! Month-bucketed cost-per-SF series.

use std::collections::BTreeMap;
use std::fmt;

use bidrec_core::{Basis, Store};
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

use crate::aggregate::{package_cost_per_sf, CostSummary};
use crate::divisions::{bucket_title, division_key};
use crate::filter::PackageFilter;

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Truncate a date to its month.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One month with at least one data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub period: YearMonth,
    pub cost_per_sf: CostSummary,
}

/// Series for one CSI division.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivisionSeries {
    pub division: String,
    pub title: String,
    pub points: Vec<SeriesPoint>,
}

/// Per-division series plus the overall series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub basis: Basis,
    pub series: Vec<DivisionSeries>,
    pub overall: Vec<SeriesPoint>,
}

fn points(buckets: BTreeMap<YearMonth, Vec<f64>>) -> Vec<SeriesPoint> {
    buckets
        .into_iter()
        .map(|(period, values)| SeriesPoint {
            period,
            cost_per_sf: CostSummary::from_values(&values),
        })
        .collect()
}

/// Bucket the filtered packages by their project's month.
///
/// Packages of undated projects and packages without a computable cost per SF
/// do not appear. Months without data are omitted rather than zero-filled.
pub fn compute_time_series(store: &Store, filter: &PackageFilter, basis: Basis) -> TimeSeries {
    let mut by_division: BTreeMap<String, BTreeMap<YearMonth, Vec<f64>>> = BTreeMap::new();
    let mut overall: BTreeMap<YearMonth, Vec<f64>> = BTreeMap::new();

    for (project, package) in filter.select(store) {
        let Some(date) = project.project_date else {
            continue;
        };
        let Some(value) = package_cost_per_sf(project, package, basis) else {
            continue;
        };
        let period = YearMonth::of(date);
        by_division
            .entry(division_key(package.csi_division.as_deref()))
            .or_default()
            .entry(period)
            .or_default()
            .push(value);
        overall.entry(period).or_default().push(value);
    }

    let series = by_division
        .into_iter()
        .map(|(division, buckets)| DivisionSeries {
            title: bucket_title(&division),
            division,
            points: points(buckets),
        })
        .collect();

    TimeSeries {
        basis,
        series,
        overall: points(overall),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidrec_core::{Package, Project, ProjectId};

    fn add_project(store: &mut Store, date: Option<NaiveDate>) -> ProjectId {
        let id = store.allocate_id();
        store.projects.insert(
            id,
            Project {
                id,
                name: format!("P{}", id),
                project_date: date,
                county: None,
                building_sf: Some(100.0),
                notes: None,
            },
        );
        id
    }

    fn add_package(store: &mut Store, project_id: ProjectId, division: &str, median: f64) {
        let id = store.allocate_id();
        store.packages.insert(
            id,
            Package {
                id,
                project_id,
                code: format!("C{}", id),
                csi_division: Some(division.to_string()),
                median_bid: Some(median),
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_year_month_display() {
        let ym = YearMonth::of(NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
        assert_eq!(ym.to_string(), "2024-03");
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"2024-03\"");
    }

    #[test]
    fn test_series_skips_empty_months_and_undated() {
        let mut store = Store::new();
        let jan = add_project(&mut store, NaiveDate::from_ymd_opt(2024, 1, 5));
        let jan_late = add_project(&mut store, NaiveDate::from_ymd_opt(2024, 1, 28));
        let apr = add_project(&mut store, NaiveDate::from_ymd_opt(2024, 4, 2));
        let undated = add_project(&mut store, None);
        add_package(&mut store, jan, "26", 1_000.0);
        add_package(&mut store, jan_late, "26", 3_000.0);
        add_package(&mut store, apr, "09", 500.0);
        add_package(&mut store, undated, "26", 9_999.0);

        let ts = compute_time_series(&store, &PackageFilter::default(), Basis::MedianBid);

        let periods: Vec<String> = ts.overall.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(periods, vec!["2024-01", "2024-04"]);
        assert_eq!(ts.overall[0].cost_per_sf.count, 2);
        assert_eq!(ts.overall[0].cost_per_sf.min, Some(10.0));
        assert_eq!(ts.overall[0].cost_per_sf.max, Some(30.0));

        assert_eq!(ts.series.len(), 2);
        assert_eq!(ts.series[0].division, "09");
        assert_eq!(ts.series[0].points.len(), 1);
        assert_eq!(ts.series[1].division, "26");
        assert_eq!(ts.series[1].title, "Electrical");
        assert_eq!(ts.series[1].points.len(), 1);
    }

    #[test]
    fn test_empty_store_has_no_points() {
        let ts = compute_time_series(&Store::new(), &PackageFilter::default(), Basis::MedianBid);
        assert!(ts.series.is_empty());
        assert!(ts.overall.is_empty());
    }
}
