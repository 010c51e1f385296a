//! Grouped totals, percentage shares, summary statistics and time series over
//! a filtered subset of records. Null measures are skipped everywhere.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::dataset::CleanRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
    /// Share of the overall total, 0–100. Zero when the overall total is zero.
    pub percentage: f64,
    /// Non-null measure values that went into `total`.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: String,
    pub measure: String,
    pub total: f64,
    /// Sorted by total descending, then key ascending.
    pub groups: Vec<GroupTotal>,
}

impl AggregationResult {
    pub fn get(&self, key: &str) -> Option<&GroupTotal> {
        self.groups.iter().find(|group| group.key == key)
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|group| {
                vec![
                    group.key.clone(),
                    format_number(group.total),
                    format!("{:.1}%", group.percentage),
                ]
            })
            .collect()
    }
}

/// Sums `measure_index` per value of `group_index`.
///
/// Records without a group value are left out; a group whose measures are all
/// null still appears with a zero total.
pub fn aggregate<'a, I>(
    records: I,
    group_index: usize,
    measure_index: usize,
    group_by: &str,
    measure: &str,
) -> AggregationResult
where
    I: IntoIterator<Item = &'a CleanRecord>,
{
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in records {
        let Some(key) = record.dimension(group_index) else {
            continue;
        };
        let entry = sums.entry(key).or_insert((0.0, 0));
        if let Some(value) = record.measure(measure_index) {
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let total = sums.values().map(|(sum, _)| sum).sum::<f64>();
    let mut groups = sums
        .into_iter()
        .map(|(key, (sum, count))| GroupTotal {
            key: key.to_string(),
            total: sum,
            percentage: percentage_of(sum, total),
            count,
        })
        .collect::<Vec<_>>();
    groups.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.key.cmp(&b.key)));

    AggregationResult {
        group_by: group_by.to_string(),
        measure: measure.to_string(),
        total,
        groups,
    }
}

fn percentage_of(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}

/// Sample statistics of one measure. Undefined values are `NaN`: every field
/// when there are no samples, `std` when there are fewer than two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub std: f64,
}

impl SummaryStats {
    pub fn render_row(&self, name: &str) -> Vec<String> {
        vec![
            name.to_string(),
            self.count.to_string(),
            format_metric(self.mean),
            format_metric(self.min),
            format_metric(self.max),
            format_metric(self.median),
            format_metric(self.std),
        ]
    }
}

pub fn summary_stats<'a, I>(records: I, measure_index: usize) -> SummaryStats
where
    I: IntoIterator<Item = &'a CleanRecord>,
{
    let mut stats = MeasureStats::default();
    for record in records {
        if let Some(value) = record.measure(measure_index) {
            stats.add_value(value);
        }
    }
    stats.finish()
}

#[derive(Debug, Default)]
struct MeasureStats {
    values: Vec<f64>,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl MeasureStats {
    fn add_value(&mut self, value: f64) {
        self.sum += value;
        self.min = Some(self.min.map_or(value, |current| current.min(value)));
        self.max = Some(self.max.map_or(value, |current| current.max(value)));
        self.values.push(value);
    }

    fn mean(&self) -> Option<f64> {
        (!self.values.is_empty()).then(|| self.sum / self.values.len() as f64)
    }

    fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    fn std_dev(&self) -> Option<f64> {
        if self.values.len() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let squares = self
            .values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>();
        Some((squares / (self.values.len() as f64 - 1.0)).sqrt())
    }

    fn finish(self) -> SummaryStats {
        SummaryStats {
            count: self.values.len(),
            mean: self.mean().unwrap_or(f64::NAN),
            min: self.min.unwrap_or(f64::NAN),
            max: self.max.unwrap_or(f64::NAN),
            median: self.median().unwrap_or(f64::NAN),
            std: self.std_dev().unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureSummary {
    pub measure: String,
    pub stats: SummaryStats,
}

/// Summary statistics for each `(name, index)` measure, in the given order.
pub fn measure_overview<'a>(
    records: &[&'a CleanRecord],
    measures: &[(String, usize)],
) -> Vec<MeasureSummary> {
    measures
        .iter()
        .map(|(name, index)| MeasureSummary {
            measure: name.clone(),
            stats: summary_stats(records.iter().copied(), *index),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: NaiveDateTime,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSeries {
    pub key: String,
    /// Ordered by time; records sharing a timestamp keep arrival order.
    pub points: Vec<SeriesPoint>,
}

/// One time series per group value, groups ordered by key.
pub fn series<'a, I>(records: I, group_index: usize, measure_index: usize) -> Vec<GroupSeries>
where
    I: IntoIterator<Item = &'a CleanRecord>,
{
    let mut groups: BTreeMap<&str, Vec<SeriesPoint>> = BTreeMap::new();
    for record in records {
        let Some(key) = record.dimension(group_index) else {
            continue;
        };
        groups.entry(key).or_default().push(SeriesPoint {
            time: record.start_time,
            value: record.measure(measure_index),
        });
    }
    groups
        .into_iter()
        .map(|(key, mut points)| {
            points.sort_by_key(|point| point.time);
            GroupSeries {
                key: key.to_string(),
                points,
            }
        })
        .collect()
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

fn format_metric(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format_number(value)
    }
}
