//! The query interface the presentation layer talks to.
//!
//! A [`QueryContext`] binds one record source and schema to a shared
//! [`CacheManager`]. Every query goes through the cache: the clean dataset is
//! built once, and each result is keyed by the dataset identity, the resolved
//! filter and the query's own parameters. Two filters that resolve to the same
//! months and categories share one entry.

use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::{
    aggregate::{self, AggregationResult, GroupSeries, MeasureSummary, SummaryStats},
    cache::{CacheKey, CacheManager},
    dataset::{CleanDataset, Diagnostics},
    error::PipelineError,
    filter::{FilterSpec, ResolvedFilter},
    schema::RecordSchema,
    source::RecordSource,
};

pub struct QueryContext {
    cache: Arc<CacheManager>,
    source: Box<dyn RecordSource>,
    schema: RecordSchema,
}

impl QueryContext {
    /// A context with its own private cache.
    pub fn new(source: Box<dyn RecordSource>, schema: RecordSchema) -> Self {
        Self::with_cache(Arc::new(CacheManager::new()), source, schema)
    }

    /// A context sharing `cache` with every other context built from it.
    pub fn with_cache(
        cache: Arc<CacheManager>,
        source: Box<dyn RecordSource>,
        schema: RecordSchema,
    ) -> Self {
        Self {
            cache,
            source,
            schema,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Reads, validates and normalizes the source. Computed once per source
    /// identity and schema.
    pub fn clean_dataset(&self) -> Result<Arc<CleanDataset>, PipelineError> {
        let identity = self.source.identity();
        let key = CacheKey::new("dataset")
            .part("source", &identity)
            .part("schema", self.schema.fingerprint());
        self.cache.datasets.get_or_compute(&key, || {
            info!("Loading records from {identity}");
            let rows = self.source.read()?;
            CleanDataset::build(&identity, self.schema.clone(), rows)
        })
    }

    pub fn available_categories(&self, dimension: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self.clean_dataset()?.available_categories(dimension)?.to_vec())
    }

    pub fn available_months(&self) -> Result<Vec<(String, String)>, PipelineError> {
        Ok(self.clean_dataset()?.available_months())
    }

    pub fn diagnostics(&self) -> Result<Diagnostics, PipelineError> {
        Ok(self.clean_dataset()?.diagnostics().clone())
    }

    /// Latest value of a secondary timestamp, e.g. `lastUpdatedTime`.
    pub fn latest_update(&self, field: &str) -> Result<Option<NaiveDateTime>, PipelineError> {
        Ok(self.clean_dataset()?.latest(field)?)
    }

    pub fn aggregate(
        &self,
        filter: &FilterSpec,
        group_by: &str,
        measure: &str,
    ) -> Result<Arc<AggregationResult>, PipelineError> {
        let dataset = self.clean_dataset()?;
        let group_index = dataset.schema().dimension_index(group_by)?;
        let measure_index = dataset.schema().measure_index(measure)?;
        let resolved = filter.resolve(&dataset)?;
        let key = query_key("aggregate", &dataset, &resolved)
            .part("group_by", group_by)
            .part("measure", measure);
        self.cache.aggregates.get_or_compute(&key, || {
            let records = resolved.apply(&dataset);
            debug!("Aggregating {} record(s) by {group_by}", records.len());
            Ok(aggregate::aggregate(
                records,
                group_index,
                measure_index,
                group_by,
                measure,
            ))
        })
    }

    pub fn summary_stats(
        &self,
        filter: &FilterSpec,
        measure: &str,
    ) -> Result<Arc<SummaryStats>, PipelineError> {
        let dataset = self.clean_dataset()?;
        let measure_index = dataset.schema().measure_index(measure)?;
        let resolved = filter.resolve(&dataset)?;
        let key = query_key("summary", &dataset, &resolved).part("measure", measure);
        self.cache.summaries.get_or_compute(&key, || {
            Ok(aggregate::summary_stats(
                resolved.apply(&dataset),
                measure_index,
            ))
        })
    }

    /// Summary statistics for every measure in the schema.
    pub fn measure_overview(
        &self,
        filter: &FilterSpec,
    ) -> Result<Arc<Vec<MeasureSummary>>, PipelineError> {
        let dataset = self.clean_dataset()?;
        let resolved = filter.resolve(&dataset)?;
        let key = query_key("overview", &dataset, &resolved);
        self.cache.overviews.get_or_compute(&key, || {
            let measures = dataset
                .schema()
                .measures
                .iter()
                .enumerate()
                .map(|(index, name)| (name.clone(), index))
                .collect::<Vec<_>>();
            Ok(aggregate::measure_overview(
                &resolved.apply(&dataset),
                &measures,
            ))
        })
    }

    /// Per-group time series of `measure`, ordered by primary timestamp.
    pub fn series(
        &self,
        filter: &FilterSpec,
        group_by: &str,
        measure: &str,
    ) -> Result<Arc<Vec<GroupSeries>>, PipelineError> {
        let dataset = self.clean_dataset()?;
        let group_index = dataset.schema().dimension_index(group_by)?;
        let measure_index = dataset.schema().measure_index(measure)?;
        let resolved = filter.resolve(&dataset)?;
        let key = query_key("series", &dataset, &resolved)
            .part("group_by", group_by)
            .part("measure", measure);
        self.cache.series.get_or_compute(&key, || {
            Ok(aggregate::series(
                resolved.apply(&dataset),
                group_index,
                measure_index,
            ))
        })
    }
}

fn query_key(kind: &str, dataset: &CleanDataset, filter: &ResolvedFilter) -> CacheKey {
    CacheKey::new(kind)
        .part("dataset", dataset.identity())
        .part("filter", filter.fingerprint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ConfigError, LookupError},
        source::MemorySource,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(values: Vec<serde_json::Value>) -> QueryContext {
        QueryContext::new(
            Box::new(MemorySource::from_values("test", values)),
            RecordSchema::energy(),
        )
    }

    fn two_groups() -> Vec<serde_json::Value> {
        vec![
            json!({"startTime": "2021-01-01T00:00:00", "productionGroup": "hydro", "quantityKwh": 100}),
            json!({"startTime": "2021-01-01T01:00:00", "productionGroup": "wind", "quantityKwh": 50}),
        ]
    }

    #[test]
    fn dataset_is_built_once() {
        let ctx = context(two_groups());
        let a = ctx.clean_dataset().unwrap();
        let b = ctx.clean_dataset().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ctx.cache().datasets.stats().computations, 1);
    }

    #[test]
    fn repeated_aggregate_hits_cache() {
        let ctx = context(two_groups());
        let filter = FilterSpec::new();
        let first = ctx.aggregate(&filter, "productionGroup", "quantityKwh").unwrap();
        let second = ctx.aggregate(&filter, "productionGroup", "quantityKwh").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let stats = ctx.cache().aggregates.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn unknown_group_or_measure_is_a_config_error() {
        let ctx = context(two_groups());
        let err = ctx
            .aggregate(&FilterSpec::new(), "fuel", "quantityKwh")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownField { role: "dimension", .. })
        ));
        let err = ctx.summary_stats(&FilterSpec::new(), "price").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownField { role: "measure", .. })
        ));
    }

    #[test]
    fn lookup_failure_leaves_cache_usable() {
        let ctx = context(two_groups());
        let bad = FilterSpec::new().month("Feb 2030");
        let err = ctx.aggregate(&bad, "productionGroup", "quantityKwh").unwrap_err();
        assert!(matches!(err, PipelineError::Lookup(LookupError::UnknownLabel(_))));
        assert_eq!(ctx.cache().aggregates.stats().entries, 0);
        let good = FilterSpec::new().month("Jan 2021");
        let result = ctx.aggregate(&good, "productionGroup", "quantityKwh").unwrap();
        assert_eq!(result.total, 150.0);
    }

    #[test]
    fn empty_source_is_not_cached() {
        struct CountingSource(AtomicUsize);
        impl RecordSource for CountingSource {
            fn identity(&self) -> String {
                "counting".to_string()
            }
            fn read(&self) -> Result<Vec<crate::data::RawRecord>, crate::error::SourceError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let ctx = QueryContext::new(
            Box::new(CountingSource(AtomicUsize::new(0))),
            RecordSchema::energy(),
        );
        assert!(matches!(
            ctx.clean_dataset().unwrap_err(),
            PipelineError::EmptySource { rows_read: 0, .. }
        ));
        assert!(ctx.clean_dataset().is_err());
        assert_eq!(ctx.cache().datasets.stats().computations, 2);
    }

    #[test]
    fn latest_update_reads_secondary_timestamp() {
        let ctx = context(vec![
            json!({"startTime": "2021-01-01", "lastUpdatedTime": "2024-12-20T10:46:00", "quantityKwh": 1}),
        ]);
        let latest = ctx.latest_update("lastUpdatedTime").unwrap().unwrap();
        assert_eq!(latest.to_string(), "2024-12-20 10:46:00");
        assert!(ctx.latest_update("startTime").is_err());
    }

    #[test]
    fn overview_lists_each_measure() {
        let ctx = QueryContext::new(
            Box::new(MemorySource::from_values(
                "weather",
                vec![
                    json!({"time": "2020-01-01T00:00", "temperature_2m (°C)": -2.0, "precipitation (mm)": 0.0}),
                    json!({"time": "2020-01-01T01:00", "temperature_2m (°C)": -4.0, "precipitation (mm)": 1.5}),
                ],
            )),
            RecordSchema::weather(),
        );
        let overview = ctx.measure_overview(&FilterSpec::new()).unwrap();
        assert_eq!(overview.len(), RecordSchema::weather().measures.len());
        assert_eq!(overview[0].measure, "temperature_2m (°C)");
        assert_eq!(overview[0].stats.mean, -3.0);
        assert_eq!(overview[2].stats.count, 0);
    }

    #[test]
    fn series_is_cached_per_group_and_measure() {
        let ctx = context(two_groups());
        let series = ctx
            .series(&FilterSpec::new(), "productionGroup", "quantityKwh")
            .unwrap();
        assert_eq!(series.len(), 2);
        ctx.series(&FilterSpec::new(), "productionGroup", "quantityKwh")
            .unwrap();
        assert_eq!(ctx.cache().series.stats().computations, 1);
    }
}
