//! Batch enrichment.
//!
//! Queries are split into consecutive chunks. Every query of a chunk runs
//! concurrently and the next chunk starts only once the whole chunk has
//! settled. Results keep the input order and a failed query never aborts the
//! run. Each run owns a fresh [`CallLog`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::enrichment::{EnrichedMaterialResult, enrich};
use crate::domain::materials::MaterialRecord;
use crate::domain::regions::RegionDirectory;
use crate::domain::types::CallSource;
use crate::infra::http::{Fetched, RequestError};

const METRIC_BATCH_RUN_MS: &str = "embodied_batch_run_ms";
const DEFAULT_CHUNK_SIZE: usize = 3;

/// Where material records come from.
#[async_trait]
pub trait MaterialSource: Send + Sync {
    async fn fetch_material(&self, material_id: &str)
    -> Result<Fetched<MaterialRecord>, RequestError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialQuery {
    pub material_id: String,
    pub region_id: String,
}

impl MaterialQuery {
    pub fn new(material_id: impl Into<String>, region_id: impl Into<String>) -> Self {
        Self {
            material_id: material_id.into(),
            region_id: region_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub material_id: String,
    pub source: CallSource,
    pub region_id: String,
}

/// Append-only record of the successful fetches of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CallLog {
    entries: Vec<CallLogEntry>,
}

impl CallLog {
    pub fn push(&mut self, entry: CallLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CallLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> BatchRunStats {
        let hits = self
            .entries
            .iter()
            .filter(|entry| entry.source == CallSource::Cache)
            .count();
        BatchRunStats::new(hits, self.entries.len() - hits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunStats {
    pub hits: usize,
    pub misses: usize,
    /// `hits / (hits + misses)`, or `0.0` for an empty run.
    pub efficiency_ratio: f64,
}

impl BatchRunStats {
    pub fn new(hits: usize, misses: usize) -> Self {
        let total = hits + misses;
        let efficiency_ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            hits,
            misses,
            efficiency_ratio,
        }
    }

    /// Combined stats of two runs.
    pub fn merge(&self, other: &BatchRunStats) -> Self {
        Self::new(self.hits + other.hits, self.misses + other.misses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Client,
    ExhaustedRetries,
    Decode,
}

impl From<&RequestError> for FailureKind {
    fn from(error: &RequestError) -> Self {
        match error {
            RequestError::Client { .. } => FailureKind::Client,
            RequestError::ExhaustedRetries { .. } => FailureKind::ExhaustedRetries,
            RequestError::Decode { .. } => FailureKind::Decode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub query: MaterialQuery,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one query, in the slot of its input position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItem {
    Enriched(EnrichedMaterialResult),
    Failed(ItemFailure),
}

impl BatchItem {
    pub fn enriched(&self) -> Option<&EnrichedMaterialResult> {
        match self {
            BatchItem::Enriched(result) => Some(result),
            BatchItem::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            BatchItem::Enriched(_) => None,
            BatchItem::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub results: Vec<BatchItem>,
    pub stats: BatchRunStats,
    pub log: CallLog,
}

impl BatchReport {
    pub fn enriched(&self) -> impl Iterator<Item = &EnrichedMaterialResult> {
        self.results.iter().filter_map(BatchItem::enriched)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.results.iter().filter_map(BatchItem::failure)
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    source: Arc<dyn MaterialSource>,
    regions: Arc<RegionDirectory>,
    chunk_size: NonZeroUsize,
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn MaterialSource>,
        regions: Arc<RegionDirectory>,
        chunk_size: NonZeroUsize,
    ) -> Self {
        Self {
            source,
            regions,
            chunk_size,
        }
    }

    pub fn with_default_chunk_size(
        source: Arc<dyn MaterialSource>,
        regions: Arc<RegionDirectory>,
    ) -> Self {
        let chunk_size = NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self::new(source, regions, chunk_size)
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    pub async fn run_batch(&self, queries: &[MaterialQuery]) -> BatchReport {
        let span = info_span!(
            "batch_run",
            queries = queries.len(),
            chunk_size = self.chunk_size.get()
        );
        self.run_chunks(queries).instrument(span).await
    }

    async fn run_chunks(&self, queries: &[MaterialQuery]) -> BatchReport {
        let started = Instant::now();
        let mut log = CallLog::default();
        let mut results = Vec::with_capacity(queries.len());

        for (index, chunk) in queries.chunks(self.chunk_size.get()).enumerate() {
            let settled = join_all(chunk.iter().map(|query| self.run_query(query))).await;
            for (item, entry) in settled {
                if let Some(entry) = entry {
                    log.push(entry);
                }
                results.push(item);
            }
            debug!(chunk = index, size = chunk.len(), "chunk settled");
        }

        let stats = log.stats();
        let elapsed = started.elapsed();
        histogram!(METRIC_BATCH_RUN_MS).record(elapsed.as_secs_f64() * 1_000.0);
        info!(
            hits = stats.hits,
            misses = stats.misses,
            failures = results.iter().filter(|item| item.failure().is_some()).count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch run complete"
        );

        BatchReport {
            results,
            stats,
            log,
        }
    }

    async fn run_query(&self, query: &MaterialQuery) -> (BatchItem, Option<CallLogEntry>) {
        match self.source.fetch_material(&query.material_id).await {
            Ok(fetched) => {
                let now = OffsetDateTime::now_utc();
                let region = self.regions.resolve(&query.region_id);
                let enriched = enrich(&fetched.value, &region, now);
                let entry = CallLogEntry {
                    timestamp: now,
                    material_id: query.material_id.clone(),
                    source: fetched.source,
                    region_id: query.region_id.clone(),
                };
                (BatchItem::Enriched(enriched), Some(entry))
            }
            Err(err) => {
                warn!(
                    material_id = %query.material_id,
                    region_id = %query.region_id,
                    kind = err.kind(),
                    error = %err,
                    "Material query failed"
                );
                let failure = ItemFailure {
                    query: query.clone(),
                    kind: FailureKind::from(&err),
                    message: err.to_string(),
                };
                (BatchItem::Failed(failure), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::domain::regions::RegionContext;
    use crate::domain::types::MaterialClass;
    use crate::infra::http::TransientError;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start(String),
        End(String),
    }

    /// In-memory source with per-material latency and scripted failures.
    #[derive(Default)]
    struct FakeSource {
        delays: HashMap<String, Duration>,
        failures: HashMap<String, u16>,
        cached: Vec<String>,
        events: Mutex<Vec<Event>>,
    }

    impl FakeSource {
        fn delay(mut self, id: &str, millis: u64) -> Self {
            self.delays
                .insert(id.to_string(), Duration::from_millis(millis));
            self
        }

        fn failing(mut self, id: &str, status: u16) -> Self {
            self.failures.insert(id.to_string(), status);
            self
        }

        fn cached(mut self, id: &str) -> Self {
            self.cached.push(id.to_string());
            self
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().expect("events lock").clone()
        }

        fn record(&self, event: Event) {
            self.events.lock().expect("events lock").push(event);
        }
    }

    #[async_trait]
    impl MaterialSource for FakeSource {
        async fn fetch_material(
            &self,
            material_id: &str,
        ) -> Result<Fetched<MaterialRecord>, RequestError> {
            self.record(Event::Start(material_id.to_string()));
            if let Some(delay) = self.delays.get(material_id) {
                sleep(*delay).await;
            }
            self.record(Event::End(material_id.to_string()));

            match self.failures.get(material_id) {
                Some(status) if (400..500).contains(status) => Err(RequestError::Client {
                    status: *status,
                    body: "not found".to_string(),
                }),
                Some(status) => Err(RequestError::ExhaustedRetries {
                    attempts: 3,
                    last: TransientError::Server {
                        status: *status,
                        body: String::new(),
                    },
                }),
                None => {
                    let source = if self.cached.iter().any(|id| id == material_id) {
                        CallSource::Cache
                    } else {
                        CallSource::Live
                    };
                    Ok(Fetched::new(record(material_id, 1.0), source))
                }
            }
        }
    }

    fn record(id: &str, carbon_rate: f64) -> MaterialRecord {
        MaterialRecord {
            material_id: id.to_string(),
            carbon_rate,
            unit: "kg".to_string(),
            confidence_score: 0.9,
            source_id: "epd-test".to_string(),
        }
    }

    fn regions() -> Arc<RegionDirectory> {
        let mut brisbane = RegionContext::neutral("brisbane");
        brisbane
            .transport_penalty_by_material_class
            .insert(MaterialClass::Concrete, 5.0);
        Arc::new(RegionDirectory::new([brisbane]))
    }

    fn orchestrator(source: Arc<FakeSource>, chunk_size: usize) -> BatchOrchestrator {
        BatchOrchestrator::new(
            source,
            regions(),
            NonZeroUsize::new(chunk_size).expect("non-zero"),
        )
    }

    fn queries(ids: &[&str]) -> Vec<MaterialQuery> {
        ids.iter()
            .map(|id| MaterialQuery::new(*id, "brisbane"))
            .collect()
    }

    fn result_ids(report: &BatchReport) -> Vec<String> {
        report
            .results
            .iter()
            .map(|item| match item {
                BatchItem::Enriched(result) => result.material_record.material_id.clone(),
                BatchItem::Failed(failure) => failure.query.material_id.clone(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_input_order_when_completion_is_reversed() {
        let source = Arc::new(
            FakeSource::default()
                .delay("concrete_a", 300)
                .delay("concrete_b", 200)
                .delay("concrete_c", 100),
        );
        let report = orchestrator(Arc::clone(&source), 3)
            .run_batch(&queries(&["concrete_a", "concrete_b", "concrete_c"]))
            .await;

        assert_eq!(
            result_ids(&report),
            vec!["concrete_a", "concrete_b", "concrete_c"]
        );
        let ends: Vec<_> = source
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::End(id) => Some(id),
                Event::Start(_) => None,
            })
            .collect();
        assert_eq!(ends, vec!["concrete_c", "concrete_b", "concrete_a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_abort_the_batch() {
        let source = Arc::new(FakeSource::default().failing("m3", 404));
        let report = orchestrator(source, 3)
            .run_batch(&queries(&["m1", "m2", "m3", "m4", "m5"]))
            .await;

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.enriched().count(), 4);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].query.material_id, "m3");
        assert_eq!(failures[0].kind, FailureKind::Client);
        assert!(report.results[2].failure().is_some());
        assert_eq!(report.log.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn next_chunk_waits_for_the_whole_previous_chunk() {
        let source = Arc::new(
            FakeSource::default()
                .delay("m1", 10)
                .delay("m2", 500)
                .delay("m3", 20)
                .delay("m4", 10)
                .delay("m5", 10),
        );
        orchestrator(Arc::clone(&source), 2)
            .run_batch(&queries(&["m1", "m2", "m3", "m4", "m5"]))
            .await;

        let events = source.events();
        let position = |event: Event| {
            events
                .iter()
                .position(|candidate| *candidate == event)
                .expect("event recorded")
        };
        let chunks: [&[&str]; 3] = [&["m1", "m2"], &["m3", "m4"], &["m5"]];
        for pair in chunks.windows(2) {
            let last_end = pair[0]
                .iter()
                .map(|id| position(Event::End(id.to_string())))
                .max()
                .expect("non-empty chunk");
            let first_start = pair[1]
                .iter()
                .map(|id| position(Event::Start(id.to_string())))
                .min()
                .expect("non-empty chunk");
            assert!(last_end < first_start, "chunks overlapped: {events:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_members_run_concurrently() {
        let source = Arc::new(
            FakeSource::default()
                .delay("m1", 1_000)
                .delay("m2", 1_000)
                .delay("m3", 1_000),
        );
        let started = Instant::now();
        orchestrator(source, 3)
            .run_batch(&queries(&["m1", "m2", "m3"]))
            .await;

        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_count_cache_hits_and_misses() {
        let source = Arc::new(FakeSource::default().cached("m1").cached("m2").failing("m4", 503));
        let report = orchestrator(source, 3)
            .run_batch(&queries(&["m1", "m2", "m3", "m4"]))
            .await;

        assert_eq!(report.stats.hits, 2);
        assert_eq!(report.stats.misses, 1);
        assert!((report.stats.efficiency_ratio - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.failures().next().map(|f| f.kind), Some(FailureKind::ExhaustedRetries));
    }

    #[tokio::test]
    async fn empty_batch_has_zero_efficiency() {
        let report = orchestrator(Arc::new(FakeSource::default()), 3)
            .run_batch(&[])
            .await;

        assert!(report.results.is_empty());
        assert!(report.log.is_empty());
        assert_eq!(report.stats, BatchRunStats::new(0, 0));
        assert_eq!(report.stats.efficiency_ratio, 0.0);
    }

    #[tokio::test]
    async fn unknown_region_enriches_with_neutral_context() {
        let source = Arc::new(FakeSource::default());
        let report = orchestrator(source, 3)
            .run_batch(&[
                MaterialQuery::new("ready_mix_25mpa", "brisbane"),
                MaterialQuery::new("ready_mix_25mpa", "atlantis"),
            ])
            .await;

        let enriched: Vec<_> = report.enriched().collect();
        assert_eq!(enriched[0].transport_penalty, 5.0);
        assert_eq!(enriched[1].region_id, "atlantis");
        assert_eq!(enriched[1].transport_penalty, 0.0);
        assert_eq!(enriched[1].suppliers, vec!["Generic Supplier".to_string()]);
    }

    #[test]
    fn merged_stats_recompute_the_ratio() {
        let first = BatchRunStats::new(0, 1);
        let second = BatchRunStats::new(1, 0);
        let combined = first.merge(&second);
        assert_eq!(combined.hits, 1);
        assert_eq!(combined.misses, 1);
        assert_eq!(combined.efficiency_ratio, 0.5);
    }

    #[test]
    fn items_serialize_with_a_status_tag() {
        let failure = BatchItem::Failed(ItemFailure {
            query: MaterialQuery::new("m3", "brisbane"),
            kind: FailureKind::Decode,
            message: "bad body".to_string(),
        });
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "decode");
        assert_eq!(json["query"]["materialId"], "m3");
    }
}
