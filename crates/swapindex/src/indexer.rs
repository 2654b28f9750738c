//! Bulk write engine
//!
//! Applies upserts and deletes to every physical index bound to the write
//! alias, on every configured cluster. Each call takes one external version
//! from the data source and stamps it on every upsert it issues, so a write
//! describing stale source data loses to any write describing fresher data.
//!
//! Per-cluster calls are independent. When more than one cluster is
//! configured they run on scoped threads (unless disabled in [`Settings`]),
//! and every cluster's outcome is collected before the call returns.
//!
//! [`Settings`]: swapindex_core::Settings

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use swapindex_core::{Document, TypeMode};

use crate::cluster::{ClusterTarget, DeleteByQueryResponse};
use crate::config::IndexConfiguration;
use crate::conflict::BulkOutcome;
use crate::error::{ClusterFailure, IndexingError, SwapError, SwapResult};
use crate::wire::{BulkDirective, BulkRequest};

/// Counts from one write call, summed across clusters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Directives submitted (records × write-bound indices)
    pub directives: usize,
    pub applied: usize,
    /// Stale-version rejections that were swallowed
    pub ignored_conflicts: usize,
    /// Clusters that received a bulk request
    pub clusters: usize,
}

impl BulkReport {
    pub fn merge(&mut self, other: &Self) {
        self.directives += other.directives;
        self.applied += other.applied;
        self.ignored_conflicts += other.ignored_conflicts;
        self.clusters += other.clusters;
    }
}

pub struct BulkIndexer<R> {
    config: Arc<IndexConfiguration<R>>,
}

impl<R> Clone for BulkIndexer<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

impl<R> std::fmt::Debug for BulkIndexer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkIndexer")
            .field("write_alias", &self.config.write_alias())
            .finish_non_exhaustive()
    }
}

impl<R> BulkIndexer<R> {
    #[must_use]
    pub const fn new(config: Arc<IndexConfiguration<R>>) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfiguration<R> {
        &self.config
    }

    /// Upsert `records` on every cluster.
    ///
    /// With `index_name`, writes go to that physical index only; otherwise
    /// to every index bound to the write alias on each cluster.
    pub fn index_batch(&self, records: &[R], index_name: Option<&str>) -> SwapResult<BulkReport> {
        if records.is_empty() {
            return Ok(BulkReport::default());
        }
        let documents = self.extract(records)?;
        let version = self.config.current_version()?;
        let write_alias = self.config.write_alias();

        let reports = self.fan_out(|target| {
            bulk_on_cluster(
                target,
                write_alias,
                index_name,
                &|index: &str, mode: &TypeMode| upserts(index, &documents, version, mode),
            )
        })?;
        Ok(sum(&reports))
    }

    /// Upsert `records` on one cluster only.
    pub fn index_batch_on(
        &self,
        target: &ClusterTarget,
        records: &[R],
        index_name: Option<&str>,
    ) -> SwapResult<BulkReport> {
        if records.is_empty() {
            return Ok(BulkReport::default());
        }
        let documents = self.extract(records)?;
        let version = self.config.current_version()?;
        bulk_on_cluster(
            target,
            self.config.write_alias(),
            index_name,
            &|index: &str, mode: &TypeMode| upserts(index, &documents, version, mode),
        )
    }

    pub fn index_record(&self, record: &R) -> SwapResult<BulkReport> {
        self.index_batch(std::slice::from_ref(record), None)
    }

    pub fn delete_by_id(&self, id: &str) -> SwapResult<BulkReport> {
        self.delete_by_ids(&[id])
    }

    /// Delete `ids` from every write-bound index on every cluster.
    pub fn delete_by_ids<I: AsRef<str>>(&self, ids: &[I]) -> SwapResult<BulkReport> {
        if ids.is_empty() {
            return Ok(BulkReport::default());
        }
        let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
        let write_alias = self.config.write_alias();

        let reports = self.fan_out(|target| {
            bulk_on_cluster(target, write_alias, None, &|index: &str, mode: &TypeMode| {
                ids.iter()
                    .map(|id| BulkDirective::delete(index, id, mode))
                    .collect::<Vec<_>>()
            })
        })?;
        Ok(sum(&reports))
    }

    /// Engine-native delete-by-query against the write alias on every cluster.
    ///
    /// `query` is the query clause alone (`{ "term": { .. } }`); it is sent
    /// as `{ "query": query }`. The engine resolves the alias to its bound
    /// indices itself.
    pub fn delete_by_query(&self, query: &Value) -> SwapResult<Vec<DeleteByQueryResponse>> {
        let write_alias = self.config.write_alias();
        let body = serde_json::json!({ "query": query });
        let responses = self.fan_out(|target| {
            let response = target
                .client
                .delete_by_query(write_alias, &body)
                .map_err(|e| SwapError::cluster(target.name(), e))?;
            tracing::info!(
                target: "swapindex.bulk",
                cluster = target.name(),
                alias = write_alias,
                deleted = response.deleted,
                version_conflicts = response.version_conflicts,
                "delete-by-query finished"
            );
            Ok(response)
        })?;
        Ok(responses)
    }

    fn extract(&self, records: &[R]) -> SwapResult<Vec<Document>> {
        records
            .iter()
            .map(|record| self.config.document_for(record))
            .collect()
    }

    /// Run `op` against every cluster and collect all outcomes.
    fn fan_out<T, F>(&self, op: F) -> SwapResult<Vec<T>>
    where
        T: Send,
        F: Fn(&ClusterTarget) -> SwapResult<T> + Sync,
    {
        let clusters = self.config.clusters();
        let results: Vec<SwapResult<T>> =
            if self.config.settings().parallel_fanout && clusters.len() > 1 {
                std::thread::scope(|s| {
                    let handles: Vec<_> = clusters
                        .iter()
                        .map(|target| {
                            let op = &op;
                            s.spawn(move || op(target))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|h| h.join().expect("fan-out thread panicked"))
                        .collect()
                })
            } else {
                clusters.iter().map(&op).collect()
            };

        let mut values = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (target, result) in clusters.iter().zip(results) {
            match result {
                Ok(value) => values.push(value),
                Err(error) => failures.push(ClusterFailure {
                    cluster: target.name().to_owned(),
                    error: Box::new(error),
                }),
            }
        }

        match failures.len() {
            0 => Ok(values),
            1 => Err(*failures.remove(0).error),
            _ => Err(SwapError::FanOut(failures)),
        }
    }
}

fn upserts(index: &str, documents: &[Document], version: u64, mode: &TypeMode) -> Vec<BulkDirective> {
    documents
        .iter()
        .map(|doc| BulkDirective::index(index, doc, version, mode))
        .collect()
}

fn sum(reports: &[BulkReport]) -> BulkReport {
    reports.iter().fold(BulkReport::default(), |mut acc, r| {
        acc.merge(r);
        acc
    })
}

type DirectiveBuilder<'a> = dyn Fn(&str, &TypeMode) -> Vec<BulkDirective> + Sync + 'a;

/// Submit one bulk request to one cluster and classify the response.
fn bulk_on_cluster(
    target: &ClusterTarget,
    write_alias: &str,
    index_name: Option<&str>,
    build: &DirectiveBuilder<'_>,
) -> SwapResult<BulkReport> {
    let cluster = target.name();
    let indices = match index_name {
        Some(name) => vec![name.to_owned()],
        None => target
            .client
            .get_alias(write_alias)
            .map_err(|e| SwapError::cluster(cluster, e))?,
    };
    if indices.is_empty() {
        tracing::warn!(
            target: "swapindex.bulk",
            cluster,
            alias = write_alias,
            "write alias is not bound to any index; skipping cluster"
        );
        return Ok(BulkReport::default());
    }

    let directives: Vec<BulkDirective> = indices
        .iter()
        .flat_map(|index| build(index, &target.type_mode))
        .collect();
    let request = BulkRequest::new(directives);
    let response = target
        .client
        .bulk(&request)
        .map_err(|e| SwapError::cluster(cluster, e))?;
    let outcome = BulkOutcome::from_response(&response);

    if outcome.ignored_conflicts > 0 {
        tracing::warn!(
            target: "swapindex.bulk",
            cluster,
            ignored = outcome.ignored_conflicts,
            "ignored version conflicts; stored documents are already newer"
        );
    }
    if !outcome.is_clean() {
        tracing::warn!(
            target: "swapindex.bulk",
            cluster,
            fatal = outcome.fatal.len(),
            "bulk request had item errors"
        );
        return Err(IndexingError {
            cluster: cluster.to_owned(),
            errors: outcome.fatal,
        }
        .into());
    }

    tracing::debug!(
        target: "swapindex.bulk",
        cluster,
        indices = ?indices,
        directives = request.len(),
        applied = outcome.applied,
        "bulk request applied"
    );
    Ok(BulkReport {
        directives: request.len(),
        applied: outcome.applied,
        ignored_conflicts: outcome.ignored_conflicts,
        clusters: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use serde_json::json;
    use swapindex_core::Settings;

    use crate::cluster::{AliasAction, ClusterError, ClusterResult, IndexInfo, SearchCluster};
    use crate::conflict::VERSION_CONFLICT_TYPE;
    use crate::source::{DataSource, RecordBatches};
    use crate::wire::{BulkAction, BulkResponse, BulkResponseItem, ItemError, ItemResult};

    /// Records every bulk request; rejects ids listed in `reject`.
    struct Recorder {
        name: &'static str,
        write_bound: Vec<String>,
        reject: Vec<(&'static str, ItemError)>,
        down: bool,
        requests: Mutex<Vec<BulkRequest>>,
        queries: Mutex<Vec<Value>>,
    }

    impl Recorder {
        fn new(name: &'static str, write_bound: &[&str]) -> Self {
            Self {
                name,
                write_bound: write_bound.iter().map(|s| (*s).to_owned()).collect(),
                reject: Vec::new(),
                down: false,
                requests: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<BulkRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl SearchCluster for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn create_index(&self, _: &str, _: &Value) -> ClusterResult<()> {
            Ok(())
        }
        fn put_alias(&self, _: &str, _: &str) -> ClusterResult<()> {
            Ok(())
        }
        fn get_alias(&self, _: &str) -> ClusterResult<Vec<String>> {
            Ok(self.write_bound.clone())
        }
        fn alias_exists(&self, _: &str) -> ClusterResult<bool> {
            Ok(!self.write_bound.is_empty())
        }
        fn update_aliases(&self, _: &[AliasAction]) -> ClusterResult<()> {
            Ok(())
        }
        fn delete_indices(&self, _: &[String]) -> ClusterResult<()> {
            Ok(())
        }
        fn cat_indices(&self) -> ClusterResult<Vec<IndexInfo>> {
            Ok(Vec::new())
        }
        fn count(&self, _: &str) -> ClusterResult<u64> {
            Ok(0)
        }
        fn bulk(&self, request: &BulkRequest) -> ClusterResult<BulkResponse> {
            if self.down {
                return Err(ClusterError::transport("connection refused"));
            }
            self.requests.lock().unwrap().push(request.clone());
            let items = request
                .directives()
                .iter()
                .map(|d| {
                    let rejected = self.reject.iter().find(|(id, _)| *id == d.id());
                    let result = match rejected {
                        Some((_, error)) => {
                            ItemResult::failed(d.target_index(), d.id(), 409, error.clone())
                        }
                        None => ItemResult::applied(d.target_index(), d.id(), 200, "updated", None),
                    };
                    BulkResponseItem::new(d.action(), result)
                })
                .collect();
            Ok(BulkResponse::from_items(items))
        }
        fn delete_by_query(&self, index: &str, body: &Value) -> ClusterResult<DeleteByQueryResponse> {
            if self.down {
                return Err(ClusterError::new(404, "index_not_found_exception", index));
            }
            self.queries.lock().unwrap().push(body.clone());
            Ok(DeleteByQueryResponse {
                deleted: 3,
                ..DeleteByQueryResponse::default()
            })
        }
    }

    struct Watermark(AtomicU64);

    impl DataSource for Watermark {
        type Record = u32;
        fn collection_name(&self) -> &str {
            "products"
        }
        fn current_version_watermark(&self) -> SwapResult<u64> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst))
        }
        fn batches(&self, _: usize) -> RecordBatches<'_, u32> {
            Box::new(std::iter::empty())
        }
        fn approximate_count(&self) -> SwapResult<u64> {
            Ok(0)
        }
    }

    fn build_indexer(clusters: Vec<Arc<Recorder>>, parallel: bool) -> BulkIndexer<u32> {
        let mut builder = IndexConfiguration::builder(Watermark(AtomicU64::new(100)))
            .documents(|n: &u32| Ok(Document::from_serialize(n.to_string(), &json!({ "n": n }))?))
            .settings(Settings {
                parallel_fanout: parallel,
                ..Settings::default()
            });
        for cluster in clusters {
            builder = builder.cluster(cluster);
        }
        BulkIndexer::new(Arc::new(builder.build().unwrap()))
    }

    fn stale(id: &str) -> ItemError {
        ItemError::new(
            VERSION_CONFLICT_TYPE,
            format!("[{id}]: version conflict, current version [200] is higher or equal to the one provided [100]"),
        )
    }

    #[test]
    fn one_version_per_call_across_dual_write_indices() {
        let cluster = Arc::new(Recorder::new("primary", &["products_v1", "products_v2"]));
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        let report = indexer.index_batch(&[1, 2, 3], None).unwrap();
        assert_eq!(report.directives, 6);
        assert_eq!(report.applied, 6);
        assert_eq!(report.clusters, 1);

        let sent = cluster.sent();
        assert_eq!(sent.len(), 1, "one bulk request per cluster");
        let versions: Vec<u64> = sent[0]
            .directives()
            .iter()
            .filter_map(|d| match d {
                BulkDirective::Index { version, .. } => Some(*version),
                BulkDirective::Delete { .. } => None,
            })
            .collect();
        assert!(versions.iter().all(|v| *v == 100));

        indexer.index_record(&4).unwrap();
        let sent = cluster.sent();
        assert!(matches!(
            sent[1].directives()[0],
            BulkDirective::Index { version: 101, .. }
        ));
    }

    #[test]
    fn explicit_index_name_bypasses_write_alias() {
        let cluster = Arc::new(Recorder::new("primary", &["products_v1", "products_v2"]));
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        indexer.index_batch(&[1], Some("products_v3")).unwrap();
        let sent = cluster.sent();
        assert_eq!(sent[0].len(), 1);
        assert_eq!(sent[0].directives()[0].target_index(), "products_v3");
    }

    #[test]
    fn empty_inputs_make_no_calls() {
        let cluster = Arc::new(Recorder::new("primary", &["products_v1"]));
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        assert_eq!(indexer.index_batch(&[], None).unwrap(), BulkReport::default());
        assert_eq!(
            indexer.delete_by_ids::<&str>(&[]).unwrap(),
            BulkReport::default()
        );
        assert!(cluster.sent().is_empty());
    }

    #[test]
    fn unbound_write_alias_skips_cluster() {
        let cluster = Arc::new(Recorder::new("primary", &[]));
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        let report = indexer.index_batch(&[1], None).unwrap();
        assert_eq!(report.clusters, 0);
        assert!(cluster.sent().is_empty());
    }

    #[test]
    fn stale_versions_are_ignored() {
        let mut cluster = Recorder::new("primary", &["products_v1"]);
        cluster.reject.push(("2", stale("2")));
        let cluster = Arc::new(cluster);
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        let report = indexer.index_batch(&[1, 2], None).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.ignored_conflicts, 1);
    }

    #[test]
    fn fatal_items_raise_with_full_list() {
        let mut cluster = Recorder::new("primary", &["products_v1"]);
        cluster.reject.push(("2", stale("2")));
        cluster.reject.push((
            "3",
            ItemError::new("mapper_parsing_exception", "failed to parse field [n]"),
        ));
        let indexer = build_indexer(vec![Arc::new(cluster)], false);

        let err = indexer.index_batch(&[1, 2, 3], None).unwrap_err();
        let SwapError::Indexing(err) = &err else {
            panic!("expected indexing error, got {err:?}");
        };
        assert_eq!(err.cluster, "primary");
        assert_eq!(err.ids(), vec!["3"]);
        assert_eq!(err.errors[0].error_type, "mapper_parsing_exception");
    }

    #[test]
    fn deletes_fan_out_to_every_write_index() {
        let cluster = Arc::new(Recorder::new("primary", &["products_v1", "products_v2"]));
        let indexer = build_indexer(vec![Arc::clone(&cluster)], false);

        let report = indexer.delete_by_ids(&["1", "2"]).unwrap();
        assert_eq!(report.directives, 4);
        let sent = cluster.sent();
        assert!(
            sent[0]
                .directives()
                .iter()
                .all(|d| d.action() == BulkAction::Delete)
        );

        indexer.delete_by_id("9").unwrap();
        assert_eq!(cluster.sent()[1].len(), 2);
    }

    #[test]
    fn one_failing_cluster_does_not_block_others() {
        for parallel in [false, true] {
            let healthy = Arc::new(Recorder::new("east", &["products_v1"]));
            let mut broken = Recorder::new("west", &["products_v1"]);
            broken.down = true;
            let indexer = build_indexer(vec![Arc::clone(&healthy), Arc::new(broken)], parallel);

            let err = indexer.index_batch(&[1], None).unwrap_err();
            assert_eq!(err.error_type(), "CLUSTER_ERROR");
            assert!(err.to_string().contains("west"));
            assert_eq!(healthy.sent().len(), 1, "parallel={parallel}");
        }
    }

    #[test]
    fn several_failing_clusters_aggregate() {
        let mut east = Recorder::new("east", &["products_v1"]);
        east.down = true;
        let mut west = Recorder::new("west", &["products_v1"]);
        west.down = true;
        let indexer = build_indexer(vec![Arc::new(east), Arc::new(west)], true);

        let err = indexer.delete_by_id("1").unwrap_err();
        let SwapError::FanOut(failures) = &err else {
            panic!("expected fan-out error, got {err:?}");
        };
        let names: Vec<&str> = failures.iter().map(|f| f.cluster.as_str()).collect();
        assert_eq!(names, vec!["east", "west"]);
        assert!(err.is_retryable());
    }

    #[test]
    fn delete_by_query_targets_write_alias() {
        let a = Arc::new(Recorder::new("east", &["products_v1"]));
        let b = Arc::new(Recorder::new("west", &["products_v1"]));
        let indexer = build_indexer(vec![Arc::clone(&a), Arc::clone(&b)], true);

        let responses = indexer
            .delete_by_query(&json!({ "term": { "n": 1 } }))
            .unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.deleted == 3));
        for cluster in [&a, &b] {
            assert_eq!(
                *cluster.queries.lock().unwrap(),
                vec![json!({ "query": { "term": { "n": 1 } } })]
            );
        }
    }

    #[test]
    fn report_merge_sums_fields() {
        let mut total = BulkReport {
            directives: 2,
            applied: 1,
            ignored_conflicts: 1,
            clusters: 1,
        };
        total.merge(&BulkReport {
            directives: 3,
            applied: 3,
            ignored_conflicts: 0,
            clusters: 1,
        });
        assert_eq!(
            total,
            BulkReport {
                directives: 5,
                applied: 4,
                ignored_conflicts: 1,
                clusters: 2,
            }
        );
    }
}
