//! Writes fanned out to more than one cluster.

mod common;

use std::sync::Arc;

use serde_json::json;
use swapindex::{
    BulkIndexer, ClusterError, IndexConfiguration, IndexManager, ItemError, Settings, SwapError,
    TypeMode,
};
use swapindex_test_helpers::{MemoryCluster, Product, VecSource, products};

struct Pair {
    east: Arc<MemoryCluster>,
    west: Arc<MemoryCluster>,
    source: Arc<VecSource<Product>>,
    config: Arc<IndexConfiguration<Product>>,
}

/// `east` is a modern cluster, `west` a legacy one typed `product`.
fn pair(settings: Settings) -> Pair {
    let east = Arc::new(MemoryCluster::new("east"));
    let west = Arc::new(MemoryCluster::legacy("west"));
    let source = common::source(products(3), 100);
    let config = common::config_with(
        &source,
        &[
            (Arc::clone(&east), TypeMode::Typeless),
            (
                Arc::clone(&west),
                TypeMode::Legacy {
                    doc_type: "product".to_owned(),
                },
            ),
        ],
        settings,
    );
    Pair {
        east,
        west,
        source,
        config,
    }
}

fn build_everywhere(config: &Arc<IndexConfiguration<Product>>, tag: &str) {
    for target in config.clusters() {
        let manager = IndexManager::for_target(Arc::clone(config), target.clone());
        common::build_and_switch(&manager, tag);
    }
}

#[test]
fn one_failing_cluster_returns_its_error_and_others_still_apply() {
    let Pair {
        east,
        west,
        source,
        config,
    } = pair(Settings::default());
    build_everywhere(&config, "v1");

    west.set_bulk_failure(Some(ClusterError::transport("connection reset")));
    source.set_watermark(200);
    let indexer = BulkIndexer::new(Arc::clone(&config));
    let err = indexer
        .index_record(&Product::new(9, "lamp", 1999))
        .unwrap_err();

    let SwapError::Cluster { cluster, source: engine } = &err else {
        panic!("expected a cluster error, got {err:?}");
    };
    assert_eq!(cluster, "west");
    assert_eq!(engine.error_type, "transport_error");
    assert!(err.is_retryable());

    assert_eq!(east.get_doc("products_v1", "9").unwrap().version, 200);
    assert!(west.get_doc("products_v1", "9").is_none());
}

#[test]
fn several_failing_clusters_are_all_reported() {
    let Pair {
        east,
        west,
        config,
        ..
    } = pair(Settings::default());
    build_everywhere(&config, "v1");

    east.set_bulk_failure(Some(ClusterError::new(
        503,
        "cluster_block_exception",
        "blocked by: [SERVICE_UNAVAILABLE/2/no master]",
    )));
    west.set_bulk_failure(Some(ClusterError::transport("timeout")));

    let err = BulkIndexer::new(Arc::clone(&config))
        .delete_by_id("1")
        .unwrap_err();
    let SwapError::FanOut(failures) = &err else {
        panic!("expected a fan-out error, got {err:?}");
    };
    let names: Vec<&str> = failures.iter().map(|f| f.cluster.as_str()).collect();
    assert_eq!(names, vec!["east", "west"]);
    assert!(err.is_retryable());
    assert!(err.to_string().starts_with("2 clusters failed"));
}

#[test]
fn item_failures_name_the_cluster() {
    let Pair {
        east,
        west,
        source,
        config,
    } = pair(Settings::default());
    build_everywhere(&config, "v1");

    east.fail_item(
        "4",
        429,
        ItemError::new("es_rejected_execution_exception", "rejected execution"),
    );
    source.set_watermark(101);
    let err = BulkIndexer::new(Arc::clone(&config))
        .index_batch(&[Product::new(4, "chair", 4500)], None)
        .unwrap_err();

    let SwapError::Indexing(indexing) = &err else {
        panic!("expected indexing error, got {err:?}");
    };
    assert_eq!(indexing.cluster, "east");
    assert_eq!(indexing.ids(), vec!["4"]);
    assert!(err.is_retryable(), "429 items are worth retrying");
    assert!(west.get_doc("products_v1", "4").is_some());
}

#[test]
fn each_cluster_gets_its_own_type_mode() {
    let Pair {
        east, west, config, ..
    } = pair(Settings::default());
    build_everywhere(&config, "v1");

    assert!(
        east.search_all("products")
            .unwrap()
            .iter()
            .all(|doc| doc.doc_type.is_none())
    );
    assert!(
        west.search_all("products")
            .unwrap()
            .iter()
            .all(|doc| doc.doc_type.as_deref() == Some("product"))
    );
    assert!(
        east.index_body("products_v1").unwrap()["mappings"]["properties"].is_object()
    );
    assert!(
        west.index_body("products_v1").unwrap()["mappings"]["product"].is_object()
    );
}

#[test]
fn delete_by_query_runs_on_every_cluster() {
    let Pair {
        east, west, config, ..
    } = pair(Settings::default());
    build_everywhere(&config, "v1");

    let responses = BulkIndexer::new(Arc::clone(&config))
        .delete_by_query(&json!({ "term": { "name": "product-2" } }))
        .unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.deleted == 1));
    assert!(east.get_doc("products_v1", "2").is_none());
    assert!(west.get_doc("products_v1", "2").is_none());
    assert!(west.get_doc("products_v1", "1").is_some());
}

#[test]
fn sequential_fan_out_still_reaches_every_cluster() {
    let Pair {
        east,
        west,
        source,
        config,
    } = pair(Settings {
        parallel_fanout: false,
        ..Settings::default()
    });
    build_everywhere(&config, "v1");

    east.set_bulk_failure(Some(ClusterError::transport("refused")));
    source.set_watermark(300);
    let err = BulkIndexer::new(Arc::clone(&config))
        .index_record(&Product::new(1, "lamp v2", 2100))
        .unwrap_err();
    assert!(matches!(err, SwapError::Cluster { ref cluster, .. } if cluster == "east"));
    assert_eq!(west.get_doc("products_v1", "1").unwrap().version, 300);
    assert_eq!(east.get_doc("products_v1", "1").unwrap().version, 100);
}

#[test]
fn clusters_without_a_write_index_are_skipped() {
    let Pair {
        east, west, config, ..
    } = pair(Settings::default());
    let manager = IndexManager::new(Arc::clone(&config));
    assert_eq!(manager.target().name(), "east");
    common::build_and_switch(&manager, "v1");

    let report = BulkIndexer::new(Arc::clone(&config))
        .index_record(&Product::new(5, "shelf", 800))
        .unwrap();
    assert_eq!(report.clusters, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(west.bulk_calls(), 0);
    assert!(east.get_doc("products_v1", "5").is_some());
}

#[test]
fn empty_batches_make_no_calls() {
    let Pair {
        east, west, config, ..
    } = pair(Settings::default());
    build_everywhere(&config, "v1");
    let before = (east.bulk_calls(), west.bulk_calls());

    let indexer = BulkIndexer::new(Arc::clone(&config));
    assert_eq!(indexer.index_batch(&[], None).unwrap().clusters, 0);
    assert_eq!(indexer.delete_by_ids::<&str>(&[]).unwrap().clusters, 0);
    assert_eq!((east.bulk_calls(), west.bulk_calls()), before);
}
