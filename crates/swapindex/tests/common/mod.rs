//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use swapindex::{
    IndexConfiguration, IndexDefinition, IndexManager, SearchCluster, Settings, TypeMode,
};
use swapindex_test_helpers::{MemoryCluster, Product, VecSource, init_test_tracing, product_document};

pub fn definition() -> IndexDefinition {
    IndexDefinition::new(
        json!({ "number_of_shards": 1 }).as_object().cloned().unwrap(),
        json!({
            "properties": {
                "name": { "type": "text" },
                "price_cents": { "type": "long" }
            }
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
}

pub fn source(products: Vec<Product>, watermark: u64) -> Arc<VecSource<Product>> {
    Arc::new(VecSource::new("products", products, watermark))
}

pub fn config_with(
    source: &Arc<VecSource<Product>>,
    clusters: &[(Arc<MemoryCluster>, TypeMode)],
    settings: Settings,
) -> Arc<IndexConfiguration<Product>> {
    init_test_tracing();
    let mut builder = IndexConfiguration::builder(Arc::clone(source))
        .definition(definition())
        .documents(product_document)
        .settings(settings);
    for (cluster, mode) in clusters {
        let client: Arc<dyn SearchCluster> = cluster.clone();
        builder = builder.cluster_with_type_mode(client, mode.clone());
    }
    Arc::new(builder.build().unwrap())
}

pub fn config(
    source: &Arc<VecSource<Product>>,
    cluster: &Arc<MemoryCluster>,
) -> Arc<IndexConfiguration<Product>> {
    config_with(
        source,
        &[(Arc::clone(cluster), TypeMode::Typeless)],
        Settings::default(),
    )
}

/// Create, populate and switch reads to `tag`, then stop dual writes.
pub fn build_and_switch(manager: &IndexManager<Product>, tag: &str) -> String {
    let index = manager.create_index(tag).unwrap();
    manager.populate_index(Some(tag), 2).unwrap();
    manager.switch_read_index(tag).unwrap();
    manager.stop_dual_writes().unwrap();
    index
}
