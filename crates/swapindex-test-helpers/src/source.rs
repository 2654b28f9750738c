//! In-memory data source with a settable version watermark

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::json;

use swapindex::{DataSource, Document, RecordBatches, SwapError, SwapResult};

/// A collection held in a `Vec`.
///
/// The watermark only changes when a test sets it, so every write call
/// between two `set_watermark` calls carries the same external version.
#[derive(Debug)]
pub struct VecSource<R> {
    name: String,
    records: RwLock<Vec<R>>,
    watermark: AtomicU64,
    fail_at_batch: Mutex<Option<usize>>,
}

impl<R: Clone + Send + Sync> VecSource<R> {
    #[must_use]
    pub fn new(name: impl Into<String>, records: Vec<R>, watermark: u64) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(records),
            watermark: AtomicU64::new(watermark),
            fail_at_batch: Mutex::new(None),
        }
    }

    pub fn set_watermark(&self, watermark: u64) {
        self.watermark.store(watermark, Ordering::SeqCst);
    }

    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::SeqCst)
    }

    pub fn set_records(&self, records: Vec<R>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
    }

    pub fn push(&self, record: R) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Make the given zero-based batch fail on every pass; `None` clears it.
    pub fn fail_at_batch(&self, batch: Option<usize>) {
        *self
            .fail_at_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = batch;
    }
}

impl<R: Clone + Send + Sync> DataSource for VecSource<R> {
    type Record = R;

    fn collection_name(&self) -> &str {
        &self.name
    }

    fn current_version_watermark(&self) -> SwapResult<u64> {
        Ok(self.watermark())
    }

    fn batches(&self, batch_size: usize) -> RecordBatches<'_, R> {
        let snapshot = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let fail_at = *self
            .fail_at_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let batches: Vec<Vec<R>> = snapshot
            .chunks(batch_size.max(1))
            .map(<[R]>::to_vec)
            .collect();
        Box::new(batches.into_iter().enumerate().map(move |(i, batch)| {
            if fail_at == Some(i) {
                Err(SwapError::data_source(format!("cursor lost at batch {i}")))
            } else {
                Ok(batch)
            }
        }))
    }

    fn approximate_count(&self) -> SwapResult<u64> {
        let len = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        Ok(len as u64)
    }
}

/// A catalogue record for scenario tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price_cents: u64,
}

impl Product {
    #[must_use]
    pub fn new(id: u64, name: &str, price_cents: u64) -> Self {
        Self {
            id,
            name: name.to_owned(),
            price_cents,
        }
    }
}

/// Document extractor for [`Product`]
pub fn product_document(product: &Product) -> SwapResult<Document> {
    Ok(Document::from_serialize(
        product.id.to_string(),
        &json!({ "name": product.name, "price_cents": product.price_cents }),
    )?)
}

/// Products `1..=n` named `product-{i}`
#[must_use]
pub fn products(n: u64) -> Vec<Product> {
    (1..=n)
        .map(|i| Product::new(i, &format!("product-{i}"), i * 100))
        .collect()
}
