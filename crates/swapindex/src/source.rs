//! Source-of-truth data store contract
//!
//! The primary store's query and pagination mechanism lives with the caller.
//! This trait is the part the lifecycle manager and bulk indexer need.

use std::sync::Arc;

use crate::error::SwapResult;

/// Lazy sequence of record batches
pub type RecordBatches<'a, R> = Box<dyn Iterator<Item = SwapResult<Vec<R>>> + 'a>;

/// The collection an index family is built from.
///
/// Implementations must be safe to share across threads.
pub trait DataSource: Send + Sync {
    type Record;

    /// Collection name; the default read alias
    fn collection_name(&self) -> &str;

    /// Current transaction snapshot high-water mark.
    ///
    /// Must be monotonically non-decreasing across calls within a process.
    /// Used as the external version of every write issued by one call.
    fn current_version_watermark(&self) -> SwapResult<u64>;

    /// Iterate the whole collection in batches of at most `batch_size`.
    ///
    /// Each call starts a fresh pass. The sequence must be finite.
    fn batches(&self, batch_size: usize) -> RecordBatches<'_, Self::Record>;

    /// Rough record count, for progress estimates only
    fn approximate_count(&self) -> SwapResult<u64>;
}

impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    type Record = S::Record;

    fn collection_name(&self) -> &str {
        (**self).collection_name()
    }

    fn current_version_watermark(&self) -> SwapResult<u64> {
        (**self).current_version_watermark()
    }

    fn batches(&self, batch_size: usize) -> RecordBatches<'_, Self::Record> {
        (**self).batches(batch_size)
    }

    fn approximate_count(&self) -> SwapResult<u64> {
        (**self).approximate_count()
    }
}
