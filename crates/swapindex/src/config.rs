//! Index family configuration
//!
//! An [`IndexConfiguration`] is immutable once built. It names the data
//! source, the alias pair, the index definition, the ordered list of backing
//! clusters and the extractors that turn a source record into a document and
//! a write batch into an external version.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use swapindex_core::{
    ConfigError, ConfigResult, DocId, Document, IndexDefinition, IndexNames, Settings, TypeMode,
};

use crate::cluster::{ClusterTarget, SearchCluster};
use crate::error::SwapResult;
use crate::source::DataSource;

/// Maps a source record to its id and serializable body
pub type DocumentExtractor<R> = Arc<dyn Fn(&R) -> SwapResult<Document> + Send + Sync>;

/// Produces the external version for one write call
pub type VersionExtractor = Arc<dyn Fn() -> SwapResult<u64> + Send + Sync>;

pub struct IndexConfiguration<R> {
    source: Arc<dyn DataSource<Record = R>>,
    names: IndexNames,
    definition: IndexDefinition,
    clusters: Vec<ClusterTarget>,
    extractor: DocumentExtractor<R>,
    version: Option<VersionExtractor>,
    settings: Settings,
}

impl<R> IndexConfiguration<R> {
    /// Start a configuration for the index family built from `source`.
    pub fn builder<S>(source: S) -> IndexConfigurationBuilder<R>
    where
        S: DataSource<Record = R> + 'static,
    {
        IndexConfigurationBuilder::new(Arc::new(source))
    }

    #[must_use]
    pub const fn names(&self) -> &IndexNames {
        &self.names
    }

    #[must_use]
    pub fn read_alias(&self) -> &str {
        self.names.read_alias()
    }

    #[must_use]
    pub fn write_alias(&self) -> &str {
        self.names.write_alias()
    }

    #[must_use]
    pub const fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Backing clusters, in configuration order
    #[must_use]
    pub fn clusters(&self) -> &[ClusterTarget] {
        &self.clusters
    }

    /// The first configured cluster; lifecycle steps default to it
    #[must_use]
    pub fn primary_cluster(&self) -> &ClusterTarget {
        // build() rejects an empty cluster list
        &self.clusters[0]
    }

    #[must_use]
    pub fn source(&self) -> &dyn DataSource<Record = R> {
        self.source.as_ref()
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the document extractor on one record.
    pub fn document_for(&self, record: &R) -> SwapResult<Document> {
        (self.extractor)(record)
    }

    /// External version for a write issued now.
    ///
    /// Falls back to the data source's watermark when no version extractor
    /// is configured.
    pub fn current_version(&self) -> SwapResult<u64> {
        match &self.version {
            Some(version) => version(),
            None => self.source.current_version_watermark(),
        }
    }
}

impl<R> fmt::Debug for IndexConfiguration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfiguration")
            .field("source", &self.source.collection_name())
            .field("names", &self.names)
            .field("clusters", &self.clusters)
            .field("custom_version", &self.version.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`IndexConfiguration`]
pub struct IndexConfigurationBuilder<R> {
    source: Arc<dyn DataSource<Record = R>>,
    read_alias: Option<String>,
    write_alias: Option<String>,
    definition: IndexDefinition,
    type_mode: TypeMode,
    clusters: Vec<(Arc<dyn SearchCluster>, Option<TypeMode>)>,
    extractor: Option<DocumentExtractor<R>>,
    version: Option<VersionExtractor>,
    settings: Settings,
}

impl<R> IndexConfigurationBuilder<R> {
    fn new(source: Arc<dyn DataSource<Record = R>>) -> Self {
        Self {
            source,
            read_alias: None,
            write_alias: None,
            definition: IndexDefinition::default(),
            type_mode: TypeMode::default(),
            clusters: Vec::new(),
            extractor: None,
            version: None,
            settings: Settings::default(),
        }
    }

    /// Override the read alias (default: the source's collection name)
    #[must_use]
    pub fn read_alias(mut self, alias: impl Into<String>) -> Self {
        self.read_alias = Some(alias.into());
        self
    }

    /// Override the write alias (default: `{read_alias}_write`)
    #[must_use]
    pub fn write_alias(mut self, alias: impl Into<String>) -> Self {
        self.write_alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn definition(mut self, definition: IndexDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Type mode for clusters added without an explicit one
    #[must_use]
    pub fn type_mode(mut self, type_mode: TypeMode) -> Self {
        self.type_mode = type_mode;
        self
    }

    #[must_use]
    pub fn cluster(mut self, client: Arc<dyn SearchCluster>) -> Self {
        self.clusters.push((client, None));
        self
    }

    #[must_use]
    pub fn cluster_with_type_mode(
        mut self,
        client: Arc<dyn SearchCluster>,
        type_mode: TypeMode,
    ) -> Self {
        self.clusters.push((client, Some(type_mode)));
        self
    }

    #[must_use]
    pub fn documents<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&R) -> SwapResult<Document> + Send + Sync + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Use the record's own serialized form as the document body.
    #[must_use]
    pub fn serialized_documents<F>(self, id: F) -> Self
    where
        R: Serialize + 'static,
        F: Fn(&R) -> DocId + Send + Sync + 'static,
    {
        self.documents(move |record: &R| Ok(Document::from_serialize(id(record), record)?))
    }

    /// Override where external versions come from.
    #[must_use]
    pub fn versions<F>(mut self, version: F) -> Self
    where
        F: Fn() -> SwapResult<u64> + Send + Sync + 'static,
    {
        self.version = Some(Arc::new(version));
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ConfigResult<IndexConfiguration<R>> {
        let names = IndexNames::new(
            self.source.collection_name(),
            self.read_alias.as_deref(),
            self.write_alias.as_deref(),
        )?;
        if self.clusters.is_empty() {
            return Err(ConfigError::MissingField("clusters"));
        }
        let extractor = self
            .extractor
            .ok_or(ConfigError::MissingField("document extractor"))?;

        let default_mode = self.type_mode;
        let clusters = self
            .clusters
            .into_iter()
            .map(|(client, mode)| {
                ClusterTarget::new(client, mode.unwrap_or_else(|| default_mode.clone()))
            })
            .collect();

        Ok(IndexConfiguration {
            source: self.source,
            names,
            definition: self.definition,
            clusters,
            extractor,
            version: self.version,
            settings: self.settings,
        })
    }
}
