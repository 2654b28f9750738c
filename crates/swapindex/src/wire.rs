//! Bulk request and response wire format
//!
//! A bulk request is a sequence of directives. Each directive serializes to a
//! single JSON object:
//!
//! ```text
//! { "index":  { "_index": .., "_id": .., "version": .., "version_type": "external", ["_type": ..] }, "data": {..} }
//! { "delete": { "_index": .., "_id": .., ["_type": ..] } }
//! ```
//!
//! Network adapters that speak the engine's newline-delimited form use
//! [`BulkRequest::to_ndjson`], which splits an index directive into its
//! header line and source line.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use swapindex_core::{DocId, Document, TypeMode};

/// `version_type` requested on every versioned write
pub const EXTERNAL_VERSION_TYPE: &str = "external";

/// One operation inside a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BulkDirective {
    /// Create or replace a document, applied only if `version` is strictly
    /// greater than the stored version
    Index {
        index: String,
        id: DocId,
        version: u64,
        doc_type: Option<String>,
        data: Map<String, Value>,
    },
    /// Remove a document
    Delete {
        index: String,
        id: DocId,
        doc_type: Option<String>,
    },
}

#[derive(Serialize)]
struct DirectiveHeader<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_type: Option<&'static str>,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
}

impl BulkDirective {
    /// An externally versioned upsert of `document` into `index`.
    #[must_use]
    pub fn index(index: &str, document: &Document, version: u64, type_mode: &TypeMode) -> Self {
        Self::Index {
            index: index.to_owned(),
            id: document.id.clone(),
            version,
            doc_type: type_mode.doc_type().map(str::to_owned),
            data: document.source.clone(),
        }
    }

    #[must_use]
    pub fn delete(index: &str, id: &str, type_mode: &TypeMode) -> Self {
        Self::Delete {
            index: index.to_owned(),
            id: id.to_owned(),
            doc_type: type_mode.doc_type().map(str::to_owned),
        }
    }

    /// The action keyword (`index` or `delete`)
    #[must_use]
    pub const fn action(&self) -> BulkAction {
        match self {
            Self::Index { .. } => BulkAction::Index,
            Self::Delete { .. } => BulkAction::Delete,
        }
    }

    #[must_use]
    pub fn target_index(&self) -> &str {
        match self {
            Self::Index { index, .. } | Self::Delete { index, .. } => index,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    fn header(&self) -> DirectiveHeader<'_> {
        match self {
            Self::Index {
                index,
                id,
                version,
                doc_type,
                ..
            } => DirectiveHeader {
                index,
                id,
                version: Some(*version),
                version_type: Some(EXTERNAL_VERSION_TYPE),
                doc_type: doc_type.as_deref(),
            },
            Self::Delete {
                index,
                id,
                doc_type,
            } => DirectiveHeader {
                index,
                id,
                version: None,
                version_type: None,
                doc_type: doc_type.as_deref(),
            },
        }
    }
}

impl Serialize for BulkDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(self.action().as_str(), &self.header())?;
        if let Self::Index { data, .. } = self {
            map.serialize_entry("data", data)?;
        }
        map.end()
    }
}

/// A batch of directives submitted to one cluster in one network call
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct BulkRequest {
    directives: Vec<BulkDirective>,
}

impl BulkRequest {
    #[must_use]
    pub const fn new(directives: Vec<BulkDirective>) -> Self {
        Self { directives }
    }

    #[must_use]
    pub fn directives(&self) -> &[BulkDirective] {
        &self.directives
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Render the newline-delimited body the engine's bulk endpoint expects.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for directive in &self.directives {
            let mut header = Map::new();
            header.insert(
                directive.action().as_str().to_owned(),
                serde_json::to_value(directive.header())?,
            );
            out.push_str(&serde_json::to_string(&header)?);
            out.push('\n');
            if let BulkDirective::Index { data, .. } = directive {
                out.push_str(&serde_json::to_string(data)?);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

/// Bulk action keyword as it appears in requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-reported failure for a single bulk item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemError {
    #[must_use]
    pub fn new(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
            extra: Map::new(),
        }
    }
}

/// Per-item outcome inside a bulk response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl ItemResult {
    #[must_use]
    pub fn applied(index: &str, id: &str, status: u16, result: &str, version: Option<u64>) -> Self {
        Self {
            index: index.to_owned(),
            id: Some(id.to_owned()),
            version,
            result: Some(result.to_owned()),
            status,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(index: &str, id: &str, status: u16, error: ItemError) -> Self {
        Self {
            index: index.to_owned(),
            id: Some(id.to_owned()),
            version: None,
            result: None,
            status,
            error: Some(error),
        }
    }
}

/// One entry of `items`, keyed by the action that produced it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResponseItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<ItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<ItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<ItemResult>,
}

impl BulkResponseItem {
    #[must_use]
    pub fn new(action: BulkAction, result: ItemResult) -> Self {
        let mut item = Self::default();
        let slot = match action {
            BulkAction::Index => &mut item.index,
            BulkAction::Create => &mut item.create,
            BulkAction::Update => &mut item.update,
            BulkAction::Delete => &mut item.delete,
        };
        *slot = Some(result);
        item
    }

    /// The action and its result, whichever action key is present
    #[must_use]
    pub fn outcome(&self) -> Option<(BulkAction, &ItemResult)> {
        [
            (BulkAction::Index, &self.index),
            (BulkAction::Create, &self.create),
            (BulkAction::Update, &self.update),
            (BulkAction::Delete, &self.delete),
        ]
        .into_iter()
        .find_map(|(action, slot)| slot.as_ref().map(|result| (action, result)))
    }
}

/// Response to one bulk request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkResponseItem>,
}

impl BulkResponse {
    /// Build a response, deriving the `errors` flag from the items.
    #[must_use]
    pub fn from_items(items: Vec<BulkResponseItem>) -> Self {
        let errors = items
            .iter()
            .filter_map(BulkResponseItem::outcome)
            .any(|(_, result)| result.error.is_some());
        Self {
            took: 0,
            errors,
            items,
        }
    }
}
