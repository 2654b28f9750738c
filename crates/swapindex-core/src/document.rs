//! Document model for the search index
//!
//! A document is what the document extractor produces for one source record:
//! a stable id plus a serializable body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable identifier of a document in the search index
pub type DocId = String;

/// A document ready to be written to a physical index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub source: Map<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<DocId>, source: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }

    /// Build a document from any serializable body.
    ///
    /// Bodies that do not serialize to a JSON object are stored under a
    /// single `value` key.
    pub fn from_serialize<T: Serialize>(
        id: impl Into<DocId>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        let source = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };
        Ok(Self::new(id, source))
    }
}
