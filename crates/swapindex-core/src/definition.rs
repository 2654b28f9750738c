//! Index definition (settings + mapping) and document type mode

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Default document type name used by legacy (typed) engines.
pub const DEFAULT_LEGACY_DOC_TYPE: &str = "_doc";

/// Whether documents carry an explicit type discriminator.
///
/// Legacy engines require a `_type` on every directive and key the mapping
/// by type name; modern engines reject both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TypeMode {
    /// No `_type` anywhere (modern engines)
    #[default]
    Typeless,
    /// Every directive carries `_type: doc_type` (legacy engines)
    Legacy { doc_type: String },
}

impl TypeMode {
    /// Legacy mode with the conventional `_doc` type name
    #[must_use]
    pub fn legacy() -> Self {
        Self::Legacy {
            doc_type: DEFAULT_LEGACY_DOC_TYPE.to_owned(),
        }
    }

    /// The `_type` value to put on directives, if any
    #[must_use]
    pub fn doc_type(&self) -> Option<&str> {
        match self {
            Self::Typeless => None,
            Self::Legacy { doc_type } => Some(doc_type),
        }
    }
}

/// Settings and mapping supplied verbatim when a physical index is created.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub settings: Map<String, Value>,
    pub mappings: Map<String, Value>,
}

impl IndexDefinition {
    #[must_use]
    pub const fn new(settings: Map<String, Value>, mappings: Map<String, Value>) -> Self {
        Self { settings, mappings }
    }

    /// A definition with only a mapping and engine-default settings
    #[must_use]
    pub fn from_mappings(mappings: Map<String, Value>) -> Self {
        Self {
            settings: Map::new(),
            mappings,
        }
    }

    /// Render the create-index request body for the given type mode.
    #[must_use]
    pub fn body_for(&self, type_mode: &TypeMode) -> Value {
        let mappings = match type_mode.doc_type() {
            None => Value::Object(self.mappings.clone()),
            Some(doc_type) => {
                let mut typed = Map::new();
                typed.insert(doc_type.to_owned(), Value::Object(self.mappings.clone()));
                Value::Object(typed)
            }
        };
        json!({
            "settings": self.settings,
            "mappings": mappings,
        })
    }
}
