//! Schema records: the normalized, inheritance-resolved definition of one
//! document type.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::frontmatter::{Scalar, Value};

/// The property name whose value selects a schema. Only `type` today;
/// the field exists so records from a future second discriminator space
/// do not collide.
pub const DISCRIMINATOR: &str = "type";

/// Expected container/scalar shape of one field.
///
/// `Number` and `Boolean` arise only from implicit-default inference in
/// the block form; they validate as scalars of the matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropKind {
    String,
    Number,
    Boolean,
    Array,
}

impl PropKind {
    pub fn is_array(self) -> bool {
        matches!(self, PropKind::Array)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Wikilink,
}

/// Expected shape of one field's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub kind: PropKind,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Scalar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
}

impl PropertyDef {
    pub fn string() -> Self {
        PropertyDef {
            kind: PropKind::String,
            allowed: None,
            default: None,
            format: None,
        }
    }

    pub fn array() -> Self {
        PropertyDef {
            kind: PropKind::Array,
            allowed: None,
            default: None,
            format: None,
        }
    }
}

/// Declares that `source_field` on a document of this schema, when pointing
/// at another document, implies a back-reference in the target's
/// `target_field`. An optional `target_type` constrains the target to that
/// schema id or a descendant of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPairRule {
    pub source_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    pub target_field: String,
}

/// One declared document type.
///
/// After inheritance resolution a record is fully self-contained:
/// `required`, `properties`, `match_rules` and `pair_rules` are the merged
/// union of the `extends` chain, child overriding parent on key collision.
/// `extends` is retained so descent checks can still walk the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub id: String,
    pub discriminator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// Canonical top-level storage folder. `Some("")` means the vault
    /// root; `None` means no folder policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default)]
    pub prepend_date_to_title: bool,
    #[serde(default)]
    pub required: BTreeSet<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
    /// Extra key/value equalities a document must satisfy to match.
    #[serde(default, rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_rules: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pair_rules: Vec<RelationPairRule>,
}

impl SchemaRecord {
    pub fn new(id: impl Into<String>) -> Self {
        SchemaRecord {
            id: id.into(),
            discriminator: DISCRIMINATOR.to_string(),
            extends: None,
            purpose: None,
            folder: None,
            prepend_date_to_title: false,
            required: BTreeSet::new(),
            properties: BTreeMap::new(),
            match_rules: BTreeMap::new(),
            pair_rules: Vec::new(),
        }
    }
}

/// A non-fatal problem found while loading or resolving schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaWarning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub message: String,
}

impl SchemaWarning {
    pub fn new(schema: Option<&str>, message: impl Into<String>) -> Self {
        SchemaWarning {
            schema: schema.map(str::to_string),
            message: message.into(),
        }
    }
}
