//! # typevault-schema
//!
//! The "language layer" of typevault:
//!
//! - the restricted property-block grammar ([`frontmatter`]),
//! - schema records and their field definitions ([`record`]),
//! - schema-source loading and `extends` resolution ([`loader`]).
//!
//! Everything here is pure data + parsing; the corpus engine lives in
//! `typevault-engine`.

pub mod frontmatter;
pub mod loader;
pub mod record;

pub use frontmatter::{
    is_wikilink, parse, parse_scalar, parse_value, serialize, to_wikilink, wikilink_target,
    ParsedDocument, Scalar, Value,
};
pub use loader::{load_schema_dir, load_schema_sources, SchemaLoadError, SchemaSet};
pub use record::{
    PropKind, PropertyDef, RelationPairRule, SchemaRecord, SchemaWarning, ValueFormat,
    DISCRIMINATOR,
};
