//! Schema loading and inheritance resolution.
//!
//! Each schema source document declares one [`SchemaRecord`], either
//! through its own property block or through an embedded fenced `json` /
//! `yaml` code block (which takes precedence when present). Individual
//! malformed sources produce warnings and the run continues; only an
//! unreadable schema source directory is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::frontmatter::{self, Scalar, Value};
use crate::record::{
    PropKind, PropertyDef, RelationPairRule, SchemaRecord, SchemaWarning, ValueFormat,
    DISCRIMINATOR,
};

/// Top-level keys of the block form that are schema metadata, not fields.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "folder",
    "appliesTo",
    "extends",
    "purpose",
    "prependDateToTitle",
    "notes",
    "discriminator",
];

#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("cannot read schema directory {path}: {source}")]
    SourceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The resolved schema set for one run, plus everything worth telling a
/// human about how it got that way.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub records: BTreeMap<String, SchemaRecord>,
    pub warnings: Vec<SchemaWarning>,
}

impl SchemaSet {
    pub fn get(&self, id: &str) -> Option<&SchemaRecord> {
        self.records.get(id)
    }

    /// True if schema `id` equals `ancestor` or reaches it via its
    /// `extends` chain. The walk is bounded so a cyclic chain (already
    /// warned about at load time) cannot loop.
    pub fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        let mut current = Some(id);
        for _ in 0..=self.records.len() {
            match current {
                Some(c) if c == ancestor => return true,
                Some(c) => current = self.records.get(c).and_then(|r| r.extends.as_deref()),
                None => return false,
            }
        }
        false
    }
}

/// Load and resolve every schema under `dir`. Fatal only when the
/// directory itself cannot be listed.
pub fn load_schema_dir(dir: &Path) -> Result<SchemaSet, SchemaLoadError> {
    let entries = fs::read_dir(dir).map_err(|source| SchemaLoadError::SourceDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    // Deterministic read order; duplicate ids are last-wins.
    paths.sort();

    let mut sources = Vec::new();
    let mut warnings = Vec::new();
    for path in paths {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match fs::read_to_string(&path) {
            Ok(text) => sources.push((title, text)),
            Err(err) => {
                warnings.push(SchemaWarning::new(
                    Some(&title),
                    format!("cannot read schema source {}: {err}", path.display()),
                ));
            }
        }
    }

    let mut set = load_schema_sources(&sources);
    warnings.append(&mut set.warnings);
    set.warnings = warnings;
    for w in &set.warnings {
        warn!(schema = w.schema.as_deref().unwrap_or("-"), "{}", w.message);
    }
    Ok(set)
}

/// Load and resolve schemas from in-memory `(title, text)` sources.
pub fn load_schema_sources(sources: &[(String, String)]) -> SchemaSet {
    let mut warnings = Vec::new();
    let mut raw: BTreeMap<String, SchemaRecord> = BTreeMap::new();

    for (title, text) in sources {
        let Some(record) = parse_schema_source(title, text, &mut warnings) else {
            continue;
        };
        debug!(schema = %record.id, "loaded schema source");
        if raw.contains_key(&record.id) {
            warnings.push(SchemaWarning::new(
                Some(&record.id),
                format!(
                    "duplicate schema ({}, {}); the later source wins",
                    record.discriminator, record.id
                ),
            ));
        }
        raw.insert(record.id.clone(), record);
    }

    let records = resolve_all(&raw, &mut warnings);
    SchemaSet { records, warnings }
}

/// Parse one schema source document into an unresolved record.
pub fn parse_schema_source(
    title: &str,
    text: &str,
    warnings: &mut Vec<SchemaWarning>,
) -> Option<SchemaRecord> {
    let doc = frontmatter::parse(text);

    // An embedded structured schema takes precedence over the block form.
    if let Some((lang, content)) = extract_code_block(&doc.body) {
        match lang {
            CodeBlockLang::Json => match serde_json::from_str::<SchemaDocV1>(&content) {
                Ok(parsed) => return schema_from_doc(title, parsed, warnings),
                Err(err) => {
                    warnings.push(SchemaWarning::new(
                        Some(title),
                        format!("malformed embedded JSON schema in `{title}`: {err}"),
                    ));
                }
            },
            CodeBlockLang::Yaml => {
                let lines: Vec<&str> = content.lines().collect();
                let map = frontmatter::parse_block_lines(&lines);
                if !map.is_empty() {
                    return interpret_block_map(title, &map, warnings);
                }
                warnings.push(SchemaWarning::new(
                    Some(title),
                    format!("empty embedded YAML schema in `{title}`"),
                ));
            }
        }
    }

    if !doc.has_block || doc.properties.is_empty() {
        warnings.push(SchemaWarning::new(
            Some(title),
            format!("schema source `{title}` declares no properties"),
        ));
        return None;
    }
    interpret_block_map(title, &doc.properties, warnings)
}

enum CodeBlockLang {
    Json,
    Yaml,
}

fn extract_code_block(body: &str) -> Option<(CodeBlockLang, String)> {
    let mut lang: Option<CodeBlockLang> = None;
    let mut content = String::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if lang.is_none() {
            if let Some(tag) = trimmed.strip_prefix("```") {
                lang = match tag.trim() {
                    "json" => Some(CodeBlockLang::Json),
                    "yaml" | "yml" => Some(CodeBlockLang::Yaml),
                    _ => None,
                };
            }
            continue;
        }
        if trimmed == "```" {
            return lang.map(|l| (l, content));
        }
        content.push_str(line);
        content.push('\n');
    }
    None
}

/// The explicit structured schema form (embedded JSON).
#[derive(Debug, Deserialize)]
struct SchemaDocV1 {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default, alias = "appliesTo")]
    folder: Option<String>,
    #[serde(default, alias = "prependDateToTitle")]
    prepend_date_to_title: bool,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyDef>,
    #[serde(default, rename = "match")]
    match_rules: BTreeMap<String, String>,
    #[serde(default)]
    pairs: Vec<RelationPairRule>,
}

fn schema_from_doc(
    title: &str,
    doc: SchemaDocV1,
    warnings: &mut Vec<SchemaWarning>,
) -> Option<SchemaRecord> {
    let Some(id) = doc.id.filter(|i| !i.trim().is_empty()) else {
        warnings.push(SchemaWarning::new(
            Some(title),
            format!("schema source `{title}` is missing an id"),
        ));
        return None;
    };
    let mut record = SchemaRecord::new(id.trim().to_string());
    if let Some(d) = doc.discriminator {
        record.discriminator = d;
    }
    record.extends = doc.extends.map(|e| strip_reference(&e));
    record.purpose = doc.purpose;
    record.folder = doc.folder;
    record.prepend_date_to_title = doc.prepend_date_to_title;
    record.required = doc.required.into_iter().collect::<BTreeSet<_>>();
    record.properties = doc.properties;
    record.match_rules = doc.match_rules;
    record.pair_rules = doc.pairs;
    Some(record)
}

/// Interpret a property map (the block form, or a restricted-YAML code
/// block) as a schema declaration.
fn interpret_block_map(
    title: &str,
    map: &BTreeMap<String, Value>,
    warnings: &mut Vec<SchemaWarning>,
) -> Option<SchemaRecord> {
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(id) = id else {
        warnings.push(SchemaWarning::new(
            Some(title),
            format!("schema source `{title}` is missing an id"),
        ));
        return None;
    };

    let mut record = SchemaRecord::new(id);
    if let Some(d) = map.get("discriminator").and_then(Value::as_str) {
        record.discriminator = d.trim().to_string();
    }
    record.folder = map
        .get("folder")
        .or_else(|| map.get("appliesTo"))
        .and_then(|v| match v {
            Value::Scalar(Scalar::Str(s)) => Some(s.trim().to_string()),
            _ => None,
        });
    record.extends = map
        .get("extends")
        .and_then(Value::as_str)
        .map(strip_reference)
        .filter(|s| !s.is_empty());
    record.purpose = map
        .get("purpose")
        .and_then(Value::as_str)
        .map(str::to_string);
    record.prepend_date_to_title = matches!(
        map.get("prependDateToTitle"),
        Some(Value::Scalar(Scalar::Bool(true)))
    );

    let mut default_overrides: Vec<(String, Value)> = Vec::new();

    for (key, value) in map {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(rest) = key.strip_prefix("default.") {
            default_overrides.push((rest.to_string(), value.clone()));
        } else if let Some(rest) = key.strip_prefix("match.") {
            if let Some(v) = value.as_scalar() {
                record
                    .match_rules
                    .insert(rest.to_string(), v.to_display_string());
            }
        } else if let Some(rest) = key.strip_prefix("pair.") {
            match parse_pair_value(rest, value) {
                Some(rule) => record.pair_rules.push(rule),
                None => warnings.push(SchemaWarning::new(
                    Some(&record.id),
                    format!("malformed pair rule `{key}` in `{title}` (expected TargetType.targetField)"),
                )),
            }
        } else if key.starts_with("linkPair.") {
            match parse_link_pair_value(value) {
                Some((left, right)) => {
                    record.pair_rules.push(RelationPairRule {
                        source_field: left.clone(),
                        target_type: None,
                        target_field: right.clone(),
                    });
                    record.pair_rules.push(RelationPairRule {
                        source_field: right,
                        target_type: None,
                        target_field: left,
                    });
                }
                None => warnings.push(SchemaWarning::new(
                    Some(&record.id),
                    format!("malformed link pair `{key}` in `{title}` (expected left<->right)"),
                )),
            }
        } else {
            // `field.<name>` or a bare `<name>` for backward compatibility.
            let name = key.strip_prefix("field.").unwrap_or(key);
            let (name, required) = match name.strip_suffix('*') {
                Some(n) => (n.trim(), true),
                None => (name.trim(), false),
            };
            if name.is_empty() {
                continue;
            }
            if required {
                record.required.insert(name.to_string());
            }
            record
                .properties
                .insert(name.to_string(), property_def_from_value(value));
        }
    }

    for (name, value) in default_overrides {
        record
            .properties
            .entry(name)
            .or_insert_with(PropertyDef::string)
            .default = Some(value);
    }

    if record.properties.is_empty() && record.required.is_empty() {
        warnings.push(SchemaWarning::new(
            Some(&record.id),
            format!("schema `{}` declares no properties", record.id),
        ));
    }
    Some(record)
}

/// Derive a field's [`PropertyDef`] from its declared value shape.
fn property_def_from_value(value: &Value) -> PropertyDef {
    match value {
        // A comma-containing string declares a string enum.
        Value::Scalar(Scalar::Str(s)) if s.contains(',') => PropertyDef {
            kind: PropKind::String,
            allowed: Some(
                s.split(',')
                    .map(|part| frontmatter::parse_scalar(part.trim()))
                    .collect(),
            ),
            default: None,
            format: None,
        },
        // A wikilink-shaped value marks a reference field.
        Value::Scalar(Scalar::Str(s)) if frontmatter::is_wikilink(s) => PropertyDef {
            kind: PropKind::String,
            allowed: None,
            default: None,
            format: Some(ValueFormat::Wikilink),
        },
        // An array with 2+ elements declares an array enum; 0 or 1
        // elements declare a plain array type.
        Value::List(items) if items.len() >= 2 => PropertyDef {
            kind: PropKind::Array,
            allowed: Some(items.clone()),
            default: None,
            format: None,
        },
        Value::List(_) => PropertyDef::array(),
        // Any other scalar declares a typed field with an implicit default.
        Value::Scalar(scalar) => {
            let (kind, default) = match scalar {
                Scalar::Str(s) if s.is_empty() => (PropKind::String, None),
                Scalar::Str(_) => (PropKind::String, Some(value.clone())),
                Scalar::Num(_) => (PropKind::Number, Some(value.clone())),
                Scalar::Bool(_) => (PropKind::Boolean, Some(value.clone())),
                Scalar::Null => (PropKind::String, None),
            };
            PropertyDef {
                kind,
                allowed: None,
                default,
                format: None,
            }
        }
    }
}

fn parse_pair_value(source_field: &str, value: &Value) -> Option<RelationPairRule> {
    let spec = value.as_str()?.trim();
    let (target_type, target_field) = spec.split_once('.')?;
    if target_type.is_empty() || target_field.is_empty() {
        return None;
    }
    Some(RelationPairRule {
        source_field: source_field.to_string(),
        target_type: Some(target_type.trim().to_string()),
        target_field: target_field.trim().to_string(),
    })
}

fn parse_link_pair_value(value: &Value) -> Option<(String, String)> {
    let spec = value.as_str()?.trim();
    let (left, right) = spec.split_once("<->")?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_string(), right.to_string()))
}

fn strip_reference(s: &str) -> String {
    frontmatter::wikilink_target(s.trim())
        .unwrap_or(s.trim())
        .to_string()
}

// ============================================================================
// Inheritance resolution
// ============================================================================

fn resolve_all(
    raw: &BTreeMap<String, SchemaRecord>,
    warnings: &mut Vec<SchemaWarning>,
) -> BTreeMap<String, SchemaRecord> {
    let mut memo = BTreeMap::new();
    let mut visiting = BTreeSet::new();
    for id in raw.keys() {
        resolve(id, raw, &mut memo, &mut visiting, warnings);
    }
    memo
}

/// Memoized recursive descent over the `extends` graph. Visiting an
/// in-progress record signals a cycle; the record then resolves against
/// itself as declared (degenerate), with a warning.
fn resolve(
    id: &str,
    raw: &BTreeMap<String, SchemaRecord>,
    memo: &mut BTreeMap<String, SchemaRecord>,
    visiting: &mut BTreeSet<String>,
    warnings: &mut Vec<SchemaWarning>,
) -> SchemaRecord {
    if let Some(resolved) = memo.get(id) {
        return resolved.clone();
    }
    if visiting.contains(id) {
        warnings.push(SchemaWarning::new(
            Some(id),
            format!("`extends` cycle detected at schema `{id}`"),
        ));
        return raw[id].clone();
    }
    visiting.insert(id.to_string());

    let record = &raw[id];
    let mut resolved = match record.extends.as_deref() {
        None => record.clone(),
        Some(parent_id) => {
            if raw.contains_key(parent_id) {
                let parent = resolve(parent_id, raw, memo, visiting, warnings);
                merge(parent, record)
            } else {
                warnings.push(SchemaWarning::new(
                    Some(id),
                    format!("schema `{id}` extends missing parent `{parent_id}`"),
                ));
                record.clone()
            }
        }
    };

    visiting.remove(id);

    if resolved.discriminator == DISCRIMINATOR && resolved.folder.is_none() {
        resolved.folder = Some(String::new());
    }
    memo.insert(id.to_string(), resolved.clone());
    resolved
}

/// Merge a resolved parent under a child declaration: child overrides
/// parent on key collision, `required` is the union, pair rules merge
/// keyed by `source_field`.
fn merge(parent: SchemaRecord, child: &SchemaRecord) -> SchemaRecord {
    let mut out = parent;
    out.id = child.id.clone();
    out.discriminator = child.discriminator.clone();
    out.extends = child.extends.clone();
    if child.purpose.is_some() {
        out.purpose = child.purpose.clone();
    }
    if child.folder.is_some() {
        out.folder = child.folder.clone();
    }
    out.prepend_date_to_title = out.prepend_date_to_title || child.prepend_date_to_title;
    out.required.extend(child.required.iter().cloned());
    for (name, def) in &child.properties {
        out.properties.insert(name.clone(), def.clone());
    }
    for (key, value) in &child.match_rules {
        out.match_rules.insert(key.clone(), value.clone());
    }
    for rule in &child.pair_rules {
        match out
            .pair_rules
            .iter_mut()
            .find(|r| r.source_field == rule.source_field)
        {
            Some(existing) => *existing = rule.clone(),
            None => out.pair_rules.push(rule.clone()),
        }
    }
    out
}
