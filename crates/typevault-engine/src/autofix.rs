//! The autofix and validation engine.
//!
//! Repairs are deterministic and idempotent: running the fix pass twice on
//! an already-fixed document produces no further changes. Validation never
//! mutates and always runs on the post-repair state.

use typevault_schema::frontmatter::{is_wikilink, to_wikilink, wikilink_target, Scalar, Value};
use typevault_schema::{PropKind, PropertyDef, SchemaRecord, ValueFormat};

use crate::corpus::DocumentRecord;
use crate::matcher::normalize_token;
use crate::report::ViolationV1;

/// Field holding deferred-to-human ambiguity notes.
pub const NEEDS_REVIEW_FIELD: &str = "needs-review";

/// Fallback type for documents nothing else can classify.
pub const GENERIC_TYPE: &str = "note";

/// Legacy type tokens and their modern equivalents.
const LEGACY_TYPE_MAP: &[(&str, &str)] = &[
    ("zettel", "note"),
    ("daily-note", "daily"),
    ("mtg", "meeting"),
    ("minutes", "meeting"),
    ("company", "organization"),
    ("org", "organization"),
];

/// Base types whose `subtype` is flattened into `type`.
const FLATTEN_BASE_TYPES: &[&str] = &["entity", "source"];

/// Legacy subtype tokens remapped during flattening.
const SUBTYPE_REMAP: &[(&str, &str)] = &[
    ("company", "organization"),
    ("org", "organization"),
    ("paper", "article"),
    ("webpage", "article"),
];

/// Folder names that imply a type when none is declared.
const FOLDER_TYPE_MAP: &[(&str, &str)] = &[
    ("Projects", "project"),
    ("Meetings", "meeting"),
    ("People", "person"),
    ("Organizations", "organization"),
    ("Sources", "source"),
    ("Daily", "daily"),
];

/// Fields conventionally holding multiple values.
const ARRAY_FIELDS: &[&str] = &["tags", "aliases", "children", "attendees"];

fn table_lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Schema-independent normalizations applied before schema matching.
pub fn prepass(doc: &mut DocumentRecord) {
    coerce_type_scalar(doc);
    normalize_type_token(doc);
    migrate_kind_field(doc);
    flatten_subtype(doc);
    infer_missing_type(doc);
    coerce_multi_value_fields(doc);
    normalize_parent_reference(doc);
}

fn coerce_type_scalar(doc: &mut DocumentRecord) {
    match doc.properties.get("type") {
        Some(Value::Scalar(Scalar::Str(_))) | None => {}
        Some(Value::Scalar(Scalar::Null)) | Some(Value::List(_)) => {
            doc.properties.remove("type");
            doc.note_fix("cleared non-string `type` value");
        }
        Some(Value::Scalar(scalar)) => {
            let coerced = scalar.to_display_string();
            doc.properties
                .insert("type".to_string(), Value::Scalar(Scalar::Str(coerced)));
            doc.note_fix("coerced `type` value to string");
        }
    }
}

fn normalize_type_token(doc: &mut DocumentRecord) {
    let raw = match doc.properties.get("type") {
        Some(Value::Scalar(Scalar::Str(s))) => s.clone(),
        _ => return,
    };
    let mut token = raw.trim().to_string();
    if let Some(inner) = wikilink_target(&token) {
        token = inner.to_string();
    }
    token = token
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase();
    if let Some(modern) = table_lookup(LEGACY_TYPE_MAP, &token) {
        token = modern.to_string();
    }
    if token != *raw {
        doc.note_fix(format!("normalized type `{raw}` to `{token}`"));
        doc.properties
            .insert("type".to_string(), Value::Scalar(Scalar::Str(token)));
    }
}

fn migrate_kind_field(doc: &mut DocumentRecord) {
    let Some(kind) = doc.properties.remove("kind") else {
        return;
    };
    if doc.properties.contains_key("subtype") {
        doc.note_fix("dropped deprecated `kind` (subtype already present)");
    } else {
        doc.properties.insert("subtype".to_string(), kind);
        doc.note_fix("migrated deprecated `kind` into `subtype`");
    }
}

fn flatten_subtype(doc: &mut DocumentRecord) {
    let base = doc
        .properties
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let Some(base) = base else { return };
    if !FLATTEN_BASE_TYPES.contains(&base.as_str()) {
        return;
    }
    let subtype = doc
        .properties
        .get("subtype")
        .and_then(Value::as_str)
        .map(normalize_token)
        .filter(|s| !s.is_empty());
    let Some(subtype) = subtype else { return };
    let flattened = table_lookup(SUBTYPE_REMAP, &subtype).unwrap_or(&subtype);
    doc.properties.insert(
        "type".to_string(),
        Value::Scalar(Scalar::Str(flattened.to_string())),
    );
    doc.properties.remove("subtype");
    doc.note_fix(format!("flattened {base}/{subtype} into type `{flattened}`"));
}

fn infer_missing_type(doc: &mut DocumentRecord) {
    let blank = doc
        .properties
        .get("type")
        .map(|v| v.is_blank())
        .unwrap_or(true);
    if !blank {
        return;
    }
    match table_lookup(FOLDER_TYPE_MAP, doc.folder()) {
        Some(inferred) => {
            doc.properties.insert(
                "type".to_string(),
                Value::Scalar(Scalar::Str(inferred.to_string())),
            );
            doc.note_fix(format!(
                "inferred type `{inferred}` from folder `{}`",
                doc.folder()
            ));
        }
        None => {
            doc.properties.insert(
                "type".to_string(),
                Value::Scalar(Scalar::Str(GENERIC_TYPE.to_string())),
            );
            doc.note_fix(format!("defaulted missing type to `{GENERIC_TYPE}`"));
        }
    }
}

fn coerce_multi_value_fields(doc: &mut DocumentRecord) {
    for field in ARRAY_FIELDS {
        let Some(Value::Scalar(scalar)) = doc.properties.get(*field) else {
            continue;
        };
        if matches!(scalar, Scalar::Null) {
            continue;
        }
        let item = scalar.clone();
        doc.properties
            .insert(field.to_string(), Value::List(vec![item]));
        doc.note_fix(format!("coerced `{field}` to an array"));
    }
}

fn normalize_parent_reference(doc: &mut DocumentRecord) {
    let Some(Value::Scalar(Scalar::Str(s))) = doc.properties.get("parent") else {
        return;
    };
    let trimmed = s.trim();
    if trimmed.is_empty() || is_wikilink(trimmed) {
        return;
    }
    let link = to_wikilink(trimmed);
    doc.properties
        .insert("parent".to_string(), Value::Scalar(Scalar::Str(link)));
    doc.note_fix("normalized `parent` to a wikilink reference");
}

// ============================================================================
// Schema-driven autofix
// ============================================================================

/// Apply deterministic repairs against the matched schema.
pub fn apply_schema_fixes(doc: &mut DocumentRecord, schema: &SchemaRecord) {
    fill_required_fields(doc, schema);
    for (name, def) in &schema.properties {
        coerce_declared_property(doc, name, def);
    }
}

fn fill_required_fields(doc: &mut DocumentRecord, schema: &SchemaRecord) {
    for field in &schema.required {
        let def = schema.properties.get(field);
        match doc.properties.get(field) {
            None => {
                if let Some(default) = def.and_then(|d| d.default.clone()) {
                    doc.properties.insert(field.clone(), default);
                    doc.note_fix(format!("filled required `{field}` with schema default"));
                } else if def.map(|d| d.kind.is_array()).unwrap_or(false) {
                    doc.properties.insert(field.clone(), Value::List(Vec::new()));
                    doc.note_fix(format!("filled required `{field}` with an empty array"));
                } else {
                    // Explicitly-empty is distinct from missing; a later
                    // run must not refill an intentional blank.
                    doc.properties
                        .insert(field.clone(), Value::Scalar(Scalar::Null));
                    doc.note_fix(format!("filled required `{field}` (blank)"));
                }
            }
            Some(Value::Scalar(Scalar::Str(s))) if s.trim().is_empty() => {
                doc.properties
                    .insert(field.clone(), Value::Scalar(Scalar::Null));
                doc.note_fix(format!("normalized blank required `{field}` to null"));
            }
            _ => {}
        }
    }
}

fn canonical_enum_entry(allowed: &[Scalar], value: &Scalar) -> Option<Scalar> {
    match value {
        Scalar::Str(s) => allowed
            .iter()
            .find(|a| {
                a.as_str()
                    .map(|c| normalize_token(c) == normalize_token(s))
                    .unwrap_or(false)
            })
            .cloned(),
        other => allowed.iter().find(|a| *a == other).cloned(),
    }
}

fn coerce_declared_property(doc: &mut DocumentRecord, name: &str, def: &PropertyDef) {
    let Some(original) = doc.properties.get(name).cloned() else {
        return;
    };
    let mut value = original.clone();
    let mut notes: Vec<String> = Vec::new();

    // Container shape.
    match (&value, def.kind) {
        (Value::List(items), kind) if !kind.is_array() && items.len() == 1 => {
            notes.push(format!("unwrapped single-element array `{name}`"));
            value = Value::Scalar(items[0].clone());
        }
        (Value::Scalar(scalar), PropKind::Array) if !matches!(scalar, Scalar::Null) => {
            notes.push(format!("coerced `{name}` to an array"));
            value = Value::List(vec![scalar.clone()]);
        }
        _ => {}
    }

    // Trim string values.
    let trim = |scalar: &mut Scalar, notes: &mut Vec<String>| {
        if let Scalar::Str(s) = scalar {
            let trimmed = s.trim();
            if trimmed != s {
                notes.push(format!("trimmed whitespace in `{name}`"));
                *scalar = Scalar::Str(trimmed.to_string());
            }
        }
    };
    match &mut value {
        Value::Scalar(s) => trim(s, &mut notes),
        Value::List(items) => {
            for item in items.iter_mut() {
                trim(item, &mut notes);
            }
        }
    }

    // Enum normalization to the declared canonical casing.
    if let Some(allowed) = &def.allowed {
        let normalize = |scalar: &mut Scalar, notes: &mut Vec<String>| {
            if let Some(canonical) = canonical_enum_entry(allowed, scalar) {
                if canonical != *scalar {
                    notes.push(format!("normalized `{name}` to canonical enum casing"));
                    *scalar = canonical;
                }
            }
        };
        match &mut value {
            Value::Scalar(s) => normalize(s, &mut notes),
            Value::List(items) => {
                for item in items.iter_mut() {
                    normalize(item, &mut notes);
                }
            }
        }
    }

    // Wikilink wrapping for reference fields.
    if def.format == Some(ValueFormat::Wikilink) {
        let wrap = |scalar: &mut Scalar, notes: &mut Vec<String>| {
            if let Scalar::Str(s) = scalar {
                if !s.is_empty() && !is_wikilink(s) {
                    notes.push(format!("wrapped `{name}` value in wikilink syntax"));
                    *scalar = Scalar::Str(to_wikilink(s));
                }
            }
        };
        match &mut value {
            Value::Scalar(s) => wrap(s, &mut notes),
            Value::List(items) => {
                for item in items.iter_mut() {
                    wrap(item, &mut notes);
                }
            }
        }
    }

    if value != original {
        doc.properties.insert(name.to_string(), value);
        for note in notes {
            doc.note_fix(note);
        }
    }
}

// ============================================================================
// Validation (read-only)
// ============================================================================

fn kind_label(kind: PropKind) -> &'static str {
    match kind {
        PropKind::String => "string",
        PropKind::Number => "number",
        PropKind::Boolean => "boolean",
        PropKind::Array => "array",
    }
}

fn enum_label(allowed: &[Scalar]) -> String {
    let entries: Vec<String> = allowed.iter().map(Scalar::to_display_string).collect();
    format!("[{}]", entries.join(", "))
}

fn in_enum(allowed: &[Scalar], value: &Scalar) -> bool {
    canonical_enum_entry(allowed, value).is_some()
}

/// Validate the (post-repair) property block. Never mutates.
pub fn validate(doc: &DocumentRecord, schema: Option<&SchemaRecord>) -> Vec<ViolationV1> {
    let Some(schema) = schema else {
        return vec![ViolationV1::new("schema", None, "no schema matched")];
    };
    let mut out = Vec::new();

    for field in &schema.required {
        match doc.properties.get(field) {
            None => out.push(ViolationV1::new(
                "required",
                Some(field),
                "required field is missing",
            )),
            Some(v) if v.is_blank() => out.push(ViolationV1::new(
                "required",
                Some(field),
                "required field is blank",
            )),
            _ => {}
        }
    }

    for (name, def) in &schema.properties {
        let Some(value) = doc.properties.get(name) else {
            continue;
        };
        match (value, def.kind) {
            (Value::List(_), PropKind::Array) => {}
            (Value::List(_), kind) => out.push(ViolationV1::new(
                "type",
                Some(name),
                format!("expected a {} value, found an array", kind_label(kind)),
            )),
            (Value::Scalar(scalar), PropKind::Array) => {
                if !matches!(scalar, Scalar::Null) {
                    out.push(ViolationV1::new(
                        "type",
                        Some(name),
                        "expected an array, found a scalar",
                    ));
                }
            }
            (Value::Scalar(scalar), kind) => {
                let ok = matches!(
                    (scalar, kind),
                    (Scalar::Null, _)
                        | (Scalar::Str(_), PropKind::String)
                        | (Scalar::Num(_), PropKind::Number)
                        | (Scalar::Bool(_), PropKind::Boolean)
                );
                if !ok {
                    out.push(ViolationV1::new(
                        "type",
                        Some(name),
                        format!("expected a {} value", kind_label(kind)),
                    ));
                }
            }
        }

        if let Some(allowed) = &def.allowed {
            let check = |scalar: &Scalar, out: &mut Vec<ViolationV1>| {
                let blank = matches!(scalar, Scalar::Null)
                    || scalar.as_str().map(|s| s.trim().is_empty()).unwrap_or(false);
                if !blank && !in_enum(allowed, scalar) {
                    out.push(ViolationV1::new(
                        "enum",
                        Some(name),
                        format!(
                            "value `{}` is not one of {}",
                            scalar.to_display_string(),
                            enum_label(allowed)
                        ),
                    ));
                }
            };
            match value {
                Value::Scalar(s) => check(s, &mut out),
                Value::List(items) => {
                    for item in items {
                        check(item, &mut out);
                    }
                }
            }
        }

        if def.format == Some(ValueFormat::Wikilink) {
            let check = |scalar: &Scalar, out: &mut Vec<ViolationV1>| {
                if let Scalar::Str(s) = scalar {
                    if !s.trim().is_empty() && !is_wikilink(s) {
                        out.push(ViolationV1::new(
                            "format",
                            Some(name),
                            format!("value `{s}` is not a wikilink reference"),
                        ));
                    }
                }
            };
            match value {
                Value::Scalar(s) => check(s, &mut out),
                Value::List(items) => {
                    for item in items {
                        check(item, &mut out);
                    }
                }
            }
        }
    }
    out
}

/// Mirror the document's ambiguity notes into its needs-review field:
/// replaced when any exist, cleared when none do.
pub fn update_needs_review(doc: &mut DocumentRecord) {
    if doc.ambiguities.is_empty() {
        if doc.properties.remove(NEEDS_REVIEW_FIELD).is_some() {
            doc.changed = true;
        }
        return;
    }
    let value = Value::List(
        doc.ambiguities
            .iter()
            .map(|a| Scalar::Str(a.clone()))
            .collect(),
    );
    if doc.properties.get(NEEDS_REVIEW_FIELD) != Some(&value) {
        doc.properties.insert(NEEDS_REVIEW_FIELD.to_string(), value);
        doc.changed = true;
    }
}
