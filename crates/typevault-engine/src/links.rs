//! Bidirectional link reconciliation.
//!
//! Schema-declared relation pairs promise: when `source_field` on a
//! document references another document, the target carries a
//! back-reference in `target_field`. This pass keeps that inverse index
//! consistent across the whole corpus, using filename-based identity and
//! best-effort conflict detection. It runs after every document's own
//! autofix/relocation is final, because it needs every document's matched
//! schema and current field values.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use typevault_schema::frontmatter::{to_wikilink, wikilink_target, Scalar, Value};
use typevault_schema::{PropKind, SchemaSet};

use crate::corpus::DocumentRecord;
use crate::matcher::normalize_token;
use crate::report::ViolationV1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetShape {
    Array,
    Scalar,
    Unknown,
}

struct PendingRef {
    src_idx: usize,
    target_idx: usize,
    target_field: String,
    source_title: String,
}

/// True if an existing entry already references the source title.
fn entry_matches(entry: &Scalar, source_norm: &str) -> bool {
    match entry {
        Scalar::Str(s) => {
            let title = wikilink_target(s).unwrap_or(s.trim());
            normalize_token(title) == source_norm
        }
        _ => false,
    }
}

fn reference_tokens(value: &Value) -> Vec<&str> {
    match value {
        Value::Scalar(Scalar::Str(s)) => vec![s.as_str()],
        Value::List(items) => items
            .iter()
            .filter_map(|i| i.as_str())
            .collect(),
        _ => Vec::new(),
    }
}

/// The discriminator value used for target-type checks: the matched
/// schema id when there is one, else the document's own `type` value.
fn effective_type(doc: &DocumentRecord) -> Option<String> {
    if let Some(id) = &doc.schema {
        return Some(normalize_token(id));
    }
    doc.properties
        .get("type")
        .and_then(Value::as_str)
        .map(normalize_token)
        .filter(|s| !s.is_empty())
}

/// Reconcile every pair rule across the corpus.
pub fn reconcile_links(docs: &mut [DocumentRecord], schemas: &SchemaSet) {
    // Normalized title -> documents sharing it.
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, doc) in docs.iter().enumerate() {
        if doc.io_error.is_some() {
            continue;
        }
        index
            .entry(normalize_token(&doc.title))
            .or_default()
            .push(idx);
    }

    let mut pending: Vec<PendingRef> = Vec::new();
    let mut violations: Vec<(usize, ViolationV1)> = Vec::new();
    // (target, field, source title): each applied at most once per run.
    let mut seen: HashSet<(usize, String, String)> = HashSet::new();

    for (idx, doc) in docs.iter().enumerate() {
        if doc.io_error.is_some() {
            continue;
        }
        let Some(schema) = doc.schema.as_deref().and_then(|id| schemas.get(id)) else {
            continue;
        };
        for rule in &schema.pair_rules {
            let Some(value) = doc.properties.get(&rule.source_field) else {
                continue;
            };
            for token in reference_tokens(value) {
                let Some(target_title) = wikilink_target(token) else {
                    continue;
                };
                if target_title.is_empty() {
                    continue;
                }
                let key = normalize_token(target_title);
                let candidates = index.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                match candidates {
                    [] => violations.push((
                        idx,
                        ViolationV1::new(
                            "backlink",
                            Some(&rule.source_field),
                            format!("unresolved backlink {token}"),
                        ),
                    )),
                    [target_idx] => {
                        let target_idx = *target_idx;
                        if let Some(expected) = &rule.target_type {
                            let actual = effective_type(&docs[target_idx]);
                            let expected_norm = normalize_token(expected);
                            let ok = actual.as_deref().map_or(false, |a| {
                                a == expected_norm || schemas.is_descendant(a, &expected_norm)
                            });
                            if !ok {
                                violations.push((
                                    idx,
                                    ViolationV1::new(
                                        "backlink",
                                        Some(&rule.source_field),
                                        format!(
                                            "type mismatch: {token} is `{}`, expected `{expected}`",
                                            actual.as_deref().unwrap_or("untyped"),
                                        ),
                                    ),
                                ));
                                continue;
                            }
                        }
                        let dedup = (
                            target_idx,
                            rule.target_field.clone(),
                            normalize_token(&doc.title),
                        );
                        if seen.insert(dedup) {
                            pending.push(PendingRef {
                                src_idx: idx,
                                target_idx,
                                target_field: rule.target_field.clone(),
                                source_title: doc.title.clone(),
                            });
                        }
                    }
                    many => violations.push((
                        idx,
                        ViolationV1::new(
                            "backlink",
                            Some(&rule.source_field),
                            format!(
                                "ambiguous backlink {token} ({} documents share this title)",
                                many.len()
                            ),
                        ),
                    )),
                }
            }
        }
    }

    debug!(count = pending.len(), "applying back-reference updates");
    for p in pending {
        apply_back_reference(docs, schemas, p, &mut violations);
    }
    for (idx, violation) in violations {
        docs[idx].violations.push(violation);
    }
}

fn target_shape(
    docs: &[DocumentRecord],
    schemas: &SchemaSet,
    target_idx: usize,
    field: &str,
) -> TargetShape {
    let target = &docs[target_idx];
    let declared = target
        .schema
        .as_deref()
        .and_then(|id| schemas.get(id))
        .and_then(|s| s.properties.get(field))
        .map(|d| d.kind);
    match declared {
        Some(PropKind::Array) => TargetShape::Array,
        Some(_) => TargetShape::Scalar,
        None => match target.properties.get(field) {
            Some(Value::List(_)) => TargetShape::Array,
            Some(Value::Scalar(_)) => TargetShape::Scalar,
            None => TargetShape::Unknown,
        },
    }
}

fn apply_back_reference(
    docs: &mut [DocumentRecord],
    schemas: &SchemaSet,
    p: PendingRef,
    violations: &mut Vec<(usize, ViolationV1)>,
) {
    let shape = target_shape(docs, schemas, p.target_idx, &p.target_field);
    let link = to_wikilink(&p.source_title);
    let source_norm = normalize_token(&p.source_title);
    let target_rel = docs[p.target_idx].rel_path.clone();

    match shape {
        TargetShape::Unknown => violations.push((
            p.src_idx,
            ViolationV1::new(
                "backlink",
                Some(&p.target_field),
                format!("cannot infer the shape of `{}` on {target_rel}", p.target_field),
            ),
        )),
        TargetShape::Array => {
            let target = &mut docs[p.target_idx];
            let mut items = match target.properties.get(&p.target_field) {
                Some(Value::List(items)) => items.clone(),
                Some(Value::Scalar(Scalar::Null)) | None => Vec::new(),
                Some(Value::Scalar(scalar)) => vec![scalar.clone()],
            };
            if !items.iter().any(|i| entry_matches(i, &source_norm)) {
                items.push(Scalar::Str(link.clone()));
            }
            let updated = Value::List(items);
            if target.properties.get(&p.target_field) != Some(&updated) {
                target
                    .properties
                    .insert(p.target_field.clone(), updated);
                target.note_fix(format!(
                    "added back-reference {link} to `{}`",
                    p.target_field
                ));
            }
        }
        TargetShape::Scalar => {
            let target = &mut docs[p.target_idx];
            let current = target.properties.get(&p.target_field);
            let empty = current.map(Value::is_blank).unwrap_or(true);
            if empty {
                target
                    .properties
                    .insert(p.target_field.clone(), Value::Scalar(Scalar::Str(link.clone())));
                target.note_fix(format!("set back-reference {link} on `{}`", p.target_field));
                return;
            }
            let same = current
                .and_then(Value::as_scalar)
                .map(|s| entry_matches(s, &source_norm))
                .unwrap_or(false);
            if same {
                // Same target: normalize formatting only.
                if current != Some(&Value::Scalar(Scalar::Str(link.clone()))) {
                    target
                        .properties
                        .insert(p.target_field.clone(), Value::Scalar(Scalar::Str(link.clone())));
                    target.note_fix(format!(
                        "normalized back-reference formatting in `{}`",
                        p.target_field
                    ));
                }
                return;
            }
            let existing = current
                .and_then(Value::as_scalar)
                .map(Scalar::to_display_string)
                .unwrap_or_default();
            violations.push((
                p.src_idx,
                ViolationV1::new(
                    "backlink",
                    Some(&p.target_field),
                    format!(
                        "scalar conflict: `{}` on {target_rel} already references `{existing}`",
                        p.target_field
                    ),
                ),
            ));
        }
    }
}
