//! Type inference and schema matching.
//!
//! An explicit `type` value always outranks folder inference; folder alone
//! can still select a schema when the type is absent or unset.

use typevault_schema::frontmatter::Value;
use typevault_schema::{SchemaRecord, SchemaSet};

use crate::corpus::DocumentRecord;

/// Case/whitespace normalization used for type values, titles and match
/// constraints.
pub fn normalize_token(s: &str) -> String {
    s.trim().to_lowercase()
}

/// How a candidate schema matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    ValueAndFolder,
    ValueOnly,
    FolderOnly,
}

/// Outcome of matching one document against the schema set.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Ids in the winning tier, id-ordered. Empty means schema-less.
    pub matched: Vec<String>,
    /// The id driving autofix (first of `matched`).
    pub schema: Option<String>,
    /// The selected schema's canonical folder disagrees with the
    /// document's current folder.
    pub folder_mismatch: bool,
    /// More than one schema matched at the winning tier.
    pub tie: bool,
}

fn match_constraints_hold(doc: &DocumentRecord, record: &SchemaRecord) -> bool {
    record.match_rules.iter().all(|(key, expected)| {
        let Some(value) = doc.properties.get(key) else {
            return false;
        };
        match value {
            Value::Scalar(s) => normalize_token(&s.to_display_string()) == normalize_token(expected),
            Value::List(_) => false,
        }
    })
}

/// Select the best-matching schema for a document.
pub fn match_schema(doc: &DocumentRecord, schemas: &SchemaSet) -> MatchOutcome {
    let type_value = doc
        .properties
        .get("type")
        .and_then(Value::as_str)
        .map(normalize_token)
        .filter(|s| !s.is_empty());
    let folder = doc.folder();

    let mut best: Option<(MatchTier, Vec<&SchemaRecord>)> = None;
    for record in schemas.records.values() {
        let value_match = type_value.as_deref() == Some(normalize_token(&record.id).as_str());
        let folder_match = record.folder.as_deref() == Some(folder);
        let tier = match (value_match, folder_match) {
            (true, true) => MatchTier::ValueAndFolder,
            (true, false) => MatchTier::ValueOnly,
            (false, true) => MatchTier::FolderOnly,
            (false, false) => continue,
        };
        if !match_constraints_hold(doc, record) {
            continue;
        }
        match &mut best {
            Some((best_tier, candidates)) => {
                if tier < *best_tier {
                    best = Some((tier, vec![record]));
                } else if tier == *best_tier {
                    candidates.push(record);
                }
            }
            None => best = Some((tier, vec![record])),
        }
    }

    let Some((_, candidates)) = best else {
        return MatchOutcome::default();
    };

    // Records iterate id-ordered, so ties resolve deterministically.
    let matched: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
    let selected = candidates[0];
    let folder_mismatch = selected
        .folder
        .as_deref()
        .map(|f| f != folder)
        .unwrap_or(false);

    MatchOutcome {
        tie: matched.len() > 1,
        schema: Some(selected.id.clone()),
        matched,
        folder_mismatch,
    }
}
