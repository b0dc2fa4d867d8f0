//! Canonical-location policy and conflict-checked moves.
//!
//! Precedence: terminal status wins over everything, then the
//! unknown-type-to-root rule, then the schema's declared folder.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use typevault_schema::frontmatter::Value;
use typevault_schema::SchemaRecord;

use crate::corpus::{DocumentRecord, VaultOptions};
use crate::matcher::normalize_token;

/// Status values that retire a document to the archive folder.
pub const TERMINAL_STATUSES: &[&str] = &["done", "superseded", "cancelled"];

fn status_is_terminal(doc: &DocumentRecord) -> bool {
    doc.properties
        .get("status")
        .and_then(Value::as_str)
        .map(|s| TERMINAL_STATUSES.contains(&normalize_token(s).as_str()))
        .unwrap_or(false)
}

/// Leading `YYYY-MM-DD` token of the document's `date` property, if any.
fn date_token(doc: &DocumentRecord) -> Option<String> {
    let date = doc.properties.get("date").and_then(Value::as_str)?;
    let re = Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date pattern");
    re.find(date.trim()).map(|m| m.as_str().to_string())
}

/// Compute the document's desired relative path, or `None` when it is
/// already where it belongs.
pub fn desired_rel_path(
    doc: &DocumentRecord,
    schema: Option<&SchemaRecord>,
    options: &VaultOptions,
) -> Option<String> {
    let current_folder = doc.folder();

    let folder = if status_is_terminal(doc) {
        options.archive_dir.clone()
    } else if !doc.had_type && !current_folder.is_empty() {
        // Unknown-type documents go to a neutral location instead of
        // staying stranded in an arbitrary folder.
        String::new()
    } else if let Some(target) = schema.and_then(|s| s.folder.as_deref()) {
        if target != current_folder && current_folder != options.templates_dir {
            target.to_string()
        } else {
            current_folder.to_string()
        }
    } else {
        current_folder.to_string()
    };

    let mut file_name = doc.file_name().to_string();
    if schema.map(|s| s.prepend_date_to_title).unwrap_or(false) {
        if let Some(token) = date_token(doc) {
            if !file_name.starts_with(&token) {
                file_name = format!("{token} {file_name}");
            }
        }
    }

    let desired = if folder.is_empty() {
        file_name
    } else {
        format!("{folder}/{file_name}")
    };
    (desired != doc.rel_path).then_some(desired)
}

/// Execute (or, in read-only mode, describe) a move to `desired`.
///
/// The destination is existence-checked first; an occupied destination
/// records a move-conflict ambiguity and leaves the document in place.
pub fn apply_move(
    doc: &mut DocumentRecord,
    root: &Path,
    desired: String,
    write: bool,
) -> Result<()> {
    let destination = root.join(&desired);
    if destination.exists() {
        doc.ambiguities.push(format!("Move conflict: {desired}"));
        return Ok(());
    }

    let renaming_only = doc.folder() == folder_of(&desired);
    let verb = if renaming_only { "rename" } else { "move" };

    if !write {
        doc.fixes.push(format!("would {verb} to {desired}"));
        doc.moved_to = Some(desired);
        return Ok(());
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create folder {}", parent.display()))?;
    }
    fs::rename(&doc.path, &destination)
        .with_context(|| format!("cannot move document to {}", destination.display()))?;
    debug!(from = %doc.rel_path, to = %desired, "moved document");
    doc.fixes.push(format!("{verb}d to {desired}"));
    doc.path = destination;
    doc.rel_path = desired.clone();
    doc.title = Path::new(&doc.rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    doc.moved_to = Some(desired);
    Ok(())
}

fn folder_of(rel_path: &str) -> &str {
    match rel_path.split_once('/') {
        Some((folder, _)) => folder,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typevault_schema::SchemaRecord;

    fn schema_with_folder(id: &str, folder: &str) -> SchemaRecord {
        let mut s = SchemaRecord::new(id);
        s.folder = Some(folder.to_string());
        s
    }

    #[test]
    fn terminal_status_overrides_schema_folder() {
        let mut doc =
            DocumentRecord::from_text("Projects/X.md", "---\ntype: project\nstatus: done\n---\n");
        doc.had_type = true;
        let schema = schema_with_folder("project", "Projects");
        let desired = desired_rel_path(&doc, Some(&schema), &VaultOptions::default());
        assert_eq!(desired.as_deref(), Some("Archive/X.md"));
    }

    #[test]
    fn untyped_documents_outside_root_go_to_root() {
        let doc = DocumentRecord::from_text("Random/Y.md", "body\n");
        let desired = desired_rel_path(&doc, None, &VaultOptions::default());
        assert_eq!(desired.as_deref(), Some("Y.md"));
    }

    #[test]
    fn schema_folder_applies_outside_templates() {
        let mut doc = DocumentRecord::from_text("Inbox/Z.md", "---\ntype: meeting\n---\n");
        doc.had_type = true;
        let schema = schema_with_folder("meeting", "Meetings");
        let desired = desired_rel_path(&doc, Some(&schema), &VaultOptions::default());
        assert_eq!(desired.as_deref(), Some("Meetings/Z.md"));

        let mut staged = DocumentRecord::from_text("Templates/Z.md", "---\ntype: meeting\n---\n");
        staged.had_type = true;
        assert_eq!(
            desired_rel_path(&staged, Some(&schema), &VaultOptions::default()),
            None
        );
    }

    #[test]
    fn date_prefix_applies_once() {
        let mut doc = DocumentRecord::from_text(
            "Meetings/Standup.md",
            "---\ntype: meeting\ndate: 2026-03-02\n---\n",
        );
        doc.had_type = true;
        let mut schema = schema_with_folder("meeting", "Meetings");
        schema.prepend_date_to_title = true;
        let desired = desired_rel_path(&doc, Some(&schema), &VaultOptions::default());
        assert_eq!(desired.as_deref(), Some("Meetings/2026-03-02 Standup.md"));

        let mut prefixed = DocumentRecord::from_text(
            "Meetings/2026-03-02 Standup.md",
            "---\ntype: meeting\ndate: 2026-03-02\n---\n",
        );
        prefixed.had_type = true;
        assert_eq!(
            desired_rel_path(&prefixed, Some(&schema), &VaultOptions::default()),
            None
        );
    }
}
