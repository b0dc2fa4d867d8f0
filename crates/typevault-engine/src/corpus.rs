//! Vault scanning and the per-run document snapshot.
//!
//! A run reads every candidate document once, mutates the in-memory
//! records through the engine passes, and flushes changed records back to
//! disk only in write mode. Nothing persists between runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use typevault_schema::frontmatter::{self, Value};

use crate::report::ViolationV1;

/// Options controlling which files a run considers and where the
/// well-known folders live.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    /// Folder containing schema source documents.
    pub schema_dir: String,
    /// Staging folder whose documents are never relocated.
    pub templates_dir: String,
    /// Destination folder for terminal-status documents.
    pub archive_dir: String,
    /// Directory names to skip entirely (exact match, any depth).
    pub exclude_dirs: Vec<String>,
    /// Maximum file size to read (bytes).
    pub max_file_bytes: u64,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            schema_dir: "Schemas".to_string(),
            templates_dir: "Templates".to_string(),
            archive_dir: "Archive".to_string(),
            exclude_dirs: vec![
                "Attachments".to_string(),
                ".obsidian".to_string(),
                ".typevault".to_string(),
                ".git".to_string(),
            ],
            max_file_bytes: 1024 * 1024,
        }
    }
}

impl VaultOptions {
    fn skips_dir(&self, name: &str) -> bool {
        name == self.schema_dir
            || name == self.templates_dir
            || self.exclude_dirs.iter().any(|d| d == name)
    }
}

/// One document's per-run state.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub path: PathBuf,
    /// Path relative to the vault root, `/`-separated.
    pub rel_path: String,
    /// Filename without extension.
    pub title: String,
    pub has_block: bool,
    pub properties: BTreeMap<String, Value>,
    pub body: String,
    /// Whether the document carried an explicit `type` value before this
    /// run touched it.
    pub had_type: bool,
    /// Matched schema id driving autofix, if any.
    pub schema: Option<String>,
    /// All schema ids in the winning match tier.
    pub matched: Vec<String>,
    pub folder_mismatch: bool,
    pub moved_to: Option<String>,
    pub changed: bool,
    pub fixes: Vec<String>,
    pub ambiguities: Vec<String>,
    pub violations: Vec<ViolationV1>,
    /// A read/write failure; the document is skipped for further passes.
    pub io_error: Option<String>,
}

impl DocumentRecord {
    fn new(path: PathBuf, rel_path: String) -> Self {
        let title = Path::new(&rel_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        DocumentRecord {
            path,
            rel_path,
            title,
            has_block: false,
            properties: BTreeMap::new(),
            body: String::new(),
            had_type: false,
            schema: None,
            matched: Vec::new(),
            folder_mismatch: false,
            moved_to: None,
            changed: false,
            fixes: Vec::new(),
            ambiguities: Vec::new(),
            violations: Vec::new(),
            io_error: None,
        }
    }

    /// Build a record from text alone, without touching disk. The engine
    /// passes operate on these identically to scanned records.
    pub fn from_text(rel_path: &str, text: &str) -> Self {
        let mut doc = DocumentRecord::new(PathBuf::from(rel_path), rel_path.to_string());
        let parsed = frontmatter::parse(text);
        doc.has_block = parsed.has_block;
        doc.properties = parsed.properties;
        doc.body = parsed.body;
        doc.had_type = doc
            .properties
            .get("type")
            .map(|v| !v.is_blank())
            .unwrap_or(false);
        doc
    }

    /// First path segment of the relative path, or `""` at the vault root.
    pub fn folder(&self) -> &str {
        match self.rel_path.split_once('/') {
            Some((folder, _)) => folder,
            None => "",
        }
    }

    /// Filename component of the relative path.
    pub fn file_name(&self) -> &str {
        self.rel_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.rel_path)
    }

    pub fn note_fix(&mut self, message: impl Into<String>) {
        self.fixes.push(message.into());
        self.changed = true;
    }

    /// Write the current property block and body back to `self.path`.
    pub fn flush(&mut self) -> Result<()> {
        let text = frontmatter::serialize(&self.body, &self.properties);
        fs::write(&self.path, text)
            .with_context(|| format!("cannot write document {}", self.path.display()))
    }
}

fn is_candidate_file(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".md") else {
        return false;
    };
    // `<name>.view.md` documents are reserved structured views.
    !stem.ends_with(".view")
}

/// Snapshot every candidate document under `root`.
///
/// Per-document read failures are recorded on the returned record rather
/// than aborting the scan.
pub fn scan_vault(root: &Path, options: &VaultOptions) -> Result<Vec<DocumentRecord>> {
    let mut docs = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            if entry.path() == root {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !options.skips_dir(name.as_ref())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !is_candidate_file(name.as_ref()) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > options.max_file_bytes {
                debug!(path = %entry.path().display(), "skipping oversized document");
                continue;
            }
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let mut doc = DocumentRecord::new(entry.path().to_path_buf(), rel_path);

        match fs::read_to_string(entry.path()) {
            Ok(text) => {
                let parsed = frontmatter::parse(&text);
                doc.has_block = parsed.has_block;
                doc.properties = parsed.properties;
                doc.body = parsed.body;
                doc.had_type = doc
                    .properties
                    .get("type")
                    .map(|v| !v.is_blank())
                    .unwrap_or(false);
            }
            Err(err) => {
                doc.io_error = Some(format!("cannot read document: {err}"));
            }
        }
        docs.push(doc);
    }

    debug!(count = docs.len(), "scanned vault");
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_documents_and_non_markdown_are_excluded() {
        assert!(is_candidate_file("Note.md"));
        assert!(!is_candidate_file("Projects.view.md"));
        assert!(!is_candidate_file("image.png"));
        assert!(!is_candidate_file("data.canvas"));
    }
}
