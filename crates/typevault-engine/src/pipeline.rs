//! Run orchestration: schema load, per-document pass, link pass, flush,
//! report.
//!
//! Check mode and fix-without-write both leave the filesystem untouched:
//! the same repairs run against the in-memory snapshot (so validation
//! reflects what a fix run would leave behind) and every mutating decision
//! becomes a descriptive entry instead.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use typevault_schema::loader;

use crate::autofix;
use crate::corpus::{self, VaultOptions};
use crate::links;
use crate::matcher;
use crate::relocate;
use crate::report::{build_report, RunReportV1};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Check,
    Fix,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Check => "check",
            RunMode::Fix => "fix",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Apply changes to disk. Only honored in fix mode.
    pub write: bool,
    pub vault: VaultOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            mode: RunMode::Check,
            write: false,
            vault: VaultOptions::default(),
        }
    }
}

/// Process the vault at `root` and produce the run report.
///
/// Fatal errors are limited to an unreadable schema directory; everything
/// else is recorded per document and the run completes.
pub fn run(root: &Path, options: &RunOptions) -> Result<RunReportV1> {
    let schema_dir = root.join(&options.vault.schema_dir);
    let schemas = loader::load_schema_dir(&schema_dir)
        .context("schema sources are unavailable; nothing to validate against")?;
    info!(
        schemas = schemas.records.len(),
        warnings = schemas.warnings.len(),
        "resolved schema set"
    );

    let mut docs = corpus::scan_vault(root, &options.vault)?;
    let write = options.mode == RunMode::Fix && options.write;

    for doc in docs.iter_mut() {
        if doc.io_error.is_some() {
            continue;
        }
        autofix::prepass(doc);

        let outcome = matcher::match_schema(doc, &schemas);
        doc.schema = outcome.schema.clone();
        doc.matched = outcome.matched.clone();
        doc.folder_mismatch = outcome.folder_mismatch;
        if outcome.tie {
            doc.ambiguities.push(format!(
                "multiple schemas match equally: {}",
                outcome.matched.join(", ")
            ));
        }

        if let Some(schema) = doc.schema.as_deref().and_then(|id| schemas.get(id)) {
            autofix::apply_schema_fixes(doc, schema);
        }

        let schema = doc.schema.as_deref().and_then(|id| schemas.get(id));
        if let Some(desired) = relocate::desired_rel_path(doc, schema, &options.vault) {
            if let Err(err) = relocate::apply_move(doc, root, desired, write) {
                doc.io_error = Some(format!("{err:#}"));
                continue;
            }
        }

        doc.violations = autofix::validate(doc, schema);
        autofix::update_needs_review(doc);
    }

    links::reconcile_links(&mut docs, &schemas);

    if write {
        for doc in docs.iter_mut() {
            if doc.io_error.is_some() || !doc.changed {
                continue;
            }
            if let Err(err) = doc.flush() {
                doc.io_error = Some(format!("{err:#}"));
            }
        }
        debug!("flushed changed documents");
    }

    Ok(build_report(
        options.mode.as_str(),
        write,
        schemas.warnings.clone(),
        &docs,
    ))
}
