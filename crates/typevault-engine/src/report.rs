//! The machine-readable run report.
//!
//! This is the primary contract external tooling depends on; the shape is
//! stable regardless of which CLI or host application consumes it.

use serde::{Deserialize, Serialize};

use typevault_schema::SchemaWarning;

use crate::corpus::DocumentRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReportV1 {
    pub version: String,
    pub generated_at_unix_secs: u64,
    /// `"check"` or `"fix"`.
    pub mode: String,
    pub write: bool,
    pub summary: RunSummaryV1,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_warnings: Vec<SchemaWarning>,
    pub files: Vec<FileReportV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSummaryV1 {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub violation_count: usize,
    pub ambiguity_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReportV1 {
    pub path: String,
    /// Matched schema id(s) at the winning tier, id-ordered.
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<String>,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ViolationV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationV1 {
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ViolationV1 {
    pub fn new(rule: &str, field: Option<&str>, message: impl Into<String>) -> Self {
        ViolationV1 {
            rule: rule.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

pub fn now_unix_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl RunReportV1 {
    /// Whether any violations remain; the caller uses this to signal
    /// "problems found" distinctly from clean success.
    pub fn has_violations(&self) -> bool {
        self.summary.violation_count > 0
    }
}

/// Aggregate per-document outcomes into one run report.
pub fn build_report(
    mode: &str,
    write: bool,
    schema_warnings: Vec<SchemaWarning>,
    docs: &[DocumentRecord],
) -> RunReportV1 {
    let mut summary = RunSummaryV1 {
        files_scanned: docs.len(),
        ..RunSummaryV1::default()
    };
    let mut files = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut violations = doc.violations.clone();
        if let Some(err) = &doc.io_error {
            violations.push(ViolationV1::new("io", None, err.clone()));
        }
        if doc.changed || doc.moved_to.is_some() {
            summary.files_changed += 1;
        }
        summary.violation_count += violations.len();
        summary.ambiguity_count += doc.ambiguities.len();
        files.push(FileReportV1 {
            path: doc.rel_path.clone(),
            schemas: doc.matched.clone(),
            moved_to: doc.moved_to.clone(),
            changed: doc.changed,
            fixes: doc.fixes.clone(),
            ambiguities: doc.ambiguities.clone(),
            violations,
        });
    }
    RunReportV1 {
        version: "1".to_string(),
        generated_at_unix_secs: now_unix_secs(),
        mode: mode.to_string(),
        write,
        summary,
        schema_warnings,
        files,
    }
}
