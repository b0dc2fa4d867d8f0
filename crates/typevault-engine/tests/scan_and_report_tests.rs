use std::fs;
use std::path::Path;

use tempfile::tempdir;
use typevault_engine::report::{build_report, ViolationV1};
use typevault_engine::{scan_vault, DocumentRecord, VaultOptions};

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn scan_skips_housekeeping_folders_and_reserved_views() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_file(root, "Note.md", "---\ntype: note\n---\n");
    write_file(root, "Projects/Plan.md", "---\ntype: project\n---\n");
    write_file(root, "Projects/Board.view.md", "reserved structured view");
    write_file(root, "Schemas/note.md", "---\nid: note\nfield.tags: []\n---\n");
    write_file(root, "Templates/Weekly.md", "---\ntype: note\n---\n");
    write_file(root, "Attachments/clipping.md", "stray");
    write_file(root, ".obsidian/workspace.md", "host config");
    write_file(root, "diagram.canvas", "{}");

    let docs = scan_vault(root, &VaultOptions::default()).unwrap();
    let mut paths: Vec<&str> = docs.iter().map(|d| d.rel_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["Note.md", "Projects/Plan.md"]);
}

#[test]
fn scan_honors_the_size_cap() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_file(root, "Small.md", "---\ntype: note\n---\n");
    write_file(root, "Huge.md", &"x".repeat(4096));

    let options = VaultOptions {
        max_file_bytes: 1024,
        ..VaultOptions::default()
    };
    let docs = scan_vault(root, &options).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].rel_path, "Small.md");
}

#[test]
fn scan_records_had_type_from_the_initial_snapshot() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_file(root, "Typed.md", "---\ntype: note\n---\n");
    write_file(root, "Blank.md", "---\ntype:\n---\n");
    write_file(root, "Bare.md", "body only\n");

    let docs = scan_vault(root, &VaultOptions::default()).unwrap();
    let had_type = |rel: &str| {
        docs.iter()
            .find(|d| d.rel_path == rel)
            .map(|d| d.had_type)
            .unwrap()
    };
    assert!(had_type("Typed.md"));
    assert!(!had_type("Blank.md"));
    assert!(!had_type("Bare.md"));
}

// ============================================================================
// Report wire shape
// ============================================================================

#[test]
fn report_json_carries_the_per_file_contract() {
    let mut doc = DocumentRecord::from_text("Projects/X.md", "---\ntype: project\n---\n");
    doc.schema = Some("project".to_string());
    doc.matched = vec!["project".to_string()];
    doc.note_fix("normalized `status` to canonical enum casing");
    doc.ambiguities
        .push("Move conflict: Archive/X.md".to_string());
    doc.violations.push(ViolationV1::new(
        "required",
        Some("date"),
        "required field is missing",
    ));

    let report = build_report("check", false, Vec::new(), &[doc]);
    assert!(report.has_violations());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["version"], "1");
    assert_eq!(json["mode"], "check");
    assert_eq!(json["write"], false);
    assert_eq!(json["summary"]["files_scanned"], 1);
    assert_eq!(json["summary"]["files_changed"], 1);
    assert_eq!(json["summary"]["violation_count"], 1);
    assert_eq!(json["summary"]["ambiguity_count"], 1);

    let file = &json["files"][0];
    assert_eq!(file["path"], "Projects/X.md");
    assert_eq!(file["schemas"][0], "project");
    assert_eq!(file["changed"], true);
    assert!(file.get("moved_to").is_none(), "absent when no move happened");
    assert_eq!(file["fixes"][0], "normalized `status` to canonical enum casing");
    assert_eq!(file["ambiguities"][0], "Move conflict: Archive/X.md");
    assert_eq!(file["violations"][0]["rule"], "required");
    assert_eq!(file["violations"][0]["field"], "date");
    assert_eq!(file["violations"][0]["message"], "required field is missing");
}

#[test]
fn io_failures_surface_as_violations_without_aborting() {
    let mut doc = DocumentRecord::from_text("Broken.md", "");
    doc.io_error = Some("cannot read document: permission denied".to_string());

    let report = build_report("fix", true, Vec::new(), &[doc]);
    assert_eq!(report.summary.violation_count, 1);
    assert_eq!(report.files[0].violations[0].rule, "io");
    assert!(report.has_violations());
}
