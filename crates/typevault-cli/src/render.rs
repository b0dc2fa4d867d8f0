//! Text rendering for run reports and schema listings.

use colored::Colorize;

use typevault_engine::RunReportV1;
use typevault_schema::SchemaSet;

pub fn render_report_text(report: &RunReportV1) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "typevault {} ({})\n",
        report.mode,
        if report.write { "write" } else { "read-only" }
    ));
    out.push_str(&format!(
        "  scanned: {}  changed: {}  violations: {}  needs review: {}\n",
        report.summary.files_scanned,
        report.summary.files_changed,
        report.summary.violation_count,
        report.summary.ambiguity_count,
    ));

    if !report.schema_warnings.is_empty() {
        out.push('\n');
        out.push_str(&format!("{}\n", "schema warnings:".yellow().bold()));
        for w in &report.schema_warnings {
            out.push_str(&format!("  - {}\n", w.message));
        }
    }

    for file in &report.files {
        if file.fixes.is_empty()
            && file.ambiguities.is_empty()
            && file.violations.is_empty()
            && file.moved_to.is_none()
        {
            continue;
        }
        out.push('\n');
        out.push_str(&format!("{}\n", file.path.bold()));
        if !file.schemas.is_empty() {
            out.push_str(&format!("  schema: {}\n", file.schemas.join(", ")));
        }
        if let Some(to) = &file.moved_to {
            out.push_str(&format!("  {} {}\n", "->".cyan(), to));
        }
        for fix in &file.fixes {
            out.push_str(&format!("  {} {}\n", "fix".green(), fix));
        }
        for a in &file.ambiguities {
            out.push_str(&format!("  {} {}\n", "review".yellow(), a));
        }
        for v in &file.violations {
            let field = v.field.as_deref().unwrap_or("-");
            out.push_str(&format!(
                "  {} [{}] {}: {}\n",
                "violation".red(),
                v.rule,
                field,
                v.message
            ));
        }
    }
    out
}

pub fn render_schemas_text(set: &SchemaSet) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} schema(s)\n", set.records.len()));
    for record in set.records.values() {
        out.push('\n');
        out.push_str(&format!("{}\n", record.id.bold()));
        if let Some(parent) = &record.extends {
            out.push_str(&format!("  extends: {parent}\n"));
        }
        match record.folder.as_deref() {
            Some("") => out.push_str("  folder: (vault root)\n"),
            Some(folder) => out.push_str(&format!("  folder: {folder}\n")),
            None => {}
        }
        if let Some(purpose) = &record.purpose {
            out.push_str(&format!("  purpose: {purpose}\n"));
        }
        if !record.required.is_empty() {
            let req: Vec<&str> = record.required.iter().map(String::as_str).collect();
            out.push_str(&format!("  required: {}\n", req.join(", ")));
        }
        if !record.properties.is_empty() {
            out.push_str(&format!("  fields: {}\n", record.properties.len()));
        }
        for rule in &record.pair_rules {
            let target = rule.target_type.as_deref().unwrap_or("*");
            out.push_str(&format!(
                "  pair: {} -> {}.{}\n",
                rule.source_field, target, rule.target_field
            ));
        }
    }
    if !set.warnings.is_empty() {
        out.push('\n');
        out.push_str(&format!("{}\n", "warnings:".yellow().bold()));
        for w in &set.warnings {
            out.push_str(&format!("  - {}\n", w.message));
        }
    }
    out
}
