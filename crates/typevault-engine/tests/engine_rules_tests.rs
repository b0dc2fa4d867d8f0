use typevault_engine::autofix::{self, NEEDS_REVIEW_FIELD};
use typevault_engine::corpus::DocumentRecord;
use typevault_engine::links::reconcile_links;
use typevault_engine::matcher::match_schema;
use typevault_schema::frontmatter::{Scalar, Value};
use typevault_schema::loader::load_schema_sources;
use typevault_schema::SchemaSet;

fn schemas(items: &[(&str, &str)]) -> SchemaSet {
    load_schema_sources(
        &items
            .iter()
            .map(|(t, x)| (t.to_string(), x.to_string()))
            .collect::<Vec<_>>(),
    )
}

/// Run the per-document portion of the pipeline on an in-memory record.
fn fix_document(doc: &mut DocumentRecord, set: &SchemaSet) {
    autofix::prepass(doc);
    let outcome = match_schema(doc, set);
    doc.schema = outcome.schema.clone();
    doc.matched = outcome.matched.clone();
    if let Some(schema) = doc.schema.as_deref().and_then(|id| set.get(id)) {
        autofix::apply_schema_fixes(doc, schema);
    }
    let schema = doc.schema.as_deref().and_then(|id| set.get(id));
    doc.violations = autofix::validate(doc, schema);
    autofix::update_needs_review(doc);
}

#[test]
fn explicit_type_outranks_folder_inference() {
    let set = schemas(&[
        ("meeting", "---\nid: meeting\nfolder: Meetings\nfield.date*:\n---\n"),
        ("project", "---\nid: project\nfolder: Projects\nfield.status:\n---\n"),
    ]);
    let doc = DocumentRecord::from_text("Projects/Kickoff.md", "---\ntype: meeting\n---\n");
    let outcome = match_schema(&doc, &set);
    assert_eq!(outcome.schema.as_deref(), Some("meeting"));
    assert!(outcome.folder_mismatch);
}

#[test]
fn folder_alone_selects_a_schema_when_type_is_absent() {
    let set = schemas(&[(
        "project",
        "---\nid: project\nfolder: Projects\nfield.status:\n---\n",
    )]);
    let mut doc = DocumentRecord::from_text("Projects/Thing.md", "---\nstatus: active\n---\n");
    // The pre-pass folder table would set `type: project` anyway; match
    // without it to exercise the folder tier.
    let outcome = match_schema(&doc, &set);
    assert_eq!(outcome.schema.as_deref(), Some("project"));

    doc.properties.remove("status");
    let set_with_match = schemas(&[(
        "project",
        "---\nid: project\nfolder: Projects\nmatch.status: active\nfield.status:\n---\n",
    )]);
    let outcome = match_schema(&doc, &set_with_match);
    assert!(outcome.schema.is_none(), "match constraint must exclude");
}

#[test]
fn schemaless_documents_get_a_single_violation() {
    let set = schemas(&[("meeting", "---\nid: meeting\nfolder: Meetings\nfield.date*:\n---\n")]);
    let mut doc = DocumentRecord::from_text("Elsewhere/Odd.md", "---\ntype: widget\n---\n");
    fix_document(&mut doc, &set);
    assert_eq!(doc.violations.len(), 1);
    assert_eq!(doc.violations[0].rule, "schema");
}

#[test]
fn missing_required_field_is_filled_blank_and_still_flagged() {
    let set = schemas(&[("meeting", "---\nid: meeting\nfolder: Meetings\nfield.date*:\n---\n")]);
    let mut doc = DocumentRecord::from_text("Meetings/Standup.md", "---\ntype: meeting\n---\n");
    fix_document(&mut doc, &set);

    // Present and blank, not absent.
    assert_eq!(
        doc.properties.get("date"),
        Some(&Value::Scalar(Scalar::Null))
    );
    let required: Vec<_> = doc
        .violations
        .iter()
        .filter(|v| v.rule == "required" && v.field.as_deref() == Some("date"))
        .collect();
    assert_eq!(required.len(), 1);
}

#[test]
fn required_field_with_default_is_filled_from_schema() {
    let set = schemas(&[(
        "project",
        "---\nid: project\nfolder: Projects\nfield.status*: active, done, cancelled\ndefault.status: active\n---\n",
    )]);
    let mut doc = DocumentRecord::from_text("Projects/New.md", "---\ntype: project\n---\n");
    fix_document(&mut doc, &set);
    assert_eq!(doc.properties["status"].as_str(), Some("active"));
    assert!(doc.violations.is_empty(), "violations: {:?}", doc.violations);
}

#[test]
fn enum_case_mismatch_is_fixed_rather_than_flagged() {
    let set = schemas(&[(
        "project",
        "---\nid: project\nfolder: Projects\nfield.status: active, done, cancelled\n---\n",
    )]);
    let mut doc =
        DocumentRecord::from_text("Projects/P.md", "---\ntype: project\nstatus: Done\n---\n");
    fix_document(&mut doc, &set);
    assert_eq!(doc.properties["status"].as_str(), Some("done"));
    assert!(doc.violations.iter().all(|v| v.rule != "enum"));

    let mut bad =
        DocumentRecord::from_text("Projects/Q.md", "---\ntype: project\nstatus: nonsense\n---\n");
    fix_document(&mut bad, &set);
    assert!(bad.violations.iter().any(|v| v.rule == "enum"));
}

#[test]
fn autofix_is_idempotent() {
    let set = schemas(&[(
        "meeting",
        "---\nid: meeting\nfolder: Meetings\nfield.date*:\nfield.status: open, done\nfield.attendees: []\n---\n",
    )]);
    let mut doc = DocumentRecord::from_text(
        "Meetings/Sync.md",
        "---\ntype: \"[[Meeting]]\"\nstatus: DONE\nattendees: Alice\n---\n",
    );
    fix_document(&mut doc, &set);
    let after_first = doc.properties.clone();
    let fix_count = doc.fixes.len();
    assert!(fix_count > 0);

    fix_document(&mut doc, &set);
    assert_eq!(doc.properties, after_first);
    assert_eq!(doc.fixes.len(), fix_count, "second pass must report zero new fixes");
}

#[test]
fn ambiguities_are_mirrored_into_needs_review() {
    let set = schemas(&[("note", "---\nid: note\nfield.tags: []\n---\n")]);
    let mut doc = DocumentRecord::from_text("N.md", "---\ntype: note\n---\n");
    doc.ambiguities.push("Move conflict: Archive/N.md".to_string());
    fix_document(&mut doc, &set);
    assert_eq!(
        doc.properties.get(NEEDS_REVIEW_FIELD),
        Some(&Value::List(vec![Scalar::Str(
            "Move conflict: Archive/N.md".into()
        )]))
    );

    doc.ambiguities.clear();
    autofix::update_needs_review(&mut doc);
    assert!(!doc.properties.contains_key(NEEDS_REVIEW_FIELD));
}

// ============================================================================
// Link reconciliation
// ============================================================================

fn project_person_schemas() -> SchemaSet {
    schemas(&[
        (
            "project",
            "---\nid: project\nfolder: Projects\nfield.leads: []\npair.leads: person.projects\n---\n",
        ),
        (
            "person",
            "---\nid: person\nfolder: People\nfield.projects: []\n---\n",
        ),
    ])
}

fn matched(mut doc: DocumentRecord, set: &SchemaSet) -> DocumentRecord {
    let outcome = match_schema(&doc, set);
    doc.schema = outcome.schema;
    doc.matched = outcome.matched;
    doc
}

#[test]
fn backlink_is_added_and_stays_idempotent() {
    let set = project_person_schemas();
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Projects/Project X.md",
                "---\ntype: project\nleads:\n  - \"[[Alice]]\"\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text("People/Alice.md", "---\ntype: person\n---\n"),
            &set,
        ),
    ];

    reconcile_links(&mut docs, &set);
    assert_eq!(
        docs[1].properties.get("projects"),
        Some(&Value::List(vec![Scalar::Str("[[Project X]]".into())]))
    );
    assert!(docs[1].changed);

    // Re-running adds nothing and reports no new fixes.
    let fixes = docs[1].fixes.len();
    reconcile_links(&mut docs, &set);
    assert_eq!(
        docs[1].properties.get("projects"),
        Some(&Value::List(vec![Scalar::Str("[[Project X]]".into())]))
    );
    assert_eq!(docs[1].fixes.len(), fixes);
}

#[test]
fn ambiguous_titles_flag_without_mutation() {
    let set = project_person_schemas();
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Projects/Project X.md",
                "---\ntype: project\nleads:\n  - \"[[Alice]]\"\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text("People/Alice.md", "---\ntype: person\n---\n"),
            &set,
        ),
        matched(
            DocumentRecord::from_text("Alice.md", "---\ntype: person\n---\n"),
            &set,
        ),
    ];

    reconcile_links(&mut docs, &set);
    assert!(docs[0]
        .violations
        .iter()
        .any(|v| v.message.contains("ambiguous backlink")));
    assert!(docs[1].properties.get("projects").is_none());
    assert!(docs[2].properties.get("projects").is_none());
}

#[test]
fn unresolved_and_type_mismatched_references_flag_the_source() {
    let set = project_person_schemas();
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Projects/Project X.md",
                "---\ntype: project\nleads: [[[Ghost]], [[Project Y]]]\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text("Projects/Project Y.md", "---\ntype: project\n---\n"),
            &set,
        ),
    ];

    reconcile_links(&mut docs, &set);
    assert!(docs[0]
        .violations
        .iter()
        .any(|v| v.message.contains("unresolved backlink")));
    assert!(docs[0]
        .violations
        .iter()
        .any(|v| v.message.contains("type mismatch")));
}

#[test]
fn scalar_target_conflicts_are_reported_not_overwritten() {
    let set = schemas(&[
        (
            "task",
            "---\nid: task\nfolder: Tasks\nfield.owner: \"[[Someone]]\"\npair.owner: person.primary_task\n---\n",
        ),
        (
            "person",
            "---\nid: person\nfolder: People\nfield.primary_task: \"[[Something]]\"\n---\n",
        ),
    ]);
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Tasks/Deploy.md",
                "---\ntype: task\nowner: \"[[Bob]]\"\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text(
                "People/Bob.md",
                "---\ntype: person\nprimary_task: \"[[Other Task]]\"\n---\n",
            ),
            &set,
        ),
    ];

    reconcile_links(&mut docs, &set);
    assert!(docs[0]
        .violations
        .iter()
        .any(|v| v.message.contains("scalar conflict")));
    assert_eq!(
        docs[1].properties["primary_task"].as_str(),
        Some("[[Other Task]]")
    );

    // An empty scalar target is filled.
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Tasks/Ship.md",
                "---\ntype: task\nowner: \"[[Carol]]\"\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text("People/Carol.md", "---\ntype: person\n---\n"),
            &set,
        ),
    ];
    reconcile_links(&mut docs, &set);
    assert_eq!(docs[1].properties["primary_task"].as_str(), Some("[[Ship]]"));
}

#[test]
fn descendant_types_satisfy_typed_pair_rules() {
    let set = schemas(&[
        (
            "project",
            "---\nid: project\nfolder: Projects\nfield.leads: []\npair.leads: person.projects\n---\n",
        ),
        ("person", "---\nid: person\nfolder: People\nfield.projects: []\n---\n"),
        (
            "employee",
            "---\nid: employee\nextends: \"[[person]]\"\nfolder: People\n---\n",
        ),
    ]);
    let mut docs = vec![
        matched(
            DocumentRecord::from_text(
                "Projects/Project X.md",
                "---\ntype: project\nleads:\n  - \"[[Dana]]\"\n---\n",
            ),
            &set,
        ),
        matched(
            DocumentRecord::from_text("People/Dana.md", "---\ntype: employee\n---\n"),
            &set,
        ),
    ];
    reconcile_links(&mut docs, &set);
    assert!(docs[0].violations.is_empty(), "violations: {:?}", docs[0].violations);
    assert_eq!(
        docs[1].properties.get("projects"),
        Some(&Value::List(vec![Scalar::Str("[[Project X]]".into())]))
    );
}
