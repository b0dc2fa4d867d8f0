use std::collections::BTreeMap;

use proptest::prelude::*;
use typevault_schema::frontmatter::{parse, serialize, Scalar, Value};

fn key() -> impl Strategy<Value = String> {
    // Keep keys small and readable (and compatible with the line grammar).
    proptest::string::string_regex("[a-z][a-z0-9_-]{0,10}").unwrap()
}

fn plain_text() -> impl Strategy<Value = String> {
    // Any single-line text; quoting rules must cope with the rest.
    proptest::string::string_regex(r#"[ -~]{0,24}"#)
        .unwrap()
        .prop_filter("line grammar is single-line", |s| {
            !s.contains('\n') && !s.contains('\r')
        })
}

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::Null),
        any::<bool>().prop_map(Scalar::Bool),
        (-1_000_000i64..1_000_000).prop_map(|n| Scalar::Num(n as f64)),
        (-1_000_000i32..1_000_000, 1u32..10_000).prop_map(|(n, d)| {
            Scalar::Num(n as f64 / d as f64)
        }),
        plain_text().prop_map(Scalar::Str),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        scalar().prop_map(Value::Scalar),
        proptest::collection::vec(scalar(), 0..4).prop_map(Value::List),
    ]
}

fn property_map() -> impl Strategy<Value = BTreeMap<String, Value>> {
    proptest::collection::btree_map(key(), value(), 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// serialize is a left inverse of parse over the scalar grammar.
    #[test]
    fn serialize_then_parse_roundtrips(map in property_map()) {
        let body = "# Title\n\nSome body text.\n";
        let text = serialize(body, &map);
        let doc = parse(&text);
        prop_assert_eq!(&doc.properties, &map);
        prop_assert_eq!(doc.body.as_str(), body);
        if !map.is_empty() {
            prop_assert!(doc.has_block);
        }
    }

    /// Serializing twice through a parse is stable (no drift).
    #[test]
    fn reserialization_is_stable(map in property_map()) {
        let first = serialize("", &map);
        let reparsed = parse(&first);
        let second = serialize(&reparsed.body, &reparsed.properties);
        prop_assert_eq!(first, second);
    }
}
