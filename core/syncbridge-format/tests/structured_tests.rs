//! Tests for scored structural comparison.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use syncbridge_format::{
    CompareResult, Field, FieldRule, FormatEnv, FormatError, FormatRef, ObjFormat, Record,
    ScoreTable, Selector, Weight,
};

fn structured_env(table: ScoreTable) -> (FormatEnv, FormatRef) {
    let mut format = ObjFormat::new("contact-xml", "contact");
    format
        .set_structure(
            |bytes| serde_json::from_slice::<Vec<Field>>(bytes).map_err(|e| e.to_string()),
            table,
        )
        .unwrap();
    let mut builder = FormatEnv::builder();
    let format = builder.register_format(format).unwrap();
    (builder.build(), format)
}

fn doc(format: &FormatRef, fields: &[Field]) -> Record {
    Record::new(format.clone(), serde_json::to_vec(fields).unwrap())
}

fn tel(number: &str, kind: Option<&str>) -> Field {
    let mut field = Field::new("Tel").with_child(Field::leaf("Number", number));
    if let Some(kind) = kind {
        field = field.with_child(Field::leaf("Type", kind));
    }
    field
}

fn contact_table() -> ScoreTable {
    ScoreTable::default()
        .with_rule(FieldRule::new("FN", 3).unwrap())
        .with_rule(FieldRule::new("Tel", 5).unwrap().with_keys(["Type"]))
        .with_rule(FieldRule::new("Email", 2).unwrap())
        .with_rule(FieldRule::ignore("Rev").unwrap())
        .with_threshold(5)
}

fn john(number: &str, rev: &str) -> Vec<Field> {
    vec![
        Field::leaf("FN", "John"),
        tel(number, Some("home")),
        Field::leaf("Email", "john@example.com"),
        Field::leaf("Rev", rev),
    ]
}

fn both_ways(env: &FormatEnv, a: &Record, b: &Record) -> CompareResult {
    let ab = env.compare(a, b).unwrap();
    let ba = env.compare(b, a).unwrap();
    assert_eq!(ab, ba, "comparison depends on argument order");
    ab
}

// ── Classification ──────────────────────────────────────────────

#[test]
fn identical_documents_are_same() {
    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(&f, &john("555-1", "1"));
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Same);
}

#[test]
fn field_order_does_not_matter() {
    let (env, f) = structured_env(contact_table());
    let mut reordered = john("555-1", "1");
    reordered.reverse();
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(&f, &reordered);
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Same);
}

#[test]
fn ignored_fields_do_not_break_sameness() {
    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(&f, &john("555-1", "2"));
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Same);
}

#[test]
fn key_similar_field_makes_documents_similar() {
    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(&f, &john("555-2", "1"));
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Similar);
}

#[test]
fn unruled_fields_cost_default_weight() {
    let (env, f) = structured_env(contact_table().with_threshold(10));
    let a = doc(&f, &john("555-1", "1"));
    let mut extra = john("555-1", "1");
    extra.push(Field::leaf("X-Custom", "1"));
    let b = doc(&f, &extra);
    // 3 + 5 + 2 - 1 = 9, below the threshold.
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Mismatch);

    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(&f, &extra);
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Similar);
}

#[test]
fn unruled_equal_fields_earn_default_weight() {
    let table = ScoreTable::default().with_default_weight(1).with_threshold(0);
    let (env, f) = structured_env(table.clone());
    let a_fields = vec![Field::leaf("N", "John"), Field::leaf("EMAIL", "a")];
    let b_fields = vec![Field::leaf("N", "John"), Field::leaf("EMAIL", "b")];

    // +1 for N, -1 once for the changed EMAIL.
    let scored = table.score(&a_fields, &b_fields);
    assert_eq!(scored.score, 0);
    assert!(!scored.same);
    assert_eq!(
        both_ways(&env, &doc(&f, &a_fields), &doc(&f, &b_fields)),
        CompareResult::Similar
    );
}

#[test]
fn unruled_fields_only_offset_their_own_name() {
    let table = ScoreTable::default().with_default_weight(2);
    let a_fields = vec![Field::leaf("X-A", "1")];
    let b_fields = vec![Field::leaf("X-B", "1")];
    assert_eq!(table.score(&a_fields, &b_fields).score, -4);

    let b_fields = vec![Field::leaf("X-A", "2"), Field::leaf("X-A", "3")];
    assert_eq!(table.score(&a_fields, &b_fields).score, -4);
}

#[test]
fn different_people_mismatch() {
    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = doc(
        &f,
        &[
            Field::leaf("FN", "Jane"),
            tel("555-9", Some("work")),
            Field::leaf("Email", "jane@example.com"),
        ],
    );
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Mismatch);
}

#[test]
fn attribute_selector_routes_fields() {
    let table = ScoreTable::default()
        .with_rule(FieldRule::new("Tel[@type=cell]", 10).unwrap())
        .with_rule(FieldRule::ignore("Tel").unwrap())
        .with_threshold(5);
    let (env, f) = structured_env(table);
    let cell = |n: &str| Field::leaf("Tel", n).with_attr("type", "cell");
    let home = |n: &str| Field::leaf("Tel", n).with_attr("type", "home");

    let a = doc(&f, &[cell("1"), home("2")]);
    let b = doc(&f, &[cell("1"), home("3")]);
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Same);

    let c = doc(&f, &[cell("9"), home("2")]);
    assert_eq!(both_ways(&env, &a, &c), CompareResult::Mismatch);
}

#[test]
fn unparseable_payload_fails_the_capability() {
    let (env, f) = structured_env(contact_table());
    let a = doc(&f, &john("555-1", "1"));
    let b = Record::new(f.clone(), "not json");
    assert!(matches!(
        env.compare(&a, &b),
        Err(FormatError::CapabilityFailed { .. })
    ));
}

/// First-match pairing takes the first key-similar partner even when a
/// later pairing would match everything. An optimal assignment would pair
/// {1} with {1, work} and {1, home} with {1, home, x}, scoring +10.
#[test]
fn greedy_pairing_misses_better_assignment() {
    let table = ScoreTable::default()
        .with_rule(FieldRule::new("Tel", 5).unwrap().with_keys(["Number", "Type"]))
        .with_threshold(5);
    let (env, f) = structured_env(table.clone());

    let a_fields = vec![tel("1", None), tel("1", Some("home"))];
    let b_fields = vec![
        tel("1", Some("home")).with_child(Field::leaf("Label", "x")),
        tel("1", Some("work")),
    ];

    // +5 for the first pair, -5 for the changed second one.
    assert_eq!(table.score(&a_fields, &b_fields).score, 0);
    assert_eq!(table.score(&b_fields, &a_fields).score, 0);

    let a = doc(&f, &a_fields);
    let b = doc(&f, &b_fields);
    assert_eq!(both_ways(&env, &a, &b), CompareResult::Mismatch);
}

// ── Fields and selectors ────────────────────────────────────────

#[test]
fn children_compare_as_multiset() {
    let a = Field::new("Adr")
        .with_child(Field::leaf("Street", "Main"))
        .with_child(Field::leaf("City", "Oslo"));
    let b = Field::new("Adr")
        .with_child(Field::leaf("City", "Oslo"))
        .with_child(Field::leaf("Street", "Main"));
    let c = Field::new("Adr")
        .with_child(Field::leaf("City", "Oslo"))
        .with_child(Field::leaf("City", "Oslo"));
    assert!(a.structurally_equal(&b));
    assert!(!a.structurally_equal(&c));
}

#[test]
fn key_lookup_reads_children_and_attributes() {
    let field = tel("555-1", Some("home")).with_attr("pref", "1");
    assert_eq!(field.key("Number"), Some("555-1"));
    assert_eq!(field.key("@pref"), Some("1"));
    assert_eq!(field.key("Missing"), None);
}

#[test]
fn selectors_parse_and_display() {
    let plain: Selector = "FN".parse().unwrap();
    assert_eq!(plain.to_string(), "FN");
    let with_attr: Selector = "Tel[@type=cell]".parse().unwrap();
    assert_eq!(with_attr.name(), "Tel");
    assert_eq!(with_attr.to_string(), "Tel[@type=cell]");
    assert!(with_attr.matches(&Field::leaf("Tel", "1").with_attr("type", "cell")));
    assert!(!with_attr.matches(&Field::leaf("Tel", "1")));
}

#[test]
fn malformed_selectors_are_rejected() {
    for bad in ["", "Tel[", "Tel[type=cell]", "Tel[@type]", "Te l", "[@a=b]"] {
        assert!(
            matches!(bad.parse::<Selector>(), Err(FormatError::InvalidSelector { .. })),
            "{bad:?} should not parse"
        );
    }
}

#[test]
fn score_table_loads_from_json() {
    let json = r#"{
        "rules": [
            {"selector": "FN", "weight": {"points": 3}},
            {"selector": "Tel", "weight": {"points": 5}, "keys": ["Type"]},
            {"selector": "Rev", "weight": "ignore"}
        ],
        "default_weight": 1,
        "threshold": 5
    }"#;
    let table: ScoreTable = serde_json::from_str(json).unwrap();
    assert_eq!(table.rules.len(), 3);
    assert_eq!(table.rules[1].keys, vec!["Type".to_string()]);
    assert_eq!(table.rules[2].weight, Weight::Ignore);

    let bad = r#"{"rules": [{"selector": "Tel[", "weight": "ignore"}], "default_weight": 1, "threshold": 1}"#;
    assert!(serde_json::from_str::<ScoreTable>(bad).is_err());
}

// ── Properties ──────────────────────────────────────────────────

fn field_strategy() -> impl Strategy<Value = Field> {
    (
        prop::sample::select(vec!["FN", "Tel", "Email", "Note", "Rev"]),
        prop::sample::select(vec!["1", "2"]),
        prop::option::of(prop::sample::select(vec!["home", "work"])),
    )
        .prop_map(|(name, number, kind)| {
            let mut field = Field::new(name).with_child(Field::leaf("Number", number));
            if let Some(kind) = kind {
                field = field.with_child(Field::leaf("Type", kind));
            }
            field
        })
}

proptest! {
    /// The classification never depends on argument order.
    #[test]
    fn structural_comparison_is_symmetric(
        a in prop::collection::vec(field_strategy(), 0..6),
        b in prop::collection::vec(field_strategy(), 0..6),
    ) {
        let table = ScoreTable::default()
            .with_rule(FieldRule::new("FN", 3).unwrap())
            .with_rule(FieldRule::new("Tel", 5).unwrap().with_keys(["Number", "Type"]))
            .with_rule(FieldRule::ignore("Rev").unwrap())
            .with_threshold(2);
        let (env, f) = structured_env(table);
        let a = doc(&f, &a);
        let b = doc(&f, &b);
        prop_assert_eq!(env.compare(&a, &b).unwrap(), env.compare(&b, &a).unwrap());
    }

    /// A document is always the same as an equal copy of itself.
    #[test]
    fn equal_documents_are_same(a in prop::collection::vec(field_strategy(), 0..6)) {
        let (env, f) = structured_env(contact_table());
        let x = doc(&f, &a);
        let y = doc(&f, &a);
        prop_assert_eq!(env.compare(&x, &y).unwrap(), CompareResult::Same);
    }
}
