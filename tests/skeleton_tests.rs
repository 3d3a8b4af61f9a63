//! Integration tests for skeleton extraction and batch rendering

use std::collections::BTreeMap;

use liquid_skeleton::{
    KeyFormat, Map, Recipients, SeparationPredicate, Skeleton, SkeletonError, TagRegistry,
    Template, Value, VariableTable, EngineConfig,
};
use pretty_assertions::assert_eq;
use regex::Regex;

const NESTED: &str = "A{% if a1 > 0 %}B{% if a1 > 5 %}C{% elsif a1 > 1 %}D{% else %}E{% endif %}F{% elsif a1 < -1 %}G{% else %}H{% endif %}I";

const NESTED_WITH_VARIABLES: &str = "A{% if a1 > 0 %}B{{a1}}{% if a1 > 5 %}C{{a1}}{% elsif a1 > 1 %}D{{a1}}{% else %}E{{a1}}{% endif %}F{{a1}}{% elsif a1 < -1 %}G{{a1}}{% else %}H{{a1}}{% endif %}I";

fn map(pairs: &[(&str, Value)]) -> Map {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn separate(pattern: &str) -> SeparationPredicate {
    SeparationPredicate::from_regex(Regex::new(pattern).expect("valid regex"))
}

/// Extract against `shared`, then render a single recipient who sees
/// `shared` plus `personal`
fn skeleton_render(
    template: &str,
    shared: &[(&str, Value)],
    personal: &[(&str, Value)],
    pattern: Option<&str>,
) -> String {
    let template = Template::parse(template)
        .expect("Should parse")
        .with_separation(pattern.map(separate));
    let shared = map(shared);

    let mut recipients = Recipients::new();
    for (name, value) in shared.iter().chain(map(personal).iter()) {
        recipients.insert(name.clone(), vec![value.clone()]);
    }

    let mut outputs = template
        .render_batch(&shared, &recipients)
        .expect("Should render batch");
    assert_eq!(outputs.len(), 1);
    outputs.remove(0)
}

#[test]
fn test_render_strings() {
    let text = "A-v1--v2--v3--v4--v5-F";
    let sections: BTreeMap<String, String> = [("s1", "B"), ("s2", "C"), ("s3", "D"), ("s4", "E-v5-")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let vars: VariableTable = [
        ("-v1-", ["s1", "s1", ""]),
        ("-v2-", ["s2", "", ""]),
        ("-v3-", ["", "s3", ""]),
        ("-v4-", ["", "", "s4"]),
        ("-v5-", ["1", "2", "3"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
    .collect();

    let results = Template::render_strings(text, &vars, &sections).expect("Should rebuild");
    assert_eq!(results, vec!["ABC1F", "ABD2F", "AE33F"]);
}

#[test]
fn test_render_skeleton_basic() {
    assert_eq!(skeleton_render("A{{a}}", &[("a", Value::Int(1))], &[], None), "A1");
    assert_eq!(skeleton_render("A{{a}}", &[], &[("a", Value::Int(1))], Some("a")), "A1");
    assert_eq!(
        skeleton_render("A{{a | plus: 2}}", &[], &[("a", Value::Int(1))], Some("a")),
        "A3"
    );
    assert_eq!(
        skeleton_render("A{{3 | minus: a}}", &[], &[("a", Value::Int(1))], Some("a")),
        "A2"
    );
    assert_eq!(
        skeleton_render(
            "A{{a}}{{b}}",
            &[("b", Value::Int(2))],
            &[("a", Value::Int(1))],
            Some("a")
        ),
        "A12"
    );
}

#[test]
fn test_render_skeleton_without_separation() {
    // nothing deferred: personal data is never consulted
    assert_eq!(skeleton_render("A{{a}}", &[], &[("a", Value::Int(1))], None), "A");
    assert_eq!(
        skeleton_render(
            "A{{a}}{{b}}",
            &[("b", Value::Int(2))],
            &[("a", Value::Int(1))],
            None
        ),
        "A2"
    );
}

#[test]
fn test_render_skeleton_conditionals() {
    let if_else = "A{% if a1 > 0 %}B{% else %}C{% endif %}D";
    let if_elsif = "A{% if a1 > 0 %}B{% elsif a1 < -1 %}C{% else %}D{% endif %}E";

    assert_eq!(skeleton_render(if_else, &[("a1", Value::Int(1))], &[], None), "ABD");
    assert_eq!(skeleton_render(if_else, &[("a1", Value::Int(-1))], &[], None), "ACD");
    assert_eq!(skeleton_render(if_elsif, &[("a1", Value::Int(-2))], &[], None), "ACE");
    assert_eq!(skeleton_render(if_elsif, &[("a1", Value::Int(-1))], &[], None), "ADE");

    assert_eq!(skeleton_render(if_else, &[], &[("a1", Value::Int(1))], Some("a")), "ABD");
    assert_eq!(skeleton_render(if_else, &[], &[("a1", Value::Int(-1))], Some("a")), "ACD");
    assert_eq!(skeleton_render(if_elsif, &[], &[("a1", Value::Int(-2))], Some("a")), "ACE");
    assert_eq!(skeleton_render(if_elsif, &[], &[("a1", Value::Int(-1))], Some("a")), "ADE");

    assert_eq!(
        skeleton_render(
            "A{% if a1 > 0 %}B{{a2}}{% else %}C{% endif %}D",
            &[],
            &[("a1", Value::Int(1)), ("a2", Value::Int(2))],
            Some("a")
        ),
        "AB2D"
    );
}

#[test]
fn test_elsif_excludes_earlier_branches() {
    // a1 = 3 satisfies both predicates; only the first branch may render
    let source = "{% if a1 > 0 %}B{% elsif a1 > 1 %}C{% else %}D{% endif %}";
    assert_eq!(skeleton_render(source, &[], &[("a1", Value::Int(3))], Some("a")), "B");
}

#[test]
fn test_render_skeleton_nested_conditionals() {
    let cases = [
        (Value::Int(6), "ABCFI"),
        (Value::Int(4), "ABDFI"),
        (Value::Float(0.5), "ABEFI"),
        (Value::Int(-2), "AGI"),
        (Value::Float(-0.5), "AHI"),
    ];

    for (a1, expected) in cases {
        assert_eq!(
            skeleton_render(NESTED, &[("a1", a1.clone())], &[], None),
            expected
        );
        assert_eq!(
            skeleton_render(NESTED, &[], &[("a1", a1)], Some("a")),
            expected
        );
    }
}

#[test]
fn test_render_skeleton_nested_conditionals_with_variables() {
    let cases = [
        (Value::Int(6), "AB6C6F6I"),
        (Value::Int(4), "AB4D4F4I"),
        (Value::Float(0.5), "AB0.5E0.5F0.5I"),
        (Value::Int(-2), "AG-2I"),
        (Value::Float(-0.5), "AH-0.5I"),
    ];

    for (a1, expected) in cases {
        assert_eq!(
            skeleton_render(NESTED_WITH_VARIABLES, &[("a1", a1.clone())], &[], None),
            expected
        );
        assert_eq!(
            skeleton_render(NESTED_WITH_VARIABLES, &[], &[("a1", a1)], Some("a")),
            expected
        );
    }
}

#[test]
fn test_one_skeleton_many_recipients() {
    let template = Template::parse(NESTED_WITH_VARIABLES)
        .expect("Should parse")
        .with_separation(Some(separate("a")));
    let recipients: Recipients = [(
        "a1".to_string(),
        vec![
            Value::Int(6),
            Value::Int(4),
            Value::Float(0.5),
            Value::Int(-2),
            Value::Float(-0.5),
        ],
    )]
    .into_iter()
    .collect();

    let outputs = template
        .render_batch(&Map::new(), &recipients)
        .expect("Should render batch");
    assert_eq!(
        outputs,
        vec!["AB6C6F6I", "AB4D4F4I", "AB0.5E0.5F0.5I", "AG-2I", "AH-0.5I"]
    );
}

#[test]
fn test_batch_equals_direct_render() {
    let template = Template::parse(NESTED_WITH_VARIABLES)
        .expect("Should parse")
        .with_separation(Some(separate("a")));
    let values: Vec<Value> = (-3..=7).map(Value::Int).collect();
    let recipients: Recipients = [("a1".to_string(), values.clone())].into_iter().collect();

    let batch = template
        .render_batch(&Map::new(), &recipients)
        .expect("Should render batch");
    for (value, output) in values.into_iter().zip(batch) {
        let direct = template
            .render(&map(&[("a1", value)]))
            .expect("Should render");
        assert_eq!(output, direct);
    }
}

#[test]
fn test_skeleton_is_reusable() {
    let template = Template::parse("Dear {{ name }}, {{ company }} says hi")
        .expect("Should parse")
        .with_separation(Some(separate("^name$")));
    let shared = map(&[("company", Value::from("Acme"))]);
    let skeleton: Skeleton = template.render_skeleton(&shared).expect("Should extract");

    for names in [vec!["Ann"], vec!["Bo", "Cy"]] {
        let recipients: Recipients = [(
            "name".to_string(),
            names.iter().map(|n| Value::from(*n)).collect(),
        )]
        .into_iter()
        .collect();
        let table = template
            .render_variables(&skeleton, &shared, &recipients)
            .expect("Should evaluate");
        let outputs = skeleton
            .render_strings(&table, names.len())
            .expect("Should rebuild");
        let expected: Vec<String> = names
            .iter()
            .map(|n| format!("Dear {}, Acme says hi", n))
            .collect();
        assert_eq!(outputs, expected);
    }
}

#[test]
fn test_skeleton_text_with_readable_keys() {
    let config = EngineConfig::new().with_key_format(KeyFormat::new("<", ">"));
    let template = Template::parse_with(
        "Hi {{ name }}{% if vip %}!{% endif %}",
        &TagRegistry::default(),
        config,
    )
    .expect("Should parse")
    .with_separation(Some(separate("^(name|vip)$")));

    let skeleton = template.render_skeleton(&Map::new()).expect("Should extract");
    insta::assert_snapshot!(skeleton.text(), @"Hi <1><3>");
    assert_eq!(
        skeleton.section_texts().into_iter().collect::<Vec<_>>(),
        vec![("<2>".to_string(), "!".to_string())]
    );
}

#[test]
fn test_reserved_text_rejected() {
    let config = EngineConfig::new().with_key_format(KeyFormat::new("<", ">"));
    let template = Template::parse_with("a < b {{ x }}", &TagRegistry::default(), config)
        .expect("Should parse")
        .with_separation(Some(separate("x")));
    let err = template.render_skeleton(&Map::new()).unwrap_err();
    assert!(matches!(err, SkeletonError::ReservedText { .. }));
}

#[test]
fn test_length_mismatch() {
    let template = Template::parse("{{ a }}{{ b }}")
        .expect("Should parse")
        .with_separation(Some(separate("^(a|b)$")));
    let recipients: Recipients = [
        ("a".to_string(), vec![Value::Int(1), Value::Int(2)]),
        ("b".to_string(), vec![Value::Int(1)]),
    ]
    .into_iter()
    .collect();
    let err = template.render_batch(&Map::new(), &recipients).unwrap_err();
    assert_eq!(
        err,
        SkeletonError::LengthMismatch {
            name: "b".to_string(),
            expected: 2,
            found: 1,
        }
    );
}

#[test]
fn test_empty_recipients() {
    let template = Template::parse("{{ a }}")
        .expect("Should parse")
        .with_separation(Some(separate("a")));
    let err = template
        .render_batch(&Map::new(), &Recipients::new())
        .unwrap_err();
    assert_eq!(err, SkeletonError::EmptyRecipients);
}

#[test]
fn test_recipient_errors_are_contained() {
    let template = Template::parse("[{{ a | divided_by: 0 }}]")
        .expect("Should parse")
        .with_separation(Some(separate("a")));
    let recipients: Recipients = [("a".to_string(), vec![Value::Int(4)])].into_iter().collect();
    let outputs = template
        .render_batch(&Map::new(), &recipients)
        .expect("Should render batch");
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].starts_with("[Liquid error: "));
    assert!(outputs[0].ends_with(']'));
}

#[test]
fn test_recipient_errors_propagate_when_strict() {
    let config = EngineConfig::new().with_strict(true);
    let template = Template::parse_with("{{ a | bogus }}", &TagRegistry::default(), config)
        .expect("Should parse")
        .with_separation(Some(separate("a")));
    let recipients: Recipients = [("a".to_string(), vec![Value::Int(1), Value::Int(2)])]
        .into_iter()
        .collect();
    let err = template.render_batch(&Map::new(), &recipients).unwrap_err();
    assert!(matches!(err, SkeletonError::Render { index: 0, .. }));
}

/// Render every recipient through the skeleton and directly, and require the
/// same output
fn assert_batch_matches_direct(source: &str, pattern: &str, people: &[&[(&str, Value)]]) {
    let template = Template::parse(source)
        .expect("Should parse")
        .with_separation(Some(separate(pattern)));

    let mut recipients = Recipients::new();
    for person in people {
        for (name, value) in person.iter() {
            recipients
                .entry(name.to_string())
                .or_default()
                .push(value.clone());
        }
    }

    let batch = template
        .render_batch(&Map::new(), &recipients)
        .expect("Should render batch");
    let direct: Vec<String> = people
        .iter()
        .map(|person| template.render(&map(person)).expect("Should render"))
        .collect();
    assert_eq!(batch, direct, "source: {}", source);
}

#[test]
fn test_break_inside_deferred_branch_stops_the_rest() {
    let source = "{% if a %}X{% break %}Y{% else %}Z{% endif %}W";
    assert_batch_matches_direct(
        source,
        "^a$",
        &[&[("a", Value::Bool(true))], &[("a", Value::Bool(false))]],
    );

    let template = Template::parse(source)
        .expect("Should parse")
        .with_separation(Some(separate("^a$")));
    let recipients: Recipients = [("a".to_string(), vec![Value::Bool(true), Value::Bool(false)])]
        .into_iter()
        .collect();
    let outputs = template
        .render_batch(&Map::new(), &recipients)
        .expect("Should render batch");
    assert_eq!(outputs, vec!["X", "ZW"]);
}

#[test]
fn test_nested_interrupt_stops_enclosing_content() {
    assert_batch_matches_direct(
        "A{% if a %}B{% if b %}C{% continue %}D{% endif %}E{% endif %}F{{ b }}",
        "^(a|b)$",
        &[
            &[("a", Value::Bool(true)), ("b", Value::Bool(true))],
            &[("a", Value::Bool(true)), ("b", Value::Bool(false))],
            &[("a", Value::Bool(false)), ("b", Value::Bool(true))],
        ],
    );
}

#[test]
fn test_branches_after_else_never_render() {
    let source = "{% if a == 1 %}X{% else %}E{% elsif a == 2 %}Y{% endif %}";
    assert_batch_matches_direct(
        source,
        "^a$",
        &[&[("a", Value::Int(1))], &[("a", Value::Int(2))], &[("a", Value::Int(3))]],
    );
    assert_eq!(
        skeleton_render(source, &[], &[("a", Value::Int(2))], Some("^a$")),
        "E"
    );
}

#[test]
fn test_failing_predicate_is_contained_once() {
    let source = "A{% if a > 1 %}B{% else %}C{% endif %}D";
    assert_batch_matches_direct(
        source,
        "^a$",
        &[&[("a", Value::from("x"))], &[("a", Value::Int(2))], &[("a", Value::Int(0))]],
    );
    insta::assert_snapshot!(
        skeleton_render(source, &[], &[("a", Value::from("x"))], Some("^a$")),
        @r#"ALiquid error: comparison of "x" with 1 failedD"#
    );
}

#[test]
fn test_failing_elsif_predicate_is_contained_once() {
    assert_batch_matches_direct(
        "<{% if a == 'y' %}Y{% elsif a > 1 %}B{% elsif a < 0 %}N{% else %}C{% endif %}>",
        "^a$",
        &[
            &[("a", Value::from("x"))],
            &[("a", Value::from("y"))],
            &[("a", Value::Int(5))],
            &[("a", Value::Int(-5))],
            &[("a", Value::Int(0))],
        ],
    );
}

#[test]
fn test_failing_nested_predicate_is_contained_once() {
    let people: &[&[(&str, Value)]] = &[
        &[("a", Value::from("x")), ("b", Value::Bool(true))],
        &[("a", Value::from("x")), ("b", Value::Bool(false))],
        &[("a", Value::Int(3)), ("b", Value::Bool(true))],
    ];
    assert_batch_matches_direct(
        "A{% if b %}B{% if a > 1 %}C{% else %}E{% endif %}F{% else %}G{% endif %}H",
        "^(a|b)$",
        people,
    );
    // the outer predicate fails, so its whole block is one error
    assert_batch_matches_direct(
        "A{% if a > 1 %}B{% if b %}C{% else %}E{% endif %}F{% else %}G{% endif %}H",
        "^(a|b)$",
        people,
    );
}

#[test]
fn test_recipient_value_with_reserved_prefix_rejected() {
    let template = Template::parse("Hi {{ name }}")
        .expect("Should parse")
        .with_separation(Some(separate("^name$")));
    let recipients: Recipients = [(
        "name".to_string(),
        vec![Value::from("Ann"), Value::from("\u{E000}1\u{E001}")],
    )]
    .into_iter()
    .collect();
    let err = template.render_batch(&Map::new(), &recipients).unwrap_err();
    assert!(matches!(err, SkeletonError::ReservedText { .. }));
}
