use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use verse_core::{
    Attrs, Delta, Document, DocumentConfig, DocumentValue, LineBlock, NodeRegistry, NodeRole,
    NodeSpec, Scope, TreeError, VERSE_BLOCK_NAME, VerseBlock,
};

fn attrs(name: &str, value: serde_json::Value) -> Attrs {
    Attrs::from([(name.to_string(), value)])
}

fn mixed_delta() -> Delta {
    Delta::new()
        .insert("Intro\n")
        .insert("roses")
        .insert_with("\n", attrs(VERSE_BLOCK_NAME, json!(true)))
        .insert("violets")
        .insert_with("\n", attrs(VERSE_BLOCK_NAME, json!(true)))
        .insert("End")
        .insert_with("\n", attrs("header", json!(1)))
}

#[test]
fn new_document_holds_one_empty_paragraph() {
    let doc = Document::standard();

    let blocks = doc.blocks().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(doc.tree().block_name(blocks[0]), Some("paragraph"));
    assert_eq!(doc.length().unwrap(), 1);
    assert_eq!(doc.contents().unwrap(), Delta::new().insert("\n"));
    assert_eq!(doc.config().max_optimize_passes, 100);
}

#[test]
fn contents_round_trip_mixed_blocks() {
    let delta = mixed_delta();
    let doc = Document::from_delta(NodeRegistry::standard(), &delta).unwrap();

    let names: Vec<_> = doc
        .blocks()
        .unwrap()
        .into_iter()
        .map(|b| doc.tree().block_name(b).unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["paragraph", "verse", "header"]);
    assert_eq!(doc.contents().unwrap(), delta);
    assert_eq!(doc.text().unwrap(), "Intro\nroses\nviolets\nEnd\n");
    assert_eq!(doc.length().unwrap(), 24);
    assert_eq!(doc.line_breaks().unwrap(), vec![5, 11, 19, 23]);
}

#[test]
fn set_contents_replaces_everything() {
    let mut doc = Document::from_delta(NodeRegistry::standard(), &mixed_delta()).unwrap();
    let old_blocks = doc.blocks().unwrap();

    doc.set_contents(&Delta::new().insert("fresh\n")).unwrap();

    let blocks = doc.blocks().unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(old_blocks.iter().all(|b| !doc.tree().contains(*b)));
    assert_eq!(doc.text().unwrap(), "fresh\n");
}

#[test]
fn bold_is_applied_and_cleared() {
    let mut doc =
        Document::from_delta(NodeRegistry::standard(), &Delta::new().insert("hello\n")).unwrap();

    doc.format_text(1, 3, "bold", &json!(true)).unwrap();
    assert_eq!(
        doc.contents().unwrap(),
        Delta::new()
            .insert("h")
            .insert_with("ell", attrs("bold", json!(true)))
            .insert("o\n")
    );

    doc.format_text(1, 3, "bold", &json!(false)).unwrap();
    assert_eq!(doc.contents().unwrap(), Delta::new().insert("hello\n"));
    let block = doc.blocks().unwrap()[0];
    assert_eq!(doc.tree().children(block).unwrap().len(), 1);
}

#[test]
fn nested_inline_formats_reach_the_delta() {
    let input = Delta::new()
        .insert("a")
        .insert_with(
            "b",
            Attrs::from([
                ("bold".to_string(), json!(true)),
                ("italic".to_string(), json!(true)),
            ]),
        )
        .insert("c\n");
    let doc = Document::from_delta(NodeRegistry::standard(), &input).unwrap();

    assert_eq!(doc.contents().unwrap(), input);
}

#[test]
fn breaks_split_single_line_blocks() {
    let mut doc =
        Document::from_delta(NodeRegistry::standard(), &Delta::new().insert("ab\n")).unwrap();

    doc.insert_text(1, "X\nY").unwrap();

    let blocks = doc.blocks().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(doc.tree().text_content(blocks[0]).unwrap(), "aX");
    assert_eq!(doc.tree().text_content(blocks[1]).unwrap(), "Yb");
    assert_eq!(doc.text().unwrap(), "aX\nYb\n");
}

#[test]
fn split_keeps_block_type_and_attributes() {
    let mut header = attrs("header", json!(2));
    header.insert("align".to_string(), json!("right"));
    let mut doc = Document::from_delta(
        NodeRegistry::standard(),
        &Delta::new().insert("ab").insert_with("\n", header.clone()),
    )
    .unwrap();

    doc.insert_text(1, "\n").unwrap();

    assert_eq!(
        doc.contents().unwrap(),
        Delta::new()
            .insert("a")
            .insert_with("\n", header.clone())
            .insert("b")
            .insert_with("\n", header)
    );
}

#[test]
fn embeds_land_inside_single_line_blocks() {
    let mut doc =
        Document::from_delta(NodeRegistry::standard(), &Delta::new().insert("ab\n")).unwrap();

    doc.insert_embed(1, "image", json!("cover.png")).unwrap();

    assert_eq!(
        doc.contents().unwrap(),
        Delta::new()
            .insert("a")
            .insert_embed(attrs("image", json!("cover.png")), None)
            .insert("b\n")
    );
    assert_eq!(doc.length().unwrap(), 4);
    assert_eq!(doc.text().unwrap(), "ab\n");
}

#[test]
fn formatted_embeds_round_trip_in_paragraphs() {
    let input = Delta::new()
        .insert("a")
        .insert_embed(
            attrs("image", json!("cover.png")),
            Some(attrs("bold", json!(true))),
        )
        .insert("\n");
    let doc = Document::from_delta(NodeRegistry::standard(), &input).unwrap();

    assert_eq!(doc.contents().unwrap(), input);
    assert_eq!(doc.length().unwrap(), 3);
}

#[test]
fn unregistered_formats_are_dropped_on_load() {
    let input = Delta::new()
        .insert_with("a", attrs("strike", json!(true)))
        .insert_embed(attrs("video", json!("clip.mp4")), None)
        .insert_with("\n", attrs("list", json!("bullet")));
    let doc = Document::from_delta(NodeRegistry::standard(), &input).unwrap();

    assert_eq!(doc.contents().unwrap(), Delta::new().insert("a\n"));
}

#[test]
fn unregistered_block_types_are_ignored() {
    let mut registry = NodeRegistry::new();
    registry
        .register_block(Arc::new(LineBlock::new("paragraph", "p")))
        .unwrap();
    registry.register_block(Arc::new(VerseBlock)).unwrap();
    let input = Delta::new()
        .insert("x")
        .insert_with("\n", attrs("header", json!(1)));
    let mut doc = Document::from_delta(registry, &input).unwrap();
    assert_eq!(doc.contents().unwrap(), Delta::new().insert("x\n"));

    let revision = doc.tree().revision();
    doc.format_text(0, 2, "header", &json!(1)).unwrap();

    assert_eq!(doc.tree().revision(), revision);
}

#[test]
fn registry_queries_respect_scope() {
    let registry = NodeRegistry::standard();

    assert!(registry.query(VERSE_BLOCK_NAME, Scope::Block).is_some());
    assert!(registry.query("align", Scope::Block).is_some());
    assert!(registry.query("bold", Scope::Block).is_none());
    assert!(registry.query("bold", Scope::Inline).is_some());
    assert!(registry.query("missing", Scope::Inline).is_none());
    assert!(registry.is_inline_format("italic"));
    assert!(!registry.is_inline_format("image"));
    assert_eq!(
        registry.spec("image").map(|spec| spec.role),
        Some(NodeRole::Embed)
    );
    assert!(registry.variant(VERSE_BLOCK_NAME).is_some());
    assert!(registry.variant("align").is_none());
}

#[test]
fn registering_a_name_twice_fails() {
    let mut registry = NodeRegistry::standard();

    let err = registry
        .register(NodeSpec::inline("bold", "b"))
        .unwrap_err();
    assert_eq!(err, TreeError::DuplicateType("bold".to_string()));

    let err = registry.register_block(Arc::new(VerseBlock)).unwrap_err();
    assert_eq!(err, TreeError::DuplicateType(VERSE_BLOCK_NAME.to_string()));
}

#[test]
fn custom_default_block() {
    let mut registry = NodeRegistry::standard();
    registry.set_default_block("blockquote");

    let doc = Document::new(registry, DocumentConfig::default()).unwrap();

    let blocks = doc.blocks().unwrap();
    assert_eq!(doc.tree().block_name(blocks[0]), Some("blockquote"));
    assert_eq!(doc.contents().unwrap(), Delta::new().insert("\n"));
}

#[test]
fn optimize_pass_limit_is_enforced() {
    let config = DocumentConfig {
        max_optimize_passes: 1,
    };

    let result = Document::new(NodeRegistry::standard(), config);

    assert!(matches!(result, Err(TreeError::OptimizeDidNotConverge(1))));
}

#[test]
fn config_defaults_fill_missing_values() {
    let config: DocumentConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.with_defaults().max_optimize_passes, 100);

    let config: DocumentConfig =
        serde_json::from_value(json!({"max_optimize_passes": 7})).unwrap();
    assert_eq!(config.with_defaults().max_optimize_passes, 7);
}

#[test]
fn document_value_round_trips_through_json() {
    let doc = Document::from_delta(NodeRegistry::standard(), &mixed_delta()).unwrap();

    let value = DocumentValue::from_document(&doc).unwrap();
    let json = value.to_json_pretty().unwrap();
    let parsed = DocumentValue::from_json_str(&json).unwrap();
    assert_eq!(parsed, value);
    assert_eq!(parsed.schema, "verse-core");
    assert_eq!(parsed.version, 1);

    let restored = Document::from_delta(NodeRegistry::standard(), &parsed.into_delta()).unwrap();
    assert_eq!(restored.contents().unwrap(), doc.contents().unwrap());
}

#[test]
fn document_value_fills_envelope_defaults() {
    let parsed = DocumentValue::from_json_str(
        r#"{"delta": {"ops": [{"insert": "a"}, {"insert": "\n", "attributes": {"verse": true}}]}}"#,
    )
    .unwrap();

    assert_eq!(parsed.schema, "verse-core");
    assert_eq!(parsed.version, 1);
    assert_eq!(
        parsed.into_delta(),
        Delta::new()
            .insert("a")
            .insert_with("\n", attrs(VERSE_BLOCK_NAME, json!(true)))
    );
}
