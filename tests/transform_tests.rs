// tests/transform_tests.rs

use larch::{Larch, ParseNode, ParserOptions, Token, Transformer, TreeValue, Value};

const NESTED: &str = include_str!("../demos/dict.lark");

/// Converts the demo grammar's trees into plain values.
fn dict_transformer<'a>() -> Transformer<'a, Value, String> {
    Transformer::new()
        .rule("string", |children| match children.as_slice() {
            [Value::Token(text)] => Ok(Value::from(text.trim_matches('"'))),
            _ => Err("string expects one token".to_string()),
        })
        .rule("number", |children| match children.as_slice() {
            [Value::Token(text)] => text
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| text.parse::<f64>().map(Value::Float))
                .map_err(|e| e.to_string()),
            _ => Err("number expects one token".to_string()),
        })
        .rule("list", |children| Ok(Value::List(children)))
        .rule("dict_item", |children| Ok(Value::List(children)))
        .rule("dict", |children| {
            children
                .into_iter()
                .map(|item| match item {
                    Value::List(mut kv) if kv.len() == 2 => {
                        let value = kv.pop().unwrap_or_default();
                        let key = kv.pop().unwrap_or_default();
                        Ok((key, value))
                    }
                    other => Err(format!("bad dict item {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Map)
        })
}

#[test]
fn test_nested_snippet_transforms_to_values() {
    let text = "{\n    \"key_1\": \"value\",\n    \"key_2\": [1, 2, 3,],\n    \"key_3\": {1:1, 2:2, 3:3},\n}";
    let larch = Larch::new(NESTED, ParserOptions::default()).unwrap();
    let tree = larch.parse(text).unwrap();
    let value = dict_transformer().transform(&tree).unwrap();

    let expected = Value::Map(vec![
        (Value::from("key_1"), Value::from("value")),
        (
            Value::from("key_2"),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ),
        (
            Value::from("key_3"),
            Value::Map(vec![
                (Value::Int(1), Value::Int(1)),
                (Value::Int(2), Value::Int(2)),
                (Value::Int(3), Value::Int(3)),
            ]),
        ),
    ]);
    assert_eq!(value, expected);
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"key_1":"value","key_2":[1,2,3],"key_3":{"1":1,"2":2,"3":3}}"#
    );
}

#[test]
fn test_floats_and_signs() {
    let larch = Larch::new(NESTED, ParserOptions::default()).unwrap();
    let tree = larch.parse("[-1, +2.5, 1e3]").unwrap();
    let value = dict_transformer().transform(&tree).unwrap();
    assert_eq!(
        value,
        Value::List(vec![Value::Int(-1), Value::Float(2.5), Value::Float(1000.0)])
    );
}

#[test]
fn test_reducer_error_stops_the_walk() {
    let larch = Larch::new(NESTED, ParserOptions::default()).unwrap();
    let tree = larch.parse("[1, 99999999999999999999]").unwrap();
    let transformer = Transformer::<Value, String>::new().rule("number", |children| {
        match children.first().and_then(Value::as_str) {
            Some(text) => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("out of range: {}", text)),
            None => Err("empty number".to_string()),
        }
    });
    assert_eq!(
        transformer.transform(&tree),
        Err("out of range: 99999999999999999999".to_string())
    );
}

/// Shape of a tree, for comparing against an identity transform.
#[derive(Debug, PartialEq)]
enum Shape {
    Leaf(String),
    Node(String, Vec<Shape>),
}

impl TreeValue for Shape {
    fn from_token(token: &Token) -> Self {
        Shape::Leaf(token.text().to_string())
    }

    fn from_children(rule: &str, children: Vec<Self>) -> Self {
        Shape::Node(rule.to_string(), children)
    }
}

fn shape_of(node: &ParseNode) -> Shape {
    match node {
        ParseNode::Leaf(token) => Shape::Leaf(token.text().to_string()),
        ParseNode::Tree(tree) => Shape::Node(
            tree.rule().to_string(),
            tree.children.iter().map(shape_of).collect(),
        ),
    }
}

#[test]
fn test_identity_transform_mirrors_tree() {
    let larch = Larch::new(NESTED, ParserOptions::default()).unwrap();
    let tree = larch.parse(r#"{"a": [1, {"b": []}], "c": "d"}"#).unwrap();
    let shape = Transformer::<Shape>::new().transform(&tree).unwrap();
    assert_eq!(shape, shape_of(tree.root()));
}

#[test]
fn test_default_value_transform_keeps_leaves_in_order() {
    let larch = Larch::new(NESTED, ParserOptions::default()).unwrap();
    let tree = larch.parse("[1, 2]").unwrap();
    let value = Transformer::<Value>::new().transform(&tree).unwrap();
    assert_eq!(
        value,
        Value::List(vec![
            Value::List(vec![Value::Token("1".into())]),
            Value::List(vec![Value::Token("2".into())]),
        ])
    );
}
