//! Parses Python-style dictionary literals and turns them into [`Value`]s.
//!
//! Run with `cargo run --example dict`.

use larch::{print_error, Larch, ParserOptions, Transformer, Value};

const GRAMMAR: &str = include_str!("dict.lark");

const SNIPPETS: [&str; 2] = [
    r#"{"one": 1, "two": 2}"#,
    r#"{
        "key_1": "value",
        "key_2": [1, 2, 3,],
        "key_3": {1:1, 2:2, 3:3},
    }"#,
];

fn dict_transformer<'a>() -> Transformer<'a, Value, String> {
    Transformer::new()
        .rule("string", |mut children| match children.pop() {
            Some(Value::Token(text)) => Ok(Value::String(text[1..text.len() - 1].to_string())),
            other => Err(format!("string expects a token, got {:?}", other)),
        })
        .rule("number", |mut children| {
            let text = match children.pop() {
                Some(Value::Token(text)) => text,
                other => return Err(format!("number expects a token, got {:?}", other)),
            };
            match text.parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| format!("bad number {}: {}", text, e)),
            }
        })
        .rule("list", |children| Ok(Value::List(children)))
        .rule("dict_item", |children| Ok(Value::List(children)))
        .rule("dict", |children| {
            let mut entries = Vec::with_capacity(children.len());
            for item in children {
                match item.into_list().as_deref() {
                    Some([key, value]) => entries.push((key.clone(), value.clone())),
                    _ => return Err("dict items hold a key and a value".to_string()),
                }
            }
            Ok(Value::Map(entries))
        })
}

fn main() {
    let larch = match Larch::new(GRAMMAR, ParserOptions::default()) {
        Ok(larch) => larch,
        Err(e) => {
            print_error(e);
            std::process::exit(1);
        }
    };
    let transformer = dict_transformer();

    for snippet in SNIPPETS {
        let tree = match larch.parse(snippet) {
            Ok(tree) => tree,
            Err(e) => {
                print_error(e);
                std::process::exit(1);
            }
        };
        println!("{}", tree.pretty_print());
        match transformer.transform(&tree) {
            Ok(value) => println!("{}\n", value),
            Err(e) => {
                eprintln!("transform failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}
