// tests/lexer_tests.rs

use larch::lexer::{Lexer, Position};
use larch::{compile_grammar, Grammar, Larch, ParserOptions};

fn lex(grammar: &Grammar, text: &str) -> Vec<(String, String)> {
    grammar
        .tokenize(text)
        .map(|t| {
            let t = t.unwrap();
            (t.terminal().to_string(), t.text().to_string())
        })
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn test_declaration_order_breaks_equal_matches() {
    let grammar =
        compile_grammar("start: (IF | NAME)+\nIF: \"if\"\nNAME: /[a-z]+/\n%ignore \" \"\n").unwrap();
    assert_eq!(
        lex(&grammar, "if iffy"),
        pairs(&[("IF", "if"), ("NAME", "iffy")])
    );
}

#[test]
fn test_priority_beats_declaration_order() {
    let grammar =
        compile_grammar("start: (IF | NAME)+\nIF: \"if\"\nNAME.1: /[a-z]+/\n%ignore \" \"\n").unwrap();
    assert_eq!(
        lex(&grammar, "if iffy"),
        pairs(&[("NAME", "if"), ("NAME", "iffy")])
    );
}

#[test]
fn test_inline_keyword_beats_named_regex() {
    let grammar = compile_grammar(
        "start: stmt+\nstmt: \"if\" NAME | NAME\nNAME: /[a-z]+/\n%ignore \" \"\n",
    )
    .unwrap();
    assert_eq!(
        lex(&grammar, "if x iffy"),
        pairs(&[("IF", "if"), ("NAME", "x"), ("NAME", "iffy")])
    );
}

#[test]
fn test_ignored_terminals_are_skipped() {
    let grammar = compile_grammar(
        "start: NUMBER+\n%import common.NUMBER\n%import common.WS\n%import common.SH_COMMENT\n%ignore WS\n%ignore SH_COMMENT\n",
    )
    .unwrap();
    assert_eq!(
        lex(&grammar, "1 # one\n 2.5\t3"),
        pairs(&[("NUMBER", "1"), ("NUMBER", "2.5"), ("NUMBER", "3")])
    );
}

#[test]
fn test_case_insensitive_literals() {
    let grammar = compile_grammar("start: \"select\"i\n").unwrap();
    assert_eq!(lex(&grammar, "SeLeCt"), pairs(&[("SELECT", "SeLeCt")]));
}

#[test]
fn test_tokens_carry_positions() {
    let grammar =
        compile_grammar("start: WORD+\n%import common.WORD\n%import common.WS\n%ignore WS\n").unwrap();
    let tokens: Vec<_> = Lexer::new(&grammar)
        .tokenize("alpha\n  beta")
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(tokens.len(), 2);
    assert_eq!(
        tokens[0].start,
        Position {
            offset: 0,
            line: 1,
            column: 1
        }
    );
    assert_eq!(tokens[0].end.column, 6);
    assert_eq!(
        tokens[1].start,
        Position {
            offset: 8,
            line: 2,
            column: 3
        }
    );
    assert_eq!((tokens[1].span.start, tokens[1].span.end), (8, 12));
}

#[test]
fn test_lex_error_stops_the_stream() {
    let grammar = compile_grammar("start: A+\nA: \"a\"\n").unwrap();
    let mut tokens = grammar.tokenize("aa?a");

    assert_eq!(tokens.next().unwrap().unwrap().text(), "a");
    assert_eq!(tokens.next().unwrap().unwrap().text(), "a");
    let err = tokens.next().unwrap().unwrap_err();
    assert_eq!(err.offset(), 2);
    assert_eq!(err.snippet, "?a");
    assert!(err.expected.is_empty());
    assert!(tokens.next().is_none());
}

#[test]
fn test_each_tokenize_call_starts_fresh() {
    let larch = Larch::new("start: A+\nA: \"a\"\n", ParserOptions::default()).unwrap();
    assert_eq!(larch.lex("aaa").count(), 3);
    assert_eq!(larch.lex("aaa").count(), 3);
}
