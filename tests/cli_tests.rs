// CLI behaviour: output formats, exit codes and miette diagnostics.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn larch() -> Command {
    Command::cargo_bin("larch").unwrap()
}

const GRAMMAR: &str = "demos/dict.lark";
const NESTED: &str = "tests/fixtures/nested.txt";

#[test]
fn cli_parse_prints_tree() {
    larch()
        .arg("parse")
        .arg("--grammar")
        .arg(path(GRAMMAR))
        .arg(path(NESTED))
        .assert()
        .success()
        .stdout(contains("dict\n  dict_item\n    string\n      ESCAPED_STRING"))
        .stdout(contains("SIGNED_NUMBER \"3\""));
}

#[test]
fn cli_parse_reads_stdin() {
    larch()
        .args(["parse", "-g"])
        .arg(path(GRAMMAR))
        .write_stdin("[1, 2]")
        .assert()
        .success()
        .stdout(contains("list\n  number\n    SIGNED_NUMBER \"1\""));
}

#[test]
fn cli_parse_json_formats() {
    larch()
        .args(["parse", "--format", "json", "-g"])
        .arg(path(GRAMMAR))
        .write_stdin("[1]")
        .assert()
        .success()
        .stdout(contains("\"kind\": \"Tree\"").and(contains("\"rule\": \"list\"")));

    larch()
        .args(["parse", "--format", "values", "-g"])
        .arg(path(GRAMMAR))
        .write_stdin("[1, 2]")
        .assert()
        .success()
        .stdout(contains("\"1\"").and(contains("\"2\"")));
}

#[test]
fn cli_parse_uses_config_file() {
    larch()
        .arg("parse")
        .arg("-g")
        .arg(path(GRAMMAR))
        .arg("--config")
        .arg(path("tests/fixtures/value_start.yaml"))
        .write_stdin("[1]")
        .assert()
        .success()
        .stdout(contains("list"));
}

#[test]
fn cli_rejects_unknown_config_fields() {
    larch()
        .arg("parse")
        .arg("-g")
        .arg(path(GRAMMAR))
        .arg("--config")
        .arg(path("tests/fixtures/bad_options.yaml"))
        .write_stdin("[1]")
        .assert()
        .failure()
        .stderr(contains("larch::config"));
}

#[test]
fn cli_lex_prints_tokens() {
    larch()
        .arg("lex")
        .arg("--grammar")
        .arg(path(GRAMMAR))
        .write_stdin("{\"a\": 1}")
        .assert()
        .success()
        .stdout(contains("1:1\tLBRACE \"{\""))
        .stdout(contains("1:7\tSIGNED_NUMBER \"1\""));
}

#[test]
fn cli_lex_needs_no_start_rule() {
    larch()
        .arg("lex")
        .arg("--grammar")
        .arg(path("tests/fixtures/no_start.lark"))
        .write_stdin("a a")
        .assert()
        .success()
        .stdout(contains("1:1\tA \"a\""))
        .stdout(contains("1:3\tA \"a\""));
}

#[test]
fn cli_check_summarizes_grammar() {
    larch()
        .arg("check")
        .arg(path(GRAMMAR))
        .args(["--start", "start", "--start", "value"])
        .assert()
        .success()
        .stdout(contains("grammar ok"))
        .stdout(contains("start 'start'").and(contains("start 'value'")));
}

#[test]
fn cli_reports_parse_errors() {
    larch()
        .args(["parse", "-g"])
        .arg(path(GRAMMAR))
        .write_stdin("{\"a\" 1}")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("larch::parse::unexpected"));
}

#[test]
fn cli_reports_lex_errors() {
    larch()
        .args(["parse", "-g"])
        .arg(path(GRAMMAR))
        .write_stdin("{\"a\": @}")
        .assert()
        .failure()
        .stderr(contains("larch::lex::unmatched_input"));
}

#[test]
fn cli_reports_grammar_errors() {
    larch()
        .arg("check")
        .arg(path("tests/fixtures/undefined.lark"))
        .assert()
        .failure()
        .stderr(contains("larch::grammar::undefined_symbol").and(contains("missing")));
}

#[test]
fn cli_reports_missing_files() {
    larch()
        .arg("check")
        .arg(path("tests/fixtures/no_such_grammar.lark"))
        .assert()
        .failure()
        .stderr(contains("cannot read"));
}
