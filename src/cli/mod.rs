//! The larch command-line interface.
//!
//! `parse` prints a tree (or its JSON forms), `lex` prints tokens and `check`
//! compiles a grammar and reports its table sizes. Every failure goes through
//! [`print_error`] and exits with status 1.

use std::io::Read;
use std::path::Path;
use std::{fs, io, process};

use clap::Parser as _;
use tracing::debug;

use crate::cli::args::{Command, LarchArgs, OutputFormat};
use crate::engine::Larch;
use crate::errors::{print_error, LarchError};
use crate::grammar::compile_grammar;
use crate::options::{LexerMode, ParserOptions};
use crate::transform::Transformer;
use crate::value::Value;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = LarchArgs::parse();

    let result = match args.command {
        Command::Parse {
            grammar,
            start,
            lexer,
            config,
            keep_all_tokens,
            format,
            input,
        } => {
            let overrides = Overrides {
                start,
                lexer,
                keep_all_tokens,
            };
            handle_parse(&grammar, config.as_deref(), overrides, format, input.as_deref())
        }
        Command::Lex { grammar, input } => handle_lex(&grammar, input.as_deref()),
        Command::Check { grammar, start } => handle_check(&grammar, start),
    };

    if let Err(e) = result {
        print_error(e);
        process::exit(1);
    }
}

// ============================================================================
// SUBCOMMAND HANDLERS
// ============================================================================

/// Command-line flags that take precedence over the config file.
struct Overrides {
    start: Option<String>,
    lexer: Option<LexerMode>,
    keep_all_tokens: bool,
}

fn handle_parse(
    grammar_path: &Path,
    config: Option<&Path>,
    overrides: Overrides,
    format: OutputFormat,
    input: Option<&Path>,
) -> Result<(), LarchError> {
    let mut options = match config {
        Some(path) => ParserOptions::from_yaml_str(&read_file(path)?)?,
        None => ParserOptions::default(),
    };
    if let Some(start) = overrides.start {
        options = options.with_start(start);
    }
    if let Some(lexer) = overrides.lexer {
        options = options.with_lexer(lexer);
    }
    if overrides.keep_all_tokens {
        options = options.with_keep_all_tokens(true);
    }
    debug!(?options, "parser options");

    let larch = Larch::new(&read_file(grammar_path)?, options)?;
    let text = read_input(input)?;
    let tree = larch.parse(&text)?;

    let written = match format {
        OutputFormat::Tree => output::print_tree(tree.root()),
        OutputFormat::Json => output::print_tree_json(tree.root()),
        OutputFormat::Values => {
            let value = Transformer::<Value>::new()
                .transform(&tree)
                .unwrap_or_else(|never| match never {});
            output::print_json(&value)
        }
    };
    written.map_err(|e| LarchError::io("cannot write output", e))
}

fn handle_lex(grammar_path: &Path, input: Option<&Path>) -> Result<(), LarchError> {
    let grammar = compile_grammar(&read_file(grammar_path)?)?;
    let text = read_input(input)?;

    let mut out = output::token_stream();
    for token in grammar.tokenize(&text) {
        let token = token.map_err(|e| LarchError::from(e.with_source("input", &text)))?;
        output::print_token(&mut out, &token)
            .map_err(|e| LarchError::io("cannot write output", e))?;
    }
    Ok(())
}

fn handle_check(grammar_path: &Path, starts: Vec<String>) -> Result<(), LarchError> {
    let mut options = ParserOptions::default();
    if !starts.is_empty() {
        options = options.with_starts(starts);
    }
    let larch = Larch::new(&read_file(grammar_path)?, options)?;
    output::print_summary(larch.grammar(), larch.parsers())
        .map_err(|e| LarchError::io("cannot write output", e))
}

// ============================================================================
// INPUT HELPERS
// ============================================================================

fn read_file(path: &Path) -> Result<String, LarchError> {
    fs::read_to_string(path)
        .map_err(|e| LarchError::io(format!("cannot read '{}'", path.display()), e))
}

/// Reads `path`, or stdin when no path was given.
fn read_input(path: Option<&Path>) -> Result<String, LarchError> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| LarchError::io("cannot read stdin", e))?;
            Ok(text)
        }
    }
}
