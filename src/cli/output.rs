//! User-facing output for the CLI: colored trees, token listings and JSON.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::grammar::Grammar;
use crate::lexer::Token;
use crate::parser::Parser;
use crate::tree::ParseNode;

fn stdout() -> StandardStream {
    let choice = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

// ============================================================================
// TREES
// ============================================================================

/// Prints `root` with rule names in bold blue and terminal names in yellow.
pub fn print_tree(root: &ParseNode) -> io::Result<()> {
    let mut out = stdout();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        write!(out, "{}", "  ".repeat(depth))?;
        match node {
            ParseNode::Tree(tree) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
                write!(out, "{}", tree.rule())?;
                out.reset()?;
                writeln!(out)?;
                stack.extend(tree.children.iter().rev().map(|c| (c, depth + 1)));
            }
            ParseNode::Leaf(token) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                write!(out, "{}", token.terminal())?;
                out.reset()?;
                writeln!(out, " {:?}", token.text())?;
            }
        }
    }
    out.flush()
}

/// Prints `root` as JSON without recursing, so deep trees are safe.
pub fn print_tree_json(root: &ParseNode) -> io::Result<()> {
    let mut out = io::BufWriter::new(stdout());
    root.write_json(&mut out)?;
    out.flush()
}

pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let mut out = stdout();
    writeln!(out, "{}", json)?;
    out.flush()
}

// ============================================================================
// TOKENS
// ============================================================================

/// One token per line: `line:column NAME "text"`.
pub fn print_token(out: &mut StandardStream, token: &Token) -> io::Result<()> {
    write!(out, "{}:{}\t", token.start.line, token.start.column)?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    write!(out, "{}", token.terminal())?;
    out.reset()?;
    writeln!(out, " {:?}", token.text())
}

pub fn token_stream() -> StandardStream {
    stdout()
}

// ============================================================================
// GRAMMAR SUMMARY
// ============================================================================

pub fn print_summary(grammar: &Grammar, parsers: &[Parser]) -> io::Result<()> {
    let mut out = stdout();
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(out, "grammar ok")?;
    out.reset()?;
    writeln!(
        out,
        ": {} rules, {} terminals, {} productions",
        grammar.rules().len(),
        grammar.terminals().len(),
        grammar.productions().len()
    )?;
    for parser in parsers {
        writeln!(
            out,
            "  start '{}': {} states",
            parser.start(),
            parser.state_count()
        )?;
    }
    out.flush()
}
