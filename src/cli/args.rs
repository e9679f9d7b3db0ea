//! Command-line arguments and subcommands for the larch CLI.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::options::LexerMode;

#[derive(Debug, Parser)]
#[command(
    name = "larch",
    version,
    about = "Compile Lark-style grammars and parse text with LALR(1) tables."
)]
pub struct LarchArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a file and print its parse tree.
    Parse {
        /// The grammar file.
        #[arg(short, long, required = true)]
        grammar: PathBuf,
        /// Start rule; overrides the config file.
        #[arg(short, long)]
        start: Option<String>,
        /// Lexer mode; overrides the config file.
        #[arg(long, value_enum)]
        lexer: Option<LexerMode>,
        /// YAML file with parser options.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Keep anonymous literal tokens in the tree.
        #[arg(long)]
        keep_all_tokens: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Tree)]
        format: OutputFormat,
        /// The input file. Reads stdin when omitted.
        input: Option<PathBuf>,
    },
    /// Print the tokens of a file, without parsing.
    Lex {
        #[arg(short, long, required = true)]
        grammar: PathBuf,
        /// The input file. Reads stdin when omitted.
        input: Option<PathBuf>,
    },
    /// Compile a grammar, build its tables and report a summary.
    Check {
        /// The grammar file.
        #[arg(required = true)]
        grammar: PathBuf,
        /// Start rules to build tables for (repeatable).
        #[arg(short, long)]
        start: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree, one node per line.
    Tree,
    /// The tree as JSON.
    Json,
    /// The default value transform, as JSON.
    Values,
}
