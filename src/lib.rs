//! Larch compiles Lark-style grammars into LALR(1) parsers.
//!
//! A grammar text goes through [`compile_grammar`] into a [`Grammar`]; a
//! [`Parser`] (or the [`Larch`] front object, one parser per start rule)
//! turns input text into a [`ParseTree`], and a [`Transformer`] folds that
//! tree into whatever value the caller wants.

pub mod cli;
pub mod engine;
pub mod errors;
pub mod grammar;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod transform;
pub mod tree;
pub mod value;

pub use crate::engine::Larch;
pub use crate::errors::{
    print_error, ErrorType, GrammarError, GrammarErrorKind, LarchError, LexError, ParseError,
};
pub use crate::grammar::{compile_grammar, Grammar};
pub use crate::lexer::{Position, Span, Token};
pub use crate::options::{LexerMode, ParserOptions};
pub use crate::parser::Parser;
pub use crate::transform::{Transformer, TreeValue};
pub use crate::tree::{ParseNode, ParseTree, Tree};
pub use crate::value::Value;
