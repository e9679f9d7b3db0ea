//! The front object: one grammar, one parser per start rule.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{LarchError, LexError};
use crate::grammar::{compile_grammar, Grammar};
use crate::lexer::Token;
use crate::options::ParserOptions;
use crate::parser::Parser;
use crate::tree::ParseTree;

/// Compiles a grammar once and builds a [`Parser`] for every configured start
/// rule. Immutable afterwards; share it freely across threads.
#[derive(Debug, Clone)]
pub struct Larch {
    grammar: Arc<Grammar>,
    parsers: Vec<Parser>,
    options: ParserOptions,
}

impl Larch {
    pub fn new(grammar_text: &str, options: ParserOptions) -> Result<Self, LarchError> {
        let grammar = compile_grammar(grammar_text)?;
        Self::from_grammar(grammar, options)
            .map_err(|e| e.with_source("grammar", grammar_text))
    }

    pub fn from_grammar(grammar: Grammar, options: ParserOptions) -> Result<Self, LarchError> {
        if options.start.is_empty() {
            return Err(LarchError::config("at least one start rule is required"));
        }

        let grammar = Arc::new(grammar);
        let parsers = options
            .start
            .iter()
            .map(|start| Parser::new(grammar.clone(), start, &options))
            .collect::<Result<Vec<_>, _>>()?;
        for parser in &parsers {
            debug!(start = parser.start(), states = parser.state_count(), "parser ready");
        }

        Ok(Self {
            grammar,
            parsers,
            options,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// The parser for `start`, if it was configured.
    pub fn parser(&self, start: &str) -> Option<&Parser> {
        self.parsers.iter().find(|p| p.start() == start)
    }

    pub fn parsers(&self) -> &[Parser] {
        &self.parsers
    }

    /// Parses from the first configured start rule.
    pub fn parse(&self, text: &str) -> Result<ParseTree, LarchError> {
        match self.parsers.first() {
            Some(parser) => parser.parse(text),
            None => Err(LarchError::config("no start rule configured")),
        }
    }

    pub fn parse_with_start(&self, text: &str, start: &str) -> Result<ParseTree, LarchError> {
        match self.parser(start) {
            Some(parser) => parser.parse(text),
            None => Err(LarchError::config(format!(
                "start rule '{}' is not configured (configured: {})",
                start,
                self.options.start.join(", ")
            ))),
        }
    }

    /// Tokenizes with every terminal, without parsing.
    pub fn lex<'s>(&'s self, text: &'s str) -> impl Iterator<Item = Result<Token, LexError>> + 's {
        self.grammar.tokenize(text)
    }
}
