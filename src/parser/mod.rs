//! The LALR(1) parser engine.
//!
//! A [`Parser`] owns the parse table for one start rule. Tables are built once
//! in [`Parser::new`] and reused by every call to [`Parser::parse`].

mod driver;
pub mod lalr;
mod tree_builder;

use std::sync::Arc;

use crate::errors::{GrammarError, LarchError, LexError};
use crate::grammar::Grammar;
use crate::lexer::{self, Token};
use crate::options::{LexerMode, ParserOptions};
use crate::tree::{ParseNode, ParseTree};

use self::driver::{BasicSource, ContextualSource, Driver, ExternalSource};
use self::lalr::ParseTable;

#[derive(Debug, Clone)]
pub struct Parser {
    grammar: Arc<Grammar>,
    table: Arc<ParseTable>,
    start: Arc<str>,
    lexer: LexerMode,
    keep_all_tokens: bool,
}

impl Parser {
    /// Gets the parse table for `start` from the grammar, building it if this
    /// is the first parser for that rule.
    pub fn new(
        grammar: Arc<Grammar>,
        start: &str,
        options: &ParserOptions,
    ) -> Result<Self, GrammarError> {
        let start_id = grammar.start_rule(start)?;
        let table = grammar.parse_table(start_id);
        let start = grammar.rule(start_id).name.clone();
        Ok(Self {
            grammar,
            table,
            start,
            lexer: options.lexer,
            keep_all_tokens: options.keep_all_tokens,
        })
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Name of the start rule this parser was built for.
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn table(&self) -> &Arc<ParseTable> {
        &self.table
    }

    pub fn state_count(&self) -> usize {
        self.table.state_count()
    }

    /// Lexes and parses `text`. Errors carry `text` as their source.
    pub fn parse(&self, text: &str) -> Result<ParseTree, LarchError> {
        let root = parse_text(
            &self.grammar,
            &self.table,
            &self.start,
            self.lexer,
            self.keep_all_tokens,
            text,
        )?;
        Ok(self.tree(root, text))
    }

    /// Parses an externally produced token stream. `text` is the source the
    /// tokens were cut from; it is stored in the tree and used for positions.
    pub fn parse_tokens<I>(&self, tokens: I, text: &str) -> Result<ParseTree, LarchError>
    where
        I: IntoIterator<Item = Result<Token, LexError>>,
    {
        let mut source = ExternalSource {
            tokens: tokens.into_iter(),
            text,
        };
        self.driver()
            .run(&mut source)
            .map(|root| self.tree(root, text))
            .map_err(|e| e.with_source("input", text))
    }

    fn driver(&self) -> Driver<'_> {
        Driver {
            grammar: &self.grammar,
            table: &self.table,
            start: &self.start,
            keep_all_tokens: self.keep_all_tokens,
        }
    }

    fn tree(&self, root: ParseNode, text: &str) -> ParseTree {
        ParseTree::new(root, self.start.clone(), Arc::from(text))
    }
}

/// Lexes and parses `text` with a table built for `start`. Errors carry
/// `text` as their source.
pub(crate) fn parse_text(
    grammar: &Grammar,
    table: &ParseTable,
    start: &Arc<str>,
    lexer: LexerMode,
    keep_all_tokens: bool,
    text: &str,
) -> Result<ParseNode, LarchError> {
    let driver = Driver {
        grammar,
        table,
        start,
        keep_all_tokens,
    };
    let tokens = lexer::tokenize(text, grammar);
    let root = match lexer {
        LexerMode::Contextual => driver.run(&mut ContextualSource(tokens)),
        LexerMode::Basic => driver.run(&mut BasicSource(tokens)),
    };
    root.map_err(|e| e.with_source("input", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;
    use crate::grammar::compile_grammar;

    fn parser(text: &str, options: &ParserOptions) -> Parser {
        let grammar = Arc::new(compile_grammar(text).unwrap());
        Parser::new(grammar, "start", options).unwrap()
    }

    #[test]
    fn reuses_tables_across_parses() {
        let parser = parser("start: \"a\"+\n", &ParserOptions::default());
        assert!(parser.parse("aaa").is_ok());
        assert!(parser.parse("a").is_ok());
        assert_eq!(parser.parse("").unwrap_err().error_type(), ErrorType::Parse);
    }

    #[test]
    fn grammar_parse_builds_each_table_once() {
        let grammar = compile_grammar("start: item+\nitem: A\nA: \"a\"\n").unwrap();
        let start = grammar.rule_id("start").unwrap();

        grammar.parse("aa", "start").unwrap();
        let first = grammar.parse_table(start);
        grammar.parse("a", "start").unwrap();
        assert!(Arc::ptr_eq(&first, &grammar.parse_table(start)));

        let parser = Parser::new(Arc::new(grammar.clone()), "start", &ParserOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, parser.table()));
    }

    #[test]
    fn basic_and_contextual_lexers_differ_on_overlapping_terminals() {
        let grammar = "start: KEYWORD NAME\nKEYWORD: \"let\"\nNAME: /[a-z]+/\n%ignore \" \"\n";
        let contextual = parser(grammar, &ParserOptions::default());
        assert!(contextual.parse("let let").is_ok());

        let basic = parser(
            grammar,
            &ParserOptions::default().with_lexer(LexerMode::Basic),
        );
        assert_eq!(
            basic.parse("let let").unwrap_err().error_type(),
            ErrorType::Parse
        );
    }

    struct CountingEnd<'g, 's> {
        tokens: lexer::Tokens<'g, 's>,
        asked: std::cell::Cell<usize>,
    }

    impl super::driver::TokenSource for CountingEnd<'_, '_> {
        fn next_token(
            &mut self,
            allowed: &lexer::TerminalSet,
        ) -> Option<Result<Token, LexError>> {
            self.tokens.next_token(Some(allowed))
        }

        fn end_position(&self) -> crate::lexer::Position {
            self.asked.set(self.asked.get() + 1);
            self.tokens.end_position()
        }
    }

    #[test]
    fn end_position_is_computed_only_for_unexpected_end() {
        let parser = parser("start: A B\nA: \"a\"\nB: \"b\"\n", &ParserOptions::default());
        let run = |text| {
            let mut source = CountingEnd {
                tokens: lexer::tokenize(text, &parser.grammar),
                asked: std::cell::Cell::new(0),
            };
            let result = parser.driver().run(&mut source);
            (result, source.asked.get())
        };

        let (result, asked) = run("ba");
        assert_eq!(result.unwrap_err().error_type(), ErrorType::Parse);
        assert_eq!(asked, 0);

        let (result, asked) = run("a");
        match result.unwrap_err() {
            LarchError::Parse(e) => assert_eq!(e.offset(), 1),
            other => panic!("expected a parse error, got {:?}", other),
        }
        assert_eq!(asked, 1);
    }

    #[test]
    fn parses_external_tokens() {
        let parser = parser("start: A B\nA: \"a\"\nB: \"b\"\n", &ParserOptions::default());
        let grammar = parser.grammar().clone();
        let tokens: Vec<_> = grammar.tokenize("ab").collect();
        let tree = parser.parse_tokens(tokens, "ab").unwrap();
        assert_eq!(tree.tokens().len(), 2);
    }
}
