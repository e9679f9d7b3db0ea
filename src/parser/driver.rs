//! The shift-reduce driver.

use std::sync::Arc;

use tracing::trace;

use crate::errors::{LarchError, LexError, ParseError};
use crate::grammar::{Grammar, TerminalId};
use crate::lexer::{Position, TerminalSet, Token, Tokens};
use crate::parser::lalr::{Action, ParseTable, StateId};
use crate::parser::tree_builder::{StackValue, TreeBuilder};
use crate::tree::ParseNode;

/// Where the driver pulls tokens from.
pub(crate) trait TokenSource {
    /// Next token; `allowed` is what the current parser state accepts.
    fn next_token(&mut self, allowed: &TerminalSet) -> Option<Result<Token, LexError>>;

    /// Position reported when input runs out too early. Only asked for on
    /// that error path.
    fn end_position(&self) -> Position;
}

/// Lexes on demand, restricted to what the parser can accept.
pub(crate) struct ContextualSource<'g, 's>(pub Tokens<'g, 's>);

impl TokenSource for ContextualSource<'_, '_> {
    fn next_token(&mut self, allowed: &TerminalSet) -> Option<Result<Token, LexError>> {
        self.0.next_token(Some(allowed))
    }

    fn end_position(&self) -> Position {
        self.0.end_position()
    }
}

/// Lexes with every terminal, regardless of parser state.
pub(crate) struct BasicSource<'g, 's>(pub Tokens<'g, 's>);

impl TokenSource for BasicSource<'_, '_> {
    fn next_token(&mut self, _allowed: &TerminalSet) -> Option<Result<Token, LexError>> {
        self.0.next_token(None)
    }

    fn end_position(&self) -> Position {
        self.0.end_position()
    }
}

/// Tokens produced by someone else, cut from `text`.
pub(crate) struct ExternalSource<'s, I> {
    pub tokens: I,
    pub text: &'s str,
}

impl<I> TokenSource for ExternalSource<'_, I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    fn next_token(&mut self, _allowed: &TerminalSet) -> Option<Result<Token, LexError>> {
        self.tokens.next()
    }

    fn end_position(&self) -> Position {
        Position::from_offset(self.text, self.text.len())
    }
}

pub(crate) struct Driver<'p> {
    pub grammar: &'p Grammar,
    pub table: &'p ParseTable,
    pub start: &'p Arc<str>,
    pub keep_all_tokens: bool,
}

impl Driver<'_> {
    /// Runs the parser to completion.
    pub fn run(&self, source: &mut impl TokenSource) -> Result<ParseNode, LarchError> {
        let builder = TreeBuilder::new(self.grammar, self.keep_all_tokens);
        let mut states: Vec<StateId> = vec![0];
        let mut values: Vec<StackValue> = Vec::new();
        let mut lookahead = source.next_token(self.table.allowed(0)).transpose()?;

        loop {
            let state = states.last().copied().unwrap_or_default();
            let terminal = match &lookahead {
                None => TerminalId::END,
                Some(token) => match self.grammar.terminal_id(&token.terminal) {
                    Some(id) => id,
                    None => return Err(self.unexpected(state, lookahead, &*source)),
                },
            };

            match self.table.action(state, terminal) {
                Some(Action::Shift(next)) => {
                    if let Some(token) = lookahead.take() {
                        trace!(state, next, token = %token, "shift");
                        values.push(StackValue::Token(token));
                    }
                    states.push(next);
                    lookahead = source.next_token(self.table.allowed(next)).transpose()?;
                }

                Some(Action::Reduce(id)) => {
                    let production = self.grammar.production(id);
                    let arity = production.symbols.len();
                    let children = values.split_off(values.len() - arity);
                    states.truncate(states.len() - arity);

                    let top = states.last().copied().unwrap_or_default();
                    let Some(next) = self.table.goto(top, production.origin) else {
                        return Err(self.unexpected(state, lookahead, &*source));
                    };
                    trace!(
                        rule = %self.grammar.rule(production.origin).name,
                        arity,
                        next,
                        "reduce"
                    );
                    values.push(builder.reduce(production, children));
                    states.push(next);
                }

                Some(Action::Accept) => {
                    let root = match values.pop() {
                        Some(value) => builder.finish(value, self.start),
                        None => builder.finish(StackValue::Inlined(Vec::new()), self.start),
                    };
                    return Ok(root);
                }

                None => return Err(self.unexpected(state, lookahead, &*source)),
            }
        }
    }

    fn unexpected(
        &self,
        state: StateId,
        lookahead: Option<Token>,
        source: &impl TokenSource,
    ) -> LarchError {
        let expected = self.table.expected(state);
        match lookahead {
            Some(token) => ParseError::unexpected_token(token, expected).into(),
            None => ParseError::unexpected_end(source.end_position(), expected).into(),
        }
    }
}
