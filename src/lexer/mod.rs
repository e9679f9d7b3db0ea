//! The lexer.
//!
//! [`tokenize`] returns a lazy [`Tokens`] iterator. At each offset every
//! candidate terminal is matched anchored at that offset and the winner is
//! picked by priority, then match length, then literal over regex, then
//! declaration order. Ignored
//! terminals are matched like any other and then dropped.
//!
//! The parser drives the lexer through [`Tokens::next_token`], passing the
//! terminals its current state accepts (contextual lexing).

mod token;

use std::cmp::Reverse;

use regex_automata::{Anchored, Input};
use tracing::trace;

use crate::errors::LexError;
use crate::grammar::{Grammar, TerminalId};

pub use token::{Position, Span, Token};

/// A set of terminals, indexed by [`TerminalId`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalSet {
    members: Vec<bool>,
}

impl TerminalSet {
    pub fn with_capacity(terminals: usize) -> Self {
        Self {
            members: vec![false; terminals],
        }
    }

    pub fn insert(&mut self, id: TerminalId) {
        if id == TerminalId::END {
            return;
        }
        if id.index() >= self.members.len() {
            self.members.resize(id.index() + 1, false);
        }
        self.members[id.index()] = true;
    }

    pub fn contains(&self, id: TerminalId) -> bool {
        self.members.get(id.index()).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = TerminalId> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, member)| **member)
            .map(|(i, _)| TerminalId(i as u32))
    }

    pub fn is_empty(&self) -> bool {
        !self.members.iter().any(|m| *m)
    }
}

/// Splits `text` into tokens of `grammar`'s terminals.
pub fn tokenize<'g, 's>(text: &'s str, grammar: &'g Grammar) -> Tokens<'g, 's> {
    Tokens {
        grammar,
        text,
        position: Position::start(),
        failed: false,
    }
}

/// A reusable handle for tokenizing text with one grammar.
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'g> {
    grammar: &'g Grammar,
}

impl<'g> Lexer<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self { grammar }
    }

    pub fn tokenize<'s>(&self, text: &'s str) -> Tokens<'g, 's> {
        tokenize(text, self.grammar)
    }
}

/// Lazy token sequence. Yields at most one error, then stops.
#[derive(Debug, Clone)]
pub struct Tokens<'g, 's> {
    grammar: &'g Grammar,
    text: &'s str,
    position: Position,
    failed: bool,
}

struct Candidate {
    id: TerminalId,
    len: usize,
}

type MatchRank = (i32, usize, bool, Reverse<usize>);

impl<'g, 's> Tokens<'g, 's> {
    /// Position of the next unread character.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Position just past the end of the text.
    pub fn end_position(&self) -> Position {
        let mut end = self.position;
        end.advance(&self.text[self.position.offset..]);
        end
    }

    /// Reads the next token, preferring the terminals in `allowed`.
    ///
    /// With `allowed`, only those terminals and ignored ones are tried first;
    /// if none of them match, all terminals are tried so the caller can report
    /// what it found instead of a bare lex error.
    pub fn next_token(&mut self, allowed: Option<&TerminalSet>) -> Option<Result<Token, LexError>> {
        if self.failed {
            return None;
        }

        loop {
            if self.position.offset >= self.text.len() {
                return None;
            }

            let best = match allowed {
                Some(allowed) => self
                    .best_match(|id| allowed.contains(id))
                    .or_else(|| self.best_match(|_| true)),
                None => self.best_match(|_| true),
            };

            let Some(candidate) = best else {
                self.failed = true;
                let expected = allowed.map(|set| self.names(set)).unwrap_or_default();
                return Some(Err(LexError::new(self.text, self.position, expected)));
            };

            let start = self.position;
            let matched = &self.text[start.offset..start.offset + candidate.len];
            self.position.advance(matched);

            if self.grammar.is_ignored(candidate.id) {
                trace!(terminal = %self.grammar.terminal_name(candidate.id), "skipped ignored text");
                continue;
            }

            return Some(Ok(Token {
                terminal: self.grammar.terminal(candidate.id).name.clone(),
                text: matched.to_string(),
                span: Span::new(start.offset, self.position.offset),
                start,
                end: self.position,
            }));
        }
    }

    /// The winning match among terminals accepted by `filter` (ignored
    /// terminals are always candidates).
    ///
    /// Ranked by priority, then length, then literals over regexes, then
    /// declaration order.
    fn best_match(&self, filter: impl Fn(TerminalId) -> bool) -> Option<Candidate> {
        let offset = self.position.offset;
        let mut best: Option<(Candidate, MatchRank)> = None;

        for (index, terminal) in self.grammar.terminals().iter().enumerate() {
            let id = TerminalId(index as u32);
            if !filter(id) && !self.grammar.is_ignored(id) {
                continue;
            }
            let input = Input::new(self.text)
                .range(offset..)
                .anchored(Anchored::Yes);
            let Some(found) = terminal.matcher().search(&input) else {
                continue;
            };
            let len = found.end() - offset;
            if len == 0 {
                continue;
            }

            let rank = (
                terminal.priority,
                len,
                terminal.pattern.is_literal(),
                Reverse(terminal.order),
            );
            if best.as_ref().map_or(true, |(_, current)| rank > *current) {
                best = Some((Candidate { id, len }, rank));
            }
        }

        best.map(|(candidate, _)| candidate)
    }

    fn names(&self, set: &TerminalSet) -> Vec<String> {
        let mut names: Vec<String> = set
            .iter()
            .map(|id| self.grammar.terminal_name(id).to_string())
            .collect();
        names.sort();
        names
    }
}

impl Iterator for Tokens<'_, '_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token(None)
    }
}

impl std::iter::FusedIterator for Tokens<'_, '_> {}
