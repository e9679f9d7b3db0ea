//! Larch error handling.
//!
//! Every failure of the pipeline falls into one of three kinds:
//!
//! - [`GrammarError`]: the grammar text is malformed or inconsistent. Always
//!   fatal to grammar compilation.
//! - [`LexError`]: no terminal matches the input at some offset.
//! - [`ParseError`]: the token sequence is not derivable from the start rule.
//!
//! All of them implement [`miette::Diagnostic`], so a caller holding the source
//! text can attach it with `with_source` and get a labelled snippet when the
//! error is rendered through a `miette::Report`. [`LarchError`] is the umbrella
//! type returned by operations that can fail in more than one phase.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::lexer::{Position, Span, Token};

pub type SourceArc = Arc<NamedSource<String>>;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Coarse error classification, handy for assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Grammar,
    Lex,
    Parse,
    Config,
    Io,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Grammar => "Grammar",
            ErrorType::Lex => "Lex",
            ErrorType::Parse => "Parse",
            ErrorType::Config => "Config",
            ErrorType::Io => "Io",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// Minimal, composable diagnostic context.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The text the error points into, if attached.
    pub source: Option<SourceArc>,
    /// The primary span for this error.
    pub span: Option<Span>,
    pub help: Option<String>,
}

impl ErrorContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_span(span: Span) -> Self {
        Self {
            span: Some(span),
            ..Self::default()
        }
    }

    fn labels(&self, text: String) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        let label = LabeledSpan::new(Some(text), span.start, span.len());
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.source.as_ref().map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }
}

/// Wraps source text for use in error contexts.
pub fn to_error_source(name: &str, text: &str) -> SourceArc {
    Arc::new(NamedSource::new(name, text.to_string()))
}

/// Clamps a span so that miette never indexes past the end of `text`.
fn clamp_span(span: Option<Span>, text: &str) -> Option<Span> {
    span.map(|s| {
        let start = s.start.min(text.len());
        Span::new(start, s.end.clamp(start, text.len()))
    })
}

// ============================================================================
// GRAMMAR ERRORS
// ============================================================================

/// What is wrong with a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarErrorKind {
    /// The grammar text does not follow the grammar description syntax.
    Syntax { message: String },
    UndefinedSymbol { name: String, referenced_by: String },
    DuplicateDefinition { name: String, first_line: usize },
    UnknownStart { name: String },
    InvalidPattern { terminal: String, reason: String },
    /// The terminal can match the empty string.
    EmptyTerminal { terminal: String },
    RuleInTerminal { terminal: String, rule: String },
    RecursiveTerminal { terminal: String },
    UnknownImport { path: String },
    InvalidRepeat { min: usize, max: usize },
    /// An alias was used somewhere other than at the end of a top-level alternative.
    InvalidAlias { name: String },
    /// User names may not start with `__`.
    ReservedName { name: String },
}

impl GrammarErrorKind {
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::UndefinedSymbol { .. } => "undefined_symbol",
            Self::DuplicateDefinition { .. } => "duplicate_definition",
            Self::UnknownStart { .. } => "unknown_start",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::EmptyTerminal { .. } => "empty_terminal",
            Self::RuleInTerminal { .. } => "rule_in_terminal",
            Self::RecursiveTerminal { .. } => "recursive_terminal",
            Self::UnknownImport { .. } => "unknown_import",
            Self::InvalidRepeat { .. } => "invalid_repeat",
            Self::InvalidAlias { .. } => "invalid_alias",
            Self::ReservedName { .. } => "reserved_name",
        }
    }
}

impl fmt::Display for GrammarErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message } => write!(f, "syntax error: {}", message),
            Self::UndefinedSymbol {
                name,
                referenced_by,
            } => write!(
                f,
                "undefined symbol '{}' referenced by '{}'",
                name, referenced_by
            ),
            Self::DuplicateDefinition { name, first_line } => write!(
                f,
                "duplicate definition of '{}' (first defined on line {})",
                name, first_line
            ),
            Self::UnknownStart { name } => write!(f, "unknown start rule '{}'", name),
            Self::InvalidPattern { terminal, reason } => {
                write!(f, "invalid pattern for terminal '{}': {}", terminal, reason)
            }
            Self::EmptyTerminal { terminal } => {
                write!(f, "terminal '{}' can match the empty string", terminal)
            }
            Self::RuleInTerminal { terminal, rule } => write!(
                f,
                "terminal '{}' refers to rule '{}'; terminals may only use terminals",
                terminal, rule
            ),
            Self::RecursiveTerminal { terminal } => {
                write!(f, "terminal '{}' is defined in terms of itself", terminal)
            }
            Self::UnknownImport { path } => write!(f, "cannot import '{}'", path),
            Self::InvalidRepeat { min, max } => {
                write!(f, "invalid repetition range {}..{}", min, max)
            }
            Self::InvalidAlias { name } => write!(
                f,
                "alias '{}' is only allowed at the end of a top-level alternative",
                name
            ),
            Self::ReservedName { name } => write!(f, "name '{}' is reserved", name),
        }
    }
}

/// Malformed grammar text, unresolved symbol or duplicate definition.
#[derive(Debug, Error)]
#[error("{kind} at {position}")]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    pub position: Position,
    pub ctx: ErrorContext,
}

impl GrammarError {
    pub fn new(kind: GrammarErrorKind, position: Position) -> Self {
        Self {
            kind,
            position,
            ctx: ErrorContext::none(),
        }
    }

    /// Narrows the label to `span` instead of the single character at `position`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.ctx.span = Some(span);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.ctx.help = Some(help.into());
        self
    }

    /// Attaches the grammar text so the error renders with a snippet.
    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        let span = self
            .ctx
            .span
            .or(Some(Span::new(self.position.offset, self.position.offset + 1)));
        self.ctx.span = clamp_span(span, text);
        self.ctx.source = Some(to_error_source(name, text));
        self
    }
}

impl Diagnostic for GrammarError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("larch::grammar::{}", self.kind.code_suffix())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.ctx.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.ctx.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.ctx.labels(self.kind.code_suffix().replace('_', " "))
    }
}

/// Builds a [`GrammarError`] from a kind variant and a position.
///
/// `grammar_err!(UnknownStart { name: "dict" }, position)`
#[macro_export]
macro_rules! grammar_err {
    ($kind:ident { $($field:ident : $value:expr),* $(,)? }, $position:expr) => {
        $crate::errors::GrammarError::new(
            $crate::errors::GrammarErrorKind::$kind { $($field: $value.into()),* },
            $position,
        )
    };
}

// ============================================================================
// LEX ERRORS
// ============================================================================

/// Input text that no terminal matches.
#[derive(Debug, Error)]
#[error("no terminal matches {snippet:?} at {position}")]
pub struct LexError {
    pub position: Position,
    /// A short excerpt of the unmatched input starting at `position`.
    pub snippet: String,
    /// Terminals that were acceptable here; empty when every terminal was tried.
    pub expected: Vec<String>,
    pub ctx: ErrorContext,
}

/// Number of characters of unmatched input kept in a [`LexError`].
const SNIPPET_CHARS: usize = 16;

impl LexError {
    pub fn new(text: &str, position: Position, expected: Vec<String>) -> Self {
        let snippet: String = text[position.offset..]
            .chars()
            .take_while(|c| *c != '\n')
            .take(SNIPPET_CHARS)
            .collect();
        let first_char_len = text[position.offset..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        Self {
            position,
            snippet,
            expected,
            ctx: ErrorContext::with_span(Span::new(
                position.offset,
                position.offset + first_char_len,
            )),
        }
    }

    pub fn offset(&self) -> usize {
        self.position.offset
    }

    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        self.ctx.span = clamp_span(self.ctx.span, text);
        self.ctx.source = Some(to_error_source(name, text));
        self
    }
}

impl Diagnostic for LexError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("larch::lex::unmatched_input"))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if self.expected.is_empty() {
            return self.ctx.help();
        }
        Some(Box::new(format!(
            "expected one of: {}",
            self.expected.join(", ")
        )))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.ctx.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.ctx.labels("no terminal matches here".into())
    }
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

/// Name used for the end-of-input marker in expected sets.
pub const END_OF_INPUT: &str = "$END";

/// A token sequence that is not derivable from the start rule.
#[derive(Debug, Error)]
#[error(
    "unexpected {found} at {position}, expected one of: {}",
    .expected.join(", ")
)]
pub struct ParseError {
    pub position: Position,
    /// Human-readable description of what was found.
    pub found: String,
    /// The offending token, `None` at end of input.
    pub token: Option<Token>,
    /// Sorted names of the terminals that would have been acceptable.
    pub expected: Vec<String>,
    pub ctx: ErrorContext,
}

impl ParseError {
    pub fn unexpected_token(token: Token, expected: Vec<String>) -> Self {
        Self {
            position: token.start,
            found: format!("token {}", token),
            ctx: ErrorContext::with_span(token.span),
            token: Some(token),
            expected,
        }
    }

    pub fn unexpected_end(position: Position, expected: Vec<String>) -> Self {
        Self {
            position,
            found: "end of input".to_string(),
            token: None,
            expected,
            ctx: ErrorContext::with_span(Span::new(position.offset, position.offset)),
        }
    }

    pub fn offset(&self) -> usize {
        self.position.offset
    }

    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        self.ctx.span = clamp_span(self.ctx.span, text);
        self.ctx.source = Some(to_error_source(name, text));
        self
    }
}

impl Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("larch::parse::unexpected"))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.ctx.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.ctx.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.ctx.labels(format!("unexpected {}", self.found))
    }
}

// ============================================================================
// UMBRELLA ERROR
// ============================================================================

/// Any failure of the grammar → tokens → tree pipeline.
#[derive(Debug, Error)]
pub enum LarchError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LarchError {
    pub fn config(message: impl Into<String>) -> Self {
        LarchError::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LarchError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            LarchError::Grammar(_) => ErrorType::Grammar,
            LarchError::Lex(_) => ErrorType::Lex,
            LarchError::Parse(_) => ErrorType::Parse,
            LarchError::Config { .. } => ErrorType::Config,
            LarchError::Io { .. } => ErrorType::Io,
        }
    }

    /// Attaches the text the error's position refers to.
    pub fn with_source(self, name: &str, text: &str) -> Self {
        match self {
            LarchError::Grammar(e) => LarchError::Grammar(e.with_source(name, text)),
            LarchError::Lex(e) => LarchError::Lex(e.with_source(name, text)),
            LarchError::Parse(e) => LarchError::Parse(e.with_source(name, text)),
            other => other,
        }
    }

    /// Position of the error in its source text, if it has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            LarchError::Grammar(e) => Some(e.position),
            LarchError::Lex(e) => Some(e.position),
            LarchError::Parse(e) => Some(e.position),
            LarchError::Config { .. } | LarchError::Io { .. } => None,
        }
    }

    fn as_diagnostic(&self) -> Option<&dyn Diagnostic> {
        match self {
            LarchError::Grammar(e) => Some(e),
            LarchError::Lex(e) => Some(e),
            LarchError::Parse(e) => Some(e),
            LarchError::Config { .. } | LarchError::Io { .. } => None,
        }
    }
}

impl Diagnostic for LarchError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            LarchError::Config { .. } => Some(Box::new("larch::config")),
            LarchError::Io { .. } => Some(Box::new("larch::io")),
            _ => self.as_diagnostic().and_then(|d| d.code()),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.as_diagnostic().and_then(|d| d.help())
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.as_diagnostic().and_then(|d| d.source_code())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.as_diagnostic().and_then(|d| d.labels())
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Prints an error with full miette diagnostics to stderr.
pub fn print_error(error: LarchError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use miette::Report;

    use super::*;

    #[test]
    fn grammar_error_report_shows_snippet_and_code() {
        let text = "start: value\nvalue: missing\n";
        let position = Position::from_offset(text, 20);
        let err = grammar_err!(
            UndefinedSymbol {
                name: "missing",
                referenced_by: "value"
            },
            position
        )
        .with_span(Span::new(20, 27))
        .with_source("test.lark", text);

        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("undefined symbol 'missing'"));
        assert!(output.contains("larch::grammar::undefined_symbol"));
        assert!(output.contains("value: missing"));
    }

    #[test]
    fn lex_error_snippet_stops_at_newline() {
        let text = "abc @@@\nrest";
        let err = LexError::new(text, Position::from_offset(text, 4), vec![]);
        assert_eq!(err.snippet, "@@@");
        assert_eq!(err.offset(), 4);
        assert_eq!(err.ctx.span, Some(Span::new(4, 5)));
    }

    #[test]
    fn parse_error_lists_expected_terminals() {
        let err = ParseError::unexpected_end(
            Position::start(),
            vec!["LBRACE".to_string(), "NUMBER".to_string()],
        );
        let message = err.to_string();
        assert!(message.contains("end of input"));
        assert!(message.contains("LBRACE, NUMBER"));
    }

    #[test]
    fn umbrella_error_classifies_and_keeps_diagnostics() {
        let text = "{ 1 }";
        let err: LarchError = ParseError::unexpected_end(Position::from_offset(text, 5), vec![])
            .into();
        assert_eq!(err.error_type(), ErrorType::Parse);
        let err = err.with_source("input", text);
        assert!(err.source_code().is_some());
        assert_eq!(err.position().map(|p| p.offset), Some(5));
    }
}
