//! Grammar text loader.
//!
//! Turns grammar description text into a flat list of [`Definition`]s using the
//! pest meta-grammar in `meta.pest`. This stage is purely syntactic: names are
//! not resolved and patterns are not compiled.

use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::errors::GrammarError;
use crate::grammar::{Pattern, RuleOptions};
use crate::grammar_err;
use crate::lexer::{Position, Span};

#[derive(Parser)]
#[grammar = "grammar/meta.pest"]
struct MetaParser;

// ============================================================================
// DEFINITIONS
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) enum Definition {
    Rule(RuleSource),
    Terminal(TerminalSource),
    Ignore(IgnoreSource),
    Import(ImportSource),
}

#[derive(Debug, Clone)]
pub(crate) struct RuleSource {
    pub name: String,
    pub options: RuleOptions,
    pub priority: i32,
    pub body: Vec<Alternative>,
    pub position: Position,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct TerminalSource {
    pub name: String,
    pub priority: i32,
    pub body: Vec<Alternative>,
    pub position: Position,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct IgnoreSource {
    pub body: Vec<Alternative>,
    pub position: Position,
}

/// `%import a.b.NAME [-> ALIAS]` or `%import a.b (NAME, NAME)`.
#[derive(Debug, Clone)]
pub(crate) struct ImportSource {
    /// Module path, without the imported name for the single-name form.
    pub module: Vec<String>,
    /// (name in the module, local name)
    pub names: Vec<(String, String)>,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub(crate) struct Alternative {
    pub items: Vec<Item>,
    pub alias: Option<(String, Position)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Item {
    pub kind: ItemKind,
    /// Source text of the item, used to share helper rules between identical items.
    pub text: String,
    pub position: Position,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) enum ItemKind {
    Rule(String),
    Terminal(String),
    Pattern(Pattern),
    Group(Vec<Alternative>),
    Maybe(Vec<Alternative>),
    Repeat(Box<Item>, Repeat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repeat {
    Optional,
    Star,
    Plus,
    Exactly(usize),
    Between(usize, usize),
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses grammar description text into definitions, in source order.
pub(crate) fn load(text: &str) -> Result<Vec<Definition>, GrammarError> {
    let mut pairs =
        MetaParser::parse(Rule::grammar, text).map_err(|e| convert_pest_error(e, text))?;
    let Some(grammar) = pairs.next() else {
        return Ok(Vec::new());
    };

    grammar
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_definition)
        .collect()
}

// ============================================================================
// BUILDERS
// ============================================================================

fn build_definition(pair: Pair<Rule>) -> Result<Definition, GrammarError> {
    let position = position_of(&pair);
    let span = span_of(&pair);

    match pair.as_rule() {
        Rule::rule_def => {
            let mut name = String::new();
            let mut options = RuleOptions::default();
            let mut priority = 0;
            let mut body = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::rule_name => {
                        for part in inner.into_inner() {
                            match part.as_rule() {
                                Rule::rule_modifiers => {
                                    options.keep_all_tokens = part.as_str().contains('!');
                                    options.expand_single = part.as_str().contains('?');
                                }
                                _ => name = part.as_str().to_string(),
                            }
                        }
                    }
                    Rule::priority => priority = build_priority(inner)?,
                    Rule::expansions => body = build_expansions(inner)?,
                    _ => {}
                }
            }
            options.inline = name.starts_with('_');
            Ok(Definition::Rule(RuleSource {
                name,
                options,
                priority,
                body,
                position,
                span,
            }))
        }

        Rule::term_def => {
            let mut name = String::new();
            let mut priority = 0;
            let mut body = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::term_name => name = inner.as_str().to_string(),
                    Rule::priority => priority = build_priority(inner)?,
                    Rule::expansions => body = build_expansions(inner)?,
                    _ => {}
                }
            }
            Ok(Definition::Terminal(TerminalSource {
                name,
                priority,
                body,
                position,
                span,
            }))
        }

        Rule::ignore_stmt => {
            let mut body = Vec::new();
            for inner in pair.into_inner() {
                if inner.as_rule() == Rule::expansions {
                    body = build_expansions(inner)?;
                }
            }
            Ok(Definition::Ignore(IgnoreSource { body, position }))
        }

        Rule::import_stmt => build_import(pair, position),

        rule => Err(grammar_err!(
            Syntax {
                message: format!("unsupported construct: {:?}", rule)
            },
            position
        )),
    }
}

fn build_import(pair: Pair<Rule>, position: Position) -> Result<Definition, GrammarError> {
    let mut path: Vec<String> = Vec::new();
    let mut names = Vec::new();
    let mut alias = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::import_path => {
                path = inner.as_str().split('.').map(str::to_string).collect();
            }
            Rule::import_names => {
                for name in inner.into_inner() {
                    let name = name.as_str().to_string();
                    names.push((name.clone(), name));
                }
            }
            Rule::import_alias => {
                alias = inner.into_inner().next().map(|p| p.as_str().to_string());
            }
            _ => {}
        }
    }

    if names.is_empty() {
        // Single-name form: the last path component is the imported name.
        if path.len() < 2 {
            return Err(grammar_err!(
                UnknownImport {
                    path: path.join(".")
                },
                position
            )
            .with_help("use `%import module.NAME` or `%import module (NAME, ...)`"));
        }
        let name = path.pop().unwrap_or_default();
        let local = alias.unwrap_or_else(|| name.clone());
        names.push((name, local));
    }

    Ok(Definition::Import(ImportSource {
        module: path,
        names,
        position,
    }))
}

fn build_priority(pair: Pair<Rule>) -> Result<i32, GrammarError> {
    let position = position_of(&pair);
    let digits = pair.as_str().trim_start_matches('.');
    digits.parse::<i32>().map_err(|_| {
        grammar_err!(
            Syntax {
                message: format!("invalid priority '{}'", digits)
            },
            position
        )
    })
}

fn build_expansions(pair: Pair<Rule>) -> Result<Vec<Alternative>, GrammarError> {
    pair.into_inner().map(build_alternative).collect()
}

fn build_alternative(pair: Pair<Rule>) -> Result<Alternative, GrammarError> {
    let mut items = Vec::new();
    let mut alias = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::expansion => {
                items = inner
                    .into_inner()
                    .map(build_expr)
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Rule::rule_ident => {
                alias = Some((inner.as_str().to_string(), position_of(&inner)));
            }
            _ => {}
        }
    }
    Ok(Alternative { items, alias })
}

fn build_expr(pair: Pair<Rule>) -> Result<Item, GrammarError> {
    let position = position_of(&pair);
    let span = span_of(&pair);
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();

    let atom = inner.next().ok_or_else(|| {
        grammar_err!(
            Syntax {
                message: "expected an expression"
            },
            position
        )
    })?;
    let item = build_atom(atom)?;

    let Some(suffix) = inner.next() else {
        return Ok(item);
    };
    let repeat = match suffix.as_rule() {
        Rule::op => match suffix.as_str() {
            "?" => Repeat::Optional,
            "*" => Repeat::Star,
            _ => Repeat::Plus,
        },
        Rule::repeat => build_repeat(suffix)?,
        rule => {
            return Err(grammar_err!(
                Syntax {
                    message: format!("unexpected {:?} after expression", rule)
                },
                position
            ))
        }
    };

    Ok(Item {
        kind: ItemKind::Repeat(Box::new(item), repeat),
        text,
        position,
        span,
    })
}

fn build_repeat(pair: Pair<Rule>) -> Result<Repeat, GrammarError> {
    let position = position_of(&pair);
    let bounds = pair
        .into_inner()
        .map(|p| {
            p.as_str().parse::<usize>().map_err(|_| {
                grammar_err!(
                    Syntax {
                        message: format!("invalid repetition count '{}'", p.as_str())
                    },
                    position
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    match bounds.as_slice() {
        [n] => Ok(Repeat::Exactly(*n)),
        [min, max] if min <= max => Ok(Repeat::Between(*min, *max)),
        [min, max] => Err(grammar_err!(
            InvalidRepeat {
                min: *min,
                max: *max
            },
            position
        )),
        _ => Err(grammar_err!(
            Syntax {
                message: "malformed repetition"
            },
            position
        )),
    }
}

fn build_atom(pair: Pair<Rule>) -> Result<Item, GrammarError> {
    let position = position_of(&pair);
    let span = span_of(&pair);
    let text = pair.as_str().to_string();

    let kind = match pair.as_rule() {
        Rule::rule_ident => ItemKind::Rule(text.clone()),
        Rule::term_ident => ItemKind::Terminal(text.clone()),
        Rule::string => ItemKind::Pattern(parse_string(&text, position)?),
        Rule::regexp => ItemKind::Pattern(parse_regexp(&text)),
        Rule::literal_range => {
            let mut ends = pair.into_inner().map(|p| {
                let pos = position_of(&p);
                parse_string(p.as_str(), pos).and_then(|pattern| single_char(&pattern, pos))
            });
            let (Some(low), Some(high)) = (ends.next(), ends.next()) else {
                return Err(grammar_err!(
                    Syntax {
                        message: "malformed character range"
                    },
                    position
                ));
            };
            ItemKind::Pattern(Pattern::range(low?, high?))
        }
        Rule::group => ItemKind::Group(build_nested(pair)?),
        Rule::maybe => ItemKind::Maybe(build_nested(pair)?),
        rule => {
            return Err(grammar_err!(
                Syntax {
                    message: format!("unexpected {:?}", rule)
                },
                position
            ))
        }
    };

    Ok(Item {
        kind,
        text,
        position,
        span,
    })
}

fn build_nested(pair: Pair<Rule>) -> Result<Vec<Alternative>, GrammarError> {
    match pair.into_inner().next() {
        Some(expansions) => build_expansions(expansions),
        None => Ok(Vec::new()),
    }
}

// ============================================================================
// LITERALS
// ============================================================================

/// Parses `"text"` or `"text"i` into a literal pattern, resolving escapes.
fn parse_string(raw: &str, position: Position) -> Result<Pattern, GrammarError> {
    let (body, case_insensitive) = match raw.strip_suffix('i') {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    let inner = body
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(body);
    let value = unescape(inner, position)?;
    if value.is_empty() {
        return Err(grammar_err!(
            Syntax {
                message: "empty string literal"
            },
            position
        ));
    }
    Ok(Pattern::Literal {
        value,
        case_insensitive,
    })
}

/// Parses `/regex/flags`. Only `\/` is unescaped; everything else is regex syntax.
fn parse_regexp(raw: &str) -> Pattern {
    let close = raw.rfind('/').unwrap_or(raw.len());
    let source = raw.get(1..close).unwrap_or_default().replace("\\/", "/");
    let flags = raw.get(close + 1..).unwrap_or_default().to_string();
    Pattern::Regex { source, flags }
}

fn unescape(text: &str, position: Position) -> Result<String, GrammarError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('x') => out.push(hex_escape(&mut chars, 2, position)?),
            Some('u') => out.push(hex_escape(&mut chars, 4, position)?),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

fn hex_escape(
    chars: &mut std::str::Chars<'_>,
    digits: usize,
    position: Position,
) -> Result<char, GrammarError> {
    let hex: String = chars.by_ref().take(digits).collect();
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| {
            grammar_err!(
                Syntax {
                    message: format!("invalid escape sequence '{}'", hex)
                },
                position
            )
        })
}

fn single_char(pattern: &Pattern, position: Position) -> Result<char, GrammarError> {
    if let Pattern::Literal { value, .. } = pattern {
        let mut chars = value.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(c);
        }
    }
    Err(grammar_err!(
        Syntax {
            message: "character ranges need single-character literals"
        },
        position
    ))
}

// ============================================================================
// PEST HELPERS
// ============================================================================

fn position_of(pair: &Pair<Rule>) -> Position {
    let (line, column) = pair.line_col();
    Position {
        offset: pair.as_span().start(),
        line,
        column,
    }
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end())
}

fn convert_pest_error(error: pest::error::Error<Rule>, text: &str) -> GrammarError {
    let offset = match error.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let message = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let mut expected: Vec<&str> = positives.iter().map(describe_rule).collect();
            expected.dedup();
            format!("expected {}", expected.join(", "))
        }
        ErrorVariant::ParsingError { .. } => "unexpected input".to_string(),
        ErrorVariant::CustomError { message } => message.clone(),
    };
    grammar_err!(Syntax { message: message }, Position::from_offset(text, offset))
}

fn describe_rule(rule: &Rule) -> &'static str {
    match rule {
        Rule::rule_def | Rule::rule_name | Rule::rule_ident => "rule name",
        Rule::term_def | Rule::term_name | Rule::term_ident => "terminal name",
        Rule::priority => "priority",
        Rule::ignore_stmt | Rule::import_stmt => "directive",
        Rule::expansions | Rule::alias | Rule::expansion | Rule::expr => "expression",
        Rule::op => "operator",
        Rule::repeat => "repetition",
        Rule::group => "group",
        Rule::maybe => "optional group",
        Rule::literal_range | Rule::string => "string",
        Rule::regexp => "regular expression",
        Rule::import_path | Rule::import_names | Rule::import_alias | Rule::import_name => {
            "import"
        }
        Rule::EOI => "end of input",
        _ => "definition",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(text: &str) -> Vec<RuleSource> {
        load(text)
            .unwrap()
            .into_iter()
            .filter_map(|d| match d {
                Definition::Rule(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn loads_rule_modifiers_and_priority() {
        let rules = rules("?value.2: a | b\n!keep: \"x\"\n_inner: a\n");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].name, "value");
        assert!(rules[0].options.expand_single);
        assert_eq!(rules[0].priority, 2);
        assert_eq!(rules[0].body.len(), 2);
        assert!(rules[1].options.keep_all_tokens);
        assert!(rules[2].options.inline);
    }

    #[test]
    fn continuation_lines_extend_a_definition() {
        let rules = rules("value: a\n     | b\n     | c -> third\nother: d\n");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].body.len(), 3);
        assert_eq!(
            rules[0].body[2].alias.as_ref().map(|a| a.0.as_str()),
            Some("third")
        );
        assert_eq!(rules[1].position.line, 4);
    }

    #[test]
    fn loads_terminals_imports_and_ignores() {
        let defs = load(
            "NUMBER.3: /[0-9]+/i\n%import common.WS -> SPACE\n%import common (INT, WORD)\n%ignore SPACE\n",
        )
        .unwrap();
        assert_eq!(defs.len(), 4);
        match &defs[0] {
            Definition::Terminal(t) => {
                assert_eq!(t.name, "NUMBER");
                assert_eq!(t.priority, 3);
                match &t.body[0].items[0].kind {
                    ItemKind::Pattern(Pattern::Regex { source, flags }) => {
                        assert_eq!(source, "[0-9]+");
                        assert_eq!(flags, "i");
                    }
                    other => panic!("expected regex, got {:?}", other),
                }
            }
            other => panic!("expected terminal, got {:?}", other),
        }
        match &defs[1] {
            Definition::Import(i) => {
                assert_eq!(i.module, vec!["common".to_string()]);
                assert_eq!(i.names, vec![("WS".to_string(), "SPACE".to_string())]);
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &defs[2] {
            Definition::Import(i) => assert_eq!(i.names.len(), 2),
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn string_escapes_and_case_flag() {
        let defs = load("A: \"\\n\\\"x\"i\n").unwrap();
        let Definition::Terminal(t) = &defs[0] else {
            panic!("expected terminal");
        };
        match &t.body[0].items[0].kind {
            ItemKind::Pattern(Pattern::Literal {
                value,
                case_insensitive,
            }) => {
                assert_eq!(value, "\n\"x");
                assert!(*case_insensitive);
            }
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn repetition_suffixes() {
        let rules = rules("r: a ~ 3 b ~ 1..2 c* d+ e?\n");
        let kinds: Vec<Option<Repeat>> = rules[0].body[0]
            .items
            .iter()
            .map(|i| match &i.kind {
                ItemKind::Repeat(_, r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(Repeat::Exactly(3)),
                Some(Repeat::Between(1, 2)),
                Some(Repeat::Star),
                Some(Repeat::Plus),
                Some(Repeat::Optional),
            ]
        );
    }

    #[test]
    fn syntax_error_reports_line_and_column() {
        let err = load("start: a\nbroken b c\n").unwrap_err();
        assert_eq!(err.position.line, 2);
        assert!(matches!(
            err.kind,
            crate::errors::GrammarErrorKind::Syntax { .. }
        ));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let rules = rules("// leading comment\n\nstart: a  // trailing\n# hash comment\n");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].body[0].items.len(), 1);
    }
}
