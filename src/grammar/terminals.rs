//! Terminal compilation.
//!
//! Every named terminal becomes a single [`Pattern`]. A definition consisting
//! of one literal or one regex keeps it as is; anything more involved is
//! compiled into one regular expression, with referenced terminals inlined.

use std::collections::{HashMap, HashSet};

use crate::errors::GrammarError;
use crate::grammar::loader::{Alternative, IgnoreSource, Item, ItemKind, Repeat, TerminalSource};
use crate::grammar::Pattern;
use crate::grammar_err;
use crate::lexer::{Position, Span};

/// A terminal ready to be turned into a [`crate::grammar::TerminalDef`].
#[derive(Debug, Clone)]
pub(crate) struct CompiledTerminal {
    pub name: String,
    pub pattern: Pattern,
    pub priority: i32,
    pub anonymous: bool,
    pub position: Position,
}

// ============================================================================
// NAMED TERMINALS
// ============================================================================

pub(crate) struct TerminalCompiler<'a> {
    sources: &'a [TerminalSource],
    by_name: HashMap<&'a str, &'a TerminalSource>,
    rule_names: &'a HashSet<&'a str>,
    /// Compiled regex per terminal name.
    cache: HashMap<String, String>,
}

impl<'a> TerminalCompiler<'a> {
    pub fn new(sources: &'a [TerminalSource], rule_names: &'a HashSet<&'a str>) -> Self {
        Self {
            sources,
            by_name: sources.iter().map(|s| (s.name.as_str(), s)).collect(),
            rule_names,
            cache: HashMap::new(),
        }
    }

    /// Compiles every terminal, in definition order.
    pub fn compile_all(mut self) -> Result<Vec<CompiledTerminal>, GrammarError> {
        let mut compiled = Vec::with_capacity(self.sources.len());
        for source in self.sources {
            let pattern = match single_pattern(&source.body) {
                Some(pattern) => pattern.clone(),
                None => Pattern::regex(self.regex_of(source, &mut Vec::new())?),
            };
            check_pattern(&source.name, &pattern, source.position, source.span)?;
            compiled.push(CompiledTerminal {
                name: source.name.clone(),
                pattern,
                priority: source.priority,
                anonymous: false,
                position: source.position,
            });
        }
        Ok(compiled)
    }

    fn regex_of(
        &mut self,
        source: &'a TerminalSource,
        stack: &mut Vec<&'a str>,
    ) -> Result<String, GrammarError> {
        if let Some(regex) = self.cache.get(&source.name) {
            return Ok(regex.clone());
        }
        if stack.contains(&source.name.as_str()) {
            return Err(grammar_err!(
                RecursiveTerminal {
                    terminal: source.name.as_str()
                },
                source.position
            )
            .with_span(source.span));
        }

        stack.push(&source.name);
        let regex = self.alternatives(&source.name, &source.body, stack)?;
        stack.pop();

        self.cache.insert(source.name.clone(), regex.clone());
        Ok(regex)
    }

    fn alternatives(
        &mut self,
        terminal: &str,
        alternatives: &'a [Alternative],
        stack: &mut Vec<&'a str>,
    ) -> Result<String, GrammarError> {
        let mut parts = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            if let Some((alias, position)) = &alternative.alias {
                return Err(grammar_err!(InvalidAlias { name: alias.as_str() }, *position)
                    .with_help(format!("terminal '{}' cannot use aliases", terminal)));
            }
            let mut part = String::new();
            for item in &alternative.items {
                part.push_str(&self.item(terminal, item, stack)?);
            }
            parts.push(part);
        }
        Ok(parts.join("|"))
    }

    fn item(
        &mut self,
        terminal: &str,
        item: &'a Item,
        stack: &mut Vec<&'a str>,
    ) -> Result<String, GrammarError> {
        let regex = match &item.kind {
            ItemKind::Pattern(pattern) => format!("(?:{})", pattern.to_regex()),
            ItemKind::Terminal(name) => {
                let source = self.by_name.get(name.as_str()).copied().ok_or_else(|| {
                    grammar_err!(
                        UndefinedSymbol {
                            name: name.as_str(),
                            referenced_by: terminal
                        },
                        item.position
                    )
                    .with_span(item.span)
                })?;
                format!("(?:{})", self.regex_of(source, stack)?)
            }
            ItemKind::Rule(name) => {
                let kind_hint = if self.rule_names.contains(name.as_str()) {
                    "terminals may only reference terminals"
                } else {
                    "no such rule is defined either"
                };
                return Err(grammar_err!(
                    RuleInTerminal {
                        terminal: terminal,
                        rule: name.as_str()
                    },
                    item.position
                )
                .with_span(item.span)
                .with_help(kind_hint));
            }
            ItemKind::Group(alternatives) => {
                format!("(?:{})", self.alternatives(terminal, alternatives, stack)?)
            }
            ItemKind::Maybe(alternatives) => {
                format!("(?:{})?", self.alternatives(terminal, alternatives, stack)?)
            }
            ItemKind::Repeat(inner, repeat) => {
                let inner = self.item(terminal, inner, stack)?;
                match repeat {
                    Repeat::Optional => format!("{}?", inner),
                    Repeat::Star => format!("{}*", inner),
                    Repeat::Plus => format!("{}+", inner),
                    Repeat::Exactly(n) => format!("{}{{{}}}", inner, n),
                    Repeat::Between(min, max) => format!("{}{{{},{}}}", inner, min, max),
                }
            }
        };
        Ok(regex)
    }
}

fn single_pattern(body: &[Alternative]) -> Option<&Pattern> {
    match body {
        [Alternative { items, alias: None }] => match items.as_slice() {
            [Item {
                kind: ItemKind::Pattern(pattern),
                ..
            }] => Some(pattern),
            _ => None,
        },
        _ => None,
    }
}

/// Rejects patterns that do not parse or that can match the empty string.
fn check_pattern(
    name: &str,
    pattern: &Pattern,
    position: Position,
    span: Span,
) -> Result<(), GrammarError> {
    let hir = regex_syntax::parse(&pattern.to_regex()).map_err(|e| {
        grammar_err!(
            InvalidPattern {
                terminal: name,
                reason: e.to_string()
            },
            position
        )
        .with_span(span)
    })?;
    if hir.properties().minimum_len() == Some(0) {
        return Err(grammar_err!(EmptyTerminal { terminal: name }, position).with_span(span));
    }
    Ok(())
}

// ============================================================================
// IGNORES
// ============================================================================

/// Turns `%ignore` directives into terminal names, defining `__IGNORE_n`
/// terminals for directives that are not a bare terminal reference.
pub(crate) fn collect_ignores(
    ignores: Vec<IgnoreSource>,
    terminals: &mut Vec<TerminalSource>,
) -> Vec<String> {
    let mut names = Vec::with_capacity(ignores.len());
    let mut synthesized = 0;
    for ignore in ignores {
        if let [Alternative { items, alias: None }] = ignore.body.as_slice() {
            if let [Item {
                kind: ItemKind::Terminal(name),
                ..
            }] = items.as_slice()
            {
                names.push(name.clone());
                continue;
            }
        }

        let name = format!("__IGNORE_{}", synthesized);
        synthesized += 1;
        terminals.push(TerminalSource {
            name: name.clone(),
            priority: 0,
            body: ignore.body,
            position: ignore.position,
            span: Span::new(ignore.position.offset, ignore.position.offset + 1),
        });
        names.push(name);
    }
    names
}

// ============================================================================
// ANONYMOUS TERMINALS
// ============================================================================

/// Interns literals and regexes written inline in rules.
pub(crate) struct AnonymousTerminals {
    by_pattern: HashMap<Pattern, String>,
    taken: HashSet<String>,
    created: Vec<CompiledTerminal>,
    next_anon: usize,
}

impl AnonymousTerminals {
    pub fn new(named: &[CompiledTerminal]) -> Self {
        let mut by_pattern = HashMap::new();
        for terminal in named {
            if terminal.name.starts_with("__IGNORE_") {
                continue;
            }
            by_pattern
                .entry(terminal.pattern.clone())
                .or_insert_with(|| terminal.name.clone());
        }
        Self {
            by_pattern,
            taken: named.iter().map(|t| t.name.clone()).collect(),
            created: Vec::new(),
            next_anon: 0,
        }
    }

    /// Returns the terminal name for `pattern`, creating one on first use.
    pub fn intern(
        &mut self,
        pattern: &Pattern,
        position: Position,
        span: Span,
    ) -> Result<String, GrammarError> {
        if let Some(name) = self.by_pattern.get(pattern) {
            return Ok(name.clone());
        }

        let name = match pattern {
            Pattern::Literal { value, .. } => literal_name(value)
                .filter(|name| !self.taken.contains(name))
                .unwrap_or_else(|| self.anon_name()),
            Pattern::Regex { .. } => self.anon_name(),
        };
        check_pattern(&name, pattern, position, span)?;

        self.taken.insert(name.clone());
        self.by_pattern.insert(pattern.clone(), name.clone());
        self.created.push(CompiledTerminal {
            name: name.clone(),
            pattern: pattern.clone(),
            priority: 0,
            anonymous: true,
            position,
        });
        Ok(name)
    }

    fn anon_name(&mut self) -> String {
        loop {
            let name = format!("__ANON_{}", self.next_anon);
            self.next_anon += 1;
            if !self.taken.contains(&name) {
                return name;
            }
        }
    }

    /// Terminals created so far, in order of first use.
    pub fn into_terminals(self) -> Vec<CompiledTerminal> {
        self.created
    }
}

/// A readable name for a literal: `"{"` is `LBRACE`, `"true"` is `TRUE`.
fn literal_name(value: &str) -> Option<String> {
    let name = match value {
        "." => "DOT",
        "," => "COMMA",
        ":" => "COLON",
        ";" => "SEMICOLON",
        "+" => "PLUS",
        "-" => "MINUS",
        "*" => "STAR",
        "/" => "SLASH",
        "\\" => "BACKSLASH",
        "|" => "VBAR",
        "?" => "QMARK",
        "!" => "BANG",
        "@" => "AT",
        "#" => "HASH",
        "$" => "DOLLAR",
        "%" => "PERCENT",
        "^" => "CIRCUMFLEX",
        "&" => "AMPERSAND",
        "_" => "UNDERSCORE",
        "<" => "LESSTHAN",
        ">" => "MORETHAN",
        "=" => "EQUAL",
        "\"" => "DBLQUOTE",
        "'" => "QUOTE",
        "`" => "BACKQUOTE",
        "~" => "TILDE",
        "(" => "LPAR",
        ")" => "RPAR",
        "{" => "LBRACE",
        "}" => "RBRACE",
        "[" => "LSQB",
        "]" => "RSQB",
        "\n" => "NEWLINE",
        "\r\n" => "CRLF",
        "\t" => "TAB",
        " " => "SPACE",
        _ => {
            let mut chars = value.chars();
            let first = chars.next()?;
            if first.is_alphabetic() && chars.all(|c| c.is_alphanumeric() || c == '_') {
                return Some(value.to_uppercase());
            }
            return None;
        }
    };
    Some(name.to_string())
}
