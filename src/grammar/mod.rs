//! The grammar model.
//!
//! A [`Grammar`] is compiled once from grammar description text and is
//! immutable afterwards. Rules, terminals and productions live in arenas and
//! refer to each other through index newtypes, so the model can be shared
//! freely between lexers and parsers.
//!
//! Compilation runs in stages:
//!
//! 1. `loader` parses the text with the pest meta-grammar into definitions.
//! 2. `common` resolves `%import` directives against the built-in library.
//! 3. `validators` rejects duplicate and undefined names.
//! 4. `terminals` compiles terminal expressions to regular expressions.
//! 5. `ebnf` flattens rule bodies into plain productions, interning inline
//!    literals as anonymous terminals.

mod common;
mod ebnf;
mod loader;
mod terminals;
mod validators;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex_automata::meta::Regex;
use tracing::debug;

use crate::errors::{GrammarError, LarchError};
use crate::grammar_err;
use crate::lexer::{self, Position, Tokens};
use crate::options::ParserOptions;
use crate::parser::{self, lalr::ParseTable};
use crate::tree::ParseTree;

use self::ebnf::BnfRule;
use self::loader::Definition;
use self::terminals::{AnonymousTerminals, TerminalCompiler};

// ============================================================================
// INDEX TYPES
// ============================================================================

/// Index of a rule in [`Grammar::rules`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

/// Index of a terminal in [`Grammar::terminals`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub u32);

/// Index of a production in [`Grammar::productions`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionId(pub u32);

impl RuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TerminalId {
    /// The end-of-input pseudo terminal. Never produced by the lexer.
    pub const END: TerminalId = TerminalId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ProductionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A grammar symbol: either a terminal or a rule (nonterminal).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(TerminalId),
    Rule(RuleId),
}

// ============================================================================
// PATTERNS
// ============================================================================

/// What a terminal matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Exact text, optionally compared case-insensitively.
    Literal {
        value: String,
        case_insensitive: bool,
    },
    /// A regular expression in Rust `regex` syntax, plus inline flags (`imsux`).
    Regex { source: String, flags: String },
}

impl Pattern {
    pub fn literal(value: impl Into<String>) -> Self {
        Pattern::Literal {
            value: value.into(),
            case_insensitive: false,
        }
    }

    pub fn regex(source: impl Into<String>) -> Self {
        Pattern::Regex {
            source: source.into(),
            flags: String::new(),
        }
    }

    /// A single-character class `[low-high]`.
    pub fn range(low: char, high: char) -> Self {
        Pattern::regex(format!(
            "[{}-{}]",
            regex_syntax::escape(low.encode_utf8(&mut [0; 4])),
            regex_syntax::escape(high.encode_utf8(&mut [0; 4]))
        ))
    }

    /// The pattern as a standalone regular expression.
    pub fn to_regex(&self) -> String {
        match self {
            Pattern::Literal {
                value,
                case_insensitive: false,
            } => regex_syntax::escape(value),
            Pattern::Literal {
                value,
                case_insensitive: true,
            } => format!("(?i:{})", regex_syntax::escape(value)),
            Pattern::Regex { source, flags } if flags.is_empty() => source.clone(),
            // The newline ends a trailing `#` comment under the `x` flag.
            Pattern::Regex { source, flags } if flags.contains('x') => {
                format!("(?{}:{}\n)", flags, source)
            }
            Pattern::Regex { source, flags } => format!("(?{}:{})", flags, source),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Pattern::Literal { .. })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal {
                value,
                case_insensitive,
            } => write!(f, "{:?}{}", value, if *case_insensitive { "i" } else { "" }),
            Pattern::Regex { source, flags } => write!(f, "/{}/{}", source, flags),
        }
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// A compiled terminal.
#[derive(Debug, Clone)]
pub struct TerminalDef {
    pub name: Arc<str>,
    pub pattern: Pattern,
    pub priority: i32,
    /// Tokens of `_NAME` terminals are dropped from trees.
    pub filtered: bool,
    /// Created for an inline literal or regex inside a rule.
    pub anonymous: bool,
    /// Declaration order; the last lexer tie-breaker.
    pub order: usize,
    pub position: Position,
    matcher: Regex,
}

impl TerminalDef {
    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }
}

/// Tree-shaping flags of a rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RuleOptions {
    /// `_name`: children are spliced into the parent.
    pub inline: bool,
    /// `?name`: replaced by its child when it has exactly one.
    pub expand_single: bool,
    /// `!name`: anonymous tokens are kept.
    pub keep_all_tokens: bool,
}

#[derive(Debug, Clone)]
pub struct RuleDef {
    pub name: Arc<str>,
    pub options: RuleOptions,
    pub priority: i32,
    pub productions: Vec<ProductionId>,
    pub position: Position,
}

/// One alternative of a rule, after EBNF expansion.
#[derive(Debug, Clone)]
pub struct Production {
    pub id: ProductionId,
    pub origin: RuleId,
    pub symbols: Vec<Symbol>,
    /// Per symbol: the token is dropped from the tree unless tokens are kept.
    pub filter_out: Vec<bool>,
    /// `-> alias`: the tree built for this production takes this name.
    pub alias: Option<Arc<str>>,
}

// ============================================================================
// GRAMMAR
// ============================================================================

/// A compiled, immutable context-free grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: Vec<RuleDef>,
    terminals: Vec<TerminalDef>,
    productions: Vec<Production>,
    ignored: Vec<bool>,
    rule_index: HashMap<Arc<str>, RuleId>,
    terminal_index: HashMap<Arc<str>, TerminalId>,
    /// LALR(1) tables by start rule, built on first use.
    tables: Vec<OnceCell<Arc<ParseTable>>>,
}

/// Compiles grammar description text into a [`Grammar`].
///
/// Errors carry the grammar text, so they render with a snippet.
pub fn compile_grammar(text: &str) -> Result<Grammar, GrammarError> {
    compile(text).map_err(|e| e.with_source("grammar", text))
}

fn compile(text: &str) -> Result<Grammar, GrammarError> {
    let definitions = common::resolve_imports(loader::load(text)?)?;
    validators::check_definitions(&definitions)?;

    let mut rule_sources = Vec::new();
    let mut terminal_sources = Vec::new();
    let mut ignore_sources = Vec::new();
    for definition in definitions {
        match definition {
            Definition::Rule(rule) => rule_sources.push(rule),
            Definition::Terminal(term) => terminal_sources.push(term),
            Definition::Ignore(ignore) => ignore_sources.push(ignore),
            Definition::Import(_) => {}
        }
    }

    let ignored_names = terminals::collect_ignores(ignore_sources, &mut terminal_sources);
    let rule_names: HashSet<&str> = rule_sources.iter().map(|r| r.name.as_str()).collect();
    let named = TerminalCompiler::new(&terminal_sources, &rule_names).compile_all()?;

    let mut anonymous = AnonymousTerminals::new(&named);
    let bnf_rules = ebnf::expand_rules(&rule_sources, &mut anonymous)?;

    let mut builder = GrammarBuilder::default();
    for terminal in named.into_iter().chain(anonymous.into_terminals()) {
        builder.add_terminal(terminal)?;
    }
    for name in &ignored_names {
        if let Some(id) = builder.terminal_index.get(name.as_str()) {
            builder.ignored[id.index()] = true;
        }
    }
    builder.add_rules(bnf_rules);

    let grammar = builder.finish();
    debug!(
        rules = grammar.rules.len(),
        terminals = grammar.terminals.len(),
        productions = grammar.productions.len(),
        "compiled grammar"
    );
    Ok(grammar)
}

impl Grammar {
    pub fn rules(&self) -> &[RuleDef] {
        &self.rules
    }

    pub fn terminals(&self) -> &[TerminalDef] {
        &self.terminals
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn rule(&self, id: RuleId) -> &RuleDef {
        &self.rules[id.index()]
    }

    pub fn terminal(&self, id: TerminalId) -> &TerminalDef {
        &self.terminals[id.index()]
    }

    pub fn production(&self, id: ProductionId) -> &Production {
        &self.productions[id.index()]
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rule_index.get(name).copied()
    }

    pub fn terminal_id(&self, name: &str) -> Option<TerminalId> {
        self.terminal_index.get(name).copied()
    }

    /// Name of a terminal, with `$END` for [`TerminalId::END`].
    pub fn terminal_name(&self, id: TerminalId) -> &str {
        if id == TerminalId::END {
            crate::errors::END_OF_INPUT
        } else {
            &self.terminals[id.index()].name
        }
    }

    /// Whether tokens of this terminal are discarded by the lexer.
    pub fn is_ignored(&self, id: TerminalId) -> bool {
        self.ignored.get(id.index()).copied().unwrap_or(false)
    }

    /// Resolves a start rule name.
    pub fn start_rule(&self, name: &str) -> Result<RuleId, GrammarError> {
        self.rule_id(name).ok_or_else(|| {
            let mut known: Vec<&str> = self
                .rules
                .iter()
                .filter(|r| !r.options.inline)
                .map(|r| r.name.as_ref())
                .collect();
            known.sort_unstable();
            grammar_err!(UnknownStart { name: name }, Position::start())
                .with_help(format!("defined rules: {}", known.join(", ")))
        })
    }

    /// Lazily splits `text` into tokens using every terminal.
    pub fn tokenize<'g, 's>(&'g self, text: &'s str) -> Tokens<'g, 's> {
        lexer::tokenize(text, self)
    }

    /// The LALR(1) table for `start`. Built on the first request and shared
    /// by every later parse and [`crate::Parser`] over this grammar.
    pub fn parse_table(&self, start: RuleId) -> Arc<ParseTable> {
        self.tables[start.index()]
            .get_or_init(|| Arc::new(ParseTable::build(self, start)))
            .clone()
    }

    /// Parses `text` from `start` with the default options.
    pub fn parse(&self, text: &str, start: &str) -> Result<ParseTree, LarchError> {
        let start_id = self.start_rule(start)?;
        let table = self.parse_table(start_id);
        let options = ParserOptions::default();
        let name = &self.rule(start_id).name;
        let root = parser::parse_text(
            self,
            &table,
            name,
            options.lexer,
            options.keep_all_tokens,
            text,
        )?;
        Ok(ParseTree::new(root, name.clone(), Arc::from(text)))
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

#[derive(Default)]
struct GrammarBuilder {
    rules: Vec<RuleDef>,
    terminals: Vec<TerminalDef>,
    productions: Vec<Production>,
    ignored: Vec<bool>,
    rule_index: HashMap<Arc<str>, RuleId>,
    terminal_index: HashMap<Arc<str>, TerminalId>,
}

impl GrammarBuilder {
    fn add_terminal(&mut self, terminal: terminals::CompiledTerminal) -> Result<(), GrammarError> {
        let regex = terminal.pattern.to_regex();
        let matcher = Regex::new(&regex).map_err(|e| {
            grammar_err!(
                InvalidPattern {
                    terminal: terminal.name.as_str(),
                    reason: e.to_string()
                },
                terminal.position
            )
        })?;

        let id = TerminalId(self.terminals.len() as u32);
        let name: Arc<str> = Arc::from(terminal.name.as_str());
        self.terminal_index.insert(name.clone(), id);
        self.terminals.push(TerminalDef {
            filtered: terminal.name.starts_with('_') && !terminal.anonymous,
            name,
            pattern: terminal.pattern,
            priority: terminal.priority,
            anonymous: terminal.anonymous,
            order: id.index(),
            position: terminal.position,
            matcher,
        });
        self.ignored.push(false);
        Ok(())
    }

    fn add_rules(&mut self, rules: Vec<BnfRule>) {
        for (i, rule) in rules.iter().enumerate() {
            let name: Arc<str> = Arc::from(rule.name.as_str());
            self.rule_index.insert(name.clone(), RuleId(i as u32));
            self.rules.push(RuleDef {
                name,
                options: rule.options,
                priority: rule.priority,
                productions: Vec::new(),
                position: rule.position,
            });
        }

        for (i, rule) in rules.into_iter().enumerate() {
            let origin = RuleId(i as u32);
            for alternative in rule.alternatives {
                let id = ProductionId(self.productions.len() as u32);
                let mut symbols = Vec::with_capacity(alternative.items.len());
                let mut filter_out = Vec::with_capacity(alternative.items.len());
                for item in alternative.items {
                    let (symbol, filtered) = self.resolve(&item);
                    symbols.push(symbol);
                    filter_out.push(filtered);
                }
                self.productions.push(Production {
                    id,
                    origin,
                    symbols,
                    filter_out,
                    alias: alternative.alias.map(|a| Arc::from(a.as_str())),
                });
                self.rules[origin.index()].productions.push(id);
            }
        }
    }

    /// Names were validated before expansion, so every lookup succeeds.
    fn resolve(&self, item: &ebnf::BnfItem) -> (Symbol, bool) {
        match &item.symbol {
            ebnf::BnfSymbol::Rule(name) => {
                let id = self.rule_index.get(name.as_str()).copied().unwrap_or(RuleId(0));
                (Symbol::Rule(id), false)
            }
            ebnf::BnfSymbol::Terminal(name) => {
                let id = self
                    .terminal_index
                    .get(name.as_str())
                    .copied()
                    .unwrap_or(TerminalId(0));
                let filtered = item.filter_out || self.terminals[id.index()].filtered;
                (Symbol::Terminal(id), filtered)
            }
        }
    }

    fn finish(self) -> Grammar {
        Grammar {
            tables: self.rules.iter().map(|_| OnceCell::new()).collect(),
            rules: self.rules,
            terminals: self.terminals,
            productions: self.productions,
            ignored: self.ignored,
            rule_index: self.rule_index,
            terminal_index: self.terminal_index,
        }
    }
}
