//! EBNF to BNF expansion.
//!
//! Rule bodies are flattened into plain alternatives. Optional items and
//! groups multiply out into several alternatives; `x+` becomes a
//! left-recursive inline helper rule; `x*` is `(x+)?`; bounded repetition
//! repeats the item.

use std::collections::{HashMap, HashSet};

use crate::errors::GrammarError;
use crate::grammar::loader::{Alternative, Item, ItemKind, Repeat, RuleSource};
use crate::grammar::terminals::AnonymousTerminals;
use crate::grammar::RuleOptions;
use crate::grammar_err;
use crate::lexer::Position;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum BnfSymbol {
    Rule(String),
    Terminal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BnfItem {
    pub symbol: BnfSymbol,
    /// Anonymous string literal, dropped from trees by default.
    pub filter_out: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct BnfAlternative {
    pub items: Vec<BnfItem>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct BnfRule {
    pub name: String,
    pub options: RuleOptions,
    pub priority: i32,
    pub position: Position,
    pub alternatives: Vec<BnfAlternative>,
}

type Sequences = Vec<Vec<BnfItem>>;

/// Expands every rule. Helper rules follow the user's rules, in creation order.
pub(crate) fn expand_rules(
    rules: &[RuleSource],
    anonymous: &mut AnonymousTerminals,
) -> Result<Vec<BnfRule>, GrammarError> {
    let mut expander = Expander {
        anonymous,
        helpers: Vec::new(),
        helper_names: HashMap::new(),
    };

    let mut expanded = Vec::with_capacity(rules.len());
    for rule in rules {
        let mut alternatives = Vec::new();
        let mut seen = HashSet::new();
        for alternative in &rule.body {
            let context = Context {
                rule: &rule.name,
                keep_all_tokens: rule.options.keep_all_tokens,
            };
            for items in expander.sequence(context, &alternative.items)? {
                if seen.insert(items.clone()) {
                    alternatives.push(BnfAlternative {
                        items,
                        alias: alternative.alias.as_ref().map(|(name, _)| name.clone()),
                    });
                }
            }
        }
        expanded.push(BnfRule {
            name: rule.name.clone(),
            options: rule.options,
            priority: rule.priority,
            position: rule.position,
            alternatives,
        });
    }

    expanded.extend(expander.helpers);
    Ok(expanded)
}

#[derive(Clone, Copy)]
struct Context<'r> {
    rule: &'r str,
    keep_all_tokens: bool,
}

struct Expander<'t> {
    anonymous: &'t mut AnonymousTerminals,
    helpers: Vec<BnfRule>,
    /// (item text, keep_all_tokens) to helper name, so `x+` used twice shares one rule.
    helper_names: HashMap<(String, bool), String>,
}

impl Expander<'_> {
    fn sequence(&mut self, context: Context, items: &[Item]) -> Result<Sequences, GrammarError> {
        let mut sequences: Sequences = vec![Vec::new()];
        for item in items {
            let options = self.item(context, item)?;
            sequences = product(&sequences, &options);
        }
        Ok(sequences)
    }

    fn group(
        &mut self,
        context: Context,
        alternatives: &[Alternative],
    ) -> Result<Sequences, GrammarError> {
        let mut sequences = Vec::new();
        for alternative in alternatives {
            if let Some((alias, position)) = &alternative.alias {
                return Err(grammar_err!(InvalidAlias { name: alias.as_str() }, *position));
            }
            sequences.extend(self.sequence(context, &alternative.items)?);
        }
        Ok(sequences)
    }

    fn item(&mut self, context: Context, item: &Item) -> Result<Sequences, GrammarError> {
        let sequences = match &item.kind {
            ItemKind::Rule(name) => vec![vec![BnfItem {
                symbol: BnfSymbol::Rule(name.clone()),
                filter_out: false,
            }]],
            ItemKind::Terminal(name) => vec![vec![BnfItem {
                symbol: BnfSymbol::Terminal(name.clone()),
                filter_out: false,
            }]],
            ItemKind::Pattern(pattern) => {
                let name = self.anonymous.intern(pattern, item.position, item.span)?;
                vec![vec![BnfItem {
                    symbol: BnfSymbol::Terminal(name),
                    filter_out: pattern.is_literal(),
                }]]
            }
            ItemKind::Group(alternatives) => self.group(context, alternatives)?,
            ItemKind::Maybe(alternatives) => {
                let mut sequences = self.group(context, alternatives)?;
                sequences.push(Vec::new());
                sequences
            }
            ItemKind::Repeat(inner, repeat) => match *repeat {
                Repeat::Optional => {
                    let mut sequences = self.item(context, inner)?;
                    sequences.push(Vec::new());
                    sequences
                }
                Repeat::Plus => vec![vec![self.plus_helper(context, inner)?]],
                Repeat::Star => vec![vec![self.plus_helper(context, inner)?], Vec::new()],
                Repeat::Exactly(n) => {
                    let options = self.item(context, inner)?;
                    repeat_exactly(&options, n)
                }
                Repeat::Between(min, max) => {
                    let options = self.item(context, inner)?;
                    (min..=max)
                        .flat_map(|n| repeat_exactly(&options, n))
                        .collect()
                }
            },
        };
        Ok(sequences)
    }

    /// `helper: x | helper x`, inlined into whatever uses it.
    fn plus_helper(&mut self, context: Context, inner: &Item) -> Result<BnfItem, GrammarError> {
        let key = (inner.text.clone(), context.keep_all_tokens);
        if let Some(name) = self.helper_names.get(&key) {
            return Ok(BnfItem {
                symbol: BnfSymbol::Rule(name.clone()),
                filter_out: false,
            });
        }

        let options = self.item(context, inner)?;
        let name = format!("__{}_plus_{}", context.rule, self.helpers.len());
        let recurse = BnfItem {
            symbol: BnfSymbol::Rule(name.clone()),
            filter_out: false,
        };

        let mut alternatives = Vec::with_capacity(options.len() * 2);
        for items in &options {
            alternatives.push(BnfAlternative {
                items: items.clone(),
                alias: None,
            });
        }
        for items in &options {
            let mut recursive = vec![recurse.clone()];
            recursive.extend(items.iter().cloned());
            alternatives.push(BnfAlternative {
                items: recursive,
                alias: None,
            });
        }

        self.helpers.push(BnfRule {
            name: name.clone(),
            options: RuleOptions {
                inline: true,
                expand_single: false,
                keep_all_tokens: context.keep_all_tokens,
            },
            priority: 0,
            position: inner.position,
            alternatives,
        });
        self.helper_names.insert(key, name);
        Ok(recurse)
    }
}

fn product(prefixes: &Sequences, suffixes: &Sequences) -> Sequences {
    let mut combined = Vec::with_capacity(prefixes.len() * suffixes.len());
    for prefix in prefixes {
        for suffix in suffixes {
            let mut items = prefix.clone();
            items.extend(suffix.iter().cloned());
            combined.push(items);
        }
    }
    combined
}

fn repeat_exactly(options: &Sequences, n: usize) -> Sequences {
    let mut sequences: Sequences = vec![Vec::new()];
    for _ in 0..n {
        sequences = product(&sequences, options);
    }
    sequences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GrammarErrorKind;
    use crate::grammar::loader::{self, Definition};

    fn expand(text: &str) -> Result<Vec<BnfRule>, GrammarError> {
        let rules: Vec<RuleSource> = loader::load(text)
            .unwrap()
            .into_iter()
            .filter_map(|d| match d {
                Definition::Rule(r) => Some(r),
                _ => None,
            })
            .collect();
        let mut anonymous = AnonymousTerminals::new(&[]);
        expand_rules(&rules, &mut anonymous)
    }

    fn names(alternative: &BnfAlternative) -> Vec<String> {
        alternative
            .items
            .iter()
            .map(|i| match &i.symbol {
                BnfSymbol::Rule(n) | BnfSymbol::Terminal(n) => n.clone(),
            })
            .collect()
    }

    #[test]
    fn optional_items_multiply_out() {
        let rules = expand("r: a [b] c?\n").unwrap();
        let alternatives: Vec<Vec<String>> = rules[0].alternatives.iter().map(names).collect();
        assert_eq!(
            alternatives,
            vec![
                vec!["a", "b", "c"],
                vec!["a", "b"],
                vec!["a", "c"],
                vec!["a"],
            ]
        );
    }

    #[test]
    fn plus_creates_left_recursive_inline_helper() {
        let rules = expand("list: item (\",\" item)*\n").unwrap();
        assert_eq!(rules.len(), 2);
        let helper = &rules[1];
        assert_eq!(helper.name, "__list_plus_0");
        assert!(helper.options.inline);
        assert_eq!(names(&helper.alternatives[0]), vec!["COMMA", "item"]);
        assert_eq!(
            names(&helper.alternatives[1]),
            vec!["__list_plus_0", "COMMA", "item"]
        );
        assert!(helper.alternatives[0].items[0].filter_out);
        assert_eq!(rules[0].alternatives.len(), 2);
    }

    #[test]
    fn identical_repetitions_share_a_helper() {
        let rules = expand("r: a+ b a+\n").unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn bounded_repetition_and_duplicates() {
        let rules = expand("r: a ~ 1..2 | a\n").unwrap();
        let alternatives: Vec<Vec<String>> = rules[0].alternatives.iter().map(names).collect();
        assert_eq!(alternatives, vec![vec!["a"], vec!["a", "a"]]);
    }

    #[test]
    fn alias_inside_group_is_rejected() {
        let err = expand("r: (a -> x | b)\n").unwrap_err();
        assert!(matches!(err.kind, GrammarErrorKind::InvalidAlias { .. }));
    }
}
