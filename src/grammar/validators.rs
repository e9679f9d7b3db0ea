//! Name-level checks over loaded definitions.
//!
//! Runs before any compilation so that errors point at the definition or
//! reference the user wrote.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::errors::GrammarError;
use crate::grammar::loader::{Alternative, Definition, Item, ItemKind};
use crate::grammar_err;
use crate::lexer::Position;

/// Prefix of generated helper rules and terminals.
const RESERVED_PREFIX: &str = "__";

pub(crate) fn check_definitions(definitions: &[Definition]) -> Result<(), GrammarError> {
    let defined = check_duplicates(definitions)?;

    let mut referenced = HashSet::new();
    for definition in definitions {
        let (owner, body) = match definition {
            Definition::Rule(rule) => (rule.name.as_str(), &rule.body),
            Definition::Terminal(term) => (term.name.as_str(), &term.body),
            Definition::Ignore(ignore) => ("%ignore", &ignore.body),
            Definition::Import(_) => continue,
        };
        check_references(owner, body, &defined, &mut referenced)?;
    }

    for name in defined.keys() {
        if !referenced.contains(*name) {
            debug!(symbol = %name, "symbol is defined but never referenced");
        }
    }
    Ok(())
}

/// Returns every defined name with the position of its definition.
fn check_duplicates(definitions: &[Definition]) -> Result<HashMap<&str, Position>, GrammarError> {
    let mut defined: HashMap<&str, Position> = HashMap::new();
    for definition in definitions {
        let (name, position, span) = match definition {
            Definition::Rule(rule) => (rule.name.as_str(), rule.position, rule.span),
            Definition::Terminal(term) => (term.name.as_str(), term.position, term.span),
            _ => continue,
        };
        if name.starts_with(RESERVED_PREFIX) {
            return Err(grammar_err!(ReservedName { name: name }, position)
                .with_span(span)
                .with_help("names starting with '__' are used for generated rules and terminals"));
        }
        if let Some(first) = defined.get(name) {
            return Err(grammar_err!(
                DuplicateDefinition {
                    name: name,
                    first_line: first.line
                },
                position
            )
            .with_span(span));
        }
        defined.insert(name, position);
    }
    Ok(defined)
}

fn check_references<'a>(
    owner: &str,
    body: &'a [Alternative],
    defined: &HashMap<&str, Position>,
    referenced: &mut HashSet<&'a str>,
) -> Result<(), GrammarError> {
    // Explicit stack; nesting depth follows the grammar text.
    let mut pending: Vec<&'a Item> = body.iter().flat_map(|a| a.items.iter()).rev().collect();
    while let Some(item) = pending.pop() {
        match &item.kind {
            ItemKind::Rule(name) | ItemKind::Terminal(name) => {
                if !defined.contains_key(name.as_str()) {
                    return Err(grammar_err!(
                        UndefinedSymbol {
                            name: name.as_str(),
                            referenced_by: owner
                        },
                        item.position
                    )
                    .with_span(item.span));
                }
                referenced.insert(name.as_str());
            }
            ItemKind::Pattern(_) => {}
            ItemKind::Group(alternatives) | ItemKind::Maybe(alternatives) => {
                pending.extend(alternatives.iter().flat_map(|a| a.items.iter()).rev());
            }
            ItemKind::Repeat(inner, _) => pending.push(inner),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GrammarErrorKind;
    use crate::grammar::loader;

    fn check(text: &str) -> Result<(), GrammarError> {
        check_definitions(&loader::load(text).unwrap())
    }

    #[test]
    fn duplicate_mentions_first_line() {
        let err = check("start: a\na: \"x\"\na: \"y\"\n").unwrap_err();
        assert_eq!(
            err.kind,
            GrammarErrorKind::DuplicateDefinition {
                name: "a".into(),
                first_line: 2
            }
        );
        assert_eq!(err.position.line, 3);
    }

    #[test]
    fn undefined_reference_points_at_the_reference() {
        let err = check("start: a\na: \"x\" (b | MISSING)\nb: \"y\"\n").unwrap_err();
        assert_eq!(
            err.kind,
            GrammarErrorKind::UndefinedSymbol {
                name: "MISSING".into(),
                referenced_by: "a".into()
            }
        );
        assert_eq!(err.position.line, 2);
        assert_eq!(err.position.column, 13);
    }

    #[test]
    fn generated_name_prefix_is_reserved() {
        let err = check("start: A+ __start_plus_0\n__start_plus_0: B\nA: \"a\"\nB: \"b\"\n")
            .unwrap_err();
        assert_eq!(
            err.kind,
            GrammarErrorKind::ReservedName {
                name: "__start_plus_0".into()
            }
        );
        assert_eq!(err.position.line, 2);

        let err = check("start: __ANON_0\n__ANON_0: \"x\"\n").unwrap_err();
        assert!(matches!(err.kind, GrammarErrorKind::ReservedName { .. }));
    }

    #[test]
    fn ignore_references_are_checked() {
        let err = check("start: \"x\"\n%ignore WS\n").unwrap_err();
        assert!(matches!(err.kind, GrammarErrorKind::UndefinedSymbol { .. }));
    }
}
