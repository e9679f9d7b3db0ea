//! The built-in `common` terminal library.
//!
//! `common.lark` is compiled once, on first use. An imported terminal is
//! copied into the importing grammar as a single precompiled pattern, so the
//! library's helper terminals never leak into the importer's namespace.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::errors::GrammarError;
use crate::grammar::loader::{self, Alternative, Definition, Item, ItemKind, TerminalSource};
use crate::grammar::terminals::TerminalCompiler;
use crate::grammar::Pattern;
use crate::grammar_err;
use crate::lexer::Span;

const COMMON_MODULE: &str = "common";
const COMMON_GRAMMAR: &str = include_str!("common.lark");

#[derive(Debug, Clone)]
struct LibraryTerminal {
    pattern: Pattern,
    priority: i32,
}

static COMMON: Lazy<Result<HashMap<String, LibraryTerminal>, String>> =
    Lazy::new(|| build_library(COMMON_GRAMMAR).map_err(|e| e.to_string()));

fn build_library(text: &str) -> Result<HashMap<String, LibraryTerminal>, GrammarError> {
    let sources: Vec<TerminalSource> = loader::load(text)?
        .into_iter()
        .filter_map(|d| match d {
            Definition::Terminal(t) => Some(t),
            _ => None,
        })
        .collect();
    let compiled = TerminalCompiler::new(&sources, &HashSet::new()).compile_all()?;
    Ok(compiled
        .into_iter()
        .map(|t| {
            (
                t.name,
                LibraryTerminal {
                    pattern: t.pattern,
                    priority: t.priority,
                },
            )
        })
        .collect())
}

/// Replaces every `%import` with the terminal definitions it brings in.
pub(crate) fn resolve_imports(
    definitions: Vec<Definition>,
) -> Result<Vec<Definition>, GrammarError> {
    let mut resolved = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let Definition::Import(import) = definition else {
            resolved.push(definition);
            continue;
        };

        if import.module != [COMMON_MODULE] {
            return Err(grammar_err!(
                UnknownImport {
                    path: import.module.join(".")
                },
                import.position
            )
            .with_help(format!("only the built-in `{}` module can be imported", COMMON_MODULE)));
        }

        let library = COMMON.as_ref().map_err(|message| {
            grammar_err!(
                Syntax {
                    message: format!("built-in library failed to compile: {}", message)
                },
                import.position
            )
        })?;

        for (name, local) in import.names {
            let Some(terminal) = library.get(&name) else {
                return Err(grammar_err!(
                    UnknownImport {
                        path: format!("{}.{}", COMMON_MODULE, name)
                    },
                    import.position
                ));
            };
            let span = Span::new(import.position.offset, import.position.offset);
            resolved.push(Definition::Terminal(TerminalSource {
                name: local,
                priority: terminal.priority,
                body: vec![Alternative {
                    items: vec![Item {
                        kind: ItemKind::Pattern(terminal.pattern.clone()),
                        text: name,
                        position: import.position,
                        span,
                    }],
                    alias: None,
                }],
                position: import.position,
                span,
            }));
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> &'static HashMap<String, LibraryTerminal> {
        COMMON.as_ref().unwrap()
    }

    #[test]
    fn library_compiles_every_documented_terminal() {
        for name in [
            "DIGIT",
            "HEXDIGIT",
            "INT",
            "SIGNED_INT",
            "DECIMAL",
            "FLOAT",
            "SIGNED_FLOAT",
            "NUMBER",
            "SIGNED_NUMBER",
            "ESCAPED_STRING",
            "LCASE_LETTER",
            "UCASE_LETTER",
            "LETTER",
            "WORD",
            "CNAME",
            "WS_INLINE",
            "WS",
            "CR",
            "LF",
            "NEWLINE",
            "SH_COMMENT",
            "CPP_COMMENT",
            "C_COMMENT",
            "SQL_COMMENT",
        ] {
            assert!(library().contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn imports_are_rewritten_as_terminals() {
        let defs = loader::load("%import common.INT -> N\n%import common (WS, CNAME)\n").unwrap();
        let resolved = resolve_imports(defs).unwrap();
        let names: Vec<String> = resolved
            .iter()
            .filter_map(|d| match d {
                Definition::Terminal(t) => Some(t.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["N", "WS", "CNAME"]);
    }

    #[test]
    fn unknown_module_and_name_are_rejected() {
        let err = resolve_imports(loader::load("%import other.X\n").unwrap()).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::errors::GrammarErrorKind::UnknownImport { ref path } if path == "other"
        ));
        let err = resolve_imports(loader::load("%import common.NOPE\n").unwrap()).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::errors::GrammarErrorKind::UnknownImport { ref path } if path == "common.NOPE"
        ));
    }
}
