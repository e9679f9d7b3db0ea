//! Bottom-up tree transformation.
//!
//! A [`Transformer`] folds a parse tree into a value of any type `T`. Reducers
//! are registered per rule name and per terminal name; nodes without a
//! reducer fall back to [`TreeValue`], which for rules aggregates the
//! children into a sequence.
//!
//! ```
//! use larch::{compile_grammar, Transformer, Value};
//!
//! let grammar = compile_grammar("start: NUMBER+\nNUMBER: /[0-9]+/\n%ignore \" \"\n").unwrap();
//! let tree = grammar.parse("1 2 3", "start").unwrap();
//!
//! let sum = Transformer::<Value>::new()
//!     .terminal("NUMBER", |t| Ok(Value::Int(t.text().parse().unwrap())))
//!     .rule("start", |children| {
//!         Ok(Value::Int(children.iter().filter_map(Value::as_int).sum()))
//!     })
//!     .transform(&tree)
//!     .unwrap();
//! assert_eq!(sum, Value::Int(6));
//! ```

use std::collections::HashMap;
use std::convert::Infallible;

use crate::lexer::Token;
use crate::tree::{ParseNode, ParseTree, Tree};

/// Default conversions used when no reducer is registered.
pub trait TreeValue: Sized {
    fn from_token(token: &Token) -> Self;
    fn from_children(rule: &str, children: Vec<Self>) -> Self;
}

type RuleFn<'a, T, E> = Box<dyn Fn(Vec<T>) -> Result<T, E> + 'a>;
type TerminalFn<'a, T, E> = Box<dyn Fn(&Token) -> Result<T, E> + 'a>;

/// Per-rule and per-terminal reducers.
pub struct Transformer<'a, T, E = Infallible> {
    rules: HashMap<String, RuleFn<'a, T, E>>,
    terminals: HashMap<String, TerminalFn<'a, T, E>>,
}

impl<'a, T, E> Default for Transformer<'a, T, E> {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            terminals: HashMap::new(),
        }
    }
}

enum Step<'t> {
    Visit(&'t ParseNode),
    Reduce(&'t Tree),
}

impl<'a, T, E> Transformer<'a, T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the reducer for trees named `rule`. It receives the
    /// transformed children in order.
    pub fn rule<F>(mut self, rule: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(Vec<T>) -> Result<T, E> + 'a,
    {
        self.rules.insert(rule.into(), Box::new(reducer));
        self
    }

    /// Registers the reducer for leaves of `terminal`.
    pub fn terminal<F>(mut self, terminal: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&Token) -> Result<T, E> + 'a,
    {
        self.terminals.insert(terminal.into(), Box::new(reducer));
        self
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.rules.contains_key(rule)
    }
}

impl<'a, T: TreeValue, E> Transformer<'a, T, E> {
    pub fn transform(&self, tree: &ParseTree) -> Result<T, E> {
        self.transform_node(tree.root())
    }

    /// Post-order fold of `root`. The first reducer error aborts the walk and
    /// is returned as is.
    pub fn transform_node(&self, root: &ParseNode) -> Result<T, E> {
        let mut steps = vec![Step::Visit(root)];
        let mut values: Vec<T> = Vec::new();

        while let Some(step) = steps.pop() {
            match step {
                Step::Visit(ParseNode::Leaf(token)) => {
                    let value = match self.terminals.get(token.terminal()) {
                        Some(reducer) => reducer(token)?,
                        None => T::from_token(token),
                    };
                    values.push(value);
                }
                Step::Visit(ParseNode::Tree(tree)) => {
                    steps.push(Step::Reduce(tree));
                    steps.extend(tree.children.iter().rev().map(Step::Visit));
                }
                Step::Reduce(tree) => {
                    let children = values.split_off(values.len() - tree.children.len());
                    let value = match self.rules.get(tree.rule()) {
                        Some(reducer) => reducer(children)?,
                        None => T::from_children(tree.rule(), children),
                    };
                    values.push(value);
                }
            }
        }

        match values.pop() {
            Some(value) => Ok(value),
            None => unreachable!("a tree walk always produces its root value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::compile_grammar;
    use crate::value::Value;

    const SUM: &str = "start: (NUMBER | group)+\ngroup: \"(\" start \")\"\nNUMBER: /[0-9]+/\n%ignore \" \"\n";

    #[test]
    fn identity_transform_mirrors_structure() {
        let grammar = compile_grammar(SUM).unwrap();
        let tree = grammar.parse("1 (2 3)", "start").unwrap();
        let value = Transformer::<Value>::new().transform(&tree).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::Token("1".into()),
                Value::List(vec![Value::List(vec![
                    Value::Token("2".into()),
                    Value::Token("3".into()),
                ])]),
            ])
        );
    }

    #[test]
    fn reducers_see_transformed_children_in_order() {
        let grammar = compile_grammar(SUM).unwrap();
        let tree = grammar.parse("1 (2 3) 4", "start").unwrap();
        let order = std::cell::RefCell::new(Vec::new());
        let value: i64 = Transformer::<i64>::new()
            .terminal("NUMBER", |t| {
                order.borrow_mut().push(t.text().to_string());
                Ok(t.text().parse().unwrap())
            })
            .rule("start", |children| Ok(children.into_iter().sum()))
            .rule("group", |children| Ok(children[0] * 10))
            .transform(&tree)
            .unwrap();
        assert_eq!(value, 1 + 50 + 4);
        assert_eq!(*order.borrow(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn reducer_errors_propagate_unchanged() {
        let grammar = compile_grammar(SUM).unwrap();
        let tree = grammar.parse("1 2", "start").unwrap();
        let result = Transformer::<Value, String>::new()
            .terminal("NUMBER", |t| Err(format!("bad number {}", t.text())))
            .transform(&tree);
        assert_eq!(result, Err("bad number 1".to_string()));
    }

    impl TreeValue for i64 {
        fn from_token(token: &Token) -> Self {
            token.text().len() as i64
        }

        fn from_children(_rule: &str, children: Vec<Self>) -> Self {
            children.into_iter().sum()
        }
    }
}
