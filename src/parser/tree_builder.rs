//! Builds parse tree nodes on reduce.
//!
//! Shaping happens here, once per reduction:
//! - anonymous literal tokens and `_TERMINAL` tokens are dropped unless the
//!   rule keeps all tokens,
//! - children produced by inline rules are spliced into the parent,
//! - `?rule` with exactly one child is replaced by that child,
//! - an alias renames the tree.

use std::sync::Arc;

use crate::grammar::{Grammar, Production};
use crate::lexer::{Span, Token};
use crate::tree::{ParseNode, Tree};

/// A value on the parser's value stack.
#[derive(Debug, Clone)]
pub(crate) enum StackValue {
    Token(Token),
    Node(ParseNode),
    /// The children of an inline rule, waiting to be spliced into a parent.
    Inlined(Vec<ParseNode>),
}

pub(crate) struct TreeBuilder<'g> {
    grammar: &'g Grammar,
    keep_all_tokens: bool,
}

impl<'g> TreeBuilder<'g> {
    pub fn new(grammar: &'g Grammar, keep_all_tokens: bool) -> Self {
        Self {
            grammar,
            keep_all_tokens,
        }
    }

    pub fn reduce(&self, production: &Production, children: Vec<StackValue>) -> StackValue {
        let rule = self.grammar.rule(production.origin);
        let keep_tokens = self.keep_all_tokens || rule.options.keep_all_tokens;

        let mut nodes = Vec::with_capacity(children.len());
        for (child, filter_out) in children.into_iter().zip(&production.filter_out) {
            match child {
                StackValue::Token(_) if *filter_out && !keep_tokens => {}
                StackValue::Token(token) => nodes.push(ParseNode::Leaf(token)),
                StackValue::Node(node) => nodes.push(node),
                StackValue::Inlined(spliced) => nodes.extend(spliced),
            }
        }

        if rule.options.inline {
            return StackValue::Inlined(nodes);
        }
        if rule.options.expand_single && production.alias.is_none() && nodes.len() == 1 {
            if let Some(only) = nodes.pop() {
                return StackValue::Node(only);
            }
        }

        let name = production.alias.clone().unwrap_or_else(|| rule.name.clone());
        StackValue::Node(ParseNode::Tree(make_tree(name, nodes)))
    }

    /// Turns the value left after accepting into the tree root.
    pub fn finish(&self, value: StackValue, start: &Arc<str>) -> ParseNode {
        match value {
            StackValue::Token(token) => ParseNode::Leaf(token),
            StackValue::Node(node) => node,
            StackValue::Inlined(children) => ParseNode::Tree(make_tree(start.clone(), children)),
        }
    }
}

fn make_tree(rule: Arc<str>, children: Vec<ParseNode>) -> Tree {
    let span = children
        .iter()
        .filter_map(ParseNode::span)
        .reduce(Span::merge);
    Tree {
        rule,
        children,
        span,
    }
}
