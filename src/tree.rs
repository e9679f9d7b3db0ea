//! Parse trees.
//!
//! A [`ParseTree`] is immutable once built. Traversals, cloning, comparison,
//! dropping and [`ParseNode::write_json`] use an explicit stack, so
//! arbitrarily deep trees can be handled. The derived `Serialize` and `Debug`
//! impls recurse once per level.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;

use crate::lexer::{Span, Token};

/// An interior node: a rule (or alias) name and its children.
#[derive(Debug, Serialize)]
pub struct Tree {
    pub rule: Arc<str>,
    pub children: Vec<ParseNode>,
    /// Source range covered by the children; `None` when there are none.
    pub span: Option<Span>,
}

impl Tree {
    pub fn new(rule: impl Into<Arc<str>>, children: Vec<ParseNode>) -> Self {
        let span = children
            .iter()
            .filter_map(ParseNode::span)
            .reduce(Span::merge);
        Self {
            rule: rule.into(),
            children,
            span,
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum ParseNode {
    Tree(Tree),
    Leaf(Token),
}

impl ParseNode {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseNode::Tree(tree) => tree.span,
            ParseNode::Leaf(token) => Some(token.span),
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            ParseNode::Tree(tree) => Some(tree),
            ParseNode::Leaf(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            ParseNode::Leaf(token) => Some(token),
            ParseNode::Tree(_) => None,
        }
    }

    /// Writes one line per node, two spaces of indentation per level.
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            for _ in 0..depth {
                out.push_str("  ");
            }
            match node {
                ParseNode::Tree(tree) => {
                    out.push_str(&tree.rule);
                    out.push('\n');
                    stack.extend(tree.children.iter().rev().map(|c| (c, depth + 1)));
                }
                ParseNode::Leaf(token) => {
                    out.push_str(&format!("{} {:?}\n", token.terminal, token.text));
                }
            }
        }
        out
    }

    /// Leaves in source order.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                ParseNode::Tree(tree) => stack.extend(tree.children.iter().rev()),
                ParseNode::Leaf(token) => tokens.push(token),
            }
        }
        tokens
    }

    /// Every subtree, pre-order.
    pub fn iter_subtrees(&self) -> Subtrees<'_> {
        Subtrees { stack: vec![self] }
    }

    /// Writes the node as pretty-printed JSON, in the same shape as its
    /// `Serialize` impl.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        enum Step<'t> {
            Open(&'t ParseNode, usize, bool),
            Close(&'t Tree, usize, bool),
        }

        let mut steps = vec![Step::Open(self, 0, true)];
        while let Some(step) = steps.pop() {
            match step {
                Step::Open(leaf @ ParseNode::Leaf(_), depth, last) => {
                    writeln!(out, "{}{}{}", indent(depth), to_json(leaf, depth)?, comma(last))?;
                }
                Step::Open(ParseNode::Tree(tree), depth, last) => {
                    let inner = indent(depth + 1);
                    writeln!(out, "{}{{", indent(depth))?;
                    writeln!(out, "{}\"kind\": \"Tree\",", inner)?;
                    writeln!(out, "{}\"rule\": {},", inner, to_json(&tree.rule, 0)?)?;
                    if tree.children.is_empty() {
                        writeln!(out, "{}\"children\": [],", inner)?;
                    } else {
                        writeln!(out, "{}\"children\": [", inner)?;
                    }
                    steps.push(Step::Close(tree, depth, last));
                    let count = tree.children.len();
                    steps.extend(
                        tree.children
                            .iter()
                            .enumerate()
                            .rev()
                            .map(|(i, child)| Step::Open(child, depth + 2, i + 1 == count)),
                    );
                }
                Step::Close(tree, depth, last) => {
                    let inner = indent(depth + 1);
                    if !tree.children.is_empty() {
                        writeln!(out, "{}],", inner)?;
                    }
                    writeln!(out, "{}\"span\": {}", inner, to_json(&tree.span, depth + 1)?)?;
                    writeln!(out, "{}}}{}", indent(depth), comma(last))?;
                }
            }
        }
        Ok(())
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn comma(last: bool) -> &'static str {
    if last {
        ""
    } else {
        ","
    }
}

/// Pretty JSON for a shallow value, with continuation lines indented to `depth`.
fn to_json<T: Serialize + ?Sized>(value: &T, depth: usize) -> io::Result<String> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    Ok(json.replace('\n', &format!("\n{}", indent(depth))))
}

impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

/// Pre-order iterator over the [`Tree`] nodes below (and including) a node.
pub struct Subtrees<'t> {
    stack: Vec<&'t ParseNode>,
}

impl<'t> Iterator for Subtrees<'t> {
    type Item = &'t Tree;

    fn next(&mut self) -> Option<&'t Tree> {
        while let Some(node) = self.stack.pop() {
            if let ParseNode::Tree(tree) = node {
                self.stack.extend(tree.children.iter().rev());
                return Some(tree);
            }
        }
        None
    }
}

// ============================================================================
// PARSE TREE
// ============================================================================

/// The result of a successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseTree {
    root: ParseNode,
    start: Arc<str>,
    #[serde(skip)]
    source: Arc<str>,
}

impl ParseTree {
    pub fn new(root: ParseNode, start: Arc<str>, source: Arc<str>) -> Self {
        Self {
            root,
            start,
            source,
        }
    }

    pub fn root(&self) -> &ParseNode {
        &self.root
    }

    pub fn into_root(self) -> ParseNode {
        self.root
    }

    /// The start rule the tree was parsed from.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// The parsed text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pretty_print(&self) -> String {
        self.root.pretty_print()
    }

    pub fn tokens(&self) -> Vec<&Token> {
        self.root.tokens()
    }

    pub fn iter_subtrees(&self) -> Subtrees<'_> {
        self.root.iter_subtrees()
    }

    /// Subtrees whose rule (or alias) is `rule`, pre-order.
    pub fn find_data<'t>(&'t self, rule: &'t str) -> impl Iterator<Item = &'t Tree> + 't {
        self.iter_subtrees().filter(move |t| t.rule.as_ref() == rule)
    }
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

impl Clone for Tree {
    fn clone(&self) -> Self {
        enum Step<'t> {
            Visit(&'t ParseNode),
            Build(&'t Tree),
        }

        let mut steps: Vec<Step<'_>> = self.children.iter().rev().map(Step::Visit).collect();
        let mut built: Vec<ParseNode> = Vec::new();
        while let Some(step) = steps.pop() {
            match step {
                Step::Visit(ParseNode::Leaf(token)) => built.push(ParseNode::Leaf(token.clone())),
                Step::Visit(ParseNode::Tree(tree)) => {
                    steps.push(Step::Build(tree));
                    steps.extend(tree.children.iter().rev().map(Step::Visit));
                }
                Step::Build(tree) => {
                    let children = built.split_off(built.len() - tree.children.len());
                    built.push(ParseNode::Tree(Tree {
                        rule: tree.rule.clone(),
                        children,
                        span: tree.span,
                    }));
                }
            }
        }

        Tree {
            rule: self.rule.clone(),
            children: built,
            span: self.span,
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.rule != b.rule || a.span != b.span || a.children.len() != b.children.len() {
                return false;
            }
            for pair in a.children.iter().zip(&b.children) {
                match pair {
                    (ParseNode::Tree(x), ParseNode::Tree(y)) => pending.push((x, y)),
                    (ParseNode::Leaf(x), ParseNode::Leaf(y)) if x == y => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

impl Eq for Tree {}

impl Drop for Tree {
    // The derived drop recurses once per level; unlink children first.
    fn drop(&mut self) {
        let mut pending: Vec<ParseNode> = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let ParseNode::Tree(mut tree) = node {
                pending.append(&mut tree.children);
            }
        }
    }
}
