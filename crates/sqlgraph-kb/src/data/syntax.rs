//! Syntax tree model produced by a [`SyntaxTreeProvider`](crate::traits::SyntaxTreeProvider)

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a parsed SQL syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntaxNode {
    /// A grammar rule application with ordered children
    Rule {
        name: String,
        children: Vec<SyntaxNode>,
    },
    /// A terminal carrying its literal text
    Token {
        text: String,
    },
}

impl SyntaxNode {
    pub fn rule(name: impl Into<String>, children: Vec<SyntaxNode>) -> Self {
        SyntaxNode::Rule { name: name.into(), children }
    }

    pub fn token(text: impl Into<String>) -> Self {
        SyntaxNode::Token { text: text.into() }
    }

    pub fn is_rule(&self) -> bool {
        matches!(self, SyntaxNode::Rule { .. })
    }

    pub fn children(&self) -> &[SyntaxNode] {
        match self {
            SyntaxNode::Rule { children, .. } => children,
            SyntaxNode::Token { .. } => &[],
        }
    }

    /// Rule name for rules, literal text for tokens.
    pub fn node_text(&self) -> &str {
        match self {
            SyntaxNode::Rule { name, .. } => name,
            SyntaxNode::Token { text } => text,
        }
    }

    /// True for a rule that has children and none of them is a rule.
    pub fn is_terminal_run(&self) -> bool {
        match self {
            SyntaxNode::Rule { children, .. } => {
                !children.is_empty() && children.iter().all(|c| !c.is_rule())
            },
            SyntaxNode::Token { .. } => false,
        }
    }

    /// Number of nodes in the tree, this one included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children().iter());
        }
        count
    }

    /// Renders the tree in LISP-style bracketed form.
    ///
    /// Leaves render as their text, a childless rule as its bare name and any
    /// other rule as `(name child child ...)`.
    pub fn to_string_tree(&self) -> String {
        enum Frame<'a> {
            Node(&'a SyntaxNode, bool),
            Close,
        }

        let mut out = String::new();
        let mut stack = vec![Frame::Node(self, false)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Close => out.push(')'),
                Frame::Node(node, spaced) => {
                    if spaced {
                        out.push(' ');
                    }
                    let text = escape_whitespace(node.node_text());
                    let children = node.children();
                    if children.is_empty() {
                        out.push_str(&text);
                        continue;
                    }
                    out.push('(');
                    out.push_str(&text);
                    stack.push(Frame::Close);
                    for child in children.iter().rev() {
                        stack.push(Frame::Node(child, true));
                    }
                },
            }
        }
        out
    }
}

// The derived drop glue recurses once per level; deep trees are torn down
// from an explicit list instead.
impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut pending = match self {
            SyntaxNode::Rule { children, .. } if !children.is_empty() => std::mem::take(children),
            _ => return,
        };
        while let Some(mut node) = pending.pop() {
            if let SyntaxNode::Rule { children, .. } = &mut node {
                pending.append(children);
            }
        }
    }
}

fn escape_whitespace(text: &str) -> String {
    text.replace('\t', "\\t").replace('\n', "\\n").replace('\r', "\\r")
}

/// A recoverable syntax error reported by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self { line: None, column: None, message: message.into() }
    }

    pub fn at(line: u64, column: u64, message: impl Into<String>) -> Self {
        Self { line: Some(line), column: Some(column), message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "line {}:{} {}", line, column, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Parser output: a best-effort tree plus any syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub root: SyntaxNode,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    pub fn clean(root: SyntaxNode) -> Self {
        Self { root, diagnostics: Vec::new() }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
