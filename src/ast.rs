//! Abstract syntax tree.
//!
//! Re-architected per the design notes (§9 of the spec this crate
//! implements): one sum type over node kinds, visited by pattern
//! matching, instead of a class hierarchy with a visitor. Parent and
//! sibling links are `NodeId`s into a single arena owned by [`Ast`]
//! rather than pointers, so the whole tree is freed when the `Ast` is
//! dropped and there is no lifetime to thread through every pass.

use crate::symbol::{SymbolHandle, SymTableRef};
use std::fmt;

/// The ~45 node tags of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    ClassDef,
    Isa,
    ImplDef,
    Members,
    Visibility,
    FuncHead,
    Constructor,
    ClassMember,
    ImplBody,
    FuncDef,
    FParams,
    FParam,
    Type,
    ArraySizes,
    ArraySize,
    VarDecl,
    FuncBody,
    Statement,
    Sign,
    Factor,
    Not,
    Relop,
    Statblock,
    If,
    SelfRef,
    AParams,
    FunCall,
    Expr,
    Dot,
    While,
    Indices,
    Assign,
    Variable,
    Indice,
    DataMember,
    Read,
    Write,
    Return,
    MultOp,
    AddOp,
    Term,
    IntLit,
    FloatLit,
    Id,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The typed numeric payload of a literal node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Index into the [`Ast`] arena. Copy, non-owning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// One AST node. Owns nothing but its own scalar fields and its
/// `children` list; `parent`/`first_sibling`/`prev_sibling`/
/// `next_sibling` are plain arena indices.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Identifier text, operator/sign text, type name, or visibility keyword.
    pub value: Option<String>,
    pub literal: Option<Literal>,
    pub line: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub first_sibling: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    /// Attached by SymbolTablePass: the scope in effect at this node.
    pub symbol_table: Option<SymTableRef>,
    /// Attached where this node defines or resolves to a symbol.
    pub symbol: Option<SymbolHandle>,
    /// Attached by SemanticPass: the inferred canonical type string.
    pub data_type: Option<String>,
}

impl Node {
    fn new(kind: NodeKind, line: usize) -> Self {
        Node {
            kind,
            value: None,
            literal: None,
            line,
            parent: None,
            children: Vec::new(),
            first_sibling: None,
            prev_sibling: None,
            next_sibling: None,
            symbol_table: None,
            symbol: None,
            data_type: None,
        }
    }
}

/// The tree: a flat arena plus the id of the root node.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    pub root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Allocate a new, parentless, childless node.
    pub fn alloc(&mut self, kind: NodeKind, line: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind, line));
        id
    }

    /// Adopt `child` as the next child of `parent`, wiring up parent and
    /// sibling links per the invariants in §3: `firstSibling` points at
    /// the first child of the parent, and the child list order is
    /// source order.
    pub fn adopt(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        let first = self.nodes[parent.0].children.first().copied().unwrap_or(child);
        let prev = self.nodes[parent.0].children.last().copied();
        self.nodes[child.0].first_sibling = Some(first);
        self.nodes[child.0].prev_sibling = prev;
        if let Some(prev) = prev {
            self.nodes[prev.0].next_sibling = Some(child);
        }
        self.nodes[parent.0].children.push(child);
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        self.nodes[id.0].value = Some(value.into());
    }

    pub fn set_literal(&mut self, id: NodeId, lit: Literal) {
        self.nodes[id.0].literal = Some(lit);
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pretty-print the tree rooted at `root` (or the whole tree's root
    /// if `root` is `None`) as `.outast` wants it: `| ` repeated once
    /// per depth, then the tag and, in parentheses, the node's value or
    /// literal if it has one.
    pub fn pretty_print(&self, root: Option<NodeId>) -> String {
        let mut out = String::new();
        if let Some(r) = root.or(self.root) {
            self.pretty_print_into(r, 0, &mut out);
        }
        out
    }

    fn pretty_print_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        for _ in 0..depth {
            out.push_str("| ");
        }
        out.push_str(&node.kind.to_string());
        if let Some(v) = &node.value {
            out.push('(');
            out.push_str(v);
            out.push(')');
        } else if let Some(lit) = &node.literal {
            out.push('(');
            out.push_str(&lit.to_string());
            out.push(')');
        }
        out.push('\n');
        for &child in &node.children {
            self.pretty_print_into(child, depth + 1, out);
        }
    }

    /// Structural invariant check used by the test suite (§8, property 3):
    /// every non-root node appears in its parent's children list, and
    /// every child of a given parent shares the same `first_sibling`.
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId(i);
            if let Some(parent) = node.parent {
                if !self.children(parent).contains(&id) {
                    return Err(format!("node {i} not in parent {}'s children", parent.0));
                }
            }
            if !node.children.is_empty() {
                let expected_first = node.children[0];
                for &c in &node.children {
                    if self.node(c).first_sibling != Some(expected_first) {
                        return Err(format!("child {} has wrong first_sibling", c.0));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopt_wires_parent_and_siblings() {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Program, 1);
        ast.root = Some(root);
        let a = ast.alloc(NodeKind::Id, 1);
        let b = ast.alloc(NodeKind::Id, 2);
        ast.adopt(root, a);
        ast.adopt(root, b);

        assert_eq!(ast.node(a).parent, Some(root));
        assert_eq!(ast.node(b).parent, Some(root));
        assert_eq!(ast.node(a).first_sibling, Some(a));
        assert_eq!(ast.node(b).first_sibling, Some(a));
        assert_eq!(ast.node(a).next_sibling, Some(b));
        assert_eq!(ast.node(b).prev_sibling, Some(a));
        assert_eq!(ast.children(root), &[a, b]);
        ast.check_invariants().unwrap();
    }

    #[test]
    fn pretty_print_shows_tag_and_value() {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Program, 1);
        ast.root = Some(root);
        let id_node = ast.alloc(NodeKind::Id, 1);
        ast.set_value(id_node, "foo");
        ast.adopt(root, id_node);
        let printed = ast.pretty_print(None);
        assert_eq!(printed, "Program\n| Id(foo)\n");
    }

    #[test]
    fn literal_nodes_have_no_children() {
        let mut ast = Ast::new();
        let lit = ast.alloc(NodeKind::IntLit, 1);
        ast.set_literal(lit, Literal::Int(42));
        assert!(ast.children(lit).is_empty());
    }
}
