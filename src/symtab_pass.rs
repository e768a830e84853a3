//! SymbolTablePass: first AST walk (spec.md §4.3).
//!
//! Top-down walk building the nested scope forest (global → class →
//! function/method) and attaching a `symbol_table` handle to every node,
//! a `symbol` handle where a definition occurs. Grounded on the
//! teacher's `resolver.rs` shape: a single top-down walk returning a
//! side table (here, the global scope plus a diagnostic sink) rather
//! than mutating a `Result`-returning tree in place per node.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::diagnostics::DiagnosticSink;
use crate::symbol::{Symbol, SymbolKind, SymbolTable, SymTableRef};

pub struct SymtabPass<'a> {
    ast: &'a mut Ast,
    global: SymTableRef,
    classes: HashMap<String, SymTableRef>,
    diagnostics: DiagnosticSink,
}

pub fn run(ast: &mut Ast) -> (SymTableRef, DiagnosticSink) {
    let global = SymbolTable::new_ref("global", 0, None);
    let mut pass = SymtabPass {
        ast,
        global: global.clone(),
        classes: HashMap::new(),
        diagnostics: DiagnosticSink::new(),
    };
    pass.run();
    (global, pass.diagnostics)
}

impl<'a> SymtabPass<'a> {
    fn run(&mut self) {
        let Some(root) = self.ast.root else { return };
        self.ast.node_mut(root).symbol_table = Some(self.global.clone());
        let children = self.ast.children(root).to_vec();
        for child in children {
            match self.ast.node(child).kind {
                NodeKind::ClassDef => self.class_def(child),
                NodeKind::ImplDef => self.impl_def(child),
                NodeKind::FuncDef => self.free_func_def(child),
                _ => {}
            }
        }
    }

    fn class_table(&mut self, name: &str, line: usize) -> SymTableRef {
        if let Some(existing) = self.classes.get(name) {
            return existing.clone();
        }
        let table = SymbolTable::new_class_ref(name, 1, Some(&self.global));
        self.classes.insert(name.to_string(), table.clone());
        let mut symbol = Symbol::new(SymbolKind::Class, name, name);
        symbol.subtable = Some(table.clone());
        symbol.class_ref = Some(table.clone());
        self.global.borrow_mut().insert(Rc::new(std::cell::RefCell::new(symbol)));
        let _ = line;
        table
    }

    fn class_def(&mut self, node: NodeId) {
        let line = self.ast.node(node).line;
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        let already_declared = self
            .classes
            .get(&name)
            .map(|t| t.borrow().class_info.as_ref().is_some_and(|c| c.declared))
            .unwrap_or(false);
        let table = self.class_table(&name, line);
        if already_declared {
            self.diagnostics.error(line, format!("redeclaration of class '{name}'"));
        }
        table.borrow_mut().class_info.as_mut().unwrap().declared = true;
        self.ast.node_mut(node).symbol_table = Some(self.global.clone());

        let children = self.ast.children(node).to_vec();
        for child in children {
            match self.ast.node(child).kind {
                NodeKind::Members => self.members(child, &table),
                NodeKind::Isa => self.ast.node_mut(child).symbol_table = Some(self.global.clone()),
                _ => {}
            }
        }
    }

    fn members(&mut self, members_node: NodeId, class_table: &SymTableRef) {
        self.ast.node_mut(members_node).symbol_table = Some(class_table.clone());
        let members = self.ast.children(members_node).to_vec();
        for member in members {
            self.class_member(member, class_table);
        }
    }

    fn class_member(&mut self, member: NodeId, class_table: &SymTableRef) {
        self.ast.node_mut(member).symbol_table = Some(class_table.clone());
        let children = self.ast.children(member).to_vec();
        let is_public = children
            .first()
            .is_some_and(|&v| self.ast.node(v).value.as_deref() == Some("public"));
        if let Some(&v) = children.first() {
            self.ast.node_mut(v).symbol_table = Some(class_table.clone());
        }
        let Some(&inner) = children.get(1) else { return };
        match self.ast.node(inner).kind {
            NodeKind::VarDecl => self.data_member(inner, class_table, is_public),
            NodeKind::FuncHead | NodeKind::Constructor => {
                self.method_decl(inner, class_table, is_public)
            }
            _ => {}
        }
    }

    fn data_member(&mut self, node: NodeId, class_table: &SymTableRef, is_public: bool) {
        set_subtree_scope(self.ast, node, class_table);
        let line = self.ast.node(node).line;
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        let (type_name, dims) = type_and_dims(self.ast, node);

        if class_table.borrow().symbols.iter().any(|s| s.borrow().name == name) {
            self.diagnostics.error(line, format!("duplicate declaration of '{name}'"));
            return;
        }
        let mut symbol = Symbol::new(SymbolKind::Data, &name, &type_name);
        symbol.dimensions = dims;
        symbol.set_public(is_public);
        let handle = Rc::new(std::cell::RefCell::new(symbol));
        class_table.borrow_mut().insert(handle.clone());
        self.ast.node_mut(node).symbol = Some(handle);
    }

    fn method_decl(&mut self, node: NodeId, class_table: &SymTableRef, is_public: bool) {
        let line = self.ast.node(node).line;
        let name = method_name(self.ast, node);
        let param_types = fparams_signature(self.ast, node);

        // Only the class's own table is checked here (not inherited
        // members) so a subclass may legally redeclare/override a
        // parent's method.
        let existing = local_method(class_table, &name, &param_types);
        if let Some(existing) = existing {
            self.diagnostics
                .error(line, format!("duplicate declaration of method '{name}'"));
            self.ast.node_mut(node).symbol = Some(existing);
            return;
        }
        let overload_exists = class_table
            .borrow()
            .symbols
            .iter()
            .any(|s| s.borrow().kind == SymbolKind::Method && s.borrow().name == name);
        if overload_exists {
            self.diagnostics.warning(line, format!("overloaded method '{name}'"));
        }

        let mut symbol = Symbol::new(SymbolKind::Method, &name, return_type_name(self.ast, node));
        symbol.set_public(is_public);
        symbol.set_declared(true);
        symbol.set_param_types(param_types);
        let handle = Rc::new(std::cell::RefCell::new(symbol));
        class_table.borrow_mut().insert(handle.clone());
        self.ast.node_mut(node).symbol = Some(handle);
        self.ast.node_mut(node).symbol_table = Some(class_table.clone());
    }

    fn impl_def(&mut self, node: NodeId) {
        let line = self.ast.node(node).line;
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        let table = self.class_table(&name, line);
        if table.borrow().class_info.as_ref().unwrap().implemented {
            self.diagnostics
                .error(line, format!("duplicate implementation of class '{name}'"));
        }
        table.borrow_mut().class_info.as_mut().unwrap().implemented = true;
        self.ast.node_mut(node).symbol_table = Some(self.global.clone());

        let children = self.ast.children(node).to_vec();
        for child in children {
            if self.ast.node(child).kind == NodeKind::ImplBody {
                self.ast.node_mut(child).symbol_table = Some(self.global.clone());
                let defs = self.ast.children(child).to_vec();
                for def in defs {
                    self.method_def(def, &table);
                }
            }
        }
    }

    fn method_def(&mut self, funcdef: NodeId, class_table: &SymTableRef) {
        let children = self.ast.children(funcdef).to_vec();
        let Some(&head) = children.first() else { return };
        let Some(&body) = children.get(1) else { return };
        let line = self.ast.node(head).line;
        let name = method_name(self.ast, head);
        let param_types = fparams_signature(self.ast, head);

        let existing = local_method(class_table, &name, &param_types);
        let symbol = match existing {
            Some(sym) => {
                if sym.borrow().defined() {
                    self.diagnostics
                        .error(line, format!("redefinition of method '{name}'"));
                }
                sym
            }
            None => {
                let mut symbol = Symbol::new(SymbolKind::Method, &name, return_type_name(self.ast, head));
                symbol.set_param_types(param_types.clone());
                let handle = Rc::new(std::cell::RefCell::new(symbol));
                class_table.borrow_mut().insert(handle.clone());
                handle
            }
        };
        symbol.borrow_mut().set_defined(true);

        let scope = SymbolTable::new_ref(format!("{}::{name}", class_table.borrow().name), 2, Some(class_table));
        symbol.borrow_mut().subtable = Some(scope.clone());
        self.ast.node_mut(head).symbol = Some(symbol.clone());
        self.ast.node_mut(funcdef).symbol_table = Some(scope.clone());
        self.ast.node_mut(head).symbol_table = Some(scope.clone());

        self.bind_return_and_jump(head, &scope);
        self.bind_params(head, &scope);
        self.func_body(body, &scope);
    }

    fn free_func_def(&mut self, funcdef: NodeId) {
        let children = self.ast.children(funcdef).to_vec();
        let Some(&head) = children.first() else { return };
        let Some(&body) = children.get(1) else { return };
        let line = self.ast.node(head).line;
        let name = self.ast.node(head).value.clone().unwrap_or_default();
        let param_types = fparams_signature(self.ast, head);

        if SymbolTable::find_func_child(&self.global, &name, &param_types).is_some() {
            self.diagnostics
                .error(line, format!("redefinition of function '{name}'"));
        }
        let overload_exists = self
            .global
            .borrow()
            .symbols
            .iter()
            .any(|s| s.borrow().kind == SymbolKind::Function && s.borrow().name == name);
        if overload_exists {
            self.diagnostics.warning(line, format!("overloaded function '{name}'"));
        }

        let scope = SymbolTable::new_ref(&name, 1, Some(&self.global));
        let mut symbol = Symbol::new(SymbolKind::Function, &name, return_type_name(self.ast, head));
        symbol.set_declared(true);
        symbol.set_defined(true);
        symbol.set_param_types(param_types);
        symbol.subtable = Some(scope.clone());
        let handle = Rc::new(std::cell::RefCell::new(symbol));
        self.global.borrow_mut().insert(handle.clone());

        self.ast.node_mut(head).symbol = Some(handle);
        self.ast.node_mut(funcdef).symbol_table = Some(scope.clone());
        self.ast.node_mut(head).symbol_table = Some(scope.clone());

        self.bind_return_and_jump(head, &scope);
        self.bind_params(head, &scope);
        self.func_body(body, &scope);
    }

    fn bind_params(&mut self, head: NodeId, scope: &SymTableRef) {
        let Some(&fparams) = self.ast.children(head).first() else { return };
        self.ast.node_mut(fparams).symbol_table = Some(scope.clone());
        let params = self.ast.children(fparams).to_vec();
        for p in params {
            self.ast.node_mut(p).symbol_table = Some(scope.clone());
            let name = self.ast.node(p).value.clone().unwrap_or_default();
            let (type_name, dims) = type_and_dims(self.ast, p);
            let mut symbol = Symbol::new(SymbolKind::Param, &name, &type_name);
            symbol.dimensions = dims;
            let handle = Rc::new(std::cell::RefCell::new(symbol));
            scope.borrow_mut().insert(handle.clone());
            self.ast.node_mut(p).symbol = Some(handle);
        }
    }

    /// Every scope's `return` holds the function's result (size 0 for
    /// `void`, per the Open Question decision in DESIGN.md); `jump`
    /// holds the caller's return address and is typed `int` so it gets
    /// a concrete 4-byte slot.
    fn bind_return_and_jump(&mut self, head: NodeId, scope: &SymTableRef) {
        let ret_type = return_type_name(self.ast, head);
        let ret = Symbol::new(SymbolKind::Return, "return", ret_type);
        scope.borrow_mut().insert(Rc::new(std::cell::RefCell::new(ret)));
        let jump = Symbol::new(SymbolKind::Jump, "jump", "int");
        scope.borrow_mut().insert(Rc::new(std::cell::RefCell::new(jump)));
    }

    fn func_body(&mut self, body: NodeId, scope: &SymTableRef) {
        self.ast.node_mut(body).symbol_table = Some(scope.clone());
        let children = self.ast.children(body).to_vec();
        for child in children {
            if self.ast.node(child).kind == NodeKind::VarDecl {
                self.local_var(child, scope);
            } else {
                set_subtree_scope(self.ast, child, scope);
            }
        }
    }

    fn local_var(&mut self, node: NodeId, scope: &SymTableRef) {
        set_subtree_scope(self.ast, node, scope);
        let line = self.ast.node(node).line;
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        if scope.borrow().symbols.iter().any(|s| s.borrow().name == name) {
            self.diagnostics.error(line, format!("duplicate declaration of '{name}'"));
            return;
        }
        let (type_name, dims) = type_and_dims(self.ast, node);
        let mut symbol = Symbol::new(SymbolKind::Local, &name, &type_name);
        symbol.dimensions = dims;
        let handle = Rc::new(std::cell::RefCell::new(symbol));
        scope.borrow_mut().insert(handle.clone());
        self.ast.node_mut(node).symbol = Some(handle);
    }
}

/// Attach `scope` to `node` and every descendant. Used for statement
/// subtrees, which never open a new scope of their own in this
/// language (no block-level scoping below function granularity).
fn set_subtree_scope(ast: &mut Ast, node: NodeId, scope: &SymTableRef) {
    ast.node_mut(node).symbol_table = Some(scope.clone());
    let children = ast.children(node).to_vec();
    for c in children {
        set_subtree_scope(ast, c, scope);
    }
}

/// Exact-signature lookup restricted to `table`'s own symbols — never
/// the inherited parent tables, so overriding a method in a subclass is
/// not mistaken for redeclaring it.
fn local_method(table: &SymTableRef, name: &str, param_types: &[String]) -> Option<crate::symbol::SymbolHandle> {
    table
        .borrow()
        .symbols
        .iter()
        .find(|s| {
            let b = s.borrow();
            b.kind == SymbolKind::Method && b.name == name && b.param_types() == param_types
        })
        .cloned()
}

fn method_name(ast: &Ast, head: NodeId) -> String {
    match ast.node(head).kind {
        NodeKind::Constructor => "constructor".to_string(),
        _ => ast.node(head).value.clone().unwrap_or_default(),
    }
}

fn return_type_name(ast: &Ast, head: NodeId) -> String {
    match ast.node(head).kind {
        NodeKind::Constructor => "void".to_string(),
        _ => ast
            .children(head)
            .get(1)
            .and_then(|&t| ast.node(t).value.clone())
            .unwrap_or_else(|| "void".to_string()),
    }
}

fn type_and_dims(ast: &Ast, node: NodeId) -> (String, Vec<i64>) {
    let children = ast.children(node);
    let Some(&ty) = children.first() else {
        return ("type_error".to_string(), Vec::new());
    };
    let base = ast.node(ty).value.clone().unwrap_or_else(|| "type_error".to_string());
    let mut dims = Vec::new();
    if let Some(&sizes) = children.get(1) {
        for &size in ast.children(sizes) {
            let n = match ast.node(size).literal {
                Some(crate::ast::Literal::Int(v)) => v,
                _ => 0,
            };
            dims.push(n);
        }
    }
    let suffix = "[]".repeat(dims.len());
    (format!("{base}{suffix}"), dims)
}

fn fparams_signature(ast: &Ast, head: NodeId) -> Vec<String> {
    let Some(&fparams) = ast.children(head).first() else {
        return Vec::new();
    };
    if ast.node(fparams).kind != NodeKind::FParams {
        return Vec::new();
    }
    ast.children(fparams)
        .iter()
        .map(|&p| type_and_dims(ast, p).0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(src: &str) -> (Ast, SymTableRef, DiagnosticSink) {
        let out = Parser::new(src).parse();
        assert!(!out.had_error);
        let mut ast = out.ast;
        let (global, diags) = run(&mut ast);
        (ast, global, diags)
    }

    #[test]
    fn class_and_function_registered_in_global() {
        let (_, global, diags) = build("class foo { };\nimplementation foo { }\n");
        assert!(!diags.has_error());
        assert!(global.borrow().symbols.iter().any(|s| s.borrow().name == "foo"));
    }

    #[test]
    fn inheritance_members_visible_via_find_child_chain() {
        let (_, global, diags) = build(
            "class A { public attribute x: int; };\n\
             class B isa A { public attribute y: int; };\n\
             implementation A { }\nimplementation B { }\n",
        );
        assert!(!diags.has_error());
        let b = SymbolTable::find_child(&global, "B", Some(SymbolKind::Class)).unwrap();
        let b_table = b.borrow().subtable.clone().unwrap();
        assert!(b_table.borrow().symbols.iter().any(|s| s.borrow().name == "y"));
    }

    #[test]
    fn duplicate_class_declaration_is_error() {
        let (_, _, diags) = build("class foo { };\nclass foo { };\nimplementation foo { }\n");
        assert!(diags.has_error());
    }

    #[test]
    fn free_function_gets_return_and_jump_symbols() {
        let (_, global, _) = build("function main() => void { local x: int; write(x); }");
        let f = global.borrow().symbols[0].clone();
        let scope = f.borrow().subtable.clone().unwrap();
        let names: Vec<String> = scope.borrow().symbols.iter().map(|s| s.borrow().name.clone()).collect();
        assert!(names.contains(&"return".to_string()));
        assert!(names.contains(&"jump".to_string()));
        assert!(names.contains(&"x".to_string()));
    }

    #[test]
    fn overloading_emits_warning_not_error() {
        let (_, _, diags) = build(
            "function f(x: int) => void { }\nfunction f(x: int, y: float) => void { }\n",
        );
        assert!(!diags.has_error());
        assert!(diags.entries().iter().any(|d| d.message.contains("overloaded")));
    }
}
