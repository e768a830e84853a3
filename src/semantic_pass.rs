//! SemanticPass: second AST walk (spec.md §4.4).
//!
//! Resolves `isa` inheritance (with cycle detection), checks
//! declared/defined matching, warns on attribute shadowing, and infers a
//! `data_type` for every expression node bottom-up while attaching the
//! symbol each use site resolves to. Grounded on the teacher's
//! `typechecker.rs` shape: a bottom-up inference walk over the AST that
//! attaches a type to each node and reports through a diagnostic sink
//! rather than a `Result`-returning visitor, generalized from Seq's flat
//! word-typed stack values to this language's nested class/scope graph.
//!
//! Every subtree that cannot be resolved is tagged `"type_error"`
//! (spec.md §4.4 "Error policy") so ancestors propagate the sentinel
//! instead of re-reporting the same failure.

use std::collections::HashSet;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::diagnostics::DiagnosticSink;
use crate::symbol::{Symbol, SymbolHandle, SymbolKind, SymbolTable, SymTableRef};

const TYPE_ERROR: &str = "type_error";

pub struct SemanticPass<'a> {
    ast: &'a mut Ast,
    global: SymTableRef,
    diagnostics: DiagnosticSink,
    temp_counter: usize,
}

pub fn run(ast: &mut Ast, global: &SymTableRef) -> DiagnosticSink {
    let mut pass = SemanticPass {
        ast,
        global: global.clone(),
        diagnostics: DiagnosticSink::new(),
        temp_counter: 0,
    };
    pass.run();
    pass.diagnostics
}

impl<'a> SemanticPass<'a> {
    fn run(&mut self) {
        let Some(root) = self.ast.root else { return };
        let top_items = self.ast.children(root).to_vec();

        for &item in &top_items {
            if self.ast.node(item).kind == NodeKind::ClassDef {
                self.resolve_isa(item);
            }
        }
        for &item in &top_items {
            if self.ast.node(item).kind == NodeKind::ClassDef {
                self.check_cycle(item);
            }
        }
        self.warn_shadowing();
        for &item in &top_items {
            match self.ast.node(item).kind {
                NodeKind::ClassDef => self.check_declared_not_defined(item),
                NodeKind::ImplDef => self.check_defined_not_declared(item),
                _ => {}
            }
        }
        for &item in &top_items {
            match self.ast.node(item).kind {
                NodeKind::FuncDef => self.type_func_def(item),
                NodeKind::ImplDef => {
                    let body = self
                        .ast
                        .children(item)
                        .iter()
                        .copied()
                        .find(|&c| self.ast.node(c).kind == NodeKind::ImplBody);
                    if let Some(body) = body {
                        let defs = self.ast.children(body).to_vec();
                        for def in defs {
                            self.type_func_def(def);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // ---- inheritance -----------------------------------------------------

    fn class_table_of(&self, name: &str) -> Option<SymTableRef> {
        SymbolTable::find_child(&self.global, name, Some(SymbolKind::Class))
            .and_then(|s| s.borrow().class_ref.clone())
    }

    fn resolve_isa(&mut self, class_def: NodeId) {
        let name = self.ast.node(class_def).value.clone().unwrap_or_default();
        let Some(table) = self.class_table_of(&name) else { return };
        let isa = self
            .ast
            .children(class_def)
            .iter()
            .copied()
            .find(|&c| self.ast.node(c).kind == NodeKind::Isa);
        let Some(isa) = isa else { return };
        let parent_ids = self.ast.children(isa).to_vec();
        for parent_id in parent_ids {
            let line = self.ast.node(parent_id).line;
            let pname = self.ast.node(parent_id).value.clone().unwrap_or_default();
            match self.class_table_of(&pname) {
                Some(parent_table) => {
                    table.borrow_mut().class_info.as_mut().unwrap().parents.push(parent_table);
                }
                None => {
                    self.diagnostics.error(line, format!("undefined class '{pname}'"));
                }
            }
        }
    }

    fn check_cycle(&mut self, class_def: NodeId) {
        let line = self.ast.node(class_def).line;
        let name = self.ast.node(class_def).value.clone().unwrap_or_default();
        let Some(table) = self.class_table_of(&name) else { return };
        if Self::has_cycle(&table, &name, &mut HashSet::new()) {
            self.diagnostics
                .error(line, format!("circular inheritance detected involving class '{name}'"));
            table.borrow_mut().class_info.as_mut().unwrap().parents.clear();
        }
    }

    fn has_cycle(table: &SymTableRef, start: &str, visited: &mut HashSet<String>) -> bool {
        let parents = table
            .borrow()
            .class_info
            .as_ref()
            .map(|c| c.parents.clone())
            .unwrap_or_default();
        for p in &parents {
            let pname = p.borrow().name.clone();
            if pname == start {
                return true;
            }
            if visited.insert(pname) && Self::has_cycle(p, start, visited) {
                return true;
            }
        }
        false
    }

    fn warn_shadowing(&mut self) {
        let classes: Vec<SymbolHandle> = self
            .global
            .borrow()
            .symbols
            .iter()
            .filter(|s| s.borrow().kind == SymbolKind::Class)
            .cloned()
            .collect();
        for class_sym in classes {
            let Some(table) = class_sym.borrow().class_ref.clone() else { continue };
            let data: Vec<(String, usize)> = table
                .borrow()
                .symbols
                .iter()
                .filter(|s| s.borrow().kind == SymbolKind::Data)
                .map(|s| (s.borrow().name.clone(), 0))
                .collect();
            let parents = table
                .borrow()
                .class_info
                .as_ref()
                .map(|c| c.parents.clone())
                .unwrap_or_default();
            for (name, _) in data {
                for parent in &parents {
                    if SymbolTable::find_child(parent, &name, Some(SymbolKind::Data)).is_some() {
                        self.diagnostics.warning(
                            0,
                            format!("attribute '{name}' in class '{}' shadows an inherited attribute", table.borrow().name),
                        );
                        break;
                    }
                }
            }
        }
    }

    fn check_declared_not_defined(&mut self, class_def: NodeId) {
        let members = self
            .ast
            .children(class_def)
            .iter()
            .copied()
            .find(|&c| self.ast.node(c).kind == NodeKind::Members);
        let Some(members) = members else { return };
        for member in self.ast.children(members).to_vec() {
            let Some(&head) = self.ast.children(member).get(1) else { continue };
            if !matches!(self.ast.node(head).kind, NodeKind::FuncHead | NodeKind::Constructor) {
                continue;
            }
            let line = self.ast.node(head).line;
            let name = self.ast.node(head).value.clone().unwrap_or_else(|| "constructor".to_string());
            if let Some(sym) = self.ast.node(head).symbol.clone() {
                let b = sym.borrow();
                if b.declared() && !b.defined() {
                    self.diagnostics.error(line, format!("method '{name}' declared but not defined"));
                }
            }
        }
    }

    fn check_defined_not_declared(&mut self, impl_def: NodeId) {
        let body = self
            .ast
            .children(impl_def)
            .iter()
            .copied()
            .find(|&c| self.ast.node(c).kind == NodeKind::ImplBody);
        let Some(body) = body else { return };
        for def in self.ast.children(body).to_vec() {
            let Some(&head) = self.ast.children(def).first() else { continue };
            let line = self.ast.node(head).line;
            let name = self.ast.node(head).value.clone().unwrap_or_else(|| "constructor".to_string());
            if let Some(sym) = self.ast.node(head).symbol.clone() {
                if !sym.borrow().declared() {
                    self.diagnostics.error(line, format!("method '{name}' defined but not declared"));
                }
            }
        }
    }

    // ---- statements --------------------------------------------------

    fn type_func_def(&mut self, funcdef: NodeId) {
        let Some(&body) = self.ast.children(funcdef).get(1) else { return };
        for child in self.ast.children(body).to_vec() {
            if self.ast.node(child).kind != NodeKind::VarDecl {
                self.type_statement(child);
            }
        }
    }

    fn type_statblock(&mut self, node: NodeId) {
        for stmt in self.ast.children(node).to_vec() {
            self.type_statement(stmt);
        }
    }

    fn type_statement(&mut self, node: NodeId) {
        let line = self.ast.node(node).line;
        match self.ast.node(node).kind {
            NodeKind::Assign => {
                let children = self.ast.children(node).to_vec();
                let lhs_ty = self.infer_expr(children[0]);
                let rhs_ty = self.infer_expr(children[1]);
                if lhs_ty != TYPE_ERROR && rhs_ty != TYPE_ERROR && lhs_ty != rhs_ty {
                    self.diagnostics
                        .error(line, format!("Assign type error: {lhs_ty} := {rhs_ty}"));
                }
            }
            NodeKind::If => {
                let children = self.ast.children(node).to_vec();
                let cond_ty = self.infer_expr(children[0]);
                if cond_ty != TYPE_ERROR && cond_ty != "bool" {
                    self.diagnostics
                        .error(line, format!("if condition must be bool, found '{cond_ty}'"));
                }
                self.type_statblock(children[1]);
                self.type_statblock(children[2]);
            }
            NodeKind::While => {
                let children = self.ast.children(node).to_vec();
                let cond_ty = self.infer_expr(children[0]);
                if cond_ty != TYPE_ERROR && cond_ty != "bool" {
                    self.diagnostics
                        .error(line, format!("while condition must be bool, found '{cond_ty}'"));
                }
                self.type_statblock(children[1]);
            }
            NodeKind::Read => {
                let children = self.ast.children(node).to_vec();
                let ty = self.infer_expr(children[0]);
                if ty != TYPE_ERROR && ty != "int" {
                    self.diagnostics.error(line, format!("read target must be int, found '{ty}'"));
                }
            }
            NodeKind::Write => {
                let children = self.ast.children(node).to_vec();
                let ty = self.infer_expr(children[0]);
                if ty != TYPE_ERROR && ty != "int" {
                    self.diagnostics.error(line, format!("write argument must be int, found '{ty}'"));
                }
            }
            NodeKind::Return => {
                let children = self.ast.children(node).to_vec();
                let ty = self.infer_expr(children[0]);
                let scope = self.ast.node(node).symbol_table.clone();
                if let Some(scope) = scope {
                    if let Some(ret_sym) = SymbolTable::find_child(&scope, "return", Some(SymbolKind::Return)) {
                        let ret_ty = ret_sym.borrow().type_name.clone();
                        if ret_ty != "void" && ty != TYPE_ERROR && ty != ret_ty {
                            self.diagnostics
                                .error(line, format!("return type error: expected '{ret_ty}', found '{ty}'"));
                        }
                    }
                }
            }
            NodeKind::FunCall => {
                self.infer_expr(node);
            }
            NodeKind::Statement => {
                for c in self.ast.children(node).to_vec() {
                    self.infer_expr(c);
                }
            }
            _ => {}
        }
    }

    // ---- expressions -------------------------------------------------

    fn infer_expr(&mut self, node: NodeId) -> String {
        let ty = match self.ast.node(node).kind {
            NodeKind::IntLit => {
                let scope = self.ast.node(node).symbol_table.clone();
                if let Some(scope) = scope {
                    let handle = self.alloc_temp(&scope, "int", SymbolKind::Lit);
                    self.ast.node_mut(node).symbol = Some(handle);
                }
                "int".to_string()
            }
            NodeKind::FloatLit => {
                let scope = self.ast.node(node).symbol_table.clone();
                if let Some(scope) = scope {
                    let handle = self.alloc_temp(&scope, "float", SymbolKind::Lit);
                    self.ast.node_mut(node).symbol = Some(handle);
                }
                "float".to_string()
            }
            NodeKind::Sign => {
                let child = self.ast.children(node)[0];
                let ct = self.infer_expr(child);
                if ct != TYPE_ERROR {
                    let scope = self.ast.node(node).symbol_table.clone();
                    if let Some(scope) = scope {
                        let handle = self.alloc_temp(&scope, &ct, SymbolKind::Temp);
                        self.ast.node_mut(node).symbol = Some(handle);
                    }
                }
                ct
            }
            NodeKind::Not => {
                let child = self.ast.children(node)[0];
                let ct = self.infer_expr(child);
                let line = self.ast.node(node).line;
                if ct == TYPE_ERROR {
                    TYPE_ERROR.to_string()
                } else if ct != "bool" {
                    self.diagnostics.error(line, format!("operand of 'not' must be bool, found '{ct}'"));
                    TYPE_ERROR.to_string()
                } else {
                    let scope = self.ast.node(node).symbol_table.clone();
                    if let Some(scope) = scope {
                        let handle = self.alloc_temp(&scope, "bool", SymbolKind::Temp);
                        self.ast.node_mut(node).symbol = Some(handle);
                    }
                    "bool".to_string()
                }
            }
            NodeKind::AddOp | NodeKind::MultOp => self.infer_binop(node),
            NodeKind::Relop => self.infer_relop(node),
            NodeKind::DataMember => self.infer_data_member(node),
            NodeKind::Dot => self.infer_dot(node),
            NodeKind::FunCall => self.infer_call_bare(node),
            NodeKind::Variable => {
                let child = self.ast.children(node)[0];
                self.infer_expr(child)
            }
            NodeKind::SelfRef => {
                let scope = self.ast.node(node).symbol_table.clone();
                let line = self.ast.node(node).line;
                match scope.and_then(|s| find_enclosing_class(&s)) {
                    Some(table) => table.borrow().name.clone(),
                    None => {
                        self.diagnostics.error(line, "'self' used outside a method");
                        TYPE_ERROR.to_string()
                    }
                }
            }
            _ => TYPE_ERROR.to_string(),
        };
        self.ast.node_mut(node).data_type = Some(ty.clone());
        ty
    }

    fn infer_binop(&mut self, node: NodeId) -> String {
        let children = self.ast.children(node).to_vec();
        let line = self.ast.node(node).line;
        let op = self.ast.node(node).value.clone().unwrap_or_default();
        let lt = self.infer_expr(children[0]);
        let rt = self.infer_expr(children[1]);
        if lt == TYPE_ERROR || rt == TYPE_ERROR {
            return TYPE_ERROR.to_string();
        }
        if lt != rt {
            self.diagnostics
                .error(line, format!("operand type mismatch: '{lt}' {op} '{rt}'"));
            return TYPE_ERROR.to_string();
        }
        let scope = self.ast.node(node).symbol_table.clone();
        if let Some(scope) = scope {
            let handle = self.alloc_temp(&scope, &lt, SymbolKind::Temp);
            self.ast.node_mut(node).symbol = Some(handle);
        }
        lt
    }

    fn infer_relop(&mut self, node: NodeId) -> String {
        let children = self.ast.children(node).to_vec();
        let line = self.ast.node(node).line;
        let op = self.ast.node(node).value.clone().unwrap_or_default();
        let lt = self.infer_expr(children[0]);
        let rt = self.infer_expr(children[1]);
        if lt != TYPE_ERROR && rt != TYPE_ERROR && lt != rt {
            self.diagnostics
                .error(line, format!("operand type mismatch: '{lt}' {op} '{rt}'"));
        }
        let scope = self.ast.node(node).symbol_table.clone();
        if let Some(scope) = scope {
            let handle = self.alloc_temp(&scope, "bool", SymbolKind::Temp);
            self.ast.node_mut(node).symbol = Some(handle);
        }
        "bool".to_string()
    }

    fn infer_data_member(&mut self, node: NodeId) -> String {
        let children = self.ast.children(node).to_vec();
        let base_node = children[0];
        let indices_node = children[1];
        let line = self.ast.node(node).line;
        let scope = self.ast.node(node).symbol_table.clone().expect("scope attached");

        let base_type = match self.ast.node(base_node).kind {
            NodeKind::Id => {
                let name = self.ast.node(base_node).value.clone().unwrap_or_default();
                match SymbolTable::lookup(&scope, &name) {
                    Some(sym) => {
                        let t = sym.borrow().type_name.clone();
                        self.ast.node_mut(node).symbol = Some(sym);
                        t
                    }
                    None => {
                        self.diagnostics.error(line, format!("undefined identifier '{name}'"));
                        TYPE_ERROR.to_string()
                    }
                }
            }
            NodeKind::SelfRef => match find_enclosing_class(&scope) {
                Some(table) => table.borrow().name.clone(),
                None => {
                    self.diagnostics.error(line, "'self' used outside a method");
                    TYPE_ERROR.to_string()
                }
            },
            _ => TYPE_ERROR.to_string(),
        };

        if base_type == TYPE_ERROR {
            return TYPE_ERROR.to_string();
        }
        self.check_indices(&base_type, indices_node, &scope, line)
    }

    fn infer_dot(&mut self, node: NodeId) -> String {
        let children = self.ast.children(node).to_vec();
        let left = children[0];
        let right = children[1];
        let line = self.ast.node(node).line;
        let left_ty = self.infer_expr(left);
        if left_ty == TYPE_ERROR {
            return TYPE_ERROR.to_string();
        }
        if left_ty.contains('[') || matches!(left_ty.as_str(), "int" | "float" | "bool" | "void") {
            self.diagnostics
                .error(line, format!("'.' used on non-class type '{left_ty}'"));
            return TYPE_ERROR.to_string();
        }
        let Some(class_table) = self.class_table_of(&left_ty) else {
            self.diagnostics.error(line, format!("undefined class '{left_ty}'"));
            return TYPE_ERROR.to_string();
        };
        match self.ast.node(right).kind {
            NodeKind::FunCall => self.infer_call_in_class(right, &class_table),
            NodeKind::DataMember => self.infer_member_in_class(right, &class_table),
            _ => TYPE_ERROR.to_string(),
        }
    }

    fn infer_member_in_class(&mut self, node: NodeId, class_table: &SymTableRef) -> String {
        let children = self.ast.children(node).to_vec();
        let id_node = children[0];
        let indices_node = children[1];
        let line = self.ast.node(node).line;
        let name = self.ast.node(id_node).value.clone().unwrap_or_default();
        let scope = self.ast.node(node).symbol_table.clone().expect("scope attached");

        match SymbolTable::find_child(class_table, &name, Some(SymbolKind::Data)) {
            Some(sym) => {
                let base_type = sym.borrow().type_name.clone();
                self.ast.node_mut(node).symbol = Some(sym);
                self.check_indices(&base_type, indices_node, &scope, line)
            }
            None => {
                self.diagnostics.error(line, format!("undefined member '{name}'"));
                TYPE_ERROR.to_string()
            }
        }
    }

    fn infer_aparams(&mut self, funcall: NodeId) -> Vec<String> {
        let Some(&aparams) = self.ast.children(funcall).first() else { return Vec::new() };
        self.ast
            .children(aparams)
            .to_vec()
            .into_iter()
            .map(|e| self.infer_expr(e))
            .collect()
    }

    fn infer_call_bare(&mut self, node: NodeId) -> String {
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        let line = self.ast.node(node).line;
        let scope = self.ast.node(node).symbol_table.clone().expect("scope attached");
        let param_types = self.infer_aparams(node);
        if param_types.iter().any(|t| t == TYPE_ERROR) {
            return TYPE_ERROR.to_string();
        }
        let resolved = match lookup_func_chain(&scope, &name, &param_types) {
            Some(sym) => Some(sym),
            None => {
                if lookup_func_any_chain(&scope, &name).is_some() {
                    self.diagnostics
                        .error(line, format!("wrong number or types of arguments for function '{name}'"));
                } else {
                    self.diagnostics.error(line, format!("undefined function '{name}'"));
                }
                None
            }
        };
        self.finish_call(node, &scope, resolved)
    }

    fn infer_call_in_class(&mut self, node: NodeId, class_table: &SymTableRef) -> String {
        let name = self.ast.node(node).value.clone().unwrap_or_default();
        let line = self.ast.node(node).line;
        let scope = self.ast.node(node).symbol_table.clone().expect("scope attached");
        let param_types = self.infer_aparams(node);
        if param_types.iter().any(|t| t == TYPE_ERROR) {
            return TYPE_ERROR.to_string();
        }
        let resolved = match SymbolTable::find_func_child(class_table, &name, &param_types) {
            Some(sym) => Some(sym),
            None => {
                if SymbolTable::find_any_func_child(class_table, &name).is_some() {
                    self.diagnostics
                        .error(line, format!("wrong number or types of arguments for method '{name}'"));
                } else {
                    self.diagnostics.error(line, format!("undefined method '{name}'"));
                }
                None
            }
        };
        self.finish_call(node, &scope, resolved)
    }

    /// Shared tail of call resolution: on success, the return type becomes
    /// the node's `data_type`, and if it's non-`void` a fresh temporary is
    /// allocated in the caller's scope to hold the call's result so the
    /// code generator has somewhere to store it for use in a larger
    /// expression — the same rationale spec.md §4.4 gives for `AddOp`/
    /// `MultOp`/`RelOp`/`Indices` temporaries.
    fn finish_call(&mut self, node: NodeId, scope: &SymTableRef, resolved: Option<SymbolHandle>) -> String {
        let Some(sym) = resolved else {
            return TYPE_ERROR.to_string();
        };
        let ret_type = sym.borrow().type_name.clone();
        if ret_type != "void" {
            let handle = self.alloc_temp(scope, &ret_type, SymbolKind::Temp);
            self.ast.node_mut(node).symbol = Some(handle);
        }
        ret_type
    }

    fn check_indices(&mut self, base_type: &str, indices_node: NodeId, scope: &SymTableRef, line: usize) -> String {
        let indices = self.ast.children(indices_node).to_vec();
        let mut result = base_type.to_string();
        let mut ok = true;
        for indice in &indices {
            let Some(&expr) = self.ast.children(*indice).first() else { continue };
            let ity = self.infer_expr(expr);
            if ity != TYPE_ERROR && ity != "int" {
                self.diagnostics.error(line, format!("array index must be int, found '{ity}'"));
                ok = false;
            }
            if let Some(stripped) = result.strip_suffix("[]") {
                result = stripped.to_string();
            } else {
                self.diagnostics.error(line, "over-indexing: more indices than array dimensions");
                ok = false;
            }
        }
        if !ok {
            return TYPE_ERROR.to_string();
        }
        if !indices.is_empty() {
            let handle = self.alloc_temp(scope, "int", SymbolKind::Temp);
            self.ast.node_mut(indices_node).symbol = Some(handle);
        }
        result
    }

    fn alloc_temp(&mut self, scope: &SymTableRef, type_name: &str, kind: SymbolKind) -> SymbolHandle {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        let symbol = Symbol::new(kind, name, type_name);
        let handle = std::rc::Rc::new(std::cell::RefCell::new(symbol));
        scope.borrow_mut().insert(handle.clone());
        handle
    }
}

/// Walk a scope's non-owning `parent` chain (or the scope itself) for the
/// nearest table that carries `class_info` — a method's own symbol table
/// is a direct child of its class table, so this resolves `self`'s type.
fn find_enclosing_class(scope: &SymTableRef) -> Option<SymTableRef> {
    if scope.borrow().class_info.is_some() {
        return Some(scope.clone());
    }
    let parent = scope.borrow().parent.clone()?.upgrade()?;
    find_enclosing_class(&parent)
}

/// Climb the scope chain looking for a function/method whose signature
/// matches `params` exactly, consulting class parent tables at each level
/// via [`SymbolTable::find_func_child`] — this is how an unqualified call
/// inside a method reaches both sibling methods (through the class table)
/// and free functions (through the eventual global table) without
/// threading an explicit receiver.
fn lookup_func_chain(scope: &SymTableRef, name: &str, params: &[String]) -> Option<SymbolHandle> {
    if let Some(s) = SymbolTable::find_func_child(scope, name, params) {
        return Some(s);
    }
    let parent = scope.borrow().parent.clone()?.upgrade()?;
    lookup_func_chain(&parent, name, params)
}

fn lookup_func_any_chain(scope: &SymTableRef, name: &str) -> Option<SymbolHandle> {
    if let Some(s) = SymbolTable::find_any_func_child(scope, name) {
        return Some(s);
    }
    let parent = scope.borrow().parent.clone()?.upgrade()?;
    lookup_func_any_chain(&parent, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(src: &str) -> (Ast, DiagnosticSink) {
        let out = Parser::new(src).parse();
        assert!(!out.had_error, "{:?}", out.syntax_errors.entries());
        let mut ast = out.ast;
        let (global, sym_diags) = crate::symtab_pass::run(&mut ast);
        assert!(!sym_diags.has_error(), "{:?}", sym_diags.entries());
        let diags = run(&mut ast, &global);
        (ast, diags)
    }

    #[test]
    fn literal_addition_infers_int_and_allocates_temp() {
        let (ast, diags) = build("function main() => void { local x: int; x := 2 + 3; }");
        assert!(!diags.has_error(), "{:?}", diags.entries());
        let root = ast.root.unwrap();
        let func = ast.children(root)[0];
        let body = ast.children(func)[1];
        let assign = ast
            .children(body)
            .iter()
            .copied()
            .find(|&c| ast.node(c).kind == NodeKind::Assign)
            .unwrap();
        let rhs = ast.children(assign)[1];
        assert_eq!(ast.node(rhs).data_type.as_deref(), Some("int"));
        assert!(ast.node(rhs).symbol.is_some());
    }

    #[test]
    fn mismatched_assign_is_type_error() {
        let (_, diags) = build("function main() => void { local a: int; a := 1.5; }");
        assert!(diags.has_error());
        assert!(diags.entries().iter().any(|d| d.message.contains("Assign type error")));
    }

    #[test]
    fn inherited_attribute_is_visible_through_dot() {
        let (_, diags) = build(
            "class A { public attribute x: int; };\n\
             class B isa A { public attribute y: int; };\n\
             implementation A { }\nimplementation B { }\n\
             function main() => void { local b: B; local z: int; z := b.x; }",
        );
        assert!(!diags.has_error(), "{:?}", diags.entries());
    }

    #[test]
    fn circular_inheritance_is_detected_and_cleared() {
        let (_, diags) = build(
            "class A isa B { };\nclass B isa A { };\n\
             implementation A { }\nimplementation B { }\n",
        );
        assert!(diags.has_error());
        assert!(diags.entries().iter().any(|d| d.message.contains("circular")));
    }

    #[test]
    fn array_over_indexing_is_an_error() {
        let (_, diags) = build(
            "function main() => void { local a: int[3]; local z: int; z := a[0][1]; }",
        );
        assert!(diags.has_error());
        assert!(diags.entries().iter().any(|d| d.message.contains("over-indexing")));
    }

    #[test]
    fn dot_on_non_class_is_an_error() {
        let (_, diags) = build(
            "function main() => void { local a: int; local z: int; z := a.foo; }",
        );
        assert!(diags.has_error());
        assert!(diags.entries().iter().any(|d| d.message.contains("non-class")));
    }
}
