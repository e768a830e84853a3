//! MemoryLayout: third AST-adjacent walk (spec.md §4.5).
//!
//! Unlike the other passes this one walks the *symbol-table forest*
//! rather than the AST — every symbol already exists by the time this
//! runs, so sizing is purely a function of the tables SymbolTablePass
//! built and the `class_ref` pointers SemanticPass's type inference
//! resolved. Grounded on the teacher's `typechecker.rs` environment-
//! sizing helpers, generalized from Seq's flat word stack (no layout
//! concept at all) to this spec's per-scope frame/offset bookkeeping.
//!
//! Class attribute types are annotated with a `class_ref` to the class's
//! own table first (so `calculate_size` can read an attribute class's
//! instance size), classes are sized bottom-up by recursing into any
//! class-typed attribute's table before sizing the containing class, and
//! every function/method scope is then sized independently with the same
//! "subtract size, that's the next offset" frame algorithm.

use std::collections::HashSet;

use crate::symbol::{SymTableRef, SymbolKind};

pub fn run(global: &SymTableRef) {
    annotate_class_refs(global);
    let classes = collect_classes(global);
    let mut sized = HashSet::new();
    for class_table in &classes {
        size_class(class_table, &mut sized, &mut Vec::new());
    }
    for sym in global.borrow().symbols.clone() {
        if sym.borrow().kind == SymbolKind::Function {
            if let Some(scope) = sym.borrow().subtable.clone() {
                size_function_scope(&scope);
            }
        }
    }
    for class_table in &classes {
        let methods: Vec<_> = class_table
            .borrow()
            .symbols
            .iter()
            .filter(|s| s.borrow().kind == SymbolKind::Method)
            .cloned()
            .collect();
        for m in methods {
            if let Some(scope) = m.borrow().subtable.clone() {
                size_function_scope(&scope);
            }
        }
    }
}

fn collect_classes(global: &SymTableRef) -> Vec<SymTableRef> {
    global
        .borrow()
        .symbols
        .iter()
        .filter(|s| s.borrow().kind == SymbolKind::Class)
        .filter_map(|s| s.borrow().class_ref.clone())
        .collect()
}

fn class_table_of(global: &SymTableRef, name: &str) -> Option<SymTableRef> {
    crate::symbol::SymbolTable::find_child(global, name, Some(SymbolKind::Class))
        .and_then(|s| s.borrow().class_ref.clone())
}

/// Resolve every symbol's `class_ref` from its base type name, across
/// every class table's data members and every function/method scope's
/// params/return/locals/temps. A symbol whose base type isn't a class
/// name is left untouched (`class_ref` stays `None`, and `calculate_size`
/// falls through to its primitive-width table).
fn annotate_class_refs(global: &SymTableRef) {
    let classes = collect_classes(global);
    for class_table in &classes {
        let syms = class_table.borrow().symbols.clone();
        for s in syms {
            annotate_one(&s, global);
        }
    }
    for sym in global.borrow().symbols.clone() {
        if sym.borrow().kind == SymbolKind::Function {
            if let Some(scope) = sym.borrow().subtable.clone() {
                for s in scope.borrow().symbols.clone() {
                    annotate_one(&s, global);
                }
            }
        }
    }
    for class_table in &classes {
        let methods: Vec<_> = class_table
            .borrow()
            .symbols
            .iter()
            .filter(|s| s.borrow().kind == SymbolKind::Method)
            .cloned()
            .collect();
        for m in methods {
            if let Some(scope) = m.borrow().subtable.clone() {
                for s in scope.borrow().symbols.clone() {
                    annotate_one(&s, global);
                }
            }
        }
    }
}

fn annotate_one(sym: &crate::symbol::SymbolHandle, global: &SymTableRef) {
    let base = sym.borrow().base_type_name().to_string();
    if let Some(table) = class_table_of(global, &base) {
        sym.borrow_mut().class_ref = Some(table);
    }
}

/// Size a class's own data members bottom-up: any attribute whose type is
/// itself a class must be sized first so `calculate_size` sees a final
/// instance size rather than zero, and every `isa` parent must be sized
/// first too, since an instance of a class carries its inherited
/// attributes as well as its own (spec.md §8 scenario S3: a single `int`
/// attribute in a parent plus one in the child gives the child an
/// 8-byte instance). `stack` guards against the inheritance-style cycle
/// SemanticPass already forbids by construction (defensive; never
/// expected to trigger).
fn size_class(table: &SymTableRef, sized: &mut HashSet<String>, stack: &mut Vec<String>) {
    let name = table.borrow().name.clone();
    if sized.contains(&name) || stack.contains(&name) {
        return;
    }
    stack.push(name.clone());
    let parents: Vec<SymTableRef> = table
        .borrow()
        .class_info
        .as_ref()
        .map(|c| c.parents.clone())
        .unwrap_or_default();
    for parent in &parents {
        size_class(parent, sized, stack);
    }
    let deps: Vec<SymTableRef> = table
        .borrow()
        .symbols
        .iter()
        .filter(|s| s.borrow().kind == SymbolKind::Data)
        .filter_map(|s| s.borrow().class_ref.clone())
        .collect();
    for dep in &deps {
        size_class(dep, sized, stack);
    }

    let inherited_size: i64 = parents.iter().map(|p| p.borrow().size).sum();
    let syms = table.borrow().symbols.clone();
    let mut current: i64 = -inherited_size;
    for s in &syms {
        if s.borrow().kind != SymbolKind::Data {
            continue;
        }
        s.borrow_mut().calculate_size();
        let size = s.borrow().size;
        let offset = current - size;
        s.borrow_mut().offset = offset;
        current = offset;
        tracing::trace!(class = %name, symbol = %s.borrow().name, size, offset, "sized class attribute");
    }
    table.borrow_mut().size = -current;
    stack.pop();
    sized.insert(name);
}

/// Size one function/method frame: symbols are already in declaration
/// order (params, return, jump, locals, then SemanticPass's temporaries),
/// so a single downward pass assigns every offset and the scope's total
/// size falls out as the accumulated magnitude.
fn size_function_scope(scope: &SymTableRef) {
    let syms = scope.borrow().symbols.clone();
    let mut current: i64 = 0;
    for s in &syms {
        s.borrow_mut().calculate_size();
        let size = s.borrow().size;
        let offset = current - size;
        s.borrow_mut().offset = offset;
        current = offset;
        tracing::trace!(scope = %scope.borrow().name, symbol = %s.borrow().name, size, offset, "sized frame symbol");
    }
    scope.borrow_mut().size = -current;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(src: &str) -> SymTableRef {
        let out = Parser::new(src).parse();
        assert!(!out.had_error, "{:?}", out.syntax_errors.entries());
        let mut ast = out.ast;
        let (global, sym_diags) = crate::symtab_pass::run(&mut ast);
        assert!(!sym_diags.has_error());
        let sem_diags = crate::semantic_pass::run(&mut ast, &global);
        assert!(!sem_diags.has_error(), "{:?}", sem_diags.entries());
        run(&global);
        global
    }

    #[test]
    fn inherited_class_instance_size_sums_own_and_parent_attributes() {
        let global = build(
            "class A { public attribute x: int; };\n\
             class B isa A { public attribute y: int; };\n\
             implementation A { }\nimplementation B { }\n",
        );
        let b = crate::symbol::SymbolTable::find_child(&global, "B", Some(SymbolKind::Class)).unwrap();
        let b_table = b.borrow().class_ref.clone().unwrap();
        // spec.md §8 S3: B's instance carries both its own y and A's
        // inherited x, 4 bytes each.
        assert_eq!(b_table.borrow().size, 8);
    }

    #[test]
    fn array_symbol_sized_by_element_count() {
        let global = build("function main() => void { local a: int[3][4]; }");
        let f = global.borrow().symbols[0].clone();
        let scope = f.borrow().subtable.clone().unwrap();
        let a = scope.borrow().symbols.iter().find(|s| s.borrow().name == "a").unwrap().clone();
        assert_eq!(a.borrow().size, 4 * 3 * 4);
    }

    #[test]
    fn frame_offsets_are_non_positive_and_scope_size_matches_sum() {
        let global = build("function main() => void { local x: int; local y: float; }");
        let f = global.borrow().symbols[0].clone();
        let scope = f.borrow().subtable.clone().unwrap();
        let mut total = 0;
        for s in &scope.borrow().symbols {
            let b = s.borrow();
            assert!(b.offset <= 0);
            total += b.size;
        }
        assert_eq!(scope.borrow().size, total);
    }
}
