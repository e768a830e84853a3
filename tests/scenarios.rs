//! End-to-end scenarios, one per test, mirroring spec.md §8's
//! concrete-scenario table (S1-S6) plus a handful of the surrounding
//! totality/determinism/idempotence properties that only show up once
//! the five passes run back to back through the public driver API.
//!
//! Grounded on the teacher's `tempfile`-backed integration style (write
//! a temp source file, drive the public API, assert on the artifacts),
//! the same pattern `driver.rs`'s own `#[cfg(test)]` module uses for
//! its narrower per-call checks.

use ooc::driver;
use ooc::symbol::SymbolKind;
use ooc::{CompilerConfig, Severity};

fn compile(src: &str) -> driver::CompileReport {
    driver::compile(src, &CompilerConfig::default())
}

// ---- S1: empty program -------------------------------------------------

#[test]
fn s1_empty_class_program_has_no_diagnostics_and_only_a_data_section() {
    let report = compile("class foo { };\nimplementation foo { }\n");
    assert!(!report.had_error);
    assert!(report.syntax_errors.entries().is_empty());
    assert!(report.sem_errors.entries().is_empty());
    let asm = report.assembly.expect("clean program emits assembly");
    assert!(asm.contains("buf"));
    // no function ever ran, so no entry/hlt pair should appear
    assert!(!asm.contains("entry"));
    assert!(!asm.contains("hlt"));
}

// ---- S2: free function, print ------------------------------------------

#[test]
fn s2_free_function_print_builds_addop_and_emits_putstr() {
    let report = compile("function main() => void { local x: int; x := 2 + 3; write(x); }");
    assert!(!report.had_error);
    assert!(report.ast_text.contains("AddOp(+)"));
    assert!(report.ast_text.contains("IntLit(2)"));
    assert!(report.ast_text.contains("IntLit(3)"));
    let asm = report.assembly.unwrap();
    assert!(asm.contains("jl r15, putstr"));
    // the two literals and their sum all land in add/store sequences
    assert!(asm.lines().any(|l| l.trim_start().starts_with("add r")));
}

// ---- S3: class with inheritance ----------------------------------------

#[test]
fn s3_class_with_inheritance_exposes_inherited_member_and_sums_instance_size() {
    let report = compile(
        "class A { public attribute x: int; };\n\
         class B isa A { public attribute y: int; };\n\
         implementation A { }\nimplementation B { }\n",
    );
    assert!(!report.had_error, "{:?}", report.sem_errors.entries());
    assert!(report.symbol_tables_text.contains("size=8"));
}

// ---- S4: circular inheritance -------------------------------------------

#[test]
fn s4_circular_inheritance_is_reported_and_does_not_hang() {
    let report = compile("class A isa B { };\nclass B isa A { };\nimplementation A { }\nimplementation B { }\n");
    assert!(report.had_error);
    assert!(
        report
            .sem_errors
            .entries()
            .iter()
            .any(|d| d.message.to_lowercase().contains("circular"))
    );
    // no `.m` artifact should be produced once an earlier phase failed
    assert!(report.assembly.is_none());
}

// ---- S5: type error in assignment ---------------------------------------

#[test]
fn s5_assign_type_mismatch_is_reported_and_suppresses_codegen() {
    let report = compile("function main() => void { local a: int; a := 1.5; }");
    assert!(report.had_error);
    assert!(report.assembly.is_none());
    let msg = report
        .sem_errors
        .entries()
        .iter()
        .find(|d| d.message.contains("Assign type error"))
        .expect("assign type error diagnostic present");
    assert_eq!(msg.severity, Severity::Error);
    assert!(msg.message.contains("int"));
    assert!(msg.message.contains("float"));
}

// ---- S6: array access ----------------------------------------------------

#[test]
fn s6_two_dimensional_array_access_strips_one_dimension_per_index() {
    let report = compile("function main() => void { local a: int[3][4]; a[1][2] := 7; }");
    assert!(!report.had_error, "{:?}", report.sem_errors.entries());
    // two Indice children under one Indices node for the double index
    assert!(report.ast_text.contains("Indices"));
    let asm = report.assembly.unwrap();
    // row-major addressing needs a multiply against the stride
    assert!(asm.lines().any(|l| l.trim_start().starts_with("mul r")));
}

// ---- §8 property checks over a broader corpus ---------------------------

const CORPUS: &[&str] = &[
    "class foo { };\nimplementation foo { }\n",
    "function main() => void { local x: int; x := 2 + 3; write(x); }",
    "class A { public attribute x: int; };\nclass B isa A { public attribute y: int; };\nimplementation A { }\nimplementation B { }\n",
    "function main() => void { local a: int[3][4]; a[1][2] := 7; }",
    "function helper(n: int) => int { return(n); }\nfunction main() => void { local x: int; x := helper(1); write(x); }",
    "function main() => void { local x: int; while (x < 10) { x := x + 1; }; write(x); }",
];

#[test]
fn property_lexer_totality_every_program_ends_in_eof() {
    for src in CORPUS {
        let toks = ooc::lexer::Lexer::tokenize_all(src);
        assert_eq!(toks.last().unwrap().kind, ooc::token::TokenKind::Eof);
        assert!(toks.iter().all(|t| t.kind == ooc::token::TokenKind::Eof || !t.lexeme.is_empty()));
    }
}

#[test]
fn property_parser_determinism_same_source_same_ast_text() {
    for src in CORPUS {
        let a = ooc::Parser::new(src).parse();
        let b = ooc::Parser::new(src).parse();
        assert_eq!(a.ast.pretty_print(a.ast.root), b.ast.pretty_print(b.ast.root));
        assert_eq!(a.had_error, b.had_error);
    }
}

#[test]
fn property_ast_structural_invariants_hold_after_parsing() {
    // `Ast::check_invariants` is a `#[cfg(test)]` helper private to the
    // library's own test build, so this checks the same two invariants
    // from outside through the public node/children accessors instead.
    for src in CORPUS {
        let out = ooc::Parser::new(src).parse();
        let ast = out.ast;
        for i in 0..ast.len() {
            let id = ooc::NodeId(i);
            let node = ast.node(id);
            if let Some(parent) = node.parent {
                assert!(ast.children(parent).contains(&id), "node {i} missing from parent's children");
            }
            if let Some(&first) = node.children.first() {
                for &c in &node.children {
                    assert_eq!(ast.node(c).first_sibling, Some(first), "child {} has wrong first_sibling", c.0);
                }
            }
        }
    }
}

#[test]
fn property_codegen_idempotence_same_ast_same_assembly() {
    for src in CORPUS {
        let r1 = compile(src);
        let r2 = compile(src);
        assert_eq!(r1.assembly, r2.assembly);
    }
}

#[test]
fn property_layout_totality_every_symbol_is_well_formed() {
    // run the first four passes manually so we can inspect the symbol
    // forest directly, the way memory_layout.rs's own tests do.
    for src in CORPUS {
        let out = ooc::Parser::new(src).parse();
        assert!(!out.had_error, "{:?}", out.syntax_errors.entries());
        let mut ast = out.ast;
        let (global, sym_diags) = ooc::symtab_pass::run(&mut ast);
        assert!(!sym_diags.has_error());
        let sem_diags = ooc::semantic_pass::run(&mut ast, &global);
        if sem_diags.has_error() {
            continue;
        }
        ooc::memory_layout::run(&global);
        check_scope_totality(&global);
    }
}

fn check_scope_totality(table: &ooc::SymTableRef) {
    let mut own_total = 0i64;
    for sym in table.borrow().symbols.iter() {
        let b = sym.borrow();
        let unsized_kind = matches!(b.kind, SymbolKind::Class | SymbolKind::Function | SymbolKind::Method);
        if b.type_name != "void" && !unsized_kind {
            assert!(b.size > 0, "symbol '{}' has non-positive size", b.name);
        }
        assert!(b.offset <= 0, "symbol '{}' has positive offset {}", b.name, b.offset);
        own_total += b.size;
    }
    // a class table's size also carries its parents' attributes, which
    // never appear in its own `symbols` list (S3: inheritance composes
    // by size, not by copying member symbols into the subclass).
    let inherited: i64 = table
        .borrow()
        .class_info
        .as_ref()
        .map(|c| c.parents.iter().map(|p| p.borrow().size).sum())
        .unwrap_or(0);
    assert_eq!(
        table.borrow().size,
        own_total + inherited,
        "scope '{}' size doesn't match own-symbol plus inherited sum",
        table.borrow().name
    );
    let subtables: Vec<_> = table.borrow().symbols.iter().filter_map(|s| s.borrow().subtable.clone()).collect();
    for sub in subtables {
        check_scope_totality(&sub);
    }
}

#[test]
fn property_register_pool_balances_across_a_whole_program() {
    // compile() itself asserts (via codegen's debug_assert) that every
    // function leaves the pool full; reaching a returned report at all
    // for a program with nested control flow is the black-box half of
    // that guarantee.
    let report = compile(
        "function main() => void {\n\
           local x: int;\n\
           local y: int;\n\
           x := 0;\n\
           while (x < 5) {\n\
             if (x < 2) then { y := 1; } else { y := 2; };\n\
             x := x + 1;\n\
           };\n\
           write(x);\n\
         }",
    );
    assert!(!report.had_error, "{:?}", report.sem_errors.entries());
    assert!(report.assembly.is_some());
}

// ---- Driver-level output wiring -----------------------------------------

#[test]
fn derivation_trace_is_nonempty_and_line_prefixed() {
    let report = compile("function main() => void { write(1); }");
    assert!(!report.derivation.is_empty());
    let first_line = report.derivation.lines().next().unwrap();
    assert!(first_line.starts_with(|c: char| c.is_ascii_digit()));
}

#[test]
fn symbol_table_forest_renders_every_scope() {
    let report = compile(
        "class A { public attribute x: int; public function get() => int; };\n\
         implementation A { function get() => int { return(x); } }\n\
         function main() => void { local a: A; local z: int; z := a.get(); write(z); }",
    );
    assert!(!report.had_error, "{:?}", report.sem_errors.entries());
    assert!(report.symbol_tables_text.contains('A'));
    assert!(report.symbol_tables_text.contains("main"));
    assert!(report.symbol_tables_text.contains("get"));
}
