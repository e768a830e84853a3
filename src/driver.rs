//! Driver: wires the five passes together and writes the compiler's
//! side-channel output files (spec.md §6).
//!
//! Grounded on the teacher's `main.rs`, which owns the same
//! read-source / run-pipeline / write-artifacts shape (there it's
//! parse → resolve → typecheck → codegen → link; here it's
//! lex/parse → SymbolTablePass → SemanticPass → MemoryLayout →
//! CodeGen), generalized to this language's seven-file output table
//! instead of the teacher's single executable.

use std::path::{Path, PathBuf};

use crate::codegen::{self, CodeGenError};
use crate::config::CompilerConfig;
use crate::diagnostics::DiagnosticSink;
use crate::memory_layout;
use crate::parser::Parser;
use crate::symtab_pass;
use crate::semantic_pass;

#[derive(Debug)]
pub enum DriverError {
    Io(std::io::Error),
    CodeGen(CodeGenError),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Io(e) => write!(f, "{e}"),
            DriverError::CodeGen(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e)
    }
}

impl From<CodeGenError> for DriverError {
    fn from(e: CodeGenError) -> Self {
        DriverError::CodeGen(e)
    }
}

/// Summary of one compile run, returned for callers (tests, the CLI)
/// that want to inspect what happened without re-reading the output
/// files back off disk.
pub struct CompileReport {
    pub had_error: bool,
    pub derivation: String,
    pub syntax_errors: DiagnosticSink,
    pub ast_text: String,
    pub symbol_tables_text: String,
    pub sem_errors: DiagnosticSink,
    pub assembly: Option<String>,
}

/// Runs the full pipeline over `source`, stopping before MemoryLayout
/// and CodeGen if an earlier phase set `has_error` (spec.md §5).
pub fn compile(source: &str, config: &CompilerConfig) -> CompileReport {
    let parse_out = Parser::new(source).parse();
    let mut ast = parse_out.ast;
    let derivation = parse_out.derivation;
    let syntax_errors = parse_out.syntax_errors;
    let mut had_error = parse_out.had_error;

    let (global, sym_diags) = symtab_pass::run(&mut ast);
    had_error = had_error || sym_diags.has_error();

    let sem_errors = if !had_error {
        semantic_pass::run(&mut ast, &global)
    } else {
        DiagnosticSink::new()
    };
    had_error = had_error || sem_errors.has_error();

    let ast_text = ast.pretty_print(ast.root);
    let symbol_tables_text = crate::symbol::SymbolTable::render_forest(&global);

    let assembly = if !had_error {
        memory_layout::run(&global);
        match codegen::run(&ast, &global, config.register_count) {
            Ok(asm) => Some(asm),
            Err(e) => {
                tracing::error!(error = %e, "code generation failed");
                had_error = true;
                None
            }
        }
    } else {
        None
    };

    CompileReport {
        had_error,
        derivation,
        syntax_errors,
        ast_text,
        symbol_tables_text,
        sem_errors,
        assembly,
    }
}

/// Runs [`compile`] over the contents of `input` and writes the seven
/// sibling output files spec.md §6 describes. Returns whether the
/// compile succeeded (no phase's `has_error` set).
pub fn compile_file(input: &Path, config: &CompilerConfig) -> Result<bool, DriverError> {
    let source = std::fs::read_to_string(input)?;
    let report = compile(&source, config);

    let suffixes = &config.suffixes;
    write_sibling(input, &suffixes.derivation, &report.derivation)?;
    write_sibling(input, &suffixes.syntax_errors, &report.syntax_errors.render())?;
    write_sibling(input, &suffixes.ast, &report.ast_text)?;
    write_sibling(input, &suffixes.symbol_tables, &report.symbol_tables_text)?;
    write_sibling(input, &suffixes.sem_errors, &report.sem_errors.render())?;
    if let Some(asm) = &report.assembly {
        write_sibling(input, &suffixes.assembly, asm)?;
    }
    if config.write_combined_errors {
        let mut combined = DiagnosticSink::new();
        combined.extend(&report.syntax_errors);
        combined.extend(&report.sem_errors);
        write_sibling(input, &suffixes.combined_errors, &combined.render())?;
    }

    Ok(!report.had_error)
}

fn write_sibling(input: &Path, suffix: &str, contents: &str) -> std::io::Result<()> {
    std::fs::write(sibling_path(input, suffix), contents)
}

fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(suffix);
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn clean_program_compiles_and_writes_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.src");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "function main() => void {{ local x: int; x := 2 + 3; write(x); }}").unwrap();
        drop(f);

        let ok = compile_file(&path, &CompilerConfig::default()).unwrap();
        assert!(ok);
        let asm = std::fs::read_to_string(path.with_file_name("prog.m")).unwrap();
        assert!(asm.contains("jl r15, putstr"));
        let ast_text = std::fs::read_to_string(path.with_file_name("prog.outast")).unwrap();
        assert!(ast_text.contains("AddOp"));
    }

    #[test]
    fn type_error_stops_before_codegen_and_skips_assembly_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.src");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "function main() => void {{ local a: int; a := 1.5; }}"
        )
        .unwrap();
        drop(f);

        let ok = compile_file(&path, &CompilerConfig::default()).unwrap();
        assert!(!ok);
        assert!(!path.with_file_name("bad.m").exists());
        let sem_errors = std::fs::read_to_string(path.with_file_name("bad.outsemerrors")).unwrap();
        assert!(sem_errors.contains("type"));
    }

    #[test]
    fn empty_class_program_emits_only_data_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.src");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "class foo {{ }};\nimplementation foo {{ }}").unwrap();
        drop(f);

        let ok = compile_file(&path, &CompilerConfig::default()).unwrap();
        assert!(ok);
        let asm = std::fs::read_to_string(path.with_file_name("empty.m")).unwrap();
        assert!(asm.contains("buf"));
        assert!(!asm.contains("entry"));
    }
}
