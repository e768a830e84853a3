//! Symbols and symbol tables.
//!
//! The source language has no counterpart in the teacher (Seq is a flat,
//! word-named stack language with no scopes or classes), so this module
//! is new. It follows design note §9's re-architecture directly:
//! shared-ownership handles (`Rc<RefCell<_>>`) for symbols and scopes,
//! since a variable's type can point at a class's table from anywhere in
//! the tree, and plain `Weak` back-references for the non-owning
//! `parent` scope pointer so the forest can never keep itself alive in a
//! cycle. Inheritance-parent lists hold `Rc` clones of other class
//! tables (shared, not owning in the cyclic sense); the `Isa` pass (see
//! `semantic_pass.rs`) guarantees those lists are acyclic by construction.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub type SymTableRef = Rc<RefCell<SymbolTable>>;
pub type SymbolHandle = Rc<RefCell<Symbol>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Function,
    Method,
    Data,
    Param,
    Local,
    Return,
    Jump,
    Temp,
    Lit,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The two specializations from §3: `VarSymbol` adds `is_public`;
/// `FuncSymbol` adds `is_public`, `declared`, `defined`, and the formal
/// parameter-type signature. Everything else (class/return/jump/local/
/// temp/lit symbols) carries no extra payload.
#[derive(Debug, Clone)]
pub enum SymbolData {
    Var {
        is_public: bool,
    },
    Func {
        is_public: bool,
        declared: bool,
        defined: bool,
        param_types: Vec<String>,
    },
    Plain,
}

/// One entry in a symbol table.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    /// Canonical type string: `int`, `float`, `bool`, `void`, a class
    /// name, any of these with one or more trailing `[]`.
    pub type_name: String,
    /// Known array extents, outermost first. Empty for a scalar.
    /// Unsized formal-parameter dimensions are recorded as `0`.
    pub dimensions: Vec<i64>,
    /// Class/function/method scope this symbol opens, if any.
    pub subtable: Option<SymTableRef>,
    /// The class table `type_name` resolves to, when it names a class.
    /// Populated once SemanticPass resolves the type; used by
    /// `calculate_size` and by member lookups through `Dot`.
    pub class_ref: Option<SymTableRef>,
    pub base_size: i64,
    pub size: i64,
    pub offset: i64,
    pub data: SymbolData,
    /// Back-pointer used only by CodeGen to remember which register a
    /// symbol's value currently lives in mid-expression. Mutable after
    /// MemoryLayout, per §3's lifecycle note.
    pub reference: Option<u8>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let data = match kind {
            SymbolKind::Data | SymbolKind::Param | SymbolKind::Local => {
                SymbolData::Var { is_public: false }
            }
            SymbolKind::Function | SymbolKind::Method => SymbolData::Func {
                is_public: false,
                declared: false,
                defined: false,
                param_types: Vec::new(),
            },
            _ => SymbolData::Plain,
        };
        Symbol {
            kind,
            name: name.into(),
            type_name: type_name.into(),
            dimensions: Vec::new(),
            subtable: None,
            class_ref: None,
            base_size: 0,
            size: 0,
            offset: 0,
            data,
            reference: None,
        }
    }

    pub fn is_public(&self) -> bool {
        match &self.data {
            SymbolData::Var { is_public } => *is_public,
            SymbolData::Func { is_public, .. } => *is_public,
            SymbolData::Plain => false,
        }
    }

    pub fn set_public(&mut self, public: bool) {
        match &mut self.data {
            SymbolData::Var { is_public } => *is_public = public,
            SymbolData::Func { is_public, .. } => *is_public = public,
            SymbolData::Plain => {}
        }
    }

    pub fn declared(&self) -> bool {
        matches!(&self.data, SymbolData::Func { declared, .. } if *declared)
    }

    pub fn defined(&self) -> bool {
        matches!(&self.data, SymbolData::Func { defined, .. } if *defined)
    }

    pub fn set_declared(&mut self, v: bool) {
        if let SymbolData::Func { declared, .. } = &mut self.data {
            *declared = v;
        }
    }

    pub fn set_defined(&mut self, v: bool) {
        if let SymbolData::Func { defined, .. } = &mut self.data {
            *defined = v;
        }
    }

    pub fn param_types(&self) -> &[String] {
        match &self.data {
            SymbolData::Func { param_types, .. } => param_types,
            _ => &[],
        }
    }

    pub fn set_param_types(&mut self, types: Vec<String>) {
        if let SymbolData::Func { param_types, .. } = &mut self.data {
            *param_types = types;
        }
    }

    /// Base type name with all `[]` suffixes stripped.
    pub fn base_type_name(&self) -> &str {
        self.type_name.split('[').next().unwrap_or(&self.type_name)
    }

    /// int=4, float=8, bool=4, class=its subtable's instance size,
    /// everything else (void, unresolved) = 0; multiplied by the
    /// product of `dimensions` (1 for a scalar).
    pub fn calculate_size(&mut self) {
        let base = match self.base_type_name() {
            "int" => 4,
            "float" => 8,
            "bool" => 4,
            _ => self
                .class_ref
                .as_ref()
                .map(|t| t.borrow().size)
                .unwrap_or(0),
        };
        self.base_size = base;
        let elems: i64 = if self.dimensions.is_empty() {
            1
        } else {
            self.dimensions.iter().product()
        };
        self.size = base * elems;
    }

    /// `base_size * product(dimensions[i+1..])`: row-major stride for
    /// dimension `i` of an N-dimensional array.
    pub fn get_array_offset_multiplier(&self, i: usize) -> i64 {
        let trailing: i64 = self.dimensions[i + 1..].iter().product();
        self.base_size * trailing
    }
}

/// Inheritance-specific state, present only on class tables.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub declared: bool,
    pub implemented: bool,
    pub parents: Vec<SymTableRef>,
}

/// A named scope: the global table, a class table, or a function/method
/// table. Classes carry `class_info`; everything else leaves it `None`.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub name: String,
    pub level: usize,
    pub parent: Option<Weak<RefCell<SymbolTable>>>,
    pub symbols: Vec<SymbolHandle>,
    pub size: i64,
    pub class_info: Option<ClassInfo>,
}

impl SymbolTable {
    pub fn new_ref(name: impl Into<String>, level: usize, parent: Option<&SymTableRef>) -> SymTableRef {
        Rc::new(RefCell::new(SymbolTable {
            name: name.into(),
            level,
            parent: parent.map(Rc::downgrade),
            symbols: Vec::new(),
            size: 0,
            class_info: None,
        }))
    }

    pub fn new_class_ref(name: impl Into<String>, level: usize, parent: Option<&SymTableRef>) -> SymTableRef {
        let table = Self::new_ref(name, level, parent);
        table.borrow_mut().class_info = Some(ClassInfo::default());
        table
    }

    pub fn insert(&mut self, symbol: SymbolHandle) {
        self.symbols.push(symbol);
    }

    fn find_local(&self, name: &str) -> Option<SymbolHandle> {
        self.symbols
            .iter()
            .find(|s| s.borrow().name == name)
            .cloned()
    }

    fn find_local_kind(&self, name: &str, kind: Option<SymbolKind>) -> Option<SymbolHandle> {
        self.symbols
            .iter()
            .find(|s| {
                let b = s.borrow();
                b.name == name && kind.is_none_or(|k| b.kind == k)
            })
            .cloned()
    }

    /// Search this table's own symbols, then (for a class table) each
    /// parent class table in order, then the enclosing scope.
    pub fn lookup(table: &SymTableRef, name: &str) -> Option<SymbolHandle> {
        let (local, parents, enclosing) = {
            let t = table.borrow();
            (
                t.find_local(name),
                t.class_info.as_ref().map(|c| c.parents.clone()),
                t.parent.as_ref().and_then(|w| w.upgrade()),
            )
        };
        if local.is_some() {
            return local;
        }
        if let Some(parents) = parents {
            for p in &parents {
                if let Some(s) = Self::lookup(p, name) {
                    return Some(s);
                }
            }
        }
        if let Some(enclosing) = enclosing {
            return Self::lookup(&enclosing, name);
        }
        None
    }

    /// Search only this table, and (for a class table) its parent class
    /// tables, but never the enclosing scope.
    pub fn find_child(table: &SymTableRef, name: &str, kind: Option<SymbolKind>) -> Option<SymbolHandle> {
        let (local, parents) = {
            let t = table.borrow();
            (
                t.find_local_kind(name, kind),
                t.class_info.as_ref().map(|c| c.parents.clone()),
            )
        };
        if local.is_some() {
            return local;
        }
        if let Some(parents) = parents {
            for p in &parents {
                if let Some(s) = Self::find_child(p, name, kind) {
                    return Some(s);
                }
            }
        }
        None
    }

    /// Locate a function/method symbol whose parameter-type signature
    /// matches `params` exactly (overload resolution).
    pub fn find_func_child(table: &SymTableRef, name: &str, params: &[String]) -> Option<SymbolHandle> {
        let (matched, parents) = {
            let t = table.borrow();
            let matched = t.symbols.iter().find(|s| {
                let b = s.borrow();
                matches!(b.kind, SymbolKind::Function | SymbolKind::Method)
                    && b.name == name
                    && b.param_types() == params
            });
            (matched.cloned(), t.class_info.as_ref().map(|c| c.parents.clone()))
        };
        if matched.is_some() {
            return matched;
        }
        if let Some(parents) = parents {
            for p in &parents {
                if let Some(s) = Self::find_func_child(p, name, params) {
                    return Some(s);
                }
            }
        }
        None
    }

    /// Like [`find_child`] but ignores signature and matches by name
    /// only, for the "wrong number or types of arguments" diagnostic.
    pub fn find_any_func_child(table: &SymTableRef, name: &str) -> Option<SymbolHandle> {
        Self::find_child(table, name, None).filter(|s| {
            matches!(s.borrow().kind, SymbolKind::Function | SymbolKind::Method)
        })
    }

    /// Render the whole forest reachable from `table` as the `.outsymboltables`
    /// sink wants: one boxed frame per scope, each listing its symbols'
    /// kind/type/size/offset, recursing into every symbol's subtable
    /// (class tables, function/method scopes) in declaration order.
    pub fn render_forest(table: &SymTableRef) -> String {
        let mut out = String::new();
        Self::render_one(table, &mut out);
        out
    }

    fn render_one(table: &SymTableRef, out: &mut String) {
        let (header, symbols) = {
            let t = table.borrow();
            (format!("{} (level={}, size={})", t.name, t.level, t.size), t.symbols.clone())
        };
        let width = header.len().max(32);
        let bar = "-".repeat(width);
        out.push_str(&bar);
        out.push('\n');
        out.push_str(&header);
        out.push('\n');
        out.push_str(&bar);
        out.push('\n');
        for s in &symbols {
            let b = s.borrow();
            out.push_str(&format!(
                "  {:<14} {:<10} {:<16} size={:<6} offset={}\n",
                b.name, b.kind, b.type_name, b.size, b.offset
            ));
        }
        out.push('\n');
        let subtables: Vec<SymTableRef> = symbols.iter().filter_map(|s| s.borrow().subtable.clone()).collect();
        for sub in subtables {
            Self::render_one(&sub, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_size_scalar_and_array() {
        let mut s = Symbol::new(SymbolKind::Local, "x", "int");
        s.calculate_size();
        assert_eq!(s.size, 4);

        let mut arr = Symbol::new(SymbolKind::Local, "a", "int[3][4]");
        arr.dimensions = vec![3, 4];
        arr.calculate_size();
        assert_eq!(arr.base_size, 4);
        assert_eq!(arr.size, 48);
        assert_eq!(arr.get_array_offset_multiplier(0), 16); // 4 * 4
        assert_eq!(arr.get_array_offset_multiplier(1), 4); // 4 * 1
    }

    #[test]
    fn lookup_consults_class_parents_then_enclosing_scope() {
        let global = SymbolTable::new_ref("global", 0, None);
        let class_a = SymbolTable::new_class_ref("A", 1, Some(&global));
        let x = Rc::new(RefCell::new(Symbol::new(SymbolKind::Data, "x", "int")));
        class_a.borrow_mut().insert(x.clone());

        let class_b = SymbolTable::new_class_ref("B", 1, Some(&global));
        class_b.borrow_mut().class_info.as_mut().unwrap().parents.push(class_a.clone());

        let found = SymbolTable::lookup(&class_b, "x").expect("inherited member visible");
        assert_eq!(found.borrow().name, "x");
    }

    #[test]
    fn find_func_child_matches_exact_signature() {
        let global = SymbolTable::new_ref("global", 0, None);
        let mut f1 = Symbol::new(SymbolKind::Function, "f", "int");
        f1.set_param_types(vec!["int".to_string()]);
        let mut f2 = Symbol::new(SymbolKind::Function, "f", "int");
        f2.set_param_types(vec!["int".to_string(), "float".to_string()]);
        global.borrow_mut().insert(Rc::new(RefCell::new(f1)));
        global.borrow_mut().insert(Rc::new(RefCell::new(f2)));

        let one_arg = SymbolTable::find_func_child(&global, "f", &["int".to_string()]);
        assert!(one_arg.is_some());
        let two_arg = SymbolTable::find_func_child(
            &global,
            "f",
            &["int".to_string(), "float".to_string()],
        );
        assert!(two_arg.is_some());
        let no_match = SymbolTable::find_func_child(&global, "f", &["bool".to_string()]);
        assert!(no_match.is_none());
    }
}
