//! Symbols, attributes, and scoped symbol tables.

use crate::diag::SourceLoc;
use crate::types::TypeId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Auto,
    Static,
    Extern,
    /// Parsed and ignored semantically.
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    External,
    None,
}

/// Where a symbol ends up living once the back end has run. Unresolved
/// until frame layout (for locals) or static-data placement (for globals)
/// assigns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Unassigned,
    /// Offset from the frame base, in bytes (locals, spills).
    StackSlot(i32),
    /// Section + label (globals, functions, string literals).
    Static { section: Section, label: String },
    /// Assigned physical register after linear-scan allocation.
    Register(crate::backend::regalloc::PhysReg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Text,
    Data,
    Bss,
    Rodata,
    /// `__attribute__((section("name")))` override.
    Custom,
}

/// The small enumerated attribute bag the front end tracks. Unknown
/// attributes parse and are discarded with a warning by the
/// parser/semantic analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    pub always_inline: bool,
    pub noreturn: bool,
    pub weak: bool,
    pub constructor: bool,
    pub destructor: bool,
    pub packed: bool,
    pub section: Option<String>,
    pub aligned: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeId,
    pub storage: StorageClass,
    pub linkage: Linkage,
    pub def_loc: SourceLoc,
    pub address: Address,
    pub attrs: AttributeSet,
    pub is_function: bool,
    pub is_defined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Scoped symbol tables, pushed/popped around compound statements, function
/// bodies, and struct/union/enum declarations.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<HashMap<String, SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { symbols: Vec::new(), scopes: vec![HashMap::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the file scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declares a symbol in the current (innermost) scope, returning its id.
    pub fn declare(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        self.scopes.last_mut().unwrap().insert(name, id);
        id
    }

    /// Looks up a name starting from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(name) {
                return Some(*id);
            }
        }
        None
    }

    /// Looks up a name only in the current (innermost) scope, used to detect
    /// redeclarations within one block.
    pub fn lookup_current_scope(&self, name: &str) -> Option<SymbolId> {
        self.scopes.last().unwrap().get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().enumerate().map(|(i, s)| (SymbolId(i as u32), s))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    fn dummy_symbol(name: &str, ty: crate::types::TypeId) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            storage: StorageClass::Auto,
            linkage: Linkage::None,
            def_loc: SourceLoc::dummy(),
            address: Address::Unassigned,
            attrs: AttributeSet::default(),
            is_function: false,
            is_defined: true,
        }
    }

    #[test]
    fn shadowing_in_nested_scope() {
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        let outer = table.declare(dummy_symbol("x", types.ty_int));
        table.push_scope();
        let inner = table.declare(dummy_symbol("x", types.ty_double));
        assert_eq!(table.lookup("x"), Some(inner));
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(outer));
    }

    #[test]
    fn redeclaration_detection_is_scope_local() {
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        table.declare(dummy_symbol("y", types.ty_int));
        assert!(table.lookup_current_scope("y").is_some());
        table.push_scope();
        assert!(table.lookup_current_scope("y").is_none());
        assert!(table.lookup("y").is_some());
    }
}
