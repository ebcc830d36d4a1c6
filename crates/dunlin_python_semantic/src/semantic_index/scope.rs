//! The scope graph: a pre-order arena of lexical scopes, each anchored to
//! the syntax node that introduced it.

use std::ops::Range as IndexRange;

use rustc_hash::FxHashSet;
use rustpython_parser::ast::{Expr, Stmt};

use crate::node_ref::RefEquality;
use crate::semantic_index::symbol::SymbolId;
use crate::FxIndexMap;

/// Identifies a scope within one file's scope arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The file-input (module) scope. Always created first.
    pub const MODULE: ScopeId = ScopeId(0);

    pub(crate) fn from_usize(index: usize) -> Self {
        Self(u32::try_from(index).expect("scope arena exceeds u32"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn raw(self) -> u32 {
        self.0
    }
}

/// The syntactic construct that introduced a scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, is_macro::Is)]
pub enum ScopeKind {
    Module,
    Function,
    Lambda,
    Class,
    Comprehension,
}

/// Keys a scope-introducing node for the node-to-scope lookup. The module
/// scope has no anchor node of its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum NodeWithScopeKey<'a> {
    Module,
    Stmt(RefEquality<'a, Stmt>),
    Expr(RefEquality<'a, Expr>),
}

/// A wildcard (`from m import *`) seen in a scope. Unresolved wildcards are
/// kept so downstream rules can suppress undefined-name style findings and
/// name their possible sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StarImport {
    pub(crate) module: String,
    pub(crate) resolved: bool,
}

impl StarImport {
    /// The module text as written, dots included for relative imports.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether the exporting module was found in an index and its symbols
    /// copied into the scope.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

#[derive(Debug)]
pub struct Scope<'a> {
    pub(crate) parent: Option<ScopeId>,
    pub(crate) kind: ScopeKind,
    /// The contiguous arena range holding this scope's descendents; scopes
    /// are pushed in pre-order, so the range is exact.
    pub(crate) descendents: IndexRange<u32>,
    /// Dotted prefix for fully qualified names minted in this scope, when
    /// the scope corresponds to a named entity (module, class, function).
    pub(crate) fqn_prefix: Option<String>,
    /// The symbol declared by the `def`/`class` that introduced this scope.
    pub(crate) owner: Option<SymbolId>,
    pub(crate) symbols_by_name: FxIndexMap<&'a str, SymbolId>,
    /// Class scopes only: `self.<attr>` targets discovered in the class's
    /// methods, aggregated per attribute name.
    pub(crate) instance_attributes_by_name: FxIndexMap<&'a str, SymbolId>,
    pub(crate) global_names: FxHashSet<&'a str>,
    pub(crate) nonlocal_names: FxHashSet<&'a str>,
    pub(crate) star_imports: Vec<StarImport>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        parent: Option<ScopeId>,
        kind: ScopeKind,
        fqn_prefix: Option<String>,
        owner: Option<SymbolId>,
    ) -> Self {
        Self {
            parent,
            kind,
            descendents: 0..0,
            fqn_prefix,
            owner,
            symbols_by_name: FxIndexMap::default(),
            instance_attributes_by_name: FxIndexMap::default(),
            global_names: FxHashSet::default(),
            nonlocal_names: FxHashSet::default(),
            star_imports: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// The symbol declared by the construct that introduced this scope: the
    /// function symbol of a function scope, the class symbol of a class
    /// scope. `None` for the module scope, lambdas, and comprehensions.
    pub fn owner(&self) -> Option<SymbolId> {
        self.owner
    }

    /// The symbols bound in this scope, in first-binding order.
    pub fn symbols(&self) -> impl ExactSizeIterator<Item = SymbolId> + '_ {
        self.symbols_by_name.values().copied()
    }

    pub fn symbol_id_by_name(&self, name: &str) -> Option<SymbolId> {
        self.symbols_by_name.get(name).copied()
    }

    /// Class scopes: the aggregated `self.<attr>` symbols, in discovery
    /// order. Empty for every other scope kind.
    pub fn instance_attributes(&self) -> impl ExactSizeIterator<Item = SymbolId> + '_ {
        self.instance_attributes_by_name.values().copied()
    }

    pub fn instance_attribute_by_name(&self, name: &str) -> Option<SymbolId> {
        self.instance_attributes_by_name.get(name).copied()
    }

    pub fn star_imports(&self) -> &[StarImport] {
        &self.star_imports
    }

    /// Whether a `from m import *` in this scope could not be resolved, so
    /// any name might be bound here.
    pub fn has_unresolved_star_import(&self) -> bool {
        self.star_imports.iter().any(|import| !import.resolved)
    }
}

/// Resolves `name` from `start`, walking the scope chain.
///
/// `global` redirects straight to the module scope and `nonlocal` to the
/// nearest enclosing binding outside the module scope; otherwise parents are
/// walked in order, skipping class scopes anywhere but at the start of the
/// chain (class bodies are invisible to the scopes nested inside them).
pub(crate) fn resolve_in_chain<'a>(
    scopes: &[Scope<'a>],
    start: ScopeId,
    name: &str,
) -> Option<SymbolId> {
    let scope = &scopes[start.index()];

    if scope.global_names.contains(name) {
        return scopes[ScopeId::MODULE.index()].symbol_id_by_name(name);
    }

    if scope.nonlocal_names.contains(name) {
        let mut current = scope.parent;
        while let Some(id) = current {
            if id == ScopeId::MODULE {
                break;
            }
            let enclosing = &scopes[id.index()];
            if !enclosing.kind.is_class() {
                if let Some(symbol) = enclosing.symbol_id_by_name(name) {
                    return Some(symbol);
                }
            }
            current = enclosing.parent;
        }
        return None;
    }

    let mut current = Some(start);
    let mut at_start = true;
    while let Some(id) = current {
        let scope = &scopes[id.index()];
        if at_start || !scope.kind.is_class() {
            if let Some(symbol) = scope.symbol_id_by_name(name) {
                return Some(symbol);
            }
        }
        at_start = false;
        current = scope.parent;
    }
    None
}
