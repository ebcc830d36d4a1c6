//! Semantic analysis for a single Python source file.
//!
//! Given a parsed module (the `rustpython-parser` AST), the
//! [`SemanticIndexBuilder`] runs three synchronous traversals and a fix-up
//! pass to produce a [`SemanticIndex`]:
//!
//! 1. a binding pass that creates the scope graph and records every name
//!    binding (assignments, imports, parameters, declarations, …);
//! 2. a reference pass that resolves every name read through the lexical
//!    scope chain, including the `global`/`nonlocal` redirections and the
//!    class-scope skip;
//! 3. a disambiguation pass that collapses names bound to several
//!    declarations into ambiguous symbols and attaches class members; and
//! 4. a shallow type-inference pass that tags every expression with an
//!    [`types::InferredType`].
//!
//! The tree is never mutated: all results are exposed as lookups keyed on
//! node identity. Unresolved imports, missing stubs, and forward references
//! are soft conditions, represented by `Option`s and flags rather than
//! errors; the builder is total over well-formed trees.

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

pub mod module_name;
mod node_ref;
pub mod semantic_index;
pub mod stubs;
pub mod types;
pub mod visitor;

pub use module_name::ModuleName;
pub use node_ref::{Range, RefEquality};
pub use semantic_index::scope::{Scope, ScopeId, ScopeKind, StarImport};
pub use semantic_index::symbol::{
    BaseClass, ClassSymbol, FunctionSymbol, MemberResult, Parameter, Symbol, SymbolId, SymbolKind,
    Usage, UsageKind, UsageNode,
};
pub use semantic_index::{
    semantic_index, SemanticIndex, SemanticIndexBuilder, SourceFile,
};
pub use stubs::{GlobalSymbolIndex, StubIndex, StubSymbol, StubSymbolKind};
pub use types::{BuiltinTag, InferredType};

/// An [`IndexMap`] (insertion-ordered) with the fast `FxHasher`.
pub(crate) type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
