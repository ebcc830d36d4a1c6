//! The semantic index: every scope, symbol, usage, and inferred type for
//! one source file, produced by three traversals over the parsed module.
//!
//! The tree itself is left untouched; results are looked up by node
//! identity ([`SemanticIndex::symbol_for_node`],
//! [`SemanticIndex::expression_type`]) or by scope
//! ([`SemanticIndex::scope`], [`SemanticIndex::resolve`]). Iteration orders
//! are deterministic: scopes in creation (pre-order) order, and each
//! scope's symbols in first-binding order.

use std::iter::FusedIterator;

use rustc_hash::FxHashMap;
use rustpython_parser::ast::{Expr, Stmt};

use crate::module_name::ModuleName;
use crate::node_ref::RefEquality;
use crate::semantic_index::scope::{resolve_in_chain, NodeWithScopeKey, Scope, ScopeId};
use crate::semantic_index::symbol::{
    resolve_member_in, MemberResult, Symbol, SymbolId, SymbolKind,
};
use crate::stubs::{GlobalSymbolIndex, StubIndex};
use crate::types::InferredType;

mod builder;
mod infer;
mod references;
pub mod scope;
pub mod symbol;

pub use builder::SemanticIndexBuilder;

/// Metadata of the file under analysis.
#[derive(Copy, Clone, Debug)]
pub struct SourceFile<'a> {
    file_name: &'a str,
    package: &'a str,
}

impl<'a> SourceFile<'a> {
    pub fn new(file_name: &'a str, package: &'a str) -> Self {
        Self { file_name, package }
    }

    pub fn file_name(&self) -> &'a str {
        self.file_name
    }

    /// The dotted package the file lives in; empty for a top-level module.
    pub fn package(&self) -> &'a str {
        self.package
    }
}

/// Builds the semantic index for `module`. Total: every input yields an
/// index, with unresolved names and imports represented as soft absences.
#[must_use]
pub fn semantic_index<'a>(
    module: &'a [Stmt],
    source: SourceFile<'a>,
    stubs: &'a StubIndex,
    global_symbols: &'a GlobalSymbolIndex,
) -> SemanticIndex<'a> {
    SemanticIndexBuilder::new(module, source, stubs, global_symbols).build()
}

pub struct SemanticIndex<'a> {
    pub(crate) module_name: Option<ModuleName>,
    pub(crate) scopes: Vec<Scope<'a>>,
    pub(crate) symbols: Vec<Symbol<'a>>,
    pub(crate) scopes_by_node: FxHashMap<NodeWithScopeKey<'a>, ScopeId>,
    pub(crate) symbols_by_node: FxHashMap<RefEquality<'a, Expr>, SymbolId>,
    pub(crate) types_by_expression: FxHashMap<RefEquality<'a, Expr>, InferredType>,
}

impl<'a> SemanticIndex<'a> {
    /// The analyzed file's fully qualified module name, when derivable.
    pub fn module_name(&self) -> Option<&ModuleName> {
        self.module_name.as_ref()
    }

    pub fn scope(&self, id: ScopeId) -> &Scope<'a> {
        &self.scopes[id.index()]
    }

    /// All scopes in creation (pre-order) order.
    pub fn scopes(&self) -> impl ExactSizeIterator<Item = (ScopeId, &Scope<'a>)> + '_ {
        self.scopes
            .iter()
            .enumerate()
            .map(|(index, scope)| (ScopeId::from_usize(index), scope))
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol<'a> {
        &self.symbols[id.index()]
    }

    /// Resolves `name` from `scope` through the chain, with the
    /// `global`/`nonlocal` redirections and the class-scope skip.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        resolve_in_chain(&self.scopes, scope, name)
    }

    /// The symbol a name or qualified expression resolved to, if any. This
    /// is the node's "symbol slot".
    pub fn symbol_for_node(&self, expr: &Expr) -> Option<SymbolId> {
        self.symbols_by_node.get(&RefEquality(expr)).copied()
    }

    /// The scope introduced by a `def` or `class` statement.
    pub fn scope_for_stmt(&self, stmt: &Stmt) -> Option<ScopeId> {
        self.scopes_by_node
            .get(&NodeWithScopeKey::Stmt(RefEquality(stmt)))
            .copied()
    }

    /// The scope introduced by a lambda or comprehension expression.
    pub fn scope_for_expr(&self, expr: &Expr) -> Option<ScopeId> {
        self.scopes_by_node
            .get(&NodeWithScopeKey::Expr(RefEquality(expr)))
            .copied()
    }

    /// The shallow type of an expression; `Any` when inference had nothing
    /// to say.
    pub fn expression_type(&self, expr: &Expr) -> InferredType {
        self.types_by_expression
            .get(&RefEquality(expr))
            .copied()
            .unwrap_or_default()
    }

    /// The module scope's own symbols, builtin seeds excluded.
    pub fn global_variables(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.scope(ScopeId::MODULE)
            .symbols()
            .filter(|&id| !self.symbol(id).is_builtin())
    }

    /// The builtin namespace as seeded into the module scope.
    pub fn builtin_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.scope(ScopeId::MODULE)
            .symbols()
            .filter(|&id| self.symbol(id).is_builtin())
    }

    /// The names bound in a class body, in first-binding order.
    pub fn class_fields(&self, class_scope: ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
        self.scope(class_scope).symbols()
    }

    /// Instance attributes of a class that are actually assigned somewhere
    /// and that no class-body name shadows.
    pub fn instance_fields(&self, class_scope: ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
        let scope = self.scope(class_scope);
        scope
            .instance_attributes_by_name
            .iter()
            .filter(|(name, _)| !scope.symbols_by_name.contains_key(*name))
            .map(|(_, &id)| id)
            .filter(|&id| self.symbol(id).binding_usages().next().is_some())
    }

    /// Member lookup on a class symbol, through its resolved bases. Answers
    /// `Unknown` for non-class symbols and past unresolved bases.
    pub fn resolve_member(&self, class: SymbolId, name: &str) -> MemberResult {
        match self.symbol(class).kind() {
            SymbolKind::Class(data) => resolve_member_in(&self.symbols, data, name),
            _ => MemberResult::Unknown,
        }
    }

    /// Whether a value of type `ty` can have a member `name`. Pessimistic:
    /// `true` unless the type names a class whose member set is fully known
    /// and lacks the name.
    pub fn can_have_member(&self, ty: InferredType, name: &str) -> bool {
        let class = match ty {
            InferredType::Any | InferredType::Callable(_) => return true,
            InferredType::Builtin(tag) => {
                let Some(id) = self
                    .scope(ScopeId::MODULE)
                    .symbol_id_by_name(tag.class_name())
                    .filter(|&id| self.symbol(id).is_builtin())
                else {
                    return true;
                };
                id
            }
            InferredType::Instance(id) => id,
        };
        match self.symbol(class).kind() {
            SymbolKind::Class(data) => {
                !resolve_member_in(&self.symbols, data, name).is_absent()
            }
            _ => true,
        }
    }

    /// Whether an unresolved `from m import *` anywhere on `scope`'s chain
    /// could be binding arbitrary names.
    pub fn has_unresolved_wildcard_import(&self, scope: ScopeId) -> bool {
        self.ancestor_scopes(scope)
            .any(|(_, scope)| scope.has_unresolved_star_import())
    }

    /// Ancestors of `scope`, starting with `scope` itself.
    pub fn ancestor_scopes(&self, scope: ScopeId) -> AncestorsIter<'_, 'a> {
        AncestorsIter {
            scopes: &self.scopes,
            next: Some(scope),
        }
    }

    /// All scopes nested anywhere inside `scope`, in creation order.
    pub fn descendent_scopes(&self, scope: ScopeId) -> DescendentsIter<'_, 'a> {
        let range = self.scope(scope).descendents.clone();
        DescendentsIter {
            scopes: &self.scopes,
            range,
        }
    }

    /// The scopes directly nested in `scope`, in creation order.
    pub fn child_scopes(&self, scope: ScopeId) -> ChildrenIter<'_, 'a> {
        ChildrenIter {
            parent: scope,
            descendents: self.descendent_scopes(scope),
        }
    }
}

pub struct AncestorsIter<'i, 'a> {
    scopes: &'i [Scope<'a>],
    next: Option<ScopeId>,
}

impl<'i, 'a> Iterator for AncestorsIter<'i, 'a> {
    type Item = (ScopeId, &'i Scope<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let scope = &self.scopes[current.index()];
        self.next = scope.parent();
        Some((current, scope))
    }
}

impl FusedIterator for AncestorsIter<'_, '_> {}

pub struct DescendentsIter<'i, 'a> {
    scopes: &'i [Scope<'a>],
    range: std::ops::Range<u32>,
}

impl<'i, 'a> Iterator for DescendentsIter<'i, 'a> {
    type Item = (ScopeId, &'i Scope<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.range.next()?;
        let id = ScopeId::from_usize(index as usize);
        Some((id, &self.scopes[id.index()]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl ExactSizeIterator for DescendentsIter<'_, '_> {}
impl FusedIterator for DescendentsIter<'_, '_> {}

pub struct ChildrenIter<'i, 'a> {
    parent: ScopeId,
    descendents: DescendentsIter<'i, 'a>,
}

impl<'i, 'a> Iterator for ChildrenIter<'i, 'a> {
    type Item = (ScopeId, &'i Scope<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.descendents
            .find(|(_, scope)| scope.parent() == Some(self.parent))
    }
}

impl FusedIterator for ChildrenIter<'_, '_> {}

#[cfg(test)]
mod tests {
    use rustpython_parser::ast::{Expr, ExprKind, Stmt, StmtKind};
    use rustpython_parser::parser;
    use test_case::test_case;

    use crate::semantic_index::scope::{ScopeId, ScopeKind};
    use crate::semantic_index::symbol::{MemberResult, UsageKind};
    use crate::stubs::{GlobalSymbolIndex, StubIndex, StubSymbol};
    use crate::types::{BuiltinTag, InferredType};
    use crate::visitor::{walk_expr, Visitor};

    use super::{semantic_index, SemanticIndex, SourceFile};

    fn parse(source: &str) -> Vec<Stmt> {
        parser::parse_program(source, "<test>").expect("fixture should parse")
    }

    fn check(source: &str, assertions: impl FnOnce(&SemanticIndex, &[Stmt])) {
        check_in_file("mod.py", "pkg", source, assertions);
    }

    fn check_in_file(
        file_name: &str,
        package: &str,
        source: &str,
        assertions: impl FnOnce(&SemanticIndex, &[Stmt]),
    ) {
        let module = parse(source);
        let stubs = StubIndex::with_default_builtins();
        let global_symbols = GlobalSymbolIndex::new();
        let index = semantic_index(
            &module,
            SourceFile::new(file_name, package),
            &stubs,
            &global_symbols,
        );
        assertions(&index, &module);
    }

    /// Collects every `Name` expression spelled `name`, in source order.
    struct NameCollector<'a> {
        name: &'a str,
        found: Vec<&'a Expr>,
    }

    impl<'a> Visitor<'a> for NameCollector<'a> {
        fn visit_expr(&mut self, expr: &'a Expr) {
            if let ExprKind::Name { id, .. } = &expr.node {
                if id == self.name {
                    self.found.push(expr);
                }
            }
            walk_expr(self, expr);
        }
    }

    fn find_names<'m>(module: &'m [Stmt], name: &'m str) -> Vec<&'m Expr> {
        let mut collector = NameCollector { name, found: vec![] };
        for stmt in module {
            collector.visit_stmt(stmt);
        }
        collector.found
    }

    fn global_names<'i>(index: &'i SemanticIndex) -> Vec<&'i str> {
        index
            .global_variables()
            .map(|id| index.symbol(id).name())
            .collect()
    }

    fn scope_names<'i>(index: &'i SemanticIndex, scope: ScopeId) -> Vec<&'i str> {
        index
            .scope(scope)
            .symbols()
            .map(|id| index.symbol(id).name())
            .collect()
    }

    fn assign_value<'m>(stmt: &'m Stmt) -> &'m Expr {
        let StmtKind::Assign { value, .. } = &stmt.node else {
            panic!("expected an assignment")
        };
        value
    }

    #[test]
    fn empty_module() {
        check("", |index, _| {
            assert_eq!(index.scopes().len(), 1);
            assert_eq!(index.scope(ScopeId::MODULE).kind(), ScopeKind::Module);
            assert_eq!(global_names(index), Vec::<&str>::new());
        });
    }

    #[test]
    fn simple_assignment() {
        check("x = 1\n", |index, module| {
            assert_eq!(global_names(index), vec!["x"]);

            let x = index.resolve(ScopeId::MODULE, "x").unwrap();
            let symbol = index.symbol(x);
            assert_eq!(symbol.fully_qualified_name(), Some("pkg.mod.x"));
            assert_eq!(symbol.usages().len(), 1);
            assert_eq!(symbol.usages()[0].kind(), UsageKind::AssignmentLhs);

            let target = &find_names(module, "x")[0];
            assert_eq!(index.symbol_for_node(target), Some(x));
        });
    }

    #[test]
    fn builtins_are_seeded() {
        check("x = len\n", |index, module| {
            let len = index.resolve(ScopeId::MODULE, "len").unwrap();
            assert!(index.symbol(len).is_builtin());
            assert_eq!(index.symbol(len).fully_qualified_name(), Some("len"));

            // The read resolved to the seeded symbol.
            let read = &find_names(module, "len")[0];
            assert_eq!(index.symbol_for_node(read), Some(len));

            // Seeds are not part of the module's own globals.
            assert_eq!(global_names(index), vec!["x"]);
        });
    }

    #[test]
    fn shadowed_builtin_becomes_a_declaration() {
        check("def print(value): pass\n", |index, _| {
            let print = index.resolve(ScopeId::MODULE, "print").unwrap();
            let symbol = index.symbol(print);
            assert!(symbol.is_builtin());
            assert!(symbol.kind().is_function(), "the local `def` wins");
            assert_eq!(symbol.as_function().unwrap().parameters().len(), 1);
        });
    }

    #[test]
    fn function_scope() {
        check("def func():\n    x = 1\ny = 2\n", |index, module| {
            assert_eq!(global_names(index), vec!["func", "y"]);

            let (scope_id, scope) = index.child_scopes(ScopeId::MODULE).next().unwrap();
            assert_eq!(scope.kind(), ScopeKind::Function);
            assert_eq!(scope_names(index, scope_id), vec!["x"]);

            assert_eq!(index.scope_for_stmt(&module[0]), Some(scope_id));
            assert_eq!(scope.owner(), index.resolve(ScopeId::MODULE, "func"));

            let func = index.symbol(scope.owner().unwrap());
            assert!(func.kind().is_function());
            assert_eq!(func.fully_qualified_name(), Some("pkg.mod.func"));
        });
    }

    #[test]
    fn nested_entity_fqns_chain() {
        check(
            "class C:\n    def m(self):\n        def inner(): pass\n",
            |index, _| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                assert_eq!(index.symbol(c).fully_qualified_name(), Some("pkg.mod.C"));

                let class_scope = index.symbol(c).as_class().unwrap().body_scope().unwrap();
                let m = index.scope(class_scope).symbol_id_by_name("m").unwrap();
                assert_eq!(index.symbol(m).fully_qualified_name(), Some("pkg.mod.C.m"));

                let m_scope = index.symbol(m).as_function().unwrap().body_scope().unwrap();
                let inner = index.scope(m_scope).symbol_id_by_name("inner").unwrap();
                assert_eq!(
                    index.symbol(inner).fully_qualified_name(),
                    Some("pkg.mod.C.m.inner")
                );
            },
        );
    }

    #[test]
    fn function_locals_have_no_fqn() {
        check("def f():\n    x = 1\n", |index, _| {
            let f_scope = index.child_scopes(ScopeId::MODULE).next().unwrap().0;
            let x = index.scope(f_scope).symbol_id_by_name("x").unwrap();
            assert_eq!(index.symbol(x).fully_qualified_name(), None);
        });
    }

    #[test]
    fn rebound_function_is_ambiguous() {
        // S1: a `def` followed by a rebinding collapses into one ambiguous
        // symbol carrying both alternatives.
        check("def f(): pass\nf = 3\n", |index, _| {
            let f = index.resolve(ScopeId::MODULE, "f").unwrap();
            let symbol = index.symbol(f);

            assert!(symbol.kind().is_ambiguous());
            assert_eq!(symbol.alternatives().len(), 2);
            assert_eq!(symbol.binding_usages().count(), 2);

            let kinds: Vec<bool> = symbol
                .alternatives()
                .iter()
                .map(|&alt| index.symbol(alt).kind().is_function())
                .collect();
            assert_eq!(kinds, vec![true, false]);
        });
    }

    #[test]
    fn twin_defs_keep_their_own_signatures() {
        // S6: each alternative reflects its own declaration.
        check("def f(a): pass\ndef f(a, b): pass\n", |index, _| {
            let f = index.resolve(ScopeId::MODULE, "f").unwrap();
            let symbol = index.symbol(f);
            assert!(symbol.kind().is_ambiguous());

            let arities: Vec<usize> = symbol
                .alternatives()
                .iter()
                .map(|&alt| index.symbol(alt).as_function().unwrap().parameters().len())
                .collect();
            assert_eq!(arities, vec![1, 2]);
        });
    }

    #[test]
    fn class_with_instance_attribute() {
        // S2: members unify the class body with `self.x` stores.
        check(
            "class C:\n    def __init__(self):\n        self.x = 1\n",
            |index, _| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                let class = index.symbol(c).as_class().unwrap();

                let member_names: Vec<&str> = class
                    .members()
                    .iter()
                    .map(|&member| index.symbol(member).name())
                    .collect();
                assert_eq!(member_names, vec!["__init__", "x"]);

                let class_scope = class.body_scope().unwrap();
                let x = index
                    .scope(class_scope)
                    .instance_attribute_by_name("x")
                    .unwrap();
                let x = index.symbol(x);
                assert!(x.is_instance_attribute());
                assert_eq!(x.usages().len(), 1);
                assert_eq!(x.usages()[0].kind(), UsageKind::AssignmentLhs);

                assert_eq!(
                    index.instance_fields(class_scope).count(),
                    1,
                    "x is not shadowed by a class-body name"
                );
            },
        );
    }

    #[test]
    fn instance_attribute_shadowed_by_class_field_merges_usages() {
        check(
            "class C:\n    x = 0\n    def m(self):\n        self.x = 1\n",
            |index, _| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                let class = index.symbol(c).as_class().unwrap();
                let class_scope = class.body_scope().unwrap();

                let member_names: Vec<&str> = class
                    .members()
                    .iter()
                    .map(|&member| index.symbol(member).name())
                    .collect();
                assert_eq!(member_names, vec!["x", "m"]);

                // The class-body symbol won, with the store merged in.
                let x = index.scope(class_scope).symbol_id_by_name("x").unwrap();
                let kinds: Vec<UsageKind> =
                    index.symbol(x).usages().iter().map(|u| u.kind()).collect();
                assert_eq!(
                    kinds,
                    vec![UsageKind::AssignmentLhs, UsageKind::AssignmentLhs]
                );
                assert_eq!(index.instance_fields(class_scope).count(), 0);
            },
        );
    }

    #[test]
    fn global_statement_redirects_bindings() {
        // S3: both assignments land on the module-level symbol.
        check("x = 1\ndef f():\n    global x\n    x = 2\n", |index, _| {
            let x = index.resolve(ScopeId::MODULE, "x").unwrap();
            let assignment_count = index
                .symbol(x)
                .usages()
                .iter()
                .filter(|usage| usage.kind() == UsageKind::AssignmentLhs)
                .count();
            assert_eq!(assignment_count, 2);
            assert!(index
                .symbol(x)
                .usages()
                .iter()
                .any(|usage| usage.kind() == UsageKind::GlobalDeclaration));

            let f_scope = index.child_scopes(ScopeId::MODULE).next().unwrap().0;
            assert_eq!(index.scope(f_scope).symbol_id_by_name("x"), None);
        });
    }

    #[test]
    fn global_without_module_assignment_synthesizes_symbol() {
        check("def f():\n    global x\n", |index, _| {
            let x = index.resolve(ScopeId::MODULE, "x").unwrap();
            let kinds: Vec<UsageKind> =
                index.symbol(x).usages().iter().map(|u| u.kind()).collect();
            assert_eq!(kinds, vec![UsageKind::GlobalDeclaration]);
        });
    }

    #[test]
    fn nonlocal_rebinds_in_enclosing_function() {
        check(
            "def outer():\n    x = 1\n    def inner():\n        nonlocal x\n        x = 2\n",
            |index, _| {
                let outer_scope = index.child_scopes(ScopeId::MODULE).next().unwrap().0;
                let inner_scope = index.child_scopes(outer_scope).next().unwrap().0;

                let x = index.scope(outer_scope).symbol_id_by_name("x").unwrap();
                assert_eq!(index.symbol(x).binding_usages().count(), 2);
                assert_eq!(index.scope(inner_scope).symbol_id_by_name("x"), None);

                // Reads from the inner scope reach the same symbol.
                assert_eq!(index.resolve(inner_scope, "x"), Some(x));
            },
        );
    }

    #[test]
    fn class_scope_is_skipped_from_nested_functions() {
        check(
            "x = 1\nclass C:\n    x = 2\n    def m(self):\n        return x\n",
            |index, module| {
                let module_x = index.resolve(ScopeId::MODULE, "x").unwrap();
                let read = find_names(module, "x").last().copied().unwrap();
                assert_eq!(index.symbol_for_node(read), Some(module_x));
            },
        );
    }

    #[test]
    fn class_body_sees_its_own_names() {
        check("class C:\n    x = 2\n    y = x\n", |index, module| {
            let c = index.resolve(ScopeId::MODULE, "C").unwrap();
            let class_scope = index.symbol(c).as_class().unwrap().body_scope().unwrap();
            let class_x = index.scope(class_scope).symbol_id_by_name("x").unwrap();

            let read = find_names(module, "x").last().copied().unwrap();
            assert_eq!(index.symbol_for_node(read), Some(class_x));
        });
    }

    #[test]
    fn default_values_resolve_in_enclosing_scope() {
        // Invariant: a default never sees the function's own parameters.
        check("x = 1\ndef f(x=x): pass\n", |index, module| {
            let module_x = index.resolve(ScopeId::MODULE, "x").unwrap();
            let StmtKind::FunctionDef { args, .. } = &module[1].node else {
                panic!("expected a function definition")
            };
            let default = &args.defaults[0];
            assert_eq!(index.symbol_for_node(default), Some(module_x));
        });
    }

    #[test]
    fn comprehension_scoping() {
        check(
            "rows = [[1]]\nout = [c for row in rows for c in row]\n",
            |index, module| {
                let module_rows = index.resolve(ScopeId::MODULE, "rows").unwrap();

                // The outermost iterable resolves outside the comprehension.
                let rows_read = find_names(module, "rows").last().copied().unwrap();
                assert_eq!(index.symbol_for_node(rows_read), Some(module_rows));

                let comp = assign_value(&module[1]);
                let comp_scope = index.scope_for_expr(comp).unwrap();
                assert_eq!(index.scope(comp_scope).kind(), ScopeKind::Comprehension);
                assert_eq!(scope_names(index, comp_scope), vec!["row", "c"]);

                // The second iterable resolves inside it.
                let row_reads = find_names(module, "row");
                let comp_row = index.scope(comp_scope).symbol_id_by_name("row").unwrap();
                assert_eq!(index.symbol_for_node(row_reads[1]), Some(comp_row));

                let comp_row = index.symbol(comp_row);
                assert_eq!(
                    comp_row.usages()[0].kind(),
                    UsageKind::CompDeclaration
                );
            },
        );
    }

    #[test]
    fn lambda_creates_a_scope() {
        check("f = lambda a, b=1: a + b\n", |index, module| {
            let lambda = assign_value(&module[0]);
            let lambda_scope = index.scope_for_expr(lambda).unwrap();
            assert_eq!(index.scope(lambda_scope).kind(), ScopeKind::Lambda);
            assert_eq!(scope_names(index, lambda_scope), vec!["a", "b"]);

            let a_read = find_names(module, "a").last().copied().unwrap();
            assert_eq!(
                index.symbol_for_node(a_read),
                index.scope(lambda_scope).symbol_id_by_name("a")
            );
        });
    }

    #[test]
    fn walrus_binds_in_current_scope() {
        check("if (n := 10) > 5:\n    pass\n", |index, _| {
            let n = index.resolve(ScopeId::MODULE, "n").unwrap();
            assert_eq!(
                index.symbol(n).usages()[0].kind(),
                UsageKind::AssignmentLhs
            );
        });
    }

    #[test]
    fn loop_and_with_and_except_bindings() {
        check(
            "for i, j in pairs():\n    pass\nwith open('f') as fh:\n    pass\ntry:\n    pass\nexcept ValueError as exc:\n    pass\n",
            |index, _| {
                let kind_of = |name: &str| {
                    let id = index.resolve(ScopeId::MODULE, name).unwrap();
                    index.symbol(id).usages()[0].kind()
                };
                assert_eq!(kind_of("i"), UsageKind::LoopDeclaration);
                assert_eq!(kind_of("j"), UsageKind::LoopDeclaration);
                assert_eq!(kind_of("fh"), UsageKind::WithInstance);
                assert_eq!(kind_of("exc"), UsageKind::ExceptionInstance);
            },
        );
    }

    #[test]
    fn match_captures_bind() {
        check(
            "match command():\n    case [first, *rest]:\n        pass\n    case other:\n        pass\n",
            |index, _| {
                for name in ["first", "rest", "other"] {
                    let id = index
                        .resolve(ScopeId::MODULE, name)
                        .unwrap_or_else(|| panic!("`{name}` should be bound"));
                    assert!(index.symbol(id).usages()[0].is_binding());
                }
            },
        );
    }

    #[test]
    fn plain_import_binds_first_component() {
        check("import os.path\nimport json as j\n", |index, _| {
            assert_eq!(global_names(index), vec!["os", "j"]);

            let os = index.resolve(ScopeId::MODULE, "os").unwrap();
            assert_eq!(index.symbol(os).fully_qualified_name(), Some("os.path"));
            assert_eq!(index.symbol(os).usages()[0].kind(), UsageKind::Import);

            let j = index.resolve(ScopeId::MODULE, "j").unwrap();
            assert_eq!(index.symbol(j).fully_qualified_name(), Some("json"));
        });
    }

    #[test]
    fn from_import_builds_member_fqn() {
        check("from collections import deque as dq\n", |index, _| {
            let dq = index.resolve(ScopeId::MODULE, "dq").unwrap();
            assert_eq!(
                index.symbol(dq).fully_qualified_name(),
                Some("collections.deque")
            );
        });
    }

    #[test]
    fn relative_import_resolves_against_file_path() {
        // S4: `pkg/sub/mod.py` with `from ..other import q`.
        check_in_file(
            "mod.py",
            "pkg.sub",
            "from ..other import q\n",
            |index, _| {
                let q = index.resolve(ScopeId::MODULE, "q").unwrap();
                assert_eq!(index.symbol(q).fully_qualified_name(), Some("pkg.other.q"));
            },
        );
    }

    #[test]
    fn relative_import_escaping_root_is_soft() {
        check_in_file("mod.py", "", "from ...nowhere import q\n", |index, _| {
            let q = index.resolve(ScopeId::MODULE, "q").unwrap();
            assert_eq!(index.symbol(q).fully_qualified_name(), None);
            assert_eq!(index.symbol(q).usages()[0].kind(), UsageKind::Import);
        });
    }

    #[test]
    fn wildcard_import_with_stub_copies_symbols() {
        // S5: every stub export lands in the module scope and the wildcard
        // is marked resolved.
        let module = parse("from typing import *\n");
        let mut stubs = StubIndex::with_default_builtins();
        stubs.add_module(
            "typing",
            vec![
                StubSymbol::other("Any", "typing.Any"),
                StubSymbol::function("cast", "typing.cast"),
                StubSymbol::class("Protocol", "typing.Protocol", vec![]),
            ],
        );
        let global_symbols = GlobalSymbolIndex::new();
        let index = semantic_index(
            &module,
            SourceFile::new("mod.py", "pkg"),
            &stubs,
            &global_symbols,
        );

        assert_eq!(global_names(&index), vec!["Any", "cast", "Protocol"]);
        let cast = index.resolve(ScopeId::MODULE, "cast").unwrap();
        assert!(index.symbol(cast).kind().is_function());
        assert_eq!(index.symbol(cast).fully_qualified_name(), Some("typing.cast"));

        let star_imports = index.scope(ScopeId::MODULE).star_imports();
        assert_eq!(star_imports.len(), 1);
        assert!(star_imports[0].is_resolved());
        assert!(!index.has_unresolved_wildcard_import(ScopeId::MODULE));
    }

    #[test]
    fn wildcard_import_without_index_is_flagged() {
        check("from vendored import *\n", |index, _| {
            let star_imports = index.scope(ScopeId::MODULE).star_imports();
            assert_eq!(star_imports.len(), 1);
            assert!(!star_imports[0].is_resolved());
            assert_eq!(star_imports[0].module(), "vendored");
            assert!(index.has_unresolved_wildcard_import(ScopeId::MODULE));
        });
    }

    #[test]
    fn imported_base_class_from_global_index() {
        let module = parse("from proj.models import Base\nclass C(Base):\n    pass\n");
        let stubs = StubIndex::with_default_builtins();
        let mut global_symbols = GlobalSymbolIndex::new();
        global_symbols.add_module(
            "proj.models",
            vec![StubSymbol::class(
                "Base",
                "proj.models.Base",
                vec![StubSymbol::function("save", "proj.models.Base.save")],
            )],
        );
        let index = semantic_index(
            &module,
            SourceFile::new("mod.py", "pkg"),
            &stubs,
            &global_symbols,
        );

        let c = index.resolve(ScopeId::MODULE, "C").unwrap();
        let class = index.symbol(c).as_class().unwrap();
        assert!(!class.has_unresolved_bases());
        assert_eq!(
            index.resolve_member(c, "save"),
            MemberResult::Found(
                index
                    .resolve(ScopeId::MODULE, "Base")
                    .map(|base| {
                        let base = index.symbol(base).as_class().unwrap();
                        base.members()[0]
                    })
                    .unwrap()
            )
        );
        assert_eq!(index.resolve_member(c, "missing"), MemberResult::Absent);
    }

    #[test]
    fn member_lookup_through_local_hierarchy() {
        check(
            "class A:\n    def __init__(self):\n        self.x = 1\nclass B(A):\n    pass\n",
            |index, _| {
                let b = index.resolve(ScopeId::MODULE, "B").unwrap();
                assert!(index.resolve_member(b, "x").is_found());
                assert_eq!(index.resolve_member(b, "y"), MemberResult::Absent);
            },
        );
    }

    #[test]
    fn unresolved_base_makes_members_unknown() {
        check("class C(Mystery):\n    pass\n", |index, _| {
            let c = index.resolve(ScopeId::MODULE, "C").unwrap();
            assert!(index.symbol(c).as_class().unwrap().has_unresolved_bases());
            assert_eq!(index.resolve_member(c, "anything"), MemberResult::Unknown);
        });
    }

    #[test]
    fn class_attribute_stores_do_not_invent_members() {
        check(
            "class A:\n    pass\nclass B(A):\n    pass\nA.__bases__ = (B,)\n",
            |index, _| {
                let b = index.resolve(ScopeId::MODULE, "B").unwrap();
                assert_eq!(index.resolve_member(b, "nope"), MemberResult::Absent);
            },
        );
    }

    #[test]
    fn annotated_assignment_records_annotation() {
        check("x: int = 0\ny = x\n", |index, module| {
            let x = index.resolve(ScopeId::MODULE, "x").unwrap();
            assert!(index.symbol(x).declared_annotation().is_some());

            let read = assign_value(&module[1]);
            assert!(index
                .expression_type(read)
                .can_only_be(BuiltinTag::Int));
        });
    }

    #[test_case("1", BuiltinTag::Int)]
    #[test_case("1.5", BuiltinTag::Float)]
    #[test_case("2j", BuiltinTag::Complex)]
    #[test_case("'s'", BuiltinTag::Str)]
    #[test_case("b'raw'", BuiltinTag::Bytes)]
    #[test_case("True", BuiltinTag::Bool)]
    #[test_case("None", BuiltinTag::NoneType)]
    #[test_case("[1]", BuiltinTag::List)]
    #[test_case("{'k': 1}", BuiltinTag::Dict)]
    #[test_case("{1, 2}", BuiltinTag::Set)]
    #[test_case("(1, 2)", BuiltinTag::Tuple)]
    #[test_case("f'{0}'", BuiltinTag::Str)]
    #[test_case("[i for i in x]", BuiltinTag::List)]
    #[test_case("1 + 2", BuiltinTag::Int)]
    #[test_case("1 / 2", BuiltinTag::Float)]
    #[test_case("1 + 2.0", BuiltinTag::Float)]
    #[test_case("'a' + 'b'", BuiltinTag::Str)]
    #[test_case("not x", BuiltinTag::Bool)]
    #[test_case("x is None", BuiltinTag::Bool)]
    fn literal_expression_types(source: &str, tag: BuiltinTag) {
        check(&format!("value = {source}\n"), |index, module| {
            let value = assign_value(&module[0]);
            assert!(
                index.expression_type(value).can_only_be(tag),
                "`{source}` should infer as {tag:?}"
            );
        });
    }

    #[test]
    fn calls_infer_from_callee_kind() {
        check(
            "class C:\n    pass\ndef f() -> int:\n    return 0\nobj = C()\nnum = f()\nxs = list()\nunknown = g()\n",
            |index, module| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();

                let obj = assign_value(&module[2]);
                assert_eq!(index.expression_type(obj), InferredType::Instance(c));

                let num = assign_value(&module[3]);
                assert!(index.expression_type(num).can_only_be(BuiltinTag::Int));

                let xs = assign_value(&module[4]);
                assert!(index.expression_type(xs).can_only_be(BuiltinTag::List));

                let unknown = assign_value(&module[5]);
                assert!(index.expression_type(unknown).is_any());
            },
        );
    }

    #[test]
    fn function_reads_are_callable() {
        check("def f(): pass\ng = f\n", |index, module| {
            let f = index.resolve(ScopeId::MODULE, "f").unwrap();
            let read = assign_value(&module[1]);
            assert_eq!(index.expression_type(read), InferredType::Callable(f));
        });
    }

    #[test]
    fn parameter_types_come_from_annotations() {
        check(
            "class C:\n    def m(self, a: int, b, *args, c: str = 'x'):\n        pass\n",
            |index, _| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                let class_scope = index.symbol(c).as_class().unwrap().body_scope().unwrap();
                let m = index.scope(class_scope).symbol_id_by_name("m").unwrap();
                let function = index.symbol(m).as_function().unwrap();
                assert!(function.is_method());

                let parameters = function.parameters();
                assert_eq!(parameters.len(), 5);

                assert!(parameters[0].is_self());
                assert_eq!(parameters[0].declared_type(), InferredType::Instance(c));

                assert!(parameters[1].declared_type().can_only_be(BuiltinTag::Int));

                assert!(parameters[2].declared_type().is_any());
                assert!(!parameters[2].has_default());

                assert!(parameters[3].is_vararg());

                assert!(parameters[4].is_keyword_only());
                assert!(parameters[4].has_default());
                assert!(parameters[4].declared_type().can_only_be(BuiltinTag::Str));
            },
        );
    }

    #[test]
    fn self_reads_are_instances() {
        check(
            "class C:\n    def m(self):\n        return self\n",
            |index, module| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                let read = find_names(module, "self").last().copied().unwrap();
                assert_eq!(index.expression_type(read), InferredType::Instance(c));
            },
        );
    }

    #[test]
    fn member_check_is_pessimistic_only_when_unknown() {
        check(
            "class C:\n    def __init__(self):\n        self.x = 1\nclass D(Mystery):\n    pass\n",
            |index, _| {
                let c = index.resolve(ScopeId::MODULE, "C").unwrap();
                assert!(index.can_have_member(InferredType::Instance(c), "x"));
                assert!(!index.can_have_member(InferredType::Instance(c), "missing"));

                let d = index.resolve(ScopeId::MODULE, "D").unwrap();
                assert!(index.can_have_member(InferredType::Instance(d), "anything"));

                // Opaque builtin summaries never deny members.
                assert!(
                    index.can_have_member(InferredType::Builtin(BuiltinTag::Str), "upper")
                );
                assert!(index.can_have_member(InferredType::Any, "whatever"));
            },
        );
    }

    #[test]
    fn scope_iterators_walk_the_tree() {
        check(
            "class Outer:\n    def foo(self):\n        def bar(): pass\n    def baz(self):\n        pass\ndef top(): pass\n",
            |index, _| {
                let descendents: Vec<ScopeKind> = index
                    .descendent_scopes(ScopeId::MODULE)
                    .map(|(_, scope)| scope.kind())
                    .collect();
                assert_eq!(
                    descendents,
                    vec![
                        ScopeKind::Class,
                        ScopeKind::Function,
                        ScopeKind::Function,
                        ScopeKind::Function,
                        ScopeKind::Function,
                    ]
                );

                assert_eq!(index.child_scopes(ScopeId::MODULE).count(), 2);

                let class_scope = index.child_scopes(ScopeId::MODULE).next().unwrap().0;
                assert_eq!(index.child_scopes(class_scope).count(), 2);

                let bar_scope = index
                    .descendent_scopes(ScopeId::MODULE)
                    .nth(2)
                    .unwrap()
                    .0;
                let ancestors: Vec<ScopeKind> = index
                    .ancestor_scopes(bar_scope)
                    .map(|(_, scope)| scope.kind())
                    .collect();
                assert_eq!(
                    ancestors,
                    vec![
                        ScopeKind::Function,
                        ScopeKind::Function,
                        ScopeKind::Class,
                        ScopeKind::Module,
                    ]
                );
            },
        );
    }

    #[test]
    fn every_binding_usage_is_reachable_from_its_node() {
        // Invariant 1: a bound name node always carries its symbol.
        check(
            "x = 1\nfor i in x:\n    pass\nwith a() as w:\n    pass\n(y := 2)\n",
            |index, _| {
                for (_, scope) in index.scopes() {
                    for symbol_id in scope.symbols() {
                        for usage in index.symbol(symbol_id).binding_usages() {
                            if let Some(expr) = usage.node().as_expr() {
                                assert_eq!(index.symbol_for_node(expr), Some(symbol_id));
                            }
                        }
                    }
                }
            },
        );
    }

    #[test]
    fn building_twice_is_idempotent() {
        let source = "import os\nx = 1\ndef f(a=1):\n    return a\nclass C(object):\n    def m(self):\n        self.v = x\n";
        let module = parse(source);
        let stubs = StubIndex::with_default_builtins();
        let global_symbols = GlobalSymbolIndex::new();

        let observe = |index: &SemanticIndex| {
            let mut snapshot: Vec<(ScopeKind, Vec<(String, usize)>)> = Vec::new();
            for (_, scope) in index.scopes() {
                let symbols = scope
                    .symbols()
                    .map(|id| {
                        let symbol = index.symbol(id);
                        (symbol.name().to_string(), symbol.usages().len())
                    })
                    .collect();
                snapshot.push((scope.kind(), symbols));
            }
            snapshot
        };

        let source_file = SourceFile::new("mod.py", "pkg");
        let first = semantic_index(&module, source_file, &stubs, &global_symbols);
        let second = semantic_index(&module, source_file, &stubs, &global_symbols);
        assert_eq!(observe(&first), observe(&second));
    }

    #[test]
    fn module_level_symbols_never_share_fqns() {
        // Invariant 3.
        check(
            "import os\nx = 1\ny = 2\ndef f(): pass\nclass C: pass\n",
            |index, _| {
                let mut fqns: Vec<&str> = index
                    .global_variables()
                    .filter_map(|id| index.symbol(id).fully_qualified_name())
                    .collect();
                let total = fqns.len();
                fqns.sort_unstable();
                fqns.dedup();
                assert_eq!(fqns.len(), total);
            },
        );
    }

    #[test]
    fn qualified_reads_record_child_usages() {
        check("import os\nos.path\nos.path\n", |index, _| {
            let os = index.resolve(ScopeId::MODULE, "os").unwrap();
            let children: Vec<&str> = index
                .symbol(os)
                .child_symbols()
                .map(|(name, _)| name)
                .collect();
            assert_eq!(children, vec!["path"]);

            let (_, path) = index.symbol(os).child_symbols().next().unwrap();
            // Two distinct attribute nodes, both recorded as reads.
            assert_eq!(index.symbol(path).usages().len(), 2);
            assert!(index
                .symbol(path)
                .usages()
                .iter()
                .all(|usage| usage.kind() == UsageKind::Other));
            assert_eq!(
                index.symbol(path).fully_qualified_name(),
                Some("os.path")
            );
        });
    }

    #[test]
    fn qualified_store_is_an_assignment_usage() {
        check("import config\nconfig.debug = True\n", |index, _| {
            let config = index.resolve(ScopeId::MODULE, "config").unwrap();
            let (_, debug) = index.symbol(config).child_symbols().next().unwrap();
            assert_eq!(
                index.symbol(debug).usages()[0].kind(),
                UsageKind::AssignmentLhs
            );
        });
    }
}
