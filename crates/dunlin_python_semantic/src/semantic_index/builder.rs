//! The builder: owns the arenas and side tables across the three
//! traversals, and implements the first (binding) pass as a visitor.
//!
//! The binding pass never reads names. It creates scopes, binds every name
//! that a construct writes, wires imports against the stub and
//! global-symbol indices, and collects the assignment-LHS side set that the
//! reference pass later uses to classify qualified expressions.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use rustpython_parser::ast::{
    Alias, Arguments, Comprehension, Excepthandler, ExcepthandlerKind, Expr, ExprKind, Pattern,
    PatternKind, Stmt, StmtKind,
};

use crate::module_name::{module_fqn, resolve_relative_import, ModuleName};
use crate::node_ref::{Range, RefEquality};
use crate::semantic_index::scope::{
    NodeWithScopeKey, Scope, ScopeId, ScopeKind, StarImport,
};
use crate::semantic_index::symbol::{
    parameters_from_arguments, BaseClass, ClassSymbol, FunctionFlags, FunctionSymbol, Symbol,
    SymbolFlags, SymbolId, SymbolKind, Usage, UsageKind, UsageNode,
};
use crate::semantic_index::{references::ReferenceResolver, SemanticIndex, SourceFile};
use crate::stubs::{GlobalSymbolIndex, StubIndex, StubSymbol, StubSymbolKind};
use crate::types::InferredType;
use crate::visitor::{walk_expr, walk_stmt, Visitor};

/// Module names whose files must not be seeded with the builtin namespace:
/// the builtins stub itself (its FQN is the empty string by index
/// convention) and the base typing stubs, which would otherwise reference
/// themselves.
const BASE_STUB_MODULES: &[&str] = &["", "builtins", "typing", "typing_extensions"];

pub struct SemanticIndexBuilder<'a> {
    module: &'a [Stmt],
    stubs: &'a StubIndex,
    global_symbols: &'a GlobalSymbolIndex,
    source_file_name: &'a str,
    source_package: &'a str,
    module_name: Option<ModuleName>,

    scope_stack: Vec<ScopeId>,

    pub(super) scopes: Vec<Scope<'a>>,
    pub(super) symbols: Vec<Symbol<'a>>,
    pub(super) scopes_by_node: FxHashMap<NodeWithScopeKey<'a>, ScopeId>,
    pub(super) symbols_by_node: FxHashMap<RefEquality<'a, Expr>, SymbolId>,
    /// Every expression that appears on the left of an assignment-like
    /// construct, used to classify qualified-expression usages.
    pub(super) lhs_expressions: FxHashSet<RefEquality<'a, Expr>>,
    /// Maps each method's implicit-instance parameter to its class scope.
    pub(super) self_class_scopes: FxHashMap<SymbolId, ScopeId>,
    pub(super) types_by_expression: FxHashMap<RefEquality<'a, Expr>, InferredType>,
}

impl<'a> SemanticIndexBuilder<'a> {
    pub fn new(
        module: &'a [Stmt],
        source: SourceFile<'a>,
        stubs: &'a StubIndex,
        global_symbols: &'a GlobalSymbolIndex,
    ) -> Self {
        let module_name = module_fqn(source.package(), source.file_name());
        let mut builder = Self {
            module,
            stubs,
            global_symbols,
            source_file_name: source.file_name(),
            source_package: source.package(),
            module_name: module_name.clone(),

            scope_stack: Vec::new(),

            scopes: Vec::new(),
            symbols: Vec::new(),
            scopes_by_node: FxHashMap::default(),
            symbols_by_node: FxHashMap::default(),
            lhs_expressions: FxHashSet::default(),
            self_class_scopes: FxHashMap::default(),
            types_by_expression: FxHashMap::default(),
        };

        builder.push_scope(
            NodeWithScopeKey::Module,
            ScopeKind::Module,
            module_name.as_ref().map(|name| name.as_str().to_string()),
            None,
        );
        builder.seed_builtins();

        builder
    }

    /// Runs all passes and assembles the finished index.
    #[must_use]
    pub fn build(mut self) -> SemanticIndex<'a> {
        let module = self.module;

        // Pass 1: bindings.
        self.visit_body(module);
        self.pop_scope();
        debug_assert!(self.scope_stack.is_empty());

        // Pass 2: references.
        ReferenceResolver::new(&mut self).run(module);

        // Fix-up: ambiguity, base classes, class members.
        self.disambiguate();
        self.resolve_base_classes();
        self.attach_class_members();

        // Pass 3: shallow types.
        super::infer::run(&mut self, module);

        SemanticIndex {
            module_name: self.module_name,
            scopes: self.scopes,
            symbols: self.symbols,
            scopes_by_node: self.scopes_by_node,
            symbols_by_node: self.symbols_by_node,
            types_by_expression: self.types_by_expression,
        }
    }

    pub(super) fn current_scope_id(&self) -> ScopeId {
        *self
            .scope_stack
            .last()
            .expect("the module scope outlives every pass")
    }

    fn current_scope(&self) -> &Scope<'a> {
        &self.scopes[self.current_scope_id().index()]
    }

    fn push_scope(
        &mut self,
        key: NodeWithScopeKey<'a>,
        kind: ScopeKind,
        fqn_prefix: Option<String>,
        owner: Option<SymbolId>,
    ) -> ScopeId {
        let parent = self.scope_stack.last().copied();
        let id = ScopeId::from_usize(self.scopes.len());
        let children_start = id.raw() + 1;
        let mut scope = Scope::new(parent, kind, fqn_prefix, owner);
        scope.descendents = children_start..children_start;
        self.scopes.push(scope);
        self.scopes_by_node.insert(key, id);
        self.scope_stack.push(id);
        id
    }

    fn pop_scope(&mut self) -> ScopeId {
        let id = self
            .scope_stack
            .pop()
            .expect("pop_scope called with an empty scope stack");
        let end = u32::try_from(self.scopes.len()).expect("scope arena exceeds u32");
        let scope = &mut self.scopes[id.index()];
        scope.descendents = scope.descendents.start..end;
        id
    }

    /// The fully qualified name of an entity named `name` declared in the
    /// current scope, when the scope has a dotted prefix.
    fn entity_fqn(&self, name: &str) -> Option<String> {
        self.current_scope()
            .fqn_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}.{name}"))
    }

    /// The scope a binding of `name` lands in: the current scope, unless a
    /// `global` or `nonlocal` directive redirects it.
    fn binding_scope(&self, name: &str) -> ScopeId {
        let current_id = self.current_scope_id();
        let current = &self.scopes[current_id.index()];

        if current.global_names.contains(name) {
            return ScopeId::MODULE;
        }

        if current.nonlocal_names.contains(name) {
            let mut next = current.parent;
            while let Some(id) = next {
                if id == ScopeId::MODULE {
                    break;
                }
                let scope = &self.scopes[id.index()];
                if !scope.kind().is_class() && scope.symbols_by_name.contains_key(name) {
                    return id;
                }
                next = scope.parent;
            }
            // No enclosing binding: tolerated, the name binds locally.
        }

        current_id
    }

    /// Locates or creates the symbol for `name` (honoring `global` and
    /// `nonlocal` redirection) and appends a binding usage. The fully
    /// qualified name is set if not already present: `fqn` when supplied,
    /// otherwise derived from the scope prefix for module- and class-level
    /// bindings.
    pub(super) fn add_binding_usage(
        &mut self,
        name: &'a str,
        node: UsageNode<'a>,
        kind: UsageKind,
        fqn: Option<String>,
    ) -> SymbolId {
        let scope_id = self.binding_scope(name);
        self.add_binding_usage_in(scope_id, name, node, kind, fqn)
    }

    fn add_binding_usage_in(
        &mut self,
        scope_id: ScopeId,
        name: &'a str,
        node: UsageNode<'a>,
        kind: UsageKind,
        fqn: Option<String>,
    ) -> SymbolId {
        let symbol_id = match self.scopes[scope_id.index()].symbols_by_name.get(name) {
            Some(&existing) => existing,
            None => {
                let id = SymbolId::from_usize(self.symbols.len());
                self.symbols.push(Symbol::new(name));
                self.scopes[scope_id.index()].symbols_by_name.insert(name, id);
                id
            }
        };

        let fqn = fqn.or_else(|| {
            // An import alias's FQN is the origin's; it is never derived
            // from this module, so an unresolved origin stays unknown.
            if kind == UsageKind::Import {
                return None;
            }
            let scope = &self.scopes[scope_id.index()];
            if matches!(scope.kind(), ScopeKind::Module | ScopeKind::Class) {
                scope
                    .fqn_prefix
                    .as_ref()
                    .map(|prefix| format!("{prefix}.{name}"))
            } else {
                None
            }
        });

        let symbol = &mut self.symbols[symbol_id.index()];
        if symbol.fully_qualified_name.is_none() {
            symbol.fully_qualified_name = fqn;
        }
        symbol.push_usage_deduplicated(Usage { node, kind });

        if let Some(expr) = node.as_expr() {
            self.symbols_by_node.insert(RefEquality(expr), symbol_id);
        }

        symbol_id
    }

    /// Replaces the symbol's kind when this binding is its only one, so a
    /// declaration takes over a fresh symbol (or a seeded builtin), while a
    /// rebound name keeps its history for the disambiguation pass.
    fn try_set_kind(&mut self, symbol_id: SymbolId, kind: SymbolKind<'a>) {
        let symbol = &mut self.symbols[symbol_id.index()];
        if symbol.binding_usage_count() <= 1 {
            symbol.kind = kind;
        }
    }

    /// Binds every name in an assignment-like target, destructuring tuples,
    /// lists, and starred elements recursively. Qualified and subscripted
    /// targets bind nothing here; attribute targets join the LHS side set
    /// for the reference pass.
    fn bind_target(&mut self, target: &'a Expr, kind: UsageKind, annotation: Option<&'a Expr>) {
        match &target.node {
            ExprKind::Name { id, .. } => {
                let symbol = self.add_binding_usage(id, UsageNode::Expr(target), kind, None);
                if let Some(annotation) = annotation {
                    let symbol = &mut self.symbols[symbol.index()];
                    if symbol.annotation.is_none() {
                        symbol.annotation = Some(annotation);
                    }
                }
            }
            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                for elt in elts {
                    self.bind_target(elt, kind, None);
                }
            }
            ExprKind::Starred { value, .. } => {
                self.bind_target(value, kind, None);
            }
            ExprKind::Attribute { value, .. } => {
                self.lhs_expressions.insert(RefEquality(target));
                self.visit_expr(value);
            }
            ExprKind::Subscript { value, slice, .. } => {
                self.visit_expr(value);
                self.visit_expr(slice);
            }
            _ => self.visit_expr(target),
        }
    }

    fn function_symbol_from_def(
        &self,
        stmt: &'a Stmt,
        scope: Option<ScopeId>,
    ) -> FunctionSymbol<'a> {
        let (StmtKind::FunctionDef {
            args,
            decorator_list,
            returns,
            ..
        }
        | StmtKind::AsyncFunctionDef {
            args,
            decorator_list,
            returns,
            ..
        }) = &stmt.node
        else {
            unreachable!("function symbol requested for a non-function statement")
        };

        let is_method = scope
            .and_then(|id| self.scopes[id.index()].parent)
            .is_some_and(|parent| self.scopes[parent.index()].kind().is_class());

        let mut flags = FunctionFlags::empty();
        if matches!(stmt.node, StmtKind::AsyncFunctionDef { .. }) {
            flags |= FunctionFlags::ASYNC;
        }
        if is_method {
            flags |= FunctionFlags::METHOD;
        }
        if !decorator_list.is_empty() {
            flags |= FunctionFlags::DECORATED;
        }

        FunctionSymbol {
            parameters: parameters_from_arguments(args, is_method),
            returns: returns.as_deref(),
            flags,
            scope,
            location: Range::from_located(stmt),
        }
    }

    fn class_symbol_from_def(&self, stmt: &'a Stmt, scope: Option<ScopeId>) -> ClassSymbol<'a> {
        let StmtKind::ClassDef { bases, .. } = &stmt.node else {
            unreachable!("class symbol requested for a non-class statement")
        };
        ClassSymbol {
            bases: bases
                .iter()
                .map(|base| BaseClass {
                    node: Some(base),
                    symbol: None,
                })
                .collect(),
            members: Vec::new(),
            scope,
            location: Range::from_located(stmt),
            incomplete: false,
        }
    }

    /// Registers the parameters of the function or lambda scope currently on
    /// top of the stack. `is_method` marks the first positional parameter as
    /// the implicit-instance parameter.
    fn declare_parameters(&mut self, arguments: &'a Arguments, is_method: bool) {
        for (index, arg) in arguments
            .posonlyargs
            .iter()
            .chain(&arguments.args)
            .enumerate()
        {
            let symbol =
                self.add_binding_usage(&arg.node.arg, UsageNode::Arg(arg), UsageKind::Parameter, None);
            if is_method && index == 0 {
                self.create_self_parameter(symbol);
            }
        }
        for arg in arguments
            .vararg
            .as_deref()
            .into_iter()
            .chain(&arguments.kwonlyargs)
            .chain(arguments.kwarg.as_deref())
        {
            self.add_binding_usage(&arg.node.arg, UsageNode::Arg(arg), UsageKind::Parameter, None);
        }
    }

    /// Marks a method's first parameter: `self.<attr>` stores seen through
    /// it later contribute to the class scope's instance attributes.
    fn create_self_parameter(&mut self, symbol: SymbolId) {
        let function_scope = self.current_scope_id();
        let Some(class_scope) = self.scopes[function_scope.index()].parent else {
            return;
        };
        if !self.scopes[class_scope.index()].kind().is_class() {
            return;
        }
        self.symbols[symbol.index()].flags |= SymbolFlags::SELF_PARAMETER;
        self.self_class_scopes.insert(symbol, class_scope);
    }

    /// Seeds the module scope with the built-in namespace, unless this file
    /// is one of the base stub modules.
    fn seed_builtins(&mut self) {
        if let Some(module_name) = self.module_name.as_deref() {
            if BASE_STUB_MODULES.contains(&module_name) {
                return;
            }
        }

        let stubs: &'a StubIndex = self.stubs;
        let summaries: FxHashMap<&str, &'a StubSymbol> = stubs
            .builtin_symbols()
            .unwrap_or_default()
            .iter()
            .map(|symbol| (symbol.name(), symbol))
            .collect();
        if summaries.is_empty() {
            debug!("stub index has no builtins; seeding names only");
        }

        for &name in dunlin_python_stdlib::builtins::BUILTINS
            .iter()
            .chain(dunlin_python_stdlib::builtins::MAGIC_GLOBALS)
        {
            let id = match summaries.get(name) {
                Some(summary) => {
                    self.materialize_stub_symbol(summary, SymbolFlags::BUILTIN)
                }
                None => {
                    let id = SymbolId::from_usize(self.symbols.len());
                    let mut symbol = Symbol::new(name);
                    symbol.fully_qualified_name = Some(name.to_string());
                    symbol.flags = SymbolFlags::BUILTIN;
                    self.symbols.push(symbol);
                    id
                }
            };
            self.scopes[ScopeId::MODULE.index()]
                .symbols_by_name
                .insert(name, id);
        }
    }

    /// Creates an arena symbol from an index summary. The symbol belongs to
    /// no scope until a caller inserts it; member symbols of summarized
    /// classes are materialized recursively.
    fn materialize_stub_symbol(&mut self, stub: &'a StubSymbol, flags: SymbolFlags) -> SymbolId {
        let kind = self.stub_symbol_kind(stub, Range::default());
        let id = SymbolId::from_usize(self.symbols.len());
        let mut symbol = Symbol::new(stub.name());
        symbol.fully_qualified_name = Some(stub.fully_qualified_name().to_string());
        symbol.flags = flags | SymbolFlags::STUB;
        symbol.kind = kind;
        self.symbols.push(symbol);
        id
    }

    fn stub_symbol_kind(&mut self, stub: &'a StubSymbol, location: Range) -> SymbolKind<'a> {
        match stub.kind() {
            StubSymbolKind::Class { members, complete } => {
                let members = members
                    .iter()
                    .map(|member| self.materialize_stub_symbol(member, SymbolFlags::empty()))
                    .collect();
                SymbolKind::Class(ClassSymbol {
                    bases: Vec::new(),
                    members,
                    scope: None,
                    location,
                    incomplete: !complete,
                })
            }
            StubSymbolKind::Function => SymbolKind::Function(FunctionSymbol {
                parameters: Vec::new(),
                returns: None,
                flags: FunctionFlags::STUB,
                scope: None,
                location,
            }),
            StubSymbolKind::Other => SymbolKind::Other,
        }
    }

    fn handle_import(&mut self, alias: &'a Alias) {
        let dotted = alias.node.name.as_str();
        match &alias.node.asname {
            Some(asname) => {
                // The alias refers to the full dotted module.
                self.add_binding_usage(
                    asname,
                    UsageNode::Alias(alias),
                    UsageKind::Import,
                    Some(dotted.to_string()),
                );
            }
            None => {
                let first = dotted.split('.').next().unwrap_or(dotted);
                self.add_binding_usage(
                    first,
                    UsageNode::Alias(alias),
                    UsageKind::Import,
                    Some(dotted.to_string()),
                );
            }
        }
    }

    fn handle_import_from(&mut self, module: Option<&'a str>, names: &'a [Alias], level: usize) {
        let target = if level > 0 {
            resolve_relative_import(self.source_package, self.source_file_name, level, module)
        } else {
            module.and_then(ModuleName::new)
        };
        if target.is_none() {
            debug!(
                "unresolved import source `{}` in {}",
                format_import_source(level, module),
                self.source_file_name
            );
        }

        for alias in names {
            if alias.node.name.as_str() == "*" {
                self.handle_wildcard_import(level, module, target.as_ref());
            } else {
                self.handle_member_import(alias, target.as_ref());
            }
        }
    }

    fn handle_member_import(&mut self, alias: &'a Alias, target: Option<&ModuleName>) {
        let imported = alias.node.name.as_str();
        let local = alias.node.asname.as_deref().unwrap_or(imported);

        let globals: &'a GlobalSymbolIndex = self.global_symbols;
        let stubs: &'a StubIndex = self.stubs;
        let export: Option<&'a StubSymbol> = target.and_then(|module| {
            globals
                .symbol(module.as_str(), imported)
                .or_else(|| stubs.symbol(module.as_str(), imported))
        });

        let fqn = export
            .map(|export| export.fully_qualified_name().to_string())
            .or_else(|| target.map(|module| module.member(imported)));

        let symbol = self.add_binding_usage(local, UsageNode::Alias(alias), UsageKind::Import, fqn);
        if let Some(export) = export {
            let kind = self.stub_symbol_kind(export, Range::from_located(alias));
            self.try_set_kind(symbol, kind);
        }
    }

    /// `from m import *`: when `m` is indexed, every exported symbol is
    /// copied into the current scope under its own name and the wildcard is
    /// marked resolved; otherwise the scope is flagged so downstream rules
    /// know any name may be bound here.
    fn handle_wildcard_import(
        &mut self,
        level: usize,
        module: Option<&str>,
        target: Option<&ModuleName>,
    ) {
        let globals: &'a GlobalSymbolIndex = self.global_symbols;
        let stubs: &'a StubIndex = self.stubs;
        let exports: Option<(&str, &'a [StubSymbol])> = target.and_then(|module| {
            globals
                .symbols_for_module(module.as_str())
                .or_else(|| stubs.symbols_for_module(module.as_str()))
                .map(|exports| (module.as_str(), exports))
        });

        let scope_id = self.current_scope_id();
        match exports {
            Some((module, exports)) => {
                for export in exports {
                    if self.scopes[scope_id.index()]
                        .symbols_by_name
                        .contains_key(export.name())
                    {
                        continue;
                    }
                    let id = self.materialize_stub_symbol(export, SymbolFlags::empty());
                    self.scopes[scope_id.index()]
                        .symbols_by_name
                        .insert(export.name(), id);
                }
                self.scopes[scope_id.index()].star_imports.push(StarImport {
                    module: module.to_string(),
                    resolved: true,
                });
            }
            None => {
                let source = format_import_source(level, module);
                debug!(
                    "wildcard import from unindexed module `{source}` in {}",
                    self.source_file_name
                );
                self.scopes[scope_id.index()].star_imports.push(StarImport {
                    module: source,
                    resolved: false,
                });
            }
        }
    }

    fn handle_global(&mut self, stmt: &'a Stmt, names: &'a [String]) {
        let in_module = self.current_scope_id() == ScopeId::MODULE;
        for name in names {
            if !in_module {
                let scope_id = self.current_scope_id();
                self.scopes[scope_id.index()].global_names.insert(name);
            }
            // Synthesize the module-level symbol so the redirect always has
            // a target, even when the name is never assigned at module
            // level.
            self.add_binding_usage_in(
                ScopeId::MODULE,
                name,
                UsageNode::Stmt(stmt),
                UsageKind::GlobalDeclaration,
                None,
            );
        }
    }

    fn handle_nonlocal(&mut self, names: &'a [String]) {
        let scope_id = self.current_scope_id();
        if scope_id == ScopeId::MODULE {
            return;
        }
        for name in names {
            self.scopes[scope_id.index()].nonlocal_names.insert(name);
        }
    }

    /// Binds the capture names of a `match` pattern and traverses its value
    /// expressions.
    fn bind_pattern(&mut self, pattern: &'a Pattern) {
        match &pattern.node {
            PatternKind::MatchValue { value } => self.visit_expr(value),
            PatternKind::MatchSingleton { .. } => {}
            PatternKind::MatchSequence { patterns } | PatternKind::MatchOr { patterns } => {
                for pattern in patterns {
                    self.bind_pattern(pattern);
                }
            }
            PatternKind::MatchMapping {
                keys,
                patterns,
                rest,
            } => {
                for key in keys {
                    self.visit_expr(key);
                }
                for pattern in patterns {
                    self.bind_pattern(pattern);
                }
                if let Some(rest) = rest {
                    self.add_binding_usage(
                        rest,
                        UsageNode::Pattern(pattern),
                        UsageKind::AssignmentLhs,
                        None,
                    );
                }
            }
            PatternKind::MatchClass {
                cls,
                patterns,
                kwd_patterns,
                ..
            } => {
                self.visit_expr(cls);
                for pattern in patterns {
                    self.bind_pattern(pattern);
                }
                for pattern in kwd_patterns {
                    self.bind_pattern(pattern);
                }
            }
            PatternKind::MatchStar { name } | PatternKind::MatchAs { pattern: None, name } => {
                if let Some(name) = name {
                    self.add_binding_usage(
                        name,
                        UsageNode::Pattern(pattern),
                        UsageKind::AssignmentLhs,
                        None,
                    );
                }
            }
            PatternKind::MatchAs {
                pattern: Some(sub_pattern),
                name,
            } => {
                self.bind_pattern(sub_pattern);
                if let Some(name) = name {
                    self.add_binding_usage(
                        name,
                        UsageNode::Pattern(pattern),
                        UsageKind::AssignmentLhs,
                        None,
                    );
                }
            }
        }
    }

    /// Creates a comprehension scope: the outermost iterable stays in the
    /// enclosing scope, everything else lives inside.
    fn comprehension_scope(
        &mut self,
        expr: &'a Expr,
        generators: &'a [Comprehension],
        visit_element: impl FnOnce(&mut Self),
    ) {
        let Some((first, rest)) = generators.split_first() else {
            unreachable!("a comprehension always has at least one generator");
        };

        self.visit_expr(&first.iter);
        self.push_scope(
            NodeWithScopeKey::Expr(RefEquality(expr)),
            ScopeKind::Comprehension,
            None,
            None,
        );
        self.bind_target(&first.target, UsageKind::CompDeclaration, None);
        for condition in &first.ifs {
            self.visit_expr(condition);
        }
        for generator in rest {
            self.visit_expr(&generator.iter);
            self.bind_target(&generator.target, UsageKind::CompDeclaration, None);
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
        visit_element(self);
        self.pop_scope();
    }

    // Fix-up passes.

    /// Replaces every symbol carrying several binding usages, at least one
    /// of which is a function or class declaration, with an ambiguous
    /// symbol. One alternative is fabricated per binding usage; the original
    /// usage list stays on the replacement verbatim.
    fn disambiguate(&mut self) {
        for scope_index in 0..self.scopes.len() {
            let symbol_ids: Vec<SymbolId> =
                self.scopes[scope_index].symbols_by_name.values().copied().collect();
            for symbol_id in symbol_ids {
                let symbol = &self.symbols[symbol_id.index()];
                let bindings: Vec<Usage<'a>> = symbol.binding_usages().copied().collect();
                if bindings.len() < 2
                    || !bindings.iter().any(|usage| {
                        matches!(
                            usage.kind(),
                            UsageKind::FuncDeclaration | UsageKind::ClassDeclaration
                        )
                    })
                {
                    continue;
                }

                let name = symbol.name();
                let fqn = symbol.fully_qualified_name.clone();
                let children = symbol.children.clone();

                let mut alternatives = Vec::with_capacity(bindings.len());
                for usage in bindings {
                    let kind = match (usage.kind(), usage.node().as_stmt()) {
                        (UsageKind::FuncDeclaration, Some(stmt)) => {
                            let scope = self
                                .scopes_by_node
                                .get(&NodeWithScopeKey::Stmt(RefEquality(stmt)))
                                .copied();
                            SymbolKind::Function(self.function_symbol_from_def(stmt, scope))
                        }
                        (UsageKind::ClassDeclaration, Some(stmt)) => {
                            let scope = self
                                .scopes_by_node
                                .get(&NodeWithScopeKey::Stmt(RefEquality(stmt)))
                                .copied();
                            SymbolKind::Class(self.class_symbol_from_def(stmt, scope))
                        }
                        _ => SymbolKind::Other,
                    };

                    let alternative = SymbolId::from_usize(self.symbols.len());
                    let mut alternative_symbol = Symbol::new(name);
                    alternative_symbol.fully_qualified_name = fqn.clone();
                    alternative_symbol.usages.push(usage);
                    if matches!(kind, SymbolKind::Class(_)) {
                        // Qualified usages recorded against the original
                        // symbol carry over to each class alternative.
                        alternative_symbol.children = children.clone();
                    }
                    alternative_symbol.kind = kind;
                    self.symbols.push(alternative_symbol);
                    alternatives.push(alternative);
                }

                self.symbols[symbol_id.index()].kind = SymbolKind::Ambiguous(alternatives);
            }
        }
    }

    /// Points every base-class slot at the class symbol its expression
    /// resolved to, where it did resolve to one. Anything else stays
    /// unresolved and taints member lookups as "unknown".
    fn resolve_base_classes(&mut self) {
        let mut updates: Vec<(usize, usize, SymbolId)> = Vec::new();
        for (index, symbol) in self.symbols.iter().enumerate() {
            let SymbolKind::Class(class) = symbol.kind() else {
                continue;
            };
            for (base_index, base) in class.bases().iter().enumerate() {
                let Some(node) = base.node() else { continue };
                let Some(&target) = self.symbols_by_node.get(&RefEquality(node)) else {
                    continue;
                };
                if self.symbols[target.index()].kind().is_class() {
                    updates.push((index, base_index, target));
                }
            }
        }
        for (index, base_index, target) in updates {
            if let SymbolKind::Class(class) = &mut self.symbols[index].kind {
                class.bases[base_index].symbol = Some(target);
            }
        }
    }

    /// Computes each class's member set: the class-body symbols, plus every
    /// instance attribute whose name no body symbol shadows. On a collision
    /// the body symbol wins and absorbs the attribute's usages.
    fn attach_class_members(&mut self) {
        let mut classes_by_scope: FxHashMap<ScopeId, Vec<usize>> = FxHashMap::default();
        for (index, symbol) in self.symbols.iter().enumerate() {
            if let SymbolKind::Class(class) = symbol.kind() {
                if let Some(scope) = class.body_scope() {
                    classes_by_scope.entry(scope).or_default().push(index);
                }
            }
        }

        for scope_index in 0..self.scopes.len() {
            if !self.scopes[scope_index].kind().is_class() {
                continue;
            }
            let scope_id = ScopeId::from_usize(scope_index);

            let mut members: Vec<SymbolId> = self.scopes[scope_index].symbols().collect();
            let attributes: Vec<(&'a str, SymbolId)> = self.scopes[scope_index]
                .instance_attributes_by_name
                .iter()
                .map(|(&name, &id)| (name, id))
                .collect();
            for (name, attribute) in attributes {
                if let Some(&body_symbol) =
                    self.scopes[scope_index].symbols_by_name.get(name)
                {
                    let merged = self.symbols[attribute.index()].usages.clone();
                    for usage in merged {
                        self.symbols[body_symbol.index()].push_usage_deduplicated(usage);
                    }
                } else if self.symbols[attribute.index()].binding_usage_count() > 0 {
                    // Attributes that are only ever read never become
                    // members; they stay aggregated for usage queries.
                    members.push(attribute);
                }
            }

            if let Some(class_indices) = classes_by_scope.get(&scope_id) {
                for &class_index in class_indices {
                    if let SymbolKind::Class(class) = &mut self.symbols[class_index].kind {
                        class.members = members.clone();
                    }
                }
            }
        }
    }

    /// Records a usage of `name` under the `qualifier` symbol for a
    /// qualified expression, creating the derived child symbol on first
    /// sight. Stores through a method's instance parameter aggregate into
    /// the class scope's instance attributes instead.
    pub(super) fn record_member_usage(
        &mut self,
        qualifier: SymbolId,
        name: &'a str,
        node: &'a Expr,
        kind: UsageKind,
    ) {
        let child = if let Some(&class_scope) = self.self_class_scopes.get(&qualifier) {
            let existing = self.scopes[class_scope.index()]
                .instance_attributes_by_name
                .get(name)
                .copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = SymbolId::from_usize(self.symbols.len());
                    let mut symbol = Symbol::new(name);
                    symbol.flags = SymbolFlags::INSTANCE_ATTRIBUTE;
                    self.symbols.push(symbol);
                    self.scopes[class_scope.index()]
                        .instance_attributes_by_name
                        .insert(name, id);
                    id
                }
            };
            self.symbols[qualifier.index()].children.entry(name).or_insert(id);
            id
        } else {
            match self.symbols[qualifier.index()].children.get(name) {
                Some(&id) => id,
                None => {
                    let id = SymbolId::from_usize(self.symbols.len());
                    let parent_fqn = self.symbols[qualifier.index()]
                        .fully_qualified_name
                        .clone();
                    let mut symbol = Symbol::new(name);
                    symbol.fully_qualified_name =
                        parent_fqn.map(|prefix| format!("{prefix}.{name}"));
                    self.symbols.push(symbol);
                    self.symbols[qualifier.index()].children.insert(name, id);
                    id
                }
            }
        };

        self.symbols[child.index()].push_usage_deduplicated(Usage {
            node: UsageNode::Expr(node),
            kind,
        });
        self.symbols_by_node.insert(RefEquality(node), child);
    }
}

/// The import source as written: leading dots for a relative import,
/// followed by the module text when present.
fn format_import_source(level: usize, module: Option<&str>) -> String {
    let mut source = ".".repeat(level);
    if let Some(module) = module {
        source.push_str(module);
    }
    source
}

impl<'a, 'b> Visitor<'b> for SemanticIndexBuilder<'a>
where
    'b: 'a,
{
    fn visit_stmt(&mut self, stmt: &'b Stmt) {
        match &stmt.node {
            StmtKind::FunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            }
            | StmtKind::AsyncFunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            } => {
                for decorator in decorator_list {
                    self.visit_expr(decorator);
                }
                // Annotations and default values belong to the enclosing
                // scope.
                for arg in args
                    .posonlyargs
                    .iter()
                    .chain(&args.args)
                    .chain(args.vararg.as_deref())
                    .chain(&args.kwonlyargs)
                    .chain(args.kwarg.as_deref())
                {
                    if let Some(annotation) = &arg.node.annotation {
                        self.visit_annotation(annotation);
                    }
                }
                if let Some(returns) = returns {
                    self.visit_annotation(returns);
                }
                for default in args.kw_defaults.iter().chain(&args.defaults) {
                    self.visit_expr(default);
                }

                let fqn = self.entity_fqn(name);
                let symbol = self.add_binding_usage(
                    name,
                    UsageNode::Stmt(stmt),
                    UsageKind::FuncDeclaration,
                    fqn.clone(),
                );
                let is_method = self.current_scope().kind().is_class();
                let scope_id = self.push_scope(
                    NodeWithScopeKey::Stmt(RefEquality(stmt)),
                    ScopeKind::Function,
                    fqn,
                    Some(symbol),
                );
                let function = self.function_symbol_from_def(stmt, Some(scope_id));
                self.try_set_kind(symbol, SymbolKind::Function(function));

                self.declare_parameters(args, is_method);
                self.visit_body(body);
                self.pop_scope();
            }
            StmtKind::ClassDef {
                name,
                bases,
                keywords,
                body,
                decorator_list,
            } => {
                for decorator in decorator_list {
                    self.visit_expr(decorator);
                }
                for base in bases {
                    self.visit_expr(base);
                }
                for keyword in keywords {
                    self.visit_keyword(keyword);
                }

                let fqn = self.entity_fqn(name);
                let symbol = self.add_binding_usage(
                    name,
                    UsageNode::Stmt(stmt),
                    UsageKind::ClassDeclaration,
                    fqn.clone(),
                );
                let scope_id = self.push_scope(
                    NodeWithScopeKey::Stmt(RefEquality(stmt)),
                    ScopeKind::Class,
                    fqn,
                    Some(symbol),
                );
                let class = self.class_symbol_from_def(stmt, Some(scope_id));
                self.try_set_kind(symbol, SymbolKind::Class(class));

                self.visit_body(body);
                self.pop_scope();
            }
            StmtKind::Assign { targets, value, .. } => {
                self.visit_expr(value);
                for target in targets {
                    self.bind_target(target, UsageKind::AssignmentLhs, None);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.visit_expr(value);
                self.bind_target(target, UsageKind::CompoundAssignmentLhs, None);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
                ..
            } => {
                self.visit_annotation(annotation);
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                self.bind_target(target, UsageKind::AssignmentLhs, Some(annotation));
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                ..
            }
            | StmtKind::AsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                self.visit_expr(iter);
                self.bind_target(target, UsageKind::LoopDeclaration, None);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            StmtKind::With { items, body, .. } | StmtKind::AsyncWith { items, body, .. } => {
                for item in items {
                    self.visit_expr(&item.context_expr);
                    if let Some(optional_vars) = &item.optional_vars {
                        self.bind_target(optional_vars, UsageKind::WithInstance, None);
                    }
                }
                self.visit_body(body);
            }
            StmtKind::Match { subject, cases } => {
                self.visit_expr(subject);
                for case in cases {
                    self.bind_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_body(&case.body);
                }
            }
            StmtKind::Global { names } => self.handle_global(stmt, names),
            StmtKind::Nonlocal { names } => self.handle_nonlocal(names),
            StmtKind::Import { names } => {
                for alias in names {
                    self.handle_import(alias);
                }
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                self.handle_import_from(module.as_deref(), names, level.unwrap_or_default());
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'b Expr) {
        match &expr.node {
            ExprKind::Lambda { args, body } => {
                // Defaults are evaluated where the lambda appears.
                for default in args.kw_defaults.iter().chain(&args.defaults) {
                    self.visit_expr(default);
                }
                self.push_scope(
                    NodeWithScopeKey::Expr(RefEquality(expr)),
                    ScopeKind::Lambda,
                    None,
                    None,
                );
                self.declare_parameters(args, false);
                self.visit_expr(body);
                self.pop_scope();
            }
            ExprKind::ListComp { elt, generators }
            | ExprKind::SetComp { elt, generators }
            | ExprKind::GeneratorExp { elt, generators } => {
                self.comprehension_scope(expr, generators, |builder| builder.visit_expr(elt));
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.comprehension_scope(expr, generators, |builder| {
                    builder.visit_expr(key);
                    builder.visit_expr(value);
                });
            }
            ExprKind::NamedExpr { target, value } => {
                self.visit_expr(value);
                self.bind_target(target, UsageKind::AssignmentLhs, None);
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_excepthandler(&mut self, excepthandler: &'b Excepthandler) {
        let ExcepthandlerKind::ExceptHandler { type_, name, body } = &excepthandler.node;
        if let Some(type_) = type_ {
            self.visit_expr(type_);
        }
        if let Some(name) = name {
            self.add_binding_usage(
                name,
                UsageNode::ExceptHandler(excepthandler),
                UsageKind::ExceptionInstance,
                None,
            );
        }
        self.visit_body(body);
    }
}
