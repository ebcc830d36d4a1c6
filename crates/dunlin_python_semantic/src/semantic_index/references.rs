//! The reference pass: a second traversal with read semantics.
//!
//! Every Load-context name is resolved through the scope chain and recorded
//! as a plain usage on the symbol it reached; qualified expressions record
//! child usages under their qualifier's symbol, which is also how `self.x`
//! stores reach the class's instance attributes. Scope entry re-uses the
//! scopes created by the binding pass, and the same visit-order exceptions
//! apply: parameter defaults, decorators, and annotations are resolved in
//! the enclosing scope, and a comprehension's outermost iterable outside
//! the comprehension scope.

use rustpython_parser::ast::{Expr, ExprContext, ExprKind, Stmt, StmtKind};

use crate::node_ref::RefEquality;
use crate::semantic_index::builder::SemanticIndexBuilder;
use crate::semantic_index::scope::{resolve_in_chain, NodeWithScopeKey, ScopeId};
use crate::semantic_index::symbol::{Usage, UsageKind, UsageNode};
use crate::visitor::{walk_expr, walk_stmt, Visitor};

pub(super) struct ReferenceResolver<'a, 'b> {
    builder: &'b mut SemanticIndexBuilder<'a>,
    scope_stack: Vec<ScopeId>,
}

impl<'a, 'b> ReferenceResolver<'a, 'b> {
    pub(super) fn new(builder: &'b mut SemanticIndexBuilder<'a>) -> Self {
        Self {
            builder,
            scope_stack: vec![ScopeId::MODULE],
        }
    }

    pub(super) fn run(mut self, module: &'a [Stmt]) {
        self.visit_body(module);
        debug_assert_eq!(self.scope_stack, [ScopeId::MODULE]);
    }

    fn current_scope(&self) -> ScopeId {
        *self
            .scope_stack
            .last()
            .expect("the module scope outlives every pass")
    }

    fn enter_scope(&mut self, key: NodeWithScopeKey<'a>) {
        let scope = *self
            .builder
            .scopes_by_node
            .get(&key)
            .expect("scope was created by the binding pass");
        self.scope_stack.push(scope);
    }

    fn leave_scope(&mut self) {
        self.scope_stack
            .pop()
            .expect("leave_scope called with an empty scope stack");
    }

    /// Resolves a Load- or Del-context name and appends a read usage.
    /// Usages are deduplicated on the identity of the name node.
    fn resolve_name(&mut self, expr: &'a Expr, name: &str) {
        if self.builder.symbols_by_node.contains_key(&RefEquality(expr)) {
            return;
        }
        let Some(symbol) = resolve_in_chain(&self.builder.scopes, self.current_scope(), name)
        else {
            // Unresolved read: the symbol slot stays empty.
            return;
        };
        self.builder.symbols[symbol.index()].push_usage_deduplicated(Usage {
            node: UsageNode::Expr(expr),
            kind: UsageKind::Other,
        });
        self.builder.symbols_by_node.insert(RefEquality(expr), symbol);
    }
}

impl<'a, 'b, 'c> Visitor<'c> for ReferenceResolver<'a, 'b>
where
    'c: 'a,
{
    fn visit_stmt(&mut self, stmt: &'c Stmt) {
        match &stmt.node {
            StmtKind::FunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            }
            | StmtKind::AsyncFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            } => {
                // Decorators, annotations, and defaults resolve in the
                // enclosing scope.
                for decorator in decorator_list {
                    self.visit_expr(decorator);
                }
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

                self.enter_scope(NodeWithScopeKey::Stmt(RefEquality(stmt)));
                self.visit_body(body);
                self.leave_scope();
            }
            StmtKind::ClassDef {
                bases,
                keywords,
                body,
                decorator_list,
                ..
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

                self.enter_scope(NodeWithScopeKey::Stmt(RefEquality(stmt)));
                self.visit_body(body);
                self.leave_scope();
            }
            StmtKind::Global { .. } | StmtKind::Nonlocal { .. } | StmtKind::Import { .. } => {}
            StmtKind::ImportFrom { .. } => {}
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'c Expr) {
        match &expr.node {
            ExprKind::Name { id, ctx } => match ctx {
                ExprContext::Load | ExprContext::Del => self.resolve_name(expr, id),
                ExprContext::Store => {}
            },
            ExprKind::Attribute { value, attr, .. } => {
                self.visit_expr(value);
                if let Some(&qualifier) =
                    self.builder.symbols_by_node.get(&RefEquality(value.as_ref()))
                {
                    let kind = if self.builder.lhs_expressions.contains(&RefEquality(expr)) {
                        UsageKind::AssignmentLhs
                    } else {
                        UsageKind::Other
                    };
                    self.builder.record_member_usage(qualifier, attr, expr, kind);
                }
            }
            ExprKind::Lambda { args, body } => {
                for default in args.kw_defaults.iter().chain(&args.defaults) {
                    self.visit_expr(default);
                }
                self.enter_scope(NodeWithScopeKey::Expr(RefEquality(expr)));
                self.visit_expr(body);
                self.leave_scope();
            }
            ExprKind::ListComp { elt, generators }
            | ExprKind::SetComp { elt, generators }
            | ExprKind::GeneratorExp { elt, generators } => {
                self.resolve_comprehension(expr, generators, |resolver| resolver.visit_expr(elt));
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.resolve_comprehension(expr, generators, |resolver| {
                    resolver.visit_expr(key);
                    resolver.visit_expr(value);
                });
            }
            _ => walk_expr(self, expr),
        }
    }
}

impl<'a, 'b> ReferenceResolver<'a, 'b> {
    /// The outermost iterable resolves in the enclosing scope; the targets,
    /// conditions, remaining generators, and element all resolve in the
    /// comprehension scope.
    fn resolve_comprehension<'c>(
        &mut self,
        expr: &'c Expr,
        generators: &'c [rustpython_parser::ast::Comprehension],
        visit_element: impl FnOnce(&mut Self),
    ) where
        'c: 'a,
    {
        let Some((first, rest)) = generators.split_first() else {
            unreachable!("a comprehension always has at least one generator");
        };

        self.visit_expr(&first.iter);
        self.enter_scope(NodeWithScopeKey::Expr(RefEquality(expr)));
        self.visit_expr(&first.target);
        for condition in &first.ifs {
            self.visit_expr(condition);
        }
        for generator in rest {
            self.visit_expr(&generator.iter);
            self.visit_expr(&generator.target);
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
        visit_element(self);
        self.leave_scope();
    }
}
