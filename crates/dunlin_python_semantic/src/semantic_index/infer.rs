//! The shallow type-inference pass.
//!
//! A third traversal tags every expression with an [`InferredType`], built
//! from three sources only: literal kinds, declared annotations, and the
//! kind of the symbol a name resolves to. There is no dataflow; a name
//! whose type would require tracking assignments stays `Any`.

use rustpython_parser::ast::{Cmpop, Constant, Expr, ExprKind, Operator, Stmt, Unaryop};

use crate::node_ref::RefEquality;
use crate::semantic_index::builder::SemanticIndexBuilder;
use crate::semantic_index::symbol::{SymbolId, SymbolKind};
use crate::types::{BuiltinTag, InferredType};
use crate::visitor::{walk_stmt, Visitor};

pub(super) fn run<'a>(builder: &mut SemanticIndexBuilder<'a>, module: &'a [Stmt]) {
    TypeInferencer { builder }.visit_body(module);
    finalize_parameter_types(builder);
}

struct TypeInferencer<'a, 'b> {
    builder: &'b mut SemanticIndexBuilder<'a>,
}

impl<'a, 'b, 'c> Visitor<'c> for TypeInferencer<'a, 'b>
where
    'c: 'a,
{
    fn visit_stmt(&mut self, stmt: &'c Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'c Expr) {
        self.infer_expr(expr);
    }

    fn visit_annotation(&mut self, _expr: &'c Expr) {
        // Annotations are declarations, not evaluated expressions; they are
        // parsed on demand by `annotation_type`.
    }
}

impl<'a, 'b> TypeInferencer<'a, 'b> {
    /// Computes, records, and returns the type of `expr`, recursing into
    /// its children.
    fn infer_expr(&mut self, expr: &'a Expr) -> InferredType {
        let inferred = match &expr.node {
            ExprKind::Constant { value, .. } => constant_type(value),
            ExprKind::JoinedStr { values } => {
                for value in values {
                    self.infer_expr(value);
                }
                InferredType::Builtin(BuiltinTag::Str)
            }
            ExprKind::FormattedValue {
                value, format_spec, ..
            } => {
                self.infer_expr(value);
                if let Some(format_spec) = format_spec {
                    self.infer_expr(format_spec);
                }
                InferredType::Any
            }
            ExprKind::List { elts, .. } => {
                self.infer_all(elts);
                InferredType::Builtin(BuiltinTag::List)
            }
            ExprKind::Tuple { elts, .. } => {
                self.infer_all(elts);
                InferredType::Builtin(BuiltinTag::Tuple)
            }
            ExprKind::Set { elts } => {
                self.infer_all(elts);
                InferredType::Builtin(BuiltinTag::Set)
            }
            ExprKind::Dict { keys, values } => {
                for key in keys.iter() {
                    self.infer_expr(key);
                }
                self.infer_all(values);
                InferredType::Builtin(BuiltinTag::Dict)
            }
            ExprKind::ListComp { .. } => {
                self.infer_nested(expr);
                InferredType::Builtin(BuiltinTag::List)
            }
            ExprKind::SetComp { .. } => {
                self.infer_nested(expr);
                InferredType::Builtin(BuiltinTag::Set)
            }
            ExprKind::DictComp { .. } => {
                self.infer_nested(expr);
                InferredType::Builtin(BuiltinTag::Dict)
            }
            ExprKind::GeneratorExp { .. } => {
                self.infer_nested(expr);
                InferredType::Any
            }
            ExprKind::Name { id: _, ctx: _ } => symbol_type(self.builder, expr),
            ExprKind::Call { func, args, keywords } => {
                self.infer_expr(func);
                self.infer_all(args);
                for keyword in keywords {
                    self.infer_expr(&keyword.node.value);
                }
                call_type(self.builder, func)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand_type = self.infer_expr(operand);
                match op {
                    Unaryop::Not => InferredType::Builtin(BuiltinTag::Bool),
                    Unaryop::UAdd | Unaryop::USub | Unaryop::Invert => match operand_type {
                        InferredType::Builtin(
                            tag @ (BuiltinTag::Int | BuiltinTag::Float | BuiltinTag::Complex),
                        ) => InferredType::Builtin(tag),
                        _ => InferredType::Any,
                    },
                }
            }
            ExprKind::BinOp { left, op, right } => {
                let left_type = self.infer_expr(left);
                let right_type = self.infer_expr(right);
                binary_op_type(op, left_type, right_type)
            }
            ExprKind::BoolOp { values, .. } => {
                self.infer_all(values);
                InferredType::Any
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                self.infer_expr(left);
                self.infer_all(comparators);
                let certain_bool = ops.iter().all(|op| {
                    matches!(op, Cmpop::Is | Cmpop::IsNot | Cmpop::In | Cmpop::NotIn)
                });
                if certain_bool {
                    InferredType::Builtin(BuiltinTag::Bool)
                } else {
                    // Rich comparisons may return anything.
                    InferredType::Any
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.infer_expr(test);
                let body_type = self.infer_expr(body);
                let orelse_type = self.infer_expr(orelse);
                if body_type == orelse_type {
                    body_type
                } else {
                    InferredType::Any
                }
            }
            ExprKind::NamedExpr { target: _, value } => self.infer_expr(value),
            _ => {
                self.infer_nested(expr);
                InferredType::Any
            }
        };

        self.builder
            .types_by_expression
            .insert(RefEquality(expr), inferred);
        inferred
    }

    fn infer_all(&mut self, exprs: &'a [Expr]) {
        for expr in exprs {
            self.infer_expr(expr);
        }
    }

    /// Recurses into children through the generic walk, for kinds whose own
    /// type is `Any` but whose subexpressions still need tagging.
    fn infer_nested(&mut self, expr: &'a Expr) {
        crate::visitor::walk_expr(self, expr);
    }
}

fn constant_type(value: &Constant) -> InferredType {
    match value {
        Constant::None => InferredType::Builtin(BuiltinTag::NoneType),
        Constant::Bool(_) => InferredType::Builtin(BuiltinTag::Bool),
        Constant::Str(_) => InferredType::Builtin(BuiltinTag::Str),
        Constant::Bytes(_) => InferredType::Builtin(BuiltinTag::Bytes),
        Constant::Int(_) => InferredType::Builtin(BuiltinTag::Int),
        Constant::Float(_) => InferredType::Builtin(BuiltinTag::Float),
        Constant::Complex { .. } => InferredType::Builtin(BuiltinTag::Complex),
        Constant::Tuple(_) => InferredType::Builtin(BuiltinTag::Tuple),
        Constant::Ellipsis => InferredType::Any,
    }
}

/// The type of a name read, from the kind of the symbol it resolved to.
fn symbol_type(builder: &SemanticIndexBuilder, expr: &Expr) -> InferredType {
    let Some(&symbol_id) = builder.symbols_by_node.get(&RefEquality(expr)) else {
        return InferredType::Any;
    };
    let symbol = &builder.symbols[symbol_id.index()];
    match symbol.kind() {
        SymbolKind::Class(_) => InferredType::Instance(symbol_id),
        SymbolKind::Function(_) => InferredType::Callable(symbol_id),
        SymbolKind::Ambiguous(_) => InferredType::Any,
        SymbolKind::Other => {
            if symbol.is_self_parameter() {
                self_instance_type(builder, symbol_id)
            } else if let Some(annotation) = symbol.declared_annotation() {
                annotation_type(builder, annotation)
            } else {
                InferredType::Any
            }
        }
    }
}

/// The instance type seen through a method's implicit-instance parameter.
fn self_instance_type(builder: &SemanticIndexBuilder, symbol_id: SymbolId) -> InferredType {
    let Some(&class_scope) = builder.self_class_scopes.get(&symbol_id) else {
        return InferredType::Any;
    };
    let Some(owner) = builder.scopes[class_scope.index()].owner() else {
        return InferredType::Any;
    };
    if builder.symbols[owner.index()].kind().is_class() {
        InferredType::Instance(owner)
    } else {
        InferredType::Any
    }
}

/// The type of a call, from the kind of the symbol the callee resolved to:
/// calling a class yields an instance of it (a builtin class yields its
/// tag), calling a function yields its declared return type.
fn call_type(builder: &SemanticIndexBuilder, func: &Expr) -> InferredType {
    let Some(&callee) = builder.symbols_by_node.get(&RefEquality(func)) else {
        return InferredType::Any;
    };
    let symbol = &builder.symbols[callee.index()];
    match symbol.kind() {
        SymbolKind::Class(_) => {
            if let Some(tag) = symbol
                .fully_qualified_name()
                .and_then(BuiltinTag::from_class_name)
            {
                InferredType::Builtin(tag)
            } else {
                InferredType::Instance(callee)
            }
        }
        SymbolKind::Function(function) => function
            .return_annotation()
            .map_or(InferredType::Any, |annotation| {
                annotation_type(builder, annotation)
            }),
        SymbolKind::Ambiguous(_) | SymbolKind::Other => InferredType::Any,
    }
}

fn numeric_rank(tag: BuiltinTag) -> Option<u8> {
    match tag {
        BuiltinTag::Bool | BuiltinTag::Int => Some(1),
        BuiltinTag::Float => Some(2),
        BuiltinTag::Complex => Some(3),
        _ => None,
    }
}

fn binary_op_type(op: &Operator, left: InferredType, right: InferredType) -> InferredType {
    let (InferredType::Builtin(left), InferredType::Builtin(right)) = (left, right) else {
        return InferredType::Any;
    };

    if let (Some(left_rank), Some(right_rank)) = (numeric_rank(left), numeric_rank(right)) {
        let joined = match left_rank.max(right_rank) {
            1 => BuiltinTag::Int,
            2 => BuiltinTag::Float,
            _ => BuiltinTag::Complex,
        };
        return match op {
            Operator::Add
            | Operator::Sub
            | Operator::Mult
            | Operator::Mod
            | Operator::Pow
            | Operator::FloorDiv => InferredType::Builtin(joined),
            Operator::Div => InferredType::Builtin(if joined == BuiltinTag::Complex {
                BuiltinTag::Complex
            } else {
                BuiltinTag::Float
            }),
            Operator::LShift
            | Operator::RShift
            | Operator::BitOr
            | Operator::BitXor
            | Operator::BitAnd
                if joined == BuiltinTag::Int =>
            {
                InferredType::Builtin(BuiltinTag::Int)
            }
            _ => InferredType::Any,
        };
    }

    match (op, left, right) {
        (Operator::Add, BuiltinTag::Str, BuiltinTag::Str) => {
            InferredType::Builtin(BuiltinTag::Str)
        }
        (Operator::Add, BuiltinTag::Bytes, BuiltinTag::Bytes) => {
            InferredType::Builtin(BuiltinTag::Bytes)
        }
        (Operator::Add, BuiltinTag::List, BuiltinTag::List) => {
            InferredType::Builtin(BuiltinTag::List)
        }
        (Operator::Add, BuiltinTag::Tuple, BuiltinTag::Tuple) => {
            InferredType::Builtin(BuiltinTag::Tuple)
        }
        _ => InferredType::Any,
    }
}

/// Parses an annotation expression into a nominal type. Unrecognized shapes
/// (string annotations, unions, unresolved names) stay `Any`.
pub(super) fn annotation_type(builder: &SemanticIndexBuilder, expr: &Expr) -> InferredType {
    match &expr.node {
        ExprKind::Name { id, .. } => {
            if let Some(&symbol_id) = builder.symbols_by_node.get(&RefEquality(expr)) {
                let symbol = &builder.symbols[symbol_id.index()];
                if let Some(fqn) = symbol.fully_qualified_name() {
                    if let Some(tag) = BuiltinTag::from_class_name(fqn) {
                        return InferredType::Builtin(tag);
                    }
                    if let Some(rest) = fqn.strip_prefix("typing.") {
                        if let Some(tag) = typing_container(rest) {
                            return InferredType::Builtin(tag);
                        }
                    }
                }
                if symbol.kind().is_class() {
                    return InferredType::Instance(symbol_id);
                }
            }
            // Unresolved: fall back to the spelling.
            BuiltinTag::from_class_name(id)
                .or_else(|| typing_container(id))
                .map_or(InferredType::Any, InferredType::Builtin)
        }
        ExprKind::Constant {
            value: Constant::None,
            ..
        } => InferredType::Builtin(BuiltinTag::NoneType),
        ExprKind::Subscript { value, .. } => match annotation_type(builder, value) {
            parameterized @ (InferredType::Builtin(_) | InferredType::Instance(_)) => {
                parameterized
            }
            _ => InferredType::Any,
        },
        ExprKind::Attribute { attr, .. } => typing_container(attr)
            .map_or(InferredType::Any, InferredType::Builtin),
        _ => InferredType::Any,
    }
}

/// `typing` spellings of the builtin containers.
fn typing_container(name: &str) -> Option<BuiltinTag> {
    Some(match name {
        "Dict" => BuiltinTag::Dict,
        "FrozenSet" => BuiltinTag::FrozenSet,
        "List" => BuiltinTag::List,
        "Set" => BuiltinTag::Set,
        "Text" => BuiltinTag::Str,
        "Tuple" => BuiltinTag::Tuple,
        _ => return None,
    })
}

/// Pulls each function parameter's declared type from its annotation; the
/// implicit-instance parameter types as an instance of its class.
fn finalize_parameter_types(builder: &mut SemanticIndexBuilder) {
    let mut updates: Vec<(usize, usize, InferredType)> = Vec::new();

    for (symbol_index, symbol) in builder.symbols.iter().enumerate() {
        let SymbolKind::Function(function) = symbol.kind() else {
            continue;
        };
        for (parameter_index, parameter) in function.parameters().iter().enumerate() {
            let declared = if parameter.is_self() {
                method_instance_type(builder, function.body_scope())
            } else if let Some(annotation) = parameter.annotation() {
                annotation_type(builder, annotation)
            } else {
                continue;
            };
            if !declared.is_any() {
                updates.push((symbol_index, parameter_index, declared));
            }
        }
    }

    for (symbol_index, parameter_index, declared) in updates {
        if let SymbolKind::Function(function) = &mut builder.symbols[symbol_index].kind {
            function.parameters[parameter_index].declared_type = declared;
        }
    }
}

fn method_instance_type(
    builder: &SemanticIndexBuilder,
    body_scope: Option<crate::semantic_index::scope::ScopeId>,
) -> InferredType {
    let Some(class_scope) = body_scope.and_then(|scope| builder.scopes[scope.index()].parent())
    else {
        return InferredType::Any;
    };
    let Some(owner) = builder.scopes[class_scope.index()].owner() else {
        return InferredType::Any;
    };
    if builder.symbols[owner.index()].kind().is_class() {
        InferredType::Instance(owner)
    } else {
        InferredType::Any
    }
}
