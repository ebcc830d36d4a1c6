//! Symbols: one per bound name per scope, plus the derived symbols behind
//! qualified expressions and instance attributes.
//!
//! A symbol is a closed tagged union over four kinds. `Other` covers plain
//! variables, parameters, and import aliases; `Function` and `Class` carry
//! their declaration data; `Ambiguous` carries the alternatives of a name
//! bound to several competing declarations. Cross-symbol edges (base
//! classes, members, alternatives, children) are arena indices, never owning
//! references, so cyclic hierarchies cost nothing to drop and resolution is
//! a pure relational lookup.

use bitflags::bitflags;
use rustc_hash::FxHashSet;
use rustpython_parser::ast::{Alias, Arg, Arguments, Excepthandler, Expr, Pattern, Stmt};

use crate::node_ref::Range;
use crate::semantic_index::scope::ScopeId;
use crate::types::InferredType;
use crate::FxIndexMap;

/// Identifies a symbol within one file's symbol arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub(crate) fn from_usize(index: usize) -> Self {
        Self(u32::try_from(index).expect("symbol arena exceeds u32"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub(crate) struct SymbolFlags: u8 {
        /// Seeded from the built-in namespace.
        const BUILTIN            = 1 << 0;
        /// Materialized from a stub or global-symbol index summary.
        const STUB               = 1 << 1;
        /// The implicit-instance parameter of a method.
        const SELF_PARAMETER     = 1 << 2;
        /// Discovered through `self.<attr>` assignments.
        const INSTANCE_ATTRIBUTE = 1 << 3;
    }
}

/// How a name is used at one site. Everything except [`UsageKind::Other`]
/// binds the name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, is_macro::Is)]
pub enum UsageKind {
    AssignmentLhs,
    CompoundAssignmentLhs,
    CompDeclaration,
    LoopDeclaration,
    Parameter,
    Import,
    FuncDeclaration,
    ClassDeclaration,
    ExceptionInstance,
    WithInstance,
    GlobalDeclaration,
    Other,
}

impl UsageKind {
    pub const fn is_binding(self) -> bool {
        !matches!(self, UsageKind::Other)
    }
}

/// The syntax node a usage hangs off. Declarations, parameters, and import
/// aliases have no name expression of their own, so the anchor is the
/// closest enclosing node that carries the name.
#[derive(Copy, Clone, Debug)]
pub enum UsageNode<'a> {
    Expr(&'a Expr),
    Stmt(&'a Stmt),
    Arg(&'a Arg),
    Alias(&'a Alias),
    ExceptHandler(&'a Excepthandler),
    Pattern(&'a Pattern),
}

impl<'a> UsageNode<'a> {
    pub fn range(&self) -> Range {
        match self {
            UsageNode::Expr(node) => Range::from_located(node),
            UsageNode::Stmt(node) => Range::from_located(node),
            UsageNode::Arg(node) => Range::from_located(node),
            UsageNode::Alias(node) => Range::from_located(node),
            UsageNode::ExceptHandler(node) => Range::from_located(node),
            UsageNode::Pattern(node) => Range::from_located(node),
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            UsageNode::Expr(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            UsageNode::Stmt(node) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn same_node(&self, other: &UsageNode<'a>) -> bool {
        match (self, other) {
            (UsageNode::Expr(left), UsageNode::Expr(right)) => std::ptr::eq(*left, *right),
            (UsageNode::Stmt(left), UsageNode::Stmt(right)) => std::ptr::eq(*left, *right),
            (UsageNode::Arg(left), UsageNode::Arg(right)) => std::ptr::eq(*left, *right),
            (UsageNode::Alias(left), UsageNode::Alias(right)) => std::ptr::eq(*left, *right),
            (UsageNode::ExceptHandler(left), UsageNode::ExceptHandler(right)) => {
                std::ptr::eq(*left, *right)
            }
            (UsageNode::Pattern(left), UsageNode::Pattern(right)) => std::ptr::eq(*left, *right),
            _ => false,
        }
    }
}

/// One use site of a symbol, in source order within its recording pass.
#[derive(Copy, Clone, Debug)]
pub struct Usage<'a> {
    pub(crate) node: UsageNode<'a>,
    pub(crate) kind: UsageKind,
}

impl<'a> Usage<'a> {
    pub fn node(&self) -> &UsageNode<'a> {
        &self.node
    }

    pub fn kind(&self) -> UsageKind {
        self.kind
    }

    pub fn range(&self) -> Range {
        self.node.range()
    }

    pub fn is_binding(&self) -> bool {
        self.kind.is_binding()
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub(crate) struct ParameterFlags: u8 {
        const HAS_DEFAULT     = 1 << 0;
        const VARARG          = 1 << 1;
        const KWARG           = 1 << 2;
        const KEYWORD_ONLY    = 1 << 3;
        const POSITIONAL_ONLY = 1 << 4;
        const SELF            = 1 << 5;
    }
}

/// One declared parameter of a function or lambda.
#[derive(Clone, Debug)]
pub struct Parameter<'a> {
    pub(crate) name: &'a str,
    pub(crate) annotation: Option<&'a Expr>,
    pub(crate) declared_type: InferredType,
    pub(crate) flags: ParameterFlags,
    pub(crate) location: Range,
}

impl<'a> Parameter<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn annotation(&self) -> Option<&'a Expr> {
        self.annotation
    }

    /// The type this parameter is declared to accept; [`InferredType::Any`]
    /// when unannotated or the annotation is not understood.
    pub fn declared_type(&self) -> InferredType {
        self.declared_type
    }

    pub fn has_default(&self) -> bool {
        self.flags.contains(ParameterFlags::HAS_DEFAULT)
    }

    /// `*args`.
    pub fn is_vararg(&self) -> bool {
        self.flags.contains(ParameterFlags::VARARG)
    }

    /// `**kwargs`.
    pub fn is_kwarg(&self) -> bool {
        self.flags.contains(ParameterFlags::KWARG)
    }

    pub fn is_keyword_only(&self) -> bool {
        self.flags.contains(ParameterFlags::KEYWORD_ONLY)
    }

    pub fn is_positional_only(&self) -> bool {
        self.flags.contains(ParameterFlags::POSITIONAL_ONLY)
    }

    /// The implicit-instance parameter of a method.
    pub fn is_self(&self) -> bool {
        self.flags.contains(ParameterFlags::SELF)
    }

    pub fn location(&self) -> Range {
        self.location
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub(crate) struct FunctionFlags: u8 {
        const ASYNC     = 1 << 0;
        const METHOD    = 1 << 1;
        const DECORATED = 1 << 2;
        /// Materialized from an index summary: the signature is unknown and
        /// arity-style checks must decline.
        const STUB      = 1 << 3;
    }
}

/// Declaration data of a function symbol.
#[derive(Clone, Debug)]
pub struct FunctionSymbol<'a> {
    pub(crate) parameters: Vec<Parameter<'a>>,
    pub(crate) returns: Option<&'a Expr>,
    pub(crate) flags: FunctionFlags,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) location: Range,
}

impl<'a> FunctionSymbol<'a> {
    pub fn parameters(&self) -> &[Parameter<'a>] {
        &self.parameters
    }

    pub fn return_annotation(&self) -> Option<&'a Expr> {
        self.returns
    }

    pub fn is_async(&self) -> bool {
        self.flags.contains(FunctionFlags::ASYNC)
    }

    pub fn is_method(&self) -> bool {
        self.flags.contains(FunctionFlags::METHOD)
    }

    pub fn has_decorators(&self) -> bool {
        self.flags.contains(FunctionFlags::DECORATED)
    }

    /// Whether the signature came from a summary rather than a declaration
    /// in this file; parameters are unknown in that case.
    pub fn has_unknown_signature(&self) -> bool {
        self.flags.contains(FunctionFlags::STUB)
    }

    /// The scope of the function body, when declared in this file.
    pub fn body_scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn definition_location(&self) -> Range {
        self.location
    }
}

/// One base-class slot of a class declaration. `symbol` stays empty when the
/// base expression did not resolve to a class in this file's table.
#[derive(Clone, Debug)]
pub struct BaseClass<'a> {
    pub(crate) node: Option<&'a Expr>,
    pub(crate) symbol: Option<SymbolId>,
}

impl<'a> BaseClass<'a> {
    pub fn node(&self) -> Option<&'a Expr> {
        self.node
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        self.symbol
    }
}

/// Declaration data of a class symbol.
#[derive(Clone, Debug)]
pub struct ClassSymbol<'a> {
    pub(crate) bases: Vec<BaseClass<'a>>,
    pub(crate) members: Vec<SymbolId>,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) location: Range,
    /// The member set is known to be partial (an opaque index summary).
    pub(crate) incomplete: bool,
}

impl<'a> ClassSymbol<'a> {
    pub fn bases(&self) -> &[BaseClass<'a>] {
        &self.bases
    }

    /// Class-body names unified with non-shadowed instance attributes.
    pub fn members(&self) -> &[SymbolId] {
        &self.members
    }

    /// The scope of the class body, when declared in this file.
    pub fn body_scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn definition_location(&self) -> Range {
        self.location
    }

    /// Whether any base failed to resolve to a class symbol. Member lookups
    /// answer "unknown" instead of "absent" past such a base.
    pub fn has_unresolved_bases(&self) -> bool {
        self.bases.iter().any(|base| base.symbol.is_none())
    }
}

/// The result of a class member lookup. "Unknown" (an unresolved base or an
/// incomplete summary on the lookup path) is distinct from "absent" so rules
/// can decline to report rather than guess.
#[derive(Copy, Clone, Debug, PartialEq, Eq, is_macro::Is)]
pub enum MemberResult {
    Found(SymbolId),
    Unknown,
    Absent,
}

/// Depth-first member lookup through `class` and its resolved bases, in
/// declaration order, tolerating cyclic hierarchies.
pub(crate) fn resolve_member_in<'a>(
    symbols: &[Symbol<'a>],
    class: &ClassSymbol<'a>,
    name: &str,
) -> MemberResult {
    let mut visited = FxHashSet::default();
    let mut unknown = false;
    if let Some(found) = lookup(symbols, class, name, &mut visited, &mut unknown) {
        MemberResult::Found(found)
    } else if unknown {
        MemberResult::Unknown
    } else {
        MemberResult::Absent
    }
}

fn lookup<'a>(
    symbols: &[Symbol<'a>],
    class: &ClassSymbol<'a>,
    name: &str,
    visited: &mut FxHashSet<SymbolId>,
    unknown: &mut bool,
) -> Option<SymbolId> {
    if let Some(member) = class
        .members
        .iter()
        .copied()
        .find(|&member| symbols[member.index()].name() == name)
    {
        return Some(member);
    }
    if class.incomplete {
        *unknown = true;
    }
    for base in &class.bases {
        let Some(base_id) = base.symbol else {
            *unknown = true;
            continue;
        };
        if !visited.insert(base_id) {
            continue;
        }
        match symbols[base_id.index()].kind() {
            SymbolKind::Class(base_class) => {
                if let Some(found) = lookup(symbols, base_class, name, visited, unknown) {
                    return Some(found);
                }
            }
            _ => *unknown = true,
        }
    }
    None
}

/// The four symbol kinds. Downstream rules switch on this.
#[derive(Clone, Debug, is_macro::Is)]
pub enum SymbolKind<'a> {
    Other,
    Function(FunctionSymbol<'a>),
    Class(ClassSymbol<'a>),
    Ambiguous(Vec<SymbolId>),
}

#[derive(Debug)]
pub struct Symbol<'a> {
    pub(crate) name: &'a str,
    pub(crate) fully_qualified_name: Option<String>,
    pub(crate) flags: SymbolFlags,
    pub(crate) usages: Vec<Usage<'a>>,
    /// Derived sub-symbols for qualified reads and writes (`<self>.n`,
    /// `module.n`), keyed by member name in discovery order.
    pub(crate) children: FxIndexMap<&'a str, SymbolId>,
    /// Declared annotation from an annotated assignment, when any.
    pub(crate) annotation: Option<&'a Expr>,
    pub(crate) kind: SymbolKind<'a>,
}

impl<'a> Symbol<'a> {
    pub(crate) fn new(name: &'a str) -> Self {
        Self {
            name,
            fully_qualified_name: None,
            flags: SymbolFlags::empty(),
            usages: Vec::new(),
            children: FxIndexMap::default(),
            annotation: None,
            kind: SymbolKind::Other,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Dotted path from the module root; `None` for function locals and
    /// other unqualifiable bindings.
    pub fn fully_qualified_name(&self) -> Option<&str> {
        self.fully_qualified_name.as_deref()
    }

    pub fn kind(&self) -> &SymbolKind<'a> {
        &self.kind
    }

    pub fn usages(&self) -> &[Usage<'a>] {
        &self.usages
    }

    pub fn binding_usages(&self) -> impl Iterator<Item = &Usage<'a>> + '_ {
        self.usages.iter().filter(|usage| usage.is_binding())
    }

    pub(crate) fn binding_usage_count(&self) -> usize {
        self.binding_usages().count()
    }

    /// The alternatives of an ambiguous symbol; empty for the other kinds.
    pub fn alternatives(&self) -> &[SymbolId] {
        match &self.kind {
            SymbolKind::Ambiguous(alternatives) => alternatives,
            _ => &[],
        }
    }

    pub fn as_function(&self) -> Option<&FunctionSymbol<'a>> {
        match &self.kind {
            SymbolKind::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassSymbol<'a>> {
        match &self.kind {
            SymbolKind::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Seeded from the built-in namespace.
    pub fn is_builtin(&self) -> bool {
        self.flags.contains(SymbolFlags::BUILTIN)
    }

    /// The implicit-instance parameter of a method.
    pub fn is_self_parameter(&self) -> bool {
        self.flags.contains(SymbolFlags::SELF_PARAMETER)
    }

    /// Aggregated from `self.<attr>` assignments.
    pub fn is_instance_attribute(&self) -> bool {
        self.flags.contains(SymbolFlags::INSTANCE_ATTRIBUTE)
    }

    /// Declared annotation from an annotated assignment, when any.
    pub fn declared_annotation(&self) -> Option<&'a Expr> {
        self.annotation
    }

    /// The derived sub-symbols recorded for qualified expressions under this
    /// symbol, in discovery order.
    pub fn child_symbols(&self) -> impl ExactSizeIterator<Item = (&'a str, SymbolId)> + '_ {
        self.children.iter().map(|(&name, &id)| (name, id))
    }

    pub(crate) fn push_usage_deduplicated(&mut self, usage: Usage<'a>) {
        if self
            .usages
            .iter()
            .any(|existing| existing.node.same_node(&usage.node))
        {
            return;
        }
        self.usages.push(usage);
    }
}

/// Builds the parameter list of a function or lambda declaration. `defaults`
/// and `kw_defaults` align with the tails of the positional and keyword-only
/// parameter lists respectively.
pub(crate) fn parameters_from_arguments<'a>(
    arguments: &'a Arguments,
    is_method: bool,
) -> Vec<Parameter<'a>> {
    let mut parameters = Vec::new();

    let positional_count = arguments.posonlyargs.len() + arguments.args.len();
    let defaults_start = positional_count - arguments.defaults.len();
    for (index, arg) in arguments
        .posonlyargs
        .iter()
        .chain(&arguments.args)
        .enumerate()
    {
        let mut flags = ParameterFlags::empty();
        if index < arguments.posonlyargs.len() {
            flags |= ParameterFlags::POSITIONAL_ONLY;
        }
        if index >= defaults_start {
            flags |= ParameterFlags::HAS_DEFAULT;
        }
        if is_method && index == 0 {
            flags |= ParameterFlags::SELF;
        }
        parameters.push(Parameter {
            name: &arg.node.arg,
            annotation: arg.node.annotation.as_deref(),
            declared_type: InferredType::Any,
            flags,
            location: Range::from_located(arg),
        });
    }

    if let Some(arg) = &arguments.vararg {
        parameters.push(Parameter {
            name: &arg.node.arg,
            annotation: arg.node.annotation.as_deref(),
            declared_type: InferredType::Any,
            flags: ParameterFlags::VARARG,
            location: Range::from_located(arg),
        });
    }

    let kw_defaults_start = arguments.kwonlyargs.len() - arguments.kw_defaults.len();
    for (index, arg) in arguments.kwonlyargs.iter().enumerate() {
        let mut flags = ParameterFlags::KEYWORD_ONLY;
        if index >= kw_defaults_start {
            flags |= ParameterFlags::HAS_DEFAULT;
        }
        parameters.push(Parameter {
            name: &arg.node.arg,
            annotation: arg.node.annotation.as_deref(),
            declared_type: InferredType::Any,
            flags,
            location: Range::from_located(arg),
        });
    }

    if let Some(arg) = &arguments.kwarg {
        parameters.push(Parameter {
            name: &arg.node.arg,
            annotation: arg.node.annotation.as_deref(),
            declared_type: InferredType::Any,
            flags: ParameterFlags::KWARG,
            location: Range::from_located(arg),
        });
    }

    parameters
}
