//! The shallow type lattice.
//!
//! Inference here answers exactly two downstream questions — "can this
//! expression only be a given builtin type?" and "can this value have a given
//! member?" — plus identity comparability. Anything uncertain is [`Any`],
//! which answers the first pessimistically with `false` and the second with
//! `true`, so rules stay silent rather than wrong.
//!
//! [`Any`]: InferredType::Any

use crate::semantic_index::symbol::SymbolId;

/// Nominal tags for the builtin types the inferencer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinTag {
    Bool,
    Bytes,
    Complex,
    Dict,
    Float,
    FrozenSet,
    Int,
    List,
    NoneType,
    Set,
    Str,
    Tuple,
}

impl BuiltinTag {
    /// The builtin class backing this tag, as named in the builtin
    /// namespace.
    pub fn class_name(self) -> &'static str {
        match self {
            BuiltinTag::Bool => "bool",
            BuiltinTag::Bytes => "bytes",
            BuiltinTag::Complex => "complex",
            BuiltinTag::Dict => "dict",
            BuiltinTag::Float => "float",
            BuiltinTag::FrozenSet => "frozenset",
            BuiltinTag::Int => "int",
            BuiltinTag::List => "list",
            BuiltinTag::NoneType => "NoneType",
            BuiltinTag::Set => "set",
            BuiltinTag::Str => "str",
            BuiltinTag::Tuple => "tuple",
        }
    }

    /// The tag for a builtin constructor name (`list`, `int`, …), if any.
    pub fn from_class_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => BuiltinTag::Bool,
            "bytes" => BuiltinTag::Bytes,
            "complex" => BuiltinTag::Complex,
            "dict" => BuiltinTag::Dict,
            "float" => BuiltinTag::Float,
            "frozenset" => BuiltinTag::FrozenSet,
            "int" => BuiltinTag::Int,
            "list" => BuiltinTag::List,
            "set" => BuiltinTag::Set,
            "str" => BuiltinTag::Str,
            "tuple" => BuiltinTag::Tuple,
            _ => return None,
        })
    }
}

/// The result of shallow inference for one expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, is_macro::Is)]
pub enum InferredType {
    /// Nothing is known. The pessimistic answer to every question.
    #[default]
    Any,
    /// Definitely an instance of the tagged builtin type.
    Builtin(BuiltinTag),
    /// An instance of the class bound to the given class symbol.
    Instance(SymbolId),
    /// A function object (the symbol of its declaration).
    Callable(SymbolId),
}

impl InferredType {
    /// Whether the expression is certain to be an instance of `tag`.
    #[must_use]
    pub fn can_only_be(self, tag: BuiltinTag) -> bool {
        matches!(self, InferredType::Builtin(t) if t == tag)
    }

    /// Whether `is`-comparing a value of this type with one of `other` can
    /// ever be meaningful. Only two *distinct* known builtin types are
    /// certain never to be identical.
    #[must_use]
    pub fn is_identity_comparable_with(self, other: InferredType) -> bool {
        match (self, other) {
            (InferredType::Builtin(left), InferredType::Builtin(right)) => left == right,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{BuiltinTag, InferredType};

    #[test_case(BuiltinTag::Int, "int")]
    #[test_case(BuiltinTag::NoneType, "NoneType")]
    #[test_case(BuiltinTag::FrozenSet, "frozenset")]
    fn tag_names(tag: BuiltinTag, name: &str) {
        assert_eq!(tag.class_name(), name);
    }

    #[test]
    fn tag_round_trip() {
        for tag in [
            BuiltinTag::Bool,
            BuiltinTag::Dict,
            BuiltinTag::Int,
            BuiltinTag::Str,
            BuiltinTag::Tuple,
        ] {
            assert_eq!(BuiltinTag::from_class_name(tag.class_name()), Some(tag));
        }
        // `NoneType` is not a constructor name.
        assert_eq!(BuiltinTag::from_class_name("NoneType"), None);
    }

    #[test]
    fn any_is_pessimistic() {
        assert!(!InferredType::Any.can_only_be(BuiltinTag::Int));
        assert!(InferredType::Any.is_identity_comparable_with(InferredType::Builtin(BuiltinTag::Str)));
    }

    #[test]
    fn distinct_builtins_are_never_identical() {
        let int = InferredType::Builtin(BuiltinTag::Int);
        let string = InferredType::Builtin(BuiltinTag::Str);
        assert!(!int.is_identity_comparable_with(string));
        assert!(int.is_identity_comparable_with(int));
    }
}
