//! Precomputed symbol summaries for modules outside the analyzed file.
//!
//! Two read-only indices feed the builder: the [`StubIndex`], with summaries
//! of the standard library and third-party packages (typeshed-derived), and
//! the [`GlobalSymbolIndex`], with the top-level symbols of the project's own
//! modules. Both are plain data: producing them is a collaborator's job.
//! Every accessor takes `&self`, so a single index can back any number of
//! per-file builders running in parallel.

use rustc_hash::FxHashMap;

use dunlin_python_stdlib::builtins::BUILTINS;

/// A summary of one exported symbol, with its precomputed fully qualified
/// name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubSymbol {
    name: String,
    fully_qualified_name: String,
    kind: StubSymbolKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StubSymbolKind {
    /// A class. `complete` is `false` when the summary does not carry the
    /// member closure; member lookups on such classes answer "unknown"
    /// rather than "absent".
    Class {
        members: Vec<StubSymbol>,
        complete: bool,
    },
    Function,
    Other,
}

impl StubSymbol {
    pub fn class(
        name: impl Into<String>,
        fully_qualified_name: impl Into<String>,
        members: Vec<StubSymbol>,
    ) -> Self {
        Self {
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            kind: StubSymbolKind::Class {
                members,
                complete: true,
            },
        }
    }

    /// A class whose member closure was not summarized.
    pub fn opaque_class(
        name: impl Into<String>,
        fully_qualified_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            kind: StubSymbolKind::Class {
                members: Vec::new(),
                complete: false,
            },
        }
    }

    pub fn function(name: impl Into<String>, fully_qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            kind: StubSymbolKind::Function,
        }
    }

    pub fn other(name: impl Into<String>, fully_qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            kind: StubSymbolKind::Other,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fully_qualified_name(&self) -> &str {
        &self.fully_qualified_name
    }

    pub fn kind(&self) -> &StubSymbolKind {
        &self.kind
    }
}

/// The builtins stub module carries the empty FQN: builtin symbols collapse
/// to their bare names (`print`, not `builtins.print`).
pub(crate) const BUILTINS_MODULE: &str = "";

/// Stub summaries keyed by module FQN.
#[derive(Debug, Default)]
pub struct StubIndex {
    modules: FxHashMap<String, Vec<StubSymbol>>,
}

impl StubIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An index seeded with the built-in namespace only. The summaries are
    /// shallow: builtin classes are opaque (member lookups answer
    /// "unknown"), which keeps downstream member checks pessimistic.
    #[must_use]
    pub fn with_default_builtins() -> Self {
        let mut index = Self::new();
        index.add_module(
            BUILTINS_MODULE,
            BUILTINS.iter().map(|name| builtin_summary(name)).collect(),
        );
        index
    }

    pub fn add_module(&mut self, fqn: impl Into<String>, symbols: Vec<StubSymbol>) {
        self.modules.insert(fqn.into(), symbols);
    }

    /// The symbols of the built-in namespace, if the index carries them.
    #[must_use]
    pub fn builtin_symbols(&self) -> Option<&[StubSymbol]> {
        self.symbols_for_module(BUILTINS_MODULE)
    }

    #[must_use]
    pub fn symbols_for_module(&self, fqn: &str) -> Option<&[StubSymbol]> {
        self.modules.get(fqn).map(Vec::as_slice)
    }

    #[must_use]
    pub fn symbol(&self, module: &str, name: &str) -> Option<&StubSymbol> {
        self.symbols_for_module(module)?
            .iter()
            .find(|symbol| symbol.name() == name)
    }

    #[must_use]
    pub fn contains_module(&self, fqn: &str) -> bool {
        self.modules.contains_key(fqn)
    }
}

/// Top-level symbols of the project's own modules, for cross-file imports.
#[derive(Debug, Default)]
pub struct GlobalSymbolIndex {
    modules: FxHashMap<String, Vec<StubSymbol>>,
}

impl GlobalSymbolIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, fqn: impl Into<String>, symbols: Vec<StubSymbol>) {
        self.modules.insert(fqn.into(), symbols);
    }

    #[must_use]
    pub fn symbols_for_module(&self, fqn: &str) -> Option<&[StubSymbol]> {
        self.modules.get(fqn).map(Vec::as_slice)
    }

    #[must_use]
    pub fn symbol(&self, module: &str, name: &str) -> Option<&StubSymbol> {
        self.symbols_for_module(module)?
            .iter()
            .find(|symbol| symbol.name() == name)
    }

    #[must_use]
    pub fn contains_module(&self, fqn: &str) -> bool {
        self.modules.contains_key(fqn)
    }
}

/// Shallow classification of one builtin name, standing in for a full
/// typeshed summary.
fn builtin_summary(name: &str) -> StubSymbol {
    const CLASSES: &[&str] = &[
        "bool",
        "bytearray",
        "bytes",
        "classmethod",
        "complex",
        "dict",
        "enumerate",
        "filter",
        "float",
        "frozenset",
        "int",
        "list",
        "map",
        "memoryview",
        "object",
        "property",
        "range",
        "reversed",
        "set",
        "slice",
        "staticmethod",
        "str",
        "super",
        "tuple",
        "type",
        "zip",
    ];
    const VALUES: &[&str] = &[
        "False",
        "None",
        "NotImplemented",
        "True",
        "__debug__",
        "__doc__",
        "__loader__",
        "__name__",
        "__package__",
        "__spec__",
        "copyright",
        "credits",
        "exit",
        "license",
        "quit",
    ];

    let is_exception = name.ends_with("Error")
        || name.ends_with("Warning")
        || name.ends_with("Exception")
        || name.ends_with("ExceptionGroup")
        || name.ends_with("Interrupt")
        || matches!(name, "GeneratorExit" | "StopIteration" | "StopAsyncIteration" | "SystemExit");

    if CLASSES.contains(&name) || is_exception {
        StubSymbol::opaque_class(name, name)
    } else if VALUES.contains(&name) {
        StubSymbol::other(name, name)
    } else {
        StubSymbol::function(name, name)
    }
}

#[cfg(test)]
mod tests {
    use super::{StubIndex, StubSymbol, StubSymbolKind};

    #[test]
    fn default_builtins_classify() {
        let index = StubIndex::with_default_builtins();
        let builtins = index.builtin_symbols().unwrap();

        let kind_of = |name: &str| {
            builtins
                .iter()
                .find(|symbol| symbol.name() == name)
                .map(StubSymbol::kind)
        };

        assert!(matches!(kind_of("int"), Some(StubSymbolKind::Class { .. })));
        assert!(matches!(
            kind_of("ValueError"),
            Some(StubSymbolKind::Class { .. })
        ));
        assert!(matches!(kind_of("print"), Some(StubSymbolKind::Function)));
        assert!(matches!(kind_of("None"), Some(StubSymbolKind::Other)));
    }

    #[test]
    fn module_lookup() {
        let mut index = StubIndex::new();
        index.add_module(
            "typing",
            vec![
                StubSymbol::other("Any", "typing.Any"),
                StubSymbol::function("cast", "typing.cast"),
            ],
        );

        assert!(index.contains_module("typing"));
        assert_eq!(index.symbol("typing", "cast").unwrap().name(), "cast");
        assert_eq!(index.symbol("typing", "Protocol"), None);
        assert_eq!(index.symbols_for_module("enum"), None);
    }
}
