//! Absolute dotted module names, and the path arithmetic behind
//! relative-import resolution.

use std::fmt;
use std::ops::Deref;

use compact_str::CompactString;
use smallvec::SmallVec;

use dunlin_python_stdlib::identifiers::is_identifier;

/// A module name, e.g. `foo.bar`.
///
/// Always the absolute form: never empty, never relative (`.foo`), never
/// containing empty or non-identifier components.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModuleName(CompactString);

impl ModuleName {
    /// Creates a new module name. Returns `None` if `name` is not a valid,
    /// absolute module name.
    #[must_use]
    pub fn new(name: &str) -> Option<Self> {
        Self::is_valid_name(name).then(|| Self(CompactString::from(name)))
    }

    fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.split('.').all(is_identifier)
    }

    /// The components of the module name, in order.
    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('.')
    }

    /// The name of this module's immediate parent, if it has one.
    #[must_use]
    pub fn parent(&self) -> Option<ModuleName> {
        let (parent, _) = self.0.rsplit_once('.')?;
        Some(Self(CompactString::from(parent)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully qualified name of the member `name` of this module.
    #[must_use]
    pub fn member(&self, name: &str) -> String {
        format!("{}.{name}", self.0)
    }
}

impl Deref for ModuleName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips the final dot-extension from a file name: `mod.py` becomes `mod`.
fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// The fully qualified name of the module contained in `file_name` under
/// `package`. An `__init__` file names the package itself.
#[must_use]
pub fn module_fqn(package: &str, file_name: &str) -> Option<ModuleName> {
    let stem = file_stem(file_name);
    if stem == "__init__" {
        return ModuleName::new(package);
    }
    if package.is_empty() {
        ModuleName::new(stem)
    } else {
        ModuleName::new(&format!("{package}.{stem}"))
    }
}

/// Resolves the target module of a `from … import` with `level` leading dots,
/// seen in `file_name` under `package`.
///
/// The current file path (package components plus the file stem) is truncated
/// by `level` components; `module`, when present, is appended. Returns `None`
/// when the dots escape the package root — a soft condition, reported by the
/// caller as an unresolved import.
#[must_use]
pub fn resolve_relative_import(
    package: &str,
    file_name: &str,
    level: usize,
    module: Option<&str>,
) -> Option<ModuleName> {
    let mut components: SmallVec<[&str; 8]> = if package.is_empty() {
        SmallVec::new()
    } else {
        package.split('.').collect()
    };
    components.push(file_stem(file_name));

    if level > components.len() {
        return None;
    }
    components.truncate(components.len() - level);
    if let Some(module) = module {
        components.extend(module.split('.'));
    }
    if components.is_empty() {
        return None;
    }
    ModuleName::new(&components.join("."))
}

#[cfg(test)]
mod tests {
    use super::{module_fqn, resolve_relative_import, ModuleName};

    #[test]
    fn valid_names() {
        assert_eq!(ModuleName::new("foo.bar").as_deref(), Some("foo.bar"));
        assert_eq!(ModuleName::new("foo"), ModuleName::new("foo"));
        assert_eq!(ModuleName::new(""), None);
        assert_eq!(ModuleName::new(".foo"), None);
        assert_eq!(ModuleName::new("foo..bar"), None);
        assert_eq!(ModuleName::new("2000"), None);
    }

    #[test]
    fn parents() {
        assert_eq!(
            ModuleName::new("foo.bar.baz").unwrap().parent(),
            ModuleName::new("foo.bar")
        );
        assert_eq!(ModuleName::new("root").unwrap().parent(), None);
    }

    #[test]
    fn fqn_of_plain_module() {
        assert_eq!(
            module_fqn("pkg.sub", "mod.py").as_deref(),
            Some("pkg.sub.mod")
        );
        assert_eq!(module_fqn("", "mod.py").as_deref(), Some("mod"));
    }

    #[test]
    fn fqn_of_package_init() {
        assert_eq!(module_fqn("pkg.sub", "__init__.py").as_deref(), Some("pkg.sub"));
    }

    #[test]
    fn relative_import_sibling() {
        assert_eq!(
            resolve_relative_import("pkg.sub", "mod.py", 1, Some("other")).as_deref(),
            Some("pkg.sub.other")
        );
    }

    #[test]
    fn relative_import_parent() {
        assert_eq!(
            resolve_relative_import("pkg.sub", "mod.py", 2, Some("other")).as_deref(),
            Some("pkg.other")
        );
    }

    #[test]
    fn relative_import_bare_dot() {
        assert_eq!(
            resolve_relative_import("pkg.sub", "__init__.py", 1, None).as_deref(),
            Some("pkg.sub")
        );
    }

    #[test]
    fn relative_import_escaping_the_root() {
        assert_eq!(resolve_relative_import("pkg", "mod.py", 3, Some("x")), None);
    }
}
