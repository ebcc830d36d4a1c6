//! Identifier validity.

/// Returns `true` if `name` is a valid Python identifier (ASCII form; the
/// analyzer normalizes module path components before asking).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::is_identifier;

    #[test]
    fn valid() {
        assert!(is_identifier("foo"));
        assert!(is_identifier("_foo"));
        assert!(is_identifier("foo_1"));
    }

    #[test]
    fn invalid() {
        assert!(!is_identifier(""));
        assert!(!is_identifier("1foo"));
        assert!(!is_identifier("foo-bar"));
        assert!(!is_identifier("foo.bar"));
    }
}
