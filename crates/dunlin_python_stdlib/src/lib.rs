//! Static facts about the Python standard environment.
//!
//! Nothing in this crate performs analysis; it only exposes tables that the
//! semantic core (and downstream rules) consult: the set of names in the
//! built-in namespace, the implicit module-level "magic" globals, and
//! identifier validity for dotted module names.

pub mod builtins;
pub mod identifiers;
