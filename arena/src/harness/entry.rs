//! Entry-point resolution.
//!
//! Order: caller-supplied symbol, then the module's own `__entry__` declaration,
//! then `solution`, then the first top-level callable by source position. A
//! declared name only counts if the module actually binds it to a callable.

use crate::python::PythonModule;

/// Conventional entry point name.
pub const DEFAULT_ENTRY: &str = "solution";

pub(crate) fn resolve(module: &PythonModule<'_>, requested: Option<&str>) -> Option<String> {
    let callables = module.top_level_callables();
    let defined = |name: &str| callables.iter().any(|b| b.name == name);

    if let Some(name) = requested.filter(|n| defined(*n)) {
        return Some(name.to_string());
    }
    if let Some(name) = module.declared_entry().filter(|n| defined(n.as_str())) {
        return Some(name);
    }
    if defined(DEFAULT_ENTRY) {
        return Some(DEFAULT_ENTRY.to_string());
    }
    callables.first().map(|b| b.name.clone())
}
