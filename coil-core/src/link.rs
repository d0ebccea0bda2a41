//! `Link`: a lazily-resolved reference to another path (SPEC_FULL.md §4.D).

use snafu::ResultExt;

use crate::engine::Engine;
use crate::error::{CoilError, PathCtx};
use crate::expand::Visited;
use crate::value::{LinkValue, Value};

/// `expand(self)` (SPEC_FULL.md §4.D).
///
/// Resolves `link.path` against the path of `link.container`, looks up the
/// value living there (expanding its owning struct on demand), and follows
/// link-to-link chains transitively. `visited` is shared across the whole
/// chain so that `@a -> @b -> @a` is caught rather than looping forever.
pub(crate) fn expand(engine: &mut Engine, link: LinkValue, visited: &mut Visited) -> Result<Value, CoilError> {
    let container_path = engine.path_of(link.container).clone();
    let resolved = coil_path::resolve(&container_path, link.path.as_str())
        .context(PathCtx { location: link.state.source_location.clone() })?;

    if !visited.links.insert(resolved.path.clone()) {
        return Err(CoilError::struct_error(format!(
            "cycle detected resolving link '{}'",
            resolved.path
        )));
    }

    let value = engine.get_path_value(engine.root(), resolved.path.as_str(), false)?;
    match value {
        Value::Link(inner) => expand(engine, *inner, visited),
        other => Ok(other),
    }
}

/// `equals(self, other)` (SPEC_FULL.md §4.D).
///
/// Two links are equal iff they resolve to the same absolute path and share
/// a root; disjoint roots always compare unequal, matching
/// [`crate::Engine::has_same_root`]'s semantics elsewhere in this crate
/// (see DESIGN.md, "disjoint-root equality"). This replaces the original
/// implementation's early `return TRUE` that masked the path comparison
/// entirely.
pub fn equals(engine: &Engine, a: &LinkValue, b: &LinkValue) -> Result<bool, CoilError> {
    if !engine.has_same_root(a.container, b.container) {
        return Ok(false);
    }
    let a_path = coil_path::resolve(engine.path_of(a.container), a.path.as_str())
        .context(PathCtx { location: a.state.source_location.clone() })?
        .path;
    let b_path = coil_path::resolve(engine.path_of(b.container), b.path.as_str())
        .context(PathCtx { location: b.state.source_location.clone() })?
        .path;
    Ok(a_path == b_path)
}

/// `build_string(self)` (SPEC_FULL.md §4.D, §6): a link renders as its
/// literal `=<path>` directive, never its resolved value — grounded on
/// `coil_link.c`'s `_link_build_string`, which renders the stored path
/// unconditionally rather than expanding first.
pub(crate) fn build_string(link: &LinkValue) -> String {
    format!("={}", link.path)
}
