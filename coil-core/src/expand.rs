//! The expansion driver: cycle detection and the struct expansion algorithm
//! (SPEC_FULL.md §4.F "Expansion algorithm", §4.H).

use std::collections::HashSet;

use coil_path::Path;

use crate::engine::Engine;
use crate::error::CoilError;
use crate::node::NodeKey;
use crate::value::{Slot, Value};

/// Per-call cycle-detection state, threaded through a single expansion
/// entry point and all the expandables it recursively visits
/// (SPEC_FULL.md §4.H, "accepts an optional inherited visited set").
#[derive(Debug, Default)]
pub struct Visited {
    pub(crate) structs: HashSet<NodeKey>,
    pub(crate) links: HashSet<Path>,
}

/// Expands `key` with a fresh [`Visited`] set; the public entry point used
/// by [`Engine`] operations that trigger expansion.
pub fn expand_struct(engine: &mut Engine, key: NodeKey) -> Result<(), CoilError> {
    expand_struct_with(engine, key, &mut Visited::default())
}

/// `expand(self)` (SPEC_FULL.md §4.F).
///
/// A struct's own `expand_lock` field is the primary reentrancy guard (an
/// attempt to acquire it recursively is a cycle); `visited` additionally
/// records which nodes this particular expansion call has already walked,
/// matching the driver's visited-set contract in §4.H.
pub(crate) fn expand_struct_with(
    engine: &mut Engine,
    key: NodeKey,
    visited: &mut Visited,
) -> Result<(), CoilError> {
    let (expanded, always_expand) = {
        let node = engine.get(key);
        (node.expanded, node.always_expand)
    };
    if expanded && !always_expand {
        return Ok(());
    }
    if engine.get(key).expand_lock {
        return Err(CoilError::struct_error("cycle detected in value expansion"));
    }
    engine.arena_mut()[key].expand_lock = true;
    visited.structs.insert(key);
    tracing::trace!(path = %engine.path_of(key), "expanding struct");

    let outcome = expand_dependencies(engine, key, visited);

    engine.arena_mut()[key].expand_lock = false;
    outcome?;

    let remember_deps = engine.get(key).remember_deps;
    if !remember_deps {
        engine.arena_mut()[key].dependencies.clear();
    }
    let node = &mut engine.arena_mut()[key];
    node.expanded = true;
    node.touch();
    Ok(())
}

fn expand_dependencies(engine: &mut Engine, key: NodeKey, visited: &mut Visited) -> Result<(), CoilError> {
    let dependencies = engine.get(key).dependencies.clone();
    for dep in dependencies {
        match dep {
            Value::Struct(parent) => {
                if engine.get(parent).is_prototype {
                    return Err(CoilError::struct_error(format!(
                        "'{}' was used or extended but never defined",
                        engine.path_of(parent)
                    )));
                }
                expand_struct_with(engine, parent, visited)?;
                engine.merge(parent, key, false)?;
            }
            Value::Include(include) => {
                crate::include::expand(engine, *include, key, visited)?;
            }
            other if other.is_expandable() => {
                expand_any(engine, other, visited)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Dispatches expansion by value kind, returning the value substituted at
/// the use site (SPEC_FULL.md §4.C, "every expandable exposes `expand`").
///
/// `Include` has no substitutable `real_value` (it mutates its container
/// instead); encountering one in this position is a merge of a bare include
/// leaf value, which has no counterpart outside cross-root merge — it is
/// expanded for effect and a `Null` placeholder is returned.
pub(crate) fn expand_any(engine: &mut Engine, value: Value, visited: &mut Visited) -> Result<Value, CoilError> {
    match value {
        Value::Struct(key) => {
            expand_struct_with(engine, key, visited)?;
            Ok(Value::Struct(key))
        }
        Value::Link(link) => crate::link::expand(engine, *link, visited),
        Value::Include(include) => {
            let container = include.container;
            crate::include::expand(engine, *include, container, visited)?;
            Ok(Value::Null)
        }
        other => Ok(other),
    }
}

/// `expand_recursive` (SPEC_FULL.md §4.F): expands `key` and every
/// struct/expandable value reachable from it.
pub fn expand_recursive(engine: &mut Engine, key: NodeKey) -> Result<(), CoilError> {
    expand_recursive_with(engine, key, &mut Visited::default())
}

fn expand_recursive_with(engine: &mut Engine, key: NodeKey, visited: &mut Visited) -> Result<(), CoilError> {
    expand_struct_with(engine, key, visited)?;
    let entries = engine.get(key).order.clone();
    for entry in entries {
        let value = engine
            .get(key)
            .key_table
            .get(&entry.key)
            .and_then(Slot::value)
            .cloned();
        if let Some(value) = value {
            expand_value_recursive(engine, value, visited)?;
        }
    }
    Ok(())
}

fn expand_value_recursive(engine: &mut Engine, value: Value, visited: &mut Visited) -> Result<(), CoilError> {
    match value {
        Value::Struct(child) => expand_recursive_with(engine, child, visited),
        Value::Link(link) => crate::link::expand(engine, *link, visited).map(|_| ()),
        Value::Include(include) => {
            let container = include.container;
            crate::include::expand(engine, *include, container, visited)
        }
        Value::List(items) => {
            for item in items {
                expand_value_recursive(engine, item, visited)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Merges `src` (living in `src_engine`) into `dst` (living in `dst_engine`),
/// always constructing fresh nodes in `dst_engine`'s arena — no [`NodeKey`]
/// ever crosses an engine boundary (SPEC_FULL.md §3, "Arena model").
///
/// Used by [`crate::include`] when an included file's root was parsed into
/// its own `Engine`.
pub(crate) fn merge_foreign(
    dst_engine: &mut Engine,
    dst: NodeKey,
    src_engine: &mut Engine,
    src: NodeKey,
    overwrite: bool,
) -> Result<(), CoilError> {
    expand_recursive(src_engine, src)?;
    let entries = src_engine.get(src).order.clone();
    for entry in entries {
        let key = entry.key;
        if !overwrite && dst_engine.contains_key(dst, &key, false) {
            let dst_child = dst_engine
                .get(dst)
                .key_table
                .get(&key)
                .and_then(Slot::value)
                .and_then(Value::as_struct);
            let src_child = src_engine
                .get(src)
                .key_table
                .get(&key)
                .and_then(Slot::value)
                .and_then(Value::as_struct);
            if let (Some(dst_child), Some(src_child)) = (dst_child, src_child) {
                merge_foreign(dst_engine, dst_child, src_engine, src_child, overwrite)?;
            }
            continue;
        }
        let value = src_engine
            .get(src)
            .key_table
            .get(&key)
            .and_then(Slot::value)
            .cloned()
            .expect("order entries are never tombstones");
        let copied = copy_foreign_value(dst_engine, dst, src_engine, value)?;
        dst_engine.set_key(dst, &key, copied)?;
    }
    Ok(())
}

pub(crate) fn copy_foreign_value(
    dst_engine: &mut Engine,
    dst_container: NodeKey,
    src_engine: &mut Engine,
    value: Value,
) -> Result<Value, CoilError> {
    match value {
        Value::Struct(child) => {
            let name = src_engine.get(child).name().to_string();
            let new_key = dst_engine.new_child(dst_container, &name)?;
            merge_foreign(dst_engine, new_key, src_engine, child, false)?;
            Ok(Value::Struct(new_key))
        }
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(copy_foreign_value(dst_engine, dst_container, src_engine, item)?);
            }
            Ok(Value::List(out))
        }
        Value::Link(link) => {
            let resolved = crate::link::expand(src_engine, *link, &mut Visited::default())?;
            copy_foreign_value(dst_engine, dst_container, src_engine, resolved)
        }
        Value::Include(include) => {
            let container = include.container;
            crate::include::expand(src_engine, *include, container, &mut Visited::default())?;
            Ok(Value::Null)
        }
        scalar => Ok(scalar),
    }
}
