//! The [`Engine`]: arena ownership, path table, and the struct engine's
//! public contract (SPEC_FULL.md §3 Arena model, §4.F, §4.I).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use coil_path::{Path, ROOT};
use slotmap::SlotMap;
use snafu::ResultExt;
use tap::Pipe;

use crate::error::{CoilError, PathCtx};
use crate::expand::Visited;
use crate::include::Parser;
use crate::node::{Entry, NodeKey, StructNode};
use crate::value::{Slot, Value};

/// Policy knobs applied to structs created by an [`Engine`]
/// (ambient configuration surface, SPEC_FULL.md §6a).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Default `always_expand` flag for newly created structs.
    pub always_expand: bool,
    /// Default `remember_deps` flag for newly created structs.
    pub remember_deps: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            always_expand: false,
            remember_deps: true,
        }
    }
}

/// The arena owning one connected configuration graph (SPEC_FULL.md §3,
/// "Arena model").
///
/// An `Engine` is the concrete realization of "the root owns the
/// `path_table`": rather than the root struct object holding a shared
/// reference-counted map, the `Engine` itself holds the single
/// `HashMap<Path, Value>` that every struct in the arena is indexed by.
#[derive(Clone)]
pub struct Engine {
    arena: SlotMap<NodeKey, StructNode>,
    path_table: HashMap<Path, Value>,
    root: NodeKey,
    options: EngineOptions,
    parser: Option<Arc<dyn Parser>>,
    source_file: Option<PathBuf>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("arena_len", &self.arena.len())
            .field("root", &self.root)
            .field("options", &self.options)
            .field("has_parser", &self.parser.is_some())
            .field("source_file", &self.source_file)
            .finish()
    }
}

impl Engine {
    /// Creates a new engine containing only an empty root struct.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self::with_parser(options, None)
    }

    /// Creates a new engine with a `Parser` collaborator configured, so that
    /// `Include` nodes encountered in this engine's arena can be expanded
    /// (SPEC_FULL.md §4.E, §6a).
    #[must_use]
    pub fn with_parser(options: EngineOptions, parser: Option<Arc<dyn Parser>>) -> Self {
        let mut arena = SlotMap::with_key();
        let mut root_node = StructNode::new(Path::root(), None, false);
        root_node.always_expand = options.always_expand;
        root_node.remember_deps = options.remember_deps;
        root_node.expanded = true;
        let root = arena.insert(root_node);
        let mut path_table = HashMap::new();
        path_table.insert(Path::root(), Value::Struct(root));
        Self {
            arena,
            path_table,
            root,
            options,
            parser,
            source_file: None,
        }
    }

    /// The configured parser collaborator, if any.
    #[must_use]
    pub fn parser(&self) -> Option<&Arc<dyn Parser>> {
        self.parser.as_ref()
    }

    /// The file this engine's root was parsed from, if any. Used to anchor
    /// relative `Include` paths and to reject self-includes (SPEC_FULL.md
    /// §4.E).
    #[must_use]
    pub fn source_file(&self) -> Option<&std::path::Path> {
        self.source_file.as_deref()
    }

    /// Records the file this engine's root was parsed from.
    pub fn set_source_file(&mut self, path: PathBuf) {
        self.source_file = Some(path);
    }

    /// The root struct's key.
    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Read-only access to a struct node.
    ///
    /// # Panics
    /// Panics if `key` does not belong to this engine's arena; `NodeKey`s
    /// never outlive the `Engine` they were minted from or cross engine
    /// boundaries, so a valid caller never triggers this.
    #[must_use]
    pub fn get(&self, key: NodeKey) -> &StructNode {
        &self.arena[key]
    }

    fn get_mut(&mut self, key: NodeKey) -> &mut StructNode {
        &mut self.arena[key]
    }

    /// Demotes `key` and every prototype ancestor along its container chain
    /// to non-prototype (SPEC_FULL.md §3, Invariant 4).
    fn promote_chain(&mut self, mut key: NodeKey) {
        loop {
            let node = self.get_mut(key);
            if !node.is_prototype {
                return;
            }
            node.is_prototype = false;
            match node.container {
                Some(parent) => key = parent,
                None => return,
            }
        }
    }

    /// Walks `target`'s container chain to the deepest already-existing
    /// struct, then materialises every missing intermediate as a fresh
    /// struct with `is_prototype` set as requested
    /// (`create_containers`, SPEC_FULL.md §4.F).
    fn create_containers(&mut self, target: &Path, is_prototype: bool) -> Result<NodeKey, CoilError> {
        if target.is_root() {
            return Ok(self.root);
        }
        if let Some(existing) = self.path_table.get(target) {
            return existing
                .as_struct()
                .ok_or_else(|| CoilError::struct_error(format!("'{target}' is not a struct")));
        }

        let mut missing = vec![target.clone()];
        let mut cursor = target.clone();
        let deepest_existing = loop {
            let container = cursor.container().unwrap_or_else(Path::root);
            if container.is_root() {
                break self.root;
            }
            match self.path_table.get(&container) {
                Some(Value::Struct(key)) => break *key,
                Some(_) => {
                    return Err(CoilError::struct_error(format!(
                        "'{container}' is not a struct"
                    )))
                }
                None => {
                    missing.push(container.clone());
                    cursor = container;
                }
            }
        };
        missing.reverse();

        let mut parent = deepest_existing;
        for path in missing {
            let mut node = StructNode::new(path.clone(), Some(parent), is_prototype);
            node.always_expand = self.options.always_expand;
            node.remember_deps = self.options.remember_deps;
            node.expanded = true;
            let key = self.arena.insert(node);
            self.path_table.insert(path.clone(), Value::Struct(key));
            let key_name = path.key().unwrap_or_default().to_string();
            let parent_node = self.get_mut(parent);
            parent_node.order.push(Entry {
                key: key_name.clone(),
                path: path.clone(),
            });
            parent_node.key_table.insert(key_name, Slot::Value(Value::Struct(key)));
            parent_node.touch();
            parent = key;
        }
        Ok(parent)
    }

    /// `set_key(self, key, value)` (SPEC_FULL.md §4.F).
    pub fn set_key(&mut self, at: NodeKey, key: &str, value: Value) -> Result<(), CoilError> {
        Path::validate_key(key).context(PathCtx { location: None })?;
        self.promote_chain(at);
        let base_path = self.get(at).path.clone();
        let entry_path = Path::build(base_path.as_str(), std::iter::once(key))
            .context(PathCtx { location: None })?;
        let node = self.get_mut(at);
        let already_ordered = node.order.iter().any(|e| e.key == key);
        if !already_ordered {
            node.order.push(Entry {
                key: key.to_string(),
                path: entry_path.clone(),
            });
        }
        node.key_table.insert(key.to_string(), Slot::Value(value.clone()));
        node.touch();
        self.path_table.insert(entry_path, value);
        Ok(())
    }

    /// `set_path(self, path, value)` (SPEC_FULL.md §4.F).
    pub fn set_path(&mut self, at: NodeKey, path: &str, value: Value) -> Result<(), CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        let container_key = self.create_containers(&resolved.container, false)?;
        self.set_key(container_key, &resolved.key, value)
    }

    /// `delete_key(self, key)` (SPEC_FULL.md §4.F).
    ///
    /// Per the engine's error-recovery policy (SPEC_FULL.md §7), deleting an
    /// unknown key on a non-root struct silently inserts a tombstone rather
    /// than failing, permitting forward `~k` directives.
    pub fn delete_key(&mut self, at: NodeKey, key: &str) -> bool {
        let node = self.get_mut(at);
        let position = node.order.iter().position(|e| e.key == key);
        let path = position.map(|i| node.order[i].path.clone());
        let existed = node.key_table.remove(key).is_some();
        if let Some(i) = position {
            node.order.remove(i);
        }
        node.touch();
        if let Some(path) = path {
            self.path_table.remove(&path);
        }
        existed
    }

    /// `delete_path(self, path)` (SPEC_FULL.md §4.F).
    pub fn delete_path(&mut self, at: NodeKey, path: &str) -> Result<bool, CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        let container = self
            .path_table
            .get(&resolved.container)
            .and_then(Value::as_struct)
            .ok_or_else(|| CoilError::struct_error(format!("'{}' does not exist", resolved.container)))?;
        Ok(self.delete_key(container, &resolved.key))
    }

    /// `mark_path_deleted(self, path)` (SPEC_FULL.md §4.F): inserts a
    /// tombstone that suppresses inheritance of `path` without it ever
    /// having been first-order on `self`.
    pub fn mark_path_deleted(&mut self, at: NodeKey, path: &str) -> Result<(), CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        if resolved.path.is_root() {
            return Err(CoilError::struct_error("cannot delete the root struct"));
        }
        let container = self.create_containers(&resolved.container, true)?;
        let node = self.get_mut(container);
        match node.key_table.get(&resolved.key) {
            Some(Slot::Value(_)) => {
                return Err(CoilError::struct_error(format!(
                    "'{}' is a first-order key and cannot be marked deleted",
                    resolved.path
                )))
            }
            Some(Slot::Tombstone) => {
                return Err(CoilError::struct_error(format!(
                    "'{}' is already marked deleted",
                    resolved.path
                )))
            }
            None => {}
        }
        node.key_table.insert(resolved.key, Slot::Tombstone);
        node.touch();
        Ok(())
    }

    /// `is_deleted_key` / `is_deleted_path` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn is_deleted_key(&self, at: NodeKey, key: &str) -> bool {
        matches!(self.get(at).key_table.get(key), Some(Slot::Tombstone))
    }

    /// See [`Self::is_deleted_key`].
    pub fn is_deleted_path(&self, at: NodeKey, path: &str) -> Result<bool, CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        let Some(container) = self.path_table.get(&resolved.container).and_then(Value::as_struct) else {
            return Ok(false);
        };
        Ok(self.is_deleted_key(container, &resolved.key))
    }

    /// `extend(self, parent)` (SPEC_FULL.md §4.F): appends `parent` to
    /// `self.dependencies` as an `@extends` target.
    pub fn extend(&mut self, at: NodeKey, parent: NodeKey) -> Result<(), CoilError> {
        if at == parent {
            return Err(CoilError::struct_error("a struct cannot extend itself"));
        }
        if self.is_ancestor(at, parent) {
            return Err(CoilError::struct_error("cannot extend a descendant"));
        }
        if self.is_ancestor(parent, at) {
            return Err(CoilError::struct_error("cannot extend an ancestor"));
        }
        if !self.has_same_root(at, parent) {
            return Err(CoilError::struct_error("extend target must share a root"));
        }
        let candidate = Value::Struct(parent);
        if self.has_dependency(at, &candidate) {
            return Err(CoilError::struct_error("already extends this target"));
        }
        let node = self.get_mut(at);
        node.dependencies.push(candidate);
        node.expanded = false;
        node.touch();
        Ok(())
    }

    /// `extend_path(self, path)` (SPEC_FULL.md §4.F): resolves `path` like
    /// `set_path`, auto-creating a prototype chain at the target if absent,
    /// then extends from the resulting struct.
    pub fn extend_path(&mut self, at: NodeKey, path: &str) -> Result<(), CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        let target = self.create_containers(&resolved.path, true)?;
        self.extend(at, target)
    }

    /// `has_dependency(self, candidate)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn has_dependency(&self, at: NodeKey, candidate: &Value) -> bool {
        let Some(candidate_key) = candidate.as_struct() else {
            return false;
        };
        self.get(at)
            .dependencies
            .iter()
            .any(|d| d.as_struct() == Some(candidate_key))
    }

    /// `get_key_value(self, key, expand?)` (SPEC_FULL.md §4.F).
    ///
    /// Falls back to expanding `self` once and retrying the lookup if the
    /// key is not first-order (SPEC_FULL.md §7, local recovery policy (a)).
    pub fn get_key_value(&mut self, at: NodeKey, key: &str, expand: bool) -> Result<Value, CoilError> {
        if let Some(Slot::Value(v)) = self.get(at).key_table.get(key) {
            let v = v.clone();
            return if expand { self.expand_value(v) } else { Ok(v) };
        }
        crate::expand::expand_struct(self, at)?;
        match self.get(at).key_table.get(key) {
            Some(Slot::Value(v)) => {
                let v = v.clone();
                if expand {
                    self.expand_value(v)
                } else {
                    Ok(v)
                }
            }
            _ => Err(CoilError::struct_error(format!("unknown key '{key}'"))),
        }
    }

    /// `get_path_value(self, path, expand?)` (SPEC_FULL.md §4.F).
    pub fn get_path_value(&mut self, at: NodeKey, path: &str, expand: bool) -> Result<Value, CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        if resolved.key.is_empty() {
            return self
                .path_table
                .get(&resolved.path)
                .cloned()
                .ok_or_else(|| CoilError::struct_error(format!("'{}' does not exist", resolved.path)));
        }
        let container = self
            .path_table
            .get(&resolved.container)
            .and_then(Value::as_struct)
            .ok_or_else(|| CoilError::struct_error(format!("'{}' does not exist", resolved.container)))?;
        self.get_key_value(container, &resolved.key, expand)
    }

    /// Expands `value` in place if it is a `Link` or `Struct`, returning the
    /// resolved value; `Include`s have no `real_value` and are returned
    /// unchanged (they mutate their container instead, see SPEC_FULL.md
    /// §4.E).
    fn expand_value(&mut self, value: Value) -> Result<Value, CoilError> {
        match value {
            Value::Struct(key) => {
                crate::expand::expand_struct(self, key)?;
                Ok(Value::Struct(key))
            }
            Value::Link(link) => crate::link::expand(self, *link, &mut Default::default()),
            other => Ok(other),
        }
    }

    /// Creates a fresh, empty, already-expanded struct named `name` inside
    /// `container`, without going through path resolution. Used when
    /// reconstructing a struct copied in from a different engine's arena
    /// (SPEC_FULL.md §4.E, `expand_include`'s cross-engine merge).
    pub(crate) fn new_child(&mut self, container: NodeKey, name: &str) -> Result<NodeKey, CoilError> {
        let container_path = self.get(container).path.clone();
        let path = Path::build(container_path.as_str(), std::iter::once(name)).context(PathCtx { location: None })?;
        let mut node = StructNode::new(path.clone(), Some(container), false);
        node.always_expand = self.options.always_expand;
        node.remember_deps = self.options.remember_deps;
        node.expanded = true;
        let key = self.arena.insert(node);
        self.path_table.insert(path.clone(), Value::Struct(key));
        let key_name = name.to_string();
        let parent_node = self.get_mut(container);
        if !parent_node.order.iter().any(|e| e.key == key_name) {
            parent_node.order.push(Entry {
                key: key_name.clone(),
                path: path.clone(),
            });
        }
        parent_node.key_table.insert(key_name, Slot::Value(Value::Struct(key)));
        parent_node.touch();
        Ok(key)
    }

    /// `copy(self, new_container)` (SPEC_FULL.md §4.F): deep copy preserving
    /// the dependency list, unless copying across engines (then the source
    /// is fully expanded first).
    pub fn copy(&mut self, source: NodeKey, new_container: NodeKey) -> Result<NodeKey, CoilError> {
        crate::expand::expand_struct(self, source)?;
        let src = self.get(source).clone();
        let new_path = {
            let container_path = self.get(new_container).path.clone();
            Path::build(container_path.as_str(), std::iter::once(src.name()))
                .context(PathCtx { location: None })?
        };
        let mut new_node = StructNode::new(new_path.clone(), Some(new_container), src.is_prototype);
        new_node.always_expand = src.always_expand;
        new_node.remember_deps = src.remember_deps;
        new_node.dependencies = src.dependencies.clone();
        new_node.expanded = src.expanded;
        let new_key = self.arena.insert(new_node);
        self.path_table.insert(new_path.clone(), Value::Struct(new_key));

        for entry in &src.order {
            let value = src.key_table[&entry.key].value().expect("order entries are never tombstones").clone();
            let copied = match value {
                Value::Struct(child) => Value::Struct(self.copy(child, new_key)?),
                other => other,
            };
            self.set_key(new_key, &entry.key, copied)?;
        }
        Ok(new_key)
    }

    /// `is_root(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn is_root(&self, at: NodeKey) -> bool {
        self.get(at).container.is_none()
    }

    /// `get_root(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn get_root(&self, at: NodeKey) -> NodeKey {
        let mut key = at;
        while let Some(parent) = self.get(key).container {
            key = parent;
        }
        key
    }

    /// `has_same_root(self, other)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn has_same_root(&self, a: NodeKey, b: NodeKey) -> bool {
        self.get_root(a) == self.get_root(b)
    }

    /// `is_ancestor(self, other)` (SPEC_FULL.md §4.I): `true` iff `self`
    /// appears in `other`'s container chain.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeKey, descendant: NodeKey) -> bool {
        let mut key = descendant;
        while let Some(parent) = self.get(key).container {
            if parent == ancestor {
                return true;
            }
            key = parent;
        }
        false
    }

    /// `is_descendant(self, other)` (SPEC_FULL.md §4.I): the inverse of
    /// [`Self::is_ancestor`].
    #[must_use]
    pub fn is_descendant(&self, descendant: NodeKey, ancestor: NodeKey) -> bool {
        self.is_ancestor(ancestor, descendant)
    }

    /// `contains_key(self, key, search_parents)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn contains_key(&self, at: NodeKey, key: &str, search_parents: bool) -> bool {
        match self.get(at).key_table.get(key) {
            Some(Slot::Value(_)) => true,
            Some(Slot::Tombstone) => false,
            None => {
                if !search_parents {
                    return false;
                }
                self.get(at).dependencies.iter().any(|dep| {
                    dep.as_struct()
                        .is_some_and(|parent| self.contains_key(parent, key, true))
                })
            }
        }
    }

    /// `contains_path(self, path)` (SPEC_FULL.md §4.I).
    pub fn contains_path(&self, at: NodeKey, path: &str) -> Result<bool, CoilError> {
        let base_path = self.get(at).path.clone();
        let resolved = coil_path::resolve(&base_path, path).context(PathCtx { location: None })?;
        if resolved.key.is_empty() {
            return Ok(self.path_table.contains_key(&resolved.path));
        }
        let Some(container) = self.path_table.get(&resolved.container).and_then(Value::as_struct) else {
            return Ok(false);
        };
        Ok(matches!(
            self.get(container).key_table.get(&resolved.key),
            Some(Slot::Value(_))
        ))
    }

    /// `get_keys(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn get_keys(&self, at: NodeKey) -> Vec<String> {
        self.get(at).order.iter().map(|e| e.key.clone()).collect()
    }

    /// `get_paths(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn get_paths(&self, at: NodeKey) -> Vec<Path> {
        self.get(at).order.iter().map(|e| e.path.clone()).collect()
    }

    /// `get_values(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn get_values(&self, at: NodeKey) -> Vec<Value> {
        self.get(at)
            .order
            .iter()
            .map(|e| self.get(at).key_table[&e.key].value().expect("order entries are never tombstones").clone())
            .collect()
    }

    /// `get_size(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn get_size(&self, at: NodeKey) -> usize {
        self.get(at).size()
    }

    /// `is_empty(self)` (SPEC_FULL.md §4.I).
    #[must_use]
    pub fn is_empty(&self, at: NodeKey) -> bool {
        self.get_size(at) == 0
    }

    /// Returns the absolute path of `at`.
    #[must_use]
    pub fn path_of(&self, at: NodeKey) -> &Path {
        &self.get(at).path
    }

    /// Direct access to the shared path table, keyed by absolute path.
    #[must_use]
    pub fn path_table(&self) -> &HashMap<Path, Value> {
        &self.path_table
    }

    pub(crate) fn arena_mut(&mut self) -> &mut SlotMap<NodeKey, StructNode> {
        &mut self.arena
    }

    /// `merge(src, dst, overwrite)` (SPEC_FULL.md §4.F): the heart of
    /// inheritance.
    pub fn merge(&mut self, src: NodeKey, dst: NodeKey, overwrite: bool) -> Result<(), CoilError> {
        crate::expand::expand_struct(self, src)?;
        if !self.has_same_root(src, dst) {
            crate::expand::expand_recursive(self, src)?;
        }
        let entries = self.get(src).order.clone();
        for entry in entries {
            let key = entry.key.clone();
            let src_value = self
                .get(src)
                .key_table
                .get(&key)
                .and_then(Slot::value)
                .cloned()
                .expect("order entries are never tombstones");

            let dst_slot = self.get(dst).key_table.get(&key).cloned();
            if let Some(existing) = &dst_slot {
                if !overwrite {
                    if let (Slot::Value(Value::Struct(dst_child)), Value::Struct(src_child)) =
                        (existing, &src_value)
                    {
                        let dst_child = *dst_child;
                        self.merge(*src_child, dst_child, overwrite)?;
                        self.promote_chain(dst_child);
                        continue;
                    }
                    continue;
                }
            }

            let copied = match &src_value {
                Value::Struct(child) => Value::Struct(self.copy(*child, dst)?),
                other if !self.has_same_root(src, dst) && other.is_expandable() => {
                    crate::expand::expand_any(self, other.clone(), &mut Default::default())?
                }
                other => other.clone(),
            };
            self.set_key(dst, &key, copied)?;
        }
        Ok(())
    }

    /// `compare(self, other)` (SPEC_FULL.md §4.B): a total order over
    /// values. Expandable operands (`Link`/`Include`) are expanded before
    /// comparison; scalars of the same kind compare naturally, lists
    /// componentwise, and structs compare equal iff [`Self::equals`] holds,
    /// falling back to comparing their canonical paths otherwise. Values of
    /// differing kinds compare by [`Value::kind_rank`]. Grounded on
    /// `coil_value.c`'s `coil_value_compare`/`_compare_value_list`.
    pub fn compare(&mut self, a: &Value, b: &Value) -> Result<Ordering, CoilError> {
        let a = self.resolve_for_compare(a.clone())?;
        let b = self.resolve_for_compare(b.clone())?;
        if a.kind_rank() != b.kind_rank() {
            return Ok(a.kind_rank().cmp(&b.kind_rank()));
        }
        match (&a, &b) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
            (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
            (Value::UInt(x), Value::UInt(y)) => Ok(x.cmp(y)),
            (Value::Float(x), Value::Float(y)) => Ok(x.partial_cmp(y).unwrap_or(Ordering::Equal)),
            (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
            (Value::List(x), Value::List(y)) => self.compare_lists(x, y),
            (Value::Struct(x), Value::Struct(y)) => {
                if self.equals(*x, *y)? {
                    Ok(Ordering::Equal)
                } else {
                    Ok(self.path_of(*x).cmp(self.path_of(*y)))
                }
            }
            // kind_rank already confirmed above that `a` and `b` share a variant.
            _ => Ok(Ordering::Equal),
        }
    }

    fn resolve_for_compare(&mut self, value: Value) -> Result<Value, CoilError> {
        match value {
            Value::Link(_) | Value::Include(_) => crate::expand::expand_any(self, value, &mut Visited::default()),
            other => Ok(other),
        }
    }

    fn compare_lists(&mut self, a: &[Value], b: &[Value]) -> Result<Ordering, CoilError> {
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = self.compare(x, y)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(a.len().cmp(&b.len()))
    }

    /// `equals(self, other)` (SPEC_FULL.md §4.B, §4.F): structural equality
    /// of two structs after expansion. Two structs in an ancestor/descendant
    /// relationship are never equal, regardless of content, matching
    /// `coil_struct_equals`'s `coil_struct_is_descendent` guard
    /// (`examples/original_source/coil-0.1/coil/coil_struct.c`); structs
    /// under disjoint roots are likewise never equal (see DESIGN.md,
    /// "disjoint-root equality").
    pub fn equals(&mut self, a: NodeKey, b: NodeKey) -> Result<bool, CoilError> {
        if a == b {
            return Ok(true);
        }
        if !self.has_same_root(a, b) {
            return Ok(false);
        }
        if self.is_ancestor(a, b) || self.is_ancestor(b, a) {
            return Ok(false);
        }
        crate::expand::expand_recursive(self, a)?;
        crate::expand::expand_recursive(self, b)?;
        if self.get(a).size() != self.get(b).size() {
            return Ok(false);
        }
        let mut keys_a = self.get_keys(a);
        let mut keys_b = self.get_keys(b);
        keys_a.sort();
        keys_b.sort();
        if keys_a != keys_b {
            return Ok(false);
        }
        for key in keys_a {
            let va = self
                .get(a)
                .key_table
                .get(&key)
                .and_then(Slot::value)
                .cloned()
                .expect("order entries are never tombstones");
            let vb = self
                .get(b)
                .key_table
                .get(&key)
                .and_then(Slot::value)
                .cloned()
                .expect("order entries are never tombstones");
            if self.compare(&va, &vb)? != Ordering::Equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `build_string(value)` (SPEC_FULL.md §4.B, §4.C, §6): renders `value`
    /// to Coil's canonical textual form.
    pub fn build_string(&mut self, value: &Value) -> Result<String, CoilError> {
        let mut buffer = String::new();
        self.render_value(&mut buffer, value, "")?;
        Ok(buffer)
    }

    /// The shared rendering primitive every kind's `build_string` delegates
    /// nested values through (SPEC_FULL.md §4.C). Structs are expanded
    /// before being rendered so inherited entries appear; `Link`/`Include`
    /// render their literal directive syntax rather than a resolved value,
    /// grounded on `coil_link.c`'s `_link_build_string` and
    /// `coil_include.c`'s `_include_build_string`.
    pub(crate) fn render_value(&mut self, buffer: &mut String, value: &Value, prefix: &str) -> Result<(), CoilError> {
        match value {
            Value::Null => buffer.push_str("None"),
            Value::Bool(b) => buffer.push_str(if *b { "True" } else { "False" }),
            Value::Int(n) => buffer.push_str(&n.to_string()),
            Value::UInt(n) => buffer.push_str(&n.to_string()),
            Value::Float(f) => buffer.push_str(&f.to_string()),
            Value::String(s) => render_quoted_string(buffer, s),
            Value::List(items) => self.render_list(buffer, items, prefix)?,
            Value::Struct(key) => self.render_struct(buffer, *key, prefix)?,
            Value::Link(link) => buffer.push_str(&crate::link::build_string(link)),
            Value::Include(include) => crate::include::build_string(self, include, buffer)?,
        }
        Ok(())
    }

    fn render_list(&mut self, buffer: &mut String, items: &[Value], prefix: &str) -> Result<(), CoilError> {
        if items.is_empty() {
            buffer.push_str("[ ]");
            return Ok(());
        }
        buffer.push_str("[ ");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                buffer.push(' ');
            }
            self.render_value(buffer, item, prefix)?;
        }
        buffer.push_str(" ]");
        Ok(())
    }

    /// Grounded on `coil_struct.c`'s `coil_struct_build_string_internal`:
    /// lazily expands, then renders each first-order entry as `key: value`
    /// at `prefix`, nesting child structs in `{ }` blocks indented one
    /// [`BLOCK_INDENT`] deeper. An empty struct renders as `{}`.
    fn render_struct(&mut self, buffer: &mut String, key: NodeKey, prefix: &str) -> Result<(), CoilError> {
        crate::expand::expand_struct(self, key)?;
        if self.get(key).size() == 0 {
            buffer.push_str("{}");
            return Ok(());
        }
        let child_prefix = format!("{prefix}{BLOCK_INDENT}");
        buffer.push_str("{\n");
        let entries = self.get(key).order.clone();
        for entry in &entries {
            let value = self
                .get(key)
                .key_table
                .get(&entry.key)
                .and_then(Slot::value)
                .cloned()
                .expect("order entries are never tombstones");
            buffer.push_str(&child_prefix);
            buffer.push_str(&entry.key);
            buffer.push_str(": ");
            self.render_value(buffer, &value, &child_prefix)?;
            buffer.push('\n');
        }
        buffer.push_str(prefix);
        buffer.push('}');
        Ok(())
    }
}

/// Indent added per nesting depth when rendering a struct block
/// (SPEC_FULL.md §6: "4-space indent per block depth").
const BLOCK_INDENT: &str = "    ";

/// A string longer than this (in bytes) or containing a newline is rendered
/// triple-quoted rather than single-quoted (SPEC_FULL.md §6).
const MULTILINE_THRESHOLD: usize = 80;

fn render_quoted_string(buffer: &mut String, s: &str) {
    if s.len() <= MULTILINE_THRESHOLD && !s.contains('\n') {
        buffer.push('\'');
        buffer.push_str(s);
        buffer.push('\'');
    } else {
        buffer.push_str("'''");
        buffer.push_str(s);
        buffer.push_str("'''");
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

/// An iterator over a struct's first-order `(key, path, value)` triples,
/// invalidated when the struct's `version` changes (SPEC_FULL.md §4.F,
/// §3 Invariant 5).
pub struct Iter<'e> {
    engine: &'e Engine,
    at: NodeKey,
    version: u64,
    index: usize,
}

impl<'e> Iter<'e> {
    fn new(engine: &'e Engine, at: NodeKey) -> Self {
        Self {
            engine,
            at,
            version: engine.get(at).version,
            index: 0,
        }
    }
}

impl<'e> Iterator for Iter<'e> {
    type Item = Result<(&'e str, &'e Path, &'e Value), CoilError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.engine.get(self.at);
        if node.version != self.version {
            return Some(Err(CoilError::internal(
                "iterator invalidated: struct was mutated during iteration",
            )));
        }
        let entry = node.order.get(self.index)?;
        self.index += 1;
        let value = node
            .key_table
            .get(&entry.key)
            .and_then(Slot::value)
            .expect("order entries are never tombstones");
        Some(Ok((entry.key.as_str(), &entry.path, value)))
    }
}

impl Engine {
    /// `iter` (SPEC_FULL.md §4.F).
    #[must_use]
    pub fn iter(&self, at: NodeKey) -> Iter<'_> {
        Iter::new(self, at)
    }
}

/// Builds the canonical `ROOT` path's [`Value`] entry for a freshly created
/// `Engine`; exposed for callers constructing a root by hand in tests
/// without going through a parser.
#[must_use]
pub fn root_value(engine: &Engine) -> Value {
    Value::Struct(engine.root())
}

/// Convenience for resolving a path string into a [`Path`], surfacing
/// [`coil_path::PathError`] as a [`CoilError`]. Exposed so parser
/// collaborators (and tests) can reuse the engine's error context.
pub fn parse_path(value: &str) -> Result<Path, CoilError> {
    if value == ROOT {
        return Ok(Path::root());
    }
    value.to_string().pipe(Path::parse).context(PathCtx { location: None })
}
