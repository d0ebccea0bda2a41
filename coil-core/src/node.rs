//! Arena storage for structs (SPEC_FULL.md §3, "Arena model").

use std::collections::HashMap;

use coil_path::Path;
use slotmap::new_key_type;

use crate::value::{Slot, Value};

new_key_type! {
    /// A handle to a [`StructNode`] living in an [`crate::Engine`]'s arena.
    ///
    /// Container back-references are plain `NodeKey`s rather than `Rc`/`Weak`
    /// pointers, per SPEC_FULL.md §9's arena-ownership design note.
    pub struct NodeKey;
}

/// A first-order entry in a struct's iteration order.
///
/// The value itself is looked up through `StructNode::key_table`; `Entry`
/// only fixes the iteration order and caches the entry's absolute path.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The first-order key.
    pub key: String,
    /// `self.path ++ "." ++ key`.
    pub path: Path,
}

/// A struct node in the engine's arena (SPEC_FULL.md §3).
#[derive(Debug, Clone)]
pub struct StructNode {
    /// Absolute path from root.
    pub path: Path,
    /// The owning parent struct, or `None` for the root.
    pub container: Option<NodeKey>,
    /// Insertion-ordered first-order entries.
    pub order: Vec<Entry>,
    /// Key to slot; a slot of `Slot::Tombstone` marks a deletion.
    pub key_table: HashMap<String, Slot>,
    /// `@extends` targets, in the order they were added. Processed in that
    /// same order during expansion (see DESIGN.md, "Dependency push/walk
    /// order").
    pub dependencies: Vec<Value>,
    /// `true` if this struct was implicitly created as an unresolved
    /// `@extends` target.
    pub is_prototype: bool,
    /// If set, this struct always re-runs expansion on access rather than
    /// memoising (ambient `StructOptions` policy knob, SPEC_FULL.md §6a).
    pub always_expand: bool,
    /// If unset, the dependency list is dropped once expansion completes.
    pub remember_deps: bool,
    /// Monotonic counter, bumped on every mutation.
    pub version: u64,
    /// Reentrancy guard for cycle detection during expansion.
    pub expand_lock: bool,
    /// `true` once all dependencies have been merged in.
    pub expanded: bool,
}

impl StructNode {
    /// Creates a new, empty struct node at `path`.
    #[must_use]
    pub fn new(path: Path, container: Option<NodeKey>, is_prototype: bool) -> Self {
        Self {
            path,
            container,
            order: Vec::new(),
            key_table: HashMap::new(),
            dependencies: Vec::new(),
            is_prototype,
            always_expand: false,
            remember_deps: true,
            version: 0,
            expand_lock: false,
            expanded: false,
        }
    }

    /// Bumps `version`, invalidating any live iterators.
    pub fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Returns the last key of `path`, or the root marker if this is the
    /// root struct.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.key().unwrap_or(coil_path::ROOT)
    }

    /// First-order keys, in iteration order (tombstones excluded).
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|e| e.key.as_str()).collect()
    }

    /// Number of first-order entries (tombstones excluded).
    #[must_use]
    pub fn size(&self) -> usize {
        self.order.len()
    }
}
