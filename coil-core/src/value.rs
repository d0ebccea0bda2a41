//! The tagged value model (SPEC_FULL.md §3, §4.B).

use coil_path::Path;

use crate::error::SourceLocation;
use crate::node::NodeKey;

/// A single configuration value.
///
/// Scalars and lists are owned and compared structurally. The three object
/// kinds (`Struct`, `Link`, `Include`) are reference-shared: copying a
/// `Value` of one of these kinds duplicates only the enclosing cell, not the
/// underlying node (SPEC_FULL.md §4.B).
#[derive(Debug, Clone)]
pub enum Value {
    /// The `None` singleton.
    Null,
    /// `True` / `False`.
    Bool(bool),
    /// A signed integer scalar.
    Int(i64),
    /// An unsigned integer scalar.
    UInt(u64),
    /// A floating point scalar.
    Float(f64),
    /// A UTF-8 string scalar.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A reference to a struct living in the owning [`crate::Engine`]'s
    /// arena.
    Struct(NodeKey),
    /// A lazily-resolved reference to another path.
    Link(Box<LinkValue>),
    /// A lazily-loaded file include.
    Include(Box<IncludeValue>),
}

impl Value {
    /// A human-readable name for this value's kind, used in error messages
    /// and kind-mismatch comparisons.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
            Value::Link(_) => "link",
            Value::Include(_) => "include",
        }
    }

    /// Returns `true` if this value is one of the expandable kinds (Struct,
    /// Link, Include).
    #[must_use]
    pub fn is_expandable(&self) -> bool {
        matches!(self, Value::Struct(_) | Value::Link(_) | Value::Include(_))
    }

    /// Returns the contained struct key, if this value is a `Struct`.
    #[must_use]
    pub fn as_struct(&self) -> Option<NodeKey> {
        match self {
            Value::Struct(key) => Some(*key),
            _ => None,
        }
    }

    /// A fixed ordering over kinds, used by [`crate::Engine::compare`] when
    /// comparing values of different kinds (SPEC_FULL.md §4.B: "comparing
    /// different kinds returns a non-zero order by kind tag"). Grounded on
    /// `coil_value_compare`'s `G_TYPE_FUNDAMENTAL` fallback
    /// (`examples/original_source/coil-0.1/coil/coil_value.c`); there is no
    /// GType equivalent in Rust, so this crate fixes its own arbitrary but
    /// deterministic rank instead.
    pub(crate) fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::UInt(_) => 3,
            Value::Float(_) => 4,
            Value::String(_) => 5,
            Value::List(_) => 6,
            Value::Struct(_) => 7,
            Value::Link(_) => 8,
            Value::Include(_) => 9,
        }
    }
}

/// The common state shared by every expandable node kind
/// (SPEC_FULL.md §3, "Expandable common state").
#[derive(Debug, Clone, Default)]
pub struct ExpandState {
    /// `true` once this node has completed its one-time expansion step.
    pub expanded: bool,
    /// The value substituted at use sites once expanded.
    pub real_value: Option<Box<Value>>,
    /// Where this node appeared in the original source, if known.
    pub source_location: Option<SourceLocation>,
}

/// A `Link` node: resolves to the value found at `path` (SPEC_FULL.md §4.D).
#[derive(Debug, Clone)]
pub struct LinkValue {
    /// The relative or absolute path this link names.
    pub path: Path,
    /// The struct this link's slot lives inside; used to resolve relative
    /// paths and to perform the path lookup.
    pub container: NodeKey,
    /// Shared expandable state.
    pub state: ExpandState,
}

impl LinkValue {
    /// Creates a new, unexpanded link.
    #[must_use]
    pub fn new(path: Path, container: NodeKey) -> Self {
        Self {
            path,
            container,
            state: ExpandState::default(),
        }
    }
}

/// An `Include` node: loads another file and merges it into its container
/// (SPEC_FULL.md §4.E).
#[derive(Debug, Clone)]
pub struct IncludeValue {
    /// The value which must resolve to a string naming the file to include.
    pub include_path_value: Box<Value>,
    /// Optional list of sub-import path values; each must resolve to a
    /// string naming a struct inside the included file.
    pub import_list: Option<Vec<Value>>,
    /// The struct this include's slot lives inside; the include mutates
    /// this struct directly rather than producing a `real_value`.
    pub container: NodeKey,
    /// Shared expandable state.
    pub state: ExpandState,
}

impl IncludeValue {
    /// Creates a new, unexpanded include.
    #[must_use]
    pub fn new(include_path_value: Value, import_list: Option<Vec<Value>>, container: NodeKey) -> Self {
        Self {
            include_path_value: Box::new(include_path_value),
            import_list,
            container,
            state: ExpandState::default(),
        }
    }
}

/// A key-table slot: either a live value or a deletion tombstone
/// (SPEC_FULL.md §3, Invariant 3).
#[derive(Debug, Clone)]
pub enum Slot {
    /// A live, first-order value.
    Value(Value),
    /// A tombstone suppressing inheritance of this key.
    Tombstone,
}

impl Slot {
    /// Returns the contained value, or `None` if this slot is a tombstone.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Tombstone => None,
        }
    }

    /// Returns `true` if this slot is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone)
    }
}
