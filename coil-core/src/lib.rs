//! The Coil structure engine: an in-memory configuration graph supporting
//! path-addressed reads/writes, prototype-based `@extends` inheritance, and
//! lazy expansion of links and file includes.
//!
//! See `SPEC_FULL.md` in the workspace root for the full specification this
//! crate implements.

mod cache;
mod engine;
mod error;
mod expand;
mod include;
mod link;
mod node;
mod value;

pub use coil_path::{Path, PathError};

pub use crate::engine::{parse_path, root_value, Engine, EngineOptions, Iter};
pub use crate::error::{CoilError, SourceLocation};
pub use crate::expand::{expand_recursive, expand_struct};
pub use crate::include::Parser;
pub use crate::node::{Entry, NodeKey, StructNode};
pub use crate::value::{ExpandState, IncludeValue, LinkValue, Slot, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_engine_has_an_empty_root() {
        let engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        assert!(engine.is_root(root));
        assert!(engine.is_empty(root));
        assert_eq!(engine.get_size(root), 0);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_key(root, "name", Value::String("coil".into())).unwrap();
        let value = engine.get_key_value(root, "name", false).unwrap();
        assert!(matches!(value, Value::String(s) if s == "coil"));
    }

    #[test]
    fn set_path_creates_intermediate_structs() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "a.b.c", Value::Int(42)).unwrap();
        let value = engine.get_path_value(root, "a.b.c", false).unwrap();
        assert!(matches!(value, Value::Int(42)));
        assert!(engine.contains_path(root, "a.b").unwrap());
    }

    #[test]
    fn extend_inherits_keys_without_overwrite() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "base.x", Value::Int(1)).unwrap();
        engine.set_path(root, "base.y", Value::Int(2)).unwrap();
        engine.set_path(root, "child.y", Value::Int(99)).unwrap();
        let child = engine
            .path_table()
            .get(&parse_path("@root.child").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        engine.extend_path(child, "@root.base").unwrap();

        let x = engine.get_path_value(root, "child.x", false).unwrap();
        assert!(matches!(x, Value::Int(1)));
        let y = engine.get_path_value(root, "child.y", false).unwrap();
        assert!(matches!(y, Value::Int(99)), "existing keys are not overwritten by @extends");
    }

    #[test]
    fn extend_rejects_self_and_cycles() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "a.b", Value::Int(1)).unwrap();
        let a = engine
            .path_table()
            .get(&parse_path("@root.a").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        assert!(engine.extend(a, a).is_err());
        assert!(engine.extend(root, a).is_err(), "root cannot extend its own descendant");
        assert!(engine.extend(a, root).is_err(), "a struct cannot extend its own ancestor");
    }

    #[test]
    fn delete_then_mark_deleted_suppresses_inheritance() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "base.secret", Value::Int(1)).unwrap();
        engine.set_path(root, "child.other", Value::Int(0)).unwrap();
        let child = engine
            .path_table()
            .get(&parse_path("@root.child").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        engine.mark_path_deleted(child, "secret").unwrap();
        engine.extend_path(child, "@root.base").unwrap();
        assert!(!engine.contains_key(child, "secret", true));
    }

    #[test]
    fn iterator_detects_mutation_during_iteration() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_key(root, "a", Value::Int(1)).unwrap();
        let mut iter = engine.iter(root);
        let first = iter.next().unwrap();
        assert!(first.is_ok());
        engine.set_key(root, "b", Value::Int(2)).unwrap();
        let second = iter.next().unwrap();
        assert!(second.is_err());
    }

    #[test]
    fn compare_orders_scalars_and_kinds() {
        let mut engine = Engine::new(EngineOptions::default());
        assert_eq!(
            engine.compare(&Value::Int(1), &Value::Int(2)).unwrap(),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            engine.compare(&Value::Int(1), &Value::String("a".into())).unwrap(),
            std::cmp::Ordering::Less,
            "different kinds order by kind tag"
        );
        assert_eq!(
            engine
                .compare(
                    &Value::List(vec![Value::Int(1)]),
                    &Value::List(vec![Value::Int(1), Value::Int(2)]),
                )
                .unwrap(),
            std::cmp::Ordering::Less,
            "a list that is a strict prefix of another compares less"
        );
    }

    #[test]
    fn equals_matches_nested_and_flat_definitions() {
        // S1: `A.a.b.{x,y,z}` and `B.a.b.{x,y,z}` are equal as structs even
        // though they were built through different container nesting.
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "a.a.b.x", Value::Int(1)).unwrap();
        engine.set_path(root, "a.a.b.y", Value::Int(2)).unwrap();
        engine.set_path(root, "a.a.b.z", Value::Int(3)).unwrap();
        engine.set_path(root, "b.a.b.x", Value::Int(1)).unwrap();
        engine.set_path(root, "b.a.b.y", Value::Int(2)).unwrap();
        engine.set_path(root, "b.a.b.z", Value::Int(3)).unwrap();
        let a = engine
            .path_table()
            .get(&parse_path("@root.a").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        let b = engine
            .path_table()
            .get(&parse_path("@root.b").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        assert!(engine.equals(a, b).unwrap());
    }

    #[test]
    fn equals_after_simple_extends() {
        // S2: a struct that `@extends` another with no overrides ends up
        // equal to it, despite being a distinct node.
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "a.x", Value::Int(1)).unwrap();
        engine.set_path(root, "a.y", Value::Int(2)).unwrap();
        engine.set_path(root, "a.z", Value::Int(3)).unwrap();
        engine.set_path(root, "b.placeholder", Value::Int(0)).unwrap();
        let a = engine
            .path_table()
            .get(&parse_path("@root.a").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        let b = engine
            .path_table()
            .get(&parse_path("@root.b").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        engine.delete_key(b, "placeholder");
        engine.extend_path(b, "..a").unwrap();
        assert_ne!(a, b);
        assert!(engine.equals(a, b).unwrap());
    }

    #[test]
    fn equals_after_extends_with_tombstone_and_overlay() {
        // S3: `x` extends a sibling `a`, tombstones one of its inherited
        // keys, and adds its own key; `z` is written out with the same
        // effective contents directly. Both compare equal after expansion.
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "a.b.a", Value::String("Hello World".into())).unwrap();
        engine.set_path(root, "a.b.x", Value::Int(1)).unwrap();
        engine.set_path(root, "a.b.y", Value::Int(2)).unwrap();
        engine.set_path(root, "a.b.z", Value::Int(3)).unwrap();

        engine.set_path(root, "x.b.w", Value::Int(0)).unwrap();
        engine.mark_path_deleted(root, "x.b.a").unwrap();
        let x = engine
            .path_table()
            .get(&parse_path("@root.x").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        engine.extend_path(x, "..a").unwrap();

        engine.set_path(root, "z.b.w", Value::Int(0)).unwrap();
        engine.set_path(root, "z.b.x", Value::Int(1)).unwrap();
        engine.set_path(root, "z.b.y", Value::Int(2)).unwrap();
        engine.set_path(root, "z.b.z", Value::Int(3)).unwrap();
        let z = engine
            .path_table()
            .get(&parse_path("@root.z").unwrap())
            .and_then(Value::as_struct)
            .unwrap();

        assert!(engine.equals(x, z).unwrap());
    }

    #[test]
    fn build_string_renders_canonical_form() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        engine.set_path(root, "x.y", Value::Int(1)).unwrap();
        let x = engine
            .path_table()
            .get(&parse_path("@root.x").unwrap())
            .and_then(Value::as_struct)
            .unwrap();
        let rendered = engine.build_string(&Value::Struct(x)).unwrap();
        assert_eq!(rendered, "{\n    y: 1\n}");

        let empty = engine.new_child(root, "empty").unwrap();
        assert_eq!(engine.build_string(&Value::Struct(empty)).unwrap(), "{}");

        assert_eq!(engine.build_string(&Value::Bool(true)).unwrap(), "True");
        assert_eq!(engine.build_string(&Value::Null).unwrap(), "None");
        assert_eq!(engine.build_string(&Value::String("hi".into())).unwrap(), "'hi'");

        let long = "x".repeat(81);
        assert_eq!(
            engine.build_string(&Value::String(long.clone())).unwrap(),
            format!("'''{long}'''")
        );
    }

    proptest::proptest! {
        #[test]
        fn set_then_get_round_trips_any_int(n: i64) {
            let mut engine = Engine::new(EngineOptions::default());
            let root = engine.root();
            engine.set_key(root, "n", Value::Int(n)).unwrap();
            let value = engine.get_key_value(root, "n", false).unwrap();
            prop_assert!(matches!(value, Value::Int(v) if v == n));
        }
    }
}
