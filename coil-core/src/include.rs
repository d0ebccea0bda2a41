//! `Include`: loads another file's root struct and merges it into its
//! container (SPEC_FULL.md §4.E).

use std::path::{Path as FsPath, PathBuf};

use snafu::ResultExt;

use crate::engine::Engine;
use crate::error::{CoilError, PathCtx};
use crate::expand::{self, Visited};
use crate::value::{IncludeValue, Value};

/// The parsing collaborator an [`Engine`] delegates to when it needs to load
/// another file (SPEC_FULL.md §6, "Parser collaborator").
///
/// A parser implementation is expected to produce a fully-populated
/// [`Engine`] (its own arena, rooted at its own `@root`) from the file at
/// `path`. This crate never parses Coil source itself — it only knows how to
/// merge an already-parsed `Engine` into another.
pub trait Parser: std::fmt::Debug + Send + Sync {
    /// Parses the file at `path` into a freshly-built [`Engine`].
    fn parse_file(&self, path: &FsPath) -> Result<Engine, CoilError>;
}

/// `expand(self)` (SPEC_FULL.md §4.E).
///
/// 1. Resolves `include.include_path_value` to a string (expanding it if
///    it's itself a link).
/// 2. Anchors a relative include path against the including engine's
///    `source_file`, if known.
/// 3. Rejects an include that names the including file itself.
/// 4. Consults the process-wide include cache ([`crate::cache`]), which
///    invokes the configured [`Parser`] on a cache miss or stale mtime.
/// 5. Merges the included root into `container` — either in full, or
///    restricted to `import_list`'s named entries.
///
/// Memoization of "has this include already run" happens at the owning
/// struct's level (`StructNode::expanded`), not on `IncludeValue` itself —
/// by the time `expand_struct` walks to this dependency a second time, the
/// struct-level check has already short-circuited, so `include.state` is
/// never consulted here.
pub(crate) fn expand(
    engine: &mut Engine,
    include: IncludeValue,
    container: crate::node::NodeKey,
    visited: &mut Visited,
) -> Result<(), CoilError> {
    let path_value = expand::expand_any(engine, (*include.include_path_value).clone(), visited)?;
    let Value::String(include_path) = path_value else {
        return Err(CoilError::value_error(format!(
            "include path must resolve to a string, found {}",
            path_value.kind()
        )));
    };

    let file_path = anchor(engine, &include_path);
    if let Some(source) = engine.source_file() {
        if paths_equal(source, &file_path) {
            return Err(CoilError::struct_error(format!(
                "'{include_path}' includes itself"
            )));
        }
    }

    let parser = engine
        .parser()
        .cloned()
        .ok_or_else(|| CoilError::struct_error("no parser configured to resolve `Include` values"))?;

    let mut included = crate::cache::load(parser.as_ref(), &file_path)?;
    let included_root = included.root();

    match include.import_list {
        None => expand::merge_foreign(engine, container, &mut included, included_root, false)?,
        Some(imports) => {
            for import in imports {
                let name_value = expand::expand_any(engine, import, visited)?;
                let Value::String(name) = name_value else {
                    return Err(CoilError::value_error(format!(
                        "import entry must resolve to a string, found {}",
                        name_value.kind()
                    )));
                };
                import_one(engine, container, &mut included, &name)?;
            }
        }
    }
    Ok(())
}

fn import_one(
    engine: &mut Engine,
    container: crate::node::NodeKey,
    included: &mut Engine,
    name: &str,
) -> Result<(), CoilError> {
    let included_root_path = included.path_of(included.root()).clone();
    let resolved = coil_path::resolve(&included_root_path, name).context(PathCtx { location: None })?;
    let src_container = included
        .path_table()
        .get(&resolved.container)
        .and_then(Value::as_struct)
        .ok_or_else(|| CoilError::struct_error(format!("'{name}' does not exist in included file")))?;
    let value = included.get_key_value(src_container, &resolved.key, false)?;
    let copied = expand::copy_foreign_value(engine, container, included, value)?;
    engine.set_key(container, &resolved.key, copied)
}

/// `build_string(self)` (SPEC_FULL.md §4.E, §6): renders the literal
/// `@file: ...` directive syntax, including an `import_list` if present.
/// Grounded on `coil_include.c`'s `_include_build_string`, which renders the
/// stored (unexpanded) `include_path_value`/`import_list` values directly
/// rather than resolving the include first.
pub(crate) fn build_string(engine: &mut Engine, include: &IncludeValue, buffer: &mut String) -> Result<(), CoilError> {
    buffer.push_str("@file: ");
    match &include.import_list {
        Some(imports) => {
            buffer.push_str("[ ");
            engine.render_value(buffer, &include.include_path_value, "")?;
            for import in imports {
                buffer.push(' ');
                engine.render_value(buffer, import, "")?;
            }
            buffer.push_str(" ]");
        }
        None => engine.render_value(buffer, &include.include_path_value, "")?,
    }
    Ok(())
}

fn anchor(engine: &Engine, include_path: &str) -> PathBuf {
    let candidate = PathBuf::from(include_path);
    if candidate.is_absolute() {
        return candidate;
    }
    match engine.source_file().and_then(FsPath::parent) {
        Some(dir) => dir.join(candidate),
        None => candidate,
    }
}

fn paths_equal(a: &FsPath, b: &FsPath) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct StubParser {
        calls: Mutex<u32>,
    }

    impl Parser for StubParser {
        fn parse_file(&self, _path: &FsPath) -> Result<Engine, CoilError> {
            *self.calls.lock().unwrap() += 1;
            let mut other = Engine::new(EngineOptions::default());
            let root = other.root();
            other.set_key(root, "greeting", Value::String("hi".into())).unwrap();
            Ok(other)
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("coil-include-test-{name}-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn merges_whole_included_root() {
        let dir = scratch_dir("merge");
        let main = dir.join("main.coil");
        let other = dir.join("other.coil");
        std::fs::write(&other, "greeting: hi\n").unwrap();

        let parser = Arc::new(StubParser { calls: Mutex::new(0) });
        let mut engine = Engine::with_parser(EngineOptions::default(), Some(parser.clone() as Arc<dyn Parser>));
        engine.set_source_file(main);
        let root = engine.root();
        let include = IncludeValue::new(Value::String("other.coil".into()), None, root);
        expand(&mut engine, include, root, &mut Visited::default()).unwrap();
        let value = engine.get_key_value(root, "greeting", false).unwrap();
        assert!(matches!(value, Value::String(s) if s == "hi"));
    }

    #[test]
    fn rejects_self_include() {
        let dir = scratch_dir("self");
        let main = dir.join("main.coil");
        std::fs::write(&main, "x: 1\n").unwrap();

        let parser = Arc::new(StubParser { calls: Mutex::new(0) });
        let mut engine = Engine::with_parser(EngineOptions::default(), Some(parser as Arc<dyn Parser>));
        engine.set_source_file(main.clone());
        let root = engine.root();
        let include = IncludeValue::new(Value::String(main.display().to_string()), None, root);
        let result = expand(&mut engine, include, root, &mut Visited::default());
        assert!(result.is_err());
    }

    #[test]
    fn build_string_renders_literal_directive() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        let mut buffer = String::new();
        let include = IncludeValue::new(Value::String("other.coil".into()), None, root);
        build_string(&mut engine, &include, &mut buffer).unwrap();
        assert_eq!(buffer, "@file: 'other.coil'");
    }

    #[test]
    fn build_string_renders_import_list() {
        let mut engine = Engine::new(EngineOptions::default());
        let root = engine.root();
        let mut buffer = String::new();
        let include = IncludeValue::new(
            Value::String("other.coil".into()),
            Some(vec![Value::String("a".into()), Value::String("b".into())]),
            root,
        );
        build_string(&mut engine, &include, &mut buffer).unwrap();
        assert_eq!(buffer, "@file: [ 'other.coil' 'a' 'b' ]");
    }
}
