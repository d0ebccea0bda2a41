//! Process-wide include cache, keyed by canonical filename with mtime-based
//! invalidation (SPEC_FULL.md §4.G).

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use once_cell::sync::Lazy;

use crate::engine::Engine;
use crate::error::{CoilError, FileCtx};
use crate::include::Parser;

struct CacheEntry {
    engine: Engine,
    mtime: SystemTime,
    refcount: u64,
}

static CACHE: Lazy<Mutex<HashMap<PathBuf, CacheEntry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Loads `file_path` through `parser`, reusing a cached parse when the
/// file's mtime is unchanged since it was last loaded.
///
/// Reference counts are tracked per SPEC_FULL.md §4.G's record shape, but
/// this crate never evicts a cache entry on refcount reaching zero: without
/// a `Drop` hook wired to every consumer's lifetime, eviction would risk
/// dropping a record still reachable from another engine's `Include`
/// dependency. The cache simply lives for the process, which the
/// specification allows as an implementation choice (see DESIGN.md, "Include
/// cache eviction").
pub(crate) fn load(parser: &dyn Parser, file_path: &FsPath) -> Result<Engine, CoilError> {
    let canonical = file_path.canonicalize().unwrap_or_else(|_| file_path.to_path_buf());
    let metadata = std::fs::metadata(&canonical).map_err(|err| file_error(&canonical, &err))?;
    let mtime = metadata
        .modified()
        .map_err(|err| file_error(&canonical, &err))?;

    let mut cache = CACHE.lock().expect("include cache mutex poisoned");
    if let Some(entry) = cache.get_mut(&canonical) {
        if entry.mtime == mtime {
            entry.refcount += 1;
            return Ok(entry.engine.clone());
        }
        let mut engine = parser.parse_file(&canonical)?;
        engine.set_source_file(canonical.clone());
        entry.engine = engine.clone();
        entry.mtime = mtime;
        entry.refcount += 1;
        return Ok(engine);
    }

    let mut engine = parser.parse_file(&canonical)?;
    engine.set_source_file(canonical.clone());
    cache.insert(
        canonical,
        CacheEntry {
            engine: engine.clone(),
            mtime,
            refcount: 1,
        },
    );
    Ok(engine)
}

fn file_error(path: &FsPath, err: &std::io::Error) -> CoilError {
    FileCtx {
        message: format!("{}: {err}", path.display()),
        location: None,
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::value::Value;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct CountingParser {
        calls: AtomicU32,
    }

    impl Parser for CountingParser {
        fn parse_file(&self, _path: &FsPath) -> Result<Engine, CoilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut engine = Engine::new(EngineOptions::default());
            let root = engine.root();
            engine.set_key(root, "n", Value::Int(1)).unwrap();
            Ok(engine)
        }
    }

    #[test]
    fn reuses_cached_parse_until_mtime_changes() {
        let mut file = tempfile_like("coil-cache-test");
        writeln!(file.1, "x").unwrap();
        let parser = CountingParser { calls: AtomicU32::new(0) };

        let _ = load(&parser, &file.0).unwrap();
        let _ = load(&parser, &file.0).unwrap();
        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
    }

    fn tempfile_like(name: &str) -> (PathBuf, std::fs::File) {
        let mut path = std::env::temp_dir();
        path.push(format!("{name}-{:?}", std::thread::current().id()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
