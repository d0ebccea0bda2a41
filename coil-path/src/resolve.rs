use snafu::ensure;

use crate::error::{EmptyReferenceCtx, MidPathReferenceCtx, PastRootCtx, TooLongCtx};
use crate::{Path, PathError, DELIM, MAX_LEN, ROOT};

/// The result of resolving a relative (or absolute) reference against a base
/// path: the fully resolved absolute path, its container, and its trailing
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The fully resolved absolute path.
    pub path: Path,
    /// The container of [`Self::path`] (equal to `path` when `key` is empty,
    /// i.e. when the result is `@root`).
    pub container: Path,
    /// The trailing key of [`Self::path`], empty when the result is `@root`.
    pub key: String,
}

/// Resolves `reference` against the absolute path `base`.
///
/// If `reference` is itself absolute, it is returned unchanged (split into
/// container and key). Otherwise `reference` may begin with zero or more
/// leading dots: zero dots means `reference` is appended to `base` as-is;
/// each leading dot beyond the first pops one more key off `base` before the
/// remaining suffix of `reference` is appended.
///
/// # Errors
/// - [`PathError::PastRoot`] if resolution would pop past `@root`.
/// - [`PathError::MidPathReference`] if `reference` contains a `..` sequence
///   anywhere but its leading run of dots.
/// - [`PathError::EmptyReference`] if `reference` is only dots (e.g. `..`).
/// - [`PathError::TooLong`] if the resolved path exceeds [`crate::MAX_LEN`]
///   bytes.
pub fn resolve(base: &Path, reference: &str) -> Result<Resolved, PathError> {
    if Path::is_absolute_str(reference) {
        return resolve_absolute(reference);
    }
    resolve_relative(base, reference)
}

fn resolve_absolute(reference: &str) -> Result<Resolved, PathError> {
    Path::validate(reference)?;
    let path = Path::parse(reference)?;
    if path.is_root() {
        return Ok(Resolved {
            path: path.clone(),
            container: path,
            key: String::new(),
        });
    }
    let (container, key) = path.split().expect("non-root absolute path has a key");
    let key = key.to_string();
    Ok(Resolved {
        path,
        container,
        key,
    })
}

fn resolve_relative(base: &Path, reference: &str) -> Result<Resolved, PathError> {
    // count the leading run of dots; zero dots means a plain append, one
    // leading dot also appends with no pops, and each dot beyond the first
    // pops one more key off `base`.
    let dots = reference
        .bytes()
        .take_while(|&b| b == DELIM as u8)
        .count();
    let suffix = &reference[dots..];

    ensure!(
        !suffix.contains(".."),
        MidPathReferenceCtx {
            reference: reference.to_string()
        }
    );
    ensure!(!suffix.is_empty(), EmptyReferenceCtx {});

    let popped = pop_keys(base, dots.saturating_sub(1), reference)?;

    let joined_len = popped.len() + 1 + suffix.len();
    ensure!(
        joined_len <= MAX_LEN,
        TooLongCtx {
            base: base.as_str().to_string(),
            reference: reference.to_string(),
            len: joined_len,
        }
    );

    let mut buf = String::with_capacity(joined_len);
    buf.push_str(&popped);
    buf.push(DELIM);
    buf.push_str(suffix);

    let path = Path::parse(buf)?;
    let (container, key) = path.split().expect("resolved relative path has a key");
    let key = key.to_string();
    Ok(Resolved {
        path,
        container,
        key,
    })
}

/// Pops `n` trailing keys off `base`, returning the remaining prefix.
///
/// # Errors
/// Returns [`PathError::PastRoot`] if popping `n` keys would go past
/// `@root`.
fn pop_keys(base: &Path, n: usize, reference: &str) -> Result<String, PathError> {
    let mut end = base.as_str();
    for _ in 0..n {
        let idx = end.rfind(DELIM).ok_or_else(|| {
            PastRootCtx {
                base: base.as_str().to_string(),
                reference: reference.to_string(),
            }
            .build()
        })?;
        end = &end[..idx];
        ensure!(
            end.len() > ROOT.len() || end == ROOT,
            PastRootCtx {
                base: base.as_str().to_string(),
                reference: reference.to_string(),
            }
        );
    }
    ensure!(
        !end.is_empty(),
        PastRootCtx {
            base: base.as_str().to_string(),
            reference: reference.to_string(),
        }
    );
    Ok(end.to_string())
}

/// Computes the shortest relative reference from `base` to `target`.
///
/// The first point of divergence between `base` and `target` contributes one
/// leading `.` (to step out of the current key); each additional key
/// remaining in `base` beyond the divergence contributes one more `.`; the
/// tail of `target` past the common prefix is appended verbatim.
///
/// If `target` is a prefix-equal ancestor path of itself (i.e. `base ==
/// target`), the result names the struct's own last key via a single
/// back-reference, e.g. `relativize(@root.a.a, @root.a.a) == "..a"`.
#[must_use]
pub fn relativize(base: &Path, target: &Path) -> Path {
    let b = base.as_str();
    let t = target.as_str();

    let mut last_delim_in_base = None;
    let mut common = 0;
    for (i, (bc, tc)) in b.bytes().zip(t.bytes()).enumerate() {
        if bc != tc {
            break;
        }
        if bc == DELIM as u8 {
            last_delim_in_base = Some(i);
        }
        common = i + 1;
    }

    let base_exhausted = common == b.len();
    let target_exhausted = common == t.len();

    if !base_exhausted || target_exhausted {
        let marker = last_delim_in_base.unwrap_or(0);
        let mut out = String::new();
        out.push(DELIM);
        for c in b[marker..].bytes() {
            if c == DELIM as u8 {
                out.push(DELIM);
            }
        }
        let tail = &t[marker..];
        let tail = tail.strip_prefix(DELIM).unwrap_or(tail);
        out.push_str(tail);
        return Path::parse(out).expect("relativize produces a valid reference");
    }

    let tail = t[common..].strip_prefix(DELIM).unwrap_or(&t[common..]);
    Path::parse(tail.to_string()).expect("relativize produces a valid reference")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_nested_append() {
        let base = Path::parse("@root.a.b.c").unwrap();
        let r = resolve(&base, "d.e.f").unwrap();
        assert_eq!(r.path.as_str(), "@root.a.b.c.d.e.f");
        assert_eq!(r.container.as_str(), "@root.a.b.c.d.e");
        assert_eq!(r.key, "f");
    }

    #[test]
    fn s4_single_backreference() {
        let base = Path::parse("@root.one.two.three").unwrap();
        let r = resolve(&base, "..three").unwrap();
        assert_eq!(r.path.as_str(), "@root.one.two.three");
        assert_eq!(r.container.as_str(), "@root.one.two");
        assert_eq!(r.key, "three");
    }

    #[test]
    fn s4_multi_backreference() {
        let base = Path::parse("@root.x.y.z").unwrap();
        let r = resolve(&base, "....a.b.c").unwrap();
        assert_eq!(r.path.as_str(), "@root.a.b.c");
        assert_eq!(r.container.as_str(), "@root.a.b");
        assert_eq!(r.key, "c");
    }

    #[test]
    fn s4_past_root_fails() {
        let base = Path::root();
        assert!(matches!(
            resolve(&base, "..anything"),
            Err(PathError::PastRoot { .. })
        ));
    }

    #[test]
    fn root_alone_resolves_to_itself() {
        let base = Path::parse("@root.a.b").unwrap();
        let r = resolve(&base, ROOT).unwrap();
        assert_eq!(r.path.as_str(), ROOT);
        assert_eq!(r.container.as_str(), ROOT);
        assert_eq!(r.key, "");
    }

    #[test]
    fn dots_alone_is_illegal() {
        let base = Path::parse("@root.a.b").unwrap();
        assert!(matches!(
            resolve(&base, ".."),
            Err(PathError::EmptyReference { .. })
        ));
    }

    #[test]
    fn mid_path_reference_is_illegal() {
        let base = Path::parse("@root.a").unwrap();
        assert!(matches!(
            resolve(&base, ".b..c"),
            Err(PathError::MidPathReference { .. })
        ));
    }

    #[test]
    fn s5_relativize_examples() {
        let base = Path::parse("@root.asdf.bxd").unwrap();
        let target = Path::parse("@root.asdf.bhd.xxx.yyy").unwrap();
        assert_eq!(relativize(&base, &target).as_str(), "..bhd.xxx.yyy");

        let base = Path::parse("@root.asdf.bxd.xxx.yyy").unwrap();
        let target = Path::parse("@root.asdf.bhd").unwrap();
        assert_eq!(relativize(&base, &target).as_str(), "....bhd");

        let base = Path::parse("@root.asdf.bhd").unwrap();
        let target = Path::parse("@root.asdf.bhd.xyz").unwrap();
        assert_eq!(relativize(&base, &target).as_str(), "xyz");

        let base = Path::parse("@root.asdf.asdf").unwrap();
        let target = Path::parse("@root.asdf.asdf").unwrap();
        assert_eq!(relativize(&base, &target).as_str(), "..asdf");
    }

    #[test]
    fn relativize_then_resolve_round_trips() {
        let base = Path::parse("@root.asdf.bxd").unwrap();
        let target = Path::parse("@root.asdf.bhd.xxx.yyy").unwrap();
        let rel = relativize(&base, &target);
        let resolved = resolve(&base, rel.as_str()).unwrap();
        assert_eq!(resolved.path, target);
    }

    proptest::proptest! {
        #[test]
        fn prop_relativize_round_trips(
            base_keys in proptest::collection::vec("[a-z][a-z0-9]{0,4}", 1..5),
            target_keys in proptest::collection::vec("[a-z][a-z0-9]{0,4}", 1..5),
        ) {
            let base = Path::build(ROOT, base_keys.iter().map(String::as_str)).unwrap();
            let target = Path::build(ROOT, target_keys.iter().map(String::as_str)).unwrap();
            let rel = relativize(&base, &target);
            let resolved = resolve(&base, rel.as_str()).unwrap();
            proptest::prop_assert_eq!(resolved.path, target);
        }
    }
}
