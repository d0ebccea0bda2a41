use std::fmt;
use std::ops::Deref;

use once_cell::sync::Lazy;
use regex::Regex;
use snafu::ensure;

use crate::error::{InvalidKeyCtx, InvalidPathCtx, PathTooLongCtx};
use crate::{PathError, DELIM, MAX_LEN, ROOT};

const KEY_PATTERN: &str = r"^-*[A-Za-z_][\w-]*$";
const PATH_PATTERN: &str = r"^(@root|\.\.+)?-*[A-Za-z_][\w-]*(\.-*[A-Za-z_][\w-]*)*$";

static KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(KEY_PATTERN).unwrap());
static PATH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(PATH_PATTERN).unwrap());

/// An immutable, validated coil path.
///
/// A `Path` is either absolute (`@root`, optionally followed by `.`-separated
/// keys) or relative (one or more leading dots followed by at least one
/// key). See the [module docs](crate) for the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    /// The root path, `@root`.
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT.to_string())
    }

    /// Parses and validates `value` as a coil path (absolute or relative).
    ///
    /// # Errors
    /// Returns [`PathError::InvalidPath`] if `value` does not match the coil
    /// path grammar, or [`PathError::TooLong`] if it exceeds
    /// [`crate::MAX_LEN`] bytes.
    pub fn parse(value: impl Into<String>) -> Result<Self, PathError> {
        let value = value.into();
        Self::validate_str(&value)?;
        Ok(Self(value))
    }

    /// Validates `value` as a coil path without allocating.
    ///
    /// # Errors
    /// Returns [`PathError::InvalidPath`] if `value` is not `@root` and does
    /// not match the coil path grammar.
    pub fn validate(value: &str) -> Result<(), PathError> {
        Self::validate_str(value)
    }

    fn validate_str(value: &str) -> Result<(), PathError> {
        ensure!(
            value.len() <= MAX_LEN,
            PathTooLongCtx {
                value: value.to_string(),
                len: value.len(),
            }
        );
        ensure!(
            value == ROOT || PATH_REGEX.is_match(value),
            InvalidPathCtx {
                value: value.to_string()
            }
        );
        Ok(())
    }

    /// Validates `key` as a single coil key (`-*[A-Za-z_][\w-]*`).
    ///
    /// # Errors
    /// Returns [`PathError::InvalidKey`] if `key` does not match the grammar.
    pub fn validate_key(key: &str) -> Result<(), PathError> {
        ensure!(
            KEY_REGEX.is_match(key),
            InvalidKeyCtx {
                value: key.to_string()
            }
        );
        Ok(())
    }

    /// Builds a path by joining `base` with zero or more additional keys
    /// using [`DELIM`].
    ///
    /// # Errors
    /// Returns [`PathError::TooLong`] if the joined path exceeds
    /// [`crate::MAX_LEN`] bytes.
    pub fn build<'k>(base: &str, keys: impl IntoIterator<Item = &'k str>) -> Result<Self, PathError> {
        let mut buf = String::from(base);
        for key in keys {
            buf.push(DELIM);
            buf.push_str(key);
        }
        Self::validate_str(&buf)?;
        Ok(Self(buf))
    }

    /// Returns `true` if `value` begins with the root marker [`ROOT`](crate::ROOT).
    #[must_use]
    pub fn is_absolute_str(value: &str) -> bool {
        value == ROOT || value.starts_with(&format!("{ROOT}{DELIM}"))
    }

    /// Returns `true` if `value` begins with [`DELIM`].
    #[must_use]
    pub fn is_relative_str(value: &str) -> bool {
        value.starts_with(DELIM)
    }

    /// Returns `true` if this path is absolute.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        Self::is_absolute_str(&self.0)
    }

    /// Returns `true` if this path is relative.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        Self::is_relative_str(&self.0)
    }

    /// Returns `true` if this path is exactly `@root`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    /// Returns the path as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits off the last key, returning `(container, key)`, or `None` if
    /// `self` is the root (has no key).
    #[must_use]
    pub fn split(&self) -> Option<(Path, &str)> {
        let offset = self.0.rfind(DELIM)?;
        let (container, key) = self.0.split_at(offset);
        let key = &key[1..];
        if key.is_empty() {
            return None;
        }
        Some((Path(container.to_string()), key))
    }

    /// Returns the container path (everything before the last key), or
    /// `None` if this path has no container (e.g. `@root`, or a bare key
    /// like `x`).
    #[must_use]
    pub fn container(&self) -> Option<Path> {
        self.split().map(|(container, _)| container)
    }

    /// Returns the last key in the path, or `None` if absent (e.g. `@root`).
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        match self.split() {
            Some((_, key)) => Some(key),
            None => Some(&self.0),
        }
    }

    /// Returns `true` if `self` is a descendant of `maybe_container` (i.e.
    /// strictly nested beneath it, at any depth).
    #[must_use]
    pub fn is_descendant_of(&self, maybe_container: &Path) -> bool {
        has_container(&self.0, &maybe_container.0, false)
    }

    /// Returns `true` if `self`'s immediate container is exactly
    /// `maybe_container`.
    #[must_use]
    pub fn has_container(&self, maybe_container: &Path) -> bool {
        has_container(&self.0, &maybe_container.0, true)
    }
}

fn has_container(path: &str, base: &str, strict: bool) -> bool {
    if base == ROOT {
        return path != ROOT;
    }
    let Some(suffix) = path.strip_prefix(base) else {
        return false;
    };
    let Some(rest) = suffix.strip_prefix(DELIM) else {
        return false;
    };
    if strict {
        !rest.contains(DELIM)
    } else {
        true
    }
}

impl Deref for Path {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Path {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Path {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_key() {
        let root = Path::root();
        assert_eq!(root.key(), None);
        assert_eq!(root.container(), None);
    }

    #[test]
    fn split_nested() {
        let p = Path::parse("@root.a.b.c").unwrap();
        let (container, key) = p.split().unwrap();
        assert_eq!(container.as_str(), "@root.a.b");
        assert_eq!(key, "c");
    }

    #[test]
    fn rejects_mid_path_double_dot() {
        assert!(Path::parse("a..b").is_err());
    }

    #[test]
    fn rejects_bare_key_past_255() {
        let long_key = "a".repeat(256);
        assert!(Path::parse(long_key).is_err());
    }

    #[test]
    fn accepts_path_of_exactly_255_bytes() {
        // "@root." (6) + 'a' * 249 = 255
        let value = format!("@root.{}", "a".repeat(249));
        assert_eq!(value.len(), 255);
        assert!(Path::parse(value).is_ok());
    }

    #[test]
    fn rejects_path_of_256_bytes() {
        let value = format!("@root.{}", "a".repeat(250));
        assert_eq!(value.len(), 256);
        assert!(Path::parse(value).is_err());
    }

    #[test]
    fn validates_key_grammar() {
        assert!(Path::validate_key("foo-bar").is_ok());
        assert!(Path::validate_key("--_weird").is_ok());
        assert!(Path::validate_key("1abc").is_err());
        assert!(Path::validate_key("").is_err());
    }

    #[test]
    fn descendant_and_container_checks() {
        let base = Path::parse("@root.a").unwrap();
        let child = Path::parse("@root.a.b").unwrap();
        let grandchild = Path::parse("@root.a.b.c").unwrap();
        assert!(child.has_container(&base));
        assert!(!grandchild.has_container(&base));
        assert!(grandchild.is_descendant_of(&base));
        assert!(child.is_descendant_of(&base));
    }
}
