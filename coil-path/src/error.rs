use snafu::{Backtrace, Snafu};

/// Errors raised while building, validating, or resolving a [`Path`](crate::Path).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub), context(suffix(Ctx)))]
pub enum PathError {
    /// The path or key did not match the coil grammar.
    #[snafu(display("'{value}' is not a valid coil path"))]
    InvalidPath { value: String, backtrace: Backtrace },

    /// A path or key exceeded [`crate::MAX_LEN`] bytes outside of a resolve
    /// operation (e.g. direct parsing or building).
    #[snafu(display(
        "'{value}' is {len} bytes long; a path can contain a maximum of {max} characters",
        max = crate::MAX_LEN
    ))]
    PathTooLong {
        value: String,
        len: usize,
        backtrace: Backtrace,
    },

    /// A key did not match `-*[A-Za-z_][\w-]*`.
    #[snafu(display("'{value}' is not a valid coil key"))]
    InvalidKey { value: String, backtrace: Backtrace },

    /// Resolving a reference would pop past `@root`.
    #[snafu(display(
        "path contains a reference past root while resolving '{reference}' against '{base}'"
    ))]
    PastRoot {
        base: String,
        reference: String,
        backtrace: Backtrace,
    },

    /// A mid-path `..` sequence, e.g. `a..b`, which is only legal at the
    /// start of a reference.
    #[snafu(display("mid-path references ('..') in '{reference}' are not allowed"))]
    MidPathReference {
        reference: String,
        backtrace: Backtrace,
    },

    /// A reference consisting of only dots, e.g. `..` or `...`, with no
    /// trailing key.
    #[snafu(display(
        "references must contain at least one key, e.g. '..a'; '..' alone is not allowed"
    ))]
    EmptyReference { backtrace: Backtrace },

    /// The resolved path exceeded [`crate::MAX_LEN`] bytes.
    #[snafu(display(
        "path length was too long ({len}) when resolving '{reference}' against '{base}'; \
         a path can contain a maximum of {max} characters",
        max = crate::MAX_LEN
    ))]
    TooLong {
        base: String,
        reference: String,
        len: usize,
        backtrace: Backtrace,
    },
}
