//! Path algebra for coil configuration graphs.
//!
//! A coil [`Path`] is an immutable, validated string identifying a location
//! within a configuration tree. Paths come in two forms:
//!
//! - *absolute*, beginning with the root marker [`ROOT`] (`@root`),
//!   followed by zero or more dot-separated keys, e.g. `@root.a.b.c`
//! - *relative*, beginning with one or more leading dots (back-references),
//!   followed by one or more keys, e.g. `..a.b`, `....x`
//!
//! ```rust
//! use coil_path::Path;
//!
//! let base = Path::parse("@root.a.b.c").unwrap();
//! let resolved = coil_path::resolve(&base, "d.e.f").unwrap();
//! assert_eq!(resolved.path.as_str(), "@root.a.b.c.d.e.f");
//! assert_eq!(resolved.container.as_str(), "@root.a.b.c.d.e");
//! assert_eq!(resolved.key, "f");
//! ```

mod error;
mod path;
mod resolve;

pub use error::PathError;
pub use path::Path;
pub use resolve::{relativize, resolve, Resolved};

/// The root marker, `@root`.
pub const ROOT: &str = "@root";

/// The path component delimiter, `.`.
pub const DELIM: char = '.';

/// Maximum length, in bytes, of a coil path.
pub const MAX_LEN: usize = 255;
