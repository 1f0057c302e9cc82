//! Parsed routes: separator-free component lists with an absolute flag.

use crate::error::{Error, Result};
use std::fmt;

/// Path separator.
pub const SEPARATOR: char = '/';

/// Current-directory component.
pub const CURRENT_DIR: &str = ".";

/// Parent-directory component.
pub const PARENT_DIR: &str = "..";

/// An immutable parsed path.
///
/// Ordering puts absoluteness first, then compares components
/// lexicographically. `.` and `..` are kept as components; the resolver
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route {
    absolute: bool,
    components: Vec<String>,
}

impl Route {
    /// Build a route from components.
    ///
    /// Every component must be a valid node name or one of `.` and `..`.
    pub fn new<I, S>(absolute: bool, components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        for component in &components {
            if component != CURRENT_DIR && component != PARENT_DIR {
                validate_name(component)?;
            }
        }
        Ok(Self {
            absolute,
            components,
        })
    }

    /// The absolute root route.
    pub fn root() -> Self {
        Self {
            absolute: true,
            components: Vec::new(),
        }
    }

    /// Parse a slash-separated path string.
    ///
    /// Empty segments (doubled or trailing separators) are dropped.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::InvalidPath("empty path".to_string()));
        }

        let components: Vec<String> = path
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Ok(Self {
            absolute: path.starts_with(SEPARATOR),
            components,
        })
    }

    /// Whether the route starts at the root.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether this is the root route.
    pub fn is_root(&self) -> bool {
        self.absolute && self.components.is_empty()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the route has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Component at `index`.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    /// The route without its last component.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            None
        } else {
            Some(self.prefix(self.components.len() - 1))
        }
    }

    /// The first `len` components.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            absolute: self.absolute,
            components: self.components[..len.min(self.components.len())].to_vec(),
        }
    }

    /// Last component.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Append a child name.
    pub fn join(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Self {
            absolute: self.absolute,
            components,
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "{}", SEPARATOR)?;
        }
        if self.components.is_empty() && !self.absolute {
            return write!(f, "{}", CURRENT_DIR);
        }
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::str::FromStr for Route {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Check that `name` can name a node.
///
/// Names must be non-empty, must not contain the separator, and must not be
/// `.` or `..`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(SEPARATOR)
        || name == CURRENT_DIR
        || name == PARENT_DIR
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root() {
        let route = Route::parse("/").unwrap();
        assert!(route.is_root());
        assert!(route.is_absolute());
        assert_eq!(route.to_string(), "/");
    }

    #[test]
    fn test_parse_simple() {
        let route = Route::parse("/foo/bar").unwrap();
        assert!(!route.is_root());
        assert_eq!(route.components(), &["foo", "bar"]);
        assert_eq!(route.to_string(), "/foo/bar");
    }

    #[test]
    fn test_parse_relative() {
        let route = Route::parse("foo//../bar/").unwrap();
        assert!(!route.is_absolute());
        assert_eq!(route.components(), &["foo", "..", "bar"]);
        assert_eq!(route.to_string(), "foo/../bar");
        assert_eq!(Route::parse(".").unwrap().to_string(), ".");
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(Route::parse("").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        let route = Route::parse("/foo/bar/baz").unwrap();
        assert_eq!(route.parent().unwrap().to_string(), "/foo/bar");
        assert_eq!(route.name(), Some("baz"));
        assert_eq!(route.prefix(1).to_string(), "/foo");

        assert!(Route::root().parent().is_none());
        assert_eq!(Route::root().name(), None);
    }

    #[test]
    fn test_join() {
        let route = Route::parse("/foo").unwrap();
        assert_eq!(route.join("bar").unwrap().to_string(), "/foo/bar");
        assert!(route.join("bar/baz").is_err());
        assert!(route.join("..").is_err());
        assert!(route.join(".").is_err());
        assert!(route.join("").is_err());
    }

    #[test]
    fn test_new_validates() {
        assert!(Route::new(true, ["a", "..", "."]).is_ok());
        assert!(matches!(
            Route::new(true, ["a/b"]),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_ordering() {
        let relative = Route::parse("z").unwrap();
        let absolute = Route::parse("/a").unwrap();
        assert!(relative < absolute);

        let a = Route::parse("/a/b").unwrap();
        let b = Route::parse("/a/c").unwrap();
        assert!(a < b);
        assert!(Route::parse("/a").unwrap() < a);
        assert_eq!(a, "/a//b/".parse::<Route>().unwrap());
    }
}
