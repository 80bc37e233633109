//! Path helpers working on `/`-separated filesystem paths.
//!
//! Paths submitted to the filesystem are always validated and normalized with
//! [`validate`] before they reach the remote session.

use crate::error::{FsError, Result};

/// Characters that may never appear in a path.
pub const INVALID_PATH_CHARS: &[char] = &['\0'];

/// Collapses `.` and `..` components and duplicate separators.
///
/// Fails with [`FsError::IllegalBackReference`] if a `..` would climb above
/// the root.
pub fn normalize(path: &str) -> Result<String> {
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(FsError::IllegalBackReference { path: path.to_owned() });
                }
            }
            other => components.push(other),
        }
    }

    let joined = components.join("/");
    Ok(match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => String::new(),
        (false, false) => joined,
    })
}

/// Normalizes `path` into an absolute path and checks it for forbidden
/// characters.
pub fn validate(path: &str) -> Result<String> {
    if let Some(invalid) = path.chars().find(|c| INVALID_PATH_CHARS.contains(c)) {
        return Err(FsError::InvalidPath {
            path: path.to_owned(),
            message: format!("contains invalid character {invalid:?}"),
        });
    }
    let normalized = normalize(path)?;
    Ok(abspath(&normalized))
}

pub fn abspath(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Joins two paths; an absolute `right` replaces `left`.
pub fn join(left: &str, right: &str) -> String {
    if right.is_empty() {
        left.to_owned()
    } else if right.starts_with('/') || left.is_empty() {
        right.to_owned()
    } else if left.ends_with('/') {
        format!("{left}{right}")
    } else {
        format!("{left}/{right}")
    }
}

pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "",
    }
}

/// Returns every ancestor of an absolute path, root first, excluding the path
/// itself.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut ancestors = Vec::new();
    let mut current = dirname(path);
    while !current.is_empty() {
        ancestors.push(current.to_owned());
        if current == "/" {
            break;
        }
        current = dirname(current);
    }
    ancestors.reverse();
    ancestors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_components() {
        assert_eq!(normalize("/foo//bar/./baz/..").unwrap(), "/foo/bar");
        assert_eq!(normalize("foo/bar/../..").unwrap(), "");
        assert_eq!(normalize("/").unwrap(), "/");
        assert!(matches!(
            normalize("/foo/../.."),
            Err(FsError::IllegalBackReference { .. })
        ));
    }

    #[test]
    fn validate_makes_paths_absolute() {
        assert_eq!(validate("foo/bar").unwrap(), "/foo/bar");
        assert_eq!(validate("").unwrap(), "/");
        assert!(matches!(validate("foo\0bar"), Err(FsError::InvalidPath { .. })));
    }

    #[test]
    fn split_helpers() {
        assert_eq!(basename("/foo/bar.txt"), "bar.txt");
        assert_eq!(basename("bar"), "bar");
        assert_eq!(dirname("/foo/bar.txt"), "/foo");
        assert_eq!(dirname("/foo"), "/");
        assert_eq!(dirname("foo"), "");
        assert_eq!(join("/foo", "bar"), "/foo/bar");
        assert_eq!(join("/", "bar"), "/bar");
        assert_eq!(join("/foo", "/abs"), "/abs");
        assert_eq!(join("/foo", ""), "/foo");
        assert_eq!(ancestors("/a/b/c"), vec!["/", "/a", "/a/b"]);
    }
}
