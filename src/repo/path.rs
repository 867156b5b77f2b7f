//! Absolute repository path helpers.

use crate::repo::RepoError;

pub const ROOT: &str = "/";

pub fn is_same_or_descendant(p: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return p.starts_with('/');
    }
    p == ancestor
        || (p.starts_with(ancestor) && p.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

pub fn is_descendant(p: &str, ancestor: &str) -> bool {
    p != ancestor && is_same_or_descendant(p, ancestor)
}

pub fn parent(p: &str) -> Option<&str> {
    if p == ROOT {
        return None;
    }
    match p.rfind('/') {
        Some(0) => Some(ROOT),
        Some(i) => Some(&p[..i]),
        None => None,
    }
}

pub fn name(p: &str) -> &str {
    match p.rfind('/') {
        Some(i) => &p[i + 1..],
        None => p,
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub fn depth(p: &str) -> usize {
    segments(p).count()
}

pub fn segments(p: &str) -> impl Iterator<Item = &str> {
    p.split('/').filter(|s| !s.is_empty())
}

/// Canonical absolute form: no empty, `.` or `..` segments.
pub fn normalize(p: &str) -> Result<String, RepoError> {
    if !p.starts_with('/') {
        return Err(RepoError::InvalidPath(p.to_string()));
    }
    let mut out: Vec<&str> = Vec::new();
    for seg in p.split('/').skip(1) {
        match seg {
            "" if out.is_empty() && p == ROOT => {}
            "" => return Err(RepoError::InvalidPath(p.to_string())),
            "." => {}
            ".." => {
                if out.pop().is_none() {
                    return Err(RepoError::InvalidPath(p.to_string()));
                }
            }
            s => out.push(s),
        }
    }
    Ok(format!("/{}", out.join("/")))
}

/// Resolves `rel` against `base` unless it is already absolute.
pub fn resolve(base: &str, rel: &str) -> Result<String, RepoError> {
    if rel.starts_with('/') {
        normalize(rel)
    } else if rel.is_empty() {
        Err(RepoError::InvalidPath(rel.to_string()))
    } else {
        normalize(&join(base, rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/content"), Some("/"));
        assert_eq!(parent("/content/acme"), Some("/content"));
        assert_eq!(name("/content/acme"), "acme");
        assert_eq!(name("/"), "");
    }

    #[test]
    fn descendant_checks_respect_segment_boundaries() {
        assert!(is_same_or_descendant("/content/acme", "/content"));
        assert!(!is_same_or_descendant("/contentx", "/content"));
        assert!(is_same_or_descendant("/anything", "/"));
        assert!(!is_descendant("/content", "/content"));
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("/a/./b/../c").unwrap(), "/a/c");
        assert!(normalize("relative").is_err());
        assert!(normalize("/a//b").is_err());
        assert!(normalize("/..").is_err());
        assert_eq!(resolve("/a/b", "../c").unwrap(), "/a/c");
        assert_eq!(resolve("/", "a").unwrap(), "/a");
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/a/b"), 2);
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }
}
