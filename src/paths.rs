// src/paths.rs

//! Canonical relative-path strings.
//!
//! Every view identifier and every change event path goes through
//! [`normalize`] or [`relative_to_root`], so the live-reload matcher only ever
//! compares strings with forward slashes and no leading or trailing slash.

use std::path::{Component, Path};

/// Normalizes a relative path string into its canonical form.
///
/// Backslashes become forward slashes, empty and `.` segments are dropped and
/// leading/trailing slashes are removed. `..` segments are kept verbatim;
/// rejecting them is the resolver's job.
pub fn normalize(raw: &str) -> String {
    raw.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Expresses `path` relative to `root` in canonical form.
///
/// Returns `None` when `path` is not under `root`. The root itself maps to the
/// empty string.
pub fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Returns `true` if the request path contains a parent-directory segment.
pub fn has_parent_segment(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|segment| segment == "..")
}

/// Returns `true` if the canonical path names a markdown document.
pub fn is_markdown(path: &str) -> bool {
    path.ends_with(".md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalize_strips_slashes_and_dots() {
        assert_eq!(normalize("/guide/"), "guide");
        assert_eq!(normalize("guide//./intro.md"), "guide/intro.md");
        assert_eq!(normalize("guide\\sub\\deep.md"), "guide/sub/deep.md");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn relative_to_root_handles_root_and_outside() {
        let root = PathBuf::from("/srv/docs");
        assert_eq!(
            relative_to_root(&root, &root.join("guide").join("intro.md")).as_deref(),
            Some("guide/intro.md")
        );
        assert_eq!(relative_to_root(&root, &root).as_deref(), Some(""));
        assert_eq!(relative_to_root(&root, Path::new("/srv/other/a.md")), None);
        assert_eq!(relative_to_root(&root, Path::new("/srv/docs2/a.md")), None);
    }

    #[test]
    fn parent_segments_are_detected() {
        assert!(has_parent_segment("/../secret.txt"));
        assert!(has_parent_segment("guide/../../etc"));
        assert!(has_parent_segment("..\\x"));
        assert!(!has_parent_segment("guide/..hidden.md"));
        assert!(!has_parent_segment("notes...md"));
    }
}
