use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Component, Path};

/// True when any directory component of the file path `path` is exactly one
/// of `ignorable_names`.
///
/// Matching is per component, so `git-backup` never matches `git`. The file
/// name itself is not a directory component and is never matched.
pub fn is_ignorable(path: &Path, ignorable_names: &HashSet<String>) -> bool {
    match path.parent() {
        Some(parent) => is_ignorable_dir(parent, ignorable_names),
        None => false,
    }
}

/// Like [`is_ignorable`], but every component of `dir` counts, its last one included.
pub fn is_ignorable_dir(dir: &Path, ignorable_names: &HashSet<String>) -> bool {
    if ignorable_names.is_empty() {
        return false;
    }
    dir.components().any(|component| match component {
        Component::Normal(name) => is_ignorable_name(name, ignorable_names),
        _ => false,
    })
}

/// True when a single directory name is in the ignorable set.
pub fn is_ignorable_name(name: &OsStr, ignorable_names: &HashSet<String>) -> bool {
    name.to_str()
        .map(|n| ignorable_names.contains(n))
        .unwrap_or(false)
}
