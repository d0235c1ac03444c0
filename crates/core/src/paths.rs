//! Helpers for the '/'-separated relative paths used in plans.

use std::path::{Path, PathBuf};

/// Returns true if `relative` cannot leave the root it is joined to.
/// Rejects absolute paths, drive prefixes, backslashes, and empty, `.`
/// or `..` segments.
pub fn is_contained(relative: &str) -> bool {
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') {
        return false;
    }
    let mut segments = relative.split('/');
    if let Some(first) = segments.clone().next() {
        if first.contains(':') {
            return false;
        }
    }
    segments.all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

/// Returns true if `destination` (a contained folder plus a filename)
/// stays inside the target root. The filename is a single native path
/// component, so on Unix it may carry `\` or `:`.
pub fn is_contained_destination(destination: &str) -> bool {
    if destination.starts_with('/') {
        return false;
    }
    let (folder, filename) = match destination.rsplit_once('/') {
        Some((folder, filename)) => (folder, filename),
        None => ("", destination),
    };
    if !folder.is_empty() && !is_contained(folder) {
        return false;
    }
    is_plain_filename(filename)
}

fn is_plain_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return false;
    }
    !(cfg!(windows) && (name.contains('\\') || name.contains(':')))
}

/// Trims whitespace and surrounding slashes from a folder path.
pub fn normalize_folder(folder: &str) -> String {
    folder.trim().trim_matches('/').to_string()
}

/// `folder/filename`, or just `filename` when the folder is empty.
pub fn join_destination(folder: &str, filename: &str) -> String {
    let folder = normalize_folder(folder);
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{folder}/{filename}")
    }
}

/// Parent folder of a relative destination, empty for top-level files.
pub fn parent_folder(destination: &str) -> &str {
    destination
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

/// Resolves a relative plan path under `root` using native separators.
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|seg| !seg.is_empty())
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
}
