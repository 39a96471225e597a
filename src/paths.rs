//! Path model for the virtual filesystem.
//!
//! Every resource is addressed by a plain object key. Keys ending in `/`
//! are folder markers, everything else is a file. All functions here are
//! pure string manipulation; none of them touch the object store.

use crate::store::{StorageError, StorageResult};

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Characters rejected anywhere in a user-supplied path.
const FORBIDDEN_CHARS: [char; 8] = ['<', '>', ':', '"', '\\', '|', '?', '*'];

/// Returns `true` when `path` denotes a folder marker.
pub fn is_folder(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Parent directory of `path`, including its trailing `/`.
///
/// A trailing `/` on `path` is ignored, so the parent of `a/b/` is `a/`.
/// Returns `/` when nothing is left above the last segment.
pub fn parent_path(path: &str) -> &str {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Last segment of `path`. Folders keep their trailing `/`.
pub fn base_name(path: &str) -> &str {
    if path.is_empty() {
        return "";
    }
    if path == "/" {
        return "/";
    }
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// `full_path` with the `ancestor` prefix removed.
///
/// Callers must guarantee that `ancestor` is a prefix of `full_path`;
/// otherwise `full_path` is returned unchanged.
pub fn relative_path<'a>(full_path: &'a str, ancestor: &str) -> &'a str {
    full_path.strip_prefix(ancestor).unwrap_or(full_path)
}

/// Returns `true` when `path` lies inside the subtree rooted at `candidate`
/// or is `candidate` itself.
///
/// Only folders have subtrees, so a file is an ancestor of nothing but
/// itself (`a.txt` does not contain `a.txt.bak`).
pub fn is_ancestor_or_self(candidate: &str, path: &str) -> bool {
    if is_folder(candidate) {
        path.starts_with(candidate)
    } else {
        path == candidate
    }
}

/// Name offered to clients when downloading `path`: folders are served as
/// `<name>.zip`.
pub fn filename_for_download(path: &str) -> String {
    let name = base_name(path);
    match name.strip_suffix(SEPARATOR) {
        Some(folder) => format!("{folder}.zip"),
        None => name.to_string(),
    }
}

/// Returns `true` when `path` contains none of `<>:"\|?*` and no control
/// characters.
pub fn has_valid_characters(path: &str) -> bool {
    !path
        .chars()
        .any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c))
}

/// Directory paths must be empty (the root) or end with `/`.
pub fn is_valid_directory_end(path: &str) -> bool {
    path.is_empty() || is_folder(path)
}

/// Normalise a client-supplied relative file name the way a filesystem path
/// would be: empty and `.` segments are dropped and `..` removes the previous
/// segment. Fails when the name is blank, names a folder or climbs above the
/// upload root.
pub fn normalize_relative(name: &str) -> StorageResult<String> {
    if !has_valid_characters(name) {
        return Err(StorageError::InvalidArgument(format!(
            "file name `{name}` contains invalid characters"
        )));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::InvalidArgument(format!(
                        "file name `{name}` escapes the upload directory"
                    )));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() || is_folder(name) {
        return Err(StorageError::InvalidArgument(format!(
            "`{name}` is not a valid file name"
        )));
    }

    Ok(segments.join("/"))
}

/// Every ancestor directory of a normalised relative file path, e.g.
/// `a/b/c.txt` yields `a/` and `a/b/`.
pub fn ancestor_directories(relative: &str) -> impl Iterator<Item = &str> {
    relative
        .match_indices(SEPARATOR)
        .map(move |(idx, _)| &relative[..=idx])
}

/// The root namespace prefix of a user.
pub fn user_root(user_id: i64) -> String {
    format!("user-{user_id}-files/")
}
