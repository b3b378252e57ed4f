//! Virtual path normalization
//!
//! Cache keys, history records and prefetch tasks all use the normalized form:
//! a single leading `/`, no empty or `.` segments, no trailing `/`.

use crate::error::{CacheError, Result};

/// Normalize a virtual path such as `output//cats/./` into `/output/cats`
pub fn normalize(path: &str) -> Result<String> {
    let mut normalized = String::with_capacity(path.len() + 1);

    for segment in path.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => continue,
            ".." => return Err(CacheError::InvalidPath(path.to_string())),
            _ => {
                normalized.push('/');
                normalized.push_str(segment);
            }
        }
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Parent of a normalized path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Append an entry name to a normalized folder path
pub fn join(folder: &str, name: &str) -> String {
    if folder == "/" {
        format!("/{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// Final segment of a normalized path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
