use crate::error::{Error, Result};

const MAX_SEGMENT_LEN: usize = 100;
const MAX_PATH_LEN: usize = 1024;

/// Normalizes an externally supplied path into the stored form `/a/b/c`.
pub fn normalize_path(path: &str) -> Result<String> {
    let path = path.trim();

    if path.is_empty() {
        return Err(Error::BadRequest("Path cannot be empty".to_string()));
    }

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(Error::BadRequest("Path cannot be empty".to_string()));
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    let normalized = format!("/{}", segments.join("/"));
    if normalized.len() > MAX_PATH_LEN {
        return Err(Error::BadRequest(format!(
            "Path cannot exceed {MAX_PATH_LEN} characters"
        )));
    }

    Ok(normalized)
}

/// Validates a single path segment, i.e. the uid of a space or repository.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::BadRequest(
            "Path segment cannot be empty".to_string(),
        ));
    }

    if segment.len() > MAX_SEGMENT_LEN {
        return Err(Error::BadRequest(format!(
            "Path segment cannot exceed {MAX_SEGMENT_LEN} characters"
        )));
    }

    if segment == "." || segment == ".." {
        return Err(Error::BadRequest(
            "Path segment cannot be a relative reference".to_string(),
        ));
    }

    const INVALID_CHARS: &[char] = &['/', '\0', '\n', '\r'];
    if segment.chars().any(|c| INVALID_CHARS.contains(&c) || c.is_whitespace()) {
        return Err(Error::BadRequest(
            "Path segment contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Builds the full path of a resource named `uid` under `parent_path`;
/// root spaces have no prefix.
pub fn join_path(parent_path: Option<&str>, uid: &str) -> Result<String> {
    validate_segment(uid)?;
    match parent_path {
        Some(parent) => normalize_path(&format!("{parent}/{uid}")),
        None => normalize_path(uid),
    }
}

/// Returns the remainder of `path` below `prefix`, including the leading
/// slash, when `path` lies strictly inside `prefix`.
pub fn strip_ancestor<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix).filter(|rest| rest.starts_with('/'))
}
