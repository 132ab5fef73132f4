// src/fs/path.rs

//! Path normalisation for graph identifiers.

/// Normalise a path string into the form used as a file node identity.
///
/// - backslashes become forward slashes
/// - empty and `.` components are dropped
/// - `..` removes the preceding normal component (lexically)
/// - a leading `/` is preserved
///
/// The empty path normalises to `"."`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Parent directory of a normalised path, or `None` at the top.
pub fn parent_dir(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "." || path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => Some(".".to_string()),
    }
}
