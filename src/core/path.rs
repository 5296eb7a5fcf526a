//! Path normalization shared by the watcher side and the client side.
//!
//! Watchers report absolute, platform-native paths; the browser reports
//! URL-ish paths (`/src/foo.ts?t=123`). Both are reduced to a
//! project-relative, forward-slash form so they can be compared verbatim.

/// Normalizes a watcher-reported path against the project root.
///
/// Paths outside the root keep their (slash-normalized) absolute form.
pub fn normalize_path(root: &str, path: &str) -> String {
    let root = root.replace('\\', "/");
    let root = root.trim_end_matches('/');
    let path = path.replace('\\', "/");

    if !root.is_empty() {
        if let Some(rest) = path.strip_prefix(root) {
            if rest.starts_with('/') {
                return rest.trim_start_matches('/').to_string();
            }
            if rest.is_empty() {
                return String::new();
            }
        }
    }
    path
}

/// Normalizes a path reported by the client or the update channel.
///
/// Strips query strings and fragments, then any leading slash. Absolute
/// filesystem paths under the project root are relativized as well.
pub fn normalize_client_path(root: &str, path: &str) -> String {
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .replace('\\', "/");

    let relative = normalize_path(root, &path);
    if relative != path {
        return relative;
    }
    // Vite serves files outside the root under `/@fs/<absolute path>`.
    if let Some(abs) = path.strip_prefix("/@fs") {
        let relative = normalize_path(root, abs);
        if relative != abs {
            return relative;
        }
    }
    path.trim_start_matches('/').to_string()
}
