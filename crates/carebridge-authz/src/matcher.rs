/// Placeholder replaced by the requesting subject in [`self_match`].
pub const SELF_TOKEN: &str = "{self}";

/// Glob match where `*` spans any run of characters, including `/`.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);
    let pattern_bytes = pattern.as_bytes();
    let value_bytes = value.as_bytes();

    while v_idx < value_bytes.len() {
        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = v_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == value_bytes[v_idx] {
            p_idx += 1;
            v_idx += 1;
            continue;
        }

        // Backtrack: let the last star absorb one more byte.
        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            v_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern_bytes.len()
}

/// Literal comparison after substituting every `{self}` in `pattern` with
/// `subject`. Patterns without the token never self-match.
pub fn self_match(pattern: &str, resource: &str, subject: &str) -> bool {
    if !pattern.contains(SELF_TOKEN) {
        return false;
    }
    pattern.replace(SELF_TOKEN, subject) == resource
}

/// A rule resource covers a request resource by glob or by self-reference.
pub fn resource_matches(pattern: &str, resource: &str, subject: &str) -> bool {
    wildcard_match(pattern, resource) || self_match(pattern, resource, subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_match_exact() {
        assert!(wildcard_match("/clinics/list", "/clinics/list"));
        assert!(!wildcard_match("/clinics/list", "/clinics/list/all"));
    }

    #[test]
    fn wildcard_match_suffix() {
        assert!(wildcard_match("/users/*", "/users/42"));
        assert!(wildcard_match("/users/*", "/users/42/roles"));
        assert!(!wildcard_match("/users/*", "/roles/42"));
    }

    #[test]
    fn wildcard_match_any() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn wildcard_match_backtrack() {
        assert!(wildcard_match("/orgs/*/clinics", "/orgs/a/b/clinics"));
        assert!(!wildcard_match("/orgs/*/clinics", "/orgs/a/locations"));
    }

    #[test]
    fn wildcard_match_trailing_star() {
        assert!(wildcard_match("/users/*", "/users/"));
    }

    #[test]
    fn self_match_substitutes_subject() {
        assert!(self_match("/users/{self}", "/users/u-1", "u-1"));
        assert!(!self_match("/users/{self}", "/users/u-2", "u-1"));
        assert!(self_match("/users/{self}/notes/{self}", "/users/u-1/notes/u-1", "u-1"));
        assert!(!self_match("/users/u-1", "/users/u-1", "u-1"));
    }

    #[test]
    fn resource_matches_either_form() {
        assert!(resource_matches("/users/*", "/users/u-9", "u-1"));
        assert!(resource_matches("/users/{self}", "/users/u-1", "u-1"));
        assert!(!resource_matches("/users/{self}", "/users/u-9", "u-1"));
    }
}
