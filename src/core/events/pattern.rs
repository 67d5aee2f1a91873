//! Dot-segmented glob matching shared by the event bus and the event
//! bridge's `event:subscribe` validation.

/// `*` matches exactly one dot-segment; segment counts must be equal.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let candidate_segments: Vec<&str> = candidate.split('.').collect();
    if pattern_segments.len() != candidate_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(candidate_segments.iter())
        .all(|(p, c)| *p == "*" || p == c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_with_no_wildcard_requires_exact_match() {
        assert!(glob_match("a.b.c", "a.b.c"));
        assert!(!glob_match("a.b.c", "a.b.d"));
    }

    #[test]
    fn wildcard_never_spans_multiple_segments() {
        assert!(!glob_match("a.*", "a.b.c"));
    }
}
