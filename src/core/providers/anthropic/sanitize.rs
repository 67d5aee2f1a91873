//! Anthropic requires tool names to avoid dots; the gateway's own tool
//! names may contain them (namespaced tools like `fs.read`). Sanitizing on
//! the way out and desanitizing on the way in is a bijection as long as
//! source tool names never contain a literal `__`.

pub fn sanitize(name: &str) -> String {
    name.replace('.', "__")
}

pub fn desanitize(name: &str) -> String {
    name.replace("__", ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_dotted_names() {
        for name in ["fs.read", "a.b.c", "plain", "weather"] {
            assert_eq!(desanitize(&sanitize(name)), name);
        }
    }

    #[test]
    fn sanitize_replaces_every_dot() {
        assert_eq!(sanitize("a.b.c"), "a__b__c");
    }
}
