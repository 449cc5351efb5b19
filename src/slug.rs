//! URL slugs for tag, author, category and series names.
//!
//! The rule is deliberately tiny and non-reversible: spaces become `+`,
//! slashes become `__`, everything else passes through. The client search
//! script carries a byte-identical implementation; the two must never
//! diverge or story links inside search results break.

/// Normalize a name so it is safe to use as a ZIM path segment.
pub fn normalize(name: &str) -> String {
    name.replace(' ', "+").replace('/', "__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_plus() {
        assert_eq!(normalize("Harry Potter"), "Harry+Potter");
    }

    #[test]
    fn slashes_become_double_underscore() {
        assert_eq!(normalize("Alice/Bob"), "Alice__Bob");
    }

    #[test]
    fn mixed_input() {
        assert_eq!(normalize("Alice / Bob"), "Alice+__+Bob");
    }

    #[test]
    fn other_characters_pass_through() {
        assert_eq!(normalize("Tëst!?()#&"), "Tëst!?()#&");
    }

    #[test]
    fn idempotent_on_normalized_input() {
        let once = normalize("a b/c d");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn collision_pair_from_distinct_names() {
        // "a b" and "a+b" both normalize to "a+b"; the planner must detect
        // this, the slug function itself stays oblivious.
        assert_eq!(normalize("a b"), normalize("a+b"));
    }

    #[test]
    fn empty_name() {
        assert_eq!(normalize(""), "");
    }
}
