//! Contact-identifier extraction: a pure scan over arbitrary text.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();

fn identifier_re() -> &'static Regex {
    IDENTIFIER_RE.get_or_init(|| {
        // Local part, '@', dotted domain labels, final label of >= 2 letters.
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("valid identifier pattern")
    })
}

/// Scan `text` and return every email identifier it contains.
///
/// Matching is case-preserving, non-overlapping, leftmost-first. The result
/// is an ordered set, so scanning the same input twice yields the same value
/// and callers are free to union batches without caring about order.
pub fn extract_identifiers(text: &str) -> BTreeSet<String> {
    identifier_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plus_and_dotted_addresses() {
        let found = extract_identifiers("Reach me at a.b+c@example.co.uk or spam@@bad");
        assert_eq!(found.len(), 1);
        assert!(found.contains("a.b+c@example.co.uk"));
    }

    #[test]
    fn preserves_case() {
        let found = extract_identifiers("Mail Jane.Doe@Example.COM today");
        assert!(found.contains("Jane.Doe@Example.COM"));
    }

    #[test]
    fn empty_and_matchless_inputs_yield_empty_set() {
        assert!(extract_identifiers("").is_empty());
        assert!(extract_identifiers("no identifiers here, just text").is_empty());
        assert!(extract_identifiers("half@way").is_empty());
        assert!(extract_identifiers("@example.com").is_empty());
    }

    #[test]
    fn deduplicates_repeats_within_one_input() {
        let found = extract_identifiers("x@y.com then again x@y.com and x@y.com");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn idempotent_across_calls() {
        let input = "one@a.io two@b.org, one@a.io; \u{1F600} three@c.dev";
        assert_eq!(extract_identifiers(input), extract_identifiers(input));
    }

    #[test]
    fn tolerates_large_hostile_input() {
        let mut blob = "@@@ ".repeat(50_000);
        blob.push_str("real@mail.net");
        let found = extract_identifiers(&blob);
        assert_eq!(found.len(), 1);
        assert!(found.contains("real@mail.net"));
    }

    #[test]
    fn rejects_single_letter_top_label() {
        assert!(extract_identifiers("who@host.x").is_empty());
    }
}
