//! Keyword match scoring and response selection.
//!
//! # Algorithm
//!
//! 1. The input is trimmed and lower-cased ([`normalize`]).
//! 2. Each entry is scored as `found / valid`, where `valid` counts the
//!    entry's non-blank keywords and `found` those present as whole words.
//!    Entries without a valid keyword are skipped.
//! 3. An entry becomes the new best only if its score is strictly greater
//!    than the current best **and** at least `threshold`; a zero score never
//!    qualifies.  Equal scores keep the earlier entry.
//! 4. A perfect score stops the scan, which cannot change the result since
//!    nothing later can beat it.
//!
//! # Example
//!
//! ```rust
//! use worldbot_knowledge::{find_best_response, KnowledgeStore};
//! use worldbot_types::KnowledgeEntry;
//!
//! let store = KnowledgeStore::new(vec![
//!     KnowledgeEntry::new(["coffee", "espresso"], "Coffee is upstairs."),
//! ]).unwrap();
//!
//! assert_eq!(find_best_response("I'd like coffee", &store, 0.5), Some("Coffee is upstairs."));
//! assert_eq!(find_best_response("I'd like tea", &store, 0.5), None);
//! ```

use tracing::{trace, warn};

use crate::store::{KnowledgeStore, compile_keyword};

/// Result of a successful match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome<'a> {
    /// Position of the winning entry in the store.
    pub index: usize,
    pub score: f32,
    pub response: &'a str,
}

/// Trim surrounding whitespace and lower-case with the Unicode default rule.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Score `input` against an ad-hoc keyword list.
///
/// Compiles the keyword patterns on every call; the store-backed
/// [`find_best_match`] uses the patterns compiled at load time instead.
/// Returns `0.0` when the list holds no valid keyword.
pub fn score(input: &str, keywords: &[String]) -> f32 {
    let normalized = normalize(input);
    let mut valid = 0usize;
    let mut found = 0usize;
    for keyword in keywords {
        match compile_keyword(keyword) {
            Ok(Some(re)) => {
                valid += 1;
                if re.is_match(&normalized) {
                    found += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                // Counted but never found.
                warn!(keyword = %keyword, error = %e, "keyword pattern rejected");
                valid += 1;
            }
        }
    }
    if valid == 0 {
        0.0
    } else {
        found as f32 / valid as f32
    }
}

/// Find the highest-scoring entry whose score reaches `threshold`.
pub fn find_best_match<'a>(
    input: &str,
    store: &'a KnowledgeStore,
    threshold: f32,
) -> Option<MatchOutcome<'a>> {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return None;
    }

    let mut best: Option<MatchOutcome<'a>> = None;
    for (index, entry) in store.compiled().iter().enumerate() {
        if entry.response().trim().is_empty() {
            continue;
        }
        let Some(score) = entry.score(&normalized) else {
            continue;
        };
        let best_score = best.map_or(0.0, |b| b.score);
        if score > best_score && score >= threshold {
            best = Some(MatchOutcome {
                index,
                score,
                response: entry.response(),
            });
            if score >= 1.0 {
                break;
            }
        }
    }

    trace!(input = %normalized, outcome = ?best, "match complete");
    best
}

/// Convenience wrapper around [`find_best_match`] returning only the text.
pub fn find_best_response<'a>(
    input: &str,
    store: &'a KnowledgeStore,
    threshold: f32,
) -> Option<&'a str> {
    find_best_match(input, store, threshold).map(|m| m.response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldbot_types::KnowledgeEntry;

    fn store(entries: Vec<KnowledgeEntry>) -> KnowledgeStore {
        KnowledgeStore::new(entries).unwrap()
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Hello WORLD \n"), "hello world");
        assert_eq!(normalize("ÉCOLE"), "école");
    }

    #[test]
    fn score_is_fraction_of_valid_keywords() {
        assert_eq!(score("I'd like coffee", &kw(&["coffee", "espresso"])), 0.5);
        assert_eq!(score("coffee or espresso", &kw(&["coffee", "espresso", ""])), 1.0);
        assert_eq!(score("nothing here", &kw(&["coffee"])), 0.0);
        assert_eq!(score("anything", &kw(&["", "   "])), 0.0);
        assert_eq!(score("anything", &[]), 0.0);
    }

    #[test]
    fn word_boundary_is_respected() {
        assert_eq!(score("category store", &kw(&["cat"])), 0.0);
        assert_eq!(score("I have a cat", &kw(&["cat"])), 1.0);
        assert_eq!(score("cat!", &kw(&["cat"])), 1.0);
        assert_eq!(score("Cat", &kw(&["cat"])), 1.0);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let s = store(vec![KnowledgeEntry::new(["coffee", "espresso"], "Coffee!")]);
        assert_eq!(find_best_response("I'd like coffee", &s, 0.5), Some("Coffee!"));
        assert_eq!(find_best_response("I'd like coffee", &s, 0.5 + f32::EPSILON), None);
    }

    #[test]
    fn tie_keeps_first_entry() {
        let s = store(vec![
            KnowledgeEntry::new(["a"], "R1"),
            KnowledgeEntry::new(["a"], "R2"),
        ]);
        assert_eq!(find_best_response("a", &s, 0.5), Some("R1"));
    }

    #[test]
    fn partial_tie_keeps_first_entry() {
        let s = store(vec![
            KnowledgeEntry::new(["open", "hours"], "first"),
            KnowledgeEntry::new(["open", "late"], "second"),
        ]);
        let best = find_best_match("are you open", &s, 0.5).unwrap();
        assert_eq!(best.index, 0);
        assert_eq!(best.response, "first");
    }

    #[test]
    fn higher_score_later_wins() {
        let s = store(vec![
            KnowledgeEntry::new(["coffee", "espresso"], "half"),
            KnowledgeEntry::new(["coffee"], "full"),
        ]);
        let best = find_best_match("coffee please", &s, 0.1).unwrap();
        assert_eq!(best.response, "full");
        assert_eq!(best.score, 1.0);
    }

    #[test]
    fn perfect_score_short_circuit_keeps_first() {
        let s = store(vec![
            KnowledgeEntry::new(["coffee"], "first"),
            KnowledgeEntry::new(["coffee"], "second"),
        ]);
        assert_eq!(find_best_response("coffee", &s, 1.0), Some("first"));
    }

    #[test]
    fn empty_or_punctuation_input_has_no_match() {
        let s = store(vec![KnowledgeEntry::new(["coffee"], "Coffee!")]);
        assert_eq!(find_best_response("", &s, 0.0), None);
        assert_eq!(find_best_response("   ", &s, 0.0), None);
        assert_eq!(find_best_response("?!...", &s, 0.0), None);
    }

    #[test]
    fn zero_score_never_qualifies_even_at_zero_threshold() {
        let s = store(vec![KnowledgeEntry::new(["coffee"], "Coffee!")]);
        assert_eq!(find_best_response("tea", &s, 0.0), None);
    }

    #[test]
    fn blank_response_entries_never_win() {
        let s = store(vec![
            KnowledgeEntry::new(["coffee"], "  "),
            KnowledgeEntry::new(["coffee", "tea"], "fallback"),
        ]);
        assert_eq!(find_best_response("coffee", &s, 0.5), Some("fallback"));
    }

    #[test]
    fn entries_without_valid_keywords_are_skipped() {
        let s = store(vec![
            KnowledgeEntry::new(["", " "], "never"),
            KnowledgeEntry::new(["hello"], "hi"),
        ]);
        assert_eq!(find_best_response("hello", &s, 0.0), Some("hi"));
    }

    #[test]
    fn scoring_is_deterministic() {
        let s = store(vec![
            KnowledgeEntry::new(["music", "dj"], "DJ at nine"),
            KnowledgeEntry::new(["music"], "Music room west"),
            KnowledgeEntry::new(["dj", "set"], "Sets on Fridays"),
        ]);
        let first = find_best_match("who is the dj tonight", &s, 0.3);
        for _ in 0..100 {
            assert_eq!(find_best_match("who is the dj tonight", &s, 0.3), first);
        }
    }

    #[test]
    fn regex_metacharacters_do_not_panic() {
        let s = store(vec![KnowledgeEntry::new(["[a-z]+", "*", "\\"], "weird")]);
        assert_eq!(find_best_response("abc", &s, 0.1), None);
        assert_eq!(find_best_response("x * y", &s, 0.3), Some("weird"));
    }
}
