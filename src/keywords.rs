// SPDX-License-Identifier: MIT OR Apache-2.0

//! Salient term extraction for human-readable match explanations.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Default number of keywords kept per document.
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// Tokens shorter than this are never keywords.
pub const MIN_KEYWORD_LEN: usize = 4;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{L}[\p{L}\p{N}]*").expect("static token regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "about", "above", "after", "again", "against", "also", "although", "among", "another",
        "been", "before", "being", "below", "between", "both", "came", "cannot", "come", "could",
        "does", "doing", "done", "down", "during", "each", "either", "else", "even", "ever",
        "every", "from", "further", "given", "have", "having", "hence", "here", "hers", "herself",
        "himself", "however", "into", "itself", "just", "less", "like", "made", "make", "many",
        "more", "most", "much", "must", "myself", "near", "neither", "never", "next", "none",
        "only", "onto", "other", "others", "ours", "ourselves", "over", "own", "per", "same",
        "shall", "should", "since", "some", "such", "than", "that", "their", "theirs", "them",
        "themselves", "then", "there", "therefore", "these", "they", "this", "those", "though",
        "through", "thus", "till", "under", "until", "upon", "very", "want", "were", "what",
        "whatever", "when", "where", "whereas", "whether", "which", "while", "whom", "whose",
        "will", "with", "within", "without", "would", "your", "yours", "yourself", "yourselves",
        "went", "well", "took", "take", "taken", "said", "says", "still", "once",
        "because", "around", "across", "along", "already", "always", "anything", "something",
        "nothing", "everything", "someone", "anyone", "thing", "things",
    ]
    .into_iter()
    .collect()
});

/// Returns true if `word` belongs to the closed stop-word list.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Word tokens of already lowercased text: a letter followed by letters or
/// digits, in any script.
pub fn tokens(lowered: &str) -> impl Iterator<Item = &str> {
    TOKEN_RE.find_iter(lowered).map(|m| m.as_str())
}

/// Extracts up to `max` salient lowercase terms from `text`.
///
/// Terms are ordered by descending frequency; ties keep first-occurrence
/// order. The same input always yields the same list.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();

    // term -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in tokens(&lowered).enumerate() {
        if word.chars().count() < MIN_KEYWORD_LEN || is_stop_word(word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(max);

    ranked.into_iter().map(|(word, _, _)| word.to_string()).collect()
}

/// Keywords of `current` that are also keywords of `candidate`, in
/// `current`'s order.
pub fn shared_keywords(current: &str, candidate: &str, max: usize) -> Vec<String> {
    let ours = extract_keywords(current, max);
    let theirs: HashSet<String> = extract_keywords(candidate, max).into_iter().collect();
    ours.into_iter().filter(|term| theirs.contains(term)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_frequency_then_first_occurrence() {
        let text = "Engine fire warning. Crew shut down the engine. Fire bottle discharged; \
                    engine secured.";
        let keywords = extract_keywords(text, 10);
        assert_eq!(keywords[0], "engine");
        assert_eq!(keywords[1], "fire");
        assert_eq!(
            &keywords[2..],
            &["warning", "crew", "shut", "bottle", "discharged", "secured"]
        );
    }

    #[test]
    fn drops_short_tokens_and_stop_words() {
        let keywords = extract_keywords("The aircraft was at the gate and they were there", 10);
        assert_eq!(keywords, vec!["aircraft", "gate"]);
    }

    #[test]
    fn respects_the_cap() {
        let keywords = extract_keywords("alpha bravo charlie delta echo foxtrot", 3);
        assert_eq!(keywords, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn is_deterministic() {
        let text = "Runway incursion by vehicle during taxi; vehicle cleared runway. Tower \
                    issued go-around.";
        let first = extract_keywords(text, 10);
        let second = extract_keywords(text, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn identical_documents_share_every_keyword() {
        let text = "Bird strike on approach, windshield cracked, landing uneventful.";
        let shared = shared_keywords(text, text, 10);
        assert_eq!(shared, extract_keywords(text, 10));
    }

    #[test]
    fn unrelated_documents_share_nothing() {
        let shared = shared_keywords("hydraulic leak detected", "passenger medical emergency", 10);
        assert!(shared.is_empty());
    }

    #[test]
    fn accented_words_stay_whole() {
        let keywords = extract_keywords(
            "Opération de dégivrage retardée; dégivrage incomplet avant décollage.",
            10,
        );
        assert_eq!(
            keywords,
            vec!["dégivrage", "opération", "retardée", "incomplet", "avant", "décollage"]
        );
        let shared = shared_keywords(
            "Dégivrage retardé avant le départ",
            "Le dégivrage a été retardé",
            10,
        );
        assert_eq!(shared, vec!["dégivrage", "retardé"]);
    }

    #[test]
    fn empty_text_has_no_keywords() {
        assert!(extract_keywords("", 10).is_empty());
        assert!(extract_keywords("   \n\t", 10).is_empty());
    }
}
