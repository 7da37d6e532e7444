//! Verse tokenization and cross-translation word alignment.
//!
//! The alignment between an English verse and its source-language text has
//! no ground truth: it is a proportional-position guess over content words,
//! meant to be corrected manually. Every function here is total - empty or
//! out-of-range input yields an empty result, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Split verse text into word tokens, stripping any markup tags first.
/// Deterministic, idempotent, order-preserving.
pub fn tokenize(text: &str) -> Vec<String> {
    let stripped = markup_regex().replace_all(text, " ");
    stripped.split_whitespace().map(str::to_string).collect()
}

const ENGLISH_STOP: [&str; 58] = [
    "the", "a", "an", "and", "of", "to", "in", "that", "is", "was", "for", "on", "with", "as",
    "be", "by", "at", "he", "it", "they", "them", "his", "her", "its", "i", "you", "we", "my",
    "your", "our", "this", "these", "but", "or", "not", "no", "so", "if", "then", "shall",
    "unto", "thou", "thee", "thy", "ye", "hath", "him", "are", "were", "which", "who", "there",
    "their", "from", "into", "upon", "all", "when",
];

const GREEK_STOP: [&str; 44] = [
    "και", "δε", "γαρ", "ο", "η", "το", "οι", "αι", "τα", "του", "της", "των", "τω", "τη",
    "τοις", "ταις", "τον", "την", "τους", "τας", "εν", "εις", "εκ", "εξ", "προς", "κατα",
    "δια", "περι", "υπο", "υπερ", "αντι", "απο", "μετα", "παρα", "επι", "ως", "ουν", "τε",
    "μη", "ου", "τις", "τι", "ἄν", "αν",
];

fn letters_only(token: &str) -> String {
    token.chars().filter(|c| c.is_alphabetic()).collect()
}

/// Fixed per-language stopword lookup. Unknown languages fail open: no
/// token of an unknown language is a stopword.
pub fn is_stopword(token: &str, language: &str) -> bool {
    let word = letters_only(token).to_lowercase();
    match language {
        "en" | "eng" | "english" => ENGLISH_STOP.contains(&word.as_str()),
        "el" | "grc" | "greek" => GREEK_STOP.contains(&word.as_str()),
        _ => false,
    }
}

/// Positions of content (non-stopword) tokens, in original order. Greek
/// additionally requires at least two letters, matching how the source
/// editions punctuate single-letter particles.
pub fn content_token_indices(tokens: &[String], language: &str) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            if is_stopword(t, language) {
                return false;
            }
            match language {
                "el" | "grc" | "greek" => letters_only(t).chars().count() > 1,
                _ => true,
            }
        })
        .map(|(i, _)| i)
        .collect()
}

/// Monotonic global alignment over content-token counts only: map each
/// target position [0,e) to a source position [0,g) via a dynamic program
/// over (i+1,j), (i,j+1), (i+1,j+1) steps whose cost is the deviation from
/// the normalized diagonal. Returns the identity when e == g; empty when
/// either side is empty.
pub fn align_monotonic(e: usize, g: usize) -> Vec<usize> {
    if e == 0 || g == 0 {
        return Vec::new();
    }

    let cost = |i: usize, j: usize| -> f64 {
        let ei = if e == 1 { 0.0 } else { i as f64 / (e - 1) as f64 };
        let gj = if g == 1 { 0.0 } else { j as f64 / (g - 1) as f64 };
        (ei - gj).abs()
    };

    // prev: 1 = diagonal, 2 = up (advance target), 3 = left (advance source)
    let mut dp = vec![vec![0.0f64; g + 1]; e + 1];
    let mut prev = vec![vec![0u8; g + 1]; e + 1];
    for i in 1..=e {
        dp[i][0] = dp[i - 1][0] + cost(i - 1, 0);
        prev[i][0] = 2;
    }
    for j in 1..=g {
        dp[0][j] = dp[0][j - 1] + cost(0, j - 1);
        prev[0][j] = 3;
    }
    for i in 1..=e {
        for j in 1..=g {
            let c_diag = dp[i - 1][j - 1] + cost(i - 1, j - 1);
            let c_up = dp[i - 1][j] + cost(i - 1, j);
            let c_left = dp[i][j - 1] + cost(i, j - 1);
            let mut best = c_diag;
            let mut from = 1u8;
            if c_up < best {
                best = c_up;
                from = 2;
            }
            if c_left < best {
                best = c_left;
                from = 3;
            }
            dp[i][j] = best;
            prev[i][j] = from;
        }
    }

    let mut map_e = vec![0usize; e];
    let (mut i, mut j) = (e, g);
    while i > 0 || j > 0 {
        match prev[i][j] {
            1 => {
                map_e[i - 1] = j - 1;
                i -= 1;
                j -= 1;
            }
            2 => {
                map_e[i - 1] = j.min(g - 1);
                i -= 1;
            }
            _ => {
                j -= 1;
            }
        }
    }

    // Enforce monotonic bounds against backtrack artifacts
    for k in 1..e {
        map_e[k] = map_e[k].max(map_e[k - 1]);
    }
    for k in (0..e.saturating_sub(1)).rev() {
        map_e[k] = map_e[k].min(map_e[k + 1]);
    }
    map_e
}

/// User corrections to the automatic alignment guess, keyed per word.
/// Created on first nudge, updated on later nudges, never expired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentOverrides {
    nudges: HashMap<String, i64>,
}

impl AlignmentOverrides {
    pub fn key(book: &str, chapter: u32, verse: u32, token_index: usize) -> String {
        format!("{book}|{chapter}|{verse}|{token_index}")
    }

    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get(&self, key: &str) -> i64 {
        self.nudges.get(key).copied().unwrap_or(0)
    }

    pub fn nudge(&mut self, key: &str, delta: i64) {
        *self.nudges.entry(key.to_string()).or_insert(0) += delta;
    }

    pub fn is_empty(&self) -> bool {
        self.nudges.is_empty()
    }
}

/// The automatic alignment for one word plus its persisted nudge, clamped
/// into the source range. None when either side has no content tokens or
/// the index is out of range.
pub fn aligned_source_index(
    non_stop_index: usize,
    target_count: usize,
    source_count: usize,
    nudge: i64,
) -> Option<usize> {
    let mapping = align_monotonic(target_count, source_count);
    let auto = *mapping.get(non_stop_index)?;
    let adjusted = (auto as i64 + nudge).clamp(0, source_count as i64 - 1);
    Some(adjusted as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_markup_and_splits() {
        let tokens = tokenize("In the <i>beginning</i> God  created");
        assert_eq!(tokens, vec!["In", "the", "beginning", "God", "created"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("<br/>").is_empty());
    }

    #[test]
    fn tokenize_is_idempotent() {
        let text = "And God said Let there be light";
        let once = tokenize(text);
        let twice = tokenize(&once.join(" "));
        assert_eq!(once, twice);
    }

    #[test]
    fn stopwords_fail_open_for_unknown_language() {
        assert!(is_stopword("the", "en"));
        assert!(is_stopword("και", "grc"));
        assert!(!is_stopword("the", "unknown-language"));
        assert!(!is_stopword("και", "unknown-language"));
    }

    #[test]
    fn stopword_lookup_ignores_punctuation_and_case() {
        assert!(is_stopword("The", "en"));
        assert!(is_stopword("the,", "en"));
    }

    #[test]
    fn greek_content_indices_skip_stopwords_and_single_letters() {
        let tokens = tokenize("εν αρχη ο λογος");
        let idx = content_token_indices(&tokens, "grc");
        // "εν" and "ο" are stopwords
        assert_eq!(idx, vec![1, 3]);
    }

    #[test]
    fn align_identity_when_counts_match() {
        for n in 1..=8 {
            let mapping = align_monotonic(n, n);
            let identity: Vec<usize> = (0..n).collect();
            assert_eq!(mapping, identity, "identity failed for n={n}");
        }
    }

    #[test]
    fn align_output_bounds_and_monotonicity() {
        for e in 1..=9 {
            for g in 1..=9 {
                let mapping = align_monotonic(e, g);
                assert_eq!(mapping.len(), e);
                for window in mapping.windows(2) {
                    assert!(window[0] <= window[1], "not monotonic for e={e} g={g}");
                }
                assert!(mapping.iter().all(|&j| j < g), "out of range for e={e} g={g}");
            }
        }
    }

    #[test]
    fn align_degenerate_inputs_are_empty() {
        assert!(align_monotonic(0, 5).is_empty());
        assert!(align_monotonic(5, 0).is_empty());
        assert!(align_monotonic(0, 0).is_empty());
    }

    #[test]
    fn align_stretches_proportionally() {
        // Twice as many source words: targets spread along the diagonal
        let mapping = align_monotonic(3, 6);
        assert_eq!(mapping, vec![1, 3, 5]);
    }

    #[test]
    fn overrides_round_trip_and_accumulate() {
        let mut overrides = AlignmentOverrides::default();
        let key = AlignmentOverrides::key("John", 1, 1, 2);
        assert_eq!(overrides.get(&key), 0);
        overrides.nudge(&key, 1);
        overrides.nudge(&key, 1);
        overrides.nudge(&key, -3);
        assert_eq!(overrides.get(&key), -1);

        let parsed = AlignmentOverrides::from_json(&overrides.to_json());
        assert_eq!(parsed.get(&key), -1);
        assert_eq!(AlignmentOverrides::from_json("not json").get(&key), 0);
    }

    #[test]
    fn aligned_index_applies_clamped_nudge() {
        assert_eq!(aligned_source_index(0, 3, 3, 0), Some(0));
        assert_eq!(aligned_source_index(0, 3, 3, -5), Some(0));
        assert_eq!(aligned_source_index(2, 3, 3, 10), Some(2));
        assert_eq!(aligned_source_index(3, 3, 3, 0), None);
        assert_eq!(aligned_source_index(0, 0, 3, 0), None);
    }
}
