use serde::{Deserialize, Serialize};

use crate::model::normalize_for_search;

pub const MAX_SCORE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPrecision {
    None,
    Low,
    #[default]
    Regular,
}

impl SearchPrecision {
    pub fn threshold(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Low => 20,
            Self::Regular => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub score: i64,
}

impl MatchResult {
    pub fn miss() -> Self {
        Self { score: 0 }
    }

    pub fn is_match(&self) -> bool {
        self.score > 0
    }

    pub fn meets(&self, precision: SearchPrecision) -> bool {
        self.is_match() && self.score >= precision.threshold()
    }
}

pub fn score(query: &str, candidate: &str) -> MatchResult {
    let query: Vec<char> = normalize_for_search(query).chars().collect();
    let candidate: Vec<char> = normalize_for_search(candidate).chars().collect();
    if query.is_empty() || candidate.is_empty() {
        return MatchResult::miss();
    }

    match score_normalized(&candidate, &query) {
        Some(score) => MatchResult { score },
        None => MatchResult::miss(),
    }
}

fn score_normalized(candidate: &[char], query: &[char]) -> Option<i64> {
    if candidate == query {
        return Some(MAX_SCORE);
    }

    let length_penalty = candidate.len().saturating_sub(query.len()) as i64;

    if let Some(position) = find_substring(candidate, query) {
        let base = if position == 0 { 90 } else { 70 };
        return Some((base - length_penalty - position as i64).clamp(40, MAX_SCORE - 1));
    }

    let positions = subsequence_positions(candidate, query)?;
    let start_penalty = positions[0] as i64;
    let gap_penalty: i64 = positions
        .windows(2)
        .map(|pair| pair[1].saturating_sub(pair[0] + 1) as i64)
        .sum();
    let coverage = (query.len() as i64 * 100) / candidate.len() as i64;

    Some((30 + coverage / 2 - gap_penalty * 4 - start_penalty * 2).clamp(1, 69))
}

fn find_substring(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn subsequence_positions(haystack: &[char], needle: &[char]) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(needle.len());
    let mut next_start = 0;

    for needle_char in needle {
        let offset = haystack[next_start..]
            .iter()
            .position(|hay_char| hay_char == needle_char)?;
        let absolute = next_start + offset;
        positions.push(absolute);
        next_start = absolute + 1;
    }

    Some(positions)
}

#[cfg(test)]
mod tests {
    use super::{score, SearchPrecision, MAX_SCORE};

    #[test]
    fn exact_match_scores_max() {
        assert_eq!(score("Calc", "calc").score, MAX_SCORE);
    }

    #[test]
    fn prefix_beats_infix() {
        let prefix = score("calc", "calculator");
        let infix = score("calc", "mycalculator");
        assert!(prefix.score > infix.score);
        assert!(prefix.meets(SearchPrecision::Regular));
    }

    #[test]
    fn subsequence_with_small_gaps_meets_regular() {
        assert!(score("clc", "calc").meets(SearchPrecision::Regular));
    }

    #[test]
    fn scattered_subsequence_only_meets_low() {
        let result = score("wthr", "weather");
        assert!(result.meets(SearchPrecision::Low));
        assert!(!result.meets(SearchPrecision::Regular));
    }

    #[test]
    fn unrelated_text_is_a_miss() {
        let result = score("zzz", "calculator");
        assert!(!result.is_match());
        assert!(!result.meets(SearchPrecision::None));
    }

    #[test]
    fn empty_sides_never_match() {
        assert!(!score("", "calc").is_match());
        assert!(!score("calc", "--").is_match());
    }
}
