use std::collections::HashMap;

/// Scores how likely a candidate refers to the same title as the seed.
///
/// Implementations return a value in `[0, 1]`; higher is a better match.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, candidate_titles: &[String], seed_titles: &[String]) -> f64;
}

/// Sørensen-Dice coefficient over character bigrams of normalized titles,
/// taking the best pair across both title lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiceScorer;

impl SimilarityScorer for DiceScorer {
    fn score(&self, candidate_titles: &[String], seed_titles: &[String]) -> f64 {
        let seeds: Vec<String> = seed_titles.iter().map(|t| normalize_title(t)).collect();
        candidate_titles
            .iter()
            .map(|t| normalize_title(t))
            .flat_map(|candidate| {
                seeds
                    .iter()
                    .map(move |seed| dice_coefficient(&candidate, seed))
                    .collect::<Vec<_>>()
            })
            .fold(0.0, f64::max)
    }
}

/// Lowercase, keep alphanumerics, collapse everything else to single spaces.
pub fn normalize_title(input: &str) -> String {
    let mut normalized = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    normalized
}

fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a_bigrams = bigrams(a);
    let b_bigrams = bigrams(b);
    let total = a_bigrams.values().sum::<usize>() + b_bigrams.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let shared: usize = a_bigrams
        .iter()
        .map(|(pair, count)| (*count).min(b_bigrams.get(pair).copied().unwrap_or(0)))
        .sum();
    (2 * shared) as f64 / total as f64
}

fn bigrams(input: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = input.chars().collect();
    let mut counts = HashMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn normalization_drops_punctuation_and_case() {
        assert_eq!(normalize_title("  Re:Zero -- Starting Life!  "), "re zero starting life");
        assert_eq!(normalize_title("無職転生"), "無職転生");
    }

    #[test]
    fn identical_titles_score_one() {
        let scorer = DiceScorer;
        let score = scorer.score(&titles(&["Mushoku Tensei!"]), &titles(&["mushoku tensei"]));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn best_pair_across_synonyms_wins() {
        let scorer = DiceScorer;
        let score = scorer.score(
            &titles(&["Completely Different", "Jobless Reincarnation"]),
            &titles(&["Mushoku Tensei", "Jobless Reincarnation"]),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn unrelated_titles_score_low_and_stay_in_range() {
        let scorer = DiceScorer;
        let score = scorer.score(&titles(&["One Piece"]), &titles(&["Mushoku Tensei"]));
        assert!((0.0..0.3).contains(&score), "score was {score}");
        assert_eq!(scorer.score(&[], &titles(&["x"])), 0.0);
    }
}
