use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Ratio above which two titles count as the same underlying story.
///
/// Tuned against real newsroom feeds; both this and the length guard below
/// are exact contracts covered by tests.
const SIMILARITY_THRESHOLD: f64 = 0.516;

/// Stripped titles at or below this length never match anything; very
/// short titles produce too many false positives.
const MIN_TITLE_LENGTH: usize = 10;

/// Broadcast tags like "[LIVE]" or "[UPDATE]" wrapped around a headline.
/// Greedy, so a title carrying several bracketed tags loses the whole span
/// from the first `[` to the last `]`.
static BRACKET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\]").expect("bracket tag pattern is valid"));

/// Decides whether two story titles represent the same underlying story.
///
/// Bracketed tags are stripped from both titles, then a character-level
/// longest-matching-blocks ratio is compared against the threshold. Pure
/// and deterministic.
pub fn are_titles_similar(title_a: &str, title_b: &str) -> bool {
    let a = BRACKET_TAG.replace_all(title_a, "");
    let b = BRACKET_TAG.replace_all(title_b, "");

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a.min(len_b) <= MIN_TITLE_LENGTH {
        return false;
    }

    sequence_ratio(&a, &b) > SIMILARITY_THRESHOLD
}

/// Similarity of two strings as `2*M / T`, where `M` is the total size of
/// the longest matching blocks (found recursively, Ratcliff-Obershelp
/// style) and `T` the combined length. Ranges over [0, 1].
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut matches = 0usize;
    let mut regions = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = regions.pop() {
        let (i, j, size) = longest_match(&a, &b, alo, ahi, blo, bhi);
        if size > 0 {
            matches += size;
            regions.push((alo, i, blo, j));
            regions.push((i + size, ahi, j + size, bhi));
        }
    }

    2.0 * matches as f64 / total as f64
}

/// Longest block where `a[i..i+size] == b[j..j+size]` within the given
/// bounds. Of all maximal blocks, returns the one starting earliest in `a`
/// (and earliest in `b` for ties).
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &ch) in b.iter().enumerate().take(bhi).skip(blo) {
        positions.entry(ch).or_default().push(j);
    }

    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
    // Length of the match ending at (i-1, j-1), carried across rows
    let mut run_lengths: HashMap<usize, usize> = HashMap::new();
    for i in alo..ahi {
        let mut new_runs: HashMap<usize, usize> = HashMap::new();
        if let Some(js) = positions.get(&a[i]) {
            for &j in js {
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| run_lengths.get(&prev).copied())
                    .unwrap_or(0)
                    + 1;
                new_runs.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        run_lengths = new_runs;
    }

    (best_i, best_j, best_size)
}
