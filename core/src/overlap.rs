//! Fuzzy suffix/prefix match between the document tail and a pending
//! suggestion. A high ratio means the author has typed (part of) what the
//! model already proposed, so re-requesting would be redundant.

/// Window compared on each side, in characters.
const OVERLAP_WINDOW: usize = 20;

/// Ratio at or above which a pending suggestion is considered still
/// relevant and a new request is suppressed.
pub(crate) const SIMILARITY_THRESHOLD: f32 = 0.6;

/// Compares the last [`OVERLAP_WINDOW`] characters of `document` against the
/// first [`OVERLAP_WINDOW`] characters of `suggestion`. Returns
/// `best_k / min(20, len(prefix window))` where `best_k` is the longest
/// suffix-of-A == prefix-of-B run, or 0.0 when no overlap exists.
pub fn overlap_ratio(document: &str, suggestion: &str) -> f32 {
    let tail: Vec<char> = {
        let mut chars: Vec<char> = document.chars().rev().take(OVERLAP_WINDOW).collect();
        chars.reverse();
        chars
    };
    let head: Vec<char> = suggestion.chars().take(OVERLAP_WINDOW).collect();

    let max_k = tail.len().min(head.len());
    let mut best = 0;
    for k in (1..=max_k).rev() {
        if tail[tail.len() - k..] == head[..k] {
            best = k;
            break;
        }
    }
    best as f32 / head.len().max(1) as f32
}

/// The suppression predicate used by every trigger path. A missing
/// suggestion is never similar.
pub(crate) fn is_similar(document: &str, suggestion: Option<&str>) -> bool {
    match suggestion {
        Some(suggestion) if !suggestion.is_empty() => {
            overlap_ratio(document, suggestion) >= SIMILARITY_THRESHOLD
        }
        _ => false,
    }
}
