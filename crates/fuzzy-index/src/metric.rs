//! Partial-substring-containment similarity metric.
//!
//! Scores how well a query fragment matches a candidate path, as an integer
//! distance in `0..=100` where lower is more similar. The score is driven by
//! the longest contiguous substring of the query that occurs anywhere in the
//! candidate's filename: `floor(100 / (longest + 1))`, or 100 when nothing
//! matches at all.
//!
//! Only the final path segment of each side is compared, lowercased. When the
//! query looks extension-free (contains no `.`) the candidate's extension is
//! ignored, so typing `findme` matches `findme.txt` as strongly as the full
//! name would.
//!
//! The metric is asymmetric and is not a true metric in the mathematical
//! sense; the tree that uses it relies on its bounded integer range for
//! pruning rather than on the triangle inequality.

use std::path::Path;

/// Upper bound of the distance range. A score of `MAX_DISTANCE` means the
/// query shares no substring with the candidate.
pub const MAX_DISTANCE: u32 = 100;

/// Scores `query` against `candidate`. Lower is better.
///
/// Both arguments may be full paths; only their filename components are
/// compared. A path with no filename component (e.g. `/` or `..`) scores as
/// the empty string.
pub fn score(candidate: &str, query: &str) -> u32 {
    let candidate = filename_component(candidate);
    let query = filename_component(query);
    score_names(&candidate, &query)
}

/// Scores two already-extracted, lowercased filenames.
fn score_names(candidate: &str, query: &str) -> u32 {
    // Ignore the candidate's extension when the query carries none. A
    // leading dot (hidden files) is part of the name, not an extension.
    let candidate = if !query.contains('.') {
        match candidate.find('.') {
            Some(dot) if dot > 0 => &candidate[..dot],
            _ => candidate,
        }
    } else {
        candidate
    };

    let fit = longest_fit(candidate, query);
    if fit <= 1 {
        MAX_DISTANCE
    } else {
        MAX_DISTANCE / fit
    }
}

/// Length of the longest contiguous substring of `query` found in
/// `candidate`, plus one. Minimum 1 (empty query, or no overlap at all).
fn longest_fit(candidate: &str, query: &str) -> u32 {
    // Char boundaries of the query, so substrings slice cleanly even for
    // multi-byte names.
    let bounds: Vec<usize> = query
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(query.len()))
        .collect();
    let chars = bounds.len() - 1;

    let mut longest = 0u32;
    for len in 1..=chars {
        let mut found = false;
        for start in 0..=(chars - len) {
            let part = &query[bounds[start]..bounds[start + len]];
            if candidate.contains(part) {
                found = true;
                break;
            }
        }
        if !found {
            // If no substring of this length occurs, no longer one can.
            break;
        }
        longest = len as u32;
    }
    longest + 1
}

/// Extracts the lowercased final path segment, or empty when there is none.
fn filename_component(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_match_scores_by_length() {
        // score(a, a) == floor(100 / (len + 1)) for non-empty a
        assert_eq!(score("findme.txt", "findme.txt"), 100 / 11);
        assert_eq!(score("a", "a"), 50);
        assert_eq!(score("ab", "ab"), 33);
    }

    #[test]
    fn empty_query_never_matches() {
        assert_eq!(score("anything.txt", ""), 100);
        assert_eq!(score("", ""), 100);
    }

    #[test]
    fn extension_ignored_for_extension_free_query() {
        // "findme.txt" truncates to "findme" -> full 6-char match
        assert_eq!(score("findme.txt", "findme"), 100 / 7);
        // a query with a dot keeps the candidate intact
        assert_eq!(score("findme.txt", "findme.txt"), 100 / 11);
    }

    #[test]
    fn leading_dot_is_not_an_extension() {
        // ".gitignore" must not truncate to the empty string
        assert_eq!(score(".gitignore", "git"), 100 / 4);
    }

    #[test]
    fn comparison_is_case_insensitive() {
        assert_eq!(score("FindMe.TXT", "findme"), score("findme.txt", "findme"));
    }

    #[test]
    fn only_the_filename_component_is_compared() {
        assert_eq!(
            score("/home/user/docs/findme.txt", "findme"),
            score("findme.txt", "findme")
        );
        // a query given as a path also reduces to its filename
        assert_eq!(score("findme.txt", "/tmp/findme"), score("findme.txt", "findme"));
    }

    #[test]
    fn pathless_candidate_scores_as_empty() {
        assert_eq!(score("/", "query"), 100);
        assert_eq!(score("..", "query"), 100);
    }

    #[test]
    fn disjoint_names_score_max() {
        assert_eq!(score("zzz", "abc"), 100);
    }

    #[test]
    fn single_char_overlap_scores_fifty() {
        // "notit" shares only single characters with "findme"
        assert_eq!(score("notit.txt", "findme"), 50);
    }

    #[test]
    fn multibyte_names_do_not_panic() {
        let d = score("héllo.txt", "héllo");
        assert!(d < 100);
    }
}
