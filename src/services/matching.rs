//! Fuzzy string matching for platform verification.
//!
//! Ratios follow the fuzzywuzzy conventions (0-100 integer scores) built on
//! normalized Levenshtein distance, plus the domain scoring used to judge
//! video search candidates.

use strsim::normalized_levenshtein;

/// Plain similarity ratio between two strings, 0-100.
pub fn ratio(a: &str, b: &str) -> u32 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    (normalized_levenshtein(a, b) * 100.0).round() as u32
}

/// Ratio over whitespace tokens sorted alphabetically, so word order does
/// not matter: "metal black" vs "black metal" scores 100.
pub fn token_sort_ratio(a: &str, b: &str) -> u32 {
    ratio(&sort_tokens(a), &sort_tokens(b))
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Best ratio of the shorter string against any equally-long substring of
/// the longer one. An exact substring match scores 100.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if shorter.is_empty() {
        return if longer.is_empty() { 100 } else { 0 };
    }

    let needle: String = shorter.iter().collect();
    let mut best = 0u32;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        best = best.max(ratio(&needle, &candidate));
        if best == 100 {
            break;
        }
    }
    best
}

/// Score a video search result title against a band + album query.
///
/// Combines the full token-sort ratio with partial album/band ratios. When
/// both the band and the album clear 70, the mean of the two partials can
/// stand in for the full score. Titles advertising a full album get +10.
/// Capped at 100.
pub fn score_video_candidate(band_name: &str, album_name: &str, title: &str) -> u32 {
    let title_lower = title.to_lowercase();
    let search_term = format!("{} {}", band_name, album_name).to_lowercase();

    let full = token_sort_ratio(&search_term, &title_lower);
    let album = partial_ratio(&album_name.to_lowercase(), &title_lower);
    let band = partial_ratio(&band_name.to_lowercase(), &title_lower);

    let base = if band >= 70 && album >= 70 {
        full.max((album + band) / 2)
    } else {
        full.max(album)
    };
    let boost = if title_lower.contains("full album") { 10 } else { 0 };

    (base + boost).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_of_identical_strings_is_100() {
        assert_eq!(ratio("black metal", "black metal"), 100);
        assert_eq!(ratio("", ""), 100);
    }

    #[test]
    fn token_sort_ignores_word_order() {
        assert_eq!(token_sort_ratio("metal black", "black metal"), 100);
        assert!(token_sort_ratio("black metal", "doom jazz") < 50);
    }

    #[test]
    fn partial_ratio_finds_exact_substrings() {
        assert_eq!(
            partial_ratio("this used to be heaven", "angelmaker - this used to be heaven (full album 2025)"),
            100
        );
        assert_eq!(partial_ratio("", "anything"), 0);
    }

    #[test]
    fn candidate_score_caps_at_100_with_full_album_boost() {
        // Both partial ratios hit 100, boost +10, capped.
        let score = score_video_candidate(
            "AngelMaker",
            "This Used to Be Heaven",
            "AngelMaker - This Used to Be Heaven (Full Album 2025)",
        );
        assert_eq!(score, 100);
        assert!(score >= 90, "must clear the strict pipeline threshold");
    }

    #[test]
    fn unrelated_title_scores_low() {
        let score = score_video_candidate("AngelMaker", "This Used to Be Heaven", "Cooking pasta at home");
        assert!(score < 50);
    }

    #[test]
    fn album_only_match_without_band_uses_album_partial() {
        // The band never appears, so the band>=70 gate must not fire.
        let score = score_video_candidate("Obscure Band", "Eternal Night", "Eternal Night (2025)");
        assert!(score >= 90);
    }
}
