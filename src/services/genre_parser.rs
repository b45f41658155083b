//! Genre string parser.
//!
//! Archive genre strings are messy compounds like
//! `"Doom/Death Metal (early); Progressive Death/Black Metal (mid)"`.
//! The parser extracts temporal qualifiers, expands compounds so shared
//! prefixes and suffixes distribute across the slash, classifies each atom
//! as a metal main / related genre, and scores its own confidence.

use regex::Regex;
use std::collections::HashMap;

use crate::models::{GenreKind, GenrePeriod, ParsedGenre, ParsedGenreRow};

/// Words that mark a genre as metal when they appear anywhere in it.
const METAL_WORD_CUES: &[&str] = &["black", "death", "thrash", "doom", "heavy", "power", "speed"];

/// Non-metal cues classifying an atom as a related genre.
const RELATED_CUES: &[&str] = &[
    "rock", "punk", "hardcore", "jazz", "classical", "electronic", "ambient", "folk", "blues",
    "country", "noise", "shoegaze", "emo", "indie", "alternative", "experimental",
];

/// Single-word modifier vocabulary.
const MODIFIER_WORDS: &[&str] = &[
    "atmospheric", "melodic", "progressive", "symphonic", "technical", "brutal", "raw", "ambient",
    "experimental", "industrial", "epic", "aggressive", "dark", "blackened", "modern",
    "traditional", "psychedelic", "post", "neo", "proto", "retro", "depressive", "funeral",
    "viking", "pagan", "folk", "gothic", "nu",
];

/// Modifiers matched as phrases on the whole segment.
const MULTI_WORD_MODIFIERS: &[&str] = &["old school", "avant-garde"];

/// Phrases that raise confidence when present verbatim.
const CANONICAL_PHRASES: &[&str] = &["black metal", "death metal", "thrash metal", "heavy metal"];

/// Words that make a compound part self-contained (it already names a base
/// genre, so no suffix sharing applies).
const BASE_SUFFIXES: &[&str] = &[
    "metal", "rock", "core", "punk", "grind", "jazz", "noise", "ambient", "electronic", "blues",
    "country", "shoegaze", "hardcore",
];

/// Indicators used when inferring a parent genre for the taxonomy.
const PARENT_INDICATORS: &[&str] = &[
    "metal", "core", "grind", "doom", "black", "death", "thrash", "heavy", "power", "speed",
];

const UI_PALETTE: &[&str] = &[
    "#8b0000", "#b22222", "#4b0082", "#2f4f4f", "#556b2f", "#8b4513", "#483d8b", "#191970",
    "#800080", "#9932cc", "#1c1c2e", "#3c6e47",
];

pub struct GenreParser {
    temporal_re: Regex,
    aliases: HashMap<&'static str, &'static str>,
    capitalization: HashMap<&'static str, &'static str>,
}

impl Default for GenreParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GenreParser {
    pub fn new() -> Self {
        let aliases = HashMap::from([
            ("BM", "Black Metal"),
            ("DM", "Death Metal"),
            ("TM", "Thrash Metal"),
            ("HM", "Heavy Metal"),
            ("PM", "Power Metal"),
            ("Blackened Death Metal", "Black/Death Metal"),
            ("Death/Black Metal", "Black/Death Metal"),
            ("Thrash/Death Metal", "Death/Thrash Metal"),
        ]);
        let capitalization = HashMap::from([
            ("metal", "Metal"),
            ("black", "Black"),
            ("death", "Death"),
            ("thrash", "Thrash"),
            ("heavy", "Heavy"),
            ("doom", "Doom"),
            ("power", "Power"),
            ("folk", "Folk"),
            ("progressive", "Progressive"),
            ("symphonic", "Symphonic"),
            ("gothic", "Gothic"),
            ("industrial", "Industrial"),
            ("post", "Post"),
            ("rock", "Rock"),
            ("hardcore", "Hardcore"),
            ("punk", "Punk"),
        ]);
        Self {
            temporal_re: Regex::new(r"(?i)\((early|mid|middle|later|late|now|current|recent)\)")
                .expect("temporal pattern is valid"),
            aliases,
            capitalization,
        }
    }

    /// Parse a raw genre string into structured genres. Empty and
    /// whitespace-only input yields an empty list.
    pub fn parse(&self, raw: &str) -> Vec<ParsedGenre> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut parsed = Vec::new();
        for chunk in trimmed.split(';') {
            for segment in chunk.split(',') {
                let (cleaned, period) = self.extract_period(segment);
                let cleaned = cleaned.trim();
                if cleaned.is_empty() {
                    continue;
                }
                let normalized = self.normalize(cleaned);
                for atom in self.expand_compound(&normalized) {
                    if let Some(genre) = self.classify(&atom, period) {
                        parsed.push(genre);
                    }
                }
            }
        }

        self.deduplicate(parsed)
    }

    /// Pull a temporal qualifier out of one segment. The qualifier applies
    /// to every atom of the segment it trails.
    fn extract_period(&self, segment: &str) -> (String, Option<GenrePeriod>) {
        let mut period = None;
        for captures in self.temporal_re.captures_iter(segment) {
            if period.is_none() {
                period = GenrePeriod::parse(&captures[1]);
            }
        }
        let cleaned = self.temporal_re.replace_all(segment, "").to_string();
        (cleaned, period)
    }

    /// Collapse whitespace, apply known aliases and fix capitalization.
    pub fn normalize(&self, genre: &str) -> String {
        let collapsed = genre.split_whitespace().collect::<Vec<_>>().join(" ");
        let aliased = self
            .aliases
            .get(collapsed.as_str())
            .map(|a| a.to_string())
            .unwrap_or(collapsed);
        self.capitalize(&aliased)
    }

    fn capitalize(&self, genre: &str) -> String {
        genre
            .split(' ')
            .map(|word| {
                let lower = word.to_lowercase();
                match self.capitalization.get(lower.as_str()) {
                    Some(fixed) => fixed.to_string(),
                    None => title_case(word),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Expand a slash compound so shared affixes distribute over the parts:
    /// `Doom/Death Metal` becomes `Doom Metal` + `Death Metal`, and
    /// `Progressive Death/Black Metal` becomes `Progressive Death Metal` +
    /// `Progressive Black Metal`.
    fn expand_compound(&self, segment: &str) -> Vec<String> {
        if !segment.contains('/') {
            return vec![segment.to_string()];
        }

        let parts: Vec<String> = segment
            .split('/')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 2 {
            return parts;
        }

        // Trailing base genre shared backwards over parts that lack one.
        let tail: Option<String> = parts
            .iter()
            .rev()
            .find(|part| has_base_suffix(part))
            .and_then(|part| part.split(' ').last().map(str::to_string));

        // Leading modifiers of the first part shared forwards.
        let prefix: Vec<String> = parts[0]
            .split(' ')
            .take_while(|word| MODIFIER_WORDS.contains(&word.to_lowercase().as_str()))
            .map(str::to_string)
            .collect();

        parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                let mut atom = part.clone();
                if !has_base_suffix(&atom) {
                    if let Some(tail) = &tail {
                        atom = format!("{} {}", atom, tail);
                    }
                }
                if index > 0 && !prefix.is_empty() {
                    let already_prefixed = atom
                        .to_lowercase()
                        .starts_with(&prefix.join(" ").to_lowercase());
                    if !already_prefixed {
                        atom = format!("{} {}", prefix.join(" "), atom);
                    }
                }
                atom
            })
            .collect()
    }

    /// Classify one atom into a main metal genre, a related genre or an
    /// unknown main with low confidence.
    fn classify(&self, atom: &str, period: Option<GenrePeriod>) -> Option<ParsedGenre> {
        if atom.is_empty() {
            return None;
        }
        let text = atom.to_lowercase();

        let is_metal = text.ends_with("metal")
            || text.contains("core")
            || text.contains("grind")
            || METAL_WORD_CUES.iter().any(|cue| text.contains(cue));

        let modifiers = self.extract_modifiers(&text);

        if is_metal {
            let confidence = self.confidence(&text, &modifiers);
            return Some(ParsedGenre {
                main: atom.to_string(),
                modifiers,
                related: Vec::new(),
                period,
                confidence,
            });
        }

        if RELATED_CUES.iter().any(|cue| text.contains(cue)) {
            return Some(ParsedGenre {
                main: String::new(),
                modifiers: Vec::new(),
                related: vec![atom.to_string()],
                period,
                confidence: 0.8,
            });
        }

        Some(ParsedGenre {
            main: atom.to_string(),
            modifiers,
            related: Vec::new(),
            period,
            confidence: 0.5,
        })
    }

    fn extract_modifiers(&self, text: &str) -> Vec<String> {
        let mut modifiers: Vec<String> = Vec::new();
        for word in text.split_whitespace() {
            if MODIFIER_WORDS.contains(&word) {
                let cased = title_case(word);
                if !modifiers.contains(&cased) {
                    modifiers.push(cased);
                }
            }
        }
        for phrase in MULTI_WORD_MODIFIERS {
            if text.contains(phrase) {
                let cased = title_case(phrase);
                if !modifiers.contains(&cased) {
                    modifiers.push(cased);
                }
            }
        }
        modifiers.sort();
        modifiers
    }

    /// Base 0.5, +0.3 for metal classification, +0.2 for an explicit
    /// "metal", +0.1 per modifier, +0.2 for canonical phrases. Capped at 1.
    fn confidence(&self, text: &str, modifiers: &[String]) -> f64 {
        let mut confidence = 0.5 + 0.3;
        if text.split_whitespace().any(|w| w.contains("metal")) {
            confidence += 0.2;
        }
        confidence += modifiers.len() as f64 * 0.1;
        if CANONICAL_PHRASES.iter().any(|p| text.contains(p)) {
            confidence += 0.2;
        }
        confidence.min(1.0)
    }

    /// Merge duplicate genres: union modifier/related sets, average the
    /// confidences, keep the first period seen. Metal mains are keyed by
    /// the main name; related-only entries are keyed by their related name,
    /// so distinct related genres never collide (each keeps its own
    /// period).
    fn deduplicate(&self, genres: Vec<ParsedGenre>) -> Vec<ParsedGenre> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<ParsedGenre>> = HashMap::new();
        for genre in genres {
            let key = match genre.related.first() {
                Some(related) if genre.main.is_empty() => format!("related:{}", related),
                _ => genre.main.clone(),
            };
            if !grouped.contains_key(&key) {
                order.push(key.clone());
            }
            grouped.entry(key).or_default().push(genre);
        }

        order
            .into_iter()
            .map(|key| {
                let group = grouped.remove(&key).unwrap();
                if group.len() == 1 {
                    return group.into_iter().next().unwrap();
                }
                let main = group[0].main.clone();
                let mut modifiers: Vec<String> = Vec::new();
                let mut related: Vec<String> = Vec::new();
                let mut period = None;
                let mut total_confidence = 0.0;
                let count = group.len() as f64;
                for genre in &group {
                    for modifier in &genre.modifiers {
                        if !modifiers.contains(modifier) {
                            modifiers.push(modifier.clone());
                        }
                    }
                    for rel in &genre.related {
                        if !related.contains(rel) {
                            related.push(rel.clone());
                        }
                    }
                    if period.is_none() {
                        period = genre.period;
                    }
                    total_confidence += genre.confidence;
                }
                modifiers.sort();
                related.sort();
                ParsedGenre {
                    main,
                    modifiers,
                    related,
                    period,
                    confidence: total_confidence / count,
                }
            })
            .collect()
    }

    /// Infer a parent genre from the trailing words, longest candidate
    /// first: "Progressive Death Metal" -> "Death Metal" -> "Metal".
    pub fn parent_genre(&self, genre: &str) -> Option<String> {
        let words: Vec<&str> = genre.split(' ').collect();
        if words.len() < 2 {
            return None;
        }
        for take in (1..=2.min(words.len() - 1)).rev() {
            let candidate = words[words.len() - take..].join(" ");
            let lower = candidate.to_lowercase();
            if PARENT_INDICATORS.iter().any(|i| lower.contains(i)) {
                let base = self.capitalize(&candidate);
                if base != genre {
                    return Some(base);
                }
            }
        }
        None
    }

    /// Deterministic UI color for a genre name.
    pub fn color_for(genre: &str) -> String {
        let mut acc: u64 = 0;
        for byte in genre.to_lowercase().bytes() {
            acc = acc.wrapping_mul(31).wrapping_add(byte as u64);
        }
        UI_PALETTE[(acc % UI_PALETTE.len() as u64) as usize].to_string()
    }
}

fn has_base_suffix(part: &str) -> bool {
    part.split(' ')
        .last()
        .map(|word| {
            let lower = word.to_lowercase();
            BASE_SUFFIXES.iter().any(|suffix| lower.contains(suffix))
        })
        .unwrap_or(false)
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            word.split('-')
                .map(|piece| {
                    let mut chars = piece.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand parsed genres into store rows: one `main` row at full confidence,
/// `modifier` rows at 0.8x and `related` rows at 0.7x.
pub fn expand_to_rows(genres: &[ParsedGenre]) -> Vec<ParsedGenreRow> {
    let mut rows = Vec::new();
    for genre in genres {
        if !genre.main.is_empty() {
            rows.push(ParsedGenreRow::new(
                genre.main.clone(),
                GenreKind::Main,
                genre.confidence,
                genre.period,
            ));
        }
        for modifier in &genre.modifiers {
            rows.push(ParsedGenreRow::new(
                modifier.clone(),
                GenreKind::Modifier,
                genre.confidence * 0.8,
                genre.period,
            ));
        }
        for related in &genre.related {
            rows.push(ParsedGenreRow::new(
                related.clone(),
                GenreKind::Related,
                genre.confidence * 0.7,
                genre.period,
            ));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mains(parsed: &[ParsedGenre]) -> Vec<&str> {
        parsed
            .iter()
            .filter(|g| !g.main.is_empty())
            .map(|g| g.main.as_str())
            .collect()
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        let parser = GenreParser::new();
        assert!(parser.parse("").is_empty());
        assert!(parser.parse("   ").is_empty());
    }

    #[test]
    fn simple_genre_parses_as_single_main() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Black Metal");
        assert_eq!(mains(&parsed), ["Black Metal"]);
        assert!(parsed[0].confidence >= 0.9);
        assert!(parsed[0].period.is_none());
    }

    #[test]
    fn compound_with_temporal_qualifiers_distributes_both() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Doom/Death Metal (early); Progressive Death/Black Metal (mid)");

        assert_eq!(
            mains(&parsed),
            [
                "Doom Metal",
                "Death Metal",
                "Progressive Death Metal",
                "Progressive Black Metal"
            ]
        );
        assert_eq!(parsed[0].period, Some(GenrePeriod::Early));
        assert_eq!(parsed[1].period, Some(GenrePeriod::Early));
        assert_eq!(parsed[2].period, Some(GenrePeriod::Mid));
        assert_eq!(parsed[3].period, Some(GenrePeriod::Mid));
        assert!(parsed.iter().all(|g| g.confidence >= 0.5));
    }

    #[test]
    fn non_metal_genres_classify_as_related() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Black Metal/Post-Rock");

        let metal: Vec<_> = parsed.iter().filter(|g| g.main == "Black Metal").collect();
        assert_eq!(metal.len(), 1);
        let related: Vec<_> = parsed.iter().filter(|g| !g.related.is_empty()).collect();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].related, ["Post-Rock"]);
        assert!((related[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn distinct_related_genres_keep_their_own_periods() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Jazz (early), Blues (later)");

        assert_eq!(parsed.len(), 2);
        let jazz = parsed.iter().find(|g| g.related == ["Jazz"]).unwrap();
        let blues = parsed.iter().find(|g| g.related == ["Blues"]).unwrap();
        assert_eq!(jazz.period, Some(GenrePeriod::Early));
        assert_eq!(blues.period, Some(GenrePeriod::Later));
    }

    #[test]
    fn different_related_genres_do_not_merge() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Rock, Jazz");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].related, ["Rock"]);
        assert_eq!(parsed[1].related, ["Jazz"]);
    }

    #[test]
    fn repeated_related_genres_still_merge() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Jazz, Jazz (early)");

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].related, ["Jazz"]);
        assert_eq!(parsed[0].period, Some(GenrePeriod::Early));
    }

    #[test]
    fn duplicate_mains_merge_with_averaged_confidence() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Black Metal, Black/Thrash Metal");

        // "Black/Thrash Metal" expands to Black Metal + Thrash Metal; the
        // first Black Metal merges with it.
        assert_eq!(mains(&parsed), ["Black Metal", "Thrash Metal"]);
    }

    #[test]
    fn modifiers_are_extracted_and_boost_confidence() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Atmospheric Black Metal");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].modifiers, ["Atmospheric"]);
        assert!((parsed[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn multi_word_modifiers_match_on_the_segment() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Old School Death Metal");
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].modifiers.contains(&"Old School".to_string()));
    }

    #[test]
    fn aliases_normalize_before_expansion() {
        let parser = GenreParser::new();
        let parsed = parser.parse("BM");
        assert_eq!(mains(&parsed), ["Black Metal"]);
    }

    #[test]
    fn unknown_genre_keeps_low_confidence_main() {
        let parser = GenreParser::new();
        let parsed = parser.parse("Dungeon Synth");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].main, "Dungeon Synth");
        assert!((parsed[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn parent_inference_prefers_longest_base() {
        let parser = GenreParser::new();
        assert_eq!(
            parser.parent_genre("Progressive Death Metal"),
            Some("Death Metal".to_string())
        );
        assert_eq!(parser.parent_genre("Death Metal"), Some("Metal".to_string()));
        assert_eq!(parser.parent_genre("Metal"), None);
    }

    #[test]
    fn rows_expand_with_proportional_confidence() {
        let genres = vec![ParsedGenre {
            main: "Black Metal".to_string(),
            modifiers: vec!["Atmospheric".to_string()],
            related: vec!["Post-Rock".to_string()],
            period: Some(GenrePeriod::Early),
            confidence: 1.0,
        }];
        let rows = expand_to_rows(&genres);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].genre_type, "main");
        assert!((rows[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(rows[1].genre_type, "modifier");
        assert!((rows[1].confidence - 0.8).abs() < 1e-9);
        assert_eq!(rows[2].genre_type, "related");
        assert!((rows[2].confidence - 0.7).abs() < 1e-9);
        assert_eq!(rows[0].period.as_deref(), Some("early"));
    }

    #[test]
    fn colors_are_deterministic() {
        assert_eq!(
            GenreParser::color_for("Black Metal"),
            GenreParser::color_for("Black Metal")
        );
    }
}
