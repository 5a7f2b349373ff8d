//! Place-name normalization shared by the gazetteer and the locality grammars.
//!
//! Matching is case- and diacritic-insensitive and tolerates the common
//! abbreviations found in specimen labels ("Mt.", "Ft.", "St.", "Co.").

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Abbreviation → expanded token. Applied per whitespace-separated token.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("mt", "mount"),
    ("mtn", "mountain"),
    ("mtns", "mountains"),
    ("ft", "fort"),
    ("st", "saint"),
    ("ste", "sainte"),
    ("pt", "point"),
    ("co", "county"),
    ("cnty", "county"),
    ("twp", "township"),
    ("lk", "lake"),
    ("ck", "creek"),
    ("cr", "creek"),
    ("cyn", "canyon"),
    ("riv", "river"),
    ("isl", "island"),
    ("pk", "peak"),
    ("spgs", "springs"),
    ("spr", "spring"),
    ("jct", "junction"),
    ("hwy", "highway"),
    ("natl", "national"),
];

/// Strip diacritics by decomposing and dropping combining marks.
pub fn fold_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalize a place name into its lookup key.
///
/// Lowercases, folds diacritics, turns punctuation into spaces, expands
/// abbreviations and drops a leading article.
pub fn normalize(s: &str) -> String {
    let folded = fold_diacritics(s).to_lowercase();
    let cleaned: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }

    tokens
        .into_iter()
        .map(|t| {
            ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == t)
                .map(|(_, full)| *full)
                .unwrap_or(t)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse runs of whitespace and trim surrounding punctuation.
pub fn clean_phrase(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ',' || c == ';' || c == ':' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_diacritics() {
        assert_eq!(normalize("São Paulo"), "sao paulo");
        assert_eq!(normalize("TROMSØ"), "tromsø");
        assert_eq!(normalize("Île-de-France"), "ile de france");
    }

    #[test]
    fn test_normalize_abbreviations() {
        assert_eq!(normalize("Mt. Hood"), "mount hood");
        assert_eq!(normalize("Ft Collins"), "fort collins");
        assert_eq!(normalize("St. Louis"), "saint louis");
        assert_eq!(normalize("Sangamon Co."), "sangamon county");
    }

    #[test]
    fn test_normalize_drops_leading_article() {
        assert_eq!(normalize("The Dalles"), "dalles");
        assert_eq!(normalize("the"), "the");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  New   York  "), "new york");
    }

    #[test]
    fn test_clean_phrase() {
        assert_eq!(clean_phrase("  Springfield.  "), "Springfield");
        assert_eq!(clean_phrase("Springfield,"), "Springfield");
    }
}
