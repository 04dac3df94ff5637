// Source-script predicate: only text containing characters from the configured
// Unicode ranges is sent for translation.

use std::ops::RangeInclusive;

const HAN: &[RangeInclusive<char>] = &[
    '\u{4E00}'..='\u{9FFF}', // CJK Unified Ideographs
    '\u{3400}'..='\u{4DBF}', // Extension A
    '\u{F900}'..='\u{FAFF}', // Compatibility Ideographs
];
const HIRAGANA: &[RangeInclusive<char>] = &['\u{3040}'..='\u{309F}'];
const KATAKANA: &[RangeInclusive<char>] = &['\u{30A0}'..='\u{30FF}'];
const HANGUL: &[RangeInclusive<char>] = &['\u{AC00}'..='\u{D7AF}', '\u{1100}'..='\u{11FF}'];
const CYRILLIC: &[RangeInclusive<char>] = &['\u{0400}'..='\u{04FF}'];
const GREEK: &[RangeInclusive<char>] = &['\u{0370}'..='\u{03FF}'];
const ARABIC: &[RangeInclusive<char>] = &['\u{0600}'..='\u{06FF}'];
const HEBREW: &[RangeInclusive<char>] = &['\u{0590}'..='\u{05FF}'];
const THAI: &[RangeInclusive<char>] = &['\u{0E00}'..='\u{0E7F}'];
const DEVANAGARI: &[RangeInclusive<char>] = &['\u{0900}'..='\u{097F}'];

/// Decides whether a piece of text is in one of the source scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFilter {
    /// Empty means every text qualifies
    ranges: Vec<RangeInclusive<char>>,
}

impl ScriptFilter {
    /// Accepts all text (no filtering)
    pub fn any() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Chinese, Japanese and Korean scripts
    pub fn cjk() -> Self {
        Self::from_ranges([HAN, HIRAGANA, KATAKANA, HANGUL].concat())
    }

    pub fn from_ranges(ranges: Vec<RangeInclusive<char>>) -> Self {
        Self { ranges }
    }

    /// Parse a comma-separated list of script names and/or hex ranges
    ///
    /// `"cjk"`, `"han,hangul"`, `"cyrillic,0600-06FF"`, `"3042"`.
    /// `"any"`, `"off"`, `"none"` and `"*"` disable filtering.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if matches!(spec.to_lowercase().as_str(), "" | "any" | "off" | "none" | "*") {
            return Ok(Self::any());
        }

        let mut ranges = Vec::new();
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match named_script(item) {
                Some(named) => ranges.extend_from_slice(&named),
                None => ranges.push(parse_hex_range(item)?),
            }
        }

        if ranges.is_empty() {
            return Err(format!("no scripts in `{}`", spec));
        }
        Ok(Self::from_ranges(ranges))
    }

    /// Whether any filtering is applied
    pub fn is_active(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// True when the text contains at least one character of a source script
    pub fn matches(&self, text: &str) -> bool {
        if !self.is_active() {
            return !text.trim().is_empty();
        }
        text.chars()
            .any(|c| self.ranges.iter().any(|range| range.contains(&c)))
    }
}

impl Default for ScriptFilter {
    fn default() -> Self {
        Self::cjk()
    }
}

fn named_script(name: &str) -> Option<Vec<RangeInclusive<char>>> {
    let ranges: &[&[RangeInclusive<char>]] = match name.to_lowercase().as_str() {
        "cjk" => &[HAN, HIRAGANA, KATAKANA, HANGUL],
        "han" | "chinese" => &[HAN],
        "japanese" => &[HAN, HIRAGANA, KATAKANA],
        "hiragana" => &[HIRAGANA],
        "katakana" => &[KATAKANA],
        "hangul" | "korean" => &[HANGUL],
        "cyrillic" => &[CYRILLIC],
        "greek" => &[GREEK],
        "arabic" => &[ARABIC],
        "hebrew" => &[HEBREW],
        "thai" => &[THAI],
        "devanagari" => &[DEVANAGARI],
        _ => return None,
    };
    Some(ranges.concat())
}

fn parse_hex_range(item: &str) -> Result<RangeInclusive<char>, String> {
    let (start, end) = match item.split_once('-') {
        Some((start, end)) => (start, end),
        None => (item, item),
    };
    let start = parse_code_point(start)?;
    let end = parse_code_point(end)?;
    if start > end {
        return Err(format!("range `{}` is reversed", item));
    }
    Ok(start..=end)
}

fn parse_code_point(raw: &str) -> Result<char, String> {
    let hex = raw
        .trim()
        .trim_start_matches("U+")
        .trim_start_matches("u+")
        .trim_start_matches("0x");
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("`{}` is neither a script name nor a hex code point", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cjk_matches_mixed_text() {
        let filter = ScriptFilter::cjk();
        assert!(filter.matches("你好"));
        assert!(filter.matches("SALE 半額"));
        assert!(filter.matches("カタカナ"));
        assert!(filter.matches("안녕하세요"));
        assert!(!filter.matches("Hello"));
        assert!(!filter.matches("50% OFF"));
        assert!(!filter.matches(""));
    }

    #[test]
    fn test_disabled_filter_accepts_any_non_blank_text() {
        for spec in ["any", "off", "*", ""] {
            let filter = ScriptFilter::parse(spec).unwrap();
            assert!(!filter.is_active());
            assert!(filter.matches("Hello"));
            assert!(!filter.matches("   "));
        }
    }

    #[test]
    fn test_parse_names_and_ranges() {
        let filter = ScriptFilter::parse("cyrillic, 0600-06FF").unwrap();
        assert!(filter.matches("Привет"));
        assert!(filter.matches("مرحبا"));
        assert!(!filter.matches("你好"));

        let single = ScriptFilter::parse("U+3042").unwrap();
        assert!(single.matches("あ"));
        assert!(!single.matches("い"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ScriptFilter::parse("klingon").is_err());
        assert!(ScriptFilter::parse("9FFF-4E00").is_err());
        assert!(ScriptFilter::parse(",,").is_err());
    }
}
