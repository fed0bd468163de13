//! Attributed rune sequences.
//!
//! A line of raw bytes is decoded into an [`Astring`]: parallel arrays of
//! code points and per-rune style records. Recognized SGR escape sequences
//! are consumed into the attribute array instead of being emitted as runes,
//! which keeps search and slicing index-stable against the original text.

mod decode;

pub use decode::decode;

use bitflags::bitflags;

bitflags! {
    /// Active SGR styles. Bit `n` corresponds to SGR code `n`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Style: u16 {
        const BOLD = 1 << 1;
        const DIM = 1 << 2;
        const ITALIC = 1 << 3;
        const UNDERLINE = 1 << 4;
        const BLINK = 1 << 5;
        const REVERSE = 1 << 7;
        const CONCEAL = 1 << 8;
        const STRIKE = 1 << 9;
    }
}

impl Style {
    /// Maps an SGR parameter to its style bit. Parameters outside the
    /// representable set (and all color parameters) yield `None`.
    pub fn from_sgr(param: u16) -> Option<Style> {
        match param {
            1 => Some(Style::BOLD),
            2 => Some(Style::DIM),
            3 => Some(Style::ITALIC),
            4 => Some(Style::UNDERLINE),
            5 => Some(Style::BLINK),
            7 => Some(Style::REVERSE),
            8 => Some(Style::CONCEAL),
            9 => Some(Style::STRIKE),
            _ => None,
        }
    }
}

/// Per-rune attribute record. Zero values mean "terminal default".
///
/// `fg` holds the raw SGR code for the basic palette (30..=37) or a
/// 256-color index (16..=255) from a `38;5;N` parameter run; `bg` likewise
/// with 40..=47 and `48;5;N`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RuneAttr {
    pub fg: u16,
    pub bg: u16,
    pub style: Style,
}

impl RuneAttr {
    pub fn is_default(&self) -> bool {
        *self == RuneAttr::default()
    }
}

/// An attributed string: parallel rune and attribute arrays of equal length.
/// Immutable once produced by the decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Astring {
    pub runes: Vec<char>,
    pub attrs: Vec<RuneAttr>,
}

impl Astring {
    pub fn from_bytes(src: &[u8]) -> Astring {
        decode(src)
    }

    pub fn len(&self) -> usize {
        self.runes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runes.is_empty()
    }

    /// The plain text, attributes dropped.
    pub fn text(&self) -> String {
        self.runes.iter().collect()
    }
}

/// First occurrence of `needle` in `haystack`, as a rune index.
///
/// An empty needle matches at position 0, mirroring slice `starts_with`
/// semantics for the degenerate case.
pub fn index(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// All non-overlapping occurrences of `needle`, in order.
pub fn index_all(haystack: &[char], needle: &[char]) -> Vec<std::ops::Range<usize>> {
    let mut out = Vec::new();
    if needle.is_empty() {
        return out;
    }
    let mut from = 0;
    while let Some(at) = index(&haystack[from..], needle) {
        let start = from + at;
        out.push(start..start + needle.len());
        from = start + needle.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runes(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn index_finds_first_occurrence() {
        assert_eq!(index(&runes("foobarfoo"), &runes("foo")), Some(0));
        assert_eq!(index(&runes("xfoobar"), &runes("foo")), Some(1));
        assert_eq!(index(&runes("foobar"), &runes("baz")), None);
        assert_eq!(index(&runes("ab"), &runes("abc")), None);
    }

    #[test]
    fn index_all_is_non_overlapping() {
        assert_eq!(index_all(&runes("aaaa"), &runes("aa")), vec![0..2, 2..4]);
        assert_eq!(
            index_all(&runes("foo bar foo"), &runes("foo")),
            vec![0..3, 8..11]
        );
        assert!(index_all(&runes("abc"), &runes("")).is_empty());
    }

    #[test]
    fn style_bits_track_sgr_codes() {
        assert_eq!(Style::from_sgr(1), Some(Style::BOLD));
        assert_eq!(Style::from_sgr(4), Some(Style::UNDERLINE));
        assert_eq!(Style::from_sgr(7), Some(Style::REVERSE));
        assert_eq!(Style::from_sgr(31), None);
        assert_eq!(Style::from_sgr(0), None);
    }
}
