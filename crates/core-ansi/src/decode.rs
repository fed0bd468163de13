//! Byte slab → [`Astring`] decoder.
//!
//! Input is one line with the trailing newline already stripped. The decoder
//! is tolerant by construction: malformed escape sequences are dropped and
//! decoding itself never fails.

use crate::{Astring, RuneAttr, Style};

const ESC: u8 = 0x1b;
const BACKSPACE: u8 = 0x08;

/// An SGR parameter run longer than this is treated as malformed and the
/// sequence is dropped.
const MAX_PARAM_BYTES: usize = 7;

/// Decodes one line of raw bytes into an attributed rune sequence.
///
/// Recognized `ESC [ <params> m` sequences are consumed and update the
/// running attribute; parameters 30..=37 set the foreground, 40..=47 the
/// background, `38;5;N`/`48;5;N` the 256-color foreground/background, 0
/// resets, and any other non-zero parameter sets its style bit. Backspace
/// overstrike (`X BS X`, `_ BS X`) rewrites the previous rune slot and marks
/// it for bold or underline rendering.
pub fn decode(src: &[u8]) -> Astring {
    let mut out = Astring {
        runes: Vec::with_capacity(src.len()),
        attrs: Vec::with_capacity(src.len()),
    };
    let mut attr = RuneAttr::default();
    let mut i = 0;

    while i < src.len() {
        let b = src[i];
        if b == ESC && i + 1 < src.len() && src[i + 1] == b'[' {
            match scan_sgr(&src[i + 2..]) {
                Some((params, consumed)) => {
                    // A parameter that fails to parse drops the sequence but
                    // leaves the running attribute untouched.
                    apply_params(params, &mut attr);
                    i += 2 + consumed;
                }
                None => {
                    // No terminator in range: drop ESC '[' and emit the rest
                    // with the style unchanged.
                    i += 2;
                }
            }
            continue;
        }
        if b == BACKSPACE {
            if !out.runes.is_empty() && i + 1 < src.len() {
                let (succ, width) = decode_rune(&src[i + 1..]);
                overstrike(&mut out, succ, attr);
                i += 1 + width;
            } else {
                i += 1;
            }
            continue;
        }
        let (rune, width) = decode_rune(&src[i..]);
        out.runes.push(rune);
        out.attrs.push(attr);
        i += width;
    }
    out
}

/// Looks for the `m` terminator within the next [`MAX_PARAM_BYTES`] bytes.
/// Returns the parameter bytes and the consumed length (terminator
/// included), or `None` when the run is unterminated or contains anything
/// but digits and `;`.
fn scan_sgr(src: &[u8]) -> Option<(&[u8], usize)> {
    let limit = src.len().min(MAX_PARAM_BYTES + 1);
    for j in 0..limit {
        match src[j] {
            b'm' => return Some((&src[..j], j + 1)),
            b'0'..=b'9' | b';' => {}
            _ => return None,
        }
    }
    None
}

fn apply_params(params: &[u8], attr: &mut RuneAttr) {
    if params.is_empty() {
        // `ESC [ m` is shorthand for a full reset.
        *attr = RuneAttr::default();
        return;
    }
    let mut values: Vec<u16> = Vec::with_capacity(4);
    for piece in params.split(|&b| b == b';') {
        if piece.is_empty() {
            return;
        }
        let mut v: u32 = 0;
        for &digit in piece {
            v = v * 10 + u32::from(digit - b'0');
        }
        let Ok(v) = u16::try_from(v) else {
            return;
        };
        values.push(v);
    }

    let mut staged = *attr;
    let mut k = 0;
    while k < values.len() {
        match values[k] {
            0 => staged = RuneAttr::default(),
            30..=37 => staged.fg = values[k],
            40..=47 => staged.bg = values[k],
            38 | 48 if values.get(k + 1) == Some(&5) => {
                let Some(&n) = values.get(k + 2) else {
                    return;
                };
                if values[k] == 38 {
                    staged.fg = n;
                } else {
                    staged.bg = n;
                }
                k += 2;
            }
            other => {
                if let Some(bit) = Style::from_sgr(other) {
                    staged.style |= bit;
                }
            }
        }
        k += 1;
    }
    *attr = staged;
}

/// Rewrites the previous rune slot with the overstriking rune. Equal runes
/// render as bold (bold red), `_` predecessors as underline (bold green).
fn overstrike(out: &mut Astring, succ: char, attr: RuneAttr) {
    let slot = out.runes.len() - 1;
    let prev = out.runes[slot];
    out.runes[slot] = succ;
    if prev == succ {
        out.attrs[slot].style |= Style::BOLD;
        out.attrs[slot].fg = 31;
    } else if prev == '_' {
        out.attrs[slot].style |= Style::BOLD;
        out.attrs[slot].fg = 32;
    } else {
        out.attrs[slot] = attr;
    }
}

/// Decodes one UTF-8 code point, yielding U+FFFD (width 1) on invalid input
/// so that decoding always makes progress.
fn decode_rune(src: &[u8]) -> (char, usize) {
    let width = match src[0] {
        0x00..=0x7f => return (src[0] as char, 1),
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => return (char::REPLACEMENT_CHARACTER, 1),
    };
    if src.len() < width {
        return (char::REPLACEMENT_CHARACTER, 1);
    }
    match std::str::from_utf8(&src[..width]) {
        Ok(s) => match s.chars().next() {
            Some(c) => (c, width),
            None => (char::REPLACEMENT_CHARACTER, 1),
        },
        Err(_) => (char::REPLACEMENT_CHARACTER, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn attrs_of(a: &Astring) -> Vec<RuneAttr> {
        a.attrs.clone()
    }

    #[test]
    fn plain_ascii_is_identity() {
        let a = decode(b"hello world");
        assert_eq!(a.text(), "hello world");
        assert!(a.attrs.iter().all(RuneAttr::is_default));
    }

    #[test]
    fn utf8_multibyte_runes_decode() {
        let a = decode("héllo — 中🙂".as_bytes());
        assert_eq!(a.text(), "héllo — 中🙂");
        assert_eq!(a.runes.len(), a.attrs.len());
    }

    #[test]
    fn invalid_utf8_yields_replacement() {
        let a = decode(&[b'a', 0xff, b'b']);
        assert_eq!(a.text(), "a\u{fffd}b");
    }

    #[test]
    fn sgr_foreground_applies_to_following_runes() {
        let a = decode(b"\x1b[31mred\x1b[0m");
        assert_eq!(a.text(), "red");
        for attr in &a.attrs {
            assert_eq!(attr.fg, 31);
        }
    }

    #[test]
    fn sgr_state_spans_sequences() {
        let a = decode(b"a\x1b[31mb\x1b[44mc\x1b[0md");
        assert_eq!(a.text(), "abcd");
        assert_eq!(a.attrs[0], RuneAttr::default());
        assert_eq!(a.attrs[1].fg, 31);
        assert_eq!(a.attrs[2].fg, 31);
        assert_eq!(a.attrs[2].bg, 44);
        assert_eq!(a.attrs[3], RuneAttr::default());
    }

    #[test]
    fn sgr_style_bits_accumulate() {
        let a = decode(b"\x1b[1;4mx");
        assert_eq!(a.attrs[0].style, Style::BOLD | Style::UNDERLINE);
    }

    #[test]
    fn sgr_256_color_fits_the_window() {
        let a = decode(b"\x1b[38;5;81mx");
        assert_eq!(a.attrs[0].fg, 81);
        let a = decode(b"\x1b[48;5;17mx");
        assert_eq!(a.attrs[0].bg, 17);
    }

    #[test]
    fn bare_reset_clears_everything() {
        let a = decode(b"\x1b[31;1ma\x1b[mb");
        assert_eq!(a.attrs[0].fg, 31);
        assert_eq!(a.attrs[1], RuneAttr::default());
    }

    #[test]
    fn unterminated_sequence_drops_introducer_only() {
        // No 'm' within seven bytes: ESC '[' are dropped, the rest is
        // emitted literally with the style unchanged.
        let a = decode(b"\x1b[123456789m-tail");
        assert_eq!(a.text(), "123456789m-tail");
        assert!(a.attrs.iter().all(RuneAttr::is_default));
    }

    #[test]
    fn non_sgr_escape_is_emitted_as_runes() {
        let a = decode(b"\x1b]0;title\x07x");
        assert_eq!(a.runes[0], '\u{1b}');
        assert_eq!(a.runes[1], ']');
    }

    #[test]
    fn trailing_escape_survives() {
        let a = decode(b"x\x1b");
        assert_eq!(a.runes, vec!['x', '\u{1b}']);
    }

    #[test]
    fn empty_params_piece_keeps_style_unchanged() {
        let a = decode(b"\x1b[31mx\x1b[;my");
        assert_eq!(a.text(), "xy");
        assert_eq!(a.attrs[0].fg, 31);
        // Malformed sequence dropped, running style untouched.
        assert_eq!(a.attrs[1].fg, 31);
    }

    #[test]
    fn overstrike_equal_rune_is_bold() {
        let a = decode(b"a\x08a");
        assert_eq!(a.text(), "a");
        assert!(a.attrs[0].style.contains(Style::BOLD));
        assert_eq!(a.attrs[0].fg, 31);
    }

    #[test]
    fn overstrike_underscore_is_underline() {
        let a = decode(b"_\x08a");
        assert_eq!(a.text(), "a");
        assert!(a.attrs[0].style.contains(Style::BOLD));
        assert_eq!(a.attrs[0].fg, 32);
    }

    #[test]
    fn overstrike_mismatch_just_replaces() {
        let a = decode(b"x\x08y");
        assert_eq!(a.text(), "y");
        assert_eq!(a.attrs[0], RuneAttr::default());
    }

    #[test]
    fn leading_backspace_is_dropped() {
        let a = decode(b"\x08abc");
        assert_eq!(a.text(), "abc");
    }

    #[test]
    fn stripping_matches_decode_of_concatenation() {
        // decode(A + SGR + B) emits the same runes as decode(A + B), with
        // B's attributes reflecting the parameters.
        let a = decode(b"foo\x1b[32mbar");
        let plain = decode(b"foobar");
        assert_eq!(a.runes, plain.runes);
        assert_eq!(attrs_of(&a)[..3], attrs_of(&plain)[..3]);
        for attr in &a.attrs[3..] {
            assert_eq!(attr.fg, 32);
        }
    }

    proptest! {
        // Round-trip: with no control bytes or backspaces, decoding then
        // re-emitting the runes is the identity and all attributes are zero.
        #[test]
        fn decode_round_trip(chars in proptest::collection::vec(
            any::<char>().prop_filter("no control runes", |c| !c.is_control()),
            0..64,
        )) {
            let text: String = chars.iter().collect();
            let a = decode(text.as_bytes());
            prop_assert_eq!(a.runes, chars);
            prop_assert!(a.attrs.iter().all(RuneAttr::is_default));
        }
    }
}
