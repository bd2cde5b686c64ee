//! Glyph widths of the standard Helvetica font (WinAnsi encoding), in 1/1000 em.

const FIRST_PRINTABLE: u32 = 32;

#[rustfmt::skip]
const PRINTABLE_WIDTHS: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // : ; < = > ? @
    278, 278, 584, 584, 584, 556, 1015,
    // A-Z
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [ \ ] ^ _ `
    278, 278, 278, 469, 556, 333,
    // a-z
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    // { | } ~
    334, 260, 334, 584,
];

/// Used for anything outside printable ASCII.
const DEFAULT_WIDTH: u16 = 556;

/// Height of capital letters, for vertical centering.
pub const CAP_HEIGHT: f32 = 0.718;

pub fn char_width(ch: char) -> u16 {
    (ch as u32)
        .checked_sub(FIRST_PRINTABLE)
        .and_then(|index| PRINTABLE_WIDTHS.get(index as usize))
        .copied()
        .unwrap_or(DEFAULT_WIDTH)
}

/// Advance width of `text` at `font_size` points.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|ch| u32::from(char_width(ch))).sum();
    units as f32 * font_size / 1000.0
}

/// Characters at WinAnsi codes 0x80..=0x9F; `None` marks unused codes.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// WinAnsi code for `ch`, if the encoding has one.
pub fn win_ansi_code(ch: char) -> Option<u8> {
    match u32::from(ch) {
        code @ (0x20..=0x7E | 0xA0..=0xFF) => u8::try_from(code).ok(),
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|mapped| *mapped == Some(ch))
            .and_then(|index| u8::try_from(0x80 + index).ok()),
    }
}

/// Maps text to single-byte WinAnsi codes; characters the encoding lacks become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|ch| win_ansi_code(ch).unwrap_or(b'?')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_widths() {
        assert_eq!(char_width(' '), 278);
        assert_eq!(char_width('/'), 278);
        assert_eq!(char_width('0'), 556);
        assert_eq!(char_width('W'), 944);
        assert_eq!(char_width('i'), 222);
        assert_eq!(char_width('~'), 584);
        assert_eq!(char_width('é'), DEFAULT_WIDTH);
    }

    #[test]
    fn date_stamp_width() {
        // Six digits and two slashes.
        let width = text_width("1/5/2026", 8.0);
        assert!((width - 31.136).abs() < 1e-3, "got {width}");
    }

    #[test]
    fn win_ansi_replaces_wide_characters() {
        assert_eq!(encode_win_ansi("Zoë ✓"), vec![b'Z', b'o', 0xEB, b' ', b'?']);
    }

    #[test]
    fn win_ansi_maps_the_high_block() {
        assert_eq!(encode_win_ansi("5 €"), vec![b'5', b' ', 0x80]);
        assert_eq!(encode_win_ansi("a–b—c"), vec![b'a', 0x96, b'b', 0x97, b'c']);
        assert_eq!(encode_win_ansi("\u{2018}ok\u{2019} ™"), vec![0x91, b'o', b'k', 0x92, b' ', 0x99]);
        assert_eq!(encode_win_ansi("Ÿž"), vec![0x9F, 0x9E]);
    }

    #[test]
    fn c1_controls_are_not_passed_through() {
        assert_eq!(encode_win_ansi("\u{0080}\u{0093}\u{009F}"), b"???".to_vec());
        assert_eq!(win_ansi_code('\u{00A0}'), Some(0xA0));
        assert_eq!(win_ansi_code('\n'), None);
    }
}
