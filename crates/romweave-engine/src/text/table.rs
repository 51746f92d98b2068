use std::sync::LazyLock;

pub const TERMINATOR: u8 = 0xFF;
pub const FUNCTION_ESCAPE: u8 = 0xFC;
pub const BUTTON_ESCAPE: u8 = 0xF8;
pub const SPECIAL_ESCAPE: u8 = 0xF9;
pub const RAW_ESCAPE: u8 = 0xFD;

/// Bytes that end a displayed line.
pub const LINE_BREAKS: [u8; 3] = [0xFA, 0xFB, 0xFE];

const ENTRIES: &[(u8, &[&str])] = &[
    (0x00, &[" "]),
    (0x01, &["À", "Á", "Â", "Ç", "È", "É", "Ê", "Ë", "Ì"]),
    (0x0B, &["Î", "Ï", "Ò", "Ó", "Ô"]),
    (0x10, &["Œ", "Ù", "Ú", "Û", "Ñ", "ß", "à", "á"]),
    (0x19, &["ç", "è", "é", "ê", "ë", "ì"]),
    (
        0x20,
        &["î", "ï", "ò", "ó", "ô", "œ", "ù", "ú", "û", "ñ", "º", "ª"],
    ),
    (0x2C, &["\\e", "&", "\\+"]),
    (0x34, &["\\Lv", "=", ";"]),
    (0x48, &["\\r"]),
    (
        0x51,
        &[
            "¿", "¡", "\\pk", "\\mn", "\\Po", "\\Ke", "\\Bl", "\\Lo", "\\Ck", "Í", "%", "(", ")",
        ],
    ),
    (0x68, &["â"]),
    (0x6F, &["í"]),
    (0x79, &["\\au", "\\ad", "\\al", "\\ar"]),
    (0x84, &["\\d", "\\<", "\\>"]),
    (0xA1, &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]),
    (
        0xAB,
        &[
            "!", "?", ".", "-", "‧", "\\.", "\\qo", "\\qc", "‘", "'", "\\sm", "\\sf", "$", ",", "*",
            "/",
        ],
    ),
    (
        0xBB,
        &[
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q",
            "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
        ],
    ),
    (
        0xD5,
        &[
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q",
            "r", "s", "t", "u", "v", "w", "x", "y", "z",
        ],
    ),
    (0xF0, &[":", "Ä", "Ö", "Ü", "ä", "ö", "ü"]),
    (
        0xF8,
        &["\\btn", "\\9", "\\l", "\\pn", "\\CC", "\\\\", "\\n", "\""],
    ),
];

/// Byte value to display token. `None` marks bytes that never appear in
/// valid text.
pub static SYMBOLS: LazyLock<[Option<&'static str>; 256]> = LazyLock::new(|| {
    let mut symbols = [None; 256];
    for (first, tokens) in ENTRIES {
        for (offset, token) in tokens.iter().enumerate() {
            symbols[*first as usize + offset] = Some(*token);
        }
    }
    symbols
});

/// Every token with its byte, longest token first so the first hit while
/// scanning is the longest match.
pub static TOKENS_BY_LENGTH: LazyLock<Vec<(&'static str, u8)>> = LazyLock::new(|| {
    let mut tokens: Vec<(&'static str, u8)> = SYMBOLS
        .iter()
        .enumerate()
        .filter_map(|(byte, token)| token.map(|token| (token, byte as u8)))
        .collect();
    tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.1.cmp(&b.1)));
    tokens
});

/// Escape bytes followed by exactly one raw argument byte.
#[must_use]
pub fn takes_one_argument(byte: u8) -> bool {
    matches!(byte, BUTTON_ESCAPE | SPECIAL_ESCAPE | RAW_ESCAPE)
}

/// Bytes following [`FUNCTION_ESCAPE`], counting the function code itself.
#[must_use]
pub fn control_code_length(code: u8) -> usize {
    match code {
        0x04 => 4,
        0x09 | 0x0A => 1,
        0x0B | 0x10 => 3,
        code if code > 0x14 => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, Some(" "))]
    #[case(0xBB, Some("A"))]
    #[case(0xEE, Some("z"))]
    #[case(0xA1, Some("0"))]
    #[case(0x53, Some("\\pk"))]
    #[case(0xFD, Some("\\\\"))]
    #[case(0xFF, Some("\""))]
    #[case(0xF7, None)]
    #[case(0x0A, None)]
    fn test_symbol_table(#[case] byte: u8, #[case] expected: Option<&str>) {
        assert_eq!(SYMBOLS[byte as usize], expected);
    }

    #[rstest]
    #[case(0x04, 4)]
    #[case(0x09, 1)]
    #[case(0x0B, 3)]
    #[case(0x01, 2)]
    #[case(0x15, 1)]
    fn test_control_code_length(#[case] code: u8, #[case] expected: usize) {
        assert_eq!(control_code_length(code), expected);
    }

    #[test]
    fn test_tokens_sorted_longest_first() {
        let lengths: Vec<usize> = TOKENS_BY_LENGTH.iter().map(|(t, _)| t.len()).collect();
        assert!(lengths.windows(2).all(|pair| pair[0] >= pair[1]));
    }
}
