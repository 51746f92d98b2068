//! # Text codec
//!
//! Converts between the game's single-byte string encoding and editable
//! text. Decoded strings open with `"` and the terminator byte renders as
//! the closing `"`, so `Encode(Decode(bytes)) == bytes` for any well-formed
//! terminated region.
//!
//! Escapes render their argument bytes as two hex digits (`\\41`, `\CC0401`).
//! A byte with no symbol inside a string renders as `\!XX`. Line-break bytes
//! are followed by a literal newline in the decoded text; encoding ignores
//! literal newlines.

pub mod table;

use table::{
    FUNCTION_ESCAPE, LINE_BREAKS, SYMBOLS, TERMINATOR, TOKENS_BY_LENGTH, control_code_length,
    takes_one_argument,
};

/// Result of encoding text that may contain characters with no byte value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    /// Characters that had no mapping and were skipped.
    pub unmatched: Vec<char>,
}

impl EncodedText {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Decode up to `length` bytes starting at `start`.
///
/// Returns `None` if the first byte has no symbol. Stops after the
/// terminator.
pub fn decode(data: &[u8], start: usize, length: usize) -> Option<String> {
    let end = start.saturating_add(length).min(data.len());
    let first = *data.get(start)?;
    SYMBOLS[first as usize]?;

    let mut text = String::from("\"");
    let mut index = start;
    while index < end {
        let byte = data[index];
        if byte == TERMINATOR {
            text.push('"');
            break;
        }
        match SYMBOLS[byte as usize] {
            Some(token) => text.push_str(token),
            None => text.push_str(&format!("\\!{byte:02X}")),
        }

        let arguments = if takes_one_argument(byte) {
            1
        } else if byte == FUNCTION_ESCAPE {
            data.get(index + 1).map_or(0, |code| control_code_length(*code))
        } else {
            0
        };
        for argument in data.iter().take(end).skip(index + 1).take(arguments) {
            text.push_str(&format!("{argument:02X}"));
        }
        index += 1 + arguments;

        if LINE_BREAKS.contains(&byte) {
            text.push('\n');
        }
    }
    Some(text)
}

/// Encode text, appending the terminator if it is missing.
pub fn encode(text: &str) -> EncodedText {
    let mut encoded = EncodedText::default();
    let mut rest = text.strip_prefix('"').unwrap_or(text);

    while let Some(c) = rest.chars().next() {
        if c == '\n' || c == '\r' {
            rest = &rest[1..];
            continue;
        }
        if let Some(byte) = rest.strip_prefix("\\!").and_then(parse_hex_pair) {
            encoded.bytes.push(byte);
            rest = &rest[4..];
            continue;
        }

        let Some((token, byte)) = longest_match(rest) else {
            encoded.unmatched.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        };
        rest = &rest[token.len()..];

        if byte == TERMINATOR {
            if rest.trim_end().is_empty() {
                encoded.bytes.push(TERMINATOR);
                return encoded;
            }
            encoded.unmatched.push(c);
            continue;
        }
        encoded.bytes.push(byte);

        let arguments = if takes_one_argument(byte) {
            1
        } else if byte == FUNCTION_ESCAPE {
            parse_hex_pair(rest).map_or(0, control_code_length)
        } else {
            0
        };
        for _ in 0..arguments {
            match parse_hex_pair(rest) {
                Some(argument) => {
                    encoded.bytes.push(argument);
                    rest = &rest[2..];
                }
                None => {
                    encoded.unmatched.extend(rest.chars().next());
                    break;
                }
            }
        }
    }

    encoded.bytes.push(TERMINATOR);
    encoded
}

fn longest_match(rest: &str) -> Option<(&'static str, u8)> {
    let bytes = rest.as_bytes();
    TOKENS_BY_LENGTH.iter().copied().find(|(token, _)| {
        let Some(candidate) = bytes.get(..token.len()) else {
            return false;
        };
        if token.starts_with('\\') {
            candidate.eq_ignore_ascii_case(token.as_bytes())
        } else {
            candidate == token.as_bytes()
        }
    })
}

fn parse_hex_pair(text: &str) -> Option<u8> {
    let pair = text.get(..2)?;
    if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(pair, 16).ok()
}

/// Length of the string starting at `start`, terminator included.
///
/// Used to decide whether bytes look like text at all: rejects runs of more
/// than three identical bytes (unless `allow_repeats`), bytes with no symbol,
/// and candidates that are mostly spaces. Gives up after `max_length` bytes.
pub fn read_string(
    data: &[u8],
    start: usize,
    allow_repeats: bool,
    max_length: usize,
) -> Option<usize> {
    let mut length = 0;
    let mut recent = *data.get(start)?;
    let mut repeats = 0;
    let mut spaces = 0;

    while start + length < data.len() && length <= max_length {
        let byte = data[start + length];
        if byte == recent {
            repeats += 1;
        } else {
            repeats = 1;
            recent = byte;
        }
        if byte == 0x00 {
            spaces += 1;
        }
        if repeats > 3 && !allow_repeats {
            return None;
        }
        SYMBOLS[byte as usize]?;

        if byte == TERMINATOR {
            if spaces * 2 > length + 1 && spaces != length {
                return None;
            }
            return Some(length + 1);
        }

        if takes_one_argument(byte) {
            length += 1;
        } else if byte == FUNCTION_ESCAPE {
            let code = *data.get(start + length + 1)?;
            length += control_code_length(code);
        }
        length += 1;
    }
    None
}
