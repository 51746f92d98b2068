//! # romweave-format
//!
//! Parses and renders the format strings attached to runs and anchors.
//!
//! ```text
//! ""                              text string, length read from the data
//! <>                              pointer
//! [hp. atk: id:: name""10 ptr<>]8 table of 8 elements
//! [hp. atk:]pokemon               table sized by the element count of `pokemon`
//! [hp. atk:]                      table sized from the data
//! ```
//!
//! Field widths: `.` 1 byte, `:` 2 bytes, `::` 4 bytes, `<>` 4-byte pointer,
//! `""N` N bytes of text.
//!
//! Parsing and [`std::fmt::Display`] are inverse: rendering a parsed format
//! gives back the canonical spelling, with fields separated by one space.

pub mod lexer;

use std::fmt;

use lexer::{Token, TokenKind, lex};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unrecognized format `{0}`")]
    Unknown(String),
    #[error("table format `{0}` has no closing `]`")]
    Unclosed(String),
    #[error("table format has no fields")]
    EmptyTable,
    #[error("unexpected `{found}` at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("field `{field}` has no width")]
    MissingWidth { field: String },
    #[error("invalid table length `{0}`")]
    InvalidLength(String),
}

/// The data layout of a single table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    Half,
    Word,
    Pointer,
    Text { width: usize },
}

impl FieldKind {
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Byte => 1,
            FieldKind::Half => 2,
            FieldKind::Word | FieldKind::Pointer => 4,
            FieldKind::Text { width } => *width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FieldKind::Byte => write!(f, "{}.", self.name),
            FieldKind::Half => write!(f, "{}:", self.name),
            FieldKind::Word => write!(f, "{}::", self.name),
            FieldKind::Pointer => write!(f, "{}<>", self.name),
            FieldKind::Text { width } => write!(f, "{}\"\"{width}", self.name),
        }
    }
}

/// Where a table's element count comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLength {
    Fixed(usize),
    /// Same element count as the table anchored under this name.
    FromAnchor(String),
    /// Count elements from the data until something else starts.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFormat {
    pub fields: Vec<Field>,
    pub length: TableLength,
}

impl TableFormat {
    #[must_use]
    pub fn element_length(&self) -> usize {
        self.fields.iter().map(|field| field.kind.width()).sum()
    }

    /// Offsets of pointer fields within one element.
    pub fn pointer_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields.iter().scan(0, |offset, field| {
            let here = *offset;
            *offset += field.kind.width();
            Some((here, field.kind))
        })
        .filter(|(_, kind)| *kind == FieldKind::Pointer)
        .map(|(offset, _)| offset)
    }

    /// Render the bracketed field list without the length suffix.
    pub fn fields_text(&self) -> String {
        let fields: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        format!("[{}]", fields.join(" "))
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields_text())?;
        match &self.length {
            TableLength::Fixed(count) => write!(f, "{count}"),
            TableLength::FromAnchor(name) => f.write_str(name),
            TableLength::Inferred => Ok(()),
        }
    }
}

/// A parsed run format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFormat {
    /// No format: the anchor marks a location only.
    None,
    Pointer,
    Text,
    Table(TableFormat),
}

impl fmt::Display for RunFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFormat::None => Ok(()),
            RunFormat::Pointer => f.write_str("<>"),
            RunFormat::Text => f.write_str("\"\""),
            RunFormat::Table(table) => table.fmt(f),
        }
    }
}

/// Parse a run format string.
pub fn parse(input: &str) -> Result<RunFormat, FormatError> {
    let trimmed = input.trim();
    match trimmed {
        "" => Ok(RunFormat::None),
        "<>" => Ok(RunFormat::Pointer),
        "\"\"" => Ok(RunFormat::Text),
        table if table.starts_with('[') => parse_table(table).map(RunFormat::Table),
        other => Err(FormatError::Unknown(other.to_string())),
    }
}

fn parse_table(input: &str) -> Result<TableFormat, FormatError> {
    let close = input
        .rfind(']')
        .ok_or_else(|| FormatError::Unclosed(input.to_string()))?;
    let body = &input[1..close];
    let fields = parse_fields(body, 1)?;
    if fields.is_empty() {
        return Err(FormatError::EmptyTable);
    }
    let length = parse_length(input[close + 1..].trim())?;
    Ok(TableFormat { fields, length })
}

fn parse_fields(body: &str, base_offset: usize) -> Result<Vec<Field>, FormatError> {
    let tokens: Vec<Token<'_>> = lex(body)
        .into_iter()
        .filter(|token| token.kind != TokenKind::Whitespace)
        .collect();
    let unexpected = |token: &Token<'_>| FormatError::UnexpectedToken {
        found: token.text.to_string(),
        offset: base_offset + token.offset,
    };

    let mut fields = Vec::new();
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        if token.kind != TokenKind::Name {
            return Err(unexpected(token));
        }
        let name = token.text.to_string();
        let Some(width) = iter.next() else {
            return Err(FormatError::MissingWidth { field: name });
        };
        let kind = match width.kind {
            TokenKind::Byte => FieldKind::Byte,
            TokenKind::Half => FieldKind::Half,
            TokenKind::Word => FieldKind::Word,
            TokenKind::Pointer => FieldKind::Pointer,
            TokenKind::Text => {
                let width = iter
                    .next_if(|t| t.kind == TokenKind::Number)
                    .and_then(|t| t.text.parse::<usize>().ok())
                    .ok_or_else(|| FormatError::MissingWidth { field: name.clone() })?;
                FieldKind::Text { width }
            }
            _ => return Err(unexpected(width)),
        };
        fields.push(Field { name, kind });
    }
    Ok(fields)
}

fn parse_length(tail: &str) -> Result<TableLength, FormatError> {
    if tail.is_empty() {
        return Ok(TableLength::Inferred);
    }
    if tail.bytes().all(|b| b.is_ascii_digit()) {
        return tail
            .parse()
            .map(TableLength::Fixed)
            .map_err(|_| FormatError::InvalidLength(tail.to_string()));
    }
    if tail
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Ok(TableLength::FromAnchor(tail.to_string()));
    }
    Err(FormatError::InvalidLength(tail.to_string()))
}
