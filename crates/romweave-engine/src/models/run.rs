use std::collections::{BTreeMap, BTreeSet};

use romweave_format::{RunFormat, TableFormat, TableLength};

/// Returned by run queries past the last run.
pub(crate) static SENTINEL: Run = Run {
    start: usize::MAX,
    kind: RunKind::Unformatted,
    pointer_sources: BTreeSet::new(),
};

/// A contiguous byte range with a known meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub kind: RunKind,
    /// Addresses of pointer cells whose value refers to `start`.
    pub pointer_sources: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKind {
    /// Placeholder marking an address that something points at.
    Unformatted,
    Pointer,
    Text { length: usize },
    Table(TableRun),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRun {
    pub format: TableFormat,
    pub element_count: usize,
    /// Pointer cells aimed at the start of an element other than the first,
    /// keyed by element index. Pointers to element 0 are `pointer_sources`.
    pub element_sources: BTreeMap<usize, BTreeSet<usize>>,
}

impl TableRun {
    pub fn new(format: TableFormat, element_count: usize) -> Self {
        Self {
            format,
            element_count,
            element_sources: BTreeMap::new(),
        }
    }

    /// The same table with `element_count` elements. Element sources past
    /// the new end are dropped.
    #[must_use]
    pub fn with_count(&self, element_count: usize) -> Self {
        Self {
            format: self.format.clone(),
            element_count,
            element_sources: self
                .element_sources
                .range(..element_count)
                .map(|(index, sources)| (*index, sources.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn element_length(&self) -> usize {
        self.format.element_length()
    }

    pub fn length_from_anchor(&self) -> Option<&str> {
        match &self.format.length {
            TableLength::FromAnchor(name) => Some(name),
            _ => None,
        }
    }
}

impl Run {
    pub fn unformatted(start: usize, pointer_sources: BTreeSet<usize>) -> Self {
        Self {
            start,
            kind: RunKind::Unformatted,
            pointer_sources,
        }
    }

    pub fn pointer(start: usize) -> Self {
        Self {
            start,
            kind: RunKind::Pointer,
            pointer_sources: BTreeSet::new(),
        }
    }

    pub fn text(start: usize, length: usize) -> Self {
        Self {
            start,
            kind: RunKind::Text { length },
            pointer_sources: BTreeSet::new(),
        }
    }

    pub fn table(start: usize, format: TableFormat, element_count: usize) -> Self {
        Self {
            start,
            kind: RunKind::Table(TableRun::new(format, element_count)),
            pointer_sources: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = usize>) -> Self {
        self.pointer_sources.extend(sources);
        self
    }

    #[must_use]
    pub fn length(&self) -> usize {
        match &self.kind {
            RunKind::Unformatted => 1,
            RunKind::Pointer => 4,
            RunKind::Text { length } => *length,
            RunKind::Table(table) => table.element_length() * table.element_count,
        }
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length())
    }

    #[must_use]
    pub fn contains(&self, address: usize) -> bool {
        self.start <= address && address < self.end()
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.start == usize::MAX
    }

    #[must_use]
    pub fn is_unformatted(&self) -> bool {
        matches!(self.kind, RunKind::Unformatted)
    }

    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, RunKind::Pointer)
    }

    pub fn as_table(&self) -> Option<&TableRun> {
        match &self.kind {
            RunKind::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Addresses of every 4-byte pointer cell inside this run.
    pub fn pointer_cells(&self) -> Vec<usize> {
        match &self.kind {
            RunKind::Pointer => vec![self.start],
            RunKind::Table(table) => {
                let offsets: Vec<usize> = table.format.pointer_offsets().collect();
                let element_length = table.element_length();
                (0..table.element_count)
                    .flat_map(|element| {
                        let element_start = self.start + element * element_length;
                        offsets.iter().map(move |offset| element_start + offset)
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// The format string used for display and persistence.
    pub fn format_string(&self) -> String {
        match &self.kind {
            RunKind::Unformatted => RunFormat::None.to_string(),
            RunKind::Pointer => RunFormat::Pointer.to_string(),
            RunKind::Text { .. } => RunFormat::Text.to_string(),
            RunKind::Table(table) => match &table.format.length {
                TableLength::FromAnchor(_) => table.format.to_string(),
                _ => format!("{}{}", table.format.fields_text(), table.element_count),
            },
        }
    }

    /// The same run at another address, keeping its sources.
    #[must_use]
    pub fn moved_to(&self, start: usize) -> Self {
        Self {
            start,
            kind: self.kind.clone(),
            pointer_sources: self.pointer_sources.clone(),
        }
    }

    /// The same run stretched to cover at least `minimum_length` bytes, if
    /// its kind has a variable length.
    pub fn resized(&self, minimum_length: usize) -> Option<Self> {
        let kind = match &self.kind {
            RunKind::Text { .. } => RunKind::Text {
                length: minimum_length,
            },
            RunKind::Table(table) => {
                let element_length = table.element_length().max(1);
                RunKind::Table(table.with_count(minimum_length.div_ceil(element_length)))
            }
            RunKind::Unformatted | RunKind::Pointer => return None,
        };
        Some(Self {
            start: self.start,
            kind,
            pointer_sources: self.pointer_sources.clone(),
        })
    }

    /// Address of element `index` for tables.
    pub fn element_start(&self, index: usize) -> Option<usize> {
        let table = self.as_table()?;
        (index < table.element_count).then(|| self.start + index * table.element_length())
    }

    /// Index of the element starting at `address`, if that is an element of
    /// this table other than the first.
    pub fn element_index(&self, address: usize) -> Option<usize> {
        let table = self.as_table()?;
        let element_length = table.element_length();
        if element_length == 0 || address <= self.start || !self.contains(address) {
            return None;
        }
        let offset = address - self.start;
        (offset % element_length == 0).then_some(offset / element_length)
    }

    /// Element sources of a table, empty for any other kind.
    pub fn element_sources(&self) -> impl Iterator<Item = (usize, &BTreeSet<usize>)> {
        self.as_table().into_iter().flat_map(|table| {
            table
                .element_sources
                .iter()
                .map(|(index, sources)| (*index, sources))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use romweave_format::parse;

    fn table(start: usize, format: &str, count: usize) -> Run {
        let RunFormat::Table(format) = parse(format).unwrap() else {
            panic!("not a table format: {format}");
        };
        Run::table(start, format, count)
    }

    #[test]
    fn test_lengths_per_kind() {
        assert_eq!(Run::unformatted(0, BTreeSet::new()).length(), 1);
        assert_eq!(Run::pointer(0).length(), 4);
        assert_eq!(Run::text(0, 7).length(), 7);
        assert_eq!(table(0, "[a. b:]3", 3).length(), 9);
    }

    #[test]
    fn test_sentinel_end_does_not_overflow() {
        assert!(SENTINEL.is_sentinel());
        assert_eq!(SENTINEL.end(), usize::MAX);
    }

    #[test]
    fn test_pointer_cells_of_table() {
        // Given a table whose elements are [id. ptr<>] (5 bytes each)
        let run = table(0x100, "[id. ptr<>]3", 3);

        // Then each element contributes the pointer at offset 1
        assert_eq!(run.pointer_cells(), vec![0x101, 0x106, 0x10B]);
    }

    #[test]
    fn test_format_string_uses_actual_count() {
        assert_eq!(table(0, "[a.]", 6).format_string(), "[a.]6");
        assert_eq!(table(0, "[a.]names", 6).format_string(), "[a.]names");
        assert_eq!(Run::text(0, 3).format_string(), "\"\"");
        assert_eq!(Run::pointer(0).format_string(), "<>");
    }

    #[test]
    fn test_resized_rounds_tables_up() {
        let run = table(0, "[a: b:]2", 2);
        let resized = run.resized(9).unwrap();
        assert_eq!(resized.as_table().unwrap().element_count, 3);
        assert_eq!(resized.length(), 12);
        assert!(Run::pointer(0).resized(8).is_none());
    }

    #[test]
    fn test_element_start() {
        let run = table(0x40, "[a: b:]2", 2);
        assert_eq!(run.element_start(1), Some(0x44));
        assert_eq!(run.element_start(2), None);
        assert_eq!(Run::text(0, 4).element_start(0), None);
    }

    #[test]
    fn test_element_index_only_for_later_element_starts() {
        let run = table(0x40, "[a: b:]3", 3);
        assert_eq!(run.element_index(0x44), Some(1));
        assert_eq!(run.element_index(0x48), Some(2));
        assert_eq!(run.element_index(0x40), None);
        assert_eq!(run.element_index(0x46), None);
        assert_eq!(run.element_index(0x4C), None);
        assert_eq!(Run::text(0x40, 8).element_index(0x44), None);
    }

    #[test]
    fn test_shrinking_drops_element_sources_past_the_end() {
        let RunKind::Table(mut inner) = table(0x40, "[a:]4", 4).kind else {
            panic!("expected a table");
        };
        inner.element_sources.insert(1, BTreeSet::from([0x10]));
        inner.element_sources.insert(3, BTreeSet::from([0x14]));

        let shrunk = inner.with_count(2);

        assert_eq!(
            shrunk.element_sources,
            BTreeMap::from([(1, BTreeSet::from([0x10]))])
        );
    }
}
