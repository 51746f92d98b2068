use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use romweave_format::{RunFormat, TableFormat, TableLength};

use crate::editing::{ChangeToken, Model};
use crate::error::{ModelError, ModelResult};
use crate::models::{FREE_BYTE, Run, TableRun, pointer_value};
use crate::text::read_string;

/// Name rendered for a NULL pointer. Never a valid anchor name.
pub const NULL_NAME: &str = "null";

/// Check that `name` can be used as an anchor.
pub fn validate_anchor_name(name: &str) -> ModelResult<()> {
    static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("Invalid anchor name regex"));

    if name.is_empty() {
        return Err(ModelError::invalid_name(name, "name is empty"));
    }
    if name.eq_ignore_ascii_case(NULL_NAME) {
        return Err(ModelError::invalid_name(name, "`null` is reserved"));
    }
    if !pattern.is_match(name) {
        return Err(ModelError::invalid_name(
            name,
            "only letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    Ok(())
}

impl Model {
    /// Address bound to `name`, or `None`.
    ///
    /// `table/N` resolves to element N of the table anchored as `table`.
    /// When the name (or the table) is unknown and `requesting_source` is
    /// given, that cell is remembered as waiting for `name` and gets
    /// repointed as soon as the name is anchored.
    pub fn get_address_from_anchor(
        &mut self,
        token: &mut ChangeToken,
        name: &str,
        requesting_source: Option<usize>,
    ) -> Option<usize> {
        let (anchor, element) = match name.split_once('/') {
            Some((table, index)) => match index.parse::<usize>() {
                Ok(index) => (table, Some(index)),
                Err(_) => return None,
            },
            None => (name, None),
        };
        if let Some(address) = self.anchors.address_of(anchor) {
            return match element {
                Some(index) => self.runs.get(address)?.element_start(index),
                None => Some(address),
            };
        }
        if let Some(source) = requesting_source
            && validate_anchor_name(anchor).is_ok()
        {
            self.add_unmapped(token, source, name);
        }
        None
    }

    /// Display name for a pointer to `address` (`None` for NULL) found in
    /// the cell at `requesting_source`.
    pub fn get_anchor_from_address(
        &self,
        address: Option<usize>,
        requesting_source: Option<usize>,
    ) -> String {
        if let Some(name) = address.and_then(|address| self.anchors.name_at(address)) {
            return name.to_string();
        }
        if let Some(name) = requesting_source.and_then(|source| self.anchors.unmapped_name(source)) {
            return name.to_string();
        }
        let Some(address) = address else {
            return NULL_NAME.to_string();
        };

        let run = self.runs.get_next_run(address);
        if let (true, Some(table), Some(name)) = (
            run.contains(address),
            run.as_table(),
            self.anchors.name_at(run.start),
        ) {
            let element_length = table.element_length();
            let offset = address - run.start;
            if element_length > 0 && offset % element_length == 0 {
                return format!("{name}/{}", offset / element_length);
            }
        }
        String::new()
    }

    /// Name `run` and register it.
    ///
    /// Formats in the way are cleared. Any other name at this address is
    /// dropped, and if `name` was bound elsewhere it moves here, taking its
    /// pointers along. Pointers waiting for `name` are written now; if none
    /// were waiting and nothing pointed here before, the whole store is
    /// scanned for pointers to `run.start`. Pointers waiting for `name/N`
    /// are written once `run` is a table with an element N.
    ///
    /// If resizing the tables that follow this one fails, the whole edit is
    /// rolled back.
    pub fn observe_anchor_written(
        &mut self,
        token: &mut ChangeToken,
        name: &str,
        run: Run,
    ) -> ModelResult<()> {
        validate_anchor_name(name)?;
        self.check_length_dependency(name, &run)?;
        self.transaction(token, |model, token| model.write_anchor(token, name, run))
    }

    fn write_anchor(&mut self, token: &mut ChangeToken, name: &str, run: Run) -> ModelResult<()> {
        let location = run.start;
        let length = run.length();
        let existing = self.runs.get(location).cloned();
        match &existing {
            None => self.clear_format_internal(token, location, length, false, false),
            Some(existing) if !run.is_unformatted() && existing.length() < length => {
                self.clear_format_internal(
                    token,
                    existing.end(),
                    length - existing.length(),
                    false,
                    false,
                );
            }
            Some(_) => {}
        }

        if self.anchors.name_at(location) != Some(name) {
            self.unbind_name(token, location);
        }
        if let Some(previous) = self.anchors.address_of(name)
            && previous != location
        {
            self.remove_anchor_at(token, previous);
        }
        if self.anchors.name_at(location).is_none() {
            self.bind_name(token, location, name);
        }

        let seek = existing
            .as_ref()
            .is_none_or(|existing| existing.pointer_sources.is_empty())
            && run.pointer_sources.is_empty();
        let mut sources = self.resolve_pending_sources(token, name, location, length, seek);
        sources.extend(run.pointer_sources.iter().copied());
        let cells: BTreeSet<usize> = run.pointer_cells().into_iter().collect();
        sources.retain(|source| {
            !(location < *source && *source < location + length) || cells.contains(source)
        });

        let run = Run {
            pointer_sources: sources,
            ..run
        };
        self.write_run(token, run, &mut Vec::new())?;
        self.resolve_pending_elements(token, name, location);
        Ok(())
    }

    /// Parse `name` followed by an optional format string and anchor it at
    /// `address`, sizing the run from the data.
    ///
    /// Unless `allow_overwrite` is set, a name already bound to another
    /// address is refused rather than moved.
    pub fn apply_anchor(
        &mut self,
        token: &mut ChangeToken,
        address: usize,
        text: &str,
        allow_overwrite: bool,
    ) -> ModelResult<Run> {
        let text = text.trim();
        let text = text.strip_prefix('^').unwrap_or(text);
        let split = text
            .find(|c: char| matches!(c, '"' | '[' | '<'))
            .unwrap_or(text.len());
        let (name, format) = text.split_at(split);

        validate_anchor_name(name)?;
        if address >= self.data.len() {
            return Err(ModelError::invalid_name(name, "address is past the end of the data"));
        }
        if !allow_overwrite
            && let Some(existing) = self.anchors.address_of(name)
            && existing != address
        {
            return Err(ModelError::invalid_name(
                name,
                format!("already anchored at {existing:#08X}"),
            ));
        }

        let format = romweave_format::parse(format)?;
        let run = self.build_run(address, format)?;
        self.observe_anchor_written(token, name, run.clone())?;
        Ok(self.runs.get(address).cloned().unwrap_or(run))
    }

    fn build_run(&self, address: usize, format: RunFormat) -> ModelResult<Run> {
        Ok(match format {
            RunFormat::None => Run::unformatted(address, BTreeSet::new()),
            RunFormat::Pointer => Run::pointer(address),
            RunFormat::Text => {
                let length = read_string(self.data.as_slice(), address, true, self.data.len())
                    .ok_or(ModelError::DecodeFailure { address })?;
                Run::text(address, length)
            }
            RunFormat::Table(table) => {
                let count = match &table.length {
                    TableLength::Fixed(count) => *count,
                    TableLength::FromAnchor(parent) => self.table_count(parent).unwrap_or(0),
                    TableLength::Inferred => self.infer_element_count(address, &table),
                };
                Run::table(address, table, count)
            }
        })
    }

    /// Count whole elements from `address` until the data ends, another run
    /// starts, or an element is entirely `0xFF`.
    fn infer_element_count(&self, address: usize, table: &TableFormat) -> usize {
        let element_length = table.element_length();
        if element_length == 0 {
            return 0;
        }
        let limit = self
            .runs
            .iter_from(address + 1)
            .find(|run| run.start > address)
            .map_or(self.data.len(), |run| run.start.min(self.data.len()));

        let mut count = 0;
        let mut start = address;
        while start + element_length <= limit {
            let element = self.data.slice(start..start + element_length);
            if element.iter().all(|byte| *byte == FREE_BYTE) {
                break;
            }
            count += 1;
            start += element_length;
        }
        count
    }

    pub(crate) fn check_length_dependency(&self, name: &str, run: &Run) -> ModelResult<()> {
        let Some(mut parent) = run
            .as_table()
            .and_then(TableRun::length_from_anchor)
            .map(str::to_string)
        else {
            return Ok(());
        };

        let mut chain = vec![name.to_string()];
        loop {
            let revisits = chain.iter().any(|seen| seen.eq_ignore_ascii_case(&parent));
            chain.push(parent.clone());
            if revisits {
                return Err(ModelError::CircularLengthDependency { chain });
            }
            let next = self
                .anchors
                .address_of(&parent)
                .and_then(|address| self.runs.get(address))
                .and_then(Run::as_table)
                .and_then(TableRun::length_from_anchor)
                .map(str::to_string);
            match next {
                Some(next) => parent = next,
                None => return Ok(()),
            }
        }
    }

    /// Drop the anchor at `address`, turning its pointers into unmapped
    /// pointers that wait for its name.
    fn remove_anchor_at(&mut self, token: &mut ChangeToken, address: usize) {
        match self.runs.get(address).map(Run::length) {
            Some(length) => self.clear_format_internal(token, address, length.max(1), true, false),
            None => {
                self.unbind_name(token, address);
            }
        }
    }

    fn resolve_pending_sources(
        &mut self,
        token: &mut ChangeToken,
        name: &str,
        location: usize,
        length: usize,
        seek: bool,
    ) -> BTreeSet<usize> {
        let pending = self.anchors.unmapped_sources(name);
        if !pending.is_empty() {
            for &source in &pending {
                self.remove_unmapped(token, source);
                self.write_pointer_value(token, source, Some(location));
            }
            log::debug!(
                "`{name}` resolved {} waiting pointer(s) to {location:#08X}",
                pending.len()
            );
            return pending;
        }
        if seek {
            return self.search_for_pointers_to_anchor(token, location, length);
        }
        BTreeSet::new()
    }

    fn resolve_pending_elements(&mut self, token: &mut ChangeToken, name: &str, location: usize) {
        let Some(table) = self.runs.get(location).cloned() else {
            return;
        };
        let pending: Vec<(usize, usize)> = self
            .anchors
            .unmapped_pointers()
            .filter_map(|(source, waiting)| {
                let (anchor, index) = waiting.split_once('/')?;
                if !anchor.eq_ignore_ascii_case(name) {
                    return None;
                }
                let element = table.element_start(index.parse().ok()?)?;
                Some((source, element))
            })
            .collect();
        for (source, element) in pending {
            self.remove_unmapped(token, source);
            self.write_pointer_value(token, source, Some(element));
            self.add_pointer_to_anchor(token, source);
        }
    }

    /// Find every dword that points at `location` and can hold a pointer,
    /// registering pointer runs for the ones not yet formatted.
    pub fn search_for_pointers_to_anchor(
        &mut self,
        token: &mut ChangeToken,
        location: usize,
        length: usize,
    ) -> BTreeSet<usize> {
        let target = pointer_value(Some(location)).to_le_bytes();
        let candidates: Vec<usize> = self
            .data
            .as_slice()
            .windows(4)
            .enumerate()
            .filter(|(_, window)| *window == target.as_slice())
            .map(|(source, _)| source)
            .filter(|source| !(location <= *source && *source < location + length))
            .collect();

        let found: BTreeSet<usize> = candidates
            .into_iter()
            .filter(|source| self.try_make_pointer_at(token, *source))
            .collect();
        if !found.is_empty() {
            log::debug!("found {} pointer(s) to {location:#08X}", found.len());
        }
        found
    }

    fn try_make_pointer_at(&mut self, token: &mut ChangeToken, source: usize) -> bool {
        if self.is_pointer_cell(source) {
            return true;
        }
        if let Some(existing) = self.runs.get(source).filter(|run| run.is_unformatted()) {
            if !self.is_unclaimed(source, source + 4, Some(source)) {
                return false;
            }
            let pointer = Run::pointer(source).with_sources(existing.pointer_sources.clone());
            self.put_run(token, pointer);
            return true;
        }
        if self.is_unclaimed(source, source + 4, None) {
            self.put_run(token, Run::pointer(source));
            return true;
        }
        false
    }
}
