//! # Editing
//!
//! [`Model`] owns the byte store, the run index, the anchor table and the
//! named lists. Every mutation takes a [`ChangeToken`] and records what it
//! changed there, so one logical edit can be reverted as a unit.
//!
//! The model is single-writer: nothing here locks. Read queries take `&self`
//! and can run side by side; anything that mutates takes `&mut self`.
//!
//! ## Submodules
//!
//! - [`run_index`] / [`anchor_table`]: the two registries
//! - `format`: writing and clearing runs while keeping pointers consistent
//! - `anchors`: naming runs and resolving names
//! - `allocator`: free-space search and relocation
//! - [`delta`]: the change recorder
//! - `consistency`: invariant checks

pub mod anchor_table;
mod allocator;
mod anchors;
mod consistency;
pub mod delta;
mod format;
pub mod run_index;

use std::collections::BTreeMap;

pub use anchor_table::AnchorTable;
pub use anchors::validate_anchor_name;
pub use delta::ChangeToken;
pub use run_index::RunIndex;

use crate::error::ModelResult;
use crate::models::run::SENTINEL;
use crate::models::{ByteStore, FREE_BYTE, Run, pointer_value};

/// Tuning knobs for discovery and allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    /// Nothing below this address is treated as a pointer target.
    pub earliest_allowed_anchor: usize,
    /// Where free-space searches begin.
    pub free_space_search_start: usize,
    /// Gap kept after any run or used byte when searching.
    pub free_space_buffer: usize,
    /// Extra free bytes a search window must have beyond the requested length.
    pub expansion_slack: usize,
    /// Treat `0x00` as free space alongside `0xFF`.
    pub zero_is_free: bool,
    /// Byte written into newly grown storage.
    pub grow_fill: u8,
    /// Relocation refuses to grow the store past this length.
    pub max_store_length: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            earliest_allowed_anchor: 0,
            free_space_search_start: 0x100,
            free_space_buffer: 0x40,
            expansion_slack: 0x100,
            zero_is_free: true,
            grow_fill: 0x00,
            max_store_length: 0x0200_0000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub(crate) data: ByteStore,
    pub(crate) runs: RunIndex,
    pub(crate) anchors: AnchorTable,
    pub(crate) lists: BTreeMap<String, Vec<String>>,
    pub(crate) settings: ModelSettings,
}

impl Model {
    /// A model with no runs or anchors.
    pub fn new(data: Vec<u8>, settings: ModelSettings) -> Self {
        Self {
            data: ByteStore::new(data),
            runs: RunIndex::default(),
            anchors: AnchorTable::default(),
            lists: BTreeMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn runs(&self) -> &RunIndex {
        &self.runs
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    pub fn lists(&self) -> &BTreeMap<String, Vec<String>> {
        &self.lists
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    pub fn read_value(&self, index: usize) -> Option<u32> {
        self.data.read_value(index)
    }

    pub fn read_pointer(&self, index: usize) -> Option<usize> {
        self.data.read_pointer(index)
    }

    /// Whether `byte` counts as unused space.
    #[must_use]
    pub fn is_free(&self, byte: u8) -> bool {
        byte == FREE_BYTE || (self.settings.zero_is_free && byte == 0x00)
    }

    pub fn get_next_run(&self, address: usize) -> &Run {
        self.runs.get_next_run(address)
    }

    /// Like [`Model::get_next_run`], skipping runs that have neither a name
    /// nor any pointer sources.
    pub fn get_next_anchor(&self, address: usize) -> &Run {
        self.runs
            .iter_from(address)
            .find(|run| {
                !run.pointer_sources.is_empty() || self.anchors.name_at(run.start).is_some()
            })
            .unwrap_or(&SENTINEL)
    }

    pub fn run_at(&self, start: usize) -> Option<&Run> {
        self.runs.get(start)
    }

    /// Write one byte, growing the store if `index` is past the end.
    pub fn write_byte(&mut self, token: &mut ChangeToken, index: usize, value: u8) {
        if index >= self.data.len() {
            token.set_data_length(&mut self.data, index + 1, self.settings.grow_fill);
        }
        token.change_data(&mut self.data, index, value);
    }

    pub fn write_bytes(&mut self, token: &mut ChangeToken, start: usize, bytes: &[u8]) {
        for (offset, value) in bytes.iter().enumerate() {
            self.write_byte(token, start + offset, *value);
        }
    }

    pub fn write_value(&mut self, token: &mut ChangeToken, index: usize, value: u32) {
        self.write_bytes(token, index, &value.to_le_bytes());
    }

    /// Grow the store to at least `length` bytes using the configured fill.
    pub fn expand_data(&mut self, token: &mut ChangeToken, length: usize) {
        if length > self.data.len() {
            token.set_data_length(&mut self.data, length, self.settings.grow_fill);
        }
    }

    pub(crate) fn write_pointer_value(
        &mut self,
        token: &mut ChangeToken,
        source: usize,
        destination: Option<usize>,
    ) {
        self.write_value(token, source, pointer_value(destination));
    }

    /// Point the cell at `source` somewhere else (`None` for NULL).
    ///
    /// If the cell is a registered pointer it is detached from its old
    /// destination first and attached to the new one after.
    pub fn write_pointer(
        &mut self,
        token: &mut ChangeToken,
        source: usize,
        destination: Option<usize>,
    ) {
        let registered = self.is_pointer_cell(source);
        if registered {
            self.clear_pointer_format(token, source);
        }
        self.write_pointer_value(token, source, destination);
        if registered {
            self.add_pointer_to_anchor(token, source);
        }
    }

    /// Whether `address` is the start of a pointer run or of a pointer field
    /// inside a table.
    pub fn is_pointer_cell(&self, address: usize) -> bool {
        let run = self.runs.get_next_run(address);
        if !run.contains(address) {
            return false;
        }
        if run.is_pointer() {
            return run.start == address;
        }
        let Some(table) = run.as_table() else {
            return false;
        };
        let element_length = table.element_length();
        if element_length == 0 {
            return false;
        }
        let offset = (address - run.start) % element_length;
        table.format.pointer_offsets().any(|pointer| pointer == offset)
    }

    pub fn set_list(&mut self, token: &mut ChangeToken, name: &str, contents: Vec<String>) {
        let old = self.lists.insert(name.to_string(), contents.clone());
        token.change_list(name, old, Some(contents));
    }

    pub fn remove_list(&mut self, token: &mut ChangeToken, name: &str) {
        if let Some(old) = self.lists.remove(name) {
            token.change_list(name, Some(old), None);
        }
    }

    /// Run `edit` against a scratch token. On success its changes are folded
    /// into `token`; on error they are reverted and `token` is untouched.
    pub(crate) fn transaction<T>(
        &mut self,
        token: &mut ChangeToken,
        edit: impl FnOnce(&mut Model, &mut ChangeToken) -> ModelResult<T>,
    ) -> ModelResult<T> {
        let mut scratch = token.scratch();
        match edit(self, &mut scratch) {
            Ok(value) => {
                token.absorb(scratch);
                Ok(value)
            }
            Err(e) => {
                log::debug!("rolling back failed edit: {e}");
                scratch.revert(self);
                Err(e)
            }
        }
    }

    /// Insert or replace the run at `run.start`, recording both halves.
    pub(crate) fn put_run(&mut self, token: &mut ChangeToken, run: Run) {
        if let Some(previous) = self.runs.put(run.clone()) {
            token.remove_run(previous);
        }
        token.add_run(run);
    }

    pub(crate) fn take_run(&mut self, token: &mut ChangeToken, start: usize) -> Option<Run> {
        let run = self.runs.remove(start)?;
        token.remove_run(run.clone());
        Some(run)
    }

    pub(crate) fn bind_name(&mut self, token: &mut ChangeToken, address: usize, name: &str) {
        self.anchors.bind(address, name);
        token.add_name(address, name);
    }

    pub(crate) fn unbind_name(&mut self, token: &mut ChangeToken, address: usize) -> Option<String> {
        let name = self.anchors.unbind_address(address)?;
        token.remove_name(address, name.clone());
        Some(name)
    }

    pub(crate) fn add_unmapped(&mut self, token: &mut ChangeToken, source: usize, name: &str) {
        if let Some(previous) = self.anchors.unmapped_name(source).map(str::to_string) {
            self.remove_unmapped(token, source);
            log::debug!("pointer at {source:#08X} no longer waits for `{previous}`");
        }
        self.anchors.add_unmapped(source, name);
        token.add_unmapped_pointer(source, name);
    }

    pub(crate) fn remove_unmapped(&mut self, token: &mut ChangeToken, source: usize) {
        if let Some(name) = self.anchors.remove_unmapped(source) {
            token.remove_unmapped_pointer(source, name);
        }
    }

    /// Whether `[start, end)` is inside the store and touches no run other
    /// than the one starting at `ignore`.
    pub(crate) fn is_unclaimed(&self, start: usize, end: usize, ignore: Option<usize>) -> bool {
        end <= self.data.len()
            && self
                .runs
                .iter_from(start)
                .take_while(|run| run.start < end)
                .all(|run| Some(run.start) == ignore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_byte_past_end_grows_with_fill() {
        let mut model = Model::new(vec![1, 2], ModelSettings::default());
        let mut token = ChangeToken::new();

        model.write_byte(&mut token, 4, 9);

        assert_eq!(model.data(), &[1, 2, 0, 0, 9]);
        assert!(token.has_data_change());
    }

    #[test]
    fn test_expand_data_never_shrinks() {
        let mut model = Model::new(vec![1; 8], ModelSettings::default());
        let mut token = ChangeToken::new();

        model.expand_data(&mut token, 4);

        assert_eq!(model.len(), 8);
        assert!(!token.has_any_change());
    }

    #[test]
    fn test_write_value_is_little_endian() {
        let mut model = Model::new(vec![0; 8], ModelSettings::default());
        let mut token = ChangeToken::new();

        model.write_value(&mut token, 2, 0x0800_0310);

        assert_eq!(model.data(), &[0, 0, 0x10, 0x03, 0x00, 0x08, 0, 0]);
        assert_eq!(model.read_pointer(2), Some(0x310));
    }

    #[test]
    fn test_is_free_respects_zero_setting() {
        let strict = ModelSettings {
            zero_is_free: false,
            ..ModelSettings::default()
        };
        let model = Model::new(vec![], strict);
        assert!(model.is_free(0xFF));
        assert!(!model.is_free(0x00));
    }

    #[test]
    fn test_get_next_anchor_skips_runs_nothing_refers_to() {
        // Given an unnamed text run, a pointer run to 0x80, the placeholder
        // at 0x80 and a named text run at 0xC0
        let mut model = Model::new(vec![0; 0x100], ModelSettings::default());
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::text(0x10, 4))
            .unwrap();
        model.write_pointer_value(&mut token, 0x20, Some(0x80));
        model
            .observe_run_written(&mut token, Run::pointer(0x20))
            .unwrap();
        model
            .observe_anchor_written(&mut token, "msg", Run::text(0xC0, 4))
            .unwrap();

        // When searching from the start, past the placeholder and past the
        // named run
        let first = model.get_next_anchor(0x00).start;
        let second = model.get_next_anchor(0x81).start;
        let last = model.get_next_anchor(0xC4);

        // Then only runs with sources or a name are returned
        assert_eq!(first, 0x80);
        assert_eq!(second, 0xC0);
        assert!(last.is_sentinel());
        assert_eq!(model.get_next_run(0x00).start, 0x10);
    }

    #[test]
    fn test_set_list_reverts() {
        let mut model = Model::new(vec![], ModelSettings::default());
        let mut token = ChangeToken::new();
        model.set_list(&mut token, "types", vec!["fire".to_string()]);

        token.revert(&mut model);

        assert_eq!(model.list("types"), None);
    }
}
