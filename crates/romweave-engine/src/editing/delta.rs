//! # Change tokens
//!
//! A [`ChangeToken`] records one logical edit: the first old value of every
//! byte touched, runs added and removed (keyed by start), anchor names and
//! unmapped pointers added and removed, list contents, and the old and new
//! store length.
//!
//! Recording is cancelling: removing something that was added earlier in
//! the same token drops the addition instead of logging a removal, so the
//! token always describes the net difference between "before" and "after".
//! That is what makes [`ChangeToken::revert`] exact, and why reverting the
//! reverse token replays the original edit.

use std::collections::BTreeMap;

use crate::editing::Model;
use crate::models::{ByteStore, Run};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeToken {
    loading: bool,
    silent: bool,
    old_data: BTreeMap<usize, u8>,
    added_runs: BTreeMap<usize, Run>,
    removed_runs: BTreeMap<usize, Run>,
    added_names: BTreeMap<usize, String>,
    removed_names: BTreeMap<usize, String>,
    added_unmapped: BTreeMap<usize, String>,
    removed_unmapped: BTreeMap<usize, String>,
    added_lists: BTreeMap<String, Vec<String>>,
    removed_lists: BTreeMap<String, Vec<String>>,
    old_length: Option<usize>,
    new_length: Option<usize>,
}

impl ChangeToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that applies changes without recording them. Used while a
    /// model is being built from metadata or discovery.
    pub fn loading() -> Self {
        Self {
            loading: true,
            silent: true,
            ..Self::default()
        }
    }

    /// An empty token that records even under a loading token, so a nested
    /// edit can be rolled back on its own.
    pub(crate) fn scratch(&self) -> Self {
        Self {
            loading: self.loading,
            ..Self::default()
        }
    }

    /// Fold the net changes of `later`, recorded after this token's, into
    /// this token.
    pub(crate) fn absorb(&mut self, later: ChangeToken) {
        if self.silent {
            return;
        }
        for (index, old) in later.old_data {
            self.old_data.entry(index).or_insert(old);
        }
        if let Some(old_length) = later.old_length {
            self.old_length.get_or_insert(old_length);
            self.new_length = later.new_length;
        }
        for run in later.removed_runs.into_values() {
            self.remove_run(run);
        }
        for run in later.added_runs.into_values() {
            self.add_run(run);
        }
        for (address, name) in later.removed_names {
            self.remove_name(address, name);
        }
        for (address, name) in later.added_names {
            self.add_name(address, &name);
        }
        for (source, name) in later.removed_unmapped {
            self.remove_unmapped_pointer(source, name);
        }
        for (source, name) in later.added_unmapped {
            self.add_unmapped_pointer(source, &name);
        }
        let mut removed_lists = later.removed_lists;
        let mut added_lists = later.added_lists;
        let names: Vec<String> = removed_lists
            .keys()
            .chain(added_lists.keys())
            .cloned()
            .collect();
        for name in names {
            let old = removed_lists.remove(&name);
            let new = added_lists.remove(&name);
            if old.is_some() || new.is_some() {
                self.change_list(&name, old, new);
            }
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn has_data_change(&self) -> bool {
        !self.old_data.is_empty() || self.old_length.is_some()
    }

    #[must_use]
    pub fn has_any_change(&self) -> bool {
        self.has_data_change()
            || !self.added_runs.is_empty()
            || !self.removed_runs.is_empty()
            || !self.added_names.is_empty()
            || !self.removed_names.is_empty()
            || !self.added_unmapped.is_empty()
            || !self.removed_unmapped.is_empty()
            || !self.added_lists.is_empty()
            || !self.removed_lists.is_empty()
    }

    /// Lowest byte address this token touched.
    pub fn earliest_change(&self) -> Option<usize> {
        self.old_data.keys().next().copied()
    }

    pub fn added_runs(&self) -> impl Iterator<Item = &Run> {
        self.added_runs.values()
    }

    pub fn removed_runs(&self) -> impl Iterator<Item = &Run> {
        self.removed_runs.values()
    }

    pub(crate) fn change_data(&mut self, store: &mut ByteStore, index: usize, value: u8) {
        if !self.silent {
            self.old_data.entry(index).or_insert(store[index]);
        }
        store.set(index, value);
    }

    pub(crate) fn set_data_length(&mut self, store: &mut ByteStore, length: usize, fill: u8) {
        if !self.silent {
            self.old_length.get_or_insert(store.len());
            self.new_length = Some(length);
        }
        store.resize(length, fill);
    }

    pub(crate) fn add_run(&mut self, run: Run) {
        if !self.silent {
            self.added_runs.insert(run.start, run);
        }
    }

    pub(crate) fn remove_run(&mut self, run: Run) {
        if self.silent || self.added_runs.remove(&run.start).is_some() {
            return;
        }
        self.removed_runs.entry(run.start).or_insert(run);
    }

    pub(crate) fn add_name(&mut self, address: usize, name: &str) {
        if !self.silent {
            self.added_names.insert(address, name.to_string());
        }
    }

    pub(crate) fn remove_name(&mut self, address: usize, name: String) {
        if self.silent || self.added_names.remove(&address).is_some() {
            return;
        }
        self.removed_names.entry(address).or_insert(name);
    }

    pub(crate) fn add_unmapped_pointer(&mut self, source: usize, name: &str) {
        if !self.silent {
            self.added_unmapped.insert(source, name.to_string());
        }
    }

    pub(crate) fn remove_unmapped_pointer(&mut self, source: usize, name: String) {
        if self.silent || self.added_unmapped.remove(&source).is_some() {
            return;
        }
        self.removed_unmapped.entry(source).or_insert(name);
    }

    pub(crate) fn change_list(
        &mut self,
        name: &str,
        old: Option<Vec<String>>,
        new: Option<Vec<String>>,
    ) {
        if self.silent {
            return;
        }
        if !self.added_lists.contains_key(name)
            && !self.removed_lists.contains_key(name)
            && let Some(old) = old
        {
            self.removed_lists.insert(name.to_string(), old);
        }
        match new {
            Some(contents) => {
                self.added_lists.insert(name.to_string(), contents);
            }
            None => {
                self.added_lists.remove(name);
            }
        }
    }

    /// Undo this edit on `model`, returning the token that redoes it.
    pub fn revert(&self, model: &mut Model) -> ChangeToken {
        let fill = model.settings.grow_fill;
        let mut reverse = ChangeToken {
            added_runs: self.removed_runs.clone(),
            removed_runs: self.added_runs.clone(),
            added_names: self.removed_names.clone(),
            removed_names: self.added_names.clone(),
            added_unmapped: self.removed_unmapped.clone(),
            removed_unmapped: self.added_unmapped.clone(),
            added_lists: self.removed_lists.clone(),
            removed_lists: self.added_lists.clone(),
            ..ChangeToken::default()
        };

        for &index in self.old_data.keys() {
            let current = model.data.get(index).unwrap_or(fill);
            reverse.old_data.insert(index, current);
        }
        if let Some(old_length) = self.old_length {
            reverse.old_length = Some(model.data.len());
            reverse.new_length = Some(old_length);
            model.data.resize(old_length, fill);
        }
        for (&index, &old) in &self.old_data {
            if index < model.data.len() {
                model.data.set(index, old);
            }
        }

        self.undo_tables(model);
        reverse
    }

    /// Remove what this token added and restore what it removed, names and
    /// unmapped pointers before runs.
    fn undo_tables(&self, model: &mut Model) {
        for &address in self.added_names.keys() {
            model.anchors.unbind_address(address);
        }
        for (&address, name) in &self.removed_names {
            model.anchors.bind(address, name);
        }
        for &source in self.added_unmapped.keys() {
            model.anchors.remove_unmapped(source);
        }
        for (&source, name) in &self.removed_unmapped {
            model.anchors.add_unmapped(source, name);
        }
        for &start in self.added_runs.keys() {
            model.runs.remove(start);
        }
        for run in self.removed_runs.values() {
            model.runs.put(run.clone());
        }
        for name in self.added_lists.keys() {
            model.lists.remove(name);
        }
        for (name, contents) in &self.removed_lists {
            model.lists.insert(name.clone(), contents.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn test_first_old_value_wins() {
        let mut store = ByteStore::new(vec![1, 2, 3]);
        let mut token = ChangeToken::new();

        token.change_data(&mut store, 1, 9);
        token.change_data(&mut store, 1, 8);

        assert_eq!(token.old_data.get(&1), Some(&2));
        assert_eq!(store.as_slice(), &[1, 8, 3]);
        assert_eq!(token.earliest_change(), Some(1));
    }

    #[test]
    fn test_removing_an_added_run_cancels_it() {
        let mut token = ChangeToken::new();
        token.add_run(Run::pointer(0x10));
        token.remove_run(Run::pointer(0x10));

        assert!(!token.has_any_change());
    }

    #[test]
    fn test_replacement_keeps_original_removal() {
        // Given an original run replaced twice within one token
        let original = Run::text(0x20, 4);
        let mut token = ChangeToken::new();
        token.remove_run(original.clone());
        token.add_run(Run::text(0x20, 6));
        token.remove_run(Run::text(0x20, 6));
        token.add_run(Run::text(0x20, 8));

        // Then the token still remembers the first run
        assert_eq!(token.removed_runs().collect::<Vec<_>>(), vec![&original]);
        assert_eq!(
            token.added_runs().map(Run::length).collect::<Vec<_>>(),
            vec![8]
        );
    }

    #[test]
    fn test_loading_token_records_nothing() {
        let mut store = ByteStore::new(vec![0; 4]);
        let mut token = ChangeToken::loading();

        token.change_data(&mut store, 0, 1);
        token.set_data_length(&mut store, 8, 0xFF);
        token.add_run(Run::unformatted(0, BTreeSet::from([4])));
        token.add_name(0, "start");

        assert!(!token.has_any_change());
        assert_eq!(store.len(), 8);
        assert_eq!(store[0], 1);
    }

    #[test]
    fn test_absorbed_changes_cancel_against_earlier_ones() {
        // Given a token that added a run and a later token that removed it
        let mut store = ByteStore::new(vec![0; 4]);
        let mut token = ChangeToken::new();
        token.change_data(&mut store, 0, 1);
        token.add_run(Run::pointer(0x10));
        let mut later = token.scratch();
        later.change_data(&mut store, 0, 2);
        later.remove_run(Run::pointer(0x10));

        // When the later token is absorbed
        token.absorb(later);

        // Then the run is gone from the record and the first old byte wins
        assert_eq!(token.added_runs().count(), 0);
        assert_eq!(token.removed_runs().count(), 0);
        assert_eq!(token.old_data.get(&0), Some(&0));
    }

    #[test]
    fn test_scratch_of_loading_token_still_records() {
        let mut store = ByteStore::new(vec![0; 4]);
        let parent = ChangeToken::loading();
        let mut scratch = parent.scratch();

        scratch.change_data(&mut store, 0, 1);

        assert!(scratch.is_loading());
        assert!(scratch.has_data_change());
    }

    #[test]
    fn test_list_created_then_deleted_leaves_nothing() {
        let mut token = ChangeToken::new();
        token.change_list("types", None, Some(vec!["fire".to_string()]));
        token.change_list("types", Some(vec!["fire".to_string()]), None);

        assert!(!token.has_any_change());
    }
}
