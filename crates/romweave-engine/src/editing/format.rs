use std::collections::{BTreeMap, BTreeSet};

use crate::editing::{ChangeToken, Model};
use crate::error::{ModelError, ModelResult};
use crate::models::{FREE_BYTE, Run, RunKind};

impl Model {
    /// Register `run` in the index.
    ///
    /// A run already starting at `run.start` is replaced and its pointer
    /// sources carry over; an [`RunKind::Unformatted`] run never replaces a
    /// real format, it only adds sources. Pointer cells in the new run are
    /// attached to their destinations. Overlap with any other run is refused
    /// with [`ModelError::FormatConflict`] before anything changes, and so
    /// is a named table whose length would follow itself. If resizing the
    /// tables that follow this one fails, the whole write is rolled back.
    pub fn observe_run_written(&mut self, token: &mut ChangeToken, run: Run) -> ModelResult<()> {
        self.check_fits(&run)?;
        if run.as_table().is_some()
            && let Some(name) = self.anchors.name_at(run.start)
        {
            self.check_length_dependency(name, &run)?;
        }
        self.transaction(token, |model, token| model.write_run(token, run, &mut Vec::new()))
    }

    pub(crate) fn check_fits(&self, run: &Run) -> ModelResult<()> {
        if run.is_unformatted() && self.runs.get(run.start).is_some() {
            return Ok(());
        }
        let conflict = self
            .runs
            .iter_from(run.start)
            .take_while(|other| other.start < run.end())
            .find(|other| other.start != run.start);
        match conflict {
            Some(existing) => {
                log::debug!(
                    "refusing {} run at {:#08X}: overlaps run at {:#08X}",
                    run.format_string(),
                    run.start,
                    existing.start
                );
                Err(ModelError::FormatConflict {
                    start: run.start,
                    length: run.length(),
                    existing: existing.start,
                })
            }
            None => Ok(()),
        }
    }

    /// Unchecked write. `visited` guards the dependent-length walk.
    ///
    /// Not atomic on its own: callers that can fail halfway wrap it in
    /// [`Model::transaction`].
    pub(crate) fn write_run(
        &mut self,
        token: &mut ChangeToken,
        mut run: Run,
        visited: &mut Vec<String>,
    ) -> ModelResult<()> {
        if !run.is_unformatted()
            && let Some(existing) = self.runs.get(run.start).cloned()
        {
            let kept: BTreeSet<usize> = run.pointer_cells().into_iter().collect();
            for cell in existing.pointer_cells() {
                if !kept.contains(&cell) {
                    self.clear_pointer_format(token, cell);
                }
            }
        }

        let mut detached = Vec::new();
        if let Some(existing) = self.runs.get(run.start).cloned() {
            run.pointer_sources
                .extend(existing.pointer_sources.iter().copied());
            if run.is_unformatted() {
                run = Run {
                    pointer_sources: run.pointer_sources,
                    ..existing
                };
            } else {
                detached = carry_element_sources(&existing, &mut run)?;
            }
        }

        let start = run.start;
        let cells = run.pointer_cells();
        let is_table = run.as_table().is_some();
        let is_placeholder = run.is_unformatted() && run.pointer_sources.is_empty();
        self.put_run(token, run);
        for cell in cells {
            self.add_pointer_to_anchor(token, cell);
        }
        for source in detached {
            self.add_pointer_to_anchor(token, source);
        }

        let name = self.anchors.name_at(start).map(str::to_string);
        if is_placeholder && name.is_none() {
            self.take_run(token, start);
        }
        if let (true, Some(name)) = (is_table, name) {
            self.update_dependent_lengths(token, &name, visited)?;
        }
        Ok(())
    }

    /// Make sure whatever `source` points at lists `source` among its
    /// pointer sources, creating a placeholder if nothing starts there. A
    /// pointer to the start of a later table element is listed by that
    /// element instead.
    pub(crate) fn add_pointer_to_anchor(&mut self, token: &mut ChangeToken, source: usize) {
        let Some(destination) = self.data.read_pointer(source) else {
            return;
        };
        if destination >= self.data.len() {
            return;
        }

        if let Some(existing) = self.runs.get(destination) {
            if !existing.pointer_sources.contains(&source) {
                let updated = existing.clone().with_sources([source]);
                self.put_run(token, updated);
            }
            return;
        }

        let containing = self.runs.get_next_run(destination).clone();
        if containing.contains(destination) {
            if let Some(index) = containing.element_index(destination) {
                self.add_element_source(token, containing, index, source);
                return;
            }
            // pointers into the middle of a table element, or into their own
            // cell, stay unregistered
            if containing.as_table().is_some() || containing.contains(source) {
                return;
            }
            log::debug!(
                "pointer at {source:#08X} lands inside run at {:#08X}, clearing it",
                containing.start
            );
            self.clear_format_internal(token, destination, 1, false, false);
        }
        self.put_run(token, Run::unformatted(destination, BTreeSet::from([source])));
    }

    /// Detach the pointer cell at `source` from its destination.
    ///
    /// A destination left with no name and no sources is dropped, unless it
    /// is itself a pointer. A pending unmapped entry for `source` is dropped
    /// too.
    pub(crate) fn clear_pointer_format(&mut self, token: &mut ChangeToken, source: usize) {
        self.remove_unmapped(token, source);
        let Some(destination) = self.data.read_pointer(source) else {
            return;
        };
        let Some(existing) = self.runs.get(destination) else {
            self.remove_element_source(token, destination, source);
            return;
        };
        if !existing.pointer_sources.contains(&source) {
            return;
        }

        let mut updated = existing.clone();
        updated.pointer_sources.remove(&source);
        let orphaned = updated.pointer_sources.is_empty()
            && !updated.is_pointer()
            && self.anchors.name_at(destination).is_none();
        let length = updated.length();
        let placeholder = updated.is_unformatted();
        self.put_run(token, updated);

        if orphaned && placeholder {
            self.take_run(token, destination);
        } else if orphaned {
            self.clear_format_internal(token, destination, length, false, false);
        }
    }

    fn add_element_source(
        &mut self,
        token: &mut ChangeToken,
        mut table: Run,
        index: usize,
        source: usize,
    ) {
        if let RunKind::Table(inner) = &mut table.kind
            && inner.element_sources.entry(index).or_default().insert(source)
        {
            self.put_run(token, table);
        }
    }

    fn remove_element_source(
        &mut self,
        token: &mut ChangeToken,
        destination: usize,
        source: usize,
    ) {
        let mut table = self.runs.get_next_run(destination).clone();
        let Some(index) = table.element_index(destination) else {
            return;
        };
        let RunKind::Table(inner) = &mut table.kind else {
            return;
        };
        let Some(sources) = inner.element_sources.get_mut(&index) else {
            return;
        };
        if !sources.remove(&source) {
            return;
        }
        if sources.is_empty() {
            inner.element_sources.remove(&index);
        }
        self.put_run(token, table);
    }

    /// Remove every format in `[start, start + length)`.
    ///
    /// Pointers into a run starting exactly at `start` stay registered
    /// against that address.
    pub fn clear_format(&mut self, token: &mut ChangeToken, start: usize, length: usize) {
        let keep_initial = self.runs.get(start).is_some();
        self.clear_format_internal(token, start, length, keep_initial, false);
    }

    /// Remove every format in `[start, start + length)` and overwrite the
    /// bytes with `0xFF`.
    ///
    /// Unlike [`Model::clear_format`], pointers to an unnamed run starting at
    /// `start` are demoted too. A named run keeps its sources on a
    /// placeholder.
    pub fn clear_format_and_data(&mut self, token: &mut ChangeToken, start: usize, length: usize) {
        self.clear_format_internal(token, start, length, false, true);
    }

    pub(crate) fn clear_format_internal(
        &mut self,
        token: &mut ChangeToken,
        start: usize,
        length: usize,
        keep_initial_sources: bool,
        clear_data: bool,
    ) {
        let end = start.saturating_add(length);
        let mut position = start;
        let mut keep_sources = keep_initial_sources;

        while position < end {
            let run = self.runs.get_next_run(position).clone();
            if clear_data {
                self.fill_free(token, position, run.start.min(end));
            }
            if run.is_sentinel() || run.start >= end {
                break;
            }

            for cell in run.pointer_cells() {
                self.clear_pointer_format(token, cell);
            }
            if let Some(current) = self.runs.get(run.start).cloned() {
                self.clear_anchor_format(token, keep_sources, clear_data, current);
            }
            if clear_data {
                self.fill_free(token, run.start.max(start), run.end().min(end));
            }

            position = run.end().max(run.start + 1);
            keep_sources = false;
        }
    }

    fn fill_free(&mut self, token: &mut ChangeToken, start: usize, end: usize) {
        for index in start..end.min(self.data.len()) {
            self.write_byte(token, index, FREE_BYTE);
        }
    }

    fn clear_anchor_format(
        &mut self,
        token: &mut ChangeToken,
        keep_sources: bool,
        data_cleared: bool,
        run: Run,
    ) {
        if let Some(name) = self.unbind_name(token, run.start) {
            if data_cleared {
                self.keep_as_placeholder(token, &run);
                return;
            }
            self.take_run(token, run.start);
            for &source in &run.pointer_sources {
                self.write_pointer_value(token, source, None);
                self.add_unmapped(token, source, &name);
            }
            for (index, sources) in run.element_sources() {
                let label = format!("{name}/{index}");
                for &source in sources {
                    self.write_pointer_value(token, source, None);
                    self.add_unmapped(token, source, &label);
                }
            }
            return;
        }

        if keep_sources {
            self.keep_as_placeholder(token, &run);
            return;
        }

        self.take_run(token, run.start);
        for (address, sources) in source_groups(&run) {
            // table cells can't be demoted, so they keep a placeholder alive
            let mut table_cells = BTreeSet::new();
            for source in sources {
                let Some(pointer) = self.runs.get(source).filter(|r| r.is_pointer()).cloned()
                else {
                    if self.is_pointer_cell(source) {
                        table_cells.insert(source);
                    }
                    continue;
                };
                if pointer.pointer_sources.is_empty() && self.anchors.name_at(source).is_none() {
                    self.take_run(token, source);
                } else {
                    self.put_run(token, Run::unformatted(source, pointer.pointer_sources));
                }
            }
            if !table_cells.is_empty() {
                self.put_run(token, Run::unformatted(address, table_cells));
            }
        }
    }

    /// Replace `run` with placeholders holding its sources, one per element
    /// that anything points at.
    fn keep_as_placeholder(&mut self, token: &mut ChangeToken, run: &Run) {
        self.take_run(token, run.start);
        for (address, sources) in source_groups(run) {
            if !sources.is_empty() {
                self.put_run(token, Run::unformatted(address, sources));
            }
        }
    }

    /// Resize every table whose length follows the table named `parent`.
    pub(crate) fn update_dependent_lengths(
        &mut self,
        token: &mut ChangeToken,
        parent: &str,
        visited: &mut Vec<String>,
    ) -> ModelResult<()> {
        if visited.iter().any(|seen| seen.eq_ignore_ascii_case(parent)) {
            let mut chain = visited.clone();
            chain.push(parent.to_string());
            return Err(ModelError::CircularLengthDependency { chain });
        }
        let Some(count) = self.table_count(parent) else {
            return Ok(());
        };

        let dependents: Vec<Run> = self
            .runs
            .iter()
            .filter(|run| {
                run.as_table().is_some_and(|table| {
                    table.element_count != count
                        && table
                            .length_from_anchor()
                            .is_some_and(|name| name.eq_ignore_ascii_case(parent))
                })
            })
            .cloned()
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }

        visited.push(parent.to_string());
        for dependent in dependents {
            let Some(table) = dependent.as_table() else {
                continue;
            };
            let resized = Run {
                kind: RunKind::Table(table.with_count(count)),
                ..dependent.clone()
            };
            log::debug!(
                "resizing table at {:#08X} from {} to {count} elements to follow `{parent}`",
                dependent.start,
                table.element_count
            );

            let placed = if resized.length() <= dependent.length() {
                resized
            } else if token.is_loading() {
                if !self.is_unclaimed(dependent.end(), resized.end(), None) {
                    log::warn!(
                        "table at {:#08X} has no room to follow `{parent}`",
                        dependent.start
                    );
                    continue;
                }
                resized
            } else {
                self.relocate_for_expansion(token, &dependent, resized.length())?
            };
            self.write_run(token, placed, visited)?;
        }
        visited.pop();
        Ok(())
    }

    pub(crate) fn table_count(&self, name: &str) -> Option<usize> {
        let address = self.anchors.address_of(name)?;
        let table = self.runs.get(address)?.as_table()?;
        Some(table.element_count)
    }
}

/// Every address pointers into `run` land on, with the cells pointing there:
/// the start first, then each element that has its own sources.
fn source_groups(run: &Run) -> Vec<(usize, BTreeSet<usize>)> {
    let mut groups = vec![(run.start, run.pointer_sources.clone())];
    groups.extend(run.element_sources().filter_map(|(index, sources)| {
        Some((run.element_start(index)?, sources.clone()))
    }));
    groups
}

/// Move the element sources of `existing` onto `run`, which replaces it.
///
/// Sources aimed past the end of `run` are returned so they can be attached
/// to whatever lies there now. A source that would land inside `run` but not
/// on one of its element starts is a conflict.
fn carry_element_sources(existing: &Run, run: &mut Run) -> ModelResult<Vec<usize>> {
    let mut carried: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    let mut detached = Vec::new();
    for (index, sources) in existing.element_sources() {
        let Some(address) = existing.element_start(index) else {
            continue;
        };
        if let Some(new_index) = run.element_index(address) {
            carried
                .entry(new_index)
                .or_default()
                .extend(sources.iter().copied());
        } else if run.contains(address) {
            log::debug!(
                "refusing {} run at {:#08X}: pointers target {address:#08X} inside it",
                run.format_string(),
                run.start
            );
            return Err(ModelError::FormatConflict {
                start: run.start,
                length: run.length(),
                existing: address,
            });
        } else {
            detached.extend(sources.iter().copied());
        }
    }
    if let RunKind::Table(table) = &mut run.kind {
        for (index, sources) in carried {
            table.element_sources.entry(index).or_default().extend(sources);
        }
    }
    Ok(detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::ModelSettings;
    use crate::models::pointer_value;
    use pretty_assertions::assert_eq;
    use romweave_format::RunFormat;

    fn model_with_pointer(source: usize, destination: usize) -> Model {
        let mut data = vec![0u8; 0x1000];
        data[source..source + 4].copy_from_slice(&pointer_value(Some(destination)).to_le_bytes());
        Model::new(data, ModelSettings::default())
    }

    #[test]
    fn test_pointer_run_creates_placeholder_at_destination() {
        // Given a pointer to 0x300 at 0x100
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();

        // When the pointer run is observed
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();

        // Then a placeholder records the source
        let destination = model.run_at(0x300).unwrap();
        assert!(destination.is_unformatted());
        assert_eq!(destination.pointer_sources, BTreeSet::from([0x100]));
    }

    #[test]
    fn test_overlap_is_rejected_without_changes() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::text(0x20, 8))
            .unwrap();
        let before = model.clone();
        let mut second = ChangeToken::new();

        let result = model.observe_run_written(&mut second, Run::text(0x24, 8));

        assert_eq!(
            result,
            Err(ModelError::FormatConflict {
                start: 0x24,
                length: 8,
                existing: 0x20
            })
        );
        assert_eq!(model, before);
        assert!(!second.has_any_change());
    }

    #[test]
    fn test_overlap_with_following_run_is_rejected() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::text(0x20, 8))
            .unwrap();

        let result = model.observe_run_written(&mut token, Run::text(0x1C, 8));

        assert!(matches!(result, Err(ModelError::FormatConflict { existing: 0x20, .. })));
    }

    #[test]
    fn test_rewriting_format_keeps_sources() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();

        model
            .observe_run_written(&mut token, Run::text(0x300, 5))
            .unwrap();

        let run = model.run_at(0x300).unwrap();
        assert_eq!(run.length(), 5);
        assert_eq!(run.pointer_sources, BTreeSet::from([0x100]));
    }

    #[test]
    fn test_unformatted_write_does_not_replace_format() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::text(0x300, 5))
            .unwrap();

        model
            .observe_run_written(&mut token, Run::unformatted(0x300, BTreeSet::from([0x40])))
            .unwrap();

        let run = model.run_at(0x300).unwrap();
        assert_eq!(run.length(), 5);
        assert_eq!(run.pointer_sources, BTreeSet::from([0x40]));
    }

    #[test]
    fn test_sourceless_placeholder_is_dropped() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();

        model
            .observe_run_written(&mut token, Run::unformatted(0x200, BTreeSet::new()))
            .unwrap();

        assert!(model.run_at(0x200).is_none());
    }

    #[test]
    fn test_clear_pointer_drops_orphaned_placeholder() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();

        model.clear_format(&mut token, 0x100, 4);

        assert!(model.run_at(0x100).is_none());
        assert!(model.run_at(0x300).is_none());
    }

    #[test]
    fn test_clear_named_run_leaves_unmapped_pointers() {
        // Given a named run with one pointer to it
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();
        model
            .observe_anchor_written(&mut token, "foo", Run::text(0x300, 4))
            .unwrap();

        // When the named run's format is cleared
        model.clear_format(&mut token, 0x300, 4);

        // Then the pointer waits for `foo` and reads NULL
        assert_eq!(model.anchors().address_of("foo"), None);
        assert_eq!(model.anchors().unmapped_name(0x100), Some("foo"));
        assert_eq!(model.read_pointer(0x100), None);
        assert!(model.run_at(0x100).is_some_and(Run::is_pointer));
    }

    #[test]
    fn test_clear_format_and_data_fills_free_bytes() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::text(0x300, 4))
            .unwrap();

        model.clear_format_and_data(&mut token, 0x2FE, 8);

        assert_eq!(&model.data()[0x2FE..0x306], &[FREE_BYTE; 8]);
        assert!(model.run_at(0x300).is_none());
    }

    #[test]
    fn test_clear_unnamed_run_inside_range_demotes_its_pointers() {
        // Given a pointer at 0x100 to a text run at 0x300
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();
        model
            .observe_run_written(&mut token, Run::text(0x300, 4))
            .unwrap();

        // When a range that begins before the text run is cleared
        model.clear_format(&mut token, 0x2F0, 0x20);

        // Then the pointer run that referenced it is gone as well
        assert!(model.run_at(0x300).is_none());
        assert!(model.run_at(0x100).is_none());
    }

    #[test]
    fn test_clear_keeps_sources_of_run_starting_at_range() {
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();
        model
            .observe_run_written(&mut token, Run::text(0x300, 4))
            .unwrap();

        model.clear_format(&mut token, 0x300, 4);

        let placeholder = model.run_at(0x300).unwrap();
        assert!(placeholder.is_unformatted());
        assert_eq!(placeholder.pointer_sources, BTreeSet::from([0x100]));
        assert!(model.run_at(0x100).is_some());
    }

    #[test]
    fn test_clear_format_and_data_demotes_pointers_to_unnamed_run() {
        // Given a pointer at 0x100 to an unnamed text run at 0x300
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();
        model
            .observe_run_written(&mut token, Run::text(0x300, 4))
            .unwrap();

        // When the run and its bytes are cleared from its own start
        model.clear_format_and_data(&mut token, 0x300, 4);

        // Then the pointer format goes with it but its bytes stay
        assert!(model.run_at(0x300).is_none());
        assert!(model.run_at(0x100).is_none());
        assert_eq!(model.read_pointer(0x100), Some(0x300));
        assert_eq!(&model.data()[0x300..0x304], &[FREE_BYTE; 4]);
    }

    #[test]
    fn test_clear_named_run_and_data_keeps_sources_on_placeholder() {
        // Given a pointer at 0x100 to a text run named `foo`
        let mut model = model_with_pointer(0x100, 0x300);
        let mut token = ChangeToken::new();
        model
            .observe_run_written(&mut token, Run::pointer(0x100))
            .unwrap();
        model
            .observe_anchor_written(&mut token, "foo", Run::text(0x300, 4))
            .unwrap();

        // When the named run and its bytes are cleared
        model.clear_format_and_data(&mut token, 0x300, 4);

        // Then the name is gone, nothing waits for it and the pointer still
        // lands on a placeholder
        assert_eq!(model.anchors().address_of("foo"), None);
        assert_eq!(model.anchors().unmapped_name(0x100), None);
        assert_eq!(model.read_pointer(0x100), Some(0x300));
        let placeholder = model.run_at(0x300).unwrap();
        assert!(placeholder.is_unformatted());
        assert_eq!(placeholder.pointer_sources, BTreeSet::from([0x100]));
        assert_eq!(&model.data()[0x300..0x304], &[FREE_BYTE; 4]);
        assert_eq!(model.verify_consistency(), Ok(()));
    }

    fn table_with_element_pointer() -> (Model, ChangeToken) {
        let mut model = model_with_pointer(0x40, 0x208);
        let mut token = ChangeToken::new();
        model
            .apply_anchor(&mut token, 0x200, "stats[hp: atk:]3", false)
            .unwrap();
        model
            .observe_run_written(&mut token, Run::pointer(0x40))
            .unwrap();
        (model, token)
    }

    #[test]
    fn test_pointer_to_table_element_is_listed_by_that_element() {
        // Given a pointer at 0x40 to element 2 of `stats`
        let (mut model, mut token) = table_with_element_pointer();

        // Then the table lists it under element 2 and no placeholder exists
        let table = model.run_at(0x200).unwrap();
        assert_eq!(
            table.element_sources().collect::<Vec<_>>(),
            vec![(2, &BTreeSet::from([0x40]))]
        );
        assert!(model.run_at(0x208).is_none());
        assert_eq!(model.verify_consistency(), Ok(()));

        // When the pointer is cleared
        model.write_pointer(&mut token, 0x40, None);

        // Then the element no longer lists it
        assert_eq!(model.run_at(0x200).unwrap().element_sources().count(), 0);
    }

    #[test]
    fn test_clearing_named_table_leaves_element_pointers_waiting() {
        // Given a pointer at 0x40 to element 2 of `stats`
        let (mut model, mut token) = table_with_element_pointer();

        // When the table's format is cleared
        model.clear_format(&mut token, 0x200, 12);

        // Then the pointer reads NULL and waits for `stats/2`
        assert_eq!(model.read_pointer(0x40), None);
        assert_eq!(model.anchors().unmapped_name(0x40), Some("stats/2"));

        // When `stats` is anchored again
        model
            .apply_anchor(&mut token, 0x200, "stats[hp: atk:]3", false)
            .unwrap();

        // Then the pointer is written back and listed by element 2
        assert_eq!(model.read_pointer(0x40), Some(0x208));
        assert_eq!(model.anchors().unmapped_name(0x40), None);
        assert_eq!(model.get_anchor_from_address(Some(0x208), Some(0x40)), "stats/2");
        assert_eq!(model.verify_consistency(), Ok(()));
    }

    #[test]
    fn test_layout_that_splits_a_pointed_element_is_refused() {
        let (mut model, _) = table_with_element_pointer();
        let before = model.clone();
        let mut token = ChangeToken::new();

        let result = model.observe_run_written(&mut token, Run::text(0x200, 12));

        assert_eq!(
            result,
            Err(ModelError::FormatConflict {
                start: 0x200,
                length: 12,
                existing: 0x208
            })
        );
        assert_eq!(model, before);
        assert!(!token.has_any_change());
    }

    #[test]
    fn test_shrunk_table_hands_element_pointers_to_a_placeholder() {
        // Given a pointer at 0x40 to element 2 of a three-element table
        let (mut model, mut token) = table_with_element_pointer();
        let RunFormat::Table(format) = romweave_format::parse("[hp: atk:]2").unwrap() else {
            panic!("expected a table format");
        };

        // When the table is rewritten with two elements
        model
            .observe_run_written(&mut token, Run::table(0x200, format, 2))
            .unwrap();

        // Then the pointer is listed by a placeholder just past the table
        assert_eq!(model.run_at(0x200).unwrap().element_sources().count(), 0);
        assert_eq!(
            model.run_at(0x208).unwrap().pointer_sources,
            BTreeSet::from([0x40])
        );
        assert_eq!(model.verify_consistency(), Ok(()));
    }

    #[test]
    fn test_named_table_that_would_follow_itself_is_refused() {
        // Given `b` following `a` and `c` following `b`
        let mut model = Model::new(vec![0x01; 0x400], ModelSettings::default());
        let mut token = ChangeToken::new();
        model
            .apply_anchor(&mut token, 0x100, "a[x.]2", false)
            .unwrap();
        model
            .apply_anchor(&mut token, 0x200, "b[x.]a", false)
            .unwrap();
        model
            .apply_anchor(&mut token, 0x300, "c[x.]b", false)
            .unwrap();
        let before = model.clone();
        let RunFormat::Table(format) = romweave_format::parse("[x.]c").unwrap() else {
            panic!("expected a table format");
        };

        // When `a` is rewritten to follow `c`
        let result = model.observe_run_written(&mut token, Run::table(0x100, format, 2));

        // Then the loop is reported and nothing changes
        assert_eq!(
            result,
            Err(ModelError::CircularLengthDependency {
                chain: vec!["a".into(), "c".into(), "b".into(), "a".into()]
            })
        );
        assert_eq!(model, before);
    }

    #[test]
    fn test_failed_dependent_resize_rolls_back_the_whole_write() {
        // Given a full, capped store with `b` following the length of `a`
        let settings = ModelSettings {
            max_store_length: 0x400,
            ..ModelSettings::default()
        };
        let mut model = Model::new(vec![0x01; 0x400], settings);
        let mut setup = ChangeToken::new();
        model
            .apply_anchor(&mut setup, 0x200, "a[x.]4", false)
            .unwrap();
        model
            .apply_anchor(&mut setup, 0x300, "b[x.]a", false)
            .unwrap();
        let before = model.clone();
        let mut token = ChangeToken::new();

        // When `a` grows so that `b` has to move past the cap
        let result = model.apply_anchor(&mut token, 0x200, "a[x.]64", true);

        // Then the error comes back and neither the model nor the token changed
        assert_eq!(
            result,
            Err(ModelError::RelocationExhausted {
                requested: 0x440,
                limit: 0x400
            })
        );
        assert_eq!(model, before);
        assert!(!token.has_any_change());
    }
}
