use crate::editing::{ChangeToken, Model};
use crate::error::{ModelError, ModelResult};
use crate::models::{FREE_BYTE, Run, RunKind};

fn align4(address: usize) -> usize {
    address.next_multiple_of(4)
}

impl Model {
    /// Make room for `run` to cover at least `minimum_length` bytes.
    ///
    /// Grows in place when the bytes after the run are free and unclaimed.
    /// Otherwise moves the run to the first free window found by
    /// [`Model::find_free_space`], or to the 4-aligned end of the store,
    /// growing it. Returns the run as it now sits in the index.
    pub fn relocate_for_expansion(
        &mut self,
        token: &mut ChangeToken,
        run: &Run,
        minimum_length: usize,
    ) -> ModelResult<Run> {
        let current = self
            .runs
            .get(run.start)
            .cloned()
            .unwrap_or_else(|| run.clone());
        if minimum_length <= current.length() {
            return Ok(current);
        }
        let grown = current
            .resized(minimum_length)
            .ok_or_else(|| ModelError::UnsupportedResize {
                start: current.start,
                format: current.format_string(),
            })?;
        let length = grown.length();

        if self.can_safely_use(current.end(), current.start + length) {
            self.put_run(token, grown.clone());
            return Ok(grown);
        }

        let destination = match self.find_free_space(self.settings.free_space_search_start, length)
        {
            Some(destination) => destination,
            None => {
                let destination = align4(self.data.len());
                let required = destination + length;
                if required > self.settings.max_store_length {
                    return Err(ModelError::RelocationExhausted {
                        requested: required,
                        limit: self.settings.max_store_length,
                    });
                }
                self.expand_data(token, required);
                destination
            }
        };

        let moved = self.move_run(token, &current, destination)?;
        let grown = moved
            .resized(minimum_length)
            .ok_or_else(|| ModelError::UnsupportedResize {
                start: moved.start,
                format: moved.format_string(),
            })?;
        self.put_run(token, grown.clone());
        Ok(grown)
    }

    /// Whether `[start, end)` lies inside the store, holds only free bytes
    /// and touches no run.
    pub fn can_safely_use(&self, start: usize, end: usize) -> bool {
        end <= self.data.len()
            && self.runs.overlapping(start, end, true).is_none()
            && self.data.slice(start..end).iter().all(|byte| self.is_free(*byte))
    }

    /// First 4-aligned address at or after `start` with `length` free bytes
    /// plus the configured slack, clear of every run.
    pub fn find_free_space(&self, start: usize, length: usize) -> Option<usize> {
        let buffer = self.settings.free_space_buffer;
        let window = length + self.settings.expansion_slack;
        let mut position = align4(start.max(self.settings.earliest_allowed_anchor));

        while position + window <= self.data.len() {
            let end = position + window;
            if let Some(run) = self.runs.overlapping(position, end, false) {
                position = align4(run.end().max(position + 1) + buffer);
                continue;
            }
            let last_used = (position..end)
                .rev()
                .find(|index| !self.is_free(self.data[*index]));
            match last_used {
                Some(used) => position = align4(used + buffer.max(4)),
                None => return Some(position),
            }
        }
        None
    }

    /// Move `run` to `new_start`, rewriting every pointer to it.
    ///
    /// The old bytes become `0xFF`. The name, the pointer sources, pointers
    /// to its table elements, pointer cells inside the run and any unmapped
    /// pointers stored inside it all follow the run. The target may overlap the run itself but no other
    /// run; the store grows if the target runs past its end.
    pub fn move_run(
        &mut self,
        token: &mut ChangeToken,
        run: &Run,
        new_start: usize,
    ) -> ModelResult<Run> {
        let current = self
            .runs
            .get(run.start)
            .cloned()
            .unwrap_or_else(|| run.clone());
        if new_start == current.start {
            return Ok(current);
        }
        let length = current.length();
        let new_end = new_start + length;
        if let Some(blocking) = self
            .runs
            .iter_from(new_start)
            .take_while(|other| other.start < new_end)
            .find(|other| other.start != current.start)
        {
            return Err(ModelError::FormatConflict {
                start: new_start,
                length,
                existing: blocking.start,
            });
        }

        let old_start = current.start;
        let shift = |address: usize| {
            if current.contains(address) {
                address - old_start + new_start
            } else {
                address
            }
        };

        self.expand_data(token, new_end);
        let bytes = self.data.slice(old_start..current.end()).to_vec();
        for index in old_start..current.end() {
            self.write_byte(token, index, FREE_BYTE);
        }
        self.write_bytes(token, new_start, &bytes);

        self.take_run(token, old_start);
        let sources: Vec<usize> = current.pointer_sources.iter().map(|s| shift(*s)).collect();
        for &source in &sources {
            self.write_pointer_value(token, source, Some(new_start));
        }
        let mut moved = Run {
            pointer_sources: sources.into_iter().collect(),
            ..current.moved_to(new_start)
        };
        if let RunKind::Table(table) = &mut moved.kind {
            let element_length = table.element_length();
            for (index, element_sources) in table.element_sources.iter_mut() {
                let shifted = element_sources.iter().map(|s| shift(*s)).collect();
                *element_sources = shifted;
                let element = new_start + index * element_length;
                for &source in element_sources.iter() {
                    self.write_pointer_value(token, source, Some(element));
                }
            }
        }

        for cell in current.pointer_cells() {
            let Some(destination) = self.data.read_pointer(shift(cell)) else {
                continue;
            };
            if moved.contains(destination) {
                continue;
            }
            self.retarget_source(token, destination, cell, shift(cell));
        }

        self.put_run(token, moved.clone());

        if let Some(name) = self.unbind_name(token, old_start) {
            self.bind_name(token, new_start, &name);
        }
        let waiting: Vec<(usize, String)> = self
            .anchors
            .unmapped_pointers()
            .filter(|(source, _)| current.contains(*source))
            .map(|(source, name)| (source, name.to_string()))
            .collect();
        for (source, name) in waiting {
            self.remove_unmapped(token, source);
            self.add_unmapped(token, shift(source), &name);
        }

        log::debug!(
            "moved {} run from {old_start:#08X} to {new_start:#08X}",
            moved.format_string()
        );
        Ok(moved)
    }

    /// Swap `old_source` for `new_source` wherever the run at or around
    /// `destination` lists it.
    fn retarget_source(
        &mut self,
        token: &mut ChangeToken,
        destination: usize,
        old_source: usize,
        new_source: usize,
    ) {
        if let Some(mut target) = self.runs.get(destination).cloned() {
            if target.pointer_sources.remove(&old_source) {
                target.pointer_sources.insert(new_source);
                self.put_run(token, target);
            }
            return;
        }
        let mut table = self.runs.get_next_run(destination).clone();
        let Some(index) = table.element_index(destination) else {
            return;
        };
        if let RunKind::Table(inner) = &mut table.kind
            && let Some(sources) = inner.element_sources.get_mut(&index)
            && sources.remove(&old_source)
        {
            sources.insert(new_source);
            self.put_run(token, table);
        }
    }
}
