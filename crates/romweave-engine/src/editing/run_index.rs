use crate::models::Run;
use crate::models::run::SENTINEL;

/// Runs sorted by start with binary-search lookup.
///
/// A sorted `Vec` rather than a tree: lookups vastly outnumber insertions
/// once a model is loaded, and iteration "from index X" is a slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunIndex {
    runs: Vec<Run>,
}

impl RunIndex {
    /// Build from runs already sorted by start.
    pub(crate) fn from_sorted(runs: Vec<Run>) -> Self {
        debug_assert!(runs.windows(2).all(|pair| pair[0].start < pair[1].start));
        Self { runs }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Run> {
        self.runs.iter()
    }

    fn search(&self, start: usize) -> Result<usize, usize> {
        self.runs.binary_search_by_key(&start, |run| run.start)
    }

    /// The run starting exactly at `start`.
    pub fn get(&self, start: usize) -> Option<&Run> {
        self.search(start).ok().map(|index| &self.runs[index])
    }

    /// Position of the run containing `address`, else of the first run
    /// after it.
    fn position_from(&self, address: usize) -> usize {
        match self.search(address) {
            Ok(index) => index,
            Err(index) if index > 0 && self.runs[index - 1].end() > address => index - 1,
            Err(index) => index,
        }
    }

    /// The run containing `address`, else the next run after it, else a
    /// sentinel starting at `usize::MAX`.
    pub fn get_next_run(&self, address: usize) -> &Run {
        self.runs
            .get(self.position_from(address))
            .unwrap_or(&SENTINEL)
    }

    /// Runs from the one [`RunIndex::get_next_run`] would return onwards.
    pub fn iter_from(&self, address: usize) -> std::slice::Iter<'_, Run> {
        self.runs[self.position_from(address)..].iter()
    }

    /// First run with at least one byte in `[start, end)`. A zero-length run
    /// exactly at `start` is ignored when `skip_empty_at_start` is set.
    pub fn overlapping(&self, start: usize, end: usize, skip_empty_at_start: bool) -> Option<&Run> {
        self.iter_from(start)
            .take_while(|run| run.start < end)
            .find(|run| !(skip_empty_at_start && run.start == start && run.length() == 0))
    }

    /// Insert `run`, replacing any run with the same start.
    pub(crate) fn put(&mut self, run: Run) -> Option<Run> {
        match self.search(run.start) {
            Ok(index) => Some(std::mem::replace(&mut self.runs[index], run)),
            Err(index) => {
                self.runs.insert(index, run);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, start: usize) -> Option<Run> {
        self.search(start).ok().map(|index| self.runs.remove(index))
    }
}
