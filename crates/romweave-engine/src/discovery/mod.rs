//! # Discovery
//!
//! Builds a [`Model`] from raw bytes with no metadata. Every 4-aligned dword
//! that looks like a pointer becomes a pointer run, every destination
//! becomes a placeholder listing its sources, and placeholders whose bytes
//! decode as a terminated string are promoted to text runs.
//!
//! Destinations must be 4-aligned like the sources. With both on the same
//! grid a 4-byte pointer run and a 1-byte placeholder can never overlap, so
//! the runs can be handed to [`RunIndex::from_sorted`] directly.

use std::collections::{BTreeMap, BTreeSet};

use crate::editing::{ChangeToken, Model, ModelSettings, RunIndex};
use crate::models::{ByteStore, FREE_BYTE, Run};
use crate::text::read_string;

/// Longest string discovery will try to recognise.
const MAX_INFERRED_TEXT: usize = 1000;

/// A source/destination pair found by the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundPointer {
    pub source: usize,
    pub destination: usize,
}

/// Scan `data` and return a fully indexed model.
pub fn discover(data: Vec<u8>, settings: ModelSettings) -> Model {
    let mut model = Model::new(data, settings);
    let pointers = find_pointers(&model.data, &model.settings);
    model.runs = RunIndex::from_sorted(build_runs(&pointers));
    let strings = infer_strings(&mut model);

    debug_assert_eq!(model.verify_consistency(), Ok(()));
    log::info!(
        "discovered {} pointers, {} runs, {strings} strings in {:#X} bytes",
        pointers.len(),
        model.runs().len(),
        model.len()
    );
    model
}

/// Every aligned dword that reads as a pointer to an aligned address inside
/// the store, at or after `earliest_allowed_anchor`, whose target is not
/// four free bytes.
pub fn find_pointers(store: &ByteStore, settings: &ModelSettings) -> Vec<FoundPointer> {
    (0..store.len().saturating_sub(3))
        .step_by(4)
        .filter_map(|source| {
            let value = store.read_value(source)?;
            if !matches!(value >> 24, 0x08 | 0x09) {
                return None;
            }
            let destination = store.read_pointer(source)?;
            let plausible = destination % 4 == 0
                && destination >= settings.earliest_allowed_anchor
                && destination < store.len()
                && store.read_value(destination) != Some(u32::from_le_bytes([FREE_BYTE; 4]));
            plausible.then_some(FoundPointer {
                source,
                destination,
            })
        })
        .collect()
}

/// Merge sources and destinations into one sorted run list.
fn build_runs(pointers: &[FoundPointer]) -> Vec<Run> {
    let mut sources_by_destination: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for pointer in pointers {
        sources_by_destination
            .entry(pointer.destination)
            .or_default()
            .insert(pointer.source);
    }

    let mut runs: BTreeMap<usize, Run> = pointers
        .iter()
        .map(|pointer| (pointer.source, Run::pointer(pointer.source)))
        .collect();
    for (destination, sources) in sources_by_destination {
        runs.entry(destination)
            .and_modify(|run| run.pointer_sources.extend(sources.iter().copied()))
            .or_insert_with(|| Run::unformatted(destination, sources));
    }
    runs.into_values().collect()
}

/// Promote placeholders that hold a clean string. Returns how many were
/// promoted.
fn infer_strings(model: &mut Model) -> usize {
    let mut token = ChangeToken::loading();
    let candidates: Vec<Run> = model
        .runs()
        .iter()
        .filter(|run| run.is_unformatted())
        .cloned()
        .collect();

    let mut promoted = 0;
    for candidate in candidates {
        let Some(length) = read_string(model.data(), candidate.start, false, MAX_INFERRED_TEXT)
        else {
            continue;
        };
        let end = candidate.start + length;
        if length < 2 || !model.is_unclaimed(candidate.start, end, Some(candidate.start)) {
            continue;
        }
        let text = Run::text(candidate.start, length).with_sources(candidate.pointer_sources);
        model.put_run(&mut token, text);
        promoted += 1;
    }
    promoted
}
