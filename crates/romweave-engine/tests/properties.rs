//! Random edit sequences against a small discovered ROM. After every edit
//! the model must stay consistent, and reverting every token newest first
//! must give back the starting model.

use proptest::prelude::*;
use romweave_engine::{ChangeToken, Model, ModelSettings, Run, decode, discover, encode};

const ROM_LENGTH: usize = 0x400;
const STRINGS: [(usize, &str); 3] = [(0x100, "Potion"), (0x140, "Great Ball"), (0x180, "Rare Candy")];

#[derive(Debug, Clone)]
enum Edit {
    PointTo { source: usize, destination: usize },
    NameText { address: usize, name: usize },
    Clear { start: usize, length: usize },
    Grow { address: usize, extra: usize },
}

fn base_rom() -> Vec<u8> {
    let mut data = vec![0xFFu8; ROM_LENGTH];
    for (index, (address, text)) in STRINGS.iter().enumerate() {
        let bytes = encode(text).bytes;
        data[*address..*address + bytes.len()].copy_from_slice(&bytes);
        let source = index * 4;
        data[source..source + 4].copy_from_slice(&(0x0800_0000u32 + *address as u32).to_le_bytes());
    }
    data
}

/// Any aligned slot, weighted towards the string starts.
fn address() -> BoxedStrategy<usize> {
    prop_oneof![
        (0usize..ROM_LENGTH / 4).prop_map(|slot| slot * 4),
        prop::sample::select(STRINGS.iter().map(|(address, _)| *address).collect::<Vec<_>>()),
    ]
    .boxed()
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        ((0usize..0x40).prop_map(|slot| slot * 4), address())
            .prop_map(|(source, destination)| Edit::PointTo { source, destination }),
        (address(), 0usize..3).prop_map(|(address, name)| Edit::NameText { address, name }),
        (0usize..ROM_LENGTH, 1usize..0x30).prop_map(|(start, length)| Edit::Clear { start, length }),
        (address(), 1usize..0x80).prop_map(|(address, extra)| Edit::Grow { address, extra }),
    ]
}

fn apply(model: &mut Model, token: &mut ChangeToken, edit: &Edit) {
    match *edit {
        Edit::PointTo {
            source,
            destination,
        } => {
            if model.is_pointer_cell(source) {
                model.write_pointer(token, source, Some(destination));
            } else if model.runs().overlapping(source, source + 4, false).is_none() {
                model.write_value(token, source, 0x0800_0000 + destination as u32);
                let _ = model.observe_run_written(token, Run::pointer(source));
            }
        }
        Edit::NameText { address, name } => {
            let _ = model.apply_anchor(token, address, &format!("name{name}\"\""), true);
        }
        Edit::Clear { start, length } => model.clear_format(token, start, length),
        Edit::Grow { address, extra } => {
            let run = model.get_next_run(address).clone();
            if !run.is_sentinel() {
                let _ = model.relocate_for_expansion(token, &run, run.length() + extra);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn edits_keep_model_consistent_and_revert_exactly(
        edits in prop::collection::vec(edit_strategy(), 1..12)
    ) {
        let original = discover(base_rom(), ModelSettings::default());
        let mut model = original.clone();
        let mut tokens = Vec::new();

        for edit in &edits {
            let mut token = ChangeToken::new();
            apply(&mut model, &mut token, edit);
            prop_assert_eq!(model.verify_consistency(), Ok(()), "after {:?}", edit);
            tokens.push(token);
        }

        for token in tokens.iter().rev() {
            token.revert(&mut model);
        }
        prop_assert_eq!(model, original);
    }

    #[test]
    fn decode_then_encode_returns_the_bytes(
        body in prop::collection::vec(
            prop::sample::select((0x00u8..=0xF6).collect::<Vec<_>>()),
            0..40,
        )
    ) {
        let mut bytes = body;
        bytes.push(0xFF);
        if let Some(text) = decode(&bytes, 0, bytes.len()) {
            prop_assert_eq!(encode(&text).bytes, bytes);
        }
    }
}
