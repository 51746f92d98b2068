// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use romweave_engine::encode;

/// A ROM of `length` bytes: a pointer table at the start referring to
/// `strings` encoded strings spread through the rest, free space elsewhere.
#[allow(dead_code)]
pub fn generate_rom(length: usize, strings: usize) -> Vec<u8> {
    let mut data = vec![0xFFu8; length];
    let table_end = strings * 4;
    let spacing = ((length - table_end) / strings.max(1)) & !3;

    for index in 0..strings {
        let address = table_end + index * spacing;
        let text = encode(&format!("Item number {index}")).bytes;
        if address + text.len() > length {
            break;
        }
        data[address..address + text.len()].copy_from_slice(&text);
        let pointer = 0x0800_0000u32 + address as u32;
        data[index * 4..index * 4 + 4].copy_from_slice(&pointer.to_le_bytes());
    }
    data
}

/// A ROM whose first `used` bytes are all taken, so free-space searches
/// have to walk past them.
#[allow(dead_code)]
pub fn generate_crowded_rom(length: usize, used: usize) -> Vec<u8> {
    let mut data = vec![0xFFu8; length];
    for (index, byte) in data.iter_mut().take(used).enumerate() {
        *byte = (index % 0xF0) as u8 + 1;
    }
    data
}
