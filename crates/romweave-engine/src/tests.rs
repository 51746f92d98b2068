//! Shared helpers for unit tests.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::models::pointer_value;

/// A zero-filled ROM of `length` bytes with each `(source, destination)`
/// pointer written in.
pub fn rom_with_pointers(length: usize, pointers: &[(usize, usize)]) -> Vec<u8> {
    let mut data = vec![0u8; length];
    for &(source, destination) in pointers {
        data[source..source + 4].copy_from_slice(&pointer_value(Some(destination)).to_le_bytes());
    }
    data
}

pub fn create_test_dir() -> TempDir {
    TempDir::new().unwrap()
}

pub fn write_test_rom(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}
