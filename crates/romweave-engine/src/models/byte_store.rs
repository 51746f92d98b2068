use std::ops::{Index, Range};

/// Offset subtracted from a stored pointer value to get a file address.
pub const POINTER_BASE: u32 = 0x0800_0000;

/// The byte conventionally used to mark unused space.
pub const FREE_BYTE: u8 = 0xFF;

/// Growable byte buffer holding the raw image.
///
/// All writes go through [`crate::editing::ChangeToken`] so they can be
/// reverted; the store itself only offers raw access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStore {
    bytes: Vec<u8>,
}

impl ByteStore {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        let end = range.end.min(self.bytes.len());
        let start = range.start.min(end);
        &self.bytes[start..end]
    }

    /// Little-endian dword at `index`, or `None` if it runs off the end.
    pub fn read_value(&self, index: usize) -> Option<u32> {
        let bytes = self.bytes.get(index..index.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Address the dword at `index` refers to.
    ///
    /// `None` for the NULL pointer (`0x08000000`) and for any value below the
    /// pointer base. Values above the end of the store are returned as-is;
    /// callers range-check against [`ByteStore::len`].
    pub fn read_pointer(&self, index: usize) -> Option<usize> {
        let value = self.read_value(index)?;
        if value <= POINTER_BASE {
            return None;
        }
        Some((value - POINTER_BASE) as usize)
    }

    pub(crate) fn set(&mut self, index: usize, value: u8) {
        self.bytes[index] = value;
    }

    pub(crate) fn resize(&mut self, length: usize, fill: u8) {
        self.bytes.resize(length, fill);
    }
}

impl Index<usize> for ByteStore {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.bytes[index]
    }
}

/// Encode an address (or NULL) as a stored pointer value.
pub fn pointer_value(destination: Option<usize>) -> u32 {
    match destination {
        Some(address) => POINTER_BASE.wrapping_add(address as u32),
        None => POINTER_BASE,
    }
}
