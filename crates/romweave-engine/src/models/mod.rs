pub mod byte_store;
pub mod run;

pub use byte_store::{ByteStore, FREE_BYTE, POINTER_BASE, pointer_value};
pub use run::{Run, RunKind, TableRun};
