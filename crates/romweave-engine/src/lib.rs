pub mod discovery;
pub mod editing;
pub mod error;
pub mod io;
pub mod models;
pub mod text;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use discovery::discover;
pub use editing::{AnchorTable, ChangeToken, Model, ModelSettings, RunIndex, validate_anchor_name};
pub use error::{ModelError, ModelResult};
pub use io::{IoError, StoredMetadata};
pub use models::{ByteStore, Run, RunKind, TableRun};
pub use text::{EncodedText, decode, encode};
pub use romweave_format::{Field, FieldKind, FormatError, RunFormat, TableFormat, TableLength};
