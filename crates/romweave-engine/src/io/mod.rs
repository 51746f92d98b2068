pub mod metadata;

pub use metadata::StoredMetadata;

use std::fs;
use std::path::{Path, PathBuf};

use crate::discovery::discover;
use crate::editing::{Model, ModelSettings};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid metadata: {0}")]
    MetadataParse(#[from] toml::de::Error),
    #[error("Failed to write metadata: {0}")]
    MetadataWrite(#[from] toml::ser::Error),
}

/// Read the raw bytes of a ROM
pub fn read_rom(path: &Path) -> Result<Vec<u8>, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    fs::read(path).map_err(IoError::Io)
}

/// Write ROM bytes, creating parent directories as needed
pub fn write_rom(path: &Path, data: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }
    fs::write(path, data).map_err(IoError::Io)
}

/// Where the metadata for `rom` lives: `rom.gba` becomes `rom.toml`, either
/// beside the ROM or inside `metadata_dir`.
pub fn metadata_path(rom: &Path, metadata_dir: Option<&Path>) -> PathBuf {
    let sidecar = rom.with_extension("toml");
    match metadata_dir {
        Some(dir) => dir.join(sidecar.file_name().unwrap_or_default()),
        None => sidecar,
    }
}

/// Load stored metadata. A missing file is `Ok(None)`.
pub fn load_metadata(path: &Path) -> Result<Option<StoredMetadata>, IoError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(IoError::Io)?;
    Ok(Some(StoredMetadata::parse(&content)?))
}

pub fn save_metadata(path: &Path, metadata: &StoredMetadata) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }
    fs::write(path, metadata.to_toml()?).map_err(IoError::Io)
}

/// Build a model for `rom`, from its metadata when there is any and by
/// discovery otherwise.
pub fn open_model(
    rom: &Path,
    metadata: &Path,
    settings: ModelSettings,
) -> Result<Model, IoError> {
    let data = read_rom(rom)?;
    match load_metadata(metadata)? {
        Some(stored) => {
            log::info!("loading metadata from {}", metadata.display());
            let mut model = Model::new(data, settings);
            stored.apply_to(&mut model);
            Ok(model)
        }
        None => Ok(discover(data, settings)),
    }
}

/// Write both the bytes and the metadata of `model`.
pub fn save_model(rom: &Path, metadata: &Path, model: &Model) -> Result<(), IoError> {
    write_rom(rom, model.data())?;
    save_metadata(metadata, &StoredMetadata::from_model(model))
}
