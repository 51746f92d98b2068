//! Stored metadata: the anchors, unmapped pointers and lists that turn a
//! raw ROM back into a model.
//!
//! The file is TOML with one array of tables per section:
//!
//! ```toml
//! [[NamedAnchors]]
//! Name = "messages"
//! Address = "0x000300"
//! Format = '""'
//! ```
//!
//! Addresses are written as fixed-width hex strings. Plain integers are
//! accepted on read.

use serde::{Deserialize, Serialize};

use romweave_format::{RunFormat, TableLength};

use crate::editing::{ChangeToken, Model};
use crate::models::Run;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMetadata {
    #[serde(rename = "NamedAnchors", default, skip_serializing_if = "Vec::is_empty")]
    pub named_anchors: Vec<StoredAnchor>,
    #[serde(rename = "UnmappedPointers", default, skip_serializing_if = "Vec::is_empty")]
    pub unmapped_pointers: Vec<StoredUnmappedPointer>,
    #[serde(rename = "List", default, skip_serializing_if = "Vec::is_empty")]
    pub lists: Vec<StoredList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredAnchor {
    pub name: String,
    #[serde(with = "hex_address")]
    pub address: usize,
    #[serde(default)]
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredUnmappedPointer {
    pub name: String,
    #[serde(with = "hex_address")]
    pub address: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredList {
    pub name: String,
    #[serde(default)]
    pub contents: Vec<String>,
}

impl StoredMetadata {
    pub fn from_model(model: &Model) -> Self {
        let named_anchors = model
            .anchors()
            .iter()
            .map(|(address, name)| StoredAnchor {
                name: name.to_string(),
                address,
                format: model
                    .run_at(address)
                    .map(Run::format_string)
                    .unwrap_or_default(),
            })
            .collect();
        let unmapped_pointers = model
            .anchors()
            .unmapped_pointers()
            .map(|(address, name)| StoredUnmappedPointer {
                name: name.to_string(),
                address,
            })
            .collect();
        let lists = model
            .lists()
            .iter()
            .map(|(name, contents)| StoredList {
                name: name.clone(),
                contents: contents.clone(),
            })
            .collect();

        Self {
            named_anchors,
            unmapped_pointers,
            lists,
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.named_anchors.is_empty() && self.unmapped_pointers.is_empty() && self.lists.is_empty()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Rebuild the model's tables from this metadata.
    ///
    /// Entries that no longer fit the bytes are skipped with a warning.
    /// Anchors whose table length follows another anchor are applied last so
    /// their parent already exists.
    pub fn apply_to(&self, model: &mut Model) {
        let mut token = ChangeToken::loading();

        for list in &self.lists {
            model.set_list(&mut token, &list.name, list.contents.clone());
        }

        for pointer in &self.unmapped_pointers {
            let source = pointer.address;
            if !model.is_pointer_cell(source) {
                if !model.is_unclaimed(source, source + 4, None) {
                    log::warn!(
                        "skipping unmapped pointer to `{}`: {source:#08X} is already formatted",
                        pointer.name
                    );
                    continue;
                }
                model.write_pointer_value(&mut token, source, None);
                model.put_run(&mut token, Run::pointer(source));
            }
            model.get_address_from_anchor(&mut token, &pointer.name, Some(source));
        }

        let (independent, dependent): (Vec<&StoredAnchor>, Vec<&StoredAnchor>) =
            self.named_anchors.iter().partition(|anchor| {
                !matches!(
                    romweave_format::parse(&anchor.format),
                    Ok(RunFormat::Table(ref table)) if matches!(table.length, TableLength::FromAnchor(_))
                )
            });
        for anchor in independent.into_iter().chain(dependent) {
            let text = format!("{}{}", anchor.name, anchor.format);
            if let Err(e) = model.apply_anchor(&mut token, anchor.address, &text, true) {
                log::warn!("skipping anchor `{}` at {:#08X}: {e}", anchor.name, anchor.address);
            }
        }
    }
}

/// `0x000300` on disk, `usize` in memory.
mod hex_address {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(address: &usize, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{address:06X}"))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Address {
        Number(usize),
        Hex(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        match Address::deserialize(deserializer)? {
            Address::Number(address) => Ok(address),
            Address::Hex(text) => {
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(&text);
                usize::from_str_radix(digits, 16)
                    .map_err(|_| de::Error::custom(format!("invalid address `{text}`")))
            }
        }
    }
}
