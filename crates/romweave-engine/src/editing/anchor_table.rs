use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bidirectional name/address map plus pointers waiting for a name.
///
/// Names compare case-insensitively through a lowercase key; the original
/// spelling is what gets displayed and persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorTable {
    name_for_address: BTreeMap<usize, String>,
    address_for_name: HashMap<String, usize>,
    unmapped_name_for_source: BTreeMap<usize, String>,
    unmapped_sources_for_name: HashMap<String, BTreeSet<usize>>,
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

impl AnchorTable {
    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.address_for_name.get(&fold(name)).copied()
    }

    pub fn name_at(&self, address: usize) -> Option<&str> {
        self.name_for_address.get(&address).map(String::as_str)
    }

    /// Anchors ordered by address.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.name_for_address
            .iter()
            .map(|(address, name)| (*address, name.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.name_for_address.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_for_address.is_empty()
    }

    pub(crate) fn bind(&mut self, address: usize, name: &str) {
        self.name_for_address.insert(address, name.to_string());
        self.address_for_name.insert(fold(name), address);
    }

    pub(crate) fn unbind_address(&mut self, address: usize) -> Option<String> {
        let name = self.name_for_address.remove(&address)?;
        let key = fold(&name);
        if self.address_for_name.get(&key) == Some(&address) {
            self.address_for_name.remove(&key);
        }
        Some(name)
    }

    pub fn unmapped_name(&self, source: usize) -> Option<&str> {
        self.unmapped_name_for_source
            .get(&source)
            .map(String::as_str)
    }

    /// Sources waiting for `name`.
    pub fn unmapped_sources(&self, name: &str) -> BTreeSet<usize> {
        self.unmapped_sources_for_name
            .get(&fold(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Pending pointers ordered by source.
    pub fn unmapped_pointers(&self) -> impl Iterator<Item = (usize, &str)> {
        self.unmapped_name_for_source
            .iter()
            .map(|(source, name)| (*source, name.as_str()))
    }

    pub(crate) fn add_unmapped(&mut self, source: usize, name: &str) {
        if let Some(previous) = self.unmapped_name_for_source.insert(source, name.to_string()) {
            self.forget_unmapped_source(&previous, source);
        }
        self.unmapped_sources_for_name
            .entry(fold(name))
            .or_default()
            .insert(source);
    }

    pub(crate) fn remove_unmapped(&mut self, source: usize) -> Option<String> {
        let name = self.unmapped_name_for_source.remove(&source)?;
        self.forget_unmapped_source(&name, source);
        Some(name)
    }

    fn forget_unmapped_source(&mut self, name: &str, source: usize) {
        let key = fold(name);
        if let Some(sources) = self.unmapped_sources_for_name.get_mut(&key) {
            sources.remove(&source);
            if sources.is_empty() {
                self.unmapped_sources_for_name.remove(&key);
            }
        }
    }
}
