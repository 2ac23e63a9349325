//! Case-insensitive, insertion-ordered header storage.
//!
//! HTTP header names compare ASCII case-insensitively, and duplicate names are
//! legal and meaningful (`Set-Cookie`, `Via`, ...). [`HeaderContainer`] keeps
//! every entry in insertion order and never merges duplicates; lookups walk the
//! entries with a case-folded comparison.

use bytes::Bytes;

/// Ordered multimap of header name/value pairs.
///
/// Names and values are stored as [`Bytes`] exactly as they arrived on the
/// wire; only comparisons fold case.
#[derive(Debug, Default, Clone)]
pub struct HeaderContainer {
    entries: Vec<(Bytes, Bytes)>,
}

impl HeaderContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single entry.
    pub fn set(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Removes every entry named `name`, returning whether any existed.
    pub fn remove(&mut self, name: impl AsRef<[u8]>) -> bool {
        let name = name.as_ref();
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// First value stored under `name`, in insertion order.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&Bytes> {
        let name = name.as_ref();
        self.entries.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v)
    }

    /// Every value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: impl AsRef<[u8]> + 'a) -> impl Iterator<Item = &'a Bytes> {
        self.entries.iter().filter(move |(n, _)| n.eq_ignore_ascii_case(name.as_ref())).map(|(_, v)| v)
    }

    pub fn contains(&self, name: impl AsRef<[u8]>) -> bool {
        self.get(name).is_some()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries, keeping the backing allocation for reuse.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
