//! A case-insensitive, insertion-ordered header multimap: lookup is
//! keyed by case-folded name, iteration preserves the original casing
//! the archive sent.

use std::collections::HashMap;

/// Headers mirrored from an archived origin response (`Memento.headers`).
///
/// Lookup (`get`, `contains_key`) is case-insensitive. Iteration yields
/// `(name, value)` pairs in the casing originally received, in insertion
/// order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, overwriting any existing value under the same
    /// case-folded name (the last write for a given name wins, keeping
    /// its original casing and position).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let value = value.into();

        if let Some(&i) = self.index.get(&key) {
            self.entries[i] = (name, value);
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        self.index
            .get(&key)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build a `Headers` map from an archived response's
    /// `X-Archive-Orig-*` headers, stripping the prefix and restoring the
    /// original header name's casing.
    pub fn from_archive_orig_headers<'a, I>(pairs: I) -> Headers
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        const PREFIX: &str = "x-archive-orig-";
        let mut headers = Headers::new();

        for (name, value) in pairs {
            if name.len() > PREFIX.len() && name[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
                let original_name = &name[PREFIX.len()..];
                headers.insert(original_name, value);
            }
        }

        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
