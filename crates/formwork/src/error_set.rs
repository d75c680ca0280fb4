//! Namespaced validation messages.
//!
//! An [`ErrorSet`] maps an attribute path to the messages recorded for it.
//! Paths are exposed attribute names, dotted paths for nested collection
//! members (`rooms.room_name`), or [`ErrorSet::BASE`] for errors that
//! belong to the whole record.

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorSet {
    messages: IndexMap<String, Vec<String>>,
}

impl ErrorSet {
    pub const BASE: &'static str = "base";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(path.into())
            .or_default()
            .push(message.into());
    }

    /// Add a message unless the path already carries the same one.
    pub fn add_unique(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        let list = self.messages.entry(path.into()).or_default();
        if !list.contains(&message) {
            list.push(message);
        }
    }

    /// Messages for `path`, empty when there are none.
    pub fn get(&self, path: &str) -> &[String] {
        self.messages.get(path).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        !self.get(path).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.values().all(Vec::is_empty)
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    /// Paths that carry at least one message.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(path, _)| path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.messages
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(path, list)| (path.as_str(), list.as_slice()))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Copy every message of `other` under `prefix.path`, skipping duplicates.
    pub fn merge_namespaced(&mut self, prefix: &str, other: &ErrorSet) {
        for (path, list) in other.iter() {
            let namespaced = format!("{prefix}.{path}");
            for message in list {
                self.add_unique(namespaced.clone(), message.clone());
            }
        }
    }

    /// Human-readable messages: `"Name can't be blank"`, base messages as is.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(path, list)| {
                list.iter().map(move |message| {
                    if path == Self::BASE {
                        message.clone()
                    } else {
                        format!("{} {}", humanize(path), message)
                    }
                })
            })
            .collect()
    }

    /// Reorder paths: base first, then the paths `position` knows in its
    /// order, then the rest in the order they were discovered.
    pub fn sort_by_declaration<F>(&mut self, position: F)
    where
        F: Fn(&str) -> Option<usize>,
    {
        let rank = |path: &str| -> (u8, usize) {
            if path == Self::BASE {
                (0, 0)
            } else {
                match position(path) {
                    Some(index) => (1, index),
                    None => (2, 0),
                }
            }
        };
        let mut entries: Vec<_> = std::mem::take(&mut self.messages).into_iter().collect();
        entries.sort_by_key(|(path, _)| rank(path));
        self.messages = entries.into_iter().collect();
    }
}

fn humanize(path: &str) -> String {
    let spaced = path.replace(['.', '_'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
