//! Alias inversion
//!
//! Users declare the aliases they receive; delivery needs the opposite
//! direction, every alias with the users it expands to.

use mailcraft_common::Registry;
use std::collections::HashMap;
use tracing::debug;

/// Alias to owning users, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl AliasTable {
    /// Invert the per-user alias lists of a registry.
    ///
    /// Users are visited in registry order and their aliases in declared
    /// order. Owners are not deduplicated: a user listing the same alias
    /// twice shows up twice.
    pub fn invert(registry: &Registry) -> Self {
        let mut table = Self::default();
        for user in registry {
            for alias in &user.aliases {
                table.push(alias, &user.name);
            }
        }

        debug!(aliases = table.len(), "Inverted alias table");
        table
    }

    fn push(&mut self, alias: &str, owner: &str) {
        match self.index.get(alias) {
            Some(&slot) => self.entries[slot].1.push(owner.to_string()),
            None => {
                self.index.insert(alias.to_string(), self.entries.len());
                self.entries
                    .push((alias.to_string(), vec![owner.to_string()]));
            }
        }
    }

    /// Owners of an alias
    pub fn owners(&self, alias: &str) -> Option<&[String]> {
        self.index
            .get(alias)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    /// Whether the alias was declared by anyone
    pub fn contains(&self, alias: &str) -> bool {
        self.index.contains_key(alias)
    }

    /// Aliases in table order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(alias, _)| alias.as_str())
    }

    /// `(alias, owners)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(alias, owners)| (alias.as_str(), owners.as_slice()))
    }

    /// Number of distinct aliases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no alias was declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
