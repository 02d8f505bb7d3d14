//! Table artifacts
//!
//! Renders the four line-oriented tables shared by the MTA and the
//! mailbox store:
//! - credentials: `<user>@<domain> <hash>`
//! - users: `<user>:<hash>:::::`
//! - recipients: `<local>@<domain>`
//! - aliases: `<alias> <user1>,<user2>`
//!
//! Each renderer is a pure function of the registry and the inverted
//! alias table.

pub mod writer;

pub use writer::{ArtifactWriter, Manifest, ManifestEntry};

use crate::aliases::AliasTable;
use crate::artifact::Artifact;
use mailcraft_common::{EmailAddress, Registry};
use std::collections::HashSet;

/// Empty positional fields trailing the hash in a user record
/// (uid, gid, gecos, home, extra fields)
const USER_RECORD_PLACEHOLDERS: &str = ":::::";

/// A rendered table, one entry per line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    artifact: Artifact,
    lines: Vec<String>,
}

impl Table {
    fn new(artifact: Artifact, lines: Vec<String>) -> Self {
        Self { artifact, lines }
    }

    pub fn artifact(&self) -> Artifact {
        self.artifact
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// File contents: newline-terminated lines, or nothing at all for an
    /// empty table
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// The four tables of a compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub credentials: Table,
    pub user_records: Table,
    pub recipients: Table,
    pub alias_map: Table,
}

impl Tables {
    /// Render all tables
    pub fn compile(registry: &Registry, domain: &str, aliases: &AliasTable) -> Self {
        Self {
            credentials: credentials(registry, domain),
            user_records: user_records(registry),
            recipients: recipients(registry, domain, aliases),
            alias_map: alias_map(aliases),
        }
    }

    /// Table for an artifact, if it is one of the four tables
    pub fn get(&self, artifact: Artifact) -> Option<&Table> {
        match artifact {
            Artifact::Credentials => Some(&self.credentials),
            Artifact::UserRecords => Some(&self.user_records),
            Artifact::Recipients => Some(&self.recipients),
            Artifact::AliasMap => Some(&self.alias_map),
            _ => None,
        }
    }

    /// Tables in write order
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        [
            &self.credentials,
            &self.user_records,
            &self.recipients,
            &self.alias_map,
        ]
        .into_iter()
    }
}

/// One `<user>@<domain> <hash>` line per user
pub fn credentials(registry: &Registry, domain: &str) -> Table {
    let lines = registry
        .iter()
        .map(|user| format!("{} {}", user.address(domain), user.password_hash))
        .collect();
    Table::new(Artifact::Credentials, lines)
}

/// One `<user>:<hash>:::::` line per user
pub fn user_records(registry: &Registry) -> Table {
    let lines = registry
        .iter()
        .map(|user| {
            format!(
                "{}:{}{}",
                user.name, user.password_hash, USER_RECORD_PLACEHOLDERS
            )
        })
        .collect();
    Table::new(Artifact::UserRecords, lines)
}

/// Users in registry order, then aliases in table order. An address is
/// listed once even when an alias shares a user's name.
pub fn recipients(registry: &Registry, domain: &str, aliases: &AliasTable) -> Table {
    let locals = registry
        .iter()
        .map(|user| user.name.as_str())
        .chain(aliases.aliases());

    let mut seen = HashSet::new();
    let lines = locals
        .filter(|local| seen.insert(*local))
        .map(|local| EmailAddress::new(local, domain).to_string())
        .collect();
    Table::new(Artifact::Recipients, lines)
}

/// One `<alias> <owner>,<owner>` line per alias
pub fn alias_map(aliases: &AliasTable) -> Table {
    let lines = aliases
        .iter()
        .map(|(alias, owners)| format!("{} {}", alias, owners.join(",")))
        .collect();
    Table::new(Artifact::AliasMap, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcraft_common::User;
    use pretty_assertions::assert_eq;

    fn compile(users: Vec<User>) -> Tables {
        let registry: Registry = users.into_iter().collect();
        let aliases = AliasTable::invert(&registry);
        Tables::compile(&registry, "example.com", &aliases)
    }

    fn example() -> Tables {
        compile(vec![
            User::new("foo", "H1").with_aliases(["postmaster"]),
            User::new("bar", "H2"),
        ])
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            example().credentials.render(),
            "foo@example.com H1\nbar@example.com H2\n"
        );
    }

    #[test]
    fn test_user_records() {
        assert_eq!(example().user_records.render(), "foo:H1:::::\nbar:H2:::::\n");
    }

    #[test]
    fn test_user_record_field_count() {
        for line in example().user_records.lines() {
            assert_eq!(line.split(':').count(), 7, "{line}");
        }
    }

    #[test]
    fn test_recipients() {
        assert_eq!(
            example().recipients.render(),
            "foo@example.com\nbar@example.com\npostmaster@example.com\n"
        );
    }

    #[test]
    fn test_alias_map() {
        assert_eq!(example().alias_map.render(), "postmaster foo\n");
    }

    #[test]
    fn test_fan_in_alias_map() {
        let tables = compile(vec![
            User::new("foo", "").with_aliases(["admin"]),
            User::new("bar", "").with_aliases(["admin"]),
        ]);
        assert_eq!(tables.alias_map.render(), "admin foo,bar\n");
        assert_eq!(tables.recipients.len(), 3);
    }

    #[test]
    fn test_duplicate_alias_reproduced() {
        let tables = compile(vec![User::new("foo", "").with_aliases(["x", "x"])]);
        assert_eq!(tables.alias_map.render(), "x foo,foo\n");
        assert_eq!(
            tables.recipients.render(),
            "foo@example.com\nx@example.com\n"
        );
    }

    #[test]
    fn test_missing_hash_propagated_verbatim() {
        let tables = compile(vec![User::new("foo", "")]);
        assert_eq!(tables.credentials.render(), "foo@example.com \n");
        assert_eq!(tables.user_records.render(), "foo::::::\n");
    }

    #[test]
    fn test_empty_registry() {
        let tables = compile(Vec::new());
        for table in tables.iter() {
            assert!(table.is_empty());
            assert_eq!(table.render(), "");
        }
    }

    #[test]
    fn test_alias_colliding_with_user_listed_once() {
        let tables = compile(vec![
            User::new("foo", "H1").with_aliases(["bar"]),
            User::new("bar", "H2"),
        ]);
        assert_eq!(
            tables.recipients.render(),
            "foo@example.com\nbar@example.com\n"
        );
        assert_eq!(tables.alias_map.render(), "bar foo\n");
    }

    #[test]
    fn test_every_recipient_resolves() {
        let users = vec![
            User::new("alice", "A").with_aliases(["info", "sales"]),
            User::new("bob", "B").with_aliases(["info", "abuse"]),
            User::new("carol", "C"),
        ];
        let registry: Registry = users.into_iter().collect();
        let aliases = AliasTable::invert(&registry);
        let tables = Tables::compile(&registry, "example.com", &aliases);

        let records: Vec<&str> = tables
            .user_records
            .lines()
            .iter()
            .filter_map(|line| line.split(':').next())
            .collect();
        let alias_lines: Vec<(&str, &str)> = tables
            .alias_map
            .lines()
            .iter()
            .filter_map(|line| line.split_once(' '))
            .collect();

        for recipient in tables.recipients.lines() {
            let local = recipient.strip_suffix("@example.com").unwrap();
            if records.contains(&local) {
                continue;
            }
            let matching: Vec<_> = alias_lines.iter().filter(|(a, _)| *a == local).collect();
            assert_eq!(matching.len(), 1, "{local} should have one alias line");
            let owners = matching[0].1;
            assert!(!owners.is_empty());
            assert!(owners.split(',').all(|o| registry.contains(o)));
        }
    }
}
