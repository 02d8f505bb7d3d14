//! Output files produced by a compilation and where they live

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Every file a compilation can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// `<user>@<domain> <hash>` for SMTP submission auth
    Credentials,
    /// `<user>:<hash>:::::` for mailbox auth
    UserRecords,
    /// Recipient allow-list
    Recipients,
    /// Alias expansion table
    AliasMap,
    /// Static HELO and envelope sanity rules for `filter-regex`
    HeaderRules,
    /// Static sieve script filing spam
    SpamSieve,
    /// MTA configuration
    Smtpd,
    /// Mailbox store configuration
    Dovecot,
}

impl Artifact {
    /// All artifacts in write order
    pub const ALL: [Artifact; 8] = [
        Artifact::Credentials,
        Artifact::UserRecords,
        Artifact::Recipients,
        Artifact::AliasMap,
        Artifact::HeaderRules,
        Artifact::SpamSieve,
        Artifact::Smtpd,
        Artifact::Dovecot,
    ];

    /// File name inside the output directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Credentials => "credentials",
            Artifact::UserRecords => "users",
            Artifact::Recipients => "recipients",
            Artifact::AliasMap => "aliases",
            Artifact::HeaderRules => "filter-regex.conf",
            Artifact::SpamSieve => "spam.sieve",
            Artifact::Smtpd => "smtpd.conf",
            Artifact::Dovecot => "dovecot.conf",
        }
    }

    /// Name of the table when referenced from smtpd.conf
    pub fn table_name(&self) -> Option<&'static str> {
        match self {
            Artifact::Credentials => Some("credentials"),
            Artifact::Recipients => Some("recipients"),
            Artifact::AliasMap => Some("aliases"),
            _ => None,
        }
    }

    /// Whether the file holds password hashes
    pub fn is_secret(&self) -> bool {
        matches!(self, Artifact::Credentials | Artifact::UserRecords)
    }

    /// Unix permission bits for the written file
    pub fn mode(&self) -> u32 {
        if self.is_secret() {
            0o640
        } else {
            0o644
        }
    }

    /// Parse a name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "credentials" => Some(Artifact::Credentials),
            "users" | "user-records" => Some(Artifact::UserRecords),
            "recipients" => Some(Artifact::Recipients),
            "aliases" | "alias-map" => Some(Artifact::AliasMap),
            "regex" | "header-rules" | "filter-regex.conf" => Some(Artifact::HeaderRules),
            "sieve" | "spam-sieve" | "spam.sieve" => Some(Artifact::SpamSieve),
            "smtpd" | "smtpd.conf" => Some(Artifact::Smtpd),
            "dovecot" | "dovecot.conf" => Some(Artifact::Dovecot),
            _ => None,
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Locations artifacts are referenced at by the generated configurations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    directory: PathBuf,
}

impl Layout {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path of an artifact
    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.directory.join(artifact.file_name())
    }
}
