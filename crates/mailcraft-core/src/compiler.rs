//! Compilation driver
//!
//! One synchronous pass over an immutable [`Config`]: validate, invert
//! aliases, render the tables, then assemble the MTA and mailbox store
//! configurations that reference them. Nothing is written here; see
//! [`crate::tables::ArtifactWriter`].

use crate::aliases::AliasTable;
use crate::artifact::{Artifact, Layout};
use crate::dovecot::{self, DovecotConfig};
use crate::smtpd::{sanity, SmtpdConfig};
use crate::tables::Tables;
use crate::{IMAPS_PORT, SMTP_PORT, SUBMISSION_PORT};
use mailcraft_common::{Config, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What external collaborators must provide or do for the compiled
/// configuration to work. Recorded, never acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborators {
    /// Full chain the certificate authority keeps current
    pub tls_certificate: PathBuf,
    pub tls_key: PathBuf,
    /// Key the DKIM key generator must create before the outbound chain starts
    pub dkim_private_key: PathBuf,
    pub dkim_selector: String,
    pub dkim_key_size: u32,
    /// Ports to open at the network boundary
    pub open_ports: Vec<u16>,
}

impl Collaborators {
    fn from_config(config: &Config) -> Self {
        let domain = config.domain();
        Self {
            tls_certificate: config.tls.cert_path(domain),
            tls_key: config.tls.key_path(domain),
            dkim_private_key: config.dkim.private_key_path(domain),
            dkim_selector: config.dkim.selector.clone(),
            dkim_key_size: config.dkim.key_size,
            open_ports: vec![SMTP_PORT, SUBMISSION_PORT, IMAPS_PORT],
        }
    }
}

/// Service configurations, only produced when there are users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub smtpd: SmtpdConfig,
    pub dovecot: DovecotConfig,
}

/// Result of a compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compilation {
    pub domain: String,
    pub users: usize,
    pub aliases: AliasTable,
    pub tables: Tables,
    pub header_rules: String,
    pub spam_sieve: String,
    pub pipeline: Option<Pipeline>,
    pub collaborators: Collaborators,
}

impl Compilation {
    /// Rendered contents of an artifact, `None` when this compilation does
    /// not produce it
    pub fn render(&self, artifact: Artifact) -> Option<String> {
        match artifact {
            Artifact::Credentials
            | Artifact::UserRecords
            | Artifact::Recipients
            | Artifact::AliasMap => self.tables.get(artifact).map(|t| t.render()),
            Artifact::HeaderRules => Some(self.header_rules.clone()),
            Artifact::SpamSieve => Some(self.spam_sieve.clone()),
            Artifact::Smtpd => self.pipeline.as_ref().map(|p| p.smtpd.render()),
            Artifact::Dovecot => self.pipeline.as_ref().map(|p| p.dovecot.render()),
        }
    }

    /// Every produced artifact with its contents, in write order
    pub fn rendered(&self) -> Vec<(Artifact, String)> {
        Artifact::ALL
            .iter()
            .filter_map(|&artifact| self.render(artifact).map(|c| (artifact, c)))
            .collect()
    }
}

/// Compile a configuration.
///
/// Fails without producing anything when the configuration is invalid.
/// An empty registry compiles to empty tables with the pipeline disabled.
pub fn compile(config: &Config) -> Result<Compilation> {
    config.validate()?;

    let domain = config.domain();
    let registry = config.registry();
    let aliases = AliasTable::invert(&registry);
    let tables = Tables::compile(&registry, domain, &aliases);
    debug!(
        users = registry.len(),
        aliases = aliases.len(),
        recipients = tables.recipients.len(),
        "Compiled tables"
    );

    let header_rules = sanity::render(&sanity::default_rules())?;
    let spam_sieve = dovecot::spam_sieve();

    let pipeline = if registry.is_empty() {
        warn!(domain, "No users configured, mail pipeline disabled");
        None
    } else {
        let layout = Layout::new(config.output.reference_directory());
        Some(Pipeline {
            smtpd: SmtpdConfig::assemble(config, &layout)?,
            dovecot: DovecotConfig::assemble(config, &layout)?,
        })
    };

    info!(
        domain,
        users = registry.len(),
        pipeline = pipeline.is_some(),
        "Compilation complete"
    );

    Ok(Compilation {
        domain: domain.to_string(),
        users: registry.len(),
        aliases,
        tables,
        header_rules,
        spam_sieve,
        pipeline,
        collaborators: Collaborators::from_config(config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcraft_common::{Error, User};
    use pretty_assertions::assert_eq;

    fn example() -> Config {
        Config::new(
            "example.com",
            vec![
                User::new("foo", "H1").with_aliases(["postmaster"]),
                User::new("bar", "H2"),
            ],
        )
    }

    #[test]
    fn test_example_scenario() {
        let compilation = compile(&example()).unwrap();

        assert_eq!(
            compilation.render(Artifact::Credentials).unwrap(),
            "foo@example.com H1\nbar@example.com H2\n"
        );
        assert_eq!(
            compilation.render(Artifact::UserRecords).unwrap(),
            "foo:H1:::::\nbar:H2:::::\n"
        );
        assert_eq!(
            compilation.render(Artifact::Recipients).unwrap(),
            "foo@example.com\nbar@example.com\npostmaster@example.com\n"
        );
        assert_eq!(
            compilation.render(Artifact::AliasMap).unwrap(),
            "postmaster foo\n"
        );
        assert!(compilation.pipeline.is_some());
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let first = compile(&example()).unwrap();
        let second = compile(&example()).unwrap();
        assert_eq!(first.rendered(), second.rendered());
    }

    #[test]
    fn test_empty_registry() {
        let compilation = compile(&Config::new("example.com", Vec::new())).unwrap();

        for artifact in [
            Artifact::Credentials,
            Artifact::UserRecords,
            Artifact::Recipients,
            Artifact::AliasMap,
        ] {
            assert_eq!(compilation.render(artifact).unwrap(), "");
        }
        assert!(compilation.pipeline.is_none());
        assert!(compilation.render(Artifact::Smtpd).is_none());
        assert!(compilation.render(Artifact::Dovecot).is_none());
    }

    #[test]
    fn test_empty_domain_aborts() {
        let config = Config::new("", vec![User::new("foo", "H1")]);
        assert!(matches!(compile(&config), Err(Error::Validation(_))));
    }

    #[test]
    fn test_quoted_domain_aborts() {
        let config = Config::new("ex\"a\"mple.com", vec![User::new("foo", "H1")]);
        assert!(matches!(compile(&config), Err(Error::Validation(_))));
    }

    #[test]
    fn test_pipeline_references_tables() {
        let compilation = compile(&example()).unwrap();
        let smtpd = compilation.render(Artifact::Smtpd).unwrap();
        let dovecot = compilation.render(Artifact::Dovecot).unwrap();

        for artifact in [Artifact::Credentials, Artifact::Recipients, Artifact::AliasMap] {
            let path = format!("/etc/mailcraft/{}", artifact.file_name());
            assert!(smtpd.contains(&path), "smtpd.conf should reference {path}");
        }
        assert!(dovecot.contains("/etc/mailcraft/users"));
    }

    #[test]
    fn test_collaborators() {
        let compilation = compile(&example()).unwrap();
        assert_eq!(
            compilation.collaborators.dkim_private_key,
            PathBuf::from("/var/dkim/example.com/default.private")
        );
        assert_eq!(compilation.collaborators.dkim_key_size, 2048);
        assert_eq!(compilation.collaborators.open_ports, vec![25, 587, 993]);
    }
}
