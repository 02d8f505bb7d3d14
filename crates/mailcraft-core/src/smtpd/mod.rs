//! MTA configuration assembly
//!
//! Builds the OpenSMTPD configuration as an ordered list of statements:
//! certificates, tables, filters and chains, listeners, actions and match
//! rules. Table and certificate paths are referenced, never opened; the MTA
//! reports unusable paths at its own startup.

pub mod filters;
pub mod listeners;
pub mod routing;
pub mod sanity;

pub use filters::{Filter, FilterChain, FilterContext, FilterStage};
pub use listeners::{Listener, Role, TlsMode};
pub use routing::{Action, Destination, MatchRule};

use crate::artifact::{Artifact, Layout};
use crate::{LMTP_ADDRESS, LMTP_PORT};
use mailcraft_common::{Config, Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::debug;

/// Which half of a certificate pair a `pki` statement names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiPart {
    Cert,
    Key,
}

/// One line of smtpd.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Pki {
        name: String,
        part: PkiPart,
        path: PathBuf,
    },
    Table {
        name: &'static str,
        path: PathBuf,
    },
    Filter(Filter),
    Chain(FilterChain),
    Listen(Listener),
    Action(Action),
    Match(MatchRule),
}

impl Statement {
    /// Statements of the same group are rendered without a blank line
    /// between them
    fn group(&self) -> u8 {
        match self {
            Statement::Pki { .. } => 0,
            Statement::Table { .. } => 1,
            Statement::Filter(_) | Statement::Chain(_) => 2,
            Statement::Listen(_) => 3,
            Statement::Action(_) => 4,
            Statement::Match(_) => 5,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Pki { name, part, path } => {
                let part = match part {
                    PkiPart::Cert => "cert",
                    PkiPart::Key => "key",
                };
                write!(
                    f,
                    "pki {} {} {}",
                    quoted(name),
                    part,
                    quoted(&path.display().to_string())
                )
            }
            Statement::Table { name, path } => write!(
                f,
                "table {} {}",
                name,
                quoted(&format!("file:{}", path.display()))
            ),
            Statement::Filter(filter) => fmt::Display::fmt(filter, f),
            Statement::Chain(chain) => fmt::Display::fmt(chain, f),
            Statement::Listen(listener) => fmt::Display::fmt(listener, f),
            Statement::Action(action) => fmt::Display::fmt(action, f),
            Statement::Match(rule) => fmt::Display::fmt(rule, f),
        }
    }
}

/// Assembled smtpd.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpdConfig {
    domain: String,
    statements: Vec<Statement>,
}

impl SmtpdConfig {
    /// Assemble the MTA configuration for `config`, referencing the
    /// artifacts at their `layout` locations
    pub fn assemble(config: &Config, layout: &Layout) -> Result<Self> {
        let domain = config.domain();
        let table_name = |artifact: Artifact| {
            artifact
                .table_name()
                .ok_or_else(|| Error::Render(format!("{} is not an smtpd table", artifact)))
        };
        let credentials = table_name(Artifact::Credentials)?;
        let recipients = table_name(Artifact::Recipients)?;
        let aliases = table_name(Artifact::AliasMap)?;

        let mut statements = vec![
            Statement::Pki {
                name: domain.to_string(),
                part: PkiPart::Cert,
                path: config.tls.cert_path(domain),
            },
            Statement::Pki {
                name: domain.to_string(),
                part: PkiPart::Key,
                path: config.tls.key_path(domain),
            },
        ];

        for artifact in [Artifact::Credentials, Artifact::Recipients, Artifact::AliasMap] {
            statements.push(Statement::Table {
                name: table_name(artifact)?,
                path: layout.path(artifact),
            });
        }

        let header_rules = layout.path(Artifact::HeaderRules);
        let ctx = FilterContext {
            domain,
            dkim: &config.dkim,
            header_rules: &header_rules,
        };
        for stage in FilterStage::INBOUND.iter().chain(FilterStage::OUTBOUND.iter()) {
            statements.push(Statement::Filter(Filter::for_stage(*stage, &ctx)));
        }
        statements.push(Statement::Chain(FilterChain::inbound()));
        statements.push(Statement::Chain(FilterChain::outbound()));

        statements.extend(
            listeners::listeners(domain, credentials)
                .into_iter()
                .map(Statement::Listen),
        );

        let lmtp = SocketAddr::from((LMTP_ADDRESS, LMTP_PORT));
        statements.push(Statement::Action(Action::deliver(lmtp, aliases)));
        statements.push(Statement::Action(Action::relay()));
        statements.push(Statement::Match(MatchRule::local_delivery(domain, recipients)));
        statements.push(Statement::Match(MatchRule::local_relay()));

        let assembled = Self {
            domain: domain.to_string(),
            statements,
        };
        assembled.check_quoted_values()?;

        debug!(statements = assembled.statements.len(), "Assembled smtpd configuration");
        Ok(assembled)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Render the configuration file
    pub fn render(&self) -> String {
        let mut out = format!("# Generated by mailcraft for {}. Do not edit.\n", self.domain);
        let mut group = None;
        for statement in &self.statements {
            if group != Some(statement.group()) {
                out.push('\n');
                group = Some(statement.group());
            }
            out.push_str(&statement.to_string());
            out.push('\n');
        }
        out
    }

    /// Every value a statement wraps in quotes: the domain, pki and
    /// table paths, and the filter command lines
    fn quoted_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        for statement in &self.statements {
            match statement {
                Statement::Pki { name, path, .. } => {
                    values.push(name.clone());
                    values.push(path.display().to_string());
                }
                Statement::Table { path, .. } => values.push(path.display().to_string()),
                Statement::Filter(filter) => values.push(filter.command.clone()),
                Statement::Match(MatchRule {
                    destination: Destination::Domain { domain, .. },
                    ..
                }) => values.push(domain.clone()),
                _ => {}
            }
        }
        values
    }

    /// Quoted strings cannot contain quotes or line breaks
    fn check_quoted_values(&self) -> Result<()> {
        for value in self.quoted_values() {
            if value.contains(['"', '\n', '\r']) {
                return Err(Error::Render(format!(
                    "Cannot quote value in smtpd configuration: {:?}",
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Wrap a value in double quotes
pub(crate) fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}
