//! Mailbox store configuration
//!
//! Dovecot authenticates against the user records table (as both passdb
//! and userdb), accepts mail from the MTA over loopback LMTP, files spam
//! with a sieve-before script and serves IMAP over TLS.

pub mod mailboxes;
pub mod sieve;

pub use mailboxes::{AutoPolicy, SpecialMailbox, SPAM_MAILBOX, SPECIAL_MAILBOXES};
pub use sieve::{spam_sieve, SPAM_FLAG_HEADER};

use crate::artifact::{Artifact, Layout};
use crate::{IMAPS_PORT, LMTP_ADDRESS, LMTP_PORT};
use mailcraft_common::{Config, EmailAddress, Error, Result};
use std::path::PathBuf;
use tracing::debug;

/// A setting or a nested section of dovecot.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Setting {
        key: String,
        value: String,
    },
    Section {
        kind: String,
        name: Option<String>,
        body: Vec<Node>,
    },
}

impl Node {
    pub fn setting(key: &str, value: impl Into<String>) -> Self {
        Node::Setting {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn section(kind: &str, name: Option<&str>, body: Vec<Node>) -> Self {
        Node::Section {
            kind: kind.to_string(),
            name: name.map(str::to_string),
            body,
        }
    }

    /// Render with two spaces of indentation per level
    pub fn render(&self, depth: usize) -> String {
        let indent = "  ".repeat(depth);
        match self {
            Node::Setting { key, value } => format!("{}{} = {}\n", indent, key, value),
            Node::Section { kind, name, body } => {
                let mut out = match name {
                    Some(name) => format!("{}{} {} {{\n", indent, kind, name),
                    None => format!("{}{} {{\n", indent, kind),
                };
                for node in body {
                    out.push_str(&node.render(depth + 1));
                }
                out.push_str(&indent);
                out.push_str("}\n");
                out
            }
        }
    }

    fn has_line_break(&self) -> bool {
        match self {
            Node::Setting { key, value } => key.contains('\n') || value.contains('\n'),
            Node::Section { kind, name, body } => {
                kind.contains('\n')
                    || name.as_deref().is_some_and(|n| n.contains('\n'))
                    || body.iter().any(Node::has_line_break)
            }
        }
    }
}

/// Assembled dovecot.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DovecotConfig {
    domain: String,
    nodes: Vec<Node>,
}

impl DovecotConfig {
    /// Assemble the mailbox store configuration
    pub fn assemble(config: &Config, layout: &Layout) -> Result<Self> {
        let domain = config.domain();
        let vmail = &config.vmail;
        let mailbox_root = vmail.root.join(domain).join("%n");
        let user_records = layout.path(Artifact::UserRecords);

        let nodes = vec![
            Node::setting("protocols", "imap lmtp"),
            Node::setting("postmaster_address", EmailAddress::postmaster(domain).to_string()),
            Node::setting("mail_location", format!("maildir:{}", mailbox_root.display())),
            Node::setting("mail_uid", vmail.user.as_str()),
            Node::setting("mail_gid", vmail.group.as_str()),
            Node::setting("first_valid_uid", vmail.uid.to_string()),
            Node::setting("last_valid_uid", vmail.uid.to_string()),
            Node::setting("ssl", "required"),
            Node::setting("ssl_cert", file_ref(config.tls.cert_path(domain))),
            Node::setting("ssl_key", file_ref(config.tls.key_path(domain))),
            Node::setting("disable_plaintext_auth", "yes"),
            Node::setting("auth_mechanisms", "plain login"),
            Node::section(
                "passdb",
                None,
                vec![
                    Node::setting("driver", "passwd-file"),
                    Node::setting(
                        "args",
                        format!("scheme=CRYPT username_format=%n {}", user_records.display()),
                    ),
                ],
            ),
            Node::section(
                "userdb",
                None,
                vec![
                    Node::setting("driver", "passwd-file"),
                    Node::setting(
                        "args",
                        format!("username_format=%n {}", user_records.display()),
                    ),
                    Node::setting(
                        "default_fields",
                        format!(
                            "uid={} gid={} home={}",
                            vmail.uid,
                            vmail.gid,
                            mailbox_root.display()
                        ),
                    ),
                ],
            ),
            Node::section(
                "service",
                Some("imap-login"),
                vec![
                    Node::section("inet_listener", Some("imap"), vec![Node::setting("port", "0")]),
                    Node::section(
                        "inet_listener",
                        Some("imaps"),
                        vec![
                            Node::setting("port", IMAPS_PORT.to_string()),
                            Node::setting("ssl", "yes"),
                        ],
                    ),
                ],
            ),
            Node::section(
                "service",
                Some("lmtp"),
                vec![Node::section(
                    "inet_listener",
                    Some("lmtp"),
                    vec![
                        Node::setting("address", LMTP_ADDRESS.to_string()),
                        Node::setting("port", LMTP_PORT.to_string()),
                    ],
                )],
            ),
            Node::section(
                "protocol",
                Some("lmtp"),
                vec![Node::setting("mail_plugins", "$mail_plugins sieve")],
            ),
            Node::section(
                "plugin",
                None,
                vec![Node::setting(
                    "sieve_before",
                    layout.path(Artifact::SpamSieve).display().to_string(),
                )],
            ),
            mailboxes::inbox_namespace(),
        ];

        if let Some(node) = nodes.iter().find(|n| n.has_line_break()) {
            return Err(Error::Render(format!(
                "Line break in dovecot setting: {:?}",
                node
            )));
        }

        debug!(nodes = nodes.len(), "Assembled dovecot configuration");
        Ok(Self {
            domain: domain.to_string(),
            nodes,
        })
    }

    /// Render the configuration file
    pub fn render(&self) -> String {
        let mut out = format!("# Generated by mailcraft for {}. Do not edit.\n\n", self.domain);
        for node in &self.nodes {
            out.push_str(&node.render(0));
        }
        out
    }
}

/// `<path`, dovecot's syntax for reading a value from a file
fn file_ref(path: PathBuf) -> String {
    format!("<{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcraft_common::User;
    use pretty_assertions::assert_eq;

    fn assemble() -> DovecotConfig {
        let config = Config::new("example.com", vec![User::new("foo", "H1")]);
        DovecotConfig::assemble(&config, &Layout::new("/etc/mailcraft")).unwrap()
    }

    #[test]
    fn test_render_head() {
        let rendered = assemble().render();
        let expected_head = "# Generated by mailcraft for example.com. Do not edit.

protocols = imap lmtp
postmaster_address = postmaster@example.com
mail_location = maildir:/var/vmail/example.com/%n
mail_uid = vmail
mail_gid = vmail
first_valid_uid = 5000
last_valid_uid = 5000
ssl = required
ssl_cert = </var/lib/acme/example.com/fullchain.pem
ssl_key = </var/lib/acme/example.com/key.pem
";
        assert_eq!(&rendered[..expected_head.len()], expected_head);
    }

    #[test]
    fn test_auth_uses_user_records_for_both_roles() {
        let rendered = assemble().render();
        assert!(rendered.contains(
            "passdb {\n  driver = passwd-file\n  args = scheme=CRYPT username_format=%n /etc/mailcraft/users\n}\n"
        ));
        assert!(rendered.contains(
            "userdb {\n  driver = passwd-file\n  args = username_format=%n /etc/mailcraft/users\n  default_fields = uid=5000 gid=5000 home=/var/vmail/example.com/%n\n}\n"
        ));
    }

    #[test]
    fn test_lmtp_listener_on_loopback() {
        let rendered = assemble().render();
        assert!(rendered.contains(
            "service lmtp {\n  inet_listener lmtp {\n    address = 127.0.0.1\n    port = 24\n  }\n}\n"
        ));
    }

    #[test]
    fn test_sieve_hook() {
        let rendered = assemble().render();
        assert!(rendered.contains("protocol lmtp {\n  mail_plugins = $mail_plugins sieve\n}\n"));
        assert!(rendered.contains("plugin {\n  sieve_before = /etc/mailcraft/spam.sieve\n}\n"));
    }

    #[test]
    fn test_line_break_is_rejected() {
        let mut config = Config::new("example.com", vec![User::new("foo", "H1")]);
        config.vmail.user = "vmail\nevil".to_string();
        let result = DovecotConfig::assemble(&config, &Layout::new("/etc/mailcraft"));
        assert!(matches!(result, Err(Error::Render(_))));
    }
}
