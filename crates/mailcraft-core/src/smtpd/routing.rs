//! Delivery actions and match rules

use super::quoted;
use std::fmt;
use std::net::SocketAddr;

/// Action name for local delivery
pub const DELIVER_ACTION: &str = "deliver";

/// Action name for outgoing relay
pub const RELAY_ACTION: &str = "relay";

/// How an action disposes of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Hand off to the mailbox store over LMTP, expanding aliases first
    Lmtp {
        destination: SocketAddr,
        alias_table: String,
    },
    /// Relay to the recipient's MX
    Relay,
}

/// `action "<name>" <method>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: &'static str,
    pub method: Method,
}

impl Action {
    pub fn deliver(destination: SocketAddr, alias_table: &str) -> Self {
        Self {
            name: DELIVER_ACTION,
            method: Method::Lmtp {
                destination,
                alias_table: alias_table.to_string(),
            },
        }
    }

    pub fn relay() -> Self {
        Self {
            name: RELAY_ACTION,
            method: Method::Relay,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action {} ", quoted(self.name))?;
        match &self.method {
            Method::Lmtp {
                destination,
                alias_table,
            } => write!(
                f,
                "lmtp {} alias <{}>",
                quoted(&destination.to_string()),
                alias_table
            ),
            Method::Relay => f.write_str("relay"),
        }
    }
}

/// Where a message comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Any,
    Local,
}

/// Who a message is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The served domain, restricted to the recipient allow-list
    Domain {
        domain: String,
        recipients_table: String,
    },
    Any,
}

/// `match from <origin> for <destination> action "<name>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub origin: Origin,
    pub destination: Destination,
    pub action: &'static str,
}

impl MatchRule {
    /// Accept mail for the domain when the recipient is on the allow-list
    pub fn local_delivery(domain: &str, recipients_table: &str) -> Self {
        Self {
            origin: Origin::Any,
            destination: Destination::Domain {
                domain: domain.to_string(),
                recipients_table: recipients_table.to_string(),
            },
            action: DELIVER_ACTION,
        }
    }

    /// Relay anything that originates locally
    pub fn local_relay() -> Self {
        Self {
            origin: Origin::Local,
            destination: Destination::Any,
            action: RELAY_ACTION,
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.origin {
            Origin::Any => "any",
            Origin::Local => "local",
        };
        write!(f, "match from {} for ", origin)?;
        match &self.destination {
            Destination::Domain {
                domain,
                recipients_table,
            } => write!(
                f,
                "domain {} rcpt-to <{}>",
                quoted(domain),
                recipients_table
            )?,
            Destination::Any => f.write_str("any")?,
        }
        write!(f, " action {}", quoted(self.action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LMTP_ADDRESS, LMTP_PORT};

    #[test]
    fn test_actions() {
        let lmtp = SocketAddr::from((LMTP_ADDRESS, LMTP_PORT));
        assert_eq!(
            Action::deliver(lmtp, "aliases").to_string(),
            r#"action "deliver" lmtp "127.0.0.1:24" alias <aliases>"#
        );
        assert_eq!(Action::relay().to_string(), r#"action "relay" relay"#);
    }

    #[test]
    fn test_match_rules() {
        assert_eq!(
            MatchRule::local_delivery("example.com", "recipients").to_string(),
            r#"match from any for domain "example.com" rcpt-to <recipients> action "deliver""#
        );
        assert_eq!(
            MatchRule::local_relay().to_string(),
            r#"match from local for any action "relay""#
        );
    }
}
