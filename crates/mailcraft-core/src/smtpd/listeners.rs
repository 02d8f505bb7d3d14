//! Listener matrix: one IPv4 and one IPv6 socket per role

use super::filters::{INBOUND_CHAIN, OUTBOUND_CHAIN};
use super::quoted;
use crate::{SMTP_PORT, SUBMISSION_PORT};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Wildcard addresses, IPv4 first
pub const BIND_ADDRESSES: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    IpAddr::V6(Ipv6Addr::UNSPECIFIED),
];

/// What a listener is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Mail from other servers, opportunistic TLS
    Inbound,
    /// Authenticated submission from users, TLS required
    Submission,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Inbound, Role::Submission];

    pub fn port(&self) -> u16 {
        match self {
            Role::Inbound => SMTP_PORT,
            Role::Submission => SUBMISSION_PORT,
        }
    }

    pub fn tls(&self) -> TlsMode {
        match self {
            Role::Inbound => TlsMode::Opportunistic,
            Role::Submission => TlsMode::Required,
        }
    }

    pub fn filter_chain(&self) -> &'static str {
        match self {
            Role::Inbound => INBOUND_CHAIN,
            Role::Submission => OUTBOUND_CHAIN,
        }
    }
}

/// STARTTLS policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Opportunistic,
    Required,
}

impl TlsMode {
    fn keyword(&self) -> &'static str {
        match self {
            TlsMode::Opportunistic => "tls",
            TlsMode::Required => "tls-require",
        }
    }
}

/// `listen on <address> port <port> ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub role: Role,
    pub address: IpAddr,
    pub pki: String,
    /// Credentials table checked on AUTH
    pub auth_table: Option<String>,
}

impl Listener {
    pub fn port(&self) -> u16 {
        self.role.port()
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listen on {} port {} {} pki {}",
            self.address,
            self.port(),
            self.role.tls().keyword(),
            quoted(&self.pki)
        )?;
        if let Some(table) = &self.auth_table {
            write!(f, " auth <{}>", table)?;
        }
        write!(f, " filter {}", quoted(self.role.filter_chain()))
    }
}

/// Listeners for every role and address family. Submission listeners
/// authenticate against `credentials_table`.
pub fn listeners(pki: &str, credentials_table: &str) -> Vec<Listener> {
    Role::ALL
        .iter()
        .flat_map(|&role| {
            BIND_ADDRESSES.iter().map(move |&address| Listener {
                role,
                address,
                pki: pki.to_string(),
                auth_table: match role {
                    Role::Inbound => None,
                    Role::Submission => Some(credentials_table.to_string()),
                },
            })
        })
        .collect()
}
