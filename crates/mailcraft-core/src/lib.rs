//! mailcraft Core - mail stack configuration compiler
//!
//! Turns the user/alias model into the tables, filter rules and service
//! configurations consumed by the MTA (OpenSMTPD) and the mailbox store
//! (Dovecot). A compilation is a single synchronous pass:
//! registry, alias inversion, tables, then the smtpd and dovecot configs.

pub mod aliases;
pub mod artifact;
pub mod compiler;
pub mod dovecot;
pub mod preflight;
pub mod smtpd;
pub mod tables;

pub use aliases::AliasTable;
pub use artifact::{Artifact, Layout};
pub use compiler::{compile, Collaborators, Compilation, Pipeline};
pub use dovecot::DovecotConfig;
pub use preflight::{PreflightReport, Severity};
pub use smtpd::SmtpdConfig;
pub use tables::{ArtifactWriter, Manifest, Table, Tables};

/// Inbound SMTP port
pub const SMTP_PORT: u16 = 25;

/// Authenticated submission port
pub const SUBMISSION_PORT: u16 = 587;

/// IMAP over TLS, served by the mailbox store
pub const IMAPS_PORT: u16 = 993;

/// Loopback LMTP port shared by the MTA delivery action and the mailbox store
pub const LMTP_PORT: u16 = 24;

/// Address the LMTP listener binds to
pub const LMTP_ADDRESS: std::net::Ipv4Addr = std::net::Ipv4Addr::LOCALHOST;
