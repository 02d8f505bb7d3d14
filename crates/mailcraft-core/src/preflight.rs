//! Preflight checks of collaborator-provided material
//!
//! The compiler only references certificates and keys. Before services are
//! started an operator can verify that the certificate authority and the
//! DKIM key generator did their part.

use mailcraft_common::{Config, Error, Result};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// How bad a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

/// One preflight result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
}

/// All findings of a preflight run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub findings: Vec<Finding>,
}

impl PreflightReport {
    fn push(&mut self, severity: Severity, subject: &str, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Ok => info!(subject, "{}", message),
            Severity::Warning | Severity::Error => warn!(subject, "{}", message),
        }
        self.findings.push(Finding {
            severity,
            subject: subject.to_string(),
            message,
        });
    }

    /// Worst severity found
    pub fn worst(&self) -> Severity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    /// Fail when any finding is an error
    pub fn into_result(self) -> Result<Self> {
        let errors: Vec<String> = self
            .errors()
            .map(|f| format!("{}: {}", f.subject, f.message))
            .collect();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(Error::Preflight(errors.join("; ")))
        }
    }
}

/// Run every check for a configuration
pub fn check(config: &Config) -> PreflightReport {
    let domain = config.domain();
    let mut report = PreflightReport::default();

    let registry = config.registry();
    if registry.is_empty() {
        report.push(Severity::Warning, "users", "No users configured, the mail pipeline will be disabled");
    }
    for user in registry.iter().filter(|u| u.password_hash.is_empty()) {
        report.push(
            Severity::Warning,
            "users",
            format!("User {} has no password hash and cannot authenticate", user.name),
        );
    }

    let cert_path = config.tls.cert_path(domain);
    match check_certificate(&cert_path) {
        Ok(count) => report.push(
            Severity::Ok,
            "tls certificate",
            format!("{} certificate(s) in {}", count, cert_path.display()),
        ),
        Err(message) => report.push(Severity::Error, "tls certificate", message),
    }

    let key_path = config.tls.key_path(domain);
    match check_tls_key(&key_path) {
        Ok(()) => report.push(
            Severity::Ok,
            "tls key",
            format!("Private key found in {}", key_path.display()),
        ),
        Err(message) => report.push(Severity::Error, "tls key", message),
    }

    let dkim_path = config.dkim.private_key_path(domain);
    match check_dkim_key(&dkim_path, config.dkim.key_size) {
        Ok(()) => report.push(
            Severity::Ok,
            "dkim key",
            format!("{}-bit RSA key in {}", config.dkim.key_size, dkim_path.display()),
        ),
        Err(message) => report.push(Severity::Error, "dkim key", message),
    }

    report
}

fn open(path: &Path) -> std::result::Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))
}

/// Number of certificates in a PEM chain
fn check_certificate(path: &Path) -> std::result::Result<usize, String> {
    let mut reader = open(path)?;
    let chain = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse certificates in {}: {}", path.display(), e))?;

    if chain.is_empty() {
        return Err(format!("No certificates found in {}", path.display()));
    }
    Ok(chain.len())
}

fn check_tls_key(path: &Path) -> std::result::Result<(), String> {
    let mut reader = open(path)?;
    private_key(&mut reader)
        .map_err(|e| format!("Failed to read private key {}: {}", path.display(), e))?
        .ok_or_else(|| format!("No private key found in {}", path.display()))?;
    Ok(())
}

fn check_dkim_key(path: &Path, expected_bits: u32) -> std::result::Result<(), String> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let key = parse_rsa_private_key(&pem)
        .map_err(|e| format!("Failed to parse RSA key {}: {}", path.display(), e))?;

    let bits = key.size() * 8;
    if bits != expected_bits as usize {
        return Err(format!(
            "{} holds a {}-bit key, expected {}",
            path.display(),
            bits,
            expected_bits
        ));
    }
    Ok(())
}

/// PKCS#8 first, then the PKCS#1 layout most DKIM key generators emit
fn parse_rsa_private_key(pem: &str) -> std::result::Result<RsaPrivateKey, String> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| e.to_string())
}
