//! Configuration for mailcraft
//!
//! The whole input of a compilation lives in one immutable [`Config`]
//! value, built once at startup and handed by reference to every stage.

use crate::types::{Registry, User};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides, e.g. `MAILCRAFT__MAIL__DOMAIN`
pub const ENV_PREFIX: &str = "MAILCRAFT";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Domain and user registry
    pub mail: MailConfig,

    /// Mailbox store system account
    #[serde(default)]
    pub vmail: VmailConfig,

    /// DKIM signing parameters
    #[serde(default)]
    pub dkim: DkimConfig,

    /// Certificate locations provided by the certificate authority
    #[serde(default)]
    pub tls: TlsConfig,

    /// Where compiled artifacts go
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Mail domain and users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Domain served by this stack
    pub domain: String,

    /// Users in declaration order
    #[serde(default)]
    pub users: Vec<User>,
}

/// System account owning the mailboxes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmailConfig {
    #[serde(default = "default_vmail_name")]
    pub user: String,

    #[serde(default = "default_vmail_name")]
    pub group: String,

    #[serde(default = "default_vmail_id")]
    pub uid: u32,

    #[serde(default = "default_vmail_id")]
    pub gid: u32,

    /// Root directory of all maildirs
    #[serde(default = "default_vmail_root")]
    pub root: PathBuf,
}

impl Default for VmailConfig {
    fn default() -> Self {
        Self {
            user: default_vmail_name(),
            group: default_vmail_name(),
            uid: default_vmail_id(),
            gid: default_vmail_id(),
            root: default_vmail_root(),
        }
    }
}

fn default_vmail_name() -> String {
    "vmail".to_string()
}

fn default_vmail_id() -> u32 {
    5000
}

fn default_vmail_root() -> PathBuf {
    PathBuf::from("/var/vmail")
}

/// DKIM parameters, passed through to the signer and key generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkimConfig {
    /// Directory holding `<domain>/<selector>.private`
    #[serde(default = "default_dkim_directory")]
    pub directory: PathBuf,

    /// Selector (s= tag)
    #[serde(default = "default_dkim_selector")]
    pub selector: String,

    /// RSA key size in bits
    #[serde(default = "default_dkim_key_size")]
    pub key_size: u32,
}

impl Default for DkimConfig {
    fn default() -> Self {
        Self {
            directory: default_dkim_directory(),
            selector: default_dkim_selector(),
            key_size: default_dkim_key_size(),
        }
    }
}

impl DkimConfig {
    /// Path of the private key the key generator must provide
    pub fn private_key_path(&self, domain: &str) -> PathBuf {
        self.directory
            .join(domain)
            .join(format!("{}.private", self.selector))
    }
}

fn default_dkim_directory() -> PathBuf {
    PathBuf::from("/var/dkim")
}

fn default_dkim_selector() -> String {
    "default".to_string()
}

fn default_dkim_key_size() -> u32 {
    2048
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Directory with one `<domain>/` entry per certificate
    #[serde(default = "default_tls_root")]
    pub root: PathBuf,

    /// Full chain file name inside the domain directory
    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    /// Private key file name inside the domain directory
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            root: default_tls_root(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

impl TlsConfig {
    /// Path to the certificate chain for a domain
    pub fn cert_path(&self, domain: &str) -> PathBuf {
        self.root.join(domain).join(&self.cert_file)
    }

    /// Path to the private key for a domain
    pub fn key_path(&self, domain: &str) -> PathBuf {
        self.root.join(domain).join(&self.key_file)
    }
}

fn default_tls_root() -> PathBuf {
    PathBuf::from("/var/lib/acme")
}

fn default_cert_file() -> String {
    "fullchain.pem".to_string()
}

fn default_key_file() -> String {
    "key.pem".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the artifacts are written to
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Directory the generated configs refer to, when artifacts are staged
    /// somewhere else and installed later
    pub install_directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            install_directory: None,
        }
    }
}

impl OutputConfig {
    /// Directory used when generated configs reference an artifact
    pub fn reference_directory(&self) -> &Path {
        self.install_directory.as_deref().unwrap_or(&self.directory)
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("/etc/mailcraft")
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Build a configuration for a domain and users with every other
    /// section at its default
    pub fn new(domain: impl Into<String>, users: Vec<User>) -> Self {
        Self {
            mail: MailConfig {
                domain: domain.into(),
                users,
            },
            vmail: VmailConfig::default(),
            dkim: DkimConfig::default(),
            tls: TlsConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a file layered with `MAILCRAFT__*`
    /// environment overrides. Without an explicit path the default
    /// locations are searched.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::find_default()?,
        };
        Self::load_layered(&path, None)
    }

    /// Layer `path` with overrides taken from `env`, or from the process
    /// environment when `env` is `None`
    fn load_layered(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(env),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    fn find_default() -> Result<PathBuf> {
        let paths = [
            PathBuf::from("./mailcraft.toml"),
            PathBuf::from("/etc/mailcraft/config.toml"),
        ];

        paths
            .into_iter()
            .find(|path| path.exists())
            .ok_or_else(|| Error::Config("No configuration file found".to_string()))
    }

    /// Served domain
    pub fn domain(&self) -> &str {
        &self.mail.domain
    }

    /// Build the ordered user registry; a repeated name replaces the
    /// earlier definition
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        for user in &self.mail.users {
            if registry.insert(user.clone()).is_some() {
                debug!(user = %user.name, "User defined more than once, keeping the last definition");
            }
        }
        registry
    }

    /// Check everything a compilation depends on
    pub fn validate(&self) -> Result<()> {
        let domain = self.domain();
        if domain.is_empty() {
            return Err(Error::Validation("mail.domain must not be empty".to_string()));
        }
        if !is_hostname(domain) {
            return Err(Error::Validation(format!(
                "mail.domain {:?} is not a domain name",
                domain
            )));
        }
        if self.dkim.selector.is_empty() {
            return Err(Error::Validation("dkim.selector must not be empty".to_string()));
        }
        if !is_hostname(&self.dkim.selector) {
            return Err(Error::Validation(format!(
                "dkim.selector {:?} is not a valid selector",
                self.dkim.selector
            )));
        }
        if self.dkim.key_size == 0 {
            return Err(Error::Validation("dkim.key_size must be positive".to_string()));
        }

        self.registry().validate()
    }
}

/// Dot-separated labels of ASCII letters, digits and hyphens. The value is
/// quoted into smtpd statements and joined into TLS and DKIM key paths.
fn is_hostname(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
[mail]
domain = "example.com"

[[mail.users]]
name = "foo"
password_hash = "H1"
aliases = ["postmaster"]

[[mail.users]]
name = "bar"
password_hash = "H2"

[dkim]
key_size = 4096
"#;

    #[test]
    fn test_default_config() {
        let vmail = VmailConfig::default();
        assert_eq!(vmail.user, "vmail");
        assert_eq!(vmail.uid, 5000);

        let dkim = DkimConfig::default();
        assert_eq!(dkim.key_size, 2048);
        assert_eq!(dkim.selector, "default");
        assert_eq!(
            dkim.private_key_path("example.com"),
            PathBuf::from("/var/dkim/example.com/default.private")
        );
    }

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.domain(), "example.com");
        assert_eq!(config.mail.users.len(), 2);
        assert_eq!(config.mail.users[0].aliases, vec!["postmaster"]);
        assert_eq!(config.dkim.key_size, 4096);
        assert_eq!(config.output.directory, PathBuf::from("/etc/mailcraft"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_registry_follows_declaration_order() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let names: Vec<String> = config.registry().iter().map(|u| u.name.clone()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[test]
    fn test_empty_domain_is_fatal() {
        let config = Config::new("", vec![User::new("foo", "H1")]);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let config = Config::new("example.com", Vec::new());
        assert!(config.validate().is_ok());
        assert!(config.registry().is_empty());
    }

    #[test]
    fn test_tls_paths_are_domain_keyed() {
        let tls = TlsConfig::default();
        assert_eq!(
            tls.cert_path("example.com"),
            PathBuf::from("/var/lib/acme/example.com/fullchain.pem")
        );
        assert_eq!(
            tls.key_path("example.com"),
            PathBuf::from("/var/lib/acme/example.com/key.pem")
        );
    }

    #[test]
    fn test_reference_directory_prefers_install_directory() {
        let mut output = OutputConfig::default();
        assert_eq!(output.reference_directory(), Path::new("/etc/mailcraft"));

        output.install_directory = Some(PathBuf::from("/run/mailcraft"));
        assert_eq!(output.reference_directory(), Path::new("/run/mailcraft"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.domain(), "example.com");
        assert_eq!(config.mail.users[1].name, "bar");
    }

    fn overrides(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[mail]
domain = "example.com"

[[mail.users]]
name = "Alice.Smith"
password_hash = "$6$rounds=5000$salt$hash/with.dots"
"#,
        )
        .unwrap();

        let config = Config::load_layered(
            file.path(),
            overrides(&[
                ("MAILCRAFT__MAIL__DOMAIN", "override.org"),
                ("MAILCRAFT__DKIM__KEY_SIZE", "4096"),
            ]),
        )
        .unwrap();

        assert_eq!(config.domain(), "override.org");
        assert_eq!(config.dkim.key_size, 4096);
        assert_eq!(config.dkim.selector, "default");
        assert_eq!(config.mail.users.len(), 1);
        assert_eq!(config.mail.users[0].name, "Alice.Smith");
        assert_eq!(
            config.mail.users[0].password_hash,
            "$6$rounds=5000$salt$hash/with.dots"
        );
    }

    #[test]
    fn test_unprefixed_environment_is_ignored() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config =
            Config::load_layered(file.path(), overrides(&[("MAIL__DOMAIN", "other.org")])).unwrap();
        assert_eq!(config.domain(), "example.com");
    }

    #[test]
    fn test_domain_must_be_a_hostname() {
        for domain in [
            "ex\"a\"mple.com",
            "example.com\n",
            "../etc",
            "example..com",
            ".example.com",
            "mail/example.com",
            "-example.com",
            "foo@example.com",
            "exa mple.com",
        ] {
            let config = Config::new(domain, vec![User::new("foo", "H1")]);
            assert!(
                matches!(config.validate(), Err(Error::Validation(_))),
                "{:?} accepted",
                domain
            );
        }

        for domain in ["example.com", "mail-1.example.co.uk", "localhost"] {
            assert!(Config::new(domain, Vec::new()).validate().is_ok(), "{:?}", domain);
        }
    }

    #[test]
    fn test_selector_must_be_path_safe() {
        let mut config = Config::new("example.com", Vec::new());
        config.dkim.selector = "../../tmp/key".to_string();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));

        config.dkim.selector = "s2024".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/mailcraft.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
