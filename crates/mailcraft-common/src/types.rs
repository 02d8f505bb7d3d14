//! Common types for mailcraft

use serde::{Deserialize, Serialize};

/// Characters that would break the line-oriented table formats
const FORBIDDEN_LOCAL_CHARS: &[char] = &['@', ':', ','];

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// The `postmaster@<domain>` address
    pub fn postmaster(domain: &str) -> Self {
        Self::new("postmaster", domain)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// A mailbox user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Local name, unique within the registry
    pub name: String,

    /// Pre-hashed credential, passed through verbatim
    #[serde(default)]
    pub password_hash: String,

    /// Additional local-parts delivered to this user
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl User {
    /// Create a user without aliases
    pub fn new(name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password_hash: password_hash.into(),
            aliases: Vec::new(),
        }
    }

    /// Builder-style alias setter
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Qualified address of this user
    pub fn address(&self, domain: &str) -> EmailAddress {
        EmailAddress::new(&self.name, domain)
    }
}

/// Ordered user registry keyed by name.
///
/// Iteration follows declaration order. Inserting a name that already
/// exists replaces the earlier entry in place, so the last write wins while
/// the first declaration keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    users: Vec<User>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user, returning the entry it replaced
    pub fn insert(&mut self, user: User) -> Option<User> {
        match self.users.iter_mut().find(|u| u.name == user.name) {
            Some(existing) => Some(std::mem::replace(existing, user)),
            None => {
                self.users.push(user);
                None
            }
        }
    }

    /// Look up a user by name
    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Whether a user with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate users in registry order
    pub fn iter(&self) -> std::slice::Iter<'_, User> {
        self.users.iter()
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the registry holds no users
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check that every user name and alias can be written to the tables.
    ///
    /// Alias names colliding with user names are not checked.
    pub fn validate(&self) -> crate::Result<()> {
        for user in &self.users {
            validate_local_part(&user.name).map_err(|reason| {
                crate::Error::Validation(format!("user name {:?} {reason}", user.name))
            })?;
            for alias in &user.aliases {
                validate_local_part(alias).map_err(|reason| {
                    crate::Error::Validation(format!(
                        "alias {alias:?} of user {:?} {reason}",
                        user.name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl FromIterator<User> for Registry {
    fn from_iter<T: IntoIterator<Item = User>>(iter: T) -> Self {
        let mut registry = Registry::new();
        for user in iter {
            registry.insert(user);
        }
        registry
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a User;
    type IntoIter = std::slice::Iter<'a, User>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn validate_local_part(local: &str) -> std::result::Result<(), &'static str> {
    if local.is_empty() {
        return Err("is empty");
    }
    if local.chars().any(char::is_whitespace) {
        return Err("contains whitespace");
    }
    if local.contains(FORBIDDEN_LOCAL_CHARS) {
        return Err("contains one of '@', ':' or ','");
    }
    Ok(())
}
