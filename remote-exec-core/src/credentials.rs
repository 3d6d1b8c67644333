use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

/// How a remote account proves its identity.
#[derive(Debug, Clone)]
pub enum Secret {
    /// Use the identity of the local process (integrated auth, ssh-agent, ...).
    Ambient,
    Password(SecretString),
    KeyFile(PathBuf),
}

/// A remote account. Secrets are only exposed at the point of use.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub domain: Option<String>,
    pub secret: Secret,
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: None,
            secret: Secret::Password(SecretString::from(password.into())),
        }
    }

    pub fn key_file(username: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            domain: None,
            secret: Secret::KeyFile(path.into()),
        }
    }

    pub fn ambient(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: None,
            secret: Secret::Ambient,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.domain = (!domain.trim().is_empty()).then_some(domain);
        self
    }

    /// `DOMAIN\user` when a domain is set and the username is not already qualified.
    pub fn qualified_username(&self) -> String {
        match &self.domain {
            Some(domain) if !self.username.contains('\\') && !self.username.contains('@') => {
                format!("{domain}\\{}", self.username)
            }
            _ => self.username.clone(),
        }
    }

    pub fn expose_password(&self) -> Option<&str> {
        match &self.secret {
            Secret::Password(password) => Some(password.expose_secret()),
            _ => None,
        }
    }

    pub fn key_path(&self) -> Option<&Path> {
        match &self.secret {
            Secret::KeyFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn has_password(&self) -> bool {
        matches!(self.secret, Secret::Password(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_with_domain_once() {
        let creds = Credentials::password("admin", "pw").with_domain("CORP");
        assert_eq!(creds.qualified_username(), "CORP\\admin");

        let already = Credentials::password("OLD\\admin", "pw").with_domain("CORP");
        assert_eq!(already.qualified_username(), "OLD\\admin");

        let blank = Credentials::password("admin", "pw").with_domain("  ");
        assert_eq!(blank.qualified_username(), "admin");
    }

    #[test]
    fn debug_never_prints_password() {
        let creds = Credentials::password("admin", "s3cr3t-value");
        assert!(!format!("{creds:?}").contains("s3cr3t-value"));
        assert_eq!(creds.expose_password(), Some("s3cr3t-value"));
    }
}
