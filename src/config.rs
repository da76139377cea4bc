// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Transport configuration as collected by the UI, and its validated form.

use core::fmt;

use jid::BareJid;

use crate::error::ConfigError;

/// Connection parameters for one session, as collected from the user.
///
/// All fields are plain strings (the port included) because that is what a
/// login form produces; nothing is validated until the config is handed to
/// [`Session::configure`], which either accepts it wholesale or rejects it
/// with [`ConfigError`]. Once accepted it is owned by the session for the
/// lifetime of that connection attempt.
///
/// [`Session::configure`]: crate::Session::configure
#[derive(Clone)]
pub struct TransportConfig {
    /// Account name, the local part of the JID.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Server host to open the TCP connection to.
    pub hostname: String,
    /// TCP port, as text. Must parse to 1..=65535.
    pub port: String,
    /// XMPP domain of the account. Defaults to `hostname` when `None`.
    pub domain: Option<String>,
}

impl TransportConfig {
    /// Assemble a config from the four mandatory fields.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        hostname: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            hostname: hostname.into(),
            port: port.into(),
            domain: None,
        }
    }

    /// Set an explicit XMPP domain distinct from the hostname.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if self.hostname.is_empty() {
            return Err(ConfigError::EmptyHostname);
        }
        let port: u16 = self
            .port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(self.port.clone()))?;
        if port == 0 {
            return Err(ConfigError::InvalidPort(self.port.clone()));
        }
        let domain = self
            .domain
            .clone()
            .unwrap_or_else(|| self.hostname.clone());
        let jid: BareJid = format!("{}@{}", self.username, domain).parse()?;
        Ok(ResolvedConfig {
            jid,
            username: self.username.clone(),
            password: self.password.clone(),
            hostname: self.hostname.clone(),
            port,
            domain,
        })
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .finish()
    }
}

/// A [`TransportConfig`] that passed validation.
///
/// This is the form [`Connector`] implementations receive: the port is
/// numeric, the domain is resolved, and `jid` is the account's bare JID.
///
/// [`Connector`]: crate::connect::Connector
#[derive(Clone)]
pub struct ResolvedConfig {
    /// The account's bare JID, `username@domain`.
    pub jid: BareJid,
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Server host.
    pub hostname: String,
    /// Server TCP port.
    pub port: u16,
    /// XMPP domain.
    pub domain: String,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("jid", &self.jid)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: &str) -> TransportConfig {
        TransportConfig::new("a", "b", "x.example", port)
    }

    #[test]
    fn accepts_valid_port_and_defaults_domain() {
        let resolved = config("5222").validate().unwrap();
        assert_eq!(resolved.port, 5222);
        assert_eq!(resolved.domain, "x.example");
        assert_eq!(resolved.jid.to_string(), "a@x.example");
    }

    #[test]
    fn explicit_domain_overrides_hostname() {
        let resolved = config("5222")
            .with_domain("chat.example")
            .validate()
            .unwrap();
        assert_eq!(resolved.domain, "chat.example");
        assert_eq!(resolved.jid.to_string(), "a@chat.example");
    }

    #[test]
    fn rejects_bad_ports() {
        for port in ["0", "-1", "65536", "abcd", ""] {
            match config(port).validate() {
                Err(ConfigError::InvalidPort(p)) => assert_eq!(p, port),
                other => panic!("port {:?} not rejected: {:?}", port, other.is_ok()),
            }
        }
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(matches!(
            TransportConfig::new("", "b", "x.example", "5222").validate(),
            Err(ConfigError::EmptyUsername)
        ));
        assert!(matches!(
            TransportConfig::new("a", "", "x.example", "5222").validate(),
            Err(ConfigError::EmptyPassword)
        ));
        assert!(matches!(
            TransportConfig::new("a", "b", "", "5222").validate(),
            Err(ConfigError::EmptyHostname)
        ));
    }

    #[test]
    fn debug_does_not_leak_password() {
        let rendered = format!("{:?}", config("5222"));
        assert!(!rendered.contains("\"b\""), "{}", rendered);
        assert!(rendered.contains("<redacted>"), "{}", rendered);
    }
}
