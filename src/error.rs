// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Detailed error types

use sasl::client::MechanismError as SaslMechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Rejected transport configuration
    InvalidConfig(ConfigError),
    /// A connect is already in flight, or a stream is already live
    AlreadyConnecting,
    /// I/O error on the underlying transport
    Network(IoError),
    /// Authentication error
    Auth(AuthError),
    /// `send` attempted outside the `Authenticated` state
    NotAuthenticated,
    /// Protocol-level error
    Protocol(ProtocolError),
    /// Operation called from a state it does not support
    InvalidState,
    /// Connection closed
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidConfig(e) => write!(fmt, "invalid configuration: {}", e),
            Error::AlreadyConnecting => write!(fmt, "a connect is already in flight"),
            Error::Network(e) => write!(fmt, "network error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::NotAuthenticated => write!(fmt, "session is not authenticated"),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::InvalidState => write!(fmt, "invalid state for this operation"),
            Error::Disconnected => write!(fmt, "disconnected"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Network(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidConfig(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Reasons for `configure` to reject a [`TransportConfig`].
///
/// [`TransportConfig`]: crate::TransportConfig
#[derive(Debug)]
pub enum ConfigError {
    /// Username is empty
    EmptyUsername,
    /// Password is empty
    EmptyPassword,
    /// Hostname is empty
    EmptyHostname,
    /// Port is not a number in 1..=65535
    InvalidPort(String),
    /// username@domain does not form a valid JID
    InvalidJid(jid::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::EmptyUsername => write!(fmt, "username must not be empty"),
            ConfigError::EmptyPassword => write!(fmt, "password must not be empty"),
            ConfigError::EmptyHostname => write!(fmt, "hostname must not be empty"),
            ConfigError::InvalidPort(port) => write!(fmt, "not a valid TCP port: {:?}", port),
            ConfigError::InvalidJid(e) => write!(fmt, "invalid address: {}", e),
        }
    }
}

impl StdError for ConfigError {}

impl From<jid::Error> for ConfigError {
    fn from(e: jid::Error) -> Self {
        ConfigError::InvalidJid(e)
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    /// No matching SASL mechanism available
    NoMechanism,
    /// Local SASL implementation error
    Sasl(SaslMechanismError),
    /// Failure condition reported by the server, e.g. `not-authorized`
    Fail(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Sasl(e) => write!(fmt, "local SASL implementation error: {}", e),
            AuthError::Fail(condition) => write!(fmt, "failure from the server: {}", condition),
        }
    }
}

impl StdError for AuthError {}

impl From<SaslMechanismError> for AuthError {
    fn from(e: SaslMechanismError) -> Self {
        AuthError::Sasl(e)
    }
}

/// XMPP protocol-level error
#[derive(Debug)]
pub enum ProtocolError {
    /// XML parser error
    Parse(IoError),
    /// No id attribute in `<stream:stream>`
    NoStreamId,
    /// Unexpected `<stream:stream>` (shouldn't occur)
    InvalidStreamStart,
    /// Invalid response to resource binding
    InvalidBindResponse,
    /// Undecodable base64 payload in SASL negotiation
    SaslPayload(base64::DecodeError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Parse(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::NoStreamId => write!(fmt, "no id attribute in <stream:stream>"),
            ProtocolError::InvalidStreamStart => write!(fmt, "unexpected <stream:stream>"),
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::SaslPayload(e) => write!(fmt, "undecodable SASL payload: {}", e),
        }
    }
}

impl StdError for ProtocolError {}

impl From<base64::DecodeError> for ProtocolError {
    fn from(e: base64::DecodeError) -> Self {
        ProtocolError::SaslPayload(e)
    }
}

/// Broad classification of a session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level failure
    Network,
    /// Authentication failure
    Auth,
    /// Peer spoke the protocol wrong
    Protocol,
    /// The stream ended
    Disconnected,
}

/// Cheaply cloneable snapshot of the error that failed a session.
///
/// [`Error`] itself is not `Clone` (it may carry an [`std::io::Error`]), but
/// failure causes travel through `watch` channels and the event sink, so the
/// session keeps this flattened form in [`SessionState::Failed`] and
/// [`Event::Error`].
///
/// [`SessionState::Failed`]: crate::SessionState::Failed
/// [`Event::Error`]: crate::Event::Error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    kind: FailureKind,
    message: String,
}

impl FailureReason {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn disconnected() -> Self {
        Self::new(FailureKind::Disconnected, "connection closed by peer")
    }

    /// The broad classification of the failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Rebuild an I/O error carrying this failure's description.
    pub fn to_io_error(&self) -> IoError {
        IoError::new(std::io::ErrorKind::Other, self.message.clone())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.message)
    }
}

impl From<&Error> for FailureReason {
    fn from(e: &Error) -> Self {
        let kind = match e {
            Error::Network(_) => FailureKind::Network,
            Error::Auth(_) => FailureKind::Auth,
            Error::Disconnected => FailureKind::Disconnected,
            _ => FailureKind::Protocol,
        };
        Self::new(kind, e.to_string())
    }
}
