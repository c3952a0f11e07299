//! Bridge error taxonomy and handshake failure classification.
//!
//! Every failure the command bridge can produce is a variant of
//! [`BridgeError`]. The HTTP status and the body returned to the caller are
//! derived from the variant, so handlers only ever propagate with `?`.
//!
//! # Handshake EOF
//!
//! When a node's reverse tunnel accepts the relay's TCP channel while the
//! node's own SSH responder is not ready yet, the target handshake ends with
//! an end-of-file. That single condition is retried by the supervisor. It is
//! recognised exactly once, in [`classify_handshake_error`], and from then on
//! travels as [`BridgeError::HandshakeEof`]. Other transient conditions
//! (connection reset, refused channel) are surfaced immediately.

use poem::error::ResponseError;
use poem::http::StatusCode;
use thiserror::Error;

use crate::bridge::storage::StoreError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid form")]
    InvalidForm,

    #[error("{0}")]
    MissingField(&'static str),

    #[error("Invalid timeout value")]
    InvalidTimeout,

    #[error("Invalid ssh key")]
    InvalidKey,

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("content length != request path")]
    LengthMismatch,

    #[error("Request Entity Too Large")]
    PayloadTooLarge,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found")]
    NodeNotFound,

    #[error("Not Found")]
    NotFound,

    #[error("SSH not connected")]
    NotConnected,

    #[error("SSH server unavailable")]
    RelayNotRegistered,

    #[error("SSH server configuration error")]
    RelayMisconfigured,

    #[error("failed to connect remote ssh server {host}: {reason}")]
    RelayUnavailable { host: String, reason: String },

    #[error("failed to connect target port {port}: {reason}")]
    TargetUnavailable { port: u16, reason: String },

    #[error("EOF")]
    HandshakeEof,

    #[error("failed to open target ssh connection: {0}")]
    Handshake(String),

    /// Failure after a successful handshake; the message is passed through as is.
    #[error("{0}")]
    Execution(String),

    #[error("EOF occurred {0} times")]
    EofExhausted(u32),

    #[error("timeout")]
    Timeout,

    #[error("Database unavailable")]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether this is the transient target handshake EOF.
    pub fn is_eof(&self) -> bool {
        matches!(self, BridgeError::HandshakeEof)
    }
}

impl ResponseError for BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            BridgeError::InvalidForm
            | BridgeError::MissingField(_)
            | BridgeError::InvalidTimeout
            | BridgeError::InvalidKey
            | BridgeError::InvalidJson
            | BridgeError::LengthMismatch => StatusCode::BAD_REQUEST,
            BridgeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            BridgeError::Forbidden => StatusCode::FORBIDDEN,
            BridgeError::NodeNotFound | BridgeError::NotFound => StatusCode::NOT_FOUND,
            BridgeError::Storage(_) | BridgeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BridgeError::NotConnected
            | BridgeError::RelayNotRegistered
            | BridgeError::RelayMisconfigured
            | BridgeError::RelayUnavailable { .. }
            | BridgeError::TargetUnavailable { .. }
            | BridgeError::HandshakeEof
            | BridgeError::Handshake(_)
            | BridgeError::Execution(_)
            | BridgeError::EofExhausted(_)
            | BridgeError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Message fragments russh and the OS use when a peer closes mid-handshake.
const EOF_SUFFIXES: &[&str] = &["eof", "connection closed by the remote side", "disconnected"];

/// Determines whether an error message describes an end-of-file.
///
/// Matching is done on the tail of the lowercased message, so
/// "early eof" and "unexpected EOF" match while "eof marker missing in
/// config" does not.
pub(crate) fn is_eof_message(message: &str) -> bool {
    let lower = message.trim_end().to_lowercase();
    EOF_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Classify a failure of the target handshake (key exchange or
/// authentication over the tunnel).
pub(crate) fn classify_handshake_error(message: &str) -> BridgeError {
    if is_eof_message(message) {
        BridgeError::HandshakeEof
    } else {
        BridgeError::Handshake(message.to_string())
    }
}

/// Classify a russh error raised while negotiating the target session.
///
/// russh reports a peer that hangs up before or during key exchange as
/// `Disconnect` or `HUP`, or as an I/O error when the stream is already
/// gone on read or write.
pub(crate) fn classify_russh_handshake(err: &russh::Error) -> BridgeError {
    match err {
        russh::Error::Disconnect | russh::Error::HUP => BridgeError::HandshakeEof,
        russh::Error::IO(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe
            ) =>
        {
            BridgeError::HandshakeEof
        }
        _ => classify_handshake_error(&err.to_string()),
    }
}
