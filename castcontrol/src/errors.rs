use thiserror::Error;

use crate::session::SessionState;

/// Failure opening or running a discovery window.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The mDNS listener could not be opened at all (no multicast-capable
    /// interface, daemon setup failure). Fatal for the operation, never
    /// retried by the core.
    #[error("discovery listener unavailable: {0}")]
    Unavailable(String),
    #[error("discovery cancelled")]
    Cancelled,
}

/// Failure reported by a cast link while talking to one device.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The device replied with an explicit error (e.g. busy, bad request).
    #[error("device rejected the request: {0}")]
    Rejected(String),
    /// Transport-level failure: refused, reset, TLS error, protocol garbage.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure establishing a control session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("session open cancelled")]
    Cancelled,
}

/// Failure issuing the load command on an established session.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("device rejected the command: {0}")]
    Rejected(String),
    /// No reply within the ack timeout. The session is presumed unreliable
    /// and must be closed by the caller rather than reused.
    #[error("no acknowledgment within the ack timeout")]
    Timeout,
    /// The link failed mid-command; the session has moved to `Failed`.
    #[error("session lost: {0}")]
    SessionLost(String),
    #[error("session is {0:?}, commands require a connected session")]
    NotConnected(SessionState),
    #[error("command cancelled")]
    Cancelled,
}

/// Errors the controller facade surfaces directly instead of mapping onto a
/// `CastOutcome` variant.
#[derive(Error, Debug)]
pub enum CastControlError {
    #[error("discovery listener unavailable: {0}")]
    DiscoveryUnavailable(String),
    /// The caller abandoned the operation; any open session was closed
    /// before this error propagated.
    #[error("cast operation cancelled")]
    Cancelled,
}
