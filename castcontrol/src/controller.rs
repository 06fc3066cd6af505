//! Orchestration of one cast operation.
//!
//! The controller wires discovery, selection, session management and the
//! load command into the single entry point the outer layer calls:
//! discover, select the earliest-observed device, open a session, issue
//! the load, close the session, report the outcome. Every failure is
//! mapped onto exactly one `CastOutcome` variant and the session is closed
//! on every exit path. The controller never retries anything; retry policy
//! belongs to the caller, which knows its own idempotency assumptions.

use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::chromecast_link::ChromecastLinkFactory;
use crate::discovery::{Discoverer, MdnsDiscovery};
use crate::errors::{CastControlError, CommandError, DiscoveryError, SessionError};
use crate::link::LinkFactory;
use crate::model::{CastOutcome, CastRequest};
use crate::session::ControlSession;

/// Bounds for the three suspension points of a cast operation. All low
/// single-digit seconds by default.
#[derive(Clone, Copy, Debug)]
pub struct CastTimeouts {
    /// Length of the discovery window.
    pub discovery: Duration,
    /// Bound on the control-channel handshake.
    pub connect: Duration,
    /// Bound on the wait for the load acknowledgment.
    pub ack: Duration,
}

impl Default for CastTimeouts {
    fn default() -> Self {
        Self {
            discovery: Duration::from_secs(5),
            connect: Duration::from_secs(3),
            ack: Duration::from_secs(3),
        }
    }
}

/// One-shot cast controller.
///
/// Concurrent cast operations are independent: each `cast_one` call runs
/// its own discovery window and its own session, sharing nothing with the
/// others beyond this read-only configuration.
pub struct CastController<D = MdnsDiscovery, F = ChromecastLinkFactory>
where
    D: Discoverer,
    F: LinkFactory,
{
    discovery: D,
    links: F,
    timeouts: CastTimeouts,
    /// Optional friendly-name filter for selection; first observed wins
    /// when unset.
    device_name: Option<String>,
}

impl CastController {
    /// Production controller: mDNS discovery, cast-protocol links.
    pub fn new(timeouts: CastTimeouts) -> Self {
        Self::with_parts(
            MdnsDiscovery::new(),
            ChromecastLinkFactory::default(),
            timeouts,
        )
    }
}

impl<D, F> CastController<D, F>
where
    D: Discoverer,
    F: LinkFactory,
{
    /// Controller over explicit discovery and link implementations.
    pub fn with_parts(discovery: D, links: F, timeouts: CastTimeouts) -> Self {
        Self {
            discovery,
            links,
            timeouts,
            device_name: None,
        }
    }

    /// Restricts selection to devices advertising this friendly name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Runs one complete cast operation.
    pub fn cast_one(&self, request: &CastRequest) -> Result<CastOutcome, CastControlError> {
        self.cast_one_with_cancel(request, &CancelToken::new())
    }

    /// Runs one complete cast operation, aborting the current wait when
    /// `cancel` is raised. Any opened session is closed before returning.
    pub fn cast_one_with_cancel(
        &self,
        request: &CastRequest,
        cancel: &CancelToken,
    ) -> Result<CastOutcome, CastControlError> {
        let registry = match self.discovery.discover(self.timeouts.discovery, cancel) {
            Ok(registry) => registry,
            Err(DiscoveryError::Unavailable(reason)) => {
                return Err(CastControlError::DiscoveryUnavailable(reason));
            }
            Err(DiscoveryError::Cancelled) => return Err(CastControlError::Cancelled),
        };

        if registry.is_empty() {
            info!("No cast device advertised within the discovery window");
            return Ok(CastOutcome::NoDeviceFound);
        }

        // Selection cannot come up empty after the guard above unless a
        // name filter is active; re-checked all the same.
        let device = match registry.select(self.device_name.as_deref()) {
            Some(device) => device.clone(),
            None => {
                if let Some(name) = &self.device_name {
                    info!("No cast device named '{}' was found", name);
                }
                return Ok(CastOutcome::NoDeviceFound);
            }
        };
        info!(
            "Selected cast device '{}' at {}",
            device.friendly_name,
            device.location()
        );

        let link = self.links.open_link(&device);
        let mut session =
            match ControlSession::open(&device, link, self.timeouts.connect, cancel) {
                Ok(session) => session,
                Err(SessionError::ConnectionFailed(reason)) => {
                    warn!("Connection to '{}' failed: {}", device.friendly_name, reason);
                    return Ok(CastOutcome::ConnectionFailed(reason));
                }
                Err(SessionError::Cancelled) => return Err(CastControlError::Cancelled),
            };

        let outcome = match session.issue_load(request, self.timeouts.ack, cancel) {
            Ok(ack) => {
                info!(
                    "✅ '{}' acknowledged the load (media session {:?})",
                    session.device_name(),
                    ack.media_session_id
                );
                Ok(CastOutcome::Success(session.device_name().to_string()))
            }
            Err(CommandError::Rejected(reason)) => Ok(CastOutcome::CommandRejected(reason)),
            Err(CommandError::Timeout) => Ok(CastOutcome::Timeout),
            Err(CommandError::SessionLost(reason)) => {
                Ok(CastOutcome::ConnectionFailed(reason))
            }
            Err(CommandError::NotConnected(state)) => {
                // Unreachable through this orchestration; surfaced as a
                // connection failure rather than a panic.
                Ok(CastOutcome::ConnectionFailed(format!(
                    "session in state {:?}",
                    state
                )))
            }
            Err(CommandError::Cancelled) => Err(CastControlError::Cancelled),
        };

        // Single close point for success, rejection, timeout and
        // cancellation alike.
        session.close();
        outcome
    }
}
