//! Transport seam between the session layer and the cast wire protocol.
//!
//! A `CastLink` is the blocking, device-facing side of one control session.
//! The session worker thread is the only owner of a link; boundedness of
//! every wait is enforced above this seam with timed channel receives, so
//! implementations are free to block.

use crate::errors::LinkError;
use crate::model::CastRequest;

/// Acknowledgment returned by the device for a successful load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadAck {
    /// Media session id assigned by the receiver, when it reported one.
    pub media_session_id: Option<i32>,
}

/// One device-facing control channel.
pub trait CastLink: Send {
    /// Establishes the channel: transport connect plus whatever handshake
    /// the protocol requires before commands can be issued.
    fn establish(&mut self) -> Result<(), LinkError>;

    /// Sends the load instruction and waits for the device's reply.
    ///
    /// `LinkError::Rejected` means the device explicitly declined;
    /// `LinkError::Transport` means the channel itself broke.
    fn load(&mut self, request: &CastRequest) -> Result<LoadAck, LinkError>;

    /// Releases the transport. Must be safe to call in any state and more
    /// than once.
    fn shutdown(&mut self);
}

/// Creates links for discovered devices; the seam where tests inject fakes.
pub trait LinkFactory: Send + Sync {
    fn open_link(&self, device: &crate::model::DeviceRecord) -> Box<dyn CastLink>;
}
