//! Cast v2 link implementation using the rust_cast library.
//!
//! Talks the cast protocol (Protocol Buffers over TLS) to one receiver:
//! transport connect, virtual-connection handshake, receiver-app launch and
//! a media-channel LOAD. All calls here block; the session worker thread is
//! the only caller and the timed waits live on the other side of its
//! channels.

use rust_cast::CastDevice;
use rust_cast::channels::media::{Media, ResumeState, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use tracing::debug;

use crate::errors::LinkError;
use crate::link::{CastLink, LinkFactory, LoadAck};
use crate::model::{CastRequest, DeviceRecord};

/// Platform destination for the virtual-connection handshake.
const DEFAULT_DESTINATION_ID: &str = "receiver-0";

/// Content type forwarded when the request carries no hint.
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

struct AppSession {
    session_id: String,
    transport_id: String,
}

/// One blocking cast connection plus the receiver app session launched on
/// it.
pub struct ChromecastLink {
    host: String,
    port: u16,
    app: CastDeviceApp,
    device: Option<CastDevice<'static>>,
    session: Option<AppSession>,
}

impl ChromecastLink {
    pub fn new(device: &DeviceRecord, app: CastDeviceApp) -> Self {
        Self {
            host: device.host.clone(),
            port: device.port,
            app,
            device: None,
            session: None,
        }
    }
}

impl CastLink for ChromecastLink {
    fn establish(&mut self) -> Result<(), LinkError> {
        debug!("Connecting to cast device at {}:{}", self.host, self.port);

        // Cast receivers present self-signed certificates, so host
        // verification cannot apply.
        let device =
            CastDevice::connect_without_host_verification(self.host.clone(), self.port)
                .map_err(|err| LinkError::Transport(err.to_string()))?;

        device
            .connection
            .connect(DEFAULT_DESTINATION_ID)
            .map_err(|err| LinkError::Transport(err.to_string()))?;
        device
            .heartbeat
            .ping()
            .map_err(|err| LinkError::Transport(err.to_string()))?;

        debug!("Cast handshake complete for {}:{}", self.host, self.port);
        self.device = Some(device);
        Ok(())
    }

    fn load(&mut self, request: &CastRequest) -> Result<LoadAck, LinkError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| LinkError::Transport("link not established".to_string()))?;

        if self.session.is_none() {
            debug!("Launching receiver app {:?}", self.app);
            let app = device
                .receiver
                .launch_app(&self.app)
                .map_err(classify_cast_error)?;
            device
                .connection
                .connect(app.transport_id.as_str())
                .map_err(|err| LinkError::Transport(err.to_string()))?;
            debug!(
                "Receiver app up (session_id: {}, transport_id: {})",
                app.session_id, app.transport_id
            );
            self.session = Some(AppSession {
                session_id: app.session_id,
                transport_id: app.transport_id,
            });
        }

        let session = self
            .session
            .as_ref()
            .ok_or_else(|| LinkError::Transport("no receiver app session".to_string()))?;

        let media = Media {
            content_id: request.media_locator.clone(),
            content_type: request
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            stream_type: StreamType::Buffered,
            metadata: None,
            duration: None,
        };

        let status = device
            .media
            .load(
                session.transport_id.as_str(),
                session.session_id.as_str(),
                &media,
            )
            .map_err(classify_cast_error)?;

        let media_session_id = status.entries.first().map(|entry| entry.media_session_id);
        debug!("Media loaded (media_session_id: {:?})", media_session_id);

        if let (Some(position), Some(media_session_id)) =
            (request.start_position, media_session_id)
        {
            device
                .media
                .seek(
                    session.transport_id.as_str(),
                    media_session_id,
                    Some(position),
                    Some(ResumeState::PlaybackStart),
                )
                .map_err(classify_cast_error)?;
        }

        Ok(LoadAck { media_session_id })
    }

    fn shutdown(&mut self) {
        // Dropping the CastDevice closes the underlying TLS transport; the
        // receiver notices the vanished virtual connection on its own.
        if self.device.take().is_some() {
            debug!("Cast link to {}:{} released", self.host, self.port);
        }
        self.session = None;
    }
}

/// Application-level replies from the device come back as internal errors
/// with the device's reason text; everything else is a transport failure.
fn classify_cast_error(err: rust_cast::errors::Error) -> LinkError {
    match err {
        rust_cast::errors::Error::Internal(reason) => LinkError::Rejected(reason),
        other => LinkError::Transport(other.to_string()),
    }
}

/// Produces `ChromecastLink`s configured with the receiver app to launch.
pub struct ChromecastLinkFactory {
    receiver_app: String,
}

impl ChromecastLinkFactory {
    /// `receiver_app` accepts "default", "youtube", or a custom cast app id.
    pub fn new(receiver_app: impl Into<String>) -> Self {
        Self {
            receiver_app: receiver_app.into(),
        }
    }
}

impl Default for ChromecastLinkFactory {
    fn default() -> Self {
        Self::new("default")
    }
}

impl LinkFactory for ChromecastLinkFactory {
    fn open_link(&self, device: &DeviceRecord) -> Box<dyn CastLink> {
        Box::new(ChromecastLink::new(device, receiver_app(&self.receiver_app)))
    }
}

fn receiver_app(kind: &str) -> CastDeviceApp {
    let kind = kind.trim();
    match kind.to_ascii_lowercase().as_str() {
        "" | "default" => CastDeviceApp::DefaultMediaReceiver,
        "youtube" => CastDeviceApp::YouTube,
        // Cast app ids are case-sensitive, keep them as written.
        _ => CastDeviceApp::Custom(kind.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_app_mapping() {
        assert!(matches!(receiver_app("default"), CastDeviceApp::DefaultMediaReceiver));
        assert!(matches!(receiver_app(""), CastDeviceApp::DefaultMediaReceiver));
        assert!(matches!(receiver_app("YouTube"), CastDeviceApp::YouTube));
        match receiver_app("CC1AD845") {
            CastDeviceApp::Custom(id) => assert_eq!(id, "CC1AD845"),
            other => panic!("expected custom app, got {:?}", other),
        }
    }
}
