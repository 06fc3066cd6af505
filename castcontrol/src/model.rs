use std::time::SystemTime;

/// Stable identifier of a cast receiver, derived from the `id` TXT record
/// of its mDNS advertisement (falling back to the service instance name).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discovered cast receiver.
///
/// Built from a resolved mDNS advertisement and immutable afterwards. A new
/// advertisement for the same `DeviceId` replaces the record but keeps its
/// arrival rank in the registry.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub friendly_name: String,
    pub model_name: String,
    pub host: String,
    pub port: u16,
    pub discovered_at: SystemTime,
}

impl DeviceRecord {
    /// Location of the cast control endpoint, `chromecast://host:port`.
    pub fn location(&self) -> String {
        format!("chromecast://{}:{}", self.host, self.port)
    }
}

/// A "load and play" instruction, constructed by the caller.
#[derive(Clone, Debug)]
pub struct CastRequest {
    /// Opaque media identifier the receiver can resolve (e.g. a video id).
    pub media_locator: String,
    /// MIME hint forwarded to the receiver; the receiver applies its own
    /// default when absent.
    pub content_type: Option<String>,
    /// Start offset in seconds, applied with a seek once the load succeeds.
    pub start_position: Option<f32>,
}

impl CastRequest {
    pub fn new(media_locator: impl Into<String>) -> Self {
        Self {
            media_locator: media_locator.into(),
            content_type: None,
            start_position: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_start_position(mut self, seconds: f32) -> Self {
        self.start_position = Some(seconds);
        self
    }
}

/// Final result of one cast operation, reported to the caller. Never
/// partially filled; the facade maps every failure path onto exactly one
/// variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CastOutcome {
    /// The receiver acknowledged the load; carries its friendly name.
    Success(String),
    /// The discovery window elapsed without a usable advertisement.
    NoDeviceFound,
    /// The control session could not be established.
    ConnectionFailed(String),
    /// The receiver understood the instruction but declined it.
    CommandRejected(String),
    /// No acknowledgment arrived within the ack timeout. The command may or
    /// may not have taken effect; at-most-once delivery is not guaranteed.
    Timeout,
}

impl std::fmt::Display for CastOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastOutcome::Success(name) => write!(f, "playing on '{}'", name),
            CastOutcome::NoDeviceFound => write!(f, "no cast device found"),
            CastOutcome::ConnectionFailed(reason) => {
                write!(f, "connection failed: {}", reason)
            }
            CastOutcome::CommandRejected(reason) => {
                write!(f, "command rejected: {}", reason)
            }
            CastOutcome::Timeout => write!(f, "no acknowledgment from device"),
        }
    }
}
