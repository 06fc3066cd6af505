//! Cast device discovery via mDNS.
//!
//! Cast receivers advertise themselves on the `_googlecast._tcp.local.`
//! mDNS service. A discovery window passively accumulates resolved
//! advertisements for a bounded duration and returns whatever arrived, in
//! arrival order. The window is a timed poll on the browse channel rather
//! than a callback registration, so the deadline and the cancellation token
//! are both honored explicitly.

use std::time::{Duration, Instant};

use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::errors::DiscoveryError;
use crate::model::{DeviceId, DeviceRecord};
use crate::registry::DeviceRegistry;

/// mDNS service type advertised by cast receivers.
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Default cast control port, used when the SRV record carries none.
pub const DEFAULT_CAST_PORT: u16 = 8009;

/// Granularity of the accumulation loop; bounds how late a deadline or a
/// cancellation can be noticed.
const DISCOVERY_POLL: Duration = Duration::from_millis(250);

/// Source of device advertisements for one discovery window.
///
/// The production implementation listens on the network; tests script the
/// window instead.
pub trait Discoverer {
    /// Accumulates advertisements for at most `window`, returning the
    /// devices observed. An empty registry is a normal result, not an
    /// error.
    fn discover(
        &self,
        window: Duration,
        cancel: &CancelToken,
    ) -> Result<DeviceRegistry, DiscoveryError>;
}

/// mDNS-backed discovery. Each window owns its own `ServiceDaemon`, so no
/// process-wide listener state survives the call.
#[derive(Debug, Default)]
pub struct MdnsDiscovery;

impl MdnsDiscovery {
    pub fn new() -> Self {
        Self
    }
}

impl Discoverer for MdnsDiscovery {
    fn discover(
        &self,
        window: Duration,
        cancel: &CancelToken,
    ) -> Result<DeviceRegistry, DiscoveryError> {
        let mdns = ServiceDaemon::new()
            .map_err(|err| DiscoveryError::Unavailable(err.to_string()))?;
        let browse_receiver = match mdns.browse(CAST_SERVICE_TYPE) {
            Ok(receiver) => receiver,
            Err(err) => {
                let _ = mdns.shutdown();
                return Err(DiscoveryError::Unavailable(err.to_string()));
            }
        };
        info!(window = ?window, "📡 mDNS discovery window open for {}", CAST_SERVICE_TYPE);

        let deadline = Instant::now() + window;
        let mut registry = DeviceRegistry::new();
        let result = loop {
            if cancel.is_cancelled() {
                break Err(DiscoveryError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Ok(registry);
            }
            match browse_receiver.recv_timeout(remaining.min(DISCOVERY_POLL)) {
                Ok(ServiceEvent::ServiceResolved(service)) => {
                    // A single unusable advertisement must not abort the
                    // window; it is dropped and logged inside the parser.
                    if let Some(record) = device_record_from_service(&service) {
                        registry.push(record);
                    }
                }
                Ok(_) => {}
                Err(_) => {
                    // Slice elapsed with nothing to read; loop re-checks the
                    // deadline and the cancellation token.
                }
            }
        };

        if let Err(err) = mdns.stop_browse(CAST_SERVICE_TYPE) {
            debug!("Failed to stop mDNS browse cleanly: {}", err);
        }
        let _ = mdns.shutdown();

        if let Ok(registry) = &result {
            info!("📥 Discovery window closed, {} device(s) observed", registry.len());
        }
        result
    }
}

/// Converts one resolved mDNS advertisement into a `DeviceRecord`.
///
/// TXT keys: `fn` carries the friendly name, `md` the model, `id` the
/// device uuid. Advertisements without a usable IPv4 address are dropped.
fn device_record_from_service(service: &ResolvedService) -> Option<DeviceRecord> {
    let mut v4_addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
    v4_addresses.sort();
    let host = match v4_addresses.first() {
        Some(address) => address.to_string(),
        None => {
            warn!(
                "No IPv4 address for cast device '{}', dropping advertisement",
                service.get_fullname()
            );
            return None;
        }
    };

    let port = match service.get_port() {
        0 => DEFAULT_CAST_PORT,
        port => port,
    };

    let fallback_name = instance_name_from_fullname(service.get_fullname());
    let friendly_name = service
        .get_property_val_str("fn")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| fallback_name.clone());
    let model_name = service
        .get_property_val_str("md")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Chromecast")
        .to_string();
    let uuid = service
        .get_property_val_str("id")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("chromecast-{}-{}", host, port));

    debug!(
        "Discovered cast device: {} at {}:{} (uuid: {}, model: {})",
        friendly_name, host, port, uuid, model_name
    );

    Some(DeviceRecord {
        id: DeviceId(format!("uuid:{}", uuid)),
        friendly_name,
        model_name,
        host,
        port,
        discovered_at: std::time::SystemTime::now(),
    })
}

/// Extracts the instance name from a full mDNS service name, e.g.
/// `Living Room TV._googlecast._tcp.local.` -> `Living Room TV`.
fn instance_name_from_fullname(fullname: &str) -> String {
    let suffix = format!(".{}", CAST_SERVICE_TYPE);
    fullname
        .trim()
        .strip_suffix(suffix.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fullname)
        .trim_matches('.')
        .to_string()
}
