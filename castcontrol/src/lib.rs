//! Discovery and control of cast receivers on the local network.
//!
//! The crate drives one operation end to end: browse mDNS for cast
//! receiver advertisements during a bounded window, pick the earliest
//! observed device, open a cast control session to it and issue a
//! load-media instruction, reporting a single [`CastOutcome`]. Every wait
//! is bounded by an explicit timeout and cancellable; every opened session
//! is closed on every exit path.

pub mod cancel;
pub mod chromecast_link;
pub mod controller;
pub mod discovery;
pub mod errors;
pub mod link;
pub mod model;
pub mod registry;
pub mod session;

pub use cancel::CancelToken;
pub use chromecast_link::{ChromecastLink, ChromecastLinkFactory};
pub use controller::{CastController, CastTimeouts};
pub use discovery::{Discoverer, MdnsDiscovery, CAST_SERVICE_TYPE, DEFAULT_CAST_PORT};
pub use errors::{CastControlError, CommandError, DiscoveryError, LinkError, SessionError};
pub use link::{CastLink, LinkFactory, LoadAck};
pub use model::{CastOutcome, CastRequest, DeviceId, DeviceRecord};
pub use registry::DeviceRegistry;
pub use session::{ControlSession, SessionState};
