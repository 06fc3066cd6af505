//! CastTube: cast a video to the first cast receiver on the local network.
//!
//! Thin entry point around `castcontrol`: loads the configuration, sets up
//! logging, runs exactly one cast operation and maps its outcome onto the
//! process exit code (0 success, 1 cast failure, 2 discovery unavailable).

use std::process::ExitCode;
use std::time::Duration;

use castconfig::get_config;
use castcontrol::{
    CastController, CastOutcome, CastRequest, CastTimeouts, ChromecastLinkFactory,
    MdnsDiscovery,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = get_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // First CLI argument overrides the configured video id.
    let video_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.get_video_id());

    let timeouts = CastTimeouts {
        discovery: Duration::from_secs(config.get_discovery_timeout_secs()),
        connect: Duration::from_secs(config.get_connect_timeout_secs()),
        ack: Duration::from_secs(config.get_ack_timeout_secs()),
    };

    let mut controller = CastController::with_parts(
        MdnsDiscovery::new(),
        ChromecastLinkFactory::new(config.get_receiver_app()),
        timeouts,
    );
    if let Some(name) = config.get_device_name() {
        info!("Casting restricted to device '{}'", name);
        controller = controller.with_device_name(name);
    }

    info!("🎬 Casting video '{}'", video_id);
    match controller.cast_one(&CastRequest::new(video_id)) {
        Ok(outcome @ CastOutcome::Success(_)) => {
            println!("{}", outcome);
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            println!("{}", outcome);
            ExitCode::from(1)
        }
        Err(err) => {
            error!("❌ {}", err);
            eprintln!("{}", err);
            ExitCode::from(2)
        }
    }
}
