//! End-to-end tests of the cast pipeline through the facade, with the
//! network replaced at the trait seams: a scripted discovery window and
//! scripted cast links.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use castcontrol::{
    CancelToken, CastControlError, CastController, CastLink, CastOutcome, CastRequest,
    CastTimeouts, DeviceId, DeviceRecord, DeviceRegistry, Discoverer, DiscoveryError,
    LinkError, LinkFactory, LoadAck,
};

fn device(id: &str, name: &str) -> DeviceRecord {
    DeviceRecord {
        id: DeviceId(format!("uuid:{}", id)),
        friendly_name: name.to_string(),
        model_name: "Chromecast".to_string(),
        host: "192.0.2.10".to_string(),
        port: 8009,
        discovered_at: SystemTime::now(),
    }
}

fn timeouts_ms(discovery: u64, connect: u64, ack: u64) -> CastTimeouts {
    CastTimeouts {
        discovery: Duration::from_millis(discovery),
        connect: Duration::from_millis(connect),
        ack: Duration::from_millis(ack),
    }
}

/// Discovery window scripted with the advertisements it will "receive".
///
/// An empty script consumes the whole window, like a silent network; a
/// non-empty one returns as soon as the advertisements are registered,
/// which is indistinguishable from fast devices as far as the facade is
/// concerned.
struct ScriptedDiscovery {
    devices: Vec<DeviceRecord>,
    unavailable: Option<&'static str>,
}

impl ScriptedDiscovery {
    fn advertising(devices: Vec<DeviceRecord>) -> Self {
        Self {
            devices,
            unavailable: None,
        }
    }

    fn silent() -> Self {
        Self::advertising(Vec::new())
    }

    fn unavailable(reason: &'static str) -> Self {
        Self {
            devices: Vec::new(),
            unavailable: Some(reason),
        }
    }
}

impl Discoverer for ScriptedDiscovery {
    fn discover(
        &self,
        window: Duration,
        cancel: &CancelToken,
    ) -> Result<DeviceRegistry, DiscoveryError> {
        if let Some(reason) = self.unavailable {
            return Err(DiscoveryError::Unavailable(reason.to_string()));
        }
        let mut registry = DeviceRegistry::new();
        for record in &self.devices {
            registry.push(record.clone());
        }
        if registry.is_empty() {
            // A silent network keeps the listener up for the whole window.
            let deadline = Instant::now() + window;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return Err(DiscoveryError::Cancelled);
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
        Ok(registry)
    }
}

#[derive(Clone, Copy)]
enum LinkScript {
    Ack,
    Reject(&'static str),
    ConnectHangs(Duration),
    AckAfter(Duration),
}

struct ScriptedLink {
    script: LinkScript,
    closed: Arc<AtomicBool>,
}

impl CastLink for ScriptedLink {
    fn establish(&mut self) -> Result<(), LinkError> {
        if let LinkScript::ConnectHangs(delay) = self.script {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn load(&mut self, _request: &CastRequest) -> Result<LoadAck, LinkError> {
        match self.script {
            LinkScript::Ack => Ok(LoadAck {
                media_session_id: Some(7),
            }),
            LinkScript::AckAfter(delay) => {
                thread::sleep(delay);
                Ok(LoadAck {
                    media_session_id: Some(7),
                })
            }
            LinkScript::Reject(reason) => Err(LinkError::Rejected(reason.to_string())),
            LinkScript::ConnectHangs(_) => Ok(LoadAck::default()),
        }
    }

    fn shutdown(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct ScriptedLinkFactory {
    script: LinkScript,
    opened: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ScriptedLinkFactory {
    fn new(script: LinkScript) -> Self {
        Self {
            script,
            opened: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn opened(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.opened)
    }

    fn closed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl LinkFactory for ScriptedLinkFactory {
    fn open_link(&self, _device: &DeviceRecord) -> Box<dyn CastLink> {
        self.opened.store(true, Ordering::SeqCst);
        Box::new(ScriptedLink {
            script: self.script,
            closed: Arc::clone(&self.closed),
        })
    }
}

fn assert_eventually_closed(closed: &Arc<AtomicBool>) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !closed.load(Ordering::SeqCst) {
        assert!(
            Instant::now() < deadline,
            "session transport was never released"
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn scenario_a_device_acknowledges_load() {
    let factory = ScriptedLinkFactory::new(LinkScript::Ack);
    let closed = factory.closed();
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![device("a", "Living Room TV")]),
        factory,
        timeouts_ms(1000, 1000, 1000),
    );

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::Success("Living Room TV".to_string()));
    assert_eventually_closed(&closed);
}

#[test]
fn scenario_b_silent_network_times_out_without_opening_sessions() {
    let factory = ScriptedLinkFactory::new(LinkScript::Ack);
    let opened = factory.opened();
    let controller = CastController::with_parts(
        ScriptedDiscovery::silent(),
        factory,
        timeouts_ms(300, 1000, 1000),
    );

    let started = Instant::now();
    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, CastOutcome::NoDeviceFound);
    assert!(elapsed >= Duration::from_millis(300), "window cut short: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800), "window overrun: {:?}", elapsed);
    assert!(!opened.load(Ordering::SeqCst), "no session may be opened");
}

#[test]
fn scenario_c_device_rejects_command() {
    let factory = ScriptedLinkFactory::new(LinkScript::Reject("busy"));
    let closed = factory.closed();
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![device("a", "Living Room TV")]),
        factory,
        timeouts_ms(1000, 1000, 1000),
    );

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::CommandRejected("busy".to_string()));
    assert_eventually_closed(&closed);
}

#[test]
fn scenario_d_handshake_timeout() {
    let factory = ScriptedLinkFactory::new(LinkScript::ConnectHangs(Duration::from_millis(600)));
    let closed = factory.closed();
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![device("a", "Living Room TV")]),
        factory,
        timeouts_ms(1000, 50, 1000),
    );

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::ConnectionFailed("timeout".to_string()));
    // The straggling handshake worker still releases the transport.
    assert_eventually_closed(&closed);
}

#[test]
fn ack_timeout_yields_timeout_and_closes_session() {
    let factory = ScriptedLinkFactory::new(LinkScript::AckAfter(Duration::from_millis(400)));
    let closed = factory.closed();
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![device("a", "Living Room TV")]),
        factory,
        timeouts_ms(1000, 1000, 50),
    );

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::Timeout);
    assert_eventually_closed(&closed);
}

#[test]
fn discovery_unavailable_is_surfaced_not_mapped() {
    let controller = CastController::with_parts(
        ScriptedDiscovery::unavailable("no multicast-capable interface"),
        ScriptedLinkFactory::new(LinkScript::Ack),
        timeouts_ms(1000, 1000, 1000),
    );

    let err = controller
        .cast_one(&CastRequest::new("CYlon2tvywA"))
        .unwrap_err();
    match err {
        CastControlError::DiscoveryUnavailable(reason) => {
            assert!(reason.contains("multicast"));
        }
        other => panic!("expected DiscoveryUnavailable, got {:?}", other),
    }
}

#[test]
fn first_observed_device_wins() {
    let factory = ScriptedLinkFactory::new(LinkScript::Ack);
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![
            device("b", "Bedroom"),
            device("a", "Attic"),
        ]),
        factory,
        timeouts_ms(1000, 1000, 1000),
    );

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::Success("Bedroom".to_string()));
}

#[test]
fn name_filter_overrides_arrival_order() {
    let factory = ScriptedLinkFactory::new(LinkScript::Ack);
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![
            device("b", "Bedroom"),
            device("a", "Attic"),
        ]),
        factory,
        timeouts_ms(1000, 1000, 1000),
    )
    .with_device_name("Attic");

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::Success("Attic".to_string()));
}

#[test]
fn name_filter_with_no_match_maps_to_no_device_found() {
    let controller = CastController::with_parts(
        ScriptedDiscovery::advertising(vec![device("b", "Bedroom")]),
        ScriptedLinkFactory::new(LinkScript::Ack),
        timeouts_ms(1000, 1000, 1000),
    )
    .with_device_name("Garage");

    let outcome = controller.cast_one(&CastRequest::new("CYlon2tvywA")).unwrap();
    assert_eq!(outcome, CastOutcome::NoDeviceFound);
}

#[test]
fn cancellation_aborts_the_discovery_wait() {
    let controller = CastController::with_parts(
        ScriptedDiscovery::silent(),
        ScriptedLinkFactory::new(LinkScript::Ack),
        timeouts_ms(5000, 1000, 1000),
    );

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let started = Instant::now();
    let err = controller
        .cast_one_with_cancel(&CastRequest::new("CYlon2tvywA"), &cancel)
        .unwrap_err();
    assert!(matches!(err, CastControlError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(1000));
}
