//! Control sessions over a cast link.
//!
//! A `ControlSession` is the exclusively-owned channel to one device for
//! the duration of one cast operation. The blocking link lives on a
//! dedicated worker thread; the session side talks to it over
//! crossbeam channels and enforces every timeout with timed receives, so
//! no call here blocks past its deadline even when the link itself hangs.
//!
//! State machine: `Disconnected → Connecting → Connected → Closed`, with
//! `Failed` reachable from `Connecting` (handshake refused or timed out)
//! and from `Connected` (transport loss). `Failed` and `Closed` are
//! terminal; a new session must be opened to talk to the device again.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::errors::{CommandError, LinkError, SessionError};
use crate::link::{CastLink, LoadAck};
use crate::model::{CastRequest, DeviceId, DeviceRecord};

/// Granularity of the timed waits; bounds how late a cancellation is
/// noticed.
const SESSION_POLL: Duration = Duration::from_millis(100);

/// Connection state of a control session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Failed,
}

enum WorkerRequest {
    Load(CastRequest),
    Close,
}

enum WorkerReply {
    Connected,
    ConnectFailed(String),
    Loaded(LoadAck),
    LoadRejected(String),
    LinkLost(String),
}

enum Wait {
    Reply(WorkerReply),
    TimedOut,
    Cancelled,
    WorkerGone,
}

/// An open (or opening) control channel to exactly one device.
pub struct ControlSession {
    device_id: DeviceId,
    device_name: String,
    state: SessionState,
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    /// `Some` until the worker has been told to release the link; doubles
    /// as the close-once marker.
    worker: Option<thread::JoinHandle<()>>,
}

impl ControlSession {
    /// Opens a session to `device` over `link`, waiting at most
    /// `connect_timeout` for the handshake.
    ///
    /// On every failure path the worker is signalled to release the
    /// transport before the error is returned; a worker still blocked in
    /// the handshake notices the abandoned channel when it comes back and
    /// releases the transport itself.
    pub fn open(
        device: &DeviceRecord,
        link: Box<dyn CastLink>,
        connect_timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Self, SessionError> {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (reply_tx, reply_rx) = unbounded::<WorkerReply>();

        let mut session = ControlSession {
            device_id: device.id.clone(),
            device_name: device.friendly_name.clone(),
            state: SessionState::Disconnected,
            requests: request_tx,
            replies: reply_rx,
            worker: None,
        };

        debug!(device = %session.device_id, "Opening control session");
        session.state = SessionState::Connecting;
        session.worker = Some(thread::spawn(move || run_worker(link, request_rx, reply_tx)));

        match session.wait_for_reply(connect_timeout, cancel) {
            Wait::Reply(WorkerReply::Connected) => {
                debug!(device = %session.device_id, "Control session connected");
                session.state = SessionState::Connected;
                Ok(session)
            }
            Wait::Reply(WorkerReply::ConnectFailed(reason)) => {
                session.state = SessionState::Failed;
                session.release_worker();
                Err(SessionError::ConnectionFailed(reason))
            }
            Wait::Reply(_) => {
                // The worker only ever answers the handshake first; anything
                // else means it is out of step and cannot be trusted.
                session.state = SessionState::Failed;
                session.release_worker();
                Err(SessionError::ConnectionFailed(
                    "unexpected reply during handshake".to_string(),
                ))
            }
            Wait::TimedOut => {
                warn!(device = %session.device_id, "Connect timed out after {:?}", connect_timeout);
                session.state = SessionState::Failed;
                session.release_worker();
                Err(SessionError::ConnectionFailed("timeout".to_string()))
            }
            Wait::Cancelled => {
                session.state = SessionState::Failed;
                session.release_worker();
                Err(SessionError::Cancelled)
            }
            Wait::WorkerGone => {
                session.state = SessionState::Failed;
                session.release_worker();
                Err(SessionError::ConnectionFailed(
                    "session worker terminated".to_string(),
                ))
            }
        }
    }

    /// Sends the load instruction and waits at most `ack_timeout` for the
    /// device's acknowledgment.
    ///
    /// On `CommandError::Timeout` the session is presumed unreliable: the
    /// caller must close it rather than issue further commands.
    pub fn issue_load(
        &mut self,
        request: &CastRequest,
        ack_timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<LoadAck, CommandError> {
        if self.state != SessionState::Connected {
            return Err(CommandError::NotConnected(self.state));
        }

        debug!(
            device = %self.device_id,
            locator = %request.media_locator,
            "Issuing load command"
        );
        if self.requests.send(WorkerRequest::Load(request.clone())).is_err() {
            self.state = SessionState::Failed;
            return Err(CommandError::SessionLost(
                "session worker terminated".to_string(),
            ));
        }

        match self.wait_for_reply(ack_timeout, cancel) {
            Wait::Reply(WorkerReply::Loaded(ack)) => Ok(ack),
            Wait::Reply(WorkerReply::LoadRejected(reason)) => {
                // The channel itself is healthy; the device declined.
                Err(CommandError::Rejected(reason))
            }
            Wait::Reply(WorkerReply::LinkLost(reason)) => {
                self.state = SessionState::Failed;
                Err(CommandError::SessionLost(reason))
            }
            Wait::Reply(_) => {
                self.state = SessionState::Failed;
                Err(CommandError::SessionLost(
                    "unexpected reply to load command".to_string(),
                ))
            }
            Wait::TimedOut => {
                warn!(device = %self.device_id, "No load acknowledgment within {:?}", ack_timeout);
                Err(CommandError::Timeout)
            }
            Wait::Cancelled => Err(CommandError::Cancelled),
            Wait::WorkerGone => {
                self.state = SessionState::Failed;
                Err(CommandError::SessionLost(
                    "session worker terminated".to_string(),
                ))
            }
        }
    }

    /// Releases the session. Idempotent; safe on every exit path. A
    /// `Failed` session stays `Failed`, anything else ends up `Closed`.
    pub fn close(&mut self) {
        self.release_worker();
        if self.state != SessionState::Failed {
            if self.state != SessionState::Closed {
                debug!(device = %self.device_id, "Control session closed");
            }
            self.state = SessionState::Closed;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Friendly name of the device this session targets.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Tells the worker to release the link, exactly once. The worker is
    /// detached, not joined: it may still be blocked inside the link and
    /// joining would forfeit the boundedness of the caller's wait.
    fn release_worker(&mut self) {
        if self.worker.take().is_some() {
            let _ = self.requests.send(WorkerRequest::Close);
        }
    }

    fn wait_for_reply(&self, timeout: Duration, cancel: &CancelToken) -> Wait {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Wait::Cancelled;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Wait::TimedOut;
            }
            match self.replies.recv_timeout(remaining.min(SESSION_POLL)) {
                Ok(reply) => return Wait::Reply(reply),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Wait::WorkerGone,
            }
        }
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker side: sole owner of the blocking link. Releases the transport on
/// every exit, including abandonment by the session side.
fn run_worker(
    mut link: Box<dyn CastLink>,
    requests: Receiver<WorkerRequest>,
    replies: Sender<WorkerReply>,
) {
    match link.establish() {
        Ok(()) => {
            if replies.send(WorkerReply::Connected).is_err() {
                // The session gave up while we were connecting.
                link.shutdown();
                return;
            }
        }
        Err(err) => {
            let _ = replies.send(WorkerReply::ConnectFailed(err.to_string()));
            link.shutdown();
            return;
        }
    }

    loop {
        match requests.recv() {
            Ok(WorkerRequest::Load(request)) => match link.load(&request) {
                Ok(ack) => {
                    if replies.send(WorkerReply::Loaded(ack)).is_err() {
                        break;
                    }
                }
                Err(LinkError::Rejected(reason)) => {
                    if replies.send(WorkerReply::LoadRejected(reason)).is_err() {
                        break;
                    }
                }
                Err(LinkError::Transport(reason)) => {
                    let _ = replies.send(WorkerReply::LinkLost(reason));
                    break;
                }
            },
            Ok(WorkerRequest::Close) | Err(_) => break,
        }
    }
    link.shutdown();
}
