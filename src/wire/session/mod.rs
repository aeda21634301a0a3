pub mod transport;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use prost::Message;
use serde_json::json;

use crate::events::NotificationDispatcher;
use crate::logging::{LogLevel, Logger};
use crate::wire::codec::{decode_body, WireCodec};
use crate::wire::envelope::{Envelope, MessageKind};
use crate::wire::proto::EventMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Closure {
    /// Close handshake completed or shutdown was requested locally.
    Normal,
    /// Connection lost without a close handshake.
    Abnormal { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed(Closure),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    Transport {
        service: String,
        method: String,
        reason: String,
    },
    Protocol {
        service: String,
        method: String,
        reason: String,
    },
    Remote {
        service: String,
        method: String,
        code: i64,
        message: String,
    },
    Timeout {
        service: String,
        method: String,
        client_seq: i64,
    },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport {
                service,
                method,
                reason,
            } => write!(f, "{service}.{method}: transport unavailable ({reason})"),
            Self::Protocol {
                service,
                method,
                reason,
            } => write!(f, "{service}.{method}: protocol error ({reason})"),
            Self::Remote {
                service,
                method,
                code,
                message,
            } => write!(f, "{service}.{method}: remote error code={code} {message}"),
            Self::Timeout {
                service,
                method,
                client_seq,
            } => write!(f, "{service}.{method}: timed out (seq={client_seq})"),
        }
    }
}

impl std::error::Error for CallError {}

pub(crate) enum Outbound {
    Frame(Vec<u8>),
    Close,
}

struct PendingCall {
    reply: Sender<Result<Vec<u8>, CallError>>,
    service: String,
    method: String,
}

/// Request/response correlation over one websocket connection.
///
/// Callers block on a per-call channel; the transport thread resolves the
/// channel when the matching response arrives. Pending entries never outlive
/// the session: timeouts remove their own entry and closure rejects the rest.
pub struct Session {
    state: Mutex<SessionState>,
    state_changed: Condvar,
    next_client_seq: AtomicI64,
    server_seq: AtomicI64,
    pending: Mutex<HashMap<i64, PendingCall>>,
    outbound: Mutex<Option<Sender<Outbound>>>,
    codec: WireCodec,
    dispatcher: Arc<NotificationDispatcher>,
    logger: Arc<Logger>,
    default_timeout: Duration,
}

impl Session {
    pub fn new(
        codec: WireCodec,
        dispatcher: Arc<NotificationDispatcher>,
        logger: Arc<Logger>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::Connecting),
            state_changed: Condvar::new(),
            next_client_seq: AtomicI64::new(1),
            server_seq: AtomicI64::new(0),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            codec,
            dispatcher,
            logger,
            default_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Open)
    }

    pub fn server_seq(&self) -> i64 {
        self.server_seq.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Wires the outbound queue of a live transport and opens the session.
    pub(crate) fn attach_outbound(&self, sender: Sender<Outbound>) {
        *self.lock_outbound() = Some(sender);
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Connecting) {
            *state = SessionState::Open;
            self.state_changed.notify_all();
        }
    }

    pub fn call(
        &self,
        service: &str,
        method: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        if !self.is_open() {
            return Err(CallError::Transport {
                service: service.to_owned(),
                method: method.to_owned(),
                reason: "session is not open".to_owned(),
            });
        }

        let client_seq = self.next_client_seq.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope::request(
            service,
            method,
            client_seq,
            self.server_seq.load(Ordering::SeqCst),
            body,
        );
        let frame = self
            .codec
            .encode_frame(envelope)
            .map_err(|error| CallError::Protocol {
                service: service.to_owned(),
                method: method.to_owned(),
                reason: error.to_string(),
            })?;

        let (reply_tx, reply_rx) = mpsc::channel();
        self.lock_pending().insert(
            client_seq,
            PendingCall {
                reply: reply_tx,
                service: service.to_owned(),
                method: method.to_owned(),
            },
        );

        let sent = match self.lock_outbound().as_ref() {
            Some(sender) => sender.send(Outbound::Frame(frame)).is_ok(),
            None => false,
        };
        if !sent {
            self.lock_pending().remove(&client_seq);
            return Err(CallError::Transport {
                service: service.to_owned(),
                method: method.to_owned(),
                reason: "outbound queue closed".to_owned(),
            });
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.lock_pending().remove(&client_seq);
                Err(CallError::Timeout {
                    service: service.to_owned(),
                    method: method.to_owned(),
                    client_seq,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Transport {
                service: service.to_owned(),
                method: method.to_owned(),
                reason: "pending call dropped".to_owned(),
            }),
        }
    }

    /// Encodes `request`, calls with the default timeout and decodes the reply.
    pub fn call_decoded<Req, Rep>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Rep, CallError>
    where
        Req: Message,
        Rep: Message + Default,
    {
        let body = self.call(service, method, request.encode_to_vec(), self.default_timeout)?;
        decode_body(&body).map_err(|error| CallError::Protocol {
            service: service.to_owned(),
            method: method.to_owned(),
            reason: error.to_string(),
        })
    }

    /// Entry point for every inbound binary frame.
    pub fn handle_frame(&self, frame: &[u8]) {
        let envelope = match self.codec.decode_frame(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.logger
                    .warn(Some("wire::session"), &format!("dropping undecodable frame: {error}"));
                return;
            }
        };

        if envelope.server_seq > 0 {
            self.server_seq
                .fetch_max(envelope.server_seq, Ordering::SeqCst);
        }

        match envelope.kind {
            MessageKind::Response => self.resolve_response(envelope),
            MessageKind::Notify => self.dispatch_notify(envelope),
            MessageKind::Request => self.logger.verbose(
                Some("wire::session"),
                &format!("ignoring server request {}", envelope.qualified_method()),
            ),
        }
    }

    fn resolve_response(&self, envelope: Envelope) {
        let Some(pending) = self.lock_pending().remove(&envelope.client_seq) else {
            if envelope.error_code != 0 {
                self.logger.log(
                    LogLevel::Warn,
                    Some("wire::session"),
                    "Unmatched error response",
                    Some(json!({
                        "method": envelope.qualified_method(),
                        "client_seq": envelope.client_seq,
                        "code": envelope.error_code,
                        "message": envelope.error_message,
                    })),
                );
            }
            return;
        };

        let result = if envelope.error_code == 0 {
            Ok(envelope.body)
        } else {
            Err(CallError::Remote {
                service: pending.service,
                method: pending.method,
                code: envelope.error_code,
                message: envelope.error_message,
            })
        };
        // the caller may already have timed out and gone away
        let _ = pending.reply.send(result);
    }

    fn dispatch_notify(&self, envelope: Envelope) {
        if envelope.body.is_empty() {
            return;
        }
        match decode_body::<EventMessage>(&envelope.body) {
            Ok(event) => self.dispatcher.dispatch(event),
            Err(error) => self
                .logger
                .warn(Some("wire::session"), &format!("undecodable push body: {error}")),
        }
    }

    /// Rejects every pending call with a timeout. The session stays open.
    pub fn flush_pending(&self, reason: &str) -> usize {
        let drained: Vec<(i64, PendingCall)> = self.lock_pending().drain().collect();
        let count = drained.len();
        for (client_seq, pending) in drained {
            let _ = pending.reply.send(Err(CallError::Timeout {
                service: pending.service,
                method: pending.method,
                client_seq,
            }));
        }
        if count > 0 {
            self.logger.warn(
                Some("wire::session"),
                &format!("flushed {count} pending calls: {reason}"),
            );
        }
        count
    }

    /// Requests a close handshake and marks the session closed.
    pub fn close(&self) {
        if let Some(sender) = self.lock_outbound().as_ref() {
            let _ = sender.send(Outbound::Close);
        }
        self.close_with(Closure::Normal);
    }

    /// Publishes the terminal state once; later calls are no-ops.
    pub(crate) fn close_with(&self, closure: Closure) {
        {
            let mut state = self.lock_state();
            if matches!(*state, SessionState::Closed(_)) {
                return;
            }
            *state = SessionState::Closed(closure.clone());
        }

        self.lock_outbound().take();
        let reason = match &closure {
            Closure::Normal => "connection closed".to_owned(),
            Closure::Abnormal { reason } => format!("connection lost: {reason}"),
        };
        let drained: Vec<(i64, PendingCall)> = self.lock_pending().drain().collect();
        for (_, pending) in drained {
            let _ = pending.reply.send(Err(CallError::Transport {
                service: pending.service,
                method: pending.method,
                reason: reason.clone(),
            }));
        }

        match &closure {
            Closure::Normal => self.logger.info(Some("wire::session"), "Session closed"),
            Closure::Abnormal { reason } => self
                .logger
                .error(Some("wire::session"), &format!("Session lost: {reason}")),
        }
        self.state_changed.notify_all();
    }

    /// Blocks until the session reaches a terminal state or `timeout` passes.
    pub fn wait_closed(&self, timeout: Duration) -> Option<Closure> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        loop {
            if let SessionState::Closed(closure) = &*state {
                return Some(closure.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.state_changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<i64, PendingCall>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Option<Sender<Outbound>>> {
        match self.outbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
