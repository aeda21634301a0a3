use std::fmt;
use std::io;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tungstenite::client::IntoClientRequest;
use tungstenite::http::header::{InvalidHeaderValue, ORIGIN, USER_AGENT};
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::{Closure, Outbound, Session};

const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectTarget {
    pub url: String,
    pub user_agent: String,
    pub origin: String,
}

#[derive(Debug)]
pub enum TransportError {
    InvalidRequest(tungstenite::Error),
    InvalidHeader {
        name: &'static str,
        source: InvalidHeaderValue,
    },
    Handshake(tungstenite::Error),
    SocketOption(io::Error),
    Spawn(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(source) => write!(f, "invalid websocket request: {source}"),
            Self::InvalidHeader { name, source } => {
                write!(f, "invalid value for header '{name}': {source}")
            }
            Self::Handshake(source) => write!(f, "websocket handshake failed: {source}"),
            Self::SocketOption(source) => write!(f, "failed to configure socket: {source}"),
            Self::Spawn(source) => write!(f, "failed to spawn transport thread: {source}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Owns the transport thread for one session.
pub struct TransportHandle {
    worker: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Dials the gateway and starts pumping frames for `session`.
///
/// The socket is owned by a single thread: it drains the outbound queue,
/// then polls for inbound frames with a short read timeout.
pub fn open(target: &ConnectTarget, session: Arc<Session>) -> Result<TransportHandle, TransportError> {
    let mut request = target
        .url
        .as_str()
        .into_client_request()
        .map_err(TransportError::InvalidRequest)?;
    let headers = request.headers_mut();
    headers.insert(USER_AGENT, header_value("User-Agent", &target.user_agent)?);
    headers.insert(ORIGIN, header_value("Origin", &target.origin)?);

    let (socket, _response) = tungstenite::connect(request).map_err(TransportError::Handshake)?;
    set_read_timeout(&socket, Some(READ_POLL_INTERVAL)).map_err(TransportError::SocketOption)?;

    let (outbound_tx, outbound_rx) = mpsc::channel();
    session.attach_outbound(outbound_tx);

    let worker = thread::Builder::new()
        .name("farmhand-transport".to_owned())
        .spawn(move || pump(socket, outbound_rx, session))
        .map_err(TransportError::Spawn)?;

    Ok(TransportHandle {
        worker: Some(worker),
    })
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|source| TransportError::InvalidHeader { name, source })
}

fn set_read_timeout(socket: &Socket, timeout: Option<Duration>) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(timeout),
        _ => Ok(()),
    }
}

enum Drain {
    Idle,
    CloseRequested,
}

fn drain_outbound(socket: &mut Socket, outbound: &Receiver<Outbound>) -> Result<Drain, tungstenite::Error> {
    loop {
        match outbound.try_recv() {
            Ok(Outbound::Frame(frame)) => socket.send(Message::Binary(frame))?,
            Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => return Ok(Drain::CloseRequested),
            Err(TryRecvError::Empty) => return Ok(Drain::Idle),
        }
    }
}

fn pump(mut socket: Socket, outbound: Receiver<Outbound>, session: Arc<Session>) {
    let mut closing_since: Option<Instant> = None;

    let closure = loop {
        match closing_since {
            None => match drain_outbound(&mut socket, &outbound) {
                Ok(Drain::Idle) => {}
                Ok(Drain::CloseRequested) => {
                    let _ = socket.close(None);
                    closing_since = Some(Instant::now());
                }
                Err(error) => {
                    break Closure::Abnormal {
                        reason: error.to_string(),
                    }
                }
            },
            Some(since) if since.elapsed() >= CLOSE_GRACE => break Closure::Normal,
            Some(_) => {}
        }

        match socket.read() {
            Ok(Message::Binary(frame)) => session.handle_frame(&frame),
            Ok(Message::Close(_)) => {
                let _ = socket.flush();
                break Closure::Normal;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(error))
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                break Closure::Normal
            }
            Err(_) if closing_since.is_some() => break Closure::Normal,
            Err(error) => {
                break Closure::Abnormal {
                    reason: error.to_string(),
                }
            }
        }
    };

    session.close_with(closure);
}
