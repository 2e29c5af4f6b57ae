/*!
 * Connection Lifecycle Manager
 *
 * A `Connection` owns one link to a server and the I/O thread serving it.
 * The link moves through `Disconnected -> Connecting -> Connected ->
 * Disconnecting -> Disconnected`; `connect()` and `disconnect()` only start
 * a transition, the `wait_for_*` calls block until the reactor settles it.
 *
 * Callers never touch the socket. Commands reach the I/O thread through a
 * mailbox: an envelope is posted on a channel under a short lock and the
 * reactor is woken through its mio `Waker`.
 */

use crate::batch::Batch;
use crate::config::{Address, ConnectionConfig};
use crate::error::{Error, Result};
use crate::inflight::InFlight;
use crate::reactor::{Reactor, Stream};
use crate::slot::{Completion, CONNECTION_CLOSED};
use bytes::Bytes;
use crossbeam::channel::Sender;
use mio::Waker;
use parking_lot::{Condvar, Mutex};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Message from a caller thread to the I/O thread
pub(crate) enum Envelope {
    /// Encoded command and the token resolving its reply
    Command { frame: Bytes, completion: Completion },
    /// Stop the event loop and release the socket
    Halt,
}

/// Producer side of the I/O thread's inbox
pub(crate) struct Mailbox {
    tx: Sender<Envelope>,
    waker: Arc<Waker>,
    wake_pending: Arc<AtomicBool>,
}

impl Mailbox {
    pub(crate) fn new(tx: Sender<Envelope>, waker: Arc<Waker>, wake_pending: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            waker,
            wake_pending,
        }
    }

    fn post(&self, envelope: Envelope) -> std::result::Result<(), Envelope> {
        self.tx.send(envelope).map_err(|e| e.into_inner())?;
        self.wake();
        Ok(())
    }

    /// Wake the reactor unless a wakeup is already on its way
    fn wake(&self) {
        if !self.wake_pending.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.waker.wake() {
                log::error!("unable to wake I/O thread: {}", e);
            }
        }
    }
}

struct LinkStatus {
    state: LinkState,
    error: Option<String>,
}

/// State shared between a connection, its batches and its I/O thread
pub(crate) struct Link {
    pub(crate) inflight: Arc<InFlight>,
    status: Mutex<LinkStatus>,
    changed: Condvar,
    mailbox: Mutex<Option<Mailbox>>,
}

impl Link {
    fn new(max_in_flight: usize) -> Self {
        Link {
            inflight: Arc::new(InFlight::new(max_in_flight)),
            status: Mutex::new(LinkStatus {
                state: LinkState::Disconnected,
                error: None,
            }),
            changed: Condvar::new(),
            mailbox: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        self.status.lock().state
    }

    pub(crate) fn error(&self) -> Option<String> {
        self.status.lock().error.clone()
    }

    fn begin_connect(&self) {
        let mut st = self.status.lock();
        st.state = LinkState::Connecting;
        st.error = None;
    }

    pub(crate) fn settle_connect(&self) {
        let mut st = self.status.lock();
        if st.state == LinkState::Connecting {
            st.state = LinkState::Connected;
            self.changed.notify_all();
        }
    }

    fn begin_disconnect(&self) {
        let mut st = self.status.lock();
        if matches!(st.state, LinkState::Connecting | LinkState::Connected) {
            st.state = LinkState::Disconnecting;
            self.changed.notify_all();
        }
    }

    pub(crate) fn settle_disconnect(&self, error: Option<String>) {
        let mut st = self.status.lock();
        st.state = LinkState::Disconnected;
        st.error = error;
        self.changed.notify_all();
    }

    fn wait_until(&self, done: impl Fn(LinkState) -> bool) {
        let mut st = self.status.lock();
        while !done(st.state) {
            self.changed.wait(&mut st);
        }
    }

    fn open_mailbox(&self, mailbox: Mailbox) {
        *self.mailbox.lock() = Some(mailbox);
    }

    pub(crate) fn close_mailbox(&self) -> Option<Mailbox> {
        self.mailbox.lock().take()
    }

    /// Hand an encoded command to the I/O thread
    ///
    /// When the connection is gone the completion resolves right away with
    /// the last connection error.
    pub(crate) fn submit(&self, frame: Bytes, completion: Completion) {
        let envelope = Envelope::Command { frame, completion };
        let rejected = {
            let mailbox = self.mailbox.lock();
            match mailbox.as_ref() {
                Some(mb) => mb.post(envelope).err(),
                None => Some(envelope),
            }
        };
        if let Some(Envelope::Command { completion, .. }) = rejected {
            let reason = self.error().unwrap_or_else(|| CONNECTION_CLOSED.to_string());
            completion.fail(&reason);
        }
    }

    fn halt(&self) {
        let mailbox = self.mailbox.lock();
        if let Some(mb) = mailbox.as_ref() {
            let _ = mb.post(Envelope::Halt);
        }
    }
}

/// One logical connection to a key-value server
///
/// All methods take `&self`; a connection can be shared between threads
/// (for example behind an `Arc`) and each thread can drive its own batches.
pub struct Connection {
    config: ConnectionConfig,
    link: Arc<Link>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let link = Arc::new(Link::new(config.max_in_flight));
        Connection {
            config,
            link,
            io_thread: Mutex::new(None),
        }
    }

    /// Connection to `host:port` with default settings
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(ConnectionConfig::new(Address::tcp(host, port)))
    }

    /// Connection to a Unix domain socket with default settings
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(ConnectionConfig::new(Address::unix(path)))
    }

    pub fn address(&self) -> &Address {
        &self.config.address
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Start connecting; returns once the attempt is issued
    ///
    /// A no-op while connecting or connected. Socket, poll or thread setup
    /// failures are returned here; a refused or timed-out connection is
    /// reported later through [`Connection::connection_error`].
    pub fn connect(&self) -> Result<()> {
        let mut io = self.io_thread.lock();
        if self.link.state() != LinkState::Disconnected {
            return Ok(());
        }
        // A previous I/O thread may have exited on its own after a lost link.
        if let Some(handle) = io.take() {
            join_io_thread(handle);
        }

        let stream = open_stream(&self.config)?;
        let (reactor, mailbox) =
            Reactor::open(stream, self.link.clone(), &self.config).map_err(Error::EventLoop)?;

        self.link.begin_connect();
        self.link.open_mailbox(mailbox);

        let spawned = std::thread::Builder::new()
            .name("kvpipe-io".into())
            .spawn(move || reactor.run());
        match spawned {
            Ok(handle) => {
                log::debug!("connecting to {}", self.config.address);
                *io = Some(handle);
                Ok(())
            }
            Err(e) => {
                drop(self.link.close_mailbox());
                self.link.settle_disconnect(Some(e.to_string()));
                Err(Error::EventLoop(e))
            }
        }
    }

    /// Block until the current connect attempt succeeded or failed
    pub fn wait_for_connect(&self) {
        self.link.wait_until(|s| s != LinkState::Connecting);
    }

    /// Stop the I/O thread and close the socket
    ///
    /// Commands still waiting for a reply resolve to error replies. Safe to
    /// call when not connected.
    pub fn disconnect(&self) {
        let mut io = self.io_thread.lock();
        let Some(handle) = io.take() else {
            return;
        };
        self.link.begin_disconnect();
        self.link.halt();
        join_io_thread(handle);
        if self.link.state() != LinkState::Disconnected {
            self.link.settle_disconnect(Some("I/O thread terminated abnormally".into()));
        }
    }

    /// Block until the link is down
    pub fn wait_for_disconnect(&self) {
        self.link.wait_until(|s| s == LinkState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.link.state() == LinkState::Connected
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Text of the last connect failure or connection loss
    pub fn connection_error(&self) -> Option<String> {
        self.link.error()
    }

    /// Commands sent on this connection still awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.link.inflight.current()
    }

    /// New pipeline bound to this connection
    pub fn make_batch(&self) -> Result<Batch> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(Batch::new(self.link.clone()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
        self.wait_for_disconnect();
    }
}

fn join_io_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("I/O thread panicked");
    }
}

fn open_stream(config: &ConnectionConfig) -> Result<Stream> {
    let connect_err = |source: std::io::Error| Error::Connect {
        addr: config.address.to_string(),
        source,
    };

    match &config.address {
        Address::Tcp { host, port } => {
            let addr = format!("{}:{}", host, port)
                .to_socket_addrs()
                .map_err(connect_err)?
                .next()
                .ok_or_else(|| {
                    connect_err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "host name resolved to no addresses",
                    ))
                })?;
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                .map_err(connect_err)?;
            if config.nodelay {
                socket.set_nodelay(true).map_err(connect_err)?;
            }
            socket.set_keepalive(true).map_err(connect_err)?;
            socket.set_nonblocking(true).map_err(connect_err)?;
            match socket.connect(&addr.into()) {
                Ok(()) => {}
                Err(ref e) if connect_in_progress(e) => {}
                Err(e) => return Err(connect_err(e)),
            }
            let stream = mio::net::TcpStream::from_std(socket.into());
            Ok(Stream::Tcp(stream))
        }
        #[cfg(unix)]
        Address::Unix(path) => {
            let stream = mio::net::UnixStream::connect(path).map_err(connect_err)?;
            Ok(Stream::Unix(stream))
        }
        #[cfg(not(unix))]
        Address::Unix(_) => Err(connect_err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        ))),
    }
}

/// Non-blocking connects report "in progress" instead of success
#[cfg(unix)]
fn connect_in_progress(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(not(unix))]
fn connect_in_progress(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}
