/*!
 * Network Layer and Event Loop
 *
 * The reactor is the single I/O thread of a connection. It owns the socket
 * and the mio poll instance; other threads only talk to it through the
 * mailbox (a crossbeam channel) and a mio `Waker`.
 *
 * Each time it is woken the reactor drains the mailbox into its write
 * buffer and queues the commands' completions in send order. Replies are
 * parsed from the read buffer as they arrive and matched to the oldest
 * queued completion, since the server answers a connection's commands in
 * the order it received them.
 */

use crate::config::ConnectionConfig;
use crate::connection::{Envelope, Link, Mailbox};
use crate::protocol::ReplyDecoder;
use crate::reply::Reply;
use crate::slot::Completion;
use bytes::{Buf, BytesMut};
use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use mio::event::Source;
use mio::net::TcpStream;
#[cfg(unix)]
use mio::net::UnixStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const STREAM: Token = Token(0);
const WAKER: Token = Token(1);

/// Reply text for commands cut off by `disconnect()`
const CLOSED_BY_CLIENT: &str = "ERR connection closed by client";

/// Client socket, TCP or Unix domain
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            Stream::Tcp(s) => s.take_error(),
            #[cfg(unix)]
            Stream::Unix(s) => s.take_error(),
        }
    }

    /// `Ok(false)` while a non-blocking connect is still in progress
    fn is_established(&self) -> io::Result<bool> {
        let peer = match self {
            Stream::Tcp(s) => s.peer_addr().map(|_| ()),
            #[cfg(unix)]
            Stream::Unix(s) => s.peer_addr().map(|_| ()),
        };
        match peer {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.register(registry, token, interests),
            #[cfg(unix)]
            Stream::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.reregister(registry, token, interests),
            #[cfg(unix)]
            Stream::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.deregister(registry),
            #[cfg(unix)]
            Stream::Unix(s) => s.deregister(registry),
        }
    }
}

/// Why the event loop stopped
enum Exit {
    Halted,
    ConnectFailed(String),
    Lost(String),
}

pub(crate) struct Reactor {
    poll: Poll,
    events: Events,
    stream: Stream,
    link: Arc<Link>,
    inbox: Receiver<Envelope>,
    wake_pending: Arc<AtomicBool>,
    peer: String,
    rbuf: BytesMut,
    decoder: ReplyDecoder,
    wbuf: BytesMut,
    tmp: Vec<u8>,
    /// Completions in the order their frames were queued for writing
    pending: VecDeque<Completion>,
    replies: Vec<Reply>,
    connected: bool,
    interest: Interest,
}

impl Reactor {
    /// Create the poll instance for `stream` and the mailbox feeding it
    pub(crate) fn open(
        mut stream: Stream,
        link: Arc<Link>,
        config: &ConnectionConfig,
    ) -> io::Result<(Reactor, Mailbox)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let interest = Interest::READABLE | Interest::WRITABLE;
        poll.registry().register(&mut stream, STREAM, interest)?;

        let (tx, inbox) = unbounded::<Envelope>();
        let wake_pending = Arc::new(AtomicBool::new(false));
        let mailbox = Mailbox::new(tx, waker, wake_pending.clone());

        let reactor = Reactor {
            poll,
            events: Events::with_capacity(config.event_capacity.max(2)),
            stream,
            link,
            inbox,
            wake_pending,
            peer: config.address.to_string(),
            rbuf: BytesMut::with_capacity(config.read_buffer),
            decoder: ReplyDecoder::new(),
            wbuf: BytesMut::new(),
            tmp: vec![0u8; config.read_buffer.max(512)],
            pending: VecDeque::new(),
            replies: Vec::with_capacity(32),
            connected: false,
            interest,
        };
        Ok((reactor, mailbox))
    }

    /// Thread body: run the loop, then settle every outstanding command
    pub(crate) fn run(mut self) {
        let exit = self.run_loop();
        self.shutdown(exit);
    }

    fn run_loop(&mut self) -> Exit {
        loop {
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("poll failed for {}: {}", self.peer, e);
                return self.failure(format!("event loop failure: {}", e));
            }

            let mut woken = false;
            let mut readable = false;
            let mut writable = false;
            let mut errored = false;
            for ev in self.events.iter() {
                match ev.token() {
                    WAKER => woken = true,
                    _ => {
                        readable |= ev.is_readable() || ev.is_read_closed();
                        writable |= ev.is_writable();
                        errored |= ev.is_error();
                    }
                }
            }

            if woken {
                self.wake_pending.store(false, Ordering::SeqCst);
                if self.drain_inbox() {
                    return Exit::Halted;
                }
            }

            if !self.connected && (readable || writable || errored) {
                match self.check_connect(errored) {
                    Ok(true) => {
                        self.connected = true;
                        log::debug!("connected to {}", self.peer);
                        self.link.settle_connect();
                    }
                    Ok(false) => {}
                    Err(msg) => return Exit::ConnectFailed(msg),
                }
            }

            if self.connected {
                if readable {
                    if let Err(msg) = self.read_replies() {
                        return Exit::Lost(msg);
                    }
                }
                if let Err(msg) = self.flush() {
                    return Exit::Lost(msg);
                }
                if let Err(e) = self.update_interest() {
                    return Exit::Lost(format!("unable to update interest: {}", e));
                }
            }
        }
    }

    fn failure(&self, msg: String) -> Exit {
        if self.connected {
            Exit::Lost(msg)
        } else {
            Exit::ConnectFailed(msg)
        }
    }

    /// Move queued envelopes into the write buffer; true on halt
    fn drain_inbox(&mut self) -> bool {
        loop {
            match self.inbox.try_recv() {
                Ok(Envelope::Command { frame, completion }) => {
                    self.wbuf.extend_from_slice(&frame);
                    self.pending.push_back(completion);
                }
                Ok(Envelope::Halt) => return true,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn check_connect(&mut self, errored: bool) -> Result<bool, String> {
        if let Some(err) = self.stream.take_error().map_err(|e| e.to_string())? {
            return Err(err.to_string());
        }
        match self.stream.is_established() {
            Ok(true) => Ok(true),
            Ok(false) if errored => Err("connection attempt failed".to_string()),
            Ok(false) => Ok(false),
            Err(e) => Err(e.to_string()),
        }
    }

    fn read_replies(&mut self) -> Result<(), String> {
        let mut closed = false;
        loop {
            match self.stream.read(&mut self.tmp) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => self.rbuf.extend_from_slice(&self.tmp[..n]),
                Err(ref e) if would_block(e) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("read error: {}", e)),
            }
        }

        self.dispatch()?;
        if closed {
            return Err("connection closed by server".to_string());
        }
        Ok(())
    }

    /// Hand every complete reply to the oldest pending completion
    fn dispatch(&mut self) -> Result<(), String> {
        self.decoder.decode(&mut self.rbuf, &mut self.replies).map_err(|e| e.to_string())?;
        for reply in self.replies.drain(..) {
            match self.pending.pop_front() {
                Some(completion) => completion.complete(reply),
                None => log::warn!("dropping unsolicited reply from {}: {:?}", self.peer, reply),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), String> {
        while !self.wbuf.is_empty() {
            match self.stream.write(&self.wbuf) {
                Ok(0) => return Err("connection closed while writing".to_string()),
                Ok(n) => self.wbuf.advance(n),
                Err(ref e) if would_block(e) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("write error: {}", e)),
            }
        }
        Ok(())
    }

    /// Ask for writable events only while output is buffered
    fn update_interest(&mut self) -> io::Result<()> {
        let wanted = if self.wbuf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != self.interest {
            self.poll.registry().reregister(&mut self.stream, STREAM, wanted)?;
            self.interest = wanted;
        }
        Ok(())
    }

    fn shutdown(mut self, exit: Exit) {
        let error = match exit {
            Exit::Halted => {
                log::debug!("disconnected from {}", self.peer);
                None
            }
            Exit::ConnectFailed(msg) => {
                log::warn!("unable to connect to {}: {}", self.peer, msg);
                Some(msg)
            }
            Exit::Lost(msg) => {
                log::warn!("connection to {} lost: {}", self.peer, msg);
                Some(msg)
            }
        };

        // No producer can post once the mailbox is gone, so the drain
        // below sees every envelope that will ever arrive.
        drop(self.link.close_mailbox());
        let reason = error.clone().unwrap_or_else(|| CLOSED_BY_CLIENT.to_string());
        while let Ok(envelope) = self.inbox.try_recv() {
            if let Envelope::Command { completion, .. } = envelope {
                completion.fail(&reason);
            }
        }
        if !self.pending.is_empty() {
            log::debug!("failing {} unanswered commands: {}", self.pending.len(), reason);
        }
        for completion in self.pending.drain(..) {
            completion.fail(&reason);
        }

        let _ = self.poll.registry().deregister(&mut self.stream);
        self.link.settle_disconnect(error);
    }
}

/// Check if an I/O error indicates the operation would block
#[inline]
fn would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
