//! In-process key-value server speaking RESP, for integration tests.
//!
//! Holds a single shared dictionary for every client connection and
//! answers commands in arrival order. Each connection has a reader thread
//! that keeps consuming and executing commands and a writer thread that
//! sends the answers. Tests can hold back the writer to build up in-flight
//! commands, and `SHUTDOWN` hangs up on the caller.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use crossbeam::channel::{unbounded, Sender};
use kvpipe::protocol::{write_array_len, write_bulk, ReplyDecoder};
use kvpipe::Reply;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type AHash = BuildHasherDefault<ahash::AHasher>;

enum Value {
    Str(Vec<u8>),
    Hash(HashMap<Vec<u8>, Vec<u8>, AHash>),
    Set(HashSet<Vec<u8>, AHash>),
    ZSet(HashMap<Vec<u8>, f64, AHash>),
}

#[derive(Default)]
struct Dict {
    inner: HashMap<Vec<u8>, Value, AHash>,
}

#[derive(Default)]
struct Shared {
    dict: Mutex<Dict>,
    /// script body digest -> body
    scripts: Mutex<HashMap<String, Vec<u8>, AHash>>,
    script_loads: AtomicUsize,
    received: AtomicUsize,
    held: Mutex<bool>,
    released: Condvar,
}

enum Flow {
    Continue,
    Hangup,
}

/// What the reader hands to the writer
enum Output {
    Chunk(BytesMut),
    Hangup,
}

/// A stream that can be split into a reading and a writing handle
trait Duplex: Read + Write + Send + Sized + 'static {
    fn duplicate(&self) -> io::Result<Self>;
}

impl Duplex for TcpStream {
    fn duplicate(&self) -> io::Result<Self> {
        self.try_clone()
    }
}

#[cfg(unix)]
impl Duplex for std::os::unix::net::UnixStream {
    fn duplicate(&self) -> io::Result<Self> {
        self.try_clone()
    }
}

/// Handle on a running fake server
#[derive(Clone)]
pub struct FakeServer {
    shared: Arc<Shared>,
    addr: Option<SocketAddr>,
    path: Option<PathBuf>,
}

impl FakeServer {
    /// Listen on an ephemeral localhost TCP port
    pub fn start() -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared::default());
        let accept_shared = shared.clone();
        std::thread::Builder::new()
            .name("fake-accept".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { continue };
                    let _ = stream.set_nodelay(true);
                    let shared = accept_shared.clone();
                    std::thread::spawn(move || serve(stream, shared));
                }
            })
            .expect("spawn accept thread");
        FakeServer {
            shared,
            addr: Some(addr),
            path: None,
        }
    }

    /// Listen on a fresh Unix domain socket
    #[cfg(unix)]
    pub fn start_unix() -> FakeServer {
        use std::os::unix::net::UnixListener;

        let path = std::env::temp_dir().join(format!(
            "kvpipe-test-{}-{}.sock",
            std::process::id(),
            rand::random::<u32>()
        ));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).expect("bind fake unix server");
        let shared = Arc::new(Shared::default());
        let accept_shared = shared.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let shared = accept_shared.clone();
                std::thread::spawn(move || serve(stream, shared));
            }
        });
        FakeServer {
            shared,
            addr: None,
            path: Some(path),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.expect("tcp server").port()
    }

    pub fn path(&self) -> PathBuf {
        self.path.clone().expect("unix server")
    }

    pub fn connection(&self) -> kvpipe::Connection {
        self.connection_with(kvpipe::DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn connection_with(&self, max_in_flight: usize) -> kvpipe::Connection {
        let address = match (&self.addr, &self.path) {
            (Some(addr), _) => kvpipe::Address::tcp("127.0.0.1", addr.port()),
            (None, Some(path)) => kvpipe::Address::unix(path.clone()),
            (None, None) => unreachable!(),
        };
        let config = kvpipe::ConnectionConfig::new(address).max_in_flight(max_in_flight);
        kvpipe::Connection::new(config)
    }

    /// Connected connection with default settings
    pub fn connect(&self) -> kvpipe::Connection {
        connected(self.connection())
    }

    pub fn client(&self) -> kvpipe::Client {
        let client = kvpipe::Client::tcp("127.0.0.1", self.port());
        client.connect().expect("connect");
        client.wait_for_connect();
        assert!(client.is_connected(), "{:?}", client.connection_error());
        client
    }

    /// Stop writing replies until [`FakeServer::release_replies`]
    pub fn hold_replies(&self) {
        *self.shared.held.lock() = true;
    }

    pub fn release_replies(&self) {
        *self.shared.held.lock() = false;
        self.shared.released.notify_all();
    }

    /// Commands received so far, over all connections
    pub fn received(&self) -> usize {
        self.shared.received.load(Ordering::SeqCst)
    }

    /// Number of `SCRIPT LOAD` commands served
    pub fn script_loads(&self) -> usize {
        self.shared.script_loads.load(Ordering::SeqCst)
    }

    /// Poll until `received() >= n`
    pub fn wait_received(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.received() < n {
            assert!(Instant::now() < deadline, "server saw {} of {} commands", self.received(), n);
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

pub fn connected(conn: kvpipe::Connection) -> kvpipe::Connection {
    conn.connect().expect("connect");
    conn.wait_for_connect();
    assert!(conn.is_connected(), "{:?}", conn.connection_error());
    conn
}

fn serve<S: Duplex>(stream: S, shared: Arc<Shared>) {
    let Ok(mut writer) = stream.duplicate() else { return };
    let (tx, rx) = unbounded::<Output>();
    let writer_shared = shared.clone();
    std::thread::spawn(move || {
        for output in rx {
            writer_shared.wait_until_released();
            match output {
                Output::Chunk(out) => {
                    if writer.write_all(&out).is_err() {
                        return;
                    }
                }
                Output::Hangup => return,
            }
        }
    });
    read_commands(stream, &shared, &tx);
}

/// Execute commands as they arrive, independent of whether replies are held
fn read_commands<S: Read>(mut stream: S, shared: &Shared, tx: &Sender<Output>) {
    let mut decoder = ReplyDecoder::new();
    let mut rbuf = BytesMut::with_capacity(4096);
    let mut tmp = vec![0u8; 64 * 1024];
    let mut cmds = Vec::new();
    loop {
        let n = match stream.read(&mut tmp) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        rbuf.extend_from_slice(&tmp[..n]);
        if decoder.decode(&mut rbuf, &mut cmds).is_err() {
            return;
        }

        let mut out = BytesMut::new();
        for cmd in cmds.drain(..) {
            shared.received.fetch_add(1, Ordering::SeqCst);
            if let Flow::Hangup = shared.exec(cmd, &mut out) {
                let _ = tx.send(Output::Chunk(out));
                let _ = tx.send(Output::Hangup);
                return;
            }
        }
        if !out.is_empty() && tx.send(Output::Chunk(out)).is_err() {
            return;
        }
    }
}

fn write_simple(s: &str, out: &mut BytesMut) {
    out.extend_from_slice(b"+");
    out.extend_from_slice(s.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn write_error(s: &str, out: &mut BytesMut) {
    out.extend_from_slice(b"-");
    out.extend_from_slice(s.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn write_integer(i: i64, out: &mut BytesMut) {
    out.extend_from_slice(format!(":{}\r\n", i).as_bytes());
}

fn write_null(out: &mut BytesMut) {
    out.extend_from_slice(b"$-1\r\n");
}

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

impl Shared {
    fn wait_until_released(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
    }

    fn exec(&self, cmd: Reply, out: &mut BytesMut) -> Flow {
        let parts: Vec<Bytes> = match cmd {
            Reply::Array(items) => items
                .into_iter()
                .map(|r| match r {
                    Reply::String(b) => b,
                    _ => Bytes::new(),
                })
                .collect(),
            _ => {
                write_error("ERR expected command array", out);
                return Flow::Continue;
            }
        };
        let Some((name, args)) = parts.split_first() else {
            write_error("ERR empty command", out);
            return Flow::Continue;
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        let mut dict = self.dict.lock();

        match (name.as_str(), args) {
            ("PING", []) => write_simple("PONG", out),
            ("ECHO", [msg]) => write_bulk(msg, out),
            ("SELECT", [_]) | ("CLIENT", [_, ..]) => write_simple("OK", out),
            ("SHUTDOWN", _) => return Flow::Hangup,
            ("GET", [k]) => match dict.inner.get(&k[..]) {
                Some(Value::Str(v)) => write_bulk(v, out),
                Some(_) => write_error(WRONGTYPE, out),
                None => write_null(out),
            },
            ("SET", [k, v]) => {
                dict.inner.insert(k.to_vec(), Value::Str(v.to_vec()));
                write_simple("OK", out);
            }
            ("INCR", [k]) => {
                let current = match dict.inner.get(&k[..]) {
                    None => Some(0),
                    Some(Value::Str(v)) => std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()),
                    Some(_) => None,
                };
                match current {
                    Some(n) => {
                        dict.inner.insert(k.to_vec(), Value::Str((n + 1).to_string().into_bytes()));
                        write_integer(n + 1, out);
                    }
                    None => write_error("ERR value is not an integer or out of range", out),
                }
            }
            ("DEL", keys) if !keys.is_empty() => {
                let removed = keys.iter().filter(|k| dict.inner.remove(&k[..]).is_some()).count();
                write_integer(removed as i64, out);
            }
            ("EXISTS", keys) if !keys.is_empty() => {
                let found = keys.iter().filter(|k| dict.inner.contains_key(&k[..])).count();
                write_integer(found as i64, out);
            }
            ("DBSIZE", []) => write_integer(dict.inner.len() as i64, out),
            ("FLUSHDB", []) => {
                dict.inner.clear();
                write_simple("OK", out);
            }
            ("HSET", [k, pairs @ ..]) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let entry = dict
                    .inner
                    .entry(k.to_vec())
                    .or_insert_with(|| Value::Hash(HashMap::default()));
                let Value::Hash(h) = entry else {
                    write_error(WRONGTYPE, out);
                    return Flow::Continue;
                };
                let mut added = 0;
                for pair in pairs.chunks(2) {
                    if h.insert(pair[0].to_vec(), pair[1].to_vec()).is_none() {
                        added += 1;
                    }
                }
                write_integer(added, out);
            }
            ("HGET", [k, f]) => match dict.inner.get(&k[..]) {
                Some(Value::Hash(h)) => match h.get(&f[..]) {
                    Some(v) => write_bulk(v, out),
                    None => write_null(out),
                },
                Some(_) => write_error(WRONGTYPE, out),
                None => write_null(out),
            },
            ("HMGET", [k, fields @ ..]) if !fields.is_empty() => match dict.inner.get(&k[..]) {
                Some(Value::Hash(h)) => {
                    write_array_len(fields.len(), out);
                    for f in fields {
                        match h.get(&f[..]) {
                            Some(v) => write_bulk(v, out),
                            None => write_null(out),
                        }
                    }
                }
                Some(_) => write_error(WRONGTYPE, out),
                None => {
                    write_array_len(fields.len(), out);
                    for _ in fields {
                        write_null(out);
                    }
                }
            },
            ("HINCRBY", [k, f, by]) => {
                let Some(by) = std::str::from_utf8(by).ok().and_then(|s| s.parse::<i64>().ok()) else {
                    write_error("ERR value is not an integer or out of range", out);
                    return Flow::Continue;
                };
                let entry = dict
                    .inner
                    .entry(k.to_vec())
                    .or_insert_with(|| Value::Hash(HashMap::default()));
                let Value::Hash(h) = entry else {
                    write_error(WRONGTYPE, out);
                    return Flow::Continue;
                };
                let current = h
                    .get(&f[..])
                    .and_then(|v| std::str::from_utf8(v).ok())
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0);
                h.insert(f.to_vec(), (current + by).to_string().into_bytes());
                write_integer(current + by, out);
            }
            ("SADD", [k, members @ ..]) if !members.is_empty() => {
                let entry = dict
                    .inner
                    .entry(k.to_vec())
                    .or_insert_with(|| Value::Set(HashSet::default()));
                let Value::Set(s) = entry else {
                    write_error(WRONGTYPE, out);
                    return Flow::Continue;
                };
                let added = members.iter().filter(|m| s.insert(m.to_vec())).count();
                write_integer(added as i64, out);
            }
            ("SMEMBERS", [k]) => match dict.inner.get(&k[..]) {
                Some(Value::Set(s)) => {
                    let mut members: Vec<_> = s.iter().collect();
                    members.sort();
                    write_array_len(members.len(), out);
                    for m in members {
                        write_bulk(m, out);
                    }
                }
                Some(_) => write_error(WRONGTYPE, out),
                None => write_array_len(0, out),
            },
            ("HMSET", [k, pairs @ ..]) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let entry = dict
                    .inner
                    .entry(k.to_vec())
                    .or_insert_with(|| Value::Hash(HashMap::default()));
                let Value::Hash(h) = entry else {
                    write_error(WRONGTYPE, out);
                    return Flow::Continue;
                };
                for pair in pairs.chunks(2) {
                    h.insert(pair[0].to_vec(), pair[1].to_vec());
                }
                write_simple("OK", out);
            }
            // Deterministic stand-in: members in sorted order, cycled when
            // a negative count asks for repeats.
            ("SRANDMEMBER", [k, count @ ..]) if count.len() <= 1 => {
                let members: Vec<Vec<u8>> = match dict.inner.get(&k[..]) {
                    Some(Value::Set(s)) => {
                        let mut members: Vec<_> = s.iter().cloned().collect();
                        members.sort();
                        members
                    }
                    Some(_) => {
                        write_error(WRONGTYPE, out);
                        return Flow::Continue;
                    }
                    None => Vec::new(),
                };
                match count.first() {
                    None => match members.first() {
                        Some(m) => write_bulk(m, out),
                        None => write_null(out),
                    },
                    Some(count) => {
                        let Some(count) = parse_int(count) else {
                            write_error("ERR value is not an integer or out of range", out);
                            return Flow::Continue;
                        };
                        let picked: Vec<&Vec<u8>> = if count >= 0 {
                            members.iter().take(count as usize).collect()
                        } else if members.is_empty() {
                            Vec::new()
                        } else {
                            members.iter().cycle().take(count.unsigned_abs() as usize).collect()
                        };
                        write_array_len(picked.len(), out);
                        for m in picked {
                            write_bulk(m, out);
                        }
                    }
                }
            }
            ("ZADD", [k, rest @ ..]) => {
                let mut rest = rest;
                let (mut nx, mut xx, mut ch) = (false, false, false);
                while let Some((flag, tail)) = rest.split_first() {
                    match flag.to_ascii_uppercase().as_slice() {
                        b"NX" => nx = true,
                        b"XX" => xx = true,
                        b"CH" => ch = true,
                        _ => break,
                    }
                    rest = tail;
                }
                if rest.is_empty() || rest.len() % 2 != 0 || (nx && xx) {
                    write_error("ERR syntax error", out);
                    return Flow::Continue;
                }
                let mut scored = Vec::with_capacity(rest.len() / 2);
                for pair in rest.chunks(2) {
                    let Some(score) = parse_score(&pair[0]) else {
                        write_error("ERR value is not a valid float", out);
                        return Flow::Continue;
                    };
                    scored.push((score, pair[1].to_vec()));
                }
                let entry = dict
                    .inner
                    .entry(k.to_vec())
                    .or_insert_with(|| Value::ZSet(HashMap::default()));
                let Value::ZSet(z) = entry else {
                    write_error(WRONGTYPE, out);
                    return Flow::Continue;
                };
                let (mut added, mut changed) = (0, 0);
                for (score, member) in scored {
                    match z.get(&member).copied() {
                        None if !xx => {
                            z.insert(member, score);
                            added += 1;
                        }
                        Some(old) if !nx => {
                            if old != score {
                                z.insert(member, score);
                                changed += 1;
                            }
                        }
                        _ => {}
                    }
                }
                write_integer(if ch { added + changed } else { added }, out);
            }
            ("ZRANGEBYSCORE", [k, min, max, opts @ ..]) if opts.len() <= 1 => {
                let with_scores = match opts.first() {
                    None => false,
                    Some(o) if o.eq_ignore_ascii_case(b"WITHSCORES") => true,
                    Some(_) => {
                        write_error("ERR syntax error", out);
                        return Flow::Continue;
                    }
                };
                let (Some(min), Some(max)) = (parse_bound(min), parse_bound(max)) else {
                    write_error("ERR min or max is not a float", out);
                    return Flow::Continue;
                };
                let mut hits: Vec<(f64, &Vec<u8>)> = match dict.inner.get(&k[..]) {
                    Some(Value::ZSet(z)) => z
                        .iter()
                        .filter(|(_, score)| min.below(**score) && max.above(**score))
                        .map(|(m, score)| (*score, m))
                        .collect(),
                    Some(_) => {
                        write_error(WRONGTYPE, out);
                        return Flow::Continue;
                    }
                    None => Vec::new(),
                };
                hits.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
                write_array_len(hits.len() * if with_scores { 2 } else { 1 }, out);
                for (score, member) in hits {
                    write_bulk(member, out);
                    if with_scores {
                        write_bulk(score.to_string().as_bytes(), out);
                    }
                }
            }
            ("SCAN", [cursor, opts @ ..]) => {
                let mut keys: Vec<(Vec<u8>, Option<Vec<u8>>)> = dict.inner.keys().map(|k| (k.clone(), None)).collect();
                keys.sort();
                write_scan_page(&keys, cursor, opts, out);
            }
            ("SSCAN" | "HSCAN" | "ZSCAN", [k, cursor, opts @ ..]) => {
                let mut entries: Vec<(Vec<u8>, Option<Vec<u8>>)> = match (name.as_str(), dict.inner.get(&k[..])) {
                    (_, None) => Vec::new(),
                    ("SSCAN", Some(Value::Set(s))) => s.iter().map(|m| (m.clone(), None)).collect(),
                    ("HSCAN", Some(Value::Hash(h))) => h.iter().map(|(f, v)| (f.clone(), Some(v.clone()))).collect(),
                    ("ZSCAN", Some(Value::ZSet(z))) => z
                        .iter()
                        .map(|(m, score)| (m.clone(), Some(score.to_string().into_bytes())))
                        .collect(),
                    _ => {
                        write_error(WRONGTYPE, out);
                        return Flow::Continue;
                    }
                };
                entries.sort();
                write_scan_page(&entries, cursor, opts, out);
            }
            ("SCRIPT", [sub, rest @ ..]) => {
                let sub = String::from_utf8_lossy(sub).to_ascii_uppercase();
                let mut scripts = self.scripts.lock();
                match (sub.as_str(), rest) {
                    ("LOAD", [body]) => {
                        self.script_loads.fetch_add(1, Ordering::SeqCst);
                        let digest = digest(body);
                        scripts.insert(digest.clone(), body.to_vec());
                        write_bulk(digest.as_bytes(), out);
                    }
                    ("FLUSH", []) => {
                        scripts.clear();
                        write_simple("OK", out);
                    }
                    _ => write_error("ERR unknown SCRIPT subcommand", out),
                }
            }
            // Fake script engine: one entry per key (its value, or an error
            // when missing), then every extra argument echoed back.
            ("EVALSHA", [sha, numkeys, rest @ ..]) => {
                if !self.scripts.lock().contains_key(&*String::from_utf8_lossy(sha)) {
                    write_error("NOSCRIPT No matching script. Please use EVAL.", out);
                    return Flow::Continue;
                }
                let Some(numkeys) = std::str::from_utf8(numkeys)
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|n| *n <= rest.len())
                else {
                    write_error("ERR Number of keys can't be greater than number of args", out);
                    return Flow::Continue;
                };
                let (keys, argv) = rest.split_at(numkeys);
                write_array_len(keys.len() + argv.len(), out);
                for k in keys {
                    match dict.inner.get(&k[..]) {
                        Some(Value::Str(v)) => write_bulk(v, out),
                        _ => write_error(&format!("ERR no such key '{}'", String::from_utf8_lossy(k)), out),
                    }
                }
                for a in argv {
                    write_bulk(a, out);
                }
            }
            _ => write_error(&format!("ERR unknown command '{}'", name), out),
        }
        Flow::Continue
    }
}

fn parse_int(b: &[u8]) -> Option<i64> {
    std::str::from_utf8(b).ok()?.parse().ok()
}

fn parse_score(b: &[u8]) -> Option<f64> {
    let score: f64 = std::str::from_utf8(b).ok()?.parse().ok()?;
    (!score.is_nan()).then_some(score)
}

/// `ZRANGEBYSCORE` interval end; `(` marks it exclusive
#[derive(Clone, Copy)]
struct Bound {
    score: f64,
    exclusive: bool,
}

impl Bound {
    fn below(self, score: f64) -> bool {
        if self.exclusive {
            self.score < score
        } else {
            self.score <= score
        }
    }

    fn above(self, score: f64) -> bool {
        if self.exclusive {
            score < self.score
        } else {
            score <= self.score
        }
    }
}

fn parse_bound(b: &[u8]) -> Option<Bound> {
    match b.split_first() {
        Some((b'(', rest)) => parse_score(rest).map(|score| Bound { score, exclusive: true }),
        _ => parse_score(b).map(|score| Bound { score, exclusive: false }),
    }
}

/// Glob match supporting `*` and `?`
fn glob(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, _) => text.is_empty(),
        (Some((b'*', rest)), _) => glob(rest, text) || (!text.is_empty() && glob(pattern, &text[1..])),
        (Some((b'?', rest)), Some((_, tail))) => glob(rest, tail),
        (Some((c, rest)), Some((d, tail))) => c == d && glob(rest, tail),
        (Some(_), None) => false,
    }
}

/// Answer one cursor call over `entries`, sorted beforehand
///
/// The cursor is an index into `entries`; `MATCH` filters the page after it
/// is cut, so a live cursor can come back with an empty page.
fn write_scan_page(entries: &[(Vec<u8>, Option<Vec<u8>>)], cursor: &[u8], opts: &[Bytes], out: &mut BytesMut) {
    let Some(cursor) = std::str::from_utf8(cursor).ok().and_then(|s| s.parse::<usize>().ok()) else {
        write_error("ERR invalid cursor", out);
        return;
    };
    let mut pattern = None;
    let mut count = 10usize;
    for opt in opts.chunks(2) {
        let [flag, value] = opt else {
            write_error("ERR syntax error", out);
            return;
        };
        match flag.to_ascii_uppercase().as_slice() {
            b"MATCH" => pattern = Some(value.clone()),
            b"COUNT" => match parse_int(value).filter(|n| *n > 0) {
                Some(n) => count = n as usize,
                None => {
                    write_error("ERR value is out of range, must be positive", out);
                    return;
                }
            },
            _ => {
                write_error("ERR syntax error", out);
                return;
            }
        }
    }

    let end = cursor.saturating_add(count).min(entries.len());
    let next = if end >= entries.len() { 0 } else { end };
    let page: Vec<_> = entries
        .get(cursor..end)
        .unwrap_or(&[])
        .iter()
        .filter(|(key, _)| pattern.as_ref().map_or(true, |p| glob(p, key)))
        .collect();

    write_array_len(2, out);
    write_bulk(next.to_string().as_bytes(), out);
    let fields: usize = page.iter().map(|(_, v)| if v.is_some() { 2 } else { 1 }).sum();
    write_array_len(fields, out);
    for (key, value) in page {
        write_bulk(key, out);
        if let Some(value) = value {
            write_bulk(value, out);
        }
    }
}

/// Stable 40-hex-digit stand-in for a script digest
fn digest(body: &[u8]) -> String {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in body {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}{:016x}{:08x}", h, h.rotate_left(17), body.len() as u32)
}
