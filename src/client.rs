/*!
 * Command Facade
 *
 * `Client` wraps a `Connection` with one-shot helpers for the most common
 * commands. Each helper is a single-command batch: submit, wait, fail on a
 * server error, convert the reply. Anything pipelined goes through
 * `make_batch`, which hands out a `CommandBatch` with the same helpers in
 * queued form. The `*scan` methods return lazy cursor iterators.
 */

use crate::args::ToArgs;
use crate::commands::{CommandBatch, ScoreBound, ZaddMode};
use crate::config::{Address, ConnectionConfig};
use crate::connection::{Connection, LinkState};
use crate::error::Result;
use crate::reply::Reply;
use crate::scan::{Scan, ScanPairs};
use crate::script::{Script, ScriptManager};
use bytes::Bytes;
use std::path::PathBuf;

/// Run one command on `conn` and return its reply
pub(crate) fn run_single<A: ToArgs>(conn: &Connection, name: &str, args: A) -> Result<Reply> {
    let mut batch = conn.make_batch()?;
    batch.run(name, args);
    batch.throw_if_failed()?;
    Ok(batch.into_replies().into_iter().next().unwrap_or(Reply::Nil))
}

/// Connection plus typed helpers and a script cache
pub struct Client {
    conn: Connection,
    scripts: ScriptManager,
}

impl Client {
    pub fn new(config: ConnectionConfig) -> Self {
        Client {
            conn: Connection::new(config),
            scripts: ScriptManager::new(),
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(ConnectionConfig::new(Address::tcp(host, port)))
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(ConnectionConfig::new(Address::unix(path)))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connect(&self) -> Result<()> {
        self.conn.connect()
    }

    pub fn wait_for_connect(&self) {
        self.conn.wait_for_connect()
    }

    pub fn disconnect(&self) {
        self.conn.disconnect()
    }

    pub fn wait_for_disconnect(&self) {
        self.conn.wait_for_disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn state(&self) -> LinkState {
        self.conn.state()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.conn.connection_error()
    }

    pub fn make_batch(&self) -> Result<CommandBatch> {
        Ok(self.conn.make_batch()?.into())
    }

    /// Run a single command, failing on an error reply
    pub fn run<A: ToArgs>(&self, name: &str, args: A) -> Result<Reply> {
        run_single(&self.conn, name, args)
    }

    /// Load `body` on the server, once per body
    pub fn make_script(&self, body: &str) -> Result<Script> {
        self.scripts.register(&self.conn, body)
    }

    pub fn scripts(&self) -> &ScriptManager {
        &self.scripts
    }

    /// Drop every script on the server and the local digest cache
    pub fn script_flush(&self) -> Result<()> {
        self.run("SCRIPT", ("FLUSH",))?;
        self.scripts.clear();
        Ok(())
    }

    pub fn ping(&self) -> Result<String> {
        let reply = self.run("PING", ())?;
        Ok(reply.status()?.to_string())
    }

    pub fn select(&self, db: u32) -> Result<()> {
        self.run("SELECT", (db,))?;
        Ok(())
    }

    pub fn client_setname(&self, name: &str) -> Result<()> {
        self.run("CLIENT", ("SETNAME", name))?;
        Ok(())
    }

    /// Value of `key`, `None` when it does not exist
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Bytes>> {
        let reply = self.run("GET", (key.as_ref(),))?;
        Ok(reply.into_optional_string()?)
    }

    /// True when the server acknowledged the write with `+OK`
    pub fn set<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> Result<bool> {
        let reply = self.run("SET", (key.as_ref(), value.as_ref()))?;
        Ok(reply.is_ok())
    }

    pub fn incr<K: AsRef<[u8]>>(&self, key: K) -> Result<i64> {
        Ok(self.run("INCR", (key.as_ref(),))?.integer()?)
    }

    /// Number of keys removed
    pub fn del<K: ToArgs>(&self, keys: K) -> Result<i64> {
        Ok(self.run("DEL", keys)?.integer()?)
    }

    pub fn exists<K: AsRef<[u8]>>(&self, key: K) -> Result<bool> {
        Ok(self.run("EXISTS", (key.as_ref(),))?.integer()? > 0)
    }

    pub fn dbsize(&self) -> Result<i64> {
        Ok(self.run("DBSIZE", ())?.integer()?)
    }

    pub fn flushdb(&self) -> Result<()> {
        self.run("FLUSHDB", ())?;
        Ok(())
    }

    pub fn hget<K: AsRef<[u8]>, F: AsRef<[u8]>>(&self, key: K, field: F) -> Result<Option<Bytes>> {
        let reply = self.run("HGET", (key.as_ref(), field.as_ref()))?;
        Ok(reply.into_optional_string()?)
    }

    pub fn hincrby<K: AsRef<[u8]>, F: AsRef<[u8]>>(&self, key: K, field: F, by: i64) -> Result<i64> {
        Ok(self.run("HINCRBY", (key.as_ref(), field.as_ref(), by))?.integer()?)
    }

    /// Values of several hash fields, `None` for missing ones
    pub fn hmget<K: AsRef<[u8]>, F: ToArgs>(&self, key: K, fields: F) -> Result<Vec<Option<Bytes>>> {
        let mut args = Vec::new();
        args.push(std::borrow::Cow::Borrowed(key.as_ref()));
        fields.push_args(&mut args);
        let items = Vec::<Reply>::try_from(self.run("HMGET", args)?)?;
        items
            .into_iter()
            .map(|r| r.into_optional_string().map_err(Into::into))
            .collect()
    }

    pub fn smembers<K: AsRef<[u8]>>(&self, key: K) -> Result<Vec<Bytes>> {
        let items = Vec::<Reply>::try_from(self.run("SMEMBERS", (key.as_ref(),))?)?;
        items
            .into_iter()
            .map(|r| Bytes::try_from(r).map_err(Into::into))
            .collect()
    }

    pub fn sadd<K: AsRef<[u8]>, M: ToArgs>(&self, key: K, members: M) -> Result<i64> {
        let mut batch = self.make_batch()?;
        batch.sadd(key, members);
        single_reply(batch)?.integer().map_err(Into::into)
    }

    /// Set several hash fields; `pairs` is field, value, field, value...
    pub fn hmset<K: AsRef<[u8]>, P: ToArgs>(&self, key: K, pairs: P) -> Result<()> {
        let mut batch = self.make_batch()?;
        batch.hmset(key, pairs);
        single_reply(batch)?;
        Ok(())
    }

    /// One random member, `None` when the set is empty or missing
    pub fn srandmember<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Bytes>> {
        let reply = self.run("SRANDMEMBER", (key.as_ref(),))?;
        Ok(reply.into_optional_string()?)
    }

    /// Up to `count` distinct members; a negative count allows repeats
    pub fn srandmember_count<K: AsRef<[u8]>>(&self, key: K, count: i64) -> Result<Vec<Bytes>> {
        let items = Vec::<Reply>::try_from(self.run("SRANDMEMBER", (key.as_ref(), count))?)?;
        items
            .into_iter()
            .map(|r| Bytes::try_from(r).map_err(Into::into))
            .collect()
    }

    /// Number of members added, or changed as well when `changed` is set
    pub fn zadd<K: AsRef<[u8]>, M: AsRef<[u8]>>(
        &self,
        key: K,
        mode: ZaddMode,
        changed: bool,
        members: &[(f64, M)],
    ) -> Result<i64> {
        let mut batch = self.make_batch()?;
        batch.zadd(key, mode, changed, members);
        single_reply(batch)?.integer().map_err(Into::into)
    }

    /// Members scored inside the interval, lowest score first
    ///
    /// With `with_scores` set, every member is followed by its score. `None`
    /// when the server answered with a nil array.
    pub fn zrangebyscore<K: AsRef<[u8]>>(
        &self,
        key: K,
        min: ScoreBound,
        max: ScoreBound,
        with_scores: bool,
    ) -> Result<Option<Vec<Bytes>>> {
        let mut batch = self.make_batch()?;
        batch.zrangebyscore(key, min, max, with_scores);
        let items = match single_reply(batch)? {
            Reply::Nil => return Ok(None),
            reply => Vec::<Reply>::try_from(reply)?,
        };
        items
            .into_iter()
            .map(|r| Bytes::try_from(r).map_err(Into::into))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Every key, optionally filtered by a glob `pattern`
    pub fn scan(&self, pattern: Option<&str>) -> Scan<'_> {
        Scan::new(&self.conn, "SCAN", None, pattern.map(str::as_bytes))
    }

    /// Every member of the set at `key`
    pub fn sscan<K: AsRef<[u8]>>(&self, key: K, pattern: Option<&str>) -> Scan<'_> {
        Scan::new(&self.conn, "SSCAN", Some(key.as_ref()), pattern.map(str::as_bytes))
    }

    /// Every field and value of the hash at `key`
    pub fn hscan<K: AsRef<[u8]>>(&self, key: K, pattern: Option<&str>) -> ScanPairs<'_> {
        ScanPairs::new(Scan::new(&self.conn, "HSCAN", Some(key.as_ref()), pattern.map(str::as_bytes)))
    }

    /// Every member and score of the sorted set at `key`
    pub fn zscan<K: AsRef<[u8]>>(&self, key: K, pattern: Option<&str>) -> ScanPairs<'_> {
        ScanPairs::new(Scan::new(&self.conn, "ZSCAN", Some(key.as_ref()), pattern.map(str::as_bytes)))
    }
}

/// Wait for the only command of `batch` and return its reply
fn single_reply(batch: CommandBatch) -> Result<Reply> {
    batch.throw_if_failed()?;
    Ok(batch.into_inner().into_replies().into_iter().next().unwrap_or(Reply::Nil))
}
