/*!
 * Cursor Iteration
 *
 * `SCAN`, `SSCAN`, `HSCAN` and `ZSCAN` walk a keyspace or a collection a
 * page at a time: each call hands back the next cursor and a page of
 * entries, and a returned cursor of `0` ends the walk. `Scan` runs those
 * calls lazily as the caller iterates. Pages may be empty while the cursor
 * is still live, so the iterator keeps fetching until it has an entry or
 * the server reports the end.
 */

use crate::client::run_single;
use crate::connection::Connection;
use crate::error::Result;
use crate::reply::{Reply, ReplyError, ReplyKind};
use bytes::Bytes;
use std::borrow::Cow;

/// Page size hint sent with every call
pub const SCAN_COUNT: usize = 10;

/// Lazy walk over one cursor-driven scan
///
/// Yields single entries: keys for `SCAN`, members for `SSCAN`. Hash and
/// sorted-set scans come paired through [`ScanPairs`].
pub struct Scan<'c> {
    conn: &'c Connection,
    command: &'static str,
    key: Option<Vec<u8>>,
    pattern: Option<Vec<u8>>,
    cursor: u64,
    done: bool,
    page: std::vec::IntoIter<Bytes>,
}

impl<'c> Scan<'c> {
    pub(crate) fn new(conn: &'c Connection, command: &'static str, key: Option<&[u8]>, pattern: Option<&[u8]>) -> Self {
        Scan {
            conn,
            command,
            key: key.map(<[u8]>::to_vec),
            pattern: pattern.map(<[u8]>::to_vec),
            cursor: 0,
            done: false,
            page: Vec::new().into_iter(),
        }
    }

    /// Cursor the next call will send; `0` before the first call and after the last
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn fetch(&mut self) -> Result<()> {
        let cursor = self.cursor.to_string();
        let count = SCAN_COUNT.to_string();
        let mut args: Vec<Cow<'_, [u8]>> = Vec::with_capacity(6);
        if let Some(key) = &self.key {
            args.push(Cow::Borrowed(key.as_slice()));
        }
        args.push(Cow::Borrowed(cursor.as_bytes()));
        if let Some(pattern) = &self.pattern {
            args.push(Cow::Borrowed(&b"MATCH"[..]));
            args.push(Cow::Borrowed(pattern.as_slice()));
        }
        args.push(Cow::Borrowed(&b"COUNT"[..]));
        args.push(Cow::Borrowed(count.as_bytes()));

        let reply = run_single(self.conn, self.command, args)?;
        let (next, entries) = split_page(reply)?;
        log::trace!("{} cursor {} -> {} ({} entries)", self.command, self.cursor, next, entries.len());
        self.cursor = next;
        self.done = next == 0;
        self.page = entries.into_iter();
        Ok(())
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Result<Bytes>> {
        loop {
            if let Some(entry) = self.page.next() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// Walk over a scan whose entries come in pairs
///
/// `HSCAN` yields field and value, `ZSCAN` yields member and score.
pub struct ScanPairs<'c> {
    inner: Scan<'c>,
}

impl<'c> ScanPairs<'c> {
    pub(crate) fn new(inner: Scan<'c>) -> Self {
        ScanPairs { inner }
    }
}

impl Iterator for ScanPairs<'_> {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Result<(Bytes, Bytes)>> {
        let first = match self.inner.next()? {
            Ok(first) => first,
            Err(e) => return Some(Err(e)),
        };
        match self.inner.next() {
            Some(Ok(second)) => Some(Ok((first, second))),
            Some(Err(e)) => Some(Err(e)),
            None => Some(Err(ReplyError::TypeMismatch {
                expected: ReplyKind::String,
                found: ReplyKind::Nil,
            }
            .into())),
        }
    }
}

/// Split a `[cursor, [entries...]]` reply
fn split_page(reply: Reply) -> Result<(u64, Vec<Bytes>)> {
    let mut parts = Vec::<Reply>::try_from(reply)?.into_iter();
    let (Some(cursor), Some(entries), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ReplyError::TypeMismatch {
            expected: ReplyKind::Array,
            found: ReplyKind::Nil,
        }
        .into());
    };

    let text = cursor.as_str()?;
    let next = text
        .parse::<u64>()
        .map_err(|_| ReplyError::NotAnInteger(text.to_string()))?;
    let entries = Vec::<Reply>::try_from(entries)?
        .into_iter()
        .map(Bytes::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((next, entries))
}
