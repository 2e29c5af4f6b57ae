/*!
 * Redis RESP Protocol Implementation
 *
 * This module implements the client side of the Redis Serialization
 * Protocol (RESP2): commands are encoded as arrays of bulk strings, and
 * server replies are decoded incrementally from a byte buffer into `Reply`
 * values. Decoding never blocks; an incomplete buffer simply yields nothing
 * until more bytes arrive, and the decoder resumes where it stopped.
 */

use crate::args::ToArgs;
use crate::reply::Reply;
use anyhow::*;
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;

/// Nested arrays deeper than this are rejected as a protocol error
const MAX_DEPTH: usize = 512;

/// Encode a command as a RESP array of bulk strings
///
/// Format: `*<argc>\r\n` followed by `$<len>\r\n<bytes>\r\n` per field.
/// Every field is length-prefixed, so arguments may contain any byte,
/// including CR, LF and NUL.
pub fn encode_command<A: ToArgs + ?Sized>(name: &str, args: &A, out: &mut BytesMut) {
    let mut fields: Vec<Cow<'_, [u8]>> = Vec::with_capacity(8);
    fields.push(Cow::Borrowed(name.as_bytes()));
    args.push_args(&mut fields);

    let payload: usize = fields.iter().map(|f| f.len() + 16).sum();
    out.reserve(16 + payload);

    write_array_len(fields.len(), out);
    for field in &fields {
        write_bulk(field, out);
    }
}

/// Encode a command into a fresh frozen buffer
pub fn encode<A: ToArgs + ?Sized>(name: &str, args: &A) -> Bytes {
    let mut out = BytesMut::new();
    encode_command(name, args, &mut out);
    out.freeze()
}

/// Incremental reply decoder
///
/// Keeps track of how much of the buffered frame is already known to be well
/// formed, so a reply spread over many reads is scanned once in total rather
/// than once per read. Complete frames are split off the read buffer and their
/// bulk payloads are handed out as slices of that frame, without copying.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    /// Bytes at the front of the buffer already checked for the current frame
    scanned: usize,
    /// Elements still missing from each open array, innermost last
    open: Vec<usize>,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every complete reply in `buf`, consuming the bytes they occupied
    ///
    /// A trailing partial reply stays in `buf`; the decoder remembers how far
    /// it got and resumes there once more bytes are appended.
    pub fn decode(&mut self, buf: &mut BytesMut, out: &mut Vec<Reply>) -> Result<()> {
        while let Some(len) = self.scan(&buf[..])? {
            let frame = buf.split_to(len).freeze();
            self.scanned = 0;
            let (_, reply) = decode_at(&frame, 0)?;
            out.push(reply);
        }
        Ok(())
    }

    /// Advance over whole elements until the frame completes or data runs out
    ///
    /// Returns the frame length once the outermost reply is complete. An
    /// element that is only partly buffered leaves the state untouched.
    fn scan(&mut self, data: &[u8]) -> Result<Option<usize>> {
        loop {
            let start = self.scanned;
            if start >= data.len() {
                return Ok(None);
            }
            let (line, next) = match read_line(&data[start + 1..]) {
                Some((line, used)) => (line, start + 1 + used),
                None => return Ok(None),
            };

            let (end, children) = match data[start] {
                b'+' | b'-' => (next, 0),
                b':' => {
                    read_decimal(line)?;
                    (next, 0)
                }
                b'$' => match read_length(line)? {
                    None => (next, 0),
                    Some(len) => {
                        let end = next
                            .checked_add(len)
                            .and_then(|n| n.checked_add(2))
                            .ok_or_else(|| anyhow!("protocol error: bulk length {} out of range", len))?;
                        if end > data.len() {
                            return Ok(None);
                        }
                        if &data[end - 2..end] != b"\r\n" {
                            bail!("protocol error: bulk string not terminated by CRLF");
                        }
                        (end, 0)
                    }
                },
                b'*' => (next, read_length(line)?.unwrap_or(0)),
                other => bail!("protocol error: unexpected reply marker {:?}", other as char),
            };
            self.scanned = end;

            if children > 0 {
                if self.open.len() >= MAX_DEPTH {
                    bail!("protocol error: nesting deeper than {}", MAX_DEPTH);
                }
                self.open.push(children);
                continue;
            }

            // A whole element is in; close every array it completes.
            loop {
                match self.open.last_mut() {
                    None => return Ok(Some(self.scanned)),
                    Some(left) => {
                        *left -= 1;
                        if *left > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }
}

/// Parse a single reply from the start of `data`
///
/// # Returns
/// * `Ok(Some((consumed_bytes, reply)))` - a complete reply was decoded
/// * `Ok(None)` - incomplete data, need more bytes
/// * `Err(...)` - protocol error; the stream cannot be resynchronized
pub fn parse_reply(data: &[u8]) -> Result<Option<(usize, Reply)>> {
    let len = match ReplyDecoder::new().scan(data)? {
        Some(len) => len,
        None => return Ok(None),
    };
    let frame = Bytes::copy_from_slice(&data[..len]);
    let (_, reply) = decode_at(&frame, 0)?;
    Ok(Some((len, reply)))
}

/// Parse every complete reply in `buf`, consuming the bytes they occupied
///
/// One-shot form of [`ReplyDecoder::decode`]; a stream read piecemeal should
/// keep one decoder alive across reads instead.
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Reply>) -> Result<()> {
    ReplyDecoder::new().decode(buf, out)
}

/// Build the reply held in a frame that `ReplyDecoder::scan` accepted
fn decode_at(frame: &Bytes, start: usize) -> Result<(usize, Reply)> {
    let marker = *frame
        .get(start)
        .ok_or_else(|| anyhow!("protocol error: truncated frame"))?;
    let (line, next) = read_line(&frame[start + 1..])
        .map(|(line, used)| (line, start + 1 + used))
        .ok_or_else(|| anyhow!("protocol error: truncated frame"))?;

    let reply = match marker {
        b'+' => Reply::Status(String::from_utf8_lossy(line).into_owned()),
        b'-' => Reply::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => Reply::Integer(read_decimal(line)?),
        b'$' => match read_length(line)? {
            None => Reply::Nil,
            Some(len) => return Ok((next + len + 2, Reply::String(frame.slice(next..next + len)))),
        },
        b'*' => match read_length(line)? {
            None => Reply::Nil,
            Some(n) => {
                let mut cursor = next;
                let mut items = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let (end, item) = decode_at(frame, cursor)?;
                    cursor = end;
                    items.push(item);
                }
                return Ok((cursor, Reply::Array(items)));
            }
        },
        other => bail!("protocol error: unexpected reply marker {:?}", other as char),
    };
    Ok((next, reply))
}

/// Read a bulk or array length; negative lengths denote nil
fn read_length(line: &[u8]) -> Result<Option<usize>> {
    let n = read_decimal(line)?;
    if n < 0 {
        return Ok(None);
    }
    let len = usize::try_from(n).map_err(|_| anyhow!("protocol error: length {} out of range", n))?;
    Ok(Some(len))
}

/// Find the next `\r\n`-terminated line
///
/// Returns the line without its terminator and the number of bytes
/// consumed including the terminator, or `None` when no full line is
/// buffered yet.
fn read_line(s: &[u8]) -> Option<(&[u8], usize)> {
    let pos = s.windows(2).position(|w| w == b"\r\n")?;
    Some((&s[..pos], pos + 2))
}

/// Parse a signed decimal RESP header field like `-1` or `42`
fn read_decimal(s: &[u8]) -> Result<i64> {
    let (sign, digits) = match s.first() {
        Some(b'-') => (-1i64, &s[1..]),
        _ => (1i64, s),
    };
    if digits.is_empty() {
        bail!("protocol error: expected a number");
    }

    let mut num: i64 = 0;
    for &c in digits {
        if !c.is_ascii_digit() {
            bail!("protocol error: invalid digit {:?}", c as char);
        }
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add((c - b'0') as i64))
            .ok_or_else(|| anyhow!("protocol error: number out of range"))?;
    }
    Ok(num * sign)
}

//
// RESP Field Encoders
//

/// Write an array header (`*<count>\r\n`)
#[inline]
pub fn write_array_len(n: usize, out: &mut BytesMut) {
    out.extend_from_slice(b"*");
    out.extend_from_slice(n.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Write a bulk string (`$<len>\r\n<data>\r\n`)
#[inline]
pub fn write_bulk(b: &[u8], out: &mut BytesMut) {
    out.extend_from_slice(b"$");
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(b);
    out.extend_from_slice(b"\r\n");
}
