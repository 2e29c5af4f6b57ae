/*!
 * Command Pipeline
 *
 * A `Batch` sends commands without waiting for their replies and later
 * hands back every reply in submission order. Submitting only blocks when
 * the connection-wide in-flight ceiling is reached; reading the replies
 * blocks until the I/O thread has resolved all of this batch's commands.
 */

use crate::args::ToArgs;
use crate::connection::Link;
use crate::error::{Error, Result, MAX_REPORTED_ERRORS};
use crate::protocol::encode_command;
use crate::reply::Reply;
use crate::slot::{Completion, Outstanding, ReplySlot};
use bytes::BytesMut;
use std::sync::Arc;

/// A pipeline of commands on one connection
///
/// Dropping a batch waits for its outstanding commands; commands are never
/// abandoned while the I/O thread could still answer them.
pub struct Batch {
    link: Arc<Link>,
    outstanding: Arc<Outstanding>,
    slots: Vec<ReplySlot>,
    scratch: BytesMut,
}

impl Batch {
    pub(crate) fn new(link: Arc<Link>) -> Self {
        Batch {
            link,
            outstanding: Arc::new(Outstanding::default()),
            slots: Vec::new(),
            scratch: BytesMut::with_capacity(256),
        }
    }

    /// Queue one command
    ///
    /// `args` is anything implementing [`ToArgs`]: a tuple of mixed values,
    /// a slice, a vector, or `()` for no arguments.
    ///
    /// ```no_run
    /// # fn demo(conn: &kvpipe::Connection) -> kvpipe::Result<()> {
    /// let mut batch = conn.make_batch()?;
    /// batch.run("SET", ("counter", 10)).run("INCR", ("counter",));
    /// batch.throw_if_failed()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn run<A: ToArgs>(&mut self, name: &str, args: A) -> &mut Self {
        encode_command(name, &args, &mut self.scratch);
        let frame = self.scratch.split().freeze();

        let inflight = &self.link.inflight;
        inflight.acquire();
        let (slot, completion) = Completion::pair(&self.outstanding, inflight);
        self.slots.push(slot);
        log::trace!("queued {} ({} in flight)", name, inflight.current());

        self.link.submit(frame, completion);
        self
    }

    /// Number of commands submitted since creation or the last reset
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when no submitted command is still waiting for its reply
    pub fn replies_requested(&self) -> bool {
        self.outstanding.get() == 0
    }

    /// All replies in submission order, waiting for them if needed
    pub fn replies(&self) -> Replies<'_> {
        if !self.replies_requested() {
            self.outstanding.wait();
        }
        Replies { slots: &self.slots }
    }

    /// Mutable access to the replies, waiting for them if needed
    ///
    /// Yields exactly one reply per submitted command, like [`Batch::replies`].
    pub fn replies_mut(&mut self) -> impl ExactSizeIterator<Item = &mut Reply> + '_ {
        self.outstanding.wait();
        self.slots.iter_mut().map(ReplySlot::get_mut)
    }

    /// Take the replies out of the batch
    pub fn into_replies(mut self) -> Vec<Reply> {
        self.outstanding.wait();
        std::mem::take(&mut self.slots)
            .into_iter()
            .map(ReplySlot::into_inner)
            .collect()
    }

    /// Fail if any reply, at any nesting depth, is a server error
    ///
    /// The error quotes at most three messages and counts all of them.
    pub fn throw_if_failed(&self) -> Result<()> {
        let replies = self.replies();
        let mut shown = Vec::new();
        let errors = collect_errors(replies.iter(), &mut shown);
        if errors == 0 {
            return Ok(());
        }
        Err(Error::Batch {
            errors,
            shown,
            replies: replies.len(),
        })
    }

    /// Wait for outstanding commands, then forget all replies
    pub fn reset(&mut self) {
        self.outstanding.wait();
        self.slots.clear();
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.reset();
    }
}

fn collect_errors<'a>(replies: impl Iterator<Item = &'a Reply>, shown: &mut Vec<String>) -> usize {
    let mut count = 0;
    for reply in replies {
        match reply {
            Reply::Error(msg) => {
                count += 1;
                if shown.len() < MAX_REPORTED_ERRORS {
                    shown.push(msg.clone());
                }
            }
            Reply::Array(items) => count += collect_errors(items.iter(), shown),
            _ => {}
        }
    }
    count
}

/// Ordered, sized view over a resolved batch
#[derive(Clone, Copy)]
pub struct Replies<'a> {
    slots: &'a [ReplySlot],
}

impl<'a> Replies<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The reply at `index`; `None` only when `index` is out of range
    pub fn get(&self, index: usize) -> Option<&'a Reply> {
        self.slots.get(index).map(ReplySlot::reply)
    }

    pub fn first(&self) -> Option<&'a Reply> {
        self.get(0)
    }

    pub fn iter(&self) -> Iter<'a> {
        Iter {
            inner: self.slots.iter(),
        }
    }

    pub fn to_vec(&self) -> Vec<Reply> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for Replies<'a> {
    type Item = &'a Reply;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl std::fmt::Debug for Replies<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over [`Replies`]
pub struct Iter<'a> {
    inner: std::slice::Iter<'a, ReplySlot>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Reply;

    fn next(&mut self) -> Option<&'a Reply> {
        self.inner.next().map(ReplySlot::reply)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> DoubleEndedIterator for Iter<'a> {
    fn next_back(&mut self) -> Option<&'a Reply> {
        self.inner.next_back().map(ReplySlot::reply)
    }
}
