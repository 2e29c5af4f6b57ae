/*!
 * Reply Correlation Slots
 *
 * Every submitted command gets a `ReplySlot` kept by its batch and a
 * `Completion` handed to the reactor together with the encoded frame. The
 * reactor consumes the completion exactly once when the command's reply is
 * decoded. A completion that is dropped unconsumed (the connection went
 * away before the reply arrived) resolves its slot with an error reply, so
 * waiters never block forever.
 */

use crate::inflight::InFlight;
use crate::reply::Reply;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock};

/// Error text for replies that never arrived
pub const CONNECTION_CLOSED: &str = "ERR connection closed before a reply was received";

/// What an unresolved slot reads as
static UNRESOLVED: Reply = Reply::Nil;

/// Batch-local count of submitted but unresolved commands
#[derive(Default)]
pub struct Outstanding {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl Outstanding {
    pub fn add(&self) {
        *self.pending.lock() += 1;
    }

    pub fn get(&self) -> usize {
        *self.pending.lock()
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        debug_assert!(*pending > 0, "outstanding counter underflow");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until every submitted command has been resolved
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }
}

/// Caller-side view of one command's reply
#[derive(Debug)]
pub struct ReplySlot {
    cell: Arc<OnceLock<Reply>>,
}

impl ReplySlot {
    /// The reply, if the completion has delivered one
    #[inline]
    pub fn get(&self) -> Option<&Reply> {
        self.cell.get()
    }

    /// The reply, reading as `Nil` while unresolved
    #[inline]
    pub fn reply(&self) -> &Reply {
        self.cell.get().unwrap_or(&UNRESOLVED)
    }

    /// Mutable access to the reply
    ///
    /// Meant for resolved slots, whose completion has already let go of the
    /// cell. An unresolved slot is filled with `Nil` first, matching
    /// [`ReplySlot::reply`].
    pub fn get_mut(&mut self) -> &mut Reply {
        debug_assert_eq!(Arc::strong_count(&self.cell), 1, "reply slot still shared");
        let cell = Arc::make_mut(&mut self.cell);
        if cell.get().is_none() {
            let _ = cell.set(Reply::Nil);
        }
        match cell.get_mut() {
            Some(reply) => reply,
            None => unreachable!("reply cell filled above"),
        }
    }

    pub fn into_inner(self) -> Reply {
        match Arc::try_unwrap(self.cell) {
            Ok(cell) => cell.into_inner().unwrap_or(Reply::Nil),
            Err(shared) => shared.get().cloned().unwrap_or(Reply::Nil),
        }
    }
}

/// Move-only token that fills one [`ReplySlot`]
pub struct Completion {
    slot: Option<Arc<OnceLock<Reply>>>,
    batch: Arc<Outstanding>,
    inflight: Arc<InFlight>,
}

impl Completion {
    /// Create the slot/completion pair for one submitted command
    ///
    /// The caller must already hold an in-flight permit; it is returned
    /// when the completion resolves.
    pub fn pair(batch: &Arc<Outstanding>, inflight: &Arc<InFlight>) -> (ReplySlot, Completion) {
        let cell = Arc::new(OnceLock::new());
        batch.add();
        let completion = Completion {
            slot: Some(cell.clone()),
            batch: batch.clone(),
            inflight: inflight.clone(),
        };
        (ReplySlot { cell }, completion)
    }

    /// Deliver the decoded reply
    pub fn complete(mut self, reply: Reply) {
        self.resolve(reply);
    }

    /// Resolve with an error reply carrying `message`
    pub fn fail(self, message: &str) {
        self.complete(Reply::Error(message.to_string()));
    }

    fn resolve(&mut self, reply: Reply) {
        let Some(cell) = self.slot.take() else {
            return;
        };
        self.inflight.release();
        let _ = cell.set(reply);
        // The cell must be released before the batch is signalled so the
        // woken caller holds the only reference.
        drop(cell);
        self.batch.finish_one();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.slot.is_some() {
            self.resolve(Reply::Error(CONNECTION_CLOSED.to_string()));
        }
    }
}
