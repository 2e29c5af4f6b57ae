/*!
 * Typed Command Batch
 *
 * `CommandBatch` is a `Batch` with named methods for the commands callers
 * pipeline most. Each method only builds the argument list and queues it;
 * replies are read back through the wrapped batch as usual. Everything a
 * plain `Batch` offers stays reachable through `Deref`.
 */

use crate::args::{ToArg, ToArgs};
use crate::batch::Batch;
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

/// Update policy for `ZADD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZaddMode {
    /// `XX`: only update members that already exist
    UpdateOnly,
    /// `NX`: only add new members, never update
    AddOnly,
    /// Add new members and update existing ones
    #[default]
    Upsert,
}

/// One end of a `ZRANGEBYSCORE` interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    /// Build a bound, exclusive when `exclude` is set
    pub fn new(score: f64, exclude: bool) -> Self {
        if exclude {
            ScoreBound::Exclusive(score)
        } else {
            ScoreBound::Inclusive(score)
        }
    }

    /// Wire form: the score, prefixed with `(` when exclusive
    pub fn to_arg_bytes(&self) -> Vec<u8> {
        match self {
            ScoreBound::Inclusive(score) => score.to_arg().into_owned(),
            ScoreBound::Exclusive(score) => {
                let mut out = b"(".to_vec();
                out.extend_from_slice(&score.to_arg());
                out
            }
        }
    }
}

/// A [`Batch`] with typed command builders
pub struct CommandBatch {
    batch: Batch,
}

impl From<Batch> for CommandBatch {
    fn from(batch: Batch) -> Self {
        CommandBatch { batch }
    }
}

impl Deref for CommandBatch {
    type Target = Batch;

    fn deref(&self) -> &Batch {
        &self.batch
    }
}

impl DerefMut for CommandBatch {
    fn deref_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }
}

impl CommandBatch {
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn batch_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }

    pub fn into_inner(self) -> Batch {
        self.batch
    }

    pub fn select(&mut self, db: u32) -> &mut Self {
        self.batch.run("SELECT", (db,));
        self
    }

    pub fn client_setname(&mut self, name: &str) -> &mut Self {
        self.batch.run("CLIENT", ("SETNAME", name));
        self
    }

    pub fn get<K: AsRef<[u8]>>(&mut self, key: K) -> &mut Self {
        self.batch.run("GET", (key.as_ref(),));
        self
    }

    pub fn set<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) -> &mut Self {
        self.batch.run("SET", (key.as_ref(), value.as_ref()));
        self
    }

    pub fn del<K: ToArgs>(&mut self, keys: K) -> &mut Self {
        self.batch.run("DEL", keys);
        self
    }

    pub fn hget<K: AsRef<[u8]>, F: AsRef<[u8]>>(&mut self, key: K, field: F) -> &mut Self {
        self.batch.run("HGET", (key.as_ref(), field.as_ref()));
        self
    }

    pub fn hmget<K: AsRef<[u8]>, F: ToArgs>(&mut self, key: K, fields: F) -> &mut Self {
        let mut args = vec![Cow::Borrowed(key.as_ref())];
        fields.push_args(&mut args);
        self.batch.run("HMGET", args);
        self
    }

    /// Set several hash fields; `pairs` is field, value, field, value...
    pub fn hmset<K: AsRef<[u8]>, P: ToArgs>(&mut self, key: K, pairs: P) -> &mut Self {
        let mut args = vec![Cow::Borrowed(key.as_ref())];
        pairs.push_args(&mut args);
        debug_assert!(args.len() % 2 == 1, "HMSET needs field/value pairs");
        self.batch.run("HMSET", args);
        self
    }

    pub fn hincrby<K: AsRef<[u8]>, F: AsRef<[u8]>>(&mut self, key: K, field: F, by: i64) -> &mut Self {
        self.batch.run("HINCRBY", (key.as_ref(), field.as_ref(), by));
        self
    }

    /// One random member; the reply is `Nil` for a missing key
    pub fn srandmember<K: AsRef<[u8]>>(&mut self, key: K) -> &mut Self {
        self.batch.run("SRANDMEMBER", (key.as_ref(),));
        self
    }

    /// Up to `count` distinct members, or `-count` members with repeats
    pub fn srandmember_count<K: AsRef<[u8]>>(&mut self, key: K, count: i64) -> &mut Self {
        self.batch.run("SRANDMEMBER", (key.as_ref(), count));
        self
    }

    pub fn sadd<K: AsRef<[u8]>, M: ToArgs>(&mut self, key: K, members: M) -> &mut Self {
        let mut args = vec![Cow::Borrowed(key.as_ref())];
        members.push_args(&mut args);
        self.batch.run("SADD", args);
        self
    }

    /// `ZADD key [XX|NX] [CH] score member...`
    ///
    /// With `changed` set the reply counts updated members too, not only
    /// added ones.
    pub fn zadd<K: AsRef<[u8]>, M: AsRef<[u8]>>(
        &mut self,
        key: K,
        mode: ZaddMode,
        changed: bool,
        members: &[(f64, M)],
    ) -> &mut Self {
        let mut args: Vec<Cow<'_, [u8]>> = Vec::with_capacity(3 + members.len() * 2);
        args.push(Cow::Borrowed(key.as_ref()));
        match mode {
            ZaddMode::UpdateOnly => args.push(Cow::Borrowed(&b"XX"[..])),
            ZaddMode::AddOnly => args.push(Cow::Borrowed(&b"NX"[..])),
            ZaddMode::Upsert => {}
        }
        if changed {
            args.push(Cow::Borrowed(&b"CH"[..]));
        }
        for (score, member) in members {
            args.push(score.to_arg());
            args.push(Cow::Borrowed(member.as_ref()));
        }
        self.batch.run("ZADD", args);
        self
    }

    /// Members with scores inside `[min, max]`, ends optionally exclusive
    pub fn zrangebyscore<K: AsRef<[u8]>>(&mut self, key: K, min: ScoreBound, max: ScoreBound, with_scores: bool) -> &mut Self {
        let min = min.to_arg_bytes();
        let max = max.to_arg_bytes();
        if with_scores {
            self.batch.run("ZRANGEBYSCORE", (key.as_ref(), min, max, "WITHSCORES"));
        } else {
            self.batch.run("ZRANGEBYSCORE", (key.as_ref(), min, max));
        }
        self
    }

    pub fn script_flush(&mut self) -> &mut Self {
        self.batch.run("SCRIPT", ("FLUSH",));
        self
    }
}
