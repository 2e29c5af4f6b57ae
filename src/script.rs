/*!
 * Server-Side Scripts
 *
 * A `Script` is a handle on a script the server already knows, identified
 * by the SHA1 digest the server returned from `SCRIPT LOAD`. Running it
 * queues an `EVALSHA` on a batch like any other command.
 *
 * `ScriptManager` memoizes the load step per script body so a script is
 * only uploaded once per connection, until `SCRIPT FLUSH` clears it.
 */

use crate::args::ToArgs;
use crate::batch::Batch;
use crate::client::run_single;
use crate::connection::Connection;
use crate::error::Result;
use ahash::AHasher;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

type DigestMap = HashMap<String, String, BuildHasherDefault<AHasher>>;

/// A script loaded on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    sha1: String,
}

impl Script {
    /// Handle on a script the server is known to have cached
    pub fn from_sha1(sha1: impl Into<String>) -> Self {
        Script { sha1: sha1.into() }
    }

    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    /// Queue `EVALSHA sha1 numkeys keys... values...` on `batch`
    pub fn run<'b, K: ToArgs, V: ToArgs>(&self, batch: &'b mut Batch, keys: K, values: V) -> &'b mut Batch {
        let mut key_args = Vec::new();
        keys.push_args(&mut key_args);

        let mut args: Vec<Cow<'_, [u8]>> = Vec::with_capacity(2 + key_args.len());
        args.push(Cow::Borrowed(self.sha1.as_bytes()));
        args.push(Cow::Owned(key_args.len().to_string().into_bytes()));
        args.append(&mut key_args);
        values.push_args(&mut args);

        batch.run("EVALSHA", args)
    }
}

/// Cache of script bodies already loaded on the server
#[derive(Default)]
pub struct ScriptManager {
    known: Mutex<DigestMap>,
}

impl ScriptManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `body` on the server unless it was loaded before
    ///
    /// # Arguments
    /// * `conn` - Connected connection to load the script through
    /// * `body` - Script source
    ///
    /// # Returns
    /// * `Script` carrying the digest the server reported
    pub fn register(&self, conn: &Connection, body: &str) -> Result<Script> {
        if let Some(sha1) = self.known.lock().get(body) {
            return Ok(Script::from_sha1(sha1.clone()));
        }

        let reply = run_single(conn, "SCRIPT", ("LOAD", body))?;
        let sha1 = String::try_from(reply)?;
        log::debug!("loaded script {}", sha1);
        self.known.lock().insert(body.to_string(), sha1.clone());
        Ok(Script::from_sha1(sha1))
    }

    /// Forget every cached digest
    pub fn clear(&self) {
        self.known.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.known.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.lock().is_empty()
    }
}
