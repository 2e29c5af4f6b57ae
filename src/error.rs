/*!
 * Error Types
 *
 * Setup failures, aggregated server errors and reply type mismatches are
 * the only errors that cross the public API. Lost connections surface
 * through `Connection::connection_error` and as error replies in the
 * affected batches, never as a panic on an I/O thread.
 */

use crate::reply::ReplyError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Maximum server error messages quoted by [`Error::Batch`]
pub const MAX_REPORTED_ERRORS: usize = 3;

#[derive(Debug, Error)]
pub enum Error {
    /// Address resolution or socket creation failed
    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The poll instance, waker or I/O thread could not be set up
    #[error("unable to set up event loop: {0}")]
    EventLoop(#[source] std::io::Error),
    #[error("not connected")]
    NotConnected,
    /// One or more replies of a batch were server errors
    #[error(
        "error in reply: {} (showing {} of {errors} errors on {replies} total replies)",
        quoted(.shown),
        .shown.len()
    )]
    Batch {
        errors: usize,
        shown: Vec<String>,
        replies: usize,
    },
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

fn quoted(messages: &[String]) -> String {
    messages
        .iter()
        .map(|m| format!("\"{}\"", m))
        .collect::<Vec<_>>()
        .join(" ")
}
