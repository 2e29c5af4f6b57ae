// Core modules for the kvpipe client engine
pub mod args; // ToArg / ToArgs: binary-safe command arguments
pub mod batch; // Batch: pipelined submission + ordered replies
pub mod client; // Client facade + typed command helpers
pub mod commands; // CommandBatch: typed builders over a Batch
pub mod config; // Address + ConnectionConfig
pub mod connection; // Connection lifecycle + mailbox to the I/O thread
pub mod error; // Error enum + Result alias
pub mod inflight; // connection-wide backpressure counter
pub mod protocol; // RESP command encoder + reply parser
mod reactor; // mio event loop (the I/O thread)
pub mod reply; // Reply value model
pub mod scan; // SCAN/SSCAN/HSCAN/ZSCAN cursor iterators
pub mod script; // Script (EVALSHA) + ScriptManager
pub mod slot; // reply slots + completion tokens

// Re-export the public API for easier access
pub use args::{ToArg, ToArgs};
pub use batch::{Batch, Replies};
pub use client::Client;
pub use commands::{CommandBatch, ScoreBound, ZaddMode};
pub use config::{Address, ConnectionConfig, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PORT};
pub use connection::{Connection, LinkState};
pub use error::{Error, Result, MAX_REPORTED_ERRORS};
pub use protocol::ReplyDecoder;
pub use reply::{Reply, ReplyError, ReplyKind};
pub use scan::{Scan, ScanPairs};
pub use script::{Script, ScriptManager};

// Default server address - standard Redis port on localhost
pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";
