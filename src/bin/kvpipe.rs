/*!
 * kvpipe Mass-Insert Tool
 *
 * Connects to a Redis-compatible server, pipelines COUNT `SET` commands
 * through a single batch and reports how long submission and completion
 * took. Usage: `kvpipe [ADDR] [COUNT]`; the address falls back to the
 * `KVPIPE_ADDR` environment variable, then to `127.0.0.1:6379`.
 */

use anyhow::*;
use kvpipe::{Address, Connection, ConnectionConfig, Reply, DEFAULT_ADDR};
use std::time::Instant;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_COUNT: usize = 100_000;

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=debug kvpipe
    env_logger::init();

    let mut argv = std::env::args().skip(1);
    let addr = argv
        .next()
        .or_else(|| std::env::var("KVPIPE_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let count = match argv.next() {
        Some(n) => n.parse::<usize>().with_context(|| format!("invalid count {:?}", n))?,
        None => DEFAULT_COUNT,
    };

    let conn = Connection::new(ConnectionConfig::new(Address::parse(&addr)));
    conn.connect()?;
    conn.wait_for_connect();
    if !conn.is_connected() {
        bail!(
            "unable to connect to {}: {}",
            addr,
            conn.connection_error().unwrap_or_else(|| "unknown error".into())
        );
    }
    println!("kvpipe connected to {}", conn.address());

    let mut batch = conn.make_batch()?;
    let start = Instant::now();
    for i in 0..count {
        batch.run("SET", (format!("key:{}", i), i));
    }
    let submitted = start.elapsed();
    batch.throw_if_failed()?;
    let completed = start.elapsed();
    drop(batch);

    let mut check = conn.make_batch()?;
    check.run("DBSIZE", ());
    check.throw_if_failed()?;
    let keys = check
        .replies()
        .first()
        .map(Reply::integer)
        .transpose()?
        .unwrap_or_default();
    drop(check);

    let secs = completed.as_secs_f64().max(f64::EPSILON);
    println!("sent {} commands in {:?}", count, submitted);
    println!("all replies in {:?} ({:.0} ops/sec)", completed, count as f64 / secs);
    println!("server reports {} keys", keys);

    conn.disconnect();
    conn.wait_for_disconnect();
    Ok(())
}
