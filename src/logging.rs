//! Wrapper functions for logging connection events. These are called from
//! inside the connection machinery so every event of one kind carries the
//! same fields.

use crate::tcb::{DropReason, State};
use std::{fs::OpenOptions, net::SocketAddrV4, path::Path, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{debug, trace};
use tracing_subscriber::FmtSubscriber;

/// Installs a JSON subscriber writing to `dir/debug-<yy-mm-dd>.log`. Only
/// should be called once per process.
pub fn init_events(dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let file_path = dir.as_ref().join(format!(
        "debug-{}.log",
        chrono::offset::Local::now().format("%y-%m-%d")
    ));
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .with_max_level(tracing::Level::TRACE)
        .json()
        .finish();
    // set the global default so all events go to the same file
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// State transition event. Captures the local and remote sockets, the state
/// left and the state entered.
pub fn transition_event(local: SocketAddrV4, remote: Option<SocketAddrV4>, from: State, to: State) {
    debug!(
        local = %local,
        remote = ?remote,
        from = %from,
        to = %to,
        "state transition"
    );
}

/// Dropped segment event
pub fn drop_event(local: SocketAddrV4, state: State, seq: u32, ack: u32, reason: DropReason) {
    debug!(
        local = %local,
        state = %state,
        seq,
        ack,
        reason = ?reason,
        "dropped segment"
    );
}

/// Timer event, for retransmissions and TIME-WAIT expiry
pub fn timer_event(local: SocketAddrV4, state: State, timer: &str) {
    trace!(local = %local, state = %state, timer, "timer expired");
}

#[derive(Debug, ThisError)]
pub enum LoggingError {
    #[error("Could not open the log file: {0}")]
    File(#[from] std::io::Error),
    #[error("A global subscriber is already set: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
