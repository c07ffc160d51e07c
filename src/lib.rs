//! A per-connection implementation of the [Transmission Control
//! Protocol](https://www.rfc-editor.org/rfc/rfc9293.html) for a unikernel
//! network stack, with the window scale and timestamp options of RFC 7323
//! and SACK-permitted from RFC 2018.
//!
//! [`tcb`] holds the state machine proper. [`TcpConnection`] owns a TCB and
//! its queues and timers, [`Tcp`] demultiplexes the connections of a host,
//! and [`TcpSession`] runs one connection on its own tokio task.

pub mod config;
pub mod logging;
pub mod tcb;
pub mod tcp;
pub mod tcp_connection;
pub mod tcp_parsing;
pub mod tcp_session;

pub use config::Config;
pub use tcb::{Disconnect, DropReason, Outcome, Segment, State, TcpError};
pub use tcp::{ConnectionId, Tcp};
pub use tcp_connection::{Event, TcpConnection};
pub use tcp_session::{SessionError, TcpSession};
