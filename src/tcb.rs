//! The transmission control block and the state machine that drives it.
//!
//! Each arriving segment is handed to [`State::handle`] for the connection's
//! current state, which runs the ordered checks of RFC 9293 3.10.7 and
//! reports an [`Outcome`] the owning connection applies. User calls go
//! through [`State::open`], [`State::send`], [`State::close`] and
//! [`State::abort`]. All side effects flow through the [`Connection`]
//! trait.

mod checks;
mod connection;
mod handlers;
mod incoming;
pub mod modular_cmp;
mod outgoing;
mod receive_sequence_space;
mod segment;
mod send_sequence_space;
mod state;
mod transmit;


pub use connection::Connection;
pub use incoming::Incoming;
pub use outgoing::{RetransmitQueue, WriteQueue};
pub use receive_sequence_space::ReceiveSequenceSpace;
pub use segment::Segment;
pub use send_sequence_space::SendSequenceSpace;
pub use state::State;
pub use transmit::Transmit;

pub(crate) use checks::send_fin;

use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The maximum segment size assumed when the peer does not send one
pub const DEFAULT_MSS: u16 = 536;

/// The per-connection variables of the send and receive sequence spaces
/// along with the negotiated options.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Tcb {
    pub snd: SendSequenceSpace,
    pub rcv: ReceiveSequenceSpace,
    /// Both sides offered window scaling
    pub ws_ok: bool,
    /// Both sides offered SACK, so out-of-order segments are buffered
    pub sack_permitted: bool,
}

impl Tcb {
    /// Reset the block for a fresh connection attempt with the given initial
    /// send sequence number.
    pub fn init(&mut self, iss: u32, rcv_wnd: u32) {
        *self = Self {
            snd: SendSequenceSpace {
                iss,
                una: iss,
                nxt: iss,
                mss: DEFAULT_MSS,
                ..Default::default()
            },
            rcv: ReceiveSequenceSpace {
                wnd: rcv_wnd,
                ..Default::default()
            },
            ws_ok: false,
            sack_permitted: false,
        };
    }
}

/// What the owning connection should do once a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Keep the connection in whatever state the handler left it
    Continue,
    /// Tear the connection down and reclaim the TCB
    Close,
}

/// Why a segment was discarded. Recorded for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The sequence number fell outside the receive window or failed PAWS
    SeqOutOfOrder,
    /// A synchronized state received a segment without ACK
    AckNotSet,
    /// The segment acknowledged something not yet sent
    AckOutOfOrder,
    /// A reset that does not apply to this connection
    Rst,
    /// No rule applies to the segment in the current state
    Unexpected,
}

/// The reason the application is told a connection is going away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disconnect {
    /// The peer has no more data to send
    Closing,
    /// The connection was reset by either side
    Reset,
    /// The peer refused the connection attempt
    Refused,
}

impl Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Closing => "Connection closing",
            Self::Reset => "Connection reset",
            Self::Refused => "Connection refused",
        };
        f.write_str(reason)
    }
}

/// Errors returned synchronously to the local user. Protocol anomalies are
/// never reported this way.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum TcpError {
    #[error("Connection already exists")]
    ConnectionExists,
    #[error("Foreign socket unspecified")]
    NoRemote,
    #[error("Connection does not exist")]
    DoesNotExist,
    #[error("Connection is listening")]
    Listening,
    #[error("Connection closing")]
    Closing,
    #[error("Insufficient resources")]
    InsufficientResources,
    #[error("No connection with that ID")]
    UnknownConnection,
    #[error("Address already in use")]
    AddressInUse,
}

/// Result of advancing a connection's clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTimeResult {
    Ignore,
    CloseConnection,
}
