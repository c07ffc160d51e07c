use super::{Disconnect, DropReason, Segment, State, Tcb, TcpError};
use crate::{
    config::Config,
    tcp_parsing::{OptionKind, TcpHeaderBuilder},
};
use bytes::Bytes;

/// The operations the state handlers need from the connection that owns a
/// TCB. A handler borrows the connection for the duration of one call and
/// performs every side effect through these methods.
pub trait Connection {
    /// Mutable access to the TCB for this connection
    fn tcb(&mut self) -> &mut Tcb;

    fn state(&self) -> State;

    /// The state held before the most recent transition
    fn prev_state(&self) -> State;

    fn set_state(&mut self, state: State);

    fn config(&self) -> &Config;

    /// Pick an initial send sequence number
    fn generate_iss(&mut self) -> u32;

    /// Whether the foreign socket is known
    fn has_remote(&self) -> bool;

    /// A header addressed to the peer with `SEQ=SND.NXT`, the current
    /// receive window, and a timestamp when timestamps are in use
    fn outgoing_packet(&mut self) -> TcpHeaderBuilder;

    /// Hand a built segment to the lower layer
    fn transmit(&mut self, segment: Segment);

    /// Record a discarded segment
    fn drop_segment(&mut self, segment: &Segment, reason: DropReason);

    /// Send `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=ACK>`
    fn send_ack(&mut self) {
        let rcv_nxt = self.tcb().rcv.nxt;
        let header = self.outgoing_packet().ack(rcv_nxt).build();
        self.transmit(Segment::new(header, Bytes::new()));
    }

    /// Deliver payload to the read queue, advancing `RCV.NXT` past whatever
    /// becomes contiguous
    fn recv_data(&mut self, segment: &Segment);

    /// Hand any unread payload to the application ahead of a close
    fn receive_disconnect(&mut self);

    fn signal_connect(&mut self);

    fn signal_disconnect(&mut self, reason: Disconnect);

    /// Negotiate the options offered in a SYN
    fn parse_options(&mut self, segment: &Segment);

    /// Add an option to an outgoing SYN
    fn add_option(&mut self, kind: OptionKind, builder: TcpHeaderBuilder) -> TcpHeaderBuilder;

    fn writeq_has_remaining_requests(&self) -> bool;

    /// Queue user data, returning the number of bytes accepted
    fn queue_write(&mut self, data: Bytes) -> Result<usize, TcpError>;

    /// Segmentize and send as much queued data as the send window allows
    fn writeq_push(&mut self);

    /// Discard all queued user data
    fn writeq_reset(&mut self);

    /// Called after `SND.UNA` advances. Retires acknowledged segments,
    /// takes an RTT sample, and restarts or stops the retransmission timer.
    fn retire_acknowledged(&mut self);

    /// Called for each duplicate acknowledgment
    fn on_duplicate_ack(&mut self);

    fn rtx_stop(&mut self);

    fn timewait_start(&mut self);

    fn timewait_restart(&mut self);

    /// Reclaim retransmission storage once it can no longer be needed
    fn release_memory(&mut self);

    /// Recompute the receive window from the buffer space left
    fn update_rcv_wnd(&mut self);

    /// Send a FIN once the write queue drains
    fn set_fin_pending(&mut self);

    /// Whether our FIN has been transmitted
    fn fin_sent(&self) -> bool;
}
