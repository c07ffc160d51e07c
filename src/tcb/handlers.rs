//! The per-state behavior of the user calls and of segment arrival. See
//! RFC 9293 3.10 for the event processing these follow.

use super::{
    checks::{
        check_ack, check_seq, enter_time_wait, fin_acked, fin_in_order, fin_or_defer,
        process_fin, process_segment, send_reset, send_rst, send_syn, send_syn_ack,
        unallowed_syn,
    },
    modular_cmp::{mod_bounded, mod_gt, Leq, Lt},
    Connection, Disconnect, DropReason, Outcome, Segment, State, TcpError,
};
use bytes::Bytes;

impl State {
    /// OPEN call. An active open sends a SYN, a passive one waits for a peer.
    pub fn open<C: Connection>(self, tcp: &mut C, active: bool) -> Result<(), TcpError> {
        match self {
            Self::Closed if !active => {
                tcp.set_state(Self::Listen);
                Ok(())
            }
            Self::Closed | Self::Listen if active => active_open(tcp),
            _ => Err(TcpError::ConnectionExists),
        }
    }

    /// SEND call. Returns the number of bytes accepted for immediate
    /// transmission, 0 when the data waits for the handshake to finish.
    pub fn send<C: Connection>(self, tcp: &mut C, data: Bytes) -> Result<usize, TcpError> {
        match self {
            Self::Closed => Err(TcpError::DoesNotExist),
            Self::Listen => Err(TcpError::Listening),
            Self::SynSent | Self::SynReceived => {
                tcp.queue_write(data)?;
                Ok(0)
            }
            Self::Established | Self::CloseWait => {
                let queued = tcp.queue_write(data)?;
                tcp.writeq_push();
                Ok(queued)
            }
            Self::FinWait1 | Self::FinWait2 | Self::Closing | Self::LastAck | Self::TimeWait => {
                Err(TcpError::Closing)
            }
        }
    }

    /// CLOSE call
    pub fn close<C: Connection>(self, tcp: &mut C) -> Result<Outcome, TcpError> {
        match self {
            Self::Closed => Err(TcpError::DoesNotExist),
            Self::Listen | Self::SynSent => Ok(Outcome::Close),
            Self::SynReceived | Self::Established => {
                tcp.set_state(Self::FinWait1);
                fin_or_defer(tcp);
                Ok(Outcome::Continue)
            }
            Self::CloseWait => {
                tcp.set_state(Self::LastAck);
                fin_or_defer(tcp);
                Ok(Outcome::Continue)
            }
            // Our FIN is already on its way
            Self::FinWait1 | Self::FinWait2 => Ok(Outcome::Continue),
            Self::Closing | Self::LastAck | Self::TimeWait => Err(TcpError::Closing),
        }
    }

    /// ABORT call
    pub fn abort<C: Connection>(self, tcp: &mut C) -> Outcome {
        match self {
            Self::SynReceived
            | Self::Established
            | Self::FinWait1
            | Self::FinWait2
            | Self::CloseWait => {
                send_reset(tcp);
                tcp.signal_disconnect(Disconnect::Reset);
                Outcome::Close
            }
            Self::Listen | Self::SynSent | Self::Closing | Self::LastAck | Self::TimeWait => {
                tcp.writeq_reset();
                Outcome::Close
            }
            Self::Closed => Outcome::Continue,
        }
    }

    /// SEGMENT ARRIVES event
    pub fn handle<C: Connection>(self, tcp: &mut C, segment: &Segment) -> Outcome {
        match self {
            Self::Closed => handle_closed(tcp, segment),
            Self::Listen => handle_listen(tcp, segment),
            Self::SynSent => handle_syn_sent(tcp, segment),
            Self::SynReceived => handle_syn_received(tcp, segment),
            Self::Established
            | Self::FinWait1
            | Self::FinWait2
            | Self::CloseWait
            | Self::Closing
            | Self::LastAck
            | Self::TimeWait => handle_synchronized(self, tcp, segment),
        }
    }
}

fn active_open<C: Connection>(tcp: &mut C) -> Result<(), TcpError> {
    if !tcp.has_remote() {
        return Err(TcpError::NoRemote);
    }
    let iss = tcp.generate_iss();
    let rcv_wnd = tcp.config().rcv_wnd;
    tcp.tcb().init(iss, rcv_wnd);
    send_syn(tcp);
    tcp.tcb().snd.nxt = iss.wrapping_add(1);
    tcp.set_state(State::SynSent);
    Ok(())
}

fn handle_closed<C: Connection>(tcp: &mut C, segment: &Segment) -> Outcome {
    let header = &segment.header;
    if header.ctl.rst() {
        return Outcome::Continue;
    }
    if header.ctl.ack() {
        send_rst(tcp, header.ack);
    } else {
        let ack = header.seq.wrapping_add(segment.seg_len());
        let reply = tcp.outgoing_packet().seq(0).rst().ack(ack).build();
        tcp.transmit(Segment::new(reply, Bytes::new()));
    }
    Outcome::Continue
}

fn handle_listen<C: Connection>(tcp: &mut C, segment: &Segment) -> Outcome {
    let header = &segment.header;
    if header.ctl.rst() {
        return Outcome::Continue;
    }
    if header.ctl.ack() {
        send_rst(tcp, header.ack);
        return Outcome::Continue;
    }
    if !header.ctl.syn() || !tcp.has_remote() {
        tcp.drop_segment(segment, DropReason::Unexpected);
        return Outcome::Continue;
    }

    let iss = tcp.generate_iss();
    let rcv_wnd = tcp.config().rcv_wnd;
    tcp.tcb().init(iss, rcv_wnd);
    {
        let tcb = tcp.tcb();
        tcb.rcv.irs = header.seq;
        tcb.rcv.nxt = header.seq.wrapping_add(1);
        // Windows on SYN segments are never scaled
        tcb.snd.wnd = header.wnd as u32;
        tcb.snd.wl1 = header.seq;
    }
    tcp.parse_options(segment);
    send_syn_ack(tcp);
    tcp.tcb().snd.nxt = iss.wrapping_add(1);
    tcp.set_state(State::SynReceived);

    // Text arriving on the SYN waits for a retransmission once the
    // connection is synchronized
    Outcome::Continue
}

fn handle_syn_sent<C: Connection>(tcp: &mut C, segment: &Segment) -> Outcome {
    let header = &segment.header;
    let snd = tcp.tcb().snd;

    // First, check the ACK bit
    if header.ctl.ack() && !mod_bounded(snd.iss, Lt, header.ack, Leq, snd.nxt) {
        if header.ctl.rst() {
            tcp.drop_segment(segment, DropReason::Rst);
        } else {
            send_rst(tcp, header.ack);
            tcp.drop_segment(segment, DropReason::AckOutOfOrder);
        }
        return Outcome::Continue;
    }

    // Second, check the RST bit
    if header.ctl.rst() {
        if header.ctl.ack() {
            tcp.signal_disconnect(Disconnect::Refused);
            return Outcome::Close;
        }
        tcp.drop_segment(segment, DropReason::Rst);
        return Outcome::Continue;
    }

    // Fourth, check the SYN bit
    if !header.ctl.syn() {
        tcp.drop_segment(segment, DropReason::Unexpected);
        return Outcome::Continue;
    }

    {
        let tcb = tcp.tcb();
        tcb.rcv.irs = header.seq;
        tcb.rcv.nxt = header.seq.wrapping_add(1);
        if header.ctl.ack() {
            tcb.snd.una = header.ack;
        }
    }
    tcp.parse_options(segment);
    if header.ctl.ack() {
        tcp.retire_acknowledged();
    }

    let snd = tcp.tcb().snd;
    if mod_gt(snd.una, snd.iss) {
        {
            let snd = &mut tcp.tcb().snd;
            snd.wnd = header.wnd as u32;
            snd.wl1 = header.seq;
            snd.wl2 = header.ack;
        }
        tcp.set_state(State::Established);
        tcp.send_ack();
        tcp.signal_connect();

        // Sixth, process the segment text
        let text = syn_text(segment);
        process_segment(tcp, &text);

        // Eighth, check the FIN bit
        if fin_in_order(tcp, &text) {
            tcp.set_state(State::CloseWait);
            process_fin(tcp);
        }
    } else {
        {
            let snd = &mut tcp.tcb().snd;
            snd.wnd = header.wnd as u32;
            snd.wl1 = header.seq;
        }
        tcp.set_state(State::SynReceived);
        send_syn_ack(tcp);
    }
    Outcome::Continue
}

/// The view of a SYN segment's text as if it arrived right after the SYN
fn syn_text(segment: &Segment) -> Segment {
    let mut text = segment.clone();
    text.header.seq = text.header.seq.wrapping_add(1);
    text.header.ctl.set_syn(false);
    text
}

fn handle_syn_received<C: Connection>(tcp: &mut C, segment: &Segment) -> Outcome {
    let header = &segment.header;

    // First, check the sequence number
    if !check_seq(tcp, segment) {
        return Outcome::Continue;
    }

    // Second, check the RST bit
    if header.ctl.rst() {
        // A passive open goes back to listening, which for us means the
        // listener stays and this connection goes away
        if tcp.prev_state() == State::SynSent {
            tcp.signal_disconnect(Disconnect::Refused);
        }
        return Outcome::Close;
    }

    // Fourth, check the SYN bit
    if header.ctl.syn() {
        unallowed_syn(tcp, segment);
        return Outcome::Close;
    }

    // Fifth, check the ACK field
    if !header.ctl.ack() {
        tcp.drop_segment(segment, DropReason::AckNotSet);
        return Outcome::Continue;
    }

    let snd = tcp.tcb().snd;
    if !mod_bounded(snd.una, Leq, header.ack, Leq, snd.nxt) {
        send_rst(tcp, header.ack);
        return Outcome::Continue;
    }

    {
        let snd = &mut tcp.tcb().snd;
        snd.wnd = (header.wnd as u32) << snd.wind_shift;
        snd.wl1 = header.seq;
        snd.wl2 = header.ack;
        snd.una = header.ack;
    }
    tcp.set_state(State::Established);
    tcp.retire_acknowledged();
    tcp.signal_connect();

    process_segment(tcp, segment);
    if fin_in_order(tcp, segment) {
        tcp.set_state(State::CloseWait);
        process_fin(tcp);
    }
    Outcome::Continue
}

fn handle_synchronized<C: Connection>(state: State, tcp: &mut C, segment: &Segment) -> Outcome {
    let header = &segment.header;

    // First, check the sequence number
    if !check_seq(tcp, segment) {
        // A retransmission of the FIN we already acknowledged
        if state == State::TimeWait
            && header.ctl.fin()
            && header.seq.wrapping_add(segment.seg_len()) == tcp.tcb().rcv.nxt
        {
            tcp.timewait_restart();
        }
        return Outcome::Continue;
    }

    // Second, check the RST bit
    if header.ctl.rst() {
        if matches!(
            state,
            State::Established | State::FinWait1 | State::FinWait2 | State::CloseWait
        ) {
            tcp.writeq_reset();
            tcp.signal_disconnect(Disconnect::Reset);
        }
        return Outcome::Close;
    }

    // Fourth, check the SYN bit
    if header.ctl.syn() {
        unallowed_syn(tcp, segment);
        return Outcome::Close;
    }

    // Fifth, check the ACK field
    let syn_unacked = tcp.tcb().snd.una == tcp.tcb().snd.iss;
    if !check_ack(tcp, segment) {
        return Outcome::Continue;
    }
    // Closed from SYN-RECEIVED, so this is the first ACK of our SYN
    if syn_unacked && tcp.tcb().snd.una != tcp.tcb().snd.iss {
        tcp.signal_connect();
    }
    match state {
        State::FinWait1 if fin_acked(tcp, segment) => tcp.set_state(State::FinWait2),
        State::Closing if fin_acked(tcp, segment) => {
            enter_time_wait(tcp);
            return Outcome::Continue;
        }
        State::LastAck if fin_acked(tcp, segment) => return Outcome::Close,
        _ => {}
    }

    // Seventh, process the segment text
    if matches!(
        state,
        State::Established | State::FinWait1 | State::FinWait2
    ) {
        process_segment(tcp, segment);
    }

    // Eighth, check the FIN bit
    if !header.ctl.fin() {
        return Outcome::Continue;
    }
    match tcp.state() {
        State::Established if fin_in_order(tcp, segment) => {
            tcp.set_state(State::CloseWait);
            process_fin(tcp);
        }
        State::FinWait1 if fin_in_order(tcp, segment) => {
            tcp.set_state(State::Closing);
            process_fin(tcp);
        }
        State::FinWait2 if fin_in_order(tcp, segment) => {
            enter_time_wait(tcp);
            process_fin(tcp);
        }
        State::TimeWait => {
            tcp.send_ack();
            tcp.timewait_restart();
        }
        // Already consumed, or not yet contiguous
        _ => {}
    }
    Outcome::Continue
}
