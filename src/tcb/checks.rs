//! The checks shared by the synchronized states, in the order RFC 9293
//! 3.10.7.4 applies them.

use super::{
    modular_cmp::{distance, mod_geq, mod_leq, mod_lt},
    Connection, Disconnect, DropReason, Segment,
};
use crate::tcp_parsing::{OptionKind, TcpHeaderBuilder};
use bytes::Bytes;

/// Sequence number acceptability, including PAWS. Sends the corrective ACK
/// and records the drop when the segment is unacceptable.
pub(crate) fn check_seq<C: Connection>(tcp: &mut C, segment: &Segment) -> bool {
    let header = &segment.header;
    let tcb = *tcp.tcb();
    let rcv = tcb.rcv;

    let old_timestamp = rcv.ts_ok
        && !header.ctl.rst()
        && header
            .options
            .timestamp
            .map_or(false, |ts| mod_lt(ts.val, rcv.ts_recent));

    let acceptable = !old_timestamp
        && (header.seq == rcv.nxt
            || (tcb.sack_permitted && distance(rcv.nxt, header.seq) < rcv.wnd));

    if !acceptable {
        tcp.update_rcv_wnd();
        if !header.ctl.rst() {
            tcp.send_ack();
        }
        tcp.drop_segment(segment, DropReason::SeqOutOfOrder);
        return false;
    }

    if rcv.ts_ok {
        if let Some(ts) = header.options.timestamp {
            if mod_geq(ts.val, rcv.ts_recent) && mod_leq(header.seq, rcv.last_ack_sent) {
                tcp.tcb().rcv.ts_recent = ts.val;
            }
        }
    }
    true
}

/// Acknowledgment acceptability. Advances `SND.UNA`, updates the send window
/// and detects duplicate acknowledgments. Returns whether processing of the
/// segment should continue.
pub(crate) fn check_ack<C: Connection>(tcp: &mut C, segment: &Segment) -> bool {
    let header = &segment.header;
    if !header.ctl.ack() {
        tcp.drop_segment(segment, DropReason::AckNotSet);
        return false;
    }

    let snd = tcp.tcb().snd;
    let acked = distance(snd.una, header.ack);
    if acked > snd.in_flight() {
        if !mod_leq(snd.una, header.ack) {
            // An old duplicate from before SND.UNA
            return true;
        }
        tcp.send_ack();
        tcp.drop_segment(segment, DropReason::AckOutOfOrder);
        return false;
    }

    let wnd = (header.wnd as u32) << snd.wind_shift;
    let duplicate = acked == 0
        && snd.una != snd.nxt
        && segment.text.is_empty()
        && !header.ctl.syn()
        && !header.ctl.fin()
        && wnd == snd.wnd;

    let window_update = mod_lt(snd.wl1, header.seq)
        || (snd.wl1 == header.seq && mod_leq(snd.wl2, header.ack));
    if window_update {
        let snd = &mut tcp.tcb().snd;
        snd.wnd = wnd;
        snd.wl1 = header.seq;
        snd.wl2 = header.ack;
    }

    if duplicate {
        tcp.on_duplicate_ack();
    } else if acked > 0 {
        tcp.tcb().snd.una = header.ack;
        tcp.retire_acknowledged();
    } else if window_update && wnd != snd.wnd {
        tcp.writeq_push();
    }
    true
}

/// Deliver the segment text. Acknowledges it unless the delivery itself
/// caused a segment to go out.
pub(crate) fn process_segment<C: Connection>(tcp: &mut C, segment: &Segment) {
    if segment.text.is_empty() {
        return;
    }
    let snd_nxt = tcp.tcb().snd.nxt;
    tcp.recv_data(segment);
    if tcp.tcb().snd.nxt == snd_nxt {
        tcp.send_ack();
    }
}

/// The peer is closing. Advances `RCV.NXT` past the FIN and tells the
/// application. The caller sets the next state first.
pub(crate) fn process_fin<C: Connection>(tcp: &mut C) {
    let snd_nxt = tcp.tcb().snd.nxt;
    let rcv = &mut tcp.tcb().rcv;
    rcv.nxt = rcv.nxt.wrapping_add(1);
    tcp.receive_disconnect();
    tcp.signal_disconnect(Disconnect::Closing);
    if tcp.tcb().snd.nxt == snd_nxt {
        tcp.send_ack();
    }
}

/// Whether a FIN on this segment directly follows all data received so far
pub(crate) fn fin_in_order<C: Connection>(tcp: &mut C, segment: &Segment) -> bool {
    segment.header.ctl.fin()
        && segment
            .header
            .seq
            .wrapping_add(segment.payload_len())
            == tcp.tcb().rcv.nxt
}

/// Whether the segment acknowledges our FIN
pub(crate) fn fin_acked<C: Connection>(tcp: &mut C, segment: &Segment) -> bool {
    tcp.fin_sent() && segment.header.ctl.ack() && segment.header.ack == tcp.tcb().snd.nxt
}

/// A SYN after synchronization. Reset the connection.
pub(crate) fn unallowed_syn<C: Connection>(tcp: &mut C, segment: &Segment) {
    let seq = match segment.header.ctl.ack() {
        true => segment.header.ack,
        false => tcp.tcb().snd.nxt,
    };
    send_rst(tcp, seq);
    tcp.signal_disconnect(Disconnect::Reset);
}

/// Discard queued data and send `<SEQ=SND.NXT><CTL=RST>`
pub(crate) fn send_reset<C: Connection>(tcp: &mut C) {
    tcp.writeq_reset();
    let seq = tcp.tcb().snd.nxt;
    send_rst(tcp, seq);
}

/// Send `<SEQ=seq><CTL=RST>`
pub(crate) fn send_rst<C: Connection>(tcp: &mut C, seq: u32) {
    let header = tcp.outgoing_packet().seq(seq).rst().build();
    tcp.transmit(Segment::new(header, Bytes::new()));
}

/// Send `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=FIN,ACK>` and account for the FIN
pub(crate) fn send_fin<C: Connection>(tcp: &mut C) {
    let rcv_nxt = tcp.tcb().rcv.nxt;
    let header = tcp.outgoing_packet().ack(rcv_nxt).fin().build();
    tcp.transmit(Segment::new(header, Bytes::new()));
    let snd = &mut tcp.tcb().snd;
    snd.nxt = snd.nxt.wrapping_add(1);
}

/// Send a FIN now, or once the write queue drains
pub(crate) fn fin_or_defer<C: Connection>(tcp: &mut C) {
    if tcp.writeq_has_remaining_requests() {
        tcp.set_fin_pending();
    } else {
        send_fin(tcp);
    }
}

/// Send `<SEQ=ISS><ACK=RCV.NXT><CTL=SYN,ACK>` carrying the options both
/// sides agreed on
pub(crate) fn send_syn_ack<C: Connection>(tcp: &mut C) {
    let tcb = *tcp.tcb();
    let mut builder = tcp
        .outgoing_packet()
        .seq(tcb.snd.iss)
        .syn()
        .ack(tcb.rcv.nxt);
    builder = tcp.add_option(OptionKind::Mss, builder);
    if tcb.ws_ok {
        builder = tcp.add_option(OptionKind::WindowScale, builder);
    }
    if tcb.sack_permitted {
        builder = tcp.add_option(OptionKind::SackPermitted, builder);
    }
    if tcb.snd.ts_ok {
        builder = tcp.add_option(OptionKind::Timestamp, builder);
    }
    tcp.transmit(Segment::new(builder.build(), Bytes::new()));
}

/// Send `<SEQ=ISS><CTL=SYN>` offering every option the configuration enables
pub(crate) fn send_syn<C: Connection>(tcp: &mut C) {
    let config = *tcp.config();
    let iss = tcp.tcb().snd.iss;
    let mut builder: TcpHeaderBuilder = tcp.outgoing_packet().seq(iss).syn();
    builder = tcp.add_option(OptionKind::Mss, builder);
    if config.window_scale.is_some() {
        builder = tcp.add_option(OptionKind::WindowScale, builder);
    }
    if config.sack {
        builder = tcp.add_option(OptionKind::SackPermitted, builder);
    }
    if config.timestamps {
        builder = tcp.add_option(OptionKind::Timestamp, builder);
    }
    tcp.transmit(Segment::new(builder.build(), Bytes::new()));
}

/// Enter TIME-WAIT: the retransmission timer stops and the time-wait timer
/// starts in the same step
pub(crate) fn enter_time_wait<C: Connection>(tcp: &mut C) {
    tcp.set_state(super::State::TimeWait);
    tcp.rtx_stop();
    tcp.timewait_start();
    tcp.release_memory();
}
